//! Terminal capabilities and the stderr tracing subscriber.

use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

/// What stderr supports, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TerminalCaps {
    /// ANSI colour in log lines.
    pub(crate) color: bool,
    /// Redrawn widgets such as the run spinner.
    pub(crate) interactive: bool,
}

impl TerminalCaps {
    /// Reads `NO_COLOR`, `TERM` and whether stderr is a tty.
    pub(crate) fn detect(no_color_flag: bool) -> Self {
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
        let term = std::env::var("TERM").ok();
        Self::from_parts(
            no_color_flag || no_color_env,
            term.as_deref(),
            io::stderr().is_terminal(),
        )
    }

    fn from_parts(no_color: bool, term: Option<&str>, stderr_is_terminal: bool) -> Self {
        let dumb = term.is_some_and(|value| value.eq_ignore_ascii_case("dumb"));
        Self {
            color: !no_color && !dumb,
            interactive: stderr_is_terminal && !dumb,
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` applies unless a verbosity
/// flag was given.
pub(crate) fn init_tracing(caps: TerminalCaps, default_level: &str, force_cli_level: bool) {
    let from_env = if force_cli_level {
        None
    } else {
        EnvFilter::try_from_default_env().ok()
    };
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(caps.color)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dumb_terminal_disables_color_and_redraws() {
        let caps = TerminalCaps::from_parts(false, Some("DUMB"), true);
        assert!(!caps.color);
        assert!(!caps.interactive);
    }

    #[test]
    fn test_no_color_keeps_spinner() {
        let caps = TerminalCaps::from_parts(true, Some("xterm-256color"), true);
        assert!(!caps.color);
        assert!(caps.interactive);
    }

    #[test]
    fn test_piped_stderr_is_not_interactive() {
        let caps = TerminalCaps::from_parts(false, None, false);
        assert!(caps.color);
        assert!(!caps.interactive);
    }
}
