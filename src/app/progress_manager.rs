//! Spinner shown on stderr while a run is in flight.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Ticks on its own until dropped; holds nothing when disabled.
pub(crate) struct RunSpinner(Option<ProgressBar>);

impl RunSpinner {
    pub(crate) fn start(enabled: bool, message: String) -> Self {
        if !enabled {
            return Self(None);
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message);
        bar.enable_steady_tick(TICK_INTERVAL);
        Self(Some(bar))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for RunSpinner {
    fn drop(&mut self) {
        if let Some(bar) = self.0.take() {
            bar.finish_and_clear();
        }
    }
}
