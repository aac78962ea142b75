//! Resolve command: map one track name to its catalog path.

use setup_downloader_core::resolver::parse_category_hint;
use setup_downloader_core::{Resolution, ResolvedPath};
use tracing::warn;

use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::cli::ResolveArgs;

pub fn run_resolve_command(ctx: &RunContext, args: &ResolveArgs) -> ProcessExit {
    let hint = args.category.as_deref().and_then(|text| {
        let parsed = parse_category_hint(text);
        if parsed.is_none() {
            warn!(hint = text, "unrecognized category hint, ignoring");
        }
        parsed
    });

    match ctx.resolver.resolve(&args.name, hint) {
        Resolution::Resolved(resolved) => {
            for line in resolved_lines(&resolved) {
                println!("{line}");
            }
            ProcessExit::Success
        }
        Resolution::Unresolved => {
            println!("unresolved: no catalog track matches '{}'", args.name);
            ProcessExit::Failure
        }
    }
}

fn resolved_lines(resolved: &ResolvedPath) -> Vec<String> {
    vec![
        format!("track = {}", resolved.entry_name),
        format!("config = {}", resolved.sub_config),
        format!("path = {}", resolved.relative_path),
        format!("tier = {}", resolved.tier),
        format!("confidence = {:.2}", resolved.confidence),
    ]
}

#[cfg(test)]
mod tests {
    use setup_downloader_core::MatchTier;

    use super::*;

    #[test]
    fn test_resolved_lines_format() {
        let lines = resolved_lines(&ResolvedPath {
            entry_name: "Spa-Francorchamps".to_string(),
            sub_config: "gp".to_string(),
            relative_path: "spa/gp".to_string(),
            tier: MatchTier::Substring,
            confidence: 0.8,
        });
        assert_eq!(
            lines,
            vec![
                "track = Spa-Francorchamps",
                "config = gp",
                "path = spa/gp",
                "tier = substring",
                "confidence = 0.80",
            ]
        );
    }
}
