//! User-Agent string sent with every provider request.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/setup-downloader";

/// Default User-Agent (`setup-downloader/<version> (+<url>)`).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("setup-downloader/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version_and_url() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL));
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("setup-downloader/")
                .and_then(|s| s.split(' ').next())
                .unwrap()
        );
    }
}
