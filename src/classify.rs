use regex::bytes::Regex;

use crate::error::Result;
use crate::models::Label;

/// Pattern matched against rollback runs' logs, e.g. `Rollback took 42s`.
pub const DEFAULT_ROLLBACK_MARKER: &str = r"(?i)rollback took";

/// Rollback detector. A log matching the pattern is a rollback, anything else a deploy.
#[derive(Debug, Clone)]
pub struct Marker {
    pattern: Regex,
}

impl Marker {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn classify(&self, content: &[u8]) -> Label {
        if self.pattern.is_match(content) {
            Label::Rollback
        } else {
            Label::Deploy
        }
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_ROLLBACK_MARKER).expect("default marker is a valid regex"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;

    #[test]
    fn test_default_marker_is_case_insensitive() {
        let marker = Marker::default();

        assert_eq!(marker.classify(b"ROLLBACK TOOK 12s"), Label::Rollback);
        assert_eq!(marker.classify(b"[deploy] Rollback took 3.2 seconds"), Label::Rollback);
    }

    #[test]
    fn test_missing_marker_defaults_to_deploy() {
        let marker = Marker::default();

        assert_eq!(marker.classify(b"Deployment finished in 40s"), Label::Deploy);
        assert_eq!(marker.classify(b""), Label::Deploy);
        assert_eq!(marker.classify(b"rollback skipped"), Label::Deploy);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let marker = Marker::default();
        let log = b"step 1\nstep 2\nrollback took 9s\n";

        let first = marker.classify(log);
        let second = marker.classify(log);

        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_utf8_does_not_fail() {
        let marker = Marker::default();
        let mut log = vec![0xff, 0xfe, b'\n'];
        log.extend_from_slice(b"rollback took 1s");

        assert_eq!(marker.classify(&log), Label::Rollback);
    }

    #[test]
    fn test_custom_marker() {
        let marker = Marker::new(r"ROLLBACK_DURATION=\d+").unwrap();

        assert_eq!(marker.classify(b"ROLLBACK_DURATION=31"), Label::Rollback);
        assert_eq!(marker.classify(b"rollback took 31s"), Label::Deploy);
        assert_eq!(marker.as_str(), r"ROLLBACK_DURATION=\d+");
    }

    #[test]
    fn test_invalid_marker_is_rejected() {
        let result = Marker::new("rollback (took");

        assert!(matches!(result, Err(CollectorError::Marker(_))));
    }
}
