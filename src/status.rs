//! Normalization of raw probe results into the three display states.
//!
//! Probes report a free-form status token plus a message. The message content
//! is authoritative: upstream checkers sometimes report a generic error status
//! with a more specific message, so the sentinel-substring checks run before
//! the raw-status mapping.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Raw statuses that count as offline for duration tracking. This gate runs
/// on the *raw* status a probe reported, not the normalized display status.
pub const OFFLINE_LIKE_STATUSES: [&str; 2] = ["offline", "error"];

/// Fixed message reported for allow-listed anchor servers.
pub const ANCHOR_MESSAGE: &str = "Success";

/// Whether a raw status token gates offline-duration tracking.
pub fn is_offline_like(raw_status: &str) -> bool {
    OFFLINE_LIKE_STATUSES.contains(&raw_status)
}

/// The three canonical display states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Online,
    Warning,
    Offline,
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayStatus::Online => write!(f, "online"),
            DisplayStatus::Warning => write!(f, "warning"),
            DisplayStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Classification rules, including the always-online anchor allow-list.
#[derive(Debug, Clone, Default)]
pub struct StatusRules {
    always_online: HashSet<String>,
}

impl StatusRules {
    pub fn new<I, S>(always_online: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            always_online: always_online.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `server_name` is an allow-listed anchor that always displays
    /// as online regardless of probe input.
    pub fn is_always_online(&self, server_name: &str) -> bool {
        self.always_online.contains(server_name)
    }

    /// Maps a raw status token plus message to a display state.
    ///
    /// Sentinel substrings in the message win over the raw status; the checks
    /// are case-sensitive and ordered, first match deciding.
    pub fn normalize(&self, raw_status: &str, message: &str) -> DisplayStatus {
        if message.contains("Status code -1") || message.contains("Status code 500") {
            return DisplayStatus::Offline;
        }
        if message.contains("su3 file too old") {
            return DisplayStatus::Warning;
        }
        if message.contains("old RouterInfos returned") {
            return DisplayStatus::Online;
        }

        match raw_status.to_lowercase().as_str() {
            "online" => DisplayStatus::Online,
            "warning" | "outdated" => DisplayStatus::Warning,
            // "offline", "error", empty and anything unrecognized.
            _ => DisplayStatus::Offline,
        }
    }

    /// Display state and message for a server, applying the anchor override.
    pub fn display(
        &self,
        server_name: &str,
        raw_status: &str,
        message: &str,
    ) -> (DisplayStatus, String) {
        if self.is_always_online(server_name) {
            return (DisplayStatus::Online, ANCHOR_MESSAGE.to_string());
        }
        (self.normalize(raw_status, message), message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> StatusRules {
        StatusRules::new(["reseed.diva.exchange"])
    }

    #[test]
    fn test_message_sentinels_override_raw_status() {
        let r = rules();
        assert_eq!(
            r.normalize("error", "Status code 500: fail"),
            DisplayStatus::Offline
        );
        assert_eq!(
            r.normalize("online", "Connection failed (Status code -1)"),
            DisplayStatus::Offline
        );
        assert_eq!(r.normalize("online", "su3 file too old"), DisplayStatus::Warning);
        assert_eq!(
            r.normalize("error", "old RouterInfos returned, ok"),
            DisplayStatus::Online
        );
    }

    #[test]
    fn test_sentinel_priority_order() {
        let r = rules();
        // The offline sentinel is checked first and wins.
        assert_eq!(
            r.normalize("online", "Status code -1 while su3 file too old"),
            DisplayStatus::Offline
        );
    }

    #[test]
    fn test_raw_status_fallback() {
        let r = rules();
        assert_eq!(r.normalize("online", ""), DisplayStatus::Online);
        assert_eq!(r.normalize("warning", ""), DisplayStatus::Warning);
        assert_eq!(r.normalize("outdated", ""), DisplayStatus::Warning);
        assert_eq!(r.normalize("offline", ""), DisplayStatus::Offline);
        assert_eq!(r.normalize("error", ""), DisplayStatus::Offline);
        assert_eq!(r.normalize("bogus", ""), DisplayStatus::Offline);
        assert_eq!(r.normalize("", ""), DisplayStatus::Offline);
    }

    #[test]
    fn test_sentinels_are_case_sensitive() {
        let r = rules();
        // A lowercased sentinel falls through to the raw-status mapping.
        assert_eq!(r.normalize("online", "status code 500"), DisplayStatus::Online);
    }

    #[test]
    fn test_anchor_override() {
        let r = rules();
        let (status, message) = r.display("reseed.diva.exchange", "offline", "Status code -1");
        assert_eq!(status, DisplayStatus::Online);
        assert_eq!(message, "Success");

        let (status, message) = r.display("reseed.example.org", "offline", "down");
        assert_eq!(status, DisplayStatus::Offline);
        assert_eq!(message, "down");
    }

    #[test]
    fn test_offline_like_gate_uses_raw_status() {
        assert!(is_offline_like("offline"));
        assert!(is_offline_like("error"));
        assert!(!is_offline_like("warning"));
        assert!(!is_offline_like("outdated"));
        assert!(!is_offline_like("unknown"));
    }
}
