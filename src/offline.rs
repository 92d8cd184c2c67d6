//! Offline-duration tracking and notification gating.
//!
//! The engine decides, for one probe report merged against the persisted
//! record, when the server first went offline-like, how long it has been down,
//! and whether that warrants dispatching an alert right now.

use crate::core::{ProbeReport, ServerRecord};
use crate::formatting::{format_duration, parse_timestamp};
use crate::status::is_offline_like;
use chrono::{DateTime, Duration, Utc};

/// Thresholds controlling when offline alerts fire.
#[derive(Debug, Clone, Copy)]
pub struct OfflinePolicy {
    /// Hours a server must be offline before the first alert.
    pub threshold_hours: i64,
    /// Minimum hours between two alerts for the same server.
    pub cooldown_hours: i64,
}

impl Default for OfflinePolicy {
    fn default() -> Self {
        Self {
            threshold_hours: 12,
            cooldown_hours: 24,
        }
    }
}

/// The engine's verdict for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineEvaluation {
    /// Timestamp to persist as `first_offline`; `None` clears it.
    pub first_offline: Option<String>,
    /// Human-readable offline duration, when one can be computed.
    pub offline_duration: Option<String>,
    /// Whether an alert should be dispatched for this report.
    pub should_notify: bool,
    /// Whole hours the server has been offline (0 when not offline).
    pub offline_hours: i64,
}

impl OfflinePolicy {
    /// Merges a report against the existing record.
    ///
    /// `first_offline` sticks to the timestamp of the check that first saw the
    /// server offline-like; it only moves when the server recovers and goes
    /// down again. Any non-offline-like raw status clears it.
    pub fn evaluate(
        &self,
        existing: Option<&ServerRecord>,
        report: &ProbeReport,
        now: DateTime<Utc>,
    ) -> OfflineEvaluation {
        let first_offline = if is_offline_like(&report.status) {
            existing
                .and_then(|r| r.first_offline.clone())
                .or_else(|| Some(report.last_checked.clone()))
        } else {
            None
        };

        let last_notification = existing.and_then(|r| r.last_notification_sent.as_deref());
        let (should_notify, offline_hours) = self.gate(
            &report.status,
            first_offline.as_deref(),
            last_notification,
            now,
        );

        let offline_duration = first_offline
            .as_deref()
            .and_then(parse_timestamp)
            .and_then(|since| format_duration((now - since).num_seconds()));

        OfflineEvaluation {
            first_offline,
            offline_duration,
            should_notify,
            offline_hours,
        }
    }

    /// The notification gate.
    ///
    /// An unparseable `first_offline` suppresses the alert entirely (there is
    /// no way to tell how long the server has been down), while an unparseable
    /// `last_notification` is treated as never-notified.
    fn gate(
        &self,
        raw_status: &str,
        first_offline: Option<&str>,
        last_notification: Option<&str>,
        now: DateTime<Utc>,
    ) -> (bool, i64) {
        if !is_offline_like(raw_status) {
            return (false, 0);
        }
        let Some(first_offline) = first_offline else {
            return (false, 0);
        };
        let Some(since) = parse_timestamp(first_offline) else {
            return (false, 0);
        };

        let offline_hours = (now - since).num_hours();
        if offline_hours < self.threshold_hours {
            return (false, offline_hours);
        }

        let should_notify = match last_notification.and_then(parse_timestamp) {
            None => true,
            Some(last) => now - last >= Duration::hours(self.cooldown_hours),
        };
        (should_notify, offline_hours)
    }
}
