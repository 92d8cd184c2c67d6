//! The ingestion coordinator: validates pushed probe reports, merges them
//! against persisted state, runs the offline engine, dispatches alerts and
//! upserts the result.
//!
//! Entries are processed one at a time; a bad entry is recorded as an error
//! string and the batch continues. The batch result distinguishes full
//! success from partial success but is never all-or-nothing.

use crate::core::{Notifier, OfflineAlert, ProbeReport, ServerRecord, StatusStore};
use crate::offline::OfflinePolicy;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A probe report as it arrives on the wire, before validation.
///
/// Accepts the field aliases the various checker generations emit.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReport {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub router_infos: Option<serde_json::Value>,
    #[serde(default)]
    pub last_check: Option<String>,
    #[serde(default)]
    pub last_checked: Option<String>,
}

/// The ingestion request body: either a wrapped `{"servers": [...]}` object
/// or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestPayload {
    Wrapped { servers: Vec<RawReport> },
    Bare(Vec<RawReport>),
}

impl IngestPayload {
    pub fn into_reports(self) -> Vec<RawReport> {
        match self {
            IngestPayload::Wrapped { servers } => servers,
            IngestPayload::Bare(servers) => servers,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("Missing hostname")]
    MissingHostname,
}

/// The batch outcome. `success` is only true when every entry applied.
#[derive(Debug, Serialize, PartialEq)]
pub struct IngestSummary {
    pub success: bool,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Validates a raw wire entry into a canonical report.
///
/// The identifier is the only hard requirement; everything else defaults.
pub fn normalize_report(raw: RawReport, now: DateTime<Utc>) -> Result<ProbeReport, IngestError> {
    let server_name = raw
        .hostname
        .or(raw.server_name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or(IngestError::MissingHostname)?;

    Ok(ProbeReport {
        server_name,
        status: raw
            .status
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        status_message: raw
            .message
            .or(raw.status_message)
            .map(|m| m.trim().to_string())
            .unwrap_or_default(),
        router_infos: raw.router_infos.as_ref().map_or(0, coerce_count),
        last_checked: raw
            .last_check
            .or(raw.last_checked)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    })
}

/// Reads a RouterInfo count out of whatever JSON shape the probe sent.
/// Numbers and numeric strings count; anything else is zero.
fn coerce_count(value: &serde_json::Value) -> u32 {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map_or(0, |n| n.min(u64::from(u32::MAX)) as u32),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0)
            .map_or(0, |f| f.min(f64::from(u32::MAX)) as u32),
        _ => 0,
    }
}

/// Orchestrates one ingestion batch.
pub struct Ingestor {
    store: Arc<dyn StatusStore>,
    notifier: Arc<dyn Notifier>,
    policy: OfflinePolicy,
}

impl Ingestor {
    pub fn new(store: Arc<dyn StatusStore>, notifier: Arc<dyn Notifier>, policy: OfflinePolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Processes a batch of raw reports sequentially.
    ///
    /// Per-entry failures (validation, storage, dispatch transport) are
    /// accumulated as error strings and never abort the remaining entries.
    pub async fn ingest(&self, entries: Vec<RawReport>) -> IngestSummary {
        let now = Utc::now();
        let mut updated = 0;
        let mut errors = Vec::new();

        for raw in entries {
            let report = match normalize_report(raw, now) {
                Ok(report) => report,
                Err(e) => {
                    errors.push(e.to_string());
                    continue;
                }
            };

            match self.apply(&report, now).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    error!("Failed to ingest server {}: {:#}", report.server_name, e);
                    errors.push(format!("Failed to update {}: {}", report.server_name, e));
                }
            }
        }

        metrics::counter!("ingest.updated").increment(updated as u64);
        metrics::counter!("ingest.errors").increment(errors.len() as u64);
        info!(
            "Ingested batch: {} updated, {} errors",
            updated,
            errors.len()
        );

        IngestSummary {
            success: errors.is_empty(),
            updated,
            errors,
        }
    }

    /// One entry's read-modify-write cycle.
    async fn apply(&self, report: &ProbeReport, now: DateTime<Utc>) -> anyhow::Result<()> {
        let existing = self.store.get(&report.server_name).await?;
        let evaluation = self.policy.evaluate(existing.as_ref(), report, now);

        let mut last_notification_sent = existing
            .as_ref()
            .and_then(|r| r.last_notification_sent.clone());

        if evaluation.should_notify {
            let alert = OfflineAlert {
                server_name: report.server_name.clone(),
                status_message: report.status_message.clone(),
                offline_hours: evaluation.offline_hours,
                recipient_override: existing.as_ref().and_then(|r| r.operator_email.clone()),
            };
            // A transport error aborts this entry; a declined dispatch keeps
            // the prior notification timestamp and the upsert still happens.
            if self.notifier.send_offline_alert(&alert).await? {
                last_notification_sent = Some(now.to_rfc3339_opts(SecondsFormat::Millis, true));
                metrics::counter!("notifications.sent").increment(1);
            }
        }

        let record = ServerRecord {
            server_name: report.server_name.clone(),
            status: report.status.clone(),
            status_message: report.status_message.clone(),
            router_infos: report.router_infos,
            last_checked: report.last_checked.clone(),
            first_offline: evaluation.first_offline,
            last_notification_sent,
            operator_email: existing.and_then(|r| r.operator_email),
        };
        self.store.upsert(record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Records alerts instead of sending them; scriptable outcome.
    struct FakeNotifier {
        outcome: Mutex<anyhow::Result<bool>>,
        alerts: Mutex<Vec<OfflineAlert>>,
    }

    impl FakeNotifier {
        fn sending() -> Self {
            Self {
                outcome: Mutex::new(Ok(true)),
                alerts: Mutex::new(Vec::new()),
            }
        }

        fn declining() -> Self {
            let n = Self::sending();
            *n.outcome.lock().unwrap() = Ok(false);
            n
        }

        fn failing() -> Self {
            let n = Self::sending();
            *n.outcome.lock().unwrap() = Err(anyhow!("smtp relay unreachable"));
            n
        }

        fn alerts(&self) -> Vec<OfflineAlert> {
            self.alerts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send_offline_alert(&self, alert: &OfflineAlert) -> anyhow::Result<bool> {
            self.alerts.lock().unwrap().push(alert.clone());
            match &*self.outcome.lock().unwrap() {
                Ok(sent) => Ok(*sent),
                Err(e) => Err(anyhow!(e.to_string())),
            }
        }
    }

    fn raw(hostname: &str, status: &str) -> RawReport {
        RawReport {
            hostname: Some(hostname.to_string()),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    fn ingestor_with(notifier: Arc<FakeNotifier>) -> (Ingestor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone(), notifier, OfflinePolicy::default());
        (ingestor, store)
    }

    #[test]
    fn test_normalize_requires_hostname() {
        let now = Utc::now();
        assert_eq!(
            normalize_report(RawReport::default(), now),
            Err(IngestError::MissingHostname)
        );
        let blank = RawReport {
            hostname: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize_report(blank, now), Err(IngestError::MissingHostname));
    }

    #[test]
    fn test_normalize_applies_defaults_and_aliases() {
        let now = Utc::now();
        let raw = RawReport {
            server_name: Some("reseed.example.org ".to_string()),
            status: Some("ONLINE".to_string()),
            message: Some("  42 RouterInfos returned ".to_string()),
            router_infos: Some(serde_json::json!("42")),
            last_check: Some("2025-07-05T10:30:00Z".to_string()),
            ..Default::default()
        };
        let report = normalize_report(raw, now).unwrap();
        assert_eq!(report.server_name, "reseed.example.org");
        assert_eq!(report.status, "online");
        assert_eq!(report.status_message, "42 RouterInfos returned");
        assert_eq!(report.router_infos, 42);
        assert_eq!(report.last_checked, "2025-07-05T10:30:00Z");

        let bare = normalize_report(raw_host_only("x.example"), now).unwrap();
        assert_eq!(bare.status, "unknown");
        assert_eq!(bare.router_infos, 0);
        assert!(!bare.last_checked.is_empty());
    }

    fn raw_host_only(hostname: &str) -> RawReport {
        RawReport {
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_coerce_count() {
        assert_eq!(coerce_count(&serde_json::json!(17)), 17);
        assert_eq!(coerce_count(&serde_json::json!("17")), 17);
        assert_eq!(coerce_count(&serde_json::json!(17.9)), 17);
        assert_eq!(coerce_count(&serde_json::json!(-3)), 0);
        assert_eq!(coerce_count(&serde_json::json!("many")), 0);
        assert_eq!(coerce_count(&serde_json::json!(null)), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_bad_entries() {
        let notifier = Arc::new(FakeNotifier::sending());
        let (ingestor, _store) = ingestor_with(notifier);

        let entries = vec![
            raw("a.example", "online"),
            raw("b.example", "offline"),
            RawReport::default(), // no identifier
            raw("c.example", "warning"),
        ];
        let summary = ingestor.ingest(entries).await;
        assert!(!summary.success);
        assert_eq!(summary.updated, 3);
        assert_eq!(summary.errors, vec!["Missing hostname".to_string()]);
    }

    #[tokio::test]
    async fn test_fully_successful_batch() {
        let notifier = Arc::new(FakeNotifier::sending());
        let (ingestor, store) = ingestor_with(notifier);

        let summary = ingestor
            .ingest(vec![raw("a.example", "online"), raw("b.example", "online")])
            .await;
        assert!(summary.success);
        assert_eq!(summary.updated, 2);
        assert!(summary.errors.is_empty());
        assert_eq!(store.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_offline_transition_sets_first_offline() {
        let notifier = Arc::new(FakeNotifier::sending());
        let (ingestor, store) = ingestor_with(notifier);

        let mut report = raw("down.example", "offline");
        report.last_check = Some("2025-07-05T00:00:00Z".to_string());
        ingestor.ingest(vec![report]).await;

        let record = store.get("down.example").await.unwrap().unwrap();
        assert_eq!(record.first_offline.as_deref(), Some("2025-07-05T00:00:00Z"));

        // A later offline report keeps the original timestamp.
        let mut again = raw("down.example", "offline");
        again.last_check = Some("2025-07-05T06:00:00Z".to_string());
        ingestor.ingest(vec![again]).await;
        let record = store.get("down.example").await.unwrap().unwrap();
        assert_eq!(record.first_offline.as_deref(), Some("2025-07-05T00:00:00Z"));

        // Recovery clears it.
        ingestor.ingest(vec![raw("down.example", "online")]).await;
        let record = store.get("down.example").await.unwrap().unwrap();
        assert_eq!(record.first_offline, None);
    }

    #[tokio::test]
    async fn test_notification_fires_past_threshold_and_records_timestamp() {
        let notifier = Arc::new(FakeNotifier::sending());
        let (ingestor, store) = ingestor_with(notifier.clone());

        // Already offline for 13 hours per the stored record.
        let first = (Utc::now() - Duration::hours(13)).to_rfc3339();
        store
            .preload([ServerRecord {
                server_name: "down.example".to_string(),
                status: "offline".to_string(),
                first_offline: Some(first),
                operator_email: Some("op@example.org".to_string()),
                ..Default::default()
            }])
            .await;

        ingestor.ingest(vec![raw("down.example", "offline")]).await;

        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].server_name, "down.example");
        assert_eq!(alerts[0].offline_hours, 13);
        assert_eq!(
            alerts[0].recipient_override.as_deref(),
            Some("op@example.org")
        );

        let record = store.get("down.example").await.unwrap().unwrap();
        assert!(record.last_notification_sent.is_some());
        // Operator email survives the upsert.
        assert_eq!(record.operator_email.as_deref(), Some("op@example.org"));
    }

    #[tokio::test]
    async fn test_declined_dispatch_keeps_prior_timestamp() {
        let notifier = Arc::new(FakeNotifier::declining());
        let (ingestor, store) = ingestor_with(notifier);

        let first = (Utc::now() - Duration::hours(13)).to_rfc3339();
        store
            .preload([ServerRecord {
                server_name: "down.example".to_string(),
                status: "offline".to_string(),
                first_offline: Some(first),
                ..Default::default()
            }])
            .await;

        let summary = ingestor.ingest(vec![raw("down.example", "offline")]).await;
        assert!(summary.success);

        let record = store.get("down.example").await.unwrap().unwrap();
        assert_eq!(record.last_notification_sent, None);
    }

    #[tokio::test]
    async fn test_dispatch_transport_failure_isolates_entry() {
        let notifier = Arc::new(FakeNotifier::failing());
        let (ingestor, store) = ingestor_with(notifier);

        let first = (Utc::now() - Duration::hours(13)).to_rfc3339();
        store
            .preload([ServerRecord {
                server_name: "down.example".to_string(),
                status: "offline".to_string(),
                status_message: "old message".to_string(),
                first_offline: Some(first.clone()),
                ..Default::default()
            }])
            .await;

        let summary = ingestor
            .ingest(vec![raw("down.example", "offline"), raw("up.example", "online")])
            .await;
        assert!(!summary.success);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Failed to update down.example"));

        // The failing entry's record is untouched.
        let record = store.get("down.example").await.unwrap().unwrap();
        assert_eq!(record.status_message, "old message");
        assert_eq!(record.last_notification_sent, None);
        // The healthy entry still went through.
        assert!(store.get("up.example").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_below_threshold_does_not_notify() {
        let notifier = Arc::new(FakeNotifier::sending());
        let (ingestor, _store) = ingestor_with(notifier.clone());

        let mut report = raw("down.example", "offline");
        report.last_check = Some(Utc::now().to_rfc3339());
        ingestor.ingest(vec![report]).await;
        assert!(notifier.alerts().is_empty());
    }

    #[test]
    fn test_payload_shapes() {
        let wrapped: IngestPayload =
            serde_json::from_str(r#"{"servers": [{"hostname": "a"}]}"#).unwrap();
        assert_eq!(wrapped.into_reports().len(), 1);

        let bare: IngestPayload = serde_json::from_str(r#"[{"hostname": "a"}]"#).unwrap();
        assert_eq!(bare.into_reports().len(), 1);
    }
}
