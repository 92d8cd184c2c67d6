//! Core domain types and service traits for Reseedwatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The persisted state for one monitored reseed server.
///
/// Timestamps are kept as the strings the probes submitted: upstream checkers
/// emit a mix of RFC 3339 and naive isoformat values, and the classification
/// rules require that an unparseable timestamp degrades rather than errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerRecord {
    /// Unique, stable hostname-like identifier. The sole identity key.
    pub server_name: String,
    /// Raw status token as reported by the probe (lowercased).
    pub status: String,
    /// Free-text message from the probe; may contain sentinel substrings.
    pub status_message: String,
    /// RouterInfo count returned by the last successful check.
    pub router_infos: u32,
    /// Timestamp of the most recent probe.
    pub last_checked: String,
    /// Set when the server is first observed offline-like; cleared on recovery.
    pub first_offline: Option<String>,
    /// Last time an offline alert was dispatched for this server.
    pub last_notification_sent: Option<String>,
    /// Optional per-server notification recipient override.
    pub operator_email: Option<String>,
}

/// A validated, canonical probe report for a single server.
///
/// Produced by the ingestion coordinator from a raw wire entry; guaranteed to
/// carry a non-empty `server_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub server_name: String,
    pub status: String,
    pub status_message: String,
    pub router_infos: u32,
    pub last_checked: String,
}

/// One known outproxy exit point, either a literal address or a subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProxyEntry {
    pub ip_address: Option<String>,
    pub subnet: Option<String>,
    pub proxy_name: Option<String>,
    pub location: Option<String>,
    pub flag_url: Option<String>,
}

/// The data handed to a [`Notifier`] when a server has been offline long
/// enough to warrant an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineAlert {
    pub server_name: String,
    pub status_message: String,
    pub offline_hours: i64,
    /// Operator address that overrides the configured default recipient.
    pub recipient_override: Option<String>,
}

/// Errors surfaced by a [`StatusStore`] implementation.
///
/// Malformed input never reaches the store; this only covers infrastructure
/// failure, which is reported distinctly from validation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Service Traits
// =============================================================================

/// Persistence contract for server records.
///
/// Implementations must provide atomic insert-or-update semantics keyed by
/// `server_name`, and an ordered scan for the status query.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Point lookup by server name.
    async fn get(&self, server_name: &str) -> Result<Option<ServerRecord>, StoreError>;

    /// Inserts the record, replacing any existing record with the same name.
    async fn upsert(&self, record: ServerRecord) -> Result<(), StoreError>;

    /// Full scan ordered by `server_name`, optionally filtered to one name.
    async fn list(&self, filter: Option<&str>) -> Result<Vec<ServerRecord>, StoreError>;
}

/// Dispatches offline alerts to operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempts to deliver an offline alert.
    ///
    /// # Returns
    /// * `Ok(true)` if the alert was accepted by the delivery service
    /// * `Ok(false)` if dispatch was declined (not configured, or the service
    ///   rejected the message) - the caller keeps its prior notification state
    /// * `Err` for transport failures
    async fn send_offline_alert(&self, alert: &OfflineAlert) -> Result<bool>;
}

/// Source of the known-outproxy table.
///
/// The table is configuration data; implementations re-read their source of
/// truth on every call so edits take effect without a restart.
#[async_trait]
pub trait ProxyDirectory: Send + Sync {
    async fn entries(&self) -> Result<Vec<ProxyEntry>>;
}

/// Read access to downloadable reseed artifacts (`.su3` bundles).
///
/// The core only consults this to decide whether a download affordance should
/// be surfaced for a server; the artifacts themselves are produced elsewhere.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// The public download URL for a server's artifact, if one is stored.
    fn download_url(&self, server_name: &str) -> Option<String>;

    /// Reads the artifact stored under `key`, if present.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Maps a server name to its artifact key: dots become underscores, with the
/// `.su3` suffix appended.
pub fn artifact_key(server_name: &str) -> String {
    format!("{}.su3", server_name.replace('.', "_"))
}
