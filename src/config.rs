//! Configuration management for Reseedwatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `reseedwatch.toml` file, environment variables
//! and command-line arguments into one explicitly constructed value that is
//! passed into each component at startup.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// HTTP server settings.
    pub http: HttpConfig,
    /// Shared-secret authorization for write endpoints.
    pub auth: AuthConfig,
    /// Status classification and alerting thresholds.
    pub monitoring: MonitoringConfig,
    /// Offline-alert delivery settings.
    pub notification: NotificationConfig,
    /// Outproxy detection settings.
    pub proxy: ProxyConfig,
    /// Downloadable reseed bundle settings.
    pub artifacts: ArtifactsConfig,
}

/// HTTP server settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// The address the API server binds to.
    pub listen_addr: String,
}

/// Shared-secret authorization for write endpoints.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token required on ingestion-like writes. With no token
    /// configured, every write is rejected.
    pub api_token: Option<String>,
}

/// Status classification and alerting thresholds.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitoringConfig {
    /// Hours a server must be offline before the first alert.
    pub offline_threshold_hours: i64,
    /// Minimum hours between two alerts for the same server.
    pub notification_cooldown_hours: i64,
    /// Anchor servers that always display as online regardless of probe
    /// input.
    #[serde(default)]
    pub always_online: Vec<String>,
}

/// Offline-alert delivery settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    /// The mail API endpoint (Resend-compatible).
    pub api_url: String,
    /// API key; alerts are silently skipped when unset.
    pub api_key: Option<String>,
    /// Sender address.
    pub from: String,
    /// Default recipient; a comma-separated list is allowed. Per-server
    /// operator addresses override this.
    pub recipient: Option<String>,
    /// Optional reply-to address.
    pub reply_to: Option<String>,
}

/// Outproxy detection settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProxyConfig {
    /// Path to the TOML file holding the known-outproxy table.
    pub table_path: Option<PathBuf>,
    /// Attach diagnostic detail to proxy-check responses. Never enable in
    /// production.
    pub debug: bool,
    /// Icon used when a proxy entry carries none.
    pub default_flag: String,
}

/// Downloadable reseed bundle settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArtifactsConfig {
    /// Directory holding `.su3` bundles; download links are omitted when
    /// unset.
    pub directory: Option<PathBuf>,
    /// Public URL prefix for download links.
    pub public_base: String,
}

impl Config {
    /// Loads the configuration by layering sources: defaults, the TOML file,
    /// `RESEEDWATCH_`-prefixed environment variables, and CLI arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found at specified path: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        } else {
            figment = figment.merge(Toml::file("reseedwatch.toml"));
        }
        let config = figment
            // Allow overriding with environment variables, e.g.
            // RESEEDWATCH_AUTH__API_TOKEN=...
            .merge(Env::prefixed("RESEEDWATCH_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            http: HttpConfig {
                listen_addr: "127.0.0.1:8080".to_string(),
            },
            auth: AuthConfig::default(),
            monitoring: MonitoringConfig {
                offline_threshold_hours: 12,
                notification_cooldown_hours: 24,
                always_online: vec!["reseed.diva.exchange".to_string()],
            },
            notification: NotificationConfig {
                api_url: "https://api.resend.com/emails".to_string(),
                api_key: None,
                from: "Reseedwatch <notifications@checki2p.com>".to_string(),
                recipient: None,
                reply_to: None,
            },
            proxy: ProxyConfig {
                table_path: None,
                debug: false,
                default_flag: "/assets/images/i2p.svg".to_string(),
            },
            artifacts: ArtifactsConfig {
                directory: None,
                public_base: "/api/download".to_string(),
            },
        }
    }
}
