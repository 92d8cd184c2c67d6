//! Classification of a visitor address against the known-outproxy table.

use crate::core::{ProxyDirectory, ProxyEntry};
use crate::subnet::is_in_subnet;
use anyhow::{Context, Result};
use async_trait::async_trait;
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_PROXY_NAME: &str = "I2P Outproxy";
pub const DEFAULT_PROXY_LOCATION: &str = "Unknown Location";

/// The outcome of a proxy check for one visitor address.
///
/// Field names follow the public wire shape of the proxy-check endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyVerdict {
    pub is_using_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<ProxyDebug>,
}

/// Diagnostic detail attached only when debug mode is configured.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDebug {
    pub visitor_ip: String,
    pub checked_ips: Vec<String>,
    pub checked_subnets: Vec<String>,
    /// Request headers, filled in by the HTTP layer.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

struct ProxyMeta {
    name: String,
    location: String,
    flag: String,
}

/// Matches visitor addresses against known proxy exits.
pub struct ProxyClassifier {
    default_flag: String,
    debug: bool,
}

impl ProxyClassifier {
    pub fn new(default_flag: impl Into<String>, debug: bool) -> Self {
        Self {
            default_flag: default_flag.into(),
            debug,
        }
    }

    /// Classifies a visitor address against the proxy table.
    ///
    /// Exact address matches win; otherwise the subnets are scanned in table
    /// order and the first containing subnet marks the visitor as proxied.
    /// Display metadata for a subnet hit is recovered best-effort from the
    /// first known address inside that subnet; when none is, generic fallback
    /// values are used. Never fails - malformed table rows simply don't match.
    pub fn classify(&self, visitor_ip: &str, entries: &[ProxyEntry]) -> ProxyVerdict {
        let mut metadata: HashMap<&str, ProxyMeta> = HashMap::new();
        let mut addresses: Vec<&str> = Vec::new();
        let mut subnets: Vec<&str> = Vec::new();

        for entry in entries {
            if let Some(address) = entry.ip_address.as_deref() {
                if !address.is_empty() {
                    addresses.push(address);
                    metadata.insert(
                        address,
                        ProxyMeta {
                            name: entry
                                .proxy_name
                                .clone()
                                .unwrap_or_else(|| DEFAULT_PROXY_NAME.to_string()),
                            location: entry
                                .location
                                .clone()
                                .unwrap_or_else(|| DEFAULT_PROXY_LOCATION.to_string()),
                            flag: entry
                                .flag_url
                                .clone()
                                .unwrap_or_else(|| self.default_flag.clone()),
                        },
                    );
                }
            }
            if let Some(subnet) = entry.subnet.as_deref() {
                if !subnet.is_empty() && !subnets.contains(&subnet) {
                    subnets.push(subnet);
                }
            }
        }

        let mut matched: Option<&str> = addresses
            .contains(&visitor_ip)
            .then_some(visitor_ip);
        let mut is_using_proxy = matched.is_some();

        if !is_using_proxy && !visitor_ip.is_empty() {
            for subnet in &subnets {
                if is_in_subnet(visitor_ip, subnet) {
                    is_using_proxy = true;
                    matched = addresses
                        .iter()
                        .copied()
                        .find(|address| is_in_subnet(address, subnet));
                    break;
                }
            }
        }

        let mut verdict = ProxyVerdict {
            is_using_proxy,
            ..Default::default()
        };

        if is_using_proxy {
            let meta = matched.and_then(|address| metadata.get(address));
            verdict.proxy_name = Some(
                meta.map(|m| m.name.clone())
                    .unwrap_or_else(|| DEFAULT_PROXY_NAME.to_string()),
            );
            verdict.proxy_location = Some(
                meta.map(|m| m.location.clone())
                    .unwrap_or_else(|| DEFAULT_PROXY_LOCATION.to_string()),
            );
            verdict.proxy_flag =
                Some(meta.map(|m| m.flag.clone()).unwrap_or_else(|| self.default_flag.clone()));
        }

        if self.debug {
            verdict.debug = Some(ProxyDebug {
                visitor_ip: visitor_ip.to_string(),
                checked_ips: addresses.iter().map(|s| s.to_string()).collect(),
                checked_subnets: subnets.iter().map(|s| s.to_string()).collect(),
                headers: HashMap::new(),
            });
        }

        verdict
    }
}

// =============================================================================
// Directory implementations
// =============================================================================

#[derive(Debug, Deserialize, Default)]
struct ProxyTable {
    #[serde(default)]
    proxies: Vec<ProxyEntry>,
}

/// A [`ProxyDirectory`] backed by a TOML table file.
///
/// The file is re-read on every call, so table edits take effect on the next
/// request. An unconfigured directory yields an empty table.
pub struct FileProxyDirectory {
    path: Option<PathBuf>,
}

impl FileProxyDirectory {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ProxyDirectory for FileProxyDirectory {
    async fn entries(&self) -> Result<Vec<ProxyEntry>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let table: ProxyTable = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .with_context(|| format!("Failed to read proxy table: {}", path.display()))?;
        Ok(table.proxies)
    }
}
