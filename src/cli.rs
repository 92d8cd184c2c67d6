//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are parsed at startup and then merged
//! with the configuration from the `reseedwatch.toml` file and environment
//! variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// A reseed-server status monitor and outproxy detector.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the API server binds to.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Hours a server must be offline before the first alert.
    #[arg(long, value_name = "HOURS")]
    pub offline_threshold: Option<i64>,

    /// Path to the known-outproxy table.
    #[arg(long, value_name = "FILE")]
    pub proxy_table: Option<PathBuf>,

    /// Attach diagnostic detail to proxy-check responses.
    #[arg(long)]
    pub proxy_debug: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(listen) = &self.listen {
            dict.insert("http.listen_addr".into(), Value::from(listen.clone()));
        }

        if let Some(threshold) = self.offline_threshold {
            dict.insert(
                "monitoring.offline_threshold_hours".into(),
                Value::from(threshold),
            );
        }

        if let Some(table) = &self.proxy_table {
            dict.insert(
                "proxy.table_path".into(),
                Value::from(table.display().to_string()),
            );
        }

        // The flag only ever turns debug on; absence leaves the configured
        // value in place.
        if self.proxy_debug {
            dict.insert("proxy.debug".into(), Value::from(true));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
