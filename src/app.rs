//! The main application logic, decoupled from the entry point.

use crate::api::{router, AppState};
use crate::artifacts::DiskArtifacts;
use crate::config::Config;
use crate::core::{ArtifactStore, Notifier, ProxyDirectory, StatusStore};
use crate::ingest::Ingestor;
use crate::notification::ResendMailer;
use crate::offline::OfflinePolicy;
use crate::proxy::FileProxyDirectory;
use crate::status::StatusRules;
use crate::storage::MemoryStore;
use anyhow::Result;
use log::{info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// A fully wired application, ready to serve.
pub struct App {
    state: AppState,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The handler state, exposed for tests that drive components directly.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves the API on the listener until the shutdown signal fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let app = router(self.state);
        info!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;
        Ok(())
    }
}

/// Builder for the main application.
///
/// This pattern allows for a clean separation of concerns between
/// constructing the application's components and running the application. It
/// also provides a convenient way to override components for testing.
pub struct AppBuilder {
    config: Config,
    store_override: Option<Arc<dyn StatusStore>>,
    notifier_override: Option<Arc<dyn Notifier>>,
    proxies_override: Option<Arc<dyn ProxyDirectory>>,
    artifacts_override: Option<Arc<dyn ArtifactStore>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store_override: None,
            notifier_override: None,
            proxies_override: None,
            artifacts_override: None,
        }
    }

    /// Overrides the status store for testing.
    pub fn store_override(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    /// Overrides the notifier for testing.
    pub fn notifier_override(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier_override = Some(notifier);
        self
    }

    /// Overrides the proxy directory for testing.
    pub fn proxies_override(mut self, proxies: Arc<dyn ProxyDirectory>) -> Self {
        self.proxies_override = Some(proxies);
        self
    }

    /// Overrides the artifact store for testing.
    pub fn artifacts_override(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts_override = Some(artifacts);
        self
    }

    pub fn build(self) -> Result<App> {
        let config = Arc::new(self.config);

        let store = self
            .store_override
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let notifier = self
            .notifier_override
            .unwrap_or_else(|| Arc::new(ResendMailer::new(&config.notification)));
        let proxies = self
            .proxies_override
            .unwrap_or_else(|| Arc::new(FileProxyDirectory::new(config.proxy.table_path.clone())));
        let artifacts = self.artifacts_override.unwrap_or_else(|| {
            Arc::new(DiskArtifacts::new(
                config.artifacts.directory.clone(),
                config.artifacts.public_base.clone(),
            ))
        });

        let policy = OfflinePolicy {
            threshold_hours: config.monitoring.offline_threshold_hours,
            cooldown_hours: config.monitoring.notification_cooldown_hours,
        };
        let ingestor = Arc::new(Ingestor::new(store.clone(), notifier, policy));
        let rules = Arc::new(StatusRules::new(config.monitoring.always_online.clone()));

        // The recorder is process-global; a second App in the same process
        // (tests) runs without the /metrics endpoint.
        let metrics_handle = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        };

        Ok(App {
            state: AppState {
                config,
                store,
                ingestor,
                proxies,
                artifacts,
                rules,
                metrics_handle,
            },
        })
    }
}
