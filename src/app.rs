//! Composition root: picks the conversion backend and persistence variant once
//! and hands out sessions wired to them.

use crate::convert::{
    CloudinaryClient, ConversionService, LocalConversionService, SimulatedConversionService,
};
use crate::models::{Config, ConversionBackend, Platform};
use crate::persist::{BrowserPersistence, DevicePersistence, DownloadRequest, PersistenceAdapter};
use crate::session::ConversionSession;
use crate::Result;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

pub struct App {
    service: Arc<dyn ConversionService>,
    persistence: Arc<dyn PersistenceAdapter>,
    platform: Platform,
    downloads: Option<mpsc::UnboundedReceiver<DownloadRequest>>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub service: Arc<dyn ConversionService>,
    pub persistence: Arc<dyn PersistenceAdapter>,
}

impl App {
    pub fn with_services(services: AppServices, platform: Platform) -> Self {
        Self {
            service: services.service,
            persistence: services.persistence,
            platform,
            downloads: None,
        }
    }

    /// Construct an app from environment configuration (`Config::from_env`).
    pub fn from_env() -> Result<Self> {
        Self::new(&Config::from_env()?)
    }

    pub fn new(config: &Config) -> Result<Self> {
        // Reuse one HTTP connection pool across backends and adapters.
        let http_client = Client::builder()
            .timeout(config.conversion_timeout)
            .build()?;

        let service: Arc<dyn ConversionService> = match config.backend {
            ConversionBackend::Simulated => {
                info!(
                    "Conversion backend: simulated ({:?} delay)",
                    config.simulated_delay
                );
                Arc::new(SimulatedConversionService::new(config.simulated_delay))
            }
            ConversionBackend::Local => {
                info!(
                    "Conversion backend: local (output: {})",
                    config.output_dir.display()
                );
                Arc::new(LocalConversionService::new_with_client(
                    &config.output_dir,
                    http_client.clone(),
                ))
            }
            ConversionBackend::Cloudinary => {
                let credentials = config.cloudinary_credentials()?;
                info!("Conversion backend: Cloudinary (cloud: {})", credentials.cloud_name);
                Arc::new(
                    CloudinaryClient::new_with_client(credentials, http_client.clone())
                        .with_base_url(config.cloudinary_base_url.clone()),
                )
            }
        };

        let mut downloads = None;
        let persistence: Arc<dyn PersistenceAdapter> = match config.platform {
            Platform::Web => {
                info!("Persistence: browser downloads");
                let (adapter, receiver) = BrowserPersistence::channel();
                downloads = Some(receiver);
                Arc::new(adapter)
            }
            Platform::Native => {
                info!("Persistence: device cache at {}", config.cache_dir.display());
                Arc::new(DevicePersistence::new_with_client(
                    &config.cache_dir,
                    http_client,
                ))
            }
        };

        let mut app = Self::with_services(
            AppServices {
                service,
                persistence,
            },
            config.platform,
        );
        app.downloads = downloads;
        Ok(app)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Hands over the queue of browser downloads. `None` off the web or once taken.
    pub fn take_downloads(&mut self) -> Option<mpsc::UnboundedReceiver<DownloadRequest>> {
        self.downloads.take()
    }

    pub fn new_session(&self) -> ConversionSession {
        let session = ConversionSession::new(self.service.clone(), self.persistence.clone());
        info!("Created conversion session {}", session.id());
        session
    }
}
