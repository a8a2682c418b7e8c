use std::sync::Arc;

use crate::app::error::{Result, SyncError};
use crate::config::{Config, ServerConfig};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::sync::{SyncDelegate, Syncer};

pub struct AppContext {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::with_config(&config.http)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn server(&self) -> &ServerConfig {
        &self.config.server
    }

    /// Build a syncer for the configured server, reporting to `delegate`.
    pub fn syncer(&self, delegate: Arc<dyn SyncDelegate>) -> Result<Syncer> {
        if self.config.server.path.is_empty() {
            return Err(SyncError::Config(
                "No server path configured; set [server] path or pass --server".into(),
            ));
        }
        Ok(Syncer::new(
            self.config.server.to_sync_config(),
            self.fetcher.clone(),
            delegate,
        ))
    }
}
