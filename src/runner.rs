use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::AsyncBufRead;

use crate::client::BackpackClient;
use crate::config::{Credentials, LogConfig, Settings};
use crate::control::ControlState;
use crate::errors::{Error, Result};
use crate::exchange::{Exchange, FlattenReport};
use crate::listener::SharedLines;
use crate::status::AccountSnapshot;
use crate::volume::{RunSummary, VolumeController, VolumeParams};

/// Initialise env_logger at the configured level unless `RUST_LOG` is set
pub fn init_logging(log: &LogConfig) {
    let env = env_logger::Env::default().default_filter_or(log.level.as_str());
    if env_logger::Builder::from_env(env).try_init().is_err() {
        warn!("Logger already initialised");
    }
}

/// Runner for the volume bot: one client, one set of control flags
pub struct BotRunner<E: Exchange = BackpackClient> {
    settings: Settings,
    exchange: Arc<E>,
    controller: VolumeController<E>,
}

impl BotRunner<BackpackClient> {
    /// Create a runner from a configuration file and credentials.
    ///
    /// The client is simulated when the credentials are incomplete or invalid.
    pub fn new(config_path: impl AsRef<Path>, credentials: &Credentials) -> Result<Self> {
        let path = config_path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| Error::Config(format!("config path is not UTF-8: {}", path.display())))?;
        Ok(Self::from_settings(Settings::new(path)?, credentials))
    }

    pub fn from_settings(settings: Settings, credentials: &Credentials) -> Self {
        let client = BackpackClient::new(credentials, &settings.network);
        Self::with_exchange(settings, client)
    }

    pub fn is_simulated(&self) -> bool {
        self.exchange.is_simulated()
    }
}

impl<E: Exchange> BotRunner<E> {
    pub fn with_exchange(settings: Settings, exchange: E) -> Self {
        let exchange = Arc::new(exchange);
        let controller = VolumeController::new(exchange.clone(), Arc::new(ControlState::new()));
        Self {
            settings,
            exchange,
            controller,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn exchange(&self) -> &Arc<E> {
        &self.exchange
    }

    pub fn control(&self) -> &Arc<ControlState> {
        self.controller.control()
    }

    /// Default volume parameters from the configuration
    pub fn default_params(&self) -> VolumeParams {
        self.settings.volume.clone()
    }

    pub async fn status(&self, symbol: &str) -> AccountSnapshot {
        AccountSnapshot::fetch(self.exchange.as_ref(), symbol).await
    }

    /// Run volume trading while listening for operator commands on `lines`
    pub async fn run_volume<R>(
        &self,
        params: &VolumeParams,
        lines: SharedLines<R>,
    ) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let summary = self.controller.run_with_input(params, lines).await?;
        info!(
            "Run ended ({:?}): {} cycles, {} orders, {} failed",
            summary.exit, summary.cycles_started, summary.orders_submitted, summary.orders_failed
        );
        Ok(summary)
    }

    pub async fn close_all_positions(&self, symbol: &str) -> FlattenReport {
        self.exchange.close_all_positions(symbol).await
    }
}
