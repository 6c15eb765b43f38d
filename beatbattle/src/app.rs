//! Service wiring.
//!
//! [`App`] builds the gateway, resolver, tally engine and contest board
//! from a [`BattleConfig`] so the CLI and integration tests share one
//! construction path.

use std::sync::Arc;

use tracing::info;

use crate::board::ContestBoard;
use crate::clock::{Clock, SystemClock};
use crate::config::BattleConfig;
use crate::error::Result;
use crate::gateway::{self, Gateway};
use crate::observability::{EventEmitter, init_metrics};
use crate::status::StatusResolver;
use crate::tally::TallyEngine;

/// The wired services of one process.
#[derive(Debug, Clone)]
pub struct App {
    config: Arc<BattleConfig>,
    board: ContestBoard,
    engine: TallyEngine,
}

impl App {
    /// Opens the configured gateway and wires the services on the system
    /// clock.
    ///
    /// Installs the Prometheus exporter when `metrics.port` is set and opens
    /// the event file when `events.file` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter, the event file or the database
    /// cannot be opened.
    pub async fn build(config: BattleConfig) -> Result<Self> {
        if let Some(port) = config.metrics.port {
            init_metrics(Some(port))?;
            info!(port, "Prometheus metrics endpoint started");
        }

        let events = match config.events.file {
            Some(ref path) => EventEmitter::from_file(path)?,
            None => EventEmitter::noop(),
        };

        let gateway = gateway::open(&config.database, config.tally.transaction_timeout).await?;
        info!(url = %config.database.url, "gateway ready");

        Ok(Self::with_parts(
            config,
            gateway,
            Arc::new(SystemClock),
            Arc::new(events),
        ))
    }

    /// Wires the services over an existing gateway and clock.
    #[must_use]
    pub fn with_parts(
        config: BattleConfig,
        gateway: Arc<dyn Gateway>,
        clock: Arc<dyn Clock>,
        events: Arc<EventEmitter>,
    ) -> Self {
        let resolver = StatusResolver::new(gateway, clock)
            .with_remainder(config.display.remainder)
            .with_events(events);
        let engine = TallyEngine::new(resolver.clone())
            .with_transaction_timeout(config.tally.transaction_timeout);

        Self {
            config: Arc::new(config),
            board: ContestBoard::new(resolver),
            engine,
        }
    }

    /// Returns the configuration the services were built from.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Returns the contest board.
    #[must_use]
    pub const fn board(&self) -> &ContestBoard {
        &self.board
    }

    /// Returns the status resolver.
    #[must_use]
    pub const fn resolver(&self) -> &StatusResolver {
        self.board.resolver()
    }

    /// Returns the tally engine.
    #[must_use]
    pub const fn engine(&self) -> &TallyEngine {
        &self.engine
    }
}
