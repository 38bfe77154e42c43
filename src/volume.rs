//! Volume trading loop
//!
//! A run repeats cycles of one buy burst followed by one sell burst, each
//! burst being `order_count` sequential market orders separated by a random
//! delay. Control flags are consulted at every check point: right before each
//! order and throughout each delay.
//!
//! ```text
//! Running <-> Paused
//!    |          |
//!    +-> Stopping ---------------+
//!    +-> ClosingPositions -------+--> Done (flags reset)
//!    +-> (cycles exhausted) -----+
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};

use crate::consts::PAUSE_POLL_INTERVAL;
use crate::control::{ControlState, Halt};
use crate::errors::{Error, Result};
use crate::exchange::{Exchange, FlattenReport};
use crate::listener::{InputListener, SharedLines};
use crate::types::{OrderType, Side};

/// Parameters of one volume run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolumeParams {
    /// Base asset, e.g. "SOL"
    pub symbol: String,
    /// Quantity of every order
    pub size: f64,
    /// Orders per burst
    pub order_count: u32,
    /// Number of cycles, 0 = until stopped
    pub cycles: u32,
    /// Delay bounds between orders, in seconds
    pub interval_min: f64,
    pub interval_max: f64,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            symbol: "SOL".to_string(),
            size: 0.01,
            order_count: 1,
            cycles: 1,
            interval_min: 1.0,
            interval_max: 3.0,
        }
    }
}

impl VolumeParams {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::InvalidParams("symbol must not be empty".into()));
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(Error::InvalidParams(format!(
                "order size must be positive, got {}",
                self.size
            )));
        }
        if self.order_count < 1 {
            return Err(Error::InvalidParams("order count must be at least 1".into()));
        }
        let min_ok = self.interval_min.is_finite() && self.interval_min >= 0.0;
        let max_ok = self.interval_max.is_finite() && self.interval_max >= 0.0;
        if !min_ok || !max_ok || self.interval_min > self.interval_max {
            return Err(Error::InvalidParams(format!(
                "delay bounds must satisfy 0 <= min <= max, got [{}, {}]",
                self.interval_min, self.interval_max
            )));
        }
        Ok(())
    }

    pub fn is_unbounded(&self) -> bool {
        self.cycles == 0
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopping,
    ClosingPositions,
    /// Run finished; also the state between runs
    Done,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Completed,
    Stopped,
    ClosedAndStopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub cycles_started: u32,
    pub orders_submitted: u32,
    pub orders_failed: u32,
    pub exit: RunExit,
    /// Set when the run ended with close-and-stop
    pub flatten: Option<FlattenReport>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            cycles_started: 0,
            orders_submitted: 0,
            orders_failed: 0,
            exit: RunExit::Completed,
            flatten: None,
        }
    }
}

/// Resets the flags and marks the run done however `run` is left
struct DoneGuard<'a, E: Exchange> {
    controller: &'a VolumeController<E>,
}

impl<E: Exchange> Drop for DoneGuard<'_, E> {
    fn drop(&mut self) {
        self.controller.control.reset();
        self.controller.set_state(RunState::Done);
    }
}

/// Runs buy/sell bursts against an [`Exchange`]
pub struct VolumeController<E: Exchange> {
    exchange: Arc<E>,
    control: Arc<ControlState>,
    state_tx: watch::Sender<RunState>,
}

impl<E: Exchange> VolumeController<E> {
    pub fn new(exchange: Arc<E>, control: Arc<ControlState>) -> Self {
        let (state_tx, _) = watch::channel(RunState::Done);
        Self {
            exchange,
            control,
            state_tx,
        }
    }

    pub fn control(&self) -> &Arc<ControlState> {
        &self.control
    }

    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, next: RunState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            debug!("Volume state: {prev:?} -> {next:?}");
        }
    }

    /// Run with an operator input listener attached for the whole run
    pub async fn run_with_input<R>(
        &self,
        params: &VolumeParams,
        lines: SharedLines<R>,
    ) -> Result<RunSummary>
    where
        R: tokio::io::AsyncBufRead + Unpin + Send + 'static,
    {
        params.validate()?;
        info!("Controls: p=pause, r=resume, q=stop, c=close positions and stop");

        let listener = InputListener::spawn(lines, self.control.clone());
        let result = self.run(params).await;
        listener.shutdown().await;
        // A command typed between the end of the run and the listener going away
        self.control.reset();
        result
    }

    /// Run the cycle loop until it is exhausted or the operator halts it
    pub async fn run(&self, params: &VolumeParams) -> Result<RunSummary> {
        let _done = DoneGuard { controller: self };
        params.validate()?;

        let cycles = if params.is_unbounded() {
            "unbounded".to_string()
        } else {
            params.cycles.to_string()
        };
        info!(
            "Volume trading started: {} | size={} | orders={} | cycles={}",
            params.symbol, params.size, params.order_count, cycles
        );

        self.set_state(RunState::Running);
        let mut summary = RunSummary::new();

        match self.run_cycles(params, &mut summary).await {
            None => {
                summary.exit = RunExit::Completed;
                info!("Volume trading complete");
            }
            Some(Halt::Stop) => {
                summary.exit = RunExit::Stopped;
                info!("Stop requested, volume trading ended");
            }
            Some(Halt::CloseAndStop) => {
                summary.exit = RunExit::ClosedAndStopped;
                info!("Close and stop requested");
                summary.flatten = Some(self.exchange.close_all_positions(&params.symbol).await);
                info!("Volume trading ended after closing positions");
            }
        }

        Ok(summary)
    }

    async fn run_cycles(&self, params: &VolumeParams, summary: &mut RunSummary) -> Option<Halt> {
        let mut cycle = 0u32;

        while params.is_unbounded() || cycle < params.cycles {
            if let Some(halt) = self.halt_requested() {
                return Some(halt);
            }

            cycle += 1;
            summary.cycles_started = cycle;
            info!("--- Cycle {cycle} ---");

            for side in [Side::Bid, Side::Ask] {
                for index in 1..=params.order_count {
                    if let Some(halt) = self.checkpoint().await {
                        return Some(halt);
                    }
                    self.submit(params, side, index, summary).await;
                    if let Some(halt) = self.delay(params).await {
                        return Some(halt);
                    }
                }
            }
        }
        None
    }

    /// Check the flags and record the matching state
    fn halt_requested(&self) -> Option<Halt> {
        let halt = self.control.halt();
        match halt {
            Some(Halt::Stop) => self.set_state(RunState::Stopping),
            Some(Halt::CloseAndStop) => self.set_state(RunState::ClosingPositions),
            None => {}
        }
        halt
    }

    /// Pre-order check point: waits out a pause, returns a pending halt
    async fn checkpoint(&self) -> Option<Halt> {
        loop {
            let notified = self.control.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(halt) = self.halt_requested() {
                return Some(halt);
            }
            if !self.sync_pause_state() {
                return None;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = sleep(PAUSE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Move between Running and Paused to match the pause flag
    fn sync_pause_state(&self) -> bool {
        let paused = self.control.is_paused();
        match (paused, self.state()) {
            (true, RunState::Paused) | (false, RunState::Running) => {}
            (true, _) => {
                info!("Paused");
                self.set_state(RunState::Paused);
            }
            (false, _) => {
                info!("Resumed");
                self.set_state(RunState::Running);
            }
        }
        paused
    }

    /// Random inter-order delay, cut short by a halt.
    ///
    /// A delay too long to schedule lasts until the run is halted.
    async fn delay(&self, params: &VolumeParams) -> Option<Halt> {
        let secs = random_delay(params.interval_min, params.interval_max);
        let deadline = Duration::try_from_secs_f64(secs)
            .ok()
            .and_then(|d| Instant::now().checked_add(d));
        if deadline.is_none() {
            warn!("Delay of {secs}s is out of range, waiting for stop");
        }

        loop {
            let notified = self.control.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(halt) = self.halt_requested() {
                return Some(halt);
            }
            self.sync_pause_state();
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = sleep_until_opt(deadline) => {}
            }
        }
    }

    async fn submit(
        &self,
        params: &VolumeParams,
        side: Side,
        index: u32,
        summary: &mut RunSummary,
    ) {
        let label = match side {
            Side::Bid => "Buy",
            Side::Ask => "Sell",
        };
        summary.orders_submitted += 1;

        match self
            .exchange
            .execute_order(&params.symbol, side, params.size, OrderType::Market, None)
            .await
        {
            Ok(record) => info!(
                "  {label} {index}/{}: success ({})",
                params.order_count, record.status
            ),
            Err(e) => {
                summary.orders_failed += 1;
                warn!("  {label} {index}/{}: failed ({e})", params.order_count);
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Uniform delay in `[min, max]` seconds
fn random_delay(min: f64, max: f64) -> f64 {
    if max <= min {
        return min.max(0.0);
    }
    rand::rng().random_range(min..=max)
}
