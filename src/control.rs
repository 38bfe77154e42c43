//! Operator control flags shared by the volume loop and the input listener

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Operator command read from the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// `p`
    Pause,
    /// `r`
    Resume,
    /// `q`
    Stop,
    /// `c`
    CloseAndStop,
}

impl ControlCommand {
    /// Parse one input line. Unknown input yields None.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "p" => Some(ControlCommand::Pause),
            "r" => Some(ControlCommand::Resume),
            "q" => Some(ControlCommand::Stop),
            "c" => Some(ControlCommand::CloseAndStop),
            _ => None,
        }
    }
}

/// Why a run is ending early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Stop,
    CloseAndStop,
}

/// Run control flags.
///
/// The listener only sets flags, the volume loop only reads them and resets
/// them when a run ends. Every change wakes tasks waiting on [`Self::notified`].
#[derive(Debug, Default)]
pub struct ControlState {
    paused: AtomicBool,
    stop_requested: AtomicBool,
    close_and_stop: AtomicBool,
    changed: Notify,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::Pause => self.paused.store(true, Ordering::SeqCst),
            ControlCommand::Resume => self.paused.store(false, Ordering::SeqCst),
            ControlCommand::Stop => self.stop_requested.store(true, Ordering::SeqCst),
            ControlCommand::CloseAndStop => self.close_and_stop.store(true, Ordering::SeqCst),
        }
        self.changed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_close_and_stop(&self) -> bool {
        self.close_and_stop.load(Ordering::SeqCst)
    }

    /// Pending halt, if any. Close-and-stop wins over a plain stop.
    pub fn halt(&self) -> Option<Halt> {
        if self.is_close_and_stop() {
            Some(Halt::CloseAndStop)
        } else if self.is_stop_requested() {
            Some(Halt::Stop)
        } else {
            None
        }
    }

    /// Clear every flag
    pub fn reset(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
        self.close_and_stop.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// True if no flag is set
    pub fn is_clear(&self) -> bool {
        !self.is_paused() && self.halt().is_none()
    }

    /// Future that completes on the next flag change
    pub fn notified(&self) -> Notified<'_> {
        self.changed.notified()
    }
}
