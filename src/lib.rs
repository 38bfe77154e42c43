#![deny(unreachable_pub)]
//! Signed REST client and volume trading loop for the Backpack exchange.
//!
//! The client signs every request with an Ed25519 key, or runs fully
//! simulated when no usable credentials are configured. The volume loop
//! alternates buy and sell bursts and is steered by single-letter operator
//! commands read from stdin.

pub mod client;
pub mod config;
mod consts;
pub mod control;
mod errors;
pub mod exchange;
pub mod listener;
pub mod req;
pub mod runner;
pub mod signature;
pub mod simulation;
pub mod status;
pub mod types;
pub mod volume;

pub use client::BackpackClient;
pub use config::{Credentials, Settings};
pub use consts::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_WINDOW_MS, FLATTEN_EPSILON, MAINNET_API_URL, PAUSE_POLL_INTERVAL,
};
pub use control::{ControlCommand, ControlState, Halt};
pub use errors::{Error, Result};
pub use exchange::{Exchange, FlattenOrder, FlattenReport};
pub use listener::{shared_lines, stdin_lines, InputListener, SharedLines};
pub use req::{Dispatcher, HttpMethod};
pub use runner::BotRunner;
pub use signature::{AuthHeaders, RequestSigner};
pub use status::AccountSnapshot;
pub use types::{Balance, Instruction, OpenOrder, OrderRecord, OrderType, Position, Side};
pub use volume::{RunExit, RunState, RunSummary, VolumeController, VolumeParams};
