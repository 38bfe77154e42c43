//! Operator input listener
//!
//! Reads `p` / `r` / `q` / `c` lines while a volume run is active and flips
//! the matching [`ControlState`] flags. The line source is shared with the
//! menu, so it sits behind a mutex; `next_line` is cancel safe and aborting
//! the listener mid-read loses nothing.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::control::{ControlCommand, ControlState};

/// Line source shared between the menu and the listener
pub type SharedLines<R> = Arc<Mutex<Lines<R>>>;

pub fn shared_lines<R: AsyncBufRead>(reader: R) -> SharedLines<R> {
    Arc::new(Mutex::new(reader.lines()))
}

/// Shared line reader over the process stdin
pub fn stdin_lines() -> SharedLines<BufReader<Stdin>> {
    shared_lines(BufReader::new(tokio::io::stdin()))
}

/// Handle to a running listener task
pub struct InputListener {
    handle: JoinHandle<()>,
}

impl InputListener {
    pub fn spawn<R>(lines: SharedLines<R>, control: Arc<ControlState>) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            handle: tokio::spawn(listen(lines, control)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait for it to go away
    pub async fn shutdown(self) {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Input listener ended abnormally: {e}"),
        }
    }
}

async fn listen<R>(lines: SharedLines<R>, control: Arc<ControlState>)
where
    R: AsyncBufRead + Unpin + Send,
{
    loop {
        let next = lines.lock().await.next_line().await;
        match next {
            Ok(Some(line)) => {
                let Some(command) = ControlCommand::parse(&line) else {
                    continue;
                };
                control.apply(command);
                match command {
                    ControlCommand::Pause => info!("[Paused - press r to resume]"),
                    ControlCommand::Resume => info!("[Resumed]"),
                    ControlCommand::Stop => info!("[Stop scheduled]"),
                    ControlCommand::CloseAndStop => info!("[Close positions and stop scheduled]"),
                }
            }
            Ok(None) => {
                debug!("Operator input closed");
                std::future::pending::<()>().await;
            }
            Err(e) => {
                warn!("Failed to read operator input: {e}");
                std::future::pending::<()>().await;
            }
        }
    }
}
