//! Operator keys read from stdin or injected through a channel.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info};

const KEY_QUEUE: usize = 16;
const ESC: char = '\u{1b}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Char(char),
}

impl Key {
    /// Escape, `q` and `Q` stop the scan loop.
    pub fn is_stop(&self) -> bool {
        matches!(self, Key::Escape | Key::Char('q') | Key::Char('Q'))
    }
}

/// Map one line typed on the terminal to a key.
pub fn parse_line(line: &str) -> Option<Key> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.starts_with(ESC) || line.trim().eq_ignore_ascii_case("esc") {
        return Some(Key::Escape);
    }
    line.trim().chars().next().map(Key::Char)
}

/// Operator keys, polled without blocking once per scan iteration.
pub struct OperatorInput {
    rx: mpsc::Receiver<Key>,
}

impl OperatorInput {
    /// Input fed by the returned sender.
    pub fn channel() -> (mpsc::Sender<Key>, Self) {
        let (tx, rx) = mpsc::channel(KEY_QUEUE);
        (tx, Self { rx })
    }

    /// Input that never yields a key.
    pub fn none() -> Self {
        Self::channel().1
    }

    /// Read keys from stdin on a background task, one key per line.
    pub fn spawn_stdin_reader() -> Self {
        let (tx, input) = Self::channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            info!("type q or esc and press enter to stop scanning");
            while let Ok(Some(line)) = lines.next_line().await {
                let Some(key) = parse_line(&line) else {
                    continue;
                };
                debug!(?key, "operator key");
                if tx.send(key).await.is_err() {
                    break;
                }
            }
            debug!("stdin reader finished");
        });
        input
    }

    /// Next pending key, if any.
    pub fn poll(&mut self) -> Option<Key> {
        match self.rx.try_recv() {
            Ok(key) => Some(key),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
