//! Keyboard controls for the capture loops and camera warmup.
//!
//! Loops stay single-threaded: a helper thread only relays stdin lines into a
//! channel, and Ctrl-C only flips a flag. The loop polls both between frames.

use rollcall_hw::{CameraError, FrameSource};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// ENTER on an empty line: take the photo.
    Capture,
    /// `q`, `quit` or `esc`, or Ctrl-C.
    Quit,
}

impl Key {
    pub fn parse(line: &str) -> Option<Key> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => Some(Key::Capture),
            "q" | "quit" | "esc" => Some(Key::Quit),
            _ => None,
        }
    }
}

/// Non-blocking source of user commands.
pub trait Controls {
    fn poll(&mut self) -> Option<Key>;
}

/// Stdin lines plus a shared interrupt flag.
pub struct TerminalControls {
    keys: Receiver<Key>,
    interrupted: Arc<AtomicBool>,
}

impl TerminalControls {
    pub fn spawn(interrupted: Arc<AtomicBool>) -> Self {
        let (tx, keys) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("rollcall-stdin".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    match Key::parse(&line) {
                        Some(key) => {
                            if tx.send(key).is_err() {
                                break;
                            }
                        }
                        None => tracing::debug!(%line, "ignoring input"),
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "stdin reader unavailable; use Ctrl-C");
        }
        Self { keys, interrupted }
    }
}

impl Controls for TerminalControls {
    fn poll(&mut self) -> Option<Key> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Some(Key::Quit);
        }
        match self.keys.try_recv() {
            Ok(key) => Some(key),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Drop the first frames while exposure settles.
pub fn discard_warmup(source: &mut impl FrameSource, count: usize) -> Result<(), CameraError> {
    if count > 0 {
        tracing::info!(count, "discarding warmup frames");
    }
    for _ in 0..count {
        source.next_frame()?;
    }
    Ok(())
}
