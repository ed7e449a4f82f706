//! Keystroke-wedge scanner decoding
//!
//! Hardware barcode readers in keyboard mode type the payload far faster than
//! a person and finish with Enter. Keys are buffered until Enter; a quiet gap
//! between keys discards the buffer so ordinary typing never reads as a scan.

use regex::Regex;
use rollcall_api::{ResolvedIdentity, ScannerMode};
use rollcall_util::SubjectId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::ResolutionError;

/// Tokio timers fire on millisecond ticks
const TIMER_TICK: Duration = Duration::from_millis(1);

/// One synthetic keyboard event from the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WedgeKey {
    Char(char),
    Enter,
}

/// Decodes vendor escape sequences such as `Alt65` into literal characters
#[derive(Debug, Clone)]
pub struct WedgeDecoder {
    escape: Regex,
}

impl WedgeDecoder {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let escape = Regex::new(&format!(r"{}(\d+)", regex::escape(prefix)))?;
        Ok(Self { escape })
    }

    /// Replace every escape sequence with the character of that decimal code
    pub fn decode(&self, raw: &str) -> Result<String, ResolutionError> {
        let mut decoded = String::with_capacity(raw.len());
        let mut last = 0;

        for caps in self.escape.captures_iter(raw) {
            let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            let ch = digits
                .as_str()
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| ResolutionError::MalformedWedgePayload {
                    raw: raw.to_string(),
                    reason: format!("'{}' is not a character code", whole.as_str()),
                })?;

            decoded.push_str(&raw[last..whole.start()]);
            decoded.push(ch);
            last = whole.end();
        }

        decoded.push_str(&raw[last..]);
        Ok(decoded)
    }

    /// Turn a complete burst into a resolved identity
    pub fn resolve(&self, raw: &str) -> Result<ResolvedIdentity, ResolutionError> {
        let decoded = self.decode(raw)?;
        let id = decoded.trim();
        if id.is_empty() {
            return Err(ResolutionError::EmptyPayload);
        }

        Ok(ResolvedIdentity {
            subject_id: SubjectId::new(id),
            explicit_time: None,
            mode: ScannerMode::Wedge,
        })
    }
}

/// Keystroke accumulator with quiet-period reset
#[derive(Debug)]
pub struct WedgeBuffer {
    buf: String,
    last_key: Option<Instant>,
    quiet_period: Duration,
}

impl WedgeBuffer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            buf: String::new(),
            last_key: None,
            quiet_period,
        }
    }

    /// Feed one key received at `at`.
    ///
    /// Returns the raw burst when Enter completes a non-blank buffer.
    pub fn push_key(&mut self, key: WedgeKey, at: Instant) -> Option<String> {
        if let Some(last) = self.last_key
            && at.saturating_duration_since(last) > self.quiet_period
        {
            self.buf.clear();
        }
        self.last_key = Some(at);

        match key {
            WedgeKey::Char(c) => {
                self.buf.push(c);
                None
            }
            WedgeKey::Enter => {
                let raw = std::mem::take(&mut self.buf);
                self.last_key = None;
                if raw.trim().is_empty() { None } else { Some(raw) }
            }
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.last_key = None;
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Spawn a task turning wedge keystrokes into identities.
///
/// The task holds a single debounce deadline, re-armed on every key, and
/// ends when `keys` closes or the output receiver is dropped.
pub fn spawn_wedge_listener(
    decoder: WedgeDecoder,
    quiet_period: Duration,
    mut keys: mpsc::Receiver<WedgeKey>,
    out: mpsc::Sender<Result<ResolvedIdentity, ResolutionError>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = WedgeBuffer::new(quiet_period);
        let debounce = tokio::time::sleep(quiet_period);
        tokio::pin!(debounce);
        let mut armed = false;

        loop {
            tokio::select! {
                key = keys.recv() => {
                    let Some(key) = key else { break };
                    let now = Instant::now();

                    if let Some(raw) = buffer.push_key(key, now) {
                        armed = false;
                        debug!(len = raw.len(), "Wedge burst complete");
                        if out.send(decoder.resolve(&raw)).await.is_err() {
                            break;
                        }
                    } else if buffer.is_empty() {
                        armed = false;
                    } else {
                        // A key exactly at the quiet period still belongs to the burst
                        debounce.as_mut().reset(now + quiet_period + TIMER_TICK);
                        armed = true;
                    }
                }
                _ = &mut debounce, if armed => {
                    debug!("Wedge buffer cleared after quiet period");
                    buffer.clear();
                    armed = false;
                }
            }
        }

        debug!("Wedge listener stopped");
    })
}
