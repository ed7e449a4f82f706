//! Optical code scanning from a live camera feed
//!
//! A sampling task pulls frames at a fixed interval and hands them to a
//! decoder. After the first decode the task pauses until the consumer resets
//! it, so one code held in front of the camera fires once.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Camera failures, distinguished so the UI can explain them
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera found")]
    NotFound,

    #[error("Camera capture failed: {0}")]
    Capture(String),
}

/// One captured image
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A live video source
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the device
    async fn open(&mut self) -> Result<(), CameraError>;

    /// Grab the current frame
    async fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Release the device; called exactly once when the scan loop ends
    async fn close(&mut self);
}

/// Extracts an optical code payload from a frame
pub trait CodeDecoder: Send {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Output of the scan loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpticalEvent {
    /// A code was read; the loop is paused until reset
    Decoded(String),
    /// The camera failed; the loop has ended
    Failed(CameraError),
}

/// Controls a running scan loop.
///
/// Dropping the handle cancels the loop, which then releases the camera.
pub struct OpticalScanHandle {
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl OpticalScanHandle {
    /// Resume scanning after a decode
    pub fn reset(&self) {
        self.paused.send_replace(false);
    }

    /// Whether the loop is waiting for a reset
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Stop the loop and release the camera
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait until the camera has been released
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Optical scan task failed");
        }
    }
}

impl Drop for OpticalScanHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start sampling `source` every `frame_interval`
pub fn start_optical_scan<S, D>(
    source: S,
    decoder: D,
    frame_interval: Duration,
) -> (OpticalScanHandle, mpsc::UnboundedReceiver<OpticalEvent>)
where
    S: FrameSource + 'static,
    D: CodeDecoder + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let (paused, _) = watch::channel(false);
    let paused = Arc::new(paused);

    let task = tokio::spawn(run_scan_loop(
        source,
        decoder,
        frame_interval,
        cancel.clone(),
        paused.clone(),
        tx,
    ));

    let handle = OpticalScanHandle {
        cancel,
        paused,
        task: Some(task),
    };
    (handle, rx)
}

async fn run_scan_loop<S, D>(
    mut source: S,
    decoder: D,
    frame_interval: Duration,
    cancel: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
    events: mpsc::UnboundedSender<OpticalEvent>,
) where
    S: FrameSource,
    D: CodeDecoder,
{
    let opened = tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = source.open() => result,
    };

    if let Err(e) = opened {
        warn!(error = %e, "Camera unavailable");
        let _ = events.send(OpticalEvent::Failed(e));
        source.close().await;
        return;
    }

    info!(interval_ms = frame_interval.as_millis() as u64, "Optical scan started");

    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut resumed = paused.subscribe();

    while !cancel.is_cancelled() {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Camera capture failed");
                let _ = events.send(OpticalEvent::Failed(e));
                break;
            }
        };

        let Some(payload) = decoder.decode(&frame) else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }

        debug!(len = payload.len(), "Optical code decoded");
        paused.send_replace(true);
        if events.send(OpticalEvent::Decoded(payload.to_string())).is_err() {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = resumed.wait_for(|paused| !*paused) => {
                if result.is_err() {
                    break;
                }
            }
        }
        ticker.reset();
    }

    source.close().await;
    debug!("Optical scan stopped, camera released");
}
