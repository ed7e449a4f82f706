//! Mock capture devices for testing

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{CameraError, CodeDecoder, Frame, FrameSource};

/// Scripted camera.
///
/// Clones share state, so a test can keep one clone to script frames and
/// inspect the device after handing another to the scan loop. Once the script
/// runs out, blank frames are served.
#[derive(Clone, Default)]
pub struct MockCamera {
    frames: Arc<Mutex<VecDeque<Result<Frame, CameraError>>>>,
    served: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,

    /// Configure open to fail
    pub open_error: Arc<Mutex<Option<CameraError>>>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame carrying `text` as its payload
    pub fn push_code(&self, text: &str) {
        self.push(Ok(Frame {
            width: 1,
            height: 1,
            data: text.as_bytes().to_vec(),
        }));
    }

    /// Queue a capture failure
    pub fn push_error(&self, error: CameraError) {
        self.push(Err(error));
    }

    /// Make the next `open` fail
    pub fn fail_open(&self, error: CameraError) {
        *self
            .open_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Frames handed out so far, blank ones included
    pub fn frames_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Whether the scan loop released the device
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn push(&self, frame: Result<Frame, CameraError>) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(frame);
    }
}

#[async_trait]
impl FrameSource for MockCamera {
    async fn open(&mut self) -> Result<(), CameraError> {
        let error = self
            .open_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.served.fetch_add(1, Ordering::SeqCst);
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(Frame::default()))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Decoder that reads a frame's bytes as UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl CodeDecoder for TextDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        if frame.data.is_empty() {
            return None;
        }
        std::str::from_utf8(&frame.data).ok().map(str::to_string)
    }
}
