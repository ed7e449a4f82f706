//! Identity resolver
//!
//! Normalizes raw capture events from any modality into a
//! [`ResolvedIdentity`]. Consumers never need to know which device produced
//! an identifier.

use rollcall_api::{ResolvedIdentity, ScannerMode};
use rollcall_config::ScannerConfig;
use rollcall_util::{SubjectId, Timestamp};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    CameraError, CodeDecoder, FrameSource, OpticalEvent, OpticalScanHandle, WedgeDecoder,
    WedgeKey, spawn_wedge_listener, start_optical_scan,
};

/// Errors from identity resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("{received} input ignored while in {active} mode")]
    ModeInactive {
        active: ScannerMode,
        received: ScannerMode,
    },

    #[error("Empty identifier")]
    EmptyPayload,

    #[error("Malformed wedge payload '{raw}': {reason}")]
    MalformedWedgePayload { raw: String, reason: String },

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Invalid wedge escape prefix '{0}'")]
    InvalidEscapePrefix(String),
}

/// Raw input from a capture surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCaptureEvent {
    /// Payload read from an optical code
    OpticalDecoded { payload: String },
    /// The camera could not be used
    OpticalFailed(CameraError),
    /// Complete keystroke burst, escapes not yet decoded
    WedgeBurst { raw: String },
    /// A person picked a subject, optionally backdated
    ManualSelection {
        subject_id: String,
        explicit_time: Option<Timestamp>,
    },
}

impl RawCaptureEvent {
    /// Modality that produced the event
    pub fn mode(&self) -> ScannerMode {
        match self {
            RawCaptureEvent::OpticalDecoded { .. } | RawCaptureEvent::OpticalFailed(_) => {
                ScannerMode::Optical
            }
            RawCaptureEvent::WedgeBurst { .. } => ScannerMode::Wedge,
            RawCaptureEvent::ManualSelection { .. } => ScannerMode::Manual,
        }
    }
}

impl From<OpticalEvent> for RawCaptureEvent {
    fn from(event: OpticalEvent) -> Self {
        match event {
            OpticalEvent::Decoded(payload) => RawCaptureEvent::OpticalDecoded { payload },
            OpticalEvent::Failed(e) => RawCaptureEvent::OpticalFailed(e),
        }
    }
}

/// Mode-aware front door for all capture modalities.
///
/// The active mode is explicit state; persisting it is the UI's job.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    config: ScannerConfig,
    mode: ScannerMode,
    wedge: WedgeDecoder,
}

impl IdentityResolver {
    pub fn new(config: ScannerConfig) -> Result<Self, ResolutionError> {
        let wedge = WedgeDecoder::new(&config.wedge_escape_prefix)
            .map_err(|_| ResolutionError::InvalidEscapePrefix(config.wedge_escape_prefix.clone()))?;

        Ok(Self {
            mode: config.mode,
            config,
            wedge,
        })
    }

    pub fn mode(&self) -> ScannerMode {
        self.mode
    }

    /// Switch modality, returning the new mode for the caller to persist
    pub fn set_mode(&mut self, mode: ScannerMode) -> ScannerMode {
        debug!(from = %self.mode, to = %mode, "Scanner mode changed");
        self.mode = mode;
        mode
    }

    /// Advance to the next mode in toggle order
    pub fn cycle_mode(&mut self) -> ScannerMode {
        self.set_mode(self.mode.next())
    }

    /// Resolve one raw event from the active modality
    pub fn resolve(&self, event: RawCaptureEvent) -> Result<ResolvedIdentity, ResolutionError> {
        let received = event.mode();
        if received != self.mode {
            return Err(ResolutionError::ModeInactive {
                active: self.mode,
                received,
            });
        }

        match event {
            RawCaptureEvent::OpticalDecoded { payload } => {
                identity(&payload, None, ScannerMode::Optical)
            }
            RawCaptureEvent::OpticalFailed(e) => Err(ResolutionError::Camera(e)),
            RawCaptureEvent::WedgeBurst { raw } => self.wedge.resolve(&raw),
            RawCaptureEvent::ManualSelection {
                subject_id,
                explicit_time,
            } => identity(&subject_id, explicit_time, ScannerMode::Manual),
        }
    }

    /// Start the camera loop with the configured sampling interval
    pub fn start_optical<S, D>(
        &self,
        source: S,
        decoder: D,
    ) -> (OpticalScanHandle, mpsc::UnboundedReceiver<OpticalEvent>)
    where
        S: FrameSource + 'static,
        D: CodeDecoder + 'static,
    {
        start_optical_scan(source, decoder, self.config.frame_interval)
    }

    /// Start a wedge listener with the configured quiet period and escapes
    pub fn spawn_wedge_listener(
        &self,
        keys: mpsc::Receiver<WedgeKey>,
        out: mpsc::Sender<Result<ResolvedIdentity, ResolutionError>>,
    ) -> JoinHandle<()> {
        spawn_wedge_listener(
            self.wedge.clone(),
            self.config.wedge_quiet_period,
            keys,
            out,
        )
    }
}

fn identity(
    raw: &str,
    explicit_time: Option<Timestamp>,
    mode: ScannerMode,
) -> Result<ResolvedIdentity, ResolutionError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ResolutionError::EmptyPayload);
    }

    Ok(ResolvedIdentity {
        subject_id: SubjectId::new(id),
        explicit_time,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockCamera, TextDecoder};
    use chrono::{TimeZone, Utc};

    fn resolver(mode: ScannerMode) -> IdentityResolver {
        IdentityResolver::new(ScannerConfig {
            mode,
            ..ScannerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_optical_payload() {
        let identity = resolver(ScannerMode::Optical)
            .resolve(RawCaptureEvent::OpticalDecoded {
                payload: " S1\n".into(),
            })
            .unwrap();
        assert_eq!(identity.subject_id.as_str(), "S1");
        assert_eq!(identity.mode, ScannerMode::Optical);
        assert!(identity.explicit_time.is_none());
    }

    #[test]
    fn test_camera_failure_surfaces() {
        let result = resolver(ScannerMode::Optical)
            .resolve(RawCaptureEvent::OpticalFailed(CameraError::NotFound));
        assert_eq!(result, Err(ResolutionError::Camera(CameraError::NotFound)));
    }

    #[test]
    fn test_wedge_burst_decoded() {
        let identity = resolver(ScannerMode::Wedge)
            .resolve(RawCaptureEvent::WedgeBurst {
                raw: "Alt83Alt49".into(),
            })
            .unwrap();
        assert_eq!(identity.subject_id.as_str(), "S1");
        assert_eq!(identity.mode, ScannerMode::Wedge);
    }

    #[test]
    fn test_manual_selection_keeps_explicit_time() {
        let at = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
        let identity = resolver(ScannerMode::Manual)
            .resolve(RawCaptureEvent::ManualSelection {
                subject_id: "S1".into(),
                explicit_time: Some(at),
            })
            .unwrap();
        assert_eq!(identity.explicit_time, Some(at));
        assert_eq!(identity.mode, ScannerMode::Manual);
    }

    #[test]
    fn test_inactive_mode_rejected() {
        let result = resolver(ScannerMode::Manual).resolve(RawCaptureEvent::WedgeBurst {
            raw: "S1".into(),
        });
        assert_eq!(
            result,
            Err(ResolutionError::ModeInactive {
                active: ScannerMode::Manual,
                received: ScannerMode::Wedge,
            })
        );
    }

    #[test]
    fn test_empty_payloads_rejected() {
        let result = resolver(ScannerMode::Optical).resolve(RawCaptureEvent::OpticalDecoded {
            payload: "   ".into(),
        });
        assert_eq!(result, Err(ResolutionError::EmptyPayload));

        let result = resolver(ScannerMode::Manual).resolve(RawCaptureEvent::ManualSelection {
            subject_id: String::new(),
            explicit_time: None,
        });
        assert_eq!(result, Err(ResolutionError::EmptyPayload));
    }

    #[test]
    fn test_mode_cycle() {
        let mut resolver = resolver(ScannerMode::Optical);
        assert_eq!(resolver.cycle_mode(), ScannerMode::Wedge);
        assert_eq!(resolver.cycle_mode(), ScannerMode::Manual);
        assert_eq!(resolver.cycle_mode(), ScannerMode::Optical);
        assert_eq!(resolver.set_mode(ScannerMode::Manual), ScannerMode::Manual);
        assert_eq!(resolver.mode(), ScannerMode::Manual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optical_loop_feeds_resolver() {
        let resolver = resolver(ScannerMode::Optical);
        let camera = MockCamera::new();
        camera.push_code("S7");

        let (handle, mut events) = resolver.start_optical(camera.clone(), TextDecoder);
        let event = events.recv().await.unwrap();
        let identity = resolver.resolve(event.into()).unwrap();
        assert_eq!(identity.subject_id.as_str(), "S7");

        handle.shutdown().await;
        assert!(camera.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wedge_listener_uses_config() {
        let resolver = resolver(ScannerMode::Wedge);
        let (key_tx, key_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let _listener = resolver.spawn_wedge_listener(key_rx, out_tx);

        for key in [WedgeKey::Char('4'), WedgeKey::Char('2'), WedgeKey::Enter] {
            key_tx.send(key).await.unwrap();
        }

        let identity = out_rx.recv().await.unwrap().unwrap();
        assert_eq!(identity.subject_id.as_str(), "42");
    }
}
