//! Capture state machine.
//!
//! ```text
//! Idle --Started--> Exposing --TimerElapsed--> (bulb: StopBulb, settle) --> check
//!                            --CompletionChecked--> Idle (image_ready = found)
//! Idle(image_ready) --DownloadStarted--> Downloading --DownloadFinished--> Idle
//! any --Failed--> Error
//! ```
//!
//! [`transition`] is pure: it never touches the device. Callers execute the
//! returned [`Effect`]s and feed the outcome back as further events.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{CameraError, Result};

/// Lifecycle of a single capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// No exposure in flight.
    #[default]
    Idle,
    /// Shutter open or completion not yet confirmed.
    Exposing,
    /// Image being downloaded and decoded.
    Downloading,
    /// Last operation failed; cleared by a successful connect or start.
    Error,
}

/// Parameters of the exposure in flight (or last completed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureRequest {
    /// Requested duration in seconds.
    pub duration_s: f64,
    /// Device code the duration resolved to.
    pub code: i32,
    /// Whether the exposure is ended by an explicit stop.
    pub bulb: bool,
    /// Light frame as opposed to dark frame.
    pub light: bool,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
}

impl ExposureRequest {
    /// Delay before the completion timer fires.
    ///
    /// Timed exposures wait for the duration plus `buffer` so the camera has
    /// finished writing; bulb exposures fire exactly at the duration because
    /// the shutter stays open until the stop command.
    pub fn completion_delay(&self, buffer: Duration) -> Duration {
        let exposure = Duration::from_secs_f64(self.duration_s.max(0.0));
        if self.bulb {
            exposure
        } else {
            exposure + buffer
        }
    }
}

/// Timer events scheduled by [`Effect::Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Exposure duration (plus buffer) elapsed.
    ExposureElapsed,
    /// Settle delay after bulb-stop elapsed.
    SettleElapsed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start commands were accepted by the device.
    Started(ExposureRequest),
    /// A scheduled timer fired.
    Timer(TimerEvent),
    /// `read_image_info` answered; `ready` when it reported a positive size.
    CompletionChecked {
        /// Whether an image is waiting.
        ready: bool,
    },
    /// Caller asked for the image.
    DownloadStarted,
    /// Image downloaded and decoded.
    DownloadFinished,
    /// Caller asked to abort or stop the exposure.
    AbortRequested,
    /// A session was (re)established.
    Connected,
    /// A device operation failed.
    Failed,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Run `event` after `delay`.
    Schedule {
        /// Delay from now.
        delay: Duration,
        /// Event to deliver.
        event: TimerEvent,
    },
    /// Issue the bulb-stop release; failure is only a warning.
    StopBulb,
    /// Query `read_image_info` and report [`Event::CompletionChecked`].
    CheckCompletion,
}

/// Timing constants consumed by [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Added to timed exposures before the completion check.
    pub completion_buffer: Duration,
    /// Wait between bulb-stop and the completion check.
    pub bulb_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            completion_buffer: Duration::from_millis(2_000),
            bulb_settle: Duration::from_millis(500),
        }
    }
}

/// Controller state guarded by the exposure lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureState {
    /// Current phase.
    pub phase: CaptureState,
    /// Exposure in flight, or the last one until its image is retrieved.
    pub request: Option<ExposureRequest>,
    /// An image is waiting in the camera buffer.
    pub image_ready: bool,
}

impl ExposureState {
    /// Whether a new exposure may start.
    pub const fn can_start(&self) -> bool {
        matches!(self.phase, CaptureState::Idle | CaptureState::Error)
    }

    /// Fail with `NotIdle` unless a new exposure may start.
    pub fn ensure_can_start(&self) -> Result<()> {
        if self.can_start() {
            Ok(())
        } else {
            Err(CameraError::NotIdle { state: self.phase })
        }
    }
}

/// Apply `event` to `state`.
///
/// Returns the next state and the effects to execute, or the error the
/// caller should surface. An error leaves `state` untouched.
pub fn transition(
    state: &ExposureState,
    event: &Event,
    timing: &Timing,
) -> Result<(ExposureState, Vec<Effect>)> {
    let mut next = state.clone();

    let effects = match (state.phase, event) {
        (_, Event::Connected) => {
            next = ExposureState::default();
            Vec::new()
        }
        (_, Event::Failed) => {
            next.phase = CaptureState::Error;
            next.request = None;
            next.image_ready = false;
            Vec::new()
        }

        (CaptureState::Idle | CaptureState::Error, Event::Started(request)) => {
            next.phase = CaptureState::Exposing;
            next.request = Some(*request);
            next.image_ready = false;
            vec![Effect::Schedule {
                delay: request.completion_delay(timing.completion_buffer),
                event: TimerEvent::ExposureElapsed,
            }]
        }
        (phase, Event::Started(_)) => return Err(CameraError::NotIdle { state: phase }),

        (CaptureState::Exposing, Event::Timer(TimerEvent::ExposureElapsed)) => {
            if state.request.is_some_and(|r| r.bulb) {
                vec![
                    Effect::StopBulb,
                    Effect::Schedule {
                        delay: timing.bulb_settle,
                        event: TimerEvent::SettleElapsed,
                    },
                ]
            } else {
                vec![Effect::CheckCompletion]
            }
        }
        (CaptureState::Exposing, Event::Timer(TimerEvent::SettleElapsed)) => {
            vec![Effect::CheckCompletion]
        }
        // Late timer after a failure or reconnect
        (_, Event::Timer(_)) => Vec::new(),

        (CaptureState::Exposing, Event::CompletionChecked { ready }) => {
            next.phase = CaptureState::Idle;
            next.image_ready = *ready;
            Vec::new()
        }
        (_, Event::CompletionChecked { .. }) => Vec::new(),

        (CaptureState::Idle, Event::DownloadStarted) if state.image_ready => {
            next.phase = CaptureState::Downloading;
            Vec::new()
        }
        (_, Event::DownloadStarted) => return Err(CameraError::ImageNotReady),

        (CaptureState::Downloading, Event::DownloadFinished) => {
            next.phase = CaptureState::Idle;
            next.image_ready = false;
            next.request = None;
            Vec::new()
        }
        (_, Event::DownloadFinished) => Vec::new(),

        (CaptureState::Exposing, Event::AbortRequested) => {
            return Err(CameraError::NotSupported("aborting an exposure"))
        }
        (_, Event::AbortRequested) => Vec::new(),
    };

    Ok((next, effects))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(duration_s: f64, bulb: bool) -> ExposureRequest {
        ExposureRequest {
            duration_s,
            code: if bulb { -1 } else { 9_843 },
            bulb,
            light: true,
            started_at: Utc::now(),
        }
    }

    fn step(state: &ExposureState, event: Event) -> (ExposureState, Vec<Effect>) {
        transition(state, &event, &Timing::default()).expect("transition should succeed")
    }

    #[test]
    fn test_timed_exposure_cycle() {
        let idle = ExposureState::default();
        let (exposing, effects) = step(&idle, Event::Started(request(0.01, false)));
        assert_eq!(exposing.phase, CaptureState::Exposing);
        assert_eq!(
            effects,
            vec![Effect::Schedule {
                delay: Duration::from_secs_f64(0.01) + Duration::from_millis(2_000),
                event: TimerEvent::ExposureElapsed,
            }]
        );

        let (same, effects) = step(&exposing, Event::Timer(TimerEvent::ExposureElapsed));
        assert_eq!(same.phase, CaptureState::Exposing);
        assert_eq!(effects, vec![Effect::CheckCompletion]);

        let (done, effects) = step(&same, Event::CompletionChecked { ready: true });
        assert_eq!(done.phase, CaptureState::Idle);
        assert!(done.image_ready);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_bulb_exposure_stops_then_settles() {
        let idle = ExposureState::default();
        let (exposing, effects) = step(&idle, Event::Started(request(120.0, true)));
        assert_eq!(
            effects,
            vec![Effect::Schedule {
                delay: Duration::from_secs(120),
                event: TimerEvent::ExposureElapsed,
            }]
        );

        let (_, effects) = step(&exposing, Event::Timer(TimerEvent::ExposureElapsed));
        assert_eq!(
            effects,
            vec![
                Effect::StopBulb,
                Effect::Schedule {
                    delay: Duration::from_millis(500),
                    event: TimerEvent::SettleElapsed,
                },
            ]
        );

        let (_, effects) = step(&exposing, Event::Timer(TimerEvent::SettleElapsed));
        assert_eq!(effects, vec![Effect::CheckCompletion]);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let (exposing, _) = step(&ExposureState::default(), Event::Started(request(1.0, false)));
        let err = transition(
            &exposing,
            &Event::Started(request(2.0, false)),
            &Timing::default(),
        )
        .expect_err("second start should fail");
        assert!(matches!(
            err,
            CameraError::NotIdle {
                state: CaptureState::Exposing
            }
        ));
    }

    #[test]
    fn test_not_ready_returns_to_idle() {
        let (exposing, _) = step(&ExposureState::default(), Event::Started(request(1.0, false)));
        let (idle, _) = step(&exposing, Event::CompletionChecked { ready: false });
        assert_eq!(idle.phase, CaptureState::Idle);
        assert!(!idle.image_ready);
    }

    #[test]
    fn test_download_requires_ready_image() {
        let err = transition(
            &ExposureState::default(),
            &Event::DownloadStarted,
            &Timing::default(),
        )
        .expect_err("download should fail");
        assert!(matches!(err, CameraError::ImageNotReady));

        let ready = ExposureState {
            phase: CaptureState::Idle,
            request: Some(request(1.0, false)),
            image_ready: true,
        };
        let (downloading, _) = step(&ready, Event::DownloadStarted);
        assert_eq!(downloading.phase, CaptureState::Downloading);

        let (idle, _) = step(&downloading, Event::DownloadFinished);
        assert_eq!(idle.phase, CaptureState::Idle);
        assert!(!idle.image_ready);
        assert!(idle.request.is_none());
    }

    #[test]
    fn test_abort_only_fails_while_exposing() {
        let idle = ExposureState::default();
        let (same, effects) = step(&idle, Event::AbortRequested);
        assert_eq!(same, idle);
        assert!(effects.is_empty());

        let (exposing, _) = step(&idle, Event::Started(request(1.0, false)));
        let err = transition(&exposing, &Event::AbortRequested, &Timing::default())
            .expect_err("abort should fail");
        assert!(matches!(err, CameraError::NotSupported(_)));
    }

    #[test]
    fn test_failure_and_recovery() {
        let (exposing, _) = step(&ExposureState::default(), Event::Started(request(1.0, false)));
        let (failed, _) = step(&exposing, Event::Failed);
        assert_eq!(failed.phase, CaptureState::Error);
        assert!(failed.request.is_none());

        // Late timers after a failure are ignored
        let (still, effects) = step(&failed, Event::Timer(TimerEvent::ExposureElapsed));
        assert_eq!(still.phase, CaptureState::Error);
        assert!(effects.is_empty());

        let (restarted, _) = step(&failed, Event::Started(request(1.0, false)));
        assert_eq!(restarted.phase, CaptureState::Exposing);

        let (reconnected, _) = step(&failed, Event::Connected);
        assert_eq!(reconnected.phase, CaptureState::Idle);
    }
}
