//! Camera: the session object owning every piece of mutable state.
//!
//! One lock serializes all device access and state transitions. It is held
//! for the duration of each operation but not across the wait between an
//! exposure starting and its completion timer firing; the timer callback
//! re-acquires it through a weak reference.

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::exposure::{
    transition, CaptureState, Effect, Event, ExposureRequest, ExposureState, TimerEvent, Timing,
};
use crate::pipeline::{DecodedImage, RawPipeline};
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::session::{CapabilitySnapshot, DeviceSession};
use crate::shutter::ShutterSpeedTable;
use crate::traits::{CameraSdk, DeviceInfo, RawDecoder, ReleaseMode, BULB_CODE};
use crate::validation::{validate_exposure, validate_gain};

struct Inner<S: CameraSdk, D: RawDecoder> {
    session: DeviceSession<S>,
    pipeline: RawPipeline<D>,
    scheduler: Arc<dyn Scheduler>,
    timing: Timing,
    table: Option<ShutterSpeedTable>,
    caps: Option<CapabilitySnapshot>,
    machine: ExposureState,
    /// Bumped per exposure so stale timers can be told apart.
    generation: u64,
    pending_timer: Option<ScheduledTask>,
    cached_image: Option<DecodedImage>,
    last_exposure: Option<ExposureRequest>,
    last_warning: Option<String>,
    sensor_dimensions: Option<(u32, u32)>,
}

type Shared<S, D> = Arc<Mutex<Inner<S, D>>>;

/// Tethered camera with a non-blocking exposure API.
pub struct Camera<S, D>
where
    S: CameraSdk + Send + 'static,
    D: RawDecoder + Send + 'static,
{
    inner: Shared<S, D>,
}

impl<S, D> Camera<S, D>
where
    S: CameraSdk + Send + 'static,
    D: RawDecoder + Send + 'static,
{
    /// Build a disconnected camera.
    pub fn new(sdk: S, decoder: D, scheduler: Arc<dyn Scheduler>, config: &CameraConfig) -> Self {
        let inner = Inner {
            session: DeviceSession::new(sdk, config.device_index),
            pipeline: RawPipeline::new(decoder),
            scheduler,
            timing: config.timing(),
            table: None,
            caps: None,
            machine: ExposureState::default(),
            generation: 0,
            pending_timer: None,
            cached_image: None,
            last_exposure: None,
            last_warning: None,
            sensor_dimensions: None,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn weak(&self) -> Weak<Mutex<Inner<S, D>>> {
        Arc::downgrade(&self.inner)
    }

    /// Open the device, build the shutter table and read capabilities.
    ///
    /// A no-op if already connected. Any failure leaves the camera
    /// disconnected.
    pub fn connect(&self) -> Result<()> {
        let weak = self.weak();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.session.is_connected() {
            return Ok(());
        }
        inner.session.connect()?;

        let table = ShutterSpeedTable::reference();
        let caps = match inner
            .session
            .capabilities(table.min_exposure(), table.max_exposure())
        {
            Ok(caps) => caps,
            Err(err) => {
                if let Err(close_err) = inner.session.disconnect() {
                    warn!(%close_err, "disconnect after failed capability read failed");
                }
                return Err(err);
            }
        };

        debug!(
            codes = table.len(),
            min_exposure = caps.min_exposure,
            max_exposure = caps.max_exposure,
            bulb = caps.bulb_capable,
            "capabilities cached"
        );
        inner.table = Some(table);
        inner.caps = Some(caps);
        inner.apply(&Event::Connected, &weak)
    }

    /// Close the device. Safe to call repeatedly.
    pub fn disconnect(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.cancel_timer();
        if inner.machine.phase == CaptureState::Exposing {
            warn!("disconnecting with an exposure in flight");
        }
        inner.reset_session_state();
        inner.session.disconnect()
    }

    /// Whether a device session is open.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().session.is_connected()
    }

    /// Begin an exposure and return immediately.
    ///
    /// Durations past the timed maximum run as bulb exposures on bodies that
    /// support it. Completion is detected in the background; poll
    /// [`Camera::image_ready`].
    pub fn start_exposure(&self, duration_s: f64, light: bool) -> Result<()> {
        let weak = self.weak();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.session.is_connected() {
            return Err(CameraError::NotConnected);
        }
        inner.machine.ensure_can_start()?;

        let started = inner
            .resolve_code(duration_s)
            .and_then(|code| inner.issue_start(code).map(|()| code));
        let code = match started {
            Ok(code) => code,
            Err(err) => {
                error!(%err, duration_s, "exposure start failed");
                inner.apply(&Event::Failed, &weak)?;
                return Err(err);
            }
        };
        let bulb = code == BULB_CODE;

        let request = ExposureRequest {
            duration_s,
            code,
            bulb,
            light,
            started_at: Utc::now(),
        };
        inner.generation += 1;
        inner.cached_image = None;
        inner.last_exposure = Some(request);
        inner.last_warning = None;
        inner.apply(&Event::Started(request), &weak)?;

        info!(duration_s, code, bulb, light, "exposure started");
        Ok(())
    }

    /// Abort the exposure in flight.
    ///
    /// The device has no cancel primitive, so this fails while exposing and
    /// does nothing otherwise.
    pub fn abort_exposure(&self) -> Result<()> {
        let weak = self.weak();
        self.inner.lock().apply(&Event::AbortRequested, &weak)
    }

    /// Stop the exposure in flight early. Same constraints as
    /// [`Camera::abort_exposure`].
    pub fn stop_exposure(&self) -> Result<()> {
        self.abort_exposure()
    }

    /// Whether an image is waiting to be retrieved.
    pub fn image_ready(&self) -> bool {
        self.inner.lock().machine.image_ready
    }

    /// Current capture state.
    pub fn state(&self) -> CaptureState {
        self.inner.lock().machine.phase
    }

    /// Download and decode the pending image, handing ownership to the caller.
    ///
    /// Clears the ready flag; a second call without a new exposure fails
    /// with `ImageNotReady`.
    pub fn retrieve_image(&self) -> Result<DecodedImage> {
        let weak = self.weak();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.apply(&Event::DownloadStarted, &weak)?;

        if inner.cached_image.is_none() {
            match inner.pipeline.acquire(&mut inner.session) {
                Ok(image) => inner.cached_image = Some(image),
                Err(err) => {
                    error!(%err, "image retrieval failed");
                    inner.apply(&Event::Failed, &weak)?;
                    return Err(err);
                }
            }
        }

        let image = inner.cached_image.take().ok_or(CameraError::ImageNotReady)?;
        inner.sensor_dimensions = Some((image.width, image.height));
        inner.apply(&Event::DownloadFinished, &weak)?;
        Ok(image)
    }

    /// Shortest supported exposure in seconds.
    pub fn exposure_min(&self) -> Result<f64> {
        Ok(self.capabilities()?.min_exposure)
    }

    /// Longest timed exposure in seconds.
    pub fn exposure_max(&self) -> Result<f64> {
        Ok(self.capabilities()?.max_exposure)
    }

    /// Whether exposures past [`Camera::exposure_max`] run as bulb.
    pub fn can_bulb(&self) -> Result<bool> {
        Ok(self.capabilities()?.bulb_capable)
    }

    /// Capability snapshot of the open session.
    pub fn capabilities(&self) -> Result<CapabilitySnapshot> {
        self.inner.lock().caps.ok_or(CameraError::NotConnected)
    }

    /// Current ISO sensitivity.
    pub fn gain(&self) -> Result<i32> {
        self.inner.lock().session.sensitivity()
    }

    /// Select an ISO sensitivity within the advertised range.
    pub fn set_gain(&self, iso: i32) -> Result<()> {
        let mut guard = self.inner.lock();
        let caps = guard.caps.ok_or(CameraError::NotConnected)?;
        validate_gain(iso, &caps)?;
        guard.session.set_sensitivity(iso)
    }

    /// Lowest ISO sensitivity.
    pub fn gain_min(&self) -> Result<i32> {
        Ok(self.capabilities()?.min_sensitivity)
    }

    /// Highest ISO sensitivity.
    pub fn gain_max(&self) -> Result<i32> {
        Ok(self.capabilities()?.max_sensitivity)
    }

    /// Dimensions of the most recently decoded image.
    pub fn sensor_dimensions(&self) -> Option<(u32, u32)> {
        self.inner.lock().sensor_dimensions
    }

    /// Identity of the connected device.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.lock().session.device_info().cloned()
    }

    /// Parameters of the most recent exposure.
    pub fn last_exposure(&self) -> Option<ExposureRequest> {
        self.inner.lock().last_exposure
    }

    /// Recovered failure recorded during the most recent exposure, if any.
    pub fn last_warning(&self) -> Option<String> {
        self.inner.lock().last_warning.clone()
    }

    /// Release everything: cancel timers, close the device, tear down the
    /// SDK and recycle decoder resources. Runs on drop as well.
    pub fn shutdown(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.cancel_timer();
        if inner.machine.phase == CaptureState::Exposing {
            warn!("shutting down with an exposure in flight, disconnecting anyway");
        }
        inner.reset_session_state();
        inner.session.shutdown();
        inner.pipeline.release();
    }
}

impl<S, D> Drop for Camera<S, D>
where
    S: CameraSdk + Send + 'static,
    D: RawDecoder + Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S, D> Inner<S, D>
where
    S: CameraSdk + Send + 'static,
    D: RawDecoder + Send + 'static,
{
    /// Apply an event and run the resulting effects.
    fn apply(&mut self, event: &Event, this: &Weak<Mutex<Self>>) -> Result<()> {
        let (next, effects) = transition(&self.machine, event, &self.timing)?;
        if next.phase != self.machine.phase {
            debug!(from = ?self.machine.phase, to = ?next.phase, "capture state changed");
        }
        self.machine = next;

        for effect in effects {
            self.execute(effect, this)?;
        }
        Ok(())
    }

    fn execute(&mut self, effect: Effect, this: &Weak<Mutex<Self>>) -> Result<()> {
        match effect {
            Effect::Schedule { delay, event } => {
                let generation = self.generation;
                let weak = this.clone();
                trace!(?delay, ?event, generation, "timer scheduled");
                let task = self.scheduler.schedule(
                    delay,
                    Box::new(move || {
                        if let Some(shared) = weak.upgrade() {
                            shared.lock().on_timer(generation, event, &weak);
                        }
                    }),
                );
                self.pending_timer = Some(task);
                Ok(())
            }
            Effect::StopBulb => {
                if let Err(err) = self.session.release(ReleaseMode::BulbS2Off, 0) {
                    warn!(%err, "bulb stop failed, checking for image anyway");
                    self.last_warning = Some(err.to_string());
                }
                Ok(())
            }
            Effect::CheckCompletion => {
                let ready = match self.session.read_image_info() {
                    Ok(info) => info.byte_size > 0,
                    Err(err) => {
                        debug!(%err, "completion check could not read image info");
                        false
                    }
                };
                if !ready {
                    info!("exposure finished without a pending image, retry later");
                }
                self.apply(&Event::CompletionChecked { ready }, this)
            }
        }
    }

    fn on_timer(&mut self, generation: u64, event: TimerEvent, this: &Weak<Mutex<Self>>) {
        if generation != self.generation {
            trace!(generation, current = self.generation, "stale timer ignored");
            return;
        }
        self.pending_timer = None;
        if let Err(err) = self.apply(&Event::Timer(event), this) {
            warn!(%err, "timer handling failed");
        }
    }

    fn resolve_code(&self, duration_s: f64) -> Result<i32> {
        let caps = self.caps.ok_or(CameraError::NotConnected)?;
        let table = self.table.as_ref().ok_or(CameraError::NotConnected)?;
        validate_exposure(duration_s, &caps)?;
        table.code_for(duration_s, caps.bulb_capable)
    }

    /// Issue the native start sequence for `code`.
    fn issue_start(&mut self, code: i32) -> Result<()> {
        self.session.set_shutter_speed(code)?;

        if code != BULB_CODE {
            self.session.release(ReleaseMode::ShootS1Off, 0)?;
            return Ok(());
        }

        self.session.release(ReleaseMode::S1On, 0)?;
        if let Err(err) = self.session.release(ReleaseMode::BulbS2On, 0) {
            if let Err(cleanup) = self.session.release(ReleaseMode::S1Off, 0) {
                warn!(%cleanup, "press-halfway release after failed bulb start also failed");
            }
            return Err(err);
        }
        Ok(())
    }

    fn cancel_timer(&mut self) {
        if let Some(task) = self.pending_timer.take() {
            task.cancel();
        }
        // Invalidate anything already in flight
        self.generation += 1;
    }

    fn reset_session_state(&mut self) {
        self.table = None;
        self.caps = None;
        self.cached_image = None;
        if self.machine.phase != CaptureState::Error {
            self.machine = ExposureState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, ErrorCategory};
    use crate::mock::{
        encode_test_raw, generate_plane, ManualScheduler, MockDecoder, MockSdk, SdkCall,
        TestPattern,
    };
    use crate::traits::image_format;
    use std::time::Duration;
    use tracing_test::traced_test;

    type TestCamera = Camera<MockSdk, MockDecoder>;

    fn raw_payload() -> Vec<u8> {
        let plane = generate_plane(16, 8, TestPattern::Gradient);
        encode_test_raw(16, 8, &plane)
    }

    fn setup(sdk: MockSdk) -> (TestCamera, MockSdk, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let camera = Camera::new(
            sdk.clone(),
            MockDecoder::new(),
            Arc::new(scheduler.clone()),
            &CameraConfig::default(),
        );
        camera.connect().expect("connect should succeed");
        sdk.clear_calls();
        (camera, sdk, scheduler)
    }

    #[test]
    fn test_connect_reads_capabilities() {
        let (camera, _, _) = setup(MockSdk::new());
        assert!(camera.is_connected());
        assert_eq!(camera.gain_min().expect("gain_min"), 160);
        assert_eq!(camera.gain_max().expect("gain_max"), 12_800);
        assert!(camera.can_bulb().expect("can_bulb"));
        assert!((camera.exposure_max().expect("max") - 60.0).abs() < 1e-9);
        assert_eq!(
            camera.device_info().expect("device info").product,
            "Mock X-1"
        );
    }

    #[test]
    fn test_connect_twice_is_noop() {
        let (camera, sdk, _) = setup(MockSdk::new());
        camera.connect().expect("second connect should succeed");
        assert!(sdk.calls().is_empty());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (camera, sdk, _) = setup(MockSdk::new());
        camera.disconnect().expect("disconnect should succeed");
        camera.disconnect().expect("second disconnect should succeed");
        assert!(!camera.is_connected());
        assert_eq!(sdk.calls(), vec![SdkCall::Close]);
        assert!(matches!(camera.exposure_min(), Err(CameraError::NotConnected)));
    }

    #[test]
    fn test_timed_exposure_scenario() {
        let (camera, sdk, scheduler) = setup(MockSdk::new().with_raw_payload(raw_payload()));

        camera.start_exposure(0.01, true).expect("start should succeed");
        assert_eq!(camera.state(), CaptureState::Exposing);
        assert_eq!(
            sdk.calls(),
            vec![
                SdkCall::SetShutterSpeed(9_843, 0),
                SdkCall::Release(ReleaseMode::ShootS1Off),
            ]
        );
        assert_eq!(
            scheduler.next_due_in(),
            Some(Duration::from_secs_f64(0.01) + Duration::from_millis(2_000))
        );

        scheduler.advance(Duration::from_secs(3));
        assert_eq!(camera.state(), CaptureState::Idle);
        assert!(camera.image_ready());
    }

    #[test]
    fn test_completion_without_image_is_not_an_error() {
        let (camera, _, scheduler) = setup(MockSdk::new());
        camera.start_exposure(1.0, true).expect("start should succeed");
        scheduler.advance(Duration::from_secs(5));
        assert_eq!(camera.state(), CaptureState::Idle);
        assert!(!camera.image_ready());
    }

    #[test]
    fn test_second_start_while_exposing() {
        let (camera, sdk, _) = setup(MockSdk::new());
        camera.start_exposure(1.0, true).expect("start should succeed");
        sdk.clear_calls();

        let err = camera
            .start_exposure(1.0, true)
            .expect_err("second start should fail");
        assert!(matches!(
            err,
            CameraError::NotIdle {
                state: CaptureState::Exposing
            }
        ));
        assert_eq!(camera.state(), CaptureState::Exposing);
        assert!(sdk.calls().is_empty());
    }

    #[test]
    fn test_bulb_exposure_scenario() {
        let (camera, sdk, scheduler) = setup(MockSdk::new().with_raw_payload(raw_payload()));

        camera.start_exposure(120.0, true).expect("start should succeed");
        assert_eq!(
            sdk.calls(),
            vec![
                SdkCall::SetShutterSpeed(BULB_CODE, 1),
                SdkCall::Release(ReleaseMode::S1On),
                SdkCall::Release(ReleaseMode::BulbS2On),
            ]
        );
        assert!(camera.last_exposure().expect("request").bulb);
        assert_eq!(scheduler.next_due_in(), Some(Duration::from_secs(120)));

        scheduler.advance(Duration::from_secs(120));
        assert_eq!(sdk.releases().last(), Some(&ReleaseMode::BulbS2Off));
        assert_eq!(camera.state(), CaptureState::Exposing);

        scheduler.advance(Duration::from_millis(500));
        assert_eq!(camera.state(), CaptureState::Idle);
        assert!(camera.image_ready());
    }

    #[test]
    fn test_bulb_start_failure_releases_half_press() {
        let sdk = MockSdk::new();
        sdk.fail(ReleaseMode::BulbS2On.operation(), codes::BUSY);
        let (camera, sdk, scheduler) = setup(sdk);

        let err = camera
            .start_exposure(120.0, true)
            .expect_err("bulb start should fail");
        assert_eq!(err.category(), ErrorCategory::Busy);
        assert!(matches!(
            err,
            CameraError::Native {
                operation: "Release(bulb-start)",
                ..
            }
        ));
        assert_eq!(
            sdk.releases(),
            vec![ReleaseMode::S1On, ReleaseMode::BulbS2On, ReleaseMode::S1Off]
        );
        assert_eq!(camera.state(), CaptureState::Error);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_error_state_cleared_by_next_start() {
        let sdk = MockSdk::new();
        sdk.fail("SetShutterSpeed", codes::COMMUNICATION);
        let (camera, sdk, _) = setup(sdk);

        assert!(camera.start_exposure(1.0, true).is_err());
        assert_eq!(camera.state(), CaptureState::Error);

        sdk.clear_failure("SetShutterSpeed");
        camera.start_exposure(1.0, true).expect("start should succeed");
        assert_eq!(camera.state(), CaptureState::Exposing);
    }

    #[test]
    fn test_bulb_stop_failure_is_warning() {
        let sdk = MockSdk::new().with_raw_payload(raw_payload());
        sdk.fail(ReleaseMode::BulbS2Off.operation(), codes::BUSY);
        let (camera, _, scheduler) = setup(sdk);

        camera.start_exposure(90.0, true).expect("start should succeed");
        scheduler.advance(Duration::from_secs(91));
        assert_eq!(camera.state(), CaptureState::Idle);
        assert!(camera
            .last_warning()
            .expect("warning recorded")
            .contains("bulb-stop"));
    }

    #[test]
    #[traced_test]
    fn test_bulb_stop_failure_logged() {
        let sdk = MockSdk::new();
        sdk.fail(ReleaseMode::BulbS2Off.operation(), codes::COMMUNICATION);
        let (camera, _, scheduler) = setup(sdk);

        camera.start_exposure(75.0, false).expect("start should succeed");
        scheduler.advance(Duration::from_secs(76));
        assert!(logs_contain("bulb stop failed"));
        assert!(logs_contain("exposure finished without a pending image"));
    }

    #[test]
    fn test_beyond_max_without_bulb() {
        let (camera, sdk, _) = setup(MockSdk::new().without_bulb());
        let err = camera
            .start_exposure(120.0, true)
            .expect_err("start should fail");
        assert!(matches!(err, CameraError::UnsupportedExposureDuration(_)));
        assert_eq!(camera.state(), CaptureState::Error);
        assert!(sdk.calls().is_empty());

        camera.start_exposure(30.0, true).expect("start should succeed");
        assert_eq!(camera.state(), CaptureState::Exposing);
    }

    #[test]
    fn test_unrepresentable_bulb_duration_rejected() {
        let (camera, sdk, scheduler) = setup(MockSdk::new());
        let err = camera
            .start_exposure(1e20, true)
            .expect_err("start should fail");
        assert!(matches!(err, CameraError::ExposureOutOfRange { .. }));
        assert!(sdk.calls().is_empty());
        assert_eq!(camera.state(), CaptureState::Error);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_invalid_duration_then_recovery() {
        let (camera, sdk, scheduler) = setup(MockSdk::new());
        assert!(matches!(
            camera.start_exposure(-1.0, true),
            Err(CameraError::ExposureOutOfRange { .. })
        ));
        assert_eq!(camera.state(), CaptureState::Error);
        assert!(!camera.image_ready());

        camera.start_exposure(0.01, true).expect("start should succeed");
        assert_eq!(camera.state(), CaptureState::Exposing);
        assert_eq!(sdk.calls().first(), Some(&SdkCall::SetShutterSpeed(9_843, 0)));
        scheduler.advance(Duration::from_secs(3));
        assert_eq!(camera.state(), CaptureState::Idle);
    }

    #[test]
    fn test_not_idle_leaves_state_alone() {
        let (camera, _, _) = setup(MockSdk::new());
        camera.start_exposure(1.0, true).expect("start should succeed");
        assert!(matches!(
            camera.start_exposure(-1.0, true),
            Err(CameraError::NotIdle { .. })
        ));
        assert_eq!(camera.state(), CaptureState::Exposing);
    }

    #[test]
    fn test_abort_and_stop() {
        let (camera, _, scheduler) = setup(MockSdk::new());
        camera.abort_exposure().expect("abort while idle is a no-op");

        camera.start_exposure(1.0, true).expect("start should succeed");
        assert!(matches!(camera.abort_exposure(), Err(CameraError::NotSupported(_))));
        assert!(matches!(camera.stop_exposure(), Err(CameraError::NotSupported(_))));
        assert_eq!(camera.state(), CaptureState::Exposing);

        scheduler.advance(Duration::from_secs(4));
        camera.stop_exposure().expect("stop after completion is a no-op");
    }

    #[test]
    fn test_retrieve_twice() {
        let (camera, _, scheduler) = setup(MockSdk::new().with_raw_payload(raw_payload()));
        camera.start_exposure(0.01, true).expect("start should succeed");
        scheduler.advance(Duration::from_secs(3));

        let image = camera.retrieve_image().expect("retrieve should succeed");
        assert_eq!((image.width, image.height), (16, 8));
        assert_eq!(image.pixels.len(), 128);
        assert_eq!(camera.sensor_dimensions(), Some((16, 8)));
        assert!(!camera.image_ready());

        assert!(matches!(camera.retrieve_image(), Err(CameraError::ImageNotReady)));
    }

    #[test]
    fn test_retrieve_non_raw_sets_error() {
        let sdk = MockSdk::new().with_payload(image_format::JPEG, vec![0xFF; 32]);
        let (camera, sdk, scheduler) = setup(sdk);
        camera.start_exposure(0.01, true).expect("start should succeed");
        scheduler.advance(Duration::from_secs(3));
        sdk.clear_calls();

        assert!(matches!(
            camera.retrieve_image(),
            Err(CameraError::UnsupportedFormat(image_format::JPEG))
        ));
        assert!(!sdk.calls().iter().any(|c| matches!(c, SdkCall::ReadImage(_))));
        assert_eq!(camera.state(), CaptureState::Error);
    }

    #[test]
    fn test_disconnect_cancels_pending_timer() {
        let (camera, _, scheduler) = setup(MockSdk::new().with_raw_payload(raw_payload()));
        camera.start_exposure(5.0, true).expect("start should succeed");
        camera.disconnect().expect("disconnect should succeed");
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(10)), 0);
        assert_eq!(camera.state(), CaptureState::Idle);
        assert!(!camera.image_ready());
    }

    #[test]
    fn test_gain_round_trip() {
        let (camera, _, _) = setup(MockSdk::new());
        camera.set_gain(800).expect("set_gain should succeed");
        assert_eq!(camera.gain().expect("gain"), 800);
        assert!(matches!(
            camera.set_gain(50),
            Err(CameraError::GainOutOfRange { .. })
        ));
    }

    #[test]
    fn test_connect_failure_unwinds() {
        let sdk = MockSdk::new();
        sdk.fail("SetExposureMode", codes::UNSUPPORTED);
        let camera = Camera::new(
            sdk.clone(),
            MockDecoder::new(),
            Arc::new(ManualScheduler::new()),
            &CameraConfig::default(),
        );
        let err = camera.connect().expect_err("connect should fail");
        assert_eq!(err.category(), ErrorCategory::Unsupported);
        assert!(!camera.is_connected());
        assert!(!sdk.is_open());
    }

    #[test]
    fn test_no_device_found() {
        let camera = Camera::new(
            MockSdk::new().with_device_count(0),
            MockDecoder::new(),
            Arc::new(ManualScheduler::new()),
            &CameraConfig::default(),
        );
        assert!(matches!(camera.connect(), Err(CameraError::NoDeviceFound)));
        assert!(!camera.is_connected());
    }

    #[test]
    fn test_shutdown_recycles_and_exits() {
        let (camera, sdk, _) = setup(MockSdk::new());
        camera.shutdown();
        assert!(!camera.is_connected());
        assert_eq!(sdk.calls(), vec![SdkCall::Close, SdkCall::Exit]);
    }
}
