//! Scripted fakes for testing without hardware.
//!
//! [`MockSdk`] plays a tethered camera: it records every native call, can be
//! told to fail any operation with a vendor error code, and stages a RAW
//! payload that appears in the buffer once a shot is released.
//! [`MockDecoder`] understands the small `MRAW` container written by
//! [`encode_test_raw`], and [`ManualScheduler`] runs timers on a fake clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::codes;
use crate::scheduler::{CancellationToken, ScheduledTask, Scheduler, Task};
use crate::traits::{
    image_format, CameraSdk, CapabilityKind, DeviceHandle, DeviceInfo, ExposureMode, ImageInfo,
    InterfaceKind, LastError, NativeStatus, PriorityMode, RawDecoder, ReleaseMode, SdkResult,
    BULB_CODE,
};

/// A native call observed by [`MockSdk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkCall {
    /// `Init`.
    Init,
    /// `Exit`.
    Exit,
    /// `Detect`.
    Detect,
    /// `Open` with the device id.
    Open(String),
    /// `Close`.
    Close,
    /// `GetDeviceInfo`.
    DeviceInfo,
    /// `SetPriorityMode`.
    SetPriorityMode(PriorityMode),
    /// `SetExposureMode`.
    SetExposureMode(ExposureMode),
    /// `SetShutterSpeed` with code and bulb flag.
    SetShutterSpeed(i32, i32),
    /// `Release`.
    Release(ReleaseMode),
    /// `ReadImageInfo`.
    ReadImageInfo,
    /// `ReadImage` with the buffer length.
    ReadImage(usize),
    /// Capability count query.
    CapabilityCount(CapabilityKind),
    /// Capability fill query.
    CapabilityValues(CapabilityKind),
    /// `GetSensitivity`.
    Sensitivity,
    /// `SetSensitivity`.
    SetSensitivity(i32),
}

impl SdkCall {
    /// Operation name used to script failures.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Exit => "Exit",
            Self::Detect => "Detect",
            Self::Open(_) => "Open",
            Self::Close => "Close",
            Self::DeviceInfo => "GetDeviceInfo",
            Self::SetPriorityMode(_) => "SetPriorityMode",
            Self::SetExposureMode(_) => "SetExposureMode",
            Self::SetShutterSpeed(..) => "SetShutterSpeed",
            Self::Release(mode) => mode.operation(),
            Self::ReadImageInfo => "ReadImageInfo",
            Self::ReadImage(_) => "ReadImage",
            Self::CapabilityCount(_) => "CapabilityCount",
            Self::CapabilityValues(_) => "CapabilityValues",
            Self::Sensitivity => "GetSensitivity",
            Self::SetSensitivity(_) => "SetSensitivity",
        }
    }

    /// API code the mock reports for this call in `last_error`.
    const fn api_code(&self) -> i32 {
        match self {
            Self::Init => 0x0001,
            Self::Exit => 0x0002,
            Self::Detect => 0x0003,
            Self::Open(_) => 0x0004,
            Self::Close => 0x0005,
            Self::DeviceInfo => 0x0006,
            Self::SetPriorityMode(_) => 0x0101,
            Self::SetExposureMode(_) => 0x0102,
            Self::SetShutterSpeed(..) => 0x0201,
            Self::Release(_) => 0x0301,
            Self::ReadImageInfo => 0x0401,
            Self::ReadImage(_) => 0x0402,
            Self::CapabilityCount(_) | Self::CapabilityValues(_) => 0x0501,
            Self::Sensitivity | Self::SetSensitivity(_) => 0x0601,
        }
    }
}

#[derive(Debug)]
struct MockState {
    device_count: u32,
    next_handle: u64,
    open: Option<DeviceHandle>,
    info: DeviceInfo,
    calls: Vec<SdkCall>,
    failures: HashMap<&'static str, i32>,
    last_error: LastError,
    staged: Option<(ImageInfo, Vec<u8>)>,
    buffer: Option<(ImageInfo, Vec<u8>)>,
    sensitivities: Vec<i32>,
    shutter_codes: Vec<i32>,
    sensitivity: i32,
}

/// Scripted camera SDK.
///
/// Clones share state, so a test can keep one clone to inspect calls after
/// handing another to the camera.
#[derive(Debug, Clone)]
pub struct MockSdk {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSdk {
    /// One bulb-capable camera with an ISO 160-12800 range and nothing staged.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                device_count: 1,
                next_handle: 1,
                open: None,
                info: DeviceInfo {
                    vendor: "Mock".to_owned(),
                    manufacturer: "Mock Optical".to_owned(),
                    product: "Mock X-1".to_owned(),
                    firmware: "1.00".to_owned(),
                    serial: "0000001".to_owned(),
                    device_name: "mock".to_owned(),
                },
                calls: Vec::new(),
                failures: HashMap::new(),
                last_error: LastError::default(),
                staged: None,
                buffer: None,
                sensitivities: vec![-1, 160, 200, 400, 800, 1600, 3200, 6400, 12800],
                shutter_codes: vec![BULB_CODE, 9_843, 1_000_000, 64_000_000],
                sensitivity: 160,
            })),
        }
    }

    /// Report `count` devices on detect.
    #[must_use]
    pub fn with_device_count(self, count: u32) -> Self {
        self.state.lock().device_count = count;
        self
    }

    /// Drop bulb from the supported shutter list.
    #[must_use]
    pub fn without_bulb(self) -> Self {
        self.state.lock().shutter_codes.retain(|&c| c != BULB_CODE);
        self
    }

    /// Stage a RAW payload that every shot will produce.
    #[must_use]
    pub fn with_raw_payload(self, payload: Vec<u8>) -> Self {
        self.with_payload(image_format::RAW, payload)
    }

    /// Stage a payload of any format that every shot will produce.
    #[must_use]
    pub fn with_payload(self, format: u32, payload: Vec<u8>) -> Self {
        let info = ImageInfo {
            format,
            byte_size: i64::try_from(payload.len()).unwrap_or(i64::MAX),
            width: 0,
            height: 0,
        };
        self.state.lock().staged = Some((info, payload));
        self
    }

    /// Make `operation` fail with `err_code` until cleared.
    pub fn fail(&self, operation: &'static str, err_code: i32) {
        self.state.lock().failures.insert(operation, err_code);
    }

    /// Stop failing `operation`.
    pub fn clear_failure(&self, operation: &'static str) {
        self.state.lock().failures.remove(operation);
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<SdkCall> {
        self.state.lock().calls.clone()
    }

    /// Release commands issued so far, in order.
    pub fn releases(&self) -> Vec<ReleaseMode> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SdkCall::Release(mode) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Whether a handle is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open.is_some()
    }

    /// Whether an image sits in the camera buffer.
    pub fn has_pending_image(&self) -> bool {
        self.state.lock().buffer.is_some()
    }

    /// Record `call` and apply any scripted failure.
    fn record(&self, call: SdkCall) -> SdkResult<()> {
        let mut state = self.state.lock();
        let failure = state.failures.get(call.operation()).copied();
        let api_code = call.api_code();
        state.calls.push(call);
        if let Some(err_code) = failure {
            state.last_error = LastError { api_code, err_code };
            return Err(NativeStatus::ERROR);
        }
        Ok(())
    }

    fn require_open(&self, handle: DeviceHandle) -> SdkResult<()> {
        let mut state = self.state.lock();
        if state.open == Some(handle) {
            Ok(())
        } else {
            state.last_error = LastError {
                api_code: 0,
                err_code: codes::INVALID_CAMERA,
            };
            Err(NativeStatus::ERROR)
        }
    }
}

impl CameraSdk for MockSdk {
    fn init(&mut self) -> SdkResult<()> {
        self.record(SdkCall::Init)
    }

    fn exit(&mut self) -> SdkResult<()> {
        self.record(SdkCall::Exit)
    }

    fn detect(&mut self, _interface: InterfaceKind) -> SdkResult<u32> {
        self.record(SdkCall::Detect)?;
        Ok(self.state.lock().device_count)
    }

    fn open(&mut self, device_id: &str) -> SdkResult<DeviceHandle> {
        self.record(SdkCall::Open(device_id.to_owned()))?;
        let mut state = self.state.lock();
        let handle = DeviceHandle(state.next_handle);
        state.next_handle += 1;
        state.open = Some(handle);
        Ok(handle)
    }

    fn close(&mut self, handle: DeviceHandle) -> SdkResult<()> {
        self.record(SdkCall::Close)?;
        self.require_open(handle)?;
        self.state.lock().open = None;
        Ok(())
    }

    fn last_error(&mut self, _handle: DeviceHandle) -> SdkResult<LastError> {
        Ok(self.state.lock().last_error)
    }

    fn device_info(&mut self, handle: DeviceHandle) -> SdkResult<DeviceInfo> {
        self.record(SdkCall::DeviceInfo)?;
        self.require_open(handle)?;
        Ok(self.state.lock().info.clone())
    }

    fn set_priority_mode(&mut self, handle: DeviceHandle, mode: PriorityMode) -> SdkResult<()> {
        self.record(SdkCall::SetPriorityMode(mode))?;
        self.require_open(handle)
    }

    fn set_exposure_mode(&mut self, handle: DeviceHandle, mode: ExposureMode) -> SdkResult<()> {
        self.record(SdkCall::SetExposureMode(mode))?;
        self.require_open(handle)
    }

    fn set_shutter_speed(&mut self, handle: DeviceHandle, code: i32, bulb: i32) -> SdkResult<()> {
        self.record(SdkCall::SetShutterSpeed(code, bulb))?;
        self.require_open(handle)
    }

    fn release(&mut self, handle: DeviceHandle, mode: ReleaseMode, _options: i32) -> SdkResult<i32> {
        self.record(SdkCall::Release(mode))?;
        self.require_open(handle)?;
        if matches!(mode, ReleaseMode::ShootS1Off | ReleaseMode::BulbS2Off) {
            let mut state = self.state.lock();
            state.buffer = state.staged.clone();
        }
        Ok(0)
    }

    fn read_image_info(&mut self, handle: DeviceHandle) -> SdkResult<ImageInfo> {
        self.record(SdkCall::ReadImageInfo)?;
        self.require_open(handle)?;
        Ok(self
            .state
            .lock()
            .buffer
            .as_ref()
            .map(|(info, _)| *info)
            .unwrap_or_default())
    }

    fn read_image(&mut self, handle: DeviceHandle, buffer: &mut [u8]) -> SdkResult<()> {
        self.record(SdkCall::ReadImage(buffer.len()))?;
        self.require_open(handle)?;
        let mut state = self.state.lock();
        let Some((_, data)) = state.buffer.take() else {
            state.last_error = LastError {
                api_code: SdkCall::ReadImage(0).api_code(),
                err_code: codes::SEQUENCE,
            };
            return Err(NativeStatus::ERROR);
        };
        let n = data.len().min(buffer.len());
        if let (Some(dst), Some(src)) = (buffer.get_mut(..n), data.get(..n)) {
            dst.copy_from_slice(src);
        }
        Ok(())
    }

    fn capability_count(&mut self, handle: DeviceHandle, kind: CapabilityKind) -> SdkResult<usize> {
        self.record(SdkCall::CapabilityCount(kind))?;
        self.require_open(handle)?;
        let state = self.state.lock();
        Ok(match kind {
            CapabilityKind::Sensitivity => state.sensitivities.len(),
            CapabilityKind::ShutterSpeed => state.shutter_codes.len(),
        })
    }

    fn capability_values(
        &mut self,
        handle: DeviceHandle,
        kind: CapabilityKind,
        out: &mut [i32],
    ) -> SdkResult<usize> {
        self.record(SdkCall::CapabilityValues(kind))?;
        self.require_open(handle)?;
        let state = self.state.lock();
        let values = match kind {
            CapabilityKind::Sensitivity => &state.sensitivities,
            CapabilityKind::ShutterSpeed => &state.shutter_codes,
        };
        let n = values.len().min(out.len());
        if let (Some(dst), Some(src)) = (out.get_mut(..n), values.get(..n)) {
            dst.copy_from_slice(src);
        }
        Ok(n)
    }

    fn sensitivity(&mut self, handle: DeviceHandle) -> SdkResult<i32> {
        self.record(SdkCall::Sensitivity)?;
        self.require_open(handle)?;
        Ok(self.state.lock().sensitivity)
    }

    fn set_sensitivity(&mut self, handle: DeviceHandle, iso: i32) -> SdkResult<()> {
        self.record(SdkCall::SetSensitivity(iso))?;
        self.require_open(handle)?;
        self.state.lock().sensitivity = iso;
        Ok(())
    }
}

/// Sensor plane patterns for generated test RAW files.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Horizontal gradient from 0 to full scale.
    Gradient,
    /// Every sample set to the given value.
    Solid(u16),
    /// RGGB Bayer mosaic with the given channel levels.
    Bayer(u16, u16, u16),
}

/// Magic prefix of the mock RAW container.
const MRAW_MAGIC: &[u8; 4] = b"MRAW";
const MRAW_HEADER: usize = 12;

/// Generate a sensor plane of `width * height` samples.
pub fn generate_plane(width: u32, height: u32, pattern: TestPattern) -> Vec<u16> {
    let mut plane = Vec::with_capacity((width as usize) * (height as usize));
    for y in 0..height {
        for x in 0..width {
            let sample = match pattern {
                TestPattern::Gradient => {
                    let scaled = u64::from(x) * u64::from(u16::MAX) / u64::from(width.max(2) - 1);
                    u16::try_from(scaled).unwrap_or(u16::MAX)
                }
                TestPattern::Solid(v) => v,
                TestPattern::Bayer(r, g, b) => match (y % 2, x % 2) {
                    (0, 0) => r,
                    (1, 1) => b,
                    _ => g,
                },
            };
            plane.push(sample);
        }
    }
    plane
}

/// Encode a sensor plane as an `MRAW` container: magic, width and height as
/// little-endian `u32`, then little-endian `u16` samples.
pub fn encode_test_raw(width: u32, height: u32, plane: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MRAW_HEADER + plane.len() * 2);
    out.extend_from_slice(MRAW_MAGIC);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    for sample in plane {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Decoder return code: input is not an `MRAW` container.
pub const DECODER_NOT_RAW: i32 = -2;
/// Decoder return code: container truncated.
pub const DECODER_TRUNCATED: i32 = -3;
/// Decoder return code: `unpack` called before `open_from_memory`.
pub const DECODER_OUT_OF_ORDER: i32 = -4;

/// Counters shared between a [`MockDecoder`] and its clones.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Successful `open_from_memory` calls.
    pub opened: u32,
    /// Successful `unpack` calls.
    pub unpacked: u32,
    /// `recycle` calls.
    pub recycled: u32,
}

/// Decoder for the `MRAW` test container.
#[derive(Debug, Clone, Default)]
pub struct MockDecoder {
    data: Vec<u8>,
    width: i32,
    height: i32,
    plane: Option<Vec<u16>>,
    unpack_failure: Option<i32>,
    report_dimensions: Option<(i32, i32)>,
    drop_plane: bool,
    stats: Arc<Mutex<DecoderStats>>,
}

impl MockDecoder {
    /// Decoder with no scripted faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `unpack` fail with `code`.
    #[must_use]
    pub const fn with_unpack_failure(mut self, code: i32) -> Self {
        self.unpack_failure = Some(code);
        self
    }

    /// Report these dimensions regardless of the container header.
    #[must_use]
    pub const fn with_reported_dimensions(mut self, width: i32, height: i32) -> Self {
        self.report_dimensions = Some((width, height));
        self
    }

    /// Unpack successfully but expose no sensor plane.
    #[must_use]
    pub const fn without_plane(mut self) -> Self {
        self.drop_plane = true;
        self
    }

    /// Snapshot of the shared counters.
    pub fn stats(&self) -> DecoderStats {
        *self.stats.lock()
    }
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

impl RawDecoder for MockDecoder {
    fn open_from_memory(&mut self, data: &[u8]) -> Result<(), i32> {
        if data.get(..4) != Some(MRAW_MAGIC.as_slice()) {
            return Err(DECODER_NOT_RAW);
        }
        self.data = data.to_vec();
        self.stats.lock().opened += 1;
        Ok(())
    }

    fn unpack(&mut self) -> Result<(), i32> {
        if self.data.is_empty() {
            return Err(DECODER_OUT_OF_ORDER);
        }
        if let Some(code) = self.unpack_failure {
            return Err(code);
        }
        let width = read_u32(&self.data, 4).ok_or(DECODER_TRUNCATED)?;
        let height = read_u32(&self.data, 8).ok_or(DECODER_TRUNCATED)?;
        let samples: Vec<u16> = self
            .data
            .get(MRAW_HEADER..)
            .ok_or(DECODER_TRUNCATED)?
            .chunks_exact(2)
            .filter_map(|pair| pair.try_into().ok().map(u16::from_le_bytes))
            .collect();

        let (w, h) = self.report_dimensions.unwrap_or((
            i32::try_from(width).map_err(|_| DECODER_TRUNCATED)?,
            i32::try_from(height).map_err(|_| DECODER_TRUNCATED)?,
        ));
        self.width = w;
        self.height = h;
        self.plane = if self.drop_plane { None } else { Some(samples) };
        self.stats.lock().unpacked += 1;
        Ok(())
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn sensor_plane(&self) -> Option<&[u16]> {
        self.plane.as_deref()
    }

    fn recycle(&mut self) {
        self.data.clear();
        self.plane = None;
        self.width = 0;
        self.height = 0;
        self.stats.lock().recycled += 1;
    }

    fn error_string(&self, code: i32) -> String {
        match code {
            DECODER_NOT_RAW => "not an MRAW container".to_owned(),
            DECODER_TRUNCATED => "container truncated".to_owned(),
            DECODER_OUT_OF_ORDER => "no data opened".to_owned(),
            other => format!("mock decoder error {other}"),
        }
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    token: CancellationToken,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    pending: Vec<Pending>,
}

/// Scheduler driven by an explicit fake clock.
///
/// Nothing runs until [`ManualScheduler::advance`] moves the clock past a
/// task's due time; tasks then run on the calling thread.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl ManualScheduler {
    /// Clock at zero, nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current fake time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of scheduled, un-cancelled tasks.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|p| !p.token.is_cancelled())
            .count()
    }

    /// Delay until the next un-cancelled task is due.
    pub fn next_due_in(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .filter(|p| !p.token.is_cancelled())
            .map(|p| p.due.saturating_sub(state.now))
            .min()
    }

    /// Move the clock forward, running every task that falls due, including
    /// tasks scheduled by tasks. Returns how many ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                let index = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);
                index.map(|i| {
                    let pending = state.pending.remove(i);
                    state.now = pending.due;
                    pending
                })
            };

            let Some(pending) = next else { break };
            if !pending.token.is_cancelled() {
                (pending.task)();
                ran += 1;
            }
        }

        self.state.lock().now = target;
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let token = CancellationToken::new();
        let mut state = self.state.lock();
        state.seq += 1;
        let pending = Pending {
            due: state.now + delay,
            seq: state.seq,
            token: token.clone(),
            task,
        };
        state.pending.push(pending);
        ScheduledTask::new(token)
    }
}
