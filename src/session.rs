//! Device session: owns the native handle and checks every native result.

use tracing::{debug, info, warn};

use crate::error::{CameraError, Result};
use crate::traits::{
    CameraSdk, CapabilityKind, DeviceHandle, DeviceInfo, ExposureMode, ImageInfo, InterfaceKind,
    NativeStatus, PriorityMode, ReleaseMode, SdkResult, BULB_CODE,
};

/// Device limits read once per connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilitySnapshot {
    /// Lowest ISO sensitivity.
    pub min_sensitivity: i32,
    /// Highest ISO sensitivity.
    pub max_sensitivity: i32,
    /// Shortest exposure in seconds.
    pub min_exposure: f64,
    /// Longest timed exposure in seconds.
    pub max_exposure: f64,
    /// Whether the body accepts bulb exposures.
    pub bulb_capable: bool,
}

/// Open session with one camera.
pub struct DeviceSession<S: CameraSdk> {
    sdk: S,
    sdk_initialized: bool,
    device_index: u32,
    handle: Option<DeviceHandle>,
    info: Option<DeviceInfo>,
}

impl<S: CameraSdk> DeviceSession<S> {
    /// Wrap an SDK; nothing is initialized until [`DeviceSession::connect`].
    pub const fn new(sdk: S, device_index: u32) -> Self {
        Self {
            sdk,
            sdk_initialized: false,
            device_index,
            handle: None,
            info: None,
        }
    }

    /// Whether a device is open.
    pub const fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Identity of the open device.
    pub const fn device_info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    /// Open the first device and put it under host control.
    ///
    /// Connecting an open session is a no-op. On failure any partially
    /// opened handle is closed and the session stays disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("connect on open session ignored");
            return Ok(());
        }

        if !self.sdk_initialized {
            let status = self.sdk.init();
            self.check_unbound("Init", status)?;
            self.sdk_initialized = true;
        }

        let status = self.sdk.detect(InterfaceKind::Usb);
        let count = self.check_unbound("Detect", status)?;
        if count == 0 {
            return Err(CameraError::NoDeviceFound);
        }

        let device_id = format!("ENUM:{}", self.device_index);
        let status = self.sdk.open(&device_id);
        let handle = self.check_unbound("Open", status)?;

        match self.negotiate(handle) {
            Ok(info) => {
                info!(
                    product = %info.product,
                    firmware = %info.firmware,
                    serial = %info.serial,
                    "camera connected"
                );
                self.handle = Some(handle);
                self.info = Some(info);
                Ok(())
            }
            Err(err) => {
                if let Err(status) = self.sdk.close(handle) {
                    warn!(code = status.0, "close after failed connect also failed");
                }
                Err(err)
            }
        }
    }

    fn negotiate(&mut self, handle: DeviceHandle) -> Result<DeviceInfo> {
        let status = self.sdk.set_priority_mode(handle, PriorityMode::Host);
        self.check_with(handle, "SetPriorityMode", status)?;
        let status = self.sdk.set_exposure_mode(handle, ExposureMode::Manual);
        self.check_with(handle, "SetExposureMode", status)?;
        let status = self.sdk.device_info(handle);
        self.check_with(handle, "GetDeviceInfo", status)
    }

    /// Close the device if open. Never fails on an already closed session.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.info = None;

        let status = self.sdk.close(handle);
        self.check_with(handle, "Close", status)?;
        info!("camera disconnected");
        Ok(())
    }

    /// Close the device and tear the SDK down, logging failures.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.disconnect() {
            warn!(%err, "disconnect during shutdown failed");
        }
        if self.sdk_initialized {
            if let Err(status) = self.sdk.exit() {
                warn!(code = status.0, "SDK exit failed");
            }
            self.sdk_initialized = false;
        }
    }

    fn handle(&self) -> Result<DeviceHandle> {
        self.handle.ok_or(CameraError::NotConnected)
    }

    /// Select a shutter speed by device code.
    pub fn set_shutter_speed(&mut self, code: i32) -> Result<()> {
        let handle = self.handle()?;
        let bulb = i32::from(code == BULB_CODE);
        debug!(code, bulb, "SetShutterSpeed");
        let status = self.sdk.set_shutter_speed(handle, code, bulb);
        self.check_with(handle, "SetShutterSpeed", status)
    }

    /// Issue a release command.
    pub fn release(&mut self, mode: ReleaseMode, options: i32) -> Result<i32> {
        let handle = self.handle()?;
        debug!(mode = ?mode, options, "Release");
        let status = self.sdk.release(handle, mode, options);
        self.check_with(handle, mode.operation(), status)
    }

    /// Describe the pending image.
    pub fn read_image_info(&mut self) -> Result<ImageInfo> {
        let handle = self.handle()?;
        let status = self.sdk.read_image_info(handle);
        self.check_with(handle, "ReadImageInfo", status)
    }

    /// Download the pending image.
    pub fn read_image(&mut self, buffer: &mut [u8]) -> Result<()> {
        let handle = self.handle()?;
        debug!(bytes = buffer.len(), "ReadImage");
        let status = self.sdk.read_image(handle, buffer);
        self.check_with(handle, "ReadImage", status)
    }

    /// Current ISO sensitivity.
    pub fn sensitivity(&mut self) -> Result<i32> {
        let handle = self.handle()?;
        let status = self.sdk.sensitivity(handle);
        self.check_with(handle, "GetSensitivity", status)
    }

    /// Select an ISO sensitivity.
    pub fn set_sensitivity(&mut self, iso: i32) -> Result<()> {
        let handle = self.handle()?;
        let status = self.sdk.set_sensitivity(handle, iso);
        self.check_with(handle, "SetSensitivity", status)
    }

    /// Read a capability list with the count-then-fill pattern.
    pub fn capability_values(&mut self, kind: CapabilityKind) -> Result<Vec<i32>> {
        let handle = self.handle()?;
        let status = self.sdk.capability_count(handle, kind);
        let count = self.check_with(handle, "CapabilityCount", status)?;

        let mut values = vec![0; count];
        let status = self.sdk.capability_values(handle, kind, &mut values);
        let written = self.check_with(handle, "CapabilityValues", status)?;
        values.truncate(written.min(count));
        Ok(values)
    }

    /// Read sensitivity and shutter capabilities.
    ///
    /// Exposure limits come from the caller (the shutter table); the device
    /// list only decides bulb support.
    pub fn capabilities(&mut self, min_exposure: f64, max_exposure: f64) -> Result<CapabilitySnapshot> {
        let isos: Vec<i32> = self
            .capability_values(CapabilityKind::Sensitivity)?
            .into_iter()
            .filter(|&iso| iso > 0)
            .collect();
        let speeds = self.capability_values(CapabilityKind::ShutterSpeed)?;

        Ok(CapabilitySnapshot {
            min_sensitivity: isos.iter().copied().min().unwrap_or(0),
            max_sensitivity: isos.iter().copied().max().unwrap_or(0),
            min_exposure,
            max_exposure,
            bulb_capable: speeds.contains(&BULB_CODE),
        })
    }

    /// Translate a failed call made before a handle exists.
    fn check_unbound<T>(&self, operation: &'static str, status: SdkResult<T>) -> Result<T> {
        status.map_err(|NativeStatus(code)| {
            warn!(operation, code, "native call failed");
            CameraError::native(operation, 0, code)
        })
    }

    /// Translate a failed call on `handle` using the SDK's last error.
    fn check_with<T>(
        &mut self,
        handle: DeviceHandle,
        operation: &'static str,
        status: SdkResult<T>,
    ) -> Result<T> {
        match status {
            Ok(value) => Ok(value),
            Err(NativeStatus(raw)) => {
                let (api_code, err_code) = match self.sdk.last_error(handle) {
                    Ok(last) => (last.api_code, last.err_code),
                    Err(_) => (0, raw),
                };
                warn!(operation, api_code, err_code, "native call failed");
                Err(CameraError::native(operation, api_code, err_code))
            }
        }
    }
}

impl<S: CameraSdk> Drop for DeviceSession<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, ErrorCategory};
    use crate::mock::{MockSdk, SdkCall};

    fn connected(sdk: &MockSdk) -> DeviceSession<MockSdk> {
        let mut session = DeviceSession::new(sdk.clone(), 0);
        session.connect().expect("connect should succeed");
        session
    }

    #[test]
    fn test_connect_negotiates_host_control() {
        let sdk = MockSdk::new();
        let session = connected(&sdk);
        assert!(session.is_connected());
        assert_eq!(
            sdk.calls(),
            vec![
                SdkCall::Init,
                SdkCall::Detect,
                SdkCall::Open("ENUM:0".to_owned()),
                SdkCall::SetPriorityMode(PriorityMode::Host),
                SdkCall::SetExposureMode(ExposureMode::Manual),
                SdkCall::DeviceInfo,
            ]
        );
    }

    #[test]
    fn test_connect_and_disconnect_idempotent() {
        let sdk = MockSdk::new();
        let mut session = connected(&sdk);
        sdk.clear_calls();

        session.connect().expect("second connect should succeed");
        assert!(sdk.calls().is_empty());

        session.disconnect().expect("disconnect should succeed");
        session.disconnect().expect("second disconnect should succeed");
        assert_eq!(sdk.calls(), vec![SdkCall::Close]);
        assert!(session.device_info().is_none());
    }

    #[test]
    fn test_no_device_found() {
        let sdk = MockSdk::new().with_device_count(0);
        let mut session = DeviceSession::new(sdk.clone(), 0);
        assert!(matches!(session.connect(), Err(CameraError::NoDeviceFound)));
        assert!(!session.is_connected());
        assert!(!sdk.calls().iter().any(|c| matches!(c, SdkCall::Open(_))));
    }

    #[test]
    fn test_failed_negotiation_closes_handle() {
        let sdk = MockSdk::new();
        sdk.fail("SetPriorityMode", codes::BUSY);
        let mut session = DeviceSession::new(sdk.clone(), 0);

        let err = session.connect().expect_err("connect should fail");
        assert!(matches!(
            err,
            CameraError::Native {
                operation: "SetPriorityMode",
                api_code: 0x0101,
                err_code: codes::BUSY,
                category: ErrorCategory::Busy,
            }
        ));
        assert!(!session.is_connected());
        assert!(!sdk.is_open());
        assert_eq!(sdk.calls().last(), Some(&SdkCall::Close));
    }

    #[test]
    fn test_init_failure_is_unbound() {
        let sdk = MockSdk::new();
        sdk.fail("Init", codes::COMMUNICATION);
        let mut session = DeviceSession::new(sdk, 0);
        let err = session.connect().expect_err("connect should fail");
        assert!(matches!(
            err,
            CameraError::Native {
                operation: "Init",
                api_code: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_commands_require_connection() {
        let mut session = DeviceSession::new(MockSdk::new(), 0);
        assert!(matches!(
            session.set_shutter_speed(9_843),
            Err(CameraError::NotConnected)
        ));
        assert!(matches!(session.read_image_info(), Err(CameraError::NotConnected)));
    }

    #[test]
    fn test_bulb_flag_follows_code() {
        let sdk = MockSdk::new();
        let mut session = connected(&sdk);
        sdk.clear_calls();

        session.set_shutter_speed(9_843).expect("timed code should succeed");
        session.set_shutter_speed(BULB_CODE).expect("bulb code should succeed");
        assert_eq!(
            sdk.calls(),
            vec![
                SdkCall::SetShutterSpeed(9_843, 0),
                SdkCall::SetShutterSpeed(BULB_CODE, 1),
            ]
        );
    }

    #[test]
    fn test_capabilities_skip_auto_iso() {
        let sdk = MockSdk::new();
        let mut session = connected(&sdk);
        let caps = session
            .capabilities(0.001, 60.0)
            .expect("capabilities should succeed");
        assert_eq!(caps.min_sensitivity, 160);
        assert_eq!(caps.max_sensitivity, 12_800);
        assert!(caps.bulb_capable);

        let sdk = MockSdk::new().without_bulb();
        let mut session = connected(&sdk);
        let caps = session
            .capabilities(0.001, 60.0)
            .expect("capabilities should succeed");
        assert!(!caps.bulb_capable);
    }

    #[test]
    fn test_shutdown_exits_once() {
        let sdk = MockSdk::new();
        let mut session = connected(&sdk);
        sdk.clear_calls();

        session.shutdown();
        session.shutdown();
        drop(session);
        assert_eq!(sdk.calls(), vec![SdkCall::Close, SdkCall::Exit]);
    }
}
