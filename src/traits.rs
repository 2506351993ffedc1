//! Native boundary: the camera command interface and the RAW decoding engine.
//!
//! Both subsystems are expressed as traits so the session, state machine and
//! pipeline can run against real bindings or the scripted fakes in `mock`.
//! Every value crossing the boundary is copied into an owned struct; no
//! foreign pointer outlives the call that produced it.

/// Raw non-success return of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeStatus(pub i32);

impl NativeStatus {
    /// The SDK success sentinel.
    pub const SUCCESS: Self = Self(0);
    /// Generic failure; details are available from `last_error`.
    pub const ERROR: Self = Self(-1);

    /// Whether this status is the success sentinel.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

/// Result of a native call.
pub type SdkResult<T> = std::result::Result<T, NativeStatus>;

/// Opaque reference to an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Transport used for device enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum InterfaceKind {
    /// USB tethering.
    Usb = 0x0001,
}

/// Which side owns camera settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PriorityMode {
    /// Settings are controlled from the camera body.
    Camera = 0x0001,
    /// Settings are controlled by the host.
    Host = 0x0002,
}

/// Exposure program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExposureMode {
    /// Full manual exposure.
    Manual = 0x0001,
    /// Aperture priority.
    AperturePriority = 0x0003,
}

/// Shutter release commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReleaseMode {
    /// Release-halfway ("S1 off").
    S1Off = 0x0004,
    /// Bulb stop ("S2 off").
    BulbS2Off = 0x0008,
    /// Shoot, then release-halfway.
    ShootS1Off = 0x0104,
    /// Press-halfway ("S1 on").
    S1On = 0x0200,
    /// Bulb start ("S2 on").
    BulbS2On = 0x0500,
}

impl ReleaseMode {
    /// Short name used in logs and error context.
    pub const fn operation(self) -> &'static str {
        match self {
            Self::S1Off => "Release(press-halfway release)",
            Self::BulbS2Off => "Release(bulb-stop)",
            Self::ShootS1Off => "Release(shoot)",
            Self::S1On => "Release(press-halfway)",
            Self::BulbS2On => "Release(bulb-start)",
        }
    }
}

/// Capability lists enumerable with the count-then-fill pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// Supported ISO sensitivities.
    Sensitivity,
    /// Supported shutter speed codes.
    ShutterSpeed,
}

/// Native shutter code selecting bulb exposure.
pub const BULB_CODE: i32 = -1;

/// Native image format codes reported by `read_image_info`.
pub mod image_format {
    /// RAW only.
    pub const RAW: u32 = 1;
    /// RAW plus fine JPEG.
    pub const RAW_JPEG_FINE: u32 = 2;
    /// RAW plus normal JPEG.
    pub const RAW_JPEG_NORMAL: u32 = 3;
    /// RAW plus HEIF.
    pub const RAW_HEIF: u32 = 4;
    /// JPEG only.
    pub const JPEG: u32 = 7;
    /// HEIF only.
    pub const HEIF: u32 = 8;

    /// Formats whose first payload is a RAW file.
    pub const RAW_FORMATS: [u32; 4] = [RAW, RAW_JPEG_FINE, RAW_JPEG_NORMAL, RAW_HEIF];

    /// Whether `format` carries RAW data.
    pub fn is_raw(format: u32) -> bool {
        RAW_FORMATS.contains(&format)
    }
}

/// Identity fields read after opening a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Vendor string.
    pub vendor: String,
    /// Manufacturer string.
    pub manufacturer: String,
    /// Product (model) name.
    pub product: String,
    /// Firmware version.
    pub firmware: String,
    /// Serial number.
    pub serial: String,
    /// User-assigned device name.
    pub device_name: String,
}

/// Description of the image waiting in the camera buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// Native format code, see [`image_format`].
    pub format: u32,
    /// Payload size in bytes; zero or negative when nothing is pending.
    pub byte_size: i64,
    /// Image width reported by the camera.
    pub width: i32,
    /// Image height reported by the camera.
    pub height: i32,
}

/// Last error pair reported by the SDK.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastError {
    /// API code of the failing call.
    pub api_code: i32,
    /// Vendor error code.
    pub err_code: i32,
}

/// Abstraction over the proprietary camera command interface.
///
/// One method per native entry point. Implementations do no interpretation
/// of failures beyond returning the raw [`NativeStatus`].
pub trait CameraSdk {
    /// Initialize the SDK for this process.
    fn init(&mut self) -> SdkResult<()>;

    /// Tear the SDK down.
    fn exit(&mut self) -> SdkResult<()>;

    /// Enumerate devices on an interface; returns the device count.
    fn detect(&mut self, interface: InterfaceKind) -> SdkResult<u32>;

    /// Open a device by id string (`"ENUM:<index>"`).
    fn open(&mut self, device_id: &str) -> SdkResult<DeviceHandle>;

    /// Close an open device.
    fn close(&mut self, handle: DeviceHandle) -> SdkResult<()>;

    /// Error pair of the last failing call on `handle`.
    fn last_error(&mut self, handle: DeviceHandle) -> SdkResult<LastError>;

    /// Read identity fields.
    fn device_info(&mut self, handle: DeviceHandle) -> SdkResult<DeviceInfo>;

    /// Negotiate which side owns the settings.
    fn set_priority_mode(&mut self, handle: DeviceHandle, mode: PriorityMode) -> SdkResult<()>;

    /// Select the exposure program.
    fn set_exposure_mode(&mut self, handle: DeviceHandle, mode: ExposureMode) -> SdkResult<()>;

    /// Select a shutter speed; `bulb` is 1 for bulb exposures, 0 otherwise.
    fn set_shutter_speed(&mut self, handle: DeviceHandle, code: i32, bulb: i32) -> SdkResult<()>;

    /// Issue a release command; returns the shot status word.
    fn release(&mut self, handle: DeviceHandle, mode: ReleaseMode, options: i32) -> SdkResult<i32>;

    /// Describe the pending image.
    fn read_image_info(&mut self, handle: DeviceHandle) -> SdkResult<ImageInfo>;

    /// Download the pending image into `buffer`.
    fn read_image(&mut self, handle: DeviceHandle, buffer: &mut [u8]) -> SdkResult<()>;

    /// Number of entries in a capability list.
    fn capability_count(&mut self, handle: DeviceHandle, kind: CapabilityKind) -> SdkResult<usize>;

    /// Fill `out` with a capability list; returns the number written.
    fn capability_values(
        &mut self,
        handle: DeviceHandle,
        kind: CapabilityKind,
        out: &mut [i32],
    ) -> SdkResult<usize>;

    /// Current ISO sensitivity.
    fn sensitivity(&mut self, handle: DeviceHandle) -> SdkResult<i32>;

    /// Select an ISO sensitivity.
    fn set_sensitivity(&mut self, handle: DeviceHandle, iso: i32) -> SdkResult<()>;
}

/// Abstraction over a RAW decoding engine.
///
/// The engine holds per-image state between `open_from_memory` and
/// `recycle`. Failing steps return a non-zero engine code that
/// [`RawDecoder::error_string`] can describe.
pub trait RawDecoder {
    /// Attach a RAW file held in memory.
    fn open_from_memory(&mut self, data: &[u8]) -> std::result::Result<(), i32>;

    /// Unpack the sensor data of the attached file.
    fn unpack(&mut self) -> std::result::Result<(), i32>;

    /// Decoded width in pixels.
    fn width(&self) -> i32;

    /// Decoded height in pixels.
    fn height(&self) -> i32;

    /// Undemosaiced sensor plane, row-major, if unpacking produced one.
    fn sensor_plane(&self) -> Option<&[u16]>;

    /// Release per-image resources.
    fn recycle(&mut self);

    /// Text for an engine return code.
    fn error_string(&self, code: i32) -> String;
}
