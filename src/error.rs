//! Error taxonomy for camera operations.
//!
//! Native failures are reported by the SDK as an `(api_code, err_code)` pair.
//! The error code is folded into an [`ErrorCategory`] through a fixed lookup;
//! codes the table does not know land in [`ErrorCategory::Unknown`] instead of
//! being dropped.

use std::fmt;

use thiserror::Error;

use crate::exposure::CaptureState;

/// Vendor error codes reported by `GetLastError`.
pub mod codes {
    /// No error.
    pub const NO_ERROR: i32 = 0x0000;
    /// Command issued out of sequence.
    pub const SEQUENCE: i32 = 0x1001;
    /// Parameter rejected.
    pub const PARAM: i32 = 0x1002;
    /// Handle does not refer to an open camera.
    pub const INVALID_CAMERA: i32 = 0x1003;
    /// A support library failed to load.
    pub const LOAD_LIBRARY: i32 = 0x1004;
    /// Command unsupported by this body.
    pub const UNSUPPORTED: i32 = 0x1005;
    /// Camera busy.
    pub const BUSY: i32 = 0x1006;
    /// Autofocus timed out.
    pub const AF_TIMEOUT: i32 = 0x1007;
    /// Shot could not be taken.
    pub const SHOOT_ERROR: i32 = 0x1008;
    /// Frame buffer full.
    pub const FRAME_FULL: i32 = 0x1009;
    /// Camera in standby.
    pub const STANDBY: i32 = 0x1010;
    /// Transport driver missing.
    pub const NO_DRIVER: i32 = 0x1011;
    /// No model module for this body.
    pub const NO_MODEL_MODULE: i32 = 0x1012;
    /// API entry point not found.
    pub const API_NOT_FOUND: i32 = 0x1013;
    /// API version mismatch.
    pub const API_MISMATCH: i32 = 0x1014;
    /// Camera connected in an unsupported USB mode.
    pub const INVALID_USB_MODE: i32 = 0x1015;
    /// Forced mode change while busy.
    pub const FORCE_MODE_BUSY: i32 = 0x1016;
    /// Camera is running another function.
    pub const RUNNING_OTHER_FUNCTION: i32 = 0x1017;
    /// Transport failure.
    pub const COMMUNICATION: i32 = 0x2001;
    /// Transport timeout.
    pub const TIMEOUT: i32 = 0x2002;
    /// Settings combination rejected.
    pub const COMBINATION: i32 = 0x2003;
    /// Media write failure.
    pub const WRITE_ERROR: i32 = 0x2004;
    /// Media full.
    pub const CARD_FULL: i32 = 0x2005;
    /// Hardware fault.
    pub const HARDWARE: i32 = 0x3001;
    /// SDK internal failure.
    pub const INTERNAL: i32 = 0x9001;
    /// SDK out of memory.
    pub const MEMORY_FULL: i32 = 0x9002;
    /// Unspecified failure.
    pub const UNKNOWN: i32 = 0x9100;
}

/// Uniform category every native error code maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Device busy or command out of sequence.
    Busy,
    /// Transport failure or timeout.
    Communication,
    /// Operation not supported by the device or SDK.
    Unsupported,
    /// A parameter or parameter combination was rejected.
    InvalidParameter,
    /// Hardware fault.
    Hardware,
    /// SDK internal failure.
    Internal,
    /// Host or device memory exhausted.
    MemoryFull,
    /// Storage full or write failure.
    CardFull,
    /// Anything the lookup does not recognise.
    Unknown,
}

impl ErrorCategory {
    /// Map a vendor error code to its category.
    pub const fn from_err_code(code: i32) -> Self {
        match code {
            codes::BUSY
            | codes::SEQUENCE
            | codes::FORCE_MODE_BUSY
            | codes::RUNNING_OTHER_FUNCTION => Self::Busy,
            codes::COMMUNICATION
            | codes::TIMEOUT
            | codes::AF_TIMEOUT
            | codes::INVALID_CAMERA
            | codes::STANDBY => Self::Communication,
            codes::UNSUPPORTED
            | codes::LOAD_LIBRARY
            | codes::NO_DRIVER
            | codes::NO_MODEL_MODULE
            | codes::API_NOT_FOUND
            | codes::API_MISMATCH
            | codes::INVALID_USB_MODE => Self::Unsupported,
            codes::PARAM | codes::COMBINATION => Self::InvalidParameter,
            codes::HARDWARE | codes::SHOOT_ERROR => Self::Hardware,
            codes::INTERNAL => Self::Internal,
            codes::MEMORY_FULL | codes::FRAME_FULL => Self::MemoryFull,
            codes::CARD_FULL | codes::WRITE_ERROR => Self::CardFull,
            _ => Self::Unknown,
        }
    }

    /// Human-readable description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Busy => "device busy",
            Self::Communication => "communication failure",
            Self::Unsupported => "not supported",
            Self::InvalidParameter => "invalid parameter",
            Self::Hardware => "hardware fault",
            Self::Internal => "internal SDK error",
            Self::MemoryFull => "memory full",
            Self::CardFull => "card full or write error",
            Self::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// A native call returned something other than the success sentinel.
    #[error("{operation} failed: {category} (api 0x{api_code:04X}, err 0x{err_code:04X})")]
    Native {
        /// Name of the native operation.
        operation: &'static str,
        /// API code reported by the SDK.
        api_code: i32,
        /// Error code reported by the SDK.
        err_code: i32,
        /// Category derived from `err_code`.
        category: ErrorCategory,
    },

    /// Device enumeration found nothing.
    #[error("no camera detected")]
    NoDeviceFound,

    /// Operation requires an open session.
    #[error("camera is not connected")]
    NotConnected,

    /// An exposure is already in flight or being downloaded.
    #[error("camera is not idle (state: {state:?})")]
    NotIdle {
        /// State observed when the request arrived.
        state: CaptureState,
    },

    /// No image is waiting to be retrieved.
    #[error("no image is ready")]
    ImageNotReady,

    /// The device has no primitive for this operation.
    #[error("{0} is not supported")]
    NotSupported(&'static str),

    /// No shutter code matches the requested duration.
    #[error("no shutter speed matches {0} s")]
    UnsupportedExposureDuration(f64),

    /// Requested duration lies outside the device range.
    #[error("exposure {requested} s outside [{min}, {max}] s")]
    ExposureOutOfRange {
        /// Requested duration in seconds.
        requested: f64,
        /// Shortest supported duration.
        min: f64,
        /// Longest supported timed duration.
        max: f64,
    },

    /// Requested sensitivity is not offered by the device.
    #[error("gain {requested} not supported (range {min}..={max})")]
    GainOutOfRange {
        /// Requested sensitivity.
        requested: i32,
        /// Lowest supported sensitivity.
        min: i32,
        /// Highest supported sensitivity.
        max: i32,
    },

    /// The captured payload is not a RAW format.
    #[error("image format 0x{0:04X} is not a RAW format")]
    UnsupportedFormat(u32),

    /// The device reported an empty or negative image size.
    #[error("device reported image size {0}")]
    EmptyImage(i64),

    /// The RAW engine rejected a step.
    #[error("RAW decoder {step} failed: {message} ({code})")]
    Decode {
        /// Decoder step that failed.
        step: &'static str,
        /// Decoder return code.
        code: i32,
        /// Decoder-provided text for `code`.
        message: String,
    },

    /// The decoder finished without a usable sensor plane.
    #[error("decoded image incomplete: {0}")]
    DecodeIncomplete(String),

    /// Configuration could not be loaded.
    #[error("configuration load error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("configuration validation error: {0}")]
    InvalidConfig(String),
}

impl CameraError {
    /// Build a native error from the codes fetched after a failed call.
    pub const fn native(operation: &'static str, api_code: i32, err_code: i32) -> Self {
        Self::Native {
            operation,
            api_code,
            err_code,
            category: ErrorCategory::from_err_code(err_code),
        }
    }

    /// Category of this error.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Native { category, .. } => *category,
            Self::NoDeviceFound | Self::NotConnected => ErrorCategory::Communication,
            Self::NotIdle { .. } | Self::ImageNotReady => ErrorCategory::Busy,
            Self::NotSupported(_) | Self::UnsupportedFormat(_) => ErrorCategory::Unsupported,
            Self::UnsupportedExposureDuration(_)
            | Self::ExposureOutOfRange { .. }
            | Self::GainOutOfRange { .. }
            | Self::InvalidConfig(_)
            | Self::Config(_) => ErrorCategory::InvalidParameter,
            Self::EmptyImage(_) | Self::Decode { .. } | Self::DecodeIncomplete(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
