//! Raw-Cam-Capture: tethered camera acquisition core
//!
//! This library drives a tethered interchangeable-lens camera through its
//! vendor command interface and hands back undemosaiced 16-bit sensor planes.
//! Native calls sit behind the [`CameraSdk`] and [`RawDecoder`] traits, so the
//! same session, exposure state machine and RAW pipeline run against real
//! bindings or the scripted fakes in `mock`.

pub mod camera;
pub mod config;
pub mod decoder;
pub mod error;
pub mod exposure;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod shutter;
pub mod traits;
pub mod validation;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use camera::Camera;
pub use config::CameraConfig;
pub use decoder::RawloaderDecoder;
pub use error::{CameraError, ErrorCategory, Result};
pub use exposure::{CaptureState, ExposureRequest};
pub use pipeline::DecodedImage;
pub use scheduler::{Scheduler, ThreadScheduler};
pub use session::CapabilitySnapshot;
pub use shutter::ShutterSpeedTable;
pub use traits::{CameraSdk, DeviceInfo, RawDecoder};
