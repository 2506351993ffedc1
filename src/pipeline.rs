//! RAW acquisition: download the captured buffer and extract the sensor plane.

use tracing::{debug, info};

use crate::error::{CameraError, Result};
use crate::session::DeviceSession;
use crate::traits::{image_format, CameraSdk, RawDecoder};

/// Undemosaiced sensor plane owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major 16-bit samples, exactly `width * height` long.
    pub pixels: Vec<u16>,
}

impl DecodedImage {
    /// Sample at `(x, y)`, or `None` outside the image.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize) * (self.width as usize) + x as usize;
        self.pixels.get(offset).copied()
    }

    /// Smallest and largest sample.
    pub fn sample_range(&self) -> Option<(u16, u16)> {
        let min = self.pixels.iter().copied().min()?;
        let max = self.pixels.iter().copied().max()?;
        Some((min, max))
    }
}

/// Calls `recycle` on the decoder when dropped.
struct RecycleGuard<'a, D: RawDecoder> {
    decoder: &'a mut D,
}

impl<D: RawDecoder> Drop for RecycleGuard<'_, D> {
    fn drop(&mut self) {
        self.decoder.recycle();
    }
}

/// Download-and-decode pipeline around one decoder instance.
pub struct RawPipeline<D: RawDecoder> {
    decoder: D,
}

impl<D: RawDecoder> RawPipeline<D> {
    /// Wrap a decoder.
    pub const fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// Download the pending image from `session` and decode its sensor plane.
    ///
    /// Non-RAW payloads are rejected before anything is downloaded. Decoder
    /// resources are recycled whether or not decoding succeeds.
    pub fn acquire<S: CameraSdk>(&mut self, session: &mut DeviceSession<S>) -> Result<DecodedImage> {
        let info = session.read_image_info()?;
        if info.byte_size <= 0 {
            return Err(CameraError::EmptyImage(info.byte_size));
        }
        if !image_format::is_raw(info.format) {
            return Err(CameraError::UnsupportedFormat(info.format));
        }

        let size = usize::try_from(info.byte_size)
            .map_err(|_| CameraError::EmptyImage(info.byte_size))?;
        let mut buffer = vec![0u8; size];
        session.read_image(&mut buffer)?;
        debug!(bytes = size, format = info.format, "image downloaded");

        let image = self.decode(&buffer)?;
        info!(width = image.width, height = image.height, "RAW image decoded");
        Ok(image)
    }

    /// Decode a RAW file already held in memory.
    pub fn decode(&mut self, buffer: &[u8]) -> Result<DecodedImage> {
        let mut guard = RecycleGuard {
            decoder: &mut self.decoder,
        };
        let decoder = &mut *guard.decoder;

        decoder
            .open_from_memory(buffer)
            .map_err(|code| decode_error(&*decoder, "open_from_memory", code))?;
        decoder
            .unpack()
            .map_err(|code| decode_error(&*decoder, "unpack", code))?;

        let (width, height) = match (u32::try_from(decoder.width()), u32::try_from(decoder.height())) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(CameraError::DecodeIncomplete(format!(
                    "invalid dimensions {}x{}",
                    decoder.width(),
                    decoder.height()
                )))
            }
        };

        let plane = decoder
            .sensor_plane()
            .ok_or_else(|| CameraError::DecodeIncomplete("no sensor plane".to_owned()))?;

        let extent = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| CameraError::DecodeIncomplete("dimensions overflow".to_owned()))?;
        let pixels = plane
            .get(..extent)
            .ok_or_else(|| {
                CameraError::DecodeIncomplete(format!(
                    "sensor plane holds {} samples, expected {extent}",
                    plane.len()
                ))
            })?
            .to_vec();

        Ok(DecodedImage {
            width,
            height,
            pixels,
        })
    }

    /// Release decoder resources held for the current image.
    pub fn release(&mut self) {
        self.decoder.recycle();
    }
}

fn decode_error<D: RawDecoder>(decoder: &D, step: &'static str, code: i32) -> CameraError {
    CameraError::Decode {
        step,
        code,
        message: decoder.error_string(code),
    }
}
