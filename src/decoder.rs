//! RAW decoding engine backed by the `rawloader` crate.

use std::io::Cursor;

use tracing::debug;

use crate::traits::RawDecoder;

/// `unpack` called with nothing opened.
pub const ERR_NOT_OPEN: i32 = -1;
/// Empty input buffer.
pub const ERR_EMPTY_INPUT: i32 = -2;
/// `rawloader` could not decode the file.
pub const ERR_DECODE: i32 = -3;
/// Decoded data is not a single-channel integer plane.
pub const ERR_UNSUPPORTED_LAYOUT: i32 = -4;

/// Decoder state for one image at a time.
#[derive(Debug, Default)]
pub struct RawloaderDecoder {
    input: Vec<u8>,
    width: usize,
    height: usize,
    plane: Option<Vec<u16>>,
    last_message: Option<String>,
}

impl RawloaderDecoder {
    /// Empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawDecoder for RawloaderDecoder {
    fn open_from_memory(&mut self, data: &[u8]) -> Result<(), i32> {
        if data.is_empty() {
            return Err(ERR_EMPTY_INPUT);
        }
        self.input = data.to_vec();
        self.last_message = None;
        Ok(())
    }

    fn unpack(&mut self) -> Result<(), i32> {
        if self.input.is_empty() {
            return Err(ERR_NOT_OPEN);
        }

        let mut reader = Cursor::new(self.input.as_slice());
        let image = rawloader::decode(&mut reader).map_err(|err| {
            self.last_message = Some(format!("{err:?}"));
            ERR_DECODE
        })?;

        debug!(
            make = %image.clean_make,
            model = %image.clean_model,
            width = image.width,
            height = image.height,
            cpp = image.cpp,
            "rawloader decoded image"
        );

        let (width, height, cpp) = (image.width, image.height, image.cpp);
        // Only a single-component integer plane is an undemosaiced sensor readout
        let rawloader::RawImageData::Integer(samples) = image.data else {
            return Err(ERR_UNSUPPORTED_LAYOUT);
        };
        if cpp != 1 {
            return Err(ERR_UNSUPPORTED_LAYOUT);
        }

        self.width = width;
        self.height = height;
        self.plane = Some(samples);
        Ok(())
    }

    fn width(&self) -> i32 {
        i32::try_from(self.width).unwrap_or(0)
    }

    fn height(&self) -> i32 {
        i32::try_from(self.height).unwrap_or(0)
    }

    fn sensor_plane(&self) -> Option<&[u16]> {
        self.plane.as_deref()
    }

    fn recycle(&mut self) {
        self.input = Vec::new();
        self.plane = None;
        self.width = 0;
        self.height = 0;
    }

    fn error_string(&self, code: i32) -> String {
        match code {
            ERR_NOT_OPEN => "no image opened".to_owned(),
            ERR_EMPTY_INPUT => "empty input buffer".to_owned(),
            ERR_DECODE => self
                .last_message
                .clone()
                .unwrap_or_else(|| "rawloader decode failed".to_owned()),
            ERR_UNSUPPORTED_LAYOUT => "not a single-channel integer sensor plane".to_owned(),
            other => format!("unknown decoder code {other}"),
        }
    }
}
