//! WSQ decoder interface and image finalization.

use tracing::{debug, warn};

use super::error::CodecError;

/// Decoded raw grayscale image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes compressed (WSQ) image payloads into raw pixels.
pub trait WsqDecoder {
    fn decode(&self, wsq: &[u8]) -> Result<DecodedImage, CodecError>;
}

/// Decoder used when no WSQ library is linked in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWsqDecoder;

impl WsqDecoder for NoWsqDecoder {
    fn decode(&self, _wsq: &[u8]) -> Result<DecodedImage, CodecError> {
        Err(CodecError::Unavailable)
    }
}

/// Image handed to the caller once a capture completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// True when `data` is still the compressed payload.
    pub is_wsq: bool,
}

/// Turn the accumulated payload into the capture result.
///
/// A failed decode or a pixel count that does not match the decoded
/// dimensions falls back to the raw accumulated bytes.
pub fn finalize_image(
    decoder: &dyn WsqDecoder,
    payload: &[u8],
    compressed: bool,
    fallback_dims: (u32, u32),
) -> FinalImage {
    let raw = || FinalImage {
        data: payload.to_vec(),
        width: fallback_dims.0,
        height: fallback_dims.1,
        is_wsq: compressed,
    };

    if !compressed {
        return raw();
    }

    let decoded = decoder.decode(payload).and_then(|image| {
        if image.pixels.len() as u64 != u64::from(image.width) * u64::from(image.height) {
            return Err(CodecError::DimensionMismatch {
                len: image.pixels.len(),
                width: image.width,
                height: image.height,
            });
        }
        Ok(image)
    });

    match decoded {
        Ok(image) => {
            debug!(
                "WSQ decoded {} bytes into {}x{}",
                payload.len(),
                image.width,
                image.height
            );
            FinalImage {
                data: image.pixels,
                width: image.width,
                height: image.height,
                is_wsq: false,
            }
        }
        Err(e) => {
            warn!("{e}, returning raw WSQ payload");
            raw()
        }
    }
}
