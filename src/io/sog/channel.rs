use crate::error::DecodeError;


/// An RGBA8 raster decoded from one channel file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelImage {
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl ChannelImage {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len() / 4
    }

    /// Pixel at a row-major `index`, or `None` past the end of the raster.
    pub fn rgba(&self, index: usize) -> Option<[u8; 4]> {
        let start = index.checked_mul(4)?;
        self.pixels
            .get(start..start.checked_add(4)?)
            .and_then(|pixel| pixel.try_into().ok())
    }

    /// Pixel at `(x, y)`, or `None` outside the raster.
    pub fn at(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }

        self.rgba(y * self.width + x)
    }
}


/// Turns an encoded channel file into pixels. `prepare` runs once before
/// the first decode and may load whatever support the decoder needs.
pub trait ChannelDecoder: Send + Sync {
    fn prepare(&self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn decode_channel(&self, bytes: &[u8]) -> Result<ChannelImage, DecodeError>;
}


/// Decodes webp and png channels with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageChannelDecoder;

impl ChannelDecoder for ImageChannelDecoder {
    fn decode_channel(&self, bytes: &[u8]) -> Result<ChannelImage, DecodeError> {
        let image = image::load_from_memory(bytes)
            .map_err(|err| DecodeError::Collaborator(format!("channel image decode failed: {err}")))?
            .into_rgba8();

        Ok(ChannelImage {
            width: image.width() as usize,
            height: image.height() as usize,
            pixels: image.into_raw(),
        })
    }
}
