//! Image codec port and its production implementation.
//!
//! The optimizer only talks to [`ImageCodec`]; [`RasterCodec`] backs it with
//! the `image` crate for decoding and resampling and `jpeg-encoder` for CMYK
//! JPEG output, which `image` cannot write.

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

use crate::error::CodecError;
use crate::model::{ChromaSampling, ColorSpace, EncodeSettings, ImageFormatKind};

/// Decode → resize → colour-convert → encode, one raster at a time.
///
/// Implementations must be pure with respect to their inputs: the same bytes
/// and parameters always yield the same output.
pub trait ImageCodec: Send + Sync {
    /// Decoded, codec-owned pixel representation.
    type Raster: Send;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Raster, CodecError>;

    fn dimensions(&self, raster: &Self::Raster) -> (u32, u32);

    /// Scale so the result fits inside `width` × `height` with its aspect
    /// ratio preserved.
    fn resize_to_fit(
        &self,
        raster: Self::Raster,
        width: u32,
        height: u32,
    ) -> Result<Self::Raster, CodecError>;

    fn set_color_space(
        &self,
        raster: Self::Raster,
        space: ColorSpace,
    ) -> Result<Self::Raster, CodecError>;

    fn encode(&self, raster: &Self::Raster, settings: &EncodeSettings)
        -> Result<Vec<u8>, CodecError>;

    /// Largest width or height the codec can produce. Callers check targets
    /// against it before allocating anything.
    fn max_dimension(&self) -> u32 {
        u32::MAX
    }
}

/// Interleaved 8-bit CMYK pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CmykBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Raster {
    Rgb(RgbImage),
    Cmyk(CmykBuffer),
}

impl Raster {
    pub fn color_space(&self) -> ColorSpace {
        match self {
            Raster::Rgb(_) => ColorSpace::Rgb,
            Raster::Cmyk(_) => ColorSpace::Cmyk,
        }
    }
}

/// Production codec.
#[derive(Debug, Clone, Copy)]
pub struct RasterCodec {
    filter: FilterType,
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl ImageCodec for RasterCodec {
    type Raster = Raster;

    fn decode(&self, bytes: &[u8]) -> Result<Raster, CodecError> {
        let img = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        if img.color().has_alpha() {
            return Ok(Raster::Rgb(flatten_on_white(&img.to_rgba8())));
        }
        Ok(Raster::Rgb(img.to_rgb8()))
    }

    fn dimensions(&self, raster: &Raster) -> (u32, u32) {
        match raster {
            Raster::Rgb(img) => img.dimensions(),
            Raster::Cmyk(buf) => (buf.width, buf.height),
        }
    }

    fn resize_to_fit(&self, raster: Raster, width: u32, height: u32) -> Result<Raster, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidDimensions { width, height });
        }
        match raster {
            Raster::Rgb(img) => {
                let resized = DynamicImage::ImageRgb8(img).resize(width, height, self.filter);
                Ok(Raster::Rgb(resized.to_rgb8()))
            }
            Raster::Cmyk(_) => Err(CodecError::Resize(
                "CMYK rasters cannot be resampled; resize before colour conversion".to_string(),
            )),
        }
    }

    fn set_color_space(&self, raster: Raster, space: ColorSpace) -> Result<Raster, CodecError> {
        match (raster, space) {
            (Raster::Rgb(img), ColorSpace::Cmyk) => Ok(Raster::Cmyk(rgb_to_cmyk(&img))),
            (raster @ Raster::Rgb(_), ColorSpace::Rgb) => Ok(raster),
            (raster @ Raster::Cmyk(_), ColorSpace::Cmyk) => Ok(raster),
            (raster, target) => Err(CodecError::ColorConversion(format!(
                "{} to {target} is not supported",
                raster.color_space()
            ))),
        }
    }

    fn encode(&self, raster: &Raster, settings: &EncodeSettings) -> Result<Vec<u8>, CodecError> {
        match settings.format {
            ImageFormatKind::Jpeg => {}
        }
        if raster.color_space() != settings.color_space {
            return Err(CodecError::Encode(format!(
                "raster is {} but {} output was requested",
                raster.color_space(),
                settings.color_space
            )));
        }

        let (width, height) = self.dimensions(raster);
        let (w16, h16) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(CodecError::InvalidDimensions { width, height }),
        };

        let (data, color_type): (&[u8], ColorType) = match raster {
            Raster::Rgb(img) => (img.as_raw().as_slice(), ColorType::Rgb),
            Raster::Cmyk(buf) => (buf.data.as_slice(), ColorType::Cmyk),
        };

        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, settings.quality.clamp(1, 100));
        encoder.set_sampling_factor(match settings.chroma {
            ChromaSampling::Full => SamplingFactor::F_1_1,
            });
        encoder
            .encode(data, w16, h16, color_type)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// JPEG frame sizes are 16-bit.
    fn max_dimension(&self) -> u32 {
        u16::MAX as u32
    }
}

/// Composite onto white paper so transparent areas carry no ink.
fn flatten_on_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Naive device conversion: `K = 1 - max(R, G, B)`, `C = (max - R) / max`,
/// likewise for M and Y. Pure black maps to K only.
pub fn rgb_to_cmyk(img: &RgbImage) -> CmykBuffer {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);

    for px in img.pixels() {
        let [r, g, b] = px.0;
        let max = r.max(g).max(b);
        if max == 0 {
            data.extend_from_slice(&[0, 0, 0, 255]);
            continue;
        }
        let chan = |v: u8| -> u8 {
            let num = (max - v) as u32 * 255 + max as u32 / 2;
            (num / max as u32) as u8
        };
        data.extend_from_slice(&[chan(r), chan(g), chan(b), 255 - max]);
    }

    CmykBuffer {
        width,
        height,
        data,
    }
}
