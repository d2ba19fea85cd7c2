//! # Image Loading and Decoding
//!
//! Images are referenced by name in the block tree and fetched through the
//! resource loader. JPEG data passes through untouched (page backends embed
//! it with DCTDecode); PNG and WebP are decoded to RGB pixels plus an
//! optional alpha channel.
//!
//! [`ImageStore`] decodes each named image once and hands out the same
//! [`Image`] to every block that references it.

use crate::error::{QuireError, ResourceError, Result};
use crate::resource::{LoadCache, ResourceLoader};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// A decoded image ready for layout and embedding.
#[derive(Clone)]
pub struct Image {
    pub name: String,
    pub pixel_data: ImagePixelData,
    pub width_px: u32,
    pub height_px: u32,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("name", &self.name)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .finish()
    }
}

/// The pixel data in a form a page writer can consume directly.
#[derive(Debug, Clone)]
pub enum ImagePixelData {
    /// Raw JPEG bytes.
    Jpeg {
        data: Arc<Vec<u8>>,
        color_space: JpegColorSpace,
    },
    /// Decoded RGB pixels and an optional alpha channel.
    Decoded {
        /// width * height * 3 bytes (RGB)
        rgb: Vec<u8>,
        /// width * height bytes. None if fully opaque.
        alpha: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegColorSpace {
    DeviceRGB,
    DeviceGray,
}

/// Images for one generation (or one engine, when caches are shared).
#[derive(Debug)]
pub struct ImageStore {
    loader: Arc<dyn ResourceLoader>,
    images: LoadCache<String, Arc<Image>>,
}

impl ImageStore {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            images: LoadCache::new(),
        }
    }

    /// Fetch and decode `name`, or return the cached result.
    pub fn select_image(&self, name: &str) -> Result<Arc<Image>> {
        self.images.get_or_load(&name.to_string(), || {
            log::debug!("loading image '{}'", name);
            let wrap = |source| QuireError::Image {
                name: name.to_string(),
                source,
            };
            let data = self.loader.load(name).map_err(wrap)?;
            decode_image_bytes(name, data).map(Arc::new).map_err(wrap)
        })
    }
}

/// Detect the format from magic bytes and decode accordingly.
pub fn decode_image_bytes(
    name: &str,
    data: Arc<Vec<u8>>,
) -> std::result::Result<Image, ResourceError> {
    if data.len() < 4 {
        return Err(ResourceError::InvalidFormat(format!(
            "{}: image data too short",
            name
        )));
    }

    if is_jpeg(&data) {
        decode_jpeg(name, data)
    } else if is_png(&data) || is_webp(&data) {
        decode_pixels(name, &data)
    } else {
        Err(ResourceError::InvalidFormat(format!(
            "{}: unsupported image format (expected JPEG, PNG or WebP)",
            name
        )))
    }
}

fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}

fn is_png(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47
}

fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

fn decode_error(name: &str, e: impl fmt::Display) -> ResourceError {
    ResourceError::InvalidFormat(format!("{}: {}", name, e))
}

/// Read dimensions and color space without decoding pixels.
fn decode_jpeg(name: &str, data: Arc<Vec<u8>>) -> std::result::Result<Image, ResourceError> {
    let (width, height) = image::io::Reader::new(Cursor::new(data.as_slice()))
        .with_guessed_format()
        .map_err(|e| decode_error(name, e))?
        .into_dimensions()
        .map_err(|e| decode_error(name, e))?;
    let color_space = detect_jpeg_color_space(&data);

    Ok(Image {
        name: name.to_string(),
        pixel_data: ImagePixelData::Jpeg { data, color_space },
        width_px: width,
        height_px: height,
    })
}

/// Scan JPEG markers for the start-of-frame segment and read its component count.
fn detect_jpeg_color_space(data: &[u8]) -> JpegColorSpace {
    let mut i = 2;
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            break;
        }
        let marker = data[i + 1];
        let is_sof = matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF);
        if is_sof && i + 9 < data.len() {
            return if data[i + 9] == 1 {
                JpegColorSpace::DeviceGray
            } else {
                JpegColorSpace::DeviceRGB
            };
        }
        if i + 3 < data.len() {
            let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            i += 2 + seg_len;
        } else {
            break;
        }
    }
    JpegColorSpace::DeviceRGB
}

/// Decode to RGBA and split into RGB and alpha.
fn decode_pixels(name: &str, data: &[u8]) -> std::result::Result<Image, ResourceError> {
    let img = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| decode_error(name, e))?
        .decode()
        .map_err(|e| decode_error(name, e))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixel_count = (width as usize) * (height as usize);
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    let mut has_transparency = false;

    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel[3]);
        has_transparency |= pixel[3] != 255;
    }

    Ok(Image {
        name: name.to_string(),
        pixel_data: ImagePixelData::Decoded {
            rgb,
            alpha: has_transparency.then_some(alpha),
        },
        width_px: width,
        height_px: height,
    })
}
