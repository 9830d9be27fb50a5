//! Raster decoding for PDF embedding.
//!
//! Baseline JPEGs pass through untouched (DCTDecode). Everything else is
//! decoded to 8-bit RGB with an optional alpha soft mask, zlib-compressed for
//! FlateDecode. Both assemblers consume the same `RasterImage`.

use crate::attachment::ImageEncoding;
use crate::error::Result;
use image::codecs::jpeg::JpegDecoder;
use image::metadata::Orientation;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat};
use std::io::Cursor;

#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: PixelData,
}

#[derive(Debug, Clone)]
pub enum PixelData {
    /// Original JPEG stream
    Jpeg { data: Vec<u8>, gray: bool },
    /// zlib-compressed RGB samples, plus compressed alpha when not opaque
    Flate { rgb: Vec<u8>, alpha: Option<Vec<u8>> },
}

impl ImageEncoding {
    /// Detects the encoding from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<ImageEncoding> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageEncoding::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageEncoding::Png)
        } else {
            None
        }
    }
}

impl RasterImage {
    pub fn decode(bytes: &[u8], encoding: ImageEncoding) -> Result<RasterImage> {
        match encoding {
            ImageEncoding::Jpeg => decode_jpeg(bytes),
            ImageEncoding::Png => {
                let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
                Ok(from_dynamic(img))
            }
        }
    }
}

fn decode_jpeg(bytes: &[u8]) -> Result<RasterImage> {
    let mut decoder = JpegDecoder::new(Cursor::new(bytes))?;
    let original = decoder.original_color_type();
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    // full decode, so truncated or corrupt streams are rejected here
    let mut img = DynamicImage::from_decoder(decoder)?;

    let passthrough = orientation == Orientation::NoTransforms
        && matches!(original, ExtendedColorType::L8 | ExtendedColorType::Rgb8);
    if passthrough {
        return Ok(RasterImage {
            width: img.width(),
            height: img.height(),
            pixels: PixelData::Jpeg {
                data: bytes.to_vec(),
                gray: original == ExtendedColorType::L8,
            },
        });
    }

    log::debug!("re-encoding JPEG ({original:?}, {orientation:?})");
    img.apply_orientation(orientation);
    Ok(from_dynamic(img))
}

fn from_dynamic(img: DynamicImage) -> RasterImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);

    let rgb: Vec<u8> = rgba.pixels().flat_map(|p| [p.0[0], p.0[1], p.0[2]]).collect();
    let alpha = has_alpha.then(|| {
        let a: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
        miniz_oxide::deflate::compress_to_vec_zlib(&a, 6)
    });

    RasterImage {
        width,
        height,
        pixels: PixelData::Flate {
            rgb: miniz_oxide::deflate::compress_to_vec_zlib(&rgb, 6),
            alpha,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_magic() {
        assert_eq!(ImageEncoding::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageEncoding::Jpeg));
        assert_eq!(ImageEncoding::sniff(b"\x89PNG\r\n"), Some(ImageEncoding::Png));
        assert_eq!(ImageEncoding::sniff(b"%PDF-1.7"), None);
    }

    #[test]
    fn opaque_png_has_no_soft_mask() {
        let img = RgbImage::from_pixel(30, 20, Rgb([10, 20, 30]));
        let raster = RasterImage::decode(&png_bytes(DynamicImage::ImageRgb8(img)), ImageEncoding::Png).unwrap();
        assert_eq!((raster.width, raster.height), (30, 20));
        assert!(matches!(raster.pixels, PixelData::Flate { alpha: None, .. }));
    }

    #[test]
    fn transparent_png_keeps_alpha() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 128]));
        let raster = RasterImage::decode(&png_bytes(DynamicImage::ImageRgba8(img)), ImageEncoding::Png).unwrap();
        assert!(matches!(raster.pixels, PixelData::Flate { alpha: Some(_), .. }));
    }

    #[test]
    fn rgb_jpeg_passes_through() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([200, 100, 50])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        let bytes = out.into_inner();

        let raster = RasterImage::decode(&bytes, ImageEncoding::Jpeg).unwrap();
        assert_eq!((raster.width, raster.height), (16, 8));
        match raster.pixels {
            PixelData::Jpeg { data, gray } => {
                assert_eq!(data, bytes);
                assert!(!gray);
            }
            PixelData::Flate { .. } => panic!("expected passthrough"),
        }
    }

    /// JPEG carrying an EXIF APP1 segment with the given orientation tag.
    fn jpeg_with_orientation(w: u32, h: u32, orientation: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([40, 80, 120])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        let plain = out.into_inner();

        let mut exif = b"Exif\0\0MM\0\x2a\0\0\0\x08".to_vec();
        exif.extend_from_slice(&[0, 1]);
        exif.extend_from_slice(&[0x01, 0x12, 0, 3, 0, 0, 0, 1, 0, orientation, 0, 0]);
        exif.extend_from_slice(&[0, 0, 0, 0]);
        let len = (exif.len() + 2) as u16;

        let mut bytes = plain[..2].to_vec();
        bytes.extend_from_slice(&[0xFF, 0xE1]);
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&exif);
        bytes.extend_from_slice(&plain[2..]);
        bytes
    }

    #[test]
    fn rotated_jpeg_is_turned_upright() {
        let raster = RasterImage::decode(&jpeg_with_orientation(40, 20, 6), ImageEncoding::Jpeg).unwrap();
        assert_eq!((raster.width, raster.height), (20, 40));
        assert!(matches!(raster.pixels, PixelData::Flate { alpha: None, .. }));
    }

    #[test]
    fn upright_exif_keeps_passthrough() {
        let raster = RasterImage::decode(&jpeg_with_orientation(40, 20, 1), ImageEncoding::Jpeg).unwrap();
        assert_eq!((raster.width, raster.height), (40, 20));
        assert!(matches!(raster.pixels, PixelData::Jpeg { .. }));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(RasterImage::decode(b"\xFF\xD8\xFFnot really", ImageEncoding::Jpeg).is_err());
        assert!(RasterImage::decode(b"\x89PNG broken", ImageEncoding::Png).is_err());
    }
}
