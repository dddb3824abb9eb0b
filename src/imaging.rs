//! Image transforms for uploads and delivery.
//!
//! | Operation | Behavior |
//! |---|---|
//! | [`prepare_upload`] | EXIF auto-rotate, fit within 2000x2000, JPEG q85 |
//! | [`scale_for_delivery`] | fit within the requested width (<= 800), JPEG q80 |
//!
//! Neither transform ever enlarges an image. HEIF/HEIC has no compiled-in
//! decoder; such files pass through untouched once their container is
//! recognized.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::error::{DecodingError, ImageFormatHint};
use image::{DynamicImage, ImageDecoder, ImageError, ImageFormat, ImageReader};
use thiserror::Error;

/// Longest edge allowed for stored uploads.
pub const UPLOAD_BOUND: u32 = 2000;
pub const UPLOAD_QUALITY: u8 = 85;

/// Largest width the delivery endpoint will scale to.
pub const MAX_DELIVERY_WIDTH: u32 = 800;
pub const DELIVERY_QUALITY: u8 = 80;

pub const JPEG_MIME: &str = "image/jpeg";
pub const HEIC_MIME: &str = "image/heic";

/// ISO-BMFF brands used by HEIF still images and sequences.
const HEIF_BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(#[source] ImageError),
}

/// An upload ready to be stored.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub data: Bytes,
    /// File extension without the dot
    pub extension: String,
    pub mime_type: String,
}

/// Dimensions that fit `source` inside `bound` keeping its aspect ratio.
/// Sources already inside the bound are returned unchanged.
pub fn fit_within(source: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bound;

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Whether the bytes are in a format this build can decode.
pub fn is_decodable(data: &[u8]) -> bool {
    image::guess_format(data).is_ok_and(|format| format.reading_enabled())
}

/// Normalize an upload: auto-rotate, bound to [`UPLOAD_BOUND`] and
/// re-encode as JPEG.
///
/// `declared_mime` is the validated content type of the upload. When neither
/// the bytes nor the declared type map to a decodable format, the original
/// bytes are kept as they are if they carry a HEIF container, and rejected
/// otherwise.
pub fn prepare_upload(data: &[u8], declared_mime: &str) -> Result<PreparedImage, TransformError> {
    let declared_decodable =
        ImageFormat::from_mime_type(declared_mime).is_some_and(|f| f.reading_enabled());

    if !is_decodable(data) && !declared_decodable {
        if !is_heif(data) {
            return Err(TransformError::Decode(ImageError::Decoding(DecodingError::new(
                ImageFormatHint::Name("HEIF".to_string()),
                "no HEIF file type box",
            ))));
        }
        return Ok(PreparedImage {
            data: Bytes::copy_from_slice(data),
            extension: extension_for(declared_mime),
            mime_type: declared_mime.to_string(),
        });
    }

    let img = decode_oriented(data)?;
    let (w, h) = fit_within((img.width(), img.height()), (UPLOAD_BOUND, UPLOAD_BOUND));
    let img = if (w, h) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    };

    Ok(PreparedImage {
        data: encode_jpeg(&img, UPLOAD_QUALITY)?,
        extension: "jpg".to_string(),
        mime_type: JPEG_MIME.to_string(),
    })
}

/// Scale a stored image down to `width` for delivery.
///
/// Returns `None` when the original bytes should be served as they are:
/// no width requested, a width above [`MAX_DELIVERY_WIDTH`], or a format
/// this build cannot decode.
pub fn scale_for_delivery(data: &[u8], width: u32) -> Result<Option<Bytes>, TransformError> {
    if width == 0 || width > MAX_DELIVERY_WIDTH || !is_decodable(data) {
        return Ok(None);
    }

    let img = image::load_from_memory(data).map_err(TransformError::Decode)?;
    let (w, h) = fit_within((img.width(), img.height()), (width, u32::MAX));
    let img = if w == img.width() {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    };

    encode_jpeg(&img, DELIVERY_QUALITY).map(Some)
}

/// Whether the bytes open with an ISO-BMFF `ftyp` box naming a HEIF brand,
/// as major or compatible brand.
pub fn is_heif(data: &[u8]) -> bool {
    if data.len() < 16 || &data[4..8] != b"ftyp" {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let end = box_size.clamp(16, data.len());

    // major brand at 8..12, minor version at 12..16, compatible brands after
    std::iter::once(&data[8..12])
        .chain(data[16..end].chunks_exact(4))
        .any(|brand| HEIF_BRANDS.iter().any(|known| brand == known.as_slice()))
}

/// Content type for bytes served unmodified.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    if is_heif(data) {
        return HEIC_MIME;
    }
    image::guess_format(data)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

fn decode_oriented(data: &[u8]) -> Result<DynamicImage, TransformError> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TransformError::Decode(ImageError::IoError(e)))?
        .into_decoder()
        .map_err(TransformError::Decode)?;

    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(TransformError::Decode)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, TransformError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel
    img.to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(TransformError::Encode)?;
    Ok(Bytes::from(buf))
}

fn extension_for(mime_type: &str) -> String {
    match mime_type {
        HEIC_MIME => "heic".to_string(),
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| "bin".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, RgbImage, RgbaImage};

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        JpegEncoder::new(&mut buf)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buf
    }

    fn png_rgba_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn dimensions(data: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(data).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn fit_within_never_enlarges() {
        assert_eq!(fit_within((640, 480), (2000, 2000)), (640, 480));
        assert_eq!(fit_within((2000, 2000), (2000, 2000)), (2000, 2000));
    }

    #[test]
    fn fit_within_scales_longer_edge() {
        assert_eq!(fit_within((4000, 3000), (2000, 2000)), (2000, 1500));
        assert_eq!(fit_within((3000, 4000), (2000, 2000)), (1500, 2000));
        assert_eq!(fit_within((3000, 1000), (400, u32::MAX)), (400, 133));
    }

    #[test]
    fn fit_within_keeps_thin_images_visible() {
        assert_eq!(fit_within((10000, 2), (400, u32::MAX)), (400, 1));
    }

    #[test]
    fn prepare_upload_bounds_large_jpeg() {
        let prepared = prepare_upload(&jpeg_bytes(2500, 1000), "image/jpeg").unwrap();
        assert_eq!(prepared.mime_type, "image/jpeg");
        assert_eq!(prepared.extension, "jpg");
        assert_eq!(dimensions(&prepared.data), (2000, 800));
    }

    #[test]
    fn prepare_upload_keeps_small_dimensions() {
        let prepared = prepare_upload(&jpeg_bytes(120, 80), "image/jpeg").unwrap();
        assert_eq!(dimensions(&prepared.data), (120, 80));
    }

    #[test]
    fn prepare_upload_converts_png_with_alpha_to_jpeg() {
        let prepared = prepare_upload(&png_rgba_bytes(50, 40), "image/png").unwrap();
        assert_eq!(image::guess_format(&prepared.data).unwrap(), ImageFormat::Jpeg);
        assert_eq!(dimensions(&prepared.data), (50, 40));
    }

    #[test]
    fn prepare_upload_passes_heic_through() {
        let heic = b"\0\0\0\x18ftypheic\0\0\0\0mif1heic".to_vec();
        let prepared = prepare_upload(&heic, "image/heic").unwrap();
        assert_eq!(prepared.data.as_ref(), heic.as_slice());
        assert_eq!(prepared.mime_type, "image/heic");
        assert_eq!(prepared.extension, "heic");
    }

    #[test]
    fn prepare_upload_rejects_non_heif_bytes_declared_heic() {
        let result = prepare_upload(b"<?php system($_GET['c']); ?>", "image/heic");
        assert!(matches!(result, Err(TransformError::Decode(_))));

        let mp4 = b"\0\0\0\x18ftypisom\0\0\0\0isommp41".to_vec();
        assert!(matches!(
            prepare_upload(&mp4, "image/heic"),
            Err(TransformError::Decode(_))
        ));
    }

    #[test]
    fn is_heif_checks_compatible_brands() {
        assert!(is_heif(b"\0\0\0\x18ftypheic\0\0\0\0mif1heic"));
        assert!(is_heif(b"\0\0\0\x18ftypavif\0\0\0\0mif1miaf"));
        assert!(!is_heif(b"\0\0\0\x18ftypisom\0\0\0\0isommp41"));
        assert!(!is_heif(b"ftypheic"));
        assert!(!is_heif(b""));
    }

    #[test]
    fn prepare_upload_rejects_corrupt_jpeg() {
        let result = prepare_upload(b"definitely not a jpeg", "image/jpeg");
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }

    #[test]
    fn scale_for_delivery_downscales_to_width() {
        let scaled = scale_for_delivery(&jpeg_bytes(3000, 1500), 400)
            .unwrap()
            .expect("width within range scales");
        assert_eq!(dimensions(&scaled), (400, 200));
    }

    #[test]
    fn scale_for_delivery_does_not_upscale() {
        let scaled = scale_for_delivery(&jpeg_bytes(300, 200), 400)
            .unwrap()
            .expect("still re-encoded");
        assert_eq!(dimensions(&scaled), (300, 200));
    }

    #[test]
    fn scale_for_delivery_ignores_out_of_range_widths() {
        let data = jpeg_bytes(64, 64);
        assert!(scale_for_delivery(&data, 0).unwrap().is_none());
        assert!(scale_for_delivery(&data, 801).unwrap().is_none());
        assert!(scale_for_delivery(&data, 800).unwrap().is_some());
    }

    #[test]
    fn sniff_mime_detects_formats() {
        assert_eq!(sniff_mime(&jpeg_bytes(8, 8)), "image/jpeg");
        assert_eq!(sniff_mime(&png_rgba_bytes(8, 8)), "image/png");
        assert_eq!(sniff_mime(b"\0\0\0\x18ftypheic\0\0\0\0mif1heic"), "image/heic");
        assert_eq!(sniff_mime(b"????"), "application/octet-stream");
    }
}
