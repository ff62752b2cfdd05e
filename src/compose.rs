//! Logo overlay: composite a logo onto the center of a fetched QR bitmap.
//!
//! The pipeline runs in fixed stages (decode code, paint backing square, decode and
//! place logo, encode PNG). Every stage returns a [`Result`] so a logo that fails to
//! decode surfaces as [`Error::Compose`] instead of leaving the caller waiting.

use crate::error::{Error, Result};
use crate::form::{FormState, Logo};
use crate::qr::QrDecoder;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Padding in pixels between the logo and the edge of its backing square
pub const LOGO_PADDING: u32 = 10;

/// Everything needed to composite a logo
#[derive(Debug, Clone)]
pub struct LogoOverlay {
    /// Logo image
    pub logo: Logo,
    /// Logo edge length in pixels
    pub logo_size: u32,
    /// Output edge length in pixels
    pub size: u32,
    /// Color of the square painted behind the logo
    pub backing: Rgba<u8>,
}

impl LogoOverlay {
    /// Overlay settings for the form, or `None` when no logo is set.
    pub fn from_form(form: &FormState) -> Result<Option<Self>> {
        let Some(logo) = form.logo() else {
            return Ok(None);
        };
        Ok(Some(Self {
            logo: logo.clone(),
            logo_size: form.logo_size(),
            size: form.size(),
            backing: form.bg_color().to_rgba()?,
        }))
    }
}

/// A locally composited PNG
#[derive(Debug, Clone)]
pub struct Composed {
    /// Encoded PNG bytes
    pub png: Bytes,
    /// `data:image/png;base64,...` form of `png`
    pub data_uri: String,
}

/// Run the composition on the blocking pool.
pub async fn compose_async(base: Bytes, overlay: LogoOverlay) -> Result<Composed> {
    tokio::task::spawn_blocking(move || compose(&base, &overlay))
        .await
        .map_err(|e| Error::Compose(format!("composition task failed: {e}")))?
}

/// Composite `overlay` onto the encoded QR bitmap in `base`.
pub fn compose(base: &[u8], overlay: &LogoOverlay) -> Result<Composed> {
    let mut canvas = decode_base(base, overlay.size)?;
    paint_backing(&mut canvas, overlay);
    place_logo(&mut canvas, overlay)?;
    let png = encode_png(canvas)?;

    debug!(
        bytes = png.len(),
        logo_size = overlay.logo_size,
        size = overlay.size,
        "Composited logo"
    );

    Ok(Composed {
        data_uri: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
        png: Bytes::from(png),
    })
}

fn decode_base(base: &[u8], size: u32) -> Result<RgbaImage> {
    let image = image::load_from_memory(base)
        .map_err(|e| Error::Compose(format!("QR image could not be decoded: {e}")))?
        .to_rgba8();

    if image.dimensions() == (size, size) {
        Ok(image)
    } else {
        Ok(imageops::resize(&image, size, size, FilterType::Nearest))
    }
}

fn paint_backing(canvas: &mut RgbaImage, overlay: &LogoOverlay) {
    let side = (overlay.logo_size + LOGO_PADDING).min(canvas.width());
    let square = RgbaImage::from_pixel(side, side, overlay.backing);
    let offset = i64::from((canvas.width() - side) / 2);
    imageops::replace(canvas, &square, offset, offset);
}

fn place_logo(canvas: &mut RgbaImage, overlay: &LogoOverlay) -> Result<()> {
    let logo = image::load_from_memory(overlay.logo.bytes())
        .map_err(|e| Error::Compose(format!("logo could not be decoded: {e}")))?;
    let side = overlay.logo_size.min(canvas.width());
    let logo = imageops::resize(&logo.to_rgba8(), side, side, FilterType::Lanczos3);
    let offset = i64::from((canvas.width() - side) / 2);
    imageops::overlay(canvas, &logo, offset, offset);
    Ok(())
}

fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| Error::Compose(format!("PNG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Check that an encoded image still decodes to `expected`.
pub fn verify_scannable(encoded: &[u8], expected: &str) -> Result<bool> {
    let image = image::load_from_memory(encoded)?;
    match QrDecoder::new().decode(&image) {
        Ok(payload) => Ok(payload.as_str() == Some(expected)),
        Err(Error::QrDecode(reason)) => {
            debug!(%reason, "Composed code did not decode");
            Ok(false)
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(image: RgbaImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn overlay(logo: RgbaImage, logo_size: u32) -> LogoOverlay {
        LogoOverlay {
            logo: Logo::from_bytes(Bytes::from(png(logo))).unwrap(),
            logo_size,
            size: 200,
            backing: Rgba([255, 255, 255, 255]),
        }
    }

    #[test]
    fn test_backing_square_and_logo_placement() {
        let base = png(RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255])));
        let logo = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));

        let composed = compose(&base, &overlay(logo, 40)).unwrap();
        assert!(composed.data_uri.starts_with("data:image/png;base64,"));

        let out = image::load_from_memory(&composed.png).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (200, 200));
        // Backing square spans 50 px centered: 75..125. Logo spans 80..120.
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(76, 76), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(100, 100), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(74, 100), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_transparent_logo_keeps_backing() {
        let base = png(RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255])));
        let logo = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));

        let composed = compose(&base, &overlay(logo, 30)).unwrap();
        let out = image::load_from_memory(&composed.png).unwrap().to_rgba8();
        assert_eq!(out.get_pixel(100, 100), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_base_is_resized_to_configured_size() {
        let base = png(RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255])));
        let logo = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let composed = compose(&base, &overlay(logo, 20)).unwrap();
        let out = image::load_from_memory(&composed.png).unwrap();
        assert_eq!((out.width(), out.height()), (200, 200));
    }

    #[test]
    fn test_undecodable_base_is_an_error() {
        let logo = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let err = compose(b"<html>oops</html>", &overlay(logo, 20)).unwrap_err();
        assert!(matches!(err, Error::Compose(_)));
    }

    #[test]
    fn test_truncated_logo_is_an_error() {
        let base = png(RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255])));
        let mut logo = png(RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255])));
        logo.truncate(24);
        let overlay = LogoOverlay {
            logo: Logo::from_bytes(Bytes::from(logo)).unwrap(),
            logo_size: 40,
            size: 200,
            backing: Rgba([255, 255, 255, 255]),
        };

        match compose(&base, &overlay) {
            Err(Error::Compose(reason)) => assert!(reason.contains("logo")),
            other => panic!("expected compose error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compose_async() {
        let base = png(RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255])));
        let logo = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let composed = compose_async(Bytes::from(base), overlay(logo, 20))
            .await
            .unwrap();
        assert!(!composed.png.is_empty());
    }

    #[test]
    fn test_verify_scannable_blank() {
        let blank = png(RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255])));
        assert!(!verify_scannable(&blank, "anything").unwrap());
    }
}
