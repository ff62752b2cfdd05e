//! QR code encoder backing the offline generator

use crate::error::{Error, Result};
use crate::request::{QrFormat, QrRequest};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use qrcode::QrCode;
use qrcode::render::svg;
use std::io::Cursor;

/// Renders a [`QrRequest`] locally, mirroring what the remote generator returns
#[derive(Debug, Default)]
pub struct QrEncoder;

impl QrEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self
    }

    /// Render the request in its own format, returning encoded bytes.
    pub fn render(&self, request: &QrRequest) -> Result<Vec<u8>> {
        match request.format {
            QrFormat::Png => self.render_png(request),
            QrFormat::Svg => self.render_svg(request).map(String::into_bytes),
        }
    }

    /// Render to a `size × size` RGBA bitmap.
    pub fn render_image(&self, request: &QrRequest) -> Result<RgbaImage> {
        let code = self.code(request)?;
        let fg = request.color.to_rgba()?;
        let bg = request.bg_color.to_rgba()?;

        let modules = code.width() as u32 + 2 * request.quiet_zone;
        let module_px = (request.size / modules).max(1);
        let core = code
            .render::<Rgba<u8>>()
            .dark_color(fg)
            .light_color(bg)
            .quiet_zone(false)
            .module_dimensions(module_px, module_px)
            .build();

        let side = (modules * module_px + 2 * request.margin).max(request.size);
        let mut canvas = RgbaImage::from_pixel(side, side, bg);
        let offset = i64::from((side - core.width()) / 2);
        imageops::overlay(&mut canvas, &core, offset, offset);

        if side == request.size {
            Ok(canvas)
        } else {
            Ok(imageops::resize(
                &canvas,
                request.size,
                request.size,
                FilterType::Nearest,
            ))
        }
    }

    fn render_png(&self, request: &QrRequest) -> Result<Vec<u8>> {
        let image = DynamicImage::ImageRgba8(self.render_image(request)?);
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| Error::QrEncode(format!("PNG encode failed: {e}")))?;
        Ok(buf.into_inner())
    }

    fn render_svg(&self, request: &QrRequest) -> Result<String> {
        let code = self.code(request)?;
        Ok(code
            .render::<svg::Color<'_>>()
            .dark_color(svg::Color(request.color.as_str()))
            .light_color(svg::Color(request.bg_color.as_str()))
            .quiet_zone(request.quiet_zone > 0)
            .min_dimensions(request.size, request.size)
            .build())
    }

    fn code(&self, request: &QrRequest) -> Result<QrCode> {
        QrCode::with_error_correction_level(request.data.as_bytes(), request.ecc.to_qrcode())
            .map_err(|e| Error::QrEncode(format!("Failed to create QR code: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceOptions;
    use crate::form::FormState;
    use crate::qr::QrDecoder;

    fn request(input: &str, format: QrFormat) -> QrRequest {
        let mut form = FormState::default();
        form.set_input(input);
        form.set_size(300);
        let service = ServiceOptions {
            quiet_zone: 4,
            ..ServiceOptions::default()
        };
        QrRequest::for_download(&form, &service, format).unwrap()
    }

    #[test]
    fn test_render_image_dimensions() {
        let image = QrEncoder::new()
            .render_image(&request("hello", QrFormat::Png))
            .unwrap();
        assert_eq!(image.dimensions(), (300, 300));
    }

    #[test]
    fn test_png_scans_back() {
        let bytes = QrEncoder::new()
            .render(&request("Scan me", QrFormat::Png))
            .unwrap();
        let image = image::load_from_memory(&bytes).unwrap();
        let decoded = QrDecoder::new().decode(&image).unwrap();
        assert_eq!(decoded.as_str(), Some("Scan me"));
    }

    #[test]
    fn test_svg_output() {
        let bytes = QrEncoder::new()
            .render(&request("vector", QrFormat::Svg))
            .unwrap();
        let svg = String::from_utf8(bytes).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));
    }
}
