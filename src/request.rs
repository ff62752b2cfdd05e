//! Request construction for the QR image generator

use crate::config::{ServiceOptions, UtmOptions};
use crate::error::{Error, Result};
use crate::form::{EccLevel, FormState, HexColor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Image formats the generator can return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrFormat {
    /// Raster PNG
    #[default]
    Png,
    /// Vector SVG
    Svg,
}

impl QrFormat {
    /// File extension and `format` query value
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    /// MIME type of the encoded image
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
        }
    }
}

impl fmt::Display for QrFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for QrFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            _ => Err(format!("Unsupported format '{value}', expected 'png' or 'svg'")),
        }
    }
}

/// A fully-resolved generator request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrRequest {
    /// Encoded payload
    pub data: String,
    /// Edge length in pixels
    pub size: u32,
    /// Module color
    pub color: HexColor,
    /// Background color
    pub bg_color: HexColor,
    /// Quiet zone in modules
    pub quiet_zone: u32,
    /// Margin in pixels
    pub margin: u32,
    /// Error correction level
    pub ecc: EccLevel,
    /// Output format
    pub format: QrFormat,
}

impl QrRequest {
    /// Request for the on-screen result: PNG, with campaign tagging when configured.
    pub fn for_generation(form: &FormState, service: &ServiceOptions) -> Result<Self> {
        let mut request = Self::from_form(form, service, QrFormat::Png)?;
        if let Some(utm) = &service.utm {
            request.data = tag_with_utm(&request.data, utm);
        }
        Ok(request)
    }

    /// Request for a download: raw input, no logo, in the chosen format.
    pub fn for_download(
        form: &FormState,
        service: &ServiceOptions,
        format: QrFormat,
    ) -> Result<Self> {
        Self::from_form(form, service, format)
    }

    fn from_form(form: &FormState, service: &ServiceOptions, format: QrFormat) -> Result<Self> {
        if form.input().trim().is_empty() {
            return Err(Error::InvalidInput);
        }

        Ok(Self {
            data: form.input().to_string(),
            size: form.size(),
            color: form.color().clone(),
            bg_color: form.bg_color().clone(),
            quiet_zone: service.quiet_zone,
            margin: service.margin,
            ecc: form.ecc(),
            format,
        })
    }

    /// Build the full GET URL against `endpoint`.
    pub fn url(&self, endpoint: &str) -> Result<Url> {
        let mut url = Url::parse(endpoint)?;
        url.query_pairs_mut()
            .append_pair("size", &format!("{0}x{0}", self.size))
            .append_pair("color", self.color.as_param())
            .append_pair("bgcolor", self.bg_color.as_param())
            .append_pair("qzone", &self.quiet_zone.to_string())
            .append_pair("margin", &self.margin.to_string())
            .append_pair("data", &self.data)
            .append_pair("ecc", self.ecc.as_str())
            .append_pair("format", self.format.extension());
        Ok(url)
    }
}

/// Append campaign parameters to a payload.
pub fn tag_with_utm(input: &str, utm: &UtmOptions) -> String {
    let separator = if input.contains('?') { '&' } else { '?' };
    format!(
        "{input}{separator}utm_source={}&utm_medium={}&utm_campaign={}",
        utm.source, utm.medium, utm.campaign
    )
}
