//! Form state: payload text, colors, size, error correction and optional logo

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use image::Rgba;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

/// Smallest accepted image size in pixels
pub const MIN_SIZE: u32 = 100;
/// Largest accepted image size in pixels
pub const MAX_SIZE: u32 = 1000;
/// Smallest accepted logo size in pixels
pub const MIN_LOGO_SIZE: u32 = 20;

/// Default foreground color
pub const DEFAULT_COLOR: &str = "#000000";
/// Default background color
pub const DEFAULT_BG_COLOR: &str = "#FFFFFF";
/// Default image size
pub const DEFAULT_SIZE: u32 = 200;
/// Default logo size
pub const DEFAULT_LOGO_SIZE: u32 = 50;

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$").expect("static hex color pattern")
});

/// A validated `#RGB` or `#RRGGBB` color
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    /// Parse and validate a color string.
    pub fn parse(value: &str) -> Result<Self> {
        if HEX_COLOR.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::InvalidColor(value.to_string()))
        }
    }

    /// The color as entered, including the leading `#`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex digits without the leading `#`, as the remote service expects them.
    pub fn as_param(&self) -> &str {
        &self.0[1..]
    }

    /// Convert to an opaque RGBA pixel, expanding the short `#RGB` form.
    pub fn to_rgba(&self) -> Result<Rgba<u8>> {
        let digits = self.as_param();
        let expanded = if digits.len() == 3 {
            digits.chars().flat_map(|c| [c, c]).collect::<String>()
        } else {
            digits.to_string()
        };
        let rgb = hex::decode(expanded)?;
        Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    fn default_foreground() -> Self {
        Self(DEFAULT_COLOR.to_string())
    }

    fn default_background() -> Self {
        Self(DEFAULT_BG_COLOR.to_string())
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HexColor {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.0
    }
}

/// QR error-correction tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EccLevel {
    /// ~7% recovery
    L,
    /// ~15% recovery
    #[default]
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl EccLevel {
    /// Query parameter value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::L => "L",
            Self::M => "M",
            Self::Q => "Q",
            Self::H => "H",
        }
    }

    /// Human label with recovery capacity
    pub fn label(self) -> &'static str {
        match self {
            Self::L => "Low (7%)",
            Self::M => "Medium (15%)",
            Self::Q => "Quartile (25%)",
            Self::H => "High (30%)",
        }
    }

    /// Equivalent level for the `qrcode` encoder
    pub fn to_qrcode(self) -> qrcode::EcLevel {
        match self {
            Self::L => qrcode::EcLevel::L,
            Self::M => qrcode::EcLevel::M,
            Self::Q => qrcode::EcLevel::Q,
            Self::H => qrcode::EcLevel::H,
        }
    }
}

impl FromStr for EccLevel {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "M" => Ok(Self::M),
            "Q" => Ok(Self::Q),
            "H" => Ok(Self::H),
            _ => Err(format!(
                "Unknown error correction level '{value}', expected L, M, Q or H"
            )),
        }
    }
}

/// A logo image held fully in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logo {
    bytes: Bytes,
    mime: String,
}

impl Logo {
    /// Read a logo from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "Loaded logo file");
        Self::from_bytes(Bytes::from(data))
    }

    /// Wrap raw image bytes, sniffing the image type.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let format = image::guess_format(&bytes)?;
        Ok(Self {
            mime: format.to_mime_type().to_string(),
            bytes,
        })
    }

    /// Raw encoded bytes
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// MIME type of the encoded image
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Embeddable `data:` URI
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Which color field an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    /// QR modules
    Foreground,
    /// Background and logo backing square
    Background,
}

#[derive(Debug, Clone)]
struct ColorField {
    value: HexColor,
    draft: Option<String>,
    fallback: HexColor,
}

impl ColorField {
    fn new(value: HexColor, fallback: HexColor) -> Self {
        Self {
            value,
            draft: None,
            fallback,
        }
    }

    fn commit(&mut self) -> &HexColor {
        if let Some(draft) = self.draft.take() {
            self.value = HexColor::parse(&draft).unwrap_or_else(|_| {
                tracing::debug!(
                    draft = %draft,
                    fallback = %self.fallback,
                    "Reverting invalid color"
                );
                self.fallback.clone()
            });
        }
        &self.value
    }
}

/// Initial values for a new form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormDefaults {
    /// Foreground color
    pub color: String,
    /// Background color
    pub bg_color: String,
    /// Image size in pixels
    pub size: u32,
    /// Error correction level
    pub ecc: EccLevel,
    /// Logo size in pixels
    pub logo_size: u32,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            bg_color: DEFAULT_BG_COLOR.to_string(),
            size: DEFAULT_SIZE,
            ecc: EccLevel::M,
            logo_size: DEFAULT_LOGO_SIZE,
        }
    }
}

/// Editable generation parameters
#[derive(Debug, Clone)]
pub struct FormState {
    input: String,
    color: ColorField,
    bg_color: ColorField,
    size: u32,
    ecc: EccLevel,
    logo: Option<Logo>,
    logo_size: u32,
}

impl Default for FormState {
    fn default() -> Self {
        Self::from_defaults(&FormDefaults::default())
    }
}

impl FormState {
    /// Build a form from configured defaults. Invalid colors fall back to black on white.
    pub fn from_defaults(defaults: &FormDefaults) -> Self {
        let color =
            HexColor::parse(&defaults.color).unwrap_or_else(|_| HexColor::default_foreground());
        let bg_color =
            HexColor::parse(&defaults.bg_color).unwrap_or_else(|_| HexColor::default_background());
        let size = clamp_size(defaults.size);

        Self {
            input: String::new(),
            color: ColorField::new(color, HexColor::default_foreground()),
            bg_color: ColorField::new(bg_color, HexColor::default_background()),
            size,
            ecc: defaults.ecc,
            logo: None,
            logo_size: clamp_logo_size(defaults.logo_size, size),
        }
    }

    /// Payload text
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the payload text.
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Committed foreground color
    pub fn color(&self) -> &HexColor {
        &self.color.value
    }

    /// Committed background color
    pub fn bg_color(&self) -> &HexColor {
        &self.bg_color.value
    }

    /// Record an uncommitted color edit.
    pub fn edit_color(&mut self, role: ColorRole, draft: impl Into<String>) {
        self.field_mut(role).draft = Some(draft.into());
    }

    /// Commit a pending color edit, reverting to the default when it is not a valid hex color.
    pub fn commit_color(&mut self, role: ColorRole) -> &HexColor {
        self.field_mut(role).commit()
    }

    /// Edit and immediately commit a color.
    pub fn set_color(&mut self, role: ColorRole, value: impl Into<String>) -> &HexColor {
        self.edit_color(role, value);
        self.commit_color(role)
    }

    fn field_mut(&mut self, role: ColorRole) -> &mut ColorField {
        match role {
            ColorRole::Foreground => &mut self.color,
            ColorRole::Background => &mut self.bg_color,
        }
    }

    /// Image size in pixels
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Set the image size, clamped to 100..=1000. Re-clamps the logo size.
    pub fn set_size(&mut self, size: u32) -> u32 {
        self.size = clamp_size(size);
        self.logo_size = clamp_logo_size(self.logo_size, self.size);
        self.size
    }

    /// Error correction level
    pub fn ecc(&self) -> EccLevel {
        self.ecc
    }

    /// Set the error correction level.
    pub fn set_ecc(&mut self, ecc: EccLevel) {
        self.ecc = ecc;
    }

    /// Current logo, if any
    pub fn logo(&self) -> Option<&Logo> {
        self.logo.as_ref()
    }

    /// Set or clear the logo.
    pub fn set_logo(&mut self, logo: Option<Logo>) {
        self.logo = logo;
    }

    /// Logo size in pixels
    pub fn logo_size(&self) -> u32 {
        self.logo_size
    }

    /// Set the logo size, clamped to `[20, size / 3]`.
    pub fn set_logo_size(&mut self, logo_size: u32) -> u32 {
        self.logo_size = clamp_logo_size(logo_size, self.size);
        self.logo_size
    }

    /// Largest logo size allowed for the current image size
    pub fn max_logo_size(&self) -> u32 {
        self.size / 3
    }
}

fn clamp_size(size: u32) -> u32 {
    size.clamp(MIN_SIZE, MAX_SIZE)
}

fn clamp_logo_size(logo_size: u32, size: u32) -> u32 {
    logo_size.clamp(MIN_LOGO_SIZE, (size / 3).max(MIN_LOGO_SIZE))
}
