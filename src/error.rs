//! Error types for qrcraft operations

use thiserror::Error;

/// Result type alias using qrcraft's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when the submitted text is empty.
pub const INVALID_INPUT_MESSAGE: &str = "Please enter a valid text or URL";

/// Main error type for qrcraft operations
#[derive(Error, Debug)]
pub enum Error {
    /// Submitted text was empty or whitespace only
    #[error("{}", INVALID_INPUT_MESSAGE)]
    InvalidInput,

    /// Color string is not `#RGB` / `#RRGGBB`
    #[error("Invalid hex color: {0}")]
    InvalidColor(String),

    /// Remote generator answered with a non-success status
    #[error("QR service returned HTTP {status}")]
    Fetch {
        /// HTTP status code
        status: u16,
    },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Logo composition failed
    #[error("Logo composition failed: {0}")]
    Compose(String),

    /// Download of a given format failed
    #[error("Download as {format} failed: {reason}")]
    Download {
        /// Requested format label (`png` / `svg`)
        format: String,
        /// Underlying reason
        reason: String,
    },

    /// A generation is already in flight
    #[error("A QR code is already being generated")]
    Busy,

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// QR code encoding failed
    #[error("Failed to encode QR code: {0}")]
    QrEncode(String),

    /// QR code decoding failed
    #[error("Failed to decode QR code: {0}")]
    QrDecode(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The single user-facing message for this error, as shown in the result panel.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidInput => INVALID_INPUT_MESSAGE.to_string(),
            Error::Fetch { .. } | Error::Http(_) | Error::Image(_) | Error::QrEncode(_) => {
                "An error occurred while generating the QR code. Please try again.".to_string()
            }
            Error::Compose(_) => {
                "An error occurred while adding the logo. Please try again.".to_string()
            }
            Error::Download { format, .. } => format!(
                "Failed to download QR code as {}. Please try again.",
                format.to_ascii_uppercase()
            ),
            Error::Busy => "A QR code is already being generated. Please wait.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", e))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidColor(format!("hex decode error: {}", e))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Config(format!("Invalid service endpoint: {}", e))
    }
}
