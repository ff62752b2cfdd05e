//! qrcraft - styled QR codes from a remote generator, with logo overlays
//!
//! The crate wraps a `create-qr-code` style HTTP image service (or an offline
//! renderer) behind a small form model and a single-flight generation flow.
//!
//! # Features
//!
//! - **Form model**: validated hex colors, clamped size and logo size, ECC level
//! - **Remote or local**: `reqwest` client for the image API, `qrcode` renderer offline
//! - **Logo overlay**: composites a logo on a backing square at the center of the code
//! - **History & downloads**: last five codes, PNG/SVG downloads
//!
//! # Example
//!
//! ```no_run
//! use qrcraft::{FormState, Generator, QrcraftConfig, service};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = QrcraftConfig::load(None)?;
//!     let backend = service::from_options(&config.service)?;
//!     let generator = Generator::new(
//!         backend,
//!         config.service.clone(),
//!         FormState::from_defaults(&config.defaults),
//!     );
//!
//!     generator.edit(|form| form.set_input("https://example.com"));
//!     let image = generator.generate().await?;
//!     println!("Generated: {}", image.reference());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]

pub mod compose;
pub mod config;
pub mod download;
pub mod error;
pub mod form;
pub mod generator;
pub mod history;
pub mod logging;
pub mod output;
pub mod preferences;
pub mod qr;
pub mod request;
pub mod service;

// Re-exports for convenience
pub use error::{Error, Result};

pub use config::{Backend, LogRotation, LoggingOptions, QrcraftConfig, ServiceOptions, UtmOptions};
pub use form::{ColorRole, EccLevel, FormState, HexColor, Logo};
pub use generator::{GenerationState, Generator, QrImage, Snapshot};
pub use history::History;
pub use preferences::Preferences;
pub use request::{QrFormat, QrRequest};
pub use service::{FetchedImage, HttpQrService, LocalQrService, QrService};
