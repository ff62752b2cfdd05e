//! Saving the current code as PNG or SVG

use crate::config::ServiceOptions;
use crate::error::{Error, Result};
use crate::form::FormState;
use crate::generator::QrImage;
use crate::request::{QrFormat, QrRequest};
use crate::service::QrService;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::info;

/// A file ready to be written
#[derive(Debug, Clone)]
pub struct DownloadFile {
    /// Suggested file name (`qrcode.<ext>` or `qrcode-with-logo.<ext>`)
    pub file_name: String,
    /// Encoded contents
    pub bytes: Bytes,
    /// Format of `bytes`
    pub format: QrFormat,
}

impl DownloadFile {
    /// Write into `dir`, creating it if needed.
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        info!(path = %path.display(), bytes = self.bytes.len(), "Saved QR code");
        Ok(path)
    }
}

/// File name for a download.
pub fn file_name(format: QrFormat, with_logo: bool) -> String {
    if with_logo {
        format!("qrcode-with-logo.{}", format.extension())
    } else {
        format!("qrcode.{}", format.extension())
    }
}

/// Produce the bytes for downloading `image` as `format`.
///
/// Composited images only exist as PNG. Plain codes are requested again from the
/// service in the chosen format, using the raw form input.
pub async fn prepare(
    service: &dyn QrService,
    options: &ServiceOptions,
    form: &FormState,
    image: &QrImage,
    format: QrFormat,
) -> Result<DownloadFile> {
    if image.has_logo() {
        return match format {
            QrFormat::Png => Ok(DownloadFile {
                file_name: file_name(format, true),
                bytes: image.bytes().clone(),
                format,
            }),
            QrFormat::Svg => Err(Error::Download {
                format: format.to_string(),
                reason: "SVG download is not available for codes with an embedded logo"
                    .to_string(),
            }),
        };
    }

    let request = QrRequest::for_download(form, options, format)?;
    let fetched = service.fetch(&request).await?;
    Ok(DownloadFile {
        file_name: file_name(format, false),
        bytes: fetched.bytes,
        format,
    })
}

/// Wrap any failure as a download error for `format`.
pub fn as_download_error(err: Error, format: QrFormat) -> Error {
    match err {
        err @ Error::Download { .. } => err,
        other => Error::Download {
            format: format.to_string(),
            reason: other.to_string(),
        },
    }
}
