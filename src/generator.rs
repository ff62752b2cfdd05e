//! Request / render flow: validate the form, fetch, optionally composite, record history

use crate::compose::{self, LogoOverlay};
use crate::config::ServiceOptions;
use crate::download::{self, DownloadFile};
use crate::error::{Error, Result};
use crate::form::FormState;
use crate::history::History;
use crate::request::{QrFormat, QrRequest};
use crate::service::QrService;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Where a generation currently stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    /// Nothing submitted yet
    #[default]
    Idle,
    /// Checking the form
    Validating,
    /// Waiting on the generator service
    Fetching,
    /// Drawing the logo over the fetched code
    Compositing,
    /// A result is available
    Ready,
    /// The last submission failed
    Error,
}

impl GenerationState {
    /// Whether work is outstanding
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Fetching | Self::Compositing)
    }
}

/// A generated code, as displayed
#[derive(Debug, Clone)]
pub enum QrImage {
    /// The service's image, used as-is
    Remote {
        /// Fetched resource reference
        url: String,
        /// Encoded image
        bytes: Bytes,
    },
    /// A locally composited PNG with a logo
    Composited {
        /// `data:image/png;base64,...`
        data_uri: String,
        /// Encoded PNG
        bytes: Bytes,
        /// Reference of the image the logo was drawn onto
        source_url: String,
    },
}

impl QrImage {
    /// Reference to display or record in history
    pub fn reference(&self) -> &str {
        match self {
            Self::Remote { url, .. } => url,
            Self::Composited { data_uri, .. } => data_uri,
        }
    }

    /// Encoded image bytes
    pub fn bytes(&self) -> &Bytes {
        match self {
            Self::Remote { bytes, .. } | Self::Composited { bytes, .. } => bytes,
        }
    }

    /// Whether a logo was composited in
    pub fn has_logo(&self) -> bool {
        matches!(self, Self::Composited { .. })
    }
}

/// Point-in-time view of the generator for rendering
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Current state
    pub state: GenerationState,
    /// Fetching or compositing
    pub loading: bool,
    /// Last user-facing error
    pub error: Option<String>,
    /// Reference of the displayed image
    pub reference: Option<String>,
    /// Whether the displayed image carries a logo
    pub with_logo: bool,
    /// Recent references, newest first
    pub history: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    form: FormState,
    state: GenerationState,
    image: Option<QrImage>,
    payload: Option<String>,
    history: History,
    error: Option<String>,
}

impl Inner {
    fn fail(&mut self, err: &Error, clear_image: bool) {
        self.error = Some(err.user_message());
        self.state = GenerationState::Error;
        if clear_image {
            self.image = None;
            self.payload = None;
        }
    }
}

/// Drives the form through validation, fetching and composition.
///
/// Only one generation runs at a time; a concurrent call gets [`Error::Busy`].
pub struct Generator {
    service: Arc<dyn QrService>,
    options: ServiceOptions,
    inner: Mutex<Inner>,
    in_flight: AtomicBool,
}

/// Held for the duration of one generation.
///
/// Dropping it mid-flight (timeout, `select!`, aborted task) moves the state off
/// `Fetching`/`Compositing` so the generator no longer reports loading.
struct InFlight<'a>(&'a Generator);

impl<'a> InFlight<'a> {
    fn acquire(generator: &'a Generator) -> Option<Self> {
        generator
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(generator))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.0.lock();
            if inner.state.is_loading() {
                debug!(state = ?inner.state, "Generation cancelled");
                inner.state = if inner.image.is_some() {
                    GenerationState::Ready
                } else {
                    GenerationState::Idle
                };
            }
        }
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl Generator {
    /// Create a generator over `service` with an initial form.
    pub fn new(service: Arc<dyn QrService>, options: ServiceOptions, form: FormState) -> Self {
        Self {
            service,
            options,
            inner: Mutex::new(Inner {
                form,
                ..Inner::default()
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit the form in place.
    pub fn edit<R>(&self, f: impl FnOnce(&mut FormState) -> R) -> R {
        f(&mut self.lock().form)
    }

    /// Copy of the current form
    pub fn form(&self) -> FormState {
        self.lock().form.clone()
    }

    /// Current state
    pub fn state(&self) -> GenerationState {
        self.lock().state
    }

    /// Whether a fetch or composition is outstanding
    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    /// Last user-facing error message
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Displayed image
    pub fn image(&self) -> Option<QrImage> {
        self.lock().image.clone()
    }

    /// Text encoded in the displayed code, including any UTM tagging
    pub fn payload(&self) -> Option<String> {
        self.lock().payload.clone()
    }

    /// Decode the displayed code and check it against [`Generator::payload`].
    ///
    /// `Ok(None)` when nothing has been generated.
    pub fn verify_scannable(&self) -> Result<Option<bool>> {
        let (image, payload) = {
            let inner = self.lock();
            (inner.image.clone(), inner.payload.clone())
        };
        match (image, payload) {
            (Some(image), Some(payload)) => {
                compose::verify_scannable(image.bytes(), &payload).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Recent references
    pub fn history(&self) -> History {
        self.lock().history.clone()
    }

    /// Everything needed to render the current view
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            state: inner.state,
            loading: inner.state.is_loading(),
            error: inner.error.clone(),
            reference: inner.image.as_ref().map(|i| i.reference().to_string()),
            with_logo: inner.image.as_ref().is_some_and(QrImage::has_logo),
            history: inner.history.iter().map(str::to_string).collect(),
        }
    }

    fn set_state(&self, state: GenerationState) {
        self.lock().state = state;
    }

    fn fail(&self, err: Error, clear_image: bool) -> Error {
        warn!(error = %err, "QR generation failed");
        self.lock().fail(&err, clear_image);
        err
    }

    /// Validate the form, fetch the code and composite the logo if one is set.
    pub async fn generate(&self) -> Result<QrImage> {
        let Some(_flight) = InFlight::acquire(self) else {
            debug!("Generation already in flight");
            return Err(Error::Busy);
        };

        let (request, overlay) = {
            let mut inner = self.lock();
            inner.state = GenerationState::Validating;
            let prepared = QrRequest::for_generation(&inner.form, &self.options)
                .and_then(|req| Ok((req, LogoOverlay::from_form(&inner.form)?)));
            match prepared {
                Ok(prepared) => {
                    inner.error = None;
                    inner.state = GenerationState::Fetching;
                    prepared
                }
                Err(err) => {
                    inner.fail(&err, true);
                    debug!(error = %err, "Form rejected");
                    return Err(err);
                }
            }
        };

        let fetched = match self.service.fetch(&request).await {
            Ok(fetched) => fetched,
            Err(err) => return Err(self.fail(err, true)),
        };

        let image = match overlay {
            None => QrImage::Remote {
                url: fetched.url,
                bytes: fetched.bytes,
            },
            Some(overlay) => {
                self.set_state(GenerationState::Compositing);
                match compose::compose_async(fetched.bytes, overlay).await {
                    Ok(composed) => QrImage::Composited {
                        data_uri: composed.data_uri,
                        bytes: composed.png,
                        source_url: fetched.url,
                    },
                    Err(err) => return Err(self.fail(err, true)),
                }
            }
        };

        {
            let mut inner = self.lock();
            inner.history.push(image.reference());
            inner.image = Some(image.clone());
            inner.payload = Some(request.data);
            inner.state = GenerationState::Ready;
        }
        info!(
            with_logo = image.has_logo(),
            bytes = image.bytes().len(),
            "Generated QR code"
        );

        Ok(image)
    }

    /// Prepare the displayed code for download. `Ok(None)` when nothing has been generated.
    pub async fn prepare_download(&self, format: QrFormat) -> Result<Option<DownloadFile>> {
        let (form, image) = {
            let inner = self.lock();
            (inner.form.clone(), inner.image.clone())
        };
        let Some(image) = image else {
            return Ok(None);
        };

        match download::prepare(self.service.as_ref(), &self.options, &form, &image, format).await
        {
            Ok(file) => Ok(Some(file)),
            Err(err) => Err(self.download_failed(err, format)),
        }
    }

    /// Download the displayed code into `dir`, returning the written path.
    pub async fn download(&self, format: QrFormat, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(file) = self.prepare_download(format).await? else {
            return Ok(None);
        };
        match file.save(dir).await {
            Ok(path) => Ok(Some(path)),
            Err(err) => Err(self.download_failed(err, format)),
        }
    }

    fn download_failed(&self, err: Error, format: QrFormat) -> Error {
        let err = download::as_download_error(err, format);
        warn!(error = %err, "Download failed");
        self.lock().error = Some(err.user_message());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UtmOptions;
    use crate::form::Logo;
    use crate::service::{FetchedImage, LocalQrService};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn png(size: u32, color: Rgba<u8>) -> Bytes {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, color))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        Bytes::from(buf.into_inner())
    }

    #[derive(Default)]
    struct StubService {
        calls: AtomicUsize,
        fail_with: Option<u16>,
        body: Option<Bytes>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl QrService for StubService {
        async fn fetch(&self, request: &QrRequest) -> Result<FetchedImage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(status) = self.fail_with {
                return Err(Error::Fetch { status });
            }
            Ok(FetchedImage {
                url: format!("https://qr.test/{n}/{}", request.data),
                bytes: self
                    .body
                    .clone()
                    .unwrap_or_else(|| png(request.size, Rgba([0, 0, 0, 255]))),
                content_type: Some(request.format.mime().to_string()),
            })
        }
    }

    fn generator(service: StubService) -> (Arc<StubService>, Generator) {
        let service = Arc::new(service);
        let generator = Generator::new(
            service.clone(),
            ServiceOptions::default(),
            FormState::default(),
        );
        (service, generator)
    }

    #[tokio::test]
    async fn test_empty_input_skips_network() {
        let (service, generator) = generator(StubService::default());
        generator.edit(|f| f.set_input("   "));

        let err = generator.generate().await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.state(), GenerationState::Error);
        assert_eq!(
            generator.error().as_deref(),
            Some("Please enter a valid text or URL")
        );
        assert!(generator.image().is_none());
    }

    #[tokio::test]
    async fn test_plain_generation_uses_fetched_reference() {
        let (_, generator) = generator(StubService::default());
        generator.edit(|f| f.set_input("hello"));

        let image = generator.generate().await.unwrap();
        assert_eq!(image.reference(), "https://qr.test/0/hello");
        assert!(!image.has_logo());
        assert_eq!(generator.state(), GenerationState::Ready);
        assert_eq!(generator.history().latest(), Some("https://qr.test/0/hello"));
        assert!(generator.error().is_none());
    }

    #[tokio::test]
    async fn test_logo_generation_composites() {
        let (_, generator) = generator(StubService::default());
        generator.edit(|f| {
            f.set_input("with logo");
            f.set_logo(Some(
                Logo::from_bytes(png(16, Rgba([255, 0, 0, 255]))).unwrap(),
            ));
        });

        let image = generator.generate().await.unwrap();
        assert!(image.has_logo());
        assert!(image.reference().starts_with("data:image/png;base64,"));
        match &image {
            QrImage::Composited { source_url, .. } => {
                assert_ne!(image.reference(), source_url);
            }
            QrImage::Remote { .. } => panic!("expected composited image"),
        }
        assert_eq!(generator.history().latest(), Some(image.reference()));
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_error_and_clears_image() {
        let (_, generator) = generator(StubService {
            fail_with: Some(500),
            ..StubService::default()
        });
        generator.edit(|f| f.set_input("boom"));

        assert!(matches!(
            generator.generate().await,
            Err(Error::Fetch { status: 500 })
        ));
        let snapshot = generator.snapshot();
        assert_eq!(snapshot.state, GenerationState::Error);
        assert!(!snapshot.loading);
        assert!(snapshot.reference.is_none());
        assert!(snapshot.history.is_empty());
        assert_eq!(
            snapshot.error.as_deref(),
            Some("An error occurred while generating the QR code. Please try again.")
        );
    }

    #[tokio::test]
    async fn test_composition_failure_is_reported() {
        let (_, generator) = generator(StubService {
            body: Some(Bytes::from_static(b"<html>not an image</html>")),
            ..StubService::default()
        });
        generator.edit(|f| {
            f.set_input("x");
            f.set_logo(Some(
                Logo::from_bytes(png(8, Rgba([0, 0, 255, 255]))).unwrap(),
            ));
        });

        assert!(matches!(generator.generate().await, Err(Error::Compose(_))));
        assert_eq!(generator.state(), GenerationState::Error);
        assert!(generator.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded_newest_first() {
        let (_, generator) = generator(StubService::default());
        for i in 0..8 {
            generator.edit(|f| f.set_input(format!("item-{i}")));
            generator.generate().await.unwrap();
        }
        let history: Vec<String> = generator.history().iter().map(str::to_string).collect();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0], "https://qr.test/7/item-7");
        assert_eq!(history[4], "https://qr.test/3/item-3");
    }

    #[tokio::test]
    async fn test_concurrent_generate_is_rejected() {
        let gate = Arc::new(Notify::new());
        let (service, generator) = generator(StubService {
            gate: Some(gate.clone()),
            ..StubService::default()
        });
        let generator = Arc::new(generator);
        generator.edit(|f| f.set_input("once"));

        let first = tokio::spawn({
            let generator = generator.clone();
            async move { generator.generate().await }
        });
        while service.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(generator.is_loading());
        assert!(matches!(generator.generate().await, Err(Error::Busy)));

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        assert!(generator.generate().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_generation_stops_loading() {
        let gate = Arc::new(Notify::new());
        let (service, generator) = generator(StubService {
            gate: Some(gate.clone()),
            ..StubService::default()
        });
        generator.edit(|f| f.set_input("stalled"));

        let timed_out = tokio::time::timeout(Duration::from_millis(50), generator.generate()).await;
        assert!(timed_out.is_err());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.state(), GenerationState::Idle);
        assert!(!generator.is_loading());
        assert!(!generator.snapshot().loading);

        gate.notify_one();
        let image = generator.generate().await.unwrap();
        assert_eq!(generator.state(), GenerationState::Ready);

        let timed_out = tokio::time::timeout(Duration::from_millis(50), generator.generate()).await;
        assert!(timed_out.is_err());
        assert_eq!(generator.state(), GenerationState::Ready);
        assert_eq!(
            generator.image().map(|i| i.reference().to_string()),
            Some(image.reference().to_string())
        );
    }

    #[tokio::test]
    async fn test_verify_uses_tagged_payload() {
        let options = ServiceOptions {
            utm: Some(UtmOptions::default()),
            ..ServiceOptions::default()
        };
        let generator = Generator::new(
            Arc::new(LocalQrService::new()),
            options,
            FormState::default(),
        );
        assert_eq!(generator.verify_scannable().unwrap(), None);

        generator.edit(|f| {
            f.set_input("https://example.com");
            f.set_size(400);
        });
        let image = generator.generate().await.unwrap();

        let tagged =
            "https://example.com?utm_source=qr_code&utm_medium=print&utm_campaign=campaign_name";
        assert_eq!(generator.payload().as_deref(), Some(tagged));
        assert_eq!(generator.verify_scannable().unwrap(), Some(true));
        assert!(!compose::verify_scannable(image.bytes(), "https://example.com").unwrap());
    }

    #[tokio::test]
    async fn test_download_without_result_is_noop() {
        let (service, generator) = generator(StubService::default());
        let file = generator.prepare_download(QrFormat::Png).await.unwrap();
        assert!(file.is_none());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_download_plain_reissues_request() {
        let (service, generator) = generator(StubService::default());
        generator.edit(|f| f.set_input("plain"));
        generator.generate().await.unwrap();

        let file = generator
            .prepare_download(QrFormat::Svg)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.file_name, "qrcode.svg");
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_download_with_logo_png_only() {
        let (service, generator) = generator(StubService::default());
        generator.edit(|f| {
            f.set_input("logo");
            f.set_logo(Some(
                Logo::from_bytes(png(8, Rgba([0, 255, 0, 255]))).unwrap(),
            ));
        });
        let image = generator.generate().await.unwrap();

        let file = generator
            .prepare_download(QrFormat::Png)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.file_name, "qrcode-with-logo.png");
        assert_eq!(&file.bytes, image.bytes());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        let err = generator.prepare_download(QrFormat::Svg).await.unwrap_err();
        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(
            generator.error().as_deref(),
            Some("Failed to download QR code as SVG. Please try again.")
        );
        // A failed download keeps the displayed code.
        assert!(generator.image().is_some());
    }
}
