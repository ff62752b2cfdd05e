//! Minimal HTTP/1.1 stand-in for the remote QR image service.
//!
//! Answers every GET with an image in the requested `format`. Payloads containing
//! `fail` get a 500. Every request target is recorded for inspection.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

pub struct StubServer {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<Url>>>,
}

impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("local addr");
        let endpoint = format!("http://{addr}/v1/create-qr-code/");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let base = Url::parse(&endpoint).expect("endpoint url");
        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                let base = base.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, &base, &recorded).await;
                });
            }
        });

        Self { endpoint, requests }
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().expect("requests mutex").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests mutex").len()
    }
}

pub fn png(size: u32, color: Rgba<u8>) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, color))
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

async fn handle(
    mut stream: TcpStream,
    base: &Url,
    recorded: &Mutex<Vec<Url>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let url = base.join(target).expect("request target");
    recorded.lock().expect("requests mutex").push(url.clone());

    let data = query(&url, "data").unwrap_or_default();
    let (status, content_type, body) = if data.contains("fail") {
        ("500 Internal Server Error", "text/plain", b"error".to_vec())
    } else if query(&url, "format").as_deref() == Some("svg") {
        (
            "200 OK",
            "image/svg+xml",
            br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#.to_vec(),
        )
    } else {
        let size = query(&url, "size")
            .and_then(|s| s.split('x').next().and_then(|n| n.parse().ok()))
            .unwrap_or(200);
        ("200 OK", "image/png", png(size, Rgba([0, 0, 0, 255])))
    };

    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}
