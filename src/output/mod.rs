//! Rendering generation results for the terminal

use crate::error::Result;
use crate::form::FormState;
use crate::generator::{GenerationState, Snapshot};
use image::GrayImage;
use image::imageops::{self, FilterType};
use serde_json::{Value, json};

/// Longest reference shown verbatim in human output
const REFERENCE_PREVIEW_CHARS: usize = 72;

/// Combined structured and human-readable representation of a generator view
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Structured JSON representation suitable for downstream consumers
    pub json: Value,
    /// Human-readable lines for terminal presentation
    pub human: Vec<String>,
}

/// Render the current form and generator snapshot.
pub fn render_snapshot(form: &FormState, snapshot: &Snapshot) -> Rendered {
    let json = json!({
        "state": snapshot.state,
        "loading": snapshot.loading,
        "error": snapshot.error,
        "reference": snapshot.reference,
        "with_logo": snapshot.with_logo,
        "history": snapshot.history,
        "form": form_value(form),
    });

    let mut human = Vec::new();
    match (&snapshot.error, snapshot.state) {
        (Some(error), _) => human.push(format!("Error: {error}")),
        (None, GenerationState::Ready) => human.push("QR code ready".to_string()),
        (None, state) => human.push(format!("State: {}", state_label(state))),
    }

    human.push(format!(
        "  Text: {}",
        if form.input().is_empty() { "(empty)" } else { form.input() }
    ));
    human.push(format!("  Size: {0}x{0}", form.size()));
    human.push(format!(
        "  Colors: {} on {}",
        form.color(),
        form.bg_color()
    ));
    human.push(format!("  Error correction: {}", form.ecc().label()));
    if let Some(logo) = form.logo() {
        human.push(format!(
            "  Logo: {} ({} bytes) at {}px",
            logo.mime(),
            logo.bytes().len(),
            form.logo_size()
        ));
    }

    if let Some(reference) = &snapshot.reference {
        human.push(format!("  Image: {}", shorten(reference)));
    }

    if !snapshot.history.is_empty() {
        human.push("Recent QR codes:".to_string());
        for (index, reference) in snapshot.history.iter().enumerate() {
            human.push(format!("  {}. {}", index + 1, shorten(reference)));
        }
    }

    Rendered { json, human }
}

fn form_value(form: &FormState) -> Value {
    json!({
        "input": form.input(),
        "color": form.color().as_str(),
        "bg_color": form.bg_color().as_str(),
        "size": form.size(),
        "ecc": form.ecc().as_str(),
        "logo": form.logo().map(|logo| json!({
            "mime": logo.mime(),
            "bytes": logo.bytes().len(),
            "size": form.logo_size(),
        })),
    })
}

fn state_label(state: GenerationState) -> &'static str {
    match state {
        GenerationState::Idle => "idle",
        GenerationState::Validating => "validating",
        GenerationState::Fetching => "fetching",
        GenerationState::Compositing => "compositing",
        GenerationState::Ready => "ready",
        GenerationState::Error => "error",
    }
}

fn shorten(reference: &str) -> String {
    if reference.chars().count() <= REFERENCE_PREVIEW_CHARS {
        return reference.to_string();
    }
    let head: String = reference.chars().take(REFERENCE_PREVIEW_CHARS).collect();
    format!("{head}… ({} chars)", reference.len())
}

/// Draw an encoded bitmap with half-block characters, `columns` wide.
///
/// In dark mode ink marks light pixels so the code reads correctly on a dark background.
pub fn preview(encoded: &[u8], columns: u32, dark_mode: bool) -> Result<Vec<String>> {
    let gray = image::load_from_memory(encoded)?.to_luma8();
    let columns = columns.clamp(8, gray.width().max(8));
    let rows = (columns * gray.height() / gray.width().max(1)).max(2);
    let small = imageops::resize(&gray, columns, rows + rows % 2, FilterType::Nearest);
    Ok(half_blocks(&small, dark_mode))
}

fn half_blocks(image: &GrayImage, dark_mode: bool) -> Vec<String> {
    let ink = |x: u32, y: u32| {
        let dark = image.get_pixel(x, y)[0] < 128;
        dark != dark_mode
    };

    (0..image.height())
        .step_by(2)
        .map(|y| {
            (0..image.width())
                .map(|x| {
                    let top = ink(x, y);
                    let bottom = y + 1 < image.height() && ink(x, y + 1);
                    match (top, bottom) {
                        (true, true) => '█',
                        (true, false) => '▀',
                        (false, true) => '▄',
                        (false, false) => ' ',
                    }
                })
                .collect()
        })
        .collect()
}
