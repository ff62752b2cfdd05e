//! qrcraft command-line entrypoint

use anyhow::Context;
use clap::{Parser, Subcommand};
use qrcraft::output::{Rendered, preview, render_snapshot};
use qrcraft::{
    Backend, ColorRole, EccLevel, Error, FormState, Generator, Logo, Preferences, QrFormat,
    QrcraftConfig, logging, service,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const PREVIEW_COLUMNS: u32 = 48;

#[derive(Parser, Debug)]
#[command(
    name = "qrcraft",
    version,
    about = "Generate styled QR codes, optionally with a logo"
)]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to qrcraft.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Output results as formatted JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Render codes locally instead of calling the remote service
    #[arg(long, global = true)]
    offline: bool,

    /// Override the remote service endpoint
    #[arg(long, value_name = "URL", global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a single QR code
    Generate {
        /// Text or URL to encode
        text: String,

        #[command(flatten)]
        style: StyleArgs,

        /// Save the result in these formats (png, svg)
        #[arg(long, value_name = "FORMAT")]
        download: Vec<String>,

        /// Directory downloads are written into
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Decode the result locally and warn if it does not scan back
        #[arg(long)]
        verify: bool,

        /// Draw the result in the terminal
        #[arg(long)]
        preview: bool,
    },
    /// Generate one code per line read from stdin, keeping a running history
    Session {
        #[command(flatten)]
        style: StyleArgs,

        /// Directory downloads are written into
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Show or change the dark-mode preference
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct StyleArgs {
    /// Module color (#RGB or #RRGGBB)
    #[arg(long, value_name = "HEX")]
    color: Option<String>,

    /// Background color (#RGB or #RRGGBB)
    #[arg(long, value_name = "HEX")]
    bg_color: Option<String>,

    /// Edge length in pixels (100-1000)
    #[arg(long, value_name = "PX")]
    size: Option<u32>,

    /// Error correction level (L, M, Q, H)
    #[arg(long, value_name = "LEVEL")]
    ecc: Option<String>,

    /// Logo image to place at the center
    #[arg(long, value_name = "PATH")]
    logo: Option<PathBuf>,

    /// Logo edge length in pixels (20 to size/3)
    #[arg(long, value_name = "PX")]
    logo_size: Option<u32>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ThemeAction {
    /// Print the current setting
    Show,
    /// Flip between light and dark
    Toggle,
    /// Use dark mode
    Dark,
    /// Use light mode
    Light,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = QrcraftConfig::load(cli.config.as_deref())?;
    if cli.offline {
        config.service.backend = Backend::Local;
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.service.endpoint = endpoint.clone();
    }

    logging::init(&config.logging)?;

    let prefs_path = config.preferences.resolve()?;
    let mut preferences = Preferences::load(&prefs_path)
        .with_context(|| format!("loading preferences from {}", prefs_path.display()))?;

    match cli.command {
        Command::Theme { action } => {
            handle_theme(&mut preferences, action.unwrap_or(ThemeAction::Show), cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate {
            text,
            style,
            download,
            out,
            verify,
            preview,
        } => {
            let formats = download
                .iter()
                .map(|f| f.parse::<QrFormat>().map_err(Error::Config))
                .collect::<qrcraft::Result<Vec<_>>>()?;
            let out = out.unwrap_or_else(|| config.output.dir.clone());
            let generator = build_generator(&config, &style)?;
            generator.edit(|form| form.set_input(text.clone()));

            info!(backend = ?config.service.backend, "Generating QR code");
            let ok = handle_generate(&generator, cli.json, preview, preferences.dark_mode()).await?;
            if !ok {
                return Ok(ExitCode::FAILURE);
            }

            if verify {
                verify_result(&generator, cli.json)?;
            }

            let mut failed = false;
            for format in formats {
                failed |= !handle_download(&generator, format, &out, cli.json).await?;
            }
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Session { style, out } => {
            let out = out.unwrap_or_else(|| config.output.dir.clone());
            let generator = build_generator(&config, &style)?;
            run_session(&generator, &out, cli.json, preferences.dark_mode()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_generator(config: &QrcraftConfig, style: &StyleArgs) -> anyhow::Result<Generator> {
    let mut form = FormState::from_defaults(&config.defaults);
    apply_style(&mut form, style)?;
    let backend = service::from_options(&config.service)?;
    Ok(Generator::new(backend, config.service.clone(), form))
}

fn apply_style(form: &mut FormState, style: &StyleArgs) -> anyhow::Result<()> {
    if let Some(ref color) = style.color {
        let committed = form.set_color(ColorRole::Foreground, color.clone());
        if committed.as_str() != color {
            eprintln!("Invalid color '{color}', using {committed}");
        }
    }
    if let Some(ref bg) = style.bg_color {
        let committed = form.set_color(ColorRole::Background, bg.clone());
        if committed.as_str() != bg {
            eprintln!("Invalid background color '{bg}', using {committed}");
        }
    }
    if let Some(size) = style.size {
        form.set_size(size);
    }
    if let Some(ref ecc) = style.ecc {
        form.set_ecc(ecc.parse::<EccLevel>().map_err(Error::Config)?);
    }
    if let Some(ref path) = style.logo {
        let logo = Logo::from_path(path)
            .with_context(|| format!("reading logo {}", path.display()))?;
        form.set_logo(Some(logo));
    }
    if let Some(logo_size) = style.logo_size {
        form.set_logo_size(logo_size);
    }
    Ok(())
}

fn emit(rendered: &Rendered, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&rendered.json)?);
    } else {
        for line in &rendered.human {
            println!("{line}");
        }
    }
    Ok(())
}

async fn handle_generate(
    generator: &Generator,
    json: bool,
    show_preview: bool,
    dark_mode: bool,
) -> anyhow::Result<bool> {
    let result = generator.generate().await;
    emit(&render_snapshot(&generator.form(), &generator.snapshot()), json)?;

    match result {
        Ok(image) => {
            if show_preview && !json {
                for line in preview(image.bytes(), PREVIEW_COLUMNS, dark_mode)? {
                    println!("{line}");
                }
            }
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

fn verify_result(generator: &Generator, json: bool) -> anyhow::Result<()> {
    let Some(scannable) = generator.verify_scannable()? else {
        return Ok(());
    };
    if json {
        println!("{}", json!({ "scannable": scannable }));
    } else if scannable {
        println!("Verified: code scans back to the input");
    } else {
        println!("Warning: code did not scan back; try a smaller logo or ECC level H");
    }
    Ok(())
}

async fn handle_download(
    generator: &Generator,
    format: QrFormat,
    out: &Path,
    json: bool,
) -> anyhow::Result<bool> {
    match generator.download(format, out).await {
        Ok(Some(path)) => {
            if json {
                println!("{}", json!({ "downloaded": path, "format": format }));
            } else {
                println!("Saved {}", path.display());
            }
            Ok(true)
        }
        Ok(None) => Ok(true),
        Err(err) => {
            if json {
                println!("{}", json!({ "error": err.user_message() }));
            } else {
                println!("Error: {}", err.user_message());
            }
            Ok(false)
        }
    }
}

async fn run_session(
    generator: &Generator,
    out: &Path,
    json: bool,
    dark_mode: bool,
) -> anyhow::Result<()> {
    if !json {
        println!("Enter text or a URL per line. Commands: :png, :svg, :history, :quit");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" | ":q" => break,
            ":png" => {
                handle_download(generator, QrFormat::Png, out, json).await?;
            }
            ":svg" => {
                handle_download(generator, QrFormat::Svg, out, json).await?;
            }
            ":history" => {
                emit(&render_snapshot(&generator.form(), &generator.snapshot()), json)?;
            }
            _ => {
                generator.edit(|form| form.set_input(line.clone()));
                handle_generate(generator, json, false, dark_mode).await?;
            }
        }
    }
    Ok(())
}

fn handle_theme(
    preferences: &mut Preferences,
    action: ThemeAction,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        ThemeAction::Show => {}
        ThemeAction::Toggle => {
            preferences.toggle_dark_mode()?;
        }
        ThemeAction::Dark => preferences.set_dark_mode(true)?,
        ThemeAction::Light => preferences.set_dark_mode(false)?,
    }

    if json {
        println!(
            "{}",
            json!({ "dark_mode": preferences.dark_mode(), "path": preferences.path() })
        );
    } else {
        println!(
            "Theme: {} ({})",
            if preferences.dark_mode() { "dark" } else { "light" },
            preferences.path().display()
        );
    }
    Ok(())
}
