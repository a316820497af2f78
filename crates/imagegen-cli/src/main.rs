use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use imagegen_contracts::{
    resolve_credential, GenerateError, GenerationRequest, TargetSize, DEFAULT_SIZE,
};
use imagegen_engine::{CancelSignal, ClientConfig, ImageRequestClient, NormalizedImage};
use log::warn;
use tempfile::NamedTempFile;

const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "imagegen",
    version,
    about = "Generate an image from a text prompt using the Google Gemini API"
)]
struct Cli {
    /// Text prompt to generate an image from
    #[arg(short = 'p', long)]
    prompt: String,
    /// Where the generated image is written
    #[arg(short = 'o', long)]
    output: PathBuf,
    /// Gemini API key; falls back to GEMINI_API_KEY
    #[arg(short = 'k', long = "api-key")]
    api_key: Option<String>,
    /// Exact output size as WIDTHxHEIGHT, each side at most 4096
    #[arg(short = 's', long, default_value = DEFAULT_SIZE)]
    size: String,
    /// Upstream model; falls back to GEMINI_IMAGE_MODEL
    #[arg(short = 'm', long)]
    model: Option<String>,
    /// Keep the upstream image as returned instead of resizing it
    #[arg(long)]
    no_normalize: bool,
}

fn main() {
    pretty_env_logger::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagegen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let request = build_request(&cli, |key| env::var(key).ok())?;
    let config = client_config(cli.model.as_deref());

    println!("imagegen - generating image using Google Gemini API");
    println!("Prompt: {}", request.prompt());
    println!("Output: {}", cli.output.display());
    println!("Size: {}", request.size());
    println!("Model: {}", config.model);
    println!("Using API key from {}", request.credential().source());
    println!();

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("failed to install Ctrl+C handler")?;

    let client = ImageRequestClient::new(config)?;
    println!("Generating image...");
    let image = match client.request_image_with_cancel(&request, &cancel) {
        Ok(image) => image,
        Err(err) if err.is_cancelled() => {
            eprintln!("Cancelled; no file written.");
            return Ok(EXIT_CANCELLED);
        }
        Err(err) => return Err(err.into()),
    };

    warn_on_extension_mismatch(&cli.output, &image);
    println!("Saving image...");
    write_output(&cli.output, &image.bytes)?;

    println!();
    println!("Image generated successfully!");
    println!("Saved to: {}", cli.output.display());
    println!(
        "Size: {} bytes ({}x{})",
        image.bytes.len(),
        image.width,
        image.height
    );
    Ok(0)
}

/// Size, then credential, then prompt. All of it happens before any network traffic.
fn build_request<F>(cli: &Cli, lookup: F) -> Result<GenerationRequest, GenerateError>
where
    F: FnOnce(&str) -> Option<String>,
{
    let size = TargetSize::parse(&cli.size)?;
    let credential = resolve_credential(cli.api_key.as_deref(), lookup)?;
    let request = GenerationRequest::new(cli.prompt.clone(), size, credential)?;
    Ok(request.with_normalize(!cli.no_normalize))
}

fn client_config(model: Option<&str>) -> ClientConfig {
    let config = ClientConfig::from_env();
    match model.map(str::trim).filter(|value| !value.is_empty()) {
        Some(model) => config.with_model(model),
        None => config,
    }
}

fn warn_on_extension_mismatch(path: &Path, image: &NormalizedImage) {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return;
    };
    let matches = image
        .format
        .extensions_str()
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext));
    if !matches {
        warn!(
            "{} has extension .{ext} but the image is {}",
            path.display(),
            image.extension()
        );
    }
}

/// Writes through a temp file in the destination directory, so a failure never leaves
/// a partial or truncated output behind.
fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.exists() {
        println!("Creating output directory: {}", parent.display());
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    temp.write_all(bytes)
        .with_context(|| format!("failed to write {}", temp.path().display()))?;
    temp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
