use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use frameshift_contracts::events::EventWriter;
use frameshift_contracts::requests::{AspectRatio, GeneratedAsset, VideoRequest};
use frameshift_engine::{
    compose_edit_instruction, encode_binary_for_transfer, Studio, StudioError,
    EXAMPLE_EDIT_INSTRUCTIONS,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "frameshift",
    version,
    about = "Edit images and animate them into short videos with Gemini and Veo"
)]
struct Cli {
    /// Log request and polling details to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply a natural-language edit to an image.
    Edit(EditArgs),
    /// Ask the text model for caption text to put on the image.
    Suggest(SuggestArgs),
    /// Turn a still image into a short video.
    Animate(AnimateArgs),
    /// List example edit instructions.
    Presets,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    /// Caption text to render onto the image as part of the edit.
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SuggestArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    topic: Option<String>,
}

#[derive(Debug, Parser)]
struct AnimateArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "16:9")]
    aspect_ratio: AspectRatio,
    /// Where to keep the finished video; defaults to `<image>-animated.<ext>` next to the source.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("frameshift error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    match cli.command {
        Command::Edit(args) => run_edit(args),
        Command::Suggest(args) => run_suggest(args),
        Command::Animate(args) => run_animate(args),
        Command::Presets => {
            for preset in EXAMPLE_EDIT_INSTRUCTIONS {
                println!("{preset}");
            }
            Ok(0)
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let prompt = required_prompt(&args.prompt, "Please provide an image and an edit instruction.")?;
    let image = encode_binary_for_transfer(&args.image).map_err(present_error)?;
    let instruction = compose_edit_instruction(prompt, args.text.as_deref());

    let studio = Studio::from_env();
    let asset = studio
        .edit_image(image.bytes, &image.mime_type, &instruction)
        .map_err(present_error)?;
    let GeneratedAsset::Image { bytes, mime_type } = asset else {
        bail!("image edit returned a non-image asset");
    };

    let out = args
        .out
        .unwrap_or_else(|| default_edit_path(&args.image, mime_type.as_deref()));
    fs::write(&out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
    println!("{}", out.display());
    Ok(0)
}

fn run_suggest(args: SuggestArgs) -> Result<i32> {
    let prompt = required_prompt(&args.prompt, "Please enter an edit instruction first.")?;
    let studio = Studio::from_env();
    let suggestion = studio
        .generate_text_suggestion(prompt, args.topic.as_deref())
        .map_err(present_error)?;
    println!("{suggestion}");
    Ok(0)
}

fn run_animate(args: AnimateArgs) -> Result<i32> {
    let prompt = required_prompt(
        &args.prompt,
        "Please upload an image and enter an animation prompt.",
    )?;
    let image = encode_binary_for_transfer(&args.image).map_err(present_error)?;
    let request = VideoRequest::new(image.bytes, image.mime_type, prompt, args.aspect_ratio);

    let mut studio = Studio::from_env();
    if let Some(events_path) = args.events.as_ref() {
        studio = studio.with_event_log(EventWriter::new(events_path, job_id_for(&args.image)));
    }

    let asset = studio
        .animate_image(&request, &mut |progress| {
            eprintln!("[{}] {}", progress.phase, progress.message);
        })
        .map_err(present_error)?;
    let GeneratedAsset::Video { path, .. } = asset else {
        bail!("video job returned a non-video asset");
    };

    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("mp4")
        .to_string();
    let out = args
        .out
        .unwrap_or_else(|| default_video_path(&args.image, &ext));
    // Rename fails across filesystems; fall back to a copy and let the session file go.
    if let Err(err) = path.persist(&out) {
        fs::copy(&err.path, &out).with_context(|| {
            format!("failed to copy {} to {}", err.path.display(), out.display())
        })?;
    }
    println!("{}", out.display());
    Ok(0)
}

fn required_prompt<'a>(prompt: &'a str, message: &str) -> Result<&'a str> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        bail!("{message}");
    }
    Ok(trimmed)
}

/// Invalid keys surface as "entity not found"; tell the user to pick another one.
fn present_error(err: StudioError) -> anyhow::Error {
    if err.requires_key_reselection() {
        return anyhow::anyhow!(
            "The API key is invalid. Please select a valid API key (set API_KEY). ({err})"
        );
    }
    anyhow::Error::new(err)
}

fn default_edit_path(source: &Path, mime_type: Option<&str>) -> PathBuf {
    let ext = match mime_type.unwrap_or_default() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    };
    let stem = source
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("image");
    source.with_file_name(format!("{stem}-edited.{ext}"))
}

fn default_video_path(source: &Path, ext: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("image");
    source.with_file_name(format!("{stem}-animated.{ext}"))
}

fn job_id_for(image: &Path) -> String {
    let stem = image
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("video");
    format!("{stem}-{}", Uuid::new_v4())
}
