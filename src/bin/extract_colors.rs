use clap::Parser;
use std::fs;
use std::path::PathBuf;
use color_extractor_wasm::{ExtractedColor, extract_colors_bytes};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Print the dominant colours of images, heaviest first.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Shrink images so the longest side is at most this many pixels before sampling
    #[arg(short, long)]
    downscale: Option<u32>,

    /// Only print the first N colours of each image
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Emit one JSON document instead of plain text
    #[arg(long)]
    json: bool,
}

fn to_json(colors: &[ExtractedColor]) -> Value {
    Value::Array(
        colors
            .iter()
            .map(|c| json!({ "color": c.hex(), "weight": c.weight }))
            .collect(),
    )
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "color_extractor_wasm=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse();
    let mut report = serde_json::Map::new();

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let mut colors = extract_colors_bytes(&bytes, args.downscale)
            .with_context(|| format!("extracting colors from {}", input.display()))?;
        if let Some(limit) = args.limit {
            colors.truncate(limit);
        }

        if args.json {
            report.insert(input.display().to_string(), to_json(&colors));
        } else {
            println!("{}", input.display());
            for c in &colors {
                println!("  {c}");
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&Value::Object(report))?);
    }

    Ok(())
}
