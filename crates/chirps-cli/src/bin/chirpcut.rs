//! chirpcut - Cut the loudest window out of one recording
//!
//! Usage:
//!   chirpcut <input> <output>
//!   chirpcut --window-seconds 1.5 --spectrogram <input> <output>

use anyhow::{Context, Result};
use chirps_core::features::spectrogram;
use chirps_core::{extract_loudest_to_file, FileCodec};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chirpcut")]
#[command(about = "Extract the loudest fixed-length window of a recording", long_about = None)]
struct Args {
    /// Input audio file
    input: PathBuf,

    /// Output WAV file
    output: PathBuf,

    /// Window length in seconds
    #[arg(short, long, default_value_t = 2.0)]
    window_seconds: f64,

    /// Also compute the spectrogram of the extracted window
    #[arg(short, long)]
    spectrogram: bool,

    /// FFT size for --spectrogram
    #[arg(long, default_value_t = 1024)]
    fft_size: usize,

    /// Hop size for --spectrogram
    #[arg(long, default_value_t = 256)]
    hop: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    chirps_cli::init_logging(args.verbose);

    if !args.window_seconds.is_finite() || args.window_seconds <= 0.0 {
        anyhow::bail!("--window-seconds must be > 0, got {}", args.window_seconds);
    }

    log::info!("Extracting {}s from {}", args.window_seconds, args.input.display());
    let extraction = extract_loudest_to_file(&FileCodec, &args.input, &args.output, args.window_seconds)
        .with_context(|| format!("Failed to extract from {}", args.input.display()))?;

    let mut output = serde_json::json!({
        "input": args.input.display().to_string(),
        "output": args.output.display().to_string(),
        "sample_rate": extraction.clip.sample_rate,
        "start_index": extraction.window.start_index,
        "start_seconds": extraction.window.start_index as f64 / extraction.clip.sample_rate as f64,
        "length": extraction.window.length,
        "power": extraction.window.power,
    });

    if args.spectrogram {
        let spec = spectrogram(&extraction.clip.samples, args.fft_size, args.hop);
        let (frames, bins) = spec.shape();
        output["spectrogram"] = serde_json::json!({ "frames": frames, "bins": bins });
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
