use anyhow::Context;
use clap::Parser;
use oscvideo::Settings;
use std::path::PathBuf;

/// OSC-controlled multi-camera video capture and recording
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to a JSON settings file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the recording output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    oscvideo::init_tracing();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(output_dir) = args.output_dir {
        settings.recording.output_dir = output_dir;
    }

    oscvideo::run(settings).await?;
    Ok(())
}
