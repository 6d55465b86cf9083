use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ffcmd::{CommandBuilder, FFmpeg, NullSink, ProbeResult, ProcessOptions, StreamSpec};

/// Two-pass encode to a target file size. The duration is read from an
/// ffprobe JSON report so the bitrate can be derived.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input video file
    #[arg(short, long)]
    input: PathBuf,

    /// Output video file
    #[arg(short, long)]
    output: PathBuf,

    /// Target output size in bytes
    #[arg(short, long)]
    target_size: i64,

    /// ffprobe JSON report for the input (ffprobe -print_format json -show_format)
    #[arg(short, long)]
    probe_json: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let probe: ProbeResult = serde_json::from_str(&std::fs::read_to_string(&args.probe_json)?)?;
    let ffmpeg = FFmpeg::new()?;

    let command = CommandBuilder::new()
        .add_probed_input(probe)
        .pass_prefix("ffcmd")
        .add_output(
            StreamSpec::file(args.output.display().to_string())
                .format("mp4")
                .target_size(args.target_size),
        );

    for pass in 1..=2 {
        println!("Running pass {pass}...");
        let argv = command.clone().pass(pass).build()?;
        ffmpeg
            .run(
                argv,
                ProcessOptions::default(),
                Arc::new(NullSink),
                Arc::new(NullSink),
            )
            .await?;
    }

    println!("Wrote {}", args.output.display());
    Ok(())
}
