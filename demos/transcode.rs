use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ffcmd::{CommandBuilder, FFmpeg, NullSink, ProcessOptions, StreamSpec};

/// Transcodes a file to H.264/AAC, printing ffmpeg's own log lines.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input video file
    #[arg(short, long)]
    input: PathBuf,

    /// Output video file
    #[arg(short, long)]
    output: PathBuf,

    /// Constant rate factor (lower is better quality)
    #[arg(long, default_value_t = 23.0)]
    crf: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let ffmpeg = match FFmpeg::new() {
        Ok(ffmpeg) => ffmpeg,
        Err(e) => {
            eprintln!("Error finding ffmpeg: {}", e);
            return;
        }
    };

    let command = CommandBuilder::new()
        .add_input(StreamSpec::file(args.input.display().to_string()))
        .add_output(
            StreamSpec::file(args.output.display().to_string())
                .video_codec("libx264")
                .constant_rate_factor(args.crf)
                .audio_codec("aac"),
        );

    let argv = match command.build() {
        Ok(argv) => argv,
        Err(e) => {
            eprintln!("Invalid command: {}", e);
            return;
        }
    };

    // ffmpeg chatters on stderr; stdout is quiet for file outputs.
    let stderr_sink = Arc::new(|text: &str| eprint!("{text}"));
    match ffmpeg
        .run(argv, ProcessOptions::split_streams(), Arc::new(NullSink), stderr_sink)
        .await
    {
        Ok(()) => println!("Transcode finished: {}", args.output.display()),
        Err(e) => eprintln!("Transcode failed: {}", e),
    }
}
