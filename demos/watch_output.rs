use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ffcmd::{CommandBuilder, ExecutionState, FFmpeg, NullSink, ProcessOptions, StreamSpec};

/// Starts an encode through the async handle, relays ffmpeg's stderr, and
/// cancels the run if it outlives the deadline.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input video file
    #[arg(short, long)]
    input: PathBuf,

    /// Output video file
    #[arg(short, long)]
    output: PathBuf,

    /// Cancel the encode after this many seconds
    #[arg(long, default_value_t = 60)]
    deadline: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let ffmpeg = FFmpeg::new()?;

    let argv = CommandBuilder::new()
        .add_input(StreamSpec::file(args.input.display().to_string()))
        .add_output(StreamSpec::file(args.output.display().to_string()).video_codec("libx265"))
        .build()?;

    let stderr_sink = Arc::new(|text: &str| eprint!("{text}"));
    let handle = ffmpeg.run_async(
        argv,
        ProcessOptions::split_streams(),
        Arc::new(NullSink),
        stderr_sink,
    );

    tokio::select! {
        result = handle.wait() => {
            match result {
                Ok(()) => println!("Encode finished."),
                Err(e) => eprintln!("Encode failed: {}", e),
            }
        }
        _ = tokio::time::sleep(Duration::from_secs(args.deadline)) => {
            eprintln!("Deadline reached, cancelling.");
            handle.cancel().await;
            assert_eq!(handle.state(), ExecutionState::Cancelled);
        }
    }

    Ok(())
}
