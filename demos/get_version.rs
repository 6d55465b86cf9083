use ffcmd::FFmpeg;

#[tokio::main]
async fn main() {
    let ffmpeg = match FFmpeg::new() {
        Ok(ffmpeg) => ffmpeg,
        Err(e) => {
            eprintln!("Error finding ffmpeg: {}", e);
            eprintln!("Please ensure ffmpeg is installed and in your system PATH.");
            return;
        }
    };

    match ffmpeg.version().await {
        Ok(version) => println!("{}", version),
        Err(e) => eprintln!("Error probing version: {}", e),
    }
}
