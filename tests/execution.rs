use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use ffcmd::testing::{MockBehavior, MockRunner};
use ffcmd::{
    BufferSink, Error, ExecutionState, FFmpeg, NullSink, ProcessOptions, StreamSink,
};

fn ffmpeg_with(runner: MockRunner) -> FFmpeg {
    FFmpeg::with_runner("ffmpeg", Arc::new(runner))
}

fn null() -> Arc<dyn StreamSink> {
    Arc::new(NullSink)
}

#[tokio::test]
async fn successful_run_relays_stdout_to_the_sink() {
    let runner = MockRunner::returning(
        MockBehavior::success().with_stdout(b"frame=1\nframe=2\n".to_vec()),
    );
    let ffmpeg = ffmpeg_with(runner);
    let sink = Arc::new(BufferSink::new());

    ffmpeg
        .run(
            vec!["-i".into(), "input.mp4".into(), "output.mp4".into()],
            ProcessOptions::default(),
            sink.clone(),
            null(),
        )
        .await
        .unwrap();

    assert_eq!(sink.contents(), "frame=1\nframe=2\n");
}

#[tokio::test]
async fn merged_stderr_arrives_in_the_stdout_sink() {
    let runner = MockRunner::returning(
        MockBehavior::success()
            .with_stdout(b"out".to_vec())
            .with_stderr(b"err".to_vec()),
    );
    let ffmpeg = ffmpeg_with(runner);
    let sink = Arc::new(BufferSink::new());
    let stderr_sink = Arc::new(BufferSink::new());

    ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::default(),
            sink.clone(),
            stderr_sink.clone(),
        )
        .await
        .unwrap();

    // Relay completion between the two streams is unordered; merged output
    // just has to land commingled in the stdout sink.
    let merged = sink.contents();
    assert!(merged.contains("out"), "stdout missing from {merged:?}");
    assert!(merged.contains("err"), "stderr missing from {merged:?}");
    assert_eq!(stderr_sink.contents(), "");
}

#[tokio::test]
async fn split_streams_relay_into_their_own_sinks() {
    let runner = MockRunner::returning(
        MockBehavior::success()
            .with_stdout(b"progress".to_vec())
            .with_stderr("Stream müxing überdone\n".as_bytes().to_vec()),
    );
    let ffmpeg = ffmpeg_with(runner);
    let out_sink = Arc::new(BufferSink::new());
    let err_sink = Arc::new(BufferSink::new());

    ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::split_streams(),
            out_sink.clone(),
            err_sink.clone(),
        )
        .await
        .unwrap();

    assert_eq!(out_sink.contents(), "progress");
    assert_eq!(err_sink.contents(), "Stream müxing überdone\n");
}

#[tokio::test]
async fn non_zero_exit_is_classified() {
    let runner = MockRunner::returning(MockBehavior::failure(1));
    let ffmpeg = ffmpeg_with(runner);

    let err = ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::default(),
            null(),
            null(),
        )
        .await
        .unwrap_err();

    match err {
        Error::NonZeroExit { message, exit_code } => {
            assert_eq!(message, "ffmpeg returned non-zero exit status. Check stdout.");
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[tokio::test]
async fn stderr_file_content_is_appended_to_the_failure() {
    let mut stderr_file = tempfile::NamedTempFile::new().unwrap();
    write!(stderr_file, "boom").unwrap();

    let runner = MockRunner::returning(MockBehavior::failure(1));
    let ffmpeg = ffmpeg_with(runner);

    let err = ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::stderr_to_file(stderr_file.path()),
            null(),
            null(),
        )
        .await
        .unwrap_err();

    match err {
        Error::NonZeroExit { message, .. } => {
            assert_eq!(
                message,
                "ffmpeg returned non-zero exit status. Check stdout.\nboom"
            );
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[tokio::test]
async fn unreadable_stderr_file_degrades_to_the_generic_message() {
    let runner = MockRunner::returning(MockBehavior::failure(1));
    let ffmpeg = ffmpeg_with(runner);

    let err = ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::stderr_to_file("/nonexistent/stderr.log"),
            null(),
            null(),
        )
        .await
        .unwrap_err();

    match err {
        Error::NonZeroExit { message, .. } => {
            assert_eq!(message, "ffmpeg returned non-zero exit status. Check stdout.");
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[tokio::test]
async fn spawn_failure_yields_an_already_failed_handle() {
    let runner = MockRunner::returning(MockBehavior::spawn_failure(std::io::ErrorKind::NotFound));
    let ffmpeg = ffmpeg_with(runner);

    let handle = ffmpeg.run_async(
        vec!["output.mp4".into()],
        ProcessOptions::default(),
        null(),
        null(),
    );

    assert_eq!(handle.state(), ExecutionState::Failed);
    assert!(matches!(handle.wait().await, Err(Error::Spawn { .. })));
}

#[tokio::test(start_paused = true)]
async fn lingering_process_times_out_after_the_streams_drain() {
    let runner = MockRunner::returning(
        MockBehavior::success().with_exit_delay(Duration::from_secs(600)),
    );
    let ffmpeg = ffmpeg_with(runner);

    let err = ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::default(),
            null(),
            null(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn relay_errors_surface_as_the_terminal_failure() {
    let runner = MockRunner::returning(
        MockBehavior::success()
            .with_stdout(b"partial".to_vec())
            .with_read_error(std::io::ErrorKind::ConnectionReset),
    );
    let ffmpeg = ffmpeg_with(runner);
    let sink = Arc::new(BufferSink::new());

    let err = ffmpeg
        .run(
            vec!["output.mp4".into()],
            ProcessOptions::default(),
            sink.clone(),
            null(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Relay { .. }));
    // Output relayed before the failure is not discarded.
    assert_eq!(sink.contents(), "partial");
}

#[tokio::test(start_paused = true)]
async fn cancel_destroys_the_process_and_is_terminal() {
    let runner = MockRunner::returning(
        MockBehavior::success()
            .holding_streams_open()
            .with_exit_delay(Duration::from_secs(600)),
    );
    let ffmpeg = ffmpeg_with(runner);

    let handle = ffmpeg.run_async(
        vec!["output.mp4".into()],
        ProcessOptions::default(),
        null(),
        null(),
    );
    assert_eq!(handle.state(), ExecutionState::Running);

    handle.cancel().await;
    assert_eq!(handle.state(), ExecutionState::Cancelled);
    assert!(matches!(handle.wait().await, Err(Error::Cancelled)));

    // Cancellation is final: no later success or failure resolution may
    // replace it, and repeated waits observe the same state.
    tokio::time::sleep(Duration::from_secs(700)).await;
    assert_eq!(handle.state(), ExecutionState::Cancelled);
    assert!(matches!(handle.wait().await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn cancel_after_completion_keeps_the_success() {
    let runner = MockRunner::returning(MockBehavior::success());
    let ffmpeg = ffmpeg_with(runner);

    let handle = ffmpeg.run_async(
        vec!["output.mp4".into()],
        ProcessOptions::default(),
        null(),
        null(),
    );
    handle.wait().await.unwrap();

    handle.cancel().await;
    assert_eq!(handle.state(), ExecutionState::Finished);
    assert!(handle.wait().await.is_ok());
}

#[tokio::test]
async fn concurrent_runs_do_not_interleave_their_sinks() {
    let first = ffmpeg_with(MockRunner::returning(
        MockBehavior::success().with_stdout(b"aaaaaaaaaaaaaaaa".to_vec()),
    ));
    let second = ffmpeg_with(MockRunner::returning(
        MockBehavior::success().with_stdout(b"bbbbbbbbbbbbbbbb".to_vec()),
    ));

    let first_sink = Arc::new(BufferSink::new());
    let second_sink = Arc::new(BufferSink::new());

    let (a, b) = futures::future::join(
        first.run(
            vec!["one.mp4".into()],
            ProcessOptions::default(),
            first_sink.clone(),
            null(),
        ),
        second.run(
            vec!["two.mp4".into()],
            ProcessOptions::default(),
            second_sink.clone(),
            null(),
        ),
    )
    .await;

    a.unwrap();
    b.unwrap();
    assert_eq!(first_sink.contents(), "aaaaaaaaaaaaaaaa");
    assert_eq!(second_sink.contents(), "bbbbbbbbbbbbbbbb");
}

#[tokio::test]
async fn version_is_probed_once_and_memoized() {
    let runner = Arc::new(MockRunner::new().when(
        ["-version"],
        MockBehavior::success().with_stdout(
            b"ffmpeg version 7.1 Copyright (c) 2000-2024 the FFmpeg developers\nbuilt with gcc 14.2\n"
                .to_vec(),
        ),
    ));
    let ffmpeg = FFmpeg::with_runner("ffmpeg", runner.clone());

    let (first, second) = futures::future::join(ffmpeg.version(), ffmpeg.version()).await;
    assert_eq!(
        first.unwrap(),
        "ffmpeg version 7.1 Copyright (c) 2000-2024 the FFmpeg developers"
    );
    assert_eq!(
        second.unwrap(),
        "ffmpeg version 7.1 Copyright (c) 2000-2024 the FFmpeg developers"
    );

    // Cached for the lifetime of the instance: still exactly one spawn.
    ffmpeg.version().await.unwrap();
    assert_eq!(runner.spawn_count(), 1);
}

#[tokio::test]
async fn version_of_a_broken_binary_is_classified() {
    let runner = MockRunner::new().when(["-version"], MockBehavior::failure(127));
    let ffmpeg = ffmpeg_with(runner);

    assert!(matches!(
        ffmpeg.version().await,
        Err(Error::NonZeroExit { .. })
    ));
}

/// Needs a real ffmpeg on the PATH; run with `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn real_binary_reports_a_version() {
    let ffmpeg = FFmpeg::new().expect("ffmpeg not found in PATH");
    let version = ffmpeg.version().await.unwrap();
    assert!(version.starts_with("ffmpeg version"), "got {version:?}");
}

/// Needs a real ffmpeg on the PATH; run with `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn real_binary_synthesizes_a_clip() {
    let ffmpeg = FFmpeg::new().expect("ffmpeg not found in PATH");
    let output = std::env::temp_dir().join("ffcmd_test_clip.mp4");
    let _ = std::fs::remove_file(&output);

    let args = ffcmd::CommandBuilder::new()
        .add_input(
            ffcmd::StreamSpec::file("testsrc=duration=1:size=320x240:rate=10").format("lavfi"),
        )
        .add_output(ffcmd::StreamSpec::file(output.display().to_string()).no_audio())
        .build()
        .unwrap();

    ffmpeg
        .run(args, ProcessOptions::default(), null(), null())
        .await
        .unwrap();
    assert!(output.exists());

    let _ = std::fs::remove_file(&output);
}
