use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::runner::{ExitStatus, ProcessOptions, ProcessRunner, ProcessStream, SpawnedProcess};

/// Scripted behaviour that a [`MockRunner`] plays back for one command.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_delay: Duration,
    hold_streams_open: bool,
    spawn_error: Option<io::ErrorKind>,
    read_error: Option<io::ErrorKind>,
}

impl MockBehavior {
    pub fn success() -> Self {
        MockBehavior {
            exit_code: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_delay: Duration::ZERO,
            hold_streams_open: false,
            spawn_error: None,
            read_error: None,
        }
    }

    pub fn failure(exit_code: i32) -> Self {
        MockBehavior {
            exit_code,
            ..MockBehavior::success()
        }
    }

    /// The spawn itself fails — the process never starts.
    pub fn spawn_failure(kind: io::ErrorKind) -> Self {
        MockBehavior {
            spawn_error: Some(kind),
            ..MockBehavior::success()
        }
    }

    pub fn with_stdout<T: Into<Vec<u8>>>(mut self, stdout: T) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr<T: Into<Vec<u8>>>(mut self, stderr: T) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Delay between the streams draining and the process exiting. Long
    /// delays exercise the bounded exit wait and cancellation.
    pub fn with_exit_delay(mut self, delay: Duration) -> Self {
        self.exit_delay = delay;
        self
    }

    /// Keep the streams open after their canned content: reads then pend
    /// forever, like a process that is still running.
    pub fn holding_streams_open(mut self) -> Self {
        self.hold_streams_open = true;
        self
    }

    /// Fail stream reads with the given kind after the canned content.
    pub fn with_read_error(mut self, kind: io::ErrorKind) -> Self {
        self.read_error = Some(kind);
        self
    }
}

/// A [`ProcessRunner`] that plays scripted behaviours instead of spawning.
///
/// Behaviours are keyed on the argument vector after the program token;
/// [`fallback`](MockRunner::fallback) covers everything unscripted. Spawning
/// a command with no behaviour configured panics, which keeps tests honest
/// about what they run.
#[derive(Default)]
pub struct MockRunner {
    scripts: Mutex<HashMap<Vec<String>, MockBehavior>>,
    fallback: Mutex<Option<MockBehavior>>,
    spawn_count: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// A runner that answers every command with the same behaviour.
    pub fn returning(behavior: MockBehavior) -> Self {
        let runner = MockRunner::new();
        *runner.fallback.lock().expect("BUG: mock registry poisoned") = Some(behavior);
        runner
    }

    /// Scripts a behaviour for an exact argument list (excluding the program
    /// token).
    pub fn when<I, S>(self, args: I, behavior: MockBehavior) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key: Vec<String> = args.into_iter().map(Into::into).collect();
        self.scripts
            .lock()
            .expect("BUG: mock registry poisoned")
            .insert(key, behavior);
        self
    }

    pub fn fallback(self, behavior: MockBehavior) -> Self {
        *self.fallback.lock().expect("BUG: mock registry poisoned") = Some(behavior);
        self
    }

    /// How many times `spawn` was called, successful or not.
    pub fn spawn_count(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }
}

impl ProcessRunner for MockRunner {
    fn spawn(
        &self,
        argv: &[String],
        _options: &ProcessOptions,
    ) -> io::Result<Box<dyn SpawnedProcess>> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);

        let key: Vec<String> = argv.iter().skip(1).cloned().collect();
        let behavior = self
            .scripts
            .lock()
            .expect("BUG: mock registry poisoned")
            .get(&key)
            .cloned()
            .or_else(|| {
                self.fallback
                    .lock()
                    .expect("BUG: mock registry poisoned")
                    .clone()
            })
            .unwrap_or_else(|| {
                panic!("No mock behaviour configured for command: {argv:?}")
            });

        if let Some(kind) = behavior.spawn_error {
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }

        Ok(Box::new(MockProcess {
            stdout: Some(Box::new(ScriptedStream::new(
                behavior.stdout,
                behavior.hold_streams_open,
                behavior.read_error,
            ))),
            stderr: Some(Box::new(ScriptedStream::new(
                behavior.stderr,
                behavior.hold_streams_open,
                behavior.read_error,
            ))),
            exit_code: behavior.exit_code,
            exit_delay: behavior.exit_delay,
            killed: false,
        }))
    }
}

struct MockProcess {
    stdout: Option<ProcessStream>,
    stderr: Option<ProcessStream>,
    exit_code: i32,
    exit_delay: Duration,
    killed: bool,
}

#[async_trait]
impl SpawnedProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        // No real pid; control signals have nowhere to go.
        None
    }

    fn take_stdout(&mut self) -> Option<ProcessStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<ProcessStream> {
        self.stderr.take()
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        if self.killed {
            return Ok(ExitStatus::signalled());
        }
        if !self.exit_delay.is_zero() {
            tokio::time::sleep(self.exit_delay).await;
        }
        Ok(ExitStatus::from_code(self.exit_code))
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.killed = true;
        Ok(())
    }
}

/// Serves canned bytes, then either end-of-stream, an error, or pends
/// forever like a still-running process.
struct ScriptedStream {
    data: Vec<u8>,
    position: usize,
    hold_open: bool,
    read_error: Option<io::ErrorKind>,
}

impl ScriptedStream {
    fn new(data: Vec<u8>, hold_open: bool, read_error: Option<io::ErrorKind>) -> Self {
        ScriptedStream {
            data,
            position: 0,
            hold_open,
            read_error,
        }
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.position < this.data.len() {
            let available = &this.data[this.position..];
            let take = available.len().min(buf.remaining());
            buf.put_slice(&available[..take]);
            this.position += take;
            return Poll::Ready(Ok(()));
        }

        if let Some(kind) = this.read_error {
            return Poll::Ready(Err(io::Error::new(kind, "scripted read failure")));
        }

        if this.hold_open {
            // Nothing more will ever arrive; the relay's cancellation branch
            // is what wakes the task.
            return Poll::Pending;
        }

        Poll::Ready(Ok(()))
    }
}
