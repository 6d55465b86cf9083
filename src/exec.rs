use std::io;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::classify_exit;
use crate::error::Error;
use crate::runner::{ProcessOptions, ProcessRunner, ProcessStream, SpawnedProcess};

/// How long to wait for the process to be reaped once both of its streams
/// have reached end-of-file.
pub(crate) const EXIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives relayed text from one of a child's standard streams.
///
/// The engine calls [`append`](StreamSink::append) from the relay task that
/// owns the stream and never closes the sink; its lifetime belongs to the
/// caller. Each relay appends only from its own task, so a sink is called
/// concurrently only if the caller hands the same sink to both streams (or
/// asks for stderr to be merged into stdout) — `Send + Sync` makes that safe
/// to do.
pub trait StreamSink: Send + Sync {
    fn append(&self, text: &str);
}

/// Discards everything appended to it.
#[derive(Debug, Default)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn append(&self, _text: &str) {}
}

/// Accumulates relayed text in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    buffer: StdMutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        BufferSink::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().expect("BUG: buffer sink poisoned").clone()
    }
}

impl StreamSink for BufferSink {
    fn append(&self, text: &str) {
        self.buffer
            .lock()
            .expect("BUG: buffer sink poisoned")
            .push_str(text);
    }
}

impl<F> StreamSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn append(&self, text: &str) {
        self(text)
    }
}

/// Where an execution is in its lifecycle. `Finished`, `Failed` and
/// `Cancelled` are terminal and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Waiting,
    Running,
    Finished,
    Failed,
    Cancelled,
}

enum ExecState {
    Waiting,
    Running,
    Finished,
    Failed(Error),
    Cancelled,
}

impl ExecState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecState::Finished | ExecState::Failed(_) | ExecState::Cancelled
        )
    }
}

struct Shared {
    /// The program token of the argv, used to describe failures.
    program: String,
    options: ProcessOptions,
    state: StdMutex<ExecState>,
    done: Notify,
    cancel: CancellationToken,
    /// The one owner of the OS process. Taken exactly once, by whichever of
    /// the supervisor or `cancel()` tears the process down.
    child: Mutex<Option<Box<dyn SpawnedProcess>>>,
}

impl Shared {
    /// Installs a terminal state unless one is already set. Cancellation is
    /// terminal the instant it is requested, so a late supervisor result can
    /// never overwrite it.
    fn resolve(&self, terminal: ExecState) {
        {
            let mut state = self.state.lock().expect("BUG: execution state poisoned");
            if !state.is_terminal() {
                *state = terminal;
            }
        }
        self.done.notify_waiters();
    }
}

/// A handle on one spawned process.
///
/// The handle is the exclusive owner of the OS process for the process's
/// lifetime. It resolves to exactly one terminal state: `Finished`, `Failed`
/// (with the classified error), or `Cancelled`.
pub struct ExecutionHandle {
    shared: Arc<Shared>,
}

impl ExecutionHandle {
    /// Waits for the terminal state. Can be called repeatedly; every call
    /// observes the same resolution.
    pub async fn wait(&self) -> Result<(), Error> {
        loop {
            let notified = self.shared.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.result_now() {
                Some(result) => return result,
                None => notified.await,
            }
        }
    }

    fn result_now(&self) -> Option<Result<(), Error>> {
        let state = self.shared.state.lock().expect("BUG: execution state poisoned");
        match &*state {
            ExecState::Finished => Some(Ok(())),
            ExecState::Failed(error) => Some(Err(error.clone())),
            ExecState::Cancelled => Some(Err(Error::Cancelled)),
            ExecState::Waiting | ExecState::Running => None,
        }
    }

    pub fn state(&self) -> ExecutionState {
        let state = self.shared.state.lock().expect("BUG: execution state poisoned");
        match &*state {
            ExecState::Waiting => ExecutionState::Waiting,
            ExecState::Running => ExecutionState::Running,
            ExecState::Finished => ExecutionState::Finished,
            ExecState::Failed(_) => ExecutionState::Failed,
            ExecState::Cancelled => ExecutionState::Cancelled,
        }
    }

    /// Cancels the execution: destroys the OS process and winds down the
    /// relay tasks. Cancellation is terminal — the handle reports
    /// `Cancelled` from then on and never resolves to a success or failure
    /// afterwards. Once a natural terminal state has been reached this is a
    /// no-op.
    pub async fn cancel(&self) {
        {
            let mut state = self.shared.state.lock().expect("BUG: execution state poisoned");
            if state.is_terminal() {
                return;
            }
            *state = ExecState::Cancelled;
        }

        self.shared.cancel.cancel();
        if let Some(mut child) = self.shared.child.lock().await.take() {
            let _ = child.kill().await;
        }
        self.shared.done.notify_waiters();
    }

    /// Asks the process to stop cleanly, without cancelling the handle: on
    /// unix a `SIGINT` (ffmpeg finalizes its output and exits), on windows a
    /// `CTRL_C_EVENT`. The execution still resolves through the normal exit
    /// path.
    pub async fn interrupt(&self) -> Result<(), Error> {
        let child = self.shared.child.lock().await;
        let pid = child.as_ref().and_then(|c| c.id()).ok_or_else(|| {
            Error::control(
                "interrupt",
                io::Error::new(io::ErrorKind::NotFound, "Process already exited"),
            )
        })?;

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;
            signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|errno| {
                Error::control(
                    "interrupt",
                    io::Error::new(io::ErrorKind::Unsupported, format!("Failed with errno: {errno}")),
                )
            })
        }

        #[cfg(windows)]
        {
            const CTRL_C_EVENT: u32 = 0;
            let result = unsafe {
                windows_sys::Win32::System::Console::GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid)
            };
            if result == 0 {
                Err(Error::control("interrupt", io::Error::last_os_error()))
            } else {
                Ok(())
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = pid;
            Err(Error::control(
                "interrupt",
                io::Error::new(
                    io::ErrorKind::Unsupported,
                    "Interrupt is not supported on this platform",
                ),
            ))
        }
    }
}

/// Spawns `argv` through the runner and supervises it to a single terminal
/// state, relaying stdout and stderr into the given sinks.
///
/// A spawn failure produces an already-failed handle; no relay tasks are
/// started for it. Must be called from within a tokio runtime.
pub(crate) fn spawn_monitored(
    runner: &dyn ProcessRunner,
    argv: Vec<String>,
    options: ProcessOptions,
    stdout_sink: Arc<dyn StreamSink>,
    stderr_sink: Arc<dyn StreamSink>,
) -> ExecutionHandle {
    let program = argv.first().cloned().unwrap_or_default();
    let shared = Arc::new(Shared {
        program: program.clone(),
        options: options.clone(),
        state: StdMutex::new(ExecState::Waiting),
        done: Notify::new(),
        cancel: CancellationToken::new(),
        child: Mutex::new(None),
    });
    let handle = ExecutionHandle {
        shared: Arc::clone(&shared),
    };

    let mut child = match runner.spawn(&argv, &options) {
        Ok(child) => child,
        Err(source) => {
            shared.resolve(ExecState::Failed(Error::spawn(program, source)));
            return handle;
        }
    };

    let stdout = child.take_stdout();
    let stderr = child.take_stderr();

    // Merged stderr relays into the stdout sink, so the two streams arrive
    // commingled just as an OS-level merge would deliver them.
    let err_sink = if options.merge_error_into_output {
        Arc::clone(&stdout_sink)
    } else {
        stderr_sink
    };

    {
        let mut state = shared.state.lock().expect("BUG: execution state poisoned");
        *state = ExecState::Running;
    }
    *shared
        .child
        .try_lock()
        .expect("BUG: fresh child mutex contended") = Some(child);

    tokio::spawn(supervise(Arc::clone(&shared), stdout, stderr, stdout_sink, err_sink));

    handle
}

async fn supervise(
    shared: Arc<Shared>,
    stdout: Option<ProcessStream>,
    stderr: Option<ProcessStream>,
    stdout_sink: Arc<dyn StreamSink>,
    stderr_sink: Arc<dyn StreamSink>,
) {
    // Both relays must reach end-of-stream before the exit code is looked
    // at. Their completion order relative to each other is unspecified.
    let (stdout_result, stderr_result) = futures::future::join(
        pump(stdout, stdout_sink, shared.cancel.clone()),
        pump(stderr, stderr_sink, shared.cancel.clone()),
    )
    .await;

    let wait_outcome = {
        let mut guard = shared.child.lock().await;
        let outcome = match guard.as_mut() {
            // cancel() already took and destroyed the process.
            None => None,
            Some(child) => Some(tokio::time::timeout(EXIT_TIMEOUT, child.wait()).await),
        };
        // Release the process exactly once, whatever the outcome.
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
        }
        outcome
    };

    let Some(wait_outcome) = wait_outcome else {
        // Already cancelled; nothing left to resolve.
        shared.done.notify_waiters();
        return;
    };

    let terminal = if let Some(source) = stdout_result.err().or(stderr_result.err()) {
        ExecState::Failed(Error::relay(source))
    } else {
        match wait_outcome {
            Err(_elapsed) => ExecState::Failed(Error::Timeout),
            Ok(Err(source)) => ExecState::Failed(Error::control("wait for", source)),
            Ok(Ok(status)) if status.success() => ExecState::Finished,
            Ok(Ok(status)) => {
                debug!(code = ?status.code(), "{} exited with failure", shared.program);
                ExecState::Failed(classify_exit(&shared.program, &shared.options, status.code()))
            }
        }
    };

    shared.resolve(terminal);
}

/// Relays one child stream into a sink as UTF-8 text until end-of-stream,
/// carrying multi-byte sequences split across read chunks. The sink is not
/// closed; a trailing incomplete sequence is flushed lossily.
async fn pump(
    stream: Option<ProcessStream>,
    sink: Arc<dyn StreamSink>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let Some(mut stream) = stream else {
        return Ok(());
    };

    let mut buf = vec![0u8; 8192];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read(&mut buf) => read?,
        };
        if read == 0 {
            break;
        }
        let text = decode_utf8_chunk(&mut carry, &buf[..read]);
        if !text.is_empty() {
            sink.append(&text);
        }
    }

    if !carry.is_empty() {
        sink.append(&String::from_utf8_lossy(&carry));
    }
    Ok(())
}

/// Decodes `carry + chunk` as UTF-8. Invalid sequences become replacement
/// characters; an incomplete trailing sequence is left in `carry` for the
/// next chunk.
fn decode_utf8_chunk(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);
    let bytes = std::mem::take(carry);

    let mut text = String::new();
    let mut rest: &[u8] = &bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                text.push_str(std::str::from_utf8(valid).expect("BUG: valid_up_to lied"));
                match err.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None => {
                        // Incomplete sequence at the end of the chunk.
                        rest = after;
                        break;
                    }
                }
            }
        }
    }

    *carry = rest.to_vec();
    text
}
