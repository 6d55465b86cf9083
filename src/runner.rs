use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::info;

/// Where a child's stdout or stderr should go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Redirect {
    /// Capture the stream through a pipe the engine relays.
    #[default]
    Pipe,
    /// Write the stream straight to a file. The classifier can recover
    /// diagnostic text from a redirected stderr after a failure.
    ToFile(PathBuf),
}

/// How a spawned process's standard streams are wired up.
///
/// Produced by the caller, consumed read-only by both the execution engine
/// and the exit classifier. When `merge_error_into_output` is set the stderr
/// relay appends into the stdout sink, so both streams arrive commingled and
/// `error_redirect` is ignored.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub merge_error_into_output: bool,
    pub output_redirect: Redirect,
    pub error_redirect: Redirect,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        ProcessOptions {
            merge_error_into_output: true,
            output_redirect: Redirect::Pipe,
            error_redirect: Redirect::Pipe,
        }
    }
}

impl ProcessOptions {
    /// Options that keep stderr separate from stdout.
    pub fn split_streams() -> Self {
        ProcessOptions {
            merge_error_into_output: false,
            ..ProcessOptions::default()
        }
    }

    /// Options that keep stderr separate and redirect it to a file, which
    /// makes its text recoverable after a non-zero exit.
    pub fn stderr_to_file(path: impl Into<PathBuf>) -> Self {
        ProcessOptions {
            merge_error_into_output: false,
            output_redirect: Redirect::Pipe,
            error_redirect: Redirect::ToFile(path.into()),
        }
    }
}

/// A readable handle on one of a child's standard streams.
pub type ProcessStream = Box<dyn AsyncRead + Send + Unpin>;

/// The exit state of a finished process. `code` is `None` when the process
/// was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: Option<i32>,
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        ExitStatus { code: Some(code) }
    }

    pub fn signalled() -> Self {
        ExitStatus { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub(crate) fn from_std(status: std::process::ExitStatus) -> Self {
        ExitStatus {
            code: status.code(),
        }
    }
}

/// A spawned process as the engine sees it. Stream handles can be taken
/// exactly once; `wait` reaps the process and `kill` terminates it.
#[async_trait]
pub trait SpawnedProcess: Send {
    fn id(&self) -> Option<u32>;
    fn take_stdout(&mut self) -> Option<ProcessStream>;
    fn take_stderr(&mut self) -> Option<ProcessStream>;
    async fn wait(&mut self) -> io::Result<ExitStatus>;
    async fn kill(&mut self) -> io::Result<()>;
}

/// Spawns a process for a full argument vector. The engine treats this as
/// fully substitutable, which is how it is tested without a real binary —
/// see [`MockRunner`](crate::testing::MockRunner).
pub trait ProcessRunner: Send + Sync {
    fn spawn(
        &self,
        argv: &[String],
        options: &ProcessOptions,
    ) -> io::Result<Box<dyn SpawnedProcess>>;
}

/// The real runner, backed by [`tokio::process`].
#[derive(Debug, Default)]
pub struct SystemRunner {
    working_directory: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        SystemRunner::default()
    }

    pub fn with_working_directory(path: impl Into<PathBuf>) -> Self {
        SystemRunner {
            working_directory: Some(path.into()),
        }
    }

    fn stdio_for(redirect: &Redirect) -> io::Result<Stdio> {
        match redirect {
            Redirect::Pipe => Ok(Stdio::piped()),
            Redirect::ToFile(path) => Ok(Stdio::from(std::fs::File::create(path)?)),
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn spawn(
        &self,
        argv: &[String],
        options: &ProcessOptions,
    ) -> io::Result<Box<dyn SpawnedProcess>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "No arguments specified"))?;

        info!("{}", argv.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Self::stdio_for(&options.output_redirect)?)
            .kill_on_drop(true);

        // When merging, stderr stays piped and the engine relays it into the
        // stdout sink.
        if options.merge_error_into_output {
            command.stderr(Stdio::piped());
        } else {
            command.stderr(Self::stdio_for(&options.error_redirect)?);
        }

        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = command.spawn()?;
        Ok(Box::new(SystemChild { child }))
    }
}

struct SystemChild {
    child: Child,
}

#[async_trait]
impl SpawnedProcess for SystemChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<ProcessStream> {
        self.child
            .stdout
            .take()
            .map(|stream| Box::new(stream) as ProcessStream)
    }

    fn take_stderr(&mut self) -> Option<ProcessStream> {
        self.child
            .stderr
            .take()
            .map(|stream| Box::new(stream) as ProcessStream)
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await.map(ExitStatus::from_std)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
