use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::OnceCell;

mod args;
mod builder;
mod classify;
mod error;
mod exec;
mod probe;
mod runner;
mod sizer;
mod stream;
pub mod testing;
mod timecode;

pub use args::ArgList;
pub use builder::{CommandBuilder, Verbosity};
pub use error::Error;
pub use exec::{BufferSink, ExecutionHandle, ExecutionState, NullSink, StreamSink};
pub use probe::{ProbeFormat, ProbeResult};
pub use runner::{
    ExitStatus, ProcessOptions, ProcessRunner, ProcessStream, Redirect, SpawnedProcess,
    SystemRunner,
};
pub use stream::{Strict, StreamSpec};
pub use timecode::{from_timecode, parse_bitrate, to_timecode};

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "ffmpeg";

/// Searches the given PATH string for the ffmpeg executable.
fn find_executable_in_path(path_env: &std::ffi::OsStr) -> Result<PathBuf, Error> {
    let paths = env::split_paths(path_env).collect::<Vec<_>>();
    for path in &paths {
        let executable_path = path.join(EXECUTABLE_NAME);
        if executable_path.is_file() {
            return Ok(executable_path);
        }
    }

    Err(Error::ExecutableNotFound {
        searched_paths: paths,
    })
}

/// Represents the ffmpeg executable.
///
/// Construction never spawns anything; the binary is first touched when a
/// command is run or [`version`](FFmpeg::version) is asked for. The process
/// runner is swappable, which is how the execution engine is tested without
/// a real binary.
pub struct FFmpeg {
    executable_path: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    version: OnceCell<String>,
}

impl FFmpeg {
    /// Discovers the ffmpeg executable in the system PATH.
    pub fn new() -> Result<Self, Error> {
        let path_var = env::var_os("PATH").unwrap_or_default();
        let executable_path = find_executable_in_path(&path_var)?;
        Ok(Self::with_path(executable_path))
    }

    /// Creates an instance for a specific executable path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self::with_runner(path, Arc::new(SystemRunner::new()))
    }

    /// Creates an instance with a custom [`ProcessRunner`].
    pub fn with_runner(path: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        FFmpeg {
            executable_path: path.into(),
            runner,
            version: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.executable_path
    }

    /// Starts building a command for this binary.
    pub fn command(&self) -> CommandBuilder {
        CommandBuilder::new()
    }

    /// Runs the binary with the supplied args without blocking the caller,
    /// relaying its stdout and stderr into the given sinks. A spawn failure
    /// comes back as an already-failed handle. Must be called from within a
    /// tokio runtime.
    pub fn run_async(
        &self,
        args: Vec<String>,
        options: ProcessOptions,
        stdout_sink: Arc<dyn StreamSink>,
        stderr_sink: Arc<dyn StreamSink>,
    ) -> ExecutionHandle {
        exec::spawn_monitored(
            self.runner.as_ref(),
            self.full_argv(args),
            options,
            stdout_sink,
            stderr_sink,
        )
    }

    /// Runs the binary with the supplied args and waits for the terminal
    /// result, propagating each failure kind unwrapped.
    pub async fn run(
        &self,
        args: Vec<String>,
        options: ProcessOptions,
        stdout_sink: Arc<dyn StreamSink>,
        stderr_sink: Arc<dyn StreamSink>,
    ) -> Result<(), Error> {
        self.run_async(args, options, stdout_sink, stderr_sink)
            .wait()
            .await
    }

    /// Returns the version line of the binary, e.g.
    /// `"ffmpeg version 7.1 Copyright (c) 2000-2024 the FFmpeg developers"`.
    ///
    /// The probe runs at most once for the lifetime of this instance — the
    /// result is memoized, and concurrent callers observe a single spawn.
    pub async fn version(&self) -> Result<String, Error> {
        self.version
            .get_or_try_init(|| self.probe_version())
            .await
            .cloned()
    }

    async fn probe_version(&self) -> Result<String, Error> {
        let options = ProcessOptions::default();
        let argv = self.full_argv(vec!["-version".to_string()]);
        let mut child = self
            .runner
            .spawn(&argv, &options)
            .map_err(|source| Error::spawn(self.program(), source))?;

        let result = self.read_version_line(child.as_mut(), &options).await;
        // The process is released on every path out of here.
        let _ = child.kill().await;
        result
    }

    async fn read_version_line(
        &self,
        child: &mut dyn SpawnedProcess,
        options: &ProcessOptions,
    ) -> Result<String, Error> {
        let stdout = child.take_stdout().ok_or_else(|| {
            Error::relay(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stdout was not captured",
            ))
        })?;

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(Error::relay)?;

        // Throw away the rest of the output so the process can exit, but
        // never hang on a stream that keeps flowing.
        let _ = tokio::time::timeout(
            exec::EXIT_TIMEOUT,
            tokio::io::copy(&mut reader, &mut tokio::io::sink()),
        )
        .await;

        let status = tokio::time::timeout(exec::EXIT_TIMEOUT, child.wait())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|source| Error::control("wait for", source))?;

        if !status.success() {
            return Err(classify::classify_exit(
                &self.program(),
                options,
                status.code(),
            ));
        }

        let version = line.trim().to_string();
        if version.is_empty() {
            return Err(Error::InvalidExecutable {
                path: self.executable_path.clone(),
                reason: "version probe returned empty output".to_string(),
            });
        }
        Ok(version)
    }

    fn program(&self) -> String {
        self.executable_path.display().to_string()
    }

    fn full_argv(&self, args: Vec<String>) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.program());
        argv.extend(args);
        argv
    }
}
