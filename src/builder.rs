use std::collections::BTreeMap;

use crate::args::ArgList;
use crate::error::Error;
use crate::probe::ProbeResult;
use crate::sizer::plan_bitrates;
use crate::stream::{LowerContext, StreamKind, StreamSpec};

/// The `-v` log level. ffmpeg wants these lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    Panic,
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Panic => "panic",
            Verbosity::Fatal => "fatal",
            Verbosity::Error => "error",
            Verbosity::Warning => "warning",
            Verbosity::Info => "info",
            Verbosity::Verbose => "verbose",
            Verbosity::Debug => "debug",
        }
    }
}

/// Builds an ffmpeg command line out of stream specs and global settings.
///
/// A builder owns its input and output [`StreamSpec`]s as plain values; a
/// finished spec is handed over with [`add_input`](Self::add_input) /
/// [`add_output`](Self::add_output) and control simply returns to the
/// caller. [`build`](Self::build) never mutates the specs, so the same
/// builder can be built repeatedly — pass 1 and pass 2 of a two-pass encode
/// are two `build()` calls with a different [`pass`](Self::pass) in between.
///
/// ```
/// use ffcmd::{CommandBuilder, StreamSpec};
///
/// let args = CommandBuilder::new()
///     .add_input(StreamSpec::file("input.mp4"))
///     .add_output(StreamSpec::file("output.mp4"))
///     .build()
///     .unwrap();
/// assert_eq!(args, ["-y", "-v", "error", "-i", "input.mp4", "output.mp4"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    overwrite: Option<bool>,
    verbosity: Verbosity,
    user_agent: Option<String>,
    progress: Option<String>,

    pass: u32,
    pass_directory: String,
    pass_prefix: Option<String>,

    inputs: Vec<StreamSpec>,
    input_probes: BTreeMap<String, ProbeResult>,
    extra_args: Vec<String>,
    outputs: Vec<StreamSpec>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder::default()
    }

    /// Whether existing output files are overwritten (`-y`) or refused
    /// (`-n`). Defaults to overwriting.
    pub fn overwrite_output_files(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// URI of a progress sink (`-progress`), e.g. `tcp://127.0.0.1:9050`.
    /// Passed through opaquely; listening on it is the caller's business.
    pub fn progress(mut self, uri: impl Into<String>) -> Self {
        self.progress = Some(uri.into());
        self
    }

    /// The encoding pass: 0 for single-pass, 1..n for multi-pass. Pushed
    /// down into every output at build time; pass 1 writes to the null
    /// device and drops audio.
    pub fn pass(mut self, pass: u32) -> Self {
        self.pass = pass;
        self
    }

    /// Directory the pass log file lives in. Combined with the prefix as
    /// `<directory><prefix>`, so include a trailing separator.
    pub fn pass_directory(mut self, directory: impl Into<String>) -> Self {
        self.pass_directory = directory.into();
        self
    }

    /// Prefix for the `-passlogfile` shared between the passes.
    pub fn pass_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pass_prefix = Some(prefix.into());
        self
    }

    pub fn add_input(mut self, input: StreamSpec) -> Self {
        self.inputs.push(input);
        self
    }

    /// Registers an input together with its probe result. The probe's
    /// duration is what target-size outputs derive their bitrates from.
    pub fn add_probed_input(mut self, probe: ProbeResult) -> Self {
        let spec = StreamSpec::file(probe.format.filename.clone());
        self.input_probes.insert(probe.format.filename.clone(), probe);
        self.inputs.push(spec);
        self
    }

    /// Drops any previously added inputs (and their probes) and adds this
    /// one.
    pub fn set_input(mut self, input: StreamSpec) -> Self {
        self.inputs.clear();
        self.input_probes.clear();
        self.add_input(input)
    }

    /// Global arguments emitted before all inputs, for flags the builder
    /// does not model.
    pub fn add_extra_args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.extra_args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn add_output(mut self, output: StreamSpec) -> Self {
        self.outputs.push(output);
        self
    }

    /// Adds an output that writes the muxed stream to stdout.
    pub fn add_stdout_output(self) -> Self {
        self.add_output(StreamSpec::file("-"))
    }

    /// Lowers the whole command into its final argument vector: global
    /// flags, then every input block, then every output block, in addition
    /// order.
    pub fn build(&self) -> Result<Vec<String>, Error> {
        if self.inputs.is_empty() {
            return Err(Error::Argument("At least one input must be specified".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(Error::Argument("At least one output must be specified".to_string()));
        }

        let mut args = ArgList::new();
        self.build_global_options(&mut args);

        for input in &self.inputs {
            let ctx = LowerContext {
                kind: StreamKind::Input,
                pass: self.pass,
                pass_log_file: None,
                input_count: self.inputs.len(),
                video_bit_rate: input.explicit_video_bit_rate(),
                audio_bit_rate: input.explicit_audio_bit_rate(),
            };
            args.add_all(input.lower(&ctx)?);
        }

        let pass_log_file = self
            .pass_prefix
            .as_ref()
            .map(|prefix| format!("{}{}", self.pass_directory, prefix));

        for output in &self.outputs {
            self.check_two_pass_preconditions(output)?;

            // Target-size bitrates are derived lazily, right before the
            // output is lowered, so the emitted flags carry the final
            // values.
            let probe = self
                .inputs
                .first()
                .and_then(|input| input.filename_ref())
                .and_then(|filename| self.input_probes.get(filename));
            let plan = plan_bitrates(output, probe, self.inputs.len())?;

            let ctx = LowerContext {
                kind: StreamKind::Output,
                pass: self.pass,
                pass_log_file: pass_log_file.clone(),
                input_count: self.inputs.len(),
                video_bit_rate: plan.video,
                audio_bit_rate: plan.audio,
            };
            args.add_all(output.lower(&ctx)?);
        }

        Ok(args.into_tokens())
    }

    fn build_global_options(&self, args: &mut ArgList) {
        args.add(if self.overwrite.unwrap_or(true) { "-y" } else { "-n" });
        args.add_pair("-v", self.verbosity.as_str());

        args.add_arg_if(
            self.user_agent.is_some(),
            "-user_agent",
            self.user_agent.clone().unwrap_or_default(),
        );
        args.add_arg_with(self.progress.is_some(), "-progress", || {
            self.progress.clone().unwrap_or_default()
        });

        args.add_all(self.extra_args.iter().cloned());
    }

    fn check_two_pass_preconditions(&self, output: &StreamSpec) -> Result<(), Error> {
        if self.pass == 0 {
            return Ok(());
        }
        if !output.has_format() {
            return Err(Error::Argument(
                "Format must be specified when using two-pass".to_string(),
            ));
        }
        if output.target_size_bytes() == 0 && output.explicit_video_bit_rate().is_none() {
            return Err(Error::Argument(
                "Target size, or video bitrate must be specified when using two-pass".to_string(),
            ));
        }
        Ok(())
    }
}
