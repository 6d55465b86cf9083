use std::time::Duration;

use crate::args::ArgList;
use crate::error::Error;
use crate::timecode::to_timecode;

#[cfg(windows)]
pub(crate) const DEV_NULL: &str = "NUL";
#[cfg(not(windows))]
pub(crate) const DEV_NULL: &str = "/dev/null";

/// The `-strict` conformance level. ffmpeg wants these lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strict {
    Very,
    Strict,
    #[default]
    Normal,
    Unofficial,
    Experimental,
}

impl Strict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strict::Very => "very",
            Strict::Strict => "strict",
            Strict::Normal => "normal",
            Strict::Unofficial => "unofficial",
            Strict::Experimental => "experimental",
        }
    }
}

/// Whether a spec is being lowered as an input or an output block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Input,
    Output,
}

/// Per-build state pushed down from the [`CommandBuilder`](crate::CommandBuilder)
/// when a spec is lowered. Specs themselves are never mutated by a build, so
/// the same builder can produce pass 1 and pass 2 command lines in turn.
#[derive(Debug)]
pub(crate) struct LowerContext {
    pub kind: StreamKind,
    /// 0 for single-pass, 1..n for multi-pass.
    pub pass: u32,
    /// `<pass directory><pass prefix>`, when a prefix was configured.
    pub pass_log_file: Option<String>,
    /// Number of inputs owned by the whole command.
    pub input_count: usize,
    /// Final video bitrate to emit: the spec's own, or one derived from a
    /// target file size.
    pub video_bit_rate: Option<i64>,
    /// Final audio bitrate to emit.
    pub audio_bit_rate: Option<i64>,
}

/// One input or output of an ffmpeg invocation.
///
/// A `StreamSpec` is a plain value: setters chain and never fail, and every
/// contract (exactly one of filename/URI, no conflicting size or rate flags,
/// positive dimensions) is checked when the owning command is built. Audio,
/// video and subtitle streams are enabled until disabled, and setting any
/// field of a disabled block re-enables it.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    filename: Option<String>,
    uri: Option<String>,

    format: Option<String>,
    start_offset_ms: Option<i64>,
    duration_ms: Option<i64>,
    meta_tags: Vec<(String, String)>,
    strict: Strict,
    read_at_native_frame_rate: bool,
    preset: Option<String>,
    preset_file: Option<String>,

    constant_rate_factor: Option<f64>,
    complex_filter: Option<String>,

    video_enabled: bool,
    video_codec: Option<String>,
    video_frames: Option<i64>,
    video_pixel_format: Option<String>,
    video_copyinkf: bool,
    video_mov_flags: Option<String>,
    video_width: i32,
    video_height: i32,
    video_size: Option<String>,
    video_frame_rate: Option<String>,
    video_bit_rate: Option<i64>,
    video_quality: Option<f64>,
    video_preset: Option<String>,
    video_filter: Option<String>,
    video_bitstream_filter: Option<String>,

    audio_enabled: bool,
    audio_codec: Option<String>,
    audio_channels: i32,
    audio_sample_rate: i32,
    audio_sample_format: Option<String>,
    audio_bit_rate: Option<i64>,
    audio_quality: Option<f64>,
    audio_preset: Option<String>,
    audio_bitstream_filter: Option<String>,
    audio_filter: Option<String>,

    subtitle_enabled: bool,
    subtitle_codec: Option<String>,
    subtitle_preset: Option<String>,

    extra_args: Vec<String>,

    target_size: i64,
    pass_padding_bitrate: i64,
}

impl Default for StreamSpec {
    fn default() -> Self {
        StreamSpec {
            filename: None,
            uri: None,
            format: None,
            start_offset_ms: None,
            duration_ms: None,
            meta_tags: Vec::new(),
            strict: Strict::Normal,
            read_at_native_frame_rate: false,
            preset: None,
            preset_file: None,
            constant_rate_factor: None,
            complex_filter: None,
            video_enabled: true,
            video_codec: None,
            video_frames: None,
            video_pixel_format: None,
            video_copyinkf: false,
            video_mov_flags: None,
            video_width: 0,
            video_height: 0,
            video_size: None,
            video_frame_rate: None,
            video_bit_rate: None,
            video_quality: None,
            video_preset: None,
            video_filter: None,
            video_bitstream_filter: None,
            audio_enabled: true,
            audio_codec: None,
            audio_channels: 0,
            audio_sample_rate: 0,
            audio_sample_format: None,
            audio_bit_rate: None,
            audio_quality: None,
            audio_preset: None,
            audio_bitstream_filter: None,
            audio_filter: None,
            subtitle_enabled: true,
            subtitle_codec: None,
            subtitle_preset: None,
            extra_args: Vec::new(),
            target_size: 0,
            pass_padding_bitrate: 1024,
        }
    }
}

impl StreamSpec {
    /// A spec targeting a local file.
    pub fn file(filename: impl Into<String>) -> Self {
        StreamSpec::default().filename(filename)
    }

    /// A spec targeting a network stream, e.g. `rtmp://host/live`.
    pub fn stream_uri(uri: impl Into<String>) -> Self {
        StreamSpec::default().uri(uri)
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the container format (`-f`).
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Decode but discard input until the offset (`-ss`).
    pub fn start_offset(mut self, offset: Duration) -> Self {
        self.start_offset_ms = Some(offset.as_millis() as i64);
        self
    }

    /// Stop reading or writing once the duration is reached (`-t`).
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as i64);
        self
    }

    /// Adds a metadata tag (`-metadata key=value`). Tags are emitted in the
    /// order they were added.
    pub fn meta_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta_tags.push((key.into(), value.into()));
        self
    }

    pub fn strict(mut self, strict: Strict) -> Self {
        self.strict = strict;
        self
    }

    /// Read input at its native frame rate (`-re`). Only meaningful on
    /// inputs; ignored on outputs.
    pub fn read_at_native_frame_rate(mut self) -> Self {
        self.read_at_native_frame_rate = true;
        self
    }

    /// Sets a preset by name (`-preset`). Only works with some codecs.
    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Sets a file containing presets (`-fpre`).
    pub fn preset_file(mut self, preset_file: impl Into<String>) -> Self {
        self.preset_file = Some(preset_file.into());
        self
    }

    /// Sets the constant rate factor (`-crf`). Outputs only.
    pub fn constant_rate_factor(mut self, factor: f64) -> Self {
        self.constant_rate_factor = Some(factor);
        self
    }

    /// Sets a complex filtergraph (`-filter_complex`). Outputs only.
    pub fn complex_filter(mut self, filter: impl Into<String>) -> Self {
        self.complex_filter = Some(filter.into());
        self
    }

    pub fn no_video(mut self) -> Self {
        self.video_enabled = false;
        self
    }

    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_codec = Some(codec.into());
        self
    }

    /// Number of video frames to record (`-vframes`).
    pub fn video_frames(mut self, frames: i64) -> Self {
        self.video_enabled = true;
        self.video_frames = Some(frames);
        self
    }

    pub fn video_pixel_format(mut self, pixel_format: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_pixel_format = Some(pixel_format.into());
        self
    }

    /// Copy initial non-keyframes (`-copyinkf`).
    pub fn video_copy_inkf(mut self, copyinkf: bool) -> Self {
        self.video_enabled = true;
        self.video_copyinkf = copyinkf;
        self
    }

    pub fn video_mov_flags(mut self, mov_flags: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_mov_flags = Some(mov_flags.into());
        self
    }

    /// Explicit width in pixels; `-1` lets ffmpeg derive it from the height.
    pub fn video_width(mut self, width: i32) -> Self {
        self.video_enabled = true;
        self.video_width = width;
        self
    }

    /// Explicit height in pixels; `-1` lets ffmpeg derive it from the width.
    pub fn video_height(mut self, height: i32) -> Self {
        self.video_enabled = true;
        self.video_height = height;
        self
    }

    pub fn video_resolution(self, width: i32, height: i32) -> Self {
        self.video_width(width).video_height(height)
    }

    /// Resolution by abbreviation, e.g. `"hd720"` or `"vga"`. Mutually
    /// exclusive with an explicit width/height.
    pub fn video_size(mut self, abbreviation: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_size = Some(abbreviation.into());
        self
    }

    /// Frame rate in frames per second (`-r`).
    pub fn video_frame_rate(mut self, frame_rate: f64) -> Self {
        self.video_enabled = true;
        self.video_frame_rate = Some(frame_rate.to_string());
        self
    }

    /// Frame rate as a fraction, e.g. `24000/1001` for NTSC 23.976 fps.
    pub fn video_frame_rate_fraction(mut self, frames: u32, per: u32) -> Self {
        self.video_enabled = true;
        self.video_frame_rate = Some(if per == 1 {
            frames.to_string()
        } else {
            format!("{frames}/{per}")
        });
        self
    }

    /// Video bitrate in bits per second (`-b:v`). Mutually exclusive with
    /// [`video_quality`](Self::video_quality).
    pub fn video_bit_rate(mut self, bit_rate: i64) -> Self {
        self.video_enabled = true;
        self.video_bit_rate = Some(bit_rate);
        self
    }

    /// Variable-bitrate quality scale (`-qscale:v`).
    pub fn video_quality(mut self, quality: f64) -> Self {
        self.video_enabled = true;
        self.video_quality = Some(quality);
        self
    }

    /// Sets a video preset (`-vpre`).
    pub fn video_preset(mut self, preset: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_preset = Some(preset.into());
        self
    }

    /// Sets a video filter (`-vf`). Requires the command to have exactly one
    /// input; use [`complex_filter`](Self::complex_filter) otherwise.
    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_filter = Some(filter.into());
        self
    }

    pub fn video_bitstream_filter(mut self, filter: impl Into<String>) -> Self {
        self.video_enabled = true;
        self.video_bitstream_filter = Some(filter.into());
        self
    }

    pub fn no_audio(mut self) -> Self {
        self.audio_enabled = false;
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_enabled = true;
        self.audio_codec = Some(codec.into());
        self
    }

    pub fn audio_channels(mut self, channels: i32) -> Self {
        self.audio_enabled = true;
        self.audio_channels = channels;
        self
    }

    /// Audio sample rate in Hz, e.g. 44_100.
    pub fn audio_sample_rate(mut self, sample_rate: i32) -> Self {
        self.audio_enabled = true;
        self.audio_sample_rate = sample_rate;
        self
    }

    /// Audio sample format (`-sample_fmt`), e.g. `"s16"`.
    pub fn audio_sample_format(mut self, sample_format: impl Into<String>) -> Self {
        self.audio_enabled = true;
        self.audio_sample_format = Some(sample_format.into());
        self
    }

    /// Audio bitrate in bits per second (`-b:a`). Mutually exclusive with
    /// [`audio_quality`](Self::audio_quality).
    pub fn audio_bit_rate(mut self, bit_rate: i64) -> Self {
        self.audio_enabled = true;
        self.audio_bit_rate = Some(bit_rate);
        self
    }

    /// Variable-bitrate quality scale (`-qscale:a`).
    pub fn audio_quality(mut self, quality: f64) -> Self {
        self.audio_enabled = true;
        self.audio_quality = Some(quality);
        self
    }

    /// Sets an audio preset (`-apre`).
    pub fn audio_preset(mut self, preset: impl Into<String>) -> Self {
        self.audio_enabled = true;
        self.audio_preset = Some(preset.into());
        self
    }

    pub fn audio_bitstream_filter(mut self, filter: impl Into<String>) -> Self {
        self.audio_enabled = true;
        self.audio_bitstream_filter = Some(filter.into());
        self
    }

    pub fn audio_filter(mut self, filter: impl Into<String>) -> Self {
        self.audio_enabled = true;
        self.audio_filter = Some(filter.into());
        self
    }

    pub fn no_subtitle(mut self) -> Self {
        self.subtitle_enabled = false;
        self
    }

    pub fn subtitle_codec(mut self, codec: impl Into<String>) -> Self {
        self.subtitle_enabled = true;
        self.subtitle_codec = Some(codec.into());
        self
    }

    /// Sets a subtitle preset (`-spre`).
    pub fn subtitle_preset(mut self, preset: impl Into<String>) -> Self {
        self.subtitle_enabled = true;
        self.subtitle_preset = Some(preset.into());
        self
    }

    /// Raw arguments appended verbatim after all structured flags, for
    /// options the builder does not model.
    pub fn extra_args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.extra_args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Desired output file size in bytes. Drives the two-pass bitrate
    /// derivation; the input must have been registered with a probe result.
    pub fn target_size(mut self, bytes: i64) -> Self {
        self.target_size = bytes;
        self
    }

    /// Extra bitrate headroom subtracted when deriving from a target size.
    pub fn pass_padding_bitrate(mut self, bits_per_second: i64) -> Self {
        self.pass_padding_bitrate = bits_per_second;
        self
    }

    pub(crate) fn filename_ref(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub(crate) fn target_size_bytes(&self) -> i64 {
        self.target_size
    }

    pub(crate) fn padding_bitrate(&self) -> i64 {
        self.pass_padding_bitrate
    }

    pub(crate) fn has_constant_rate_factor(&self) -> bool {
        self.constant_rate_factor.is_some()
    }

    pub(crate) fn has_format(&self) -> bool {
        self.format.is_some()
    }

    pub(crate) fn is_video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub(crate) fn is_audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub(crate) fn explicit_video_bit_rate(&self) -> Option<i64> {
        self.video_bit_rate
    }

    pub(crate) fn explicit_audio_bit_rate(&self) -> Option<i64> {
        self.audio_bit_rate
    }

    /// Lowers this spec into its token block, in the mandated flag order.
    pub(crate) fn lower(&self, ctx: &LowerContext) -> Result<Vec<String>, Error> {
        self.check_contracts(ctx)?;

        let mut args = ArgList::new();

        if ctx.kind == StreamKind::Input {
            args.add_flag_if(self.read_at_native_frame_rate, "-re");
        }

        args.add_arg_if(self.strict != Strict::Normal, "-strict", self.strict.as_str());

        if let Some(format) = &self.format {
            args.add_pair("-f", format);
        }
        if let Some(preset) = &self.preset {
            args.add_pair("-preset", preset);
        }
        if let Some(preset_file) = &self.preset_file {
            args.add_pair("-fpre", preset_file);
        }
        if let Some(offset) = self.start_offset_ms {
            args.add_pair("-ss", to_timecode(offset)?);
        }
        if let Some(duration) = self.duration_ms {
            args.add_pair("-t", to_timecode(duration)?);
        }
        for (key, value) in &self.meta_tags {
            args.add_pair("-metadata", format!("{key}={value}"));
        }

        if ctx.kind == StreamKind::Output {
            if let Some(crf) = self.constant_rate_factor {
                args.add_pair("-crf", crf.to_string());
            }
            if let Some(filter) = &self.complex_filter {
                args.add_pair("-filter_complex", filter);
            }
            if ctx.pass > 0 {
                args.add_pair("-pass", ctx.pass.to_string());
                args.add_arg_if(
                    ctx.pass_log_file.is_some(),
                    "-passlogfile",
                    ctx.pass_log_file.clone().unwrap_or_default(),
                );
            }
        }

        if self.video_enabled {
            self.lower_video(ctx, &mut args);
        } else {
            args.add("-vn");
        }

        // Pass 1 output is analysis-only, so audio is dropped outright.
        if self.audio_enabled && !(ctx.kind == StreamKind::Output && ctx.pass == 1) {
            self.lower_audio(ctx, &mut args);
        } else {
            args.add("-an");
        }

        if self.subtitle_enabled {
            if let Some(codec) = &self.subtitle_codec {
                args.add_pair("-scodec", codec);
            }
            if let Some(preset) = &self.subtitle_preset {
                args.add_pair("-spre", preset);
            }
        } else {
            args.add("-sn");
        }

        args.add_all(self.extra_args.iter().cloned());

        match ctx.kind {
            StreamKind::Input => {
                let target = self.filename.as_deref().or(self.uri.as_deref());
                args.add_pair("-i", target.unwrap_or_default());
            }
            StreamKind::Output => {
                if ctx.pass == 1 {
                    args.add(DEV_NULL);
                } else {
                    let target = self.filename.as_deref().or(self.uri.as_deref());
                    args.add(target.unwrap_or_default());
                }
            }
        }

        Ok(args.into_tokens())
    }

    fn lower_video(&self, ctx: &LowerContext, args: &mut ArgList) {
        if let Some(frames) = self.video_frames {
            args.add_pair("-vframes", frames.to_string());
        }
        if let Some(codec) = &self.video_codec {
            args.add_pair("-vcodec", codec);
        }
        if let Some(pixel_format) = &self.video_pixel_format {
            args.add_pair("-pix_fmt", pixel_format);
        }
        args.add_flag_if(self.video_copyinkf, "-copyinkf");
        if let Some(mov_flags) = &self.video_mov_flags {
            args.add_pair("-movflags", mov_flags);
        }
        if let Some(size) = &self.video_size {
            args.add_pair("-s", size);
        } else if self.video_width != 0 && self.video_height != 0 {
            args.add_pair("-s", format!("{}x{}", self.video_width, self.video_height));
        }
        if let Some(frame_rate) = &self.video_frame_rate {
            args.add_pair("-r", frame_rate);
        }
        if let Some(bit_rate) = ctx.video_bit_rate {
            args.add_pair("-b:v", bit_rate.to_string());
        }
        if let Some(quality) = self.video_quality {
            args.add_pair("-qscale:v", quality.to_string());
        }
        if let Some(preset) = &self.video_preset {
            args.add_pair("-vpre", preset);
        }
        if let Some(filter) = &self.video_filter {
            args.add_pair("-vf", filter);
        }
        if let Some(filter) = &self.video_bitstream_filter {
            args.add_pair("-bsf:v", filter);
        }
    }

    fn lower_audio(&self, ctx: &LowerContext, args: &mut ArgList) {
        if let Some(codec) = &self.audio_codec {
            args.add_pair("-acodec", codec);
        }
        if self.audio_channels > 0 {
            args.add_pair("-ac", self.audio_channels.to_string());
        }
        if self.audio_sample_rate > 0 {
            args.add_pair("-ar", self.audio_sample_rate.to_string());
        }
        if let Some(sample_format) = &self.audio_sample_format {
            args.add_pair("-sample_fmt", sample_format);
        }
        if let Some(bit_rate) = ctx.audio_bit_rate {
            args.add_pair("-b:a", bit_rate.to_string());
        }
        if let Some(quality) = self.audio_quality {
            args.add_pair("-qscale:a", quality.to_string());
        }
        if let Some(preset) = &self.audio_preset {
            args.add_pair("-apre", preset);
        }
        if let Some(filter) = &self.audio_bitstream_filter {
            args.add_pair("-bsf:a", filter);
        }
        if let Some(filter) = &self.audio_filter {
            args.add_pair("-af", filter);
        }
    }

    fn check_contracts(&self, ctx: &LowerContext) -> Result<(), Error> {
        match (&self.filename, &self.uri) {
            (Some(_), Some(_)) => {
                return Err(Error::Argument(
                    "Only one of filename and uri can be set".to_string(),
                ));
            }
            (None, None) => {
                return Err(Error::Argument(
                    "Either filename or uri must be set".to_string(),
                ));
            }
            (None, Some(uri)) => check_valid_stream(uri)?,
            (Some(_), None) => {}
        }

        if !is_valid_dimension(self.video_width) {
            return Err(Error::Argument("Width must be -1 or greater than zero".to_string()));
        }
        if !is_valid_dimension(self.video_height) {
            return Err(Error::Argument("Height must be -1 or greater than zero".to_string()));
        }
        if self.video_size.is_some() && (self.video_width != 0 || self.video_height != 0) {
            return Err(Error::Argument(
                "Can not specify width or height, as well as an abbreviated video size".to_string(),
            ));
        }

        if ctx.video_bit_rate.is_some() && self.video_quality.is_some() {
            return Err(Error::Argument(
                "Only one of video bit rate and video quality can be set".to_string(),
            ));
        }
        if ctx.audio_bit_rate.is_some() && self.audio_quality.is_some() {
            return Err(Error::Argument(
                "Only one of audio bit rate and audio quality can be set".to_string(),
            ));
        }

        if self.video_filter.is_some() && ctx.input_count != 1 {
            return Err(Error::Argument(
                "A video filter only works with one input, instead use a complex filter".to_string(),
            ));
        }

        Ok(())
    }
}

/// Dimensions are either unset (0), derived (-1), or an actual pixel count.
fn is_valid_dimension(value: i32) -> bool {
    value == 0 || value == -1 || value > 0
}

/// Syntactic check that a URI is streamable: rtp-family schemes pass as-is,
/// udp/tcp must name a port.
fn check_valid_stream(uri: &str) -> Result<(), Error> {
    let scheme = uri
        .split(':')
        .next()
        .filter(|s| !s.is_empty() && *s != uri)
        .ok_or_else(|| Error::Argument("URI is missing a scheme".to_string()))?
        .to_ascii_lowercase();

    match scheme.as_str() {
        "rtsp" | "rtp" | "rtmp" => Ok(()),
        "udp" | "tcp" => {
            let authority = uri
                .split("://")
                .nth(1)
                .map(|rest| rest.split('/').next().unwrap_or(rest))
                .unwrap_or("");
            let has_port = authority
                .rsplit_once(':')
                .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
            if has_port {
                Ok(())
            } else {
                Err(Error::Argument(
                    "must set port when using udp or tcp scheme".to_string(),
                ))
            }
        }
        _ => Err(Error::Argument(
            "not a valid output URL, must use rtp/tcp/udp scheme".to_string(),
        )),
    }
}
