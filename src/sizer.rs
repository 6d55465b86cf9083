use crate::error::Error;
use crate::probe::ProbeResult;
use crate::stream::StreamSpec;

/// The per-stream bitrates a target-size encode should use. `None` leaves the
/// stream's own (possibly absent) bitrate untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct BitratePlan {
    pub video: Option<i64>,
    pub audio: Option<i64>,
}

/// Derives bitrates for an output that was given a target file size.
///
/// The whole size budget, minus a small padding to make sure the target is
/// actually reached, is spread over the enabled streams: video (less the
/// audio bitrate, when audio is on) when video has no explicit rate,
/// otherwise audio alone. Streams with an explicit bitrate keep it.
///
/// Runs immediately before the output is lowered, so the emitted `-b:v` /
/// `-b:a` flags reflect the derived values; the spec itself is not mutated
/// and stays reusable.
pub(crate) fn plan_bitrates(
    output: &StreamSpec,
    probe: Option<&ProbeResult>,
    input_count: usize,
) -> Result<BitratePlan, Error> {
    let target_size = output.target_size_bytes();
    if target_size <= 0 {
        return Ok(BitratePlan {
            video: output.explicit_video_bit_rate(),
            audio: output.explicit_audio_bit_rate(),
        });
    }

    if input_count != 1 {
        return Err(Error::Argument(
            "Target size does not support multiple inputs".to_string(),
        ));
    }
    if output.has_constant_rate_factor() {
        return Err(Error::Argument(
            "Target size can not be used with a constant rate factor".to_string(),
        ));
    }
    let probe = probe.ok_or_else(|| {
        Error::Argument("Target size must be used with a probed input".to_string())
    })?;
    let duration = probe.format.duration.filter(|d| *d > 0.0).ok_or_else(|| {
        Error::Argument("Target size requires the probed input to have a duration".to_string())
    })?;

    let total_bit_rate =
        ((target_size * 8) as f64 / duration).floor() as i64 - output.padding_bitrate();

    let mut plan = BitratePlan {
        video: output.explicit_video_bit_rate(),
        audio: output.explicit_audio_bit_rate(),
    };

    if output.is_video_enabled() && plan.video.is_none() {
        // Video takes the budget, less whatever audio claims.
        let audio_share = if output.is_audio_enabled() {
            plan.audio.unwrap_or(0)
        } else {
            0
        };
        plan.video = Some(total_bit_rate - audio_share);
    } else if output.is_audio_enabled() && plan.audio.is_none() {
        plan.audio = Some(total_bit_rate);
    }

    Ok(plan)
}
