use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+):(\d+):(\d+(?:\.\d+)?)").expect("BUG: Failed to compile timecode regex")
});

static BITRATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)kbits/s").expect("BUG: Failed to compile bitrate regex")
});

/// Formats a duration in milliseconds as an ffmpeg timecode.
///
/// Durations with no sub-second remainder render as `HH:MM:SS`; everything
/// else renders as `HH:MM:SS.fffffffff` with trailing zero fractional digits
/// stripped. Negative durations are rejected.
pub fn to_timecode(milliseconds: i64) -> Result<String, Error> {
    if milliseconds < 0 {
        return Err(Error::Argument("duration must be positive".to_string()));
    }

    let nanos = (milliseconds % 1000) * 1_000_000;
    let total_seconds = milliseconds / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if nanos == 0 {
        return Ok(format!("{hours:02}:{minutes:02}:{seconds:02}"));
    }

    let full = format!("{hours:02}:{minutes:02}:{seconds:02}.{nanos:09}");
    Ok(full.trim_end_matches('0').to_string())
}

/// Parses a `H:M:S[.frac]` timecode back into milliseconds. The seconds
/// component may be decimal.
pub fn from_timecode(time: &str) -> Result<i64, Error> {
    if time.trim().is_empty() {
        return Err(Error::Argument("time must not be empty".to_string()));
    }

    let caps = TIME_RE
        .captures(time)
        .ok_or_else(|| Error::Argument(format!("invalid time '{time}'")))?;

    let hours: i64 = caps[1].parse().map_err(|_| Error::Argument(format!("invalid time '{time}'")))?;
    let minutes: i64 = caps[2].parse().map_err(|_| Error::Argument(format!("invalid time '{time}'")))?;
    let seconds: f64 = caps[3].parse().map_err(|_| Error::Argument(format!("invalid time '{time}'")))?;

    Ok(hours * 3_600_000 + minutes * 60_000 + (seconds * 1000.0).round() as i64)
}

/// Converts an ffmpeg bitrate string such as `"12.3kbits/s"` to bits per
/// second. `"N/A"` maps to `-1`.
pub fn parse_bitrate(bitrate: &str) -> Result<i64, Error> {
    if bitrate == "N/A" {
        return Ok(-1);
    }

    let caps = BITRATE_RE
        .captures(bitrate)
        .ok_or_else(|| Error::Argument(format!("invalid bitrate '{bitrate}'")))?;

    let kbits: f64 = caps[1]
        .parse()
        .map_err(|_| Error::Argument(format!("invalid bitrate '{bitrate}'")))?;

    Ok((kbits * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_seconds_have_no_fraction() {
        assert_eq!(to_timecode(0).unwrap(), "00:00:00");
        assert_eq!(to_timecode(10_000).unwrap(), "00:00:10");
        assert_eq!(to_timecode(3_600_000).unwrap(), "01:00:00");
        assert_eq!(to_timecode(86_400_000).unwrap(), "24:00:00");
    }

    #[test]
    fn fractions_strip_trailing_zeros() {
        assert_eq!(to_timecode(1_500).unwrap(), "00:00:01.5");
        assert_eq!(to_timecode(1_001).unwrap(), "00:00:01.001");
        assert_eq!(to_timecode(59_999).unwrap(), "00:00:59.999");
        assert_eq!(to_timecode(3_661_250).unwrap(), "01:01:01.25");
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert!(matches!(to_timecode(-1), Err(Error::Argument(_))));
    }

    #[test]
    fn parses_timecodes() {
        assert_eq!(from_timecode("00:00:10").unwrap(), 10_000);
        assert_eq!(from_timecode("01:01:01.25").unwrap(), 3_661_250);
        assert_eq!(from_timecode("1:2:3").unwrap(), 3_723_000);
    }

    #[test]
    fn rejects_garbage_timecodes() {
        assert!(from_timecode("").is_err());
        assert!(from_timecode("ten seconds").is_err());
    }

    #[test]
    fn round_trips_are_stable() {
        for ms in [0, 1, 999, 1_000, 1_500, 59_999, 3_661_250, 86_400_000] {
            let formatted = to_timecode(ms).unwrap();
            let reparsed = from_timecode(&formatted).unwrap();
            assert_eq!(to_timecode(reparsed).unwrap(), formatted, "ms={ms}");
        }
    }

    #[test]
    fn parses_bitrates() {
        assert_eq!(parse_bitrate("12.3kbits/s").unwrap(), 12_300);
        assert_eq!(parse_bitrate("1000kbits/s").unwrap(), 1_000_000);
        assert_eq!(parse_bitrate("N/A").unwrap(), -1);
        assert!(parse_bitrate("fast").is_err());
    }
}
