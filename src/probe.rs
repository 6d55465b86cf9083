use serde::{Deserialize, Deserializer};

/// Media metadata for one input, as previously obtained from `ffprobe`.
///
/// ffcmd does not probe files itself; callers run
/// `ffprobe -print_format json -show_format <file>` (or equivalent) and hand
/// the mapped result to
/// [`CommandBuilder::add_probed_input`](crate::CommandBuilder::add_probed_input).
/// The only field the command assembly consumes is the container duration,
/// which target-size encodes derive their bitrates from.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeResult {
    pub format: ProbeFormat,
}

/// The `format` section of an ffprobe report. ffprobe prints numeric fields
/// as JSON strings, so numbers are accepted in either representation.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub filename: String,
    #[serde(default)]
    pub format_name: Option<String>,
    #[serde(default, deserialize_with = "stringly_f64")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "stringly_i64")]
    pub size: Option<i64>,
    #[serde(default, deserialize_with = "stringly_i64")]
    pub bit_rate: Option<i64>,
}

impl ProbeResult {
    /// Builds a minimal probe result by hand, for callers that already know
    /// the input's duration.
    pub fn with_duration(filename: impl Into<String>, duration_seconds: f64) -> Self {
        ProbeResult {
            format: ProbeFormat {
                filename: filename.into(),
                format_name: None,
                duration: Some(duration_seconds),
                size: None,
                bit_rate: None,
            },
        }
    }
}

fn stringly_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn stringly_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
