use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::runner::{ProcessOptions, Redirect};

/// Turns a non-zero exit into a descriptive [`Error::NonZeroExit`].
///
/// When stderr was redirected to a file, its full text is appended to the
/// generic message. When stderr was merged into stdout its text is commingled
/// there and not separately recoverable, and when it was piped inline the
/// relay already delivered it, so both cases get the generic message alone.
/// A failure to read the redirect file degrades to the generic message too:
/// losing the diagnostic detail must never mask the original failure.
pub(crate) fn classify_exit(
    description: &str,
    options: &ProcessOptions,
    exit_code: Option<i32>,
) -> Error {
    let mut message = generic_message(description);

    if !options.merge_error_into_output {
        if let Redirect::ToFile(path) = &options.error_redirect {
            if let Some(detail) = read_diagnostic(path) {
                message.push('\n');
                message.push_str(&detail);
            }
        }
    }

    Error::NonZeroExit { message, exit_code }
}

fn generic_message(description: &str) -> String {
    format!("{description} returned non-zero exit status. Check stdout.")
}

fn read_diagnostic(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}
