//! Output rendering: human-readable text or JSON, plus error display with
//! machine codes and hints.

use serde::Serialize;
use strata_core::StrataError;

/// How command results are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Print a command result in the selected mode.
///
/// `human` is the already-formatted text body; `json` is the structured
/// equivalent.
pub fn render(mode: OutputMode, human: &str, json: &impl Serialize) {
    match mode {
        OutputMode::Human => {
            if !human.is_empty() {
                println!("{human}");
            }
        }
        OutputMode::Json => match serde_json::to_string_pretty(json) {
            Ok(body) => println!("{body}"),
            Err(err) => eprintln!("error: serialize output: {err}"),
        },
    }
}

/// Print an error with its machine code and optional hint, then return the
/// process exit code.
#[must_use]
pub fn render_error(mode: OutputMode, err: &StrataError) -> i32 {
    let code = err.error_code();
    match mode {
        OutputMode::Human => {
            eprintln!("error {code}: {err}");
            if let Some(hint) = code.hint() {
                eprintln!("hint: {hint}");
            }
        }
        OutputMode::Json => {
            let body = serde_json::json!({
                "ok": false,
                "code": code.code(),
                "message": err.to_string(),
                "hint": code.hint(),
            });
            match serde_json::to_string_pretty(&body) {
                Ok(body) => eprintln!("{body}"),
                Err(ser_err) => eprintln!("error: serialize error output: {ser_err}"),
            }
        }
    }
    1
}

/// Microsecond timestamp → RFC 3339 for human output.
#[must_use]
pub fn format_ts(ts_us: i64) -> String {
    chrono::DateTime::from_timestamp_micros(ts_us)
        .map_or_else(|| ts_us.to_string(), |dt| dt.to_rfc3339())
}
