//! Shared output helpers for commands.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{Result, SurfError};

/// Print `value` as JSON on stdout.
///
/// # Errors
/// Returns an error if `value` cannot be serialized.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

/// A labelled line for human output, e.g. `Current host: Google Cloud`.
#[must_use]
pub fn field(label: &str, value: &str) -> String {
    format!("{} {value}", format!("{label}:").bold())
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    category: &'static str,
    message: String,
    retryable: bool,
}

#[derive(Serialize)]
struct ErrorJson {
    error: ErrorBody,
}

/// Render an error for stderr in the requested format.
#[must_use]
pub fn render_error(error: &SurfError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => {
            let body = ErrorJson {
                error: ErrorBody {
                    code: error.error_code(),
                    category: error.category().description(),
                    message: error.to_string(),
                    retryable: error.is_retryable(),
                },
            };
            let rendered = if pretty {
                serde_json::to_string_pretty(&body)
            } else {
                serde_json::to_string(&body)
            };
            rendered.unwrap_or_else(|_| render_plain(error))
        }
        OutputFormat::Human => format!(
            "{} {} {}",
            "error:".red().bold(),
            error,
            format!("[{}]", error.error_code()).dimmed()
        ),
    }
}

fn render_plain(error: &SurfError) -> String {
    format!("error: {error} [{}]", error.error_code())
}
