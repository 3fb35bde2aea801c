// file: src/utils/logging.rs
// description: tracing setup for the reactik binary and its request status lines
// reference: https://docs.rs/tracing-subscriber

use colored::*;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directive used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "reactik=debug" } else { "reactik=info" }
}

/// Installs the global subscriber on stderr so response bodies on stdout stay
/// clean. `RUST_LOG` wins over `verbose` when set.
pub fn init_logger(colored_output: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(colored_output);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// `→ GET https://...` line printed before a request goes out.
pub fn format_request(method: &str, url: &str) -> String {
    format!("{} {} {}", "→".blue().bold(), method.bold(), url)
}

/// Status line for a received response, colored by status class.
pub fn format_response(status: u16, bytes: usize, written_to: Option<&Path>) -> String {
    let code = match status {
        200..=299 => status.to_string().green().bold(),
        300..=399 => status.to_string().cyan().bold(),
        400..=499 => status.to_string().yellow().bold(),
        _ => status.to_string().red().bold(),
    };
    match written_to {
        Some(path) => format!("{} {} - {} bytes written to {}", "✓".green().bold(), code, bytes, path.display()),
        None => format!("{} {} - {} bytes", "✓".green().bold(), code, bytes),
    }
}

pub fn format_failure(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}
