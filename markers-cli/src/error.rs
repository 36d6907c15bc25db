//! Error handling for the markers CLI

use markers_core::Point;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for markers CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Parsing error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Rendering error: {message}")]
    Rendering { message: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn parse<F: Into<String>, M: Into<String>>(file: F, message: M) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn rendering<S: Into<String>>(message: S) -> Self {
        Self::Rendering { message: message.into() }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(format!("TOML serialization error: {}", err))
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Parse a container point written as `x,y`.
pub fn parse_point(value: &str) -> CliResult<Point> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| CliError::invalid_argument(format!("expected x,y but got '{}'", value)))?;

    let coordinate = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| CliError::invalid_argument(format!("'{}' is not a number", part.trim())))
    };

    Ok(Point::new(coordinate(x)?, coordinate(y)?))
}

/// Parse `#rrggbb` or `#rrggbbaa`. An empty string means fully transparent.
pub fn parse_color(value: &str) -> CliResult<[u8; 4]> {
    let value = value.trim();
    if value.is_empty() {
        return Ok([0, 0, 0, 0]);
    }

    let hex = value
        .strip_prefix('#')
        .filter(|hex| (hex.len() == 6 || hex.len() == 8) && hex.is_ascii())
        .ok_or_else(|| CliError::config(format!("invalid color '{}'", value)))?;

    let mut rgba = [0, 0, 0, 255];
    for (i, channel) in rgba.iter_mut().enumerate().take(hex.len() / 2) {
        *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| CliError::config(format!("invalid color '{}'", value)))?;
    }
    Ok(rgba)
}

/// Provide helpful error messages and suggestions
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Icon paths in the marker file are resolved relative to that file",
                path.display()
            ));
        }

        CliError::Parse { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • The marker file must be a JSON array of {lat, lng, icon, group} records\n\
                 • Each icon needs a url and a [width, height] size",
            );
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your markers.toml configuration file\n\
                 • Use 'markers config' to print a sample configuration",
            );
        }

        CliError::InvalidArgument { .. } => {
            message.push_str("\n\nPoints are given as container pixels, for example --at 120,48");
        }

        _ => {}
    }

    message
}
