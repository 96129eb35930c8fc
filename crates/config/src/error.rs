//! Config Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The configuration file has an extension we can't parse.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// The merged configuration could not be deserialized.
    #[display("invalid configuration")]
    Load,
    /// A value is out of range.
    #[display("invalid configuration value for `{_0}`: {_1}")]
    Invalid(#[error(not(source))] &'static str, #[error(not(source))] String),
}
