// SPDX-License-Identifier: MPL-2.0
use std::fmt;

#[derive(Debug, Clone)]
pub enum Error {
    Io(String),
    Config(String),
    Image(String),
    /// A layer index or id referred to a layer that does not exist.
    Layer(String),
    /// A project manifest could not be turned back into a document.
    Manifest(String),
    Effect(EffectError),
}

/// Specific error types for adjustment-effect application.
///
/// Effect failure is a checked return path: the enclosing command is
/// never pushed and the document is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// No effect with this name is registered.
    Unknown(String),

    /// A configuration parameter was missing or out of range.
    BadConfig(String),

    /// The effect ran but could not produce an output buffer.
    Failed(String),
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectError::Unknown(name) => write!(f, "Unknown effect: {}", name),
            EffectError::BadConfig(msg) => write!(f, "Bad effect config: {}", msg),
            EffectError::Failed(msg) => write!(f, "Effect failed: {}", msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O Error: {}", e),
            Error::Config(e) => write!(f, "Config Error: {}", e),
            Error::Image(e) => write!(f, "Image Error: {}", e),
            Error::Layer(e) => write!(f, "Layer Error: {}", e),
            Error::Manifest(e) => write!(f, "Manifest Error: {}", e),
            Error::Effect(e) => write!(f, "Effect Error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<EffectError> for Error {
    fn from(err: EffectError) -> Self {
        Error::Effect(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<image_rs::ImageError> for Error {
    fn from(err: image_rs::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_io_error() {
        let err = Error::Io("disk failure".to_string());
        assert_eq!(format!("{}", err), "I/O Error: disk failure");
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_error = std::io::Error::other("boom");
        let err: Error = io_error.into();
        match err {
            Error::Io(message) => assert!(message.contains("boom")),
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn effect_error_wraps_into_error() {
        let err: Error = EffectError::Unknown("vortex".to_string()).into();
        assert_eq!(format!("{}", err), "Effect Error: Unknown effect: vortex");
    }

    #[test]
    fn effect_error_display() {
        let err = EffectError::BadConfig("amount out of range".into());
        assert!(format!("{}", err).contains("amount out of range"));
    }
}
