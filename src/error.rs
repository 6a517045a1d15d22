//! Error taxonomy shared by every engine.
//!
//! Engines report failures as a triple of numeric code, numeric subcode and
//! message. [`CodecError`] keeps all three: the code becomes an [`ErrorKind`],
//! the subcode a [`SubCode`], and the message is carried verbatim.

use std::fmt;

/// Category of a failure, one per engine error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Input file does not exist or cannot be opened.
    InputDoesNotExist,
    /// Malformed container, entry or buffer.
    InvalidInput,
    /// Bytes are not a container type this engine understands.
    UnsupportedFiletype,
    /// The engine lacks a requested capability or plugin.
    UnsupportedFeature,
    /// The caller violated an API precondition.
    UsageError,
    /// Allocation failed, including inside the write callback.
    MemoryAllocationError,
    /// A decoder plugin reported a failure.
    DecoderPluginError,
    /// No encoder plugin, or the encoder plugin failed.
    EncoderPluginError,
    /// Encoding failed.
    EncodingError,
    /// The requested color profile does not exist.
    ColorProfileDoesNotExist,
    /// A dynamic plugin could not be loaded.
    PluginLoadingError,
    /// The operation was canceled by the engine.
    Canceled,
    /// A code this binding does not know.
    Other(i32),
}

impl ErrorKind {
    /// Map a numeric engine error code to its kind.
    ///
    /// Returns `None` for code 0, which means success.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => return None,
            1 => Self::InputDoesNotExist,
            2 => Self::InvalidInput,
            3 => Self::UnsupportedFiletype,
            4 => Self::UnsupportedFeature,
            5 => Self::UsageError,
            6 => Self::MemoryAllocationError,
            7 => Self::DecoderPluginError,
            8 => Self::EncoderPluginError,
            9 => Self::EncodingError,
            10 => Self::ColorProfileDoesNotExist,
            11 => Self::PluginLoadingError,
            12 => Self::Canceled,
            other => Self::Other(other),
        })
    }

    /// Numeric engine code of this kind.
    pub fn code(self) -> i32 {
        match self {
            Self::InputDoesNotExist => 1,
            Self::InvalidInput => 2,
            Self::UnsupportedFiletype => 3,
            Self::UnsupportedFeature => 4,
            Self::UsageError => 5,
            Self::MemoryAllocationError => 6,
            Self::DecoderPluginError => 7,
            Self::EncoderPluginError => 8,
            Self::EncodingError => 9,
            Self::ColorProfileDoesNotExist => 10,
            Self::PluginLoadingError => 11,
            Self::Canceled => 12,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputDoesNotExist => f.write_str("input does not exist"),
            Self::InvalidInput => f.write_str("invalid input"),
            Self::UnsupportedFiletype => f.write_str("unsupported file type"),
            Self::UnsupportedFeature => f.write_str("unsupported feature"),
            Self::UsageError => f.write_str("usage error"),
            Self::MemoryAllocationError => f.write_str("memory allocation error"),
            Self::DecoderPluginError => f.write_str("decoder plugin error"),
            Self::EncoderPluginError => f.write_str("encoder plugin error"),
            Self::EncodingError => f.write_str("encoding error"),
            Self::ColorProfileDoesNotExist => f.write_str("color profile does not exist"),
            Self::PluginLoadingError => f.write_str("plugin loading error"),
            Self::Canceled => f.write_str("canceled"),
            Self::Other(code) => write!(f, "engine error {code}"),
        }
    }
}

/// Numeric detail code attached to a failure.
///
/// Engines define many more subcodes than are named here; unknown values are
/// kept as-is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubCode(pub i32);

impl SubCode {
    pub const UNSPECIFIED: Self = Self(0);
    pub const END_OF_DATA: Self = Self(100);
    pub const INVALID_BOX_SIZE: Self = Self(101);
    pub const NO_FTYP_BOX: Self = Self(102);
    pub const NO_META_BOX: Self = Self(104);
    pub const NO_OR_INVALID_PRIMARY_ITEM: Self = Self(124);
    pub const INVALID_IMAGE_SIZE: Self = Self(129);
    pub const SECURITY_LIMIT_EXCEEDED: Self = Self(1000);
    pub const NONEXISTING_ITEM_REFERENCED: Self = Self(2000);
    pub const NULL_POINTER_ARGUMENT: Self = Self(2001);
    pub const NONEXISTING_IMAGE_CHANNEL_REFERENCED: Self = Self(2002);
    pub const UNSUPPORTED_PARAMETER: Self = Self(2005);
    pub const INVALID_PARAMETER_VALUE: Self = Self(2006);
    pub const UNSUPPORTED_CODEC: Self = Self(3000);
    pub const UNSUPPORTED_COLOR_CONVERSION: Self = Self(3003);
    pub const UNSUPPORTED_BIT_DEPTH: Self = Self(4000);
    pub const CANNOT_WRITE_OUTPUT_DATA: Self = Self(5000);
    pub const ENCODER_ENCODING: Self = Self(5002);
}

impl fmt::Display for SubCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned by every fallible operation in this crate.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CodecError {
    kind: ErrorKind,
    subcode: SubCode,
    message: String,
}

impl CodecError {
    pub fn new(kind: ErrorKind, subcode: SubCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            subcode,
            message: message.into(),
        }
    }

    /// Build from a raw engine status.
    ///
    /// Returns `None` when `code` is 0 (success).
    pub fn from_status(code: i32, subcode: i32, message: impl Into<String>) -> Option<Self> {
        let kind = ErrorKind::from_code(code)?;
        Some(Self::new(kind, SubCode(subcode), message))
    }

    pub(crate) fn usage(subcode: SubCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UsageError, subcode, message)
    }

    pub(crate) fn invalid_input(subcode: SubCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, subcode, message)
    }

    pub(crate) fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::MemoryAllocationError,
            SubCode::UNSPECIFIED,
            message,
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn subcode(&self) -> SubCode {
        self.subcode
    }

    /// Engine message, unmodified.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric engine code.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_code_is_not_an_error() {
        assert!(CodecError::from_status(0, 0, "Success").is_none());
        assert_eq!(ErrorKind::from_code(0), None);
    }

    #[test]
    fn codes_map_both_ways() {
        for code in 1..=12 {
            let kind = ErrorKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
            assert!(!matches!(kind, ErrorKind::Other(_)));
        }
        assert_eq!(ErrorKind::from_code(77), Some(ErrorKind::Other(77)));
        assert_eq!(ErrorKind::Other(77).code(), 77);
    }

    #[test]
    fn message_is_kept_verbatim() {
        let err = CodecError::from_status(5, 2000, "Nonexisting item ID referenced").unwrap();
        assert_eq!(err.kind(), ErrorKind::UsageError);
        assert_eq!(err.subcode(), SubCode::NONEXISTING_ITEM_REFERENCED);
        assert_eq!(err.message(), "Nonexisting item ID referenced");
        assert_eq!(
            err.to_string(),
            "usage error: Nonexisting item ID referenced"
        );
    }
}
