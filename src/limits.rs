//! Resource limits applied to reads and decodes.

use crate::error::{CodecError, ErrorKind, SubCode};

/// Resource limits for read/decode operations.
///
/// Used to refuse hostile inputs before any large allocation happens. All
/// limits are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u64>,
    /// Maximum image height in pixels.
    pub max_height: Option<u64>,
    /// Maximum total pixels (width x height).
    pub max_pixels: Option<u64>,
    /// Maximum memory allocation in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    /// Create a new Limits with no restrictions.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_width(mut self, width: u64) -> Self {
        self.max_width = Some(width);
        self
    }

    pub fn with_max_height(mut self, height: u64) -> Self {
        self.max_height = Some(height);
        self
    }

    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    pub fn with_max_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Check if dimensions are within limits.
    ///
    /// Returns `Err` with a description if any limit is exceeded.
    pub fn check_dimensions(&self, width: u64, height: u64) -> Result<(), &'static str> {
        if let Some(max_width) = self.max_width {
            if width > max_width {
                return Err("width exceeds limit");
            }
        }

        if let Some(max_height) = self.max_height {
            if height > max_height {
                return Err("height exceeds limit");
            }
        }

        if let Some(max_pixels) = self.max_pixels {
            if width.saturating_mul(height) > max_pixels {
                return Err("pixel count exceeds limit");
            }
        }

        Ok(())
    }

    /// Check if a memory allocation is within limits.
    pub fn check_memory(&self, bytes: u64) -> Result<(), &'static str> {
        if let Some(max_memory) = self.max_memory_bytes {
            if bytes > max_memory {
                return Err("memory allocation exceeds limit");
            }
        }
        Ok(())
    }

    /// Check an image of `width` x `height` with `bytes_per_pixel` bytes per
    /// pixel against every limit.
    pub fn validate(&self, width: u32, height: u32, bytes_per_pixel: u32) -> Result<(), CodecError> {
        let (w, h) = (u64::from(width), u64::from(height));
        self.check_dimensions(w, h)
            .and_then(|()| {
                self.check_memory(
                    w.saturating_mul(h)
                        .saturating_mul(u64::from(bytes_per_pixel)),
                )
            })
            .map_err(|msg| {
                CodecError::new(
                    ErrorKind::InvalidInput,
                    SubCode::SECURITY_LIMIT_EXCEEDED,
                    format!("{msg} ({width}x{height})"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limits_accept_anything() {
        assert!(Limits::none().validate(u32::MAX, u32::MAX, 8).is_ok());
    }

    #[test]
    fn dimension_limits() {
        let limits = Limits::none().with_max_width(100).with_max_pixels(5000);
        assert!(limits.check_dimensions(100, 50).is_ok());
        assert_eq!(limits.check_dimensions(101, 1), Err("width exceeds limit"));
        assert_eq!(
            limits.check_dimensions(100, 51),
            Err("pixel count exceeds limit")
        );
    }

    #[test]
    fn validate_reports_security_limit() {
        let limits = Limits::none().with_max_memory_bytes(1024);
        let err = limits.validate(32, 32, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.subcode(), SubCode::SECURITY_LIMIT_EXCEEDED);
        assert!(limits.validate(16, 16, 4).is_ok());
    }
}
