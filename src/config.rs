//! Decode options and bundled encoder configuration.
//!
//! [`DecodeOptions`] is passed to the engine with every decode.
//! [`EncoderConfig`] collects encoder settings into a single value that can
//! be applied to any [`EncoderSession`](crate::EncoderSession), so the same
//! configuration can drive several sessions or come from a CLI.

/// Options forwarded to the engine's decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct DecodeOptions {
    /// Do not apply rotation, mirroring or cropping stored in the container.
    pub ignore_transformations: bool,
    /// Scale samples deeper than 8 bits down to 8 bits.
    pub convert_hdr_to_8bit: bool,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_transformations(mut self, ignore: bool) -> Self {
        self.ignore_transformations = ignore;
        self
    }

    pub fn with_convert_hdr_to_8bit(mut self, convert: bool) -> Self {
        self.convert_hdr_to_8bit = convert;
        self
    }
}

/// Encoder settings applied in a fixed order: quality, lossless, named
/// parameters, then preset.
///
/// # Example
///
/// ```
/// use heifkit::{CompressionFormat, EncoderConfig, EncoderSession};
///
/// let config = EncoderConfig::new()
///     .with_quality(90)
///     .with_preset("packbits");
/// let mut session = EncoderSession::new(CompressionFormat::Uncompressed)?;
/// session.apply(&config)?;
/// # Ok::<(), heifkit::CodecError>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct EncoderConfig {
    /// Lossy quality, 0..=100.
    pub quality: Option<i32>,
    pub lossless: Option<bool>,
    /// Engine preset name, applied as the `preset` parameter.
    pub preset: Option<String>,
    /// Raw name/value parameters, in order.
    pub parameters: Vec<(String, String)>,
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: i32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_lossless(mut self, lossless: bool) -> Self {
        self.lossless = Some(lossless);
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// Whether applying this config changes nothing.
    pub fn is_empty(&self) -> bool {
        self.quality.is_none()
            && self.lossless.is_none()
            && self.preset.is_none()
            && self.parameters.is_empty()
    }
}
