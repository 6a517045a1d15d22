//! Image encoding.

use core::fmt;

use crate::config::EncoderConfig;
use crate::container::{Container, ImageHandle};
use crate::engine::{Engine, EngineEncoder, EngineSession, NativeEngine};
use crate::error::{CodecError, SubCode};
use crate::format::CompressionFormat;
use crate::image::PixelBuffer;
use crate::registry::EncoderDescriptor;

/// One configured encoder plugin instance.
///
/// Settings persist across [`encode`](Self::encode) calls. Every named
/// parameter that was accepted is recorded in order and can be read back
/// with [`parameters`](Self::parameters).
///
/// # Example
///
/// ```
/// use heifkit::{Channel, Chroma, Colorspace, CompressionFormat, Container, EncoderSession, PixelBuffer};
///
/// let mut buffer = PixelBuffer::new(4, 4, Colorspace::Rgb, Chroma::InterleavedRgb)?;
/// buffer.add_plane(Channel::Interleaved, 4, 4, 8)?;
///
/// let mut session = EncoderSession::new(CompressionFormat::Uncompressed)?;
/// session.set_lossless(true)?;
///
/// let mut container = Container::new();
/// let handle = session.encode(&mut container, &buffer, "packbits")?;
/// assert_eq!(handle.width(), 4);
/// # Ok::<(), heifkit::CodecError>(())
/// ```
pub struct EncoderSession<E: Engine = NativeEngine> {
    encoder: E::Encoder,
    parameters: Vec<(String, String)>,
}

impl EncoderSession<NativeEngine> {
    /// A native encoder for `format`. `Undefined` picks the first plugin.
    pub fn new(format: CompressionFormat) -> Result<Self, CodecError> {
        Self::for_format(format)
    }
}

impl<E: Engine> EncoderSession<E> {
    /// An encoder of engine `E` for `format`.
    ///
    /// Fails with `EncoderPluginError` if no plugin encodes that format.
    pub fn for_format(format: CompressionFormat) -> Result<Self, CodecError> {
        let encoder = E::encoder_for_format(format)?;
        log::debug!("{}: encoder '{}' for {:?}", E::NAME, encoder.name(), format);
        Ok(Self::wrap(encoder))
    }

    /// An encoder for one specific registered plugin, as returned by
    /// [`list_descriptors`](crate::list_descriptors).
    pub fn from_descriptor(descriptor: &EncoderDescriptor) -> Result<Self, CodecError> {
        Ok(Self::wrap(E::encoder_for_descriptor(descriptor)?))
    }

    fn wrap(encoder: E::Encoder) -> Self {
        Self {
            encoder,
            parameters: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        self.encoder.name()
    }

    pub fn compression_format(&self) -> CompressionFormat {
        self.encoder.compression_format()
    }

    /// Fails with `UsageError` outside 0..=100.
    pub fn set_lossy_quality(&mut self, quality: i32) -> Result<(), CodecError> {
        if !(0..=100).contains(&quality) {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!("Quality {quality} is outside 0..=100"),
            ));
        }
        self.encoder.set_lossy_quality(quality)
    }

    pub fn set_lossless(&mut self, enable: bool) -> Result<(), CodecError> {
        self.encoder.set_lossless(enable)
    }

    /// Forward a named parameter to the plugin unchanged.
    ///
    /// Fails with `UsageError` for unknown names or invalid values.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), CodecError> {
        self.encoder.set_parameter(name, value)?;
        self.parameters.push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    /// Accepted named parameters, in the order they were set.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Names of the parameters the plugin accepts.
    pub fn parameter_names(&self) -> Vec<String> {
        self.encoder.parameter_names()
    }

    /// Apply a bundled configuration: quality, lossless, named parameters,
    /// then preset. Stops at the first rejected setting.
    pub fn apply(&mut self, config: &EncoderConfig) -> Result<(), CodecError> {
        if let Some(quality) = config.quality {
            self.set_lossy_quality(quality)?;
        }
        if let Some(lossless) = config.lossless {
            self.set_lossless(lossless)?;
        }
        for (name, value) in &config.parameters {
            self.set_parameter(name, value)?;
        }
        if let Some(preset) = &config.preset {
            self.set_parameter("preset", preset)?;
        }
        Ok(())
    }

    /// Encode `image` into `container` as a new top-level image.
    ///
    /// A non-empty `preset` is applied as parameter `preset` first. The first
    /// image encoded into a container becomes its primary image.
    pub fn encode(
        &mut self,
        container: &mut Container<E>,
        image: &PixelBuffer<E>,
        preset: &str,
    ) -> Result<ImageHandle<E>, CodecError> {
        if !preset.is_empty() {
            self.set_parameter("preset", preset)?;
        }
        let entry = container.session.encode(image.image(), &mut self.encoder)?;
        Ok(container.adopt(entry))
    }
}

impl<E: Engine> fmt::Debug for EncoderSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderSession")
            .field("engine", &E::NAME)
            .field("name", &self.encoder.name())
            .field("format", &self.encoder.compression_format())
            .field("parameters", &self.parameters)
            .finish()
    }
}
