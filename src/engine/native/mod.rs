//! Pure Rust engine.
//!
//! Reads and writes containers with the private `hkit` brand. Images are
//! stored as raw planes, optionally PackBits-compressed, so every encode is
//! lossless and every decode of the stored layout is zero-copy.

mod boxes;
mod convert;
mod encoder;
mod image;
mod packbits;
mod session;

use crate::error::{CodecError, ErrorKind, SubCode};
use crate::format::CompressionFormat;
use crate::pixel::{Chroma, Colorspace};
use crate::registry::EncoderDescriptor;

use super::Engine;

pub use self::encoder::NativeEncoder;
pub use self::image::NativeImage;
pub use self::session::{NativeEntry, NativeSession};

use self::encoder::PLUGINS;

/// The built-in engine. Always available.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeEngine;

fn no_encoder(what: String) -> CodecError {
    CodecError::new(
        ErrorKind::EncoderPluginError,
        SubCode::UNSUPPORTED_CODEC,
        format!("No native encoder for {what}"),
    )
}

impl Engine for NativeEngine {
    type Session = NativeSession;
    type Entry = NativeEntry;
    type Image = NativeImage;
    type Encoder = NativeEncoder;

    const NAME: &'static str = "native";

    fn new_session() -> Result<NativeSession, CodecError> {
        Ok(NativeSession::new())
    }

    fn new_image(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<NativeImage, CodecError> {
        NativeImage::new(width, height, colorspace, chroma)
    }

    fn encoder_descriptors(
        format_filter: CompressionFormat,
        name_filter: Option<&str>,
    ) -> Vec<EncoderDescriptor> {
        PLUGINS
            .iter()
            .map(|plugin| plugin.descriptor())
            .filter(|d| d.matches(format_filter, name_filter))
            .collect()
    }

    fn encoder_for_format(format: CompressionFormat) -> Result<NativeEncoder, CodecError> {
        PLUGINS
            .iter()
            .find(|plugin| format.matches(plugin.format))
            .map(NativeEncoder::new)
            .ok_or_else(|| no_encoder(format!("format {}", format.name())))
    }

    fn encoder_for_descriptor(
        descriptor: &EncoderDescriptor,
    ) -> Result<NativeEncoder, CodecError> {
        PLUGINS
            .iter()
            .find(|plugin| {
                plugin.id_name == descriptor.id_name && plugin.format == descriptor.compression_format
            })
            .map(NativeEncoder::new)
            .ok_or_else(|| no_encoder(format!("plugin '{}'", descriptor.id_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineEncoder;

    #[test]
    fn encoder_lookup() {
        let enc = NativeEngine::encoder_for_format(CompressionFormat::Undefined).unwrap();
        assert_eq!(enc.compression_format(), CompressionFormat::Uncompressed);
        let enc = NativeEngine::encoder_for_format(CompressionFormat::Mask).unwrap();
        assert_eq!(enc.compression_format(), CompressionFormat::Mask);

        let err = NativeEngine::encoder_for_format(CompressionFormat::Hevc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncoderPluginError);
    }

    #[test]
    fn descriptor_must_be_registered() {
        let mut descriptor =
            NativeEngine::encoder_descriptors(CompressionFormat::Mask, None).remove(0);
        assert!(NativeEngine::encoder_for_descriptor(&descriptor).is_ok());
        descriptor.id_name = "x265".to_owned();
        assert!(NativeEngine::encoder_for_descriptor(&descriptor).is_err());
    }
}
