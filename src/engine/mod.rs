//! Engine seam.
//!
//! An engine implements the container call contract: sessions that read and
//! write containers, entries that decode and expose metadata, images that own
//! planes, and encoders. The public wrappers ([`Container`](crate::Container),
//! [`ImageHandle`](crate::ImageHandle), [`PixelBuffer`](crate::PixelBuffer),
//! [`EncoderSession`](crate::EncoderSession)) are generic over an engine and
//! add the binding-level checks on top.
//!
//! Two engines ship with the crate:
//!
//! - [`NativeEngine`]: pure Rust, always available. Stores uncompressed or
//!   PackBits-compressed planes.
//! - `LibHeif` (feature `libheif`): the system libheif library.

use std::path::Path;
use std::sync::Arc;

use crate::config::DecodeOptions;
use crate::error::CodecError;
use crate::format::CompressionFormat;
use crate::limits::Limits;
use crate::metadata::MetadataKind;
use crate::pixel::{Channel, Chroma, Colorspace};
use crate::registry::EncoderDescriptor;
use crate::writer::WriteSink;

#[cfg(feature = "libheif")]
pub mod libheif;
pub mod native;

#[cfg(feature = "libheif")]
pub use self::libheif::LibHeif;
pub use self::native::NativeEngine;

/// Id of an item (image or metadata block) inside one container.
pub type ItemId = u32;

/// Input bytes shared between a session and the entries it hands out.
pub type SharedBytes = Arc<Vec<u8>>;

/// Read access to one plane.
#[derive(Clone, Copy, Debug)]
pub struct PlaneRef<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

/// Write access to one plane.
#[derive(Debug)]
pub struct PlaneMut<'a> {
    pub data: &'a mut [u8],
    pub stride: usize,
}

/// A container codec engine.
pub trait Engine: Sized + 'static {
    type Session: EngineSession<Self>;
    type Entry: EngineEntry<Self>;
    type Image: EngineImage;
    type Encoder: EngineEncoder;

    /// Short name used in log output.
    const NAME: &'static str;

    fn new_session() -> Result<Self::Session, CodecError>;

    fn new_image(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<Self::Image, CodecError>;

    /// Every registered encoder plugin accepted by both filters.
    ///
    /// `CompressionFormat::Undefined` and `None` accept everything; a name
    /// filter is compared with the plugin's `id_name`.
    fn encoder_descriptors(
        format_filter: CompressionFormat,
        name_filter: Option<&str>,
    ) -> Vec<EncoderDescriptor>;

    fn encoder_for_format(format: CompressionFormat) -> Result<Self::Encoder, CodecError>;

    fn encoder_for_descriptor(descriptor: &EncoderDescriptor)
    -> Result<Self::Encoder, CodecError>;
}

/// One container session.
pub trait EngineSession<E: Engine>: Send {
    fn set_limits(&mut self, limits: &Limits);

    fn read_file(&mut self, path: &Path) -> Result<(), CodecError>;

    /// Parse `data`. The session keeps the bytes alive for as long as it or
    /// any entry it hands out needs them.
    fn read_memory(&mut self, data: SharedBytes) -> Result<(), CodecError>;

    fn primary_entry(&self) -> Result<E::Entry, CodecError>;

    fn top_level_ids(&self) -> Vec<ItemId>;

    fn entry(&self, id: ItemId) -> Result<E::Entry, CodecError>;

    /// Encode `image` as a new top-level entry.
    fn encode(
        &mut self,
        image: &E::Image,
        encoder: &mut E::Encoder,
    ) -> Result<E::Entry, CodecError>;

    fn add_metadata(
        &mut self,
        entry: &E::Entry,
        payload: &[u8],
        kind: &MetadataKind,
    ) -> Result<(), CodecError>;

    /// Serialize the container into `sink`, chunk by chunk.
    fn write(&self, sink: &mut dyn WriteSink) -> Result<(), CodecError>;

    fn write_file(&self, path: &Path) -> Result<(), CodecError>;
}

/// One image entry of a session.
pub trait EngineEntry<E: Engine>: Send {
    fn id(&self) -> ItemId;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn has_alpha(&self) -> bool;
    fn luma_bits_per_pixel(&self) -> Option<u8>;
    fn chroma_bits_per_pixel(&self) -> Option<u8>;

    fn decode(
        &self,
        colorspace: Colorspace,
        chroma: Chroma,
        options: &DecodeOptions,
    ) -> Result<E::Image, CodecError>;

    /// Metadata block ids in container order. An empty filter matches all.
    fn metadata_ids(&self, type_filter: &str) -> Vec<ItemId>;
    fn metadata_type(&self, id: ItemId) -> Option<String>;
    fn metadata_content_type(&self, id: ItemId) -> Option<String>;
    fn metadata(&self, id: ItemId) -> Result<Vec<u8>, CodecError>;
}

/// An in-memory image made of planes.
pub trait EngineImage: Send + Sized {
    fn colorspace(&self) -> Colorspace;
    fn chroma(&self) -> Chroma;
    fn has_channel(&self, channel: Channel) -> bool;
    fn width(&self, channel: Channel) -> Option<u32>;
    fn height(&self, channel: Channel) -> Option<u32>;
    fn bit_depth(&self, channel: Channel) -> Option<u8>;

    fn add_plane(
        &mut self,
        channel: Channel,
        width: u32,
        height: u32,
        bit_depth: u8,
    ) -> Result<(), CodecError>;

    fn plane(&self, channel: Channel) -> Option<PlaneRef<'_>>;

    /// `Ok(None)` if the plane is missing or the engine refuses write
    /// access. Fails if the engine cannot make the plane writable.
    fn plane_mut(&mut self, channel: Channel) -> Result<Option<PlaneMut<'_>>, CodecError>;

    fn try_clone(&self) -> Result<Self, CodecError>;
}

/// A configured encoder plugin instance.
pub trait EngineEncoder: Send {
    fn name(&self) -> String;
    fn compression_format(&self) -> CompressionFormat;
    fn set_lossy_quality(&mut self, quality: i32) -> Result<(), CodecError>;
    fn set_lossless(&mut self, enable: bool) -> Result<(), CodecError>;
    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), CodecError>;
    fn parameter_names(&self) -> Vec<String>;
}
