//! # heifkit
//!
//! Safe binding layer over a HEIF-family container codec engine.
//!
//! Containers hand out image handles; handles decode into pixel buffers;
//! pixel buffers expose each plane as a zero-copy [`BufferView`] with a
//! shape, strides and item size any array consumer understands. The write
//! path encodes pixel buffers into a container, attaches metadata and
//! streams the result into memory or a file.
//!
//! The engine sits behind the [`engine::Engine`] trait. The pure Rust
//! [`NativeEngine`] is always available and is the default type parameter
//! everywhere; the `libheif` feature adds `LibHeif`, backed by the system
//! libheif library.
//!
//! ```toml
//! [dependencies]
//! heifkit = { version = "0.1", features = ["libheif"] }
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use heifkit::{Channel, Chroma, Colorspace, CompressionFormat, Container, EncoderSession, PixelBuffer};
//!
//! // Build an 8x8 gray image
//! let mut buffer = PixelBuffer::new(8, 8, Colorspace::Monochrome, Chroma::Monochrome)?;
//! buffer.add_plane(Channel::Y, 8, 8, 8)?;
//! buffer.plane_mut(Channel::Y)?.fill(128)?;
//!
//! // Encode and serialize
//! let mut container = Container::new();
//! let handle = EncoderSession::new(CompressionFormat::Uncompressed)?
//!     .encode(&mut container, &buffer, "packbits")?;
//! container.add_xmp_metadata(&handle, b"<x:xmpmeta/>")?;
//! let bytes = container.write_to_bytes()?;
//!
//! // Read back and view the luma plane
//! let container = Container::from_bytes(bytes)?;
//! let decoded = container
//!     .primary_image_handle()?
//!     .decode(Colorspace::Undefined, Chroma::Undefined)?;
//! let luma = decoded.plane(Channel::Y)?;
//! assert_eq!(luma.shape(), &[8, 8]);
//! assert_eq!(luma.sample(7, 7, 0), Some(128));
//! # Ok::<(), heifkit::CodecError>(())
//! ```

#![deny(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]

mod config;
mod container;
mod decode;
mod encode;
pub mod engine;
mod error;
mod format;
mod image;
mod limits;
mod metadata;
pub mod pixel;
mod registry;
mod view;
mod writer;

pub use config::{DecodeOptions, EncoderConfig};
pub use container::{Container, ImageHandle, Source};
pub use decode::DecodeRequest;
pub use encode::EncoderSession;
pub use engine::{ItemId, NativeEngine};
#[cfg(feature = "libheif")]
pub use engine::LibHeif;
pub use error::{CodecError, ErrorKind, SubCode};
pub use format::{CompressionFormat, FileBrand, is_heif_extension};
pub use image::PixelBuffer;
pub use limits::Limits;
pub use metadata::{
    EXIF_ITEM_TYPE, MetadataBlock, MetadataKind, XMP_CONTENT_TYPE, XMP_ITEM_TYPE,
};
pub use pixel::{ByteOrder, Channel, Chroma, Colorspace};
pub use registry::{EncoderDescriptor, list_descriptors};
pub use view::{BufferView, BufferViewMut, ViewLayout};
pub use writer::{ByteAccumulator, WriteSink};
