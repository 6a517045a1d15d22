//! Encoder plugin registry queries.

use crate::engine::Engine;
use crate::format::CompressionFormat;

/// One encoder plugin registered with an engine.
///
/// A snapshot: holding it does not keep anything inside the engine alive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncoderDescriptor {
    /// Short stable identifier, e.g. `x265`, `aom` or `unci`.
    pub id_name: String,
    /// Human-readable name, often with a version.
    pub name: String,
    pub compression_format: CompressionFormat,
    pub supports_lossy: bool,
    pub supports_lossless: bool,
}

impl EncoderDescriptor {
    pub fn id_name(&self) -> &str {
        &self.id_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression_format(&self) -> CompressionFormat {
        self.compression_format
    }

    pub fn supports_lossy_compression(&self) -> bool {
        self.supports_lossy
    }

    pub fn supports_lossless_compression(&self) -> bool {
        self.supports_lossless
    }

    /// Whether this descriptor passes the same filters
    /// [`list_descriptors`] applies.
    pub fn matches(&self, format_filter: CompressionFormat, name_filter: Option<&str>) -> bool {
        format_filter.matches(self.compression_format)
            && name_filter.is_none_or(|name| name.is_empty() || name == self.id_name)
    }
}

/// List the encoder plugins of engine `E` accepted by both filters.
///
/// `CompressionFormat::Undefined` accepts every format; `None` or an empty
/// name accepts every plugin. Never fails: no match gives an empty list.
///
/// ```
/// use heifkit::{CompressionFormat, NativeEngine, list_descriptors};
///
/// let unci = list_descriptors::<NativeEngine>(CompressionFormat::Uncompressed, None);
/// assert!(unci.iter().all(|d| d.compression_format() == CompressionFormat::Uncompressed));
/// ```
pub fn list_descriptors<E: Engine>(
    format_filter: CompressionFormat,
    name_filter: Option<&str>,
) -> Vec<EncoderDescriptor> {
    let name_filter = name_filter.filter(|name| !name.is_empty());
    let descriptors = E::encoder_descriptors(format_filter, name_filter);
    log::debug!(
        "{}: {} encoder(s) for format {:?}, name {:?}",
        E::NAME,
        descriptors.len(),
        format_filter,
        name_filter
    );
    descriptors
}
