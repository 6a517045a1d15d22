//! Metadata blocks attached to images.
//!
//! Reading goes through [`ImageHandle`]; attaching goes through the
//! [`Container`] that encoded the image. Metadata can only be attached to
//! images encoded in the same container.

use crate::container::{Container, ImageHandle};
use crate::engine::{Engine, EngineEntry, EngineSession, ItemId};
use crate::error::{CodecError, SubCode};

/// Item type of EXIF blocks.
pub const EXIF_ITEM_TYPE: &str = "Exif";
/// Item type of XMP blocks.
pub const XMP_ITEM_TYPE: &str = "mime";
/// Content type of XMP blocks.
pub const XMP_CONTENT_TYPE: &str = "application/rdf+xml";

/// What kind of metadata block to attach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataKind {
    /// EXIF data. Stored behind a 4-byte big-endian offset to its TIFF
    /// header.
    Exif,
    /// An XMP packet.
    Xmp,
    /// Any other item type, e.g. `mime` with a custom content type.
    Generic {
        item_type: String,
        content_type: Option<String>,
    },
}

/// One metadata block read from an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataBlock {
    pub id: ItemId,
    pub item_type: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

fn unknown_block(id: ItemId) -> CodecError {
    CodecError::usage(
        SubCode::NONEXISTING_ITEM_REFERENCED,
        format!("Metadata block {id} does not exist"),
    )
}

impl<E: Engine> ImageHandle<E> {
    /// Ids of the metadata blocks whose item type equals `type_filter`, in
    /// container order. An empty filter matches every block.
    pub fn metadata_block_ids(&self, type_filter: &str) -> Vec<ItemId> {
        self.entry.metadata_ids(type_filter)
    }

    /// Fails with `UsageError` for an unknown id.
    pub fn metadata_block_type(&self, id: ItemId) -> Result<String, CodecError> {
        self.entry.metadata_type(id).ok_or_else(|| unknown_block(id))
    }

    /// `None` when the block has no content type.
    pub fn metadata_block_content_type(&self, id: ItemId) -> Result<Option<String>, CodecError> {
        if self.entry.metadata_type(id).is_none() {
            return Err(unknown_block(id));
        }
        Ok(self.entry.metadata_content_type(id))
    }

    /// Payload of one block, exactly as stored.
    pub fn metadata_block(&self, id: ItemId) -> Result<Vec<u8>, CodecError> {
        if self.entry.metadata_type(id).is_none() {
            return Err(unknown_block(id));
        }
        self.entry.metadata(id)
    }

    pub fn metadata_blocks(&self) -> Result<Vec<MetadataBlock>, CodecError> {
        self.entry
            .metadata_ids("")
            .into_iter()
            .map(|id| {
                Ok(MetadataBlock {
                    id,
                    item_type: self.metadata_block_type(id)?,
                    content_type: self.metadata_block_content_type(id)?,
                    data: self.metadata_block(id)?,
                })
            })
            .collect()
    }

    /// The first EXIF block, starting at its TIFF header.
    pub fn exif(&self) -> Result<Option<Vec<u8>>, CodecError> {
        let Some(&id) = self.metadata_block_ids(EXIF_ITEM_TYPE).first() else {
            return Ok(None);
        };
        let block = self.metadata_block(id)?;
        let offset = block
            .get(..4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize);
        match offset.and_then(|offset| block.get(4 + offset..)) {
            Some(tiff) => Ok(Some(tiff.to_vec())),
            None => {
                log::warn!("EXIF block {id} has an invalid TIFF header offset");
                Ok(None)
            }
        }
    }

    /// The first XMP packet.
    pub fn xmp(&self) -> Result<Option<Vec<u8>>, CodecError> {
        let xmp = self
            .metadata_block_ids(XMP_ITEM_TYPE)
            .into_iter()
            .find(|&id| self.entry.metadata_content_type(id).as_deref() == Some(XMP_CONTENT_TYPE));
        xmp.map(|id| self.metadata_block(id)).transpose()
    }
}

impl<E: Engine> Container<E> {
    /// Attach a metadata block to an image this container encoded.
    ///
    /// Fails with `UsageError` for handles from other containers, for
    /// images that were read rather than encoded, and for EXIF data without
    /// a TIFF header.
    pub fn attach_metadata(
        &mut self,
        handle: &ImageHandle<E>,
        data: &[u8],
        kind: MetadataKind,
    ) -> Result<(), CodecError> {
        if !self.owns_encoded(handle) {
            return Err(CodecError::usage(
                SubCode::NONEXISTING_ITEM_REFERENCED,
                format!(
                    "Image {} was not encoded by this container; metadata can only be attached after encoding",
                    handle.id()
                ),
            ));
        }
        log::debug!(
            "{}: attaching {} byte {kind:?} block to image {}",
            E::NAME,
            data.len(),
            handle.id()
        );
        self.session.add_metadata(&handle.entry, data, &kind)
    }

    pub fn add_exif_metadata(
        &mut self,
        handle: &ImageHandle<E>,
        data: &[u8],
    ) -> Result<(), CodecError> {
        self.attach_metadata(handle, data, MetadataKind::Exif)
    }

    pub fn add_xmp_metadata(
        &mut self,
        handle: &ImageHandle<E>,
        data: &[u8],
    ) -> Result<(), CodecError> {
        self.attach_metadata(handle, data, MetadataKind::Xmp)
    }

    pub fn add_generic_metadata(
        &mut self,
        handle: &ImageHandle<E>,
        data: &[u8],
        item_type: &str,
        content_type: Option<&str>,
    ) -> Result<(), CodecError> {
        let kind = MetadataKind::Generic {
            item_type: item_type.to_owned(),
            content_type: content_type.map(str::to_owned),
        };
        self.attach_metadata(handle, data, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::format::CompressionFormat;
    use crate::image::PixelBuffer;
    use crate::pixel::{Channel, Chroma, Colorspace};
    use crate::EncoderSession;

    const EXIF: &[u8] = b"Exif\0\0II*\0\x08\0\0\0";

    fn encoded() -> (Container, ImageHandle) {
        let mut buffer =
            PixelBuffer::new(2, 2, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
        buffer.add_plane(Channel::Y, 2, 2, 8).unwrap();
        let mut container = Container::new();
        let handle = EncoderSession::new(CompressionFormat::Uncompressed)
            .unwrap()
            .encode(&mut container, &buffer, "")
            .unwrap();
        (container, handle)
    }

    #[test]
    fn attach_and_list() {
        let (mut container, handle) = encoded();
        container.add_exif_metadata(&handle, EXIF).unwrap();
        container.add_xmp_metadata(&handle, b"<x/>").unwrap();
        container
            .add_generic_metadata(&handle, b"{}", "mime", Some("application/json"))
            .unwrap();

        assert_eq!(handle.metadata_block_ids("").len(), 3);
        assert_eq!(handle.metadata_block_ids("mime").len(), 2);
        assert_eq!(handle.metadata_block_ids("Exif").len(), 1);
        assert!(handle.metadata_block_ids("exif").is_empty());
        assert_eq!(handle.exif().unwrap().as_deref(), Some(&EXIF[6..]));
        assert_eq!(handle.xmp().unwrap().as_deref(), Some(&b"<x/>"[..]));

        let blocks = handle.metadata_blocks().unwrap();
        assert_eq!(blocks[2].content_type.as_deref(), Some("application/json"));
        assert_eq!(blocks[2].data, b"{}");
        assert_eq!(blocks[0].item_type, EXIF_ITEM_TYPE);
        assert_eq!(blocks[0].content_type, None);
    }

    #[test]
    fn unknown_block_is_usage_error() {
        let (_, handle) = encoded();
        for err in [
            handle.metadata_block(42).unwrap_err(),
            handle.metadata_block_type(42).unwrap_err(),
            handle.metadata_block_content_type(42).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::UsageError);
        }
        assert_eq!(handle.exif().unwrap(), None);
    }

    #[test]
    fn only_own_encodes_accept_metadata() {
        let (mut container, handle) = encoded();
        let (mut other, _) = encoded();
        let err = other.add_xmp_metadata(&handle, b"<x/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);

        let mut read = Container::from_bytes(container.write_to_bytes().unwrap()).unwrap();
        let read_handle = read.primary_image_handle().unwrap();
        assert!(read.add_xmp_metadata(&read_handle, b"<x/>").is_err());

        let err = container.add_exif_metadata(&handle, b"no tiff").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
        assert!(handle.metadata_block_ids("").is_empty());
    }
}
