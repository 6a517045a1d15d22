//! Containers and the image handles they hand out.

use core::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::decode::DecodeRequest;
use crate::engine::native::NativeSession;
use crate::engine::{Engine, EngineEntry, EngineSession, ItemId, NativeEngine};
use crate::error::{CodecError, SubCode};
use crate::image::PixelBuffer;
use crate::limits::Limits;
use crate::pixel::{Chroma, Colorspace};
use crate::writer::{ByteAccumulator, WriteSink};

/// Distinguishes containers so handles can be traced back to their owner.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Where the container's content came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Created empty; filled by encodes.
    Empty,
    File(PathBuf),
    /// Read from memory; holds the input length.
    Memory(usize),
}

/// A HEIF-family container: one engine session.
///
/// Either read once from a file or memory, or created empty and filled with
/// [`EncoderSession::encode`](crate::EncoderSession::encode). Image handles
/// keep the parts of the session they need alive, so they may outlive the
/// container.
///
/// # Example
///
/// ```
/// use heifkit::{Channel, Chroma, Colorspace, CompressionFormat, Container, EncoderSession, PixelBuffer};
///
/// let mut buffer = PixelBuffer::new(8, 8, Colorspace::Monochrome, Chroma::Monochrome)?;
/// buffer.add_plane(Channel::Y, 8, 8, 8)?;
///
/// let mut container = Container::new();
/// let mut encoder = EncoderSession::new(CompressionFormat::Uncompressed)?;
/// encoder.encode(&mut container, &buffer, "")?;
/// let bytes = container.write_to_bytes()?;
///
/// let copy = Container::from_bytes(bytes)?;
/// assert_eq!(copy.top_level_image_ids(), container.top_level_image_ids());
/// # Ok::<(), heifkit::CodecError>(())
/// ```
pub struct Container<E: Engine = NativeEngine> {
    pub(crate) session: E::Session,
    pub(crate) token: u64,
    source: Source,
    /// Entries produced by this container's own encodes.
    pub(crate) encoded: Vec<ItemId>,
    limits: Limits,
}

impl Container<NativeEngine> {
    /// An empty native container.
    pub fn new() -> Self {
        Self::with_session(NativeSession::new())
    }

    /// Read a native container from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let mut container = Self::new();
        container.read_from_file(path)?;
        Ok(container)
    }

    /// Read a native container from memory. A `Vec<u8>` is taken over
    /// without copying.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self, CodecError> {
        let mut container = Self::new();
        container.read_from_memory(data)?;
        Ok(container)
    }
}

impl Default for Container<NativeEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Container<E> {
    /// An empty container backed by engine `E`.
    pub fn create() -> Result<Self, CodecError> {
        Ok(Self::with_session(E::new_session()?))
    }

    fn with_session(session: E::Session) -> Self {
        Self {
            session,
            token: next_token(),
            source: Source::Empty,
            encoded: Vec::new(),
            limits: Limits::none(),
        }
    }

    /// Apply resource limits to later reads and decodes.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.session.set_limits(&limits);
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    fn ensure_unread(&self) -> Result<(), CodecError> {
        if self.source != Source::Empty || !self.encoded.is_empty() {
            return Err(CodecError::usage(
                SubCode::UNSPECIFIED,
                "Container already holds content; read into a new container",
            ));
        }
        Ok(())
    }

    /// Parse the container stored at `path`.
    ///
    /// Fails with `InputDoesNotExist` if the file cannot be read,
    /// `InvalidInput` or `UnsupportedFiletype` if it is not a container this
    /// engine understands, and `UsageError` if this container was already
    /// read or written to.
    pub fn read_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), CodecError> {
        let path = path.as_ref();
        self.ensure_unread()?;
        log::debug!("{}: reading {}", E::NAME, path.display());
        self.session.read_file(path)?;
        self.source = Source::File(path.to_path_buf());
        Ok(())
    }

    /// Parse a container held in memory.
    ///
    /// The container owns the bytes from here on. Passing a `Vec<u8>` moves
    /// it without a copy; a slice is copied once.
    pub fn read_from_memory(&mut self, data: impl Into<Vec<u8>>) -> Result<(), CodecError> {
        self.ensure_unread()?;
        let data = Arc::new(data.into());
        let len = data.len();
        log::debug!("{}: reading {len} bytes from memory", E::NAME);
        self.session.read_memory(data)?;
        self.source = Source::Memory(len);
        Ok(())
    }

    fn handle(&self, entry: E::Entry) -> ImageHandle<E> {
        ImageHandle {
            entry,
            owner: self.token,
            limits: self.limits.clone(),
        }
    }

    /// The entry marked primary.
    ///
    /// Fails with `InvalidInput` when no entry is marked primary.
    pub fn primary_image_handle(&self) -> Result<ImageHandle<E>, CodecError> {
        Ok(self.handle(self.session.primary_entry()?))
    }

    /// Ids of the top-level images, in container order.
    pub fn top_level_image_ids(&self) -> Vec<ItemId> {
        self.session.top_level_ids()
    }

    pub fn number_of_top_level_images(&self) -> usize {
        self.session.top_level_ids().len()
    }

    /// Fails with `UsageError` if `id` is not a top-level image.
    pub fn image_handle(&self, id: ItemId) -> Result<ImageHandle<E>, CodecError> {
        if !self.session.top_level_ids().contains(&id) {
            return Err(CodecError::usage(
                SubCode::NONEXISTING_ITEM_REFERENCED,
                format!("Image item {id} does not exist"),
            ));
        }
        Ok(self.handle(self.session.entry(id)?))
    }

    /// Resolve every top-level image in container order.
    pub fn top_level_image_handles(
        &self,
    ) -> impl Iterator<Item = Result<ImageHandle<E>, CodecError>> + '_ {
        self.session
            .top_level_ids()
            .into_iter()
            .map(move |id| self.image_handle(id))
    }

    fn ensure_not_empty(&self) -> Result<(), CodecError> {
        if self.session.top_level_ids().is_empty() {
            return Err(CodecError::usage(
                SubCode::UNSPECIFIED,
                "Container holds no image to write",
            ));
        }
        Ok(())
    }

    /// Stream the container into `sink`, in order, chunk by chunk.
    pub fn write_to(&self, sink: &mut dyn WriteSink) -> Result<(), CodecError> {
        self.ensure_not_empty()?;
        self.session.write(sink)
    }

    /// Serialize the container into one contiguous buffer.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = ByteAccumulator::new();
        self.write_to(&mut out)?;
        log::debug!(
            "{}: wrote {} bytes in {} chunk(s)",
            E::NAME,
            out.len(),
            out.chunk_count()
        );
        Ok(out.into_bytes())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), CodecError> {
        let path = path.as_ref();
        self.ensure_not_empty()?;
        log::debug!("{}: writing {}", E::NAME, path.display());
        self.session.write_file(path)
    }

    /// Record an entry produced by this container's encode.
    pub(crate) fn adopt(&mut self, entry: E::Entry) -> ImageHandle<E> {
        self.encoded.push(entry.id());
        self.handle(entry)
    }

    /// Whether `handle` came from this container's own encode.
    pub(crate) fn owns_encoded(&self, handle: &ImageHandle<E>) -> bool {
        handle.owner == self.token && self.encoded.contains(&handle.id())
    }
}

impl<E: Engine> fmt::Debug for Container<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("engine", &E::NAME)
            .field("source", &self.source)
            .field("images", &self.session.top_level_ids())
            .field("encoded", &self.encoded)
            .finish()
    }
}

/// One top-level image of a container.
///
/// Carries the limits of the container it came from into decodes.
pub struct ImageHandle<E: Engine = NativeEngine> {
    pub(crate) entry: E::Entry,
    owner: u64,
    limits: Limits,
}

impl<E: Engine> ImageHandle<E> {
    pub fn id(&self) -> ItemId {
        self.entry.id()
    }

    pub fn width(&self) -> u32 {
        self.entry.width()
    }

    pub fn height(&self) -> u32 {
        self.entry.height()
    }

    pub fn has_alpha_channel(&self) -> bool {
        self.entry.has_alpha()
    }

    /// Bits per luma sample, `None` if the engine does not know.
    pub fn luma_bits_per_pixel(&self) -> Option<u8> {
        self.entry.luma_bits_per_pixel()
    }

    /// Bits per chroma sample, `None` for monochrome images.
    pub fn chroma_bits_per_pixel(&self) -> Option<u8> {
        self.entry.chroma_bits_per_pixel()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Decode into `colorspace` / `chroma`. `Undefined` keeps the stored
    /// layout. See [`DecodeRequest`] for options.
    pub fn decode(
        &self,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<PixelBuffer<E>, CodecError> {
        DecodeRequest::new(self)
            .with_colorspace(colorspace)
            .with_chroma(chroma)
            .decode()
    }
}

impl<E: Engine> fmt::Debug for ImageHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("engine", &E::NAME)
            .field("id", &self.id())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("has_alpha", &self.has_alpha_channel())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::format::CompressionFormat;
    use crate::pixel::Channel;
    use crate::EncoderSession;

    fn one_image() -> Container {
        let mut buffer =
            PixelBuffer::new(3, 2, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
        buffer.add_plane(Channel::Y, 3, 2, 8).unwrap();
        let mut container = Container::new();
        EncoderSession::new(CompressionFormat::Uncompressed)
            .unwrap()
            .encode(&mut container, &buffer, "")
            .unwrap();
        container
    }

    #[test]
    fn empty_container() {
        let container = Container::new();
        assert!(container.top_level_image_ids().is_empty());
        assert_eq!(container.number_of_top_level_images(), 0);
        let err = container.primary_image_handle().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = container.write_to_bytes().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
    }

    #[test]
    fn second_read_is_refused() {
        let bytes = one_image().write_to_bytes().unwrap();
        let mut container = Container::from_bytes(bytes.as_slice()).unwrap();
        assert_eq!(container.source(), &Source::Memory(bytes.len()));
        let err = container.read_from_memory(bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);

        let err = one_image().read_from_memory(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
    }

    #[test]
    fn failed_read_leaves_container_empty() {
        let mut container = Container::new();
        assert!(container.read_from_memory(b"garbage".as_slice()).is_err());
        assert_eq!(container.source(), &Source::Empty);
        let bytes = one_image().write_to_bytes().unwrap();
        container.read_from_memory(bytes).unwrap();
        assert_eq!(container.number_of_top_level_images(), 1);
    }

    #[test]
    fn unknown_id_is_usage_error() {
        let container = one_image();
        let err = container.image_handle(99).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
        let handles: Vec<_> = container.top_level_image_handles().collect();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].as_ref().unwrap().width(), 3);
    }

    #[test]
    fn handle_outlives_container() {
        let handle = one_image().primary_image_handle().unwrap();
        let buffer = handle
            .decode(Colorspace::Undefined, Chroma::Undefined)
            .unwrap();
        assert_eq!(buffer.width(Channel::Y), Some(3));
    }

    #[test]
    fn missing_file_does_not_exist() {
        let err = Container::from_file("/nonexistent/heifkit/input.heic").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputDoesNotExist);
    }
}
