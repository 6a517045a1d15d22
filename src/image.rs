//! Pixel buffers: engine images made of planes.

use core::fmt;

use crate::engine::{Engine, EngineImage, NativeEngine};
use crate::error::{CodecError, SubCode};
use crate::pixel::{Channel, Chroma, Colorspace};
use crate::view::{BufferView, BufferViewMut, ViewLayout};

/// An image in memory: zero or more planes in one colorspace and chroma
/// layout.
///
/// Produced by [`ImageHandle::decode`](crate::ImageHandle::decode) or built
/// by hand with [`PixelBuffer::new`] and [`add_plane`](Self::add_plane).
/// Plane memory lives exactly as long as the buffer; views borrow it.
///
/// # Example
///
/// ```
/// use heifkit::{Channel, Chroma, Colorspace, PixelBuffer};
///
/// let mut buffer = PixelBuffer::new(8, 8, Colorspace::Monochrome, Chroma::Monochrome)?;
/// buffer.add_plane(Channel::Y, 8, 8, 8)?;
/// buffer.plane_mut(Channel::Y)?.fill(128)?;
///
/// let view = buffer.plane(Channel::Y)?;
/// assert_eq!(view.shape(), &[8, 8]);
/// assert!(view.rows().flatten().all(|&v| v == 128));
/// # Ok::<(), heifkit::CodecError>(())
/// ```
pub struct PixelBuffer<E: Engine = NativeEngine> {
    image: E::Image,
}

impl PixelBuffer<NativeEngine> {
    /// Create an empty native buffer. Planes are added with
    /// [`add_plane`](Self::add_plane).
    ///
    /// Fails with `UsageError` for a zero size or an undefined colorspace or
    /// chroma.
    pub fn new(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<Self, CodecError> {
        Self::create(width, height, colorspace, chroma)
    }
}

impl<E: Engine> PixelBuffer<E> {
    /// Create an empty buffer for engine `E`.
    pub fn create(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            image: E::new_image(width, height, colorspace, chroma)?,
        })
    }

    pub(crate) fn from_image(image: E::Image) -> Self {
        Self { image }
    }

    pub(crate) fn image(&self) -> &E::Image {
        &self.image
    }

    pub fn colorspace(&self) -> Colorspace {
        self.image.colorspace()
    }

    pub fn chroma(&self) -> Chroma {
        self.image.chroma()
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.image.has_channel(channel)
    }

    /// Channels that have a plane, in [`Channel::ALL`] order.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|&c| self.image.has_channel(c))
            .collect()
    }

    /// Plane width, `None` if the channel has no plane.
    pub fn width(&self, channel: Channel) -> Option<u32> {
        self.image.width(channel)
    }

    pub fn height(&self, channel: Channel) -> Option<u32> {
        self.image.height(channel)
    }

    pub fn bit_depth(&self, channel: Channel) -> Option<u8> {
        self.image.bit_depth(channel)
    }

    /// Allocate a zeroed plane for `channel`.
    ///
    /// Fails with `UsageError` if the channel already has a plane, does not
    /// belong to the buffer's layout, or the bit depth is outside 1..=16.
    pub fn add_plane(
        &mut self,
        channel: Channel,
        width: u32,
        height: u32,
        bit_depth: u8,
    ) -> Result<(), CodecError> {
        self.image.add_plane(channel, width, height, bit_depth)
    }

    /// Chroma, width, height and bit depth of one plane.
    fn geometry(&self, channel: Channel) -> Result<(Chroma, u32, u32, u8), CodecError> {
        let missing = || missing_plane(channel);
        Ok((
            self.image.chroma(),
            self.image.width(channel).ok_or_else(missing)?,
            self.image.height(channel).ok_or_else(missing)?,
            self.image.bit_depth(channel).ok_or_else(missing)?,
        ))
    }

    /// Read-only view of one plane.
    ///
    /// Fails with `InvalidInput` if the channel has no plane.
    pub fn plane(&self, channel: Channel) -> Result<BufferView<'_>, CodecError> {
        let (chroma, width, height, depth) = self.geometry(channel)?;
        let plane = self.image.plane(channel).ok_or_else(|| missing_plane(channel))?;
        let layout = ViewLayout::new(chroma, width, height, depth, plane.stride)?;
        BufferView::new(plane.data, layout)
    }

    /// Writable view of one plane.
    ///
    /// Fails with `InvalidInput` if the channel has no plane, with
    /// `MemoryAllocationError` if a plane shared with its container cannot be
    /// copied and with `UsageError` if the engine hands the plane out
    /// read-only.
    pub fn plane_mut(&mut self, channel: Channel) -> Result<BufferViewMut<'_>, CodecError> {
        let (chroma, width, height, depth) = self.geometry(channel)?;
        let plane = self.image.plane_mut(channel)?.ok_or_else(|| {
            CodecError::usage(
                SubCode::UNSPECIFIED,
                format!("Plane {} is read-only", channel.name()),
            )
        })?;
        let layout = ViewLayout::new(chroma, width, height, depth, plane.stride)?;
        BufferViewMut::new(plane.data, layout)
    }

    /// Independent copy with its own plane memory.
    pub fn try_clone(&self) -> Result<Self, CodecError> {
        Ok(Self {
            image: self.image.try_clone()?,
        })
    }
}

fn missing_plane(channel: Channel) -> CodecError {
    CodecError::invalid_input(
        SubCode::NONEXISTING_IMAGE_CHANNEL_REFERENCED,
        format!("Image has no {} plane", channel.name()),
    )
}

impl<E: Engine> fmt::Debug for PixelBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("engine", &E::NAME)
            .field("colorspace", &self.colorspace())
            .field("chroma", &self.chroma())
            .field("channels", &self.channels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn interleaved_plane_has_three_dims() {
        let mut buffer = PixelBuffer::new(5, 2, Colorspace::Rgb, Chroma::InterleavedRgba).unwrap();
        buffer.add_plane(Channel::Interleaved, 5, 2, 8).unwrap();
        let view = buffer.plane(Channel::Interleaved).unwrap();
        assert_eq!(view.ndim(), 3);
        assert_eq!(view.shape(), &[2, 5, 4]);
        assert_eq!(view.strides()[1..], [4, 1]);
        assert!(view.strides()[0] >= 20);
        assert_eq!(buffer.channels(), [Channel::Interleaved]);
    }

    #[test]
    fn missing_plane_is_invalid_input() {
        let buffer = PixelBuffer::new(4, 4, Colorspace::YCbCr, Chroma::C420).unwrap();
        let err = buffer.plane(Channel::Y).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.subcode(), SubCode::NONEXISTING_IMAGE_CHANNEL_REFERENCED);
    }

    #[test]
    fn writes_go_to_the_plane() {
        let mut buffer =
            PixelBuffer::new(4, 2, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
        buffer.add_plane(Channel::Y, 4, 2, 12).unwrap();
        {
            let mut view = buffer.plane_mut(Channel::Y).unwrap();
            assert_eq!(view.item_size(), 2);
            view.set_sample(1, 3, 0, 4095).unwrap();
        }
        let view = buffer.plane(Channel::Y).unwrap();
        assert_eq!(view.sample(1, 3, 0), Some(4095));
        assert_eq!(view.format(), "H");
    }

    #[test]
    fn clone_is_independent() {
        let mut buffer =
            PixelBuffer::new(2, 2, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
        buffer.add_plane(Channel::Y, 2, 2, 8).unwrap();
        let copy = buffer.try_clone().unwrap();
        buffer.plane_mut(Channel::Y).unwrap().fill(9).unwrap();
        assert_eq!(copy.plane(Channel::Y).unwrap().sample(0, 0, 0), Some(0));
        assert_eq!(buffer.plane(Channel::Y).unwrap().sample(0, 0, 0), Some(9));
    }
}
