//! In-memory images of the native engine.

use std::sync::Arc;

use crate::engine::{EngineImage, PlaneMut, PlaneRef};
use crate::error::{CodecError, SubCode};
use crate::pixel::{Channel, Chroma, Colorspace};

/// Rows are padded to a whole number of this many pixels.
const ROW_ALIGN_PIXELS: usize = 16;

/// Read-only slice of shared bytes: either a range of a container's input or
/// a plane stored by an encode.
#[derive(Clone, Debug)]
pub(crate) struct SharedSlice {
    buf: Arc<Vec<u8>>,
    range: core::ops::Range<usize>,
}

impl SharedSlice {
    pub fn new(buf: Arc<Vec<u8>>, range: core::ops::Range<usize>) -> Self {
        debug_assert!(range.end <= buf.len());
        Self { buf, range }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self::new(Arc::new(data), 0..len)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.range.clone()]
    }
}

#[derive(Debug)]
enum PlaneData {
    Owned(Vec<u8>),
    /// Shared with the container; copied on first write.
    Shared(SharedSlice),
}

impl PlaneData {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            Self::Shared(shared) => shared.as_slice(),
        }
    }

    /// Copy-on-write. A plane that cannot be copied stays shared.
    fn make_owned(&mut self) -> Result<&mut [u8], CodecError> {
        if let Self::Shared(shared) = &*self {
            let mut owned = try_with_capacity(shared.as_slice().len())?;
            owned.extend_from_slice(shared.as_slice());
            *self = Self::Owned(owned);
        }
        match self {
            Self::Owned(data) => Ok(data.as_mut_slice()),
            Self::Shared(_) => Err(CodecError::out_of_memory("Plane is still shared")),
        }
    }
}

#[derive(Debug)]
pub(crate) struct NativePlane {
    pub channel: Channel,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub stride: usize,
    data: PlaneData,
}

impl NativePlane {
    /// Bytes of sample data in one row.
    pub fn row_bytes(&self, chroma: Chroma) -> usize {
        self.width as usize * chroma.samples_per_pixel() * usize::from(self.bit_depth).div_ceil(8)
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Sample rows without padding.
    pub fn rows(&self, chroma: Chroma) -> impl Iterator<Item = &[u8]> {
        let row_bytes = self.row_bytes(chroma);
        let data = self.data.as_slice();
        (0..self.height as usize).map(move |y| &data[y * self.stride..y * self.stride + row_bytes])
    }

    /// Tightly packed copy of the sample rows.
    pub fn packed(&self, chroma: Chroma) -> Result<Vec<u8>, CodecError> {
        let mut out = try_with_capacity(self.row_bytes(chroma) * self.height as usize)?;
        for row in self.rows(chroma) {
            out.extend_from_slice(row);
        }
        Ok(out)
    }

    /// A plane backed by shared, already packed bytes.
    pub fn shared(
        channel: Channel,
        width: u32,
        height: u32,
        bit_depth: u8,
        stride: usize,
        data: SharedSlice,
    ) -> Self {
        Self {
            channel,
            width,
            height,
            bit_depth,
            stride,
            data: PlaneData::Shared(data),
        }
    }

    /// A plane owning its bytes.
    pub fn owned(
        channel: Channel,
        width: u32,
        height: u32,
        bit_depth: u8,
        stride: usize,
        data: Vec<u8>,
    ) -> Self {
        Self {
            channel,
            width,
            height,
            bit_depth,
            stride,
            data: PlaneData::Owned(data),
        }
    }

    pub fn shared_data(&self) -> Option<&SharedSlice> {
        match &self.data {
            PlaneData::Shared(shared) => Some(shared),
            PlaneData::Owned(_) => None,
        }
    }
}

pub(crate) fn try_with_capacity(len: usize) -> Result<Vec<u8>, CodecError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| CodecError::out_of_memory(format!("Cannot allocate {len} bytes")))?;
    Ok(data)
}

pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>, CodecError> {
    let mut data = try_with_capacity(len)?;
    data.resize(len, 0);
    Ok(data)
}

/// Image owned by the native engine.
#[derive(Debug)]
pub struct NativeImage {
    width: u32,
    height: u32,
    colorspace: Colorspace,
    chroma: Chroma,
    planes: Vec<NativePlane>,
}

impl NativeImage {
    pub(crate) fn new(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!("Invalid image size {width}x{height}"),
            ));
        }
        if colorspace == Colorspace::Undefined || chroma == Chroma::Undefined {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                "Colorspace and chroma must be defined for a new image",
            ));
        }
        Ok(Self {
            width,
            height,
            colorspace,
            chroma,
            planes: Vec::new(),
        })
    }

    pub(crate) fn with_planes(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
        planes: Vec<NativePlane>,
    ) -> Self {
        Self {
            width,
            height,
            colorspace,
            chroma,
            planes,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn planes(&self) -> &[NativePlane] {
        &self.planes
    }

    fn find(&self, channel: Channel) -> Option<&NativePlane> {
        self.planes.iter().find(|p| p.channel == channel)
    }

    fn check_channel(&self, channel: Channel) -> Result<(), CodecError> {
        let allowed = match (self.colorspace, self.chroma) {
            (_, c) if c.is_interleaved() => channel == Channel::Interleaved,
            (Colorspace::YCbCr, _) => {
                matches!(channel, Channel::Y | Channel::Cb | Channel::Cr | Channel::Alpha)
            }
            (Colorspace::Rgb, _) => {
                matches!(channel, Channel::R | Channel::G | Channel::B | Channel::Alpha)
            }
            (Colorspace::Monochrome, _) => matches!(channel, Channel::Y | Channel::Alpha),
            _ => channel != Channel::Interleaved,
        };
        if !allowed {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!(
                    "Channel {} does not belong to a {:?}/{:?} image",
                    channel.name(),
                    self.colorspace,
                    self.chroma
                ),
            ));
        }
        Ok(())
    }
}

impl EngineImage for NativeImage {
    fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    fn chroma(&self) -> Chroma {
        self.chroma
    }

    fn has_channel(&self, channel: Channel) -> bool {
        self.find(channel).is_some()
    }

    fn width(&self, channel: Channel) -> Option<u32> {
        self.find(channel).map(|p| p.width)
    }

    fn height(&self, channel: Channel) -> Option<u32> {
        self.find(channel).map(|p| p.height)
    }

    fn bit_depth(&self, channel: Channel) -> Option<u8> {
        self.find(channel).map(|p| p.bit_depth)
    }

    fn add_plane(
        &mut self,
        channel: Channel,
        width: u32,
        height: u32,
        bit_depth: u8,
    ) -> Result<(), CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!("Invalid plane size {width}x{height}"),
            ));
        }
        if bit_depth == 0 || bit_depth > 16 {
            return Err(CodecError::usage(
                SubCode::UNSUPPORTED_BIT_DEPTH,
                format!("Unsupported bit depth {bit_depth}"),
            ));
        }
        self.check_channel(channel)?;
        if self.has_channel(channel) {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!("Plane {} already exists", channel.name()),
            ));
        }

        let pixel_bytes = self.chroma.samples_per_pixel() * usize::from(bit_depth).div_ceil(8);
        let stride = (width as usize).next_multiple_of(ROW_ALIGN_PIXELS) * pixel_bytes;
        let data = alloc_zeroed(stride * height as usize)?;

        self.planes.push(NativePlane {
            channel,
            width,
            height,
            bit_depth,
            stride,
            data: PlaneData::Owned(data),
        });
        Ok(())
    }

    fn plane(&self, channel: Channel) -> Option<PlaneRef<'_>> {
        self.find(channel).map(|p| PlaneRef {
            data: p.data.as_slice(),
            stride: p.stride,
        })
    }

    fn plane_mut(&mut self, channel: Channel) -> Result<Option<PlaneMut<'_>>, CodecError> {
        let Some(plane) = self.planes.iter_mut().find(|p| p.channel == channel) else {
            return Ok(None);
        };
        let stride = plane.stride;
        Ok(Some(PlaneMut {
            data: plane.data.make_owned()?,
            stride,
        }))
    }

    fn try_clone(&self) -> Result<Self, CodecError> {
        let mut planes = Vec::with_capacity(self.planes.len());
        for plane in &self.planes {
            let data = match &plane.data {
                PlaneData::Shared(shared) => PlaneData::Shared(shared.clone()),
                PlaneData::Owned(data) => {
                    let mut copy = try_with_capacity(data.len())?;
                    copy.extend_from_slice(data);
                    PlaneData::Owned(copy)
                }
            };
            planes.push(NativePlane {
                channel: plane.channel,
                width: plane.width,
                height: plane.height,
                bit_depth: plane.bit_depth,
                stride: plane.stride,
                data,
            });
        }
        Ok(Self::with_planes(
            self.width,
            self.height,
            self.colorspace,
            self.chroma,
            planes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn rows_are_padded_to_sixteen_pixels() {
        let mut img = NativeImage::new(5, 3, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
        img.add_plane(Channel::Interleaved, 5, 3, 8).unwrap();
        let plane = img.plane(Channel::Interleaved).unwrap();
        assert_eq!(plane.stride, 16 * 3);
        assert_eq!(plane.data.len(), 16 * 3 * 3);
        assert!(plane.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn channel_must_fit_layout() {
        let mut img = NativeImage::new(4, 4, Colorspace::YCbCr, Chroma::C420).unwrap();
        img.add_plane(Channel::Y, 4, 4, 8).unwrap();
        img.add_plane(Channel::Cb, 2, 2, 8).unwrap();
        let err = img.add_plane(Channel::R, 4, 4, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
        let err = img.add_plane(Channel::Y, 4, 4, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
        assert!(img.add_plane(Channel::Cr, 2, 2, 17).is_err());
        assert_eq!(img.width(Channel::Cb), Some(2));
        assert_eq!(img.width(Channel::Cr), None);
    }

    #[test]
    fn undefined_layout_is_rejected() {
        assert!(NativeImage::new(4, 4, Colorspace::Undefined, Chroma::C444).is_err());
        assert!(NativeImage::new(0, 4, Colorspace::Rgb, Chroma::C444).is_err());
    }

    #[test]
    fn shared_planes_copy_on_write() {
        let shared = SharedSlice::from_vec(vec![1, 2, 3, 4]);
        let plane = NativePlane::shared(Channel::Y, 2, 2, 8, 2, shared.clone());
        let mut img =
            NativeImage::with_planes(2, 2, Colorspace::Monochrome, Chroma::Monochrome, vec![plane]);
        let copy = img.try_clone().unwrap();
        img.plane_mut(Channel::Y).unwrap().unwrap().data[0] = 9;
        assert_eq!(img.plane(Channel::Y).unwrap().data, [9, 2, 3, 4]);
        assert_eq!(copy.plane(Channel::Y).unwrap().data, [1, 2, 3, 4]);
        assert_eq!(shared.as_slice(), [1, 2, 3, 4]);
        assert!(img.planes()[0].shared_data().is_none());
    }

    #[test]
    fn write_access_failures() {
        let mut img = NativeImage::new(2, 2, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
        assert!(img.plane_mut(Channel::Y).unwrap().is_none());

        // the copy-on-write path reports an allocation it cannot make
        let err = try_with_capacity(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemoryAllocationError);
        let mut data = PlaneData::Owned(vec![5; 4]);
        assert_eq!(data.make_owned().unwrap(), [5, 5, 5, 5]);
    }
}
