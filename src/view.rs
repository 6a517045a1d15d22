//! Zero-copy views over pixel buffer planes.
//!
//! A plane is a stride-based block of rows owned by the engine. [`ViewLayout`]
//! turns the engine's description of a plane (width, height, bit depth,
//! stride and the buffer's chroma layout) into the shape/strides/item-size
//! triple that array consumers understand:
//!
//! | chroma layout                          | ndim | shape       | strides (bytes)          |
//! |----------------------------------------|------|-------------|--------------------------|
//! | monochrome, 4:2:0, 4:2:2, 4:4:4        | 2    | `(h, w)`    | `(stride, item)`         |
//! | interleaved RGB / RRGGBB               | 3    | `(h, w, 3)` | `(stride, 3*item, item)` |
//! | interleaved RGBA / RRGGBBAA            | 3    | `(h, w, 4)` | `(stride, 4*item, item)` |
//!
//! `item` is `ceil(bit_depth / 8)`. The row stride is always the engine's
//! value because rows may be padded.
//!
//! [`BufferView`] and [`BufferViewMut`] borrow the owning
//! [`PixelBuffer`](crate::PixelBuffer), so they cannot outlive it and the
//! buffer cannot change while a view is alive.

use bytemuck::Pod;
use imgref::{Img, ImgRef, ImgRefMut};

use crate::error::{CodecError, SubCode};
use crate::pixel::{ByteOrder, Chroma};

/// Shape, strides and item size of one plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewLayout {
    ndim: usize,
    shape: [usize; 3],
    strides: [usize; 3],
    item_size: usize,
    bit_depth: u8,
    byte_order: ByteOrder,
}

impl ViewLayout {
    /// Compute the layout of a `width` x `height` plane.
    ///
    /// Fails with `InvalidInput` if the bit depth is outside 1..=16 or the
    /// stride is shorter than one row.
    pub fn new(
        chroma: Chroma,
        width: u32,
        height: u32,
        bit_depth: u8,
        stride: usize,
    ) -> Result<Self, CodecError> {
        if bit_depth == 0 || bit_depth > 16 {
            return Err(CodecError::invalid_input(
                SubCode::UNSUPPORTED_BIT_DEPTH,
                format!("Unsupported bit depth {bit_depth}"),
            ));
        }
        let item_size = usize::from(bit_depth).div_ceil(8);
        let channels = chroma.samples_per_pixel();
        let (width, height) = (width as usize, height as usize);

        let row_bytes = width * channels * item_size;
        if stride < row_bytes {
            return Err(CodecError::invalid_input(
                SubCode::UNSPECIFIED,
                format!("Plane stride {stride} is shorter than a row of {row_bytes} bytes"),
            ));
        }

        let (ndim, shape, strides) = if channels > 1 {
            (
                3,
                [height, width, channels],
                [stride, channels * item_size, item_size],
            )
        } else {
            (2, [height, width, 1], [stride, item_size, 0])
        };

        Ok(Self {
            ndim,
            shape,
            strides,
            item_size,
            bit_depth,
            byte_order: chroma.byte_order(),
        })
    }

    /// 2 for single-channel planes, 3 for interleaved planes.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape[..self.ndim]
    }

    /// Byte strides, one per axis.
    pub fn strides(&self) -> &[usize] {
        &self.strides[..self.ndim]
    }

    /// Bytes per sample: 1 or 2.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Samples per pixel.
    pub fn channels(&self) -> usize {
        if self.ndim == 3 { self.shape[2] } else { 1 }
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    /// Bytes between the starts of consecutive rows.
    pub fn row_stride(&self) -> usize {
        self.strides[0]
    }

    /// Bytes of sample data in one row, padding excluded.
    pub fn row_bytes(&self) -> usize {
        self.width() * self.channels() * self.item_size
    }

    /// Buffer-protocol format character: `"B"` for bytes, `"H"` for u16.
    pub fn format(&self) -> &'static str {
        if self.item_size == 1 { "B" } else { "H" }
    }

    /// Smallest buffer length that holds every sample.
    pub fn required_len(&self) -> usize {
        match self.height() {
            0 => 0,
            h => (h - 1) * self.row_stride() + self.row_bytes(),
        }
    }

    fn offset(&self, y: usize, x: usize, c: usize) -> Option<usize> {
        if y >= self.height() || x >= self.width() || c >= self.channels() {
            return None;
        }
        Some(y * self.row_stride() + (x * self.channels() + c) * self.item_size)
    }

    fn row_range(&self, y: usize) -> Option<core::ops::Range<usize>> {
        if y >= self.height() {
            return None;
        }
        let start = y * self.row_stride();
        Some(start..start + self.row_bytes())
    }

    fn read_sample(&self, data: &[u8], offset: usize) -> u16 {
        if self.item_size == 1 {
            return u16::from(data[offset]);
        }
        let bytes = [data[offset], data[offset + 1]];
        match self.byte_order {
            ByteOrder::Native => u16::from_ne_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }

    fn write_sample(&self, data: &mut [u8], offset: usize, value: u16) {
        if self.item_size == 1 {
            data[offset] = value as u8;
            return;
        }
        let bytes = match self.byte_order {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        };
        data[offset..offset + 2].copy_from_slice(&bytes);
    }

    fn check_value(&self, value: u16) -> Result<(), CodecError> {
        if u32::from(value) >= 1u32 << self.bit_depth {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!(
                    "Sample value {value} does not fit in {} bits",
                    self.bit_depth
                ),
            ));
        }
        Ok(())
    }

    /// Element stride of `T` for a typed 2D view.
    fn typed_stride<T: Pod>(&self) -> Result<usize, CodecError> {
        let px = core::mem::size_of::<T>();
        if px != self.channels() * self.item_size {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!(
                    "Pixel type of {px} bytes does not match {} bytes per pixel",
                    self.channels() * self.item_size
                ),
            ));
        }
        if self.item_size == 2 && !host_order(self.byte_order) {
            return Err(CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                "Typed access needs samples in host byte order",
            ));
        }
        if self.row_stride() % px != 0 {
            return Err(CodecError::invalid_input(
                SubCode::UNSPECIFIED,
                format!(
                    "Plane stride {} is not a multiple of the pixel size {px}",
                    self.row_stride()
                ),
            ));
        }
        Ok(self.row_stride() / px)
    }
}

fn host_order(order: ByteOrder) -> bool {
    match order {
        ByteOrder::Native => true,
        ByteOrder::Big => cfg!(target_endian = "big"),
        ByteOrder::Little => cfg!(target_endian = "little"),
    }
}

fn check_len(data_len: usize, layout: &ViewLayout) -> Result<(), CodecError> {
    if data_len < layout.required_len() {
        return Err(CodecError::invalid_input(
            SubCode::END_OF_DATA,
            format!(
                "Plane holds {data_len} bytes, layout needs {}",
                layout.required_len()
            ),
        ));
    }
    Ok(())
}

fn cast_error(err: bytemuck::PodCastError) -> CodecError {
    CodecError::invalid_input(
        SubCode::UNSPECIFIED,
        format!("Plane memory cannot be viewed as the pixel type: {err:?}"),
    )
}

/// Read-only view of one plane.
#[derive(Clone, Copy, Debug)]
pub struct BufferView<'a> {
    data: &'a [u8],
    layout: ViewLayout,
}

impl<'a> BufferView<'a> {
    pub(crate) fn new(data: &'a [u8], layout: ViewLayout) -> Result<Self, CodecError> {
        check_len(data.len(), &layout)?;
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> &ViewLayout {
        &self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    pub fn item_size(&self) -> usize {
        self.layout.item_size()
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn format(&self) -> &'static str {
        self.layout.format()
    }

    pub fn readonly(&self) -> bool {
        true
    }

    /// The whole plane memory, row padding included.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Sample bytes of row `y`, padding excluded.
    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        let data = self.data;
        self.layout.row_range(y).map(|range| &data[range])
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let data = self.data;
        let layout = self.layout;
        (0..layout.height()).filter_map(move |y| layout.row_range(y).map(|range| &data[range]))
    }

    /// Sample at row `y`, column `x`, channel `c`.
    pub fn sample(&self, y: usize, x: usize, c: usize) -> Option<u16> {
        let offset = self.layout.offset(y, x, c)?;
        Some(self.layout.read_sample(self.data, offset))
    }

    /// Copy the samples into a tightly packed buffer.
    pub fn to_packed_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.layout.row_bytes() * self.layout.height());
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    /// Typed 2D view, e.g. `as_imgref::<Rgb<u8>>()` for interleaved RGB or
    /// `as_imgref::<u16>()` for a high bit depth planar channel.
    pub fn as_imgref<T: Pod>(&self) -> Result<ImgRef<'a, T>, CodecError> {
        let stride = self.layout.typed_stride::<T>()?;
        let bytes = &self.data[..self.layout.required_len()];
        let pixels: &'a [T] = bytemuck::try_cast_slice(bytes).map_err(cast_error)?;
        Ok(Img::new_stride(
            pixels,
            self.layout.width(),
            self.layout.height(),
            stride,
        ))
    }
}

/// Writable view of one plane.
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    data: &'a mut [u8],
    layout: ViewLayout,
}

impl<'a> BufferViewMut<'a> {
    pub(crate) fn new(data: &'a mut [u8], layout: ViewLayout) -> Result<Self, CodecError> {
        check_len(data.len(), &layout)?;
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> &ViewLayout {
        &self.layout
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    pub fn item_size(&self) -> usize {
        self.layout.item_size()
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn format(&self) -> &'static str {
        self.layout.format()
    }

    pub fn readonly(&self) -> bool {
        false
    }

    /// Reborrow as a read-only view.
    pub fn as_view(&self) -> BufferView<'_> {
        BufferView {
            data: self.data,
            layout: self.layout,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    pub fn row(&self, y: usize) -> Option<&[u8]> {
        self.layout.row_range(y).map(|range| &self.data[range])
    }

    pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8]> {
        self.layout.row_range(y).map(|range| &mut self.data[range])
    }

    pub fn sample(&self, y: usize, x: usize, c: usize) -> Option<u16> {
        let offset = self.layout.offset(y, x, c)?;
        Some(self.layout.read_sample(self.data, offset))
    }

    /// Store one sample. Fails with `UsageError` if the position is outside
    /// the plane or the value does not fit the bit depth.
    pub fn set_sample(&mut self, y: usize, x: usize, c: usize, value: u16) -> Result<(), CodecError> {
        self.layout.check_value(value)?;
        let offset = self.layout.offset(y, x, c).ok_or_else(|| {
            CodecError::usage(
                SubCode::INVALID_PARAMETER_VALUE,
                format!("Sample position ({y}, {x}, {c}) is outside the plane"),
            )
        })?;
        self.layout.write_sample(self.data, offset, value);
        Ok(())
    }

    /// Set every sample of every row to `value`. Row padding is untouched.
    pub fn fill(&mut self, value: u16) -> Result<(), CodecError> {
        self.layout.check_value(value)?;
        let layout = self.layout;
        let per_row = layout.width() * layout.channels();
        for y in 0..layout.height() {
            let start = y * layout.row_stride();
            for i in 0..per_row {
                layout.write_sample(self.data, start + i * layout.item_size(), value);
            }
        }
        Ok(())
    }

    /// Mutable typed 2D view.
    pub fn as_imgref_mut<T: Pod>(&mut self) -> Result<ImgRefMut<'_, T>, CodecError> {
        let stride = self.layout.typed_stride::<T>()?;
        let len = self.layout.required_len();
        let pixels: &mut [T] =
            bytemuck::try_cast_slice_mut(&mut self.data[..len]).map_err(cast_error)?;
        Ok(Img::new_stride(
            pixels,
            self.layout.width(),
            self.layout.height(),
            stride,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rgb::Rgb;

    #[test]
    fn planar_layout_is_two_dimensional() {
        let layout = ViewLayout::new(Chroma::Monochrome, 8, 6, 8, 16).unwrap();
        assert_eq!(layout.ndim(), 2);
        assert_eq!(layout.shape(), &[6, 8]);
        assert_eq!(layout.strides(), &[16, 1]);
        assert_eq!(layout.item_size(), 1);
        assert_eq!(layout.format(), "B");
        assert_eq!(layout.required_len(), 5 * 16 + 8);
    }

    #[test]
    fn interleaved_layout_is_three_dimensional() {
        let layout = ViewLayout::new(Chroma::InterleavedRgba, 5, 2, 8, 32).unwrap();
        assert_eq!(layout.shape(), &[2, 5, 4]);
        assert_eq!(layout.strides(), &[32, 4, 1]);

        let layout = ViewLayout::new(Chroma::InterleavedRrggbbBe, 5, 2, 10, 32).unwrap();
        assert_eq!(layout.shape(), &[2, 5, 3]);
        assert_eq!(layout.strides(), &[32, 6, 2]);
        assert_eq!(*layout.strides().last().unwrap(), layout.item_size());
        assert_eq!(layout.format(), "H");
    }

    #[test]
    fn subsampled_chroma_plane_uses_its_own_size() {
        let layout = ViewLayout::new(Chroma::C420, 4, 3, 12, 8).unwrap();
        assert_eq!(layout.shape(), &[3, 4]);
        assert_eq!(layout.strides(), &[8, 2]);
    }

    #[test]
    fn short_stride_is_rejected() {
        let err = ViewLayout::new(Chroma::InterleavedRgb, 10, 2, 8, 29).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(ViewLayout::new(Chroma::Monochrome, 1, 1, 17, 4).is_err());
        assert!(ViewLayout::new(Chroma::Monochrome, 1, 1, 0, 4).is_err());
    }

    #[test]
    fn padded_rows_are_skipped() {
        // 3x2 mono, stride 4: the fourth byte of each row is padding
        let data = [1, 2, 3, 0xEE, 4, 5, 6, 0xEE];
        let layout = ViewLayout::new(Chroma::Monochrome, 3, 2, 8, 4).unwrap();
        let view = BufferView::new(&data, layout).unwrap();
        assert_eq!(view.row(1), Some(&[4u8, 5, 6][..]));
        assert_eq!(view.row(2), None);
        assert_eq!(view.to_packed_vec(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(view.sample(1, 2, 0), Some(6));
        assert_eq!(view.sample(0, 3, 0), None);
        assert_eq!(view.as_bytes().len(), 8);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let data = [0u8; 7];
        let layout = ViewLayout::new(Chroma::Monochrome, 3, 2, 8, 4).unwrap();
        assert!(BufferView::new(&data, layout).is_ok());
        let err = BufferView::new(&data[..6], layout).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn byte_order_of_wide_samples() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let be = ViewLayout::new(Chroma::InterleavedRrggbbBe, 1, 1, 10, 6).unwrap();
        let le = ViewLayout::new(Chroma::InterleavedRrggbbLe, 1, 1, 10, 6).unwrap();
        assert_eq!(BufferView::new(&data, be).unwrap().sample(0, 0, 1), Some(0x0304));
        assert_eq!(BufferView::new(&data, le).unwrap().sample(0, 0, 1), Some(0x0403));
    }

    #[test]
    fn typed_rgb_view() {
        let mut data = vec![0u8; 2 * 8];
        let layout = ViewLayout::new(Chroma::InterleavedRgb, 2, 2, 8, 8).unwrap();
        {
            let mut view = BufferViewMut::new(&mut data, layout).unwrap();
            view.set_sample(1, 1, 2, 200).unwrap();
            // 8-byte stride is not a multiple of the 3-byte pixel
            assert!(view.as_imgref_mut::<Rgb<u8>>().is_err());
        }
        assert_eq!(data[8 + 3 + 2], 200);

        let mut data = vec![0u8; 2 * 6];
        let layout = ViewLayout::new(Chroma::InterleavedRgb, 2, 2, 8, 6).unwrap();
        let mut view = BufferViewMut::new(&mut data, layout).unwrap();
        view.fill(7).unwrap();
        {
            let mut img = view.as_imgref_mut::<Rgb<u8>>().unwrap();
            img[(1usize, 0usize)] = Rgb::new(1, 2, 3);
        }
        let img = view.as_view().as_imgref::<Rgb<u8>>().unwrap();
        assert_eq!(img.width(), 2);
        assert_eq!(img[(0usize, 0usize)], Rgb::new(7, 7, 7));
        assert_eq!(img[(1usize, 0usize)], Rgb::new(1, 2, 3));
        assert!(view.as_view().as_imgref::<u8>().is_err());
    }

    #[test]
    fn values_must_fit_bit_depth() {
        let mut data = vec![0u8; 4];
        let layout = ViewLayout::new(Chroma::Monochrome, 2, 1, 10, 4).unwrap();
        let mut view = BufferViewMut::new(&mut data, layout).unwrap();
        assert!(view.set_sample(0, 0, 0, 1023).is_ok());
        let err = view.set_sample(0, 1, 0, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsageError);
        assert!(view.set_sample(1, 0, 0, 1).is_err());
        assert_eq!(view.sample(0, 0, 0), Some(1023));
    }

    #[test]
    fn fill_leaves_padding_alone() {
        let mut data = vec![0xAAu8; 2 * 5];
        let layout = ViewLayout::new(Chroma::Monochrome, 3, 2, 8, 5).unwrap();
        let mut view = BufferViewMut::new(&mut data, layout).unwrap();
        view.fill(128).unwrap();
        assert_eq!(data, [128, 128, 128, 0xAA, 0xAA, 128, 128, 128, 0xAA, 0xAA]);
    }
}
