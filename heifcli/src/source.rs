//! Opening input files with the engine that reads their brand.
//!
//! `hkit` files go to the native engine. With the `libheif` feature every
//! other brand goes to the system library; without it they fail with
//! UnsupportedFiletype.

use std::path::Path;

use anyhow::Context;
#[cfg(feature = "libheif")]
use anyhow::bail;
use heifkit::{Chroma, Colorspace, Container, ImageHandle, PixelBuffer};
#[cfg(feature = "libheif")]
use heifkit::{Channel, FileBrand, LibHeif};

/// A parsed input container.
pub enum Opened {
    Native(Container),
    #[cfg(feature = "libheif")]
    LibHeif(Container<LibHeif>),
}

impl Opened {
    /// Engine name, for messages.
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            #[cfg(feature = "libheif")]
            Self::LibHeif(_) => "libheif",
        }
    }
}

pub fn open_file(path: &Path) -> anyhow::Result<Opened> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    open_bytes(data)
}

pub fn open_bytes(data: Vec<u8>) -> anyhow::Result<Opened> {
    #[cfg(feature = "libheif")]
    if FileBrand::detect(&data).is_some_and(|brand| brand != FileBrand::NATIVE) {
        let mut container = Container::<LibHeif>::create()?;
        container.read_from_memory(data)?;
        return Ok(Opened::LibHeif(container));
    }
    Ok(Opened::Native(Container::from_bytes(data)?))
}

/// Decode a native image in its stored layout.
pub fn native_pixels(handle: &ImageHandle) -> anyhow::Result<PixelBuffer> {
    Ok(handle.decode(Colorspace::Undefined, Chroma::Undefined)?)
}

/// Decode a libheif image to interleaved RGB(A) and copy it into a native
/// buffer. Bit depths above 8 stay big-endian 16-bit samples.
#[cfg(feature = "libheif")]
pub fn libheif_pixels(handle: &ImageHandle<LibHeif>) -> anyhow::Result<PixelBuffer> {
    let wide = handle.luma_bits_per_pixel().is_some_and(|bits| bits > 8);
    let chroma = match (handle.has_alpha_channel(), wide) {
        (false, false) => Chroma::InterleavedRgb,
        (true, false) => Chroma::InterleavedRgba,
        (false, true) => Chroma::InterleavedRrggbbBe,
        (true, true) => Chroma::InterleavedRrggbbaaBe,
    };
    let decoded = handle.decode(Colorspace::Rgb, chroma)?;
    let channel = Channel::Interleaved;
    let (Some(width), Some(height), Some(depth)) = (
        decoded.width(channel),
        decoded.height(channel),
        decoded.bit_depth(channel),
    ) else {
        bail!("image {} decoded without an interleaved plane", handle.id());
    };

    let mut buffer = PixelBuffer::new(width, height, Colorspace::Rgb, chroma)?;
    buffer.add_plane(channel, width, height, depth)?;
    let src = decoded.plane(channel)?;
    let mut dst = buffer.plane_mut(channel)?;
    for (y, row) in src.rows().enumerate() {
        let out = dst
            .row_mut(y)
            .with_context(|| format!("row {y} outside the copied plane"))?;
        out.copy_from_slice(row);
    }
    drop(dst);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heifkit::{CompressionFormat, EncoderSession};

    fn native_file() -> Vec<u8> {
        let mut buffer =
            PixelBuffer::new(4, 4, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
        buffer.add_plane(heifkit::Channel::Y, 4, 4, 8).unwrap();
        let mut container = Container::new();
        EncoderSession::new(CompressionFormat::Uncompressed)
            .unwrap()
            .encode(&mut container, &buffer, "")
            .unwrap();
        container.write_to_bytes().unwrap()
    }

    #[test]
    fn native_brand_opens_natively() {
        let opened = open_bytes(native_file()).unwrap();
        assert_eq!(opened.engine(), "native");
        match opened {
            Opened::Native(container) => {
                let handle = container.primary_image_handle().unwrap();
                let pixels = native_pixels(&handle).unwrap();
                assert_eq!(pixels.chroma(), Chroma::Monochrome);
            }
            #[cfg(feature = "libheif")]
            Opened::LibHeif(_) => panic!("hkit file opened with libheif"),
        }
    }

    #[cfg(not(feature = "libheif"))]
    #[test]
    fn other_brands_need_libheif() {
        let mut bytes = native_file();
        bytes[8..12].copy_from_slice(b"heic");
        bytes[16..20].copy_from_slice(b"heic");
        let err = open_bytes(bytes).err().unwrap();
        let err = err.downcast_ref::<heifkit::CodecError>().unwrap();
        assert_eq!(err.kind(), heifkit::ErrorKind::UnsupportedFiletype);
    }

    #[cfg(feature = "libheif")]
    #[test]
    fn libheif_input_becomes_native_pixels() {
        let Ok(mut encoder) = EncoderSession::<LibHeif>::for_format(CompressionFormat::Hevc)
        else {
            return;
        };
        let mut buffer =
            PixelBuffer::<LibHeif>::create(8, 6, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
        buffer.add_plane(Channel::Interleaved, 8, 6, 8).unwrap();
        buffer.plane_mut(Channel::Interleaved).unwrap().fill(90).unwrap();
        let mut container = Container::<LibHeif>::create().unwrap();
        encoder.encode(&mut container, &buffer, "").unwrap();

        let opened = open_bytes(container.write_to_bytes().unwrap()).unwrap();
        assert_eq!(opened.engine(), "libheif");
        let Opened::LibHeif(container) = opened else {
            panic!("HEVC file opened natively");
        };
        let pixels = libheif_pixels(&container.primary_image_handle().unwrap()).unwrap();
        let view = pixels.plane(Channel::Interleaved).unwrap();
        assert_eq!(view.shape(), &[6, 8, 3]);
        assert!(view.to_packed_vec().iter().all(|&v| v.abs_diff(90) < 16));
    }
}
