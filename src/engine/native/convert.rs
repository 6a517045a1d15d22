//! Layout conversions performed at decode time.
//!
//! Only rearrangements that need no color math are supported: moving 8-bit
//! RGB between planar and interleaved layouts, adding or dropping alpha, and
//! expanding gray to RGB. Anything else is reported as an unsupported color
//! conversion.

use crate::engine::EngineImage;
use crate::error::{CodecError, ErrorKind, SubCode};
use crate::pixel::{ByteOrder, Channel, Chroma, Colorspace};

use super::image::{NativeImage, NativePlane, alloc_zeroed};

fn unsupported(from: (Colorspace, Chroma), to: (Colorspace, Chroma)) -> CodecError {
    CodecError::new(
        ErrorKind::UnsupportedFeature,
        SubCode::UNSUPPORTED_COLOR_CONVERSION,
        format!(
            "Unsupported color conversion {:?}/{:?} -> {:?}/{:?}",
            from.0, from.1, to.0, to.1
        ),
    )
}

/// 8-bit pixel reader over a source image.
enum Source<'a> {
    Gray {
        y: &'a NativePlane,
        alpha: Option<&'a NativePlane>,
    },
    Planar {
        rgb: [&'a NativePlane; 3],
        alpha: Option<&'a NativePlane>,
    },
    Interleaved {
        plane: &'a NativePlane,
        samples: usize,
    },
}

impl<'a> Source<'a> {
    fn of(img: &'a NativeImage) -> Option<Self> {
        let (width, height) = img.size();
        let find = |channel: Channel| {
            img.planes()
                .iter()
                .find(|p| p.channel == channel)
                .filter(|p| p.bit_depth == 8 && p.width == width && p.height == height)
        };
        if img.planes().iter().any(|p| p.bit_depth != 8) {
            return None;
        }

        match (img.colorspace(), img.chroma()) {
            (Colorspace::Monochrome, Chroma::Monochrome) => Some(Self::Gray {
                y: find(Channel::Y)?,
                alpha: find(Channel::Alpha),
            }),
            (Colorspace::Rgb, Chroma::C444) => Some(Self::Planar {
                rgb: [find(Channel::R)?, find(Channel::G)?, find(Channel::B)?],
                alpha: find(Channel::Alpha),
            }),
            (Colorspace::Rgb, chroma @ (Chroma::InterleavedRgb | Chroma::InterleavedRgba)) => {
                Some(Self::Interleaved {
                    plane: find(Channel::Interleaved)?,
                    samples: chroma.samples_per_pixel(),
                })
            }
            _ => None,
        }
    }

    fn has_alpha(&self) -> bool {
        match self {
            Self::Gray { alpha, .. } | Self::Planar { alpha, .. } => alpha.is_some(),
            Self::Interleaved { samples, .. } => *samples == 4,
        }
    }

    fn rgba(&self, x: usize, y: usize) -> [u8; 4] {
        let at = |plane: &NativePlane| plane.data()[y * plane.stride + x];
        match self {
            Self::Gray { y: luma, alpha } => {
                let v = at(*luma);
                [v, v, v, alpha.map_or(255, at)]
            }
            Self::Planar { rgb, alpha } => {
                [at(rgb[0]), at(rgb[1]), at(rgb[2]), alpha.map_or(255, at)]
            }
            Self::Interleaved { plane, samples } => {
                let px = &plane.data()[y * plane.stride + x * samples..][..*samples];
                [px[0], px[1], px[2], if *samples == 4 { px[3] } else { 255 }]
            }
        }
    }
}

fn fill_plane(
    img: &mut NativeImage,
    channel: Channel,
    mut pixel: impl FnMut(usize, usize, &mut [u8]),
) -> Result<(), CodecError> {
    let (width, height) = img.size();
    let samples = img.chroma().samples_per_pixel();
    let plane = img.plane_mut(channel)?.ok_or_else(|| {
        CodecError::invalid_input(
            SubCode::NONEXISTING_IMAGE_CHANNEL_REFERENCED,
            format!("No plane for channel {}", channel.name()),
        )
    })?;
    for y in 0..height as usize {
        let row = &mut plane.data[y * plane.stride..][..width as usize * samples];
        for (x, dst) in row.chunks_exact_mut(samples).enumerate() {
            pixel(x, y, dst);
        }
    }
    Ok(())
}

/// Rearrange `src` into the requested colorspace and chroma.
pub(super) fn convert(
    src: &NativeImage,
    colorspace: Colorspace,
    chroma: Chroma,
) -> Result<NativeImage, CodecError> {
    let from = (src.colorspace(), src.chroma());
    let source = Source::of(src).ok_or_else(|| unsupported(from, (colorspace, chroma)))?;
    let (width, height) = src.size();
    let mut out = NativeImage::new(width, height, colorspace, chroma)?;

    match (colorspace, chroma) {
        (Colorspace::Rgb, Chroma::InterleavedRgb | Chroma::InterleavedRgba) => {
            let samples = chroma.samples_per_pixel();
            out.add_plane(Channel::Interleaved, width, height, 8)?;
            fill_plane(&mut out, Channel::Interleaved, |x, y, dst| {
                dst.copy_from_slice(&source.rgba(x, y)[..samples]);
            })?;
        }
        (Colorspace::Rgb, Chroma::C444) => {
            let mut channels = vec![(Channel::R, 0), (Channel::G, 1), (Channel::B, 2)];
            if source.has_alpha() {
                channels.push((Channel::Alpha, 3));
            }
            for (channel, index) in channels {
                out.add_plane(channel, width, height, 8)?;
                fill_plane(&mut out, channel, |x, y, dst| {
                    dst[0] = source.rgba(x, y)[index];
                })?;
            }
        }
        _ => return Err(unsupported(from, (colorspace, chroma))),
    }

    log::debug!(
        "converted {width}x{height} {:?}/{:?} -> {colorspace:?}/{chroma:?}",
        from.0,
        from.1
    );
    Ok(out)
}

/// Scale every plane deeper than 8 bits down to 8 bits.
///
/// Interleaved 16-bit layouts become their 8-bit counterparts.
pub(super) fn reduce_to_8bit(src: NativeImage) -> Result<NativeImage, CodecError> {
    if src.planes().iter().all(|p| p.bit_depth <= 8) {
        return Ok(src);
    }

    let chroma = src.chroma();
    let samples = chroma.samples_per_pixel();
    let target = match chroma {
        Chroma::InterleavedRrggbbBe | Chroma::InterleavedRrggbbLe => Chroma::InterleavedRgb,
        Chroma::InterleavedRrggbbaaBe | Chroma::InterleavedRrggbbaaLe => Chroma::InterleavedRgba,
        other => other,
    };

    let mut planes = Vec::with_capacity(src.planes().len());
    for plane in src.planes() {
        let width = plane.width as usize;
        let stride = width * samples;
        let mut data = alloc_zeroed(stride * plane.height as usize)?;
        let shift = plane.bit_depth.saturating_sub(8);
        let item = usize::from(plane.bit_depth).div_ceil(8);

        for (y, row) in plane.rows(chroma).enumerate() {
            let dst = &mut data[y * stride..][..stride];
            if item == 1 {
                dst.copy_from_slice(row);
                continue;
            }
            for (d, s) in dst.iter_mut().zip(row.chunks_exact(2)) {
                let value = match chroma.byte_order() {
                    ByteOrder::Native => u16::from_ne_bytes([s[0], s[1]]),
                    ByteOrder::Big => u16::from_be_bytes([s[0], s[1]]),
                    ByteOrder::Little => u16::from_le_bytes([s[0], s[1]]),
                };
                *d = (value >> shift).min(255) as u8;
            }
        }

        planes.push(NativePlane::owned(
            plane.channel,
            plane.width,
            plane.height,
            plane.bit_depth.min(8),
            stride,
            data,
        ));
    }

    let (width, height) = src.size();
    Ok(NativeImage::with_planes(
        width,
        height,
        src.colorspace(),
        target,
        planes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, fill: impl Fn(usize, usize) -> u8) -> NativeImage {
        let mut img = NativeImage::new(width, height, Colorspace::Monochrome, Chroma::Monochrome)
            .unwrap();
        img.add_plane(Channel::Y, width, height, 8).unwrap();
        fill_plane(&mut img, Channel::Y, |x, y, dst| dst[0] = fill(x, y)).unwrap();
        img
    }

    #[test]
    fn gray_expands_to_rgba() {
        let src = gray(3, 2, |x, y| (10 * y + x) as u8);
        let out = convert(&src, Colorspace::Rgb, Chroma::InterleavedRgba).unwrap();
        let plane = out.plane(Channel::Interleaved).unwrap();
        let px = &plane.data[plane.stride + 2 * 4..][..4];
        assert_eq!(px, [12, 12, 12, 255]);
    }

    #[test]
    fn interleaved_to_planar_and_back() {
        let src = gray(4, 4, |x, y| (x * 16 + y) as u8);
        let rgb = convert(&src, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
        let planar = convert(&rgb, Colorspace::Rgb, Chroma::C444).unwrap();
        assert!(!planar.has_channel(Channel::Alpha));
        let g = planar.plane(Channel::G).unwrap();
        assert_eq!(g.data[3 * g.stride + 2], 2 * 16 + 3);

        let back = convert(&planar, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
        let a = rgb.planes()[0].packed(Chroma::InterleavedRgb).unwrap();
        let b = back.planes()[0].packed(Chroma::InterleavedRgb).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ycbcr_needs_color_math() {
        let mut img = NativeImage::new(2, 2, Colorspace::YCbCr, Chroma::C420).unwrap();
        img.add_plane(Channel::Y, 2, 2, 8).unwrap();
        img.add_plane(Channel::Cb, 1, 1, 8).unwrap();
        img.add_plane(Channel::Cr, 1, 1, 8).unwrap();
        let err = convert(&img, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
        assert_eq!(err.subcode(), SubCode::UNSUPPORTED_COLOR_CONVERSION);

        let src = gray(2, 2, |_, _| 0);
        assert!(convert(&src, Colorspace::YCbCr, Chroma::C444).is_err());
    }

    #[test]
    fn high_bit_depth_is_shifted_down() {
        let mut img =
            NativeImage::new(2, 1, Colorspace::Rgb, Chroma::InterleavedRrggbbBe).unwrap();
        img.add_plane(Channel::Interleaved, 2, 1, 10).unwrap();
        {
            let plane = img.plane_mut(Channel::Interleaved).unwrap().unwrap();
            plane.data[..2].copy_from_slice(&1023u16.to_be_bytes());
            plane.data[6..8].copy_from_slice(&512u16.to_be_bytes());
        }
        let out = reduce_to_8bit(img).unwrap();
        assert_eq!(out.chroma(), Chroma::InterleavedRgb);
        assert_eq!(out.bit_depth(Channel::Interleaved), Some(8));
        let plane = out.plane(Channel::Interleaved).unwrap();
        assert_eq!(plane.stride, 6);
        assert_eq!(plane.data[0], 255);
        assert_eq!(plane.data[3], 128);
    }
}
