//! Colorspace, chroma layout and channel designators.
//!
//! Numeric values follow the engine's C enumerations so they can cross the
//! engine seam unchanged. Typed pixel views use `imgref` with pixels from the
//! `rgb` crate; both are re-exported here.

pub use imgref::{Img, ImgRef, ImgRefMut, ImgVec};
pub use rgb::{Rgb, Rgba};

/// Colorspace of a pixel buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Colorspace {
    /// Let the engine pick the image's native colorspace.
    #[default]
    Undefined,
    YCbCr,
    Rgb,
    Monochrome,
    NonVisual,
}

impl Colorspace {
    pub fn code(self) -> i32 {
        match self {
            Self::Undefined => 99,
            Self::YCbCr => 0,
            Self::Rgb => 1,
            Self::Monochrome => 2,
            Self::NonVisual => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            99 => Self::Undefined,
            0 => Self::YCbCr,
            1 => Self::Rgb,
            2 => Self::Monochrome,
            3 => Self::NonVisual,
            _ => return None,
        })
    }
}

/// Byte order of samples wider than one byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Host order; used by planar layouts.
    Native,
    Big,
    Little,
}

/// How channels are arranged in memory.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Chroma {
    /// Let the engine pick the image's native layout.
    #[default]
    Undefined,
    Monochrome,
    C420,
    C422,
    C444,
    InterleavedRgb,
    InterleavedRgba,
    InterleavedRrggbbBe,
    InterleavedRrggbbaaBe,
    InterleavedRrggbbLe,
    InterleavedRrggbbaaLe,
}

impl Chroma {
    pub fn code(self) -> i32 {
        match self {
            Self::Undefined => 99,
            Self::Monochrome => 0,
            Self::C420 => 1,
            Self::C422 => 2,
            Self::C444 => 3,
            Self::InterleavedRgb => 10,
            Self::InterleavedRgba => 11,
            Self::InterleavedRrggbbBe => 12,
            Self::InterleavedRrggbbaaBe => 13,
            Self::InterleavedRrggbbLe => 14,
            Self::InterleavedRrggbbaaLe => 15,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            99 => Self::Undefined,
            0 => Self::Monochrome,
            1 => Self::C420,
            2 => Self::C422,
            3 => Self::C444,
            10 => Self::InterleavedRgb,
            11 => Self::InterleavedRgba,
            12 => Self::InterleavedRrggbbBe,
            13 => Self::InterleavedRrggbbaaBe,
            14 => Self::InterleavedRrggbbLe,
            15 => Self::InterleavedRrggbbaaLe,
            _ => return None,
        })
    }

    /// Number of samples stored per pixel in one plane of this layout.
    ///
    /// Planar layouts store one sample per plane; interleaved layouts store
    /// every channel of a pixel next to each other in the single
    /// [`Channel::Interleaved`] plane.
    pub fn samples_per_pixel(self) -> usize {
        match self {
            Self::InterleavedRgb | Self::InterleavedRrggbbBe | Self::InterleavedRrggbbLe => 3,
            Self::InterleavedRgba | Self::InterleavedRrggbbaaBe | Self::InterleavedRrggbbaaLe => 4,
            _ => 1,
        }
    }

    pub fn is_interleaved(self) -> bool {
        self.samples_per_pixel() > 1
    }

    /// Whether the layout carries an alpha sample in its interleaved plane.
    pub fn has_interleaved_alpha(self) -> bool {
        self.samples_per_pixel() == 4
    }

    /// Byte order used for samples wider than 8 bits.
    pub fn byte_order(self) -> ByteOrder {
        match self {
            Self::InterleavedRrggbbBe | Self::InterleavedRrggbbaaBe => ByteOrder::Big,
            Self::InterleavedRrggbbLe | Self::InterleavedRrggbbaaLe => ByteOrder::Little,
            _ => ByteOrder::Native,
        }
    }

    /// Whether interleaved samples of this layout are wider than 8 bits.
    pub fn is_high_bit_depth_interleaved(self) -> bool {
        self.is_interleaved() && self.byte_order() != ByteOrder::Native
    }

    /// Size of the chroma planes for an image of `width` x `height`.
    pub fn chroma_plane_size(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::C420 => (width.div_ceil(2), height.div_ceil(2)),
            Self::C422 => (width.div_ceil(2), height),
            _ => (width, height),
        }
    }
}

/// Plane designator inside a pixel buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Y,
    Cb,
    Cr,
    R,
    G,
    B,
    Alpha,
    Interleaved,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Self::Y,
        Self::Cb,
        Self::Cr,
        Self::R,
        Self::G,
        Self::B,
        Self::Alpha,
        Self::Interleaved,
    ];

    pub fn code(self) -> i32 {
        match self {
            Self::Y => 0,
            Self::Cb => 1,
            Self::Cr => 2,
            Self::R => 3,
            Self::G => 4,
            Self::B => 5,
            Self::Alpha => 6,
            Self::Interleaved => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Y,
            1 => Self::Cb,
            2 => Self::Cr,
            3 => Self::R,
            4 => Self::G,
            5 => Self::B,
            6 => Self::Alpha,
            10 => Self::Interleaved,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Y => "Y",
            Self::Cb => "Cb",
            Self::Cr => "Cr",
            Self::R => "R",
            Self::G => "G",
            Self::B => "B",
            Self::Alpha => "Alpha",
            Self::Interleaved => "Interleaved",
        }
    }
}

/// Planes a buffer must carry before it can be encoded.
pub(crate) fn required_channels(colorspace: Colorspace, chroma: Chroma) -> &'static [Channel] {
    match (colorspace, chroma) {
        (_, c) if c.is_interleaved() => &[Channel::Interleaved],
        (Colorspace::Rgb, Chroma::C444) => &[Channel::R, Channel::G, Channel::B],
        (Colorspace::YCbCr, Chroma::C420 | Chroma::C422 | Chroma::C444) => {
            &[Channel::Y, Channel::Cb, Channel::Cr]
        }
        (Colorspace::Monochrome, Chroma::Monochrome) => &[Channel::Y],
        _ => &[],
    }
}
