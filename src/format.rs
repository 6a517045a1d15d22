//! Compression formats and container brand detection.

/// Compression format of an encoded image item.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressionFormat {
    /// Matches any format when used as a filter.
    #[default]
    Undefined,
    Hevc,
    Avc,
    Jpeg,
    Av1,
    Vvc,
    Evc,
    Jpeg2000,
    Uncompressed,
    Mask,
    Htj2k,
}

impl CompressionFormat {
    pub fn code(self) -> i32 {
        match self {
            Self::Undefined => 0,
            Self::Hevc => 1,
            Self::Avc => 2,
            Self::Jpeg => 3,
            Self::Av1 => 4,
            Self::Vvc => 5,
            Self::Evc => 6,
            Self::Jpeg2000 => 7,
            Self::Uncompressed => 8,
            Self::Mask => 9,
            Self::Htj2k => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Undefined,
            1 => Self::Hevc,
            2 => Self::Avc,
            3 => Self::Jpeg,
            4 => Self::Av1,
            5 => Self::Vvc,
            6 => Self::Evc,
            7 => Self::Jpeg2000,
            8 => Self::Uncompressed,
            9 => Self::Mask,
            10 => Self::Htj2k,
            _ => return None,
        })
    }

    /// Parse a user-facing name such as `hevc`, `av1` or `uncompressed`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "any" | "undefined" => Some(Self::Undefined),
            "hevc" | "h265" | "heic" => Some(Self::Hevc),
            "avc" | "h264" => Some(Self::Avc),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "av1" | "avif" => Some(Self::Av1),
            "vvc" | "h266" => Some(Self::Vvc),
            "evc" => Some(Self::Evc),
            "jpeg2000" | "j2k" => Some(Self::Jpeg2000),
            "uncompressed" | "unci" => Some(Self::Uncompressed),
            "mask" => Some(Self::Mask),
            "htj2k" => Some(Self::Htj2k),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Hevc => "hevc",
            Self::Avc => "avc",
            Self::Jpeg => "jpeg",
            Self::Av1 => "av1",
            Self::Vvc => "vvc",
            Self::Evc => "evc",
            Self::Jpeg2000 => "jpeg2000",
            Self::Uncompressed => "uncompressed",
            Self::Mask => "mask",
            Self::Htj2k => "htj2k",
        }
    }

    /// Whether `self`, used as a filter, accepts `other`.
    pub fn matches(self, other: CompressionFormat) -> bool {
        self == Self::Undefined || self == other
    }
}

/// Major brand read from a container's `ftyp` box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileBrand(pub [u8; 4]);

impl FileBrand {
    /// Private brand written by the native engine.
    pub const NATIVE: FileBrand = FileBrand(*b"hkit");

    /// Read the major brand of an ISOBMFF file.
    ///
    /// Returns `None` if the data does not start with an `ftyp` box.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 12 || &data[4..8] != b"ftyp" {
            return None;
        }
        Some(FileBrand([data[8], data[9], data[10], data[11]]))
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Whether this is one of the HEIF-family brands.
    pub fn is_heif_family(self) -> bool {
        matches!(
            &self.0,
            b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"hevx" | b"mif1" | b"msf1"
                | b"avif" | b"avis" | b"hkit"
        )
    }

    /// MIME type for the brand, following the HEIF registration.
    pub fn mime_type(self) -> &'static str {
        match &self.0 {
            b"heic" | b"heix" | b"heim" | b"heis" => "image/heic",
            b"hevc" | b"hevx" => "image/heic-sequence",
            b"avif" => "image/avif",
            b"avis" => "image/avif-sequence",
            b"msf1" => "image/heif-sequence",
            _ => "image/heif",
        }
    }
}

/// Whether a file extension names a HEIF-family file (case-insensitive).
pub fn is_heif_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "heic" | "heif" | "hif" | "avif" | "hkit"
    )
}
