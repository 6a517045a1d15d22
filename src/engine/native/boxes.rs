//! ISOBMFF box reading and writing.

use crate::error::{CodecError, SubCode};

/// A box found while scanning: its type and the absolute range of its
/// content (header excluded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct BoxEntry {
    pub kind: [u8; 4],
    pub content: core::ops::Range<usize>,
}

/// Split `data[range]` into consecutive boxes.
///
/// A size of 1 means a 64-bit size follows the type; a size of 0 means the
/// box runs to the end of the range.
pub(super) fn scan_boxes(
    data: &[u8],
    range: core::ops::Range<usize>,
) -> Result<Vec<BoxEntry>, CodecError> {
    let mut boxes = Vec::new();
    let end = range.end;
    let mut pos = range.start;

    while pos < end {
        if pos + 8 > end {
            return Err(CodecError::invalid_input(
                SubCode::END_OF_DATA,
                "Unexpected end of file while reading box header",
            ));
        }
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];

        let (header_size, box_size) = match size {
            1 => {
                if pos + 16 > end {
                    return Err(CodecError::invalid_input(
                        SubCode::END_OF_DATA,
                        "Unexpected end of file while reading box header",
                    ));
                }
                let mut large = [0u8; 8];
                large.copy_from_slice(&data[pos + 8..pos + 16]);
                let large = usize::try_from(u64::from_be_bytes(large)).map_err(|_| {
                    CodecError::invalid_input(SubCode::INVALID_BOX_SIZE, "Box size too large")
                })?;
                (16, large)
            }
            0 => (8, end - pos),
            n => (8, n as usize),
        };

        if box_size < header_size {
            return Err(CodecError::invalid_input(
                SubCode::INVALID_BOX_SIZE,
                format!(
                    "Box '{}' size {box_size} is smaller than its header",
                    fourcc(&kind)
                ),
            ));
        }
        let box_end = pos.checked_add(box_size).filter(|&e| e <= end).ok_or_else(|| {
            CodecError::invalid_input(
                SubCode::END_OF_DATA,
                format!("Box '{}' extends past the end of its parent", fourcc(&kind)),
            )
        })?;

        boxes.push(BoxEntry {
            kind,
            content: pos + header_size..box_end,
        });
        pos = box_end;
    }

    Ok(boxes)
}

pub(super) fn fourcc(kind: &[u8; 4]) -> String {
    kind.iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

/// Bounds-checked big-endian reader over one box's content.
pub(super) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], range: core::ops::Range<usize>) -> Self {
        Self {
            data,
            pos: range.start,
            end: range.end,
        }
    }

    /// Absolute offset of the next byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    fn take(&mut self, n: usize) -> Result<core::ops::Range<usize>, CodecError> {
        if self.remaining() < n {
            return Err(CodecError::invalid_input(
                SubCode::END_OF_DATA,
                "Unexpected end of box content",
            ));
        }
        let range = self.pos..self.pos + n;
        self.pos += n;
        Ok(range)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let range = self.take(1)?;
        Ok(self.data[range.start])
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        let range = self.take(4)?;
        let b = &self.data[range];
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Skip the version and flags of a full box.
    pub fn full_box_header(&mut self) -> Result<(u8, u32), CodecError> {
        let word = self.u32()?;
        Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
    }

    /// Absolute range of the next `n` bytes.
    pub fn range(&mut self, n: usize) -> Result<core::ops::Range<usize>, CodecError> {
        self.take(n)
    }

    /// NUL-terminated UTF-8 string.
    pub fn cstr(&mut self) -> Result<String, CodecError> {
        let rest = &self.data[self.pos..self.end];
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            CodecError::invalid_input(SubCode::END_OF_DATA, "Unterminated string in box")
        })?;
        let text = core::str::from_utf8(&rest[..len])
            .map_err(|_| CodecError::invalid_input(SubCode::UNSPECIFIED, "String is not UTF-8"))?
            .to_owned();
        self.pos += len + 1;
        Ok(text)
    }
}

/// Output assembled from owned header bytes and borrowed payloads, so
/// plane data is never copied just to be framed.
#[derive(Debug, Default)]
pub(super) struct Chunks<'a> {
    parts: Vec<Part<'a>>,
    len: usize,
}

#[derive(Debug)]
enum Part<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

impl<'a> Chunks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn push_owned(&mut self, bytes: Vec<u8>) {
        self.len += bytes.len();
        match self.parts.last_mut() {
            Some(Part::Owned(last)) => last.extend_from_slice(&bytes),
            _ => self.parts.push(Part::Owned(bytes)),
        }
    }

    pub fn push_borrowed(&mut self, bytes: &'a [u8]) {
        self.len += bytes.len();
        self.parts.push(Part::Borrowed(bytes));
    }

    pub fn append(&mut self, other: Chunks<'a>) {
        for part in other.parts {
            match part {
                Part::Owned(bytes) => self.push_owned(bytes),
                Part::Borrowed(bytes) => self.push_borrowed(bytes),
            }
        }
    }

    /// Wrap the current content in a box of type `kind`.
    ///
    /// `full` adds a full-box version/flags word.
    pub fn boxed(self, kind: &[u8; 4], full: Option<(u8, u32)>) -> Chunks<'a> {
        let body_len = self.len + if full.is_some() { 4 } else { 0 };
        let mut header = Vec::with_capacity(20);
        if let Ok(size) = u32::try_from(body_len + 8) {
            header.extend_from_slice(&size.to_be_bytes());
            header.extend_from_slice(kind);
        } else {
            header.extend_from_slice(&1u32.to_be_bytes());
            header.extend_from_slice(kind);
            header.extend_from_slice(&((body_len + 16) as u64).to_be_bytes());
        }
        if let Some((version, flags)) = full {
            header.extend_from_slice(&((u32::from(version) << 24) | (flags & 0x00FF_FFFF)).to_be_bytes());
        }

        let mut out = Chunks::new();
        out.push_owned(header);
        out.append(self);
        out
    }

    /// Emit every part in order.
    pub fn for_each(&self, mut f: impl FnMut(&[u8]) -> Result<(), CodecError>) -> Result<(), CodecError> {
        for part in &self.parts {
            match part {
                Part::Owned(bytes) => f(bytes)?,
                Part::Borrowed(bytes) => f(bytes)?,
            }
        }
        Ok(())
    }
}

/// Big-endian field writer for box headers.
pub(super) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(super) fn put_cstr(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}
