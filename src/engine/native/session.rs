//! Container sessions and entries of the native engine.
//!
//! File layout:
//!
//! ```text
//! ftyp  major 'hkit', minor 1, compatible 'hkit' 'mif1'
//! meta  (full box)
//!   pitm  (full box) primary item id
//!   iimg  (full box) one per image item
//!         id, width, height: u32
//!         colorspace, chroma, compression, packing, plane count: u8
//!         per plane: channel u8, width u32, height u32, bit depth u8,
//!                    stride u32, data length u32, data
//!   imet  (full box) one per metadata item
//!         id, parent item id: u32
//!         item type, content type: NUL-terminated strings
//!         payload (rest of the box)
//! ```
//!
//! Samples wider than 8 bits are written big-endian.
//!
//! Stored planes are read in place: a decoded image shares its plane bytes
//! with the container input until it is written to. Wide samples on a
//! little-endian host are the exception and get copied into host order.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::DecodeOptions;
use crate::engine::{EngineEntry, EngineImage, EngineSession, ItemId, SharedBytes};
use crate::error::{CodecError, ErrorKind, SubCode};
use crate::format::{CompressionFormat, FileBrand};
use crate::limits::Limits;
use crate::metadata::{EXIF_ITEM_TYPE, MetadataKind, XMP_CONTENT_TYPE, XMP_ITEM_TYPE};
use crate::pixel::{Channel, Chroma, Colorspace, required_channels};
use crate::writer::WriteSink;

use super::NativeEngine;
use super::boxes::{Chunks, Reader, fourcc, put_cstr, put_u32, scan_boxes};
use super::convert;
use super::encoder::{NativeEncoder, Packing};
use super::image::{NativeImage, NativePlane, SharedSlice, try_with_capacity};
use super::packbits;

#[derive(Debug)]
struct MetadataRecord {
    id: ItemId,
    item_type: String,
    content_type: Option<String>,
    data: SharedSlice,
}

#[derive(Debug)]
pub(crate) struct ItemRecord {
    id: ItemId,
    width: u32,
    height: u32,
    colorspace: Colorspace,
    chroma: Chroma,
    compression: CompressionFormat,
    packing: Packing,
    planes: Vec<NativePlane>,
    metadata: RwLock<Vec<MetadataRecord>>,
}

impl ItemRecord {
    fn plane(&self, channel: Channel) -> Option<&NativePlane> {
        self.planes.iter().find(|p| p.channel == channel)
    }

    fn with_metadata<T>(&self, f: impl FnOnce(&[MetadataRecord]) -> T) -> T {
        let guard = self.metadata.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

/// One container session.
#[derive(Debug)]
pub struct NativeSession {
    items: Vec<Arc<ItemRecord>>,
    primary: Option<ItemId>,
    next_id: ItemId,
    limits: Limits,
}

impl Default for NativeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeSession {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            primary: None,
            next_id: 1,
            limits: Limits::none(),
        }
    }

    fn allocate_id(&mut self) -> Result<ItemId, CodecError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(|| {
            CodecError::usage(SubCode::UNSPECIFIED, "Container ran out of item ids")
        })?;
        Ok(id)
    }

    fn find(&self, id: ItemId) -> Option<&Arc<ItemRecord>> {
        self.items.iter().find(|item| item.id == id)
    }

    fn serialize(&self) -> Result<Chunks<'_>, CodecError> {
        let mut ftyp = Vec::with_capacity(16);
        ftyp.extend_from_slice(&FileBrand::NATIVE.0);
        put_u32(&mut ftyp, 1);
        ftyp.extend_from_slice(&FileBrand::NATIVE.0);
        ftyp.extend_from_slice(b"mif1");
        let mut file = Chunks::new();
        file.push_owned(ftyp);
        let mut file = file.boxed(b"ftyp", None);

        let mut meta = Chunks::new();
        if let Some(primary) = self.primary {
            let mut pitm = Chunks::new();
            pitm.push_owned(primary.to_be_bytes().to_vec());
            meta.append(pitm.boxed(b"pitm", Some((0, 0))));
        }

        for item in &self.items {
            meta.append(serialize_item(item)?);
        }
        for item in &self.items {
            item.with_metadata(|records| {
                for record in records {
                    let mut header = Vec::new();
                    put_u32(&mut header, record.id);
                    put_u32(&mut header, item.id);
                    put_cstr(&mut header, &record.item_type);
                    put_cstr(&mut header, record.content_type.as_deref().unwrap_or(""));
                    header.extend_from_slice(record.data.as_slice());
                    let mut imet = Chunks::new();
                    imet.push_owned(header);
                    meta.append(imet.boxed(b"imet", Some((0, 0))));
                }
            });
        }

        file.append(meta.boxed(b"meta", Some((0, 0))));
        Ok(file)
    }
}

fn serialize_item(item: &ItemRecord) -> Result<Chunks<'_>, CodecError> {
    let mut chunks = Chunks::new();
    let mut header = Vec::with_capacity(32);
    put_u32(&mut header, item.id);
    put_u32(&mut header, item.width);
    put_u32(&mut header, item.height);
    header.push(item.colorspace.code() as u8);
    header.push(item.chroma.code() as u8);
    header.push(item.compression.code() as u8);
    header.push(item.packing.code());
    header.push(item.planes.len() as u8);
    chunks.push_owned(header);

    for plane in &item.planes {
        let mut header = Vec::with_capacity(18);
        header.push(plane.channel.code() as u8);
        put_u32(&mut header, plane.width);
        put_u32(&mut header, plane.height);
        header.push(plane.bit_depth);
        put_u32(&mut header, to_u32(plane.stride)?);
        let row_bytes = plane.row_bytes(item.chroma);
        let swapped = if plane.bit_depth > 8 && cfg!(target_endian = "little") {
            let mut copy = try_with_capacity(plane.data().len())?;
            copy.extend_from_slice(plane.data());
            swap_wide_samples(&mut copy, plane.stride, row_bytes);
            Some(copy)
        } else {
            None
        };
        match item.packing {
            Packing::Store => {
                put_u32(&mut header, to_u32(plane.data().len())?);
                chunks.push_owned(header);
                match swapped {
                    Some(copy) => chunks.push_owned(copy),
                    None => chunks.push_borrowed(plane.data()),
                }
            }
            Packing::PackBits => {
                let packed = packbits::compress(swapped.as_deref().unwrap_or(plane.data()));
                put_u32(&mut header, to_u32(packed.len())?);
                chunks.push_owned(header);
                chunks.push_owned(packed);
            }
        }
    }

    Ok(chunks.boxed(b"iimg", Some((0, 0))))
}

fn to_u32(value: usize) -> Result<u32, CodecError> {
    u32::try_from(value).map_err(|_| {
        CodecError::new(
            ErrorKind::EncodingError,
            SubCode::CANNOT_WRITE_OUTPUT_DATA,
            "Plane too large for the container",
        )
    })
}

struct PlaneHeader {
    channel: Channel,
    width: u32,
    height: u32,
    bit_depth: u8,
    stride: usize,
    range: core::ops::Range<usize>,
}

/// Everything a successful parse produces; committed to the session only
/// when the whole file was valid.
struct Parsed {
    items: Vec<Arc<ItemRecord>>,
    primary: Option<ItemId>,
    max_id: ItemId,
}

fn bad_value(what: &str, value: u8) -> CodecError {
    CodecError::invalid_input(SubCode::UNSPECIFIED, format!("Invalid {what} code {value}"))
}

fn parse(data: &SharedBytes, limits: &Limits) -> Result<Parsed, CodecError> {
    let brand = FileBrand::detect(data).ok_or_else(|| {
        CodecError::invalid_input(SubCode::NO_FTYP_BOX, "No ftyp box")
    })?;

    let top = scan_boxes(data, 0..data.len())?;
    let compatible = top.first().is_some_and(|ftyp| {
        data[ftyp.content.clone()]
            .chunks_exact(4)
            .skip(2)
            .any(|b| b == FileBrand::NATIVE.0)
    });
    if brand != FileBrand::NATIVE && !compatible {
        return Err(CodecError::new(
            ErrorKind::UnsupportedFiletype,
            SubCode::UNSPECIFIED,
            format!(
                "Brand '{}' needs a codec engine; the native engine reads '{}' files only",
                brand.as_str(),
                FileBrand::NATIVE.as_str()
            ),
        ));
    }

    let meta = top
        .iter()
        .find(|b| &b.kind == b"meta")
        .ok_or_else(|| CodecError::invalid_input(SubCode::NO_META_BOX, "No meta box"))?;
    let mut reader = Reader::new(data, meta.content.clone());
    reader.full_box_header()?;
    let children = scan_boxes(data, reader.position()..meta.content.end)?;

    let mut items: Vec<Arc<ItemRecord>> = Vec::new();
    let mut primary = None;
    let mut pending_metadata = Vec::new();
    let mut max_id = 0;

    for child in &children {
        let mut r = Reader::new(data, child.content.clone());
        match &child.kind {
            b"pitm" => {
                r.full_box_header()?;
                primary = Some(r.u32()?);
            }
            b"iimg" => {
                r.full_box_header()?;
                let item = parse_item(data, &mut r, limits)?;
                if items.iter().any(|i| i.id == item.id) {
                    return Err(CodecError::invalid_input(
                        SubCode::UNSPECIFIED,
                        format!("Duplicate item id {}", item.id),
                    ));
                }
                max_id = max_id.max(item.id);
                items.push(Arc::new(item));
            }
            b"imet" => {
                r.full_box_header()?;
                let id = r.u32()?;
                let parent = r.u32()?;
                let item_type = r.cstr()?;
                let content_type = Some(r.cstr()?).filter(|c| !c.is_empty());
                let payload = r.range(r.remaining())?;
                max_id = max_id.max(id);
                pending_metadata.push((
                    parent,
                    MetadataRecord {
                        id,
                        item_type,
                        content_type,
                        data: SharedSlice::new(Arc::clone(data), payload),
                    },
                ));
            }
            other => log::debug!("skipping unknown box '{}'", fourcc(other)),
        }
    }

    for (parent, record) in pending_metadata {
        let item = items.iter().find(|i| i.id == parent).ok_or_else(|| {
            CodecError::invalid_input(
                SubCode::NONEXISTING_ITEM_REFERENCED,
                format!("Metadata item {} references missing item {parent}", record.id),
            )
        })?;
        item.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    if let Some(id) = primary {
        if !items.iter().any(|i| i.id == id) {
            return Err(CodecError::invalid_input(
                SubCode::NO_OR_INVALID_PRIMARY_ITEM,
                format!("Primary item {id} does not exist"),
            ));
        }
    }

    Ok(Parsed {
        items,
        primary,
        max_id,
    })
}

fn parse_item(
    data: &SharedBytes,
    r: &mut Reader<'_>,
    limits: &Limits,
) -> Result<ItemRecord, CodecError> {
    let id = r.u32()?;
    let width = r.u32()?;
    let height = r.u32()?;
    let code = r.u8()?;
    let colorspace = Colorspace::from_code(i32::from(code)).ok_or_else(|| bad_value("colorspace", code))?;
    let code = r.u8()?;
    let chroma = Chroma::from_code(i32::from(code)).ok_or_else(|| bad_value("chroma", code))?;
    let code = r.u8()?;
    let compression =
        CompressionFormat::from_code(i32::from(code)).ok_or_else(|| bad_value("compression", code))?;
    let code = r.u8()?;
    let packing = Packing::from_code(code).ok_or_else(|| bad_value("packing", code))?;
    let plane_count = r.u8()?;

    let mut headers = Vec::with_capacity(usize::from(plane_count));
    for _ in 0..plane_count {
        let code = r.u8()?;
        let channel = Channel::from_code(i32::from(code)).ok_or_else(|| bad_value("channel", code))?;
        let header = PlaneHeader {
            channel,
            width: r.u32()?,
            height: r.u32()?,
            bit_depth: r.u8()?,
            stride: r.u32()? as usize,
            range: {
                let len = r.u32()? as usize;
                r.range(len)?
            },
        };
        headers.push(header);
    }

    let bytes_per_pixel: u32 = headers
        .iter()
        .map(|h| (chroma.samples_per_pixel() * usize::from(h.bit_depth).div_ceil(8)) as u32)
        .sum();
    limits.validate(width, height, bytes_per_pixel.max(1))?;

    // Plane sizes follow the item size; the limits above only saw the item
    let mut total_bytes: u64 = 0;
    let mut layouts = Vec::with_capacity(headers.len());
    for h in &headers {
        if h.width == 0 || h.height == 0 || h.bit_depth == 0 || h.bit_depth > 16 {
            return Err(CodecError::invalid_input(
                SubCode::UNSPECIFIED,
                format!("Invalid {} plane of item {id}", h.channel.name()),
            ));
        }
        let expected_size = match h.channel {
            Channel::Cb | Channel::Cr => chroma.chroma_plane_size(width, height),
            _ => (width, height),
        };
        if (h.width, h.height) != expected_size {
            return Err(CodecError::invalid_input(
                SubCode::INVALID_IMAGE_SIZE,
                format!(
                    "{} plane of item {id} is {}x{}, expected {}x{}",
                    h.channel.name(),
                    h.width,
                    h.height,
                    expected_size.0,
                    expected_size.1
                ),
            ));
        }
        let row_bytes =
            h.width as usize * chroma.samples_per_pixel() * usize::from(h.bit_depth).div_ceil(8);
        let expected = h.stride.checked_mul(h.height as usize).filter(|_| h.stride >= row_bytes);
        let Some(expected) = expected else {
            return Err(CodecError::invalid_input(
                SubCode::INVALID_BOX_SIZE,
                format!("Invalid stride {} for a {} byte row", h.stride, row_bytes),
            ));
        };
        total_bytes = total_bytes.saturating_add(expected as u64);
        layouts.push((row_bytes, expected));
    }
    limits.check_memory(total_bytes).map_err(|msg| {
        CodecError::new(
            ErrorKind::InvalidInput,
            SubCode::SECURITY_LIMIT_EXCEEDED,
            format!("{msg} (item {id} planes hold {total_bytes} bytes)"),
        )
    })?;

    let mut planes = Vec::with_capacity(headers.len());
    for (h, (row_bytes, expected)) in headers.into_iter().zip(layouts) {
        let wide = h.bit_depth > 8;
        let bytes = match packing {
            Packing::Store if h.range.len() != expected => {
                return Err(CodecError::invalid_input(
                    SubCode::END_OF_DATA,
                    format!("Plane holds {} bytes, expected {expected}", h.range.len()),
                ));
            }
            Packing::Store if wide && cfg!(target_endian = "little") => {
                let mut owned = try_with_capacity(expected)?;
                owned.extend_from_slice(&data[h.range]);
                swap_wide_samples(&mut owned, h.stride, row_bytes);
                SharedSlice::from_vec(owned)
            }
            Packing::Store => SharedSlice::new(Arc::clone(data), h.range),
            Packing::PackBits => {
                let mut unpacked = packbits::decompress(&data[h.range], expected)?;
                if wide {
                    swap_wide_samples(&mut unpacked, h.stride, row_bytes);
                }
                SharedSlice::from_vec(unpacked)
            }
        };
        planes.push(NativePlane::shared(
            h.channel,
            h.width,
            h.height,
            h.bit_depth,
            h.stride,
            bytes,
        ));
    }

    Ok(ItemRecord {
        id,
        width,
        height,
        colorspace,
        chroma,
        compression,
        packing,
        planes,
        metadata: RwLock::new(Vec::new()),
    })
}

/// Samples above 8 bits are stored big-endian. Swaps them between file and
/// host order in place, leaving row padding alone.
fn swap_wide_samples(data: &mut [u8], stride: usize, row_bytes: usize) {
    if cfg!(target_endian = "big") {
        return;
    }
    for row in data.chunks_mut(stride) {
        let end = row_bytes.min(row.len()) & !1;
        for pair in row[..end].chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }
}

/// Offset of the TIFF header inside an EXIF payload.
fn tiff_header_offset(payload: &[u8]) -> Option<u32> {
    payload
        .windows(4)
        .position(|w| w == b"MM\0*" || w == b"II*\0")
        .and_then(|pos| u32::try_from(pos).ok())
}

impl EngineSession<NativeEngine> for NativeSession {
    fn set_limits(&mut self, limits: &Limits) {
        self.limits = limits.clone();
    }

    fn read_file(&mut self, path: &Path) -> Result<(), CodecError> {
        let data = std::fs::read(path).map_err(|err| {
            CodecError::new(
                ErrorKind::InputDoesNotExist,
                SubCode::UNSPECIFIED,
                format!("Cannot open file {}: {err}", path.display()),
            )
        })?;
        self.read_memory(Arc::new(data))
    }

    fn read_memory(&mut self, data: SharedBytes) -> Result<(), CodecError> {
        let parsed = parse(&data, &self.limits)?;
        log::debug!(
            "native: parsed {} bytes, {} item(s), primary {:?}",
            data.len(),
            parsed.items.len(),
            parsed.primary
        );
        self.items = parsed.items;
        self.primary = parsed.primary;
        self.next_id = parsed.max_id.saturating_add(1);
        Ok(())
    }

    fn primary_entry(&self) -> Result<NativeEntry, CodecError> {
        let id = self.primary.ok_or_else(|| {
            CodecError::invalid_input(
                SubCode::NO_OR_INVALID_PRIMARY_ITEM,
                "No primary image in container",
            )
        })?;
        self.entry(id)
    }

    fn top_level_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    fn entry(&self, id: ItemId) -> Result<NativeEntry, CodecError> {
        let item = self.find(id).ok_or_else(|| {
            CodecError::usage(
                SubCode::NONEXISTING_ITEM_REFERENCED,
                format!("Image item {id} does not exist"),
            )
        })?;
        Ok(NativeEntry {
            item: Arc::clone(item),
        })
    }

    fn encode(
        &mut self,
        image: &NativeImage,
        encoder: &mut NativeEncoder,
    ) -> Result<NativeEntry, CodecError> {
        let plugin = encoder.plugin();
        let (colorspace, chroma) = (image.colorspace(), image.chroma());
        let (width, height) = image.size();

        let required = required_channels(colorspace, chroma);
        if required.is_empty() {
            return Err(CodecError::new(
                ErrorKind::EncodingError,
                SubCode::UNSUPPORTED_COLOR_CONVERSION,
                format!("Cannot encode a {colorspace:?}/{chroma:?} image"),
            ));
        }
        if plugin.monochrome_only && colorspace != Colorspace::Monochrome {
            return Err(CodecError::new(
                ErrorKind::EncodingError,
                SubCode::ENCODER_ENCODING,
                format!("Encoder '{}' accepts only monochrome images", plugin.id_name),
            ));
        }
        for &channel in required {
            let expected = match channel {
                Channel::Cb | Channel::Cr => chroma.chroma_plane_size(width, height),
                _ => (width, height),
            };
            let actual = image.width(channel).zip(image.height(channel));
            match actual {
                None => {
                    return Err(CodecError::usage(
                        SubCode::NONEXISTING_IMAGE_CHANNEL_REFERENCED,
                        format!("Image has no {} plane", channel.name()),
                    ));
                }
                Some(size) if size != expected => {
                    return Err(CodecError::usage(
                        SubCode::INVALID_PARAMETER_VALUE,
                        format!(
                            "{} plane is {}x{}, expected {}x{}",
                            channel.name(),
                            size.0,
                            size.1,
                            expected.0,
                            expected.1
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        let mut planes = Vec::with_capacity(image.planes().len());
        for plane in image.planes() {
            let stride = plane.row_bytes(chroma);
            let bytes = match plane.shared_data() {
                Some(shared) if plane.stride == stride => shared.clone(),
                _ => SharedSlice::from_vec(plane.packed(chroma)?),
            };
            planes.push(NativePlane::shared(
                plane.channel,
                plane.width,
                plane.height,
                plane.bit_depth,
                stride,
                bytes,
            ));
        }

        let id = self.allocate_id()?;
        let item = Arc::new(ItemRecord {
            id,
            width,
            height,
            colorspace,
            chroma,
            compression: plugin.format,
            packing: encoder.packing(),
            planes,
            metadata: RwLock::new(Vec::new()),
        });
        self.items.push(Arc::clone(&item));
        if self.primary.is_none() {
            self.primary = Some(id);
        }

        log::debug!(
            "native: encoded item {id} {width}x{height} {colorspace:?}/{chroma:?} with '{}' (quality {}, lossless {}, {:?})",
            plugin.id_name,
            encoder.quality(),
            encoder.lossless(),
            encoder.packing()
        );
        Ok(NativeEntry { item })
    }

    fn add_metadata(
        &mut self,
        entry: &NativeEntry,
        payload: &[u8],
        kind: &MetadataKind,
    ) -> Result<(), CodecError> {
        if !self.items.iter().any(|item| Arc::ptr_eq(item, &entry.item)) {
            return Err(CodecError::usage(
                SubCode::NONEXISTING_ITEM_REFERENCED,
                format!("Image item {} does not belong to this container", entry.item.id),
            ));
        }

        let (item_type, content_type, data) = match kind {
            MetadataKind::Exif => {
                let offset = tiff_header_offset(payload).ok_or_else(|| {
                    CodecError::usage(
                        SubCode::INVALID_PARAMETER_VALUE,
                        "Could not find location of TIFF header in Exif metadata",
                    )
                })?;
                let mut data = offset.to_be_bytes().to_vec();
                data.extend_from_slice(payload);
                (EXIF_ITEM_TYPE.to_owned(), None, data)
            }
            MetadataKind::Xmp => (
                XMP_ITEM_TYPE.to_owned(),
                Some(XMP_CONTENT_TYPE.to_owned()),
                payload.to_vec(),
            ),
            MetadataKind::Generic {
                item_type,
                content_type,
            } => {
                if item_type.is_empty() || item_type.contains('\0') {
                    return Err(CodecError::usage(
                        SubCode::INVALID_PARAMETER_VALUE,
                        "Metadata item type must be non-empty text",
                    ));
                }
                (item_type.clone(), content_type.clone(), payload.to_vec())
            }
        };

        let id = self.allocate_id()?;
        entry
            .item
            .metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetadataRecord {
                id,
                item_type,
                content_type,
                data: SharedSlice::from_vec(data),
            });
        Ok(())
    }

    fn write(&self, sink: &mut dyn WriteSink) -> Result<(), CodecError> {
        let chunks = self.serialize()?;
        log::debug!("native: writing {} bytes", chunks.len());
        chunks.for_each(|chunk| sink.write_chunk(chunk))
    }

    fn write_file(&self, path: &Path) -> Result<(), CodecError> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        std::fs::write(path, &bytes).map_err(|err| {
            CodecError::new(
                ErrorKind::EncodingError,
                SubCode::CANNOT_WRITE_OUTPUT_DATA,
                format!("Cannot write output data to {}: {err}", path.display()),
            )
        })
    }
}

/// One image entry. Keeps its item (and the input bytes it reads from)
/// alive on its own.
#[derive(Debug)]
pub struct NativeEntry {
    item: Arc<ItemRecord>,
}

impl NativeEntry {
    fn identity_image(&self) -> NativeImage {
        let item = &self.item;
        let planes = item
            .planes
            .iter()
            .filter_map(|p| {
                p.shared_data().map(|data| {
                    NativePlane::shared(p.channel, p.width, p.height, p.bit_depth, p.stride, data.clone())
                })
            })
            .collect();
        NativeImage::with_planes(item.width, item.height, item.colorspace, item.chroma, planes)
    }
}

impl EngineEntry<NativeEngine> for NativeEntry {
    fn id(&self) -> ItemId {
        self.item.id
    }

    fn width(&self) -> u32 {
        self.item.width
    }

    fn height(&self) -> u32 {
        self.item.height
    }

    fn has_alpha(&self) -> bool {
        self.item.chroma.has_interleaved_alpha() || self.item.plane(Channel::Alpha).is_some()
    }

    fn luma_bits_per_pixel(&self) -> Option<u8> {
        [Channel::Y, Channel::R, Channel::Interleaved]
            .into_iter()
            .find_map(|c| self.item.plane(c))
            .map(|p| p.bit_depth)
    }

    fn chroma_bits_per_pixel(&self) -> Option<u8> {
        [Channel::Cb, Channel::G, Channel::Interleaved]
            .into_iter()
            .find_map(|c| self.item.plane(c))
            .map(|p| p.bit_depth)
    }

    fn decode(
        &self,
        colorspace: Colorspace,
        chroma: Chroma,
        options: &DecodeOptions,
    ) -> Result<NativeImage, CodecError> {
        let item = &self.item;
        let colorspace = match colorspace {
            Colorspace::Undefined => item.colorspace,
            other => other,
        };
        let chroma = match chroma {
            Chroma::Undefined => item.chroma,
            other => other,
        };

        let identity = self.identity_image();
        let image = if (colorspace, chroma) == (item.colorspace, item.chroma) {
            identity
        } else {
            convert::convert(&identity, colorspace, chroma)?
        };

        if options.convert_hdr_to_8bit {
            convert::reduce_to_8bit(image)
        } else {
            Ok(image)
        }
    }

    fn metadata_ids(&self, type_filter: &str) -> Vec<ItemId> {
        self.item.with_metadata(|records| {
            records
                .iter()
                .filter(|r| type_filter.is_empty() || r.item_type == type_filter)
                .map(|r| r.id)
                .collect()
        })
    }

    fn metadata_type(&self, id: ItemId) -> Option<String> {
        self.item.with_metadata(|records| {
            records
                .iter()
                .find(|r| r.id == id)
                .map(|r| r.item_type.clone())
        })
    }

    fn metadata_content_type(&self, id: ItemId) -> Option<String> {
        self.item.with_metadata(|records| {
            records
                .iter()
                .find(|r| r.id == id)
                .and_then(|r| r.content_type.clone())
        })
    }

    fn metadata(&self, id: ItemId) -> Result<Vec<u8>, CodecError> {
        self.item.with_metadata(|records| {
            records
                .iter()
                .find(|r| r.id == id)
                .map(|r| r.data.as_slice().to_vec())
                .ok_or_else(|| {
                    CodecError::usage(
                        SubCode::NONEXISTING_ITEM_REFERENCED,
                        format!("Metadata item {id} does not exist"),
                    )
                })
        })
    }
}
