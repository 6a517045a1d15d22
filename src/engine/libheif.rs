//! Engine backed by the system libheif library.
//!
//! Every raw libheif object is owned by exactly one wrapper that releases it
//! on drop. Image handles share the context they came from through an
//! `Arc`, so they stay valid after the container is dropped. A handle may
//! move to another thread while its container keeps encoding, so every call
//! that touches a context or one of its handles holds the context's lock.

#![allow(unsafe_code)]

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use libheif_sys as lh;

use crate::config::DecodeOptions;
use crate::engine::{
    Engine, EngineEncoder, EngineEntry, EngineImage, EngineSession, ItemId, PlaneMut, PlaneRef,
    SharedBytes,
};
use crate::error::{CodecError, ErrorKind, SubCode};
use crate::format::CompressionFormat;
use crate::limits::Limits;
use crate::metadata::MetadataKind;
use crate::pixel::{Channel, Chroma, Colorspace};
use crate::registry::EncoderDescriptor;
use crate::writer::WriteSink;

/// The libheif engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibHeif;

fn init() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        // SAFETY: null parameters are allowed; called once per process.
        let err = unsafe { lh::heif_init(ptr::null_mut()) };
        if let Err(err) = check(err) {
            log::warn!("libheif: initialization failed: {err}");
        }
    });
}

/// Copy a C string owned by libheif. Null becomes `None`.
fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: libheif returns NUL-terminated strings valid until the owning
    // object is released; we copy immediately.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn check(err: lh::heif_error) -> Result<(), CodecError> {
    let message = owned_str(err.message).unwrap_or_default();
    match CodecError::from_status(err.code as i32, err.subcode as i32, message) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

fn c_string(what: &str, text: &str) -> Result<CString, CodecError> {
    CString::new(text).map_err(|_| {
        CodecError::usage(
            SubCode::INVALID_PARAMETER_VALUE,
            format!("{what} contains a NUL byte"),
        )
    })
}

fn c_path(path: &Path) -> Result<CString, CodecError> {
    CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
        CodecError::usage(
            SubCode::INVALID_PARAMETER_VALUE,
            format!("Path {} contains a NUL byte", path.display()),
        )
    })
}

fn c_len(len: usize) -> Result<c_int, CodecError> {
    c_int::try_from(len).map_err(|_| {
        CodecError::usage(
            SubCode::INVALID_PARAMETER_VALUE,
            format!("{len} bytes exceed the engine's size limit"),
        )
    })
}

fn colorspace_code(colorspace: Colorspace) -> lh::heif_colorspace {
    colorspace.code() as lh::heif_colorspace
}

fn chroma_code(chroma: Chroma) -> lh::heif_chroma {
    chroma.code() as lh::heif_chroma
}

fn channel_code(channel: Channel) -> lh::heif_channel {
    channel.code() as lh::heif_channel
}

fn format_code(format: CompressionFormat) -> lh::heif_compression_format {
    format.code() as lh::heif_compression_format
}

/// A `heif_context` plus the input bytes it reads from.
struct ContextInner {
    ctx: *mut lh::heif_context,
    state: Mutex<ContextState>,
}

#[derive(Default)]
struct ContextState {
    /// Every buffer handed to libheif. A failed read may leave the context
    /// pointing into its buffer, so none are released before the context.
    inputs: Vec<SharedBytes>,
    read: bool,
}

impl ContextInner {
    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// SAFETY: `ctx` and every handle taken from it are only used while `state`
// is locked, so libheif never sees two threads on one context.
unsafe impl Send for ContextInner {}
unsafe impl Sync for ContextInner {}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // SAFETY: allocated by heif_context_alloc and freed only here.
        // `state` and its inputs are dropped after this.
        unsafe { lh::heif_context_free(self.ctx) };
    }
}

/// Owns a context; see [`EngineSession`].
pub struct LibHeifSession {
    inner: Arc<ContextInner>,
}

impl LibHeifSession {
    fn ctx(&self) -> *mut lh::heif_context {
        self.inner.ctx
    }

    fn entry_from(&self, handle: *mut lh::heif_image_handle) -> LibHeifEntry {
        LibHeifEntry {
            handle,
            ctx: Arc::clone(&self.inner),
        }
    }
}

struct WriteState<'a> {
    sink: &'a mut dyn WriteSink,
    error: Option<CodecError>,
}

fn status(code: lh::heif_error_code, subcode: lh::heif_suberror_code, message: &'static CStr) -> lh::heif_error {
    lh::heif_error {
        code,
        subcode,
        message: message.as_ptr(),
    }
}

unsafe extern "C" fn write_chunk(
    _ctx: *mut lh::heif_context,
    data: *const c_void,
    size: usize,
    userdata: *mut c_void,
) -> lh::heif_error {
    // SAFETY: userdata is the `WriteState` passed to heif_context_write,
    // alive and exclusively ours for the duration of that call.
    let state = unsafe { &mut *userdata.cast::<WriteState<'_>>() };
    let chunk: &[u8] = if size == 0 || data.is_null() {
        &[]
    } else {
        // SAFETY: libheif hands out `size` readable bytes at `data`.
        unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size) }
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| state.sink.write_chunk(chunk)));
    let err = match result {
        Ok(Ok(())) => {
            return status(
                lh::heif_error_code_heif_error_Ok,
                lh::heif_suberror_code_heif_suberror_Unspecified,
                c"Success",
            );
        }
        Ok(Err(err)) => err,
        Err(_) => CodecError::new(
            ErrorKind::EncodingError,
            SubCode::CANNOT_WRITE_OUTPUT_DATA,
            "Write sink panicked",
        ),
    };

    let reply = if err.kind() == ErrorKind::MemoryAllocationError {
        status(
            lh::heif_error_code_heif_error_Memory_allocation_error,
            lh::heif_suberror_code_heif_suberror_Unspecified,
            c"Memory allocation failed during write",
        )
    } else {
        status(
            lh::heif_error_code_heif_error_Encoding_error,
            lh::heif_suberror_code_heif_suberror_Cannot_write_output_data,
            c"Write sink rejected output data",
        )
    };
    state.error = Some(err);
    reply
}

impl EngineSession<LibHeif> for LibHeifSession {
    fn set_limits(&mut self, limits: &Limits) {
        let side = limits.max_width.into_iter().chain(limits.max_height).max();
        if let Some(side) = side {
            let side = c_int::try_from(side).unwrap_or(c_int::MAX);
            let _state = self.inner.lock();
            // SAFETY: valid context.
            unsafe { lh::heif_context_set_maximum_image_size_limit(self.ctx(), side) };
        }
    }

    fn read_file(&mut self, path: &Path) -> Result<(), CodecError> {
        let path = c_path(path)?;
        let mut state = self.inner.lock();
        ensure_unread(&state)?;
        // SAFETY: valid context and NUL-terminated path.
        check(unsafe { lh::heif_context_read_from_file(self.ctx(), path.as_ptr(), ptr::null()) })?;
        state.read = true;
        Ok(())
    }

    fn read_memory(&mut self, data: SharedBytes) -> Result<(), CodecError> {
        let mut state = self.inner.lock();
        ensure_unread(&state)?;
        state.inputs.push(Arc::clone(&data));
        // SAFETY: the bytes stay in `inputs` until the context is freed, as
        // read_from_memory_without_copy requires.
        check(unsafe {
            lh::heif_context_read_from_memory_without_copy(
                self.ctx(),
                data.as_ptr().cast(),
                data.len(),
                ptr::null(),
            )
        })?;
        state.read = true;
        Ok(())
    }

    fn primary_entry(&self) -> Result<LibHeifEntry, CodecError> {
        let _state = self.inner.lock();
        let mut handle = ptr::null_mut();
        // SAFETY: valid context and out pointer.
        check(unsafe { lh::heif_context_get_primary_image_handle(self.ctx(), &mut handle) })?;
        Ok(self.entry_from(handle))
    }

    fn top_level_ids(&self) -> Vec<ItemId> {
        let _state = self.inner.lock();
        // SAFETY: valid context; the list is sized from the count.
        unsafe {
            let count = lh::heif_context_get_number_of_top_level_images(self.ctx());
            let mut ids = vec![0; usize::try_from(count).unwrap_or(0)];
            let filled =
                lh::heif_context_get_list_of_top_level_image_IDs(self.ctx(), ids.as_mut_ptr(), count);
            ids.truncate(usize::try_from(filled).unwrap_or(0));
            ids
        }
    }

    fn entry(&self, id: ItemId) -> Result<LibHeifEntry, CodecError> {
        let _state = self.inner.lock();
        let mut handle = ptr::null_mut();
        // SAFETY: valid context and out pointer.
        check(unsafe { lh::heif_context_get_image_handle(self.ctx(), id, &mut handle) })?;
        Ok(self.entry_from(handle))
    }

    fn encode(
        &mut self,
        image: &LibHeifImage,
        encoder: &mut LibHeifEncoder,
    ) -> Result<LibHeifEntry, CodecError> {
        let _state = self.inner.lock();
        let mut handle = ptr::null_mut();
        // SAFETY: all pointers are live objects owned by their wrappers.
        check(unsafe {
            lh::heif_context_encode_image(
                self.ctx(),
                image.image,
                encoder.encoder,
                ptr::null(),
                &mut handle,
            )
        })?;
        Ok(self.entry_from(handle))
    }

    fn add_metadata(
        &mut self,
        entry: &LibHeifEntry,
        payload: &[u8],
        kind: &MetadataKind,
    ) -> Result<(), CodecError> {
        let (ctx, handle) = (self.ctx(), entry.handle);
        let (data, size) = (payload.as_ptr().cast::<c_void>(), c_len(payload.len())?);
        let _state = self.inner.lock();
        // SAFETY: live context and handle; libheif copies the payload.
        let err = match kind {
            MetadataKind::Exif => unsafe { lh::heif_context_add_exif_metadata(ctx, handle, data, size) },
            MetadataKind::Xmp => unsafe { lh::heif_context_add_XMP_metadata(ctx, handle, data, size) },
            MetadataKind::Generic {
                item_type,
                content_type,
            } => {
                let item_type = c_string("Item type", item_type)?;
                let content_type = content_type
                    .as_deref()
                    .map(|c| c_string("Content type", c))
                    .transpose()?;
                unsafe {
                    lh::heif_context_add_generic_metadata(
                        ctx,
                        handle,
                        data,
                        size,
                        item_type.as_ptr(),
                        content_type.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                    )
                }
            }
        };
        check(err)
    }

    fn write(&self, sink: &mut dyn WriteSink) -> Result<(), CodecError> {
        let _state = self.inner.lock();
        let mut state = WriteState { sink, error: None };
        let mut writer = lh::heif_writer {
            writer_api_version: 1,
            write: Some(write_chunk),
        };
        // SAFETY: `writer` and `state` outlive the call; the callback only
        // touches `state` through userdata.
        let err = unsafe {
            lh::heif_context_write(
                self.ctx(),
                &mut writer,
                (&mut state as *mut WriteState<'_>).cast::<c_void>(),
            )
        };
        match state.error.take() {
            Some(err) => Err(err),
            None => check(err),
        }
    }

    fn write_file(&self, path: &Path) -> Result<(), CodecError> {
        let path = c_path(path)?;
        let _state = self.inner.lock();
        // SAFETY: valid context and NUL-terminated path.
        check(unsafe { lh::heif_context_write_to_file(self.ctx(), path.as_ptr()) })
    }
}

/// An image handle plus a reference to its context.
pub struct LibHeifEntry {
    handle: *mut lh::heif_image_handle,
    ctx: Arc<ContextInner>,
}

// SAFETY: the handle is owned by this wrapper and only used under the
// context lock.
unsafe impl Send for LibHeifEntry {}

impl Drop for LibHeifEntry {
    fn drop(&mut self) {
        let _state = self.ctx.lock();
        // SAFETY: obtained from libheif and released only here.
        unsafe { lh::heif_image_handle_release(self.handle) };
    }
}

fn ensure_unread(state: &ContextState) -> Result<(), CodecError> {
    if state.read {
        return Err(CodecError::usage(
            SubCode::UNSPECIFIED,
            "Context already holds a parsed file",
        ));
    }
    Ok(())
}

fn bits(value: c_int) -> Option<u8> {
    u8::try_from(value).ok().filter(|&b| b > 0)
}

impl EngineEntry<LibHeif> for LibHeifEntry {
    fn id(&self) -> ItemId {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        unsafe { lh::heif_image_handle_get_item_id(self.handle) }
    }

    fn width(&self) -> u32 {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        u32::try_from(unsafe { lh::heif_image_handle_get_width(self.handle) }).unwrap_or(0)
    }

    fn height(&self) -> u32 {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        u32::try_from(unsafe { lh::heif_image_handle_get_height(self.handle) }).unwrap_or(0)
    }

    fn has_alpha(&self) -> bool {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        unsafe { lh::heif_image_handle_has_alpha_channel(self.handle) != 0 }
    }

    fn luma_bits_per_pixel(&self) -> Option<u8> {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        bits(unsafe { lh::heif_image_handle_get_luma_bits_per_pixel(self.handle) })
    }

    fn chroma_bits_per_pixel(&self) -> Option<u8> {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        bits(unsafe { lh::heif_image_handle_get_chroma_bits_per_pixel(self.handle) })
    }

    fn decode(
        &self,
        colorspace: Colorspace,
        chroma: Chroma,
        options: &DecodeOptions,
    ) -> Result<LibHeifImage, CodecError> {
        let mut image = ptr::null_mut();
        let _state = self.ctx.lock();
        // SAFETY: options are allocated and freed here; the handle is live.
        let err = unsafe {
            let raw = lh::heif_decoding_options_alloc();
            if raw.is_null() {
                return Err(CodecError::out_of_memory("Cannot allocate decoding options"));
            }
            (*raw).ignore_transformations = u8::from(options.ignore_transformations);
            (*raw).convert_hdr_to_8bit = u8::from(options.convert_hdr_to_8bit);
            let err = lh::heif_decode_image(
                self.handle,
                &mut image,
                colorspace_code(colorspace),
                chroma_code(chroma),
                raw,
            );
            lh::heif_decoding_options_free(raw);
            err
        };
        check(err)?;
        Ok(LibHeifImage { image })
    }

    fn metadata_ids(&self, type_filter: &str) -> Vec<ItemId> {
        let filter = match c_string("Type filter", type_filter) {
            Ok(filter) => filter,
            Err(_) => return Vec::new(),
        };
        let filter_ptr = if type_filter.is_empty() {
            ptr::null()
        } else {
            filter.as_ptr()
        };
        let _state = self.ctx.lock();
        // SAFETY: live handle; the list is sized from the count.
        unsafe {
            let count = lh::heif_image_handle_get_number_of_metadata_blocks(self.handle, filter_ptr);
            let mut ids = vec![0; usize::try_from(count).unwrap_or(0)];
            let filled = lh::heif_image_handle_get_list_of_metadata_block_IDs(
                self.handle,
                filter_ptr,
                ids.as_mut_ptr(),
                count,
            );
            ids.truncate(usize::try_from(filled).unwrap_or(0));
            ids
        }
    }

    fn metadata_type(&self, id: ItemId) -> Option<String> {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        owned_str(unsafe { lh::heif_image_handle_get_metadata_type(self.handle, id) })
    }

    fn metadata_content_type(&self, id: ItemId) -> Option<String> {
        let _state = self.ctx.lock();
        // SAFETY: live handle.
        owned_str(unsafe { lh::heif_image_handle_get_metadata_content_type(self.handle, id) })
            .filter(|c| !c.is_empty())
    }

    fn metadata(&self, id: ItemId) -> Result<Vec<u8>, CodecError> {
        let _state = self.ctx.lock();
        // SAFETY: live handle; the buffer holds exactly the reported size.
        unsafe {
            let size = lh::heif_image_handle_get_metadata_size(self.handle, id);
            let mut data = vec![0u8; size];
            check(lh::heif_image_handle_get_metadata(
                self.handle,
                id,
                data.as_mut_ptr().cast(),
            ))?;
            Ok(data)
        }
    }
}

/// A decoded or hand-built `heif_image`.
pub struct LibHeifImage {
    image: *mut lh::heif_image,
}

// SAFETY: the image is owned exclusively by this wrapper.
unsafe impl Send for LibHeifImage {}

impl Drop for LibHeifImage {
    fn drop(&mut self) {
        // SAFETY: obtained from libheif and released only here.
        unsafe { lh::heif_image_release(self.image) };
    }
}

impl LibHeifImage {
    fn plane_len(&self, channel: Channel, stride: c_int) -> usize {
        let height = EngineImage::height(self, channel).unwrap_or(0) as usize;
        usize::try_from(stride).unwrap_or(0) * height
    }
}

impl EngineImage for LibHeifImage {
    fn colorspace(&self) -> Colorspace {
        // SAFETY: live image.
        let code = unsafe { lh::heif_image_get_colorspace(self.image) };
        Colorspace::from_code(code as i32).unwrap_or_else(|| {
            log::warn!("libheif: unknown colorspace {code}");
            Colorspace::Undefined
        })
    }

    fn chroma(&self) -> Chroma {
        // SAFETY: live image.
        let code = unsafe { lh::heif_image_get_chroma_format(self.image) };
        Chroma::from_code(code as i32).unwrap_or_else(|| {
            log::warn!("libheif: unknown chroma {code}");
            Chroma::Undefined
        })
    }

    fn has_channel(&self, channel: Channel) -> bool {
        // SAFETY: live image.
        unsafe { lh::heif_image_has_channel(self.image, channel_code(channel)) != 0 }
    }

    fn width(&self, channel: Channel) -> Option<u32> {
        // SAFETY: live image.
        u32::try_from(unsafe { lh::heif_image_get_width(self.image, channel_code(channel)) }).ok()
    }

    fn height(&self, channel: Channel) -> Option<u32> {
        // SAFETY: live image.
        u32::try_from(unsafe { lh::heif_image_get_height(self.image, channel_code(channel)) }).ok()
    }

    fn bit_depth(&self, channel: Channel) -> Option<u8> {
        // SAFETY: live image.
        bits(unsafe { lh::heif_image_get_bits_per_pixel_range(self.image, channel_code(channel)) })
    }

    fn add_plane(
        &mut self,
        channel: Channel,
        width: u32,
        height: u32,
        bit_depth: u8,
    ) -> Result<(), CodecError> {
        let width = c_len(width as usize)?;
        let height = c_len(height as usize)?;
        // SAFETY: live image.
        check(unsafe {
            lh::heif_image_add_plane(
                self.image,
                channel_code(channel),
                width,
                height,
                c_int::from(bit_depth),
            )
        })
    }

    fn plane(&self, channel: Channel) -> Option<PlaneRef<'_>> {
        let mut stride: c_int = 0;
        // SAFETY: live image; the plane holds stride * height bytes and
        // lives as long as the image, which the returned borrow is tied to.
        unsafe {
            let data = lh::heif_image_get_plane_readonly(self.image, channel_code(channel), &mut stride);
            if data.is_null() {
                return None;
            }
            let len = self.plane_len(channel, stride);
            Some(PlaneRef {
                data: std::slice::from_raw_parts(data, len),
                stride: usize::try_from(stride).ok()?,
            })
        }
    }

    fn plane_mut(&mut self, channel: Channel) -> Result<Option<PlaneMut<'_>>, CodecError> {
        let mut stride: c_int = 0;
        // SAFETY: as in `plane`; `&mut self` makes the borrow exclusive.
        unsafe {
            let data = lh::heif_image_get_plane(self.image, channel_code(channel), &mut stride);
            let Ok(stride_bytes) = usize::try_from(stride) else {
                return Ok(None);
            };
            if data.is_null() {
                return Ok(None);
            }
            let len = self.plane_len(channel, stride);
            Ok(Some(PlaneMut {
                data: std::slice::from_raw_parts_mut(data, len),
                stride: stride_bytes,
            }))
        }
    }

    fn try_clone(&self) -> Result<Self, CodecError> {
        let channels: Vec<Channel> = Channel::ALL
            .into_iter()
            .filter(|&c| self.has_channel(c))
            .collect();
        // the first channel in Channel::ALL order is full resolution
        let size = channels
            .first()
            .and_then(|&c| self.width(c).zip(self.height(c)));
        let Some((width, height)) = size else {
            return Err(CodecError::usage(
                SubCode::UNSPECIFIED,
                "Cannot clone an image without planes",
            ));
        };

        let mut copy = LibHeif::new_image(width, height, self.colorspace(), self.chroma())?;
        for channel in channels {
            let (Some(w), Some(h), Some(depth)) =
                (self.width(channel), self.height(channel), self.bit_depth(channel))
            else {
                continue;
            };
            copy.add_plane(channel, w, h, depth)?;
            let (Some(src), Some(dst)) = (self.plane(channel), copy.plane_mut(channel)?) else {
                continue;
            };
            let row = src.stride.min(dst.stride);
            for (s, d) in src.data.chunks(src.stride).zip(dst.data.chunks_mut(dst.stride)) {
                let n = row.min(s.len()).min(d.len());
                d[..n].copy_from_slice(&s[..n]);
            }
        }
        Ok(copy)
    }
}

/// A `heif_encoder` bound to one plugin.
pub struct LibHeifEncoder {
    encoder: *mut lh::heif_encoder,
    format: CompressionFormat,
}

// SAFETY: the encoder is owned exclusively by this wrapper.
unsafe impl Send for LibHeifEncoder {}

impl Drop for LibHeifEncoder {
    fn drop(&mut self) {
        // SAFETY: obtained from libheif and released only here.
        unsafe { lh::heif_encoder_release(self.encoder) };
    }
}

impl EngineEncoder for LibHeifEncoder {
    fn name(&self) -> String {
        // SAFETY: live encoder.
        owned_str(unsafe { lh::heif_encoder_get_name(self.encoder) }).unwrap_or_default()
    }

    fn compression_format(&self) -> CompressionFormat {
        self.format
    }

    fn set_lossy_quality(&mut self, quality: i32) -> Result<(), CodecError> {
        // SAFETY: live encoder.
        check(unsafe { lh::heif_encoder_set_lossy_quality(self.encoder, quality) })
    }

    fn set_lossless(&mut self, enable: bool) -> Result<(), CodecError> {
        // SAFETY: live encoder.
        check(unsafe { lh::heif_encoder_set_lossless(self.encoder, c_int::from(enable)) })
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), CodecError> {
        let name = c_string("Parameter name", name)?;
        let value = c_string("Parameter value", value)?;
        // SAFETY: live encoder and NUL-terminated strings.
        check(unsafe { lh::heif_encoder_set_parameter(self.encoder, name.as_ptr(), value.as_ptr()) })
    }

    fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        // SAFETY: the list is null-terminated and owned by the encoder.
        unsafe {
            let mut param = lh::heif_encoder_list_parameters(self.encoder);
            while !param.is_null() && !(*param).is_null() {
                names.extend(owned_str(lh::heif_encoder_parameter_get_name(*param)));
                param = param.add(1);
            }
        }
        names
    }
}

/// Raw descriptors matching the filters, via the count-then-fill query.
fn raw_descriptors(
    format_filter: CompressionFormat,
    name_filter: Option<&str>,
) -> Vec<*const lh::heif_encoder_descriptor> {
    init();
    let name = match name_filter.map(|n| c_string("Name filter", n)).transpose() {
        Ok(name) => name,
        Err(_) => return Vec::new(),
    };
    let name_ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());
    // SAFETY: the output array is sized from the count query.
    unsafe {
        let count =
            lh::heif_get_encoder_descriptors(format_code(format_filter), name_ptr, ptr::null_mut(), 0);
        let mut list = vec![ptr::null(); usize::try_from(count).unwrap_or(0)];
        let filled = lh::heif_get_encoder_descriptors(
            format_code(format_filter),
            name_ptr,
            list.as_mut_ptr(),
            count,
        );
        list.truncate(usize::try_from(filled).unwrap_or(0));
        list
    }
}

fn describe(raw: *const lh::heif_encoder_descriptor) -> EncoderDescriptor {
    // SAFETY: descriptors are static for the lifetime of the library.
    unsafe {
        let code = lh::heif_encoder_descriptor_get_compression_format(raw);
        EncoderDescriptor {
            id_name: owned_str(lh::heif_encoder_descriptor_get_id_name(raw)).unwrap_or_default(),
            name: owned_str(lh::heif_encoder_descriptor_get_name(raw)).unwrap_or_default(),
            compression_format: CompressionFormat::from_code(code as i32)
                .unwrap_or(CompressionFormat::Undefined),
            supports_lossy: lh::heif_encoder_descriptor_supports_lossy_compression(raw) != 0,
            supports_lossless: lh::heif_encoder_descriptor_supports_lossless_compression(raw) != 0,
        }
    }
}

fn no_encoder(what: String) -> CodecError {
    CodecError::new(
        ErrorKind::EncoderPluginError,
        SubCode::UNSUPPORTED_CODEC,
        format!("No libheif encoder for {what}"),
    )
}

impl Engine for LibHeif {
    type Session = LibHeifSession;
    type Entry = LibHeifEntry;
    type Image = LibHeifImage;
    type Encoder = LibHeifEncoder;

    const NAME: &'static str = "libheif";

    fn new_session() -> Result<LibHeifSession, CodecError> {
        init();
        // SAFETY: plain allocation; ownership passes to ContextInner.
        let ctx = unsafe { lh::heif_context_alloc() };
        if ctx.is_null() {
            return Err(CodecError::out_of_memory("Cannot allocate libheif context"));
        }
        Ok(LibHeifSession {
            inner: Arc::new(ContextInner {
                ctx,
                state: Mutex::new(ContextState::default()),
            }),
        })
    }

    fn new_image(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        chroma: Chroma,
    ) -> Result<LibHeifImage, CodecError> {
        init();
        let mut image = ptr::null_mut();
        // SAFETY: out pointer is valid; ownership passes to LibHeifImage.
        check(unsafe {
            lh::heif_image_create(
                c_len(width as usize)?,
                c_len(height as usize)?,
                colorspace_code(colorspace),
                chroma_code(chroma),
                &mut image,
            )
        })?;
        Ok(LibHeifImage { image })
    }

    fn encoder_descriptors(
        format_filter: CompressionFormat,
        name_filter: Option<&str>,
    ) -> Vec<EncoderDescriptor> {
        raw_descriptors(format_filter, name_filter)
            .into_iter()
            .map(describe)
            .filter(|d| d.matches(format_filter, name_filter))
            .collect()
    }

    fn encoder_for_format(format: CompressionFormat) -> Result<LibHeifEncoder, CodecError> {
        let raw = raw_descriptors(format, None);
        let first = raw
            .first()
            .copied()
            .ok_or_else(|| no_encoder(format!("format {}", format.name())))?;
        open_encoder(first)
    }

    fn encoder_for_descriptor(
        descriptor: &EncoderDescriptor,
    ) -> Result<LibHeifEncoder, CodecError> {
        let raw = raw_descriptors(descriptor.compression_format, Some(&descriptor.id_name))
            .into_iter()
            .find(|&raw| describe(raw) == *descriptor)
            .ok_or_else(|| no_encoder(format!("plugin '{}'", descriptor.id_name)))?;
        open_encoder(raw)
    }
}

fn open_encoder(raw: *const lh::heif_encoder_descriptor) -> Result<LibHeifEncoder, CodecError> {
    let session = LibHeif::new_session()?;
    let mut encoder = ptr::null_mut();
    // SAFETY: the descriptor comes from libheif; the encoder does not
    // borrow the context, which is freed when `session` drops.
    check(unsafe { lh::heif_context_get_encoder(session.ctx(), raw, &mut encoder) })?;
    let format = describe(raw).compression_format;
    Ok(LibHeifEncoder { encoder, format })
}
