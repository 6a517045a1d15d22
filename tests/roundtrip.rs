//! Encode, serialize, read back and compare.

use heifkit::{
    ByteAccumulator, Channel, Chroma, CodecError, Colorspace, CompressionFormat, Container,
    DecodeOptions, DecodeRequest, EncoderSession, ErrorKind, PixelBuffer, Source, SubCode,
    WriteSink,
};

fn gradient_rgb(width: u32, height: u32) -> PixelBuffer {
    let mut buffer = PixelBuffer::new(width, height, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
    buffer.add_plane(Channel::Interleaved, width, height, 8).unwrap();
    let mut plane = buffer.plane_mut(Channel::Interleaved).unwrap();
    for y in 0..height as usize {
        for x in 0..width as usize {
            plane.set_sample(y, x, 0, (x * 7 % 256) as u16).unwrap();
            plane.set_sample(y, x, 1, (y * 13 % 256) as u16).unwrap();
            plane.set_sample(y, x, 2, ((x + y) % 256) as u16).unwrap();
        }
    }
    drop(plane);
    buffer
}

fn gray(width: u32, height: u32, value: u16) -> PixelBuffer {
    let mut buffer =
        PixelBuffer::new(width, height, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
    buffer.add_plane(Channel::Y, width, height, 8).unwrap();
    buffer.plane_mut(Channel::Y).unwrap().fill(value).unwrap();
    buffer
}

#[test]
fn lossless_rgb_roundtrip_keeps_every_byte() {
    let original = gradient_rgb(17, 9);
    for preset in ["store", "packbits"] {
        let mut container = Container::new();
        let mut encoder = EncoderSession::new(CompressionFormat::Uncompressed).unwrap();
        encoder.set_lossless(true).unwrap();
        encoder.encode(&mut container, &original, preset).unwrap();
        let bytes = container.write_to_bytes().unwrap();

        let read = Container::from_bytes(bytes).unwrap();
        let handle = read.primary_image_handle().unwrap();
        assert_eq!((handle.width(), handle.height()), (17, 9));
        assert!(!handle.has_alpha_channel());
        assert_eq!(handle.luma_bits_per_pixel(), Some(8));

        let decoded = handle.decode(Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
        let view = decoded.plane(Channel::Interleaved).unwrap();
        assert_eq!(view.shape(), &[9, 17, 3]);
        assert_eq!(view.item_size(), 1);
        assert_eq!(
            view.to_packed_vec(),
            original.plane(Channel::Interleaved).unwrap().to_packed_vec(),
            "preset {preset}"
        );
    }
}

#[test]
fn gray_8x8_plane_view() {
    let original = gray(8, 8, 128);
    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &original, "")
        .unwrap();
    let read = Container::from_bytes(container.write_to_bytes().unwrap()).unwrap();
    let decoded = read
        .primary_image_handle()
        .unwrap()
        .decode(Colorspace::Undefined, Chroma::Undefined)
        .unwrap();

    for buffer in [&original, &decoded] {
        let view = buffer.plane(Channel::Y).unwrap();
        assert_eq!(view.shape(), &[8, 8]);
        assert_eq!(view.ndim(), 2);
        assert_eq!(view.item_size(), 1);
        assert_eq!(view.strides()[1], 1);
        assert!(view.strides()[0] >= 8);
        assert!(view.readonly());
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(view.sample(y, x, 0), Some(128), "({y}, {x})");
            }
        }
    }
}

#[test]
fn gray_8x8_decodes_to_rgb() {
    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &gray(8, 8, 128), "")
        .unwrap();
    let read = Container::from_bytes(container.write_to_bytes().unwrap()).unwrap();

    let decoded = read
        .primary_image_handle()
        .unwrap()
        .decode(Colorspace::Rgb, Chroma::InterleavedRgb)
        .unwrap();
    assert_eq!(decoded.chroma(), Chroma::InterleavedRgb);
    let view = decoded.plane(Channel::Interleaved).unwrap();
    assert_eq!(view.shape(), &[8, 8, 3]);
    assert_eq!(view.strides()[1..], [3, 1]);
    assert!(view.to_packed_vec().iter().all(|&v| v == 128));
}

#[test]
fn written_ids_match_read_ids() {
    let mut container = Container::new();
    let mut encoder = EncoderSession::new(CompressionFormat::Uncompressed).unwrap();
    let first = encoder.encode(&mut container, &gray(4, 4, 1), "").unwrap();
    encoder.encode(&mut container, &gradient_rgb(5, 3), "").unwrap();
    encoder.encode(&mut container, &gray(2, 6, 3), "packbits").unwrap();
    assert_eq!(container.number_of_top_level_images(), 3);

    let read = Container::from_bytes(container.write_to_bytes().unwrap()).unwrap();
    assert_eq!(read.top_level_image_ids(), container.top_level_image_ids());
    assert_eq!(read.primary_image_handle().unwrap().id(), first.id());

    let sizes: Vec<_> = read
        .top_level_image_handles()
        .map(|handle| {
            let handle = handle.unwrap();
            (handle.width(), handle.height())
        })
        .collect();
    assert_eq!(sizes, [(4, 4), (5, 3), (2, 6)]);
}

#[test]
fn high_bit_depth_survives_and_reduces() {
    let mut buffer = PixelBuffer::new(3, 2, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
    buffer.add_plane(Channel::Y, 3, 2, 12).unwrap();
    buffer.plane_mut(Channel::Y).unwrap().fill(0x0ABC).unwrap();
    assert_eq!(buffer.plane(Channel::Y).unwrap().item_size(), 2);

    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &buffer, "packbits")
        .unwrap();
    let read = Container::from_bytes(container.write_to_bytes().unwrap()).unwrap();
    let handle = read.primary_image_handle().unwrap();
    assert_eq!(handle.luma_bits_per_pixel(), Some(12));

    let full = handle.decode(Colorspace::Undefined, Chroma::Undefined).unwrap();
    assert_eq!(full.bit_depth(Channel::Y), Some(12));
    assert_eq!(full.plane(Channel::Y).unwrap().sample(1, 2, 0), Some(0x0ABC));

    let reduced = DecodeRequest::new(&handle)
        .with_options(DecodeOptions::new().with_convert_hdr_to_8bit(true))
        .decode()
        .unwrap();
    assert_eq!(reduced.bit_depth(Channel::Y), Some(8));
    assert_eq!(reduced.plane(Channel::Y).unwrap().sample(0, 0, 0), Some(0xAB));
}

#[test]
fn file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gray.hkit");

    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &gray(6, 4, 200), "store")
        .unwrap();
    container.write_to_file(&path).unwrap();

    let read = Container::from_file(&path).unwrap();
    assert_eq!(read.source(), &Source::File(path.clone()));
    let decoded = read
        .primary_image_handle()
        .unwrap()
        .decode(Colorspace::Undefined, Chroma::Undefined)
        .unwrap();
    assert_eq!(decoded.plane(Channel::Y).unwrap().sample(3, 5, 0), Some(200));
    assert_eq!(std::fs::read(&path).unwrap(), container.write_to_bytes().unwrap());
}

struct ChunkLog {
    chunks: Vec<Vec<u8>>,
}

impl WriteSink for ChunkLog {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        self.chunks.push(chunk.to_vec());
        Ok(())
    }
}

#[test]
fn streamed_chunks_concatenate_to_bytes() {
    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &gradient_rgb(8, 8), "")
        .unwrap();

    let mut log = ChunkLog { chunks: Vec::new() };
    container.write_to(&mut log).unwrap();
    assert!(!log.chunks.is_empty());
    assert_eq!(log.chunks.concat(), container.write_to_bytes().unwrap());

    let mut accumulator = ByteAccumulator::new();
    container.write_to(&mut accumulator).unwrap();
    assert_eq!(accumulator.into_bytes(), log.chunks.concat());
}

/// Accepts chunks until call number `fail_at`, which fails like an
/// allocation failure.
struct FailingSink {
    calls: usize,
    fail_at: usize,
    delivered: Vec<Vec<u8>>,
}

impl WriteSink for FailingSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(CodecError::new(
                ErrorKind::MemoryAllocationError,
                SubCode::UNSPECIFIED,
                "sink is full",
            ));
        }
        self.delivered.push(chunk.to_vec());
        Ok(())
    }
}

fn two_image_container() -> Container {
    let mut container = Container::new();
    let mut encoder = EncoderSession::new(CompressionFormat::Uncompressed).unwrap();
    encoder.encode(&mut container, &gray(8, 8, 10), "store").unwrap();
    encoder.encode(&mut container, &gray(4, 4, 20), "store").unwrap();
    container
}

#[test]
fn failing_sink_stops_the_stream() {
    let container = two_image_container();
    let mut log = ChunkLog { chunks: Vec::new() };
    container.write_to(&mut log).unwrap();
    assert!(log.chunks.len() > 2);

    let mut sink = FailingSink {
        calls: 0,
        fail_at: 2,
        delivered: Vec::new(),
    };
    let err = container.write_to(&mut sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoryAllocationError);
    assert_eq!(sink.calls, 2);
    assert_eq!(sink.delivered, log.chunks[..1]);
}

#[test]
fn capped_accumulator_fails_the_write() {
    let container = two_image_container();
    let full = container.write_to_bytes().unwrap();

    let mut capped = ByteAccumulator::new().with_max_len(full.len() - 1);
    let err = container.write_to(&mut capped).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MemoryAllocationError);
    assert!(capped.len() < full.len());
    assert_eq!(capped.into_bytes(), full[..capped_len(&container, full.len() - 1)]);

    let mut exact = ByteAccumulator::new().with_max_len(full.len());
    container.write_to(&mut exact).unwrap();
    assert_eq!(exact.into_bytes(), full);
}

/// Bytes a capped sink holds when it refuses the first chunk that would
/// cross `max_len`.
fn capped_len(container: &Container, max_len: usize) -> usize {
    let mut log = ChunkLog { chunks: Vec::new() };
    container.write_to(&mut log).unwrap();
    let mut len = 0;
    for chunk in &log.chunks {
        if len + chunk.len() > max_len {
            break;
        }
        len += chunk.len();
    }
    len
}

#[test]
fn handles_and_buffers_outlive_the_container() {
    let bytes = {
        let mut container = Container::new();
        EncoderSession::new(CompressionFormat::Uncompressed)
            .unwrap()
            .encode(&mut container, &gray(4, 4, 77), "")
            .unwrap();
        container.write_to_bytes().unwrap()
    };

    let handle = {
        let container = Container::from_bytes(bytes).unwrap();
        container.primary_image_handle().unwrap()
    };
    let mut decoded = handle.decode(Colorspace::Undefined, Chroma::Undefined).unwrap();
    drop(handle);

    // Writing into a decoded plane leaves the next decode untouched
    decoded.plane_mut(Channel::Y).unwrap().set_sample(0, 0, 0, 1).unwrap();
    assert_eq!(decoded.plane(Channel::Y).unwrap().sample(0, 0, 0), Some(1));
    assert_eq!(decoded.plane(Channel::Y).unwrap().sample(0, 1, 0), Some(77));
}
