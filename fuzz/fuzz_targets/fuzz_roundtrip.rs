#![no_main]

//! Encode arbitrary pixels, write, read back and compare plane bytes.

use arbitrary::Arbitrary;
use heifkit::{Channel, Chroma, Colorspace, CompressionFormat, Container, EncoderSession, PixelBuffer};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct RoundtripInput {
    width: u8,
    height: u8,
    rgb: bool,
    packbits: bool,
    fill: Vec<u8>,
}

fuzz_target!(|input: RoundtripInput| {
    let width = u32::from(input.width % 64) + 1;
    let height = u32::from(input.height % 64) + 1;
    let (colorspace, chroma, channel) = if input.rgb {
        (Colorspace::Rgb, Chroma::InterleavedRgb, Channel::Interleaved)
    } else {
        (Colorspace::Monochrome, Chroma::Monochrome, Channel::Y)
    };

    let mut buffer = PixelBuffer::new(width, height, colorspace, chroma).unwrap();
    buffer.add_plane(channel, width, height, 8).unwrap();
    {
        let mut plane = buffer.plane_mut(channel).unwrap();
        if !input.fill.is_empty() {
            for (i, byte) in plane.as_bytes_mut().iter_mut().enumerate() {
                *byte = input.fill[i % input.fill.len()];
            }
        }
    }

    let preset = if input.packbits { "packbits" } else { "store" };
    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &buffer, preset)
        .unwrap();
    let bytes = container.write_to_bytes().unwrap();

    let decoded = Container::from_bytes(bytes)
        .unwrap()
        .primary_image_handle()
        .unwrap()
        .decode(Colorspace::Undefined, Chroma::Undefined)
        .unwrap();
    assert_eq!(
        decoded.plane(channel).unwrap().to_packed_vec(),
        buffer.plane(channel).unwrap().to_packed_vec()
    );
});
