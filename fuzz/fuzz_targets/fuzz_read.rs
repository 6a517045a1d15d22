#![no_main]

//! Read arbitrary bytes as a container and walk everything it exposes.

use arbitrary::Arbitrary;
use heifkit::{Chroma, Colorspace, Container, Limits};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct ReadInput {
    data: Vec<u8>,
    decode: bool,
    to_rgb: bool,
}

fuzz_target!(|input: ReadInput| {
    if input.data.len() > 4 * 1024 * 1024 {
        return;
    }

    let limits = Limits::none()
        .with_max_pixels(1 << 20)
        .with_max_memory_bytes(16 << 20);
    let mut container = Container::new().with_limits(limits);
    if container.read_from_memory(input.data).is_err() {
        return;
    }

    let _ = container.primary_image_handle();
    for handle in container.top_level_image_handles() {
        let Ok(handle) = handle else { continue };
        let _ = (handle.width(), handle.height(), handle.has_alpha_channel());
        let _ = handle.metadata_blocks();
        let _ = handle.exif();
        let _ = handle.xmp();

        if !input.decode {
            continue;
        }
        let (colorspace, chroma) = if input.to_rgb {
            (Colorspace::Rgb, Chroma::InterleavedRgb)
        } else {
            (Colorspace::Undefined, Chroma::Undefined)
        };
        if let Ok(buffer) = handle.decode(colorspace, chroma) {
            for channel in buffer.channels() {
                if let Ok(view) = buffer.plane(channel) {
                    let _ = view.to_packed_vec();
                }
            }
        }
    }

    let _ = container.write_to_bytes();
});
