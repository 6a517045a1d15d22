//! Encoder registry queries and encoder settings seen from the outside.

use heifkit::{
    Channel, Chroma, Colorspace, CompressionFormat, Container, EncoderConfig, EncoderSession,
    NativeEngine, PixelBuffer, list_descriptors,
};

fn flat_gray(size: u32) -> PixelBuffer {
    let mut buffer = PixelBuffer::new(size, size, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
    buffer.add_plane(Channel::Y, size, size, 8).unwrap();
    buffer.plane_mut(Channel::Y).unwrap().fill(3).unwrap();
    buffer
}

#[test]
fn descriptors_report_their_filter_format() {
    let all = list_descriptors::<NativeEngine>(CompressionFormat::Undefined, None);
    assert_eq!(all.len(), 2);
    for format in [CompressionFormat::Uncompressed, CompressionFormat::Mask] {
        let filtered = list_descriptors::<NativeEngine>(format, None);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.iter().all(|d| d.compression_format() == format));
        assert!(filtered.iter().all(|d| d.supports_lossless_compression()));
    }
    assert!(list_descriptors::<NativeEngine>(CompressionFormat::Av1, None).is_empty());
    assert!(list_descriptors::<NativeEngine>(CompressionFormat::Undefined, Some("x265")).is_empty());
    assert_eq!(
        list_descriptors::<NativeEngine>(CompressionFormat::Undefined, Some("")).len(),
        all.len()
    );
}

#[test]
fn session_from_descriptor_encodes() {
    let descriptor = list_descriptors::<NativeEngine>(CompressionFormat::Undefined, Some("mask"))
        .remove(0);
    let mut session = EncoderSession::<NativeEngine>::from_descriptor(&descriptor).unwrap();
    assert_eq!(session.compression_format(), CompressionFormat::Mask);
    assert_eq!(session.parameter_names(), ["quality", "lossless"]);

    let mut container = Container::new();
    let handle = session.encode(&mut container, &flat_gray(4), "").unwrap();
    assert_eq!(container.primary_image_handle().unwrap().id(), handle.id());
}

#[test]
fn config_is_applied_in_order() {
    let mut session = EncoderSession::new(CompressionFormat::Uncompressed).unwrap();
    let config = EncoderConfig::new()
        .with_quality(90)
        .with_lossless(true)
        .with_parameter("lossless", "false")
        .with_preset("packbits");
    session.apply(&config).unwrap();
    assert_eq!(
        session.parameters(),
        [
            ("lossless".to_owned(), "false".to_owned()),
            ("preset".to_owned(), "packbits".to_owned()),
        ]
    );
}

#[test]
fn packbits_shrinks_flat_images() {
    let image = flat_gray(64);
    let size_with = |preset: &str| {
        let mut container = Container::new();
        EncoderSession::new(CompressionFormat::Uncompressed)
            .unwrap()
            .encode(&mut container, &image, preset)
            .unwrap();
        container.write_to_bytes().unwrap().len()
    };
    let stored = size_with("store");
    let packed = size_with("packbits");
    assert!(stored > 64 * 64);
    assert!(packed < stored / 10, "{packed} vs {stored}");
}

#[test]
fn settings_persist_across_encodes() {
    let mut session = EncoderSession::new(CompressionFormat::Uncompressed).unwrap();
    session.set_parameter("preset", "packbits").unwrap();
    let mut container = Container::new();
    for _ in 0..3 {
        session.encode(&mut container, &flat_gray(32), "").unwrap();
    }
    let bytes = container.write_to_bytes().unwrap();
    // Three packed 32x32 planes take far less than one stored plane
    assert!(bytes.len() < 32 * 32);
    assert_eq!(Container::from_bytes(bytes).unwrap().number_of_top_level_images(), 3);
}
