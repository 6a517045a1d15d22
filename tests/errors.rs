//! Error kinds at the API boundaries.

use heifkit::{
    Channel, Chroma, Colorspace, CompressionFormat, Container, DecodeRequest, EncoderSession,
    ErrorKind, Limits, PixelBuffer, SubCode,
};

fn one_gray_image() -> Vec<u8> {
    let mut buffer = PixelBuffer::new(8, 8, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
    buffer.add_plane(Channel::Y, 8, 8, 8).unwrap();
    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &buffer, "")
        .unwrap();
    container.write_to_bytes().unwrap()
}

#[test]
fn garbage_input_is_invalid() {
    let err = Container::from_bytes(b"definitely not a container".to_vec()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.subcode(), SubCode::NO_FTYP_BOX);

    let err = Container::from_bytes(Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn truncated_input_is_rejected() {
    let bytes = one_gray_image();
    for len in [12, bytes.len() / 2, bytes.len() - 1] {
        let err = Container::from_bytes(&bytes[..len]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "truncated to {len}");
    }
}

#[test]
fn foreign_brand_needs_another_engine() {
    let mut bytes = one_gray_image();
    // Rewrite major and compatible brands
    bytes[8..12].copy_from_slice(b"heic");
    bytes[16..20].copy_from_slice(b"heic");
    bytes[20..24].copy_from_slice(b"mif1");
    let err = Container::from_bytes(bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFiletype);
}

#[test]
fn missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Container::from_file(dir.path().join("absent.heic")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputDoesNotExist);
}

#[test]
fn failed_read_leaves_container_usable() {
    let mut container = Container::new();
    assert!(container.read_from_memory(b"junk".to_vec()).is_err());
    container.read_from_memory(one_gray_image()).unwrap();
    assert_eq!(container.number_of_top_level_images(), 1);

    let err = container.read_from_memory(one_gray_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsageError);
}

#[test]
fn empty_container_has_nothing_to_give() {
    let container = Container::new();
    assert_eq!(container.number_of_top_level_images(), 0);
    assert!(container.top_level_image_ids().is_empty());

    let err = container.primary_image_handle().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.subcode(), SubCode::NO_OR_INVALID_PRIMARY_ITEM);

    let err = container.write_to_bytes().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsageError);
}

#[test]
fn unknown_image_id() {
    let container = Container::from_bytes(one_gray_image()).unwrap();
    let err = container.image_handle(9999).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsageError);
}

#[test]
fn missing_plane_and_bad_samples() {
    let mut buffer = PixelBuffer::new(4, 4, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
    let err = buffer.plane(Channel::Interleaved).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.subcode(), SubCode::NONEXISTING_IMAGE_CHANNEL_REFERENCED);

    buffer.add_plane(Channel::Interleaved, 4, 4, 8).unwrap();
    let mut plane = buffer.plane_mut(Channel::Interleaved).unwrap();
    assert_eq!(plane.set_sample(0, 0, 0, 256).unwrap_err().kind(), ErrorKind::UsageError);
    assert_eq!(plane.set_sample(4, 0, 0, 1).unwrap_err().kind(), ErrorKind::UsageError);
    assert_eq!(plane.set_sample(0, 0, 3, 1).unwrap_err().kind(), ErrorKind::UsageError);
}

#[test]
fn encode_rejects_incomplete_images() {
    let buffer = PixelBuffer::new(4, 4, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
    let mut container = Container::new();
    let err = EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &buffer, "")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsageError);
    assert_eq!(container.number_of_top_level_images(), 0);
}

#[test]
fn mask_encoder_accepts_only_monochrome() {
    let mut buffer = PixelBuffer::new(2, 2, Colorspace::Rgb, Chroma::InterleavedRgb).unwrap();
    buffer.add_plane(Channel::Interleaved, 2, 2, 8).unwrap();
    let mut container = Container::new();
    let err = EncoderSession::new(CompressionFormat::Mask)
        .unwrap()
        .encode(&mut container, &buffer, "")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodingError);
}

#[test]
fn unsupported_conversion() {
    let container = Container::from_bytes(one_gray_image()).unwrap();
    let handle = container.primary_image_handle().unwrap();
    let err = handle.decode(Colorspace::YCbCr, Chroma::C420).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn decode_limits() {
    let container = Container::from_bytes(one_gray_image())
        .unwrap()
        .with_limits(Limits::none().with_max_pixels(32));
    let err = container
        .primary_image_handle()
        .unwrap()
        .decode(Colorspace::Undefined, Chroma::Undefined)
        .unwrap_err();
    assert_eq!(err.subcode(), SubCode::SECURITY_LIMIT_EXCEEDED);

    // A per-request override wins over the container's limits
    let handle = container.primary_image_handle().unwrap();
    DecodeRequest::new(&handle)
        .with_limits(Limits::none())
        .decode()
        .unwrap();

    let err = Container::new()
        .with_limits(Limits::none().with_max_width(4))
        .read_from_memory(one_gray_image())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.subcode(), SubCode::SECURITY_LIMIT_EXCEEDED);
}

#[test]
fn encoder_lookup_failures() {
    let err = EncoderSession::new(CompressionFormat::Hevc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncoderPluginError);

    let mut session = EncoderSession::new(CompressionFormat::Uncompressed).unwrap();
    let err = session.set_parameter("preset", "zstd").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UsageError);
    assert_eq!(err.subcode(), SubCode::INVALID_PARAMETER_VALUE);
    assert!(session.parameters().is_empty());
}

#[test]
fn plane_larger_than_its_item_is_rejected() {
    let mut buffer = PixelBuffer::new(64, 64, Colorspace::Monochrome, Chroma::Monochrome).unwrap();
    buffer.add_plane(Channel::Y, 64, 64, 8).unwrap();
    let mut container = Container::new();
    EncoderSession::new(CompressionFormat::Uncompressed)
        .unwrap()
        .encode(&mut container, &buffer, "packbits")
        .unwrap();
    let mut bytes = container.write_to_bytes().unwrap();

    // Shrink the item to 1x1 and leave its 64x64 plane in place
    let item = bytes.windows(4).position(|w| w == b"iimg").unwrap() + 12;
    bytes[item..item + 8].copy_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1]);

    let err = Container::new()
        .with_limits(Limits::none().with_max_pixels(100).with_max_memory_bytes(1000))
        .read_from_memory(bytes.clone())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.subcode(), SubCode::INVALID_IMAGE_SIZE);

    let err = Container::from_bytes(bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
