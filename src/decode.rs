//! Image decoding.

use crate::config::DecodeOptions;
use crate::container::ImageHandle;
use crate::engine::{Engine, EngineEntry, NativeEngine};
use crate::error::CodecError;
use crate::image::PixelBuffer;
use crate::limits::Limits;
use crate::pixel::{Chroma, Colorspace};

/// Image decode request builder.
///
/// Defaults to the stored colorspace and chroma, default
/// [`DecodeOptions`], and the limits of the container the handle came from.
///
/// # Example
///
/// ```no_run
/// use heifkit::{Chroma, Colorspace, Container, DecodeOptions, DecodeRequest, Limits};
///
/// let container = Container::from_file("photo.heic")?;
/// let handle = container.primary_image_handle()?;
/// let pixels = DecodeRequest::new(&handle)
///     .with_colorspace(Colorspace::Rgb)
///     .with_chroma(Chroma::InterleavedRgba)
///     .with_options(DecodeOptions::new().with_convert_hdr_to_8bit(true))
///     .with_limits(Limits::none().with_max_pixels(100_000_000))
///     .decode()?;
/// # Ok::<(), heifkit::CodecError>(())
/// ```
pub struct DecodeRequest<'a, E: Engine = NativeEngine> {
    handle: &'a ImageHandle<E>,
    colorspace: Colorspace,
    chroma: Chroma,
    options: DecodeOptions,
    limits: Option<Limits>,
}

impl<'a, E: Engine> DecodeRequest<'a, E> {
    pub fn new(handle: &'a ImageHandle<E>) -> Self {
        Self {
            handle,
            colorspace: Colorspace::Undefined,
            chroma: Chroma::Undefined,
            options: DecodeOptions::default(),
            limits: None,
        }
    }

    /// Target colorspace. `Undefined` keeps the stored one.
    pub fn with_colorspace(mut self, colorspace: Colorspace) -> Self {
        self.colorspace = colorspace;
        self
    }

    /// Target chroma layout. `Undefined` keeps the stored one.
    pub fn with_chroma(mut self, chroma: Chroma) -> Self {
        self.chroma = chroma;
        self
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Override the limits inherited from the container.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Decode the image.
    ///
    /// Fails with `InvalidInput` before the engine runs if the image exceeds
    /// the limits. Conversions the engine cannot perform fail with
    /// `UnsupportedFeature`.
    pub fn decode(self) -> Result<PixelBuffer<E>, CodecError> {
        let handle = self.handle;
        let limits = self.limits.as_ref().unwrap_or(handle.limits());
        let (width, height) = (handle.width(), handle.height());

        let depth = handle.luma_bits_per_pixel().unwrap_or(8);
        let bytes_per_pixel = match self.chroma {
            Chroma::Undefined => 4,
            chroma => chroma.samples_per_pixel() as u32,
        } * u32::from(depth).div_ceil(8);
        limits.validate(width, height, bytes_per_pixel)?;

        log::debug!(
            "{}: decoding item {} ({width}x{height}) to {:?}/{:?}",
            E::NAME,
            handle.id(),
            self.colorspace,
            self.chroma
        );
        let image = handle
            .entry
            .decode(self.colorspace, self.chroma, &self.options)?;
        Ok(PixelBuffer::from_image(image))
    }
}
