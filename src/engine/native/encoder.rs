//! Encoder plugins of the native engine.

use crate::engine::EngineEncoder;
use crate::error::{CodecError, ErrorKind, SubCode};
use crate::format::CompressionFormat;
use crate::registry::EncoderDescriptor;

/// How plane bytes are stored in the container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Packing {
    #[default]
    Store,
    PackBits,
}

impl Packing {
    pub fn code(self) -> u8 {
        match self {
            Self::Store => 0,
            Self::PackBits => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Store),
            1 => Some(Self::PackBits),
            _ => None,
        }
    }
}

/// Static description of one plugin.
#[derive(Debug)]
pub(crate) struct Plugin {
    pub id_name: &'static str,
    pub name: &'static str,
    pub format: CompressionFormat,
    pub parameters: &'static [&'static str],
    /// Accepts only monochrome images.
    pub monochrome_only: bool,
}

pub(crate) static PLUGINS: [Plugin; 2] = [
    Plugin {
        id_name: "unci",
        name: "heifkit uncompressed planes",
        format: CompressionFormat::Uncompressed,
        parameters: &["quality", "lossless", "preset"],
        monochrome_only: false,
    },
    Plugin {
        id_name: "mask",
        name: "heifkit mask planes",
        format: CompressionFormat::Mask,
        parameters: &["quality", "lossless"],
        monochrome_only: true,
    },
];

impl Plugin {
    pub fn descriptor(&self) -> EncoderDescriptor {
        EncoderDescriptor {
            id_name: self.id_name.to_owned(),
            name: self.name.to_owned(),
            compression_format: self.format,
            supports_lossy: false,
            supports_lossless: true,
        }
    }
}

/// Encoder instance bound to one plugin.
#[derive(Debug)]
pub struct NativeEncoder {
    plugin: &'static Plugin,
    quality: u8,
    lossless: bool,
    packing: Packing,
}

impl NativeEncoder {
    pub(crate) fn new(plugin: &'static Plugin) -> Self {
        Self {
            plugin,
            quality: 50,
            lossless: true,
            packing: Packing::Store,
        }
    }

    pub(crate) fn plugin(&self) -> &'static Plugin {
        self.plugin
    }

    pub(crate) fn packing(&self) -> Packing {
        self.packing
    }

    pub(crate) fn quality(&self) -> u8 {
        self.quality
    }

    pub(crate) fn lossless(&self) -> bool {
        self.lossless
    }
}

fn invalid_value(name: &str, value: &str) -> CodecError {
    CodecError::usage(
        SubCode::INVALID_PARAMETER_VALUE,
        format!("Invalid value '{value}' for encoder parameter '{name}'"),
    )
}

fn parse_bool(name: &str, value: &str) -> Result<bool, CodecError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid_value(name, value)),
    }
}

impl EngineEncoder for NativeEncoder {
    fn name(&self) -> String {
        self.plugin.name.to_owned()
    }

    fn compression_format(&self) -> CompressionFormat {
        self.plugin.format
    }

    fn set_lossy_quality(&mut self, quality: i32) -> Result<(), CodecError> {
        self.quality = u8::try_from(quality)
            .ok()
            .filter(|&q| q <= 100)
            .ok_or_else(|| invalid_value("quality", &quality.to_string()))?;
        Ok(())
    }

    fn set_lossless(&mut self, enable: bool) -> Result<(), CodecError> {
        self.lossless = enable;
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), CodecError> {
        if !self.plugin.parameters.contains(&name) {
            return Err(CodecError::usage(
                SubCode::UNSUPPORTED_PARAMETER,
                format!(
                    "Encoder '{}' has no parameter '{name}'",
                    self.plugin.id_name
                ),
            ));
        }
        match name {
            "quality" => {
                let quality = value.parse::<i32>().map_err(|_| invalid_value(name, value))?;
                self.set_lossy_quality(quality)
            }
            "lossless" => self.set_lossless(parse_bool(name, value)?),
            "preset" => {
                self.packing = match value {
                    "store" => Packing::Store,
                    "packbits" => Packing::PackBits,
                    _ => return Err(invalid_value(name, value)),
                };
                Ok(())
            }
            _ => Err(CodecError::new(
                ErrorKind::EncoderPluginError,
                SubCode::UNSUPPORTED_PARAMETER,
                format!("Parameter '{name}' is declared but not handled"),
            )),
        }
    }

    fn parameter_names(&self) -> Vec<String> {
        self.plugin.parameters.iter().map(|&p| p.to_owned()).collect()
    }
}
