//! Encoder plugin listing.

use heifkit::{EncoderDescriptor, NativeEngine, list_descriptors};
use serde::Serialize;

use crate::EncodersArgs;

/// Run the `encoders` subcommand.
pub fn run(args: EncodersArgs) -> anyhow::Result<()> {
    let format = args
        .format
        .map_or(heifkit::CompressionFormat::Undefined, |f| f.to_compression_format());
    let descriptors: Vec<EncoderDisplay> =
        list_descriptors::<NativeEngine>(format, args.name.as_deref())
            .iter()
            .map(|d| EncoderDisplay::new("native", d))
            .chain(libheif_encoders(format, args.name.as_deref()))
            .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    if descriptors.is_empty() {
        println!("No matching encoders.");
        return Ok(());
    }

    println!(
        "{:<8} {:<10} {:<14} {:<6} {:<9} Name",
        "Engine", "Id", "Format", "Lossy", "Lossless"
    );
    println!("{}", "-".repeat(72));
    for d in &descriptors {
        println!(
            "{:<8} {:<10} {:<14} {:<6} {:<9} {}",
            d.engine,
            d.id_name,
            d.format,
            yes_no(d.lossy),
            yes_no(d.lossless),
            d.name
        );
    }
    Ok(())
}

#[cfg(feature = "libheif")]
fn libheif_encoders(
    format: heifkit::CompressionFormat,
    name: Option<&str>,
) -> Vec<EncoderDisplay> {
    list_descriptors::<heifkit::LibHeif>(format, name)
        .iter()
        .map(|d| EncoderDisplay::new("libheif", d))
        .collect()
}

#[cfg(not(feature = "libheif"))]
fn libheif_encoders(
    _format: heifkit::CompressionFormat,
    _name: Option<&str>,
) -> Vec<EncoderDisplay> {
    Vec::new()
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[derive(Debug, Serialize)]
struct EncoderDisplay {
    engine: &'static str,
    id_name: String,
    name: String,
    format: &'static str,
    lossy: bool,
    lossless: bool,
}

impl EncoderDisplay {
    fn new(engine: &'static str, d: &EncoderDescriptor) -> Self {
        Self {
            engine,
            id_name: d.id_name().to_string(),
            name: d.name().to_string(),
            format: d.compression_format().name(),
            lossy: d.supports_lossy_compression(),
            lossless: d.supports_lossless_compression(),
        }
    }
}
