//! Re-encoding: decode every top-level image and encode it into a new
//! container with the requested encoder settings.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, bail};
use heifkit::engine::Engine;
use heifkit::{
    CompressionFormat, Container, EncoderConfig, EncoderSession, ImageHandle, NativeEngine,
    PixelBuffer, list_descriptors,
};
use rayon::prelude::*;

use crate::ConvertArgs;
use crate::batch::{self, BatchSummary, FileResult};
use crate::source::{self, Opened};

/// Run the `convert` subcommand.
pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let files = batch::expand_inputs(&args.files)?;
    if files.is_empty() {
        bail!("no HEIF files found");
    }

    let config = encoder_config(&args)?;
    let format = args.format.to_compression_format();
    // Fail early on a bad encoder choice or setting
    open_encoder(format, args.encoder.as_deref(), &config)?;

    let outputs = files
        .iter()
        .map(|input| output_path(input, &args, files.len()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    let summary = Mutex::new(BatchSummary::default());
    pool.install(|| {
        files.par_iter().zip(&outputs).for_each(|(input, output)| {
            let result = convert_one(input, output, format, &args, &config);
            if let Some(err) = &result.error {
                eprintln!("error: {}: {err}", input.display());
            } else if !args.report {
                eprintln!(
                    "{} -> {} ({} images, {})",
                    input.display(),
                    output.display(),
                    result.images,
                    batch::format_size(result.output_size.unwrap_or(0)),
                );
            }
            summary
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(result);
        });
    });

    let summary = summary.into_inner().unwrap_or_else(|e| e.into_inner());
    if args.report {
        summary.print_report();
    }
    if summary.error_count() > 0 {
        bail!("{} of {} files failed", summary.error_count(), files.len());
    }
    Ok(())
}

fn encoder_config(args: &ConvertArgs) -> anyhow::Result<EncoderConfig> {
    let mut config = EncoderConfig::new();
    if let Some(quality) = args.quality {
        config = config.with_quality(quality);
    }
    if args.lossless {
        config = config.with_lossless(true);
    }
    for (name, value) in args.resolve_params()? {
        config = config.with_parameter(name, value);
    }
    if !args.preset.is_empty() {
        config = config.with_preset(args.preset.as_str());
    }
    Ok(config)
}

fn open_encoder(
    format: CompressionFormat,
    id_name: Option<&str>,
    config: &EncoderConfig,
) -> anyhow::Result<EncoderSession> {
    let mut session = match id_name {
        Some(id_name) => {
            let descriptor = list_descriptors::<NativeEngine>(format, Some(id_name))
                .into_iter()
                .next()
                .with_context(|| format!("no {} encoder named '{id_name}'", format.name()))?;
            EncoderSession::from_descriptor(&descriptor)?
        }
        None => EncoderSession::new(format)?,
    };
    session.apply(config)?;
    Ok(session)
}

/// Where to write the result for `input`.
fn output_path(input: &Path, args: &ConvertArgs, input_count: usize) -> anyhow::Result<PathBuf> {
    let path = match args.output.as_deref() {
        Some(o) if o.ends_with('/') || o.ends_with('\\') || Path::new(o).is_dir() => {
            let name = input
                .file_name()
                .with_context(|| format!("no file name: {}", input.display()))?;
            Path::new(o).join(name)
        }
        Some(_) if input_count > 1 => {
            bail!("-o must be a directory (trailing slash) when converting several files")
        }
        Some(o) => PathBuf::from(o),
        None => {
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
            let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("hkit");
            input.with_file_name(format!("{stem}{}.{ext}", args.suffix))
        }
    };

    if path.exists() && !args.force {
        bail!("{} exists (use --force to overwrite)", path.display());
    }
    if path.canonicalize().ok() == input.canonicalize().ok() {
        bail!("refusing to overwrite input {}", input.display());
    }
    Ok(path)
}

fn convert_one(
    input: &Path,
    output: &Path,
    format: CompressionFormat,
    args: &ConvertArgs,
    config: &EncoderConfig,
) -> FileResult {
    let start = Instant::now();
    let input_size = input.metadata().map(|m| m.len()).unwrap_or(0);
    let outcome = recode(input, output, format, args, config);

    let (images, output_size, error) = match outcome {
        Ok(images) => (images, output.metadata().ok().map(|m| m.len()), None),
        Err(e) => (0, None, Some(format!("{e:#}"))),
    };
    FileResult {
        input_path: input.to_path_buf(),
        input_size,
        output_path: error.is_none().then(|| output.to_path_buf()),
        output_size,
        images,
        error,
        duration: start.elapsed(),
    }
}

fn recode(
    input: &Path,
    output: &Path,
    format: CompressionFormat,
    args: &ConvertArgs,
    config: &EncoderConfig,
) -> anyhow::Result<usize> {
    let mut encoder = open_encoder(format, args.encoder.as_deref(), config)?;
    let target = match source::open_file(input)? {
        Opened::Native(container) => {
            recode_from(&container, source::native_pixels, &mut encoder, args)?
        }
        #[cfg(feature = "libheif")]
        Opened::LibHeif(container) => {
            recode_from(&container, source::libheif_pixels, &mut encoder, args)?
        }
    };
    target.write_to_file(output)?;
    Ok(target.number_of_top_level_images())
}

/// Re-encode every top-level image of `source` into a new native container.
fn recode_from<E: Engine>(
    source: &Container<E>,
    pixels: impl Fn(&ImageHandle<E>) -> anyhow::Result<PixelBuffer>,
    encoder: &mut EncoderSession,
    args: &ConvertArgs,
) -> anyhow::Result<Container> {
    let primary = source.primary_image_handle()?.id();

    // The primary image is encoded first so it stays primary
    let mut ids = source.top_level_image_ids();
    ids.sort_by_key(|&id| id != primary);

    let mut target = Container::new();
    for id in &ids {
        let handle = source.image_handle(*id)?;
        let encoded = encoder
            .encode(&mut target, &pixels(&handle)?, "")
            .with_context(|| format!("encoding image {id}"))?;

        if args.strip_metadata {
            continue;
        }
        for block in handle.metadata_blocks()? {
            target.add_generic_metadata(
                &encoded,
                &block.data,
                &block.item_type,
                block.content_type.as_deref(),
            )?;
        }
    }
    Ok(target)
}
