//! Container inspection: list images and metadata without decoding pixels.

use std::path::Path;

use anyhow::Context;
use heifkit::engine::Engine;
use heifkit::{Container, FileBrand, ImageHandle, ItemId};
use rayon::prelude::*;
use serde::Serialize;

use crate::InfoArgs;
use crate::batch;
use crate::source::{self, Opened};

/// Run the `info` subcommand.
pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let files = batch::expand_inputs(&args.files)?;

    if files.is_empty() {
        anyhow::bail!("no HEIF files found");
    }

    // Inspect in parallel, print in input order
    let results: Vec<_> = files.par_iter().map(|path| inspect_file(path)).collect();

    if args.json {
        let infos: Vec<_> = results
            .iter()
            .zip(&files)
            .filter_map(|(result, path)| match result {
                Ok(info) => Some(info),
                Err(e) => {
                    eprintln!("error: {}: {e:#}", path.display());
                    None
                }
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    let multi = files.len() > 1;
    for (i, (path, result)) in files.iter().zip(&results).enumerate() {
        if multi {
            if i > 0 {
                println!();
            }
            println!("{}:", path.display());
        }
        match result {
            Ok(info) => print_info(info, args.blocks),
            Err(e) => eprintln!("  error: {e:#}"),
        }
    }

    Ok(())
}

fn inspect_file(path: &Path) -> anyhow::Result<ContainerInfoDisplay> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_size = data.len() as u64;
    let brand = FileBrand::detect(&data);

    let opened = source::open_bytes(data)?;
    let images = match &opened {
        Opened::Native(container) => inspect_container(container)?,
        #[cfg(feature = "libheif")]
        Opened::LibHeif(container) => inspect_container(container)?,
    };

    Ok(ContainerInfoDisplay {
        path: path.display().to_string(),
        brand: brand.map(|b| b.as_str().to_string()),
        mime_type: brand.map_or("image/heif", FileBrand::mime_type).to_string(),
        engine: opened.engine(),
        file_size,
        images,
    })
}

fn inspect_container<E: Engine>(container: &Container<E>) -> anyhow::Result<Vec<ImageInfoDisplay>> {
    let primary = container.primary_image_handle()?.id();
    container
        .top_level_image_handles()
        .map(|handle| inspect_image(&handle?, primary))
        .collect()
}

fn inspect_image<E: Engine>(handle: &ImageHandle<E>, primary: ItemId) -> anyhow::Result<ImageInfoDisplay> {
    let blocks = handle
        .metadata_blocks()?
        .into_iter()
        .map(|block| BlockDisplay {
            id: block.id,
            item_type: block.item_type,
            content_type: block.content_type,
            size: block.data.len(),
        })
        .collect();

    Ok(ImageInfoDisplay {
        id: handle.id(),
        primary: handle.id() == primary,
        width: handle.width(),
        height: handle.height(),
        has_alpha: handle.has_alpha_channel(),
        luma_bits: handle.luma_bits_per_pixel(),
        chroma_bits: handle.chroma_bits_per_pixel(),
        exif_size: handle.exif()?.map(|e| e.len()),
        xmp_size: handle.xmp()?.map(|x| x.len()),
        blocks,
    })
}

#[derive(Debug, Serialize)]
struct ContainerInfoDisplay {
    path: String,
    brand: Option<String>,
    mime_type: String,
    engine: &'static str,
    file_size: u64,
    images: Vec<ImageInfoDisplay>,
}

#[derive(Debug, Serialize)]
struct ImageInfoDisplay {
    id: ItemId,
    primary: bool,
    width: u32,
    height: u32,
    has_alpha: bool,
    luma_bits: Option<u8>,
    chroma_bits: Option<u8>,
    exif_size: Option<usize>,
    xmp_size: Option<usize>,
    blocks: Vec<BlockDisplay>,
}

#[derive(Debug, Serialize)]
struct BlockDisplay {
    id: ItemId,
    item_type: String,
    content_type: Option<String>,
    size: usize,
}

fn print_info(info: &ContainerInfoDisplay, blocks: bool) {
    match &info.brand {
        Some(brand) => println!("  Brand:        {} ({})", brand, info.mime_type),
        None => println!("  Brand:        unknown"),
    }
    println!("  Engine:       {}", info.engine);
    println!("  File size:    {}", batch::format_size(info.file_size));
    println!("  Images:       {}", info.images.len());

    for image in &info.images {
        println!(
            "  #{}{}: {}x{}",
            image.id,
            if image.primary { " (primary)" } else { "" },
            image.width,
            image.height
        );
        match (image.luma_bits, image.chroma_bits) {
            (Some(luma), Some(chroma)) if luma != chroma => {
                println!("    Bit depth:  {luma} luma, {chroma} chroma")
            }
            (Some(luma), _) => println!("    Bit depth:  {luma}"),
            (None, _) => {}
        }
        println!("    Alpha:      {}", if image.has_alpha { "yes" } else { "no" });
        if let Some(size) = image.exif_size {
            println!("    EXIF:       {size} bytes");
        }
        if let Some(size) = image.xmp_size {
            println!("    XMP:        {size} bytes");
        }
        if blocks {
            for block in &image.blocks {
                match &block.content_type {
                    Some(content_type) => println!(
                        "    Block #{}:  {} [{}] {} bytes",
                        block.id, block.item_type, content_type, block.size
                    ),
                    None => println!(
                        "    Block #{}:  {} {} bytes",
                        block.id, block.item_type, block.size
                    ),
                }
            }
        }
    }
}
