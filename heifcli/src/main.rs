//! heifcli: inspect and re-encode HEIF-family containers.

mod batch;
mod convert;
mod encoders;
mod info;
mod source;

use clap::{Parser, ValueEnum};
use heifkit::CompressionFormat;

/// Arguments for the `info` subcommand.
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Input files, directories or glob patterns.
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,

    /// Also list every metadata block with its type and size.
    #[arg(long)]
    pub blocks: bool,
}

/// Arguments for the `encoders` subcommand.
#[derive(Parser, Debug)]
pub struct EncodersArgs {
    /// Only list encoders for this compression format.
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Only list the encoder with this id name.
    #[arg(long)]
    pub name: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `convert` subcommand.
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Input files, directories or glob patterns.
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Output file, or directory (trailing slash) for several inputs.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Filename suffix used when no output is given.
    #[arg(long, default_value = "-recoded")]
    pub suffix: String,

    /// Allow overwriting existing files.
    #[arg(long)]
    pub force: bool,

    /// Target compression format.
    #[arg(short, long, value_enum, default_value = "uncompressed")]
    pub format: FormatArg,

    /// Encoder id name, when several encoders share a format.
    #[arg(long)]
    pub encoder: Option<String>,

    /// Lossy quality (0-100).
    #[arg(short, long)]
    pub quality: Option<i32>,

    /// Request lossless compression.
    #[arg(long)]
    pub lossless: bool,

    /// Encoder preset, e.g. `store` or `packbits`.
    #[arg(long, default_value = "")]
    pub preset: String,

    /// Extra encoder parameter as NAME=VALUE. Repeatable.
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    /// Drop all metadata blocks instead of copying them.
    #[arg(long)]
    pub strip_metadata: bool,

    /// Number of parallel workers (default: CPU count).
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Print a summary table after converting.
    #[arg(long)]
    pub report: bool,
}

/// Compression format argument.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    Any,
    Hevc,
    Avc,
    Jpeg,
    Av1,
    Vvc,
    Evc,
    Jpeg2000,
    Uncompressed,
    Mask,
    Htj2k,
}

impl FormatArg {
    pub fn to_compression_format(self) -> CompressionFormat {
        match self {
            FormatArg::Any => CompressionFormat::Undefined,
            FormatArg::Hevc => CompressionFormat::Hevc,
            FormatArg::Avc => CompressionFormat::Avc,
            FormatArg::Jpeg => CompressionFormat::Jpeg,
            FormatArg::Av1 => CompressionFormat::Av1,
            FormatArg::Vvc => CompressionFormat::Vvc,
            FormatArg::Evc => CompressionFormat::Evc,
            FormatArg::Jpeg2000 => CompressionFormat::Jpeg2000,
            FormatArg::Uncompressed => CompressionFormat::Uncompressed,
            FormatArg::Mask => CompressionFormat::Mask,
            FormatArg::Htj2k => CompressionFormat::Htj2k,
        }
    }
}

impl ConvertArgs {
    /// Parse `--param NAME=VALUE` pairs.
    pub fn resolve_params(&self) -> anyhow::Result<Vec<(String, String)>> {
        self.params
            .iter()
            .map(|param| match param.split_once('=') {
                Some((name, value)) if !name.is_empty() => {
                    Ok((name.to_string(), value.to_string()))
                }
                _ => anyhow::bail!("--param must be NAME=VALUE, got: {param}"),
            })
            .collect()
    }
}

/// Dispatch CLI arguments.
///
/// Bare files default to `info`.
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let first_arg = args.get(1).map(|s| s.as_str());
    match first_arg {
        Some("info") => info::run(InfoArgs::parse_from(&args[1..])),
        Some("encoders") => encoders::run(EncodersArgs::parse_from(&args[1..])),
        Some("convert") => convert::run(ConvertArgs::parse_from(&args[1..])),
        Some("help" | "--help" | "-h") | None => {
            print_help();
            Ok(())
        }
        Some("--version" | "-V") => {
            println!("heifcli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(_) => {
            let cmd = InfoArgs::parse_from(
                std::iter::once("info".to_string()).chain(args[1..].iter().cloned()),
            );
            info::run(cmd)
        }
    }
}

fn print_help() {
    eprintln!(
        "\
heifcli {}: inspect and re-encode HEIF-family containers

USAGE:
    heifcli [COMMAND] [OPTIONS] <FILES>...

COMMANDS:
    info       List images and metadata blocks (default)
    encoders   List the registered encoder plugins
    convert    Decode every image and encode it into a new container

EXAMPLES:
    heifcli photo.heic                 (built with --features libheif)
    heifcli info shots/ --json
    heifcli encoders --format uncompressed
    heifcli convert in.hkit --preset packbits -o out.hkit
    heifcli convert 'shots/*.hkit' -o packed/ --strip-metadata --report

Run `heifcli <COMMAND> --help` for full options.",
        env!("CARGO_PKG_VERSION")
    );
}
