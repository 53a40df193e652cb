//! A5 Booklet PDF CLI
//!
//! Command-line interface for normalizing PDFs for booklet printing.

use anyhow::{Context, Result};
use a5_booklet_pdf::{
    ensure_pdf, file_ops::default_output_path, transform, PageSize, TransformOptions,
};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SizeArg {
    A3,
    A4,
    A5,
    A6,
    Letter,
    Legal,
}

impl From<SizeArg> for PageSize {
    fn from(size: SizeArg) -> Self {
        match size {
            SizeArg::A3 => PageSize::A3,
            SizeArg::A4 => PageSize::A4,
            SizeArg::A5 => PageSize::A5,
            SizeArg::A6 => PageSize::A6,
            SizeArg::Letter => PageSize::Letter,
            SizeArg::Legal => PageSize::Legal,
        }
    }
}

/// Resize every page of a PDF to A5, flatten form fields and pad the page
/// count to a multiple of 4
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PDF file path
    input: PathBuf,

    /// Output PDF file path (default: <input>_A5_mod.pdf next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target page size
    #[arg(short, long, value_enum, default_value = "a5")]
    size: SizeArg,

    /// Use the landscape orientation of the target size
    #[arg(long)]
    landscape: bool,

    /// Target page width in points (overrides --size)
    #[arg(long, requires = "height")]
    width: Option<f32>,

    /// Target page height in points (overrides --size)
    #[arg(long, requires = "width")]
    height: Option<f32>,

    /// Pad the page count to a multiple of this
    #[arg(short, long, default_value = "4")]
    multiple: usize,

    /// Do not compress PDF streams
    #[arg(long)]
    no_compress: bool,

    /// Reject documents with more pages than this
    #[arg(long, default_value = "10000")]
    max_pages: usize,

    /// Reject input files larger than this many bytes
    #[arg(long, default_value = "268435456")]
    max_bytes: usize,

    /// Process pages on a single thread
    #[arg(long)]
    sequential: bool,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let (width, height) = match (args.width, args.height) {
        (Some(w), Some(h)) => (w, h),
        _ => PageSize::from(args.size).oriented(args.landscape),
    };

    let options = TransformOptions::new()
        .page_size(width, height)
        .page_multiple(args.multiple)
        .compress_streams(!args.no_compress)
        .max_pages(args.max_pages)
        .max_input_bytes(args.max_bytes)
        .parallel(!args.sequential);

    let input = fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;
    ensure_pdf(&input).with_context(|| format!("{}", args.input.display()))?;

    let result = transform(&input, &options)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    fs::write(&output_path, &result.bytes)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;

    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    println!("Original pages: {}", result.original_page_count);
    println!("Added pages:    {}", result.added_page_count);
    println!("Total pages:    {}", result.total_page_count());
    println!("Output saved to: {}", output_path.display());

    Ok(())
}
