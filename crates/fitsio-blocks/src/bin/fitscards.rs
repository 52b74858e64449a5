use std::fs::File;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fitsio_blocks::block::{padded_byte_len, BLOCK_SIZE};
use fitsio_blocks::card::CardValue;
use fitsio_blocks::config::{BlockConfig, MappingMode, DEFAULT_BLOCK_SIZE};
use fitsio_blocks::header::{is_fits_magic, read_header, Header};
use fitsio_blocks::mapped::BlockInput;

/// Print the header cards of every HDU in a FITS file.
#[derive(Parser)]
#[command(name = "fitscards", version)]
struct Cli {
    /// FITS file to inspect
    file: PathBuf,

    /// Size in bytes of each mapped block
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Read blocks into memory instead of mapping them
    #[arg(long)]
    no_mmap: bool,

    /// Print every card rather than a summary of each HDU
    #[arg(short, long)]
    verbose: bool,
}

fn format_value(value: &CardValue) -> Option<String> {
    match value {
        CardValue::Integer(n) => Some(n.to_string()),
        CardValue::Float(f) => Some(f.to_string()),
        CardValue::String(s) => Some(format!("'{s}'")),
        CardValue::Logical(b) => Some(String::from(if *b { "T" } else { "F" })),
        CardValue::Complex(re, im) => Some(format!("({re}, {im})")),
        CardValue::Continuation(s) => Some(format!("'{s}' (continued)")),
        CardValue::Comment(s) => Some(s.clone()),
        CardValue::Blank | CardValue::NoValue | CardValue::End => None,
    }
}

fn format_cards(header: &Header) -> String {
    let mut out = String::new();
    for card in header.cards() {
        let parsed = card.parse();
        let kw = parsed.keyword().unwrap_or("");
        match (format_value(parsed.value()), parsed.comment()) {
            (Some(val), Some(comment)) => out.push_str(&format!("    {kw:<8} {val} / {comment}\n")),
            (Some(val), None) => out.push_str(&format!("    {kw:<8} {val}\n")),
            (None, Some(comment)) => out.push_str(&format!("    {kw:<8} / {comment}\n")),
            (None, None) if !kw.is_empty() => out.push_str(&format!("    {kw}\n")),
            (None, None) => {}
        }
    }
    out
}

fn format_hdu(index: usize, offset: u64, header: &Header) -> Result<String, String> {
    let kind = match header.string("XTENSION") {
        Some(x) => format!("{x} extension"),
        None => String::from("Primary"),
    };
    let extname = header
        .string("EXTNAME")
        .map(|n| format!(" (EXTNAME: {n})"))
        .unwrap_or_default();
    let data_len = header.data_len().map_err(|e| e.to_string())?;
    let mut out = format!("HDU {index}: {kind}{extname}\n");
    out.push_str(&format!("  Offset: {offset}\n"));
    out.push_str(&format!("  Cards: {}\n", header.cards().len()));
    out.push_str(&format!("  Data size: {data_len} bytes\n"));
    Ok(out)
}

fn run(cli: &Cli) -> Result<String, String> {
    let path = cli.file.display();
    let file = File::open(&cli.file).map_err(|e| format!("Error opening '{path}': {e}"))?;
    let size = file
        .metadata()
        .map_err(|e| format!("Error reading '{path}': {e}"))?
        .len();
    let config = BlockConfig::default()
        .block_size(cli.block_size)
        .mapping(if cli.no_mmap { MappingMode::Read } else { MappingMode::Mmap });
    let mut input =
        BlockInput::open(file, 0, size, &config).map_err(|e| format!("Error mapping '{path}': {e}"))?;

    let mut magic = [0u8; 10];
    input
        .read_fully(&mut magic)
        .map_err(|_| format!("'{path}' is too short to be a FITS file"))?;
    if !is_fits_magic(&magic) {
        return Err(format!("'{path}' is not a FITS file"));
    }
    input.seek_to(0);

    let mut out = String::new();
    let mut index = 0;
    while input.remaining() >= BLOCK_SIZE as u64 {
        let offset = input.position();
        let header = read_header(&mut input).map_err(|e| format!("Error in HDU {index}: {e}"))?;
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&format_hdu(index, offset, &header)?);
        if cli.verbose {
            out.push_str(&format_cards(&header));
        }
        let data_len = header.data_len().map_err(|e| e.to_string())?;
        input.skip(padded_byte_len(data_len));
        index += 1;
    }
    input.close();
    Ok(out)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => print!("{output}"),
        Err(msg) => {
            eprintln!("{msg}");
            process::exit(1);
        }
    }
}
