use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::*;
use log::*;
use structopt::*;

use dzip::{CsvOptions, DzipFile, Frame};

#[derive(Debug, StructOpt)]
#[structopt(name = "dzip", about = "Converts and inspects dzip archives")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Converts an SPSS system file (.sav or .zsav) to a dzip archive
    Convert {
        #[structopt(name("SAV file"))]
        sav_path: PathBuf,

        #[structopt(name("dzip file"))]
        out_path: PathBuf,

        /// Store members instead of deflating them
        #[structopt(long)]
        no_compress: bool,
    },
    /// Prints the archive's size, declared shape and column labels
    Info {
        #[structopt(name("dzip file"))]
        path: PathBuf,
    },
    /// Writes the archive's data to stdout as CSV
    Cat {
        #[structopt(name("dzip file"))]
        path: PathBuf,

        /// Decode this many rows at a time
        #[structopt(long)]
        chunk_size: Option<NonZeroUsize>,

        /// Output field delimiter
        #[structopt(long, default_value = ",", parse(try_from_str = parse_delimiter))]
        delimiter: u8,
    },
    /// Pretty-prints the archive's meta.json
    Meta {
        #[structopt(name("dzip file"))]
        path: PathBuf,
    },
}

fn parse_delimiter(s: &str) -> Result<u8> {
    match s.as_bytes() {
        [byte] => Ok(*byte),
        b"\\t" => Ok(b'\t'),
        _ => bail!("Delimiter must be a single byte, got {:?}", s),
    }
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    match args.command {
        Command::Convert {
            sav_path,
            out_path,
            no_compress,
        } => convert(&sav_path, &out_path, !no_compress),
        Command::Info { path } => print_info(&path),
        Command::Cat {
            path,
            chunk_size,
            delimiter,
        } => cat(&path, chunk_size, delimiter),
        Command::Meta { path } => print_meta(&path),
    }
}

fn open(path: &Path) -> Result<DzipFile> {
    DzipFile::open(path).with_context(|| format!("Couldn't open {}", path.display()))
}

fn convert(sav_path: &Path, out_path: &Path, compress: bool) -> Result<()> {
    let context = || {
        format!(
            "Couldn't convert {} to {}",
            sav_path.display(),
            out_path.display()
        )
    };
    if compress {
        dzip::spss_to_dzip(sav_path, out_path).with_context(context)?;
    } else {
        let (frame, sav_meta) = dzip::sav::read_sav(sav_path, &Default::default())
            .with_context(|| format!("Couldn't read {}", sav_path.display()))?;
        let meta = dzip::Metadata::from_config(&sav_meta)?;
        dzip::save_dzip(out_path, &frame, &meta, false).with_context(context)?;
    }
    info!("Wrote {}", out_path.display());
    Ok(())
}

fn print_info(path: &Path) -> Result<()> {
    let file = open(path)?;
    let meta = file.meta().context("Couldn't read meta.json")?;
    let (rows, columns) = meta.shape();

    println!("{}", file);
    println!("{} rows, {} columns (declared)", rows, columns);
    for (column, label) in &meta.column_names_to_labels {
        let value_labels = meta
            .variable_value_labels
            .get(column)
            .map_or(0, |labels| labels.len());
        if value_labels > 0 {
            println!("  {}: {} ({} value labels)", column, label, value_labels);
        } else {
            println!("  {}: {}", column, label);
        }
    }
    Ok(())
}

fn cat(path: &Path, chunk_size: Option<NonZeroUsize>, delimiter: u8) -> Result<()> {
    let file = open(path)?;
    let stdout = io::stdout();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(stdout.lock());

    let options = CsvOptions::default();
    match chunk_size {
        None => {
            let frame = file.to_frame(&options).context("Couldn't decode data.csv")?;
            write_header(&mut writer, frame.columns())?;
            write_rows(&mut writer, &frame)?;
        }
        Some(size) => {
            let chunks = file.to_chunks(size, &options)?;
            write_header(&mut writer, chunks.columns().unwrap_or_default())?;
            for chunk in chunks {
                let chunk = chunk.context("Couldn't decode data.csv")?;
                debug!("Writing a chunk of {} rows", chunk.height());
                write_rows(&mut writer, &chunk)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_header<W: Write>(writer: &mut csv::Writer<W>, columns: &[String]) -> Result<()> {
    if !columns.is_empty() {
        writer.write_record(columns)?;
    }
    Ok(())
}

fn write_rows<W: Write>(writer: &mut csv::Writer<W>, frame: &Frame) -> Result<()> {
    for row in frame.rows() {
        writer.write_record(row)?;
    }
    Ok(())
}

fn print_meta(path: &Path) -> Result<()> {
    let file = open(path)?;
    let meta = file.meta().context("Couldn't read meta.json")?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}
