//! Writing dzip archives

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::*;

use crate::file::{DATA_MEMBER, META_MEMBER};
use crate::frame::Frame;
use crate::metadata::Metadata;
use crate::read::CompressionMethod;
use crate::result::*;
use crate::sav::{self, SavOptions};
use crate::write::ZipWriter;

/// Where a new archive goes
pub enum Destination<'a> {
    /// A file, created or truncated
    Path(PathBuf),
    /// Any sink, e.g. a `Vec<u8>`
    Writer(&'a mut dyn Write),
}

impl From<&str> for Destination<'_> {
    fn from(path: &str) -> Self {
        Destination::Path(path.into())
    }
}

impl From<String> for Destination<'_> {
    fn from(path: String) -> Self {
        Destination::Path(path.into())
    }
}

impl From<&Path> for Destination<'_> {
    fn from(path: &Path) -> Self {
        Destination::Path(path.to_owned())
    }
}

impl From<PathBuf> for Destination<'_> {
    fn from(path: PathBuf) -> Self {
        Destination::Path(path)
    }
}

impl<'a, W: Write> From<&'a mut W> for Destination<'a> {
    fn from(sink: &'a mut W) -> Self {
        Destination::Writer(sink)
    }
}

/// Writes `data` and `meta` as a new dzip archive.
///
/// The payload goes to `data.csv`, then the metadata to `meta.json`,
/// both DEFLATE-compressed if `compress` is set and stored otherwise.
///
/// ```no_run
/// # use dzip::{save_dzip, Frame, Metadata};
/// # fn f(frame: Frame, meta: Metadata) -> dzip::result::DzipResult<()> {
/// let mut buffer = Vec::new();
/// save_dzip(&mut buffer, &frame, &meta, true)?;
/// save_dzip("survey.dzip", &frame, &meta, false)?;
/// # Ok(())
/// # }
/// ```
pub fn save_dzip<'a, D: Into<Destination<'a>>>(
    destination: D,
    data: &Frame,
    meta: &Metadata,
    compress: bool,
) -> DzipResult<()> {
    let method = if compress {
        CompressionMethod::Deflate
    } else {
        CompressionMethod::None
    };

    match destination.into() {
        Destination::Path(path) => {
            info!("Writing {} ({:?})", path.display(), method);
            let file = BufWriter::new(File::create(&path)?);
            write_members(file, data, meta, method)?;
        }
        Destination::Writer(sink) => {
            info!("Writing archive to a buffer ({:?})", method);
            write_members(sink, data, meta, method)?;
        }
    }
    Ok(())
}

fn write_members<W: Write>(
    sink: W,
    data: &Frame,
    meta: &Metadata,
    method: CompressionMethod,
) -> DzipResult<()> {
    let mut zip = ZipWriter::new(sink);

    let mut member = zip.start_member(DATA_MEMBER, method)?;
    data.write_csv(&mut member)?;
    member.finish()?;

    let mut member = zip.start_member(META_MEMBER, method)?;
    serde_json::to_writer(&mut member, meta)?;
    member.finish()?;

    zip.finish()?;
    Ok(())
}

/// Converts an SPSS system file into a compressed dzip archive.
///
/// The destination is only touched once the system file decoded cleanly.
pub fn spss_to_dzip<'a, P, D>(sav_path: P, destination: D) -> DzipResult<()>
where
    P: AsRef<Path>,
    D: Into<Destination<'a>>,
{
    let sav_path = sav_path.as_ref();
    let (frame, sav_meta) = sav::read_sav(sav_path, &SavOptions::default())?;
    let meta = Metadata::from_config(&sav_meta)?;
    info!(
        "Converting {} ({} rows, {} columns)",
        sav_path.display(),
        meta.number_rows,
        meta.number_columns
    );
    save_dzip(destination, &frame, &meta, true)
}
