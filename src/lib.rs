//! dzip stores a table as a ZIP archive with two members:
//! `data.csv`, the rows, and `meta.json`, what the columns mean.
//!
//! ```no_run
//! # use dzip::*;
//! // Read an archive whole...
//! let file = DzipFile::open("survey.dzip")?;
//! let (frame, meta) = file.extract()?;
//! println!("{} has {} labelled columns", file, meta.column_names_to_labels.len());
//!
//! // ...or in chunks, if the payload is large.
//! let size = std::num::NonZeroUsize::new(10_000).unwrap();
//! for chunk in file.to_chunks(size, &CsvOptions::default())? {
//!     let chunk = chunk?;
//!     // Each chunk is a Frame of at most 10,000 rows.
//! }
//!
//! // Write it back out, stored instead of deflated this time.
//! save_dzip("survey-stored.dzip", &frame, &meta, false)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The metadata is four fields: value labels for categorical columns,
//! a label for each column, and the declared row and column counts.
//! Those counts are whatever the producer wrote; nothing checks them
//! against the payload.
//!
//! Most dzip files start life as SPSS system files:
//! ```no_run
//! # use dzip::*;
//! spss_to_dzip("survey.sav", "survey.dzip")?;
//!
//! // Or, to look at the SPSS metadata first:
//! let (frame, sav_meta) = sav::read_sav("survey.sav", &sav::SavOptions::default())?;
//! println!("{} encoded in {}", sav_meta.file_label, sav_meta.file_encoding);
//! let mut buffer = Vec::new();
//! save_dzip(&mut buffer, &frame, &Metadata::from_config(&sav_meta)?, true)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The archive is read into memory up front and shared (through an `Arc`)
//! by every member stream opened from it, so a chunk iterator can outlive
//! the [`DzipFile`] that made it. ZIP parsing and writing live in
//! [`read`] and [`write`]; archives from other ZIP tools
//! (data descriptors, CP437 names, Zip64 directories) read fine.

pub mod file;
pub mod frame;
pub mod metadata;
pub mod read;
pub mod result;
pub mod sav;
pub mod save;
pub mod size;
pub mod write;

pub use file::{read_dzip, DzipFile, DzipReadOptions, Member, Source, Table};
pub use frame::{Chunks, CsvOptions, Frame};
pub use metadata::{Metadata, MetadataConfig, MetadataContainer};
pub use result::{DzipError, DzipResult};
pub use save::{save_dzip, spss_to_dzip, Destination};
pub use size::sizeof_fmt;

mod crc_reader;
mod spec;
