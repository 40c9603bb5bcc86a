//! # cabforge Core Library
//!
//! This crate builds installer cabinets in parallel. A caller describes each
//! cabinet as a [`CabinetWorkItem`], hands the items to a [`CabinetBuilder`],
//! and reads the outcome from a [`MessageSink`] once the run is over.
//!
//! ## Key Modules
//!
//! - [`builder`]: The worker pool that drains the queue and builds cabinets.
//! - [`split`]: Decides when a single large file is split across cabinet volumes.
//! - [`codec`]: The archive codec boundary the builder drives.
//! - [`archive`]: The bundled `zstd`-backed ZCAB codec and its reader.
//! - [`sink`]: Thread-safe diagnostics and exit-status aggregation.
//! - [`manifest`]: JSON build manifests for the command-line tool.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use cabforge::{CabinetBuilder, CabinetWorkItem, CompressionLevel, FileRecord, MessageSink};
//! use cabforge::archive::ZcabCodec;
//! use cabforge::codec::NumberedContinuation;
//!
//! # fn main() -> Result<(), cabforge::CabinetError> {
//! let mut builder = CabinetBuilder::new(4, Arc::new(NumberedContinuation), ZcabCodec)?;
//! builder.set_max_cabinet_size_for_large_file_splitting(1024);
//! builder.set_max_uncompressed_media_size(100);
//! builder.enqueue_all(vec![CabinetWorkItem::new(
//!     "/out/media1.cab",
//!     vec![FileRecord::new("app.exe", "/src/app.exe", 4096, 1)],
//!     CompressionLevel::High,
//!     0,
//! )?]);
//!
//! let sink = MessageSink::default();
//! builder.run(&sink);
//! std::process::exit(sink.exit_code());
//! # }
//! ```

pub mod archive;
pub mod builder;
pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod common;
pub mod error;
pub mod manifest;
pub mod queue;
pub mod sink;
pub mod split;

pub use builder::{BuildSummary, CabinetBuilder};
pub use common::{CabinetWorkItem, CompressionLevel, FileRecord};
pub use error::{CabinetError, CodecError, ErrorKind};
pub use sink::{Message, MessageLevel, MessageSink, SinkOptions};
pub use split::SplitConfig;
