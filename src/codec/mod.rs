//! # Archive codec boundary
//!
//! The build engine never encodes bytes itself. It drives an [`ArchiveCodec`]:
//! `create` opens a [`CabinetWriter`], `add_file` streams each source file in
//! order, and `complete` finalizes the cabinet, asking a [`ContinuationNamer`]
//! for the path of every continuation volume the codec decided to emit.
//!
//! A writer that is dropped without `complete` must release everything it
//! holds and leave no partial cabinet behind.

use std::path::{Path, PathBuf};

use crate::common::{CompressionLevel, FileRecord};
use crate::error::CabinetError;

/// Parameters for opening one cabinet.
#[derive(Debug, Clone, Copy)]
pub struct CabinetSpec<'a> {
    pub archive_path: &'a Path,
    pub file_count: usize,
    /// Maximum size of one cabinet volume in the codec's unit. `0` selects the codec default.
    pub max_cabinet_size: u32,
    /// Codec-specific threshold, passed through from the work item.
    pub max_threshold: u32,
    pub compression_level: CompressionLevel,
}

/// What a finished cabinet looks like on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetOutput {
    /// Primary cabinet first, then continuation volumes in order.
    pub volumes: Vec<PathBuf>,
    pub file_count: usize,
    pub uncompressed_bytes: u64,
    pub stored_bytes: u64,
}

/// Chooses file names for continuation volumes of a split cabinet.
pub trait ContinuationNamer: Send + Sync {
    /// Path of volume number `number` (the primary cabinet is number 1, so this is called with 2, 3, ...).
    fn continuation_path(&self, primary: &Path, number: u32) -> PathBuf;
}

impl<F> ContinuationNamer for F
where
    F: Fn(&Path, u32) -> PathBuf + Send + Sync,
{
    fn continuation_path(&self, primary: &Path, number: u32) -> PathBuf {
        self(primary, number)
    }
}

/// Default namer: `media.cab` continues as `media_2.cab`, `media_3.cab`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberedContinuation;

impl ContinuationNamer for NumberedContinuation {
    fn continuation_path(&self, primary: &Path, number: u32) -> PathBuf {
        let stem = primary.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let name = match primary.extension() {
            Some(ext) => format!("{stem}_{number}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{number}"),
        };
        primary.with_file_name(name)
    }
}

/// A cabinet format that the builder can drive from several threads at once.
pub trait ArchiveCodec: Send + Sync {
    type Writer: CabinetWriter;

    fn create(&self, spec: &CabinetSpec<'_>) -> Result<Self::Writer, CabinetError>;
}

/// An open cabinet being filled by one worker.
pub trait CabinetWriter {
    /// Streams one file into the cabinet. Returns the number of bytes read from the source.
    fn add_file(&mut self, file: &FileRecord) -> Result<u64, CabinetError>;

    /// Finalizes the cabinet, naming continuation volumes through `namer`.
    fn complete(self, namer: &dyn ContinuationNamer) -> Result<CabinetOutput, CabinetError>;
}
