//! Common types shared by the builder, the codecs and the manifest loader.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CabinetError;

/// Compression setting for one cabinet. The engine passes it through to the codec untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Store file data without compression.
    None,
    Low,
    #[default]
    Medium,
    High,
    /// Compatibility level for media authored against MSZIP cabinets.
    Mszip,
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::None => "none",
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
            CompressionLevel::Mszip => "mszip",
        };
        f.write_str(name)
    }
}

/// One source file destined for a cabinet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Identifier of the file inside the cabinet.
    pub id: String,
    /// Where the file's bytes are read from.
    pub source: PathBuf,
    /// Declared uncompressed size in bytes.
    pub size: u64,
    /// Position of the file within the installation media.
    pub sequence: u32,
}

impl FileRecord {
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>, size: u64, sequence: u32) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            size,
            sequence,
        }
    }
}

/// A request to build one (possibly split) cabinet.
///
/// Fields are only readable once constructed: a work item is immutable from the
/// moment it is handed to the builder until the worker that takes it drops it.
#[derive(Debug, Clone)]
pub struct CabinetWorkItem {
    archive_path: PathBuf,
    files: Vec<FileRecord>,
    compression_level: CompressionLevel,
    max_threshold: u32,
}

impl CabinetWorkItem {
    /// Creates a work item. Fails if `files` is empty.
    pub fn new(
        archive_path: impl Into<PathBuf>,
        files: Vec<FileRecord>,
        compression_level: CompressionLevel,
        max_threshold: u32,
    ) -> Result<Self, CabinetError> {
        let archive_path = archive_path.into();
        if files.is_empty() {
            return Err(CabinetError::EmptyWorkItem { archive: archive_path });
        }
        Ok(Self {
            archive_path,
            files,
            compression_level,
            max_threshold,
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// File records in the order they are added to the cabinet.
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
    }

    pub fn max_threshold(&self) -> u32 {
        self.max_threshold
    }
}
