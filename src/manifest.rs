//! JSON build manifest: which cabinets to build from which files, plus the
//! run-wide split settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{CabinetWorkItem, CompressionLevel, FileRecord};
use crate::split::SplitConfig;
use crate::CabinetError;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BuildSettings {
    /// Worker threads. `None` or `0` means one per CPU.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(flatten)]
    pub split: SplitConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ManifestFile {
    /// Defaults to the source's file name.
    #[serde(default)]
    pub id: Option<String>,
    pub source: PathBuf,
    /// Defaults to the size on disk.
    #[serde(default)]
    pub size: Option<u64>,
    /// Defaults to the 1-based position in the cabinet.
    #[serde(default)]
    pub sequence: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ManifestCabinet {
    pub path: PathBuf,
    #[serde(default)]
    pub compression_level: CompressionLevel,
    #[serde(default)]
    pub max_threshold: u32,
    pub files: Vec<ManifestFile>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BuildManifest {
    #[serde(default)]
    pub settings: BuildSettings,
    #[serde(default)]
    pub cabinets: Vec<ManifestCabinet>,
}

impl BuildManifest {
    /// Reads and parses a manifest file.
    pub fn load(path: &Path) -> Result<Self, CabinetError> {
        let text = fs::read_to_string(path).map_err(|e| CabinetError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| CabinetError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Converts the manifest into work items.
    ///
    /// Relative source paths are resolved against `source_dir`, relative
    /// cabinet paths against `output_dir`. Cabinet paths are made absolute.
    pub fn work_items(&self, source_dir: &Path, output_dir: &Path) -> Result<Vec<CabinetWorkItem>, CabinetError> {
        let output_dir = absolute(output_dir)?;
        let mut items = Vec::with_capacity(self.cabinets.len());

        for cabinet in &self.cabinets {
            let archive_path = output_dir.join(&cabinet.path);
            let files = cabinet
                .files
                .iter()
                .enumerate()
                .map(|(position, file)| resolve_file(source_dir, position, file))
                .collect();
            items.push(CabinetWorkItem::new(
                archive_path,
                files,
                cabinet.compression_level,
                cabinet.max_threshold,
            )?);
        }
        Ok(items)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, CabinetError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| CabinetError::io(path, e))?;
    Ok(cwd.join(path))
}

fn resolve_file(source_dir: &Path, position: usize, file: &ManifestFile) -> FileRecord {
    let source = source_dir.join(&file.source);
    let id = file.id.clone().unwrap_or_else(|| {
        file.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("file{}", position + 1))
    });
    // An unreadable source gets size 0; the codec reports it when the cabinet is built.
    let size = file
        .size
        .unwrap_or_else(|| fs::metadata(&source).map(|m| m.len()).unwrap_or(0));
    let sequence = file.sequence.unwrap_or(position as u32 + 1);
    FileRecord {
        id,
        source,
        size,
        sequence,
    }
}
