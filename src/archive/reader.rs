use std::fs;
use std::path::{Path, PathBuf};

use super::{CabinetIndex, IndexEntry, FOOTER_SIZE, FORMAT_VERSION, INDEX_MAGIC, VOLUME_HEADER_SIZE, VOLUME_MAGIC};
use crate::codec::ContinuationNamer;
use crate::common::CompressionLevel;
use crate::error::{CabinetError, CodecError};

/// Reads a ZCAB cabinet back, following its continuation volumes.
///
/// The whole logical stream is held in memory, which is fine for verification
/// and listing but not meant for multi-gigabyte media.
#[derive(Debug)]
pub struct CabinetReader {
    volumes: Vec<PathBuf>,
    data: Vec<u8>,
    index: CabinetIndex,
}

struct VolumeHeader {
    index: u16,
    count: u16,
}

fn corrupt(path: &Path, reason: impl Into<String>) -> CabinetError {
    CodecError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
    .into()
}

fn parse_header(path: &Path, bytes: &[u8]) -> Result<VolumeHeader, CabinetError> {
    if bytes.len() < VOLUME_HEADER_SIZE as usize || &bytes[..8] != VOLUME_MAGIC {
        return Err(corrupt(path, "missing volume header"));
    }
    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(path, format!("unsupported format version {version}")));
    }
    Ok(VolumeHeader {
        index: u16::from_le_bytes([bytes[10], bytes[11]]),
        count: u16::from_le_bytes([bytes[12], bytes[13]]),
    })
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

impl CabinetReader {
    /// Opens the cabinet at `primary`, locating continuation volumes through `namer`.
    pub fn open(primary: &Path, namer: &dyn ContinuationNamer) -> Result<Self, CabinetError> {
        let first = fs::read(primary).map_err(|e| CabinetError::io(primary, e))?;
        let header = parse_header(primary, &first)?;
        if header.index != 0 || header.count == 0 {
            return Err(corrupt(primary, "not the first volume of a cabinet"));
        }

        let mut volumes = vec![primary.to_path_buf()];
        let mut data = first[VOLUME_HEADER_SIZE as usize..].to_vec();
        for number in 2..=u32::from(header.count) {
            let path = namer.continuation_path(primary, number);
            let bytes = fs::read(&path).map_err(|e| CabinetError::io(&path, e))?;
            let continuation = parse_header(&path, &bytes)?;
            if u32::from(continuation.index) + 1 != number || continuation.count != header.count {
                return Err(corrupt(&path, "volume does not belong to this cabinet"));
            }
            data.extend_from_slice(&bytes[VOLUME_HEADER_SIZE as usize..]);
            volumes.push(path);
        }

        if (data.len() as u64) < FOOTER_SIZE {
            return Err(corrupt(primary, "truncated footer"));
        }
        let footer_start = data.len() - FOOTER_SIZE as usize;
        let footer = &data[footer_start..];
        if &footer[16..] != INDEX_MAGIC {
            return Err(corrupt(primary, "bad index magic"));
        }
        let index_size = read_u64(&footer[..8]);
        let json_size = read_u64(&footer[8..16]);
        let index_start = (footer_start as u64)
            .checked_sub(index_size)
            .ok_or_else(|| corrupt(primary, "index larger than cabinet"))? as usize;

        // The footer's size is only checked after decoding; it is never trusted as a capacity.
        let json = zstd::stream::decode_all(&data[index_start..footer_start])
            .map_err(|e| corrupt(primary, format!("index does not decompress: {e}")))?;
        if json.len() as u64 != json_size {
            return Err(corrupt(primary, "index size does not match the footer"));
        }
        let index: CabinetIndex = serde_json::from_slice(&json)?;

        for entry in &index.entries {
            let end = entry.offset.checked_add(entry.stored_size);
            if end.map_or(true, |end| end > index_start as u64) {
                return Err(corrupt(primary, format!("entry '{}' points outside file data", entry.id)));
            }
        }

        Ok(Self { volumes, data, index })
    }

    /// Primary cabinet first, then continuation volumes.
    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    pub fn index(&self) -> &CabinetIndex {
        &self.index
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.index.entries
    }

    /// Returns the uncompressed contents of the file with the given id.
    pub fn read_entry(&self, id: &str) -> Result<Vec<u8>, CabinetError> {
        let entry = self
            .entries()
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CodecError::MissingEntry(id.to_string()))?;
        self.decode(entry)
    }

    /// Extracts every file into `dir`, named by its id. Returns the written paths.
    pub fn extract_all(&self, dir: &Path) -> Result<Vec<PathBuf>, CabinetError> {
        fs::create_dir_all(dir).map_err(|e| CabinetError::io(dir, e))?;
        let mut written = Vec::with_capacity(self.entries().len());
        for entry in self.entries() {
            // Ids are flat names; anything with separators or `..` could escape `dir`.
            let name = Path::new(&entry.id);
            if name.file_name() != Some(name.as_os_str()) {
                return Err(corrupt(&self.volumes[0], format!("unsafe entry id '{}'", entry.id)));
            }
            let target = dir.join(name);
            let contents = self.decode(entry)?;
            fs::write(&target, contents).map_err(|e| CabinetError::io(&target, e))?;
            written.push(target);
        }
        Ok(written)
    }

    fn decode(&self, entry: &IndexEntry) -> Result<Vec<u8>, CabinetError> {
        let start = entry.offset as usize;
        let stored = &self.data[start..start + entry.stored_size as usize];
        let contents = match self.index.compression_level {
            CompressionLevel::None => stored.to_vec(),
            _ => zstd::stream::decode_all(stored)
                .map_err(|e| corrupt(&self.volumes[0], format!("entry '{}' does not decompress: {e}", entry.id)))?,
        };
        if contents.len() as u64 != entry.uncompressed_size {
            return Err(corrupt(&self.volumes[0], format!("entry '{}' has the wrong size", entry.id)));
        }
        Ok(contents)
    }
}
