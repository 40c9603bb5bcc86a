//! # ZCAB Cabinet Format
//!
//! The bundled codec. A cabinet is one logical byte stream that may span
//! several volume files:
//!
//! 1.  **Volume header** (16 bytes, at the start of every volume): magic
//!     `b"ZCABVOL1"`, format version, 0-based volume index and total volume
//!     count (all little-endian `u16`), 2 reserved bytes.
//! 2.  **File data**: one `zstd` frame per file (raw bytes when compression is
//!     `none`), in the order the files were added.
//! 3.  **Index**: a `zstd`-compressed JSON [`CabinetIndex`].
//! 4.  **Footer**: `[u64 index_compressed_size] [u64 index_json_size] [b"ZCABIDX1"]`.
//!
//! Concatenating the payloads (everything after the header) of all volumes in
//! order yields the logical stream. Volume size, header included, never exceeds
//! the maximum cabinet size, which is expressed in MiB.

mod reader;

pub use reader::CabinetReader;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::codec::{ArchiveCodec, CabinetOutput, CabinetSpec, CabinetWriter, ContinuationNamer};
use crate::common::{CompressionLevel, FileRecord};
use crate::error::{CabinetError, CodecError};

pub const VOLUME_MAGIC: &[u8; 8] = b"ZCABVOL1";
pub const INDEX_MAGIC: &[u8; 8] = b"ZCABIDX1";
pub const FORMAT_VERSION: u16 = 1;
pub const VOLUME_HEADER_SIZE: u64 = 16;
pub const FOOTER_SIZE: u64 = 24;
/// Cabinet size used when no split size is requested (2 GiB).
pub const DEFAULT_MAX_CABINET_SIZE_MB: u32 = 2048;

const BYTES_PER_MB: u64 = 1024 * 1024;
const COPY_BUFFER_SIZE: usize = 1 << 20; // 1 MiB
const INDEX_ZSTD_LEVEL: i32 = 3;

/// Central directory of a cabinet, stored compressed at the end of the logical stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CabinetIndex {
    pub version: u16,
    /// Unix timestamp of when the cabinet was completed.
    pub creation_timestamp: i64,
    pub compression_level: CompressionLevel,
    pub entries: Vec<IndexEntry>,
}

/// Location of one file inside the logical stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub sequence: u32,
    /// Byte offset of the file's data in the logical stream.
    pub offset: u64,
    /// Size of the data as stored (compressed size, or raw size for `none`).
    pub stored_size: u64,
    pub uncompressed_size: u64,
}

/// zstd level used for a compression setting; `None` means the data is stored raw.
pub fn zstd_level(level: CompressionLevel) -> Option<i32> {
    match level {
        CompressionLevel::None => None,
        CompressionLevel::Low => Some(1),
        CompressionLevel::Medium => Some(3),
        CompressionLevel::Mszip => Some(6),
        CompressionLevel::High => Some(19),
    }
}

fn volume_header(index: u16, count: u16) -> [u8; VOLUME_HEADER_SIZE as usize] {
    let mut header = [0u8; VOLUME_HEADER_SIZE as usize];
    header[..8].copy_from_slice(VOLUME_MAGIC);
    header[8..10].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header[10..12].copy_from_slice(&index.to_le_bytes());
    header[12..14].copy_from_slice(&count.to_le_bytes());
    header
}

struct Volume {
    file: NamedTempFile,
    len: u64,
}

/// Temporary volume files for one cabinet. Writes roll over to a new volume
/// whenever the current one reaches `capacity`. Unpersisted volumes are
/// deleted when dropped.
struct VolumeSet {
    dir: PathBuf,
    capacity: u64,
    volumes: Vec<Volume>,
    position: u64,
    max_volumes: usize,
    exhausted: bool,
}

impl VolumeSet {
    fn new(archive_path: &Path, capacity: u64) -> io::Result<Self> {
        let dir = match archive_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut set = Self {
            dir,
            capacity,
            volumes: Vec::new(),
            position: 0,
            max_volumes: usize::from(u16::MAX),
            exhausted: false,
        };
        set.open_volume()?;
        Ok(set)
    }

    fn open_volume(&mut self) -> io::Result<()> {
        // The header numbers volumes with a u16; stop before staging one that cannot be numbered.
        if self.volumes.len() >= self.max_volumes {
            self.exhausted = true;
            return Err(io::Error::new(io::ErrorKind::Other, "volume limit reached"));
        }
        let mut file = tempfile::Builder::new()
            .prefix(".zcab-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        // Placeholder; the real header is written once the volume count is known.
        file.write_all(&[0u8; VOLUME_HEADER_SIZE as usize])?;
        self.volumes.push(Volume { file, len: VOLUME_HEADER_SIZE });
        Ok(())
    }
}

impl VolumeSet {
    /// Replaces a write failure caused by running out of volume numbers.
    fn limit_error(&self, archive_path: &Path, err: CodecError) -> CodecError {
        if self.exhausted {
            CodecError::TooManyVolumes {
                path: archive_path.to_path_buf(),
                max: u16::MAX,
            }
        } else {
            err
        }
    }
}

impl Write for VolumeSet {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.volumes.last().map_or(true, |v| v.len >= self.capacity) {
            self.open_volume()?;
        }
        let capacity = self.capacity;
        let volume = self
            .volumes
            .last_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no open volume"))?;
        let room = (capacity - volume.len).min(buf.len() as u64) as usize;
        let written = volume.file.write(&buf[..room])?;
        volume.len += written as u64;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.volumes.last_mut() {
            Some(volume) => volume.file.flush(),
            None => Ok(()),
        }
    }
}

/// Copies `source` into `out`, flushing `out` every `flush_every` bytes.
fn pump<R: Read, W: Write>(
    source: &mut R,
    source_path: &Path,
    out: &mut W,
    archive_path: &Path,
    flush_every: Option<u64>,
) -> Result<u64, CodecError> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    let mut since_flush = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CodecError::SourceUnreadable {
                    path: source_path.to_path_buf(),
                    source: e,
                })
            }
        };
        out.write_all(&buf[..n]).map_err(|e| encoding(archive_path, e))?;
        total += n as u64;
        since_flush += n as u64;
        if let Some(limit) = flush_every {
            if since_flush >= limit {
                out.flush().map_err(|e| encoding(archive_path, e))?;
                since_flush = 0;
            }
        }
    }
    Ok(total)
}

fn encoding(archive_path: &Path, source: io::Error) -> CodecError {
    CodecError::Encoding {
        path: archive_path.to_path_buf(),
        source,
    }
}

/// The `zstd`-backed codec writing ZCAB cabinets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZcabCodec;

impl ArchiveCodec for ZcabCodec {
    type Writer = ZcabWriter;

    fn create(&self, spec: &CabinetSpec<'_>) -> Result<ZcabWriter, CabinetError> {
        if spec.file_count == 0 {
            return Err(CodecError::InvalidParameter("a cabinet needs at least one file".into()).into());
        }
        let max_mb = if spec.max_cabinet_size == 0 {
            DEFAULT_MAX_CABINET_SIZE_MB
        } else {
            spec.max_cabinet_size
        };
        let flush_threshold = (spec.max_threshold > 0).then(|| u64::from(spec.max_threshold) * BYTES_PER_MB);

        let volumes = VolumeSet::new(spec.archive_path, u64::from(max_mb) * BYTES_PER_MB).map_err(|e| {
            CodecError::Create {
                path: spec.archive_path.to_path_buf(),
                source: e,
            }
        })?;

        tracing::debug!(
            cabinet = %spec.archive_path.display(),
            files = spec.file_count,
            max_mb,
            level = %spec.compression_level,
            "opened cabinet"
        );

        Ok(ZcabWriter {
            archive_path: spec.archive_path.to_path_buf(),
            volumes,
            compression_level: spec.compression_level,
            flush_threshold,
            declared_files: spec.file_count,
            entries: Vec::with_capacity(spec.file_count),
            uncompressed_bytes: 0,
        })
    }
}

/// An open ZCAB cabinet.
pub struct ZcabWriter {
    archive_path: PathBuf,
    volumes: VolumeSet,
    compression_level: CompressionLevel,
    flush_threshold: Option<u64>,
    declared_files: usize,
    entries: Vec<IndexEntry>,
    uncompressed_bytes: u64,
}

impl ZcabWriter {
    fn encode(&mut self, source: &mut File, file: &FileRecord) -> Result<u64, CodecError> {
        match zstd_level(self.compression_level) {
            None => pump(source, &file.source, &mut self.volumes, &self.archive_path, None),
            Some(level) => {
                let mut encoder = zstd::stream::write::Encoder::new(&mut self.volumes, level)
                    .map_err(|e| encoding(&self.archive_path, e))?;
                let read = pump(source, &file.source, &mut encoder, &self.archive_path, self.flush_threshold)?;
                encoder.finish().map_err(|e| encoding(&self.archive_path, e))?;
                Ok(read)
            }
        }
    }
}

impl CabinetWriter for ZcabWriter {
    fn add_file(&mut self, file: &FileRecord) -> Result<u64, CabinetError> {
        if self.entries.len() >= self.declared_files {
            return Err(CodecError::InvalidParameter(format!(
                "cabinet '{}' was opened for {} files",
                self.archive_path.display(),
                self.declared_files
            ))
            .into());
        }

        let mut source = File::open(&file.source).map_err(|e| CodecError::SourceUnreadable {
            path: file.source.clone(),
            source: e,
        })?;

        let offset = self.volumes.position;
        let read = self.encode(&mut source, file).map_err(|e| self.volumes.limit_error(&self.archive_path, e))?;

        self.entries.push(IndexEntry {
            id: file.id.clone(),
            sequence: file.sequence,
            offset,
            stored_size: self.volumes.position - offset,
            uncompressed_size: read,
        });
        self.uncompressed_bytes += read;
        Ok(read)
    }

    fn complete(self, namer: &dyn ContinuationNamer) -> Result<CabinetOutput, CabinetError> {
        let ZcabWriter {
            archive_path,
            mut volumes,
            compression_level,
            declared_files,
            entries,
            uncompressed_bytes,
            ..
        } = self;

        if entries.len() != declared_files {
            return Err(CodecError::InvalidParameter(format!(
                "cabinet '{}' declared {} files but {} were added",
                archive_path.display(),
                declared_files,
                entries.len()
            ))
            .into());
        }

        let stored_bytes = volumes.position;
        let file_count = entries.len();
        let index = CabinetIndex {
            version: FORMAT_VERSION,
            creation_timestamp: chrono::Utc::now().timestamp(),
            compression_level,
            entries,
        };
        let index_json = serde_json::to_vec(&index)?;
        let index_bytes =
            zstd::bulk::compress(&index_json, INDEX_ZSTD_LEVEL).map_err(|e| encoding(&archive_path, e))?;

        let mut footer = Vec::with_capacity(FOOTER_SIZE as usize);
        footer.extend_from_slice(&(index_bytes.len() as u64).to_le_bytes());
        footer.extend_from_slice(&(index_json.len() as u64).to_le_bytes());
        footer.extend_from_slice(INDEX_MAGIC);

        volumes
            .write_all(&index_bytes)
            .and_then(|_| volumes.write_all(&footer))
            .map_err(|e| volumes.limit_error(&archive_path, encoding(&archive_path, e)))?;

        let count = u16::try_from(volumes.volumes.len()).map_err(|_| CodecError::TooManyVolumes {
            path: archive_path.clone(),
            max: u16::MAX,
        })?;
        for (i, volume) in volumes.volumes.iter_mut().enumerate() {
            let file = volume.file.as_file_mut();
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(&volume_header(i as u16, count)))
                .and_then(|_| file.flush())
                .map_err(|e| encoding(&archive_path, e))?;
        }

        let mut targets = Vec::with_capacity(count as usize);
        targets.push(archive_path.clone());
        for number in 2..=u32::from(count) {
            targets.push(namer.continuation_path(&archive_path, number));
        }

        let mut persisted: Vec<PathBuf> = Vec::with_capacity(targets.len());
        for (volume, target) in volumes.volumes.drain(..).zip(targets) {
            if let Err(e) = volume.file.persist(&target) {
                for done in &persisted {
                    let _ = std::fs::remove_file(done);
                }
                return Err(CodecError::Persist {
                    path: target,
                    source: e.error,
                }
                .into());
            }
            persisted.push(target);
        }

        if persisted.len() > 1 {
            tracing::debug!(cabinet = %archive_path.display(), volumes = persisted.len(), "cabinet split across volumes");
        }

        Ok(CabinetOutput {
            volumes: persisted,
            file_count,
            uncompressed_bytes,
            stored_bytes,
        })
    }
}
