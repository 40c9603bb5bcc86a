use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of a [`CabinetError`].
///
/// The worker loop consults [`ErrorKind::is_fatal`] to decide whether a failed
/// cabinet is recorded and skipped, or recorded and re-raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid builder settings, work items or manifests. Raised before any work starts.
    Configuration,
    /// Archive creation, file addition or finalization failed.
    Codec,
    /// Filesystem failure outside of the codec.
    Io,
    /// Anything the engine does not recognize, e.g. a panic inside a codec.
    Unexpected,
    /// A fault after which continuing is unsafe.
    Fatal,
}

impl ErrorKind {
    /// Returns true if the failure must terminate the run instead of being recorded and skipped.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Fatal)
    }

    /// The message number reported to the sink for errors of this kind.
    pub fn message_number(self) -> i32 {
        match self {
            ErrorKind::Unexpected => 1,
            ErrorKind::Fatal => 2,
            ErrorKind::Configuration => 10,
            ErrorKind::Codec => 20,
            ErrorKind::Io => 30,
        }
    }
}

/// Errors raised by an archive codec while creating, filling, finalizing or reading a cabinet.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The cabinet (or one of its volumes) could not be created in the target directory.
    #[error("cannot create cabinet '{}': {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file could not be opened or read while being added.
    #[error("cannot read source file '{}': {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or compressing cabinet data failed.
    #[error("encoding failed for cabinet '{}': {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A continuation volume could not be moved to the name chosen for it.
    #[error("cannot persist volume '{}': {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The codec was asked to do something its format cannot express.
    #[error("invalid cabinet parameter: {0}")]
    InvalidParameter(String),

    /// The cabinet needs more volumes than the header can number.
    #[error("cabinet '{}' needs more than {max} volumes", path.display())]
    TooManyVolumes { path: PathBuf, max: u16 },

    /// A cabinet being read is malformed.
    #[error("corrupt cabinet '{}': {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// No file with the requested id exists in the cabinet.
    #[error("no file '{0}' in cabinet")]
    MissingEntry(String),
}

/// The primary error type for all operations in the `cabforge` crate.
#[derive(Debug, Error)]
pub enum CabinetError {
    /// The builder was configured with zero worker threads.
    #[error("thread count must be a positive integer, got {0}")]
    InvalidThreadCount(usize),

    /// A work item was created without any file records.
    #[error("cabinet '{}' has no files", archive.display())]
    EmptyWorkItem { archive: PathBuf },

    /// The build manifest could not be parsed or is inconsistent.
    #[error("invalid manifest '{}': {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// Failure reported by the archive codec.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An I/O error outside the codec. Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error during serialization or deserialization of JSON data.
    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A failure the engine does not recognize, with its diagnostic detail.
    #[error("unexpected failure ({kind}) in {origin}: {message}")]
    Unexpected {
        message: String,
        kind: String,
        origin: String,
    },

    /// An unrecoverable fault. The run must not continue after one of these.
    #[error("fatal fault: {0}")]
    Fatal(String),
}

impl CabinetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CabinetError::InvalidThreadCount(_)
            | CabinetError::EmptyWorkItem { .. }
            | CabinetError::Manifest { .. } => ErrorKind::Configuration,
            CabinetError::Codec(_) => ErrorKind::Codec,
            CabinetError::Io { .. } | CabinetError::SerdeJson(_) => ErrorKind::Io,
            CabinetError::Unexpected { .. } => ErrorKind::Unexpected,
            CabinetError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CabinetError::Io { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fatal_kind_is_fatal() {
        let err = CabinetError::Fatal("heap corrupted".into());
        assert!(err.is_fatal());

        let codec = CabinetError::from(CodecError::InvalidParameter("file count is zero".into()));
        assert_eq!(codec.kind(), ErrorKind::Codec);
        assert!(!codec.is_fatal());
        assert!(!CabinetError::InvalidThreadCount(0).is_fatal());
    }

    #[test]
    fn codec_errors_display_transparently() {
        let err = CabinetError::from(CodecError::SourceUnreadable {
            path: PathBuf::from("/src/missing.dll"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        });
        let text = err.to_string();
        assert!(text.contains("/src/missing.dll"), "{text}");
        assert!(text.contains("not found"), "{text}");
    }
}
