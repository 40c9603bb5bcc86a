use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::Ordering;

use super::RunState;
use crate::codec::{ArchiveCodec, CabinetOutput, CabinetSpec, CabinetWriter, ContinuationNamer};
use crate::common::CabinetWorkItem;
use crate::error::CabinetError;
use crate::queue::WorkQueue;
use crate::sink::{MessageSink, CREATE_CABINET, FILE_SIZE_MISMATCH};
use crate::split::SplitConfig;

/// One build thread. Takes cabinets off the shared queue until it is empty.
pub(super) struct Worker<'a, C: ArchiveCodec> {
    pub(super) id: usize,
    pub(super) queue: &'a WorkQueue,
    pub(super) codec: &'a C,
    pub(super) namer: &'a dyn ContinuationNamer,
    pub(super) split: SplitConfig,
    pub(super) sink: &'a MessageSink,
    pub(super) state: &'a RunState,
}

impl<C: ArchiveCodec> Worker<'_, C> {
    pub(super) fn run(self) {
        while !self.state.halted.load(Ordering::SeqCst) {
            let Some(item) = self.queue.try_take() else {
                break;
            };
            let archive = item.archive_path().to_path_buf();
            self.sink
                .verbose(CREATE_CABINET, format!("creating cabinet '{}'", archive.display()));

            let result = catch_unwind(AssertUnwindSafe(|| self.build(&item)))
                .unwrap_or_else(|payload| Err(self.unexpected_panic(&archive, payload)));

            match result {
                Ok(output) => {
                    self.state.built.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(
                        worker = self.id,
                        cabinet = %archive.display(),
                        volumes = output.volumes.len(),
                        bytes = output.stored_bytes,
                        "cabinet created"
                    );
                }
                Err(err) => {
                    self.state.failed.fetch_add(1, Ordering::SeqCst);
                    self.sink.cabinet_failed(&archive, &err);
                    if err.is_fatal() {
                        self.state.halted.store(true, Ordering::SeqCst);
                        panic!("fatal fault while building cabinet '{}': {err}", archive.display());
                    }
                }
            }
        }
        tracing::trace!(worker = self.id, "worker drained");
    }

    fn build(&self, item: &CabinetWorkItem) -> Result<CabinetOutput, CabinetError> {
        let spec = CabinetSpec {
            archive_path: item.archive_path(),
            file_count: item.files().len(),
            max_cabinet_size: self.split.effective_max_cabinet_size(item),
            max_threshold: item.max_threshold(),
            compression_level: item.compression_level(),
        };

        let mut writer = self.codec.create(&spec)?;
        for file in item.files() {
            let read = writer.add_file(file)?;
            if read != file.size {
                self.sink.warning(
                    FILE_SIZE_MISMATCH,
                    format!(
                        "file '{}' ({}) was declared as {} bytes but {} bytes were read",
                        file.id,
                        file.source.display(),
                        file.size,
                        read
                    ),
                );
            }
        }
        writer.complete(self.namer)
    }

    fn unexpected_panic(&self, archive: &Path, payload: Box<dyn Any + Send>) -> CabinetError {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };
        CabinetError::Unexpected {
            message,
            kind: "panic".to_string(),
            origin: format!("worker {} building '{}'", self.id, archive.display()),
        }
    }
}
