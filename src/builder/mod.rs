//! # Parallel cabinet builder
//!
//! [`CabinetBuilder`] owns a queue of cabinet work items and builds them on a
//! bounded pool of scoped worker threads:
//!
//! 1. Work items are enqueued before the run.
//! 2. `run` spawns `min(thread_count, queued items)` workers.
//! 3. Each worker takes items until the queue is empty, building every cabinet
//!    through the split policy and the archive codec.
//! 4. Failures are reported to the [`MessageSink`] and never stop the other
//!    cabinets; only a fatal fault ends the run early.

mod worker;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::codec::{ArchiveCodec, ContinuationNamer};
use crate::common::CabinetWorkItem;
use crate::error::CabinetError;
use crate::queue::WorkQueue;
use crate::sink::MessageSink;
use crate::split::SplitConfig;

use worker::Worker;

/// Outcome counters of one [`CabinetBuilder::run`]. The sink stays the
/// authoritative record of what failed and why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub workers: usize,
    pub built: usize,
    pub failed: usize,
}

/// Counters and the stop flag shared by all workers of one run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    built: AtomicUsize,
    failed: AtomicUsize,
    halted: AtomicBool,
}

/// Builds queued cabinets on several threads and waits for all of them.
pub struct CabinetBuilder<C: ArchiveCodec> {
    queue: WorkQueue,
    thread_count: usize,
    namer: Arc<dyn ContinuationNamer>,
    codec: C,
    split: SplitConfig,
}

impl<C: ArchiveCodec> CabinetBuilder<C> {
    /// Creates a builder using at most `thread_count` workers.
    ///
    /// `namer` names continuation volumes for every cabinet of every run.
    /// Fails with [`CabinetError::InvalidThreadCount`] when `thread_count` is zero.
    pub fn new(thread_count: usize, namer: Arc<dyn ContinuationNamer>, codec: C) -> Result<Self, CabinetError> {
        if thread_count == 0 {
            return Err(CabinetError::InvalidThreadCount(thread_count));
        }
        Ok(Self {
            queue: WorkQueue::new(),
            thread_count,
            namer,
            codec,
            split: SplitConfig::default(),
        })
    }

    pub fn set_max_cabinet_size_for_large_file_splitting(&mut self, size: u32) {
        self.split.max_cabinet_size_for_large_file_splitting = size;
    }

    pub fn set_max_uncompressed_media_size(&mut self, megabytes: u32) {
        self.split.max_uncompressed_media_size = megabytes;
    }

    pub fn set_split_config(&mut self, split: SplitConfig) {
        self.split = split;
    }

    pub fn split_config(&self) -> SplitConfig {
        self.split
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn enqueue(&mut self, item: CabinetWorkItem) {
        self.queue.enqueue(item);
    }

    pub fn enqueue_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = CabinetWorkItem>,
    {
        for item in items {
            self.queue.enqueue(item);
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Workers the next `run` will spawn: never more than there are queued cabinets.
    pub fn effective_workers(&self) -> usize {
        self.thread_count.min(self.queue.len())
    }

    /// Builds every queued cabinet and returns once all workers have drained the queue.
    ///
    /// Per-cabinet failures are recorded in `sink`. A fatal fault is recorded
    /// too, after which no new cabinets are started and the panic carrying
    /// the fault is propagated to the caller once every worker has stopped.
    pub fn run(&self, sink: &MessageSink) -> BuildSummary {
        let workers = self.effective_workers();
        if workers == 0 {
            tracing::debug!("no cabinets queued");
            return BuildSummary::default();
        }

        tracing::info!(cabinets = self.queue.len(), workers, "building cabinets");

        let state = RunState::default();
        let queue = &self.queue;
        let codec = &self.codec;
        let namer: &dyn ContinuationNamer = self.namer.as_ref();
        let split = self.split;

        // A worker that panics (fatal fault) makes the scope panic after all joins.
        thread::scope(|s| {
            for id in 0..workers {
                let worker = Worker {
                    id,
                    queue,
                    codec,
                    namer,
                    split,
                    sink,
                    state: &state,
                };
                s.spawn(move || worker.run());
            }
        });

        let summary = BuildSummary {
            workers,
            built: state.built.load(Ordering::SeqCst),
            failed: state.failed.load(Ordering::SeqCst),
        };
        tracing::info!(built = summary.built, failed = summary.failed, "cabinet build finished");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZcabCodec;
    use crate::codec::NumberedContinuation;

    #[test]
    fn zero_threads_is_a_configuration_error() {
        let err = CabinetBuilder::new(0, Arc::new(NumberedContinuation), ZcabCodec).err().unwrap();
        assert!(matches!(err, CabinetError::InvalidThreadCount(0)));
    }

    #[test]
    fn empty_run_spawns_nothing() {
        let builder = CabinetBuilder::new(4, Arc::new(NumberedContinuation), ZcabCodec).unwrap();
        let sink = MessageSink::default();
        assert_eq!(builder.effective_workers(), 0);
        assert_eq!(builder.run(&sink), BuildSummary::default());
        assert!(!sink.encountered_error());
        assert!(sink.messages().is_empty());
    }
}
