//! Pending cabinet work shared by the build workers.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::common::CabinetWorkItem;

/// Multi-consumer queue of cabinet work items.
///
/// Items are pushed before a run starts and popped concurrently by the workers.
/// Each item is handed to exactly one caller of [`WorkQueue::try_take`]; there
/// is no FIFO guarantee across threads.
#[derive(Debug)]
pub struct WorkQueue {
    sender: Sender<CabinetWorkItem>,
    receiver: Receiver<CabinetWorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn enqueue(&self, item: CabinetWorkItem) {
        // The queue owns both ends, so the channel is never disconnected.
        let sent = self.sender.send(item);
        debug_assert!(sent.is_ok(), "work queue receiver dropped");
    }

    /// Removes one item, or returns `None` once the queue is empty.
    pub fn try_take(&self) -> Option<CabinetWorkItem> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
