//! Large-file splitting policy.
//!
//! Decides the maximum cabinet size handed to the codec for one work item. A
//! cabinet is only ever split when it holds a single file that reaches the
//! configured uncompressed media size; multi-file cabinets always get the
//! codec's default ceiling.

use serde::{Deserialize, Serialize};

use crate::common::CabinetWorkItem;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Size settings shared by every cabinet of a build run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitConfig {
    /// Maximum cabinet size (codec size unit) used when splitting a large file. `0` disables splitting.
    #[serde(default)]
    pub max_cabinet_size_for_large_file_splitting: u32,
    /// Uncompressed size, in megabytes, at which a lone file counts as large.
    #[serde(default)]
    pub max_uncompressed_media_size: u32,
}

impl SplitConfig {
    pub fn new(max_cabinet_size_for_large_file_splitting: u32, max_uncompressed_media_size: u32) -> Self {
        Self {
            max_cabinet_size_for_large_file_splitting,
            max_uncompressed_media_size,
        }
    }

    /// Uncompressed size in bytes at which a single-file cabinet gets split.
    pub fn large_file_threshold_bytes(&self) -> u64 {
        u64::from(self.max_uncompressed_media_size) * BYTES_PER_MB
    }

    /// Returns the maximum cabinet size to pass to the codec for `item`.
    ///
    /// `0` means "no splitting, use the codec's default ceiling".
    pub fn effective_max_cabinet_size(&self, item: &CabinetWorkItem) -> u32 {
        if self.max_cabinet_size_for_large_file_splitting == 0 {
            return 0;
        }

        match item.files() {
            [only] if only.size >= self.large_file_threshold_bytes() => {
                self.max_cabinet_size_for_large_file_splitting
            }
            _ => 0,
        }
    }
}
