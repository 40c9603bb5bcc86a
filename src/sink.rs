//! Thread-safe diagnostics aggregator for one build run.
//!
//! Workers report through a shared `&MessageSink`; once the run is over the
//! caller asks the sink whether an error occurred and which exit code to use.
//! Each message is also forwarded to `tracing` at the matching level.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::CabinetError;

/// Verbose: a cabinet build is about to start.
pub const CREATE_CABINET: i32 = 9001;
/// Warning: a source file's declared size differs from the bytes actually read.
pub const FILE_SIZE_MISMATCH: i32 = 1001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Verbose,
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: MessageLevel,
    pub number: i32,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            MessageLevel::Verbose => "verbose",
            MessageLevel::Information => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        };
        write!(f, "{prefix} CAB{:04}: {}", self.number, self.text)
    }
}

/// How warnings are filtered or promoted.
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    pub suppress_all_warnings: bool,
    pub warnings_as_errors: bool,
    pub suppressed_warnings: HashSet<i32>,
    pub elevated_warnings: HashSet<i32>,
}

#[derive(Debug, Default)]
pub struct MessageSink {
    options: SinkOptions,
    messages: Mutex<Vec<Message>>,
    encountered_error: AtomicBool,
    last_error_number: AtomicI32,
}

impl MessageSink {
    pub fn new(options: SinkOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Records a message, applying warning suppression and elevation first.
    pub fn message(&self, mut message: Message) {
        if message.level == MessageLevel::Warning {
            if self.options.suppress_all_warnings || self.options.suppressed_warnings.contains(&message.number) {
                return;
            }
            if self.options.warnings_as_errors || self.options.elevated_warnings.contains(&message.number) {
                message.level = MessageLevel::Error;
            }
        }

        match message.level {
            MessageLevel::Verbose => tracing::debug!(number = message.number, "{}", message.text),
            MessageLevel::Information => tracing::info!(number = message.number, "{}", message.text),
            MessageLevel::Warning => tracing::warn!(number = message.number, "{}", message.text),
            MessageLevel::Error => tracing::error!(number = message.number, "{}", message.text),
        }

        // Error state is updated under the same lock so readers never see a
        // recorded error without the flag, or the flag without the message.
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        if message.level == MessageLevel::Error {
            self.encountered_error.store(true, Ordering::SeqCst);
            self.last_error_number.store(message.number, Ordering::SeqCst);
        }
        messages.push(message);
    }

    pub fn verbose(&self, number: i32, text: impl Into<String>) {
        self.message(Message { level: MessageLevel::Verbose, number, text: text.into() });
    }

    pub fn info(&self, number: i32, text: impl Into<String>) {
        self.message(Message { level: MessageLevel::Information, number, text: text.into() });
    }

    pub fn warning(&self, number: i32, text: impl Into<String>) {
        self.message(Message { level: MessageLevel::Warning, number, text: text.into() });
    }

    pub fn error(&self, number: i32, text: impl Into<String>) {
        self.message(Message { level: MessageLevel::Error, number, text: text.into() });
    }

    /// Records the failure of one cabinet, numbered by the error's kind.
    pub fn cabinet_failed(&self, archive: &Path, err: &CabinetError) {
        self.error(
            err.kind().message_number(),
            format!("failed to create cabinet '{}': {err}", archive.display()),
        );
    }

    pub fn encountered_error(&self) -> bool {
        self.encountered_error.load(Ordering::SeqCst)
    }

    /// Number of the most recent error, or 0 when none was recorded.
    pub fn last_error_number(&self) -> i32 {
        self.last_error_number.load(Ordering::SeqCst)
    }

    /// Process exit status for the run: the last error number, or 0.
    ///
    /// Never 0 once an error was recorded, even one numbered 0.
    pub fn exit_code(&self) -> i32 {
        if !self.encountered_error() {
            return 0;
        }
        match self.last_error_number() {
            0 => 1,
            number => number,
        }
    }

    pub fn error_count(&self) -> usize {
        self.lock_messages().iter().filter(|m| m.level == MessageLevel::Error).count()
    }

    /// Snapshot of every recorded message, in recording order.
    pub fn messages(&self) -> Vec<Message> {
        self.lock_messages().clone()
    }

    /// Takes every recorded message. The error state is kept.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.lock_messages())
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
