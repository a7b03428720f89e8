mod writer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::error::MetricsError;

use super::RequestLine;

pub use writer::{SampleLogHandle, setup_sample_logger};

/// Header written before the first request line.
pub const SAMPLE_LOG_HEADER: &str = "timestamp,url,method,status,response_time,body_size";

/// Where request lines end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleLogTarget {
    Stdout,
    File(PathBuf),
}

impl SampleLogTarget {
    /// `-` selects stdout; anything else is a file path.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value == "-" {
            SampleLogTarget::Stdout
        } else {
            SampleLogTarget::File(PathBuf::from(value))
        }
    }
}

/// Producer side of the bounded request-line buffer.
///
/// Overflow is sticky: once a line could not be queued the log is
/// incomplete and every later health check fails.
#[derive(Debug)]
pub struct SampleLog {
    tx: mpsc::Sender<RequestLine>,
    capacity: usize,
    overflowed: AtomicBool,
}

impl SampleLog {
    pub(crate) const fn new(tx: mpsc::Sender<RequestLine>, capacity: usize) -> Self {
        Self {
            tx,
            capacity,
            overflowed: AtomicBool::new(false),
        }
    }

    /// Queue a line without waiting for the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is full or the writer stopped.
    pub fn send(&self, line: RequestLine) -> Result<(), MetricsError> {
        match self.tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.overflowed.store(true, Ordering::SeqCst);
                Err(MetricsError::SampleLogOverflow {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MetricsError::SampleLogClosed),
        }
    }

    /// # Errors
    ///
    /// Returns an error if a line was ever dropped or the writer stopped.
    pub fn health(&self) -> Result<(), MetricsError> {
        if self.overflowed.load(Ordering::SeqCst) {
            return Err(MetricsError::SampleLogOverflow {
                capacity: self.capacity,
            });
        }
        if self.tx.is_closed() {
            return Err(MetricsError::SampleLogClosed);
        }
        Ok(())
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
