use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::MetricsError;

use super::logging::SampleLog;
use super::stream::StreamAggregate;
use super::summary::{Percentile, SummaryStats};
use super::{MetricKind, RequestLine, Sample, SampleTags, unix_seconds};

#[derive(Debug)]
struct MetricStream {
    kind: MetricKind,
    aggregate: Mutex<StreamAggregate>,
}

/// Owner of every metric stream of a run.
///
/// The stream map is only write-locked when a new name shows up; appends
/// take the read lock plus the target stream's own mutex, so VUs recording
/// different metrics never contend. Once frozen, further samples are
/// counted as late and discarded.
#[derive(Debug)]
pub struct SampleRecorder {
    streams: RwLock<BTreeMap<String, Arc<MetricStream>>>,
    frozen: AtomicBool,
    late_samples: AtomicU64,
    started: Instant,
    sample_log: Option<SampleLog>,
}

impl SampleRecorder {
    #[must_use]
    pub fn new(sample_log: Option<SampleLog>) -> Self {
        Self {
            streams: RwLock::new(BTreeMap::new()),
            frozen: AtomicBool::new(false),
            late_samples: AtomicU64::new(0),
            started: Instant::now(),
            sample_log,
        }
    }

    /// Record a value stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream exists with a different kind, the value
    /// is not finite, or a stream lock is poisoned.
    pub fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        tags: &SampleTags,
    ) -> Result<(), MetricsError> {
        self.push(name, kind, value, unix_seconds(), tags.status)
    }

    /// Append a fully formed sample.
    ///
    /// # Errors
    ///
    /// Same as [`SampleRecorder::record`].
    pub fn append(&self, kind: MetricKind, sample: &Sample) -> Result<(), MetricsError> {
        self.push(
            &sample.metric,
            kind,
            sample.value,
            sample.timestamp,
            sample.tags.status,
        )
    }

    fn push(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        timestamp: i64,
        status: Option<u16>,
    ) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::NonFiniteValue {
                name: name.to_owned(),
            });
        }
        let stream = self.stream(name, kind)?;
        let mut aggregate = stream
            .aggregate
            .lock()
            .map_err(|_poison| MetricsError::LockPoisoned { context: "append" })?;
        if self.frozen.load(Ordering::SeqCst) {
            self.late_samples.fetch_add(1, Ordering::Relaxed);
            debug!("Discarding late sample for '{}'.", name);
            return Ok(());
        }
        aggregate.push(value, timestamp, status)
    }

    fn stream(&self, name: &str, kind: MetricKind) -> Result<Arc<MetricStream>, MetricsError> {
        {
            let streams = self.streams.read().map_err(|_poison| MetricsError::LockPoisoned {
                context: "stream lookup",
            })?;
            if let Some(stream) = streams.get(name) {
                return check_kind(name, stream, kind);
            }
        }

        let mut streams = self.streams.write().map_err(|_poison| MetricsError::LockPoisoned {
            context: "stream create",
        })?;
        if let Some(stream) = streams.get(name) {
            return check_kind(name, stream, kind);
        }
        let stream = Arc::new(MetricStream {
            kind,
            aggregate: Mutex::new(StreamAggregate::new(kind)?),
        });
        streams.insert(name.to_owned(), Arc::clone(&stream));
        Ok(stream)
    }

    /// Queue one per-request log line.
    ///
    /// # Errors
    ///
    /// Returns an error if the log buffer is full or the writer stopped.
    pub fn log_request(&self, line: RequestLine) -> Result<(), MetricsError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.sample_log.as_ref() {
            Some(log) => log.send(line),
            None => Ok(()),
        }
    }

    /// Surface fatal recorder conditions to the run controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample log overflowed or its writer died.
    pub fn health(&self) -> Result<(), MetricsError> {
        match self.sample_log.as_ref() {
            Some(log) => log.health(),
            None => Ok(()),
        }
    }

    /// Live summary of one stream, `None` if nothing was recorded under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if a stream lock is poisoned.
    pub fn snapshot(
        &self,
        name: &str,
        percentiles: &[Percentile],
    ) -> Result<Option<SummaryStats>, MetricsError> {
        let stream = {
            let streams = self.streams.read().map_err(|_poison| MetricsError::LockPoisoned {
                context: "snapshot",
            })?;
            match streams.get(name) {
                Some(stream) => Arc::clone(stream),
                None => return Ok(None),
            }
        };
        let aggregate = stream
            .aggregate
            .lock()
            .map_err(|_poison| MetricsError::LockPoisoned { context: "snapshot" })?;
        Ok(Some(aggregate.summarize(name, self.started.elapsed(), percentiles)))
    }

    /// Stop accepting samples and take a read-only copy of every stream.
    ///
    /// # Errors
    ///
    /// Returns an error if a stream lock is poisoned.
    pub fn freeze(&self) -> Result<FrozenMetrics, MetricsError> {
        self.frozen.store(true, Ordering::SeqCst);
        let elapsed = self.started.elapsed();
        let streams = self
            .streams
            .read()
            .map_err(|_poison| MetricsError::LockPoisoned { context: "freeze" })?;
        let mut frozen = BTreeMap::new();
        for (name, stream) in streams.iter() {
            let aggregate = stream
                .aggregate
                .lock()
                .map_err(|_poison| MetricsError::LockPoisoned { context: "freeze" })?;
            frozen.insert(name.clone(), aggregate.clone());
        }
        Ok(FrozenMetrics {
            streams: frozen,
            elapsed,
        })
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn late_samples(&self) -> u64 {
        self.late_samples.load(Ordering::Relaxed)
    }
}

fn check_kind(
    name: &str,
    stream: &Arc<MetricStream>,
    requested: MetricKind,
) -> Result<Arc<MetricStream>, MetricsError> {
    if stream.kind == requested {
        Ok(Arc::clone(stream))
    } else {
        Err(MetricsError::KindMismatch {
            name: name.to_owned(),
            existing: stream.kind,
            requested,
        })
    }
}

/// Read-only copy of every stream taken when the run ended.
#[derive(Debug, Clone)]
pub struct FrozenMetrics {
    streams: BTreeMap<String, StreamAggregate>,
    elapsed: Duration,
}

impl FrozenMetrics {
    /// Summaries for every stream, sorted by name.
    #[must_use]
    pub fn summarize(&self, percentiles: &[Percentile]) -> Vec<SummaryStats> {
        self.streams
            .iter()
            .map(|(name, aggregate)| aggregate.summarize(name, self.elapsed, percentiles))
            .collect()
    }

    #[must_use]
    pub fn summary(&self, name: &str, percentiles: &[Percentile]) -> Option<SummaryStats> {
        self.streams
            .get(name)
            .map(|aggregate| aggregate.summarize(name, self.elapsed, percentiles))
    }

    #[must_use]
    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.streams.get(name).map(StreamAggregate::kind)
    }

    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
