use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Url};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::TargetConfig;
use crate::error::{AppResult, HttpError, MetricsError};
use crate::executor::IterationCallback;
use crate::metrics::{
    MetricKind, RequestErrorKind, RequestLine, SampleRecorder, SampleTags, names, unix_seconds,
};
use crate::vu::VirtualUser;

const METHOD: &str = "GET";

/// Status reported for requests that never produced a response.
const NO_RESPONSE: u16 = 0;

#[derive(Debug)]
struct Response {
    status: u16,
    body_size: u64,
}

/// One GET against the target per iteration, recorded as the built-in
/// `http_*`, `checks`, `errors`, and `data_received` streams.
#[derive(Debug, Clone)]
pub struct HttpIteration {
    client: Client,
    url: Url,
    label: Arc<str>,
    expected_status: u16,
    discard_body: bool,
}

impl HttpIteration {
    /// # Errors
    ///
    /// Returns an error when the target URL does not parse.
    pub fn new(client: Client, target: &TargetConfig) -> Result<Self, HttpError> {
        let url = Url::parse(&target.url).map_err(|source| HttpError::InvalidUrl {
            url: target.url.clone(),
            source,
        })?;
        Ok(Self {
            client,
            label: Arc::from(url.as_str()),
            url,
            expected_status: target.expected_status,
            discard_body: target.discard_response_bodies,
        })
    }

    async fn fetch(&self) -> Result<Response, reqwest::Error> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status().as_u16();
        let body_size = if self.discard_body {
            drain_response_body(response).await?
        } else {
            let body = response.bytes().await?;
            u64::try_from(body.len()).unwrap_or(u64::MAX)
        };
        Ok(Response { status, body_size })
    }

    fn record(
        &self,
        recorder: &SampleRecorder,
        tags: &SampleTags,
        elapsed_ms: f64,
        body_size: u64,
        passed: bool,
    ) -> Result<(), MetricsError> {
        let failed = if passed { 0.0 } else { 1.0 };
        recorder.record(names::HTTP_REQS, MetricKind::Counter, 1.0, tags)?;
        recorder.record(names::HTTP_REQ_DURATION, MetricKind::Trend, elapsed_ms, tags)?;
        recorder.record(names::HTTP_REQ_FAILED, MetricKind::Rate, failed, tags)?;
        recorder.record(names::CHECKS, MetricKind::Rate, 1.0 - failed, tags)?;
        recorder.record(names::ERRORS, MetricKind::Rate, failed, tags)?;
        recorder.record(
            names::DATA_RECEIVED,
            MetricKind::Counter,
            body_size as f64,
            tags,
        )
    }

    fn log_line(
        &self,
        recorder: &SampleRecorder,
        timestamp: i64,
        status: u16,
        response_time_ms: f64,
        body_size: u64,
    ) -> Result<(), MetricsError> {
        recorder.log_request(RequestLine {
            timestamp,
            url: Arc::clone(&self.label),
            method: METHOD,
            status,
            response_time_ms,
            body_size,
        })
    }
}

#[async_trait]
impl IterationCallback for HttpIteration {
    async fn run(&self, vu: &VirtualUser, recorder: &SampleRecorder) -> AppResult<()> {
        let timestamp = unix_seconds();
        let started = Instant::now();
        let outcome = self.fetch().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (status, body_size, error) = match outcome {
            Ok(response) => (response.status, response.body_size, None),
            Err(err) => {
                let kind = if err.is_timeout() {
                    RequestErrorKind::Timeout
                } else {
                    RequestErrorKind::Transport
                };
                debug!("VU {} request failed ({}): {}", vu.index(), kind.as_str(), err);
                (NO_RESPONSE, 0, Some(kind))
            }
        };
        let passed = error.is_none() && status == self.expected_status;
        let tags = SampleTags::request(METHOD, &self.label, status).with_error(error);

        self.record(recorder, &tags, elapsed_ms, body_size, passed)?;
        self.log_line(recorder, timestamp, status, elapsed_ms, body_size)?;
        Ok(())
    }

    fn on_cancel(&self, vu: &VirtualUser, recorder: &SampleRecorder, elapsed: Duration) {
        let elapsed_secs = i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX);
        let timestamp = unix_seconds().saturating_sub(elapsed_secs);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let tags = SampleTags::request(METHOD, &self.label, NO_RESPONSE)
            .with_error(Some(RequestErrorKind::Timeout));
        let recorded = self
            .record(recorder, &tags, elapsed_ms, 0, false)
            .and_then(|()| self.log_line(recorder, timestamp, NO_RESPONSE, elapsed_ms, 0));
        if let Err(err) = recorded {
            warn!("VU {} could not record its cancelled request: {}", vu.index(), err);
        }
    }
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}
