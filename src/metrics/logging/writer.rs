use std::fmt::Write as _;
use std::time::Duration;

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::debug;

use crate::error::{AppError, AppResult, MetricsError};

use super::super::RequestLine;
use super::{SAMPLE_LOG_HEADER, SampleLog, SampleLogTarget};

const LOG_BUFFER_SIZE: usize = 256 * 1024;
const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Writer task of the sample log. `finish` drains what is queued and
/// reports how many lines were written.
#[derive(Debug)]
pub struct SampleLogHandle {
    close: oneshot::Sender<()>,
    task: JoinHandle<AppResult<u64>>,
}

impl SampleLogHandle {
    /// # Errors
    ///
    /// Returns an error if writing failed or the writer task panicked.
    pub async fn finish(self) -> AppResult<u64> {
        if self.close.send(()).is_err() {
            debug!("Sample log writer already stopped.");
        }
        self.task.await?
    }
}

/// Open the target and spawn the writer behind a buffer of `capacity` lines.
///
/// # Errors
///
/// Returns an error if the target file cannot be created.
pub async fn setup_sample_logger(
    target: SampleLogTarget,
    capacity: usize,
) -> AppResult<(SampleLog, SampleLogHandle)> {
    let sink: Box<dyn AsyncWrite + Send + Unpin> = match &target {
        SampleLogTarget::Stdout => Box::new(tokio::io::stdout()),
        SampleLogTarget::File(path) => {
            let file = File::create(path).await.map_err(|err| {
                AppError::metrics(MetricsError::Io {
                    context: "create sample log",
                    source: err,
                })
            })?;
            Box::new(file)
        }
    };
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel::<RequestLine>(capacity);
    let (close_tx, close_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(write_lines(sink, rx, close_rx));
    Ok((
        SampleLog::new(tx, capacity),
        SampleLogHandle {
            close: close_tx,
            task,
        },
    ))
}

async fn write_lines(
    sink: Box<dyn AsyncWrite + Send + Unpin>,
    mut rx: mpsc::Receiver<RequestLine>,
    mut close_rx: oneshot::Receiver<()>,
) -> AppResult<u64> {
    let mut writer = BufWriter::with_capacity(LOG_BUFFER_SIZE, sink);
    let mut buffer = String::with_capacity(LOG_BUFFER_SIZE);
    let mut written: u64 = 0;
    let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);

    push_line(&mut buffer, &SAMPLE_LOG_HEADER)?;

    loop {
        tokio::select! {
            maybe_line = rx.recv() => {
                let Some(line) = maybe_line else {
                    break;
                };
                push_line(&mut buffer, &line)?;
                written = written.saturating_add(1);
                if buffer.len() >= LOG_BUFFER_SIZE {
                    write_buffer(&mut writer, &mut buffer).await?;
                }
            }
            _ = flush_tick.tick() => {
                write_buffer(&mut writer, &mut buffer).await?;
                flush(&mut writer).await?;
            }
            _ = &mut close_rx => {
                break;
            }
        }
    }

    // Whatever was queued before close still belongs in the log.
    rx.close();
    while let Some(line) = rx.recv().await {
        push_line(&mut buffer, &line)?;
        written = written.saturating_add(1);
    }
    write_buffer(&mut writer, &mut buffer).await?;
    flush(&mut writer).await?;
    debug!("Sample log closed after {} lines.", written);
    Ok(written)
}

fn push_line(buffer: &mut String, line: &dyn std::fmt::Display) -> AppResult<()> {
    writeln!(buffer, "{}", line).map_err(|err| {
        AppError::metrics(MetricsError::External {
            context: "format sample log line",
            source: Box::new(err),
        })
    })
}

async fn write_buffer<W>(writer: &mut BufWriter<W>, buffer: &mut String) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    if buffer.is_empty() {
        return Ok(());
    }
    writer.write_all(buffer.as_bytes()).await.map_err(|err| {
        AppError::metrics(MetricsError::Io {
            context: "write sample log",
            source: err,
        })
    })?;
    buffer.clear();
    Ok(())
}

async fn flush<W>(writer: &mut BufWriter<W>) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.flush().await.map_err(|err| {
        AppError::metrics(MetricsError::Io {
            context: "flush sample log",
            source: err,
        })
    })
}
