//! Downstream publishing of completed requests
//!
//! The aggregator hands every [`RequestResult`] to a [`Publisher`] by value,
//! chunk by chunk and in request order. The transport behind the trait is not
//! this crate's concern; [`NdjsonPublisher`] writes one JSON document per line
//! to any [`Write`] sink and is what the CLI uses.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::RequestResult;

/// Publisher errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Sink could not be written
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Result could not be serialized
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Downstream refused the result
    #[error("rejected by downstream: {0}")]
    Rejected(String),
}

/// Result type for publishing
pub type PublishResult<T> = Result<T, PublishError>;

/// Consumer of completed requests
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Take ownership of one completed request
    async fn publish(&self, result: RequestResult) -> PublishResult<()>;

    /// Push out anything buffered. Called once per chunk.
    async fn flush(&self) -> PublishResult<()> {
        Ok(())
    }
}

/// Newline-delimited JSON publisher
pub struct NdjsonPublisher<W: Write + Send> {
    writer: Mutex<W>,
}

impl NdjsonPublisher<BufWriter<io::Stdout>> {
    /// Publish to standard output
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(io::stdout()))
    }
}

impl NdjsonPublisher<BufWriter<File>> {
    /// Publish to a file, truncating it
    pub fn create(path: impl AsRef<Path>) -> PublishResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> NdjsonPublisher<W> {
    /// Publish to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying sink
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for NdjsonPublisher<W> {
    async fn publish(&self, result: RequestResult) -> PublishResult<()> {
        let line = serde_json::to_string(&result)
            .map_err(|e| PublishError::SerializationError(e.to_string()))?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    async fn flush(&self) -> PublishResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}
