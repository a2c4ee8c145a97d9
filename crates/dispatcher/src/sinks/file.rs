//! FileSink - appends fusion batches to a JSON lines file

use contracts::{ContractError, FusionBatch, MetadataSink};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file; parent directories are created
    pub path: PathBuf,
    /// Append instead of truncating an existing file
    pub append: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// Keys: `path` (default `./output/fusion.jsonl`), `append` (`true`/`false`).
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/fusion.jsonl"));
        let append = params
            .get("append")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Self { path, append }
    }
}

/// Sink that writes one JSON object per fusion cycle
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    /// Create a new FileSink, opening the output file
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    /// Lines written so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    fn write_line(&mut self, batch: &FusionBatch) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("sink already closed"))?;
        serde_json::to_writer(&mut *writer, batch)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn persist_batch(&mut self, batch: &FusionBatch) -> Result<(), ContractError> {
        self.write_line(batch).map_err(|e| {
            error!(sink = %self.name, cycle = batch.cycle, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl MetadataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, batch),
        fields(sink = %self.name, cycle = batch.cycle)
    )]
    async fn write(&mut self, batch: &FusionBatch) -> Result<(), ContractError> {
        self.persist_batch(batch)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        debug!(
            sink = %self.name,
            path = %self.config.path.display(),
            lines = self.lines,
            "FileSink closed"
        );
        Ok(())
    }
}
