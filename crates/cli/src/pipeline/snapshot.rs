//! PNG snapshots of combined frames.

use std::fs;
use std::path::{Path, PathBuf};

use contracts::CombinedFrame;
use tracing::debug;

use crate::error::{CliError, Result};

/// Writes every Nth combined frame as `frame_{id}.png`
#[derive(Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
    every: u64,
    written: u64,
}

impl SnapshotWriter {
    /// Create the output directory if needed
    pub fn new(dir: impl AsRef<Path>, every: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            every: every.max(1),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Save `frame` if it falls on the interval; returns the written path
    pub fn maybe_write(&mut self, frame: &CombinedFrame) -> Result<Option<PathBuf>> {
        if !frame.frame_id.is_multiple_of(self.every) {
            return Ok(None);
        }

        let path = self.dir.join(format!("frame_{:08}.png", frame.frame_id));
        let path_str = path.display().to_string();
        let rgb =
            ingestion::to_rgb_image(&frame.image).map_err(|e| CliError::snapshot(&path_str, e))?;
        rgb.save(&path).map_err(|e| CliError::snapshot(&path_str, e))?;

        self.written += 1;
        debug!(frame_id = frame.frame_id, path = %path_str, "snapshot written");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ImageData;

    fn frame(frame_id: u64) -> CombinedFrame {
        CombinedFrame {
            frame_id,
            pts: 0.0,
            produced_at: 0.0,
            image: ImageData::filled(8, 4, [10, 20, 30]),
            tiles: Vec::new(),
        }
    }

    #[test]
    fn test_writes_every_nth_frame() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("snapshots");
        let mut writer = SnapshotWriter::new(&out, 2).unwrap();

        let written: Vec<_> = (0..5)
            .filter_map(|id| writer.maybe_write(&frame(id)).unwrap())
            .collect();

        assert_eq!(written.len(), 3);
        assert_eq!(writer.written(), 3);
        assert!(out.join("frame_00000000.png").exists());
        assert!(out.join("frame_00000004.png").exists());
        assert!(!out.join("frame_00000001.png").exists());
    }

    #[test]
    fn test_zero_interval_writes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path(), 0).unwrap();
        assert!(writer.maybe_write(&frame(3)).unwrap().is_some());
    }
}
