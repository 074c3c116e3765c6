//! Evaluation recording
//!
//! Evaluation rollouts can be captured frame by frame. A [`RecordingSession`]
//! owns the active recorder and releases it when dropped, so every exit path
//! out of an evaluation (including a closed simulator) leaves a finished
//! file behind.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::env::Frame;

/// Sink for evaluation frames
pub trait FrameRecorder {
    /// Append one frame
    fn add_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the recording; further frames are rejected
    fn release(&mut self) -> Result<()>;

    /// Frames written so far
    fn frames(&self) -> usize;
}

/// Opens one recorder per evaluation
pub trait RecorderFactory {
    /// Start a recording for the evaluation at `episode_idx`
    fn open(&mut self, episode_idx: u64) -> Result<Box<dyn FrameRecorder>>;
}

/// Writes frames as JSON lines, one frame per line
pub struct JsonlRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frames: usize,
}

impl JsonlRecorder {
    /// Create (or truncate) a recording at `path`
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        Ok(Self { path, writer: Some(BufWriter::new(file)), frames: 0 })
    }

    /// Location of the recording
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameRecorder for JsonlRecorder {
    fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .with_context(|| format!("recording {} already released", self.path.display()))?;
        serde_json::to_writer(&mut *writer, frame)?;
        writer.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("Recording {} closed after {} frames", self.path.display(), self.frames);
        }
        Ok(())
    }

    fn frames(&self) -> usize {
        self.frames
    }
}

/// Creates `episode<N>.jsonl` files in a directory
#[derive(Debug, Clone)]
pub struct JsonlRecorderFactory {
    dir: PathBuf,
}

impl JsonlRecorderFactory {
    /// Record into `dir`, created on first use
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecorderFactory for JsonlRecorderFactory {
    fn open(&mut self, episode_idx: u64) -> Result<Box<dyn FrameRecorder>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("episode{}.jsonl", episode_idx));
        Ok(Box::new(JsonlRecorder::create(path)?))
    }
}

/// Scoped ownership of an open recorder
///
/// Dropping the session releases the recorder; errors on that path are
/// logged since there is no caller left to return them to.
pub struct RecordingSession {
    recorder: Option<Box<dyn FrameRecorder>>,
}

impl RecordingSession {
    /// Take ownership of `recorder`
    pub fn new(recorder: Box<dyn FrameRecorder>) -> Self {
        Self { recorder: Some(recorder) }
    }

    /// Append one frame
    pub fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.add_frame(frame),
            None => Ok(()),
        }
    }

    /// Frames written so far
    pub fn frames(&self) -> usize {
        self.recorder.as_ref().map_or(0, |r| r.frames())
    }

    /// Release the recorder and report any error
    pub fn finish(mut self) -> Result<usize> {
        let frames = self.frames();
        if let Some(mut recorder) = self.recorder.take() {
            recorder.release()?;
        }
        Ok(frames)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            if let Err(e) = recorder.release() {
                warn!("Failed to release recording: {:#}", e);
            }
        }
    }
}
