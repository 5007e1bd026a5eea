//! Video recording of the capture region.
//!
//! Frames are piped as raw RGBA into an `ffmpeg` child process which writes
//! an XVID-tagged MPEG-4 AVI at a fixed frame rate.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

/// Destination for recorded frames. One sink per capture session.
pub trait VideoSink {
    /// Appends one frame. Its size must match the size the sink was opened with.
    fn append(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Finalizes the recording. Consumes the sink, so it runs at most once.
    fn release(self: Box<Self>) -> Result<()>;
}

/// Opens a sink sized to a capture region.
pub trait RecorderFactory {
    fn open(&self, width: u32, height: u32) -> Result<Box<dyn VideoSink + Send>>;
}

/// Opens `FfmpegRecorder`s writing to one fixed output file.
#[derive(Clone, Debug)]
pub struct FfmpegRecorderFactory {
    pub ffmpeg: PathBuf,
    pub output: PathBuf,
    pub fps: u32,
}

impl RecorderFactory for FfmpegRecorderFactory {
    fn open(&self, width: u32, height: u32) -> Result<Box<dyn VideoSink + Send>> {
        let recorder = FfmpegRecorder::spawn(&self.ffmpeg, &self.output, width, height, self.fps)?;
        Ok(Box::new(recorder))
    }
}

/// Command-line arguments for encoding raw RGBA frames from stdin.
pub fn ffmpeg_args(width: u32, height: u32, fps: u32, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        // yuv420p needs even dimensions
        "-vf".to_string(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string(),
        "-c:v".to_string(),
        "mpeg4".to_string(),
        "-vtag".to_string(),
        "xvid".to_string(),
        "-q:v".to_string(),
        "4".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Checks a frame against the recording size.
pub fn check_frame_size(frame: &RgbaImage, width: u32, height: u32) -> Result<()> {
    if frame.dimensions() != (width, height) {
        return Err(anyhow!(
            "Frame is {}x{}, recording is {}x{}",
            frame.width(),
            frame.height(),
            width,
            height
        ));
    }
    Ok(())
}

/// Forwards the encoder's stderr to the log until it closes, so a chatty
/// encoder never blocks on a full pipe. Yields the last line seen.
fn drain_stderr(pipe: ChildStderr) -> JoinHandle<Option<String>> {
    thread::spawn(move || {
        let mut last = None;
        for line in BufReader::new(pipe).lines() {
            let Ok(line) = line else {
                break;
            };
            if !line.trim().is_empty() {
                warn!("ffmpeg: {}", line.trim());
                last = Some(line);
            }
        }
        last
    })
}

/// A running ffmpeg encoder.
pub struct FfmpegRecorder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<Option<String>>>,
    output: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

impl FfmpegRecorder {
    pub fn spawn(ffmpeg: &Path, output: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        let mut command = Command::new(ffmpeg);
        command.args(ffmpeg_args(width, height, fps, output));
        let recorder = Self::start(command, output, width, height)
            .with_context(|| format!("Failed to start {}", ffmpeg.display()))?;

        info!(
            "Recording {}x{} @ {} fps to {}",
            width,
            height,
            fps,
            output.display()
        );
        Ok(recorder)
    }

    /// Runs `command` as the encoder, feeding frames on its stdin.
    fn start(mut command: Command, output: &Path, width: u32, height: u32) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin not available"))?;
        let stderr = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            output: output.to_path_buf(),
            width,
            height,
            frames: 0,
        })
    }

    /// Closes stdin and waits for ffmpeg to finish the file.
    fn finish(&mut self) -> Result<()> {
        let Some(stdin) = self.stdin.take() else {
            return Ok(());
        };
        drop(stdin);

        let status = self.child.wait().context("Failed to wait for ffmpeg")?;
        let last_error = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .flatten()
            .unwrap_or_default();

        if !status.success() {
            return Err(anyhow!("ffmpeg exited with {}: {}", status, last_error.trim()));
        }

        info!(
            "Recording finished: {} frames in {}",
            self.frames,
            self.output.display()
        );
        Ok(())
    }
}

impl VideoSink for FfmpegRecorder {
    fn append(&mut self, frame: &RgbaImage) -> Result<()> {
        check_frame_size(frame, self.width, self.height)?;

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("Recording already finished"))?;
        stdin
            .write_all(frame.as_raw())
            .context("Failed to write frame to ffmpeg")?;

        self.frames += 1;
        Ok(())
    }

    fn release(mut self: Box<Self>) -> Result<()> {
        self.finish()
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            if let Err(e) = self.finish() {
                warn!("Failed to finalize recording: {:#}", e);
            }
        }
    }
}
