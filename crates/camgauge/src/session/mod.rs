//! Camera sessions.
//!
//! A session moves its [`FrameSource`] onto one producer thread, processes
//! each frame inline and publishes a [`SessionUpdate`] into a
//! [`LatestSlot`]. Stopping sets an `AtomicBool` checked before every frame
//! and joins the thread; the source and all per-session state are dropped
//! when the loop returns. [`SessionRunner`] keeps at most one session alive.

mod capture;
mod measure;
mod preview;

pub use capture::CaptureTask;
pub use measure::{MeasureControl, MeasureTask};
pub use preview::PreviewTask;

use crate::config::{AppConfig, ConfigError};
use crate::detect::DetectError;
use crate::slot::LatestSlot;
use crate::source::{FrameSource, ImageSequenceSource, SourceError};
use camgauge_calib::{CalibrationResult, UndistortError};
use camgauge_core::{CameraError, CameraModel};
use camgauge_measure::MeasureError;
use image::RgbImage;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("failed to open frame source: {0}")]
    SourceOpen(#[source] SourceError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Undistort(#[from] UndistortError),
    #[error(transparent)]
    Measure(#[from] MeasureError),
    #[error("a session is already running")]
    Busy,
    #[error("no marker pose since the last committed point")]
    NoPose,
    #[error("session thread panicked")]
    Panicked,
}

/// What a session shows for one frame.
#[derive(Clone, Debug, Default)]
pub struct SessionUpdate {
    /// Annotated or corrected frame; `None` for status-only updates.
    pub frame: Option<RgbImage>,
    /// Status line, when the frame changes it.
    pub status: Option<String>,
    /// Zero-based index of the source frame.
    pub index: usize,
}

impl SessionUpdate {
    pub fn frame(index: usize, frame: RgbImage) -> Self {
        Self {
            frame: Some(frame),
            status: None,
            index,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Returned by a session when its loop ends.
#[derive(Clone, Debug, Default)]
pub struct SessionSummary {
    pub frames: usize,
    pub captured: usize,
    pub calibration: Option<CalibrationResult>,
}

/// Per-frame work of a session.
pub trait FrameTask: Send + 'static {
    /// Process frame `index`. Errors end the session.
    fn on_frame(&mut self, index: usize, frame: RgbImage) -> Result<SessionUpdate, SessionError>;

    /// Called once after the loop, whatever ended it.
    fn finish(self, frames: usize) -> SessionSummary;
}

fn run_loop<S, T>(
    mut source: S,
    mut task: T,
    stop: &AtomicBool,
    updates: &LatestSlot<SessionUpdate>,
) -> Result<SessionSummary, SessionError>
where
    S: FrameSource,
    T: FrameTask,
{
    let mut index = 0usize;
    let outcome = loop {
        if stop.load(Ordering::Acquire) {
            debug!("stop requested after {index} frames");
            break Ok(());
        }
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("source exhausted after {index} frames");
                break Ok(());
            }
            Err(err) => break Err(SessionError::from(err)),
        };
        match task.on_frame(index, frame) {
            Ok(update) => {
                updates.publish(update);
            }
            Err(err) => break Err(err),
        }
        index += 1;
    };
    drop(source);
    let summary = task.finish(index);
    match outcome {
        Ok(()) => Ok(summary),
        Err(err) => {
            warn!("session ended: {err}");
            updates.publish(SessionUpdate {
                frame: None,
                status: Some(format!("error: {err}")),
                index,
            });
            Err(err)
        }
    }
}

/// A running session.
///
/// Dropping the handle stops the session and waits for its thread.
pub struct SessionHandle {
    stop: Arc<AtomicBool>,
    updates: LatestSlot<SessionUpdate>,
    thread: Option<JoinHandle<Result<SessionSummary, SessionError>>>,
}

impl SessionHandle {
    /// Move `source` and `task` onto a new producer thread.
    pub fn spawn<S, T>(source: S, task: T) -> Self
    where
        S: FrameSource + 'static,
        T: FrameTask,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let updates = LatestSlot::new();
        let thread = std::thread::spawn({
            let stop = Arc::clone(&stop);
            let updates = updates.clone();
            move || run_loop(source, task, &stop, &updates)
        });
        Self {
            stop,
            updates,
            thread: Some(thread),
        }
    }

    /// Consumer side of the update slot.
    pub fn updates(&self) -> LatestSlot<SessionUpdate> {
        self.updates.clone()
    }

    /// Ask the loop to exit before its next frame.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the session to end on its own.
    pub fn join(mut self) -> Result<SessionSummary, SessionError> {
        self.wait()
    }

    /// Stop the session and wait for it.
    pub fn stop(mut self) -> Result<SessionSummary, SessionError> {
        self.request_stop();
        self.wait()
    }

    fn wait(&mut self) -> Result<SessionSummary, SessionError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| SessionError::Panicked)?,
            None => Ok(SessionSummary::default()),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.request_stop();
            let _ = self.wait();
        }
    }
}

/// Owns the one session allowed at a time.
#[derive(Default)]
pub struct SessionRunner {
    active: Option<SessionHandle>,
}

impl SessionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Updates of the active session.
    pub fn updates(&self) -> Option<LatestSlot<SessionUpdate>> {
        self.active.as_ref().map(SessionHandle::updates)
    }

    /// Start `task` on `source`, refusing while another session runs. The
    /// result of a session that already ended on its own is discarded.
    pub fn start<S, T>(&mut self, source: S, task: T) -> Result<LatestSlot<SessionUpdate>, SessionError>
    where
        S: FrameSource + 'static,
        T: FrameTask,
    {
        if self.is_running() {
            return Err(SessionError::Busy);
        }
        if let Some(done) = self.active.take() {
            if let Err(err) = done.join() {
                debug!("previous session had failed: {err}");
            }
        }
        let handle = SessionHandle::spawn(source, task);
        let updates = handle.updates();
        self.active = Some(handle);
        info!("session started");
        Ok(updates)
    }

    /// Capture calibration frames from `source`; see [`CaptureTask`].
    pub fn start_calibration<S>(&mut self, source: S, config: &AppConfig) -> Result<LatestSlot<SessionUpdate>, SessionError>
    where
        S: FrameSource + 'static,
    {
        config.validate()?;
        let task = CaptureTask::new(config.calibration.clone(), config.chessboard.clone())?;
        self.start(source, task)
    }

    /// Plain preview, undistorted when `camera` is given.
    pub fn start_preview<S>(&mut self, source: S, camera: Option<CameraModel>) -> Result<LatestSlot<SessionUpdate>, SessionError>
    where
        S: FrameSource + 'static,
    {
        self.start(source, PreviewTask::new(camera))
    }

    /// Track the configured marker and hand its pose to the returned
    /// [`MeasureControl`].
    pub fn start_measurement<S>(
        &mut self,
        source: S,
        config: &AppConfig,
        camera: CameraModel,
    ) -> Result<(LatestSlot<SessionUpdate>, MeasureControl), SessionError>
    where
        S: FrameSource + 'static,
    {
        if self.is_running() {
            return Err(SessionError::Busy);
        }
        config.validate()?;
        let (task, control) = MeasureTask::new(config, camera)?;
        let updates = self.start(source, task)?;
        Ok((updates, control))
    }

    /// Wait for the active session to end on its own.
    pub fn join(&mut self) -> Option<Result<SessionSummary, SessionError>> {
        Some(self.active.take()?.join())
    }

    /// Stop the active session, if any, and return how it ended.
    pub fn stop(&mut self) -> Option<Result<SessionSummary, SessionError>> {
        let handle = self.active.take()?;
        info!("stopping session");
        Some(handle.stop())
    }
}

/// Open a directory of images as a frame source.
pub fn open_image_sequence(dir: impl AsRef<Path>) -> Result<ImageSequenceSource, SessionError> {
    ImageSequenceSource::open(dir).map_err(SessionError::SourceOpen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use image::Rgb;
    use std::sync::atomic::AtomicUsize;

    /// Endless source that records being dropped.
    struct Endless {
        dropped: Arc<AtomicBool>,
    }

    impl FrameSource for Endless {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            Ok(Some(RgbImage::from_pixel(8, 6, Rgb([1, 2, 3]))))
        }
    }

    impl Drop for Endless {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    struct Count(Arc<AtomicUsize>);

    impl FrameTask for Count {
        fn on_frame(&mut self, index: usize, frame: RgbImage) -> Result<SessionUpdate, SessionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SessionUpdate::frame(index, frame))
        }

        fn finish(self, frames: usize) -> SessionSummary {
            SessionSummary {
                frames,
                ..Default::default()
            }
        }
    }

    #[test]
    fn stop_releases_the_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(AtomicUsize::new(0));
        let handle = SessionHandle::spawn(Endless { dropped: dropped.clone() }, Count(seen.clone()));
        while seen.load(Ordering::SeqCst) < 3 {
            std::thread::yield_now();
        }
        let summary = handle.stop().unwrap();
        assert!(dropped.load(Ordering::SeqCst));
        assert!(summary.frames >= 3);
    }

    #[test]
    fn finite_source_ends_the_session() {
        let frames = (0..5).map(|v| RgbImage::from_pixel(4, 4, Rgb([v; 3])));
        let seen = Arc::new(AtomicUsize::new(0));
        let handle = SessionHandle::spawn(VecSource::new(frames), Count(seen));
        let updates = handle.updates();
        let summary = handle.join().unwrap();
        assert_eq!(summary.frames, 5);
        let last = updates.take().unwrap();
        assert_eq!(last.index, 4);
        assert_eq!(last.frame.unwrap().get_pixel(0, 0)[0], 4);
    }

    #[test]
    fn runner_allows_one_session() {
        let mut runner = SessionRunner::new();
        let dropped = Arc::new(AtomicBool::new(false));
        runner
            .start(Endless { dropped: dropped.clone() }, Count(Arc::default()))
            .unwrap();
        let again = runner.start(VecSource::default(), Count(Arc::default()));
        assert!(matches!(again, Err(SessionError::Busy)));

        assert!(runner.stop().unwrap().is_ok());
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!runner.is_running());
        assert!(runner.start(VecSource::default(), Count(Arc::default())).is_ok());
        assert!(runner.stop().is_some());
        assert!(runner.stop().is_none());
    }

    struct Failing;

    impl FrameTask for Failing {
        fn on_frame(&mut self, _: usize, _: RgbImage) -> Result<SessionUpdate, SessionError> {
            Err(SessionError::NoPose)
        }

        fn finish(self, frames: usize) -> SessionSummary {
            SessionSummary {
                frames,
                ..Default::default()
            }
        }
    }

    #[test]
    fn task_error_is_published_and_returned() {
        let dropped = Arc::new(AtomicBool::new(false));
        let handle = SessionHandle::spawn(Endless { dropped: dropped.clone() }, Failing);
        let updates = handle.updates();
        assert!(matches!(handle.join(), Err(SessionError::NoPose)));
        assert!(dropped.load(Ordering::SeqCst));
        let last = updates.take().unwrap();
        assert!(last.frame.is_none());
        assert!(last.status.unwrap().starts_with("error:"));
    }
}
