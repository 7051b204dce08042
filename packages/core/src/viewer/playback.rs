//! Frame playback.
//!
//! [`Playback`] is the cursor over a video's frames. [`PlaybackTimer`]
//! drives it on a tokio interval and pushes each new frame index down a
//! channel; the SSE endpoint turns that channel into an event stream.
//! Only one timer runs per viewer: starting a new one stops the old.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Delay between frames when the video has no usable fps.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(40);
/// Never tick faster than this, whatever the fps says.
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(10);
/// Used for the time readout when fps is unknown.
pub const FALLBACK_FPS: f64 = 30.0;

pub fn frame_interval(fps: Option<f64>) -> Duration {
    match fps {
        Some(fps) if fps > 0.0 && fps.is_finite() => {
            Duration::from_secs_f64(1.0 / fps).max(MIN_FRAME_INTERVAL)
        }
        _ => DEFAULT_FRAME_INTERVAL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    current: usize,
    total: usize,
    fps: Option<f64>,
}

impl Playback {
    pub fn new(total: usize, fps: Option<f64>) -> Self {
        Self {
            current: 0,
            total,
            fps,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Jump to `index`, clamped into the video.
    pub fn seek(&mut self, index: usize) -> usize {
        self.current = index.min(self.total.saturating_sub(1));
        self.current
    }

    /// Step forward, stopping at the last frame.
    pub fn next(&mut self) -> usize {
        self.seek(self.current + 1)
    }

    /// Step back, stopping at the first frame.
    pub fn prev(&mut self) -> usize {
        self.seek(self.current.saturating_sub(1))
    }

    /// Timer step: like `next`, but wraps back to the first frame.
    pub fn advance(&mut self) -> usize {
        self.current = if self.total == 0 {
            0
        } else {
            (self.current + 1) % self.total
        };
        self.current
    }

    /// Seconds into the video at the current frame.
    pub fn time_secs(&self) -> f64 {
        let fps = match self.fps {
            Some(fps) if fps > 0.0 => fps,
            _ => FALLBACK_FPS,
        };
        self.current as f64 / fps
    }
}

/// A running playback loop. Dropping it stops the loop.
pub struct PlaybackTimer {
    handle: JoinHandle<()>,
}

impl PlaybackTimer {
    /// Spawn the loop. Each tick advances `playback` and sends the new index;
    /// the loop ends when the receiver goes away.
    pub fn start(mut playback: Playback, period: Duration) -> (Self, mpsc::Receiver<usize>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let index = playback.advance();
                if tx.send(index).await.is_err() {
                    break;
                }
            }
        });
        (Self { handle }, rx)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PlaybackTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Active timers, one per viewer key.
#[derive(Default)]
pub struct PlaybackRegistry {
    timers: Mutex<HashMap<String, PlaybackTimer>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Viewer key: one playback per session and video.
    pub fn key(session: &str, video_id: i64) -> String {
        format!("{}:{}", session, video_id)
    }

    /// Start playback for `key`, replacing (and stopping) any earlier timer.
    pub fn start(&self, key: String, playback: Playback, period: Duration) -> mpsc::Receiver<usize> {
        let (timer, rx) = PlaybackTimer::start(playback, period);
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.retain(|_, timer| timer.is_running());
        if let Some(previous) = timers.insert(key, timer) {
            previous.stop();
        }
        rx
    }

    /// Stop playback for `key`. Returns whether a timer was running.
    pub fn stop(&self, key: &str) -> bool {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        match timers.remove(key) {
            Some(timer) => {
                let running = timer.is_running();
                timer.stop();
                running
            }
            None => false,
        }
    }

    pub fn active(&self) -> usize {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.values().filter(|timer| timer.is_running()).count()
    }
}
