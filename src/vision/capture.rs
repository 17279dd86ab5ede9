//! Frames and the screen capture boundary

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::regions::Rect;

/// Failure to acquire a frame from the target
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("target window '{0}' is not visible")]
    NotVisible(String),
    #[error("target window '{0}' cannot be focused")]
    NotFocusable(String),
    #[error("capture took {0:?}, longer than the round timeout")]
    Timeout(Duration),
    #[error("frame source exhausted")]
    Exhausted,
    #[error("capture backend error: {0}")]
    Backend(String),
}

/// Source of screen frames (window capture, replay, ...)
pub trait CaptureSource: Send {
    /// Capture one frame; blocks until the frame is available
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Whether the source can currently deliver frames
    fn is_available(&self) -> bool {
        true
    }
}

/// A single RGBA screen capture
///
/// Owned by the round that captured it and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// RGBA pixel data, row-major
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Create a frame stamped with the current time
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    /// Frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self::new(width, height, data)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get a pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        if idx + 4 <= self.data.len() {
            Some([
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ])
        } else {
            None
        }
    }

    /// Paint a rectangle; used to compose synthetic frames
    pub fn fill_rect(&mut self, rect: Rect, rgba: [u8; 4]) {
        let x1 = rect.x1.min(self.width);
        let y1 = rect.y1.min(self.height);
        for y in rect.y0..y1 {
            for x in rect.x0..x1 {
                let idx = ((y * self.width + x) * 4) as usize;
                if idx + 4 <= self.data.len() {
                    self.data[idx..idx + 4].copy_from_slice(&rgba);
                }
            }
        }
    }

    /// Copy out a sub-image; the rectangle is clipped to the frame
    pub fn crop(&self, rect: Rect) -> Frame {
        let x0 = rect.x0.min(self.width);
        let y0 = rect.y0.min(self.height);
        let x1 = rect.x1.min(self.width).max(x0);
        let y1 = rect.y1.min(self.height).max(y0);
        let (w, h) = (x1 - x0, y1 - y0);

        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in y0..y1 {
            let start = ((y * self.width + x0) * 4) as usize;
            let end = start + (w * 4) as usize;
            if end <= self.data.len() {
                data.extend_from_slice(&self.data[start..end]);
            }
        }

        Frame {
            width: w,
            height: h,
            data,
            captured_at: self.captured_at,
        }
    }

    /// Dimensions and timestamp, kept for failure diagnosis after the frame is dropped
    pub fn summary(&self) -> FrameSummary {
        FrameSummary {
            width: self.width,
            height: self.height,
            captured_at: self.captured_at,
        }
    }

    #[cfg(feature = "vision")]
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// What is left of a frame once its round ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// Replays a fixed list of frames, for offline runs and tests
pub struct FrameSequenceCapture {
    frames: Vec<Frame>,
    position: usize,
    looping: bool,
}

impl FrameSequenceCapture {
    pub fn from_frames(frames: Vec<Frame>, looping: bool) -> Self {
        Self {
            frames,
            position: 0,
            looping,
        }
    }

    /// Load every PNG/JPEG in a directory, in file-name order
    #[cfg(feature = "vision")]
    pub fn from_directory(
        dir: impl AsRef<std::path::Path>,
        looping: bool,
    ) -> crate::Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let img = image::open(path)
                .map_err(|e| {
                    crate::AutomationError::configuration(format!(
                        "cannot read frame {}: {}",
                        path.display(),
                        e
                    ))
                })?
                .to_rgba8();
            let (w, h) = img.dimensions();
            frames.push(Frame::new(w, h, img.into_raw()));
        }

        log::info!("Loaded {} replay frames from {}", frames.len(), dir.display());
        Ok(Self::from_frames(frames, looping))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl CaptureSource for FrameSequenceCapture {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        if self.position >= self.frames.len() {
            if self.looping && !self.frames.is_empty() {
                self.position = 0;
            } else {
                return Err(CaptureError::Exhausted);
            }
        }
        let mut frame = self.frames[self.position].clone();
        frame.captured_at = Utc::now();
        self.position += 1;
        Ok(frame)
    }

    fn is_available(&self) -> bool {
        (self.looping && !self.frames.is_empty()) || self.position < self.frames.len()
    }
}
