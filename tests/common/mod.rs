//! Shared collaborators for the scenario tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nyacore_automation::input::{InputController, InputError, Point};
use nyacore_automation::regions::{Region, RegionCatalog};
use nyacore_automation::vision::{CaptureError, CaptureSource, Frame};

pub const OK_RED: u8 = 10;
pub const POPUP_RED: u8 = 20;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 1920x1080 catalog with a confirm button and a popup
pub fn catalog() -> RegionCatalog {
    RegionCatalog::new(
        (1920, 1080),
        vec![
            Region::new("confirm", [0, 0, 100, 100]).with_text("确定"),
            Region::new("popup", [0, 0, 100, 100]).with_text("公告"),
        ],
    )
    .unwrap()
}

/// Reads the label from the red channel of the first pixel
pub fn palette_ocr(image: &Frame, _locale: &str) -> String {
    match image.get_pixel(0, 0).map(|p| p[0]) {
        Some(OK_RED) => "确定".to_string(),
        Some(POPUP_RED) => "公告".to_string(),
        _ => String::new(),
    }
}

pub fn frame(red: u8) -> Frame {
    Frame::solid(960, 540, [red, 0, 0, 255])
}

/// Capture that plays a script of frames and failures, then repeats the last entry
pub struct ScriptedCapture {
    script: VecDeque<Option<u8>>,
    last: Option<u8>,
    captures: Arc<AtomicUsize>,
}

impl ScriptedCapture {
    /// `None` entries fail with "window not visible"
    pub fn new(script: Vec<Option<u8>>) -> Self {
        Self {
            script: script.into(),
            last: None,
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.captures.clone()
    }
}

impl CaptureSource for ScriptedCapture {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let next = match self.script.pop_front() {
            Some(entry) => {
                self.last = entry;
                entry
            }
            None => self.last,
        };
        next.map(frame)
            .ok_or_else(|| CaptureError::NotVisible("game".to_string()))
    }
}

/// Input that counts calls and can reject them all
#[derive(Default)]
pub struct CountingInput {
    pub calls: usize,
    pub reject: bool,
}

impl CountingInput {
    fn accept(&mut self) -> Result<(), InputError> {
        self.calls += 1;
        if self.reject {
            Err(InputError::NotAccepting("game".to_string()))
        } else {
            Ok(())
        }
    }
}

impl InputController for CountingInput {
    fn click(&mut self, _point: Point) -> Result<(), InputError> {
        self.accept()
    }

    fn key(&mut self, _code: &str, _hold_ms: u64) -> Result<(), InputError> {
        self.accept()
    }

    fn drag(&mut self, _from: Point, _to: Point) -> Result<(), InputError> {
        self.accept()
    }
}
