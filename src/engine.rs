//! Engine context
//!
//! The explicitly constructed object that owns the target's collaborators
//! (capture, input), the screen matcher and the configuration. It is built
//! once at startup, shared by reference, and shut down explicitly.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::input::InputController;
use crate::operation::{CancelToken, Operation, OperationDriver, OperationReport};
use crate::regions::RegionCatalog;
use crate::vision::{CaptureSource, ScreenMatcher, TemplateMatcher, TextRecognizer};
use crate::{AutomationError, Result};

/// Builder for [`EngineContext`]
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: RegionCatalog,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    templates: Option<Arc<dyn TemplateMatcher>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig, catalog: RegionCatalog) -> Self {
        Self {
            config,
            catalog,
            recognizer: None,
            templates: None,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateMatcher>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Validate everything and attach the target's collaborators
    ///
    /// All configuration errors surface here, never during a round.
    pub fn build(
        self,
        capture: Box<dyn CaptureSource>,
        input: Box<dyn InputController>,
    ) -> Result<EngineContext> {
        self.config.validate()?;

        let reference = (self.config.reference_width, self.config.reference_height);
        if self.catalog.reference_size() != reference {
            return Err(AutomationError::configuration(format!(
                "region catalog is declared for {}x{}, engine expects {}x{}",
                self.catalog.reference_size().0,
                self.catalog.reference_size().1,
                reference.0,
                reference.1
            )));
        }

        let mut matcher = ScreenMatcher::new(Arc::new(self.catalog), &self.config);
        if let Some(recognizer) = self.recognizer {
            matcher = matcher.with_recognizer(recognizer);
        }
        if let Some(templates) = self.templates {
            matcher = matcher.with_templates(templates);
        }
        matcher.validate()?;

        log::info!(
            "Engine ready: {} regions, locale '{}'",
            matcher.catalog().len(),
            self.config.locale
        );

        Ok(EngineContext {
            config: self.config,
            matcher,
            capture: Mutex::new(capture),
            input: Mutex::new(input),
            cancel: CancelToken::new(),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Shared engine state for one target
pub struct EngineContext {
    config: EngineConfig,
    matcher: ScreenMatcher,
    capture: Mutex<Box<dyn CaptureSource>>,
    input: Mutex<Box<dyn InputController>>,
    cancel: CancelToken,
    shut_down: AtomicBool,
}

impl EngineContext {
    pub fn builder(config: EngineConfig, catalog: RegionCatalog) -> EngineBuilder {
        EngineBuilder::new(config, catalog)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matcher(&self) -> &ScreenMatcher {
        &self.matcher
    }

    /// Run one operation tree against the target
    ///
    /// Only one tree drives the target at a time; a second concurrent call
    /// fails with [`AutomationError::AlreadyRunning`].
    pub fn run(&self, operation: &mut Operation) -> Result<OperationReport> {
        let mut capture = self
            .capture
            .try_lock()
            .ok_or(AutomationError::AlreadyRunning)?;
        let mut input = self
            .input
            .try_lock()
            .ok_or(AutomationError::AlreadyRunning)?;

        if !self.is_shut_down() {
            self.cancel.reset();
        }

        log::info!("Running operation '{}'", operation.id());
        let mut driver = OperationDriver::new(&mut **capture, &mut **input, &self.matcher)
            .with_locale(self.config.locale.clone())
            .with_cancel(self.cancel.clone());
        Ok(driver.run(operation))
    }

    /// Whether an operation currently holds the target
    pub fn is_busy(&self) -> bool {
        self.capture.is_locked()
    }

    /// Cancel the running operation at its next round boundary
    pub fn cancel(&self) {
        log::info!("Cancellation requested");
        self.cancel.cancel();
    }

    /// Cancel the running operation and refuse to start new ones
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        log::info!("Engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationConfig;
    use crate::input::DryRunInput;
    use crate::operation::{OperationState, WaitRegion};
    use crate::regions::Region;
    use crate::vision::{Frame, FrameSequenceCapture};

    fn catalog() -> RegionCatalog {
        RegionCatalog::new(
            (1920, 1080),
            vec![Region::new("title", [0, 0, 400, 100]).with_text("标题")],
        )
        .unwrap()
    }

    fn engine(frames: Vec<Frame>) -> EngineContext {
        EngineContext::builder(EngineConfig::default(), catalog())
            .with_recognizer(Arc::new(|_: &Frame, _: &str| "标题".to_string()))
            .build(
                Box::new(FrameSequenceCapture::from_frames(frames, true)),
                Box::new(DryRunInput::new()),
            )
            .unwrap()
    }

    #[test]
    fn test_build_requires_recognizer() {
        let result = EngineContext::builder(EngineConfig::default(), catalog()).build(
            Box::new(FrameSequenceCapture::from_frames(Vec::new(), false)),
            Box::new(DryRunInput::new()),
        );
        assert!(matches!(result, Err(AutomationError::Configuration(_))));
    }

    #[test]
    fn test_build_rejects_reference_mismatch() {
        let config = EngineConfig {
            reference_width: 1280,
            reference_height: 720,
            ..EngineConfig::default()
        };
        let result = EngineContext::builder(config, catalog())
            .with_recognizer(Arc::new(|_: &Frame, _: &str| String::new()))
            .build(
                Box::new(FrameSequenceCapture::from_frames(Vec::new(), false)),
                Box::new(DryRunInput::new()),
            );
        assert!(result.is_err());
    }

    #[test]
    fn test_run_operation() {
        let engine = engine(vec![Frame::solid(1280, 720, [0, 0, 0, 255])]);
        let mut op = Operation::new(
            Box::new(WaitRegion::new("title")),
            OperationConfig::default().without_pauses(),
        );
        let report = engine.run(&mut op).unwrap();
        assert_eq!(report.state, OperationState::Success);
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_shutdown_cancels_runs() {
        let engine = engine(vec![Frame::solid(1280, 720, [0, 0, 0, 255])]);
        engine.shutdown();
        let mut op = Operation::new(
            Box::new(WaitRegion::new("title")),
            OperationConfig::default().without_pauses(),
        );
        assert_eq!(engine.run(&mut op).unwrap().state, OperationState::Cancelled);
    }
}
