//! Application registry for discovering and creating applications

use std::collections::HashMap;
use std::sync::Arc;

use super::Application;
use crate::config::OperationConfig;
use crate::engine::EngineContext;
use crate::operation::OperationLogic;
use crate::record::{RecordBook, ResetPolicy};
use crate::{AutomationError, Result};

/// Factory for one automatable task
pub trait ApplicationFactory: Send + Sync {
    /// Unique identifier, also the run-record task id
    fn app_id(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str {
        self.app_id()
    }

    /// Default reset rules; `[[applications]]` config entries override them
    fn reset_policy(&self) -> ResetPolicy {
        ResetPolicy::default()
    }

    /// Round tuning for the top-level operation
    fn operation_config(&self, defaults: &OperationConfig) -> OperationConfig {
        defaults.clone()
    }

    /// Create the top-level operation logic for one invocation
    fn build_operation(&self) -> Result<Box<dyn OperationLogic>>;
}

/// Process-wide task id -> factory mapping; filled at startup, read-only after
#[derive(Default)]
pub struct AppRegistry {
    factories: HashMap<String, Arc<dyn ApplicationFactory>>,
}

impl AppRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application factory; ids must be unique
    pub fn register(&mut self, factory: Arc<dyn ApplicationFactory>) -> Result<()> {
        let app_id = factory.app_id().to_string();
        if self.factories.contains_key(&app_id) {
            return Err(AutomationError::configuration(format!(
                "application '{}' registered twice",
                app_id
            )));
        }
        log::debug!("Registered application '{}'", app_id);
        self.factories.insert(app_id, factory);
        Ok(())
    }

    /// Check if an application is registered
    pub fn has_app(&self, app_id: &str) -> bool {
        self.factories.contains_key(app_id)
    }

    pub fn factory(&self, app_id: &str) -> Result<Arc<dyn ApplicationFactory>> {
        self.factories
            .get(app_id)
            .cloned()
            .ok_or_else(|| AutomationError::UnknownApplication(app_id.to_string()))
    }

    /// All registered ids, sorted
    pub fn app_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Bind an application to an account, applying configured overrides
    pub fn application(
        &self,
        app_id: &str,
        account: u32,
        engine: Arc<EngineContext>,
        book: Arc<RecordBook>,
    ) -> Result<Application> {
        let factory = self.factory(app_id)?;
        let config = engine.config();

        let mut policy = factory.reset_policy();
        policy.max_attempts = config.records.max_attempts;
        policy.in_progress_ttl_minutes = config.records.in_progress_ttl_minutes;

        let mut enabled = true;
        if let Some(settings) = config.application(app_id) {
            enabled = settings.enabled;
            if let Some(period) = settings.period {
                policy.period = period;
            }
            if let Some(offset) = settings.hour_offset {
                policy.hour_offset = offset;
            }
            if let Some(anchor) = settings.weekly_anchor {
                policy.weekly_anchor = anchor;
            }
        }
        policy.validate()?;

        let operation = factory.operation_config(&config.operation);
        operation.validate()?;

        Ok(Application::new(factory, account, engine, book)
            .with_policy(policy)
            .with_operation_config(operation)
            .enabled(enabled))
    }
}
