//! Rhai-scripted operations
//!
//! Round logic written as a Rhai script instead of Rust. The script must
//! define `step()`, which is called once per round and decides by calling at
//! most one of the action functions below.
//!
//! # Script API
//!
//! ## Screen
//! - `probe(region)` - `"present"`, `"absent"` or `"uncertain"`
//! - `is_present(region)` - Shorthand for `probe(region) == "present"`
//! - `round()` - Zero-based round index
//!
//! ## Decisions (at most one per round)
//! - `click(region)` - Click the center of a region
//! - `key(code)` / `key(code, hold_ms)` - Press a key
//! - `succeed()` - Finish with SUCCESS
//! - `fail(reason)` - Finish with FAIL
//!
//! ## Variables
//! - `get_var(name)` - Get a stored variable (unit if unset)
//! - `set_var(name, value)` - Store a variable across rounds
//!
//! ## Optional Functions
//! - `init()` - Called once before the first round
//! - `on_action_failed(error)` - The previous round's action was rejected
//!
//! Only regions declared when the operation is built can be probed or
//! clicked; they are evaluated before `step()` runs.

use parking_lot::RwLock;
use rhai::{Dynamic, Engine as RhaiVM, Scope, AST};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::context::RoundContext;
use super::decision::Decision;
use super::OperationLogic;
use crate::input::{InputAction, InputError, Point};
use crate::regions::Recognition;
use crate::vision::MatchOutcome;
use crate::{AutomationError, Result};

/// What the script decided this round
enum ScriptDecision {
    Act(InputAction),
    Succeed,
    Fail(String),
}

/// Per-round view of a region, computed before the script runs
struct RegionView {
    outcome: Option<MatchOutcome>,
    center: Point,
}

/// Shared state between the script and Rust
#[derive(Default)]
struct SharedState {
    round: u32,
    regions: HashMap<String, RegionView>,
    variables: HashMap<String, Dynamic>,
    decision: Option<ScriptDecision>,
    error: Option<String>,
}

impl SharedState {
    fn decide(&mut self, decision: ScriptDecision) {
        if self.decision.is_some() {
            self.error
                .get_or_insert_with(|| "more than one decision in a single round".to_string());
            return;
        }
        self.decision = Some(decision);
    }

    fn view(&mut self, region: &str) -> Option<&RegionView> {
        if !self.regions.contains_key(region) {
            self.error
                .get_or_insert_with(|| format!("region '{}' was not declared", region));
            return None;
        }
        self.regions.get(region)
    }
}

/// Operation whose per-round decision is a Rhai `step()` function
pub struct ScriptedOperation {
    id: String,
    regions: Vec<String>,
    vm: RhaiVM,
    ast: AST,
    state: Arc<RwLock<SharedState>>,
    initialized: bool,
}

impl ScriptedOperation {
    /// Compile a script; `regions` are the regions it may probe or click
    pub fn new(
        id: impl Into<String>,
        source: &str,
        regions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let mut vm = RhaiVM::new();

        // Limit script capabilities for safety
        vm.set_max_expr_depths(64, 64);
        vm.set_max_call_levels(32);
        vm.set_max_operations(1_000_000);
        vm.set_max_string_size(10_000);
        vm.set_max_array_size(10_000);
        vm.set_max_map_size(1_000);

        let state = Arc::new(RwLock::new(SharedState::default()));

        Self::register_screen_functions(&mut vm, state.clone());
        Self::register_decision_functions(&mut vm, state.clone());
        Self::register_state_functions(&mut vm, state.clone());

        let ast = vm
            .compile(source)
            .map_err(|e| AutomationError::Script(format!("Compilation error: {}", e)))?;

        if !ast.iter_functions().any(|f| f.name == "step") {
            return Err(AutomationError::configuration(
                "script does not define step()",
            ));
        }

        Ok(Self {
            id: id.into(),
            regions: regions.into_iter().map(Into::into).collect(),
            vm,
            ast,
            state,
            initialized: false,
        })
    }

    /// Compile a script file
    pub fn from_file(
        id: impl Into<String>,
        path: impl AsRef<Path>,
        regions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        log::debug!("Loaded operation script from {}", path.display());
        Self::new(id, &source, regions)
    }

    fn register_screen_functions(vm: &mut RhaiVM, state: Arc<RwLock<SharedState>>) {
        // probe(region) -> "present" | "absent" | "uncertain"
        let s = state.clone();
        vm.register_fn("probe", move |region: &str| -> String {
            let mut guard = s.write();
            let view = guard.view(region).map(|v| v.outcome);
            if let Some(None) = view {
                guard
                    .error
                    .get_or_insert_with(|| format!("region '{}' declares nothing to match", region));
            }
            view.flatten()
                .unwrap_or(MatchOutcome::Absent)
                .as_str()
                .to_string()
        });

        // is_present(region) -> bool
        let s = state.clone();
        vm.register_fn("is_present", move |region: &str| -> bool {
            let mut guard = s.write();
            matches!(
                guard.view(region).and_then(|v| v.outcome),
                Some(MatchOutcome::Present)
            )
        });

        // round() -> i64
        let s = state.clone();
        vm.register_fn("round", move || -> i64 { s.read().round as i64 });
    }

    fn register_decision_functions(vm: &mut RhaiVM, state: Arc<RwLock<SharedState>>) {
        // click(region)
        let s = state.clone();
        vm.register_fn("click", move |region: &str| {
            let mut guard = s.write();
            let center = guard.view(region).map(|v| v.center);
            if let Some(center) = center {
                guard.decide(ScriptDecision::Act(InputAction::Click(center)));
            }
        });

        // key(code)
        let s = state.clone();
        vm.register_fn("key", move |code: &str| {
            s.write().decide(ScriptDecision::Act(InputAction::key(code)));
        });

        // key(code, hold_ms)
        let s = state.clone();
        vm.register_fn("key", move |code: &str, hold_ms: i64| {
            s.write().decide(ScriptDecision::Act(InputAction::Key {
                code: code.to_string(),
                hold_ms: hold_ms.max(0) as u64,
            }));
        });

        let s = state.clone();
        vm.register_fn("succeed", move || {
            s.write().decide(ScriptDecision::Succeed);
        });

        let s = state.clone();
        vm.register_fn("fail", move |reason: &str| {
            s.write().decide(ScriptDecision::Fail(reason.to_string()));
        });
    }

    fn register_state_functions(vm: &mut RhaiVM, state: Arc<RwLock<SharedState>>) {
        // get_var(name) -> Dynamic
        let s = state.clone();
        vm.register_fn("get_var", move |name: &str| -> Dynamic {
            s.read()
                .variables
                .get(name)
                .cloned()
                .unwrap_or(Dynamic::UNIT)
        });

        // set_var(name, value)
        let s = state.clone();
        vm.register_fn("set_var", move |name: &str, value: Dynamic| {
            s.write().variables.insert(name.to_string(), value);
        });

        vm.register_fn("log", |message: &str| {
            log::info!("[Rhai] {}", message);
        });

        vm.register_fn("log_debug", |message: &str| {
            log::debug!("[Rhai] {}", message);
        });
    }

    fn has_function(&self, fn_name: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == fn_name)
    }

    fn call(&self, fn_name: &str, args: impl rhai::FuncArgs) -> Result<()> {
        self.vm
            .call_fn::<Dynamic>(&mut Scope::new(), &self.ast, fn_name, args)
            .map(|_| ())
            .map_err(|e| AutomationError::Script(format!("{}: {}", fn_name, e)))
    }

    /// Evaluate every declared region against this round's frame
    fn load_round(&self, ctx: &RoundContext<'_>) -> Result<()> {
        let mut probed = Vec::new();
        let mut views = HashMap::new();
        for name in &self.regions {
            if matches!(ctx.region(name)?.recognition(), Recognition::None) {
                let center = ctx.region_center(name)?;
                views.insert(
                    name.clone(),
                    RegionView {
                        outcome: None,
                        center,
                    },
                );
            } else {
                probed.push(name.as_str());
            }
        }
        for probe in ctx.probe_many(&probed)? {
            let (x, y) = probe.live_rect.center();
            views.insert(
                probe.region,
                RegionView {
                    outcome: Some(probe.outcome),
                    center: Point::new(x, y),
                },
            );
        }

        let mut guard = self.state.write();
        guard.round = ctx.round();
        guard.regions = views;
        guard.decision = None;
        guard.error = None;
        Ok(())
    }

    fn take_error(&self) -> Result<()> {
        match self.state.write().error.take() {
            Some(message) => Err(AutomationError::Script(format!("{}: {}", self.id, message))),
            None => Ok(()),
        }
    }
}

impl OperationLogic for ScriptedOperation {
    fn id(&self) -> &str {
        &self.id
    }

    fn regions(&self) -> Vec<String> {
        self.regions.clone()
    }

    fn step(&mut self, ctx: &RoundContext<'_>) -> Result<Decision> {
        self.load_round(ctx)?;

        if !self.initialized {
            self.initialized = true;
            if self.has_function("init") {
                self.call("init", ())?;
                self.take_error()?;
                self.state.write().decision = None;
            }
        }

        let result = self.call("step", ());
        self.take_error()?;
        result?;

        let decision = self.state.write().decision.take();
        Ok(match decision {
            None => Decision::Continue,
            Some(ScriptDecision::Act(action)) => Decision::Act(action),
            Some(ScriptDecision::Succeed) => Decision::Succeed,
            Some(ScriptDecision::Fail(reason)) => Decision::Fail(reason),
        })
    }

    fn on_action_failed(&mut self, action: &InputAction, error: &InputError) {
        if !self.has_function("on_action_failed") {
            return;
        }
        let message = format!("{}: {}", action, error);
        if let Err(e) = self.call("on_action_failed", (message,)) {
            log::warn!("Operation '{}': {}", self.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::regions::{Region, RegionCatalog};
    use crate::vision::{Frame, ScreenMatcher};

    fn matcher() -> ScreenMatcher {
        let catalog = RegionCatalog::new(
            (100, 100),
            vec![
                Region::new("banner", [0, 0, 50, 20]).with_text("done"),
                Region::new("next", [60, 80, 100, 100]),
            ],
        )
        .unwrap();
        ScreenMatcher::new(Arc::new(catalog), &EngineConfig::default()).with_recognizer(
            Arc::new(|f: &Frame, _: &str| {
                if f.get_pixel(0, 0).map(|p| p[1]) == Some(255) {
                    "done".to_string()
                } else {
                    String::new()
                }
            }),
        )
    }

    fn step(
        op: &mut ScriptedOperation,
        m: &ScreenMatcher,
        done: bool,
        round: u32,
    ) -> Result<Decision> {
        let frame = Frame::solid(100, 100, [0, if done { 255 } else { 0 }, 0, 255]);
        let ctx = RoundContext::new(&frame, m, "en", round);
        op.step(&ctx)
    }

    const CLICK_UNTIL_DONE: &str = r#"
        fn init() {
            set_var("clicks", 0);
        }

        fn step() {
            if is_present("banner") {
                succeed();
            } else {
                set_var("clicks", get_var("clicks") + 1);
                click("next");
            }
        }
    "#;

    #[test]
    fn test_script_clicks_then_succeeds() {
        let m = matcher();
        let mut op =
            ScriptedOperation::new("scripted", CLICK_UNTIL_DONE, ["banner", "next"]).unwrap();

        match step(&mut op, &m, false, 0).unwrap() {
            Decision::Act(InputAction::Click(p)) => assert_eq!(p, Point::new(80, 90)),
            other => panic!("unexpected decision {:?}", other),
        }
        assert!(matches!(step(&mut op, &m, false, 1).unwrap(), Decision::Act(_)));
        assert!(matches!(step(&mut op, &m, true, 2).unwrap(), Decision::Succeed));

        let clicks = op.state.read().variables.get("clicks").cloned().unwrap();
        assert_eq!(clicks.as_int().unwrap(), 2);
    }

    #[test]
    fn test_two_decisions_in_one_round_is_error() {
        let m = matcher();
        let mut op = ScriptedOperation::new(
            "greedy",
            r#"fn step() { click("next"); key("esc"); }"#,
            ["next"],
        )
        .unwrap();
        assert!(matches!(step(&mut op, &m, false, 0), Err(AutomationError::Script(_))));
    }

    #[test]
    fn test_script_fail_and_round() {
        let m = matcher();
        let mut op = ScriptedOperation::new(
            "giveup",
            r#"fn step() { if round() >= 2 { fail("gave up"); } }"#,
            Vec::<String>::new(),
        )
        .unwrap();
        assert!(matches!(step(&mut op, &m, false, 0).unwrap(), Decision::Continue));
        match step(&mut op, &m, false, 2).unwrap() {
            Decision::Fail(reason) => assert_eq!(reason, "gave up"),
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_region_is_error() {
        let m = matcher();
        let mut op = ScriptedOperation::new(
            "sneaky",
            r#"fn step() { probe("banner"); }"#,
            Vec::<String>::new(),
        )
        .unwrap();
        assert!(step(&mut op, &m, false, 0).is_err());
    }

    #[test]
    fn test_missing_step_is_configuration_error() {
        let result = ScriptedOperation::new("empty", "fn init() {}", Vec::<String>::new());
        assert!(matches!(result, Err(AutomationError::Configuration(_))));
    }
}
