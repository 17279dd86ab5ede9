//! Composition of operations into trees

use std::collections::VecDeque;

use super::context::RoundContext;
use super::decision::{ChildOperation, Decision};
use super::state::OperationReport;
use super::OperationLogic;
use crate::Result;

/// Delegates to an ordered list of child steps, one after another
///
/// Succeeds once every step finished in a state the sequence accepts. A
/// required step that fails fails the sequence; an optional one is skipped.
pub struct Sequence {
    id: String,
    pending: VecDeque<ChildOperation>,
    finished: Vec<String>,
}

impl Sequence {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pending: VecDeque::new(),
            finished: Vec::new(),
        }
    }

    /// Append a step
    pub fn then(mut self, step: ChildOperation) -> Self {
        self.pending.push_back(step);
        self
    }

    pub fn push(&mut self, step: ChildOperation) {
        self.pending.push_back(step);
    }

    /// Ids of the steps that have finished so far
    pub fn finished(&self) -> &[String] {
        &self.finished
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl OperationLogic for Sequence {
    fn id(&self) -> &str {
        &self.id
    }

    fn regions(&self) -> Vec<String> {
        let mut regions: Vec<String> = self
            .pending
            .iter()
            .flat_map(|step| step.operation.regions())
            .collect();
        regions.sort();
        regions.dedup();
        regions
    }

    fn step(&mut self, _ctx: &RoundContext<'_>) -> Result<Decision> {
        match self.pending.pop_front() {
            Some(next) => Ok(Decision::Delegate(next)),
            None => Ok(Decision::Succeed),
        }
    }

    fn on_child_finished(&mut self, report: &OperationReport) {
        self.finished.push(report.id.clone());
    }
}
