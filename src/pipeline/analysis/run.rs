use serde::Serialize;

use crate::models::{RunState, Stage};

/// Transient state of one pipeline invocation. The stage pointer only moves
/// forward, one stage at a time; on failure it freezes where it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRun {
    current_stage: Stage,
    state: RunState,
    failure_stage: Option<Stage>,
}

impl Default for AnalysisRun {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisRun {
    pub fn new() -> Self {
        Self {
            current_stage: Stage::Convert,
            state: RunState::Running,
            failure_stage: None,
        }
    }

    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    /// 0-based position of the current stage, for "step N of 4".
    pub fn stage_index(&self) -> usize {
        self.current_stage.index()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Set iff the run failed.
    pub fn failure_stage(&self) -> Option<Stage> {
        self.failure_stage
    }

    /// Move to the next stage. Returns the new stage, or `None` when the run
    /// is terminal or already at the last stage.
    pub fn advance(&mut self) -> Option<Stage> {
        if self.state != RunState::Running {
            return None;
        }
        let next = self.current_stage.next()?;
        self.current_stage = next;
        Some(next)
    }

    /// Only the last stage can complete a run.
    pub fn succeed(&mut self) -> bool {
        if self.state != RunState::Running || self.current_stage != Stage::Score {
            return false;
        }
        self.state = RunState::Succeeded;
        true
    }

    /// Freeze at the current stage. Returns the failing stage, or `None` if
    /// the run had already ended.
    pub fn fail(&mut self) -> Option<Stage> {
        if self.state != RunState::Running {
            return None;
        }
        self.state = RunState::Failed;
        self.failure_stage = Some(self.current_stage);
        self.failure_stage
    }

    pub fn event(&self) -> StageEvent {
        StageEvent {
            stage: self.current_stage,
            step: self.stage_index() + 1,
            total: Stage::COUNT,
            state: self.state,
        }
    }
}

/// Observer payload: where the run is and how it stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageEvent {
    pub stage: Stage,
    /// 1-based.
    pub step: usize,
    pub total: usize,
    pub state: RunState,
}

impl StageEvent {
    pub fn label(&self) -> String {
        format!("step {} of {}", self.step, self.total)
    }
}
