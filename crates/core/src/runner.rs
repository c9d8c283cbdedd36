use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::RunContext;
use crate::error::{ReplayError, Result};
use crate::logger::{self, Level};
use crate::lua_rt::ScriptHost;
use crate::matcher::Matcher;
use crate::pattern::PatternStore;
use crate::platform::Platform;
use crate::sequence::{StepSequence, Test};
use crate::settings::Settings;
use crate::step::{Step, StepEnv, StepOutcome};

/// Where a run is. `Aborted`, `Cancelled` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready(usize),
    Running(usize),
    Aborted(usize),
    /// Stopped on request before the step at this index
    Cancelled(usize),
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Aborted(_) | RunState::Cancelled(_) | RunState::Completed)
    }
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub index: usize,
    pub kind: &'static str,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// What a run left behind.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub context: RunContext,
    pub records: Vec<StepRecord>,
    pub jumps: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn failed_step(&self) -> Option<usize> {
        self.context.failed_step()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.records.iter().rev().find_map(|r| match &r.outcome {
            StepOutcome::Failed(reason) => Some(reason.as_str()),
            StepOutcome::Success => None,
        })
    }

    /// Turn an aborted run into `ReplayError::StepFailed`.
    pub fn into_result(self) -> Result<RunReport> {
        match self.failed_step() {
            Some(index) => Err(ReplayError::StepFailed {
                index,
                reason: self.failure_reason().unwrap_or("unknown").to_string(),
            }),
            None => Ok(self),
        }
    }
}

/// Executes a snapshot of a test's steps, one step per `step` call.
///
/// The runner owns a copy of the sequence taken at construction, so edits to
/// the test do not reach an active run. Structural problems are rejected by
/// `new`; after that the only way a run ends badly is a failing step.
pub struct Runner {
    steps: StepSequence,
    store: Arc<PatternStore>,
    labels: HashMap<String, usize>,
    matcher: Matcher,
    scripts: ScriptHost,
    delay_jitter: bool,
    jump_limit: Option<u64>,
    state: RunState,
    ctx: RunContext,
    records: Vec<StepRecord>,
    jumps: u64,
    started: Option<Instant>,
    elapsed: Duration,
}

impl Runner {
    pub fn new(test: &Test, settings: &Settings) -> Result<Self> {
        let labels = test.validate()?;
        let matcher = match settings.seed {
            Some(seed) => Matcher::with_seed(settings.sample_count, seed),
            None => Matcher::new(settings.sample_count),
        };
        let scripts = ScriptHost::new().map_err(|e| ReplayError::Script {
            name: test.name.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            steps: test.steps.clone(),
            store: Arc::clone(&test.store),
            labels,
            matcher,
            scripts,
            delay_jitter: settings.delay_jitter,
            jump_limit: settings.jump_limit,
            state: RunState::Ready(0),
            ctx: RunContext::default(),
            records: Vec::new(),
            jumps: 0,
            started: None,
            elapsed: Duration::ZERO,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Create a fresh run context at the live pointer position and move to
    /// the first step. No-op unless the runner is `Ready`.
    pub fn start(&mut self, platform: &mut dyn Platform) -> RunState {
        if !matches!(self.state, RunState::Ready(_)) {
            return self.state;
        }
        self.ctx = RunContext::new(platform.position());
        self.started = Some(Instant::now());
        logger::info_p("run", &format!("starting run of {} step(s)", self.steps.len()));
        if self.steps.is_empty() {
            self.finish(RunState::Completed);
        } else {
            self.state = RunState::Running(0);
        }
        self.state
    }

    /// Execute the current step and advance. No-op unless `Running`.
    pub fn step(&mut self, platform: &mut dyn Platform) -> RunState {
        let RunState::Running(i) = self.state else {
            return self.state;
        };
        let Some(step) = self.steps.get(i) else {
            self.finish(RunState::Completed);
            return self.state;
        };

        let t = Instant::now();
        let mut env = StepEnv {
            platform,
            store: &self.store,
            matcher: &self.matcher,
            scripts: &self.scripts,
            delay_jitter: self.delay_jitter,
            index: i,
        };
        let mut outcome = step.execute(&mut self.ctx, &mut env);

        let mut next = if !outcome.is_success() {
            RunState::Aborted(i)
        } else if let Step::Goto { label } = step {
            self.jumps += 1;
            match self.labels.get(label) {
                Some(&target) => RunState::Running(target),
                None => {
                    outcome = StepOutcome::Failed(ReplayError::UnresolvedLabel(label.clone()).to_string());
                    RunState::Aborted(i)
                }
            }
        } else if i + 1 < self.steps.len() {
            RunState::Running(i + 1)
        } else {
            RunState::Completed
        };

        if let Some(limit) = self.jump_limit {
            if self.jumps > limit && !next.is_terminal() {
                outcome = StepOutcome::Failed(format!("jump limit of {} exceeded", limit));
                next = RunState::Aborted(i);
            }
        }

        let elapsed = t.elapsed();
        match &outcome {
            StepOutcome::Success => logger::step(
                Level::Info,
                i,
                &format!("{} -> ok ({} ms)", step, elapsed.as_millis()),
            ),
            StepOutcome::Failed(reason) => {
                logger::step(Level::Warn, i, &format!("{} -> failed: {}", step, reason));
                self.ctx.mark_failed(i);
            }
        }

        self.records.push(StepRecord { index: i, kind: step.kind(), outcome, elapsed });
        if next.is_terminal() {
            self.finish(next);
        } else {
            self.state = next;
        }
        self.state
    }

    /// Stop before the next step boundary.
    pub fn cancel(&mut self) {
        if let RunState::Ready(i) | RunState::Running(i) = self.state {
            logger::info_p("run", &format!("cancelled before step {}", i));
            self.finish(RunState::Cancelled(i));
        }
    }

    /// Drive the run to a terminal state on the calling thread. `stop` is
    /// polled between steps.
    pub fn run(mut self, platform: &mut dyn Platform, stop: Option<&AtomicBool>) -> RunReport {
        self.start(platform);
        while !self.state.is_terminal() {
            if stop.is_some_and(|s| s.load(Ordering::Acquire)) {
                self.cancel();
                break;
            }
            self.step(platform);
        }
        self.report()
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> RunReport {
        let elapsed = match (self.state.is_terminal(), self.started) {
            (false, Some(started)) => started.elapsed(),
            _ => self.elapsed,
        };
        RunReport {
            state: self.state,
            context: self.ctx.clone(),
            records: self.records.clone(),
            jumps: self.jumps,
            elapsed,
        }
    }

    fn finish(&mut self, state: RunState) {
        self.state = state;
        self.elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        match state {
            RunState::Completed => logger::info_p(
                "run",
                &format!("run completed in {} ms", self.elapsed.as_millis()),
            ),
            RunState::Aborted(i) => logger::warn_p(
                "run",
                &format!("run aborted at step {} after {} ms", i, self.elapsed.as_millis()),
            ),
            _ => {}
        }
    }
}
