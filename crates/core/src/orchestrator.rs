use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::context::RunContext;
use crate::logger;
use crate::platform::Platform;
use crate::runner::{RunReport, RunState, Runner};
use crate::sequence::{SequenceEdit, Test};
use crate::settings::Settings;
use crate::types::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Stopped,
    Running,
    Stopping,
}

/// Position of the active run, refreshed after every step.
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub state: RunState,
    pub context: RunContext,
    pub executed: usize,
}

/// What the worker publishes for other threads to read.
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub state: OrchestratorState,
    pub progress: Option<RunProgress>,
    pub last_report: Option<RunReport>,
    /// Why the last `Run` could not start
    pub error: Option<String>,
    pub pending_edits: usize,
    pub sequence_len: usize,
    pub runs: u64,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: OrchestratorState::Stopped,
            progress: None,
            last_report: None,
            error: None,
            pending_edits: 0,
            sequence_len: 0,
            runs: 0,
        }
    }
}

/// Run worker state. Owns the platform, so there is never more than one
/// run driving the screen and pointer.
struct Worker {
    test: Test,
    settings: Settings,
    status: Arc<Mutex<RunStatus>>,
    platform: Box<dyn Platform>,
    active: Option<Runner>,
    pending: Vec<SequenceEdit>,
}

impl Worker {
    /// Returns false on Quit.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Quit => {
                logger::info("shutting down");
                if let Some(runner) = self.active.as_mut() {
                    runner.cancel();
                }
                self.finish_run();
                return false;
            }
            Command::Run => {
                if self.active.is_some() {
                    logger::warn("run requested while another run is active, ignored");
                } else {
                    self.start_run();
                }
            }
            Command::Stop => {
                if self.active.is_some() {
                    self.set_state(OrchestratorState::Stopping);
                    if let Some(runner) = self.active.as_mut() {
                        runner.cancel();
                    }
                    self.finish_run();
                }
            }
            Command::Edit(edit) => {
                if self.active.is_some() {
                    logger::info(&format!("queued edit until run ends: {:?}", edit));
                    self.pending.push(edit);
                } else {
                    self.test.steps.apply(edit);
                }
                self.publish();
            }
        }
        true
    }

    fn start_run(&mut self) {
        match Runner::new(&self.test, &self.settings) {
            Ok(mut runner) => {
                logger::info(&format!("running test '{}'", self.test.name));
                runner.start(self.platform.as_mut());
                self.active = Some(runner);
                self.with_status(|s| {
                    s.state = OrchestratorState::Running;
                    s.error = None;
                    s.runs += 1;
                });
                if self.active.as_ref().is_some_and(|r| r.state().is_terminal()) {
                    self.finish_run();
                } else {
                    self.publish();
                }
            }
            Err(e) => {
                logger::error(&format!("cannot run '{}': {}", self.test.name, e));
                self.with_status(|s| s.error = Some(e.to_string()));
            }
        }
    }

    /// Execute one step of the active run.
    fn tick(&mut self) {
        let Some(runner) = self.active.as_mut() else { return };
        let state = runner.step(self.platform.as_mut());
        if state.is_terminal() {
            self.finish_run();
        } else {
            self.publish();
        }
    }

    /// Store the report and apply edits that waited for the run.
    fn finish_run(&mut self) {
        let report = self.active.take().map(|r| r.report());
        for edit in self.pending.drain(..) {
            self.test.steps.apply(edit);
        }
        let len = self.test.steps.len();
        self.with_status(|s| {
            if report.is_some() {
                s.last_report = report;
            }
            s.state = OrchestratorState::Stopped;
            s.progress = None;
            s.pending_edits = 0;
            s.sequence_len = len;
        });
    }

    fn publish(&self) {
        let progress = self.active.as_ref().map(|r| {
            let report = r.report();
            RunProgress { state: report.state, context: report.context, executed: report.records.len() }
        });
        let pending = self.pending.len();
        let len = self.test.steps.len();
        self.with_status(|s| {
            s.progress = progress;
            s.pending_edits = pending;
            s.sequence_len = len;
        });
    }

    fn set_state(&self, state: OrchestratorState) {
        self.with_status(|s| s.state = state);
    }

    fn with_status(&self, f: impl FnOnce(&mut RunStatus)) {
        if let Ok(mut s) = self.status.lock() {
            f(&mut s);
        }
    }
}

/// Main worker loop. Runs on a background thread; commands are drained
/// between steps so Stop and Quit take effect at the next step boundary.
pub fn orchestrate(
    test: Test,
    settings: Settings,
    status: Arc<Mutex<RunStatus>>,
    platform: Box<dyn Platform>,
    cmd_rx: mpsc::Receiver<Command>,
) {
    let mut worker = Worker { test, settings, status, platform, active: None, pending: Vec::new() };
    worker.publish();

    loop {
        // Stay responsive: drain commands before each step
        while let Ok(cmd) = cmd_rx.try_recv() {
            if !worker.handle(cmd) {
                return;
            }
        }

        if worker.active.is_some() {
            worker.tick();
            continue;
        }

        match cmd_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(cmd) => {
                if !worker.handle(cmd) {
                    return;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                logger::info("command channel closed, worker exiting");
                return;
            }
        }
    }
}

/// Handle to a worker thread started by `spawn`.
pub struct WorkerHandle {
    pub commands: mpsc::Sender<Command>,
    pub status: Arc<Mutex<RunStatus>>,
    pub thread: JoinHandle<()>,
}

/// Start the worker on its own thread.
pub fn spawn(test: Test, settings: Settings, platform: Box<dyn Platform>) -> WorkerHandle {
    let (tx, rx) = mpsc::channel();
    let status = Arc::new(Mutex::new(RunStatus::default()));
    let worker_status = Arc::clone(&status);
    let thread = thread::spawn(move || {
        orchestrate(test, settings, worker_status, platform, rx);
    });
    WorkerHandle { commands: tx, status, thread }
}
