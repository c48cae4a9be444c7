//! Level session: load, compile, execute, replay, validate.
//!
//! One session owns one level and the live world the learner watches.
//! Every run (and every reset) bumps the session epoch; results that come
//! back for an older epoch are discarded, which is the whole cancellation
//! story for the remote back end.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::blocks::{compile_blocks, BlockNode};
use super::capability::CapabilityRegistry;
use super::diagnostic::{Diagnostic, DiagnosticKind};
use super::goal::{evaluate_goal, Verdict};
use super::level::{Level, LevelError, PartialReplay};
use super::remote::{ExecutionClient, RemoteExecutor};
use super::replay::{Pacer, ReplayScheduler};
use super::sandbox::LocalExecutor;
use super::types::{ActionLog, ProgramTrace, RunEpoch};
use super::world::WorldState;

pub const MAX_SESSION_LOG_ENTRIES: usize = 256;

// ============================================================================
// Run Reporting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunMetrics {
    pub trace_len: usize,
    pub applied_steps: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunOutcome {
    Verdict(Verdict),
    Diagnostic(Diagnostic),
}

impl RunOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, RunOutcome::Verdict(verdict) if verdict.is_passed())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub epoch: RunEpoch,
    pub outcome: RunOutcome,
    pub metrics: RunMetrics,
}

/// Ticket handed out when a run begins. Completing a run requires handing
/// the ticket back; a stale ticket means the session moved on and the
/// result is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    epoch: RunEpoch,
}

impl RunTicket {
    pub fn epoch(&self) -> RunEpoch {
        self.epoch
    }
}

// ============================================================================
// Session Log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLogKind {
    RunStarted,
    DiagnosticRaised,
    ReplaySettled,
    VerdictIssued,
    StaleResultDiscarded,
    SessionReset,
    LevelAdvanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub epoch: RunEpoch,
    pub kind: SessionLogKind,
    pub detail: String,
}

// ============================================================================
// Session
// ============================================================================

/// Orchestrates one learner's interaction with one level.
pub struct LevelSession<'r> {
    registry: &'r CapabilityRegistry,
    level: Level,
    local: LocalExecutor,
    epoch: RunEpoch,
    world: WorldState,
    log: ActionLog,
    session_log: Vec<SessionLogEntry>,
}

impl<'r> LevelSession<'r> {
    /// Validate the level against the registry and start a session on it.
    pub fn new(registry: &'r CapabilityRegistry, level: Level) -> Result<Self, LevelError> {
        level.validate(registry)?;
        let world = level.start_world.clone();
        Ok(Self {
            registry,
            level,
            local: LocalExecutor::default(),
            epoch: 0,
            world,
            log: ActionLog::new(),
            session_log: Vec::new(),
        })
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        self.registry
    }

    pub fn epoch(&self) -> RunEpoch {
        self.epoch
    }

    /// The live world as the learner currently sees it.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn action_log(&self) -> &ActionLog {
        &self.log
    }

    pub fn session_log(&self) -> &[SessionLogEntry] {
        &self.session_log
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Begin a run. Bumps the epoch, which invalidates any outstanding
    /// remote work from previous runs.
    pub fn begin_run(&mut self) -> RunTicket {
        self.epoch += 1;
        tracing::info!(epoch = self.epoch, level = self.level.id.as_str(), "run started");
        self.push_log(SessionLogKind::RunStarted, self.level.id.clone());
        RunTicket { epoch: self.epoch }
    }

    /// Run a block program through the local pipeline.
    pub fn run_blocks(&mut self, program: &BlockNode, pacer: &mut dyn Pacer) -> RunReport {
        let ticket = self.begin_run();
        let started_at = Instant::now();
        let result = compile_blocks(program, self.level.domain, self.registry)
            .and_then(|compiled| self.local.execute(&compiled, &self.level.start_world));
        self.complete_run(ticket, result, started_at, pacer)
    }

    /// Run learner source through the remote pipeline, blocking until the
    /// service answers or times out.
    pub fn run_source<C: ExecutionClient>(
        &mut self,
        source_code: &str,
        language_id: u32,
        remote: &RemoteExecutor<C>,
        pacer: &mut dyn Pacer,
    ) -> RunReport {
        let ticket = self.begin_run();
        let started_at = Instant::now();
        let result = remote.execute(source_code, language_id, &self.level.start_world);
        self.complete_run(ticket, result, started_at, pacer)
    }

    /// Deliver the result of an execution that was started with
    /// [`LevelSession::begin_run`] and finished elsewhere. Returns `None`
    /// when the session has moved on (new run or reset) since the ticket
    /// was issued; the result is discarded unreplayed.
    pub fn finish_run(
        &mut self,
        ticket: RunTicket,
        result: Result<ProgramTrace, Diagnostic>,
        pacer: &mut dyn Pacer,
    ) -> Option<RunReport> {
        if ticket.epoch != self.epoch {
            tracing::debug!(
                stale = ticket.epoch,
                current = self.epoch,
                "discarding stale run result"
            );
            self.push_log(
                SessionLogKind::StaleResultDiscarded,
                format!("epoch {} superseded by {}", ticket.epoch, self.epoch),
            );
            return None;
        }
        Some(self.complete_run(ticket, result, Instant::now(), pacer))
    }

    /// Restore the starting world. Bumps the epoch so in-flight work from
    /// the abandoned run cannot touch the session anymore.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.world = self.level.start_world.clone();
        self.log.clear();
        self.push_log(SessionLogKind::SessionReset, self.level.id.clone());
    }

    /// Move the session to the next level (after a pass, or on demand).
    pub fn advance(&mut self, next: Level) -> Result<(), LevelError> {
        next.validate(self.registry)?;
        self.epoch += 1;
        self.push_log(SessionLogKind::LevelAdvanced, next.id.clone());
        self.world = next.start_world.clone();
        self.log.clear();
        self.level = next;
        Ok(())
    }

    /// Judge the current world on demand, outside the run pipeline. Used
    /// by free-play levels where the learner asks for a check explicitly.
    pub fn check_goal(&self) -> Verdict {
        evaluate_goal(&self.level.goal, &self.world, &self.log)
    }

    // -------------------------------------------------------------------------
    // Pipeline internals
    // -------------------------------------------------------------------------

    fn complete_run(
        &mut self,
        ticket: RunTicket,
        result: Result<ProgramTrace, Diagnostic>,
        started_at: Instant,
        pacer: &mut dyn Pacer,
    ) -> RunReport {
        match result {
            Ok(trace) => self.replay_and_validate(ticket, trace, started_at, pacer),
            Err(diagnostic) => self.handle_diagnostic(ticket, diagnostic, started_at, pacer),
        }
    }

    fn replay_and_validate(
        &mut self,
        ticket: RunTicket,
        trace: ProgramTrace,
        started_at: Instant,
        pacer: &mut dyn Pacer,
    ) -> RunReport {
        let trace_len = trace.len();
        tracing::debug!(
            epoch = ticket.epoch,
            actions = trace_len,
            digest = trace.digest().as_str(),
            "replaying trace"
        );

        let mut scheduler = ReplayScheduler::new(&self.level, trace);
        scheduler.prime();
        let replay_result = scheduler.run_to_end(pacer);
        let applied = scheduler.applied_count();
        let (world, log) = scheduler.into_outcome();
        self.world = world;
        self.log = log;

        let metrics = RunMetrics {
            trace_len,
            applied_steps: applied,
            duration_ms: started_at.elapsed().as_millis() as u64,
        };

        match replay_result {
            Ok(()) => {
                self.push_log(SessionLogKind::ReplaySettled, format!("{applied} action(s)"));
                let verdict = evaluate_goal(&self.level.goal, &self.world, &self.log);
                tracing::info!(
                    epoch = ticket.epoch,
                    passed = verdict.is_passed(),
                    "verdict issued"
                );
                self.push_log(
                    SessionLogKind::VerdictIssued,
                    if verdict.is_passed() { "passed" } else { "failed" }.to_string(),
                );
                RunReport {
                    epoch: ticket.epoch,
                    outcome: RunOutcome::Verdict(verdict),
                    metrics,
                }
            }
            Err(diagnostic) => {
                // The reducer faulted mid-trace; the world keeps the
                // applied prefix. No verdict for a faulted run.
                tracing::warn!(epoch = ticket.epoch, error = %diagnostic, "replay faulted");
                self.push_log(SessionLogKind::DiagnosticRaised, diagnostic.to_string());
                RunReport {
                    epoch: ticket.epoch,
                    outcome: RunOutcome::Diagnostic(diagnostic),
                    metrics,
                }
            }
        }
    }

    fn handle_diagnostic(
        &mut self,
        ticket: RunTicket,
        diagnostic: Diagnostic,
        started_at: Instant,
        pacer: &mut dyn Pacer,
    ) -> RunReport {
        tracing::warn!(epoch = ticket.epoch, error = %diagnostic, "run failed");

        let mut applied = 0;
        let keep_partial = self.level.partial_replay == PartialReplay::Keep
            && diagnostic.kind == DiagnosticKind::RuntimeError
            && diagnostic.has_partial_trace();

        if keep_partial {
            // Animate what the program managed to do before it failed.
            let mut scheduler =
                ReplayScheduler::new(&self.level, diagnostic.partial_trace.clone());
            scheduler.prime();
            if scheduler.run_to_end(pacer).is_ok() {
                applied = scheduler.applied_count();
                let (world, log) = scheduler.into_outcome();
                self.world = world;
                self.log = log;
            }
        } else {
            self.world = self.level.start_world.clone();
            self.log.clear();
        }

        self.push_log(SessionLogKind::DiagnosticRaised, diagnostic.to_string());
        let metrics = RunMetrics {
            trace_len: diagnostic.partial_trace.len(),
            applied_steps: applied,
            duration_ms: started_at.elapsed().as_millis() as u64,
        };
        RunReport {
            epoch: ticket.epoch,
            outcome: RunOutcome::Diagnostic(diagnostic),
            metrics,
        }
    }

    fn push_log(&mut self, kind: SessionLogKind, detail: String) {
        if self.session_log.len() >= MAX_SESSION_LOG_ENTRIES {
            self.session_log.remove(0);
        }
        self.session_log.push(SessionLogEntry {
            epoch: self.epoch,
            kind,
            detail,
        });
    }
}
