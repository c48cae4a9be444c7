//! Replay scheduler: applies a trace to the live world in strict order,
//! pausing between actions so the UI can animate.
//!
//! State machine per run: `Idle -> Priming -> Stepping(i) -> Settled |
//! Cancelled`. The scheduler suspends only at action boundaries, through
//! the injected [`Pacer`], so the same core runs under tests without
//! wall-clock waits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::diagnostic::Diagnostic;
use super::level::Level;
use super::types::{Action, ActionLog, ProgramTrace};
use super::world::WorldState;

// ============================================================================
// Pacing
// ============================================================================

/// Source of the inter-action animation delay.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Real pacing: blocks the driving thread between actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// No pacing. Used for headless validation runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPacer;

impl Pacer for NoopPacer {
    fn pause(&mut self, _delay: Duration) {}
}

// ============================================================================
// Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ReplayPhase {
    Idle,
    Priming,
    Stepping { index: usize },
    Settled,
    Cancelled,
}

/// What one scheduler step did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayProgress {
    pub index: usize,
    pub applied: Action,
    pub phase: ReplayPhase,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Cooperative, single-threaded driver for one run.
///
/// The scheduler exclusively owns the world it mutates; the session copies
/// the world and log out once the run settles or is cancelled. Actions are
/// applied strictly in trace order and never concurrently, so observers see
/// a monotonically advancing state sequence within one run.
#[derive(Debug)]
pub struct ReplayScheduler {
    trace: ProgramTrace,
    start: WorldState,
    step_delay: Duration,
    phase: ReplayPhase,
    world: WorldState,
    log: ActionLog,
    applied: usize,
}

impl ReplayScheduler {
    pub fn new(level: &Level, trace: ProgramTrace) -> Self {
        let start = level.start_world.clone();
        Self {
            trace,
            world: start.clone(),
            start,
            step_delay: Duration::from_millis(level.step_delay_ms),
            phase: ReplayPhase::Idle,
            log: ActionLog::new(),
            applied: 0,
        }
    }

    pub fn phase(&self) -> ReplayPhase {
        self.phase
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn trace(&self) -> &ProgramTrace {
        &self.trace
    }

    /// Number of actions applied so far in this run.
    pub fn applied_count(&self) -> usize {
        self.applied
    }

    /// Reset the world to the level's starting configuration and clear the
    /// log. The next `step` applies `trace[0]`.
    pub fn prime(&mut self) {
        self.phase = ReplayPhase::Priming;
        self.world = self.start.clone();
        self.log.clear();
        self.applied = 0;
        self.phase = if self.trace.is_empty() {
            ReplayPhase::Settled
        } else {
            ReplayPhase::Stepping { index: 0 }
        };
    }

    /// Apply the next action, then pause for the level's pacing delay
    /// unless this was the final action.
    ///
    /// Outside `Stepping` this is a no-op. A reducer rejection cancels the
    /// run and surfaces as a runtime diagnostic; the world keeps every
    /// action applied before the faulty one.
    pub fn step(&mut self, pacer: &mut dyn Pacer) -> Result<Option<ReplayProgress>, Diagnostic> {
        let ReplayPhase::Stepping { index } = self.phase else {
            return Ok(None);
        };
        // prime() guarantees index < trace.len() in Stepping.
        let Some(action) = self.trace.get(index).cloned() else {
            self.phase = ReplayPhase::Settled;
            return Ok(None);
        };

        if let Err(err) = self.world.apply(&action) {
            tracing::warn!(index, error = %err, "replay halted by reducer");
            self.phase = ReplayPhase::Cancelled;
            return Err(Diagnostic::runtime(
                format!("replay step {index} failed: {err}"),
                ProgramTrace::new(self.trace.actions()[..index].to_vec()),
            ));
        }
        if self.world.is_goal_relevant(&action) {
            self.log.push(action.clone());
        }
        self.applied = index + 1;

        let next = index + 1;
        if next >= self.trace.len() {
            self.phase = ReplayPhase::Settled;
            tracing::debug!(actions = self.trace.len(), "replay settled");
        } else {
            pacer.pause(self.step_delay);
            // Cancellation during the pause is the caller's to deliver; a
            // cancelled scheduler ignores further step calls.
            if self.phase == (ReplayPhase::Stepping { index }) {
                self.phase = ReplayPhase::Stepping { index: next };
            }
        }

        Ok(Some(ReplayProgress {
            index,
            applied: action,
            phase: self.phase,
        }))
    }

    /// Drive the run to completion (or cancellation, or a reducer fault).
    pub fn run_to_end(&mut self, pacer: &mut dyn Pacer) -> Result<(), Diagnostic> {
        if self.phase == ReplayPhase::Idle {
            self.prime();
        }
        while matches!(self.phase, ReplayPhase::Stepping { .. }) {
            self.step(pacer)?;
        }
        Ok(())
    }

    /// Abandon the run at the current action boundary. No further actions
    /// are applied; the world stays exactly as the applied prefix left it.
    pub fn cancel(&mut self) {
        if matches!(self.phase, ReplayPhase::Stepping { .. }) {
            tracing::debug!(applied = self.applied, "replay cancelled");
            self.phase = ReplayPhase::Cancelled;
        }
    }

    /// Hand the final world and log to the caller.
    pub fn into_outcome(self) -> (WorldState, ActionLog) {
        (self.world, self.log)
    }
}
