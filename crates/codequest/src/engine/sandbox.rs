//! Local execution back end.
//!
//! Runs a compiled block program in a restricted context: the program sees
//! only the injected trace recorder, never the live world or anything
//! ambient. Bounded by a hard step budget and an advisory wall-clock
//! timeout checked at call boundaries; a synchronous call cannot be
//! preempted mid-call.

use std::time::{Duration, Instant};

use super::blocks::CompiledProgram;
use super::capability::TraceRecorder;
use super::diagnostic::Diagnostic;
use super::types::{ProgramTrace, MAX_EXECUTION_STEPS};
use super::world::WorldState;

pub const DEFAULT_LOCAL_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_steps: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_LOCAL_TIMEOUT_MS),
            max_steps: MAX_EXECUTION_STEPS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    limits: ExecutionLimits,
}

impl LocalExecutor {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Execute a compiled program against a fresh recorder seeded with the
    /// level's starting world.
    ///
    /// On success the captured trace is returned. A rejected primitive call
    /// aborts with a runtime diagnostic that carries the trace captured up
    /// to the failure point. Exceeding the step budget or the wall-clock
    /// budget aborts with a timeout diagnostic and discards partial
    /// execution.
    pub fn execute(
        &self,
        program: &CompiledProgram,
        start: &WorldState,
    ) -> Result<ProgramTrace, Diagnostic> {
        let started_at = Instant::now();
        let mut recorder = TraceRecorder::new(start);
        let mut steps: u64 = 0;

        for call in &program.calls {
            steps += 1;
            if steps > self.limits.max_steps {
                return Err(Diagnostic::timeout(format!(
                    "execution exceeded the budget of {} steps",
                    self.limits.max_steps
                )));
            }
            if started_at.elapsed() > self.limits.timeout {
                return Err(Diagnostic::timeout(format!(
                    "execution exceeded the budget of {} ms",
                    self.limits.timeout.as_millis()
                )));
            }
            if let Err(err) = recorder.call(&call.primitive, &call.args) {
                tracing::debug!(
                    primitive = call.primitive.as_str(),
                    error = %err,
                    "primitive call rejected"
                );
                return Err(Diagnostic::runtime(err.to_string(), recorder.partial()));
            }
        }

        Ok(recorder.finish())
    }
}
