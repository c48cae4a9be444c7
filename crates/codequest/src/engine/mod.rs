//! Action-trace execution and replay engine.
//!
//! A learner program (block tree or textual source) is compiled into a
//! deterministic, bounded sequence of world-mutating actions, replayed with
//! controlled pacing against the level's world, and judged against the
//! level goal. Submodules:
//! - `types`: ids, constants, shared value types, the action vocabulary
//! - `world`: per-domain world state and the pure action reducer
//! - `capability`: the primitive registry and the trace recorder
//! - `blocks`: block-tree front end
//! - `sandbox`: local execution back end
//! - `remote`: remote execution back end and action-event parsing
//! - `replay`: the cooperative replay scheduler
//! - `goal`: goal specs and validators
//! - `level`: level documents and the built-in catalog
//! - `session`: run lifecycle and epoch-guarded cancellation
//! - `persist`: world snapshots and JSON helpers

mod blocks;
mod capability;
mod diagnostic;
mod goal;
mod level;
mod persist;
mod remote;
mod replay;
mod sandbox;
mod session;
mod types;
mod world;

#[cfg(test)]
mod tests;

pub use blocks::{compile_blocks, BlockNode, BlockValue, CompiledProgram, PrimitiveCall};
pub use capability::{
    CallArg, Capability, CapabilityError, CapabilityRegistry, ParamKind, RecordError,
    TraceRecorder,
};
pub use diagnostic::{Diagnostic, DiagnosticKind, SourceLocation};
pub use goal::{evaluate_goal, goal_fits_domain, GoalSpec, SortOrder, Verdict};
pub use level::{builtin_levels, Difficulty, Level, LevelError, PartialReplay};
pub use persist::{PersistError, WorldSnapshot};
pub use remote::{
    parse_action_events, status_id, ExecClientError, ExecutionClient, HttpExecutionClient,
    RemoteExecConfig, RemoteExecConfigError, RemoteExecutor, SubmissionResponse, SubmissionStatus,
    ACTION_EVENT_PREFIX, DEFAULT_CONFIG_FILE_NAME, DEFAULT_EXEC_TIMEOUT_MS, ENV_EXEC_BASE64,
    ENV_EXEC_BASE_URL, ENV_EXEC_TIMEOUT_MS, PYTHON_LANGUAGE_ID,
};
pub use replay::{NoopPacer, Pacer, ReplayPhase, ReplayProgress, ReplayScheduler, SleepPacer};
pub use sandbox::{ExecutionLimits, LocalExecutor, DEFAULT_LOCAL_TIMEOUT_MS};
pub use session::{
    LevelSession, RunMetrics, RunOutcome, RunReport, RunTicket, SessionLogEntry, SessionLogKind,
    MAX_SESSION_LOG_ENTRIES,
};
pub use types::{
    Action, ActionKind, ActionLog, BlockPos, Color, Domain, GridPos, Heading, LevelId, Note,
    NoteEvent, Pixel, PlacedBlock, ProgramTrace, RunEpoch, Team, Unit, UnitId,
    DEFAULT_ATTACK_DAMAGE, DEFAULT_STEP_DELAY_MS, LEVEL_VERSION, MAX_EXECUTION_STEPS,
    MAX_REPEAT_COUNT, MAX_TRACE_ACTIONS, SNAPSHOT_VERSION,
};
pub use world::{WorldError, WorldState};
