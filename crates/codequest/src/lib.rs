pub mod engine;

pub use engine::{
    builtin_levels, compile_blocks, evaluate_goal, parse_action_events, Action, ActionKind,
    ActionLog, BlockNode, BlockValue, CapabilityRegistry, Diagnostic, DiagnosticKind, Domain,
    GoalSpec, HttpExecutionClient, Level, LevelError, LevelSession, LocalExecutor, NoopPacer,
    Pacer, ProgramTrace, RemoteExecConfig, RemoteExecutor, ReplayPhase, ReplayScheduler,
    RunOutcome, RunReport, SleepPacer, Verdict, WorldSnapshot, WorldState, PYTHON_LANGUAGE_ID,
};
