//! Demo driver: load a level and a program, run the pipeline, print the
//! verdict.
//!
//! Block programs are JSON documents (`*.json`); anything else is treated
//! as textual source for the remote execution service.

use std::path::Path;
use std::process;

use codequest::engine::{
    BlockNode, CapabilityRegistry, HttpExecutionClient, Level, LevelSession, NoopPacer, Pacer,
    RemoteExecConfig, RemoteExecutor, RunOutcome, RunReport, SleepPacer, PYTHON_LANGUAGE_ID,
};
use tracing_subscriber::EnvFilter;

fn usage() {
    println!("Usage: codequest_cli <level.json> <program.json|program.py> [--no-delay]");
    println!("       codequest_cli --probe");
    println!();
    println!("Block programs end in .json; any other program file is sent to the");
    println!("remote execution service configured via config.toml or environment");
    println!("(CODEQUEST_EXEC_BASE_URL, CODEQUEST_EXEC_TIMEOUT_MS, CODEQUEST_EXEC_BASE64).");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if matches!(args.get(1).map(|s| s.as_str()), Some("--help") | Some("-h") | None) {
        usage();
        return;
    }

    if args.get(1).map(|s| s.as_str()) == Some("--probe") {
        probe();
        return;
    }

    let Some(level_path) = args.get(1) else {
        usage();
        process::exit(1);
    };
    let Some(program_path) = args.get(2) else {
        usage();
        process::exit(1);
    };
    let no_delay = args.iter().any(|arg| arg == "--no-delay");

    let level = match Level::load_json(level_path) {
        Ok(level) => level,
        Err(err) => {
            eprintln!("failed to load level {level_path}: {err}");
            process::exit(1);
        }
    };

    let registry = CapabilityRegistry::standard();
    let mut session = match LevelSession::new(&registry, level) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("invalid level: {err}");
            process::exit(1);
        }
    };

    tracing::info!(
        level = session.level().id.as_str(),
        domain = session.level().domain.as_str(),
        "session started"
    );
    println!("level: {} ({})", session.level().name, session.level().id);
    println!("goal: {}", session.level().instructions);

    let mut sleep_pacer = SleepPacer;
    let mut noop_pacer = NoopPacer;
    let pacer: &mut dyn Pacer = if no_delay {
        &mut noop_pacer
    } else {
        &mut sleep_pacer
    };

    let report = if Path::new(program_path)
        .extension()
        .is_some_and(|ext| ext == "json")
    {
        run_blocks(&mut session, program_path, pacer)
    } else {
        run_source(&mut session, program_path, pacer)
    };

    print_report(&session, &report);
    if !report.outcome.is_passed() {
        process::exit(2);
    }
}

fn run_blocks(session: &mut LevelSession<'_>, path: &str, pacer: &mut dyn Pacer) -> RunReport {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("failed to read program {path}: {err}");
            process::exit(1);
        }
    };
    let program: BlockNode = match serde_json::from_str(&content) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("malformed block program {path}: {err}");
            process::exit(1);
        }
    };
    session.run_blocks(&program, pacer)
}

fn run_source(session: &mut LevelSession<'_>, path: &str, pacer: &mut dyn Pacer) -> RunReport {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("failed to read program {path}: {err}");
            process::exit(1);
        }
    };
    let remote = match build_remote() {
        Ok(remote) => remote,
        Err(message) => {
            eprintln!("{message}");
            process::exit(1);
        }
    };
    session.run_source(&source, PYTHON_LANGUAGE_ID, &remote, pacer)
}

fn build_remote() -> Result<RemoteExecutor<HttpExecutionClient>, String> {
    let config = RemoteExecConfig::from_default_sources()
        .map_err(|err| format!("remote execution is not configured: {err}"))?;
    let client = HttpExecutionClient::from_config(&config)
        .map_err(|err| format!("failed to build execution client: {err}"))?;
    Ok(RemoteExecutor::new(client))
}

fn probe() {
    match build_remote() {
        Ok(remote) => {
            if remote.probe() {
                println!("execution service: reachable");
            } else {
                println!("execution service: unreachable");
                process::exit(2);
            }
        }
        Err(message) => {
            eprintln!("{message}");
            process::exit(1);
        }
    }
}

fn print_report(session: &LevelSession<'_>, report: &RunReport) {
    println!(
        "run {}: {} action(s) applied in {} ms",
        report.epoch, report.metrics.applied_steps, report.metrics.duration_ms
    );
    match serde_json::to_string_pretty(session.world()) {
        Ok(world) => println!("world:\n{world}"),
        Err(err) => eprintln!("failed to render world: {err}"),
    }
    match &report.outcome {
        RunOutcome::Verdict(verdict) => match verdict {
            codequest::engine::Verdict::Passed { summary } => println!("verdict: passed - {summary}"),
            codequest::engine::Verdict::Failed { feedback } => {
                println!("verdict: failed - {feedback}")
            }
        },
        RunOutcome::Diagnostic(diagnostic) => println!("error: {diagnostic}"),
    }
}
