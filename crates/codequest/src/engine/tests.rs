//! Tests for the engine module.

use super::*;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

fn registry() -> CapabilityRegistry {
    CapabilityRegistry::standard()
}

fn maze_world(grid_size: i32, x: i32, y: i32) -> WorldState {
    WorldState::Maze {
        grid_size,
        pos: GridPos::new(x, y),
        heading: Heading::East,
        stars: BTreeSet::new(),
        collected: 0,
        visited: vec![GridPos::new(x, y)],
    }
}

fn maze_level(grid_size: i32, x: i32, y: i32, goal: GoalSpec) -> Level {
    Level {
        version: LEVEL_VERSION,
        id: "test-maze".to_string(),
        name: "Test Maze".to_string(),
        domain: Domain::Maze,
        difficulty: Difficulty::Starter,
        instructions: String::new(),
        hints: Vec::new(),
        start_world: maze_world(grid_size, x, y),
        allowed_capabilities: vec![
            "move".to_string(),
            "turn".to_string(),
            "collect_star".to_string(),
        ],
        goal,
        step_delay_ms: 10,
        partial_replay: PartialReplay::Keep,
    }
}

fn potions_level(potions: Vec<i64>, max_swaps: u32) -> Level {
    Level {
        version: LEVEL_VERSION,
        id: "test-potions".to_string(),
        name: "Test Potions".to_string(),
        domain: Domain::Potions,
        difficulty: Difficulty::Easy,
        instructions: String::new(),
        hints: Vec::new(),
        start_world: WorldState::Potions {
            potions,
            swaps_used: 0,
        },
        allowed_capabilities: vec!["swap".to_string()],
        goal: GoalSpec::SortedWithBudget {
            order: SortOrder::Ascending,
            max_swaps,
        },
        step_delay_ms: 10,
        partial_replay: PartialReplay::Discard,
    }
}

fn combat_level() -> Level {
    Level {
        version: LEVEL_VERSION,
        id: "test-combat".to_string(),
        name: "Test Combat".to_string(),
        domain: Domain::Combat,
        difficulty: Difficulty::Medium,
        instructions: String::new(),
        hints: Vec::new(),
        start_world: WorldState::Combat {
            units: BTreeMap::from([
                ("boss".to_string(), Unit::enemy(30)),
                ("grunt".to_string(), Unit::enemy(10)),
            ]),
            attacks: Vec::new(),
            last_target: None,
        },
        allowed_capabilities: vec!["attack".to_string()],
        goal: GoalSpec::TargetSelection {
            target_id: "boss".to_string(),
        },
        step_delay_ms: 10,
        partial_replay: PartialReplay::Keep,
    }
}

fn music_level(notes: Vec<Note>) -> Level {
    Level {
        version: LEVEL_VERSION,
        id: "test-music".to_string(),
        name: "Test Music".to_string(),
        domain: Domain::Music,
        difficulty: Difficulty::Starter,
        instructions: String::new(),
        hints: Vec::new(),
        start_world: WorldState::Music { notes: Vec::new() },
        allowed_capabilities: vec!["play_note".to_string(), "rest".to_string()],
        goal: GoalSpec::Notes { notes },
        step_delay_ms: 10,
        partial_replay: PartialReplay::Keep,
    }
}

fn moves(n: usize) -> ProgramTrace {
    ProgramTrace::new(vec![Action::Move { dx: 1, dy: 0 }; n])
}

/// Pacer that records every requested pause instead of sleeping.
#[derive(Default)]
struct RecordingPacer {
    pauses: Vec<Duration>,
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, delay: Duration) {
        self.pauses.push(delay);
    }
}

/// Scripted execution client: returns a canned response or error and
/// counts how often it was consulted.
struct FakeExecutionClient {
    response: Result<SubmissionResponse, ExecClientError>,
    submissions: Cell<usize>,
}

impl FakeExecutionClient {
    fn accepted(stdout: &str) -> Self {
        Self::with_status(status_id::ACCEPTED, "Accepted", Some(stdout), None)
    }

    fn with_status(id: u32, description: &str, stdout: Option<&str>, stderr: Option<&str>) -> Self {
        Self {
            response: Ok(SubmissionResponse {
                stdout: stdout.map(str::to_string),
                stderr: stderr.map(str::to_string),
                status: SubmissionStatus {
                    id,
                    description: description.to_string(),
                },
                time: None,
                memory: None,
                exit_code: Some(if id == status_id::ACCEPTED { 0 } else { 1 }),
            }),
            submissions: Cell::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            response: Err(ExecClientError::Http {
                message: "connection refused".to_string(),
            }),
            submissions: Cell::new(0),
        }
    }
}

impl ExecutionClient for FakeExecutionClient {
    fn submit(
        &self,
        _source_code: &str,
        _language_id: u32,
    ) -> Result<SubmissionResponse, ExecClientError> {
        self.submissions.set(self.submissions.get() + 1);
        self.response.clone()
    }

    fn about(&self) -> Result<(), ExecClientError> {
        self.response.as_ref().map(|_| ()).map_err(Clone::clone)
    }
}

// ============================================================================
// World reducer
// ============================================================================

#[test]
fn maze_move_clamps_at_every_edge() {
    for (start, step) in [
        ((0, 2), (-1, 0)),
        ((4, 2), (1, 0)),
        ((2, 0), (0, -1)),
        ((2, 4), (0, 1)),
    ] {
        let mut world = maze_world(5, start.0, start.1);
        world
            .apply(&Action::Move {
                dx: step.0,
                dy: step.1,
            })
            .unwrap();
        match world {
            WorldState::Maze { pos, .. } => {
                assert_eq!(pos, GridPos::new(start.0, start.1), "edge {start:?}")
            }
            _ => unreachable!(),
        }
    }
}

#[test]
fn maze_clamped_move_does_not_extend_visited() {
    let mut world = maze_world(5, 0, 0);
    world.apply(&Action::Move { dx: -1, dy: 0 }).unwrap();
    match &world {
        WorldState::Maze { visited, .. } => assert_eq!(visited.len(), 1),
        _ => unreachable!(),
    }
}

#[test]
fn maze_collects_star_only_on_its_cell() {
    let mut world = WorldState::Maze {
        grid_size: 5,
        pos: GridPos::new(0, 0),
        heading: Heading::East,
        stars: BTreeSet::from([GridPos::new(1, 0)]),
        collected: 0,
        visited: vec![GridPos::new(0, 0)],
    };
    world.apply(&Action::CollectStar).unwrap();
    world.apply(&Action::Move { dx: 1, dy: 0 }).unwrap();
    world.apply(&Action::CollectStar).unwrap();
    match world {
        WorldState::Maze {
            collected, stars, ..
        } => {
            assert_eq!(collected, 1);
            assert!(stars.is_empty());
        }
        _ => unreachable!(),
    }
}

#[test]
fn heading_rotation_wraps_both_ways() {
    assert_eq!(Heading::North.rotated(1), Heading::East);
    assert_eq!(Heading::North.rotated(-1), Heading::West);
    assert_eq!(Heading::West.rotated(2), Heading::East);
    assert_eq!(Heading::South.rotated(-3), Heading::West);
}

#[test]
fn potions_swaps_preserve_the_multiset() {
    let initial = vec![5, 3, 8, 1, 9];
    let mut world = WorldState::Potions {
        potions: initial.clone(),
        swaps_used: 0,
    };
    for (i, j) in [(0, 4), (1, 2), (3, 3), (2, 0), (4, 1)] {
        world.apply(&Action::Swap { i, j }).unwrap();
    }
    match world {
        WorldState::Potions {
            potions,
            swaps_used,
        } => {
            let mut sorted = potions.clone();
            sorted.sort_unstable();
            let mut expected = initial;
            expected.sort_unstable();
            assert_eq!(sorted, expected);
            assert_eq!(swaps_used, 5);
        }
        _ => unreachable!(),
    }
}

#[test]
fn potions_swap_out_of_range_is_an_error() {
    let mut world = WorldState::Potions {
        potions: vec![1, 2, 3],
        swaps_used: 0,
    };
    let err = world.apply(&Action::Swap { i: 0, j: 3 }).unwrap_err();
    assert!(matches!(err, WorldError::SwapOutOfRange { index: 3, len: 3 }));
}

#[test]
fn combat_hp_clamps_at_zero() {
    let mut world = WorldState::Combat {
        units: BTreeMap::from([("grunt".to_string(), Unit::enemy(15))]),
        attacks: Vec::new(),
        last_target: None,
    };
    let attack = Action::Attack {
        target_id: "grunt".to_string(),
    };
    world.apply(&attack).unwrap();
    world.apply(&attack).unwrap();
    world.apply(&attack).unwrap();
    match world {
        WorldState::Combat { units, attacks, .. } => {
            assert_eq!(units["grunt"].hp, 0);
            assert!(units["grunt"].is_down());
            assert_eq!(attacks.len(), 3);
        }
        _ => unreachable!(),
    }
}

#[test]
fn combat_unknown_unit_is_an_error() {
    let mut world = WorldState::Combat {
        units: BTreeMap::new(),
        attacks: Vec::new(),
        last_target: None,
    };
    let err = world
        .apply(&Action::Attack {
            target_id: "ghost".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, WorldError::UnknownUnit { .. }));
}

#[test]
fn builder_never_duplicates_a_coordinate() {
    let mut world = WorldState::Builder {
        blocks: Vec::new(),
        cursor: BlockPos::new(0, 0, 0),
        color: Color::Blue,
    };
    let pos = BlockPos::new(1, 2, 0);
    world
        .apply(&Action::PlaceBlock {
            pos,
            color: Color::Red,
        })
        .unwrap();
    world
        .apply(&Action::PlaceBlock {
            pos,
            color: Color::Green,
        })
        .unwrap();
    match &world {
        WorldState::Builder { blocks, .. } => {
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].color, Color::Green);
        }
        _ => unreachable!(),
    }
    world.apply(&Action::RemoveBlock { pos }).unwrap();
    match world {
        WorldState::Builder { blocks, .. } => assert!(blocks.is_empty()),
        _ => unreachable!(),
    }
}

#[test]
fn canvas_rejects_out_of_range_pixels() {
    let mut world = WorldState::Canvas {
        width: 4,
        height: 4,
        pixels: Vec::new(),
    };
    let err = world
        .apply(&Action::DrawPixel {
            x: 4,
            y: 0,
            color: Color::Red,
        })
        .unwrap_err();
    assert!(matches!(err, WorldError::PixelOutOfRange { .. }));
}

#[test]
fn wrong_domain_action_is_rejected() {
    let mut world = maze_world(5, 0, 0);
    let err = world.apply(&Action::Jump).unwrap_err();
    assert!(matches!(err, WorldError::DomainMismatch { .. }));
}

// ============================================================================
// Trace recorder
// ============================================================================

#[test]
fn recorder_rejects_invalid_arguments() {
    let maze = maze_world(5, 0, 0);
    let mut recorder = TraceRecorder::new(&maze);
    assert!(matches!(
        recorder.record_move(2, 0),
        Err(RecordError::MoveStepOutOfRange { .. })
    ));
    assert!(matches!(
        recorder.record_move(0, 0),
        Err(RecordError::MoveStepOutOfRange { .. })
    ));

    let potions = WorldState::Potions {
        potions: vec![1, 2],
        swaps_used: 0,
    };
    let mut recorder = TraceRecorder::new(&potions);
    assert!(matches!(
        recorder.record_swap(0, 2),
        Err(RecordError::SwapIndexOutOfRange { .. })
    ));

    let music = WorldState::Music { notes: Vec::new() };
    let mut recorder = TraceRecorder::new(&music);
    assert!(matches!(
        recorder.record_rest(0),
        Err(RecordError::BeatsOutOfRange { .. })
    ));

    let canvas = WorldState::Canvas {
        width: 2,
        height: 2,
        pixels: Vec::new(),
    };
    let mut recorder = TraceRecorder::new(&canvas);
    assert!(matches!(
        recorder.record_draw_pixel(2, 0, Color::Red),
        Err(RecordError::PixelOutOfBounds { .. })
    ));
}

#[test]
fn recorder_call_coerces_and_validates() {
    let music = WorldState::Music { notes: Vec::new() };
    let mut recorder = TraceRecorder::new(&music);
    recorder
        .call("play_note", &[CallArg::Text("C4".to_string())])
        .unwrap();
    let err = recorder
        .call("play_note", &[CallArg::Text("H9".to_string())])
        .unwrap_err();
    assert!(matches!(err, RecordError::UnknownNote { .. }));
    let err = recorder.call("warp", &[]).unwrap_err();
    assert!(matches!(err, RecordError::UnknownPrimitive { .. }));

    let trace = recorder.finish();
    assert_eq!(trace.actions(), &[Action::PlayNote { note: Note::C4 }]);
}

#[test]
fn recorder_enforces_the_trace_budget() {
    let sprite = WorldState::Sprite {
        x: 0,
        y: 0,
        scale_percent: 100,
        rotation_degrees: 0,
        speech: Vec::new(),
        jumps: 0,
    };
    let mut recorder = TraceRecorder::new(&sprite);
    for _ in 0..MAX_TRACE_ACTIONS {
        recorder.record_jump().unwrap();
    }
    assert!(matches!(
        recorder.record_jump(),
        Err(RecordError::TraceBudgetExceeded { .. })
    ));
}

// ============================================================================
// Block compiler
// ============================================================================

#[test]
fn blocks_expand_repeat_in_order() {
    let program = BlockNode::Sequence {
        body: vec![
            BlockNode::Repeat {
                count: 3,
                body: vec![BlockNode::Call {
                    primitive: "move".to_string(),
                    args: vec![BlockValue::Int(1), BlockValue::Int(0)],
                }],
            },
            BlockNode::Call {
                primitive: "turn".to_string(),
                args: vec![BlockValue::Int(1)],
            },
        ],
    };
    let compiled = compile_blocks(&program, Domain::Maze, &registry()).unwrap();
    assert_eq!(compiled.len(), 4);
    assert_eq!(compiled.calls[0].primitive, "move");
    assert_eq!(compiled.calls[3].primitive, "turn");
}

#[test]
fn blocks_reject_unknown_primitive_with_path() {
    let program = BlockNode::Sequence {
        body: vec![BlockNode::Call {
            primitive: "teleport".to_string(),
            args: Vec::new(),
        }],
    };
    let err = compile_blocks(&program, Domain::Maze, &registry()).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::CompileError);
    assert!(err.message.contains("teleport"));
    assert!(err.message.contains("root.0"));
}

#[test]
fn blocks_reject_bad_arity_and_kind() {
    let bad_arity = BlockNode::Call {
        primitive: "move".to_string(),
        args: vec![BlockValue::Int(1)],
    };
    let err = compile_blocks(&bad_arity, Domain::Maze, &registry()).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::CompileError);

    let bad_kind = BlockNode::Call {
        primitive: "move".to_string(),
        args: vec![BlockValue::Text("one".to_string()), BlockValue::Int(0)],
    };
    let err = compile_blocks(&bad_kind, Domain::Maze, &registry()).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::CompileError);
}

#[test]
fn blocks_reject_zero_and_oversized_repeat() {
    let body = vec![BlockNode::Call {
        primitive: "jump".to_string(),
        args: Vec::new(),
    }];
    let zero = BlockNode::Repeat {
        count: 0,
        body: body.clone(),
    };
    assert!(compile_blocks(&zero, Domain::Sprite, &registry()).is_err());
    let oversized = BlockNode::Repeat {
        count: MAX_REPEAT_COUNT + 1,
        body,
    };
    assert!(compile_blocks(&oversized, Domain::Sprite, &registry()).is_err());
}

#[test]
fn blocks_reject_expansion_past_the_action_budget() {
    // 1000 * 1000 nested repeats would expand to one million calls.
    let program = BlockNode::Repeat {
        count: MAX_REPEAT_COUNT,
        body: vec![BlockNode::Repeat {
            count: MAX_REPEAT_COUNT,
            body: vec![BlockNode::Call {
                primitive: "jump".to_string(),
                args: Vec::new(),
            }],
        }],
    };
    let err = compile_blocks(&program, Domain::Sprite, &registry()).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::CompileError);
    assert!(err.message.contains("expands past"));
}

#[test]
fn block_tree_round_trips_through_json() {
    let program = BlockNode::Repeat {
        count: 2,
        body: vec![BlockNode::Call {
            primitive: "say".to_string(),
            args: vec![BlockValue::Text("hi".to_string())],
        }],
    };
    let encoded = serde_json::to_string(&program).unwrap();
    let decoded: BlockNode = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, program);
}

// ============================================================================
// Local executor
// ============================================================================

#[test]
fn local_executor_captures_calls_in_order() {
    let program = BlockNode::Sequence {
        body: vec![
            BlockNode::Call {
                primitive: "play_note".to_string(),
                args: vec![BlockValue::Text("C4".to_string())],
            },
            BlockNode::Call {
                primitive: "rest".to_string(),
                args: vec![BlockValue::Int(2)],
            },
            BlockNode::Call {
                primitive: "play_note".to_string(),
                args: vec![BlockValue::Text("D4".to_string())],
            },
        ],
    };
    let compiled = compile_blocks(&program, Domain::Music, &registry()).unwrap();
    let trace = LocalExecutor::default()
        .execute(&compiled, &WorldState::Music { notes: Vec::new() })
        .unwrap();
    assert_eq!(
        trace.actions(),
        &[
            Action::PlayNote { note: Note::C4 },
            Action::Rest { beats: 2 },
            Action::PlayNote { note: Note::D4 },
        ]
    );
}

#[test]
fn local_executor_surfaces_partial_trace_on_rejection() {
    let program = BlockNode::Sequence {
        body: vec![
            BlockNode::Call {
                primitive: "swap".to_string(),
                args: vec![BlockValue::Int(0), BlockValue::Int(1)],
            },
            BlockNode::Call {
                primitive: "swap".to_string(),
                args: vec![BlockValue::Int(0), BlockValue::Int(9)],
            },
        ],
    };
    let compiled = compile_blocks(&program, Domain::Potions, &registry()).unwrap();
    let start = WorldState::Potions {
        potions: vec![2, 1],
        swaps_used: 0,
    };
    let err = LocalExecutor::default().execute(&compiled, &start).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::RuntimeError);
    assert_eq!(err.partial_trace.len(), 1);
}

#[test]
fn local_executor_times_out_on_step_budget() {
    let compiled = CompiledProgram {
        domain: Domain::Sprite,
        calls: vec![
            PrimitiveCall {
                primitive: "jump".to_string(),
                args: Vec::new(),
            };
            3
        ],
    };
    let executor = LocalExecutor::new(ExecutionLimits {
        timeout: Duration::from_secs(5),
        max_steps: 2,
    });
    let sprite = WorldState::Sprite {
        x: 0,
        y: 0,
        scale_percent: 100,
        rotation_degrees: 0,
        speech: Vec::new(),
        jumps: 0,
    };
    let err = executor.execute(&compiled, &sprite).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Timeout);
    // Timeouts discard partial execution.
    assert!(err.partial_trace.is_empty());
}

// ============================================================================
// Replay scheduler
// ============================================================================

#[test]
fn replay_is_deterministic() {
    let level = maze_level(
        5,
        0,
        1,
        GoalSpec::Position {
            target: GridPos::new(4, 1),
            tolerance: 0,
        },
    );
    let trace = moves(4);
    let digest = trace.digest();

    let mut first = ReplayScheduler::new(&level, trace.clone());
    first.prime();
    first.run_to_end(&mut NoopPacer).unwrap();
    let (world_a, log_a) = first.into_outcome();

    let mut second = ReplayScheduler::new(&level, trace.clone());
    second.prime();
    second.run_to_end(&mut NoopPacer).unwrap();
    let (world_b, log_b) = second.into_outcome();

    assert_eq!(world_a, world_b);
    assert_eq!(log_a, log_b);
    assert_eq!(trace.digest(), digest);
}

#[test]
fn replay_cancellation_is_safe_at_every_index() {
    let level = maze_level(
        9,
        0,
        0,
        GoalSpec::Position {
            target: GridPos::new(6, 0),
            tolerance: 0,
        },
    );
    let trace = moves(6);

    for cancel_at in 0..trace.len() {
        let mut scheduler = ReplayScheduler::new(&level, trace.clone());
        scheduler.prime();
        for _ in 0..cancel_at {
            scheduler.step(&mut NoopPacer).unwrap();
        }
        scheduler.cancel();
        assert!(scheduler.step(&mut NoopPacer).unwrap().is_none());
        let (world, _) = scheduler.into_outcome();

        let mut expected = level.start_world.clone();
        for action in &trace.actions()[..cancel_at] {
            expected.apply(action).unwrap();
        }
        assert_eq!(world, expected, "cancelled at {cancel_at}");
    }
}

#[test]
fn replay_pauses_between_actions_but_not_after_the_last() {
    let level = maze_level(
        9,
        0,
        0,
        GoalSpec::Position {
            target: GridPos::new(3, 0),
            tolerance: 0,
        },
    );
    let mut pacer = RecordingPacer::default();
    let mut scheduler = ReplayScheduler::new(&level, moves(3));
    scheduler.prime();
    scheduler.run_to_end(&mut pacer).unwrap();
    assert_eq!(pacer.pauses.len(), 2);
    assert!(pacer.pauses.iter().all(|p| *p == Duration::from_millis(10)));
}

#[test]
fn replay_of_empty_trace_settles_immediately() {
    let level = music_level(vec![Note::C4]);
    let mut scheduler = ReplayScheduler::new(&level, ProgramTrace::empty());
    scheduler.prime();
    assert_eq!(scheduler.phase(), ReplayPhase::Settled);
}

#[test]
fn replay_halts_on_reducer_fault_and_keeps_the_prefix() {
    let level = combat_level();
    let trace = ProgramTrace::new(vec![
        Action::Attack {
            target_id: "boss".to_string(),
        },
        Action::Attack {
            target_id: "ghost".to_string(),
        },
    ]);
    let mut scheduler = ReplayScheduler::new(&level, trace);
    scheduler.prime();
    let err = scheduler.run_to_end(&mut NoopPacer).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::RuntimeError);
    assert_eq!(err.partial_trace.len(), 1);
    assert_eq!(scheduler.phase(), ReplayPhase::Cancelled);
    let (world, _) = scheduler.into_outcome();
    match world {
        WorldState::Combat { units, .. } => assert_eq!(units["boss"].hp, 20),
        _ => unreachable!(),
    }
}

// ============================================================================
// Goal validators
// ============================================================================

#[test]
fn scenario_a_robot_reaches_the_goal() {
    let registry = registry();
    let level = maze_level(
        5,
        0,
        1,
        GoalSpec::Position {
            target: GridPos::new(4, 1),
            tolerance: 0,
        },
    );
    let mut session = LevelSession::new(&registry, level).unwrap();
    let program = BlockNode::Repeat {
        count: 4,
        body: vec![BlockNode::Call {
            primitive: "move".to_string(),
            args: vec![BlockValue::Int(1), BlockValue::Int(0)],
        }],
    };
    let report = session.run_blocks(&program, &mut NoopPacer);
    assert!(report.outcome.is_passed(), "outcome: {:?}", report.outcome);
    assert_eq!(report.metrics.trace_len, 4);
    assert_eq!(report.metrics.applied_steps, 4);
}

#[test]
fn scenario_b_one_swap_is_not_sorted() {
    let registry = registry();
    let level = potions_level(vec![3, 1, 2], 5);
    let mut session = LevelSession::new(&registry, level).unwrap();
    let program = BlockNode::Call {
        primitive: "swap".to_string(),
        args: vec![BlockValue::Int(0), BlockValue::Int(1)],
    };
    let report = session.run_blocks(&program, &mut NoopPacer);
    match report.outcome {
        RunOutcome::Verdict(Verdict::Failed { .. }) => {}
        other => panic!("expected a failed verdict, got {other:?}"),
    }
    match session.world() {
        WorldState::Potions {
            potions,
            swaps_used,
        } => {
            assert_eq!(potions, &vec![1, 3, 2]);
            assert_eq!(*swaps_used, 1);
        }
        _ => unreachable!(),
    }
}

#[test]
fn scenario_e_note_order_matters() {
    let goal = GoalSpec::Notes {
        notes: vec![Note::C4, Note::D4, Note::E4],
    };
    let in_order = WorldState::Music {
        notes: vec![
            NoteEvent::Note { note: Note::C4 },
            NoteEvent::Note { note: Note::D4 },
            NoteEvent::Note { note: Note::E4 },
        ],
    };
    let log = ActionLog::new();
    assert!(evaluate_goal(&goal, &in_order, &log).is_passed());

    let shuffled = WorldState::Music {
        notes: vec![
            NoteEvent::Note { note: Note::C4 },
            NoteEvent::Note { note: Note::E4 },
            NoteEvent::Note { note: Note::D4 },
        ],
    };
    assert!(!evaluate_goal(&goal, &shuffled, &log).is_passed());
}

#[test]
fn rotation_goal_counts_accumulated_degrees() {
    let goal = GoalSpec::Rotation { min_degrees: 360 };
    let mut world = WorldState::Sprite {
        x: 0,
        y: 0,
        scale_percent: 100,
        rotation_degrees: 0,
        speech: Vec::new(),
        jumps: 0,
    };
    let log = ActionLog::new();
    for _ in 0..3 {
        world.apply(&Action::Rotate { degrees: 90 }).unwrap();
    }
    assert!(!evaluate_goal(&goal, &world, &log).is_passed());
    world.apply(&Action::Rotate { degrees: 90 }).unwrap();
    assert!(evaluate_goal(&goal, &world, &log).is_passed());
}

#[test]
fn sequence_goal_allows_gaps_but_not_reordering() {
    let goal = GoalSpec::Sequence {
        actions: vec![ActionKind::PlayNote, ActionKind::Rest],
    };
    let world = WorldState::Music { notes: Vec::new() };

    let mut log = ActionLog::new();
    log.push(Action::PlayNote { note: Note::C4 });
    log.push(Action::PlayNote { note: Note::D4 });
    log.push(Action::Rest { beats: 1 });
    assert!(evaluate_goal(&goal, &world, &log).is_passed());

    let mut reversed = ActionLog::new();
    reversed.push(Action::Rest { beats: 1 });
    reversed.push(Action::PlayNote { note: Note::C4 });
    assert!(!evaluate_goal(&goal, &world, &reversed).is_passed());
}

#[test]
fn structure_match_checks_blocks_and_exactness() {
    let target = vec![
        PlacedBlock {
            pos: BlockPos::new(0, 0, 0),
            color: Color::Blue,
        },
        PlacedBlock {
            pos: BlockPos::new(0, 0, 1),
            color: Color::Blue,
        },
    ];
    let goal = GoalSpec::StructureMatch {
        blocks: target.clone(),
        min_blocks: None,
        exact: false,
    };
    let exact_goal = GoalSpec::StructureMatch {
        blocks: target.clone(),
        min_blocks: None,
        exact: true,
    };

    let mut world = WorldState::Builder {
        blocks: Vec::new(),
        cursor: BlockPos::new(0, 0, 0),
        color: Color::Blue,
    };
    let log = ActionLog::new();
    for block in &target {
        world
            .apply(&Action::PlaceBlock {
                pos: block.pos,
                color: block.color,
            })
            .unwrap();
    }
    assert!(evaluate_goal(&goal, &world, &log).is_passed());
    assert!(evaluate_goal(&exact_goal, &world, &log).is_passed());

    world
        .apply(&Action::PlaceBlock {
            pos: BlockPos::new(5, 5, 0),
            color: Color::Red,
        })
        .unwrap();
    assert!(evaluate_goal(&goal, &world, &log).is_passed());
    assert!(!evaluate_goal(&exact_goal, &world, &log).is_passed());
}

#[test]
fn sorted_goal_enforces_the_swap_budget() {
    let goal = GoalSpec::SortedWithBudget {
        order: SortOrder::Ascending,
        max_swaps: 2,
    };
    let log = ActionLog::new();
    let within_budget = WorldState::Potions {
        potions: vec![1, 2, 3],
        swaps_used: 2,
    };
    assert!(evaluate_goal(&goal, &within_budget, &log).is_passed());
    let over_budget = WorldState::Potions {
        potions: vec![1, 2, 3],
        swaps_used: 3,
    };
    assert!(!evaluate_goal(&goal, &over_budget, &log).is_passed());
}

#[test]
fn free_goal_needs_one_meaningful_action() {
    let world = WorldState::Music { notes: Vec::new() };
    let empty = ActionLog::new();
    assert!(!evaluate_goal(&GoalSpec::Free, &world, &empty).is_passed());
    let mut log = ActionLog::new();
    log.push(Action::PlayNote { note: Note::A4 });
    assert!(evaluate_goal(&GoalSpec::Free, &world, &log).is_passed());
}

#[test]
fn sprite_log_projects_to_speech_and_jump_events() {
    let registry = registry();
    let level = Level {
        version: LEVEL_VERSION,
        id: "test-sprite".to_string(),
        name: "Test Sprite".to_string(),
        domain: Domain::Sprite,
        difficulty: Difficulty::Starter,
        instructions: String::new(),
        hints: Vec::new(),
        start_world: WorldState::Sprite {
            x: 0,
            y: 0,
            scale_percent: 100,
            rotation_degrees: 0,
            speech: Vec::new(),
            jumps: 0,
        },
        allowed_capabilities: vec!["say".to_string(), "jump".to_string(), "rotate".to_string()],
        goal: GoalSpec::Free,
        step_delay_ms: 10,
        partial_replay: PartialReplay::Keep,
    };
    let mut session = LevelSession::new(&registry, level).unwrap();
    let program = BlockNode::Sequence {
        body: vec![
            BlockNode::Call {
                primitive: "rotate".to_string(),
                args: vec![BlockValue::Int(90)],
            },
            BlockNode::Call {
                primitive: "say".to_string(),
                args: vec![BlockValue::Text("hi".to_string())],
            },
            BlockNode::Call {
                primitive: "jump".to_string(),
                args: Vec::new(),
            },
        ],
    };
    session.run_blocks(&program, &mut NoopPacer);
    assert_eq!(
        session.action_log().kinds(),
        vec![ActionKind::Say, ActionKind::Jump]
    );
}

// ============================================================================
// Session pipeline
// ============================================================================

#[test]
fn scenario_c_compile_error_leaves_the_world_untouched() {
    let registry = registry();
    let level = maze_level(
        5,
        0,
        1,
        GoalSpec::Position {
            target: GridPos::new(4, 1),
            tolerance: 0,
        },
    );
    let start = level.start_world.clone();
    let mut session = LevelSession::new(&registry, level).unwrap();
    let program = BlockNode::Call {
        primitive: "fly".to_string(),
        args: Vec::new(),
    };
    let report = session.run_blocks(&program, &mut NoopPacer);
    match &report.outcome {
        RunOutcome::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.kind, DiagnosticKind::CompileError)
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
    assert_eq!(report.metrics.applied_steps, 0);
    assert_eq!(session.world(), &start);
}

#[test]
fn scenario_c_unbalanced_source_never_reaches_the_scheduler() {
    let registry = registry();
    let level = music_level(vec![Note::C4]);
    let start = level.start_world.clone();
    let mut session = LevelSession::new(&registry, level).unwrap();
    let stderr = "  File \"main.py\", line 1\n    play_note(\nSyntaxError: '(' was never closed\n";
    let client = FakeExecutionClient::with_status(
        status_id::COMPILATION_ERROR,
        "Compilation Error",
        None,
        Some(stderr),
    );
    let remote = RemoteExecutor::new(client);
    let report = session.run_source("play_note(", PYTHON_LANGUAGE_ID, &remote, &mut NoopPacer);
    match &report.outcome {
        RunOutcome::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.kind, DiagnosticKind::CompileError);
            assert_eq!(diagnostic.location.map(|l| l.line), Some(1));
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
    assert_eq!(report.metrics.applied_steps, 0);
    assert_eq!(session.world(), &start);
}

#[test]
fn scenario_d_late_remote_completion_is_a_timeout() {
    let registry = registry();
    let level = music_level(vec![Note::C4]);
    let mut session = LevelSession::new(&registry, level).unwrap();
    let client = FakeExecutionClient::with_status(
        status_id::TIME_LIMIT_EXCEEDED,
        "Time Limit Exceeded",
        None,
        None,
    );
    let remote = RemoteExecutor::new(client);
    let report = session.run_source("while True: pass", PYTHON_LANGUAGE_ID, &remote, &mut NoopPacer);
    match &report.outcome {
        RunOutcome::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.kind, DiagnosticKind::Timeout);
            assert!(diagnostic.partial_trace.is_empty());
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
    assert_eq!(report.metrics.applied_steps, 0);
}

#[test]
fn unreachable_service_is_sandbox_unavailable_not_timeout() {
    let registry = registry();
    let level = music_level(vec![Note::C4]);
    let mut session = LevelSession::new(&registry, level).unwrap();
    let remote = RemoteExecutor::new(FakeExecutionClient::unreachable());
    let report = session.run_source("print('hi')", PYTHON_LANGUAGE_ID, &remote, &mut NoopPacer);
    match &report.outcome {
        RunOutcome::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.kind, DiagnosticKind::SandboxUnavailable)
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
}

#[test]
fn session_runs_remote_source_to_a_verdict() {
    let registry = registry();
    let level = music_level(vec![Note::C4, Note::D4, Note::E4]);
    let mut session = LevelSession::new(&registry, level).unwrap();
    let stdout = "warming up\n@cq play_note C4\n@cq play_note D4\n@cq play_note E4\ndone\n";
    let remote = RemoteExecutor::new(FakeExecutionClient::accepted(stdout));
    let report = session.run_source("melody()", PYTHON_LANGUAGE_ID, &remote, &mut NoopPacer);
    assert!(report.outcome.is_passed(), "outcome: {:?}", report.outcome);
    assert_eq!(report.metrics.trace_len, 3);
}

#[test]
fn combat_keeps_the_partial_trace_on_runtime_failure() {
    let registry = registry();
    let mut session = LevelSession::new(&registry, combat_level()).unwrap();
    // Second attack names a unit that is not in the roster.
    let program = BlockNode::Sequence {
        body: vec![
            BlockNode::Call {
                primitive: "attack".to_string(),
                args: vec![BlockValue::Text("boss".to_string())],
            },
            BlockNode::Call {
                primitive: "attack".to_string(),
                args: vec![BlockValue::Text("ghost".to_string())],
            },
        ],
    };
    let report = session.run_blocks(&program, &mut NoopPacer);
    match &report.outcome {
        RunOutcome::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.kind, DiagnosticKind::RuntimeError)
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
    // The first attack still animated and landed.
    assert_eq!(report.metrics.applied_steps, 1);
    match session.world() {
        WorldState::Combat { units, .. } => assert_eq!(units["boss"].hp, 20),
        _ => unreachable!(),
    }
}

#[test]
fn potions_discard_the_partial_trace_on_runtime_failure() {
    let registry = registry();
    let level = potions_level(vec![3, 1, 2], 5);
    let start = level.start_world.clone();
    let mut session = LevelSession::new(&registry, level).unwrap();
    let program = BlockNode::Sequence {
        body: vec![
            BlockNode::Call {
                primitive: "swap".to_string(),
                args: vec![BlockValue::Int(0), BlockValue::Int(1)],
            },
            BlockNode::Call {
                primitive: "swap".to_string(),
                args: vec![BlockValue::Int(0), BlockValue::Int(7)],
            },
        ],
    };
    let report = session.run_blocks(&program, &mut NoopPacer);
    match &report.outcome {
        RunOutcome::Diagnostic(diagnostic) => {
            assert_eq!(diagnostic.kind, DiagnosticKind::RuntimeError)
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
    assert_eq!(report.metrics.applied_steps, 0);
    assert_eq!(session.world(), &start);
}

#[test]
fn stale_remote_results_are_discarded() {
    let registry = registry();
    let level = music_level(vec![Note::C4]);
    let mut session = LevelSession::new(&registry, level).unwrap();

    let ticket = session.begin_run();
    // The learner resets while the remote call is still in flight.
    session.reset();
    let late_trace = ProgramTrace::new(vec![Action::PlayNote { note: Note::C4 }]);
    let report = session.finish_run(ticket, Ok(late_trace), &mut NoopPacer);
    assert!(report.is_none());
    match session.world() {
        WorldState::Music { notes } => assert!(notes.is_empty()),
        _ => unreachable!(),
    }
    assert!(session
        .session_log()
        .iter()
        .any(|entry| entry.kind == SessionLogKind::StaleResultDiscarded));
}

#[test]
fn fresh_tickets_complete_normally() {
    let registry = registry();
    let level = music_level(vec![Note::C4]);
    let mut session = LevelSession::new(&registry, level).unwrap();
    let ticket = session.begin_run();
    let trace = ProgramTrace::new(vec![Action::PlayNote { note: Note::C4 }]);
    let report = session.finish_run(ticket, Ok(trace), &mut NoopPacer);
    assert!(report.is_some_and(|report| report.outcome.is_passed()));
}

#[test]
fn reset_restores_the_starting_world() {
    let registry = registry();
    let level = potions_level(vec![2, 1], 5);
    let start = level.start_world.clone();
    let mut session = LevelSession::new(&registry, level).unwrap();
    let program = BlockNode::Call {
        primitive: "swap".to_string(),
        args: vec![BlockValue::Int(0), BlockValue::Int(1)],
    };
    session.run_blocks(&program, &mut NoopPacer);
    assert_ne!(session.world(), &start);
    let epoch_before = session.epoch();
    session.reset();
    assert_eq!(session.world(), &start);
    assert!(session.epoch() > epoch_before);
}

#[test]
fn advance_swaps_the_level_and_world() {
    let registry = registry();
    let mut session = LevelSession::new(&registry, potions_level(vec![2, 1], 5)).unwrap();
    session.advance(combat_level()).unwrap();
    assert_eq!(session.level().domain, Domain::Combat);
    assert!(matches!(session.world(), WorldState::Combat { .. }));
}

// ============================================================================
// Remote back end
// ============================================================================

#[test]
fn action_events_parse_in_printed_order() {
    let maze = maze_world(5, 0, 0);
    let stdout = "@cq move 1 0\nnoise\n@cq turn 1\n@cq move 0 1\n";
    let trace = parse_action_events(stdout, &maze).unwrap();
    assert_eq!(
        trace.actions(),
        &[
            Action::Move { dx: 1, dy: 0 },
            Action::Turn { delta: 1 },
            Action::Move { dx: 0, dy: 1 },
        ]
    );
}

#[test]
fn action_events_support_quoted_text_with_spaces() {
    let sprite = WorldState::Sprite {
        x: 0,
        y: 0,
        scale_percent: 100,
        rotation_degrees: 0,
        speech: Vec::new(),
        jumps: 0,
    };
    let trace = parse_action_events("@cq say \"Hello, world!\"\n", &sprite).unwrap();
    assert_eq!(
        trace.actions(),
        &[Action::Say {
            text: "Hello, world!".to_string()
        }]
    );
}

#[test]
fn action_events_reject_invalid_primitive_arguments() {
    let potions = WorldState::Potions {
        potions: vec![1, 2],
        swaps_used: 0,
    };
    let err = parse_action_events("@cq swap 0 1\n@cq swap 0 5\n", &potions).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::RuntimeError);
    assert_eq!(err.partial_trace.len(), 1);
}

#[test]
fn remote_rejects_unsupported_language_before_submitting() {
    let client = FakeExecutionClient::unreachable();
    let remote = RemoteExecutor::new(client);
    let maze = maze_world(5, 0, 0);
    let err = remote.execute("print('x')", 62, &maze).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::CompileError);
    assert_eq!(remote_submissions(&remote), 0);
}

fn remote_submissions(remote: &RemoteExecutor<FakeExecutionClient>) -> usize {
    remote_client(remote).submissions.get()
}

fn remote_client<'a>(
    remote: &'a RemoteExecutor<FakeExecutionClient>,
) -> &'a FakeExecutionClient {
    // Test-only peek; the executor owns its client.
    remote.client()
}

#[test]
fn remote_maps_compile_errors_with_a_source_line() {
    let stderr = "  File \"main.py\", line 3\n    def broken(\nSyntaxError: invalid syntax\n";
    let client =
        FakeExecutionClient::with_status(status_id::COMPILATION_ERROR, "Compilation Error", None, Some(stderr));
    let remote = RemoteExecutor::new(client);
    let maze = maze_world(5, 0, 0);
    let err = remote.execute("def broken(", PYTHON_LANGUAGE_ID, &maze).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::CompileError);
    assert_eq!(err.location.map(|l| l.line), Some(3));
}

#[test]
fn remote_treats_stderr_output_as_a_runtime_failure_with_partial_trace() {
    let stdout = "@cq move 1 0\n";
    let stderr = "Traceback (most recent call last):\n  File \"main.py\", line 2, in <module>\nZeroDivisionError: division by zero\n";
    let client = FakeExecutionClient::with_status(status_id::ACCEPTED, "Accepted", Some(stdout), Some(stderr));
    let remote = RemoteExecutor::new(client);
    let maze = maze_world(5, 0, 0);
    let err = remote.execute("1/0", PYTHON_LANGUAGE_ID, &maze).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::RuntimeError);
    assert_eq!(err.partial_trace.len(), 1);
    assert_eq!(err.location.map(|l| l.line), Some(2));
}

#[test]
fn remote_internal_error_is_sandbox_unavailable() {
    let client = FakeExecutionClient::with_status(status_id::INTERNAL_ERROR, "Internal Error", None, None);
    let remote = RemoteExecutor::new(client);
    let maze = maze_world(5, 0, 0);
    let err = remote.execute("print('x')", PYTHON_LANGUAGE_ID, &maze).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::SandboxUnavailable);
}

#[test]
fn remote_probe_reflects_client_health() {
    assert!(RemoteExecutor::new(FakeExecutionClient::accepted("")).probe());
    assert!(!RemoteExecutor::new(FakeExecutionClient::unreachable()).probe());
}

#[test]
fn remote_config_reads_env_shaped_sources() {
    let config = RemoteExecConfig::from_env_with(|key| match key {
        ENV_EXEC_BASE_URL => Some("http://sandbox.local:2358/".to_string()),
        ENV_EXEC_TIMEOUT_MS => Some("2500".to_string()),
        ENV_EXEC_BASE64 => Some("true".to_string()),
        _ => None,
    })
    .unwrap();
    assert_eq!(config.base_url, "http://sandbox.local:2358/");
    assert_eq!(config.timeout_ms, 2500);
    assert!(config.base64_encoded);

    let err = RemoteExecConfig::from_env_with(|_| None).unwrap_err();
    assert!(matches!(err, RemoteExecConfigError::MissingEnv { .. }));
}

// ============================================================================
// Levels and persistence
// ============================================================================

#[test]
fn builtin_levels_all_validate() {
    let registry = registry();
    let levels = builtin_levels();
    assert_eq!(levels.len(), 8);
    for level in &levels {
        level.validate(&registry).unwrap();
    }
    // One level per domain at minimum.
    for domain in Domain::variants() {
        assert!(
            levels.iter().any(|level| level.domain == *domain),
            "no builtin level for {domain:?}"
        );
    }
}

#[test]
fn level_documents_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("level.json");
    let level = combat_level();
    level.save_json(&path).unwrap();
    let loaded = Level::load_json(&path).unwrap();
    assert_eq!(loaded, level);
}

#[test]
fn level_load_rejects_unsupported_versions() {
    let mut level = combat_level();
    level.version = 99;
    let encoded = level.to_json().unwrap();
    let err = Level::from_json(&encoded).unwrap_err();
    assert!(matches!(err, LevelError::UnsupportedVersion { version: 99, .. }));
}

#[test]
fn level_validation_catches_cross_domain_documents() {
    let registry = registry();
    let mut level = combat_level();
    level.start_world = WorldState::Music { notes: Vec::new() };
    assert!(matches!(
        level.validate(&registry),
        Err(LevelError::DomainMismatch { .. })
    ));

    let mut level = combat_level();
    level.goal = GoalSpec::Notes {
        notes: vec![Note::C4],
    };
    assert!(matches!(
        level.validate(&registry),
        Err(LevelError::GoalDomainMismatch { .. })
    ));

    let mut level = combat_level();
    level.allowed_capabilities = vec!["summon".to_string()];
    assert!(matches!(
        level.validate(&registry),
        Err(LevelError::UnknownCapability { .. })
    ));
}

#[test]
fn world_snapshots_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let mut world = maze_world(5, 0, 0);
    world.apply(&Action::Move { dx: 1, dy: 0 }).unwrap();
    let snapshot = WorldSnapshot::new(world, 1);
    snapshot.save_json(&path).unwrap();
    let loaded = WorldSnapshot::load_json(&path).unwrap();
    assert_eq!(loaded, snapshot);
}

#[test]
fn capability_registry_covers_every_domain() {
    let registry = registry();
    for domain in Domain::variants() {
        assert!(
            !registry.domain_capabilities(*domain).is_empty(),
            "no capabilities for {domain:?}"
        );
    }
    assert!(registry.lookup(Domain::Maze, "move").is_some());
    assert!(registry.lookup(Domain::Maze, "attack").is_none());
    assert!(registry
        .validate_subset(Domain::Combat, &["attack".to_string()])
        .is_ok());
    assert!(registry
        .validate_subset(Domain::Combat, &["warp".to_string()])
        .is_err());
}
