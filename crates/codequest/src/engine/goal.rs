//! Goal specifications and the pure validators that judge a settled world.
//!
//! Validators never mutate anything and are callable at any time; the
//! session invokes them once a replay settles. A failed verdict is
//! actionable feedback, never an error.

use serde::{Deserialize, Serialize};

use super::types::{ActionKind, ActionLog, GridPos, Note, NoteEvent, PlacedBlock, UnitId};
use super::world::WorldState;

// ============================================================================
// Goal Specification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// The success criterion of a level, one variant per validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GoalSpec {
    /// Finish within `tolerance` cells (Manhattan) of the target.
    Position { target: GridPos, tolerance: u32 },
    /// Every listed action kind occurred at least once.
    Action { required: Vec<ActionKind> },
    /// Accumulated sprite rotation reaches the threshold (either way).
    Rotation { min_degrees: i32 },
    /// Something was said; with `text` set, that exact line was said.
    Speech { text: Option<String> },
    /// Free play: any meaningful action counts.
    Free,
    /// The listed action kinds occurred in this order (gaps allowed).
    Sequence { actions: Vec<ActionKind> },
    /// Exactly this melody was played, in order, rests ignored.
    Notes { notes: Vec<Note> },
    /// The named action kind occurred at least `min_count` times.
    Repeat { kind: ActionKind, min_count: u32 },
    /// The built structure contains every listed block; `exact` forbids
    /// extras, `min_blocks` additionally requires a total block count.
    StructureMatch {
        blocks: Vec<PlacedBlock>,
        #[serde(default)]
        min_blocks: Option<u32>,
        #[serde(default)]
        exact: bool,
    },
    /// The array is sorted in the given order using at most `max_swaps`.
    SortedWithBudget { order: SortOrder, max_swaps: u32 },
    /// The last attacked unit is the named target.
    TargetSelection { target_id: UnitId },
}

// ============================================================================
// Verdict
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Verdict {
    Passed { summary: String },
    Failed { feedback: String },
}

impl Verdict {
    pub fn passed(summary: impl Into<String>) -> Self {
        Verdict::Passed {
            summary: summary.into(),
        }
    }

    pub fn failed(feedback: impl Into<String>) -> Self {
        Verdict::Failed {
            feedback: feedback.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed { .. })
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Judge a settled world and its action log against a goal. Pure.
pub fn evaluate_goal(goal: &GoalSpec, world: &WorldState, log: &ActionLog) -> Verdict {
    match goal {
        GoalSpec::Position { target, tolerance } => {
            let pos = match world {
                WorldState::Maze { pos, .. } => *pos,
                WorldState::Sprite { x, y, .. } => GridPos::new(*x, *y),
                _ => return Verdict::failed("this goal needs a positionable world"),
            };
            let distance = pos.distance(*target);
            if distance <= *tolerance {
                Verdict::passed(format!("reached ({}, {})", target.x, target.y))
            } else {
                Verdict::failed(format!(
                    "finished at ({}, {}), {} cell(s) away from ({}, {})",
                    pos.x, pos.y, distance, target.x, target.y
                ))
            }
        }
        GoalSpec::Action { required } => {
            for kind in required {
                if !log.contains_kind(*kind) {
                    return Verdict::failed(format!("the program never used {kind:?}"));
                }
            }
            Verdict::passed("used every required action")
        }
        GoalSpec::Rotation { min_degrees } => match world {
            WorldState::Sprite {
                rotation_degrees, ..
            } => {
                if rotation_degrees.abs() >= min_degrees.abs() {
                    Verdict::passed(format!("rotated {rotation_degrees} degrees"))
                } else {
                    Verdict::failed(format!(
                        "rotated {rotation_degrees} degrees, needs at least {min_degrees}"
                    ))
                }
            }
            _ => Verdict::failed("this goal needs the sprite world"),
        },
        GoalSpec::Speech { text } => match world {
            WorldState::Sprite { speech, .. } => match text {
                Some(expected) => {
                    if speech.iter().any(|line| line == expected) {
                        Verdict::passed(format!("said \"{expected}\""))
                    } else {
                        Verdict::failed(format!("the sprite never said \"{expected}\""))
                    }
                }
                None => {
                    if speech.is_empty() {
                        Verdict::failed("the sprite never said anything")
                    } else {
                        Verdict::passed("the sprite spoke")
                    }
                }
            },
            _ => Verdict::failed("this goal needs the sprite world"),
        },
        GoalSpec::Free => {
            if log.is_empty() {
                Verdict::failed("run a program that does at least one action")
            } else {
                Verdict::passed(format!("{} action(s) performed", log.len()))
            }
        }
        GoalSpec::Sequence { actions } => {
            let mut wanted = actions.iter();
            let mut next = wanted.next();
            for kind in log.kinds() {
                match next {
                    Some(expected) if *expected == kind => next = wanted.next(),
                    _ => {}
                }
            }
            if next.is_none() {
                Verdict::passed("actions happened in the required order")
            } else {
                Verdict::failed("the required actions did not happen in order")
            }
        }
        GoalSpec::Notes { notes } => match world {
            WorldState::Music {
                notes: played_events,
            } => {
                let played: Vec<Note> = played_events
                    .iter()
                    .filter_map(|event| match event {
                        NoteEvent::Note { note } => Some(*note),
                        NoteEvent::Rest { .. } => None,
                    })
                    .collect();
                if played == *notes {
                    Verdict::passed("melody matches")
                } else {
                    Verdict::failed(format!(
                        "expected {}, heard {}",
                        render_notes(notes),
                        render_notes(&played)
                    ))
                }
            }
            _ => Verdict::failed("this goal needs the music world"),
        },
        GoalSpec::Repeat { kind, min_count } => {
            let count = log.count_kind(*kind) as u32;
            if count >= *min_count {
                Verdict::passed(format!("{kind:?} happened {count} time(s)"))
            } else {
                Verdict::failed(format!(
                    "{kind:?} happened {count} time(s), needs at least {min_count}"
                ))
            }
        }
        GoalSpec::StructureMatch {
            blocks: required,
            min_blocks,
            exact,
        } => match world {
            WorldState::Builder { blocks, .. } => {
                for target in required {
                    let found = blocks
                        .iter()
                        .any(|block| block.pos == target.pos && block.color == target.color);
                    if !found {
                        return Verdict::failed(format!(
                            "missing a {} block at ({}, {}, {})",
                            target.color.as_str(),
                            target.pos.x,
                            target.pos.y,
                            target.pos.z
                        ));
                    }
                }
                if *exact && blocks.len() != required.len() {
                    return Verdict::failed(format!(
                        "structure has {} block(s), expected exactly {}",
                        blocks.len(),
                        required.len()
                    ));
                }
                if let Some(min) = min_blocks {
                    if (blocks.len() as u32) < *min {
                        return Verdict::failed(format!(
                            "placed {} block(s), needs at least {min}",
                            blocks.len()
                        ));
                    }
                }
                Verdict::passed("structure matches")
            }
            _ => Verdict::failed("this goal needs the builder world"),
        },
        GoalSpec::SortedWithBudget { order, max_swaps } => match world {
            WorldState::Potions {
                potions,
                swaps_used,
            } => {
                let sorted = match order {
                    SortOrder::Ascending => potions.windows(2).all(|pair| pair[0] <= pair[1]),
                    SortOrder::Descending => potions.windows(2).all(|pair| pair[0] >= pair[1]),
                };
                if !sorted {
                    Verdict::failed("the potions are not sorted yet")
                } else if swaps_used > max_swaps {
                    Verdict::failed(format!(
                        "sorted, but {swaps_used} swap(s) used, budget is {max_swaps}"
                    ))
                } else {
                    Verdict::passed(format!("sorted in {swaps_used} swap(s)"))
                }
            }
            _ => Verdict::failed("this goal needs the potions world"),
        },
        GoalSpec::TargetSelection { target_id } => match world {
            WorldState::Combat { last_target, .. } => match last_target {
                Some(attacked) if attacked == target_id => {
                    Verdict::passed(format!("attacked {target_id}"))
                }
                Some(attacked) => {
                    Verdict::failed(format!("attacked {attacked}, expected {target_id}"))
                }
                None => Verdict::failed("no attack happened"),
            },
            _ => Verdict::failed("this goal needs the combat world"),
        },
    }
}

fn render_notes(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "nothing".to_string();
    }
    notes
        .iter()
        .map(|note| note.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a goal can ever pass in the given domain. Checked at level load.
pub fn goal_fits_domain(goal: &GoalSpec, domain: super::types::Domain) -> bool {
    use super::types::Domain;
    match goal {
        GoalSpec::Position { .. } => matches!(domain, Domain::Maze | Domain::Sprite),
        GoalSpec::Rotation { .. } | GoalSpec::Speech { .. } => domain == Domain::Sprite,
        GoalSpec::Notes { .. } => domain == Domain::Music,
        GoalSpec::StructureMatch { .. } => domain == Domain::Builder,
        GoalSpec::SortedWithBudget { .. } => domain == Domain::Potions,
        GoalSpec::TargetSelection { .. } => domain == Domain::Combat,
        GoalSpec::Action { .. }
        | GoalSpec::Free
        | GoalSpec::Sequence { .. }
        | GoalSpec::Repeat { .. } => true,
    }
}
