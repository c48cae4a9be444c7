//! World state: one variant per domain, plus the pure action reducer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;

use super::types::{
    Action, ActionKind, BlockPos, Color, Domain, GridPos, Heading, NoteEvent, Pixel, PlacedBlock,
    Unit, UnitId, DEFAULT_ATTACK_DAMAGE,
};

// ============================================================================
// World State
// ============================================================================

/// The mutable simulated-world record for one domain.
///
/// Exactly one variant per domain, each carrying exactly the fields that
/// domain needs. Constructed from a level's starting configuration before
/// every run and mutated only through [`WorldState::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorldState {
    Maze {
        grid_size: i32,
        pos: GridPos,
        heading: Heading,
        stars: BTreeSet<GridPos>,
        collected: u32,
        visited: Vec<GridPos>,
    },
    Builder {
        /// Sorted by position; never holds two blocks at one coordinate.
        blocks: Vec<PlacedBlock>,
        cursor: BlockPos,
        color: Color,
    },
    Potions {
        potions: Vec<i64>,
        swaps_used: u32,
    },
    Combat {
        units: BTreeMap<UnitId, Unit>,
        attacks: Vec<UnitId>,
        last_target: Option<UnitId>,
    },
    Music {
        notes: Vec<NoteEvent>,
    },
    Sprite {
        x: i32,
        y: i32,
        scale_percent: u32,
        rotation_degrees: i32,
        speech: Vec<String>,
        jumps: u32,
    },
    Canvas {
        width: u32,
        height: u32,
        /// Sorted by (y, x); at most one entry per cell.
        pixels: Vec<Pixel>,
    },
}

impl WorldState {
    pub fn domain(&self) -> Domain {
        match self {
            WorldState::Maze { .. } => Domain::Maze,
            WorldState::Builder { .. } => Domain::Builder,
            WorldState::Potions { .. } => Domain::Potions,
            WorldState::Combat { .. } => Domain::Combat,
            WorldState::Music { .. } => Domain::Music,
            WorldState::Sprite { .. } => Domain::Sprite,
            WorldState::Canvas { .. } => Domain::Canvas,
        }
    }

    /// Apply one action to this world. Pure reducer in the sense of the
    /// replay contract: the outcome depends only on the current state and
    /// the action.
    ///
    /// Boundary-leaving moves clamp to the nearest in-bounds cell.
    /// Structurally impossible actions (wrong domain, unknown unit,
    /// out-of-range swap index) are errors that halt a replay.
    pub fn apply(&mut self, action: &Action) -> Result<(), WorldError> {
        match self {
            WorldState::Maze {
                grid_size,
                pos,
                heading,
                stars,
                collected,
                visited,
            } => match action {
                Action::Move { dx, dy } => {
                    let next = GridPos {
                        x: (pos.x + dx).clamp(0, *grid_size - 1),
                        y: (pos.y + dy).clamp(0, *grid_size - 1),
                    };
                    if next != *pos {
                        *pos = next;
                        visited.push(next);
                    }
                    Ok(())
                }
                Action::Turn { delta } => {
                    *heading = heading.rotated(*delta);
                    Ok(())
                }
                Action::CollectStar => {
                    if stars.remove(pos) {
                        *collected += 1;
                    }
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Maze, other)),
            },
            WorldState::Builder {
                blocks,
                cursor,
                color,
            } => match action {
                Action::PlaceBlock {
                    pos,
                    color: block_color,
                } => {
                    match blocks.binary_search_by(|block| block.pos.cmp(pos)) {
                        Ok(found) => blocks[found].color = *block_color,
                        Err(slot) => blocks.insert(
                            slot,
                            PlacedBlock {
                                pos: *pos,
                                color: *block_color,
                            },
                        ),
                    }
                    *cursor = *pos;
                    Ok(())
                }
                Action::RemoveBlock { pos } => {
                    if let Ok(found) = blocks.binary_search_by(|block| block.pos.cmp(pos)) {
                        blocks.remove(found);
                    }
                    Ok(())
                }
                Action::SetColor { color: next } => {
                    *color = *next;
                    Ok(())
                }
                Action::Goto { pos } => {
                    *cursor = *pos;
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Builder, other)),
            },
            WorldState::Potions {
                potions,
                swaps_used,
            } => match action {
                Action::Swap { i, j } => {
                    let len = potions.len();
                    if *i >= len {
                        return Err(WorldError::SwapOutOfRange { index: *i, len });
                    }
                    if *j >= len {
                        return Err(WorldError::SwapOutOfRange { index: *j, len });
                    }
                    potions.swap(*i, *j);
                    *swaps_used += 1;
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Potions, other)),
            },
            WorldState::Combat {
                units,
                attacks,
                last_target,
            } => match action {
                Action::Attack { target_id } => {
                    let Some(unit) = units.get_mut(target_id) else {
                        return Err(WorldError::UnknownUnit {
                            unit_id: target_id.clone(),
                        });
                    };
                    unit.hp = (unit.hp - DEFAULT_ATTACK_DAMAGE).clamp(0, unit.max_hp);
                    attacks.push(target_id.clone());
                    *last_target = Some(target_id.clone());
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Combat, other)),
            },
            WorldState::Music { notes } => match action {
                Action::PlayNote { note } => {
                    notes.push(NoteEvent::Note { note: *note });
                    Ok(())
                }
                Action::Rest { beats } => {
                    notes.push(NoteEvent::Rest { beats: *beats });
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Music, other)),
            },
            WorldState::Sprite {
                x,
                y,
                scale_percent,
                rotation_degrees,
                speech,
                jumps,
            } => match action {
                Action::Move { dx, dy } => {
                    *x += dx;
                    *y += dy;
                    Ok(())
                }
                Action::Say { text } => {
                    speech.push(text.clone());
                    Ok(())
                }
                Action::Jump => {
                    *jumps += 1;
                    Ok(())
                }
                Action::Scale { percent } => {
                    *scale_percent = *percent;
                    Ok(())
                }
                Action::Rotate { degrees } => {
                    *rotation_degrees += degrees;
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Sprite, other)),
            },
            WorldState::Canvas {
                width,
                height,
                pixels,
            } => match action {
                Action::DrawPixel { x, y, color } => {
                    if *x >= *width || *y >= *height {
                        return Err(WorldError::PixelOutOfRange {
                            x: *x,
                            y: *y,
                            width: *width,
                            height: *height,
                        });
                    }
                    let key = (*y, *x);
                    match pixels.binary_search_by(|pixel| (pixel.y, pixel.x).cmp(&key)) {
                        Ok(found) => pixels[found].color = *color,
                        Err(slot) => pixels.insert(
                            slot,
                            Pixel {
                                x: *x,
                                y: *y,
                                color: *color,
                            },
                        ),
                    }
                    Ok(())
                }
                other => Err(WorldError::domain_mismatch(Domain::Canvas, other)),
            },
        }
    }

    /// Whether an applied action belongs in the goal-checking log for this
    /// world's domain. Animation-only actions (e.g. sprite rotation) are
    /// judged from accumulated world state instead.
    pub fn is_goal_relevant(&self, action: &Action) -> bool {
        match self.domain() {
            Domain::Maze => matches!(action.kind(), ActionKind::Move | ActionKind::CollectStar),
            Domain::Sprite => matches!(action.kind(), ActionKind::Say | ActionKind::Jump),
            Domain::Builder
            | Domain::Potions
            | Domain::Combat
            | Domain::Music
            | Domain::Canvas => true,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    DomainMismatch { domain: Domain, action: ActionKind },
    SwapOutOfRange { index: usize, len: usize },
    UnknownUnit { unit_id: UnitId },
    PixelOutOfRange { x: u32, y: u32, width: u32, height: u32 },
}

impl WorldError {
    fn domain_mismatch(domain: Domain, action: &Action) -> Self {
        WorldError::DomainMismatch {
            domain,
            action: action.kind(),
        }
    }
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::DomainMismatch { domain, action } => {
                write!(f, "action {action:?} does not apply to the {} domain", domain.as_str())
            }
            WorldError::SwapOutOfRange { index, len } => {
                write!(f, "swap index {index} out of range for array of length {len}")
            }
            WorldError::UnknownUnit { unit_id } => write!(f, "unknown unit: {unit_id}"),
            WorldError::PixelOutOfRange {
                x,
                y,
                width,
                height,
            } => write!(f, "pixel ({x}, {y}) outside canvas {width}x{height}"),
        }
    }
}

impl Error for WorldError {}
