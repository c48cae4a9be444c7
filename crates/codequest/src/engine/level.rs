//! Level documents: static configuration a session loads once and treats
//! as read-only.
//!
//! Levels arrive as versioned JSON, either from the built-in catalog or
//! from the external persistence collaborator. Loading type-checks the
//! document shape; `Level::validate` additionally checks domain
//! consistency against the capability registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;
use std::path::Path;

use super::capability::{CapabilityError, CapabilityRegistry};
use super::goal::{goal_fits_domain, GoalSpec, SortOrder};
use super::persist::{read_json_from_path, write_json_to_path, PersistError};
use super::types::{
    ActionKind, BlockPos, Color, Domain, GridPos, Heading, LevelId, Note, PlacedBlock, Unit,
    DEFAULT_STEP_DELAY_MS, LEVEL_VERSION,
};
use super::world::WorldState;

// ============================================================================
// Level
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Starter,
    Easy,
    Medium,
    Hard,
}

/// What to do with a partial trace when a run fails mid-program: animate
/// what happened (combat), or discard it wholesale (sorting, where half a
/// plan means nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartialReplay {
    #[default]
    Keep,
    Discard,
}

fn default_level_version() -> u32 {
    LEVEL_VERSION
}

fn default_step_delay_ms() -> u64 {
    DEFAULT_STEP_DELAY_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    #[serde(default = "default_level_version")]
    pub version: u32,
    pub id: LevelId,
    pub name: String,
    pub domain: Domain,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub hints: Vec<String>,
    pub start_world: WorldState,
    pub allowed_capabilities: Vec<String>,
    pub goal: GoalSpec,
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default)]
    pub partial_replay: PartialReplay,
}

impl Level {
    /// Check internal consistency: the starting world and the goal belong
    /// to the level's domain, and every allowed capability exists there.
    pub fn validate(&self, registry: &CapabilityRegistry) -> Result<(), LevelError> {
        if self.start_world.domain() != self.domain {
            return Err(LevelError::DomainMismatch {
                level_domain: self.domain,
                world_domain: self.start_world.domain(),
            });
        }
        if !goal_fits_domain(&self.goal, self.domain) {
            return Err(LevelError::GoalDomainMismatch {
                domain: self.domain,
            });
        }
        if self.allowed_capabilities.is_empty() {
            return Err(LevelError::EmptyCapabilitySet {
                level_id: self.id.clone(),
            });
        }
        registry.validate_subset(self.domain, &self.allowed_capabilities)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, LevelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, LevelError> {
        let level: Self = serde_json::from_str(input)?;
        level.validate_version()?;
        Ok(level)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), LevelError> {
        write_json_to_path(self, path.as_ref())?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let level: Self = read_json_from_path(path.as_ref())?;
        level.validate_version()?;
        Ok(level)
    }

    fn validate_version(&self) -> Result<(), LevelError> {
        if self.version == LEVEL_VERSION {
            Ok(())
        } else {
            Err(LevelError::UnsupportedVersion {
                version: self.version,
                expected: LEVEL_VERSION,
            })
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    Io(String),
    Serde(String),
    UnsupportedVersion { version: u32, expected: u32 },
    DomainMismatch { level_domain: Domain, world_domain: Domain },
    GoalDomainMismatch { domain: Domain },
    EmptyCapabilitySet { level_id: LevelId },
    UnknownCapability { domain: Domain, name: String },
}

impl From<PersistError> for LevelError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Io(message) => LevelError::Io(message),
            PersistError::Serde(message) => LevelError::Serde(message),
            PersistError::UnsupportedVersion {
                version, expected, ..
            } => LevelError::UnsupportedVersion { version, expected },
        }
    }
}

impl From<serde_json::Error> for LevelError {
    fn from(err: serde_json::Error) -> Self {
        LevelError::Serde(err.to_string())
    }
}

impl From<CapabilityError> for LevelError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::UnknownCapability { domain, name } => {
                LevelError::UnknownCapability { domain, name }
            }
        }
    }
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::Io(message) => write!(f, "io error: {message}"),
            LevelError::Serde(message) => write!(f, "level document error: {message}"),
            LevelError::UnsupportedVersion { version, expected } => {
                write!(f, "unsupported level version {version}, expected {expected}")
            }
            LevelError::DomainMismatch {
                level_domain,
                world_domain,
            } => write!(
                f,
                "level is {} but its starting world is {}",
                level_domain.as_str(),
                world_domain.as_str()
            ),
            LevelError::GoalDomainMismatch { domain } => {
                write!(f, "goal cannot be satisfied in the {} domain", domain.as_str())
            }
            LevelError::EmptyCapabilitySet { level_id } => {
                write!(f, "level {level_id} allows no capabilities")
            }
            LevelError::UnknownCapability { domain, name } => {
                write!(f, "unknown capability in {} domain: {name}", domain.as_str())
            }
        }
    }
}

impl Error for LevelError {}

// ============================================================================
// Built-in Catalog
// ============================================================================

fn capability_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// The authored default levels, one per domain. Custom levels come from
/// the external persistence collaborator in the same document format.
pub fn builtin_levels() -> Vec<Level> {
    vec![
        Level {
            version: LEVEL_VERSION,
            id: "maze-first-steps".to_string(),
            name: "First Steps".to_string(),
            domain: Domain::Maze,
            difficulty: Difficulty::Starter,
            instructions: "Walk the robot to the flag on the right edge.".to_string(),
            hints: vec!["Four moves to the right will do it.".to_string()],
            start_world: WorldState::Maze {
                grid_size: 5,
                pos: GridPos::new(0, 1),
                heading: Heading::East,
                stars: BTreeSet::new(),
                collected: 0,
                visited: vec![GridPos::new(0, 1)],
            },
            allowed_capabilities: capability_names(&["move", "turn"]),
            goal: GoalSpec::Position {
                target: GridPos::new(4, 1),
                tolerance: 0,
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
        Level {
            version: LEVEL_VERSION,
            id: "maze-star-run".to_string(),
            name: "Star Run".to_string(),
            domain: Domain::Maze,
            difficulty: Difficulty::Easy,
            instructions: "Collect the star on your way to the corner.".to_string(),
            hints: vec!["Stand on the star before collecting it.".to_string()],
            start_world: WorldState::Maze {
                grid_size: 5,
                pos: GridPos::new(0, 0),
                heading: Heading::East,
                stars: BTreeSet::from([GridPos::new(2, 0)]),
                collected: 0,
                visited: vec![GridPos::new(0, 0)],
            },
            allowed_capabilities: capability_names(&["move", "turn", "collect_star"]),
            goal: GoalSpec::Action {
                required: vec![ActionKind::CollectStar],
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
        Level {
            version: LEVEL_VERSION,
            id: "builder-little-tower".to_string(),
            name: "Little Tower".to_string(),
            domain: Domain::Builder,
            difficulty: Difficulty::Easy,
            instructions: "Stack three blue blocks at the origin.".to_string(),
            hints: vec!["Blocks stack along z.".to_string()],
            start_world: WorldState::Builder {
                blocks: Vec::new(),
                cursor: BlockPos::new(0, 0, 0),
                color: Color::Blue,
            },
            allowed_capabilities: capability_names(&[
                "place_block",
                "remove_block",
                "set_color",
                "goto",
            ]),
            goal: GoalSpec::StructureMatch {
                blocks: vec![
                    PlacedBlock {
                        pos: BlockPos::new(0, 0, 0),
                        color: Color::Blue,
                    },
                    PlacedBlock {
                        pos: BlockPos::new(0, 0, 1),
                        color: Color::Blue,
                    },
                    PlacedBlock {
                        pos: BlockPos::new(0, 0, 2),
                        color: Color::Blue,
                    },
                ],
                min_blocks: None,
                exact: false,
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
        Level {
            version: LEVEL_VERSION,
            id: "potions-three-bottles".to_string(),
            name: "Three Bottles".to_string(),
            domain: Domain::Potions,
            difficulty: Difficulty::Easy,
            instructions: "Sort the potions from weakest to strongest.".to_string(),
            hints: vec!["Two swaps are enough.".to_string()],
            start_world: WorldState::Potions {
                potions: vec![3, 1, 2],
                swaps_used: 0,
            },
            allowed_capabilities: capability_names(&["swap"]),
            goal: GoalSpec::SortedWithBudget {
                order: SortOrder::Ascending,
                max_swaps: 5,
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Discard,
        },
        Level {
            version: LEVEL_VERSION,
            id: "combat-pick-your-target".to_string(),
            name: "Pick Your Target".to_string(),
            domain: Domain::Combat,
            difficulty: Difficulty::Medium,
            instructions: "Take down the goblin chief, not its minions.".to_string(),
            hints: vec!["The chief's id is goblin-chief.".to_string()],
            start_world: WorldState::Combat {
                units: BTreeMap::from([
                    ("goblin-chief".to_string(), Unit::enemy(30)),
                    ("goblin-grunt".to_string(), Unit::enemy(10)),
                    ("hero".to_string(), Unit::ally(50)),
                ]),
                attacks: Vec::new(),
                last_target: None,
            },
            allowed_capabilities: capability_names(&["attack"]),
            goal: GoalSpec::TargetSelection {
                target_id: "goblin-chief".to_string(),
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
        Level {
            version: LEVEL_VERSION,
            id: "music-do-re-mi".to_string(),
            name: "Do Re Mi".to_string(),
            domain: Domain::Music,
            difficulty: Difficulty::Starter,
            instructions: "Play C4, D4, E4 in that order.".to_string(),
            hints: Vec::new(),
            start_world: WorldState::Music { notes: Vec::new() },
            allowed_capabilities: capability_names(&["play_note", "rest"]),
            goal: GoalSpec::Notes {
                notes: vec![Note::C4, Note::D4, Note::E4],
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
        Level {
            version: LEVEL_VERSION,
            id: "sprite-say-hello".to_string(),
            name: "Say Hello".to_string(),
            domain: Domain::Sprite,
            difficulty: Difficulty::Starter,
            instructions: "Make the sprite greet the world.".to_string(),
            hints: vec!["The say block prints a speech bubble.".to_string()],
            start_world: WorldState::Sprite {
                x: 0,
                y: 0,
                scale_percent: 100,
                rotation_degrees: 0,
                speech: Vec::new(),
                jumps: 0,
            },
            allowed_capabilities: capability_names(&["say", "jump", "scale", "rotate", "move"]),
            goal: GoalSpec::Speech {
                text: Some("Hello, world!".to_string()),
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
        Level {
            version: LEVEL_VERSION,
            id: "canvas-four-dots".to_string(),
            name: "Four Dots".to_string(),
            domain: Domain::Canvas,
            difficulty: Difficulty::Easy,
            instructions: "Draw at least four pixels on the canvas.".to_string(),
            hints: vec!["A repeat block saves you typing.".to_string()],
            start_world: WorldState::Canvas {
                width: 8,
                height: 8,
                pixels: Vec::new(),
            },
            allowed_capabilities: capability_names(&["draw_pixel"]),
            goal: GoalSpec::Repeat {
                kind: ActionKind::DrawPixel,
                min_count: 4,
            },
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            partial_replay: PartialReplay::Keep,
        },
    ]
}
