//! Core type definitions: ids, constants, shared value types, and actions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Type Aliases
// ============================================================================

pub type LevelId = String;
pub type UnitId = String;
pub type RunEpoch = u64;

// ============================================================================
// Constants
// ============================================================================

pub const LEVEL_VERSION: u32 = 1;
pub const SNAPSHOT_VERSION: u32 = 1;

/// Hard upper bound on the number of actions a single program may produce.
pub const MAX_TRACE_ACTIONS: usize = 10_000;
/// Hard upper bound on primitive calls executed by the local back end.
pub const MAX_EXECUTION_STEPS: u64 = 100_000;
/// Upper bound on a single repeat block's count.
pub const MAX_REPEAT_COUNT: u32 = 1_000;

pub const DEFAULT_STEP_DELAY_MS: u64 = 300;
pub const DEFAULT_ATTACK_DAMAGE: i64 = 10;

// ============================================================================
// Domains
// ============================================================================

/// The learning domains a level can belong to. Each domain owns its own
/// world-state shape, capability set, and goal vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Maze,
    Builder,
    Potions,
    Combat,
    Music,
    Sprite,
    Canvas,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Maze => "maze",
            Domain::Builder => "builder",
            Domain::Potions => "potions",
            Domain::Combat => "combat",
            Domain::Music => "music",
            Domain::Sprite => "sprite",
            Domain::Canvas => "canvas",
        }
    }

    pub fn variants() -> &'static [Domain] {
        &[
            Domain::Maze,
            Domain::Builder,
            Domain::Potions,
            Domain::Combat,
            Domain::Music,
            Domain::Sprite,
            Domain::Canvas,
        ]
    }
}

// ============================================================================
// Shared Value Types
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    pub fn distance(&self, other: GridPos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    White,
    Gray,
    Black,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Orange => "orange",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Purple => "purple",
            Color::White => "white",
            Color::Gray => "gray",
            Color::Black => "black",
        }
    }

    pub fn parse(value: &str) -> Option<Color> {
        let value = value.trim();
        [
            Color::Red,
            Color::Orange,
            Color::Yellow,
            Color::Green,
            Color::Blue,
            Color::Purple,
            Color::White,
            Color::Gray,
            Color::Black,
        ]
        .into_iter()
        .find(|color| color.as_str().eq_ignore_ascii_case(value))
    }
}

/// One octave of named notes, enough for every authored melody level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Note {
    C4,
    D4,
    E4,
    F4,
    G4,
    A4,
    B4,
    C5,
}

impl Note {
    pub fn as_str(&self) -> &'static str {
        match self {
            Note::C4 => "C4",
            Note::D4 => "D4",
            Note::E4 => "E4",
            Note::F4 => "F4",
            Note::G4 => "G4",
            Note::A4 => "A4",
            Note::B4 => "B4",
            Note::C5 => "C5",
        }
    }

    pub fn parse(value: &str) -> Option<Note> {
        let value = value.trim();
        [
            Note::C4,
            Note::D4,
            Note::E4,
            Note::F4,
            Note::G4,
            Note::A4,
            Note::B4,
            Note::C5,
        ]
        .into_iter()
        .find(|note| note.as_str().eq_ignore_ascii_case(value))
    }
}

/// Robot facing on the maze grid. `Turn { delta }` rotates in quarter
/// turns, positive = clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    fn index(&self) -> i32 {
        match self {
            Heading::North => 0,
            Heading::East => 1,
            Heading::South => 2,
            Heading::West => 3,
        }
    }

    pub fn rotated(&self, delta: i32) -> Heading {
        match (self.index() + delta).rem_euclid(4) {
            0 => Heading::North,
            1 => Heading::East,
            2 => Heading::South,
            _ => Heading::West,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Ally,
    Enemy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub hp: i64,
    pub max_hp: i64,
    pub team: Team,
}

impl Unit {
    pub fn enemy(hp: i64) -> Self {
        Self {
            hp,
            max_hp: hp,
            team: Team::Enemy,
        }
    }

    pub fn ally(hp: i64) -> Self {
        Self {
            hp,
            max_hp: hp,
            team: Team::Ally,
        }
    }

    pub fn is_down(&self) -> bool {
        self.hp == 0
    }
}

/// A build block placed in the 3D world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedBlock {
    pub pos: BlockPos,
    pub color: Color,
}

/// One colored cell of the pixel canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub color: Color,
}

/// One entry of a melody: a played note or a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NoteEvent {
    Note { note: Note },
    Rest { beats: u32 },
}

// ============================================================================
// Actions
// ============================================================================

/// One atomic, replayable world mutation. An action is self-contained:
/// applying it needs only the current world state, never the program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Action {
    Move { dx: i32, dy: i32 },
    Turn { delta: i32 },
    CollectStar,
    PlaceBlock { pos: BlockPos, color: Color },
    RemoveBlock { pos: BlockPos },
    SetColor { color: Color },
    Goto { pos: BlockPos },
    Swap { i: usize, j: usize },
    Attack { target_id: UnitId },
    PlayNote { note: Note },
    Rest { beats: u32 },
    Say { text: String },
    Jump,
    Scale { percent: u32 },
    Rotate { degrees: i32 },
    DrawPixel { x: u32, y: u32, color: Color },
}

/// The fieldless mirror of [`Action`], used by goal specs that talk about
/// "kinds of actions" rather than concrete arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Turn,
    CollectStar,
    PlaceBlock,
    RemoveBlock,
    SetColor,
    Goto,
    Swap,
    Attack,
    PlayNote,
    Rest,
    Say,
    Jump,
    Scale,
    Rotate,
    DrawPixel,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Move { .. } => ActionKind::Move,
            Action::Turn { .. } => ActionKind::Turn,
            Action::CollectStar => ActionKind::CollectStar,
            Action::PlaceBlock { .. } => ActionKind::PlaceBlock,
            Action::RemoveBlock { .. } => ActionKind::RemoveBlock,
            Action::SetColor { .. } => ActionKind::SetColor,
            Action::Goto { .. } => ActionKind::Goto,
            Action::Swap { .. } => ActionKind::Swap,
            Action::Attack { .. } => ActionKind::Attack,
            Action::PlayNote { .. } => ActionKind::PlayNote,
            Action::Rest { .. } => ActionKind::Rest,
            Action::Say { .. } => ActionKind::Say,
            Action::Jump => ActionKind::Jump,
            Action::Scale { .. } => ActionKind::Scale,
            Action::Rotate { .. } => ActionKind::Rotate,
            Action::DrawPixel { .. } => ActionKind::DrawPixel,
        }
    }
}

// ============================================================================
// Program Trace
// ============================================================================

/// The ordered, finite action sequence produced by one compile-and-execute
/// pass. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgramTrace {
    actions: Vec<Action>,
}

impl ProgramTrace {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    /// SHA-256 over the canonical JSON encoding of the action sequence,
    /// rendered as lowercase hex. Two traces with equal digests replay
    /// identically from the same starting world.
    pub fn digest(&self) -> String {
        // The action vocabulary is closed and map-free; JSON encoding of it
        // cannot fail.
        let encoded = serde_json::to_vec(&self.actions).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        hex::encode(hasher.finalize())
    }
}

// ============================================================================
// Action Log
// ============================================================================

/// The goal-relevant subsequence of applied actions, rebuilt during each
/// replay. For some domains this is identical to the trace, for others a
/// projection (e.g. only speech and jump events for the sprite domain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionLog {
    entries: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.entries.push(action);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Action] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_kind(&self, kind: ActionKind) -> usize {
        self.entries
            .iter()
            .filter(|action| action.kind() == kind)
            .count()
    }

    pub fn contains_kind(&self, kind: ActionKind) -> bool {
        self.entries.iter().any(|action| action.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.entries.iter().map(Action::kind).collect()
    }
}
