//! Capability registry and the trace-recording primitive implementation.
//!
//! The registry is an explicit, process-scoped object constructed once at
//! startup and passed by reference. The [`TraceRecorder`] is the only way a
//! program can affect the world: every primitive either appends exactly one
//! action to the trace under construction or rejects its arguments with a
//! typed error.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use super::types::{
    Action, BlockPos, Color, Domain, Note, ProgramTrace, UnitId, MAX_TRACE_ACTIONS,
};
use super::world::WorldState;

// ============================================================================
// Capability Descriptors
// ============================================================================

/// Parameter shape of a primitive, checked by the block compiler before a
/// program ever executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Text,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Int => "int",
            ParamKind::Text => "text",
        }
    }
}

/// One named primitive a program may call in a given domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub params: &'static [ParamKind],
    pub summary: &'static str,
}

const INT: ParamKind = ParamKind::Int;
const TEXT: ParamKind = ParamKind::Text;

const MAZE_CAPABILITIES: &[Capability] = &[
    Capability {
        name: "move",
        params: &[INT, INT],
        summary: "move the robot by (dx, dy), one cell per axis",
    },
    Capability {
        name: "turn",
        params: &[INT],
        summary: "rotate the robot by quarter turns, positive = clockwise",
    },
    Capability {
        name: "collect_star",
        params: &[],
        summary: "collect the star on the current cell, if any",
    },
];

const BUILDER_CAPABILITIES: &[Capability] = &[
    Capability {
        name: "place_block",
        params: &[INT, INT, INT, TEXT],
        summary: "place a block of the given color at (x, y, z)",
    },
    Capability {
        name: "remove_block",
        params: &[INT, INT, INT],
        summary: "remove the block at (x, y, z), if any",
    },
    Capability {
        name: "set_color",
        params: &[TEXT],
        summary: "select the current build color",
    },
    Capability {
        name: "goto",
        params: &[INT, INT, INT],
        summary: "move the build cursor to (x, y, z)",
    },
];

const POTIONS_CAPABILITIES: &[Capability] = &[Capability {
    name: "swap",
    params: &[INT, INT],
    summary: "swap the potions at indices i and j",
}];

const COMBAT_CAPABILITIES: &[Capability] = &[Capability {
    name: "attack",
    params: &[TEXT],
    summary: "attack the unit with the given id",
}];

const MUSIC_CAPABILITIES: &[Capability] = &[
    Capability {
        name: "play_note",
        params: &[TEXT],
        summary: "play one named note (C4..C5)",
    },
    Capability {
        name: "rest",
        params: &[INT],
        summary: "rest for the given number of beats (1..=16)",
    },
];

const SPRITE_CAPABILITIES: &[Capability] = &[
    Capability {
        name: "say",
        params: &[TEXT],
        summary: "show a speech bubble with the given text",
    },
    Capability {
        name: "jump",
        params: &[],
        summary: "play the jump animation",
    },
    Capability {
        name: "scale",
        params: &[INT],
        summary: "set the sprite scale in percent (10..=400)",
    },
    Capability {
        name: "rotate",
        params: &[INT],
        summary: "rotate the sprite by signed degrees",
    },
    Capability {
        name: "move",
        params: &[INT, INT],
        summary: "shift the sprite by (dx, dy) pixels",
    },
];

const CANVAS_CAPABILITIES: &[Capability] = &[Capability {
    name: "draw_pixel",
    params: &[INT, INT, TEXT],
    summary: "color the pixel at (x, y)",
}];

// ============================================================================
// Registry
// ============================================================================

/// The per-domain primitive tables. Built once via
/// [`CapabilityRegistry::standard`] and shared by reference; the engine has
/// no other registration mechanism.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    tables: BTreeMap<Domain, &'static [Capability]>,
}

impl CapabilityRegistry {
    pub fn standard() -> Self {
        let mut tables: BTreeMap<Domain, &'static [Capability]> = BTreeMap::new();
        tables.insert(Domain::Maze, MAZE_CAPABILITIES);
        tables.insert(Domain::Builder, BUILDER_CAPABILITIES);
        tables.insert(Domain::Potions, POTIONS_CAPABILITIES);
        tables.insert(Domain::Combat, COMBAT_CAPABILITIES);
        tables.insert(Domain::Music, MUSIC_CAPABILITIES);
        tables.insert(Domain::Sprite, SPRITE_CAPABILITIES);
        tables.insert(Domain::Canvas, CANVAS_CAPABILITIES);
        Self { tables }
    }

    pub fn domain_capabilities(&self, domain: Domain) -> &'static [Capability] {
        self.tables.get(&domain).copied().unwrap_or(&[])
    }

    pub fn lookup(&self, domain: Domain, name: &str) -> Option<&'static Capability> {
        self.domain_capabilities(domain)
            .iter()
            .find(|capability| capability.name == name)
    }

    /// Check that every name in a level's allowed-capability subset exists
    /// in the domain's table. Called at level load.
    pub fn validate_subset(&self, domain: Domain, names: &[String]) -> Result<(), CapabilityError> {
        for name in names {
            if self.lookup(domain, name).is_none() {
                return Err(CapabilityError::UnknownCapability {
                    domain,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    UnknownCapability { domain: Domain, name: String },
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityError::UnknownCapability { domain, name } => {
                write!(f, "unknown capability in {} domain: {name}", domain.as_str())
            }
        }
    }
}

impl Error for CapabilityError {}

// ============================================================================
// Call Arguments
// ============================================================================

/// A literal argument to a primitive call. Block value slots and parsed
/// remote action-event tokens both reduce to this.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Int(i64),
    Text(String),
}

impl CallArg {
    pub fn kind(&self) -> ParamKind {
        match self {
            CallArg::Int(_) => ParamKind::Int,
            CallArg::Text(_) => ParamKind::Text,
        }
    }
}

// ============================================================================
// Trace Recorder
// ============================================================================

/// Trace-recording implementation of the capability registry: primitives
/// append actions instead of mutating anything. The recorder may read the
/// level's starting world to validate arguments but never writes it.
#[derive(Debug)]
pub struct TraceRecorder<'a> {
    start: &'a WorldState,
    actions: Vec<Action>,
}

impl<'a> TraceRecorder<'a> {
    pub fn new(start: &'a WorldState) -> Self {
        Self {
            start,
            actions: Vec::new(),
        }
    }

    pub fn domain(&self) -> Domain {
        self.start.domain()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Snapshot of the actions captured so far. Used to surface the partial
    /// trace when a program fails mid-run.
    pub fn partial(&self) -> ProgramTrace {
        ProgramTrace::new(self.actions.clone())
    }

    pub fn finish(self) -> ProgramTrace {
        ProgramTrace::new(self.actions)
    }

    fn push(&mut self, action: Action) -> Result<(), RecordError> {
        if self.actions.len() >= MAX_TRACE_ACTIONS {
            return Err(RecordError::TraceBudgetExceeded {
                limit: MAX_TRACE_ACTIONS,
            });
        }
        self.actions.push(action);
        Ok(())
    }

    /// Dynamic dispatch by primitive name, used by the execution back ends.
    /// The capability table defines arity and argument kinds; range and
    /// vocabulary checks happen in the typed `record_*` methods.
    pub fn call(&mut self, name: &str, args: &[CallArg]) -> Result<(), RecordError> {
        let domain = self.domain();
        match (domain, name) {
            (Domain::Maze, "move") | (Domain::Sprite, "move") => {
                let (dx, dy) = (self.int_arg(name, args, 0)?, self.int_arg(name, args, 1)?);
                self.record_move(dx, dy)
            }
            (Domain::Maze, "turn") => {
                let delta = self.int_arg(name, args, 0)?;
                self.record_turn(delta)
            }
            (Domain::Maze, "collect_star") => self.record_collect_star(),
            (Domain::Builder, "place_block") => {
                let pos = self.block_pos_args(name, args)?;
                let color = self.color_arg(name, args, 3)?;
                self.record_place_block(pos, color)
            }
            (Domain::Builder, "remove_block") => {
                let pos = self.block_pos_args(name, args)?;
                self.record_remove_block(pos)
            }
            (Domain::Builder, "set_color") => {
                let color = self.color_arg(name, args, 0)?;
                self.record_set_color(color)
            }
            (Domain::Builder, "goto") => {
                let pos = self.block_pos_args(name, args)?;
                self.record_goto(pos)
            }
            (Domain::Potions, "swap") => {
                let (i, j) = (self.int_arg(name, args, 0)?, self.int_arg(name, args, 1)?);
                self.record_swap(i, j)
            }
            (Domain::Combat, "attack") => {
                let target = self.text_arg(name, args, 0)?;
                self.record_attack(target)
            }
            (Domain::Music, "play_note") => {
                let note = self.note_arg(name, args, 0)?;
                self.record_play_note(note)
            }
            (Domain::Music, "rest") => {
                let beats = self.int_arg(name, args, 0)?;
                self.record_rest(beats)
            }
            (Domain::Sprite, "say") => {
                let text = self.text_arg(name, args, 0)?;
                self.record_say(text)
            }
            (Domain::Sprite, "jump") => self.record_jump(),
            (Domain::Sprite, "scale") => {
                let percent = self.int_arg(name, args, 0)?;
                self.record_scale(percent)
            }
            (Domain::Sprite, "rotate") => {
                let degrees = self.int_arg(name, args, 0)?;
                self.record_rotate(degrees)
            }
            (Domain::Canvas, "draw_pixel") => {
                let (x, y) = (self.int_arg(name, args, 0)?, self.int_arg(name, args, 1)?);
                let color = self.color_arg(name, args, 2)?;
                self.record_draw_pixel(x, y, color)
            }
            _ => Err(RecordError::UnknownPrimitive {
                domain,
                name: name.to_string(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Typed primitives
    // -------------------------------------------------------------------------

    pub fn record_move(&mut self, dx: i64, dy: i64) -> Result<(), RecordError> {
        if dx.abs() > 1 || dy.abs() > 1 || (dx == 0 && dy == 0) {
            return Err(RecordError::MoveStepOutOfRange { dx, dy });
        }
        self.push(Action::Move {
            dx: dx as i32,
            dy: dy as i32,
        })
    }

    pub fn record_turn(&mut self, delta: i64) -> Result<(), RecordError> {
        if delta == 0 || delta.abs() > 3 {
            return Err(RecordError::TurnOutOfRange { delta });
        }
        self.push(Action::Turn {
            delta: delta as i32,
        })
    }

    pub fn record_collect_star(&mut self) -> Result<(), RecordError> {
        self.push(Action::CollectStar)
    }

    pub fn record_place_block(&mut self, pos: BlockPos, color: Color) -> Result<(), RecordError> {
        self.push(Action::PlaceBlock { pos, color })
    }

    pub fn record_remove_block(&mut self, pos: BlockPos) -> Result<(), RecordError> {
        self.push(Action::RemoveBlock { pos })
    }

    pub fn record_set_color(&mut self, color: Color) -> Result<(), RecordError> {
        self.push(Action::SetColor { color })
    }

    pub fn record_goto(&mut self, pos: BlockPos) -> Result<(), RecordError> {
        self.push(Action::Goto { pos })
    }

    pub fn record_swap(&mut self, i: i64, j: i64) -> Result<(), RecordError> {
        let len = match self.start {
            WorldState::Potions { potions, .. } => potions.len(),
            _ => 0,
        };
        // Swaps never change the array length, so the starting length is
        // valid for every later swap in the same program.
        for index in [i, j] {
            if index < 0 || index as usize >= len {
                return Err(RecordError::SwapIndexOutOfRange { index, len });
            }
        }
        self.push(Action::Swap {
            i: i as usize,
            j: j as usize,
        })
    }

    pub fn record_attack(&mut self, target_id: UnitId) -> Result<(), RecordError> {
        let known = match self.start {
            WorldState::Combat { units, .. } => units.contains_key(&target_id),
            _ => false,
        };
        if !known {
            return Err(RecordError::UnknownTarget { target_id });
        }
        self.push(Action::Attack { target_id })
    }

    pub fn record_play_note(&mut self, note: Note) -> Result<(), RecordError> {
        self.push(Action::PlayNote { note })
    }

    pub fn record_rest(&mut self, beats: i64) -> Result<(), RecordError> {
        if !(1..=16).contains(&beats) {
            return Err(RecordError::BeatsOutOfRange { beats });
        }
        self.push(Action::Rest {
            beats: beats as u32,
        })
    }

    pub fn record_say(&mut self, text: String) -> Result<(), RecordError> {
        self.push(Action::Say { text })
    }

    pub fn record_jump(&mut self) -> Result<(), RecordError> {
        self.push(Action::Jump)
    }

    pub fn record_scale(&mut self, percent: i64) -> Result<(), RecordError> {
        if !(10..=400).contains(&percent) {
            return Err(RecordError::ScaleOutOfRange { percent });
        }
        self.push(Action::Scale {
            percent: percent as u32,
        })
    }

    pub fn record_rotate(&mut self, degrees: i64) -> Result<(), RecordError> {
        if !(-3600..=3600).contains(&degrees) {
            return Err(RecordError::RotationOutOfRange { degrees });
        }
        self.push(Action::Rotate {
            degrees: degrees as i32,
        })
    }

    pub fn record_draw_pixel(&mut self, x: i64, y: i64, color: Color) -> Result<(), RecordError> {
        let (width, height) = match self.start {
            WorldState::Canvas { width, height, .. } => (*width, *height),
            _ => (0, 0),
        };
        if x < 0 || y < 0 || x as u64 >= width as u64 || y as u64 >= height as u64 {
            return Err(RecordError::PixelOutOfBounds {
                x,
                y,
                width,
                height,
            });
        }
        self.push(Action::DrawPixel {
            x: x as u32,
            y: y as u32,
            color,
        })
    }

    // -------------------------------------------------------------------------
    // Argument coercion
    // -------------------------------------------------------------------------

    fn arg<'b>(
        &self,
        primitive: &str,
        args: &'b [CallArg],
        index: usize,
    ) -> Result<&'b CallArg, RecordError> {
        args.get(index).ok_or_else(|| RecordError::ArityMismatch {
            primitive: primitive.to_string(),
            expected: index + 1,
            found: args.len(),
        })
    }

    fn int_arg(&self, primitive: &str, args: &[CallArg], index: usize) -> Result<i64, RecordError> {
        match self.arg(primitive, args, index)? {
            CallArg::Int(value) => Ok(*value),
            CallArg::Text(_) => Err(RecordError::TypeMismatch {
                primitive: primitive.to_string(),
                param: index,
                expected: ParamKind::Int,
            }),
        }
    }

    fn text_arg(
        &self,
        primitive: &str,
        args: &[CallArg],
        index: usize,
    ) -> Result<String, RecordError> {
        match self.arg(primitive, args, index)? {
            CallArg::Text(value) => Ok(value.clone()),
            CallArg::Int(_) => Err(RecordError::TypeMismatch {
                primitive: primitive.to_string(),
                param: index,
                expected: ParamKind::Text,
            }),
        }
    }

    fn color_arg(
        &self,
        primitive: &str,
        args: &[CallArg],
        index: usize,
    ) -> Result<Color, RecordError> {
        let value = self.text_arg(primitive, args, index)?;
        Color::parse(&value).ok_or(RecordError::UnknownColor { value })
    }

    fn note_arg(
        &self,
        primitive: &str,
        args: &[CallArg],
        index: usize,
    ) -> Result<Note, RecordError> {
        let value = self.text_arg(primitive, args, index)?;
        Note::parse(&value).ok_or(RecordError::UnknownNote { value })
    }

    fn block_pos_args(&self, primitive: &str, args: &[CallArg]) -> Result<BlockPos, RecordError> {
        let x = self.int_arg(primitive, args, 0)?;
        let y = self.int_arg(primitive, args, 1)?;
        let z = self.int_arg(primitive, args, 2)?;
        Ok(BlockPos::new(x as i32, y as i32, z as i32))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    UnknownPrimitive { domain: Domain, name: String },
    ArityMismatch { primitive: String, expected: usize, found: usize },
    TypeMismatch { primitive: String, param: usize, expected: ParamKind },
    MoveStepOutOfRange { dx: i64, dy: i64 },
    TurnOutOfRange { delta: i64 },
    SwapIndexOutOfRange { index: i64, len: usize },
    UnknownTarget { target_id: UnitId },
    BeatsOutOfRange { beats: i64 },
    ScaleOutOfRange { percent: i64 },
    RotationOutOfRange { degrees: i64 },
    PixelOutOfBounds { x: i64, y: i64, width: u32, height: u32 },
    UnknownColor { value: String },
    UnknownNote { value: String },
    TraceBudgetExceeded { limit: usize },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::UnknownPrimitive { domain, name } => {
                write!(f, "unknown primitive in {} domain: {name}", domain.as_str())
            }
            RecordError::ArityMismatch {
                primitive,
                expected,
                found,
            } => write!(
                f,
                "{primitive} expects at least {expected} argument(s), found {found}"
            ),
            RecordError::TypeMismatch {
                primitive,
                param,
                expected,
            } => write!(
                f,
                "{primitive} argument {param} must be {}",
                expected.as_str()
            ),
            RecordError::MoveStepOutOfRange { dx, dy } => {
                write!(f, "move step ({dx}, {dy}) must be one cell on at least one axis")
            }
            RecordError::TurnOutOfRange { delta } => {
                write!(f, "turn delta {delta} must be within -3..=3 quarter turns and nonzero")
            }
            RecordError::SwapIndexOutOfRange { index, len } => {
                write!(f, "swap index {index} out of range for array of length {len}")
            }
            RecordError::UnknownTarget { target_id } => write!(f, "unknown target: {target_id}"),
            RecordError::BeatsOutOfRange { beats } => {
                write!(f, "rest beats {beats} must be within 1..=16")
            }
            RecordError::ScaleOutOfRange { percent } => {
                write!(f, "scale percent {percent} must be within 10..=400")
            }
            RecordError::RotationOutOfRange { degrees } => {
                write!(f, "rotation {degrees} must be within -3600..=3600 degrees")
            }
            RecordError::PixelOutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(f, "pixel ({x}, {y}) outside canvas {width}x{height}"),
            RecordError::UnknownColor { value } => write!(f, "unknown color: {value}"),
            RecordError::UnknownNote { value } => write!(f, "unknown note: {value}"),
            RecordError::TraceBudgetExceeded { limit } => {
                write!(f, "program produced more than {limit} actions")
            }
        }
    }
}

impl Error for RecordError {}
