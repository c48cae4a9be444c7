//! Block front end: serializes an authored block tree into an ordered
//! primitive-call sequence.
//!
//! Pure syntax-directed translation: sequence blocks emit calls in order, a
//! repeat block emits N copies of its body, value slots are literals. No
//! network, no evaluation of learner-supplied expressions.

use serde::{Deserialize, Serialize};

use super::capability::{CallArg, CapabilityRegistry};
use super::diagnostic::Diagnostic;
use super::types::{Domain, MAX_REPEAT_COUNT, MAX_TRACE_ACTIONS};

// ============================================================================
// Block Tree
// ============================================================================

/// The authored block tree as produced by the visual editor. The engine
/// treats this as an already-validated document and only re-checks what it
/// needs: primitive names, arity, and expansion bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BlockNode {
    Sequence {
        body: Vec<BlockNode>,
    },
    Repeat {
        count: u32,
        body: Vec<BlockNode>,
    },
    Call {
        primitive: String,
        #[serde(default)]
        args: Vec<BlockValue>,
    },
}

/// A literal value slot on a call block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockValue {
    Int(i64),
    Text(String),
}

impl BlockValue {
    fn to_call_arg(&self) -> CallArg {
        match self {
            BlockValue::Int(value) => CallArg::Int(*value),
            BlockValue::Text(value) => CallArg::Text(value.clone()),
        }
    }
}

// ============================================================================
// Compiled Program
// ============================================================================

/// One primitive invocation with literal arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveCall {
    pub primitive: String,
    pub args: Vec<CallArg>,
}

/// The block front end's output: an ordered call sequence ready for the
/// local execution back end.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub domain: Domain,
    pub calls: Vec<PrimitiveCall>,
}

impl CompiledProgram {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile an authored block tree into an ordered primitive-call sequence.
///
/// Failure modes are all compile diagnostics: unknown primitive, wrong
/// arity, wrong literal kind, zero or oversized repeat counts, and programs
/// that would expand past the action budget. The offending block's path in
/// the tree (e.g. `root.2.body.0`) is reported in the message.
pub fn compile_blocks(
    root: &BlockNode,
    domain: Domain,
    registry: &CapabilityRegistry,
) -> Result<CompiledProgram, Diagnostic> {
    let mut calls = Vec::new();
    expand(root, domain, registry, &mut String::from("root"), &mut calls)?;
    Ok(CompiledProgram { domain, calls })
}

fn expand(
    node: &BlockNode,
    domain: Domain,
    registry: &CapabilityRegistry,
    path: &mut String,
    out: &mut Vec<PrimitiveCall>,
) -> Result<(), Diagnostic> {
    match node {
        BlockNode::Sequence { body } => expand_body(body, domain, registry, path, out),
        BlockNode::Repeat { count, body } => {
            if *count == 0 {
                return Err(Diagnostic::compile(format!(
                    "repeat count must be positive at {path}"
                )));
            }
            if *count > MAX_REPEAT_COUNT {
                return Err(Diagnostic::compile(format!(
                    "repeat count {count} exceeds the limit of {MAX_REPEAT_COUNT} at {path}"
                )));
            }
            for _ in 0..*count {
                expand_body(body, domain, registry, path, out)?;
            }
            Ok(())
        }
        BlockNode::Call { primitive, args } => {
            let Some(capability) = registry.lookup(domain, primitive) else {
                return Err(Diagnostic::compile(format!(
                    "unknown primitive '{primitive}' in {} domain at {path}",
                    domain.as_str()
                )));
            };
            if args.len() != capability.params.len() {
                return Err(Diagnostic::compile(format!(
                    "{primitive} expects {} argument(s), found {} at {path}",
                    capability.params.len(),
                    args.len()
                )));
            }
            let args: Vec<CallArg> = args.iter().map(BlockValue::to_call_arg).collect();
            for (index, (arg, expected)) in args.iter().zip(capability.params).enumerate() {
                if arg.kind() != *expected {
                    return Err(Diagnostic::compile(format!(
                        "{primitive} argument {index} must be {} at {path}",
                        expected.as_str()
                    )));
                }
            }
            if out.len() >= MAX_TRACE_ACTIONS {
                return Err(Diagnostic::compile(format!(
                    "program expands past the limit of {MAX_TRACE_ACTIONS} calls"
                )));
            }
            out.push(PrimitiveCall {
                primitive: primitive.clone(),
                args,
            });
            Ok(())
        }
    }
}

fn expand_body(
    body: &[BlockNode],
    domain: Domain,
    registry: &CapabilityRegistry,
    path: &mut String,
    out: &mut Vec<PrimitiveCall>,
) -> Result<(), Diagnostic> {
    for (index, child) in body.iter().enumerate() {
        let saved = path.len();
        path.push('.');
        path.push_str(&index.to_string());
        let result = expand(child, domain, registry, path, out);
        path.truncate(saved);
        result?;
    }
    Ok(())
}
