// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Input triggers for graph nodes.
//!
//! A node input triggers either unconditionally, never (for unconnected
//! inputs), or by comparing the walker's reading count or latest value
//! against a reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use tb_storage::StreamWalker;

/// What a comparison trigger reads from the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// The number of readings available.
    Count,
    /// The value of the oldest available reading.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn apply(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A triggering condition for one node input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "trigger")]
pub enum InputTrigger {
    Always,
    Never,
    Compare {
        source: TriggerSource,
        op: CompareOp,
        reference: i64,
    },
}

impl InputTrigger {
    /// Shorthand for `count <op> reference`.
    pub fn count(op: CompareOp, reference: i64) -> Self {
        InputTrigger::Compare {
            source: TriggerSource::Count,
            op,
            reference,
        }
    }

    /// Shorthand for `value <op> reference`.
    pub fn value(op: CompareOp, reference: i64) -> Self {
        InputTrigger::Compare {
            source: TriggerSource::Value,
            op,
            reference,
        }
    }

    /// Evaluate this trigger against a walker.
    ///
    /// Value comparisons require at least one available reading; an empty
    /// walker never triggers on value.
    pub fn triggered(&self, walker: &StreamWalker) -> bool {
        match self {
            InputTrigger::Always => true,
            InputTrigger::Never => false,
            InputTrigger::Compare {
                source,
                op,
                reference,
            } => {
                let observed = match source {
                    TriggerSource::Count => walker.count() as i64,
                    TriggerSource::Value => {
                        if walker.count() == 0 {
                            return false;
                        }
                        match walker.peek() {
                            Ok(reading) => reading.value as i64,
                            Err(_) => return false,
                        }
                    }
                };

                op.apply(observed, *reference)
            }
        }
    }
}

impl fmt::Display for InputTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputTrigger::Always => f.write_str("always"),
            InputTrigger::Never => f.write_str("never"),
            InputTrigger::Compare {
                source,
                op,
                reference,
            } => {
                let source = match source {
                    TriggerSource::Count => "count",
                    TriggerSource::Value => "value",
                };
                write!(f, "when {} {} {}", source, op.symbol(), reference)
            }
        }
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
