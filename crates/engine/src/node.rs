// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sensor graph nodes.
//!
//! Nodes are stored in a flat arena inside the graph; downstream links are
//! indices into that arena, which keeps the DAG free of owning cycles.

use crate::processors::ProcessingFn;
use crate::trigger::InputTrigger;
use serde::{Deserialize, Serialize};
use std::fmt;
use tb_core::{DataStream, DataStreamSelector};
use tb_storage::SharedWalker;

/// How a node combines its input triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCombiner {
    And,
    #[default]
    Or,
}

/// Descriptor for a node to be added to a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// `(selector, trigger)` for each input, at most `max_node_inputs`.
    pub inputs: Vec<(DataStreamSelector, InputTrigger)>,
    /// The stream this node publishes to.
    pub output: DataStream,
    /// Name of the processing function in the registry.
    pub processor: String,
    #[serde(default)]
    pub combiner: TriggerCombiner,
}

impl NodeSpec {
    pub fn new(
        inputs: Vec<(DataStreamSelector, InputTrigger)>,
        output: DataStream,
        processor: impl Into<String>,
    ) -> Self {
        NodeSpec {
            inputs,
            output,
            processor: processor.into(),
            combiner: TriggerCombiner::Or,
        }
    }

    pub fn with_combiner(mut self, combiner: TriggerCombiner) -> Self {
        self.combiner = combiner;
        self
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let comb = match self.combiner {
            TriggerCombiner::And => "&&",
            TriggerCombiner::Or => "||",
        };

        f.write_str("(")?;
        for (i, (selector, trigger)) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", comb)?;
            }
            write!(f, "{} {}", selector, trigger)?;
        }
        write!(f, ") => {} using {}", self.output, self.processor)
    }
}

/// One connected node input.
pub struct NodeInput {
    pub selector: DataStreamSelector,
    pub walker: SharedWalker,
    pub trigger: InputTrigger,
}

/// A node in the graph arena.
pub struct SgNode {
    /// The stream this node publishes to.
    pub stream: DataStream,
    pub inputs: Vec<NodeInput>,
    pub func_name: String,
    pub(crate) func: ProcessingFn,
    pub combiner: TriggerCombiner,
    /// Arena indices of downstream nodes triggered by our output.
    pub outputs: Vec<usize>,
    max_outputs: usize,
}

impl SgNode {
    pub(crate) fn new(
        stream: DataStream,
        func_name: String,
        func: ProcessingFn,
        combiner: TriggerCombiner,
        max_outputs: usize,
    ) -> Self {
        SgNode {
            stream,
            inputs: Vec::new(),
            func_name,
            func,
            combiner,
            outputs: Vec::new(),
            max_outputs,
        }
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn free_outputs(&self) -> usize {
        self.max_outputs - self.outputs.len()
    }

    /// Connect a downstream node, bounded by the device model.
    pub(crate) fn connect_output(&mut self, index: usize) -> Result<(), crate::EngineError> {
        if self.outputs.len() >= self.max_outputs {
            return Err(crate::EngineError::TooManyOutputs(self.stream));
        }

        self.outputs.push(index);
        Ok(())
    }

    /// Evaluate the input triggers under the configured combiner.
    pub fn triggered(&self) -> bool {
        let mut any = false;
        for input in &self.inputs {
            let fired = input.trigger.triggered(&input.walker.lock());

            match self.combiner {
                TriggerCombiner::Or if fired => return true,
                TriggerCombiner::And if !fired => return false,
                _ => {}
            }
            any = true;
        }

        match self.combiner {
            TriggerCombiner::Or => false,
            // A node with no inputs never fires
            TriggerCombiner::And => any,
        }
    }

    /// The descriptor this node was built from.
    pub fn spec(&self) -> NodeSpec {
        NodeSpec {
            inputs: self
                .inputs
                .iter()
                .map(|input| (input.selector, input.trigger))
                .collect(),
            output: self.stream,
            processor: self.func_name.clone(),
            combiner: self.combiner,
        }
    }
}

// Rendering goes through the spec so nodes and descriptors format the same
impl fmt::Display for SgNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec())
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
