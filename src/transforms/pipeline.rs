//! Transform Pipeline
//!
//! Wires transforms to named channels of a [`PlotDataMap`] and runs them in
//! dependency order. Wiring errors (unknown transform, wrong arity, two
//! producers for one channel, cycles) are reported when the pipeline is
//! built, never while data flows.

use super::function::TransformFunction;
use super::registry::TransformFactory;
use super::types::{TransformError, TransformResult};
use crate::series::{DataError, PlotData, PlotDataMap, SeriesKind};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One transform instance and the channels it reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Registry name, e.g. `"moving_average"`
    pub transform: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub params: Value,
}

impl TransformSpec {
    pub fn new(
        transform: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            transform: transform.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

struct PipelineNode {
    spec: TransformSpec,
    transform: Box<dyn TransformFunction>,
}

/// Ordered set of configured transforms
pub struct TransformPipeline {
    nodes: Vec<PipelineNode>,
    /// Indices into `nodes` in topological order
    order: Vec<usize>,
}

impl TransformPipeline {
    /// A pipeline with no transforms
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn build(factory: &TransformFactory, specs: &[TransformSpec]) -> TransformResult<Self> {
        let mut nodes = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut transform = factory.create(&spec.transform)?;
            transform.configure(&spec.params)?;

            if spec.inputs.len() != transform.num_inputs() {
                return Err(TransformError::InputArity {
                    name: spec.transform.clone(),
                    expected: transform.num_inputs(),
                    actual: spec.inputs.len(),
                });
            }
            if spec.outputs.len() != transform.num_outputs() {
                return Err(TransformError::OutputArity {
                    name: spec.transform.clone(),
                    expected: transform.num_outputs(),
                    actual: spec.outputs.len(),
                });
            }
            nodes.push(PipelineNode {
                spec: spec.clone(),
                transform,
            });
        }

        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (index, node) in nodes.iter().enumerate() {
            for output in &node.spec.outputs {
                if producers.insert(output.as_str(), index).is_some() {
                    return Err(TransformError::DuplicateOutput(output.clone()));
                }
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
        for (consumer, node) in nodes.iter().enumerate() {
            for input in &node.spec.inputs {
                if let Some(&producer) = producers.get(input.as_str()) {
                    graph.add_edge(indices[producer], indices[consumer], ());
                }
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| {
                let node = &nodes[graph[cycle.node_id()]];
                TransformError::Cycle(node.spec.outputs.join(", "))
            })?
            .into_iter()
            .map(|index| graph[index])
            .collect();

        log::info!("Built transform pipeline with {} transforms", nodes.len());
        Ok(Self { nodes, order })
    }

    /// Check that every wired channel that already exists in `map` is numeric
    pub fn validate_against(&self, map: &PlotDataMap) -> TransformResult<()> {
        for node in &self.nodes {
            for name in node.spec.inputs.iter().chain(&node.spec.outputs) {
                if let Some(kind) = map.kind_of(name) {
                    if kind != SeriesKind::Numeric {
                        return Err(DataError::KindConflict {
                            name: name.clone(),
                            existing: kind,
                            requested: SeriesKind::Numeric,
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Run every transform once, in dependency order.
    ///
    /// A transform whose inputs do not exist yet is skipped. Returns the
    /// number of samples appended across all outputs.
    pub fn calculate(&mut self, map: &mut PlotDataMap) -> usize {
        let mut produced = 0;
        for &index in &self.order {
            let node = &mut self.nodes[index];
            match run_node(node, map) {
                Ok(count) => produced += count,
                Err(e) => log::warn!("Transform '{}' skipped: {}", node.spec.transform, e),
            }
        }
        produced
    }

    /// Reset every transform and clear the channels they produced
    pub fn reset(&mut self, map: &mut PlotDataMap) {
        for node in &mut self.nodes {
            node.transform.reset();
            for output in &node.spec.outputs {
                if let Some(series) = map.numeric_mut(output) {
                    series.clear();
                }
            }
        }
    }

    /// Reset the transforms that read any of `channels`, directly or through
    /// another transform, and clear their outputs.
    ///
    /// Returns the number of transforms reset.
    pub fn reset_consumers_of(&mut self, channels: &[String], map: &mut PlotDataMap) -> usize {
        let mut affected: HashSet<String> = channels.iter().cloned().collect();
        let mut count = 0;
        for &index in &self.order {
            let node = &mut self.nodes[index];
            if !node.spec.inputs.iter().any(|input| affected.contains(input)) {
                continue;
            }
            node.transform.reset();
            for output in &node.spec.outputs {
                if let Some(series) = map.numeric_mut(output) {
                    series.clear();
                }
                affected.insert(output.clone());
            }
            count += 1;
        }
        count
    }

    /// Names of all channels written by this pipeline
    pub fn output_channels(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .flat_map(|node| node.spec.outputs.iter().map(String::as_str))
            .collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &TransformSpec> {
        self.nodes.iter().map(|node| &node.spec)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("specs", &self.specs().collect::<Vec<_>>())
            .field("order", &self.order)
            .finish()
    }
}

fn run_node(node: &mut PipelineNode, map: &mut PlotDataMap) -> TransformResult<usize> {
    if let Some(missing) = node.spec.inputs.iter().find(|name| map.numeric(name).is_none()) {
        log::debug!(
            "Transform '{}' waiting for input '{}'",
            node.spec.transform,
            missing
        );
        return Ok(0);
    }

    // Detach the outputs so the inputs can stay borrowed from the map
    let mut outputs: Vec<PlotData> = Vec::with_capacity(node.spec.outputs.len());
    for name in &node.spec.outputs {
        map.get_or_create_numeric(name, None)?;
        if let Some(series) = map.take_numeric(name) {
            outputs.push(series);
        }
    }
    let before: usize = outputs.iter().map(PlotData::len).sum();

    {
        let inputs: Vec<&PlotData> = node
            .spec
            .inputs
            .iter()
            .filter_map(|name| map.numeric(name))
            .collect();
        node.transform.calculate(&inputs, &mut outputs);
    }

    let after: usize = outputs.iter().map(PlotData::len).sum();
    for series in outputs {
        map.insert_numeric(series)?;
    }
    Ok(after.saturating_sub(before))
}
