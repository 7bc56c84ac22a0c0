//! Phenotype network construction and forward evaluation.
//!
//! [`Network::from_genome`] compiles a genome into an evaluation-ready form:
//! incoming adjacency is precomputed in CSR layout (contiguous memory, one
//! allocation per buffer, never rebuilt per evaluation) and nodes are placed
//! in topological order via Kahn's algorithm over enabled connections. A
//! genome with cycles (possible only when recurrent connections are allowed)
//! falls back to a fixed type-based order — inputs, hidden, outputs — rather
//! than failing; activations then carry one step of recurrent state between
//! calls until [`Network::reset`].

use std::collections::VecDeque;

use crate::gene::{NodeKey, NodeType};
use crate::genome::Genome;

/// A forward-evaluable computation graph built from a genome.
#[derive(Debug, Clone)]
pub struct Network {
    /// Cached node activations, indexed densely.
    activations: Vec<f32>,
    /// Node biases, parallel to `activations`.
    biases: Vec<f32>,
    /// CSR: offsets into `csr_sources`/`csr_weights` per node (len = nodes + 1).
    csr_offsets: Vec<usize>,
    /// CSR: source node indices of incoming enabled connections.
    csr_sources: Vec<usize>,
    /// CSR: weights, parallel to `csr_sources`.
    csr_weights: Vec<f32>,
    /// Dense indices of input nodes, in genome input order.
    input_indices: Vec<usize>,
    /// Dense indices of output nodes, in genome output order.
    output_indices: Vec<usize>,
    /// Dense index of the bias node, if present.
    bias_index: Option<usize>,
    /// Non-input nodes in evaluation order.
    eval_order: Vec<usize>,
    /// Preallocated output buffer returned by `forward`.
    outputs: Vec<f32>,
}

impl Network {
    /// Compile a genome into a network.
    ///
    /// Never fails: cyclic genomes get the documented type-order fallback.
    #[must_use]
    pub fn from_genome(genome: &Genome) -> Self {
        // Dense indexing in node-id order for deterministic summation.
        let mut entries: Vec<(NodeKey, u32)> = genome
            .nodes
            .iter()
            .map(|(key, node)| (key, node.id))
            .collect();
        entries.sort_unstable_by_key(|(_, id)| *id);

        let node_count = entries.len();
        let mut key_to_idx: std::collections::HashMap<NodeKey, usize> =
            std::collections::HashMap::with_capacity(node_count);
        for (idx, (key, _)) in entries.iter().enumerate() {
            key_to_idx.insert(*key, idx);
        }

        let mut biases = vec![0.0f32; node_count];
        for (key, _) in &entries {
            biases[key_to_idx[key]] = genome.nodes[*key].bias;
        }

        // Enabled connections sorted by innovation, as (source_idx, target_idx, weight).
        let mut edges: Vec<(usize, usize, f32, u64)> = genome
            .connections
            .values()
            .filter(|c| c.enabled)
            .map(|c| {
                (
                    key_to_idx[&c.source],
                    key_to_idx[&c.target],
                    c.weight,
                    c.innovation,
                )
            })
            .collect();
        edges.sort_unstable_by_key(|(_, _, _, innovation)| *innovation);

        // Incoming CSR.
        let mut counts = vec![0usize; node_count];
        for &(_, target, _, _) in &edges {
            counts[target] += 1;
        }
        let mut csr_offsets = Vec::with_capacity(node_count + 1);
        csr_offsets.push(0usize);
        for &count in &counts {
            csr_offsets.push(csr_offsets.last().copied().unwrap_or(0) + count);
        }
        let total = *csr_offsets.last().unwrap_or(&0);
        let mut csr_sources = vec![0usize; total];
        let mut csr_weights = vec![0.0f32; total];
        let mut write_pos = csr_offsets[..node_count].to_vec();
        for &(source, target, weight, _) in &edges {
            let pos = write_pos[target];
            csr_sources[pos] = source;
            csr_weights[pos] = weight;
            write_pos[target] += 1;
        }

        let order = kahn_order(node_count, &edges).unwrap_or_else(|| {
            // Cycle: fixed type-based order, inputs then hidden then outputs.
            let mut fallback: Vec<usize> = (0..node_count).collect();
            fallback.sort_by_key(|&idx| {
                let (key, _) = entries[idx];
                match genome.nodes[key].node_type {
                    NodeType::Input | NodeType::Bias => 0u8,
                    NodeType::Hidden => 1,
                    NodeType::Output => 2,
                }
            });
            fallback
        });

        let is_source_node = |idx: usize| {
            let (key, _) = entries[idx];
            matches!(
                genome.nodes[key].node_type,
                NodeType::Input | NodeType::Bias
            )
        };
        let eval_order: Vec<usize> = order.into_iter().filter(|&i| !is_source_node(i)).collect();

        let input_indices: Vec<usize> = genome
            .input_keys
            .iter()
            .filter_map(|key| key_to_idx.get(key).copied())
            .collect();
        let output_indices: Vec<usize> = genome
            .output_keys
            .iter()
            .filter_map(|key| key_to_idx.get(key).copied())
            .collect();
        let bias_index = genome
            .bias_key
            .and_then(|key| key_to_idx.get(&key).copied());

        let outputs = vec![0.0; output_indices.len()];

        Self {
            activations: vec![0.0; node_count],
            biases,
            csr_offsets,
            csr_sources,
            csr_weights,
            input_indices,
            output_indices,
            bias_index,
            eval_order,
            outputs,
        }
    }

    /// Run one forward pass.
    ///
    /// Input node activations are taken directly from `inputs` (no activation
    /// function), zero-padded if the vector is short; extra values are
    /// ignored. Every other node computes `tanh(bias + Σ incoming·weight)` in
    /// evaluation order. Returns the output activations in genome-defined
    /// output order, from a preallocated buffer.
    pub fn forward(&mut self, inputs: &[f32]) -> &[f32] {
        for (i, &idx) in self.input_indices.iter().enumerate() {
            self.activations[idx] = inputs.get(i).copied().unwrap_or(0.0);
        }
        if let Some(bias_idx) = self.bias_index {
            self.activations[bias_idx] = 1.0;
        }

        for &idx in &self.eval_order {
            let mut sum = self.biases[idx];
            let start = self.csr_offsets[idx];
            let end = self.csr_offsets[idx + 1];
            for pos in start..end {
                sum += self.activations[self.csr_sources[pos]] * self.csr_weights[pos];
            }
            self.activations[idx] = sum.tanh();
        }

        for (i, &idx) in self.output_indices.iter().enumerate() {
            self.outputs[i] = self.activations[idx];
        }
        &self.outputs
    }

    /// Zero all cached activations.
    pub fn reset(&mut self) {
        for activation in &mut self.activations {
            *activation = 0.0;
        }
    }

    /// Number of input nodes.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.input_indices.len()
    }

    /// Number of output nodes.
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.output_indices.len()
    }
}

/// Kahn's algorithm over the enabled-connection edge list.
///
/// Returns `None` when a cycle prevents a complete ordering.
fn kahn_order(node_count: usize, edges: &[(usize, usize, f32, u64)]) -> Option<Vec<usize>> {
    let mut in_degree = vec![0usize; node_count];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(source, target, _, _) in edges {
        in_degree[target] += 1;
        successors[source].push(target);
    }

    let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    (order.len() == node_count).then_some(order)
}
