//! NEAT genome implementation with arena-allocated graph topology.
//!
//! The [`Genome`] uses SlotMap-based arena storage for nodes and connections,
//! providing cache-friendly access and avoiding reference-counting overhead.
//! Genes carry stable integer ids from the
//! [`InnovationTracker`](crate::innovation::InnovationTracker); all
//! cross-genome operations (compatibility distance, crossover) align on those
//! ids, never on arena keys.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::config::NeatConfig;
use crate::gene::{ConnKey, ConnectionGene, NodeGene, NodeKey, NodeType};
use crate::innovation::InnovationTracker;

/// Hard clamp applied to weights after perturbation. Keeps compatibility
/// distances finite under long mutation chains.
const WEIGHT_LIMIT: f32 = 10.0;

/// Parents whose fitness differs by no more than this are treated as equally
/// fit during crossover.
const FITNESS_EPSILON: f32 = 1e-6;

/// Attempts made to find a valid node pair in an add-connection mutation.
const ADD_CONNECTION_ATTEMPTS: usize = 10;

/// Genomes where both sides carry fewer genes than this skip gene-count
/// normalization in compatibility distance.
const COMPAT_NORMALIZE_FLOOR: usize = 20;

/// An individual's node/connection gene encoding.
///
/// Invariant: every connection's source/target key refers to a node gene
/// present in the same genome's arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "GenomeData", into = "GenomeData")]
pub struct Genome {
    /// Arena storage for node genes.
    pub nodes: SlotMap<NodeKey, NodeGene>,
    /// Arena storage for connection genes.
    pub connections: SlotMap<ConnKey, ConnectionGene>,
    /// Keys of input nodes, in observation order.
    pub input_keys: Vec<NodeKey>,
    /// Keys of output nodes, in action order.
    pub output_keys: Vec<NodeKey>,
    /// Key of the bias node, if present.
    pub bias_key: Option<NodeKey>,
    /// Raw scalar fitness assigned by the caller (or by NSGA-II scalarization).
    pub fitness: f32,
    /// Fitness after explicit sharing within the species.
    pub adjusted_fitness: f32,
    /// Multi-objective scores for this generation. Empty when unset.
    pub objectives: Vec<f32>,
}

fn random_weight<R: Rng>(range: f32, rng: &mut R) -> f32 {
    rng.random::<f32>() * 2.0 * range - range
}

impl Genome {
    /// Create a genome with input, bias, and output nodes and no connections.
    ///
    /// Node ids are laid out deterministically (inputs, bias, outputs) so that
    /// every genome created from the same config shares the same interface
    /// ids, and registered with the tracker so later
    /// [`allocate_node_id`](InnovationTracker::allocate_node_id) calls never
    /// collide. Output biases are drawn uniformly from [-1, 1].
    #[must_use]
    pub fn new<R: Rng>(
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Self {
        let mut nodes: SlotMap<NodeKey, NodeGene> = SlotMap::with_key();
        let mut input_keys = Vec::with_capacity(config.input_count);
        let mut output_keys = Vec::with_capacity(config.output_count);
        let mut next_id: u32 = 0;

        for _ in 0..config.input_count {
            input_keys.push(nodes.insert(NodeGene::input(next_id)));
            next_id += 1;
        }

        let bias_key = if config.use_bias {
            let key = nodes.insert(NodeGene::bias(next_id));
            next_id += 1;
            Some(key)
        } else {
            None
        };

        for _ in 0..config.output_count {
            let bias = rng.random::<f32>() * 2.0 - 1.0;
            output_keys.push(nodes.insert(NodeGene::output(next_id, bias)));
            next_id += 1;
        }

        if next_id > 0 {
            tracker.register_node_id(next_id - 1);
        }

        Self {
            nodes,
            connections: SlotMap::with_key(),
            input_keys,
            output_keys,
            bias_key,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            objectives: Vec::new(),
        }
    }

    /// Create a genome with initial input→output wiring.
    ///
    /// Every input (and the bias node, if present) is connected to every
    /// output with weight uniform in [-`weight_reset_range`,
    /// `weight_reset_range`]. When `initial_connection_fraction` is below 1.0,
    /// each pair is wired with that probability instead, which starts
    /// evolution from a sparse topology.
    #[must_use]
    pub fn fully_connected<R: Rng>(
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Self {
        let mut genome = Self::new(config, tracker, rng);

        let mut sources = genome.input_keys.clone();
        if let Some(bias_key) = genome.bias_key {
            sources.push(bias_key);
        }
        let targets = genome.output_keys.clone();

        for &source in &sources {
            for &target in &targets {
                if config.initial_connection_fraction < 1.0
                    && rng.random::<f32>() >= config.initial_connection_fraction
                {
                    continue;
                }
                let source_id = genome.nodes[source].id;
                let target_id = genome.nodes[target].id;
                let innovation = tracker.get_innovation(source_id, target_id);
                let weight = random_weight(config.weight_reset_range, rng);
                genome
                    .connections
                    .insert(ConnectionGene::new(innovation, source, target, weight));
            }
        }

        genome
    }

    /// Add a connection between two nodes.
    ///
    /// Returns `None` when the pair is invalid: self-loop, output used as
    /// source, input or bias used as target, an identical connection already
    /// present, or (for feedforward genomes) a pair that would create a cycle.
    pub fn add_connection<R: Rng>(
        &mut self,
        source: NodeKey,
        target: NodeKey,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Option<ConnKey> {
        if source == target {
            return None;
        }
        let source_node = self.nodes.get(source)?;
        let target_node = self.nodes.get(target)?;

        if source_node.node_type == NodeType::Output {
            return None;
        }
        if matches!(target_node.node_type, NodeType::Input | NodeType::Bias) {
            return None;
        }
        if self
            .connections
            .values()
            .any(|c| c.source == source && c.target == target)
        {
            return None;
        }
        if !config.allow_recurrent && self.would_create_cycle(source, target) {
            return None;
        }

        let innovation = tracker.get_innovation(source_node.id, target_node.id);
        let weight = random_weight(config.weight_reset_range, rng);
        Some(self
            .connections
            .insert(ConnectionGene::new(innovation, source, target, weight)))
    }

    /// Add a hidden node by splitting an enabled connection.
    ///
    /// The original connection is disabled, and two new connections are
    /// created: source→new with weight 1.0 (preserving signal magnitude) and
    /// new→target with the original weight (preserving prior function).
    ///
    /// Returns `None` if the connection doesn't exist or is disabled.
    pub fn add_node(
        &mut self,
        conn: ConnKey,
        tracker: &mut InnovationTracker,
    ) -> Option<NodeKey> {
        let gene = self.connections.get_mut(conn)?;
        if !gene.enabled {
            return None;
        }
        gene.enabled = false;
        let original_weight = gene.weight;
        let source = gene.source;
        let target = gene.target;

        let source_id = self.nodes.get(source)?.id;
        let target_id = self.nodes.get(target)?.id;

        let new_id = tracker.allocate_node_id();
        let new_key = self.nodes.insert(NodeGene::hidden(new_id));

        let inn_a = tracker.get_innovation(source_id, new_id);
        self.connections
            .insert(ConnectionGene::new(inn_a, source, new_key, 1.0));

        let inn_b = tracker.get_innovation(new_id, target_id);
        self.connections
            .insert(ConnectionGene::new(inn_b, new_key, target, original_weight));

        Some(new_key)
    }

    /// Check whether a connection `source → target` would close a cycle.
    ///
    /// DFS from `target` over enabled connections; if `source` is reachable,
    /// the new edge would complete a cycle.
    #[must_use]
    pub fn would_create_cycle(&self, source: NodeKey, target: NodeKey) -> bool {
        let mut visited = std::collections::HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![target];

        while let Some(current) = stack.pop() {
            if current == source {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for conn in self.connections.values() {
                if conn.enabled && conn.source == current {
                    stack.push(conn.target);
                }
            }
        }

        false
    }

    /// Try to add a random connection: non-output source, non-input target,
    /// up to a bounded number of attempts. No-op if no valid pair is found.
    pub fn mutate_add_connection<R: Rng>(
        &mut self,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) {
        let sources: Vec<NodeKey> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.node_type != NodeType::Output)
            .map(|(key, _)| key)
            .collect();
        let targets: Vec<NodeKey> = self
            .nodes
            .iter()
            .filter(|(_, n)| !matches!(n.node_type, NodeType::Input | NodeType::Bias))
            .map(|(key, _)| key)
            .collect();

        if sources.is_empty() || targets.is_empty() {
            return;
        }

        for _ in 0..ADD_CONNECTION_ATTEMPTS {
            let source = sources[rng.random_range(0..sources.len())];
            let target = targets[rng.random_range(0..targets.len())];
            if self
                .add_connection(source, target, config, tracker, rng)
                .is_some()
            {
                return;
            }
        }
    }

    /// Split a random enabled connection with a new hidden node.
    pub fn mutate_add_node<R: Rng>(&mut self, tracker: &mut InnovationTracker, rng: &mut R) {
        let enabled: Vec<ConnKey> = self
            .connections
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(key, _)| key)
            .collect();
        if enabled.is_empty() {
            return;
        }
        let conn = enabled[rng.random_range(0..enabled.len())];
        self.add_node(conn, tracker);
    }

    /// Mutate connection weights.
    ///
    /// Each connection independently mutates with probability
    /// `weight_mutate_rate`: Gaussian perturbation with probability
    /// `weight_perturb_rate`, full reset to uniform otherwise.
    pub fn mutate_weights<R: Rng>(&mut self, config: &NeatConfig, rng: &mut R) {
        let perturb = Normal::new(0.0f32, config.weight_perturb_strength).ok();

        for conn in self.connections.values_mut() {
            if rng.random::<f32>() >= config.weight_mutate_rate {
                continue;
            }
            if rng.random::<f32>() < config.weight_perturb_rate {
                if let Some(dist) = &perturb {
                    conn.weight += dist.sample(rng);
                }
            } else {
                conn.weight = random_weight(config.weight_reset_range, rng);
            }
            conn.weight = conn.weight.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
        }
    }

    /// Disable one randomly chosen enabled connection. No-op if none enabled.
    pub fn mutate_disable_connection<R: Rng>(&mut self, rng: &mut R) {
        let enabled: Vec<ConnKey> = self
            .connections
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(key, _)| key)
            .collect();
        if enabled.is_empty() {
            return;
        }
        let conn = enabled[rng.random_range(0..enabled.len())];
        if let Some(gene) = self.connections.get_mut(conn) {
            gene.enabled = false;
        }
    }

    /// Apply the mutation operators, each firing independently according to
    /// its own configured probability.
    pub fn mutate<R: Rng>(
        &mut self,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) {
        self.mutate_weights(config, rng);
        if rng.random::<f32>() < config.add_node_rate {
            self.mutate_add_node(tracker, rng);
        }
        if rng.random::<f32>() < config.add_connection_rate {
            self.mutate_add_connection(config, tracker, rng);
        }
        if rng.random::<f32>() < config.disable_connection_rate {
            self.mutate_disable_connection(rng);
        }
    }

    /// Compatibility distance to another genome for speciation.
    ///
    /// Genes are aligned by innovation number. Genes present in exactly one
    /// genome count as excess beyond the smaller genome's maximum innovation,
    /// disjoint below it. Matching genes contribute mean absolute weight
    /// difference. Small genomes (both under the normalization floor) skip
    /// gene-count normalization.
    #[must_use]
    pub fn compatibility(&self, other: &Genome, config: &NeatConfig) -> f32 {
        let mut own: Vec<(u64, f32)> = self
            .connections
            .values()
            .map(|c| (c.innovation, c.weight))
            .collect();
        let mut theirs: Vec<(u64, f32)> = other
            .connections
            .values()
            .map(|c| (c.innovation, c.weight))
            .collect();
        own.sort_unstable_by_key(|(innovation, _)| *innovation);
        theirs.sort_unstable_by_key(|(innovation, _)| *innovation);

        let own_max = own.last().map_or(0, |(innovation, _)| *innovation);
        let their_max = theirs.last().map_or(0, |(innovation, _)| *innovation);
        let smaller_max = own_max.min(their_max);

        let mut excess = 0usize;
        let mut disjoint = 0usize;
        let mut matching = 0usize;
        let mut weight_diff_sum = 0.0f32;

        let mut i = 0;
        let mut j = 0;
        while i < own.len() || j < theirs.len() {
            match (own.get(i), theirs.get(j)) {
                (Some(&(a, wa)), Some(&(b, wb))) => {
                    if a == b {
                        matching += 1;
                        weight_diff_sum += (wa - wb).abs();
                        i += 1;
                        j += 1;
                    } else if a < b {
                        if a > smaller_max { excess += 1 } else { disjoint += 1 }
                        i += 1;
                    } else {
                        if b > smaller_max { excess += 1 } else { disjoint += 1 }
                        j += 1;
                    }
                }
                (Some(&(a, _)), None) => {
                    if a > smaller_max { excess += 1 } else { disjoint += 1 }
                    i += 1;
                }
                (None, Some(&(b, _))) => {
                    if b > smaller_max { excess += 1 } else { disjoint += 1 }
                    j += 1;
                }
                (None, None) => break,
            }
        }

        let n = if own.len() < COMPAT_NORMALIZE_FLOOR && theirs.len() < COMPAT_NORMALIZE_FLOOR {
            1.0
        } else {
            own.len().max(theirs.len()) as f32
        };
        let avg_weight_diff = if matching > 0 {
            weight_diff_sum / matching as f32
        } else {
            0.0
        };

        config.c1_excess * excess as f32 / n
            + config.c2_disjoint * disjoint as f32 / n
            + config.c3_weight_diff * avg_weight_diff
    }

    /// NEAT crossover aligned by innovation number.
    ///
    /// The higher-fitness parent is primary. Matching genes are inherited from
    /// a randomly chosen parent; a gene disabled in either parent stays
    /// disabled in the child with probability `disabled_gene_inherit_rate`.
    /// Genes unique to the primary are always inherited; genes unique to the
    /// secondary only when the parents' fitnesses are effectively equal.
    #[must_use]
    pub fn crossover<R: Rng>(
        &self,
        other: &Genome,
        config: &NeatConfig,
        rng: &mut R,
    ) -> Genome {
        let equal_fitness = (self.fitness - other.fitness).abs() <= FITNESS_EPSILON;
        let (primary, secondary) = if equal_fitness || self.fitness >= other.fitness {
            (self, other)
        } else {
            (other, self)
        };

        let mut primary_conns: Vec<&ConnectionGene> = primary.connections.values().collect();
        let mut secondary_conns: Vec<&ConnectionGene> = secondary.connections.values().collect();
        primary_conns.sort_unstable_by_key(|c| c.innovation);
        secondary_conns.sort_unstable_by_key(|c| c.innovation);

        // Inherited connections, each tagged with the parent whose arena its
        // keys still point into.
        let mut inherited: Vec<(ConnectionGene, &Genome)> = Vec::new();

        let mut i = 0;
        let mut j = 0;
        while i < primary_conns.len() || j < secondary_conns.len() {
            match (primary_conns.get(i), secondary_conns.get(j)) {
                (Some(&pc), Some(&sc)) if pc.innovation == sc.innovation => {
                    let take_primary = rng.random::<bool>();
                    let (mut gene, parent): (ConnectionGene, &Genome) = if take_primary {
                        (pc.clone(), primary)
                    } else {
                        (sc.clone(), secondary)
                    };
                    if !pc.enabled || !sc.enabled {
                        gene.enabled =
                            rng.random::<f32>() >= config.disabled_gene_inherit_rate;
                    }
                    inherited.push((gene, parent));
                    i += 1;
                    j += 1;
                }
                (Some(&pc), Some(&sc)) if pc.innovation < sc.innovation => {
                    inherited.push((pc.clone(), primary));
                    i += 1;
                }
                (Some(_), Some(&sc)) => {
                    if equal_fitness {
                        inherited.push((sc.clone(), secondary));
                    }
                    j += 1;
                }
                (Some(&pc), None) => {
                    inherited.push((pc.clone(), primary));
                    i += 1;
                }
                (None, Some(&sc)) => {
                    if equal_fitness {
                        inherited.push((sc.clone(), secondary));
                    }
                    j += 1;
                }
                (None, None) => break,
            }
        }

        // Node genes the child needs: everything referenced by an inherited
        // connection, plus the primary parent's full interface. When both
        // parents carry a node id, the primary's copy wins.
        let mut needed: std::collections::BTreeMap<u32, NodeGene> =
            std::collections::BTreeMap::new();
        for (gene, parent) in &inherited {
            for key in [gene.source, gene.target] {
                let node = &parent.nodes[key];
                let winner = primary
                    .find_node_by_id(node.id)
                    .map_or_else(|| node.clone(), |k| primary.nodes[k].clone());
                needed.entry(node.id).or_insert(winner);
            }
        }
        let mut interface = primary.input_keys.clone();
        interface.extend(primary.bias_key);
        interface.extend(primary.output_keys.iter().copied());
        for key in interface {
            let node = &primary.nodes[key];
            needed.entry(node.id).or_insert_with(|| node.clone());
        }

        // Assemble the child: inputs, bias, hidden, outputs, by id within type.
        let mut child = Genome {
            nodes: SlotMap::with_key(),
            connections: SlotMap::with_key(),
            input_keys: Vec::new(),
            output_keys: Vec::new(),
            bias_key: None,
            fitness: 0.0,
            adjusted_fitness: 0.0,
            objectives: Vec::new(),
        };
        let mut id_to_key: std::collections::HashMap<u32, NodeKey> =
            std::collections::HashMap::with_capacity(needed.len());

        for pass in [NodeType::Input, NodeType::Bias, NodeType::Hidden, NodeType::Output] {
            for node in needed.values().filter(|n| n.node_type == pass) {
                let key = child.nodes.insert(node.clone());
                id_to_key.insert(node.id, key);
                match pass {
                    NodeType::Input => child.input_keys.push(key),
                    NodeType::Bias => child.bias_key = Some(key),
                    NodeType::Output => child.output_keys.push(key),
                    NodeType::Hidden => {}
                }
            }
        }

        for (mut gene, parent) in inherited {
            let source_id = parent.nodes[gene.source].id;
            let target_id = parent.nodes[gene.target].id;
            if let (Some(&source), Some(&target)) =
                (id_to_key.get(&source_id), id_to_key.get(&target_id))
            {
                gene.source = source;
                gene.target = target;
                child.connections.insert(gene);
            }
        }

        child
    }

    /// Find a node's arena key by its global id.
    #[must_use]
    pub fn find_node_by_id(&self, id: u32) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.id == id)
            .map(|(key, _)| key)
    }

    /// Number of enabled connections.
    #[must_use]
    pub fn num_enabled_connections(&self) -> usize {
        self.connections.values().filter(|c| c.enabled).count()
    }

    /// Keys of all hidden nodes.
    #[must_use]
    pub fn hidden_keys(&self) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.node_type == NodeType::Hidden)
            .map(|(key, _)| key)
            .collect()
    }

    /// Highest innovation number present, or 0 for an unwired genome.
    #[must_use]
    pub fn max_innovation(&self) -> u64 {
        self.connections
            .values()
            .map(|c| c.innovation)
            .max()
            .unwrap_or(0)
    }

    /// Highest node id present, or 0 for an empty genome.
    #[must_use]
    pub fn max_node_id(&self) -> u32 {
        self.nodes.values().map(|n| n.id).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Serialized node gene: `{id, type, bias}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct NodeData {
    id: u32,
    #[serde(rename = "type")]
    node_type: NodeType,
    bias: f32,
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            id: 0,
            node_type: NodeType::Hidden,
            bias: 0.0,
        }
    }
}

/// Serialized connection gene: `{in, out, weight, enabled, innovation}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ConnData {
    #[serde(rename = "in")]
    source: u32,
    #[serde(rename = "out")]
    target: u32,
    weight: f32,
    enabled: bool,
    innovation: u64,
}

impl Default for ConnData {
    fn default() -> Self {
        Self {
            source: 0,
            target: 0,
            weight: 0.0,
            enabled: true,
            innovation: 0,
        }
    }
}

/// Wire representation of a genome. Malformed fields fall back to defaults
/// rather than aborting the load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GenomeData {
    nodes: Vec<NodeData>,
    connections: Vec<ConnData>,
    fitness: f32,
}

fn type_rank(node_type: NodeType) -> u8 {
    match node_type {
        NodeType::Input => 0,
        NodeType::Bias => 1,
        NodeType::Hidden => 2,
        NodeType::Output => 3,
    }
}

impl From<Genome> for GenomeData {
    fn from(genome: Genome) -> Self {
        let mut nodes: Vec<NodeData> = genome
            .nodes
            .values()
            .map(|n| NodeData {
                id: n.id,
                node_type: n.node_type,
                bias: n.bias,
            })
            .collect();
        nodes.sort_unstable_by_key(|n| (type_rank(n.node_type), n.id));

        let mut connections: Vec<ConnData> = genome
            .connections
            .values()
            .map(|c| ConnData {
                source: genome.nodes[c.source].id,
                target: genome.nodes[c.target].id,
                weight: c.weight,
                enabled: c.enabled,
                innovation: c.innovation,
            })
            .collect();
        connections.sort_unstable_by_key(|c| c.innovation);

        Self {
            nodes,
            connections,
            fitness: genome.fitness,
        }
    }
}

impl From<GenomeData> for Genome {
    fn from(data: GenomeData) -> Self {
        let mut genome = Genome {
            nodes: SlotMap::with_key(),
            connections: SlotMap::with_key(),
            input_keys: Vec::new(),
            output_keys: Vec::new(),
            bias_key: None,
            fitness: data.fitness,
            adjusted_fitness: 0.0,
            objectives: Vec::new(),
        };

        let mut id_to_key: std::collections::HashMap<u32, NodeKey> =
            std::collections::HashMap::with_capacity(data.nodes.len());
        for node in data.nodes {
            if id_to_key.contains_key(&node.id) {
                continue; // duplicate id, keep first
            }
            let key = genome.nodes.insert(NodeGene {
                id: node.id,
                node_type: node.node_type,
                bias: node.bias,
            });
            id_to_key.insert(node.id, key);
            match node.node_type {
                NodeType::Input => genome.input_keys.push(key),
                NodeType::Output => genome.output_keys.push(key),
                NodeType::Bias => {
                    if genome.bias_key.is_none() {
                        genome.bias_key = Some(key);
                    }
                }
                NodeType::Hidden => {}
            }
        }

        for conn in data.connections {
            // Connections referencing unknown nodes are dropped.
            if let (Some(&source), Some(&target)) =
                (id_to_key.get(&conn.source), id_to_key.get(&conn.target))
            {
                genome.connections.insert(ConnectionGene {
                    innovation: conn.innovation,
                    source,
                    target,
                    weight: conn.weight,
                    enabled: conn.enabled,
                });
            }
        }

        genome
    }
}
