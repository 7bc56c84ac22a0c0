//! Gene types for NEAT genomes.
//!
//! This module defines the fundamental building blocks of evolved networks:
//! - [`NodeGene`]: Represents neurons in the network
//! - [`ConnectionGene`]: Represents weighted connections between nodes
//!
//! Genes live in SlotMap arenas inside a genome and are addressed by
//! generational keys; alongside the keys they carry stable integer ids
//! (node id, innovation number) issued by the
//! [`InnovationTracker`](crate::innovation::InnovationTracker). The keys are
//! private to one genome; the ids are what align genes across genomes.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Arena key for a node within one genome.
    ///
    /// Uses SlotMap's generational indices for safe, cache-friendly storage.
    pub struct NodeKey;

    /// Arena key for a connection within one genome.
    pub struct ConnKey;
}

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Input node - receives external values, no activation applied.
    Input,
    /// Hidden node - internal processing node added through mutation.
    Hidden,
    /// Output node - produces final network output.
    Output,
    /// Bias node - always outputs 1.0, wired like an extra input.
    Bias,
}

/// A node gene representing a neuron in the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGene {
    /// Globally unique node id issued by the innovation tracker.
    pub id: u32,
    /// The role of this node in the network.
    pub node_type: NodeType,
    /// Bias added to the node's input sum. Fixed at creation.
    pub bias: f32,
}

impl NodeGene {
    /// Create a new input node.
    #[must_use]
    pub fn input(id: u32) -> Self {
        Self {
            id,
            node_type: NodeType::Input,
            bias: 0.0,
        }
    }

    /// Create a new output node.
    #[must_use]
    pub fn output(id: u32, bias: f32) -> Self {
        Self {
            id,
            node_type: NodeType::Output,
            bias,
        }
    }

    /// Create a new hidden node.
    #[must_use]
    pub fn hidden(id: u32) -> Self {
        Self {
            id,
            node_type: NodeType::Hidden,
            bias: 0.0,
        }
    }

    /// Create a bias node that always outputs 1.0.
    #[must_use]
    pub fn bias(id: u32) -> Self {
        Self {
            id,
            node_type: NodeType::Bias,
            bias: 0.0,
        }
    }
}

/// A connection gene representing a weighted link between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionGene {
    /// Historical marker issued by the innovation tracker. Immutable once assigned.
    pub innovation: u64,
    /// The source node of this connection.
    pub source: NodeKey,
    /// The target node of this connection.
    pub target: NodeKey,
    /// The connection weight.
    pub weight: f32,
    /// Whether this connection is active.
    /// Disabled connections are skipped during evaluation but preserved for crossover.
    pub enabled: bool,
}

impl ConnectionGene {
    /// Create a new enabled connection.
    #[must_use]
    pub fn new(innovation: u64, source: NodeKey, target: NodeKey, weight: f32) -> Self {
        Self {
            innovation,
            source,
            target,
            weight,
            enabled: true,
        }
    }
}
