//! Innovation-number bookkeeping for NEAT.
//!
//! Every structural mutation is stamped with a historical marker (an
//! "innovation number") so genes can be aligned between genomes during
//! crossover and compatibility comparison. The tracker deduplicates within a
//! generation: two genomes proposing the same `(source, target)` connection in
//! the same generation receive the same innovation number. The pair cache is
//! cleared at each generation boundary; the counters never reset, so markers
//! stay unique across the whole run.
//!
//! Node ids and innovation numbers are independent sequences. One tracker is
//! owned per evolutionary run and threaded by reference into every genome
//! operation that needs fresh ids — it is never global state, so independent
//! runs can coexist in one process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Issues globally unique node ids and per-generation-deduplicated
/// innovation numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InnovationTracker {
    /// Next node id to hand out.
    next_node_id: u32,
    /// Next innovation number to hand out.
    next_innovation: u64,
    /// Structural mutations seen this generation: (source, target) → innovation.
    #[serde(skip)]
    cache: HashMap<(u32, u32), u64>,
}

impl InnovationTracker {
    /// Create a tracker with both counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Innovation number for a connection from `source_id` to `target_id`.
    ///
    /// Returns the cached number if this exact pair was already requested this
    /// generation; otherwise allocates the next one.
    pub fn get_innovation(&mut self, source_id: u32, target_id: u32) -> u64 {
        if let Some(&innovation) = self.cache.get(&(source_id, target_id)) {
            return innovation;
        }
        let innovation = self.next_innovation;
        self.next_innovation += 1;
        self.cache.insert((source_id, target_id), innovation);
        innovation
    }

    /// Allocate a fresh node id.
    pub fn allocate_node_id(&mut self) -> u32 {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Ensure future [`allocate_node_id`](Self::allocate_node_id) calls never
    /// return `id` or anything below it.
    pub fn register_node_id(&mut self, id: u32) {
        if id >= self.next_node_id {
            self.next_node_id = id + 1;
        }
    }

    /// Ensure future innovation numbers never collide with `innovation`.
    ///
    /// Used when loading saved genomes so reloaded populations remain
    /// crossover-compatible with freshly mutated ones.
    pub fn register_innovation(&mut self, innovation: u64) {
        if innovation >= self.next_innovation {
            self.next_innovation = innovation + 1;
        }
    }

    /// Clear the pair→innovation cache. Both counters persist.
    ///
    /// Must run once per generation, after reproduction and before the next
    /// generation's mutations.
    pub fn reset_generation_cache(&mut self) {
        self.cache.clear();
    }

    /// One past the highest node id handed out so far.
    #[must_use]
    pub fn node_id_watermark(&self) -> u32 {
        self.next_node_id
    }

    /// One past the highest innovation number handed out so far.
    #[must_use]
    pub fn innovation_watermark(&self) -> u64 {
        self.next_innovation
    }
}
