//! # Empire NEAT
//!
//! A `NeuroEvolution` of Augmenting Topologies (NEAT) engine with NSGA-II
//! multi-objective selection, built for training strategy-game agents.
//!
//! ## Features
//!
//! - **Tracked Innovation**: an explicit, owned [`InnovationTracker`] issues
//!   node ids and per-generation-deduplicated innovation numbers, so
//!   identical structural mutations align for crossover
//! - **Arena-Graph Genomes**: cache-friendly `SlotMap` storage for node and
//!   connection genes, with stable integer ids for cross-genome alignment
//! - **Speciation**: compatibility-distance clustering with explicit fitness
//!   sharing, stagnation culling, and a threshold controller
//! - **NSGA-II Selection**: Pareto-front ranking and crowding distance fold
//!   multi-objective scores into scalar fitness
//! - **Checkpointing**: populations serialize with their innovation-counter
//!   watermarks, so resumed runs stay crossover-compatible
//!
//! ## Quick Start
//!
//! ```rust
//! use empire_neat::{NeatConfig, Network, Population};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let config = NeatConfig {
//!     population_size: 50,
//!     ..NeatConfig::new(3, 2)
//! };
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let mut population = Population::new(config, &mut rng);
//!
//! for _ in 0..10 {
//!     for idx in 0..population.genomes().len() {
//!         let mut network = Network::from_genome(&population.genomes()[idx]);
//!         let outputs = network.forward(&[1.0, 0.5, -0.5]);
//!         // Score however the task demands; here: prefer a high first output.
//!         let fitness = outputs[0];
//!         population.set_fitness(idx, fitness);
//!     }
//!     population.evolve(&mut rng);
//! }
//! println!("best fitness: {}", population.all_time_best_fitness());
//! ```
//!
//! ## Multi-objective runs
//!
//! Assign a fixed-length objective vector per genome instead of a scalar and
//! the engine ranks the generation with NSGA-II before reproduction:
//!
//! ```rust,ignore
//! population.set_objectives(idx, vec![territory, progression, survival]);
//! population.evolve(&mut rng);
//! ```
//!
//! ## Evaluation contract
//!
//! The engine never runs evaluations itself. Between [`Population::evolve`]
//! calls the caller builds a [`Network`] per genome, drives it, and writes
//! either a scalar fitness or an objective vector back by index. How (and how
//! parallel) that evaluation happens is entirely the caller's business; the
//! engine is single-threaded and synchronous.
//!
//! ## Determinism
//!
//! Every stochastic operation takes an explicit `rand::Rng`. Runs are
//! reproducible exactly when the caller supplies a seeded generator (the
//! random per-generation representative reselection is drawn from the same
//! source).

pub mod config;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod network;
pub mod nsga;
pub mod population;
pub mod species;

// Re-exports for convenience
pub use config::NeatConfig;
pub use gene::{ConnKey, ConnectionGene, NodeGene, NodeKey, NodeType};
pub use genome::Genome;
pub use innovation::InnovationTracker;
pub use network::Network;
pub use population::{PersistError, Population};
pub use species::Species;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_genome_network_round() {
        let config = NeatConfig::new(2, 1);
        let mut tracker = InnovationTracker::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut genome = Genome::fully_connected(&config, &mut tracker, &mut rng);
        genome.mutate(&config, &mut tracker, &mut rng);

        let mut network = Network::from_genome(&genome);
        let outputs = network.forward(&[0.5, -0.5]);
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].is_finite());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = |seed: u64| {
            let config = NeatConfig {
                population_size: 12,
                ..NeatConfig::new(2, 1)
            };
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut population = Population::new(config, &mut rng);
            for _ in 0..4 {
                for idx in 0..population.genomes().len() {
                    let genome = &population.genomes()[idx];
                    let mut network = Network::from_genome(genome);
                    let score = network.forward(&[1.0, -1.0])[0];
                    population.set_fitness(idx, score);
                }
                population.evolve(&mut rng);
            }
            population.to_json().unwrap()
        };

        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }
}
