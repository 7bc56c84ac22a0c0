//! Configuration for genome creation, mutation, speciation, and reproduction.
//!
//! A single [`NeatConfig`] value is threaded through every engine operation.
//! All fields are serde-enabled with container-level defaults, so a partial
//! config file loads with production values for anything it omits.

use serde::{Deserialize, Serialize};

/// Configuration for a NEAT evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeatConfig {
    /// Number of input nodes (excluding bias).
    pub input_count: usize,
    /// Number of output nodes.
    pub output_count: usize,
    /// Whether to include a bias node wired like an extra input.
    pub use_bias: bool,
    /// Whether connections that form cycles are permitted.
    pub allow_recurrent: bool,

    /// Compatibility distance below which two genomes share a species.
    /// Adjusted each generation toward `target_species_count`.
    pub compatibility_threshold: f32,
    /// Coefficient for excess genes in compatibility distance.
    pub c1_excess: f32,
    /// Coefficient for disjoint genes in compatibility distance.
    pub c2_disjoint: f32,
    /// Coefficient for mean matching-weight difference in compatibility distance.
    pub c3_weight_diff: f32,
    /// Species count the threshold controller steers toward.
    pub target_species_count: usize,
    /// Step applied to the compatibility threshold per generation.
    pub threshold_step: f32,
    /// Floor for the compatibility threshold.
    pub min_compatibility_threshold: f32,

    /// Per-connection probability of a weight mutation.
    pub weight_mutate_rate: f32,
    /// Given a weight mutation, probability of perturbing rather than resetting.
    pub weight_perturb_rate: f32,
    /// Standard deviation of the Gaussian weight perturbation.
    pub weight_perturb_strength: f32,
    /// Reset and new-connection weights are uniform in [-range, range].
    pub weight_reset_range: f32,
    /// Probability of an add-node mutation per genome per generation.
    pub add_node_rate: f32,
    /// Probability of an add-connection mutation per genome per generation.
    pub add_connection_rate: f32,
    /// Probability of disabling one random enabled connection.
    pub disable_connection_rate: f32,

    /// Number of genomes per generation.
    pub population_size: usize,
    /// Fraction of each species copied unchanged into the next generation.
    pub elite_fraction: f32,
    /// Fraction of each species eligible as parents.
    pub survival_fraction: f32,
    /// Probability that a crossover picks its second parent from another species.
    pub interspecies_crossover_rate: f32,
    /// Probability that an offspring comes from crossover rather than cloning.
    pub crossover_rate: f32,
    /// Probability that a gene disabled in either parent stays disabled in the child.
    pub disabled_gene_inherit_rate: f32,

    /// Generations without improvement before a species stops receiving offspring.
    pub stagnation_threshold: u32,
    /// Generations without improvement before a species is culled outright.
    pub stagnation_kill_threshold: u32,
    /// Top species by all-time best fitness that are never culled.
    pub min_species_protected: usize,

    /// Fraction of input→output pairs wired at initialization.
    /// 1.0 produces dense initial wiring.
    pub initial_connection_fraction: f32,
    /// Raw-fitness penalty per connection gene. 0.0 disables parsimony pressure.
    pub parsimony_coefficient: f32,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            input_count: 2,
            output_count: 1,
            use_bias: true,
            allow_recurrent: false,

            compatibility_threshold: 3.0,
            c1_excess: 1.0,
            c2_disjoint: 1.0,
            c3_weight_diff: 0.5,
            target_species_count: 10,
            threshold_step: 0.1,
            min_compatibility_threshold: 0.5,

            weight_mutate_rate: 0.8,
            weight_perturb_rate: 0.9,
            weight_perturb_strength: 1.0,
            weight_reset_range: 2.0,
            add_node_rate: 0.03,
            add_connection_rate: 0.05,
            disable_connection_rate: 0.01,

            population_size: 100,
            elite_fraction: 0.1,
            survival_fraction: 0.2,
            interspecies_crossover_rate: 0.001,
            crossover_rate: 0.75,
            disabled_gene_inherit_rate: 0.75,

            stagnation_threshold: 15,
            stagnation_kill_threshold: 20,
            min_species_protected: 2,

            initial_connection_fraction: 1.0,
            parsimony_coefficient: 0.0,
        }
    }
}

impl NeatConfig {
    /// Create a config for the given network interface, defaults elsewhere.
    #[must_use]
    pub fn new(input_count: usize, output_count: usize) -> Self {
        Self {
            input_count,
            output_count,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_feedforward() {
        let config = NeatConfig::default();
        assert!(!config.allow_recurrent);
        assert!(config.use_bias);
        assert!(config.initial_connection_fraction >= 1.0);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: NeatConfig =
            serde_json::from_str(r#"{"input_count": 93, "output_count": 13}"#).unwrap();
        assert_eq!(config.input_count, 93);
        assert_eq!(config.output_count, 13);
        assert_eq!(config.population_size, NeatConfig::default().population_size);
    }
}
