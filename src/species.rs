//! Compatibility-based speciation with fitness sharing and stagnation.
//!
//! Species cluster genomes within a compatibility-distance threshold of a
//! shared representative. Membership is rebuilt every generation; the
//! representative is re-drawn at random from the surviving membership so a
//! species can drift with its genomes. Explicit fitness sharing divides each
//! member's raw fitness by the species size, which keeps large species from
//! swallowing the whole offspring budget.

use rand::Rng;

use crate::config::NeatConfig;
use crate::genome::Genome;

/// A cluster of compatible genomes.
///
/// `members` holds indices into the engine's population for the current
/// generation only.
#[derive(Debug, Clone)]
pub struct Species {
    /// Stable id for logging and bookkeeping.
    pub id: u32,
    /// Genome new candidates are compared against.
    pub representative: Genome,
    /// Population indices of this generation's members.
    pub members: Vec<usize>,
    /// Best raw fitness any member has ever reached.
    pub best_fitness_ever: f32,
    /// Generations since `best_fitness_ever` last improved.
    pub generations_without_improvement: u32,
    /// Generations this species has existed.
    pub age: u32,
}

impl Species {
    /// Create a species from its founding genome.
    #[must_use]
    pub fn new(id: u32, representative: Genome) -> Self {
        Self {
            id,
            representative,
            members: Vec::new(),
            best_fitness_ever: f32::NEG_INFINITY,
            generations_without_improvement: 0,
            age: 0,
        }
    }

    /// Whether the species has gone at least `threshold` generations without
    /// improving its all-time best fitness.
    #[must_use]
    pub fn is_stagnant(&self, threshold: u32) -> bool {
        self.generations_without_improvement >= threshold
    }

    /// Fold this generation's results into the stagnation bookkeeping.
    ///
    /// Updates `best_fitness_ever` and resets the stagnation counter on a new
    /// record, increments it otherwise. Age always advances.
    pub fn update_best_fitness(&mut self, population: &[Genome]) {
        let generation_best = self
            .members
            .iter()
            .filter_map(|&idx| population.get(idx))
            .map(|g| g.fitness)
            .fold(f32::NEG_INFINITY, f32::max);

        if generation_best > self.best_fitness_ever {
            self.best_fitness_ever = generation_best;
            self.generations_without_improvement = 0;
        } else {
            self.generations_without_improvement += 1;
        }
        self.age += 1;
    }

    /// Explicit fitness sharing: each member's adjusted fitness is its raw
    /// fitness divided by the species size.
    ///
    /// A nonzero parsimony coefficient first subtracts `coefficient ×
    /// connection-gene count` from the raw fitness, floored at zero.
    pub fn share_fitness(&self, population: &mut [Genome], parsimony_coefficient: f32) {
        let size = self.members.len().max(1) as f32;
        for &idx in &self.members {
            if let Some(genome) = population.get_mut(idx) {
                let effective = if parsimony_coefficient > 0.0 {
                    (genome.fitness - parsimony_coefficient * genome.connections.len() as f32)
                        .max(0.0)
                } else {
                    genome.fitness
                };
                genome.adjusted_fitness = effective / size;
            }
        }
    }

    /// Sum of the members' adjusted fitness.
    #[must_use]
    pub fn total_adjusted_fitness(&self, population: &[Genome]) -> f32 {
        self.members
            .iter()
            .filter_map(|&idx| population.get(idx))
            .map(|g| g.adjusted_fitness)
            .sum()
    }
}

/// Assign every genome in the population to a species.
///
/// Existing species keep their representative (and stats) but have their
/// member lists cleared. Each genome joins the first species whose
/// representative is within `threshold`, or founds a new one. Species left
/// empty are dropped, and every survivor draws a fresh random representative
/// from its membership for the next round of comparisons.
pub fn speciate<R: Rng>(
    population: &[Genome],
    species: &mut Vec<Species>,
    config: &NeatConfig,
    threshold: f32,
    next_species_id: &mut u32,
    rng: &mut R,
) {
    for sp in species.iter_mut() {
        sp.members.clear();
    }

    for (idx, genome) in population.iter().enumerate() {
        let found = species
            .iter()
            .position(|sp| genome.compatibility(&sp.representative, config) < threshold);
        match found {
            Some(pos) => species[pos].members.push(idx),
            None => {
                let mut sp = Species::new(*next_species_id, genome.clone());
                *next_species_id += 1;
                sp.members.push(idx);
                species.push(sp);
            }
        }
    }

    species.retain(|sp| !sp.members.is_empty());

    for sp in species.iter_mut() {
        let pick = sp.members[rng.random_range(0..sp.members.len())];
        if let Some(genome) = population.get(pick) {
            sp.representative = genome.clone();
        }
    }
}

/// Proportional controller for the global compatibility threshold.
///
/// Steers the species count toward `target_species_count`: below target the
/// threshold shrinks (splitting clusters), above target it grows. Clamped at
/// the configured minimum.
pub fn adjust_compatibility_threshold(
    species_count: usize,
    config: &NeatConfig,
    threshold: &mut f32,
) {
    if species_count < config.target_species_count {
        *threshold -= config.threshold_step;
    } else if species_count > config.target_species_count {
        *threshold += config.threshold_step;
    }
    *threshold = threshold.max(config.min_compatibility_threshold);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innovation::InnovationTracker;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn uniform_population(count: usize) -> (Vec<Genome>, NeatConfig) {
        let config = NeatConfig::new(2, 1);
        let mut tracker = InnovationTracker::new();
        let mut rng = test_rng();
        let population: Vec<Genome> = (0..count)
            .map(|_| Genome::fully_connected(&config, &mut tracker, &mut rng))
            .collect();
        (population, config)
    }

    #[test]
    fn test_similar_genomes_share_one_species() {
        let (population, config) = uniform_population(10);
        let mut species = Vec::new();
        let mut next_id = 0;
        let mut rng = test_rng();

        speciate(
            &population,
            &mut species,
            &config,
            config.compatibility_threshold,
            &mut next_id,
            &mut rng,
        );

        assert_eq!(species.len(), 1);
        assert_eq!(species[0].members.len(), 10);
        assert_eq!(next_id, 1);
    }

    #[test]
    fn test_distant_genome_founds_new_species() {
        let (population, config) = uniform_population(1);
        let mut rng = test_rng();

        // Five identical genomes plus one with fully disjoint genes.
        let mut population: Vec<Genome> = (0..5).map(|_| population[0].clone()).collect();
        let mut stranger = population[0].clone();
        for conn in stranger.connections.values_mut() {
            conn.innovation += 1000;
            conn.weight = 9.0;
        }
        population.push(stranger);

        let mut species = Vec::new();
        let mut next_id = 0;
        speciate(
            &population,
            &mut species,
            &config,
            config.compatibility_threshold,
            &mut next_id,
            &mut rng,
        );

        assert_eq!(species.len(), 2);
        let sizes: Vec<usize> = species.iter().map(|sp| sp.members.len()).collect();
        assert!(sizes.contains(&5) && sizes.contains(&1), "sizes: {sizes:?}");
    }

    #[test]
    fn test_empty_species_are_dropped() {
        let (population, config) = uniform_population(4);
        let mut rng = test_rng();

        // A species whose representative nothing matches.
        let mut tracker = InnovationTracker::new();
        let mut stranger = Genome::fully_connected(&config, &mut tracker, &mut rng);
        for conn in stranger.connections.values_mut() {
            conn.innovation += 1000;
            conn.weight = 9.0;
        }
        let mut species = vec![Species::new(0, stranger)];
        let mut next_id = 1;

        speciate(
            &population,
            &mut species,
            &config,
            0.5,
            &mut next_id,
            &mut rng,
        );

        assert!(species.iter().all(|sp| !sp.members.is_empty()));
        assert!(species.iter().all(|sp| sp.id != 0));
    }

    #[test]
    fn test_fitness_sharing_divides_by_size() {
        let (mut population, _config) = uniform_population(4);
        for genome in &mut population {
            genome.fitness = 8.0;
        }
        let mut species = Species::new(0, population[0].clone());
        species.members = vec![0, 1, 2, 3];

        species.share_fitness(&mut population, 0.0);
        for genome in &population {
            assert!((genome.adjusted_fitness - 2.0).abs() < 1e-6);
        }
        assert!((species.total_adjusted_fitness(&population) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_parsimony_penalty_applies_before_sharing() {
        let (mut population, _config) = uniform_population(2);
        population[0].fitness = 10.0;
        population[1].fitness = 10.0;
        let conns = population[0].connections.len() as f32;

        let mut species = Species::new(0, population[0].clone());
        species.members = vec![0, 1];
        species.share_fitness(&mut population, 1.0);

        let expected = (10.0 - conns).max(0.0) / 2.0;
        assert!((population[0].adjusted_fitness - expected).abs() < 1e-6);
    }

    #[test]
    fn test_stagnation_counter_tracks_records() {
        let (mut population, _config) = uniform_population(3);
        let mut species = Species::new(0, population[0].clone());
        species.members = vec![0, 1, 2];

        for genome in &mut population {
            genome.fitness = 1.0;
        }
        species.update_best_fitness(&population);
        assert_eq!(species.generations_without_improvement, 0);
        assert!((species.best_fitness_ever - 1.0).abs() < 1e-6);

        // No improvement for two generations.
        species.update_best_fitness(&population);
        species.update_best_fitness(&population);
        assert_eq!(species.generations_without_improvement, 2);
        assert_eq!(species.age, 3);
        assert!(species.is_stagnant(2));
        assert!(!species.is_stagnant(3));

        // A new record resets the counter.
        population[1].fitness = 4.0;
        species.update_best_fitness(&population);
        assert_eq!(species.generations_without_improvement, 0);
        assert!((species.best_fitness_ever - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_controller_clamps_at_minimum() {
        let config = NeatConfig::default();
        let mut threshold = config.min_compatibility_threshold + config.threshold_step / 2.0;

        // One species, target ten: threshold shrinks but never below the floor.
        adjust_compatibility_threshold(1, &config, &mut threshold);
        adjust_compatibility_threshold(1, &config, &mut threshold);
        assert!((threshold - config.min_compatibility_threshold).abs() < 1e-6);

        // Too many species: threshold grows.
        adjust_compatibility_threshold(config.target_species_count + 5, &config, &mut threshold);
        assert!(threshold > config.min_compatibility_threshold);

        // On target: unchanged.
        let before = threshold;
        adjust_compatibility_threshold(config.target_species_count, &config, &mut threshold);
        assert!((threshold - before).abs() < 1e-6);
    }
}
