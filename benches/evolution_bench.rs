//! Benchmarks for empire-neat.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use empire_neat::{nsga, Genome, InnovationTracker, NeatConfig, Network, Population};

fn grown_genome(
    config: &NeatConfig,
    tracker: &mut InnovationTracker,
    rng: &mut ChaCha8Rng,
    rounds: usize,
) -> Genome {
    let aggressive = NeatConfig {
        add_node_rate: 0.5,
        add_connection_rate: 0.5,
        ..config.clone()
    };
    let mut genome = Genome::fully_connected(config, tracker, rng);
    for _ in 0..rounds {
        genome.mutate(&aggressive, tracker, rng);
    }
    genome
}

fn bench_mutation(c: &mut Criterion) {
    let config = NeatConfig::new(4, 2);
    let mut tracker = InnovationTracker::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let genome = grown_genome(&config, &mut tracker, &mut rng, 10);

    c.bench_function("genome_mutation", |b| {
        let mut g = genome.clone();
        b.iter(|| {
            g.mutate(&config, &mut tracker, &mut rng);
            black_box(&g);
        });
    });
}

fn bench_crossover(c: &mut Criterion) {
    let config = NeatConfig::new(4, 2);
    let mut tracker = InnovationTracker::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let mut parent_a = grown_genome(&config, &mut tracker, &mut rng, 10);
    let mut parent_b = grown_genome(&config, &mut tracker, &mut rng, 10);
    parent_a.fitness = 1.0;
    parent_b.fitness = 0.5;

    c.bench_function("genome_crossover", |b| {
        b.iter(|| {
            black_box(parent_a.crossover(&parent_b, &config, &mut rng));
        });
    });
}

fn bench_compatibility(c: &mut Criterion) {
    let config = NeatConfig::new(4, 2);
    let mut tracker = InnovationTracker::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let genome_a = grown_genome(&config, &mut tracker, &mut rng, 15);
    let genome_b = grown_genome(&config, &mut tracker, &mut rng, 15);

    c.bench_function("compatibility_distance", |b| {
        b.iter(|| {
            black_box(genome_a.compatibility(&genome_b, &config));
        });
    });
}

fn bench_network_forward(c: &mut Criterion) {
    let config = NeatConfig::new(8, 4);
    let mut tracker = InnovationTracker::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let genome = grown_genome(&config, &mut tracker, &mut rng, 20);
    let mut network = Network::from_genome(&genome);
    let inputs = [0.5f32; 8];

    c.bench_function("network_from_genome", |b| {
        b.iter(|| {
            black_box(Network::from_genome(&genome));
        });
    });

    c.bench_function("network_forward", |b| {
        b.iter(|| {
            black_box(network.forward(&inputs));
        });
    });
}

fn bench_nsga_select(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let objectives: Vec<Vec<f32>> = (0..200)
        .map(|_| (0..3).map(|_| rng.random::<f32>()).collect())
        .collect();

    c.bench_function("nsga_sort_200", |b| {
        b.iter(|| {
            black_box(nsga::non_dominated_sort(&objectives));
        });
    });

    c.bench_function("nsga_select_200_to_50", |b| {
        b.iter(|| {
            black_box(nsga::select(&objectives, 50));
        });
    });
}

fn bench_evolve_generation(c: &mut Criterion) {
    let config = NeatConfig {
        population_size: 100,
        ..NeatConfig::new(8, 4)
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut population = Population::new(config, &mut rng);
    for idx in 0..population.genomes().len() {
        population.set_fitness(idx, idx as f32 * 0.01);
    }

    c.bench_function("population_evolve_100", |b| {
        b.iter(|| {
            for idx in 0..population.genomes().len() {
                population.set_fitness(idx, (idx % 17) as f32 * 0.1);
            }
            population.evolve(&mut rng);
        });
    });
}

criterion_group!(
    benches,
    bench_mutation,
    bench_crossover,
    bench_compatibility,
    bench_network_forward,
    bench_nsga_select,
    bench_evolve_generation,
);
criterion_main!(benches);
