// Poisson Task Generator - seedable arrivals for the tick pipeline
// Each tick injects Poisson(λ) tasks with uniform size and CDF-drawn priority

use orbital_grid_engine::{Priority, TaskSpec};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Low 50%, Medium 35%, High 15%
const PRIORITY_CDF: [f64; 3] = [0.50, 0.85, 1.00];
const PRIORITIES: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

/// Integer draw ranges, inclusive.
const ENERGY_NEED: (u32, u32) = (5, 15);
const PROCESSING_NEED: (u32, u32) = (500, 2000);

pub struct TrafficGenerator {
    rng: ChaCha8Rng,
    pub spawn_count: u32,
    pub priority_counts: [u32; 3],
}

impl TrafficGenerator {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            spawn_count: 0,
            priority_counts: [0; 3],
        }
    }

    /// Tasks to inject this tick. `lambda` is the expected arrivals per tick.
    pub fn generate_tick(&mut self, lambda: f64) -> Vec<TaskSpec> {
        if lambda <= 0.0 {
            return Vec::new();
        }

        let n_tasks = poisson_sample(&mut self.rng, lambda);
        let mut specs = Vec::with_capacity(n_tasks as usize);

        for _ in 0..n_tasks {
            let tier = select_priority(&mut self.rng);
            self.priority_counts[tier] += 1;

            let energy_need = self.rng.gen_range(ENERGY_NEED.0..=ENERGY_NEED.1) as f64;
            let processing_power_needed = self.rng.gen_range(PROCESSING_NEED.0..=PROCESSING_NEED.1) as f64;

            specs.push(TaskSpec { energy_need, processing_power_needed, priority: PRIORITIES[tier] });
            self.spawn_count += 1;
        }

        specs
    }

    /// λ = load × 0.2 × (nodes / 4). At `load` 1.0 the seeded fleet's
    /// processing is roughly saturated and NoCapacity drops begin.
    pub fn compute_lambda(load: f64, nodes: usize) -> f64 {
        load * 0.2 * (nodes as f64 / 4.0)
    }
}

/// Poisson sampling via Knuth algorithm.
/// For λ < 30, uses direct method. For larger λ, uses normal approximation.
fn poisson_sample(rng: &mut ChaCha8Rng, lambda: f64) -> u32 {
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k: u32 = 0;
        let mut p: f64 = 1.0;
        loop {
            k += 1;
            p *= rng.gen::<f64>();
            if p <= l {
                return k - 1;
            }
        }
    } else {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let result = lambda + lambda.sqrt() * z;
        result.round().max(0.0) as u32
    }
}

fn select_priority(rng: &mut ChaCha8Rng) -> usize {
    let r: f64 = rng.gen();
    for (i, &cdf) in PRIORITY_CDF.iter().enumerate() {
        if r < cdf {
            return i;
        }
    }
    PRIORITY_CDF.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_poisson_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let lambda = 4.0;
        let n = 10000;
        let sum: u64 = (0..n).map(|_| poisson_sample(&mut rng, lambda) as u64).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - lambda).abs() < 0.3, "Poisson mean {} far from λ={}", mean, lambda);
    }

    #[test]
    fn test_priority_distribution() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 10000;
        let mut counts = [0u32; 3];
        for _ in 0..n {
            counts[select_priority(&mut rng)] += 1;
        }
        let pcts: Vec<f64> = counts.iter().map(|&c| c as f64 / n as f64 * 100.0).collect();
        assert!((pcts[0] - 50.0).abs() < 3.0, "low: {:.1}% expected ~50%", pcts[0]);
        assert!((pcts[1] - 35.0).abs() < 3.0, "medium: {:.1}% expected ~35%", pcts[1]);
        assert!((pcts[2] - 15.0).abs() < 3.0, "high: {:.1}% expected ~15%", pcts[2]);
    }

    #[test]
    fn test_specs_within_ranges() {
        let mut traffic = TrafficGenerator::new(ChaCha8Rng::seed_from_u64(7));
        let specs: Vec<TaskSpec> = (0..200).flat_map(|_| traffic.generate_tick(3.0)).collect();
        assert_eq!(specs.len() as u32, traffic.spawn_count);
        assert_eq!(traffic.priority_counts.iter().sum::<u32>(), traffic.spawn_count);
        for spec in &specs {
            assert!((5.0..=15.0).contains(&spec.energy_need));
            assert!((500.0..=2000.0).contains(&spec.processing_power_needed));
        }
    }

    #[test]
    fn test_zero_lambda_is_silent() {
        let mut traffic = TrafficGenerator::new(ChaCha8Rng::seed_from_u64(1));
        assert!(traffic.generate_tick(0.0).is_empty());
        assert_eq!(traffic.spawn_count, 0);
    }
}
