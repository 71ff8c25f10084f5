//! Differential evolution through the generic search driver.

use std::time::Duration;

use ridetwin::search::{
    run_search, CancellationToken, DifferentialEvolution, DifferentialEvolutionConfig,
    Evaluation, Fitness, SearchBudget, SearchSpace, Termination,
};

/// Distance to a fixed target, acceptable within a small radius.
struct Target(Vec<f64>);

impl Fitness for Target {
    fn evaluate(&self, candidate: &[f64]) -> Evaluation {
        let dist = candidate
            .iter()
            .zip(&self.0)
            .map(|(c, t)| (c - t).powi(2))
            .sum::<f64>()
            .sqrt();
        Evaluation {
            fitness: dist,
            magnitude: candidate.iter().map(|c| c * c).sum::<f64>().sqrt(),
            acceptable: dist < 1e-3,
        }
    }
}

fn space() -> SearchSpace {
    SearchSpace::new(&[(-2.0, 2.0), (-2.0, 2.0), (0.0, 1.0)]).unwrap()
}

fn budget(generations: usize) -> SearchBudget {
    SearchBudget {
        max_generations: generations,
        ..Default::default()
    }
}

#[test]
fn test_converges_on_target() {
    let fitness = Target(vec![0.5, -1.2, 0.3]);
    let mut optimizer = DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(9));
    let outcome = run_search(&mut optimizer, &fitness, &space(), &[], &budget(200), |_| {});
    assert!(outcome.best.evaluation.fitness < 1e-2);
}

#[test]
fn test_seeded_runs_are_identical() {
    let fitness = Target(vec![1.0, 1.0, 0.5]);
    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    let a = run_search(
        &mut DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(5)),
        &fitness,
        &space(),
        &[],
        &budget(20),
        |s| seen_a.push(s.position.clone()),
    );
    let b = run_search(
        &mut DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(5)),
        &fitness,
        &space(),
        &[],
        &budget(20),
        |s| seen_b.push(s.position.clone()),
    );
    assert_eq!(a.best, b.best);
    assert_eq!(seen_a, seen_b);
    assert_eq!(a.evaluations, seen_a.len());
}

#[test]
fn test_candidates_stay_in_bounds() {
    let fitness = Target(vec![5.0, 5.0, 5.0]);
    let space = space();
    let mut optimizer = DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(1));
    run_search(&mut optimizer, &fitness, &space, &[], &budget(30), |s| {
        for (dim, value) in s.position.iter().enumerate() {
            assert!(*value >= space.lower(dim) && *value <= space.upper(dim));
        }
    });
}

#[test]
fn test_stall_stops_early() {
    let fitness = Target(vec![0.0, 0.0, 0.0]);
    let mut optimizer = DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(2));
    let outcome = run_search(
        &mut optimizer,
        &fitness,
        &space(),
        &[vec![0.0, 0.0, 0.0]],
        &SearchBudget {
            max_generations: 500,
            stall_generations: Some(3),
            ..Default::default()
        },
        |_| {},
    );
    assert_eq!(outcome.termination, Termination::Converged);
    assert!(outcome.generations <= 3);
}

#[test]
fn test_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let fitness = Target(vec![0.0, 0.0, 0.0]);
    let mut optimizer = DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(2));
    let outcome = run_search(
        &mut optimizer,
        &fitness,
        &space(),
        &[],
        &SearchBudget {
            max_generations: 100,
            cancellation: Some(token),
            ..Default::default()
        },
        |_| {},
    );
    assert_eq!(outcome.termination, Termination::Cancelled);
    assert_eq!(outcome.generations, 0);
}

#[test]
fn test_zero_time_limit() {
    let fitness = Target(vec![0.0, 0.0, 0.0]);
    let mut optimizer = DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(4));
    let outcome = run_search(
        &mut optimizer,
        &fitness,
        &space(),
        &[],
        &SearchBudget {
            max_generations: 100,
            time_limit: Some(Duration::ZERO),
            ..Default::default()
        },
        |_| {},
    );
    assert_eq!(outcome.termination, Termination::TimedOut);
    assert_eq!(outcome.generations, 0);
    assert_eq!(outcome.evaluations, 50);
}

#[test]
fn test_slow_fitness_hits_time_limit() {
    struct Slow;

    impl Fitness for Slow {
        fn evaluate(&self, candidate: &[f64]) -> Evaluation {
            std::thread::sleep(Duration::from_millis(2));
            Evaluation {
                fitness: candidate.iter().map(|c| c * c).sum(),
                magnitude: 0.0,
                acceptable: false,
            }
        }
    }

    let mut optimizer = DifferentialEvolution::new(
        DifferentialEvolutionConfig {
            population_size: 8,
            ..Default::default()
        },
        Some(4),
    );
    let outcome = run_search(
        &mut optimizer,
        &Slow,
        &space(),
        &[],
        &SearchBudget {
            max_generations: 100_000,
            time_limit: Some(Duration::from_millis(50)),
            ..Default::default()
        },
        |_| {},
    );
    assert_eq!(outcome.termination, Termination::TimedOut);
    assert!(outcome.generations < 100_000);
}

#[test]
fn test_feasible_best_is_never_displaced() {
    // Lower fitness sits just outside the acceptable region
    struct Boundary;

    impl Fitness for Boundary {
        fn evaluate(&self, candidate: &[f64]) -> Evaluation {
            let x = candidate[0];
            Evaluation {
                fitness: x.abs(),
                magnitude: x.abs(),
                acceptable: x >= 0.5,
            }
        }
    }

    let space = SearchSpace::new(&[(-1.0, 1.0)]).unwrap();
    let mut optimizer = DifferentialEvolution::new(DifferentialEvolutionConfig::default(), Some(8));
    let outcome = run_search(&mut optimizer, &Boundary, &space, &[vec![0.9]], &budget(100), |_| {});
    assert!(outcome.best.evaluation.acceptable);
    assert!(outcome.best.position[0] >= 0.5);
    assert!(outcome.best.position[0] < 0.55);
}
