use std::time::Instant;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use super::model::{Problem, Solution};

/// Rounds without a new best before the search gives up early.
const MAX_STAGNATION: usize = 20;
/// Upper bound on moves scored per round; enumeration is truncated
/// deterministically beyond this.
const MOVE_LIMIT: usize = 20_000;

#[derive(Debug, Clone, Copy)]
enum Move {
    Relocate {
        from_vehicle: usize,
        from_pos: usize,
        to_vehicle: usize,
        to_pos: usize,
    },
    Swap {
        first: (usize, usize),
        second: (usize, usize),
    },
    Reverse {
        vehicle: usize,
        from: usize,
        to: usize,
    },
}

fn apply_move(solution: &Solution, mv: Move) -> Solution {
    let mut next = solution.clone();
    match mv {
        Move::Relocate {
            from_vehicle,
            from_pos,
            to_vehicle,
            to_pos,
        } => {
            let node = next[from_vehicle].remove(from_pos);
            let target = &mut next[to_vehicle];
            target.insert(to_pos.min(target.len()), node);
        }
        Move::Swap { first, second } => {
            let a = next[first.0][first.1];
            let b = next[second.0][second.1];
            next[first.0][first.1] = b;
            next[second.0][second.1] = a;
        }
        Move::Reverse { vehicle, from, to } => {
            next[vehicle][from..=to].reverse();
        }
    }
    next
}

/// Full move neighbourhood: relocations between (and within) routes,
/// inter-route swaps, and intra-route segment reversals.
fn enumerate_moves(solution: &Solution) -> Vec<Move> {
    let mut moves = Vec::new();
    let num_vehicles = solution.len();

    'outer: for from_vehicle in 0..num_vehicles {
        for from_pos in 0..solution[from_vehicle].len() {
            for to_vehicle in 0..num_vehicles {
                let positions = if to_vehicle == from_vehicle {
                    solution[to_vehicle].len()
                } else {
                    solution[to_vehicle].len() + 1
                };
                for to_pos in 0..positions {
                    if to_vehicle == from_vehicle && to_pos == from_pos {
                        continue;
                    }
                    moves.push(Move::Relocate {
                        from_vehicle,
                        from_pos,
                        to_vehicle,
                        to_pos,
                    });
                    if moves.len() >= MOVE_LIMIT {
                        break 'outer;
                    }
                }
            }
        }
    }

    'swaps: for v1 in 0..num_vehicles {
        for p1 in 0..solution[v1].len() {
            for v2 in v1..num_vehicles {
                let start = if v1 == v2 { p1 + 1 } else { 0 };
                for p2 in start..solution[v2].len() {
                    moves.push(Move::Swap {
                        first: (v1, p1),
                        second: (v2, p2),
                    });
                    if moves.len() >= MOVE_LIMIT {
                        break 'swaps;
                    }
                }
            }
        }
    }

    'reversals: for vehicle in 0..num_vehicles {
        let len = solution[vehicle].len();
        for from in 0..len {
            for to in (from + 1)..len {
                moves.push(Move::Reverse { vehicle, from, to });
                if moves.len() >= MOVE_LIMIT {
                    break 'reversals;
                }
            }
        }
    }

    moves
}

/// Random diversification kick in the spirit of the tabu search mutations:
/// reverse a random slice of a random route and swap two random nodes
/// across routes, reverting if the result is infeasible.
fn perturb(problem: &Problem, solution: &mut Solution, rng: &mut ChaCha8Rng) {
    let snapshot = solution.clone();

    let candidates: Vec<usize> = (0..solution.len())
        .filter(|&v| solution[v].len() >= 2)
        .collect();
    if let Some(&vehicle) = candidates.choose(rng) {
        let len = solution[vehicle].len();
        let mut pair = [rng.gen_range(0..len), rng.gen_range(0..len)];
        pair.sort_unstable();
        solution[vehicle][pair[0]..=pair[1]].reverse();
    }

    let occupied: Vec<(usize, usize)> = solution
        .iter()
        .enumerate()
        .flat_map(|(v, route)| (0..route.len()).map(move |p| (v, p)))
        .collect();
    if occupied.len() >= 2 {
        let a = occupied[rng.gen_range(0..occupied.len())];
        let b = occupied[rng.gen_range(0..occupied.len())];
        if a != b {
            let node_a = solution[a.0][a.1];
            let node_b = solution[b.0][b.1];
            solution[a.0][a.1] = node_b;
            solution[b.0][b.1] = node_a;
        }
    }

    if problem.objective(solution).is_none() {
        *solution = snapshot;
    }
}

/// Improves a feasible solution under a wall-clock deadline: each round
/// scores the whole neighbourhood in parallel and takes the best improving
/// move; stagnant rounds trigger a seeded perturbation.
pub(crate) fn improve(
    problem: &Problem,
    initial: Solution,
    deadline: Instant,
    seed: u64,
) -> Solution {
    let Some(mut current_obj) = problem.objective(&initial) else {
        return initial;
    };
    let mut current = initial;
    let mut best = current.clone();
    let mut best_obj = current_obj;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut stagnation = 0usize;
    let mut rounds = 0usize;

    while Instant::now() < deadline && stagnation < MAX_STAGNATION {
        rounds += 1;
        let moves = enumerate_moves(&current);

        let improving = moves
            .par_iter()
            .enumerate()
            .filter_map(|(idx, &mv)| {
                let candidate = apply_move(&current, mv);
                problem.objective(&candidate).map(|obj| ((obj, idx), mv))
            })
            .min_by_key(|(key, _)| *key);

        match improving {
            Some(((obj, _), mv)) if obj < current_obj => {
                current = apply_move(&current, mv);
                current_obj = obj;
                if obj < best_obj {
                    debug!("New best objective {} at round {}", obj, rounds);
                    best = current.clone();
                    best_obj = obj;
                    stagnation = 0;
                } else {
                    stagnation += 1;
                }
            }
            _ => {
                stagnation += 1;
                perturb(problem, &mut current, &mut rng);
                if let Some(obj) = problem.objective(&current) {
                    current_obj = obj;
                }
            }
        }
    }

    debug!(
        "Search finished after {} rounds, best objective {}",
        rounds, best_obj
    );
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Delivery, Vehicle};
    use std::time::Duration;

    fn ring_problem() -> Problem {
        // Four points on a square; the optimal tour follows the perimeter.
        let coords: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];
        let n = coords.len();
        let distances: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let (x1, y1) = coords[i];
                        let (x2, y2) = coords[j];
                        ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt()
                    })
                    .collect()
            })
            .collect();
        let ids: Vec<String> = ["depot", "a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let vehicles = vec![Vehicle::new("v1", 100.0, "depot")];
        let deliveries = vec![
            Delivery::new("d1", "a", 1.0),
            Delivery::new("d2", "b", 1.0),
            Delivery::new("d3", "c", 1.0),
        ];
        Problem::build(&distances, &ids, &vehicles, &deliveries, None).unwrap()
    }

    #[test]
    fn improves_a_deliberately_bad_tour() {
        let problem = ring_problem();
        // Zig-zag order: depot -> b -> a -> c -> depot is longer than the
        // perimeter tour depot -> a -> b -> c -> depot.
        let bad: Solution = vec![vec![2, 1, 3]];
        let deadline = Instant::now() + Duration::from_millis(500);
        let improved = improve(&problem, bad.clone(), deadline, 7);
        let before = problem.objective(&bad).unwrap();
        let after = problem.objective(&improved).unwrap();
        assert!(after <= before);
        assert_eq!(
            problem.objective(&improved),
            problem.objective(&vec![vec![1, 2, 3]]).min(problem.objective(&vec![vec![3, 2, 1]]))
        );
    }

    #[test]
    fn infeasible_input_is_returned_untouched() {
        let mut problem = ring_problem();
        // Shrink the vehicle so the given route overloads it; the search
        // hands back what it was given when the objective is undefined.
        problem.capacities[0] = 200;
        let infeasible: Solution = vec![vec![1, 2, 3]];
        assert!(problem.objective(&infeasible).is_none());
        let result = improve(
            &problem,
            infeasible.clone(),
            Instant::now() + Duration::from_millis(50),
            7,
        );
        assert_eq!(result, infeasible);
    }
}
