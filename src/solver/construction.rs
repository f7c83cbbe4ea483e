use super::model::{Problem, Solution};

/// Builds a first solution by extending each vehicle's path with the
/// cheapest feasible arc, then falling back to cheapest feasible insertion
/// for anything the greedy pass could not place. Returns the solution and
/// the nodes that no vehicle can serve.
pub(crate) fn path_cheapest_arc(problem: &Problem) -> (Solution, Vec<usize>) {
    let num_vehicles = problem.num_vehicles();
    let mut solution: Solution = vec![Vec::new(); num_vehicles];
    let mut unassigned: Vec<usize> = problem.required.clone();

    for vehicle in 0..num_vehicles {
        loop {
            let tail = solution[vehicle]
                .last()
                .copied()
                .unwrap_or(problem.starts[vehicle]);

            let mut best: Option<(i64, usize)> = None;
            for (pos, &node) in unassigned.iter().enumerate() {
                let mut candidate = solution[vehicle].clone();
                candidate.push(node);
                if problem.evaluate_route(vehicle, &candidate).is_some() {
                    let arc = problem.cost[tail][node];
                    if best.map_or(true, |(cost, _)| arc < cost) {
                        best = Some((arc, pos));
                    }
                }
            }

            match best {
                Some((_, pos)) => {
                    let node = unassigned.swap_remove(pos);
                    solution[vehicle].push(node);
                }
                None => break,
            }
        }
    }

    let mut leftover = Vec::new();
    for node in unassigned {
        match cheapest_insertion(problem, &solution, node) {
            Some((vehicle, pos)) => solution[vehicle].insert(pos, node),
            None => leftover.push(node),
        }
    }

    (solution, leftover)
}

fn cheapest_insertion(
    problem: &Problem,
    solution: &Solution,
    node: usize,
) -> Option<(usize, usize)> {
    let mut best: Option<(i64, usize, usize)> = None;
    for (vehicle, interior) in solution.iter().enumerate() {
        let current_cost = problem
            .evaluate_route(vehicle, interior)
            .map_or(0, |eval| eval.cost);
        for pos in 0..=interior.len() {
            let mut candidate = interior.clone();
            candidate.insert(pos, node);
            if let Some(eval) = problem.evaluate_route(vehicle, &candidate) {
                let delta = eval.cost - current_cost;
                if best.map_or(true, |(cost, _, _)| delta < cost) {
                    best = Some((delta, vehicle, pos));
                }
            }
        }
    }
    best.map(|(_, vehicle, pos)| (vehicle, pos))
}
