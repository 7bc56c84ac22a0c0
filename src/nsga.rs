//! NSGA-II multi-objective selection primitives.
//!
//! Pure functions over objective vectors: Pareto dominance, fast
//! non-dominated sorting, crowding distance, and truncated selection. Higher
//! is better on every objective. The evolution engine is the only caller; it
//! uses [`scalarize`] to fold Pareto structure into the scalar fitness that
//! downstream fitness sharing and offspring allocation understand.

/// Fraction of the maximum raw objective sum available as crowding bonus.
const CROWD_BONUS_CAP: f32 = 0.1;

/// True iff `a` is at least as good as `b` on every objective and strictly
/// better on at least one.
#[must_use]
pub fn dominates(a: &[f32], b: &[f32]) -> bool {
    let mut strictly_better = false;
    for (&x, &y) in a.iter().zip(b.iter()) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Fast non-dominated sort.
///
/// Returns fronts in rank order: front 0 holds individuals dominated by no
/// one; each later front holds individuals dominated only by earlier fronts.
/// O(M·N²) for M objectives and N individuals.
#[must_use]
pub fn non_dominated_sort(objectives: &[Vec<f32>]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&objectives[i], &objectives[j]) {
                dominated_by[i].push(j);
            } else if dominates(&objectives[j], &objectives[i]) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            current.push(i);
        }
    }

    while !current.is_empty() {
        let mut next: Vec<usize> = Vec::new();
        for &i in &current {
            for &j in &dominated_by[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        fronts.push(std::mem::replace(&mut current, next));
    }

    fronts
}

/// Crowding distance for one front, parallel to `front`.
///
/// Fronts of size ≤ 2 get infinite distance for every member. Otherwise each
/// objective dimension contributes `(next - prev) / range` to interior
/// members and infinity to the two boundary members; a dimension with zero
/// range contributes nothing.
#[must_use]
pub fn crowding_distance(front: &[usize], objectives: &[Vec<f32>]) -> Vec<f32> {
    let size = front.len();
    if size <= 2 {
        return vec![f32::INFINITY; size];
    }

    let dims = front
        .iter()
        .filter_map(|&i| objectives.get(i))
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let value = |idx: usize, dim: usize| -> f32 {
        objectives
            .get(idx)
            .and_then(|o| o.get(dim))
            .copied()
            .unwrap_or(0.0)
    };

    let mut distance = vec![0.0f32; size];
    // Positions into `front`/`distance`, re-sorted per dimension.
    let mut order: Vec<usize> = (0..size).collect();

    for dim in 0..dims {
        order.sort_by(|&a, &b| {
            value(front[a], dim)
                .partial_cmp(&value(front[b], dim))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let low = value(front[order[0]], dim);
        let high = value(front[order[size - 1]], dim);
        let range = high - low;
        if range <= 0.0 {
            continue;
        }

        distance[order[0]] = f32::INFINITY;
        distance[order[size - 1]] = f32::INFINITY;
        for pos in 1..size - 1 {
            let prev = value(front[order[pos - 1]], dim);
            let next = value(front[order[pos + 1]], dim);
            distance[order[pos]] += (next - prev) / range;
        }
    }

    distance
}

/// Select `target_size` individuals by Pareto rank, breaking ties on the
/// overflowing front by crowding distance.
///
/// Returns every index when `target_size` covers the whole population.
#[must_use]
pub fn select(objectives: &[Vec<f32>], target_size: usize) -> Vec<usize> {
    let n = objectives.len();
    if target_size >= n {
        return (0..n).collect();
    }

    let mut selected = Vec::with_capacity(target_size);
    for front in non_dominated_sort(objectives) {
        if selected.len() + front.len() <= target_size {
            selected.extend_from_slice(&front);
            if selected.len() == target_size {
                break;
            }
            continue;
        }

        // Overflowing front: most-crowded-out first.
        let distance = crowding_distance(&front, objectives);
        let mut ranked: Vec<(usize, f32)> =
            front.iter().copied().zip(distance).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        selected.extend(
            ranked
                .into_iter()
                .take(target_size - selected.len())
                .map(|(idx, _)| idx),
        );
        break;
    }

    selected
}

/// Fold multi-objective scores into scalar fitness.
///
/// `scalar = raw_sum + rank_bonus + crowd_bonus` where `rank_bonus` starts at
/// the population's maximum raw sum and halves per front, and `crowd_bonus`
/// is capped at 10% of that maximum. The result stays usable by rank-agnostic
/// downstream code (fitness sharing, offspring allocation) while still
/// reflecting Pareto structure.
#[must_use]
pub fn scalarize(objectives: &[Vec<f32>]) -> Vec<f32> {
    let raw: Vec<f32> = objectives.iter().map(|o| o.iter().sum()).collect();
    let max_raw = raw.iter().copied().fold(0.0f32, f32::max);
    let base = if max_raw > 0.0 { max_raw } else { 1.0 };
    let cap = CROWD_BONUS_CAP * base;

    let mut scalar = raw.clone();
    for (rank, front) in non_dominated_sort(objectives).iter().enumerate() {
        let rank_bonus = base / 2.0f32.powi(rank as i32);
        let distance = crowding_distance(front, objectives);
        for (&idx, &d) in front.iter().zip(&distance) {
            let crowd_bonus = if d.is_finite() { cap * (d / (d + 1.0)) } else { cap };
            scalar[idx] = raw[idx] + rank_bonus + crowd_bonus;
        }
    }
    scalar
}
