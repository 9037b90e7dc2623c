//! This module contains a K-Means implementation with k-means++ seeding and
//! randomized restarts.
//!
//! Points are `[lat, lon]` pairs clustered directly in coordinate space.
//! Every restart draws its seeds from the supplied random source; the best
//! restart wins, so two runs over the same input may legitimately disagree.

use rand::Rng;

/// Relative inertia difference under which two restarts count as a tie.
const TIE_TOLERANCE: f64 = 0.01;

/// The outcome of a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Cluster index of each input point, in input order.
    pub labels: Vec<usize>,
    /// Cluster centers, indexed by label.
    pub centers: Vec<[f64; 2]>,
    /// Sum of squared distances from each point to its center.
    pub inertia: f64,
}

impl Partition {
    /// Number of members per cluster.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centers.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Variance of the cluster sizes; lower is better balanced.
    fn size_variance(&self) -> f64 {
        let sizes = self.sizes();
        let mean = self.labels.len() as f64 / sizes.len() as f64;
        sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / sizes.len() as f64
    }

    /// Whether `self` should replace `best` as the preferred restart.
    fn improves_on(&self, best: &Self) -> bool {
        let scale = best.inertia.abs().max(f64::EPSILON);
        if (self.inertia - best.inertia).abs() / scale <= TIE_TOLERANCE {
            self.size_variance() < best.size_variance()
        } else {
            self.inertia < best.inertia
        }
    }
}

/// K-Means with several k-means++ seeded restarts.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
    restarts: usize,
}

impl KMeans {
    /// Creates a new K-Means instance. Zero restarts or iterations are raised
    /// to one.
    pub fn new(k: usize, max_iterations: usize, restarts: usize) -> Self {
        Self {
            k,
            max_iterations: max_iterations.max(1),
            restarts: restarts.max(1),
        }
    }

    /// Partitions `data` into `min(k, distinct points)` non-empty clusters.
    ///
    /// Returns `None` for empty input or `k == 0`.
    pub fn fit<R: Rng + ?Sized>(&self, data: &[[f64; 2]], rng: &mut R) -> Option<Partition> {
        let k = self.k.min(count_distinct(data));
        if k == 0 {
            return None;
        }

        let mut best: Option<Partition> = None;
        for _ in 0..self.restarts {
            let candidate = self.run_once(data, k, rng);
            if best.as_ref().is_none_or(|best| candidate.improves_on(best)) {
                best = Some(candidate);
            }
        }

        best
    }

    fn run_once<R: Rng + ?Sized>(&self, data: &[[f64; 2]], k: usize, rng: &mut R) -> Partition {
        let mut centers = seed_centers(data, k, rng);
        let mut labels = assign_labels(data, &centers);

        for _ in 0..self.max_iterations {
            centers = update_centers(data, &labels, &centers);
            fill_empty_clusters(data, &mut labels, &mut centers);

            let next_labels = assign_labels(data, &centers);
            if next_labels == labels {
                break;
            }
            labels = next_labels;
        }

        // Reassignment may empty a cluster on the final iteration.
        fill_empty_clusters(data, &mut labels, &mut centers);
        let inertia = data
            .iter()
            .zip(&labels)
            .map(|(point, &label)| squared_distance(point, &centers[label]))
            .sum();

        Partition {
            labels,
            centers,
            inertia,
        }
    }
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let (dx, dy) = (a[0] - b[0], a[1] - b[1]);
    dx * dx + dy * dy
}

fn count_distinct(data: &[[f64; 2]]) -> usize {
    let mut seen: Vec<[f64; 2]> = Vec::new();
    for point in data {
        if !seen.contains(point) {
            seen.push(*point);
        }
    }
    seen.len()
}

/// k-means++ seeding: each next center is drawn with probability
/// proportional to its squared distance from the nearest chosen center.
fn seed_centers<R: Rng + ?Sized>(data: &[[f64; 2]], k: usize, rng: &mut R) -> Vec<[f64; 2]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(data[rng.random_range(0..data.len())]);

    let mut nearest: Vec<f64> = data.iter().map(|p| squared_distance(p, &centers[0])).collect();

    while centers.len() < k {
        let total: f64 = nearest.iter().sum();
        // k never exceeds the number of distinct points, so total > 0 here.
        let mut target = rng.random::<f64>() * total;

        let next = nearest
            .iter()
            .position(|&d| {
                target -= d;
                d > 0.0 && target <= 0.0
            })
            .or_else(|| nearest.iter().rposition(|&d| d > 0.0))
            .unwrap_or(0);

        let center = data[next];
        centers.push(center);
        for (point, best) in data.iter().zip(nearest.iter_mut()) {
            *best = best.min(squared_distance(point, &center));
        }
    }

    centers
}

fn assign_labels(data: &[[f64; 2]], centers: &[[f64; 2]]) -> Vec<usize> {
    data.iter()
        .map(|point| {
            centers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| squared_distance(point, a).total_cmp(&squared_distance(point, b)))
                .map_or(0, |(index, _)| index)
        })
        .collect()
}

fn update_centers(data: &[[f64; 2]], labels: &[usize], previous: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut sums = vec![[0.0, 0.0]; previous.len()];
    let mut counts = vec![0_usize; previous.len()];

    for (point, &label) in data.iter().zip(labels) {
        sums[label][0] += point[0];
        sums[label][1] += point[1];
        counts[label] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                *prev
            } else {
                [sum[0] / count as f64, sum[1] / count as f64]
            }
        })
        .collect()
}

/// Moves the point farthest from its center into each empty cluster, taking
/// only from clusters with more than one member.
fn fill_empty_clusters(data: &[[f64; 2]], labels: &mut [usize], centers: &mut [[f64; 2]]) {
    loop {
        let mut sizes = vec![0_usize; centers.len()];
        for &label in labels.iter() {
            sizes[label] += 1;
        }

        let Some(empty) = sizes.iter().position(|&size| size == 0) else {
            return;
        };

        let donor = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| sizes[label] > 1)
            .max_by(|&(a, &la), &(b, &lb)| {
                squared_distance(&data[a], &centers[la]).total_cmp(&squared_distance(&data[b], &centers[lb]))
            })
            .map(|(index, _)| index);

        let Some(index) = donor else {
            return;
        };

        labels[index] = empty;
        centers[empty] = data[index];
    }
}
