//! Splitting an overflowing node.
//!
//! A split promotes two entries to routing objects and partitions the rest
//! with a generalized hyperplane: every entry goes to the nearer of the two
//! promoted objects. Entries are placed in order of decreasing preference
//! strength, and a group that can only reach the minimum fill by taking every
//! remaining entry takes them all, so both halves always hold at least
//! `min_fill` entries.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::index::config::PromotionPolicy;
use crate::index::mtree::node::Member;
use crate::vector::{MetricSpace, Vector};

/// One half of a split node.
#[derive(Debug)]
pub(crate) struct Group<E> {
    pub pivot: Arc<Vector>,
    pub radius: f32,
    pub members: Vec<E>,
}

/// Pairwise distances between the entries of the overflowing node.
struct Distances {
    n: usize,
    values: Vec<f32>,
}

impl Distances {
    fn compute<E: Member>(space: &MetricSpace, entries: &[E]) -> Self {
        let n = entries.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = space.distance(&entries[i].object().data, &entries[j].object().data);
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Self { n, values }
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f32 {
        self.values[i * self.n + j]
    }
}

#[derive(Debug, Clone)]
struct Partition {
    left_pivot: usize,
    right_pivot: usize,
    left: Vec<usize>,
    right: Vec<usize>,
    left_radius: f32,
    right_radius: f32,
}

impl Partition {
    fn cost(&self, policy: PromotionPolicy) -> f32 {
        match policy {
            PromotionPolicy::MinSumRadius => self.left_radius + self.right_radius,
            _ => self.left_radius.max(self.right_radius),
        }
    }
}

/// Split `entries` into two groups according to `policy`.
pub(crate) fn split<E: Member>(
    space: &MetricSpace,
    entries: Vec<E>,
    policy: PromotionPolicy,
    min_fill: usize,
) -> (Group<E>, Group<E>) {
    let distances = Distances::compute(space, &entries);
    let reach: Vec<f32> = entries.iter().map(Member::reach).collect();
    let partition = promote(&distances, &reach, policy, min_fill);

    let left_pivot = Arc::clone(entries[partition.left_pivot].object());
    let right_pivot = Arc::clone(entries[partition.right_pivot].object());

    let mut slots: Vec<Option<E>> = entries.into_iter().map(Some).collect();
    let mut collect = |indices: &[usize], pivot: usize| -> Vec<E> {
        indices
            .iter()
            .filter_map(|&i| {
                slots[i].take().map(|mut entry| {
                    entry.set_parent_distance(distances.get(pivot, i));
                    entry
                })
            })
            .collect()
    };
    let left_members = collect(&partition.left, partition.left_pivot);
    let right_members = collect(&partition.right, partition.right_pivot);

    (
        Group {
            pivot: left_pivot,
            radius: partition.left_radius,
            members: left_members,
        },
        Group {
            pivot: right_pivot,
            radius: partition.right_radius,
            members: right_members,
        },
    )
}

fn promote(
    distances: &Distances,
    reach: &[f32],
    policy: PromotionPolicy,
    min_fill: usize,
) -> Partition {
    let n = distances.n;
    match policy {
        PromotionPolicy::MaxSpread => {
            let (mut a, mut b, mut spread) = (0, 1, f32::NEG_INFINITY);
            for i in 0..n {
                for j in (i + 1)..n {
                    if distances.get(i, j) > spread {
                        (a, b, spread) = (i, j, distances.get(i, j));
                    }
                }
            }
            partition(distances, reach, a, b, min_fill)
        }
        PromotionPolicy::MinMaxRadius | PromotionPolicy::MinSumRadius => {
            let mut best: Option<(f32, Partition)> = None;
            for i in 0..n {
                for j in (i + 1)..n {
                    let candidate = partition(distances, reach, i, j, min_fill);
                    let cost = candidate.cost(policy);
                    if best.as_ref().is_none_or(|(c, _)| cost < *c) {
                        best = Some((cost, candidate));
                    }
                }
            }
            match best {
                Some((_, p)) => p,
                None => partition(distances, reach, 0, 1, min_fill),
            }
        }
    }
}

fn partition(
    distances: &Distances,
    reach: &[f32],
    a: usize,
    b: usize,
    min_fill: usize,
) -> Partition {
    let preference = |i: usize| (distances.get(i, a) - distances.get(i, b)).abs();
    let mut rest: Vec<usize> = (0..distances.n).filter(|&i| i != a && i != b).collect();
    rest.sort_by(|&x, &y| preference(y).total_cmp(&preference(x)).then(x.cmp(&y)));

    let mut left = vec![a];
    let mut right = vec![b];
    let total = rest.len();
    for (placed, &i) in rest.iter().enumerate() {
        let remaining = total - placed;
        let to_left = if min_fill.saturating_sub(left.len()) >= remaining {
            true
        } else if min_fill.saturating_sub(right.len()) >= remaining {
            false
        } else {
            match distances.get(i, a).total_cmp(&distances.get(i, b)) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => left.len() <= right.len(),
            }
        };
        if to_left {
            left.push(i);
        } else {
            right.push(i);
        }
    }

    let radius = |pivot: usize, members: &[usize]| {
        members
            .iter()
            .map(|&m| distances.get(pivot, m) + reach[m])
            .fold(0.0f32, f32::max)
    };
    Partition {
        left_pivot: a,
        right_pivot: b,
        left_radius: radius(a, &left),
        right_radius: radius(b, &right),
        left,
        right,
    }
}
