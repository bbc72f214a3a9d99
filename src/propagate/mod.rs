//! Warm-start flow propagation between consecutive frame pairs.
//!
//! The low-resolution flow of pair `(t-1, t)` is pushed forward along its own
//! vectors to initialize pair `(t, t+1)`. Each source pixel `(x, y)` lands at
//! `(x + u, y + v)`; landings outside the open box `0 < x' < W, 0 < y' < H`
//! are dropped. Every target pixel then takes the vector of the nearest
//! landing point, which also fills holes with the nearest valid neighbor.
//! This is a best-effort forward interpolation, not an exact inverse.
//!
//! Ties between equidistant landing points go to the source pixel that comes
//! first in row-major order.

use crate::flow::FlowField;

#[derive(Debug, Clone, Copy)]
struct Landing {
    x: f32,
    y: f32,
    u: f32,
    v: f32,
}

/// Forward-interpolate `flow` into an initializer for the next frame pair.
///
/// Returns the zero field when no vector lands inside the frame.
pub fn forward_interpolate(flow: &FlowField) -> FlowField {
    let (height, width) = flow.dims();
    let landings = collect_landings(flow);
    let mut out = FlowField::zeros(height, width);
    if landings.is_empty() {
        return out;
    }

    let tree = LandingTree::build(&landings);
    let data = out.data_mut();
    for ty in 0..height {
        for tx in 0..width {
            let nearest = &landings[tree.nearest(&landings, tx, ty)];
            data[[0, ty, tx]] = nearest.u;
            data[[1, ty, tx]] = nearest.v;
        }
    }
    out
}

fn collect_landings(flow: &FlowField) -> Vec<Landing> {
    let (height, width) = flow.dims();
    let (w, h) = (width as f32, height as f32);

    let mut landings = Vec::with_capacity(height * width);
    for y in 0..height {
        for x in 0..width {
            let (u, v) = flow.vector(y, x);
            let lx = x as f32 + u;
            let ly = y as f32 + v;
            // NaN components fail every comparison and are dropped here.
            if lx > 0.0 && lx < w && ly > 0.0 && ly < h {
                landings.push(Landing { x: lx, y: ly, u, v });
            }
        }
    }
    landings
}

#[inline]
fn distance_sq(landing: &Landing, tx: usize, ty: usize) -> f32 {
    let dx = landing.x - tx as f32;
    let dy = landing.y - ty as f32;
    dx * dx + dy * dy
}

/// Static 2-d tree over the landing points, stored as a permutation of
/// landing ids. The median of every subrange is its node; subranges split on
/// `x` at even depths and on `y` at odd depths.
struct LandingTree {
    order: Vec<usize>,
}

impl LandingTree {
    fn build(landings: &[Landing]) -> Self {
        let mut order: Vec<usize> = (0..landings.len()).collect();
        Self::split(landings, &mut order, 0);
        Self { order }
    }

    fn split(landings: &[Landing], ids: &mut [usize], depth: usize) {
        if ids.len() <= 1 {
            return;
        }
        let mid = ids.len() / 2;
        ids.select_nth_unstable_by(mid, |&a, &b| {
            axis_value(&landings[a], depth).total_cmp(&axis_value(&landings[b], depth))
        });
        let (left, right) = ids.split_at_mut(mid);
        Self::split(landings, left, depth + 1);
        Self::split(landings, &mut right[1..], depth + 1);
    }

    /// Id of the nearest landing to the pixel center `(tx, ty)`. `landings`
    /// must be the slice the tree was built from and must not be empty.
    fn nearest(&self, landings: &[Landing], tx: usize, ty: usize) -> usize {
        let mut best = (f32::INFINITY, usize::MAX);
        Self::search(landings, &self.order, 0, tx, ty, &mut best);
        best.1
    }

    fn search(
        landings: &[Landing],
        ids: &[usize],
        depth: usize,
        tx: usize,
        ty: usize,
        best: &mut (f32, usize),
    ) {
        if ids.is_empty() {
            return;
        }
        let mid = ids.len() / 2;
        let id = ids[mid];
        let landing = &landings[id];

        let d = distance_sq(landing, tx, ty);
        if d < best.0 || (d == best.0 && id < best.1) {
            *best = (d, id);
        }

        let target = if depth % 2 == 0 { tx as f32 } else { ty as f32 };
        let diff = target - axis_value(landing, depth);
        let (near, far) = if diff < 0.0 {
            (&ids[..mid], &ids[mid + 1..])
        } else {
            (&ids[mid + 1..], &ids[..mid])
        };

        Self::search(landings, near, depth + 1, tx, ty, best);
        // Equal distances are still visited so ties resolve by id.
        if diff * diff <= best.0 {
            Self::search(landings, far, depth + 1, tx, ty, best);
        }
    }
}

#[inline]
fn axis_value(landing: &Landing, depth: usize) -> f32 {
    if depth % 2 == 0 {
        landing.x
    } else {
        landing.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn brute_force(flow: &FlowField) -> FlowField {
        let (height, width) = flow.dims();
        let landings = collect_landings(flow);
        let mut out = FlowField::zeros(height, width);
        if landings.is_empty() {
            return out;
        }
        for ty in 0..height {
            for tx in 0..width {
                let mut best = (f32::INFINITY, 0usize);
                for (id, l) in landings.iter().enumerate() {
                    let d = distance_sq(l, tx, ty);
                    if d < best.0 {
                        best = (d, id);
                    }
                }
                out.data_mut()[[0, ty, tx]] = landings[best.1].u;
                out.data_mut()[[1, ty, tx]] = landings[best.1].v;
            }
        }
        out
    }

    /// Deterministic pseudo-random field in `[-amplitude, amplitude)`.
    fn noisy_flow(height: usize, width: usize, amplitude: f32, seed: u64) -> FlowField {
        let mut state = seed;
        let data = Array3::from_shape_fn((2, height, width), |_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            (unit * 2.0 - 1.0) * amplitude
        });
        FlowField::new(data).unwrap()
    }

    #[test]
    fn test_zero_flow_stays_zero() {
        let out = forward_interpolate(&FlowField::zeros(6, 9));
        assert_eq!(out, FlowField::zeros(6, 9));
    }

    #[test]
    fn test_constant_flow_is_preserved() {
        let flow = FlowField::constant(5, 8, 1.0, 0.5);
        assert_eq!(forward_interpolate(&flow), flow);
    }

    #[test]
    fn test_everything_out_of_frame_gives_zero() {
        let flow = FlowField::constant(4, 4, 100.0, 0.0);
        assert_eq!(forward_interpolate(&flow), FlowField::zeros(4, 4));
    }

    #[test]
    fn test_ties_go_to_first_source_in_row_major_order() {
        let mut flow = FlowField::constant(2, 4, 100.0, 0.0);
        {
            let data = flow.data_mut();
            // (y=1, x=0) lands at (1, 1); (y=1, x=3) lands on itself.
            data[[0, 1, 0]] = 1.0;
            data[[0, 1, 3]] = 0.0;
        }

        let out = forward_interpolate(&flow);
        // Target (2, 1) is one pixel from both landings.
        assert_eq!(out.vector(1, 2), (1.0, 0.0));
        assert_eq!(out.vector(1, 3), (0.0, 0.0));
        assert_eq!(out.vector(0, 0), (1.0, 0.0));
    }

    #[test]
    fn test_matches_brute_force_search() {
        for (seed, amplitude) in [(1u64, 0.5f32), (7, 3.0), (42, 12.0)] {
            let flow = noisy_flow(11, 17, amplitude, seed);
            assert_eq!(forward_interpolate(&flow), brute_force(&flow), "seed {}", seed);
        }
    }

    #[test]
    fn test_single_surviving_vector_fills_frame() {
        // Only the vector at (y=40, x=100) stays inside the frame.
        let mut flow = FlowField::constant(110, 256, 1000.0, 0.0);
        {
            let data = flow.data_mut();
            data[[0, 40, 100]] = 2.5;
            data[[1, 40, 100]] = -1.0;
        }
        let out = forward_interpolate(&flow);
        assert_eq!(out, FlowField::constant(110, 256, 2.5, -1.0));
    }

    #[test]
    fn test_sparse_landings_match_brute_force() {
        // Most vectors leave the frame; a few scattered ones survive.
        let mut flow = FlowField::constant(23, 31, -500.0, 0.0);
        {
            let data = flow.data_mut();
            let survivors = [
                (0, 0, 0.5, 0.5),
                (22, 30, -0.5, -0.5),
                (11, 3, 2.0, 0.0),
                (5, 25, 0.0, 3.0),
            ];
            for (y, x, u, v) in survivors {
                data[[0, y, x]] = u;
                data[[1, y, x]] = v;
            }
        }
        assert_eq!(forward_interpolate(&flow), brute_force(&flow));
    }

    #[test]
    fn test_nan_vectors_are_ignored() {
        let mut flow = FlowField::zeros(3, 3);
        flow.data_mut()[[0, 1, 1]] = f32::NAN;
        let out = forward_interpolate(&flow);
        assert!(out.data().iter().all(|v| v.is_finite()));
    }
}
