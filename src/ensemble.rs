use crate::config::GeometryMode;
use crate::sim_params::SimParams;
use anyhow::Result;
use log::warn;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::Exp;
use serde::{Deserialize, Serialize};

/// Number of columns of the initial grid in the matrix-diffusion
/// verification geometry.
const VERIFICATION_GRID_COLS: usize = 100;

/// Region membership, derived purely from the vertical coordinate versus the
/// two wall coordinates. Never set directly except by the classification rule
/// applied after boundary resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Fracture,
    MatrixAbove,
    MatrixBelow,
}

impl Region {
    /// Classification rule. `None` means the coordinate sits exactly on a
    /// wall, which is terminal (avoids oscillation at the boundary).
    pub fn classify(y: f64, lower_wall: f64, upper_wall: f64) -> Option<Region> {
        if y > lower_wall && y < upper_wall {
            Some(Region::Fracture)
        } else if y > upper_wall {
            Some(Region::MatrixAbove)
        } else if y < lower_wall {
            Some(Region::MatrixBelow)
        } else {
            None
        }
    }
}

/// Which side of the central partition a particle occupies (columns mode).
/// Re-derived from x after every boundary resolution, mirroring `Region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSide {
    Left,
    Right,
}

/// Per-particle liveness. Every state other than `Active` is terminal:
/// position and step count freeze when it is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Active,
    /// Survival deadline elapsed (chemical degradation).
    Degraded,
    /// Adsorbed onto a fracture wall; position clamped to the wall coordinate.
    Absorbed,
    /// Adsorbed onto the left boundary; x clamped to the boundary coordinate.
    AbsorbedLeft,
    /// Crossed the control plane; counted once in the breakthrough curve.
    Escaped,
}

/// The mutable particle arrays, SoA layout. Fixed size for the whole run: no
/// insertion or removal, only status toggling.
#[derive(Debug)]
pub struct Ensemble {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub region: Vec<Region>,
    /// Columns-mode partition side; untouched in fracture mode.
    pub side: Vec<ColumnSide>,
    pub status: Vec<Status>,
    /// Steps taken while Active; frozen once the particle leaves Active.
    pub step_counts: Vec<u32>,
    /// Elapsed-time threshold past which the particle degrades. Infinite when
    /// degradation is disabled.
    pub survival_deadline: Vec<f64>,
}

impl Ensemble {
    /// Creates the ensemble at t = 0 with the configured initial placement
    /// and, when degradation is enabled, exponentially distributed survival
    /// deadlines.
    pub fn new(params: &SimParams, rng: &mut StdRng) -> Result<Self> {
        let (x, y) = match params.mode {
            GeometryMode::Fracture => place_fracture_line(params),
            GeometryMode::Columns => place_verification_grid(params),
        };
        let n = x.len();

        let survival_deadline = if params.degradation {
            let exp = Exp::new(params.degradation_rate).map_err(|e| {
                anyhow::anyhow!(
                    "Invalid degradation rate {}: {}",
                    params.degradation_rate,
                    e
                )
            })?;
            (0..n).map(|_| rng.sample(exp)).collect()
        } else {
            vec![f64::INFINITY; n]
        };

        let side = x
            .iter()
            .map(|&px| {
                if px < params.column_mid {
                    ColumnSide::Left
                } else {
                    ColumnSide::Right
                }
            })
            .collect();

        Ok(Ensemble {
            x,
            y,
            // All particles start between the walls; membership is re-derived
            // after every boundary resolution.
            region: vec![Region::Fracture; n],
            side,
            status: vec![Status::Active; n],
            step_counts: vec![0; n],
            survival_deadline,
        })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.status.iter().filter(|s| **s == Status::Active).count()
    }

    pub fn escaped_count(&self) -> usize {
        self.status.iter().filter(|s| **s == Status::Escaped).count()
    }

    pub fn absorbed_count(&self) -> usize {
        self.status
            .iter()
            .filter(|s| matches!(s, Status::Absorbed | Status::AbsorbedLeft))
            .count()
    }

    /// Final positions as (x, y) tuples, for the CSV export.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.x
            .iter()
            .zip(self.y.iter())
            .map(|(&x, &y)| (x, y))
            .collect()
    }
}

/// Evenly spaced inclusive grid, matching numpy's linspace.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Fracture mode: all particles at x_init, vertically spread across the
/// aperture (optionally pulled towards the centreline by init_shift).
fn place_fracture_line(params: &SimParams) -> (Vec<f64>, Vec<f64>) {
    let n = params.num_particles;
    let x = vec![params.x_init; n];
    let y = linspace(
        params.lower_wall + params.init_shift,
        params.upper_wall - params.init_shift,
        n,
    );
    (x, y)
}

/// Columns mode: a regular grid filling the left column. The 1% inward shift
/// keeps edge particles from escaping during the first couple of steps.
fn place_verification_grid(params: &SimParams) -> (Vec<f64>, Vec<f64>) {
    let cols = VERIFICATION_GRID_COLS.min(params.num_particles.max(1));
    let rows = (params.num_particles / cols).max(1);
    let placed = cols * rows;
    if placed != params.num_particles {
        warn!(
            "Verification grid holds {} particles ({} x {}), truncating the requested {}.",
            placed, cols, rows, params.num_particles
        );
    }
    let xs = linspace(
        params.column_left - params.column_left * 0.01,
        params.column_mid - params.column_mid * 0.01,
        cols,
    );
    let ys = linspace(
        params.lower_wall - params.lower_wall * 0.01,
        params.upper_wall - params.upper_wall * 0.01,
        rows,
    );

    let mut x = Vec::with_capacity(placed);
    let mut y = Vec::with_capacity(placed);
    for &py in &ys {
        for &px in &xs {
            x.push(px);
            y.push(py);
        }
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryPolicy, LeftBoundaryPolicy};
    use rand::SeedableRng;

    fn test_params(mode: GeometryMode, n: usize) -> SimParams {
        SimParams {
            num_particles: n,
            seed: 1,
            x_init: 0.0,
            init_shift: 0.0,
            dt: 0.1,
            sim_time: 10.0,
            num_steps: 100,
            mode,
            lower_wall: -3.0,
            upper_wall: 3.0,
            control_plane: 10.0,
            left_boundary: 0.0,
            column_left: 4.0,
            column_mid: 6.0,
            column_right: 8.0,
            jump_fracture: (2.0_f64 * 0.1 * 0.1).sqrt(),
            jump_matrix: (2.0_f64 * 0.001 * 0.1).sqrt(),
            jump_left_column: (2.0_f64 * 0.1 * 0.1).sqrt(),
            jump_right_column: (2.0_f64 * 0.1 * 0.1).sqrt(),
            fracture_diffusivity: 0.1,
            boundary_policy: BoundaryPolicy::Reflecting,
            reflected_inward: 1.0,
            reflected_outward: 1.0,
            adsorption_probability: 1.0,
            left_policy: LeftBoundaryPolicy::Open,
            reflected_left_to_right: 0.0,
            reflected_right_to_left: 0.0,
            degradation: false,
            degradation_rate: 0.05,
            stop_on_cdf: false,
            stop_fraction: 1.0,
            record_trajectories: false,
            spatial_record_time: 100.0,
            bins_space: 50,
            bins_x_interval: 10.0,
            bins_time: 10,
        }
    }

    #[test]
    fn classification_matches_walls() {
        assert_eq!(Region::classify(0.0, -3.0, 3.0), Some(Region::Fracture));
        assert_eq!(Region::classify(3.5, -3.0, 3.0), Some(Region::MatrixAbove));
        assert_eq!(Region::classify(-3.5, -3.0, 3.0), Some(Region::MatrixBelow));
        assert_eq!(Region::classify(3.0, -3.0, 3.0), None);
        assert_eq!(Region::classify(-3.0, -3.0, 3.0), None);
    }

    #[test]
    fn fracture_line_spans_aperture() {
        let params = test_params(GeometryMode::Fracture, 11);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ens = Ensemble::new(&params, &mut rng).unwrap();
        assert_eq!(ens.len(), 11);
        assert!(ens.x.iter().all(|&x| x == 0.0));
        assert_eq!(ens.y[0], -3.0);
        assert_eq!(ens.y[10], 3.0);
        assert!(ens.y.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn init_shift_pulls_inward() {
        let mut params = test_params(GeometryMode::Fracture, 5);
        params.init_shift = 1.0;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ens = Ensemble::new(&params, &mut rng).unwrap();
        assert_eq!(ens.y[0], -2.0);
        assert_eq!(ens.y[4], 2.0);
    }

    #[test]
    fn verification_grid_fills_left_column() {
        let params = test_params(GeometryMode::Columns, 1000);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ens = Ensemble::new(&params, &mut rng).unwrap();
        assert_eq!(ens.len(), 1000);
        assert!(ens
            .x
            .iter()
            .all(|&x| x >= 4.0 * 0.99 - 1e-12 && x <= 6.0 * 0.99 + 1e-12));
        assert!(ens.y.iter().all(|&y| y.abs() <= 3.0));
    }

    #[test]
    fn degradation_draws_finite_deadlines() {
        let mut params = test_params(GeometryMode::Fracture, 100);
        params.degradation = true;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ens = Ensemble::new(&params, &mut rng).unwrap();
        assert!(ens.survival_deadline.iter().all(|d| d.is_finite() && *d > 0.0));
    }

    #[test]
    fn disabled_degradation_never_expires() {
        let params = test_params(GeometryMode::Fracture, 10);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ens = Ensemble::new(&params, &mut rng).unwrap();
        assert!(ens.survival_deadline.iter().all(|d| d.is_infinite()));
    }
}
