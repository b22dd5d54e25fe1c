use crate::config::GeometryMode;
use crate::ensemble::{Ensemble, Region, Status};
use crate::noise::RandomField;
use crate::sim_params::SimParams;
use rayon::prelude::*;

/// Advances every Active particle by one Brownian increment.
///
/// The jump amplitude sqrt(2 D dt) is selected by the particle's current
/// region (fracture vs matrix), or by its side of the central partition in
/// the columns geometry. Mutates positions only; region and status are the
/// boundary resolver's responsibility.
pub fn advance<F: RandomField>(params: &SimParams, ensemble: &mut Ensemble, field: &F, step: u32) {
    let Ensemble {
        x,
        y,
        region,
        status,
        ..
    } = ensemble;
    let region = &*region;
    let status = &*status;

    x.par_iter_mut()
        .zip(y.par_iter_mut())
        .enumerate()
        .for_each(|(idx, (px, py))| {
            if status[idx] != Status::Active {
                return;
            }
            let amplitude = match params.mode {
                GeometryMode::Fracture => match region[idx] {
                    Region::Fracture => params.jump_fracture,
                    Region::MatrixAbove | Region::MatrixBelow => params.jump_matrix,
                },
                GeometryMode::Columns => {
                    if *px < params.column_mid {
                        params.jump_left_column
                    } else {
                        params.jump_right_column
                    }
                }
            };
            let (eta_x, eta_y) = field.gaussian_pair(idx, step);
            *px += amplitude * eta_x;
            *py += amplitude * eta_y;
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryPolicy, LeftBoundaryPolicy};
    use crate::noise::testing::ConstantField;

    fn test_params() -> SimParams {
        SimParams {
            num_particles: 4,
            seed: 1,
            x_init: 0.0,
            init_shift: 0.0,
            dt: 0.1,
            sim_time: 10.0,
            num_steps: 100,
            mode: GeometryMode::Fracture,
            lower_wall: -3.0,
            upper_wall: 3.0,
            control_plane: 10.0,
            left_boundary: 0.0,
            column_left: 4.0,
            column_mid: 6.0,
            column_right: 8.0,
            jump_fracture: (2.0_f64 * 0.1 * 0.1).sqrt(),
            jump_matrix: (2.0_f64 * 0.001 * 0.1).sqrt(),
            jump_left_column: (2.0_f64 * 0.4 * 0.1).sqrt(),
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

    fn small_ensemble(params: &SimParams) -> Ensemble {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let mut rng = StdRng::seed_from_u64(params.seed);
        Ensemble::new(params, &mut rng).unwrap()
    }

    #[test]
    fn displacement_scales_with_region_diffusivity() {
        let params = test_params();
        let mut ens = small_ensemble(&params);
        ens.y.fill(0.0);
        ens.region[1] = Region::MatrixAbove;
        let field = ConstantField {
            eta_x: 1.0,
            eta_y: -1.0,
            roll: 0.0,
        };
        advance(&params, &mut ens, &field, 0);
        assert!((ens.x[0] - params.jump_fracture).abs() < 1e-15);
        assert!((ens.y[0] + params.jump_fracture).abs() < 1e-15);
        assert!((ens.x[1] - params.jump_matrix).abs() < 1e-15);
    }

    #[test]
    fn terminal_particles_do_not_move() {
        let params = test_params();
        let mut ens = small_ensemble(&params);
        ens.status[0] = Status::Escaped;
        ens.status[2] = Status::Absorbed;
        let before_x = ens.x.clone();
        let before_y = ens.y.clone();
        let field = ConstantField {
            eta_x: 2.0,
            eta_y: 2.0,
            roll: 0.0,
        };
        advance(&params, &mut ens, &field, 3);
        assert_eq!(ens.x[0], before_x[0]);
        assert_eq!(ens.y[0], before_y[0]);
        assert_eq!(ens.x[2], before_x[2]);
        assert_eq!(ens.y[2], before_y[2]);
        assert_ne!(ens.x[1], before_x[1]);
    }

    #[test]
    fn columns_mode_selects_amplitude_by_side() {
        let mut params = test_params();
        params.mode = GeometryMode::Columns;
        params.num_particles = 2;
        let mut ens = small_ensemble(&params);
        ens.x = vec![5.0, 7.0];
        ens.y = vec![0.0, 0.0];
        let field = ConstantField {
            eta_x: 1.0,
            eta_y: 0.0,
            roll: 0.0,
        };
        advance(&params, &mut ens, &field, 0);
        assert!((ens.x[0] - (5.0 + params.jump_left_column)).abs() < 1e-15);
        assert!((ens.x[1] - (7.0 + params.jump_right_column)).abs() < 1e-15);
    }
}
