use crate::config::{BoundaryPolicy, GeometryMode, LeftBoundaryPolicy};
use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently
/// during simulation steps. Everything here is fixed for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Ensemble
    pub num_particles: usize,
    pub seed: u64,
    pub x_init: f64,
    pub init_shift: f64,

    // Time
    pub dt: f64,
    pub sim_time: f64,
    pub num_steps: u32,

    // Geometry
    pub mode: GeometryMode,
    pub lower_wall: f64,
    pub upper_wall: f64,
    pub control_plane: f64,
    pub left_boundary: f64,
    pub column_left: f64,
    pub column_mid: f64,
    pub column_right: f64,

    // Transport: jump amplitudes sqrt(2 D dt) per region
    pub jump_fracture: f64,
    pub jump_matrix: f64,
    pub jump_left_column: f64,
    pub jump_right_column: f64,
    pub fracture_diffusivity: f64,

    // Wall disposition
    pub boundary_policy: BoundaryPolicy,
    pub reflected_inward: f64,
    pub reflected_outward: f64,
    pub adsorption_probability: f64,
    pub left_policy: LeftBoundaryPolicy,
    pub reflected_left_to_right: f64,
    pub reflected_right_to_left: f64,

    // Reaction
    pub degradation: bool,
    pub degradation_rate: f64,

    // Termination
    pub stop_on_cdf: bool,
    pub stop_fraction: f64,

    // Recording
    pub record_trajectories: bool,
    pub spatial_record_time: f64,
    pub bins_space: usize,
    pub bins_x_interval: f64,
    pub bins_time: usize,
}

impl SimParams {
    /// Fracture aperture (wall separation).
    pub fn wall_separation(&self) -> f64 {
        self.upper_wall - self.lower_wall
    }

    /// Characteristic diffusion time across the fracture width.
    pub fn diffusion_tau(&self) -> f64 {
        self.wall_separation().powi(2) / self.fracture_diffusivity
    }

    /// True when the time step is small enough that particles are unlikely to
    /// jump across the whole fracture width within one step.
    pub fn step_is_stable(&self) -> bool {
        10.0 * self.dt <= self.diffusion_tau()
    }
}
