use crate::sim_params::SimParams;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Configuration for the particle ensemble
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ParticlesConfig {
    pub count: u32,
    pub seed: u64,
    /// Initial horizontal position of every particle (fracture mode).
    #[serde(default)]
    pub x_init: f64,
    /// Pulls the initial vertical positions towards the fracture centreline.
    #[serde(default)]
    pub init_shift: f64,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub dt: f64,
    pub sim_time: f64,
}

/// Which two-region geometry the run uses.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeometryMode {
    /// Planar fracture between two walls with porous matrix above and below.
    Fracture,
    /// Symmetric two-diffusivity column (matrix-diffusion verification case).
    Columns,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GeometryConfig {
    #[serde(default = "default_geometry_mode")]
    pub mode: GeometryMode,
    pub lower_wall: f64,
    pub upper_wall: f64,
    /// Vertical control plane where breakthrough is measured (|x| > control_plane).
    pub control_plane: f64,
    /// Left boundary coordinate; only meaningful when left_policy != "open".
    #[serde(default)]
    pub left_boundary: f64,
    // Columns-mode bounds: outer walls and the central partition.
    #[serde(default = "default_column_left")]
    pub column_left: f64,
    #[serde(default = "default_column_mid")]
    pub column_mid: f64,
    #[serde(default = "default_column_right")]
    pub column_right: f64,
}

fn default_geometry_mode() -> GeometryMode {
    GeometryMode::Fracture
}
fn default_column_left() -> f64 {
    4.0
}
fn default_column_mid() -> f64 {
    6.0
}
fn default_column_right() -> f64 {
    8.0
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TransportConfig {
    /// Diffusivity inside the fracture.
    pub fracture_diffusivity: f64,
    /// Diffusivity inside the porous matrix.
    pub matrix_diffusivity: f64,
    // Columns-mode diffusivities, per side of the central wall.
    #[serde(default = "default_column_diffusivity")]
    pub left_column_diffusivity: f64,
    #[serde(default = "default_column_diffusivity")]
    pub right_column_diffusivity: f64,
}

fn default_column_diffusivity() -> f64 {
    0.1
}

/// What happens to a particle that hits a fracture wall.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Roll a transmission probability; failed rolls mirror about the wall.
    Reflecting,
    /// Roll an adsorption probability; successful rolls clamp to the wall
    /// and terminate the particle, failed rolls mirror.
    Absorbing,
}

/// Behaviour of the optional horizontal left boundary.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeftBoundaryPolicy {
    Open,
    Reflecting,
    Absorbing,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BoundaryConfig {
    pub policy: BoundaryPolicy,
    /// Probability that a fracture-side impact is reflected back inward.
    #[serde(default = "default_probability_one")]
    pub reflected_inward: f64,
    /// Probability that a matrix-side impact is reflected back outward.
    #[serde(default = "default_probability_one")]
    pub reflected_outward: f64,
    /// Adsorption probability per wall impact (absorbing policy only).
    #[serde(default = "default_probability_one")]
    pub adsorption_probability: f64,
    #[serde(default = "default_left_policy")]
    pub left_policy: LeftBoundaryPolicy,
    // Columns-mode central-wall reflection probabilities, per direction.
    #[serde(default)]
    pub reflected_left_to_right: f64,
    #[serde(default)]
    pub reflected_right_to_left: f64,
}

fn default_probability_one() -> f64 {
    1.0
}
fn default_left_policy() -> LeftBoundaryPolicy {
    LeftBoundaryPolicy::Open
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReactionConfig {
    /// Enables time-triggered chemical degradation of particles.
    #[serde(default)]
    pub degradation: bool,
    /// Degradation kinetic constant (rate of the exponential survival time).
    #[serde(default = "default_degradation_rate")]
    pub rate: f64,
}

fn default_degradation_rate() -> f64 {
    0.05
}

impl Default for ReactionConfig {
    fn default() -> Self {
        ReactionConfig {
            degradation: false,
            rate: default_degradation_rate(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TerminationConfig {
    /// Stop the run once the breakthrough CDF exceeds `stop_fraction`.
    #[serde(default)]
    pub stop_on_cdf: bool,
    #[serde(default = "default_stop_fraction")]
    pub stop_fraction: f64,
}

fn default_stop_fraction() -> f64 {
    1.0
}

impl Default for TerminationConfig {
    fn default() -> Self {
        TerminationConfig {
            stop_on_cdf: false,
            stop_fraction: default_stop_fraction(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RecordingConfig {
    /// Record full per-particle trajectories (memory cost O(particles * steps)).
    #[serde(default)]
    pub trajectories: bool,
    /// Simulation time at which the spatial concentration profile is captured.
    #[serde(default = "default_spatial_record_time")]
    pub spatial_record_time: f64,
    #[serde(default = "default_bins_space")]
    pub bins_space: usize,
    /// Half-extension of the region where the concentration profile is binned.
    #[serde(default = "default_bins_x_interval")]
    pub bins_x_interval: f64,
    /// Number of temporal bins for the survival-time histograms.
    /// Defaults to num_steps / 10 when absent.
    #[serde(default)]
    pub bins_time: Option<usize>,
}

fn default_spatial_record_time() -> f64 {
    100.0
}
fn default_bins_space() -> usize {
    50
}
fn default_bins_x_interval() -> f64 {
    10.0
}

impl Default for RecordingConfig {
    fn default() -> Self {
        RecordingConfig {
            trajectories: false,
            spatial_record_time: default_spatial_record_time(),
            bins_space: default_bins_space(),
            bins_x_interval: default_bins_x_interval(),
            bins_time: None,
        }
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_positions: bool,
    pub save_summary: bool,
    pub save_breakthrough: bool,
    /// Summary format: "json", "bincode", "messagepack".
    pub format: Option<String>,
}

/// Main simulation configuration, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub particles: ParticlesConfig,
    pub timing: TimingConfig,
    pub geometry: GeometryConfig,
    pub transport: TransportConfig,
    pub boundary: BoundaryConfig,
    #[serde(default)]
    pub reaction: ReactionConfig,
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e)
        })?;
        let config: SimulationConfig = toml::from_str(&config_str).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks physical consistency of the parameters. Fails fast before the
    /// time loop ever starts.
    pub fn validate(&self) -> Result<()> {
        if self.particles.count == 0 {
            anyhow::bail!("particles.count must be greater than 0");
        }
        if self.timing.dt <= 0.0 {
            anyhow::bail!("timing.dt must be positive");
        }
        if self.timing.sim_time <= self.timing.dt {
            anyhow::bail!("timing.sim_time must exceed one time step");
        }
        if self.geometry.lower_wall >= self.geometry.upper_wall {
            anyhow::bail!(
                "geometry.lower_wall ({}) must lie below geometry.upper_wall ({})",
                self.geometry.lower_wall,
                self.geometry.upper_wall
            );
        }
        if self.transport.fracture_diffusivity <= 0.0 {
            anyhow::bail!("transport.fracture_diffusivity must be positive");
        }
        if self.transport.matrix_diffusivity < 0.0 {
            anyhow::bail!("transport.matrix_diffusivity must be non-negative");
        }
        for (name, p) in [
            ("boundary.reflected_inward", self.boundary.reflected_inward),
            ("boundary.reflected_outward", self.boundary.reflected_outward),
            (
                "boundary.adsorption_probability",
                self.boundary.adsorption_probability,
            ),
            (
                "boundary.reflected_left_to_right",
                self.boundary.reflected_left_to_right,
            ),
            (
                "boundary.reflected_right_to_left",
                self.boundary.reflected_right_to_left,
            ),
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("{} must lie within [0, 1], got {}", name, p);
            }
        }
        if self.geometry.mode == GeometryMode::Columns {
            if self.transport.left_column_diffusivity <= 0.0
                || self.transport.right_column_diffusivity <= 0.0
            {
                anyhow::bail!("columns mode requires positive column diffusivities");
            }
            if !(self.geometry.column_left < self.geometry.column_mid
                && self.geometry.column_mid < self.geometry.column_right)
            {
                anyhow::bail!(
                    "columns mode requires column_left < column_mid < column_right, got {} / {} / {}",
                    self.geometry.column_left,
                    self.geometry.column_mid,
                    self.geometry.column_right
                );
            }
        }
        if self.reaction.degradation && self.reaction.rate <= 0.0 {
            anyhow::bail!("reaction.rate must be positive when degradation is enabled");
        }
        if self.geometry.mode == GeometryMode::Fracture
            && self.particles.x_init.abs() >= self.geometry.control_plane
        {
            anyhow::bail!(
                "geometry.control_plane ({}) must lie strictly beyond the initial x position ({})",
                self.geometry.control_plane,
                self.particles.x_init
            );
        }
        if self.termination.stop_on_cdf && !(0.0..=1.0).contains(&self.termination.stop_fraction) {
            anyhow::bail!("termination.stop_fraction must lie within [0, 1]");
        }
        Ok(())
    }

    /// Converts the configuration into the flat parameter struct used during
    /// simulation steps.
    pub fn get_sim_params(&self) -> SimParams {
        let dt = self.timing.dt;
        let num_steps = (self.timing.sim_time / dt).ceil() as u32;
        let bins_time = self
            .recording
            .bins_time
            .unwrap_or(((num_steps as usize) / 10).max(2));

        SimParams {
            num_particles: self.particles.count as usize,
            seed: self.particles.seed,
            x_init: self.particles.x_init,
            init_shift: self.particles.init_shift,
            dt,
            sim_time: self.timing.sim_time,
            num_steps,
            mode: self.geometry.mode,
            lower_wall: self.geometry.lower_wall,
            upper_wall: self.geometry.upper_wall,
            control_plane: self.geometry.control_plane,
            left_boundary: self.geometry.left_boundary,
            column_left: self.geometry.column_left,
            column_mid: self.geometry.column_mid,
            column_right: self.geometry.column_right,
            // Jump amplitudes sqrt(2 D dt), precomputed once per region.
            jump_fracture: (2.0 * self.transport.fracture_diffusivity * dt).sqrt(),
            jump_matrix: (2.0 * self.transport.matrix_diffusivity * dt).sqrt(),
            jump_left_column: (2.0 * self.transport.left_column_diffusivity * dt).sqrt(),
            jump_right_column: (2.0 * self.transport.right_column_diffusivity * dt).sqrt(),
            fracture_diffusivity: self.transport.fracture_diffusivity,
            boundary_policy: self.boundary.policy,
            reflected_inward: self.boundary.reflected_inward,
            reflected_outward: self.boundary.reflected_outward,
            adsorption_probability: self.boundary.adsorption_probability,
            left_policy: self.boundary.left_policy,
            reflected_left_to_right: self.boundary.reflected_left_to_right,
            reflected_right_to_left: self.boundary.reflected_right_to_left,
            degradation: self.reaction.degradation,
            degradation_rate: self.reaction.rate,
            stop_on_cdf: self.termination.stop_on_cdf,
            stop_fraction: self.termination.stop_fraction,
            record_trajectories: self.recording.trajectories,
            spatial_record_time: self.recording.spatial_record_time,
            bins_space: self.recording.bins_space,
            bins_x_interval: self.recording.bins_x_interval,
            bins_time,
        }
    }
}
