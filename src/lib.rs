//! Particle-tracking random-walk simulation of solute transport in a
//! fractured porous medium: Brownian particles inside a planar fracture with
//! stochastic exchange into the adjoining matrix, optional degradation,
//! adsorption, and reflective or absorbing boundaries.

pub mod boundary;
pub mod config;
pub mod ensemble;
pub mod integrator;
pub mod lifecycle;
pub mod noise;
pub mod recorder;
pub mod sim_params;
pub mod simulation;

pub use config::{
    BoundaryPolicy, GeometryMode, LeftBoundaryPolicy, SimulationConfig,
};
pub use ensemble::{ColumnSide, Ensemble, Region, Status};
pub use lifecycle::StopReason;
pub use noise::{Channel, RandomField, SeededField};
pub use recorder::{Recorder, RunSummary};
pub use sim_params::SimParams;
pub use simulation::Simulation;
