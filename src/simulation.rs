use crate::boundary;
use crate::config::SimulationConfig;
use crate::ensemble::Ensemble;
use crate::integrator;
use crate::lifecycle::{self, StopReason};
use crate::noise::{RandomField, SeededField};
use crate::recorder::{Recorder, RunSummary};
use crate::sim_params::SimParams;
use anyhow::Result;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Owns the whole state of one run and advances it step by step:
/// integrate, resolve boundaries, update lifecycle, record aggregates.
pub struct Simulation<F: RandomField = SeededField> {
    config: SimulationConfig,
    params: SimParams,
    ensemble: Ensemble,
    recorder: Recorder,
    field: F,
    current_step: u32,
    impacts: u32,
}

impl Simulation<SeededField> {
    /// Creates a simulation with the deterministic seeded random field.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let field = SeededField::new(config.particles.seed);
        Self::with_field(config, field)
    }
}

impl<F: RandomField> Simulation<F> {
    /// Creates a simulation driven by an arbitrary random field (tests
    /// substitute fixed-increment fields here).
    pub fn with_field(config: SimulationConfig, field: F) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();

        if params.spatial_record_time > params.sim_time {
            warn!(
                "Spatial record time {} lies beyond the simulation horizon {}; \
                 no concentration profile will be captured.",
                params.spatial_record_time, params.sim_time
            );
        }

        if !params.step_is_stable() {
            warn!(
                "Time step dt = {} is large for wall separation {} and diffusivity {}: \
                 particles can jump across the fracture width in one step. \
                 Reduce dt below {:.4} for trustworthy wall statistics.",
                params.dt,
                params.wall_separation(),
                params.fracture_diffusivity,
                params.diffusion_tau() / 10.0
            );
        }

        // Host-side RNG used only for initial placement draws.
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ensemble = Ensemble::new(&params, &mut rng)?;
        let mut recorder = Recorder::new(&params, ensemble.len());
        recorder.record_trajectories(&ensemble);

        Ok(Simulation {
            config,
            params,
            ensemble,
            recorder,
            field,
            current_step: 0,
            impacts: 0,
        })
    }

    /// Termination predicate, evaluated at the step boundary before any
    /// mutation of this step.
    pub fn check_termination(&self) -> Option<StopReason> {
        lifecycle::check_termination(
            &self.params,
            &self.ensemble,
            self.current_step,
            self.recorder.cdf(),
        )
    }

    /// Advances the whole ensemble by one time increment.
    pub fn step(&mut self) -> Result<()> {
        let step = self.current_step;
        // Elapsed time is derived from the step counter, never accumulated,
        // so the clock stays consistent with the recorder's step indexing.
        let t = step as f64 * self.params.dt;

        // Lifecycle first: degradation is decided by elapsed time, and only
        // particles that will actually move accumulate a step.
        lifecycle::apply_degradation(&mut self.ensemble, t);
        lifecycle::accumulate_steps(&mut self.ensemble);

        integrator::advance(&self.params, &mut self.ensemble, &self.field, step);
        let stats = boundary::resolve(&self.params, &mut self.ensemble, &self.field, step)?;
        self.impacts += stats.impacts;

        let newly_escaped = lifecycle::mark_breakthrough(&self.params, &mut self.ensemble);
        self.recorder.record_step(step, newly_escaped, stats.left_hits);

        self.recorder
            .maybe_capture_spatial(&self.params, t + self.params.dt, &self.ensemble);
        self.recorder.record_trajectories(&self.ensemble);

        self.current_step += 1;
        Ok(())
    }

    /// Runs until the termination predicate fires. Convenience wrapper used
    /// by tests; the binary drives the loop itself for progress reporting.
    pub fn run(&mut self) -> Result<StopReason> {
        loop {
            if let Some(reason) = self.check_termination() {
                info!("Run stopped after {} steps: {}", self.current_step, reason);
                return Ok(reason);
            }
            self.step()?;
        }
    }

    pub fn summary(&self, stop_reason: StopReason, execution_seconds: f64) -> RunSummary {
        self.recorder.summary(
            &self.params,
            &self.ensemble,
            self.current_step,
            stop_reason.to_string(),
            self.impacts,
            execution_seconds,
        )
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn elapsed_time(&self) -> f64 {
        self.current_step as f64 * self.params.dt
    }

    pub fn steps_taken(&self) -> u32 {
        self.current_step
    }

    pub fn impacts(&self) -> u32 {
        self.impacts
    }
}
