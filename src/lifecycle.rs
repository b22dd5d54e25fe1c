use crate::ensemble::{Ensemble, Status};
use crate::sim_params::SimParams;

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    HorizonReached,
    NoActiveParticles,
    FullyAbsorbed,
    BreakthroughThreshold,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::HorizonReached => "simulation horizon reached",
            StopReason::NoActiveParticles => "no particle left active",
            StopReason::FullyAbsorbed => "all particles absorbed on the walls",
            StopReason::BreakthroughThreshold => "breakthrough fraction reached the stop threshold",
        };
        f.write_str(text)
    }
}

/// Termination predicate, evaluated once per step at the step boundary,
/// before any mutation. The horizon is checked against the step counter, not
/// an accumulated clock, so repeated-addition rounding can never run an
/// extra step past the recorder's pre-sized arrays.
pub fn check_termination(
    params: &SimParams,
    ensemble: &Ensemble,
    step: u32,
    cdf: f64,
) -> Option<StopReason> {
    if step >= params.num_steps {
        return Some(StopReason::HorizonReached);
    }
    if ensemble
        .status
        .iter()
        .all(|s| matches!(s, Status::Absorbed | Status::AbsorbedLeft))
    {
        return Some(StopReason::FullyAbsorbed);
    }
    if ensemble.active_count() == 0 {
        return Some(StopReason::NoActiveParticles);
    }
    if params.stop_on_cdf && cdf > params.stop_fraction {
        return Some(StopReason::BreakthroughThreshold);
    }
    None
}

/// Marks particles whose survival deadline has elapsed. Degraded particles
/// keep their last recorded position and stop accumulating steps.
pub fn apply_degradation(ensemble: &mut Ensemble, t: f64) -> u32 {
    let mut newly_degraded = 0;
    for (status, deadline) in ensemble
        .status
        .iter_mut()
        .zip(ensemble.survival_deadline.iter())
    {
        if *status == Status::Active && t >= *deadline {
            *status = Status::Degraded;
            newly_degraded += 1;
        }
    }
    newly_degraded
}

/// Increments the step counter of every particle that will move this step.
/// The counts freeze at the step a particle leaves the Active state, which is
/// what the residence-time distributions are rebuilt from.
pub fn accumulate_steps(ensemble: &mut Ensemble) {
    for (count, status) in ensemble
        .step_counts
        .iter_mut()
        .zip(ensemble.status.iter())
    {
        if *status == Status::Active {
            *count += 1;
        }
    }
}

/// First-passage detection at the control plane: an Active particle beyond
/// |x| = control_plane becomes Escaped and is counted exactly once in the
/// breakthrough curve.
pub fn mark_breakthrough(params: &SimParams, ensemble: &mut Ensemble) -> u32 {
    let mut newly_escaped = 0;
    for (status, x) in ensemble.status.iter_mut().zip(ensemble.x.iter()) {
        if *status == Status::Active && x.abs() > params.control_plane {
            *status = Status::Escaped;
            newly_escaped += 1;
        }
    }
    newly_escaped
}
