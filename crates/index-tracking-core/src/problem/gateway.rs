use tracing::{info, warn};

use super::outcome::SolveOutcome;
use super::validator::{validate_problem, ProblemInput, SolverPayload};
use crate::IndexTrackingResult;

/// Boundary to the external solver service.
///
/// Implementations own transport, credentials and polling; a call returns
/// only once the solver has reached a terminal state. Transport failures are
/// reported as [`crate::IndexTrackingError::Gateway`]; a solver-side failure
/// is an `Ok` outcome with a `Failed` status.
pub trait SolverGateway {
    fn submit(&self, payload: &SolverPayload) -> IndexTrackingResult<SolveOutcome>;
}

impl<F> SolverGateway for F
where
    F: Fn(&SolverPayload) -> IndexTrackingResult<SolveOutcome>,
{
    fn submit(&self, payload: &SolverPayload) -> IndexTrackingResult<SolveOutcome> {
        self(payload)
    }
}

/// Validate `input` and, when it is well formed, submit it to `gateway`.
///
/// A rejected instance never reaches the gateway: the result is the
/// placeholder outcome with a description prefixed by the failure class
/// (`"Validation: ..."`, `"Feasibility: ..."`). The solver's own outcome is
/// returned unchanged.
pub fn solve_index_tracking<G>(gateway: &G, input: &ProblemInput) -> IndexTrackingResult<SolveOutcome>
where
    G: SolverGateway + ?Sized,
{
    let instance = match validate_problem(input) {
        Ok(instance) => instance,
        Err(e) => {
            warn!(field = e.field().unwrap_or("-"), "instance rejected: {}", e);
            return Ok(SolveOutcome::rejected(&e));
        }
    };

    let payload = instance.to_payload();
    let outcome = gateway.submit(&payload)?;
    info!(
        status = %outcome.status,
        assets = outcome.portfolio.len(),
        description = %instance.description(),
        "solver outcome received"
    );
    Ok(outcome)
}
