pub mod gateway;
pub mod outcome;
pub mod sector;
pub mod validator;

pub use gateway::{solve_index_tracking, SolverGateway};
pub use outcome::{check_candidate, SolveOutcome, SolveStatus};
pub use sector::{build_sector_constraints, compute_sector_constraints, SectorInput};
pub use validator::{validate_problem, ProblemInput, ProblemInstance, RotationLimits, SolverPayload};
