pub mod problem;
pub mod utility;
