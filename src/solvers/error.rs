use std::error;
use std::fmt;

use crate::error::CallbackError;

#[derive(Clone, Debug, PartialEq)]

/**
 * Error to represent inadmissible solution data found by a patch solver.
 */
pub enum SolverError {
    NegativeDepth(f64),
    NonFiniteState,
}

impl fmt::Display for SolverError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use SolverError::*;

        match self {
            NegativeDepth(h) => write!(fmt, "negative depth: {}", h),
            NonFiniteState => write!(fmt, "non-finite solution value"),
        }
    }
}

impl error::Error for SolverError {}

impl From<SolverError> for CallbackError {
    fn from(e: SolverError) -> Self {
        CallbackError::StepRejected { suggested_dt: None, reason: e.to_string() }
    }
}
