use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::callbacks::CallbackRole;
use crate::status::Status;




/**
 * Failure to construct an engine. Raised before any simulation work starts;
 * there is never partially constructed engine state to clean up.
 */
#[derive(Debug)]
pub enum InitializationError {
    InvalidConfig(String),
    UnsupportedPlatform(&'static str),
    LibraryNotFound { path: PathBuf },
    LibraryLoad { path: PathBuf, reason: String },
    MissingSymbol { symbol: &'static str, reason: String },
    EngineRefused,
    Interrupt(io::Error),
}

impl fmt::Display for InitializationError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use InitializationError::*;

        match self {
            InvalidConfig(reason) => write!(fmt, "invalid engine configuration: {}", reason),
            UnsupportedPlatform(os) => write!(fmt, "unsupported operating system '{}': only Linux and macOS are supported", os),
            LibraryNotFound { path } => write!(fmt, "engine library not found at {}", path.display()),
            LibraryLoad { path, reason } => write!(fmt, "failed to load engine library {}: {}", path.display(), reason),
            MissingSymbol { symbol, reason } => write!(fmt, "engine library lacks symbol {}: {}", symbol, reason),
            EngineRefused => write!(fmt, "engine library returned a null instance"),
            Interrupt(e) => write!(fmt, "failed to restore the default interrupt handler: {}", e),
        }
    }
}

impl error::Error for InitializationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            InitializationError::Interrupt(e) => Some(e),
            _ => None,
        }
    }
}




/**
 * Failure reported by a solver-side callback for one patch.
 */
#[derive(Clone, Debug, PartialEq)]
pub enum CallbackError {
    /// Numerical failure for this patch and step. The engine may retry with
    /// a smaller timestep, optionally the suggested one.
    StepRejected { suggested_dt: Option<f64>, reason: String },
    Fatal(String),
    InvalidPatch(String),
    Panicked,
}

impl CallbackError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallbackError::StepRejected { .. })
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use CallbackError::*;

        match self {
            StepRejected { suggested_dt: Some(dt), reason } => write!(fmt, "step rejected ({}), suggested dt {}", reason, dt),
            StepRejected { suggested_dt: None, reason } => write!(fmt, "step rejected ({})", reason),
            Fatal(reason) => write!(fmt, "callback failed: {}", reason),
            InvalidPatch(reason) => write!(fmt, "invalid patch descriptor: {}", reason),
            Panicked => write!(fmt, "callback panicked"),
        }
    }
}

impl error::Error for CallbackError {}




/**
 * Failure to drive the engine to a requested time. After `Aborted` the
 * engine state is undefined and the handle should be torn down.
 */
#[derive(Debug)]
pub enum EvolutionError {
    InvalidTarget(f64),
    Aborted {
        target_time: f64,
        status: Status,
        detail: String,
        callback: Option<(CallbackRole, CallbackError)>,
    },
}

impl fmt::Display for EvolutionError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            EvolutionError::InvalidTarget(t) => write!(fmt, "invalid target time {}", t),
            EvolutionError::Aborted { target_time, status, detail, callback } => {
                write!(fmt, "evolution to t={} aborted ({:?}): {}", target_time, status, detail)?;
                if let Some((role, error)) = callback {
                    write!(fmt, "; {} callback: {}", role, error)?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for EvolutionError {}




/**
 * Failure to write or read a solution frame.
 */
#[derive(Debug)]
pub enum OutputError {
    Io(io::Error),
    Encode(String),
    Decode(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            OutputError::Io(e) => write!(fmt, "output i/o error: {}", e),
            OutputError::Encode(e) => write!(fmt, "failed to encode frame: {}", e),
            OutputError::Decode(e) => write!(fmt, "failed to decode frame: {}", e),
        }
    }
}

impl error::Error for OutputError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            OutputError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> Self {
        OutputError::Io(e)
    }
}




/**
 * Top-level error of the bridge.
 */
#[derive(Debug)]
pub enum Error {
    Initialization(InitializationError),
    /// An operation was invoked on a handle whose engine was destroyed.
    UseAfterTeardown,
    Evolution(EvolutionError),
    /// The engine failed to hand back its patches for materialization.
    Gather { status: Status, detail: String },
    Output(OutputError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Error::Initialization(e) => write!(fmt, "{}", e),
            Error::UseAfterTeardown => write!(fmt, "engine handle used after teardown"),
            Error::Evolution(e) => write!(fmt, "{}", e),
            Error::Gather { status, detail } => write!(fmt, "failed to gather solution ({:?}): {}", status, detail),
            Error::Output(e) => write!(fmt, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Initialization(e) => Some(e),
            Error::Evolution(e) => Some(e),
            Error::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InitializationError> for Error {
    fn from(e: InitializationError) -> Self {
        Error::Initialization(e)
    }
}

impl From<EvolutionError> for Error {
    fn from(e: EvolutionError) -> Self {
        Error::Evolution(e)
    }
}

impl From<OutputError> for Error {
    fn from(e: OutputError) -> Self {
        Error::Output(e)
    }
}
