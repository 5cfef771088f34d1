//! Status codes exchanged with the engine across the C ABI.
//!
//! Every callback trampoline returns one of these as an `i32`, and the native
//! engine reports the outcome of `evolveToTime` and `gatherSolution` with the
//! same code set. `Ok` is zero, failures are negative.

use crate::error::CallbackError;

/// Run the body of an `extern "C"` function, converting a panic into
/// [`Status::Panicked`] instead of unwinding into foreign frames.
macro_rules! ffi_guard {
    ($body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(code) => code,
            Err(_) => $crate::status::Status::Panicked as i32,
        }
    };
}

/// C-compatible status code. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok = 0,
    /// The solver rejected the step (e.g. instability); the engine may retry
    /// with a smaller timestep.
    StepRejected = -1,
    /// A callback failed in a way that no retry can fix.
    CallbackFailed = -2,
    /// The patch descriptor handed to a callback was malformed.
    InvalidPatch = -3,
    /// A null or otherwise unusable argument (e.g. context pointer).
    InvalidArgument = -4,
    /// The engine gave up after repeated step rejections.
    RetriesExhausted = -5,
    /// Any other engine-side failure.
    EngineFailure = -6,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl Status {
    /// Decode a raw code returned over the ABI. Unknown codes are reported as
    /// `EngineFailure`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            -1 => Status::StepRejected,
            -2 => Status::CallbackFailed,
            -3 => Status::InvalidPatch,
            -4 => Status::InvalidArgument,
            -5 => Status::RetriesExhausted,
            -128 => Status::Panicked,
            _ => Status::EngineFailure,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<&CallbackError> for Status {
    fn from(e: &CallbackError) -> Self {
        match e {
            CallbackError::StepRejected { .. } => Status::StepRejected,
            CallbackError::Fatal(_) => Status::CallbackFailed,
            CallbackError::InvalidPatch(_) => Status::InvalidPatch,
            CallbackError::Panicked => Status::Panicked,
        }
    }
}
