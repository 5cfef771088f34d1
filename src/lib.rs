//! Peanoclaw couples patch-based finite-volume solvers to the Peano adaptive
//! mesh refinement (AMR) engine. The engine owns the spacetree of patches and
//! decides when and where to refine, initialize and advance; the solver side
//! only ever sees one patch at a time, handed to it through C ABI callbacks.
//!
//! An [`EngineHandle`] owns one engine instance, loaded from the shared
//! Peano library or run in process by the reference engine, together with
//! the [`CallbackRegistry`] it calls into. [`EngineHandle::evolve_to_time`]
//! drives the engine, and [`solution::materialize`] copies the patches back
//! out for output.

#[macro_use]
mod status;

pub mod callbacks;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod index_space;
pub mod interrupt;
pub mod output;
pub mod patch;
pub mod solution;
pub mod solvers;
pub mod state;

pub use callbacks::{CallbackRegistry, CallbackRole, CallbackStats, PatchSolver, StepOutcome};
pub use config::{Backend, EngineConfig, ReferenceSettings};
pub use driver::Controller;
pub use engine::EngineHandle;
pub use error::{CallbackError, Error, EvolutionError, InitializationError};
pub use patch::{PatchDescriptor, PatchGeometry, PatchRef, PatchState, StepReport};
pub use solution::{SolutionView, SolverState};
pub use status::Status;
