//! Materializing engine-owned patch data into a solver-side state.

use std::cmp::Ordering;
use std::ffi::c_void;

use serde::{Deserialize, Serialize};

use crate::engine::EngineHandle;
use crate::error::{CallbackError, Error};
use crate::patch::{PatchDescriptor, PatchRef};
use crate::status::Status;




/**
 * The interior cells of one patch, copied out of the engine. Values are in
 * row-major order over `[0, nx) × [0, ny)`, `num_eqn` per cell.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionPatch {
    pub level: u32,
    pub position: [f64; 2],
    pub size: [f64; 2],
    pub subdivision: [usize; 2],
    pub current_time: f64,
    pub q: Vec<f64>,
}

impl SolutionPatch {
    fn from_view(view: &PatchRef) -> Self {
        let g = view.geometry();
        Self {
            level: g.level,
            position: g.position,
            size: g.size,
            subdivision: g.subdivision_factor,
            current_time: g.current_time,
            q: view.interior_values(),
        }
    }

    pub fn num_cells(&self) -> usize {
        self.subdivision[0] * self.subdivision[1]
    }

    /// The values of cell `(i, j)`.
    ///
    pub fn cell(&self, index: (usize, usize), num_eqn: usize) -> &[f64] {
        let n = (index.0 * self.subdivision[1] + index.1) * num_eqn;
        &self.q[n..n + num_eqn]
    }

    fn ordering(&self, other: &Self) -> Ordering {
        self.level
            .cmp(&other.level)
            .then(self.position[0].total_cmp(&other.position[0]))
            .then(self.position[1].total_cmp(&other.position[1]))
    }
}




/**
 * A solver-native snapshot of the whole solution at one time.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverState {
    pub time: f64,
    pub num_eqn: usize,
    pub num_aux: usize,
    pub patches: Vec<SolutionPatch>,
}

impl SolverState {

    /// Every value of one field, patch by patch.
    ///
    pub fn values(&self, field: usize) -> impl Iterator<Item = f64> + '_ {
        let n = self.num_eqn;
        self.patches
            .iter()
            .flat_map(move |p| p.q.iter().skip(field).step_by(n).copied())
    }

    pub fn total_cells(&self) -> usize {
        self.patches.iter().map(SolutionPatch::num_cells).sum()
    }

    pub fn min(&self, field: usize) -> Option<f64> {
        self.values(field).reduce(f64::min)
    }

    pub fn max(&self, field: usize) -> Option<f64> {
        self.values(field).reduce(f64::max)
    }
}




// ============================================================================
struct Collector {
    patches: Vec<SolutionPatch>,
    error: Option<CallbackError>,
}

unsafe extern "C" fn add_patch_to_solution(context: *mut c_void, patch: *const PatchDescriptor) -> i32 {
    ffi_guard!({
        let collector = match (context as *mut Collector).as_mut() {
            Some(collector) => collector,
            None => return Status::InvalidArgument as i32,
        };
        match PatchRef::from_descriptor(patch) {
            Ok(view) => {
                collector.patches.push(SolutionPatch::from_view(&view));
                Status::Ok as i32
            }
            Err(error) => {
                let status = Status::from(&error);
                collector.error = Some(error);
                status as i32
            }
        }
    })
}




/**
 * Copy every active patch out of the engine. Does not change engine state;
 * the cost is proportional to the number of active cells.
 */
pub fn materialize(handle: &EngineHandle) -> Result<SolverState, Error> {
    let engine = handle.engine()?;
    let mut collector = Collector { patches: Vec::new(), error: None };
    let context = &mut collector as *mut Collector as *mut c_void;

    if let Err(fault) = engine.gather_solution(context, add_patch_to_solution) {
        let detail = match collector.error.take() {
            Some(error) => format!("{}: {}", fault.detail, error),
            None => fault.detail,
        };
        return Err(Error::Gather { status: fault.status, detail });
    }

    let mut patches = collector.patches;
    patches.sort_by(SolutionPatch::ordering);

    let config = handle.config();
    Ok(SolverState {
        time: handle.time().unwrap_or(0.0),
        num_eqn: config.num_eqn,
        num_aux: config.num_aux,
        patches,
    })
}




/**
 * A lazily materialized solution that is refreshed only when the engine has
 * moved on since the last look.
 */
#[derive(Default)]
pub struct SolutionView {
    cached: Option<(Option<f64>, SolverState)>,
}




// ============================================================================
impl SolutionView {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, handle: &EngineHandle) -> Result<&SolverState, Error> {
        if handle.is_destroyed() {
            return Err(Error::UseAfterTeardown);
        }
        let time = handle.time();
        let state = match self.cached.take() {
            Some((t, state)) if t == time => state,
            _ => materialize(handle)?,
        };
        let (_, state) = self.cached.insert((time, state));
        Ok(state)
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
