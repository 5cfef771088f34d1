//! The solver side of the bridge.
//!
//! A [`CallbackRegistry`] owns the closures the engine calls back into, one
//! per role. The engine only ever sees [`CallbackHandles`]: an opaque context
//! pointer (the registry itself) and `extern "C"` trampolines that recover
//! the registry, turn the raw descriptor into a safe patch view, run the
//! closure and translate its result into a [`Status`] code.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::CallbackError;
use crate::index_space::{Axis, Side};
use crate::patch::{PatchDescriptor, PatchRef, PatchState, StepReport};
use crate::status::Status;




// ============================================================================
pub type InitializationCallback = unsafe extern "C" fn(*mut c_void, *mut PatchDescriptor) -> i32;
pub type BoundaryConditionCallback = unsafe extern "C" fn(*mut c_void, *mut PatchDescriptor, i32, i32) -> i32;
pub type SolverCallback = unsafe extern "C" fn(*mut c_void, *mut PatchDescriptor, f64, *mut StepReport) -> i32;
pub type TransferCallback = unsafe extern "C" fn(*mut c_void, *const PatchDescriptor, *mut PatchDescriptor) -> i32;
pub type AddPatchToSolutionCallback = unsafe extern "C" fn(*mut c_void, *const PatchDescriptor) -> i32;

type InitializationFn = dyn Fn(&mut PatchState<'_>) -> Result<(), CallbackError>;
type BoundaryConditionFn = dyn Fn(&mut PatchState<'_>, Axis, Side) -> Result<(), CallbackError>;
type SolverFn = dyn Fn(&mut PatchState<'_>, f64) -> Result<StepOutcome, CallbackError>;
type TransferFn = dyn Fn(&PatchRef<'_>, &mut PatchState<'_>) -> Result<(), CallbackError>;




/**
 * The role a callback plays for the engine.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackRole {
    Initialization,
    BoundaryCondition,
    Solver,
    Interpolation,
    Restriction,
}

impl fmt::Display for CallbackRole {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let name = match self {
            CallbackRole::Initialization => "initialization",
            CallbackRole::BoundaryCondition => "boundary condition",
            CallbackRole::Solver => "solver",
            CallbackRole::Interpolation => "interpolation",
            CallbackRole::Restriction => "restriction",
        };
        write!(fmt, "{}", name)
    }
}




/**
 * What a solver reports after advancing one patch.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    /// Timestep actually taken, at most the one offered.
    pub dt_used: f64,
    /// Estimate for the next stable timestep.
    pub dt_estimated: f64,
}




/**
 * Number of invocations per role since the registry was created.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallbackStats {
    pub initialization: u64,
    pub boundary_condition: u64,
    pub solver: u64,
    pub interpolation: u64,
    pub restriction: u64,
}

impl CallbackStats {
    pub fn total(&self) -> u64 {
        self.initialization + self.boundary_condition + self.solver + self.interpolation + self.restriction
    }

    fn bump(&mut self, role: CallbackRole) {
        match role {
            CallbackRole::Initialization => self.initialization += 1,
            CallbackRole::BoundaryCondition => self.boundary_condition += 1,
            CallbackRole::Solver => self.solver += 1,
            CallbackRole::Interpolation => self.interpolation += 1,
            CallbackRole::Restriction => self.restriction += 1,
        }
    }
}




/**
 * A solver-side implementation of the three required roles. Implementors
 * can be registered in one go with [`CallbackRegistry::from_solver`].
 */
pub trait PatchSolver {

    /// Fill the solution (and auxiliary) values of a fresh patch from its
    /// geometry. Must be deterministic.
    fn initialize(&self, patch: &mut PatchState) -> Result<(), CallbackError>;

    /// Fill the ghost strip of the given face. Interior cells are read-only.
    fn fill_boundary(&self, patch: &mut PatchState, axis: Axis, side: Side) -> Result<(), CallbackError>;

    /// Advance the patch by at most `max_dt`.
    fn step(&self, patch: &mut PatchState, max_dt: f64) -> Result<StepOutcome, CallbackError>;
}




/**
 * Owns the solver-side closures for all callback roles. The registry lives
 * behind an `Rc` in the engine handle and its address is the context pointer
 * handed to the engine, so it must not move while an engine exists.
 */
pub struct CallbackRegistry {
    initialization: Box<InitializationFn>,
    boundary_condition: Box<BoundaryConditionFn>,
    solver: Box<SolverFn>,
    interpolation: Option<Box<TransferFn>>,
    restriction: Option<Box<TransferFn>>,
    stats: Cell<CallbackStats>,
    last_error: RefCell<Option<(CallbackRole, CallbackError)>>,
}




/**
 * The ABI face of a registry: context pointer plus trampolines. Optional
 * roles are `None` (a null function pointer) when nothing is registered.
 */
#[derive(Clone, Copy, Debug)]
pub struct CallbackHandles {
    pub context: *mut c_void,
    pub initialization: InitializationCallback,
    pub boundary_condition: BoundaryConditionCallback,
    pub solver: SolverCallback,
    pub interpolation: Option<TransferCallback>,
    pub restriction: Option<TransferCallback>,
}




// ============================================================================
impl CallbackRegistry {

    pub fn new<I, B, S>(initialization: I, boundary_condition: B, solver: S) -> Self
    where
        I: Fn(&mut PatchState<'_>) -> Result<(), CallbackError> + 'static,
        B: Fn(&mut PatchState<'_>, Axis, Side) -> Result<(), CallbackError> + 'static,
        S: Fn(&mut PatchState<'_>, f64) -> Result<StepOutcome, CallbackError> + 'static,
    {
        Self {
            initialization: Box::new(initialization),
            boundary_condition: Box::new(boundary_condition),
            solver: Box::new(solver),
            interpolation: None,
            restriction: None,
            stats: Cell::new(CallbackStats::default()),
            last_error: RefCell::new(None),
        }
    }

    /// Register the three required roles from one solver object.
    ///
    pub fn from_solver<P: PatchSolver + 'static>(solver: P) -> Self {
        let solver = Rc::new(solver);
        let (a, b, c) = (solver.clone(), solver.clone(), solver);
        Self::new(
            move |patch| a.initialize(patch),
            move |patch, axis, side| b.fill_boundary(patch, axis, side),
            move |patch, max_dt| c.step(patch, max_dt))
    }

    pub fn with_interpolation<F>(mut self, interpolation: F) -> Self
    where
        F: Fn(&PatchRef<'_>, &mut PatchState<'_>) -> Result<(), CallbackError> + 'static,
    {
        self.interpolation = Some(Box::new(interpolation));
        self
    }

    pub fn with_restriction<F>(mut self, restriction: F) -> Self
    where
        F: Fn(&PatchRef<'_>, &mut PatchState<'_>) -> Result<(), CallbackError> + 'static,
    {
        self.restriction = Some(Box::new(restriction));
        self
    }

    /// The ABI handles for this registry. The context pointer is valid as
    /// long as the `Rc` is alive.
    ///
    pub fn handles(self: &Rc<Self>) -> CallbackHandles {
        CallbackHandles {
            context: Rc::as_ptr(self) as *mut c_void,
            initialization: initialization_trampoline,
            boundary_condition: boundary_condition_trampoline,
            solver: solver_trampoline,
            interpolation: self.interpolation.as_ref().map(|_| interpolation_trampoline as TransferCallback),
            restriction: self.restriction.as_ref().map(|_| restriction_trampoline as TransferCallback),
        }
    }

    pub fn stats(&self) -> CallbackStats {
        self.stats.get()
    }

    /// Remove and return the most recent callback failure, if any.
    ///
    pub fn take_last_error(&self) -> Option<(CallbackRole, CallbackError)> {
        self.last_error.borrow_mut().take()
    }

    /// Forget any recorded callback failure.
    ///
    pub fn clear_last_error(&self) {
        self.last_error.borrow_mut().take();
    }

    fn record(&self, role: CallbackRole, error: CallbackError) {
        *self.last_error.borrow_mut() = Some((role, error));
    }

    fn dispatch<F>(&self, role: CallbackRole, f: F) -> i32
    where
        F: FnOnce() -> Result<(), CallbackError>,
    {
        let mut stats = self.stats.get();
        stats.bump(role);
        self.stats.set(stats);

        let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(_) => Err(CallbackError::Panicked),
        };
        match result {
            Ok(()) => Status::Ok as i32,
            Err(error) => {
                let status = Status::from(&error);
                self.record(role, error);
                status as i32
            }
        }
    }
}




// ============================================================================
unsafe fn registry<'a>(context: *mut c_void) -> Option<&'a CallbackRegistry> {
    (context as *const CallbackRegistry).as_ref()
}

unsafe fn write_report(report: *mut StepReport, dt_used: f64, dt_estimated: f64) {
    if let Some(report) = report.as_mut() {
        *report = StepReport { dt_used, dt_estimated };
    }
}




/// # Safety
///
/// `context` must be null or point to a live [`CallbackRegistry`], and
/// `patch` must satisfy [`PatchState::from_descriptor`].
pub unsafe extern "C" fn initialization_trampoline(context: *mut c_void, patch: *mut PatchDescriptor) -> i32 {
    ffi_guard!({
        let registry = match registry(context) {
            Some(registry) => registry,
            None => return Status::InvalidArgument as i32,
        };
        registry.dispatch(CallbackRole::Initialization, || {
            let mut state = PatchState::from_descriptor(patch)?;
            (registry.initialization)(&mut state)
        })
    })
}

/// # Safety
///
/// As for [`initialization_trampoline`].
pub unsafe extern "C" fn boundary_condition_trampoline(
    context: *mut c_void,
    patch: *mut PatchDescriptor,
    dimension: i32,
    set_upper: i32,
) -> i32 {
    ffi_guard!({
        let registry = match registry(context) {
            Some(registry) => registry,
            None => return Status::InvalidArgument as i32,
        };
        registry.dispatch(CallbackRole::BoundaryCondition, || {
            let axis = Axis::from_dimension(dimension)
                .ok_or_else(|| CallbackError::InvalidPatch(format!("no such dimension {}", dimension)))?;
            let mut state = PatchState::from_descriptor(patch)?;
            (registry.boundary_condition)(&mut state, axis, Side::from_set_upper(set_upper))
        })
    })
}

/// # Safety
///
/// As for [`initialization_trampoline`]; `report` must be null or valid for
/// writes.
pub unsafe extern "C" fn solver_trampoline(
    context: *mut c_void,
    patch: *mut PatchDescriptor,
    max_dt: f64,
    report: *mut StepReport,
) -> i32 {
    ffi_guard!({
        let registry = match registry(context) {
            Some(registry) => registry,
            None => return Status::InvalidArgument as i32,
        };
        registry.dispatch(CallbackRole::Solver, || {
            let result = {
                let mut state = PatchState::from_descriptor(patch)?;
                (registry.solver)(&mut state, max_dt)
            };
            match result {
                Ok(outcome) => {
                    write_report(report, outcome.dt_used, outcome.dt_estimated);
                    (*patch).timestep = outcome.dt_estimated;
                    Ok(())
                }
                Err(error) => {
                    if let CallbackError::StepRejected { suggested_dt, .. } = &error {
                        write_report(report, 0.0, suggested_dt.unwrap_or(0.0));
                    }
                    Err(error)
                }
            }
        })
    })
}

unsafe fn transfer(
    context: *mut c_void,
    role: CallbackRole,
    source: *const PatchDescriptor,
    destination: *mut PatchDescriptor,
) -> i32 {
    let registry = match registry(context) {
        Some(registry) => registry,
        None => return Status::InvalidArgument as i32,
    };
    let callback = match role {
        CallbackRole::Interpolation => registry.interpolation.as_ref(),
        _ => registry.restriction.as_ref(),
    };
    let callback = match callback {
        Some(callback) => callback,
        None => return Status::InvalidArgument as i32,
    };
    registry.dispatch(role, || {
        let source = PatchRef::from_descriptor(source)?;
        let mut destination = PatchState::from_descriptor(destination)?;
        callback(&source, &mut destination)
    })
}

/// # Safety
///
/// `source` must satisfy [`PatchRef::from_descriptor`] and `destination`
/// [`PatchState::from_descriptor`], with non-overlapping buffers.
pub unsafe extern "C" fn interpolation_trampoline(
    context: *mut c_void,
    source: *const PatchDescriptor,
    destination: *mut PatchDescriptor,
) -> i32 {
    ffi_guard!({ transfer(context, CallbackRole::Interpolation, source, destination) })
}

/// # Safety
///
/// As for [`interpolation_trampoline`].
pub unsafe extern "C" fn restriction_trampoline(
    context: *mut c_void,
    source: *const PatchDescriptor,
    destination: *mut PatchDescriptor,
) -> i32 {
    ffi_guard!({ transfer(context, CallbackRole::Restriction, source, destination) })
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::ffi::c_void;
    use std::rc::Rc;

    use super::{CallbackRegistry, CallbackRole, StepOutcome};
    use crate::error::CallbackError;
    use crate::patch::{PatchGeometry, StepReport};
    use crate::status::Status;

    fn geometry() -> PatchGeometry {
        PatchGeometry {
            position: [0.0, 0.0],
            size: [1.0, 1.0],
            subdivision_factor: [3, 3],
            num_eqn: 2,
            num_aux: 0,
            ghost_layer_width: 1,
            level: 0,
            current_time: 0.0,
            timestep: 0.1,
            dimensional_splitting: false,
        }
    }

    fn registry() -> Rc<CallbackRegistry> {
        Rc::new(CallbackRegistry::new(
            |patch| {
                for index in patch.geometry().interior().iter() {
                    patch.get_slice_mut(index).copy_from_slice(&[1.0, 2.0]);
                }
                Ok(())
            },
            |patch, axis, side| {
                for index in patch.geometry().ghost_region(axis, side).iter() {
                    patch.get_slice_mut(index)[0] = if side.is_upper() { 9.0 } else { -9.0 };
                }
                Ok(())
            },
            |_, max_dt| {
                if max_dt > 0.5 {
                    Err(CallbackError::StepRejected { suggested_dt: Some(0.25), reason: "cfl".into() })
                } else if max_dt == 0.0 {
                    panic!("zero timestep")
                } else {
                    Ok(StepOutcome { dt_used: max_dt, dt_estimated: 2.0 * max_dt })
                }
            }))
    }

    #[test]
    fn initialization_trampoline_fills_the_patch() {
        let registry = registry();
        let handles = registry.handles();
        let g = geometry();
        let mut q = vec![0.0; g.q_len()];
        let mut d = g.descriptor(q.as_mut_ptr(), std::ptr::null_mut());

        let code = unsafe { (handles.initialization)(handles.context, &mut d) };
        assert_eq!(code, Status::Ok as i32);
        assert_eq!(registry.stats().initialization, 1);
        assert_eq!(q.iter().filter(|&&v| v == 2.0).count(), 9);
        assert!(handles.interpolation.is_none());
        assert!(handles.restriction.is_none());
    }

    #[test]
    fn boundary_trampoline_decodes_the_face() {
        let registry = registry();
        let handles = registry.handles();
        let g = geometry();
        let mut q = vec![0.0; g.q_len()];
        let mut d = g.descriptor(q.as_mut_ptr(), std::ptr::null_mut());

        let code = unsafe { (handles.boundary_condition)(handles.context, &mut d, 1, 1) };
        assert_eq!(code, Status::Ok as i32);
        assert_eq!(q.iter().filter(|&&v| v == 9.0).count(), 5);

        let code = unsafe { (handles.boundary_condition)(handles.context, &mut d, 2, 0) };
        assert_eq!(code, Status::InvalidPatch as i32);
        assert!(matches!(registry.take_last_error(), Some((CallbackRole::BoundaryCondition, CallbackError::InvalidPatch(_)))));
    }

    #[test]
    fn cleared_errors_are_not_reported_again() {
        let registry = registry();
        let handles = registry.handles();
        let g = geometry();
        let mut q = vec![0.0; g.q_len()];
        let mut d = g.descriptor(q.as_mut_ptr(), std::ptr::null_mut());
        let mut report = StepReport::default();

        let code = unsafe { (handles.solver)(handles.context, &mut d, 1.0, &mut report) };
        assert_eq!(code, Status::StepRejected as i32);
        registry.clear_last_error();
        assert_eq!(registry.take_last_error(), None);
    }

    #[test]
    fn solver_trampoline_writes_the_report() {
        let registry = registry();
        let handles = registry.handles();
        let g = geometry();
        let mut q = vec![0.0; g.q_len()];
        let mut d = g.descriptor(q.as_mut_ptr(), std::ptr::null_mut());
        let mut report = StepReport::default();

        let code = unsafe { (handles.solver)(handles.context, &mut d, 0.2, &mut report) };
        assert_eq!(code, Status::Ok as i32);
        assert_eq!(report, StepReport { dt_used: 0.2, dt_estimated: 0.4 });
        assert_eq!(d.timestep, 0.4);

        let code = unsafe { (handles.solver)(handles.context, &mut d, 1.0, &mut report) };
        assert_eq!(code, Status::StepRejected as i32);
        assert_eq!(report, StepReport { dt_used: 0.0, dt_estimated: 0.25 });
        let (role, error) = registry.take_last_error().unwrap();
        assert_eq!(role, CallbackRole::Solver);
        assert!(error.is_retryable());
        assert!(registry.take_last_error().is_none());
    }

    #[test]
    fn panics_are_caught_and_recorded() {
        let registry = registry();
        let handles = registry.handles();
        let g = geometry();
        let mut q = vec![0.0; g.q_len()];
        let mut d = g.descriptor(q.as_mut_ptr(), std::ptr::null_mut());
        let mut report = StepReport::default();

        let code = unsafe { (handles.solver)(handles.context, &mut d, 0.0, &mut report) };
        assert_eq!(code, Status::Panicked as i32);
        assert_eq!(registry.take_last_error(), Some((CallbackRole::Solver, CallbackError::Panicked)));
    }

    #[test]
    fn null_context_is_an_invalid_argument() {
        let registry = registry();
        let handles = registry.handles();
        let g = geometry();
        let mut q = vec![0.0; g.q_len()];
        let mut d = g.descriptor(q.as_mut_ptr(), std::ptr::null_mut());

        let code = unsafe { (handles.initialization)(std::ptr::null_mut::<c_void>(), &mut d) };
        assert_eq!(code, Status::InvalidArgument as i32);
        assert_eq!(registry.stats().total(), 0);
    }

    #[test]
    fn transfer_callbacks_are_exposed_only_when_registered() {
        let registry = Rc::new(
            CallbackRegistry::new(|_| Ok(()), |_, _, _| Ok(()), |_, dt| Ok(StepOutcome { dt_used: dt, dt_estimated: dt }))
                .with_restriction(|source, destination| {
                    let mean = source.interior_values().iter().sum::<f64>() / source.interior_values().len() as f64;
                    for index in destination.geometry().interior().iter() {
                        destination.get_slice_mut(index).fill(mean);
                    }
                    Ok(())
                }));
        let handles = registry.handles();
        assert!(handles.interpolation.is_none());
        let restriction = handles.restriction.unwrap();

        let g = geometry();
        let mut fine = (0..g.q_len()).map(|n| n as f64).collect::<Vec<_>>();
        let mut coarse = vec![0.0; g.q_len()];
        let source = g.descriptor(fine.as_mut_ptr(), std::ptr::null_mut());
        let mut destination = g.descriptor(coarse.as_mut_ptr(), std::ptr::null_mut());

        let code = unsafe { restriction(handles.context, &source, &mut destination) };
        assert_eq!(code, Status::Ok as i32);
        assert_eq!(registry.stats().restriction, 1);
        assert!(coarse[g.extended().row_major_offset((0, 0)) * 2] > 0.0);

        let code = unsafe { super::interpolation_trampoline(handles.context, &source, &mut destination) };
        assert_eq!(code, Status::InvalidArgument as i32);
    }

    #[test]
    fn roles_have_readable_names() {
        assert_eq!(CallbackRole::BoundaryCondition.to_string(), "boundary condition");
        assert_eq!(CallbackRole::Solver.to_string(), "solver");
    }
}
