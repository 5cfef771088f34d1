use std::ffi::c_void;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::info;

use crate::callbacks::{
    AddPatchToSolutionCallback,
    BoundaryConditionCallback,
    CallbackHandles,
    InitializationCallback,
    SolverCallback,
    TransferCallback,
};
use crate::config::ConstructionParameters;
use crate::error::InitializationError;
use crate::status::Status;
use super::{library, Engine, EngineFault};




// ============================================================================
type NewFn = unsafe extern "C" fn(
    initial_minimal_mesh_width: f64,
    domain_offset_x0: f64,
    domain_offset_x1: f64,
    domain_offset_x2: f64,
    domain_size_x0: f64,
    domain_size_x1: f64,
    domain_size_x2: f64,
    subdivision_factor_x0: i32,
    subdivision_factor_x1: i32,
    subdivision_factor_x2: i32,
    unknowns_per_cell: i32,
    aux_fields_per_cell: i32,
    ghostlayer_width: i32,
    initial_timestep: f64,
    configuration_file: *const c_char,
    use_dimensional_splitting: bool,
    context: *mut c_void,
    initialization: InitializationCallback,
    boundary_condition: BoundaryConditionCallback,
    solver: SolverCallback,
    interpolation: Option<TransferCallback>,
    restriction: Option<TransferCallback>,
) -> *mut c_void;

type DestroyFn = unsafe extern "C" fn(peano: *mut c_void);

type EvolveToTimeFn = unsafe extern "C" fn(
    time: f64,
    peano: *mut c_void,
    context: *mut c_void,
    boundary_condition: BoundaryConditionCallback,
    solver: SolverCallback,
    reached: *mut f64,
) -> i32;

type GatherSolutionFn = unsafe extern "C" fn(
    peano: *mut c_void,
    context: *mut c_void,
    add_patch: AddPatchToSolutionCallback,
) -> i32;

const NEW: &str = "pyclaw_peano_new";
const DESTROY: &str = "pyclaw_peano_destroy";
const EVOLVE_TO_TIME: &str = "pyclaw_peano_evolveToTime";
const GATHER_SOLUTION: &str = "pyclaw_peano_gatherSolution";




/**
 * An engine instance living in the shared Peano library. The library is
 * loaded for this instance only and unloaded after the instance is
 * destroyed.
 */
pub struct NativeEngine {
    instance: *mut c_void,
    destroy: DestroyFn,
    evolve_to_time: EvolveToTimeFn,
    gather_solution: GatherSolutionFn,
    path: PathBuf,
    // Last field, so the library outlives the function pointers above.
    _library: Library,
}




unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, InitializationError> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);

    library
        .get::<T>(&bytes)
        .map(|symbol| *symbol)
        .map_err(|e| InitializationError::MissingSymbol { symbol: name, reason: e.to_string() })
}




// ============================================================================
impl NativeEngine {

    /**
     * Locate and load the library, resolve the entry points and construct
     * an engine instance with the given parameters and callbacks.
     */
    pub fn load(
        library_dir: Option<&Path>,
        parameters: &ConstructionParameters,
        callbacks: &CallbackHandles,
    ) -> Result<Self, InitializationError> {
        let path = library::locate(library_dir)?;

        let library = unsafe { Library::new(&path) }.map_err(|e| InitializationError::LibraryLoad {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        info!("loaded engine library {}", path.display());

        let new: NewFn = unsafe { symbol(&library, NEW)? };
        let destroy: DestroyFn = unsafe { symbol(&library, DESTROY)? };
        let evolve_to_time: EvolveToTimeFn = unsafe { symbol(&library, EVOLVE_TO_TIME)? };
        let gather_solution: GatherSolutionFn = unsafe { symbol(&library, GATHER_SOLUTION)? };

        let p = parameters;
        let instance = unsafe {
            new(
                p.initial_minimal_mesh_width,
                p.domain_origin[0],
                p.domain_origin[1],
                p.domain_origin[2],
                p.domain_size[0],
                p.domain_size[1],
                p.domain_size[2],
                p.subdivision_factor[0],
                p.subdivision_factor[1],
                p.subdivision_factor[2],
                p.unknowns_per_cell,
                p.aux_fields_per_cell,
                p.ghostlayer_width,
                p.dt_initial,
                p.configuration_file.as_ptr(),
                p.use_dimensional_splitting,
                callbacks.context,
                callbacks.initialization,
                callbacks.boundary_condition,
                callbacks.solver,
                callbacks.interpolation,
                callbacks.restriction,
            )
        };

        if instance.is_null() {
            return Err(InitializationError::EngineRefused);
        }

        Ok(Self {
            instance,
            destroy,
            evolve_to_time,
            gather_solution,
            path,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}




// ============================================================================
impl Engine for NativeEngine {

    fn evolve_to_time(&mut self, target_time: f64, callbacks: &CallbackHandles) -> Result<f64, EngineFault> {
        let mut reached = f64::NAN;
        let code = unsafe {
            (self.evolve_to_time)(
                target_time,
                self.instance,
                callbacks.context,
                callbacks.boundary_condition,
                callbacks.solver,
                &mut reached)
        };
        match Status::from_code(code) {
            Status::Ok if reached.is_nan() => Ok(target_time),
            Status::Ok => Ok(reached),
            status => Err(EngineFault::new(status, format!("{} returned {}", EVOLVE_TO_TIME, code))),
        }
    }

    fn gather_solution(&self, context: *mut c_void, add_patch: AddPatchToSolutionCallback) -> Result<(), EngineFault> {
        let code = unsafe { (self.gather_solution)(self.instance, context, add_patch) };
        match Status::from_code(code) {
            Status::Ok => Ok(()),
            status => Err(EngineFault::new(status, format!("{} returned {}", GATHER_SOLUTION, code))),
        }
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.instance) };
        info!("released engine instance from {}", self.path.display());
    }
}
