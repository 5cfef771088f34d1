//! An in-process engine with a fixed, uniformly refined patch layout.
//!
//! The domain is trisected `level` times on each axis, as a Peano spacetree
//! refines, giving `3^level × 3^level` patches of `subdivision_factor`
//! cells each. All patches advance with one global timestep. The engine
//! talks to the solver exclusively through the callback handles, so it
//! exercises the same ABI a native engine does.

use std::ffi::c_void;
use std::ptr;

use log::{debug, info, trace};

use crate::callbacks::{AddPatchToSolutionCallback, CallbackHandles, CallbackRole, InitializationCallback};
use crate::config::{ConstructionParameters, ReferenceSettings};
use crate::error::InitializationError;
use crate::index_space::{Axis, IndexSpace, Side};
use crate::patch::{PatchDescriptor, PatchGeometry, StepReport};
use crate::status::Status;
use super::{Engine, EngineFault};

/// Deepest uniform refinement the reference engine will build.
pub const MAX_LEVEL: u32 = 5;




struct Block {
    coords: (usize, usize),
    geometry: PatchGeometry,
    q: Vec<f64>,
    aux: Vec<f64>,
}

impl Block {
    fn descriptor(&mut self) -> PatchDescriptor {
        let aux = if self.aux.is_empty() { ptr::null_mut() } else { self.aux.as_mut_ptr() };
        self.geometry.descriptor(self.q.as_mut_ptr(), aux)
    }

    fn shared_descriptor(&self) -> PatchDescriptor {
        let aux = if self.aux.is_empty() { ptr::null_mut() } else { self.aux.as_ptr() as *mut f64 };
        self.geometry.descriptor(self.q.as_ptr() as *mut f64, aux)
    }

    fn touches(&self, axis: Axis, side: Side, blocks_per_axis: usize) -> bool {
        let c = match axis {
            Axis::I => self.coords.0,
            Axis::J => self.coords.1,
        };
        match side {
            Side::Lower => c == 0,
            Side::Upper => c + 1 == blocks_per_axis,
        }
    }
}




enum StepFailure {
    Rejected(Option<f64>),
    Fault(EngineFault),
}




/**
 * The reference engine. Patches are created, and the initialization
 * callback invoked, on the first call to `evolve_to_time`.
 */
pub struct ReferenceEngine {
    settings: ReferenceSettings,
    template: PatchGeometry,
    origin: [f64; 2],
    blocks_per_axis: usize,
    context: *mut c_void,
    initialization: InitializationCallback,
    blocks: Vec<Block>,
    time: f64,
    dt: f64,
    interrupt: Option<signal_hook::SigId>,
}




// ============================================================================
impl ReferenceEngine {

    pub fn new(
        parameters: &ConstructionParameters,
        settings: ReferenceSettings,
        callbacks: &CallbackHandles,
    ) -> Result<Self, InitializationError> {
        let p = parameters;
        let subdivision = [p.subdivision_factor[0] as usize, p.subdivision_factor[1] as usize];
        let size = [p.domain_size[0], p.domain_size[1]];
        let level = refinement_level(size, subdivision, p.initial_minimal_mesh_width)?;
        let blocks_per_axis = 3usize.pow(level);

        let template = PatchGeometry {
            position: [p.domain_origin[0], p.domain_origin[1]],
            size: [size[0] / blocks_per_axis as f64, size[1] / blocks_per_axis as f64],
            subdivision_factor: subdivision,
            num_eqn: p.unknowns_per_cell as usize,
            num_aux: p.aux_fields_per_cell as usize,
            ghost_layer_width: p.ghostlayer_width as usize,
            level,
            current_time: 0.0,
            timestep: p.dt_initial,
            dimensional_splitting: p.use_dimensional_splitting,
        };

        let interrupt = if settings.install_interrupt_handler {
            let id = unsafe { signal_hook::low_level::register(signal_hook::consts::SIGINT, || {}) }
                .map_err(InitializationError::Interrupt)?;
            Some(id)
        } else {
            None
        };

        info!(
            "reference engine: level {}, {}x{} patches, {}x{} cells",
            level,
            blocks_per_axis,
            blocks_per_axis,
            blocks_per_axis * subdivision[0],
            blocks_per_axis * subdivision[1]);

        Ok(Self {
            settings,
            template,
            origin: [p.domain_origin[0], p.domain_origin[1]],
            blocks_per_axis,
            context: callbacks.context,
            initialization: callbacks.initialization,
            blocks: Vec::new(),
            time: 0.0,
            dt: p.dt_initial,
            interrupt,
        })
    }

    pub fn level(&self) -> u32 {
        self.template.level
    }

    pub fn num_patches(&self) -> usize {
        self.blocks_per_axis * self.blocks_per_axis
    }

    fn build_grid(&mut self) -> Result<(), EngineFault> {
        let n = self.blocks_per_axis;
        let mut blocks = Vec::with_capacity(n * n);

        for i in 0..n {
            for j in 0..n {
                let mut geometry = self.template;
                geometry.position = [
                    self.origin[0] + i as f64 * self.template.size[0],
                    self.origin[1] + j as f64 * self.template.size[1],
                ];
                geometry.current_time = self.time;
                blocks.push(Block {
                    coords: (i, j),
                    geometry,
                    q: vec![0.0; geometry.q_len()],
                    aux: vec![0.0; geometry.aux_len()],
                });
            }
        }

        for block in &mut blocks {
            let mut d = block.descriptor();
            let code = unsafe { (self.initialization)(self.context, &mut d) };
            check(code, CallbackRole::Initialization, block.coords).map_err(|failure| match failure {
                StepFailure::Fault(fault) => fault,
                StepFailure::Rejected(_) => EngineFault::new(Status::StepRejected, "initialization rejected a patch"),
            })?;
        }

        let aux_snapshot: Vec<Vec<f64>> = blocks.iter().map(|b| b.aux.clone()).collect();
        let num_aux = self.template.num_aux;
        if num_aux > 0 {
            for block in &mut blocks {
                let coords = block.coords;
                self.exchange_ghosts(coords, &mut block.aux, &aux_snapshot, num_aux);
            }
        }
        self.blocks = blocks;

        debug!("initialized {} patches at t={}", self.blocks.len(), self.time);
        Ok(())
    }

    /**
     * Copy neighbor interior values into every ghost cell of one block that
     * lies inside the domain, corners included.
     */
    fn exchange_ghosts(&self, coords: (usize, usize), target: &mut [f64], sources: &[Vec<f64>], fields: usize) {
        let [s0, s1] = self.template.subdivision_factor;
        let (s0, s1) = (s0 as i64, s1 as i64);
        let n = self.blocks_per_axis as i64;
        let interior = self.template.interior();
        let extended = self.template.extended();
        let global = IndexSpace::new(0..n * s0, 0..n * s1);

        for index in extended.iter() {
            if interior.contains(index) {
                continue;
            }
            let g = (coords.0 as i64 * s0 + index.0, coords.1 as i64 * s1 + index.1);
            if !global.contains(g) {
                continue;
            }
            let source = ((g.0 / s0) * n + g.1 / s1) as usize;
            let local = (g.0 % s0, g.1 % s1);
            let s = extended.row_major_offset(local) * fields;
            let d = extended.row_major_offset(index) * fields;
            target[d..d + fields].copy_from_slice(&sources[source][s..s + fields]);
        }
    }

    fn try_step(&mut self, dt: f64, callbacks: &CallbackHandles) -> Result<(f64, f64), StepFailure> {
        let num_eqn = self.template.num_eqn;
        let sources: Vec<Vec<f64>> = self.blocks.iter().map(|b| b.q.clone()).collect();
        let mut blocks = std::mem::take(&mut self.blocks);

        for block in &mut blocks {
            let coords = block.coords;
            self.exchange_ghosts(coords, &mut block.q, &sources, num_eqn);
        }
        self.blocks = blocks;

        let n = self.blocks_per_axis;
        let time = self.time;

        for block in &mut self.blocks {
            block.geometry.current_time = time;
            block.geometry.timestep = dt;

            for axis in Axis::both() {
                for side in Side::both() {
                    if block.touches(axis, side, n) {
                        let mut d = block.descriptor();
                        let code = unsafe {
                            (callbacks.boundary_condition)(
                                callbacks.context,
                                &mut d,
                                axis.dimension() as i32,
                                side.is_upper() as i32)
                        };
                        check(code, CallbackRole::BoundaryCondition, block.coords)?;
                    }
                }
            }
        }

        let mut dt_used = dt;
        let mut dt_estimated = f64::INFINITY;

        for block in &mut self.blocks {
            let mut d = block.descriptor();
            let mut report = StepReport::default();
            let code = unsafe { (callbacks.solver)(callbacks.context, &mut d, dt, &mut report) };

            if Status::from_code(code) == Status::StepRejected {
                let suggested = Some(report.dt_estimated).filter(|s| s.is_finite() && *s > 0.0);
                return Err(StepFailure::Rejected(suggested));
            }
            check(code, CallbackRole::Solver, block.coords)?;

            if !(report.dt_used.is_finite() && report.dt_used > 0.0 && report.dt_used <= dt * (1.0 + 1e-12)) {
                return Err(StepFailure::Fault(EngineFault::new(
                    Status::EngineFailure,
                    format!("solver reported timestep {} for offered {} on patch {:?}", report.dt_used, dt, block.coords))));
            }
            dt_used = dt_used.min(report.dt_used);
            if report.dt_estimated.is_finite() && report.dt_estimated > 0.0 {
                dt_estimated = dt_estimated.min(report.dt_estimated);
            }
        }
        Ok((dt_used, dt_estimated))
    }

    fn restore(&mut self, snapshot: &[Vec<f64>]) {
        for (block, q) in self.blocks.iter_mut().zip(snapshot) {
            block.q.copy_from_slice(q);
        }
    }

    /**
     * Advance every patch by one global step, the last one ending exactly at
     * `target_time`. Rejections roll back all patches and retry with a
     * smaller timestep.
     */
    fn advance(&mut self, target_time: f64, callbacks: &CallbackHandles) -> Result<(), EngineFault> {
        let snapshot: Vec<Vec<f64>> = self.blocks.iter().map(|b| b.q.clone()).collect();
        let mut retries = 0;

        loop {
            let remaining = target_time - self.time;
            let last = self.dt >= remaining;
            let dt = if last { remaining } else { self.dt };

            let retry_with = match self.try_step(dt, callbacks) {
                Ok((dt_used, dt_estimated)) if dt_used >= dt * (1.0 - 1e-12) => {
                    self.time = if last { target_time } else { self.time + dt };
                    if dt_estimated.is_finite() {
                        self.dt = dt_estimated;
                    }
                    trace!("t={:.6} dt={:.3e}", self.time, dt);
                    return Ok(());
                }
                Ok((dt_used, _)) => dt_used,
                Err(StepFailure::Rejected(suggested)) => suggested.filter(|s| *s < dt).unwrap_or(0.5 * dt),
                Err(StepFailure::Fault(fault)) => return Err(fault),
            };

            self.restore(&snapshot);
            retries += 1;

            if retries > self.settings.max_retries {
                return Err(EngineFault::new(
                    Status::RetriesExhausted,
                    format!("step at t={} rejected {} times", self.time, retries)));
            }
            debug!("retrying step at t={} with dt={:.3e} (was {:.3e})", self.time, retry_with, dt);
            self.dt = retry_with;
        }
    }
}




// ============================================================================
impl Engine for ReferenceEngine {

    fn evolve_to_time(&mut self, target_time: f64, callbacks: &CallbackHandles) -> Result<f64, EngineFault> {
        if self.blocks.is_empty() {
            self.build_grid()?;
        }
        while self.time < target_time {
            self.advance(target_time, callbacks)?;
        }
        Ok(self.time)
    }

    fn gather_solution(&self, context: *mut c_void, add_patch: AddPatchToSolutionCallback) -> Result<(), EngineFault> {
        for block in &self.blocks {
            let d = block.shared_descriptor();
            let code = unsafe { add_patch(context, &d) };
            let status = Status::from_code(code);

            if !status.is_ok() {
                return Err(EngineFault::new(status, format!("gathering patch {:?} failed", block.coords)));
            }
        }
        Ok(())
    }
}

impl Drop for ReferenceEngine {
    fn drop(&mut self) {
        if let Some(id) = self.interrupt.take() {
            signal_hook::low_level::unregister(id);
        }
    }
}




// ============================================================================
fn check(code: i32, role: CallbackRole, coords: (usize, usize)) -> Result<(), StepFailure> {
    match Status::from_code(code) {
        Status::Ok => Ok(()),
        Status::StepRejected => Err(StepFailure::Rejected(None)),
        status => Err(StepFailure::Fault(EngineFault::new(
            status,
            format!("{} callback failed on patch {:?}", role, coords)))),
    }
}

/**
 * The smallest uniform trisection level at which the cells are no wider
 * than `mesh_width` on either axis.
 */
pub fn refinement_level(size: [f64; 2], subdivision: [usize; 2], mesh_width: f64) -> Result<u32, InitializationError> {
    let tolerance = mesh_width * (1.0 + 1e-9);

    for level in 0..=MAX_LEVEL {
        let blocks = 3f64.powi(level as i32);
        let fits = (0..2).all(|a| size[a] / blocks / subdivision[a] as f64 <= tolerance);
        if fits {
            return Ok(level);
        }
    }
    Err(InitializationError::InvalidConfig(format!(
        "mesh width {} needs more than {} levels of refinement",
        mesh_width, MAX_LEVEL)))
}
