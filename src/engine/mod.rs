//! Ownership of one AMR engine instance.
//!
//! Everything backend-specific (library loading, symbol resolution, the
//! in-process reference grid) sits behind the narrow [`Engine`] trait. The
//! [`EngineHandle`] pairs an engine with the callback registry it calls into
//! and enforces the create-once, destroy-once contract.

pub mod library;
mod native;
mod reference;

use std::ffi::c_void;
use std::rc::Rc;

use log::{info, warn};

use crate::callbacks::{AddPatchToSolutionCallback, CallbackHandles, CallbackRegistry, CallbackStats};
use crate::config::{Backend, EngineConfig};
use crate::driver::EvolutionDriver;
use crate::error::{Error, InitializationError};
use crate::interrupt;
use crate::status::Status;

pub use native::NativeEngine;
pub use reference::ReferenceEngine;




/**
 * A failure reported by an engine, as a status code plus whatever detail
 * the backend can give.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct EngineFault {
    pub status: Status,
    pub detail: String,
}

impl EngineFault {
    pub fn new<S: Into<String>>(status: Status, detail: S) -> Self {
        Self { status, detail: detail.into() }
    }
}




/**
 * The operations an engine offers once constructed. Destruction is `Drop`.
 */
pub trait Engine {

    /// Advance the simulation until the engine time reaches `target_time`,
    /// calling back through `callbacks`. Returns the time reached.
    fn evolve_to_time(&mut self, target_time: f64, callbacks: &CallbackHandles) -> Result<f64, EngineFault>;

    /// Hand every active patch to `add_patch`, read-only, with `context` as
    /// its first argument.
    fn gather_solution(&self, context: *mut c_void, add_patch: AddPatchToSolutionCallback) -> Result<(), EngineFault>;
}




/**
 * Owns exactly one engine instance and the callbacks it was created with.
 */
pub struct EngineHandle {
    config: EngineConfig,
    // Declared before the registry: the engine must go first.
    pub(crate) engine: Option<Box<dyn Engine>>,
    pub(crate) registry: Rc<CallbackRegistry>,
    pub(crate) driver: EvolutionDriver,
}




// ============================================================================
impl EngineHandle {

    /**
     * Validate the configuration, create the engine and restore the default
     * interrupt behavior. Nothing is loaded if the configuration is
     * inconsistent, and no callback is invoked here.
     */
    pub fn create(config: EngineConfig, callbacks: CallbackRegistry) -> Result<Self, Error> {
        let parameters = config.construction_parameters()?;
        let registry = Rc::new(callbacks);
        let handles = registry.handles();

        let engine: Box<dyn Engine> = match &config.backend {
            Backend::Native { library_dir } => {
                Box::new(NativeEngine::load(library_dir.as_deref(), &parameters, &handles)?)
            }
            Backend::Reference(settings) => {
                Box::new(ReferenceEngine::new(&parameters, settings.clone(), &handles)?)
            }
        };

        interrupt::restore_default_interrupt().map_err(InitializationError::Interrupt)?;

        info!(
            "created engine: domain {:?} + {:?}, {}x{} cells per patch, {} equations, {} aux, ghost width {}",
            config.domain_origin,
            config.domain_size,
            config.subdivision_factor[0],
            config.subdivision_factor[1],
            config.num_eqn,
            config.num_aux,
            config.ghost_layer_width);

        Ok(Self {
            config,
            engine: Some(engine),
            registry,
            driver: EvolutionDriver::new(),
        })
    }

    /**
     * Release the engine instance. Any later operation, a second `destroy`
     * included, fails with [`Error::UseAfterTeardown`].
     */
    pub fn destroy(&mut self) -> Result<(), Error> {
        match self.engine.take() {
            Some(engine) => {
                drop(engine);
                info!("engine destroyed after {} callbacks", self.registry.stats().total());
                Ok(())
            }
            None => Err(Error::UseAfterTeardown),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.engine.is_none()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn callback_stats(&self) -> CallbackStats {
        self.registry.stats()
    }

    /// The last time the engine reported reaching, if it has been evolved.
    ///
    pub fn time(&self) -> Option<f64> {
        self.driver.reached()
    }

    pub(crate) fn engine(&self) -> Result<&dyn Engine, Error> {
        self.engine.as_deref().ok_or(Error::UseAfterTeardown)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            warn!("engine handle dropped without teardown; destroying engine");
            drop(engine);
        }
    }
}
