use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};
use peanoclaw::config::{Backend, EngineConfig, ReferenceSettings};
use peanoclaw::output::{OutputFormat, OutputWriter};
use peanoclaw::solvers::{circular_step, Acoustics, BoundaryConditions, BoundaryKind, FiniteVolumeSolver, ShallowWater};
use peanoclaw::state::{Dimension, Domain, State};
use peanoclaw::{CallbackRegistry, Controller, EngineHandle};
use simple_logger::SimpleLogger;

#[derive(Debug, Parser)]
#[clap(version = "0.1", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    /// Equations to solve: acoustics or shallow-water
    #[clap(long, default_value = "acoustics")]
    solver: String,

    #[clap(short = 't', long, default_value = "0.5")]
    tfinal: f64,

    #[clap(short = 'n', long, default_value = "12")]
    num_output_times: usize,

    #[clap(short = 'o', long, default_value = "_output")]
    outdir: PathBuf,

    /// Frame encoding: cbor or msgpack
    #[clap(short = 'f', long, default_value = "cbor")]
    format: OutputFormat,

    /// Engine backend: native or reference
    #[clap(short = 'b', long, default_value = "native")]
    backend: String,

    /// Directory holding the native engine library
    #[clap(long)]
    library_dir: Option<PathBuf>,

    #[clap(short = 's', long, default_value = "6")]
    subdivision_factor: usize,

    /// Solve unsplit instead of with dimensional splitting
    #[clap(long)]
    unsplit: bool,
}

fn registry(opts: &Opts, state: &State) -> Result<CallbackRegistry, String> {
    let walls = BoundaryConditions::uniform(BoundaryKind::Wall);
    let initial = circular_step((0.5, 0.5), 0.2, vec![2.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]);

    match opts.solver.as_str() {
        "acoustics" => Ok(CallbackRegistry::from_solver(FiniteVolumeSolver::new(Acoustics::from_state(state), walls, initial))),
        "shallow-water" => Ok(CallbackRegistry::from_solver(FiniteVolumeSolver::new(ShallowWater::from_state(state), walls, initial))),
        other => Err(format!("unknown solver '{}'", other)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let opts = Opts::parse();
    info!("{:?}", opts);

    let sf = opts.subdivision_factor;
    let x = Dimension::new("x", 0.0, 1.0, sf);
    let y = Dimension::new("y", 0.0, 1.0, sf);
    let mut state = State::new(Domain::new(x, y), 3);
    Acoustics::new(1.0, 4.0).set_problem_data(&mut state);

    let backend = match opts.backend.as_str() {
        "native" => Backend::Native { library_dir: opts.library_dir.clone() },
        "reference" => Backend::Reference(ReferenceSettings::default()),
        other => return Err(format!("unknown backend '{}'", other).into()),
    };
    let mesh_width = (1.0 / 9.0) / sf as f64;
    let config = EngineConfig::from_state(&state, mesh_width, 2, 1.0, !opts.unsplit).with_backend(backend);

    let mut handle = EngineHandle::create(config, registry(&opts, &state)?)?;
    let controller = Controller::new(opts.tfinal, opts.num_output_times)
        .with_output(OutputWriter::new(&opts.outdir, opts.format)?);

    let result = controller.run(&mut handle);
    let stats = handle.callback_stats();
    handle.destroy()?;

    let solution = result?;
    info!(
        "reached t={} on {} cells; q[0] in [{:.4}, {:.4}]; {} solver calls",
        solution.time,
        solution.total_cells(),
        solution.min(0).unwrap_or(f64::NAN),
        solution.max(0).unwrap_or(f64::NAN),
        stats.solver);

    Ok(())
}
