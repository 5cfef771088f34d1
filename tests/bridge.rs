use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use peanoclaw::config::{Backend, EngineConfig, ReferenceSettings};
use peanoclaw::index_space::{Axis, Side};
use peanoclaw::output::{OutputFormat, OutputWriter};
use peanoclaw::solution::materialize;
use peanoclaw::solvers::{circular_step, BoundaryConditions, BoundaryKind, FiniteVolumeSolver, ShallowWater};
use peanoclaw::state::{Dimension, Domain, State};
use peanoclaw::{
    CallbackError,
    CallbackRegistry,
    CallbackRole,
    Controller,
    EngineHandle,
    Error,
    EvolutionError,
    InitializationError,
    PatchSolver,
    SolutionView,
    Status,
    StepOutcome,
};

fn state() -> State {
    let x = Dimension::new("x", 0.0, 1.0, 6);
    let y = Dimension::new("y", 0.0, 1.0, 6);
    State::new(Domain::new(x, y), 3)
}

fn config() -> EngineConfig {
    EngineConfig::from_state(&state(), 1.0 / 54.0, 2, 1.0, true)
        .with_backend(Backend::Reference(ReferenceSettings::default()))
}

fn dam_break() -> FiniteVolumeSolver<ShallowWater> {
    FiniteVolumeSolver::new(
        ShallowWater::new(1.0),
        BoundaryConditions::uniform(BoundaryKind::Wall),
        circular_step((0.5, 0.5), 0.2, vec![2.0, 0.0, 0.0], vec![1.0, 0.0, 0.0]))
}

/// Callbacks that fill a constant, copy edges outward and accept any step,
/// estimating `next_dt` for the following one.
fn constant(next_dt: f64) -> CallbackRegistry {
    CallbackRegistry::new(
        |patch| {
            for index in patch.geometry().interior().iter() {
                patch.get_slice_mut(index).fill(1.0);
            }
            Ok(())
        },
        |patch, axis, side| {
            for index in patch.geometry().ghost_region(axis, side).iter() {
                patch.get_slice_mut(index).fill(1.0);
            }
            Ok(())
        },
        move |_, max_dt| Ok(StepOutcome { dt_used: max_dt, dt_estimated: next_dt }))
}

fn total_depth(state: &peanoclaw::SolverState) -> f64 {
    state
        .patches
        .iter()
        .map(|p| {
            let area = p.size[0] * p.size[1] / p.num_cells() as f64;
            p.q.iter().step_by(3).sum::<f64>() * area
        })
        .sum()
}




// ============================================================================
#[test]
fn create_then_destroy_invokes_no_callbacks() {
    let mut handle = EngineHandle::create(config(), CallbackRegistry::from_solver(dam_break())).unwrap();
    assert_eq!(handle.callback_stats().total(), 0);
    assert_eq!(handle.time(), None);

    handle.destroy().unwrap();
    assert!(handle.is_destroyed());
    assert_eq!(handle.callback_stats().total(), 0);
    assert!(matches!(handle.destroy(), Err(Error::UseAfterTeardown)));
}

#[test]
fn initialization_is_deterministic() {
    let run = || {
        let mut handle = EngineHandle::create(config(), CallbackRegistry::from_solver(dam_break())).unwrap();
        assert_eq!(handle.evolve_to_time(0.0).unwrap(), 0.0);
        let stats = handle.callback_stats();
        assert_eq!(stats.initialization, 81);
        assert_eq!(stats.solver, 0);
        let state = materialize(&handle).unwrap();
        handle.destroy().unwrap();
        state
    };
    let a = run();
    let b = run();
    assert_eq!(a, b);
    assert_eq!(a.total_cells(), 54 * 54);
    assert_eq!(a.max(0), Some(2.0));
    assert_eq!(a.min(0), Some(1.0));
}

#[test]
fn boundary_callback_only_writes_ghost_cells() {
    let solver = Rc::new(dam_break());
    let faces = Rc::new(RefCell::new(HashSet::new()));
    let interior_changed = Rc::new(RefCell::new(false));

    let registry = {
        let (s0, s1, s2) = (solver.clone(), solver.clone(), solver.clone());
        let (faces, changed) = (faces.clone(), interior_changed.clone());

        CallbackRegistry::new(
            move |patch| s0.initialize(patch),
            move |patch, axis, side| {
                let g = *patch.geometry();
                let before: Vec<f64> = g.interior().iter().flat_map(|i| patch.get_slice(i).to_vec()).collect();
                s1.fill_boundary(patch, axis, side)?;
                let after: Vec<f64> = g.interior().iter().flat_map(|i| patch.get_slice(i).to_vec()).collect();
                if before != after {
                    *changed.borrow_mut() = true;
                }
                faces.borrow_mut().insert((axis, side));
                Ok(())
            },
            move |patch, max_dt| s2.step(patch, max_dt))
    };

    let mut handle = EngineHandle::create(config(), registry).unwrap();
    handle.evolve_to_time(0.02).unwrap();
    handle.destroy().unwrap();

    assert!(!*interior_changed.borrow());
    for axis in Axis::both() {
        for side in Side::both() {
            assert!(faces.borrow().contains(&(axis, side)));
        }
    }
}

#[test]
fn evolving_to_a_reached_time_is_free() {
    let mut handle = EngineHandle::create(config(), CallbackRegistry::from_solver(dam_break())).unwrap();
    assert_eq!(handle.evolve_to_time(0.05).unwrap(), 0.05);
    let stats = handle.callback_stats();

    assert_eq!(handle.evolve_to_time(0.05).unwrap(), 0.05);
    assert_eq!(handle.evolve_to_time(0.01).unwrap(), 0.05);
    assert_eq!(handle.callback_stats(), stats);
    handle.destroy().unwrap();
}

#[test]
fn patch_times_stay_within_the_evolved_interval() {
    let solver = Rc::new(dam_break());
    let times = Rc::new(RefCell::new(Vec::new()));

    let registry = {
        let (s0, s1, s2) = (solver.clone(), solver.clone(), solver.clone());
        let (t1, t2) = (times.clone(), times.clone());

        CallbackRegistry::new(
            move |patch| s0.initialize(patch),
            move |patch, axis, side| {
                t1.borrow_mut().push(patch.geometry().current_time);
                s1.fill_boundary(patch, axis, side)
            },
            move |patch, max_dt| {
                t2.borrow_mut().push(patch.geometry().current_time);
                s2.step(patch, max_dt)
            })
    };

    let mut handle = EngineHandle::create(config(), registry).unwrap();
    handle.evolve_to_time(0.03).unwrap();
    times.borrow_mut().clear();
    handle.evolve_to_time(0.06).unwrap();
    handle.destroy().unwrap();

    let times = times.borrow();
    assert!(!times.is_empty());
    assert!(times.iter().all(|&t| (0.03..=0.06).contains(&t)));
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn zero_subdivision_fails_before_loading_anything() {
    for axis in 0..2 {
        let mut config = config().with_backend(Backend::Native { library_dir: Some("/nonexistent/peanoclaw".into()) });
        config.subdivision_factor[axis] = 0;

        match EngineHandle::create(config, constant(0.1)) {
            Err(Error::Initialization(InitializationError::InvalidConfig(_))) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("engine created with a zero subdivision factor"),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
#[test]
fn missing_library_is_reported_with_its_path() {
    let dir = std::env::temp_dir().join("peanoclaw-no-library-here");
    let config = config().with_backend(Backend::Native { library_dir: Some(dir.clone()) });

    match EngineHandle::create(config, constant(0.1)) {
        Err(Error::Initialization(InitializationError::LibraryNotFound { path })) => {
            assert_eq!(path.parent(), Some(dir.as_path()));
            assert!(path.file_name().unwrap().to_string_lossy().starts_with("libpeano-claw-2d."));
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("found an engine library in {}", dir.display()),
    }
}

#[test]
fn evolving_after_destroy_fails_without_callbacks() {
    let mut handle = EngineHandle::create(config(), constant(0.1)).unwrap();
    handle.evolve_to_time(0.2).unwrap();
    let stats = handle.callback_stats();
    handle.destroy().unwrap();

    assert!(matches!(handle.evolve_to_time(0.4), Err(Error::UseAfterTeardown)));
    assert!(matches!(handle.evolve_to_time(0.1), Err(Error::UseAfterTeardown)));
    assert!(matches!(materialize(&handle), Err(Error::UseAfterTeardown)));
    assert_eq!(handle.callback_stats(), stats);
}

#[test]
fn last_step_lands_exactly_on_the_target() {
    let mut handle = EngineHandle::create(config(), constant(0.3)).unwrap();
    assert_eq!(handle.evolve_to_time(0.5).unwrap(), 0.5);
    assert_eq!(handle.time(), Some(0.5));
    // Initial dt 1.0 is clamped to 0.5 on the first step.
    assert_eq!(handle.callback_stats().solver, 81);
    assert_eq!(handle.evolve_to_time(0.7).unwrap(), 0.7);
    handle.destroy().unwrap();
}

#[test]
fn invalid_targets_are_rejected() {
    let mut handle = EngineHandle::create(config(), constant(0.1)).unwrap();
    assert!(matches!(handle.evolve_to_time(f64::NAN), Err(Error::Evolution(EvolutionError::InvalidTarget(_)))));
    assert!(matches!(handle.evolve_to_time(f64::INFINITY), Err(Error::Evolution(EvolutionError::InvalidTarget(_)))));
    assert_eq!(handle.callback_stats().total(), 0);
    handle.destroy().unwrap();
}

#[test]
fn rejected_steps_are_retried_with_the_suggested_timestep() {
    let offered = Rc::new(RefCell::new(Vec::new()));
    let seen = offered.clone();

    let registry = CallbackRegistry::new(
        |_| Ok(()),
        |_, _, _| Ok(()),
        move |_, max_dt| {
            seen.borrow_mut().push(max_dt);
            if max_dt > 0.01 {
                Err(CallbackError::StepRejected { suggested_dt: Some(0.01), reason: "too large".into() })
            } else {
                Ok(StepOutcome { dt_used: max_dt, dt_estimated: 0.01 })
            }
        });

    let mut handle = EngineHandle::create(config(), registry).unwrap();
    assert_eq!(handle.evolve_to_time(0.05).unwrap(), 0.05);
    handle.destroy().unwrap();

    let offered = offered.borrow();
    assert_eq!(offered[0], 1.0_f64.min(0.05));
    assert!(offered.iter().skip(1).all(|&dt| dt <= 0.01 + 1e-15));
}

#[test]
fn repeated_rejection_exhausts_the_retries() {
    let registry = CallbackRegistry::new(
        |_| Ok(()),
        |_, _, _| Ok(()),
        |_, _| Err(CallbackError::StepRejected { suggested_dt: None, reason: "never".into() }));
    let mut handle = EngineHandle::create(config(), registry).unwrap();

    match handle.evolve_to_time(0.1) {
        Err(Error::Evolution(EvolutionError::Aborted { status, callback, .. })) => {
            assert_eq!(status, Status::RetriesExhausted);
            assert!(matches!(callback, Some((CallbackRole::Solver, CallbackError::StepRejected { .. }))));
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    handle.destroy().unwrap();
}

#[test]
fn fatal_callback_errors_abort_the_evolution() {
    let registry = CallbackRegistry::new(
        |_| Ok(()),
        |_, _, _| Ok(()),
        |_, _| Err(CallbackError::Fatal("diverged".into())));
    let mut handle = EngineHandle::create(config(), registry).unwrap();

    match handle.evolve_to_time(0.1) {
        Err(Error::Evolution(EvolutionError::Aborted { status, callback, target_time, .. })) => {
            assert_eq!(status, Status::CallbackFailed);
            assert_eq!(target_time, 0.1);
            assert_eq!(callback, Some((CallbackRole::Solver, CallbackError::Fatal("diverged".into()))));
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert_eq!(handle.time(), None);
    handle.destroy().unwrap();
}

#[test]
fn dam_break_reaches_the_final_time_with_positive_depth() {
    let mut handle = EngineHandle::create(config(), CallbackRegistry::from_solver(dam_break())).unwrap();
    handle.evolve_to_time(0.0).unwrap();
    let initial = materialize(&handle).unwrap();

    let reached = handle.evolve_to_time(0.5).unwrap();
    assert_eq!(reached, 0.5);

    let solution = materialize(&handle).unwrap();
    handle.destroy().unwrap();

    assert_eq!(solution.time, 0.5);
    assert_eq!(solution.patches.len(), 81);
    assert_eq!(solution.total_cells(), 54 * 54);
    assert!(solution.values(0).all(|h| h >= 0.0));
    assert!(solution.max(0).unwrap() < 2.0);
    assert!((total_depth(&solution) - total_depth(&initial)).abs() < 1e-8);
}

#[test]
fn solution_view_refreshes_only_when_time_moves() {
    let mut handle = EngineHandle::create(config(), constant(0.1)).unwrap();
    let mut view = SolutionView::new();

    handle.evolve_to_time(0.1).unwrap();
    assert_eq!(view.get(&handle).unwrap().time, 0.1);
    handle.evolve_to_time(0.1).unwrap();
    assert_eq!(view.get(&handle).unwrap().time, 0.1);
    handle.evolve_to_time(0.2).unwrap();
    assert_eq!(view.get(&handle).unwrap().time, 0.2);

    handle.destroy().unwrap();
    assert!(matches!(view.get(&handle), Err(Error::UseAfterTeardown)));
}

#[test]
fn controller_frames_round_trip_through_disk() {
    for format in [OutputFormat::Cbor, OutputFormat::MessagePack] {
        let dir = std::env::temp_dir().join(format!("peanoclaw-frames-{:?}", format));
        let writer = OutputWriter::new(&dir, format).unwrap();
        let mut handle = EngineHandle::create(config(), CallbackRegistry::from_solver(dam_break())).unwrap();

        let last = Controller::new(0.02, 2).with_output(writer.clone()).run(&mut handle).unwrap();
        handle.destroy().unwrap();

        assert_eq!(last.time, 0.02);
        assert_eq!(writer.read_frame(2).unwrap(), last);
        assert_eq!(writer.read_frame(0).unwrap().time, 0.0);
    }
}

#[test]
fn recovered_rejections_are_not_blamed_for_later_aborts() {
    let broken = Rc::new(std::cell::Cell::new(false));
    let rejected_once = Rc::new(std::cell::Cell::new(false));

    let registry = {
        let (broken, rejected_once) = (broken.clone(), rejected_once.clone());

        CallbackRegistry::new(
            |_| Ok(()),
            |_, _, _| Ok(()),
            move |_, max_dt| {
                if broken.get() {
                    return Ok(StepOutcome { dt_used: 0.0, dt_estimated: 0.05 });
                }
                if max_dt > 0.05 && !rejected_once.get() {
                    rejected_once.set(true);
                    return Err(CallbackError::StepRejected { suggested_dt: Some(0.05), reason: "recovered".into() });
                }
                Ok(StepOutcome { dt_used: max_dt, dt_estimated: 0.05 })
            })
    };

    let mut handle = EngineHandle::create(config(), registry).unwrap();
    assert_eq!(handle.evolve_to_time(0.1).unwrap(), 0.1);
    assert!(rejected_once.get());

    broken.set(true);
    match handle.evolve_to_time(0.2) {
        Err(Error::Evolution(EvolutionError::Aborted { status, callback, .. })) => {
            assert_eq!(status, Status::EngineFailure);
            assert_eq!(callback, None);
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    handle.destroy().unwrap();
}

#[test]
fn controller_returns_the_final_frame_without_output() {
    let mut handle = EngineHandle::create(config(), constant(0.3)).unwrap();

    let last = Controller::new(0.5, 0).run(&mut handle).unwrap();
    assert_eq!(last.time, 0.5);
    assert_eq!(last.patches.len(), 81);
    assert_eq!(handle.time(), Some(0.5));

    handle.destroy().unwrap();
    assert!(matches!(Controller::new(0.5, 2).run(&mut handle), Err(Error::UseAfterTeardown)));
}
