// Tests for coroutines on the worker pool
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use super::{num, s};
use crate::*;

fn coroutine<F>(vm: &LuaVM, body: F) -> LuaThread
where
    F: Fn(&LuaState, MultiValue) -> LuaResult<MultiValue> + Send + Sync + 'static,
{
    vm.create_thread(LuaFunction::script("body", body))
}

/// Marks a coroutine body as running; a failed exchange means two workers
/// were inside the same body at once.
fn enter(flag: &AtomicBool, overlaps: &AtomicUsize) {
    if flag
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        overlaps.fetch_add(1, Ordering::SeqCst);
    }
}

fn leave(flag: &AtomicBool, overlaps: &AtomicUsize) {
    if flag
        .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        overlaps.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn test_yield_then_finish() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let co = coroutine(&vm, |state, _| {
        state.yield_values(MultiValue::single(s("a")))?;
        Ok(MultiValue::single(s("b")))
    });

    assert_eq!(state.status(&co), CoroutineStatus::Suspended);
    let first = state.resume(&co, MultiValue::empty()).unwrap();
    assert_eq!(first.all_values(), vec![s("a")]);
    assert_eq!(state.status(&co), CoroutineStatus::Suspended);

    let second = state.resume(&co, MultiValue::empty()).unwrap();
    assert_eq!(second.all_values(), vec![s("b")]);
    assert_eq!(state.status(&co), CoroutineStatus::Dead);

    let err = state.resume(&co, MultiValue::empty()).unwrap_err();
    assert_eq!(err.to_string(), "cannot resume dead coroutine");
    assert_eq!(state.status(&co), CoroutineStatus::Dead);
}

#[test]
fn test_values_flow_both_ways() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let co = coroutine(&vm, |state, args| {
        let sum: f64 = args.iter().filter_map(LuaValue::as_number).sum();
        let resumed = state.yield_values(MultiValue::single(num(sum)))?;
        let n = resumed.first().and_then(LuaValue::as_number).unwrap_or_default();
        Ok(MultiValue::two(num(n * 2.0), s("end")))
    });

    let yielded = state.resume(&co, MultiValue::two(num(1.0), num(2.0))).unwrap();
    assert_eq!(yielded.all_values(), vec![num(3.0)]);
    let finished = state.resume(&co, MultiValue::single(num(10.0))).unwrap();
    assert_eq!(finished.all_values(), vec![num(20.0), s("end")]);
}

#[test]
fn test_main_thread_cannot_yield_or_be_resumed() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();

    let err = state.yield_values(MultiValue::empty()).unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::UnsupportedOperation);
    assert_eq!(err.to_string(), "cannot yield the main thread");

    let main = state.current_thread();
    assert!(main.is_main());
    assert!(!state.is_yieldable());
    let err = state.resume(&main, MultiValue::empty()).unwrap_err();
    assert_eq!(err.to_string(), "cannot resume the main thread");
    assert_eq!(state.status(&main), CoroutineStatus::Running);
}

#[test]
fn test_error_kills_coroutine() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let co = coroutine(&vm, |_, _| Err(LuaError::runtime("boom")));

    let err = state.resume(&co, MultiValue::empty()).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(state.status(&co), CoroutineStatus::Dead);
    assert_eq!(state.call_depth(), 0);
}

#[test]
fn test_status_seen_from_inside() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let co = coroutine(&vm, |state, _| {
        let me = state.current_thread();
        let main = state.vm().main_thread().clone();
        Ok(MultiValue::multiple(vec![
            s(state.status(&me).name()),
            s(state.status(&main).name()),
            LuaValue::Boolean(state.is_yieldable()),
            LuaValue::Thread(me),
        ]))
    });

    let seen = state.resume(&co, MultiValue::empty()).unwrap().all_values();
    assert_eq!(seen[0], s("running"));
    assert_eq!(seen[1], s("normal"));
    assert_eq!(seen[2], LuaValue::Boolean(true));
    assert!(seen[3].as_thread().unwrap().ptr_eq(&co));
}

#[test]
fn test_nested_resume_marks_outer_normal() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let inner = coroutine(&vm, |state, args| {
        let outer = args.first().and_then(LuaValue::as_thread).cloned();
        let status = outer.map_or("missing", |t| state.status(&t).name());
        Ok(MultiValue::single(s(status)))
    });
    let outer = coroutine(&vm, move |state, _| {
        let me = state.current_thread();
        let seen = state.resume(&inner, MultiValue::single(LuaValue::Thread(me.clone())))?;
        let after = state.status(&me);
        Ok(MultiValue::two(seen.into_first(), s(after.name())))
    });

    let result = state.resume(&outer, MultiValue::empty()).unwrap();
    assert_eq!(result.all_values(), vec![s("normal"), s("running")]);
}

#[test]
fn test_wrap() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let body = LuaFunction::script("counter", |state, _| {
        state.yield_values(MultiValue::single(num(1.0)))?;
        state.yield_values(MultiValue::single(num(2.0)))?;
        Ok(MultiValue::single(s("done")))
    });
    let next = LuaValue::Function(state.wrap(body));

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(state.call(&next, MultiValue::empty()).unwrap().into_first());
    }
    assert_eq!(seen, vec![num(1.0), num(2.0), s("done")]);
    let err = state.call(&next, MultiValue::empty()).unwrap_err();
    assert_eq!(err.to_string(), "cannot resume dead coroutine");
}

#[test]
fn test_dropping_last_handle_aborts() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let aborted = Arc::new(AtomicBool::new(false));
    let flag = aborted.clone();
    let co = coroutine(&vm, move |state, _| {
        let result = state.yield_values(MultiValue::empty());
        if let Err(LuaError::Aborted) = &result {
            flag.store(true, Ordering::SeqCst);
        }
        result
    });

    state.resume(&co, MultiValue::empty()).unwrap();
    assert_eq!(vm.scheduler().live_threads(), 1);
    drop(co);

    assert!(wait_until(Duration::from_secs(2), || aborted.load(Ordering::SeqCst)));
    assert!(wait_until(Duration::from_secs(2), || vm.scheduler().live_threads() == 0));
}

#[test]
fn test_close_aborts_suspended_coroutines() {
    let (vm, _) = super::test_vm();
    let state = vm.main_state();
    let co = coroutine(&vm, |state, _| {
        loop {
            state.yield_values(MultiValue::empty())?;
        }
    });
    state.resume(&co, MultiValue::empty()).unwrap();

    vm.close();
    assert!(vm.is_closed());
    assert!(vm.scheduler().pool().is_shutdown());
    let err = state.resume(&co, MultiValue::empty()).unwrap_err();
    assert_eq!(err.to_string(), "cannot resume dead coroutine");
    assert!(wait_until(Duration::from_secs(2), || co.status() == CoroutineStatus::Dead));

    let late = coroutine(&vm, |_, _| Ok(MultiValue::empty()));
    assert!(state.resume(&late, MultiValue::empty()).is_err());
    assert_eq!(late.status(), CoroutineStatus::Dead);
}

#[test]
fn test_many_coroutines_from_many_threads() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 50;

    let (vm, _) = super::test_vm();
    let finished = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let start = Barrier::new(THREADS);

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let vm = &vm;
            let start = &start;
            let finished = finished.clone();
            let overlaps = overlaps.clone();
            scope.spawn(move || {
                let state = vm.main_state();
                start.wait();
                for i in 0..PER_THREAD {
                    let finished = finished.clone();
                    let overlaps = overlaps.clone();
                    let inside = Arc::new(AtomicBool::new(false));
                    let co = coroutine(vm, move |state, args| {
                        enter(&inside, &overlaps);
                        leave(&inside, &overlaps);
                        let resumed = state.yield_values(args)?;
                        enter(&inside, &overlaps);
                        finished.fetch_add(1, Ordering::SeqCst);
                        leave(&inside, &overlaps);
                        Ok(resumed)
                    });
                    let tag = (t * PER_THREAD + i) as f64;
                    let echoed = state.resume(&co, MultiValue::single(num(tag))).unwrap();
                    assert_eq!(echoed.into_first(), num(tag));
                    assert!(!co.is_executing());
                    let done = state.resume(&co, MultiValue::single(num(-tag))).unwrap();
                    assert_eq!(done.into_first(), num(-tag));
                    assert_eq!(co.status(), CoroutineStatus::Dead);
                }
            });
        }
    });

    assert_eq!(finished.load(Ordering::SeqCst), THREADS * PER_THREAD);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(wait_until(Duration::from_secs(2), || vm.scheduler().live_threads() == 0));
}

#[test]
fn test_shared_coroutines_never_run_twice() {
    const THREADS: usize = 4;
    const COROUTINES: usize = 200;
    const YIELDS: usize = 3;

    let (vm, _) = super::test_vm();
    let finished = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let threads: Vec<LuaThread> = (0..COROUTINES)
        .map(|_| {
            let finished = finished.clone();
            let overlaps = overlaps.clone();
            let inside = Arc::new(AtomicBool::new(false));
            coroutine(&vm, move |state, _| {
                enter(&inside, &overlaps);
                for _ in 0..YIELDS {
                    leave(&inside, &overlaps);
                    state.yield_values(MultiValue::empty())?;
                    enter(&inside, &overlaps);
                }
                finished.fetch_add(1, Ordering::SeqCst);
                leave(&inside, &overlaps);
                Ok(MultiValue::empty())
            })
        })
        .collect();
    let start = Barrier::new(THREADS);

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let (vm, start, threads) = (&vm, &start, &threads);
            scope.spawn(move || {
                let state = vm.main_state();
                start.wait();
                // every caller walks the same coroutines from a different offset
                for k in 0..COROUTINES {
                    let co = &threads[(k + t * COROUTINES / THREADS) % COROUTINES];
                    while co.status() != CoroutineStatus::Dead {
                        if let Err(err) = state.resume(co, MultiValue::empty()) {
                            let message = err.to_string();
                            assert!(
                                message == "cannot resume non-suspended coroutine"
                                    || message == "cannot resume dead coroutine",
                                "{message}"
                            );
                            std::thread::yield_now();
                        }
                    }
                }
            });
        }
    });

    assert_eq!(finished.load(Ordering::SeqCst), COROUTINES);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_resume_is_rejected() {
    let (vm, _) = super::test_vm();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let (in_body, out_body) = (entered.clone(), release.clone());
    let co = coroutine(&vm, move |_, _| {
        in_body.wait();
        out_body.wait();
        Ok(MultiValue::single(s("finished")))
    });

    std::thread::scope(|scope| {
        let runner = scope.spawn(|| vm.main_state().resume(&co, MultiValue::empty()));

        entered.wait();
        let state = vm.main_state();
        assert!(co.is_executing());
        assert_eq!(state.status(&co), CoroutineStatus::Running);
        let err = state.resume(&co, MultiValue::empty()).unwrap_err();
        assert_eq!(err.kind(), LuaErrorKind::Runtime);
        assert_eq!(err.to_string(), "cannot resume non-suspended coroutine");
        release.wait();

        let result = runner.join().unwrap().unwrap();
        assert_eq!(result.into_first(), s("finished"));
    });
}
