// Tests for the bounded worker pool
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use crate::lua_vm::ThreadPool;
use crate::*;

fn lean_options(idle_timeout: Duration) -> PoolOptions {
    PoolOptions {
        min_idle: 0,
        idle_target: 0.0,
        idle_timeout,
        stack_size: None,
    }
}

#[test]
fn test_jobs_run_on_workers() {
    super::init_tracing();
    let pool = ThreadPool::new(PoolOptions::default());
    let (tx, rx) = mpsc::channel();
    for i in 0..10 {
        let tx = tx.clone();
        pool.execute(Box::new(move || {
            let name = std::thread::current().name().map(str::to_owned);
            let _ = tx.send((i, name));
        }))
        .unwrap();
    }

    let mut seen: Vec<_> = (0..10)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    seen.sort_by_key(|(i, _)| *i);
    assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    assert!(seen.iter().all(|(_, name)| name.is_some()));
    pool.shutdown();
}

#[test]
fn test_idle_workers_time_out() {
    super::init_tracing();
    let pool = ThreadPool::new(lean_options(Duration::from_millis(50)));
    let (tx, rx) = mpsc::channel();
    pool.execute(Box::new(move || {
        let _ = tx.send(());
    }))
    .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while pool.worker_count() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    eprintln!("workers left: {}", pool.worker_count());
    assert_eq!(pool.worker_count(), 0);
    assert_eq!(pool.idle_count(), 0);

    // a later job spawns a fresh worker
    let (tx, rx) = mpsc::channel();
    pool.execute(Box::new(move || {
        let _ = tx.send(());
    }))
    .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_pool_grows_for_blocked_jobs() {
    super::init_tracing();
    let pool = ThreadPool::new(lean_options(Duration::from_secs(30)));
    let gate = Arc::new(Barrier::new(4));
    for _ in 0..3 {
        let gate = gate.clone();
        pool.execute(Box::new(move || {
            gate.wait();
        }))
        .unwrap();
    }

    assert_eq!(pool.worker_count(), 3);
    assert_eq!(pool.idle_count(), 0);
    gate.wait();
    pool.shutdown();
}

#[test]
fn test_execute_after_shutdown_fails() {
    let pool = ThreadPool::new(PoolOptions::default());
    pool.shutdown();
    assert!(pool.is_shutdown());
    let err = pool.execute(Box::new(|| {})).unwrap_err();
    assert_eq!(err.to_string(), "worker pool is shut down");
    // shutting down twice is harmless
    pool.shutdown();
}

#[test]
fn test_panicking_job_keeps_pool_alive() {
    super::init_tracing();
    let pool = ThreadPool::new(PoolOptions::default());
    pool.execute(Box::new(|| panic!("job failure"))).unwrap();

    let (tx, rx) = mpsc::channel();
    pool.execute(Box::new(move || {
        let _ = tx.send(7);
    }))
    .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    pool.shutdown();
}
