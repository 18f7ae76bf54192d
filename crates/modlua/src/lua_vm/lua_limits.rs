//! Runtime limits and tuning constants.
//!
//! Everything that bounds recursion or sizes the worker pool lives here so
//! the defaults in [`super::LuaSettings`] and the engine agree.

use std::time::Duration;

// ===== Metatables =====

/// Maximum number of `__index` / `__newindex` hops followed before a chain
/// is reported as a probable loop.
pub const MAXTAGLOOP: usize = 2000;

// ===== Calls =====

/// Default maximum nesting of native invocations on one logical thread.
/// Exceeding it raises a `RuntimeError` ("stack overflow") instead of
/// exhausting the host stack.
pub const MAX_CALL_DEPTH: usize = 200;

/// Most values a single call may spread into a result list (`unpack`,
/// `table.unpack`).
pub const MAX_RESULTS: usize = 1_000_000;

// ===== Worker pool =====

/// Idle workers kept on top of the target fraction.
pub const POOL_MIN_IDLE: usize = 5;

/// Fraction of all workers allowed to sit idle before the pool trims.
pub const POOL_IDLE_TARGET: f64 = 0.75;

/// How long an idle worker waits for work before shutting down.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Thread name prefix for pool workers.
pub const WORKER_NAME_PREFIX: &str = "modlua-worker";

// ===== Tables =====

/// Tombstone count below which the hash part never compacts.
pub const MIN_TOMBSTONE_COMPACT: usize = 8;
