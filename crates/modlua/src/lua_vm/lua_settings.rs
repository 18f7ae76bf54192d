// Environment settings consumed by library code and the scheduler.
// Frozen into an Arc once the VM is created.
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::lua_limits::{MAX_CALL_DEPTH, POOL_IDLE_TARGET, POOL_IDLE_TIMEOUT, POOL_MIN_IDLE};
use crate::lua_value::LuaValue;

pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;
pub type SharedReader = Arc<Mutex<Box<dyn BufRead + Send>>>;
pub type QuitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Set of standard library surfaces opened by `LuaVM::new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stdlib(u8);

impl Stdlib {
    pub const NONE: Stdlib = Stdlib(0);
    pub const BASIC: Stdlib = Stdlib(1);
    pub const COROUTINE: Stdlib = Stdlib(1 << 1);
    pub const MATH: Stdlib = Stdlib(1 << 2);
    pub const TABLE: Stdlib = Stdlib(1 << 3);
    pub const ALL: Stdlib = Stdlib(0b1111);

    pub fn contains(self, other: Stdlib) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Stdlib {
    type Output = Stdlib;

    fn bitor(self, rhs: Stdlib) -> Stdlib {
        Stdlib(self.0 | rhs.0)
    }
}

/// Text encoding used by library code talking to the streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// One byte per char; chars above U+00FF become `?`.
    Latin1,
}

impl Encoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub min_idle: usize,
    pub idle_target: f64,
    pub idle_timeout: Duration,
    /// Native stack size of each worker; the platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_idle: POOL_MIN_IDLE,
            idle_target: POOL_IDLE_TARGET,
            idle_timeout: POOL_IDLE_TIMEOUT,
            stack_size: None,
        }
    }
}

#[derive(Clone)]
pub struct LuaSettings {
    pub name: String,
    pub libraries: Stdlib,
    pub stdout: SharedWriter,
    pub stdin: SharedReader,
    pub encoding: Encoding,
    pub on_quit: Option<QuitHandler>,
    pub max_call_depth: usize,
    pub pool: PoolOptions,
    /// Seed for the scheduler RNG; entropy when `None`.
    pub rng_seed: Option<u64>,
}

impl Default for LuaSettings {
    fn default() -> Self {
        Self {
            name: "modlua".to_owned(),
            libraries: Stdlib::ALL,
            stdout: Arc::new(Mutex::new(Box::new(io::stdout()))),
            stdin: Arc::new(Mutex::new(Box::new(BufReader::new(io::stdin())))),
            encoding: Encoding::Utf8,
            on_quit: None,
            max_call_depth: MAX_CALL_DEPTH,
            pool: PoolOptions::default(),
            rng_seed: None,
        }
    }
}

impl LuaSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_libraries(mut self, libraries: Stdlib) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn with_stdout(mut self, out: impl Write + Send + 'static) -> Self {
        self.stdout = Arc::new(Mutex::new(Box::new(out)));
        self
    }

    pub fn with_stdin(mut self, input: impl BufRead + Send + 'static) -> Self {
        self.stdin = Arc::new(Mutex::new(Box::new(input)));
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn on_quit(mut self, handler: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.on_quit = Some(Arc::new(handler));
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Write `text` to the configured stdout in the configured encoding.
    pub fn write_out(&self, text: &str) -> io::Result<()> {
        let bytes = self.encoding.encode(text);
        let mut out = self.stdout.lock();
        out.write_all(&bytes)?;
        out.flush()
    }

    /// Read one line (without the terminator) from the configured stdin.
    /// `None` at end of input.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.stdin.lock().read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(self.encoding.decode(&buf)))
    }
}

impl fmt::Debug for LuaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaSettings")
            .field("name", &self.name)
            .field("libraries", &self.libraries)
            .field("encoding", &self.encoding)
            .field("max_call_depth", &self.max_call_depth)
            .field("pool", &self.pool)
            .field("rng_seed", &self.rng_seed)
            .finish_non_exhaustive()
    }
}

/// Map a script exit value to a process exit code: nil and true are 0,
/// false is 1, numbers are rounded, anything else is 1.
pub fn exit_code(value: &LuaValue) -> i32 {
    match value {
        LuaValue::Nil | LuaValue::Boolean(true) => 0,
        LuaValue::Boolean(false) => 1,
        LuaValue::Number(n) if n.is_finite() => n.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        _ => 1,
    }
}
