// Test module organization
pub mod test_coroutine;
pub mod test_overload;
pub mod test_registration;
pub mod test_thread_pool;
pub mod test_userdata;

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::*;

/// Install a subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory stdout shared between the settings and the test.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A VM with every library open and stdout captured.
pub fn test_vm() -> (LuaVM, Capture) {
    init_tracing();
    let capture = Capture::default();
    let vm = LuaVM::new(
        LuaSettings::new()
            .with_name("test")
            .with_stdout(capture.clone())
            .with_rng_seed(7),
    );
    (vm, capture)
}

pub fn script<F>(name: &str, body: F) -> LuaValue
where
    F: Fn(&LuaState, MultiValue) -> LuaResult<MultiValue> + Send + Sync + 'static,
{
    LuaValue::Function(LuaFunction::script(name, body))
}

pub fn call_global(state: &LuaState, name: &str, args: Vec<LuaValue>) -> LuaResult<MultiValue> {
    let callee = state.get_global(name)?;
    state.call(&callee, MultiValue::multiple(args))
}

pub fn num(n: f64) -> LuaValue {
    LuaValue::Number(n)
}

pub fn s(text: &str) -> LuaValue {
    LuaValue::string(text)
}
