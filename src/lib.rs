//! Subprime: a GLX implementation on top of EGL
//!
//! Loaded by the vendor-neutral GLX dispatcher as `libGLX_subprime.so`.
//! Rendering always happens in EGL pbuffers; `glXSwapBuffers` reads the
//! finished frame back and puts it into the X11 drawable.

pub mod binding;
pub mod config;
pub mod configs;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod glx;
pub mod handle;
pub mod present;
pub mod session;
pub mod surface;
pub mod translate;
pub mod vendor;
pub mod x11;

#[cfg(test)]
mod testing;

use std::sync::{Mutex, OnceLock};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ShimConfig;
use crate::driver::NativeDriver;
use crate::error::ShimError;
use crate::session::Session;
use crate::x11::XlibWindows;

/// Filter directives, EnvFilter syntax
pub const LOG_ENV: &str = "SUBPRIME_LOG";
/// Any non-empty value other than `0` turns on per-call tracing
pub const TRACE_ENV: &str = "SUBPRIME_TRACE";

type NativeSession = Session<NativeDriver, XlibWindows>;

// GLX callers are single-threaded per connection; the lock only makes the
// global shareable
static SESSION: OnceLock<Mutex<NativeSession>> = OnceLock::new();

/// Level used when `SUBPRIME_LOG` is not set
fn default_level(trace: Option<&str>) -> &'static str {
    match trace {
        Some(value) if !value.is_empty() && value != "0" => "trace",
        _ => "warn",
    }
}

/// Install the stderr subscriber unless the host already has one
pub fn init_logging() {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new(default_level(std::env::var(TRACE_ENV).ok().as_deref())),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn open_session() -> Result<NativeSession, ShimError> {
    let config = ShimConfig::load();
    let driver = NativeDriver::open(&config)?;
    let windows = XlibWindows::open()?;
    let session = Session::new(driver, windows, config)?;
    info!("subprime GLX ready");
    Ok(session)
}

/// Run `f` against the process-wide session, creating it on first use.
/// A session that cannot be created stops the process.
pub(crate) fn with_session<T>(f: impl FnOnce(&mut NativeSession) -> T) -> T {
    let session = SESSION.get_or_init(|| {
        init_logging();
        match open_session() {
            Ok(session) => Mutex::new(session),
            Err(err) => error::fatal(&err),
        }
    });
    // A panic mid-call already aborted the client's frame; keep going
    let mut guard = session.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}
