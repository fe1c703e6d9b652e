//! Error Module
//!
//! Failure tiers of the shim. Core operations return `ShimError`; only the
//! `extern "C"` boundary decides whether an error stops the process.

use thiserror::Error;
use tracing::error;

/// Errors raised by the session and its collaborators
#[derive(Debug, Error)]
pub enum ShimError {
    /// An EGL call the shim depends on did not return `EGL_TRUE` / a valid object
    #[error("`{call}` returned {ret}, err=0x{code:x}")]
    Egl {
        call: &'static str,
        ret: u32,
        code: i32,
    },

    /// A GL entry point needed for read-back is missing
    #[error("GL entry point `{call}` is not loaded")]
    Gl { call: &'static str },

    /// Internal consistency check failed
    #[error("assertion failed at {file}:{line}: {condition}")]
    Assertion {
        condition: &'static str,
        file: &'static str,
        line: u32,
    },

    /// The windowing system could not report the size of a drawable
    #[error("could not query geometry of drawable 0x{drawable:x}")]
    Geometry { drawable: u64 },

    /// Image wrapper construction for presentation failed
    #[error("could not wrap pixels as an XImage for drawable 0x{drawable:x}")]
    Image { drawable: u64 },

    /// A handle that does not resolve in the arena it was presented to
    #[error("invalid {kind} handle 0x{raw:x}")]
    InvalidHandle { kind: &'static str, raw: usize },

    /// Loading the native EGL/GL/X11 libraries failed
    #[error("driver binding failed: {0:#}")]
    Driver(#[from] anyhow::Error),
}

impl ShimError {
    /// Whether this error must terminate the process at the API boundary.
    ///
    /// Invalid handles are caller mistakes and map to the GLX failure
    /// sentinel; everything else means the rendering state can no longer be
    /// trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ShimError::InvalidHandle { .. })
    }
}

pub type Result<T> = std::result::Result<T, ShimError>;

/// Build a `ShimError::Assertion` unless the condition holds
#[macro_export]
macro_rules! shim_ensure {
    ($cond:expr) => {
        if !($cond) {
            return Err($crate::error::ShimError::Assertion {
                condition: stringify!($cond),
                file: file!(),
                line: line!(),
            });
        }
    };
}

/// Log a fatal error and stop the process.
///
/// Unwinding across the C boundary is not an option, so this aborts.
pub fn fatal(err: &ShimError) -> ! {
    if has_subscriber() {
        error!("[subprime] fatal: {}", err);
    } else {
        eprintln!("[subprime] fatal: {}", err);
    }
    std::process::abort()
}

/// The message must reach stderr exactly once, with or without a subscriber
fn has_subscriber() -> bool {
    tracing::dispatcher::get_default(|dispatch| !dispatch.is::<tracing::subscriber::NoSubscriber>())
}

/// Resolve a boundary result: fatal errors abort, soft errors yield `fallback`
pub fn settle<T>(result: Result<T>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) if err.is_fatal() => fatal(&err),
        Err(err) => {
            tracing::warn!("{}", err);
            fallback
        }
    }
}
