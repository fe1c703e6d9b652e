//! Current-Binding Tracker
//!
//! What the client last made current, plus the last context that was ever
//! made current. Swap uses the latter to read back a surface even when the
//! client has unbound everything.

use tracing::debug;

use crate::context::ContextHandle;
use crate::driver::EglSurface;
use crate::x11::{Drawable, XDisplay};

/// Drawable/surface/context triple as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub display: XDisplay,
    pub drawable: Option<Drawable>,
    pub surface: EglSurface,
    pub context: Option<ContextHandle>,
}

impl Default for Binding {
    fn default() -> Self {
        Self {
            display: XDisplay::null(),
            drawable: None,
            surface: EglSurface::NO_SURFACE,
            context: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BindingTracker {
    current: Binding,
    last_valid: Option<ContextHandle>,
}

impl BindingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binding that has already taken effect in EGL
    pub fn record(&mut self, binding: Binding) {
        debug!(
            "Current: drawable={:?} surface={:?} context={:?}",
            binding.drawable, binding.surface, binding.context
        );
        self.current = binding;
        if binding.context.is_some() {
            self.last_valid = binding.context;
        }
    }

    pub fn current(&self) -> Binding {
        self.current
    }

    /// Most recent non-null context ever made current
    pub fn last_valid(&self) -> Option<ContextHandle> {
        self.last_valid
    }
}
