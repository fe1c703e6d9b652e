//! Context Manager
//!
//! GLXContext handles wrapping EGL contexts. Contexts are never destroyed:
//! `glXDestroyContext` is accepted and ignored, and the EGL context is
//! released with the process. The host applications this shim serves are
//! short-lived, so the retained contexts are a known cost.

use tracing::debug;

use crate::configs::ConfigHandle;
use crate::driver::{Driver, EGL_OPENGL_API, EglConfig, EglContext, EglDisplay};
use crate::error::Result;
use crate::handle::{Arena, Handle, HandleKind};

/// Kind marker for GLXContext handles
pub struct GlxContext;

impl HandleKind for GlxContext {
    const TAG: usize = 0xC7;
    const NAME: &'static str = "GLXContext";
}

pub type ContextHandle = Handle<GlxContext>;

/// One GLX context
#[derive(Debug, Clone, Copy)]
pub struct ContextEntry {
    pub egl: EglContext,
    /// Config the context was created from
    pub config: ConfigHandle,
    pub share: Option<ContextHandle>,
}

#[derive(Default)]
pub struct ContextStore {
    contexts: Arena<GlxContext, ContextEntry>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an EGL context and wrap it in a new handle.
    ///
    /// Desktop GL is bound as the client API first; `attribs` is an
    /// `EGL_NONE`-terminated EGL context attribute list.
    pub fn create<D: Driver>(
        &mut self,
        driver: &D,
        display: EglDisplay,
        config: (ConfigHandle, EglConfig),
        share: Option<ContextHandle>,
        attribs: &[i32],
    ) -> Result<ContextHandle> {
        let share_egl = self.egl_context(share)?;

        driver.bind_api(EGL_OPENGL_API)?;
        let egl = driver.create_context(display, config.1, share_egl, attribs)?;

        let handle = self.contexts.insert(ContextEntry {
            egl,
            config: config.0,
            share,
        });
        debug!("Created {:?} (EGL {:?}, config {:?}, share {:?})", handle, egl, config.0, share);
        Ok(handle)
    }

    pub fn get(&self, handle: ContextHandle) -> Result<&ContextEntry> {
        self.contexts.get(handle)
    }

    /// EGL context behind an optional handle, `EGL_NO_CONTEXT` for none
    pub fn egl_context(&self, handle: Option<ContextHandle>) -> Result<EglContext> {
        match handle {
            Some(handle) => Ok(self.get(handle)?.egl),
            None => Ok(EglContext::NO_CONTEXT),
        }
    }
}
