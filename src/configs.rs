//! Config Store
//!
//! Every EGL config handed to a client is stored here for the life of the
//! process, so a GLXFBConfig always resolves to the same EGL config.

use crate::driver::{
    EGL_BLUE_SIZE, EGL_COLOR_BUFFER_TYPE, EGL_GREEN_SIZE, EGL_NONE, EGL_OPENGL_BIT,
    EGL_PBUFFER_BIT, EGL_RED_SIZE, EGL_RENDERABLE_TYPE, EGL_RGB_BUFFER, EGL_SURFACE_TYPE,
    EGLint, EglConfig,
};
use crate::handle::{Arena, Handle, HandleKind};

/// Kind marker for GLXFBConfig handles
pub struct FbConfig;

impl HandleKind for FbConfig {
    const TAG: usize = 0x5C;
    const NAME: &'static str = "GLXFBConfig";
}

pub type ConfigHandle = Handle<FbConfig>;

/// Criteria for the config used when a client does not name one
pub const DEFAULT_CONFIG_ATTRIBS: &[EGLint] = &[
    EGL_COLOR_BUFFER_TYPE, EGL_RGB_BUFFER,
    EGL_RED_SIZE, 8,
    EGL_GREEN_SIZE, 8,
    EGL_BLUE_SIZE, 8,
    EGL_SURFACE_TYPE, EGL_PBUFFER_BIT,
    EGL_RENDERABLE_TYPE, EGL_OPENGL_BIT,
    EGL_NONE,
];

/// Append-only store of selected EGL configs
#[derive(Default)]
pub struct ConfigStore {
    configs: Arena<FbConfig, EglConfig>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap freshly enumerated configs into new handles
    pub fn store_all(&mut self, configs: &[EglConfig]) -> Vec<ConfigHandle> {
        configs.iter().map(|&config| self.configs.insert(config)).collect()
    }

    pub fn resolve(&self, handle: ConfigHandle) -> crate::error::Result<EglConfig> {
        self.configs.get(handle).copied()
    }
}
