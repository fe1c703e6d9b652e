//! Driver Module
//!
//! The EGL and GL services the shim consumes. `Driver` is the seam between
//! the GLX translation logic and the vendor's acceleration library, which is
//! only known at runtime.

pub mod native;

use std::ffi::{CStr, c_void};
use std::ptr;

use crate::error::Result;

pub use native::NativeDriver;

pub type EGLint = i32;
pub type EGLBoolean = u32;
pub type EGLenum = u32;

// EGL tokens used by the shim
pub const EGL_TRUE: EGLBoolean = 1;
pub const EGL_NONE: EGLint = 0x3038;

pub const EGL_BUFFER_SIZE: EGLint = 0x3020;
pub const EGL_ALPHA_SIZE: EGLint = 0x3021;
pub const EGL_BLUE_SIZE: EGLint = 0x3022;
pub const EGL_GREEN_SIZE: EGLint = 0x3023;
pub const EGL_RED_SIZE: EGLint = 0x3024;
pub const EGL_DEPTH_SIZE: EGLint = 0x3025;
pub const EGL_STENCIL_SIZE: EGLint = 0x3026;
pub const EGL_CONFIG_ID: EGLint = 0x3028;
pub const EGL_LEVEL: EGLint = 0x3029;
pub const EGL_SAMPLES: EGLint = 0x3031;
pub const EGL_SAMPLE_BUFFERS: EGLint = 0x3032;
pub const EGL_SURFACE_TYPE: EGLint = 0x3033;
pub const EGL_COLOR_BUFFER_TYPE: EGLint = 0x303F;
pub const EGL_RENDERABLE_TYPE: EGLint = 0x3040;
pub const EGL_WIDTH: EGLint = 0x3057;
pub const EGL_HEIGHT: EGLint = 0x3056;
pub const EGL_RGB_BUFFER: EGLint = 0x308E;

pub const EGL_PBUFFER_BIT: EGLint = 0x0001;
pub const EGL_OPENGL_BIT: EGLint = 0x0008;
pub const EGL_OPENGL_API: EGLenum = 0x30A2;

pub const EGL_CONTEXT_MAJOR_VERSION: EGLint = 0x3098;
pub const EGL_CONTEXT_MINOR_VERSION: EGLint = 0x30FB;
pub const EGL_CONTEXT_OPENGL_PROFILE_MASK: EGLint = 0x30FD;
pub const EGL_CONTEXT_OPENGL_DEBUG: EGLint = 0x31B0;
pub const EGL_CONTEXT_OPENGL_FORWARD_COMPATIBLE: EGLint = 0x31B1;

pub const EGL_PLATFORM_DEVICE_EXT: EGLenum = 0x313F;

macro_rules! egl_handle {
    ($(#[$meta:meta])* $name:ident, $null:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(pub *mut c_void);

        // EGL objects are plain identifiers owned by the driver
        unsafe impl Send for $name {}

        impl $name {
            pub const $null: Self = Self(ptr::null_mut());

            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }
    };
}

egl_handle!(
    /// `EGLDisplay`
    EglDisplay, NO_DISPLAY
);
egl_handle!(
    /// `EGLConfig`
    EglConfig, NONE
);
egl_handle!(
    /// `EGLContext`
    EglContext, NO_CONTEXT
);
egl_handle!(
    /// `EGLSurface`
    EglSurface, NO_SURFACE
);

/// GL read state the client had before a read-back redirected it.
///
/// Read-back must see the surface's back buffer through the default
/// framebuffer with tightly packed rows, whatever the client left bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadBackState {
    pub read_framebuffer: i32,
    pub pack_buffer: i32,
    /// `GL_READ_BUFFER` of the default framebuffer
    pub read_buffer: i32,
    pub pack_alignment: i32,
    pub pack_row_length: i32,
    pub pack_skip_rows: i32,
    pub pack_skip_pixels: i32,
}

/// EGL/GL operations consumed by the shim.
///
/// Every method that can fail reports the raw return value and the
/// `eglGetError` code through `ShimError::Egl`.
pub trait Driver {
    /// Acquire and initialize the display all shim objects live on
    fn initialize(&mut self) -> Result<EglDisplay>;

    /// Enumerate configs matching an `EGL_NONE`-terminated list, at most `max`
    fn choose_config(&self, display: EglDisplay, attribs: &[EGLint], max: usize)
        -> Result<Vec<EglConfig>>;

    fn config_attrib(&self, display: EglDisplay, config: EglConfig, attribute: EGLint)
        -> Result<EGLint>;

    fn bind_api(&self, api: EGLenum) -> Result<()>;

    fn create_context(
        &self,
        display: EglDisplay,
        config: EglConfig,
        share: EglContext,
        attribs: &[EGLint],
    ) -> Result<EglContext>;

    fn create_pbuffer_surface(
        &self,
        display: EglDisplay,
        config: EglConfig,
        width: u32,
        height: u32,
    ) -> Result<EglSurface>;

    fn destroy_surface(&self, display: EglDisplay, surface: EglSurface) -> Result<()>;

    fn make_current(
        &self,
        display: EglDisplay,
        draw: EglSurface,
        read: EglSurface,
        context: EglContext,
    ) -> Result<()>;

    /// `eglGetProcAddress`; null when the driver does not know the name
    fn proc_address(&self, name: &CStr) -> *const c_void;

    /// `glFinish`
    fn finish(&self);

    /// Save the client's read state, then read from the surface's back buffer
    /// through framebuffer 0 with no pack buffer and default packing
    fn begin_read_back(&self) -> ReadBackState;

    /// Put back what `begin_read_back` saved and drop any GL error the
    /// read-back raised
    fn end_read_back(&self, saved: ReadBackState);

    /// Read the current read surface's back buffer as 32-bit BGRA rows,
    /// bottom row first. Only valid between `begin_read_back` and
    /// `end_read_back`.
    fn read_pixels(&self, width: u32, height: u32, pixels: &mut [u8]);
}

/// Build the `ShimError` for a failed EGL call
pub(crate) fn egl_failure(call: &'static str, ret: u32, code: EGLint) -> crate::error::ShimError {
    crate::error::ShimError::Egl { call, ret, code }
}
