//! EGL/GL driver binding
//!
//! Opens the vendor EGL library with `libloading`, resolves every entry point
//! the shim needs up front, and loads the GL read-back functions through the
//! `gl` crate (the same way the compositor loads GL through
//! `glXGetProcAddress`).

use anyhow::{Context, Result, bail};
use libloading::Library;
use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;
use tracing::{debug, info, warn};

use super::{
    Driver, EGL_NONE, ReadBackState, EGL_PLATFORM_DEVICE_EXT, EGL_TRUE, EGLBoolean, EGLenum, EGLint,
    EglConfig, EglContext, EglDisplay, EglSurface, egl_failure,
};
use crate::config::{DisplayPlatform, ShimConfig};
use crate::error;

type GetDisplayFn = unsafe extern "C" fn(*mut c_void) -> EglDisplay;
type InitializeFn = unsafe extern "C" fn(EglDisplay, *mut EGLint, *mut EGLint) -> EGLBoolean;
type ChooseConfigFn =
    unsafe extern "C" fn(EglDisplay, *const EGLint, *mut EglConfig, EGLint, *mut EGLint) -> EGLBoolean;
type GetConfigAttribFn =
    unsafe extern "C" fn(EglDisplay, EglConfig, EGLint, *mut EGLint) -> EGLBoolean;
type CreateContextFn =
    unsafe extern "C" fn(EglDisplay, EglConfig, EglContext, *const EGLint) -> EglContext;
type CreatePbufferSurfaceFn =
    unsafe extern "C" fn(EglDisplay, EglConfig, *const EGLint) -> EglSurface;
type DestroySurfaceFn = unsafe extern "C" fn(EglDisplay, EglSurface) -> EGLBoolean;
type MakeCurrentFn =
    unsafe extern "C" fn(EglDisplay, EglSurface, EglSurface, EglContext) -> EGLBoolean;
type BindApiFn = unsafe extern "C" fn(EGLenum) -> EGLBoolean;
type GetErrorFn = unsafe extern "C" fn() -> EGLint;
type GetProcAddressFn = unsafe extern "C" fn(*const c_char) -> *const c_void;

// EGL_EXT_device_enumeration / EGL_EXT_platform_base
type QueryDevicesFn = unsafe extern "C" fn(EGLint, *mut *mut c_void, *mut EGLint) -> EGLBoolean;
type GetPlatformDisplayFn = unsafe extern "C" fn(EGLenum, *mut c_void, *const EGLint) -> EglDisplay;

/// Errors drained from the GL error queue after one read-back
const MAX_DRAINED_ERRORS: usize = 8;

fn get_integer(name: gl::types::GLenum) -> gl::types::GLint {
    let mut value = 0;
    unsafe { gl::GetIntegerv(name, &mut value) };
    value
}

/// Resolved EGL entry points
#[allow(non_snake_case)]
struct EglApi {
    eglGetDisplay: GetDisplayFn,
    eglInitialize: InitializeFn,
    eglChooseConfig: ChooseConfigFn,
    eglGetConfigAttrib: GetConfigAttribFn,
    eglCreateContext: CreateContextFn,
    eglCreatePbufferSurface: CreatePbufferSurfaceFn,
    eglDestroySurface: DestroySurfaceFn,
    eglMakeCurrent: MakeCurrentFn,
    eglBindAPI: BindApiFn,
    eglGetError: GetErrorFn,
    eglGetProcAddress: GetProcAddressFn,
}

/// Copy a function pointer out of the library, naming the symbol on failure
unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T> {
    let sym = unsafe { lib.get::<T>(name.as_bytes()) }
        .with_context(|| format!("missing EGL entry point {}", name))?;
    Ok(*sym)
}

impl EglApi {
    fn load(lib: &Library) -> Result<Self> {
        unsafe {
            Ok(Self {
                eglGetDisplay: symbol(lib, "eglGetDisplay")?,
                eglInitialize: symbol(lib, "eglInitialize")?,
                eglChooseConfig: symbol(lib, "eglChooseConfig")?,
                eglGetConfigAttrib: symbol(lib, "eglGetConfigAttrib")?,
                eglCreateContext: symbol(lib, "eglCreateContext")?,
                eglCreatePbufferSurface: symbol(lib, "eglCreatePbufferSurface")?,
                eglDestroySurface: symbol(lib, "eglDestroySurface")?,
                eglMakeCurrent: symbol(lib, "eglMakeCurrent")?,
                eglBindAPI: symbol(lib, "eglBindAPI")?,
                eglGetError: symbol(lib, "eglGetError")?,
                eglGetProcAddress: symbol(lib, "eglGetProcAddress")?,
            })
        }
    }
}

/// Driver backed by the system EGL library
pub struct NativeDriver {
    api: EglApi,
    platform: DisplayPlatform,
    display: Option<EglDisplay>,
    _egl: Library,
    // Kept loaded: `gl` holds pointers into it
    _gl: Option<Library>,
}

impl NativeDriver {
    /// Bind the EGL and GL entry points named by the configuration
    pub fn open(config: &ShimConfig) -> Result<Self> {
        let egl = unsafe { Library::new(&config.egl_library) }
            .with_context(|| format!("Failed to load {}", config.egl_library))?;
        let api = EglApi::load(&egl)?;
        info!("Bound EGL entry points from {}", config.egl_library);

        let gl_lib = match unsafe { Library::new(&config.gl_library) } {
            Ok(lib) => Some(lib),
            Err(e) => {
                debug!("GL fallback library {} unavailable: {}", config.gl_library, e);
                None
            }
        };

        // Load OpenGL function pointers
        let get_proc = api.eglGetProcAddress;
        gl::load_with(|name| {
            let Ok(name_cstr) = CString::new(name) else {
                return ptr::null();
            };
            let proc = unsafe { get_proc(name_cstr.as_ptr()) };
            if !proc.is_null() {
                return proc;
            }
            gl_lib
                .as_ref()
                .and_then(|lib| unsafe { lib.get::<*const c_void>(name.as_bytes()) }.ok())
                .map(|sym| *sym)
                .unwrap_or(ptr::null())
        });

        let required = [
            ("glReadBuffer", gl::ReadBuffer::is_loaded()),
            ("glReadPixels", gl::ReadPixels::is_loaded()),
            ("glFinish", gl::Finish::is_loaded()),
            ("glGetIntegerv", gl::GetIntegerv::is_loaded()),
            ("glPixelStorei", gl::PixelStorei::is_loaded()),
            ("glGetError", gl::GetError::is_loaded()),
        ];
        if let Some((call, _)) = required.iter().find(|(_, loaded)| !loaded) {
            bail!(error::ShimError::Gl { call: *call });
        }
        if !gl::BindFramebuffer::is_loaded() || !gl::BindBuffer::is_loaded() {
            debug!("No framebuffer or buffer objects, read-back skips their bindings");
        }

        Ok(Self {
            api,
            platform: config.platform,
            display: None,
            _egl: egl,
            _gl: gl_lib,
        })
    }

    fn last_error(&self) -> EGLint {
        unsafe { (self.api.eglGetError)() }
    }

    /// Turn an `EGLBoolean` result into `Result`
    fn check(&self, call: &'static str, ret: EGLBoolean) -> error::Result<()> {
        if ret == EGL_TRUE {
            Ok(())
        } else {
            Err(egl_failure(call, ret, self.last_error()))
        }
    }

    /// Open the first EGL device, if the driver can enumerate any
    fn device_display(&self) -> Option<EglDisplay> {
        let query = self.proc_address(c"eglQueryDevicesEXT");
        let platform_display = self.proc_address(c"eglGetPlatformDisplayEXT");
        if query.is_null() || platform_display.is_null() {
            warn!("EGL device enumeration unavailable, using the default display");
            return None;
        }

        let query: QueryDevicesFn = unsafe { std::mem::transmute(query) };
        let platform_display: GetPlatformDisplayFn = unsafe { std::mem::transmute(platform_display) };

        let mut device = ptr::null_mut();
        let mut count = 0;
        let ok = unsafe { query(1, &mut device, &mut count) };
        if ok != EGL_TRUE || count < 1 {
            warn!("No EGL devices found, using the default display");
            return None;
        }

        let attribs = [EGL_NONE];
        let display = unsafe { platform_display(EGL_PLATFORM_DEVICE_EXT, device, attribs.as_ptr()) };
        if display.is_null() {
            warn!("eglGetPlatformDisplayEXT failed, using the default display");
            return None;
        }
        Some(display)
    }
}

impl Driver for NativeDriver {
    fn initialize(&mut self) -> error::Result<EglDisplay> {
        if let Some(display) = self.display {
            return Ok(display);
        }

        let display = match self.platform {
            DisplayPlatform::Device => self.device_display(),
            DisplayPlatform::Default => None,
        };
        let display = match display {
            Some(display) => display,
            None => unsafe { (self.api.eglGetDisplay)(ptr::null_mut()) },
        };
        if display.is_null() {
            return Err(egl_failure("eglGetDisplay", 0, self.last_error()));
        }

        let mut major = 0;
        let mut minor = 0;
        let ret = unsafe { (self.api.eglInitialize)(display, &mut major, &mut minor) };
        self.check("eglInitialize", ret)?;
        info!("EGL {}.{} initialized", major, minor);

        self.display = Some(display);
        Ok(display)
    }

    fn choose_config(
        &self,
        display: EglDisplay,
        attribs: &[EGLint],
        max: usize,
    ) -> error::Result<Vec<EglConfig>> {
        let mut configs = vec![EglConfig::NONE; max];
        let mut count = 0;
        let ret = unsafe {
            (self.api.eglChooseConfig)(
                display,
                attribs.as_ptr(),
                configs.as_mut_ptr(),
                max as EGLint,
                &mut count,
            )
        };
        self.check("eglChooseConfig", ret)?;
        configs.truncate(count.max(0) as usize);
        Ok(configs)
    }

    fn config_attrib(
        &self,
        display: EglDisplay,
        config: EglConfig,
        attribute: EGLint,
    ) -> error::Result<EGLint> {
        let mut value = 0;
        let ret = unsafe { (self.api.eglGetConfigAttrib)(display, config, attribute, &mut value) };
        self.check("eglGetConfigAttrib", ret)?;
        Ok(value)
    }

    fn bind_api(&self, api: EGLenum) -> error::Result<()> {
        let ret = unsafe { (self.api.eglBindAPI)(api) };
        self.check("eglBindAPI", ret)
    }

    fn create_context(
        &self,
        display: EglDisplay,
        config: EglConfig,
        share: EglContext,
        attribs: &[EGLint],
    ) -> error::Result<EglContext> {
        let context = unsafe { (self.api.eglCreateContext)(display, config, share, attribs.as_ptr()) };
        if context.is_null() {
            return Err(egl_failure("eglCreateContext", 0, self.last_error()));
        }
        Ok(context)
    }

    fn create_pbuffer_surface(
        &self,
        display: EglDisplay,
        config: EglConfig,
        width: u32,
        height: u32,
    ) -> error::Result<EglSurface> {
        let attribs = [
            super::EGL_WIDTH, width as EGLint,
            super::EGL_HEIGHT, height as EGLint,
            EGL_NONE,
        ];
        let surface = unsafe { (self.api.eglCreatePbufferSurface)(display, config, attribs.as_ptr()) };
        if surface.is_null() {
            return Err(egl_failure("eglCreatePbufferSurface", 0, self.last_error()));
        }
        Ok(surface)
    }

    fn destroy_surface(&self, display: EglDisplay, surface: EglSurface) -> error::Result<()> {
        let ret = unsafe { (self.api.eglDestroySurface)(display, surface) };
        self.check("eglDestroySurface", ret)
    }

    fn make_current(
        &self,
        display: EglDisplay,
        draw: EglSurface,
        read: EglSurface,
        context: EglContext,
    ) -> error::Result<()> {
        let ret = unsafe { (self.api.eglMakeCurrent)(display, draw, read, context) };
        self.check("eglMakeCurrent", ret)
    }

    fn proc_address(&self, name: &CStr) -> *const c_void {
        unsafe { (self.api.eglGetProcAddress)(name.as_ptr()) }
    }

    fn finish(&self) {
        unsafe { gl::Finish() };
    }

    fn begin_read_back(&self) -> ReadBackState {
        let mut saved = ReadBackState::default();
        unsafe {
            if gl::BindFramebuffer::is_loaded() {
                saved.read_framebuffer = get_integer(gl::READ_FRAMEBUFFER_BINDING);
                gl::BindFramebuffer(gl::READ_FRAMEBUFFER, 0);
            }
            if gl::BindBuffer::is_loaded() {
                saved.pack_buffer = get_integer(gl::PIXEL_PACK_BUFFER_BINDING);
                gl::BindBuffer(gl::PIXEL_PACK_BUFFER, 0);
            }
            // Read buffer state belongs to the framebuffer now bound: the default one
            saved.read_buffer = get_integer(gl::READ_BUFFER);
            saved.pack_alignment = get_integer(gl::PACK_ALIGNMENT);
            saved.pack_row_length = get_integer(gl::PACK_ROW_LENGTH);
            saved.pack_skip_rows = get_integer(gl::PACK_SKIP_ROWS);
            saved.pack_skip_pixels = get_integer(gl::PACK_SKIP_PIXELS);

            gl::ReadBuffer(gl::BACK);
            gl::PixelStorei(gl::PACK_ALIGNMENT, 4);
            gl::PixelStorei(gl::PACK_ROW_LENGTH, 0);
            gl::PixelStorei(gl::PACK_SKIP_ROWS, 0);
            gl::PixelStorei(gl::PACK_SKIP_PIXELS, 0);
        }
        saved
    }

    fn end_read_back(&self, saved: ReadBackState) {
        unsafe {
            gl::PixelStorei(gl::PACK_ALIGNMENT, saved.pack_alignment);
            gl::PixelStorei(gl::PACK_ROW_LENGTH, saved.pack_row_length);
            gl::PixelStorei(gl::PACK_SKIP_ROWS, saved.pack_skip_rows);
            gl::PixelStorei(gl::PACK_SKIP_PIXELS, saved.pack_skip_pixels);
            gl::ReadBuffer(saved.read_buffer as gl::types::GLenum);
            if gl::BindBuffer::is_loaded() {
                gl::BindBuffer(gl::PIXEL_PACK_BUFFER, saved.pack_buffer as gl::types::GLuint);
            }
            if gl::BindFramebuffer::is_loaded() {
                gl::BindFramebuffer(gl::READ_FRAMEBUFFER, saved.read_framebuffer as gl::types::GLuint);
            }

            for _ in 0..MAX_DRAINED_ERRORS {
                let err = gl::GetError();
                if err == gl::NO_ERROR {
                    break;
                }
                debug!("Dropped GL error 0x{:x} raised during read-back", err);
            }
        }
    }

    fn read_pixels(&self, width: u32, height: u32, pixels: &mut [u8]) {
        debug_assert!(pixels.len() >= 4 * width as usize * height as usize);
        unsafe {
            gl::ReadPixels(
                0,
                0,
                width as i32,
                height as i32,
                gl::BGRA,
                gl::UNSIGNED_BYTE,
                pixels.as_mut_ptr() as *mut c_void,
            );
        }
    }
}
