//! Recording fakes for the EGL driver and the windowing system

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::rc::Rc;

use crate::driver::{
    Driver, EGL_ALPHA_SIZE, EGL_BLUE_SIZE, EGL_BUFFER_SIZE, EGL_COLOR_BUFFER_TYPE, EGL_CONFIG_ID,
    EGL_DEPTH_SIZE, EGL_GREEN_SIZE, EGL_NONE, EGL_OPENGL_BIT, EGL_PBUFFER_BIT, EGL_RED_SIZE,
    EGL_RENDERABLE_TYPE, EGL_RGB_BUFFER, EGL_STENCIL_SIZE, EGL_SURFACE_TYPE, EGLenum, EGLint,
    EglConfig, EglContext, EglDisplay, EglSurface, ReadBackState, egl_failure,
};
use crate::error::{Result, ShimError};
use crate::x11::{Drawable, Geometry, WindowSystem, XDisplay};
use x11_dl::xlib;

/// Address returned for every name the fake driver is asked to resolve
pub const DRIVER_PROC: usize = 0x9_0000;
pub const DEFAULT_VISUAL_ID: xlib::VisualID = 0x21;

const EGL_BAD_ATTRIBUTE: EGLint = 0x3004;
const EGL_BAD_MATCH: EGLint = 0x3009;

fn fake_ptr(n: usize) -> *mut c_void {
    n as *mut c_void
}

/// One recorded driver call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize,
    ChooseConfig(Vec<EGLint>),
    BindApi(EGLenum),
    CreateContext { share: EglContext },
    CreatePbuffer { width: u32, height: u32, surface: EglSurface },
    DestroySurface(EglSurface),
    MakeCurrent { draw: EglSurface, read: EglSurface, context: EglContext },
    Finish,
    BeginReadBack,
    ReadPixels { width: u32, height: u32 },
    EndReadBack,
}

pub struct FakeState {
    pub calls: Vec<Call>,
    pub configs: Vec<EglConfig>,
    pub attribs: Vec<HashMap<EGLint, EGLint>>,
    pub fail_create_context: bool,
    pub fail_make_current: bool,
    /// What EGL considers current: (draw surface, context)
    pub current: (EglSurface, EglContext),
    /// Read framebuffer binding of the current context, 0 is the default
    pub read_framebuffer: i32,
    next_object: usize,
}

impl FakeState {
    fn next(&mut self) -> *mut c_void {
        self.next_object += 1;
        fake_ptr(self.next_object)
    }
}

/// `Driver` over an in-memory list of configs
#[derive(Clone)]
pub struct FakeDriver {
    state: Rc<RefCell<FakeState>>,
}

impl FakeDriver {
    /// Driver exposing `n_configs` RGBA8 configs; odd ones lack alpha
    pub fn new(n_configs: usize) -> Self {
        let configs = (0..n_configs).map(|i| EglConfig(fake_ptr(0x100 + i))).collect();
        let attribs = (0..n_configs)
            .map(|i| {
                let alpha = if i % 2 == 0 { 8 } else { 0 };
                HashMap::from([
                    (EGL_BUFFER_SIZE, 24 + alpha),
                    (EGL_RED_SIZE, 8),
                    (EGL_GREEN_SIZE, 8),
                    (EGL_BLUE_SIZE, 8),
                    (EGL_ALPHA_SIZE, alpha),
                    (EGL_DEPTH_SIZE, 24),
                    (EGL_STENCIL_SIZE, 8),
                    (EGL_CONFIG_ID, i as EGLint + 1),
                    (EGL_SURFACE_TYPE, EGL_PBUFFER_BIT),
                    (EGL_RENDERABLE_TYPE, EGL_OPENGL_BIT),
                    (EGL_COLOR_BUFFER_TYPE, EGL_RGB_BUFFER),
                ])
            })
            .collect();

        Self {
            state: Rc::new(RefCell::new(FakeState {
                calls: Vec::new(),
                configs,
                attribs,
                fail_create_context: false,
                fail_make_current: false,
                current: (EglSurface::NO_SURFACE, EglContext::NO_CONTEXT),
                read_framebuffer: 0,
                next_object: 0x1000,
            })),
        }
    }

    pub fn state(&self) -> Ref<'_, FakeState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    pub fn display(&self) -> EglDisplay {
        EglDisplay(fake_ptr(0xD15))
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn matches(attribs: &HashMap<EGLint, EGLint>, criteria: &[EGLint]) -> bool {
        criteria
            .chunks_exact(2)
            .take_while(|pair| pair[0] != EGL_NONE)
            .all(|pair| {
                let have = attribs.get(&pair[0]).copied().unwrap_or(0);
                match pair[0] {
                    EGL_SURFACE_TYPE | EGL_RENDERABLE_TYPE => have & pair[1] == pair[1],
                    EGL_COLOR_BUFFER_TYPE | EGL_CONFIG_ID => have == pair[1],
                    _ => have >= pair[1],
                }
            })
    }
}

impl Driver for FakeDriver {
    fn initialize(&mut self) -> Result<EglDisplay> {
        self.record(Call::Initialize);
        Ok(self.display())
    }

    fn choose_config(&self, _display: EglDisplay, attribs: &[EGLint], max: usize) -> Result<Vec<EglConfig>> {
        self.record(Call::ChooseConfig(attribs.to_vec()));
        let state = self.state.borrow();
        Ok(state
            .configs
            .iter()
            .zip(&state.attribs)
            .filter(|(_, config_attribs)| Self::matches(config_attribs, attribs))
            .map(|(config, _)| *config)
            .take(max)
            .collect())
    }

    fn config_attrib(&self, _display: EglDisplay, config: EglConfig, attribute: EGLint) -> Result<EGLint> {
        let state = self.state.borrow();
        state
            .configs
            .iter()
            .position(|c| *c == config)
            .and_then(|i| state.attribs[i].get(&attribute).copied())
            .ok_or_else(|| egl_failure("eglGetConfigAttrib", 0, EGL_BAD_ATTRIBUTE))
    }

    fn bind_api(&self, api: EGLenum) -> Result<()> {
        self.record(Call::BindApi(api));
        Ok(())
    }

    fn create_context(
        &self,
        _display: EglDisplay,
        _config: EglConfig,
        share: EglContext,
        _attribs: &[EGLint],
    ) -> Result<EglContext> {
        self.record(Call::CreateContext { share });
        let mut state = self.state.borrow_mut();
        if state.fail_create_context {
            return Err(egl_failure("eglCreateContext", 0, EGL_BAD_MATCH));
        }
        Ok(EglContext(state.next()))
    }

    fn create_pbuffer_surface(
        &self,
        _display: EglDisplay,
        _config: EglConfig,
        width: u32,
        height: u32,
    ) -> Result<EglSurface> {
        let surface = EglSurface(self.state.borrow_mut().next());
        self.record(Call::CreatePbuffer { width, height, surface });
        Ok(surface)
    }

    fn destroy_surface(&self, _display: EglDisplay, surface: EglSurface) -> Result<()> {
        self.record(Call::DestroySurface(surface));
        Ok(())
    }

    fn make_current(
        &self,
        _display: EglDisplay,
        draw: EglSurface,
        read: EglSurface,
        context: EglContext,
    ) -> Result<()> {
        self.record(Call::MakeCurrent { draw, read, context });
        let mut state = self.state.borrow_mut();
        if state.fail_make_current {
            return Err(egl_failure("eglMakeCurrent", 0, EGL_BAD_MATCH));
        }
        state.current = (draw, context);
        Ok(())
    }

    fn proc_address(&self, _name: &CStr) -> *const c_void {
        DRIVER_PROC as *const c_void
    }

    fn finish(&self) {
        self.record(Call::Finish);
    }

    fn begin_read_back(&self) -> ReadBackState {
        self.record(Call::BeginReadBack);
        let mut state = self.state.borrow_mut();
        let saved = ReadBackState {
            read_framebuffer: state.read_framebuffer,
            pack_alignment: 4,
            ..Default::default()
        };
        state.read_framebuffer = 0;
        saved
    }

    fn end_read_back(&self, saved: ReadBackState) {
        self.record(Call::EndReadBack);
        self.state.borrow_mut().read_framebuffer = saved.read_framebuffer;
    }

    /// Row `r`, counted from the bottom, is filled with byte `r`.
    /// Reading from a client framebuffer object yields 0xEE everywhere.
    fn read_pixels(&self, width: u32, height: u32, pixels: &mut [u8]) {
        self.record(Call::ReadPixels { width, height });
        let stride = 4 * width as usize;
        if stride == 0 {
            return;
        }
        if self.state.borrow().read_framebuffer != 0 {
            pixels.fill(0xEE);
            return;
        }
        for (row, chunk) in pixels.chunks_mut(stride).enumerate() {
            chunk.fill(row as u8);
        }
    }
}

/// Frame handed to `put_image`
#[derive(Debug, Clone, PartialEq)]
pub struct Put {
    pub drawable: Drawable,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Default)]
pub struct WindowsState {
    pub geometry: HashMap<Drawable, (u32, u32)>,
    pub puts: Vec<Put>,
    next_id: Drawable,
}

/// `WindowSystem` over a table of drawable sizes
#[derive(Clone, Default)]
pub struct FakeWindows {
    state: Rc<RefCell<WindowsState>>,
}

impl FakeWindows {
    pub fn new() -> Self {
        let windows = Self::default();
        windows.state.borrow_mut().next_id = 0x20_0000;
        windows
    }

    pub fn set_geometry(&self, drawable: Drawable, width: u32, height: u32) {
        self.state.borrow_mut().geometry.insert(drawable, (width, height));
    }

    pub fn forget(&self, drawable: Drawable) {
        self.state.borrow_mut().geometry.remove(&drawable);
    }

    pub fn state(&self) -> Ref<'_, WindowsState> {
        self.state.borrow()
    }
}

impl WindowSystem for FakeWindows {
    fn alloc_id(&self, _display: XDisplay) -> Drawable {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }

    fn default_visual(&self, _display: XDisplay, _screen: i32) -> Option<xlib::XVisualInfo> {
        let mut info: xlib::XVisualInfo = unsafe { std::mem::zeroed() };
        info.visualid = DEFAULT_VISUAL_ID;
        info.depth = 24;
        info.class = xlib::TrueColor;
        Some(info)
    }

    fn geometry(&self, _display: XDisplay, drawable: Drawable) -> Option<Geometry> {
        self.state
            .borrow()
            .geometry
            .get(&drawable)
            .map(|&(width, height)| Geometry { width, height, depth: 24 })
    }

    fn put_image(
        &self,
        display: XDisplay,
        drawable: Drawable,
        width: u32,
        height: u32,
        pixels: &mut [u8],
    ) -> Result<()> {
        self.geometry(display, drawable)
            .ok_or(ShimError::Geometry { drawable })?;
        self.state.borrow_mut().puts.push(Put {
            drawable,
            width,
            height,
            pixels: pixels.to_vec(),
        });
        Ok(())
    }
}
