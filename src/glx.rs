//! GLX entry points
//!
//! The C-facing GLX API. Each function converts its arguments into typed
//! handles, runs the matching `Session` operation, and maps the outcome back
//! to what GLX callers expect. Fatal errors stop the process here; invalid
//! handles answer with the usual GLX failure value.
//!
//! None of these are exported. Clients reach them through the dispatcher,
//! which asks `dispatch::lookup` for their addresses, so an exported GLX
//! symbol of the same name elsewhere in the process can never stand in for
//! them.

#![allow(non_snake_case)]

use std::ffi::{CStr, c_char, c_int, c_uint, c_ulong, c_void};
use std::ptr;
use std::slice;
use tracing::trace;
use x11_dl::glx::{GLXContext, GLXDrawable, GLXFBConfig, GLXPbuffer, GLXPixmap, GLXWindow};
use x11_dl::xlib::{self, Display, XVisualInfo};

use crate::configs::ConfigHandle;
use crate::context::ContextHandle;
use crate::driver::Driver;
use crate::error::{Result, settle};
use crate::session::Session;
use crate::with_session;
use crate::x11::{Drawable, WindowSystem, XDisplay};

const TRUE: xlib::Bool = 1;
const FALSE: xlib::Bool = 0;
const SUCCESS: c_int = 0;
const GLX_BAD_ATTRIBUTE: c_int = 2;

const GLX_VENDOR: c_int = 1;
const GLX_VERSION: c_int = 2;
const GLX_EXTENSIONS: c_int = 3;

pub const GLX_VERSION_MAJOR: c_int = 1;
pub const GLX_VERSION_MINOR: c_int = 3;

/// GLX_VERSION string; the suffix marks this as the shim
pub const VERSION_STRING: &CStr = c"1.3 subprime";
pub const EXTENSIONS_STRING: &CStr = c"GLX_ARB_create_context GLX_ARB_create_context_profile";

// ----------------------------------------------------------------------
// Argument helpers
// ----------------------------------------------------------------------

/// View a `None`-terminated GLX attribute list as a slice of its pairs
unsafe fn attrib_slice<'a>(list: *const c_int) -> &'a [c_int] {
    if list.is_null() {
        return &[];
    }
    let mut len = 0;
    unsafe {
        while *list.add(len) != 0 {
            len += 2;
        }
        slice::from_raw_parts(list, len)
    }
}

fn config_handle(config: GLXFBConfig) -> Result<Option<ConfigHandle>> {
    ConfigHandle::from_raw(config as usize)
}

fn context_handle(context: GLXContext) -> Result<Option<ContextHandle>> {
    ContextHandle::from_raw(context as usize)
}

fn raw_context(handle: Option<ContextHandle>) -> GLXContext {
    handle.map_or(ptr::null_mut(), |h| h.to_raw() as GLXContext)
}

fn drawable_opt(drawable: GLXDrawable) -> Option<Drawable> {
    (drawable != 0).then_some(drawable)
}

/// Copy into a `malloc` block the client releases with `XFree`
unsafe fn malloc_copy<T: Copy>(items: &[T]) -> *mut T {
    if items.is_empty() {
        return ptr::null_mut();
    }
    unsafe {
        let block = libc::malloc(std::mem::size_of_val(items)) as *mut T;
        if !block.is_null() {
            ptr::copy_nonoverlapping(items.as_ptr(), block, items.len());
        }
        block
    }
}

fn default_visual(dpy: *mut Display, screen: c_int) -> *mut XVisualInfo {
    match with_session(|s| s.default_visual(XDisplay(dpy), screen)) {
        Some(info) => unsafe { malloc_copy(&[info]) },
        None => ptr::null_mut(),
    }
}

/// Store a config list for the client and report its length
unsafe fn return_configs(
    result: Result<Vec<ConfigHandle>>,
    nelements: *mut c_int,
) -> *mut GLXFBConfig {
    let configs: Vec<GLXFBConfig> = settle(result, Vec::new())
        .into_iter()
        .map(|handle| handle.to_raw() as GLXFBConfig)
        .collect();
    unsafe {
        if !nelements.is_null() {
            *nelements = configs.len() as c_int;
        }
        malloc_copy(&configs)
    }
}

fn glx_string(name: c_int) -> *const c_char {
    match name {
        GLX_VENDOR => with_session(|s| s.vendor_string().as_ptr()),
        GLX_VERSION => VERSION_STRING.as_ptr(),
        GLX_EXTENSIONS => EXTENSIONS_STRING.as_ptr(),
        _ => ptr::null(),
    }
}

/// Bind `draw` for both drawing and reading; distinct read drawables are
/// refused with False and leave the binding alone
fn bind<D: Driver, W: WindowSystem>(
    session: &mut Session<D, W>,
    dpy: *mut Display,
    draw: GLXDrawable,
    read: GLXDrawable,
    ctx: GLXContext,
) -> Result<xlib::Bool> {
    if draw != read {
        return Ok(FALSE);
    }
    let context = context_handle(ctx)?;
    session.make_current(XDisplay(dpy), drawable_opt(draw), context)?;
    Ok(TRUE)
}

fn current_context<D: Driver, W: WindowSystem>(session: &Session<D, W>) -> GLXContext {
    raw_context(session.current().context)
}

fn current_drawable<D: Driver, W: WindowSystem>(session: &Session<D, W>) -> GLXDrawable {
    session.current().drawable.unwrap_or(0)
}

fn current_display<D: Driver, W: WindowSystem>(session: &Session<D, W>) -> *mut Display {
    session.current().display.0
}

fn create_context(config: GLXFBConfig, share: GLXContext, attribs: &[c_int]) -> GLXContext {
    let result = config_handle(config).and_then(|config| {
        let share = context_handle(share)?;
        with_session(|s| s.create_context_attribs(config, share, attribs))
    });
    settle(result.map(|handle| raw_context(Some(handle))), ptr::null_mut())
}

fn register_native(drawable: Drawable, config: GLXFBConfig) -> Drawable {
    let result = config_handle(config)
        .map(|config| with_session(|s| s.register_native(drawable, config)));
    settle(result, 0)
}

// ----------------------------------------------------------------------
// GLX 1.0 - 1.2
// ----------------------------------------------------------------------

pub unsafe extern "C" fn glXChooseVisual(
    dpy: *mut Display,
    screen: c_int,
    _attrib_list: *mut c_int,
) -> *mut XVisualInfo {
    trace!("glXChooseVisual: screen={}", screen);
    default_visual(dpy, screen)
}

pub unsafe extern "C" fn glXCopyContext(
    _dpy: *mut Display,
    _src: GLXContext,
    _dst: GLXContext,
    mask: c_ulong,
) {
    trace!("glXCopyContext: mask=0x{:x} (ignored)", mask);
}

pub unsafe extern "C" fn glXCreateContext(
    _dpy: *mut Display,
    _vis: *mut XVisualInfo,
    share_list: GLXContext,
    _direct: xlib::Bool,
) -> GLXContext {
    trace!("glXCreateContext: share={:?}", share_list);
    create_context(ptr::null_mut(), share_list, &[])
}

pub unsafe extern "C" fn glXCreateGLXPixmap(
    _dpy: *mut Display,
    _vis: *mut XVisualInfo,
    pixmap: xlib::Pixmap,
) -> GLXPixmap {
    trace!("glXCreateGLXPixmap: pixmap=0x{:x}", pixmap);
    register_native(pixmap, ptr::null_mut())
}

pub unsafe extern "C" fn glXDestroyContext(_dpy: *mut Display, ctx: GLXContext) {
    trace!("glXDestroyContext: {:?} (retained)", ctx);
}

pub unsafe extern "C" fn glXDestroyGLXPixmap(_dpy: *mut Display, pixmap: GLXPixmap) {
    trace!("glXDestroyGLXPixmap: 0x{:x}", pixmap);
}

pub unsafe extern "C" fn glXGetConfig(
    _dpy: *mut Display,
    _vis: *mut XVisualInfo,
    attrib: c_int,
    _value: *mut c_int,
) -> c_int {
    trace!("glXGetConfig: attrib={} (unsupported)", attrib);
    GLX_BAD_ATTRIBUTE
}

pub unsafe extern "C" fn glXIsDirect(_dpy: *mut Display, _ctx: GLXContext) -> xlib::Bool {
    trace!("glXIsDirect");
    TRUE
}

pub unsafe extern "C" fn glXMakeCurrent(
    dpy: *mut Display,
    drawable: GLXDrawable,
    ctx: GLXContext,
) -> xlib::Bool {
    trace!("glXMakeCurrent: drawable=0x{:x} ctx={:?}", drawable, ctx);
    settle(with_session(|s| bind(s, dpy, drawable, drawable, ctx)), FALSE)
}

pub unsafe extern "C" fn glXSwapBuffers(dpy: *mut Display, drawable: GLXDrawable) {
    trace!("glXSwapBuffers: drawable=0x{:x}", drawable);
    settle(
        with_session(|s| s.swap_buffers(XDisplay(dpy), drawable)).map(|_| ()),
        (),
    );
}

pub unsafe extern "C" fn glXUseXFont(font: xlib::Font, first: c_int, count: c_int, list_base: c_int) {
    trace!("glXUseXFont: font=0x{:x} first={} count={} base={} (ignored)", font, first, count, list_base);
}

pub unsafe extern "C" fn glXWaitGL() {
    trace!("glXWaitGL");
}

pub unsafe extern "C" fn glXWaitX() {
    trace!("glXWaitX");
}

pub unsafe extern "C" fn glXQueryServerString(
    _dpy: *mut Display,
    screen: c_int,
    name: c_int,
) -> *const c_char {
    trace!("glXQueryServerString: screen={} name={}", screen, name);
    glx_string(name)
}

pub unsafe extern "C" fn glXGetClientString(_dpy: *mut Display, name: c_int) -> *const c_char {
    trace!("glXGetClientString: name={}", name);
    glx_string(name)
}

pub unsafe extern "C" fn glXQueryExtensionsString(_dpy: *mut Display, screen: c_int) -> *const c_char {
    trace!("glXQueryExtensionsString: screen={}", screen);
    EXTENSIONS_STRING.as_ptr()
}

pub unsafe extern "C" fn glXQueryVersion(
    _dpy: *mut Display,
    major: *mut c_int,
    minor: *mut c_int,
) -> xlib::Bool {
    trace!("glXQueryVersion");
    unsafe {
        if !major.is_null() {
            *major = GLX_VERSION_MAJOR;
        }
        if !minor.is_null() {
            *minor = GLX_VERSION_MINOR;
        }
    }
    TRUE
}

// ----------------------------------------------------------------------
// GLX 1.3
// ----------------------------------------------------------------------

pub unsafe extern "C" fn glXChooseFBConfig(
    _dpy: *mut Display,
    screen: c_int,
    attrib_list: *const c_int,
    nelements: *mut c_int,
) -> *mut GLXFBConfig {
    trace!("glXChooseFBConfig: screen={}", screen);
    unsafe {
        let attribs = attrib_slice(attrib_list);
        return_configs(with_session(|s| s.choose_fb_config(attribs)), nelements)
    }
}

pub unsafe extern "C" fn glXGetFBConfigs(
    _dpy: *mut Display,
    screen: c_int,
    nelements: *mut c_int,
) -> *mut GLXFBConfig {
    trace!("glXGetFBConfigs: screen={}", screen);
    unsafe { return_configs(with_session(|s| s.fb_configs()), nelements) }
}

pub unsafe extern "C" fn glXGetFBConfigAttrib(
    dpy: *mut Display,
    config: GLXFBConfig,
    attribute: c_int,
    value: *mut c_int,
) -> c_int {
    trace!("glXGetFBConfigAttrib: config={:?} attribute={}", config, attribute);
    let result = config_handle(config).and_then(|config| match config {
        Some(config) => with_session(|s| s.fb_config_attrib(XDisplay(dpy), config, attribute)),
        None => Ok(None),
    });

    match settle(result, None) {
        Some(answer) => {
            if !value.is_null() {
                unsafe { *value = answer };
            }
            SUCCESS
        }
        None => GLX_BAD_ATTRIBUTE,
    }
}

pub unsafe extern "C" fn glXGetVisualFromFBConfig(
    dpy: *mut Display,
    config: GLXFBConfig,
) -> *mut XVisualInfo {
    trace!("glXGetVisualFromFBConfig: config={:?}", config);
    default_visual(dpy, 0)
}

pub unsafe extern "C" fn glXCreateNewContext(
    _dpy: *mut Display,
    config: GLXFBConfig,
    render_type: c_int,
    share_list: GLXContext,
    _direct: xlib::Bool,
) -> GLXContext {
    trace!("glXCreateNewContext: config={:?} render_type=0x{:x}", config, render_type);
    create_context(config, share_list, &[])
}

pub unsafe extern "C" fn glXCreateContextAttribsARB(
    _dpy: *mut Display,
    config: GLXFBConfig,
    share_context: GLXContext,
    _direct: xlib::Bool,
    attrib_list: *const c_int,
) -> GLXContext {
    trace!("glXCreateContextAttribsARB: config={:?}", config);
    let attribs = unsafe { attrib_slice(attrib_list) };
    create_context(config, share_context, attribs)
}

pub unsafe extern "C" fn glXCreatePbuffer(
    dpy: *mut Display,
    config: GLXFBConfig,
    attrib_list: *const c_int,
) -> GLXPbuffer {
    trace!("glXCreatePbuffer: config={:?}", config);
    let attribs = unsafe { attrib_slice(attrib_list) };
    let result = config_handle(config)
        .map(|config| with_session(|s| s.create_pbuffer(XDisplay(dpy), config, attribs)));
    settle(result, 0)
}

pub unsafe extern "C" fn glXCreatePixmap(
    _dpy: *mut Display,
    config: GLXFBConfig,
    pixmap: xlib::Pixmap,
    _attrib_list: *const c_int,
) -> GLXPixmap {
    trace!("glXCreatePixmap: config={:?} pixmap=0x{:x}", config, pixmap);
    register_native(pixmap, config)
}

pub unsafe extern "C" fn glXCreateWindow(
    _dpy: *mut Display,
    config: GLXFBConfig,
    win: xlib::Window,
    _attrib_list: *const c_int,
) -> GLXWindow {
    trace!("glXCreateWindow: config={:?} window=0x{:x}", config, win);
    register_native(win, config)
}

pub unsafe extern "C" fn glXDestroyPbuffer(_dpy: *mut Display, pbuf: GLXPbuffer) {
    trace!("glXDestroyPbuffer: 0x{:x}", pbuf);
}

pub unsafe extern "C" fn glXDestroyPixmap(_dpy: *mut Display, pixmap: GLXPixmap) {
    trace!("glXDestroyPixmap: 0x{:x}", pixmap);
}

pub unsafe extern "C" fn glXDestroyWindow(_dpy: *mut Display, win: GLXWindow) {
    trace!("glXDestroyWindow: 0x{:x}", win);
}

pub unsafe extern "C" fn glXGetSelectedEvent(
    _dpy: *mut Display,
    draw: GLXDrawable,
    event_mask: *mut c_ulong,
) {
    trace!("glXGetSelectedEvent: drawable=0x{:x}", draw);
    if !event_mask.is_null() {
        unsafe { *event_mask = 0 };
    }
}

pub unsafe extern "C" fn glXSelectEvent(_dpy: *mut Display, draw: GLXDrawable, event_mask: c_ulong) {
    trace!("glXSelectEvent: drawable=0x{:x} mask={}", draw, event_mask);
}

pub unsafe extern "C" fn glXMakeContextCurrent(
    dpy: *mut Display,
    draw: GLXDrawable,
    read: GLXDrawable,
    ctx: GLXContext,
) -> xlib::Bool {
    trace!("glXMakeContextCurrent: draw=0x{:x} read=0x{:x} ctx={:?}", draw, read, ctx);
    settle(with_session(|s| bind(s, dpy, draw, read, ctx)), FALSE)
}

pub unsafe extern "C" fn glXQueryContext(
    _dpy: *mut Display,
    _ctx: GLXContext,
    attribute: c_int,
    _value: *mut c_int,
) -> c_int {
    trace!("glXQueryContext: attribute={} (unsupported)", attribute);
    GLX_BAD_ATTRIBUTE
}

pub unsafe extern "C" fn glXQueryDrawable(
    _dpy: *mut Display,
    draw: GLXDrawable,
    attribute: c_int,
    _value: *mut c_uint,
) {
    trace!("glXQueryDrawable: drawable=0x{:x} attribute={} (unsupported)", draw, attribute);
}

pub unsafe extern "C" fn glXGetCurrentContext() -> GLXContext {
    with_session(|s| current_context(s))
}

pub unsafe extern "C" fn glXGetCurrentDrawable() -> GLXDrawable {
    with_session(|s| current_drawable(s))
}

pub unsafe extern "C" fn glXGetCurrentReadDrawable() -> GLXDrawable {
    with_session(|s| current_drawable(s))
}

pub unsafe extern "C" fn glXGetCurrentDisplay() -> *mut Display {
    with_session(|s| current_display(s))
}

// ----------------------------------------------------------------------
// Proc addresses
// ----------------------------------------------------------------------

/// Resolve any GLX or GL function by name
pub unsafe extern "C" fn glXGetProcAddress(proc_name: *const u8) -> *const c_void {
    if proc_name.is_null() {
        return ptr::null();
    }
    let name = unsafe { CStr::from_ptr(proc_name as *const c_char) };
    trace!("glXGetProcAddress: {:?}", name);
    with_session(|s| s.proc_address(name))
}

pub unsafe extern "C" fn glXGetProcAddressARB(proc_name: *const u8) -> *const c_void {
    unsafe { glXGetProcAddress(proc_name) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShimConfig;
    use crate::testing::{FakeDriver, FakeWindows};

    fn fake_session() -> Session<FakeDriver, FakeWindows> {
        let windows = FakeWindows::new();
        windows.set_geometry(0x400, 8, 8);
        windows.set_geometry(0x500, 8, 8);
        Session::new(FakeDriver::new(1), windows, ShimConfig::default()).unwrap()
    }

    fn fake_dpy() -> *mut Display {
        0xD0 as *mut Display
    }

    #[test]
    fn test_current_queries_follow_the_binding() {
        let mut session = fake_session();
        assert!(current_context(&session).is_null());
        assert_eq!(current_drawable(&session), 0);
        assert!(current_display(&session).is_null());

        let context = raw_context(Some(session.create_context(None, None).unwrap()));
        assert_eq!(bind(&mut session, fake_dpy(), 0x400, 0x400, context).unwrap(), TRUE);
        assert_eq!(current_context(&session), context);
        assert_eq!(current_drawable(&session), 0x400);
        assert_eq!(current_display(&session), fake_dpy());

        assert_eq!(bind(&mut session, fake_dpy(), 0, 0, ptr::null_mut()).unwrap(), TRUE);
        assert!(current_context(&session).is_null());
        assert_eq!(current_drawable(&session), 0);
    }

    #[test]
    fn test_separate_read_drawable_is_refused() {
        let mut session = fake_session();
        let context = raw_context(Some(session.create_context(None, None).unwrap()));
        bind(&mut session, fake_dpy(), 0x400, 0x400, context).unwrap();
        let before = session.current();

        assert_eq!(bind(&mut session, fake_dpy(), 0x400, 0x500, context).unwrap(), FALSE);
        assert_eq!(session.current(), before);
        assert!(session.surface_entry(0x500).is_none());
    }

    #[test]
    fn test_bind_with_foreign_context_is_soft() {
        let mut session = fake_session();
        let err = bind(&mut session, fake_dpy(), 0x400, 0x400, 0x1234 as GLXContext).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(current_drawable(&session), 0);
    }

    #[test]
    fn test_attrib_slice_stops_at_none() {
        let list = [8, 8, 9, 8, 0, 5, 6];
        let attribs = unsafe { attrib_slice(list.as_ptr()) };
        assert_eq!(attribs, &[8, 8, 9, 8]);
        assert!(unsafe { attrib_slice(ptr::null()) }.is_empty());
    }

    #[test]
    fn test_handle_conversion_rejects_foreign_pointers() {
        assert!(config_handle(ptr::null_mut()).unwrap().is_none());
        assert!(context_handle(0x1234 as GLXContext).is_err());
        assert!(raw_context(None).is_null());
    }

    #[test]
    fn test_version_and_extension_strings() {
        assert!(VERSION_STRING.to_str().unwrap().contains("subprime"));
        let extensions: Vec<&str> = EXTENSIONS_STRING.to_str().unwrap().split(' ').collect();
        assert_eq!(extensions, vec!["GLX_ARB_create_context", "GLX_ARB_create_context_profile"]);
        assert_eq!(glx_string(GLX_VERSION), VERSION_STRING.as_ptr());
        assert!(glx_string(99).is_null());
    }

    #[test]
    fn test_malloc_copy_of_nothing_is_null() {
        let empty: [u64; 0] = [];
        assert!(unsafe { malloc_copy(&empty) }.is_null());

        let block = unsafe { malloc_copy(&[7u64, 9]) };
        assert!(!block.is_null());
        unsafe {
            assert_eq!(*block.add(1), 9);
            libc::free(block as *mut c_void);
        }
    }
}
