//! X11 Module
//!
//! The windowing-system services the shim consumes: XID allocation, the
//! default visual, drawable geometry, and pushing finished frames into a
//! drawable with `XPutImage`.

use anyhow::Context;
use libloading::Library;
use std::ffi::c_char;
use std::ptr;
use tracing::{debug, warn};
use x11_dl::xlib::{self, Xlib};

use crate::error::{Result, ShimError};

/// X11 resource id shared by windows, pixmaps, and GLX drawables
pub type Drawable = xlib::XID;

/// Client-side `Display *` as handed to every GLX entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct XDisplay(pub *mut xlib::Display);

// Only used from the thread that owns the connection
unsafe impl Send for XDisplay {}

impl XDisplay {
    pub fn null() -> Self {
        Self(ptr::null_mut())
    }
}

/// Drawable size in pixels plus its depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Windowing operations used by the shim
pub trait WindowSystem {
    /// Allocate a fresh XID on the connection
    fn alloc_id(&self, display: XDisplay) -> Drawable;

    /// TrueColor visual at the screen's default depth
    fn default_visual(&self, display: XDisplay, screen: i32) -> Option<xlib::XVisualInfo>;

    /// Current size of a window or pixmap
    fn geometry(&self, display: XDisplay, drawable: Drawable) -> Option<Geometry>;

    /// Copy a top-to-bottom 32-bit BGRA frame into the drawable
    fn put_image(
        &self,
        display: XDisplay,
        drawable: Drawable,
        width: u32,
        height: u32,
        pixels: &mut [u8],
    ) -> Result<()>;
}

type AllocIdFn = unsafe extern "C" fn(*mut xlib::Display) -> xlib::XID;

/// `WindowSystem` on top of the client's libX11
pub struct XlibWindows {
    xlib: Xlib,
    alloc_id: AllocIdFn,
    _x11: Library,
}

// Xlib is a table of function pointers into libX11
unsafe impl Send for XlibWindows {}

impl XlibWindows {
    pub fn open() -> anyhow::Result<Self> {
        // Load X11 library
        let xlib = Xlib::open().context("Failed to load libX11")?;

        // XAllocID is a macro over the display's resource allocator,
        // _XAllocID is the exported function behind it
        let x11 = unsafe { Library::new("libX11.so.6") }.context("Failed to load libX11.so.6")?;
        let alloc_id = unsafe { x11.get::<AllocIdFn>(b"_XAllocID") }
            .context("libX11 does not export _XAllocID")?;
        let alloc_id = *alloc_id;

        Ok(Self {
            xlib,
            alloc_id,
            _x11: x11,
        })
    }
}

impl WindowSystem for XlibWindows {
    fn alloc_id(&self, display: XDisplay) -> Drawable {
        // Xlib documents XAllocID as requiring the display lock
        unsafe {
            (self.xlib.XLockDisplay)(display.0);
            let id = (self.alloc_id)(display.0);
            (self.xlib.XUnlockDisplay)(display.0);
            id
        }
    }

    fn default_visual(&self, display: XDisplay, screen: i32) -> Option<xlib::XVisualInfo> {
        unsafe {
            let mut info = std::mem::zeroed::<xlib::XVisualInfo>();
            let depth = (self.xlib.XDefaultDepth)(display.0, screen);
            if (self.xlib.XMatchVisualInfo)(display.0, screen, depth, xlib::TrueColor, &mut info) == 0 {
                warn!("No TrueColor visual at depth {} on screen {}", depth, screen);
                return None;
            }
            Some(info)
        }
    }

    fn geometry(&self, display: XDisplay, drawable: Drawable) -> Option<Geometry> {
        unsafe {
            let mut root_return: xlib::Window = 0;
            let mut x_return = 0;
            let mut y_return = 0;
            let mut width_return = 0;
            let mut height_return = 0;
            let mut border_width_return = 0;
            let mut depth_return = 0;

            let status = (self.xlib.XGetGeometry)(
                display.0,
                drawable,
                &mut root_return,
                &mut x_return,
                &mut y_return,
                &mut width_return,
                &mut height_return,
                &mut border_width_return,
                &mut depth_return,
            );
            if status == 0 {
                return None;
            }

            Some(Geometry {
                width: width_return,
                height: height_return,
                depth: depth_return,
            })
        }
    }

    fn put_image(
        &self,
        display: XDisplay,
        drawable: Drawable,
        width: u32,
        height: u32,
        pixels: &mut [u8],
    ) -> Result<()> {
        let geometry = self
            .geometry(display, drawable)
            .ok_or(ShimError::Geometry { drawable })?;

        unsafe {
            let screen = (self.xlib.XDefaultScreen)(display.0);
            let visual = (self.xlib.XDefaultVisual)(display.0, screen);

            let image = (self.xlib.XCreateImage)(
                display.0,
                visual,
                geometry.depth,
                xlib::ZPixmap,
                0,
                pixels.as_mut_ptr() as *mut c_char,
                width,
                height,
                32,
                0,
            );
            if image.is_null() {
                return Err(ShimError::Image { drawable });
            }

            let gc = (self.xlib.XCreateGC)(display.0, drawable, 0, ptr::null_mut());
            (self.xlib.XPutImage)(display.0, drawable, gc, image, 0, 0, 0, 0, width, height);
            (self.xlib.XFlush)(display.0);
            (self.xlib.XFreeGC)(display.0, gc);

            // The pixels belong to the caller's Vec, Xlib only frees the wrapper
            (*image).data = ptr::null_mut();
            (self.xlib.XDestroyImage)(image);
        }

        debug!("Put {}x{} image into drawable 0x{:x}", width, height, drawable);
        Ok(())
    }
}
