//! Session Module
//!
//! The single owner of all shim state: the EGL display, the config and
//! context arenas, the drawable surface cache and the current binding.
//! Every GLX entry point is a method here; the `extern "C"` layer only
//! converts arguments and decides what to do with errors.

use std::ffi::{CStr, CString, c_void};
use tracing::{debug, info, trace, warn};
use x11_dl::xlib;

use crate::binding::{Binding, BindingTracker};
use crate::config::ShimConfig;
use crate::configs::{ConfigHandle, ConfigStore, DEFAULT_CONFIG_ATTRIBS};
use crate::context::{ContextHandle, ContextStore};
use crate::dispatch::{self, ProcLookup};
use crate::driver::{Driver, EglContext, EglDisplay, EglSurface};
use crate::error::Result;
use crate::present::{BYTES_PER_PIXEL, flip_rows, frame_len};
use crate::shim_ensure;
use crate::surface::{DrawableKind, SurfaceCache, SurfaceEntry};
use crate::translate::{self, AttribSource, SurfaceCaps};
use crate::x11::{Drawable, WindowSystem, XDisplay};

/// All state behind the GLX API
pub struct Session<D: Driver, W: WindowSystem> {
    driver: D,
    windows: W,
    config: ShimConfig,
    egl_display: EglDisplay,
    configs: ConfigStore,
    contexts: ContextStore,
    surfaces: SurfaceCache,
    binding: BindingTracker,
    default_config: Option<ConfigHandle>,
    vendor: CString,
}

impl<D: Driver, W: WindowSystem> Session<D, W> {
    /// Initialize EGL and build an empty session
    pub fn new(mut driver: D, windows: W, config: ShimConfig) -> Result<Self> {
        let egl_display = driver.initialize()?;
        info!("Session ready on EGL display {:?}", egl_display);

        let vendor = CString::new(config.vendor.as_str()).unwrap_or_else(|_| {
            warn!("Vendor string {:?} contains NUL, using the default", config.vendor);
            c"subprime".to_owned()
        });

        Ok(Self {
            driver,
            windows,
            config,
            egl_display,
            configs: ConfigStore::new(),
            contexts: ContextStore::new(),
            surfaces: SurfaceCache::new(),
            binding: BindingTracker::new(),
            default_config: None,
            vendor,
        })
    }

    /// GLX_VENDOR string
    pub fn vendor_string(&self) -> &CStr {
        &self.vendor
    }

    // ------------------------------------------------------------------
    // Configs
    // ------------------------------------------------------------------

    /// glXChooseFBConfig: translate the criteria and wrap every match
    pub fn choose_fb_config(&mut self, criteria: &[i32]) -> Result<Vec<ConfigHandle>> {
        let attribs = translate::convert_attribute_list(criteria);
        let found = self
            .driver
            .choose_config(self.egl_display, &attribs, self.config.max_configs)?;
        trace!("count={}", found.len());
        Ok(self.configs.store_all(&found))
    }

    /// glXGetFBConfigs: every pbuffer-capable config
    pub fn fb_configs(&mut self) -> Result<Vec<ConfigHandle>> {
        self.choose_fb_config(&[])
    }

    /// glXGetFBConfigAttrib; `Ok(None)` means GLX_BAD_ATTRIBUTE
    pub fn fb_config_attrib(
        &self,
        display: XDisplay,
        config: ConfigHandle,
        attribute: i32,
    ) -> Result<Option<i32>> {
        let egl_config = self.configs.resolve(config)?;
        let caps = SurfaceCaps {
            max_pbuffer_width: self.config.max_pbuffer_width,
            max_pbuffer_height: self.config.max_pbuffer_height,
        };

        let value = match translate::config_attribute(attribute, caps) {
            AttribSource::Egl(egl_attr) => {
                match self.driver.config_attrib(self.egl_display, egl_config, egl_attr) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        debug!("GLX attribute 0x{:x}: {}", attribute, e);
                        None
                    }
                }
            }
            AttribSource::Fixed(value) => Some(value),
            AttribSource::DefaultVisual => self
                .default_visual(display, 0)
                .map(|info| info.visualid as i32),
            AttribSource::Unsupported => None,
        };
        trace!(" val={:?}", value);
        Ok(value)
    }

    /// Config used when a client does not name one, selected once
    pub fn default_config(&mut self) -> Result<ConfigHandle> {
        if let Some(handle) = self.default_config {
            return Ok(handle);
        }

        let found = self
            .driver
            .choose_config(self.egl_display, DEFAULT_CONFIG_ATTRIBS, 1)?;
        shim_ensure!(!found.is_empty());

        let handle = self.configs.store_all(&found[..1])[0];
        debug!("Default config is {:?}", handle);
        self.default_config = Some(handle);
        Ok(handle)
    }

    /// TrueColor visual at the default depth (glXChooseVisual and friends)
    pub fn default_visual(&self, display: XDisplay, screen: i32) -> Option<xlib::XVisualInfo> {
        self.windows.default_visual(display, screen)
    }

    // ------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------

    /// glXCreateNewContext / glXCreateContext
    pub fn create_context(
        &mut self,
        config: Option<ConfigHandle>,
        share: Option<ContextHandle>,
    ) -> Result<ContextHandle> {
        self.create_context_attribs(config, share, &[])
    }

    /// glXCreateContextAttribsARB
    pub fn create_context_attribs(
        &mut self,
        config: Option<ConfigHandle>,
        share: Option<ContextHandle>,
        attribs: &[i32],
    ) -> Result<ContextHandle> {
        let config = match config {
            Some(config) => config,
            None => self.default_config()?,
        };
        let egl_config = self.configs.resolve(config)?;
        let egl_attribs = translate::convert_context_attribs(attribs);

        self.contexts.create(
            &self.driver,
            self.egl_display,
            (config, egl_config),
            share,
            &egl_attribs,
        )
    }

    // ------------------------------------------------------------------
    // Drawables
    // ------------------------------------------------------------------

    /// glXCreateWindow / glXCreatePixmap / glXCreateGLXPixmap: the native id
    /// doubles as the GLX drawable, the surface is made on first use
    pub fn register_native(&mut self, drawable: Drawable, config: Option<ConfigHandle>) -> Drawable {
        self.surfaces.register(drawable, DrawableKind::Native, config);
        drawable
    }

    /// glXCreatePbuffer: a fresh XID with a size taken from the attributes
    pub fn create_pbuffer(
        &mut self,
        display: XDisplay,
        config: Option<ConfigHandle>,
        attribs: &[i32],
    ) -> Drawable {
        let width = translate::attribute_value(attribs, translate::GLX_PBUFFER_WIDTH).unwrap_or(1);
        let height = translate::attribute_value(attribs, translate::GLX_PBUFFER_HEIGHT).unwrap_or(1);
        let width = width.clamp(1, self.config.max_pbuffer_width.max(1)) as u32;
        let height = height.clamp(1, self.config.max_pbuffer_height.max(1)) as u32;

        let drawable = self.windows.alloc_id(display);
        self.surfaces
            .register(drawable, DrawableKind::Pbuffer { width, height }, config);
        drawable
    }

    /// Cached surface for `drawable`, creating it at the drawable's size on a
    /// miss. Config preference: `config`, the drawable's registration, the
    /// default config.
    pub fn resolve_surface(
        &mut self,
        display: XDisplay,
        drawable: Drawable,
        config: Option<ConfigHandle>,
    ) -> Result<EglSurface> {
        if let Some(entry) = self.surfaces.get(drawable) {
            return Ok(entry.surface);
        }

        let config = match config.or_else(|| self.surfaces.registered_config(drawable)) {
            Some(config) => config,
            None => self.default_config()?,
        };
        let egl_config = self.configs.resolve(config)?;

        let entry = self.surfaces.create(
            &self.driver,
            &self.windows,
            self.egl_display,
            display,
            drawable,
            (config, egl_config),
        )?;
        Ok(entry.surface)
    }

    pub fn surface_entry(&self, drawable: Drawable) -> Option<SurfaceEntry> {
        self.surfaces.get(drawable)
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// glXMakeCurrent. The tracked binding only changes once EGL accepted it.
    pub fn make_current(
        &mut self,
        display: XDisplay,
        drawable: Option<Drawable>,
        context: Option<ContextHandle>,
    ) -> Result<()> {
        let context_config = match context {
            Some(handle) => Some(self.contexts.get(handle)?.config),
            None => None,
        };
        let egl_context = self.contexts.egl_context(context)?;

        let surface = match drawable {
            Some(drawable) => {
                // A drawable created against a config keeps it; otherwise
                // match the context being bound
                let config = self.surfaces.registered_config(drawable).or(context_config);
                self.resolve_surface(display, drawable, config)?
            }
            None => EglSurface::NO_SURFACE,
        };

        self.driver
            .make_current(self.egl_display, surface, surface, egl_context)?;

        self.binding.record(Binding {
            display,
            drawable,
            surface,
            context,
        });
        Ok(())
    }

    pub fn current(&self) -> Binding {
        self.binding.current()
    }

    pub fn last_valid_context(&self) -> Option<ContextHandle> {
        self.binding.last_valid()
    }

    // ------------------------------------------------------------------
    // Swap
    // ------------------------------------------------------------------

    /// glXSwapBuffers: read the pbuffer back and put it into the drawable,
    /// then follow any resize of the drawable.
    ///
    /// Returns the presented frame size, `None` when nothing was presented.
    pub fn swap_buffers(&mut self, display: XDisplay, drawable: Drawable) -> Result<Option<(u32, u32)>> {
        let Some(entry) = self.surfaces.get(drawable) else {
            trace!("drawable 0x{:x} has no surface, nothing to swap", drawable);
            return Ok(None);
        };
        if let DrawableKind::Pbuffer { .. } = self.surfaces.kind(drawable) {
            return Ok(None);
        }
        let Some(read_context) = self.binding.last_valid() else {
            debug!("no context was ever current, nothing rendered to 0x{:x}", drawable);
            return Ok(None);
        };

        let mut pixels = self.read_back(entry, read_context)?;
        flip_rows(&mut pixels, BYTES_PER_PIXEL * entry.width as usize);
        self.windows
            .put_image(display, drawable, entry.width, entry.height, &mut pixels)?;

        self.follow_resize(display, drawable, entry)?;
        Ok(Some((entry.width, entry.height)))
    }

    /// Bind the surface with `context`, finish and read it, then restore
    /// whatever binding was tracked before
    fn read_back(&mut self, entry: SurfaceEntry, context: ContextHandle) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; frame_len(entry.width, entry.height)];
        let previous = self.binding.current();
        let read_egl = self.contexts.egl_context(Some(context))?;
        let previous_egl = self.contexts.egl_context(previous.context)?;

        self.driver
            .make_current(self.egl_display, entry.surface, entry.surface, read_egl)?;
        self.driver.finish();
        let saved = self.driver.begin_read_back();
        self.driver.read_pixels(entry.width, entry.height, &mut pixels);
        self.driver.end_read_back(saved);
        self.driver
            .make_current(self.egl_display, previous.surface, previous.surface, previous_egl)?;

        Ok(pixels)
    }

    /// Replace the surface if the drawable no longer has the size it was
    /// created with (pbuffers cannot be resized)
    fn follow_resize(&mut self, display: XDisplay, drawable: Drawable, entry: SurfaceEntry) -> Result<()> {
        let (width, height) = match self.surfaces.geometry(&self.windows, display, drawable) {
            Ok(size) => size,
            Err(e) => {
                warn!("{}, keeping the current surface", e);
                return Ok(());
            }
        };
        if (width.max(1), height.max(1)) == (entry.width, entry.height) {
            return Ok(());
        }
        info!(
            "Drawable 0x{:x} resized {}x{} -> {}x{}",
            drawable, entry.width, entry.height, width, height
        );

        let previous = self.binding.current();
        let was_bound = previous.surface == entry.surface;
        if was_bound {
            // Never destroy a bound surface
            self.driver.make_current(
                self.egl_display,
                EglSurface::NO_SURFACE,
                EglSurface::NO_SURFACE,
                EglContext::NO_CONTEXT,
            )?;
        }
        self.driver.destroy_surface(self.egl_display, entry.surface)?;
        self.surfaces.remove(drawable);

        let surface = self.resolve_surface(display, drawable, Some(entry.config))?;

        if was_bound {
            let egl_context = self.contexts.egl_context(previous.context)?;
            self.driver
                .make_current(self.egl_display, surface, surface, egl_context)?;
            self.binding.record(Binding { surface, ..previous });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Proc addresses
    // ------------------------------------------------------------------

    /// glXGetProcAddress: GLX entry points from the dispatch table, null for
    /// deliberately unsupported extensions, EGL's resolver for the rest
    pub fn proc_address(&self, name: &CStr) -> *const c_void {
        match dispatch::lookup(name.to_bytes()) {
            ProcLookup::Glx(proc) => proc,
            ProcLookup::Unsupported => std::ptr::null(),
            ProcLookup::Delegate => self.driver.proc_address(name),
        }
    }
}
