//! Drawable Surface Cache
//!
//! Maps X11 drawables to the EGL pbuffers standing in for them. Surfaces are
//! created on first use at the drawable's current size and replaced when the
//! drawable is found to have been resized. Destroying a GLX drawable does
//! not evict its entry.

use std::collections::HashMap;
use tracing::debug;

use crate::configs::ConfigHandle;
use crate::driver::{Driver, EglConfig, EglDisplay, EglSurface};
use crate::error::{Result, ShimError};
use crate::x11::{Drawable, WindowSystem, XDisplay};

/// What a drawable id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawableKind {
    /// Window or pixmap: geometry comes from the X server
    Native,
    /// GLX pbuffer: no X drawable behind the id, size fixed at creation
    Pbuffer { width: u32, height: u32 },
}

/// Registration made by glXCreateWindow / glXCreatePixmap / glXCreatePbuffer
#[derive(Debug, Clone, Copy)]
struct Registration {
    kind: DrawableKind,
    config: Option<ConfigHandle>,
}

/// Cached pbuffer for one drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceEntry {
    pub surface: EglSurface,
    pub width: u32,
    pub height: u32,
    pub config: ConfigHandle,
}

#[derive(Default)]
pub struct SurfaceCache {
    surfaces: HashMap<Drawable, SurfaceEntry>,
    registrations: HashMap<Drawable, Registration>,
}

impl SurfaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember how a GLX drawable was created; no surface is made yet
    pub fn register(&mut self, drawable: Drawable, kind: DrawableKind, config: Option<ConfigHandle>) {
        debug!("Registered drawable 0x{:x} as {:?} (config {:?})", drawable, kind, config);
        self.registrations.insert(drawable, Registration { kind, config });
    }

    pub fn kind(&self, drawable: Drawable) -> DrawableKind {
        self.registrations
            .get(&drawable)
            .map(|r| r.kind)
            .unwrap_or(DrawableKind::Native)
    }

    /// Config the drawable was created against, if any
    pub fn registered_config(&self, drawable: Drawable) -> Option<ConfigHandle> {
        self.registrations.get(&drawable).and_then(|r| r.config)
    }

    pub fn get(&self, drawable: Drawable) -> Option<SurfaceEntry> {
        self.surfaces.get(&drawable).copied()
    }

    pub fn remove(&mut self, drawable: Drawable) -> Option<SurfaceEntry> {
        self.surfaces.remove(&drawable)
    }

    /// Current pixel size of the drawable
    pub fn geometry<W: WindowSystem>(
        &self,
        windows: &W,
        display: XDisplay,
        drawable: Drawable,
    ) -> Result<(u32, u32)> {
        match self.kind(drawable) {
            DrawableKind::Pbuffer { width, height } => Ok((width, height)),
            DrawableKind::Native => windows
                .geometry(display, drawable)
                .map(|g| (g.width, g.height))
                .ok_or(ShimError::Geometry { drawable }),
        }
    }

    /// Create and cache a pbuffer matching the drawable's current size
    pub fn create<D: Driver, W: WindowSystem>(
        &mut self,
        driver: &D,
        windows: &W,
        egl_display: EglDisplay,
        display: XDisplay,
        drawable: Drawable,
        config: (ConfigHandle, EglConfig),
    ) -> Result<SurfaceEntry> {
        let (width, height) = self.geometry(windows, display, drawable)?;
        // EGL rejects empty pbuffers; unmapped windows can report 0x0
        let (width, height) = (width.max(1), height.max(1));

        let surface = driver.create_pbuffer_surface(egl_display, config.1, width, height)?;
        let entry = SurfaceEntry {
            surface,
            width,
            height,
            config: config.0,
        };
        self.surfaces.insert(drawable, entry);

        debug!("Created {}x{} pbuffer {:?} for drawable 0x{:x}", width, height, surface, drawable);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::ConfigStore;
    use crate::testing::{Call, FakeDriver, FakeWindows};

    #[test]
    fn test_create_uses_window_geometry() {
        let driver = FakeDriver::new(1);
        let windows = FakeWindows::new();
        windows.set_geometry(0x400, 640, 480);
        let mut configs = ConfigStore::new();
        let config = configs.store_all(&driver.state().configs.clone())[0];
        let egl_config = configs.resolve(config).unwrap();

        let mut cache = SurfaceCache::new();
        let entry = cache
            .create(&driver, &windows, driver.display(), XDisplay::null(), 0x400, (config, egl_config))
            .unwrap();

        assert_eq!((entry.width, entry.height), (640, 480));
        assert_eq!(cache.get(0x400), Some(entry));
        assert!(driver.state().calls.contains(&Call::CreatePbuffer {
            width: 640,
            height: 480,
            surface: entry.surface,
        }));
    }

    #[test]
    fn test_pbuffer_geometry_never_asks_x() {
        let windows = FakeWindows::new();
        let mut cache = SurfaceCache::new();
        cache.register(0x77, DrawableKind::Pbuffer { width: 32, height: 16 }, None);

        assert_eq!(cache.geometry(&windows, XDisplay::null(), 0x77).unwrap(), (32, 16));
        assert!(matches!(
            cache.geometry(&windows, XDisplay::null(), 0x78),
            Err(ShimError::Geometry { drawable: 0x78 })
        ));
    }

    #[test]
    fn test_registration_keeps_config() {
        let mut configs = ConfigStore::new();
        let driver = FakeDriver::new(1);
        let config = configs.store_all(&driver.state().configs.clone())[0];

        let mut cache = SurfaceCache::new();
        cache.register(0x500, DrawableKind::Native, Some(config));
        assert_eq!(cache.registered_config(0x500), Some(config));
        assert_eq!(cache.kind(0x500), DrawableKind::Native);
        assert!(cache.get(0x500).is_none());
    }
}
