//! Vendor entry point
//!
//! The vendor-neutral dispatcher calls `__glx_Main` once after loading the
//! library. We answer with the four callbacks it needs to route GLX calls
//! here and leave its optional patching hooks empty.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;
use tracing::{info, trace, warn};
use x11_dl::xlib::{self, Display};

use crate::{init_logging, with_session};

/// Major ABI version understood by this library
pub const ABI_MAJOR_VERSION: u32 = 1;

type IsScreenSupportedFn = unsafe extern "C" fn(*mut Display, c_int) -> xlib::Bool;
type ProcAddressFn = unsafe extern "C" fn(*const u8) -> *mut c_void;
type SetDispatchIndexFn = unsafe extern "C" fn(*const u8, c_int);

/// `__GLXapiImports`: callbacks the vendor provides to the dispatcher
#[repr(C)]
#[derive(Default)]
pub struct GlxApiImports {
    pub is_screen_supported: Option<IsScreenSupportedFn>,
    pub get_proc_address: Option<ProcAddressFn>,
    pub get_dispatch_address: Option<ProcAddressFn>,
    pub set_dispatch_index: Option<SetDispatchIndexFn>,
    pub notify_error: Option<unsafe extern "C" fn()>,
    pub is_patch_supported: Option<unsafe extern "C" fn()>,
    pub initiate_patch: Option<unsafe extern "C" fn()>,
    pub release_patch: Option<unsafe extern "C" fn()>,
    pub patch_thread_attach: Option<unsafe extern "C" fn()>,
}

/// The dispatcher packs the ABI version as `major << 16 | minor`
pub fn abi_compatible(version: u32) -> bool {
    version >> 16 == ABI_MAJOR_VERSION
}

unsafe extern "C" fn is_screen_supported(_dpy: *mut Display, screen: c_int) -> xlib::Bool {
    trace!("isScreenSupported: screen={}", screen);
    1
}

unsafe extern "C" fn get_proc_address(proc_name: *const u8) -> *mut c_void {
    if proc_name.is_null() {
        return ptr::null_mut();
    }
    let name = unsafe { CStr::from_ptr(proc_name as *const c_char) };
    with_session(|s| s.proc_address(name)) as *mut c_void
}

// No dispatch stubs are offered, every lookup goes through getProcAddress
unsafe extern "C" fn get_dispatch_address(_proc_name: *const u8) -> *mut c_void {
    ptr::null_mut()
}

unsafe extern "C" fn set_dispatch_index(_proc_name: *const u8, _index: c_int) {}

/// Point the dispatcher at our callbacks
pub fn fill_imports(imports: &mut GlxApiImports) {
    imports.is_screen_supported = Some(is_screen_supported);
    imports.get_proc_address = Some(get_proc_address);
    imports.get_dispatch_address = Some(get_dispatch_address);
    imports.set_dispatch_index = Some(set_dispatch_index);
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __glx_Main(
    version: u32,
    _exports: *const c_void,
    _vendor: *mut c_void,
    imports: *mut GlxApiImports,
) -> xlib::Bool {
    init_logging();

    if !abi_compatible(version) {
        warn!(
            "Dispatcher ABI {}.{} is not supported (need {}.x)",
            version >> 16,
            version & 0xffff,
            ABI_MAJOR_VERSION
        );
        return 0;
    }
    let Some(imports) = (unsafe { imports.as_mut() }) else {
        warn!("Dispatcher passed no imports table");
        return 0;
    };

    fill_imports(imports);
    // Bring EGL up now so a broken driver fails at load, not mid-frame
    with_session(|_| ());
    info!("Registered with GLX dispatcher, ABI {}.{}", version >> 16, version & 0xffff);
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_versions() {
        assert!(abi_compatible(1 << 16));
        assert!(abi_compatible((1 << 16) | 1));
        assert!(!abi_compatible(0));
        assert!(!abi_compatible(2 << 16));
    }

    #[test]
    fn test_incompatible_version_is_rejected_untouched() {
        let mut imports = GlxApiImports::default();
        let ok = unsafe { __glx_Main(2 << 16, ptr::null(), ptr::null_mut(), &mut imports) };
        assert_eq!(ok, 0);
        assert!(imports.get_proc_address.is_none());
    }

    #[test]
    fn test_only_the_four_required_slots_are_filled() {
        let mut imports = GlxApiImports::default();
        fill_imports(&mut imports);

        let supported = imports.is_screen_supported.unwrap();
        assert_eq!(unsafe { supported(ptr::null_mut(), 3) }, 1);
        let dispatch = imports.get_dispatch_address.unwrap();
        assert!(unsafe { dispatch(c"glXSwapBuffers".as_ptr() as *const u8) }.is_null());
        assert!(imports.get_proc_address.is_some());
        assert!(imports.set_dispatch_index.is_some());
        assert!(imports.notify_error.is_none());
        assert!(imports.patch_thread_attach.is_none());
    }

    #[test]
    fn test_imports_layout_matches_nine_pointers() {
        assert_eq!(
            std::mem::size_of::<GlxApiImports>(),
            9 * std::mem::size_of::<*const c_void>()
        );
    }
}
