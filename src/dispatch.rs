//! GLX Dispatch Table
//!
//! Name -> address for every GLX entry point the shim implements. This is
//! the only way the vendor-neutral loader (or a client) reaches them, and the
//! addresses are those of this library's own unexported functions.

use std::ffi::c_void;

use crate::glx::*;

/// Result of looking a name up in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcLookup {
    /// Implemented here
    Glx(*const c_void),
    /// Known GLX extension the shim deliberately does not provide
    Unsupported,
    /// Not GLX: ask the EGL driver (core GL and GL extensions)
    Delegate,
}

/// EXT_import_context entry points; there is no indirect context to import
pub const UNSUPPORTED: &[&str] = &[
    "glXImportContextEXT",
    "glXFreeContextEXT",
    "glXGetContextIDEXT",
];

macro_rules! entry_points {
    ($($name:ident),* $(,)?) => {
        /// Every implemented entry point with a getter for its address
        static ENTRY_POINTS: &[(&str, fn() -> *const c_void)] = &[
            $((stringify!($name), || $name as *const c_void),)*
        ];
    };
}

entry_points![
    glXChooseVisual,
    glXCopyContext,
    glXCreateContext,
    glXCreateGLXPixmap,
    glXDestroyContext,
    glXDestroyGLXPixmap,
    glXGetConfig,
    glXIsDirect,
    glXMakeCurrent,
    glXSwapBuffers,
    glXUseXFont,
    glXWaitGL,
    glXWaitX,
    glXQueryServerString,
    glXGetClientString,
    glXQueryExtensionsString,
    glXQueryVersion,
    glXChooseFBConfig,
    glXGetFBConfigs,
    glXGetFBConfigAttrib,
    glXGetVisualFromFBConfig,
    glXCreateNewContext,
    glXCreateContextAttribsARB,
    glXCreatePbuffer,
    glXCreatePixmap,
    glXCreateWindow,
    glXDestroyPbuffer,
    glXDestroyPixmap,
    glXDestroyWindow,
    glXGetSelectedEvent,
    glXSelectEvent,
    glXMakeContextCurrent,
    glXQueryContext,
    glXQueryDrawable,
    glXGetCurrentContext,
    glXGetCurrentDrawable,
    glXGetCurrentReadDrawable,
    glXGetCurrentDisplay,
    glXGetProcAddress,
    glXGetProcAddressARB,
];

/// Look up a GLX entry point by name
pub fn lookup(name: &[u8]) -> ProcLookup {
    if let Some((_, address)) = ENTRY_POINTS.iter().find(|(n, _)| n.as_bytes() == name) {
        return ProcLookup::Glx(address());
    }
    if UNSUPPORTED.iter().any(|n| n.as_bytes() == name) {
        return ProcLookup::Unsupported;
    }
    ProcLookup::Delegate
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    /// Path of the loaded object containing `address`
    fn object_of(address: *const c_void) -> Option<CString> {
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
        if unsafe { libc::dladdr(address, &mut info) } == 0 || info.dli_fname.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(info.dli_fname) }.to_owned())
    }

    fn address_of(name: &str) -> *const c_void {
        match lookup(name.as_bytes()) {
            ProcLookup::Glx(address) => address,
            other => panic!("{} resolved to {:?}", name, other),
        }
    }

    #[test]
    fn test_every_name_resolves_to_an_address() {
        for (name, _) in ENTRY_POINTS {
            assert!(name.starts_with("glX"));
            assert!(!address_of(name).is_null(), "{} has no address", name);
        }
    }

    #[test]
    fn test_addresses_stay_inside_this_object() {
        let own = object_of(lookup as *const c_void).expect("dladdr on own code");
        for (name, _) in ENTRY_POINTS {
            let address = address_of(name);
            assert_eq!(object_of(address).as_ref(), Some(&own), "{} resolves elsewhere", name);

            // No global symbol of the same name may be what the table hands out
            let symbol = CString::new(*name).unwrap();
            let global = unsafe { libc::dlsym(libc::RTLD_DEFAULT, symbol.as_ptr()) };
            assert_ne!(global as *const c_void, address, "{} is interposable", name);
        }
    }

    #[test]
    fn test_swap_buffers_points_at_the_implementation() {
        assert_eq!(
            lookup(b"glXSwapBuffers"),
            ProcLookup::Glx(glXSwapBuffers as *const c_void)
        );
    }

    #[test]
    fn test_import_context_is_unsupported_not_delegated() {
        for name in UNSUPPORTED {
            assert_eq!(lookup(name.as_bytes()), ProcLookup::Unsupported);
        }
        assert_eq!(lookup(b"glClear"), ProcLookup::Delegate);
        assert_eq!(lookup(b"glXNotARealFunction"), ProcLookup::Delegate);
    }
}
