//! Config Translator
//!
//! GLX attribute lists in, EGL attribute lists out, plus the reverse lookup
//! used by `glXGetFBConfigAttrib`. Every surface the shim creates is an EGL
//! pbuffer, so every translated list asks for pbuffer support first.

use bitflags::bitflags;
use tracing::trace;
use x11_dl::glx;

use crate::driver::{
    EGL_ALPHA_SIZE, EGL_BLUE_SIZE, EGL_BUFFER_SIZE, EGL_CONFIG_ID, EGL_CONTEXT_MAJOR_VERSION,
    EGL_CONTEXT_MINOR_VERSION, EGL_CONTEXT_OPENGL_DEBUG, EGL_CONTEXT_OPENGL_FORWARD_COMPATIBLE,
    EGL_CONTEXT_OPENGL_PROFILE_MASK, EGL_DEPTH_SIZE, EGL_GREEN_SIZE, EGL_LEVEL, EGL_NONE,
    EGL_PBUFFER_BIT, EGL_RED_SIZE, EGL_SAMPLE_BUFFERS, EGL_SAMPLES, EGL_STENCIL_SIZE,
    EGL_SURFACE_TYPE, EGLint,
};

// GLX 1.3/1.4 tokens not taken from x11-dl
pub const GLX_NONE: i32 = 0x8000;
pub const GLX_TRUE_COLOR: i32 = 0x8002;
pub const GLX_CONFIG_CAVEAT: i32 = 0x0020;
pub const GLX_X_VISUAL_TYPE: i32 = 0x0022;
pub const GLX_MAX_PBUFFER_WIDTH: i32 = 0x8016;
pub const GLX_MAX_PBUFFER_HEIGHT: i32 = 0x8017;
pub const GLX_MAX_PBUFFER_PIXELS: i32 = 0x8018;
pub const GLX_PBUFFER_HEIGHT: i32 = 0x8040;
pub const GLX_PBUFFER_WIDTH: i32 = 0x8041;
pub const GLX_SAMPLE_BUFFERS: i32 = 100000;
pub const GLX_SAMPLES: i32 = 100001;

// GLX_ARB_create_context / GLX_ARB_create_context_profile
pub const GLX_CONTEXT_MAJOR_VERSION_ARB: i32 = 0x2091;
pub const GLX_CONTEXT_MINOR_VERSION_ARB: i32 = 0x2092;
pub const GLX_CONTEXT_FLAGS_ARB: i32 = 0x2094;
pub const GLX_CONTEXT_PROFILE_MASK_ARB: i32 = 0x9126;

/// GLX attribute -> EGL attribute, for attributes whose values mean the same
/// thing on both sides
pub const ATTRIBUTE_MAP: &[(i32, EGLint)] = &[
    (glx::GLX_BUFFER_SIZE, EGL_BUFFER_SIZE),
    (glx::GLX_LEVEL, EGL_LEVEL),
    (glx::GLX_RED_SIZE, EGL_RED_SIZE),
    (glx::GLX_GREEN_SIZE, EGL_GREEN_SIZE),
    (glx::GLX_BLUE_SIZE, EGL_BLUE_SIZE),
    (glx::GLX_ALPHA_SIZE, EGL_ALPHA_SIZE),
    (glx::GLX_DEPTH_SIZE, EGL_DEPTH_SIZE),
    (glx::GLX_STENCIL_SIZE, EGL_STENCIL_SIZE),
    (GLX_SAMPLE_BUFFERS, EGL_SAMPLE_BUFFERS),
    (GLX_SAMPLES, EGL_SAMPLES),
    (glx::GLX_FBCONFIG_ID, EGL_CONFIG_ID),
];

bitflags! {
    /// GLX_CONTEXT_FLAGS_ARB bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContextFlags: i32 {
        const DEBUG              = 0x0001;
        const FORWARD_COMPATIBLE = 0x0002;
    }
}

/// Key/value pairs of a GLX list, up to the `None` key
pub fn pairs(attrs: &[i32]) -> impl Iterator<Item = (i32, i32)> + '_ {
    attrs
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .take_while(|&(key, _)| key != 0)
}

/// Value of `key` in a GLX list, last occurrence wins
pub fn attribute_value(attrs: &[i32], key: i32) -> Option<i32> {
    pairs(attrs).filter(|&(k, _)| k == key).map(|(_, v)| v).last()
}

/// EGL equivalent of a GLX config attribute
pub fn egl_attribute(attribute: i32) -> Option<EGLint> {
    ATTRIBUTE_MAP
        .iter()
        .find(|&&(glx_attr, _)| glx_attr == attribute)
        .map(|&(_, egl_attr)| egl_attr)
}

/// Convert a GLX FBConfig attribute list to an EGL config attribute list.
///
/// The result always starts with `EGL_SURFACE_TYPE, EGL_PBUFFER_BIT` and ends
/// with `EGL_NONE`. Attributes with no EGL counterpart are dropped.
pub fn convert_attribute_list(attrs: &[i32]) -> Vec<EGLint> {
    let mut result = vec![EGL_SURFACE_TYPE, EGL_PBUFFER_BIT];
    for (attr, value) in pairs(attrs) {
        trace!("    {} = {}", attr, value);
        if let Some(egl_attr) = egl_attribute(attr) {
            result.push(egl_attr);
            result.push(value);
        }
    }
    result.push(EGL_NONE);
    result
}

/// Convert GLX_ARB_create_context attributes to EGL context attributes
pub fn convert_context_attribs(attrs: &[i32]) -> Vec<EGLint> {
    let mut result = Vec::new();
    for (attr, value) in pairs(attrs) {
        trace!("    {} = {}", attr, value);
        match attr {
            GLX_CONTEXT_MAJOR_VERSION_ARB => result.extend([EGL_CONTEXT_MAJOR_VERSION, value]),
            GLX_CONTEXT_MINOR_VERSION_ARB => result.extend([EGL_CONTEXT_MINOR_VERSION, value]),
            // Core/compatibility bits share values with EGL
            GLX_CONTEXT_PROFILE_MASK_ARB => {
                result.extend([EGL_CONTEXT_OPENGL_PROFILE_MASK, value])
            }
            GLX_CONTEXT_FLAGS_ARB => {
                let flags = ContextFlags::from_bits_truncate(value);
                if flags.contains(ContextFlags::DEBUG) {
                    result.extend([EGL_CONTEXT_OPENGL_DEBUG, 1]);
                }
                if flags.contains(ContextFlags::FORWARD_COMPATIBLE) {
                    result.extend([EGL_CONTEXT_OPENGL_FORWARD_COMPATIBLE, 1]);
                }
            }
            _ => {}
        }
    }
    result.push(EGL_NONE);
    result
}

/// Fixed answers for attributes with no native surface to ask
#[derive(Debug, Clone, Copy)]
pub struct SurfaceCaps {
    pub max_pbuffer_width: i32,
    pub max_pbuffer_height: i32,
}

/// Where the answer to a `glXGetFBConfigAttrib` query comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttribSource {
    /// Ask EGL for this attribute of the config
    Egl(EGLint),
    /// Answer without asking anyone
    Fixed(i32),
    /// Id of the screen's default visual
    DefaultVisual,
    /// GLX_BAD_ATTRIBUTE
    Unsupported,
}

/// Decide how to answer a config attribute query
pub fn config_attribute(attribute: i32, caps: SurfaceCaps) -> AttribSource {
    if let Some(egl_attr) = egl_attribute(attribute) {
        return AttribSource::Egl(egl_attr);
    }

    match attribute {
        glx::GLX_VISUAL_ID => AttribSource::DefaultVisual,
        glx::GLX_DRAWABLE_TYPE => AttribSource::Fixed(
            glx::GLX_WINDOW_BIT | glx::GLX_PIXMAP_BIT | glx::GLX_PBUFFER_BIT,
        ),
        glx::GLX_RENDER_TYPE => AttribSource::Fixed(glx::GLX_RGBA_BIT),
        glx::GLX_X_RENDERABLE => AttribSource::Fixed(1),
        // Swap copies the back buffer out, so clients see double buffering
        glx::GLX_DOUBLEBUFFER => AttribSource::Fixed(1),
        GLX_X_VISUAL_TYPE => AttribSource::Fixed(GLX_TRUE_COLOR),
        GLX_CONFIG_CAVEAT => AttribSource::Fixed(GLX_NONE),
        GLX_MAX_PBUFFER_WIDTH => AttribSource::Fixed(caps.max_pbuffer_width),
        GLX_MAX_PBUFFER_HEIGHT => AttribSource::Fixed(caps.max_pbuffer_height),
        GLX_MAX_PBUFFER_PIXELS => {
            AttribSource::Fixed(caps.max_pbuffer_width.saturating_mul(caps.max_pbuffer_height))
        }
        _ => AttribSource::Unsupported,
    }
}
