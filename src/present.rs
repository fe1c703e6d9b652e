//! Frame read-back helpers
//!
//! EGL hands back rows bottom-to-top, XImage wants them top-to-bottom.

/// Bytes per pixel of the BGRA frames moved from EGL to X
pub const BYTES_PER_PIXEL: usize = 4;

/// Size of a `width`x`height` frame in bytes
pub fn frame_len(width: u32, height: u32) -> usize {
    BYTES_PER_PIXEL * width as usize * height as usize
}

/// Reverse the order of rows in place by swapping mirrored row pairs
pub fn flip_rows(pixels: &mut [u8], stride: usize) {
    if stride == 0 {
        return;
    }
    let rows = pixels.len() / stride;
    for row in 0..rows / 2 {
        let (upper, lower) = pixels.split_at_mut((rows - 1 - row) * stride);
        upper[row * stride..(row + 1) * stride].swap_with_slice(&mut lower[..stride]);
    }
}
