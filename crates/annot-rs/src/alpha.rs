//! Alpha compositing of float image layers.
//!
//! Layers are owned row-major HWC buffers in the [0, 1] range. The blend is
//! the standard source-over rule: `a = a1 + a2*(1-a1)`,
//! `rgb = (rgb1*a1 + rgb2*a2*(1-a1)) / a`, with fully transparent output
//! pixels forced to zero.

use crate::error::{Error, Result};
use crate::rle::Raster;

/// Owned float image buffer, row-major, channels interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuf {
    pub h: usize,
    pub w: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl ImageBuf {
    pub fn new(h: usize, w: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        let n = h * w * channels;
        if data.len() != n {
            return Err(Error::LengthMismatch {
                name: "image data",
                expected: n,
                got: data.len(),
            });
        }
        Ok(ImageBuf {
            h,
            w,
            channels,
            data,
        })
    }

    pub fn zeros(h: usize, w: usize, channels: usize) -> Self {
        ImageBuf {
            h,
            w,
            channels,
            data: vec![0.0; h * w * channels],
        }
    }

    /// Channel slice of the pixel at `(y, x)`.
    pub fn pixel(&self, y: usize, x: usize) -> &[f32] {
        let i = (y * self.w + x) * self.channels;
        &self.data[i..i + self.channels]
    }
}

/// Return the image with exactly four channels.
///
/// Grayscale is replicated to rgb; a constant `alpha` fills the new alpha
/// channel. Inputs that already carry alpha pass through unchanged.
pub fn ensure_alpha_channel(img: &ImageBuf, alpha: f32) -> Result<ImageBuf> {
    match img.channels {
        4 => Ok(img.clone()),
        3 => {
            let mut out = ImageBuf::zeros(img.h, img.w, 4);
            for i in 0..img.h * img.w {
                out.data[i * 4..i * 4 + 3].copy_from_slice(&img.data[i * 3..i * 3 + 3]);
                out.data[i * 4 + 3] = alpha;
            }
            Ok(out)
        }
        1 => {
            let mut out = ImageBuf::zeros(img.h, img.w, 4);
            for i in 0..img.h * img.w {
                let g = img.data[i];
                out.data[i * 4..i * 4 + 4].copy_from_slice(&[g, g, g, alpha]);
            }
            Ok(out)
        }
        c => Err(Error::InvalidFormat(format!(
            "expected 1, 3, or 4 channels, got {c}"
        ))),
    }
}

fn check_same_canvas(a: &ImageBuf, b: &ImageBuf) -> Result<()> {
    if (a.h, a.w) != (b.h, b.w) {
        return Err(Error::shape_mismatch(
            (a.h as u32, a.w as u32),
            (b.h as u32, b.w as u32),
        ));
    }
    Ok(())
}

/// Place `top` over `bottom`, respecting both alpha channels. The result
/// keeps its alpha channel.
pub fn overlay_alpha_images(top: &ImageBuf, bottom: &ImageBuf) -> Result<ImageBuf> {
    check_same_canvas(top, bottom)?;
    let t = ensure_alpha_channel(top, 1.0)?;
    let b = ensure_alpha_channel(bottom, 1.0)?;

    let mut out = ImageBuf::zeros(t.h, t.w, 4);
    for i in 0..t.h * t.w {
        let p1 = &t.data[i * 4..i * 4 + 4];
        let p2 = &b.data[i * 4..i * 4 + 4];
        let a1 = p1[3];
        let a2 = p2[3];
        let a3 = a1 + a2 * (1.0 - a1);
        let o = &mut out.data[i * 4..i * 4 + 4];
        if a3 == 0.0 {
            continue; // fully transparent stays zero
        }
        for c in 0..3 {
            o[c] = (p1[c] * a1 + p2[c] * a2 * (1.0 - a1)) / a3;
        }
        o[3] = a3;
    }
    Ok(out)
}

/// Composite a stack of layers, topmost first.
pub fn overlay_alpha_layers(layers: &[ImageBuf], keepalpha: bool) -> Result<ImageBuf> {
    let mut iter = layers.iter();
    let first = iter.next().ok_or(Error::EmptyInput)?;
    let mut out = ensure_alpha_channel(first, 1.0)?;
    for layer in iter {
        out = overlay_alpha_images(&out, layer)?;
    }
    if !keepalpha {
        let mut rgb = ImageBuf::zeros(out.h, out.w, 3);
        for i in 0..out.h * out.w {
            rgb.data[i * 3..i * 3 + 3].copy_from_slice(&out.data[i * 4..i * 4 + 3]);
        }
        out = rgb;
    }
    Ok(out)
}

/// Build a colored translucent layer from a binary mask: foreground pixels
/// get `color` at `alpha` opacity, background is fully transparent. The
/// result composes over an image with [`overlay_alpha_images`].
pub fn mask_alpha_layer(mask: &Raster, color: [f32; 3], alpha: f32) -> ImageBuf {
    let (h, w) = (mask.h as usize, mask.w as usize);
    let mut out = ImageBuf::zeros(h, w, 4);
    for y in 0..h {
        for x in 0..w {
            if mask.get(x as u32, y as u32) != 0 {
                let i = (y * w + x) * 4;
                out.data[i..i + 4].copy_from_slice(&[color[0], color[1], color[2], alpha]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rle::ScanOrder;

    fn solid(h: usize, w: usize, rgba: [f32; 4]) -> ImageBuf {
        let mut data = Vec::with_capacity(h * w * 4);
        for _ in 0..h * w {
            data.extend_from_slice(&rgba);
        }
        ImageBuf::new(h, w, 4, data).unwrap()
    }

    #[test]
    fn opaque_top_wins() {
        let top = solid(2, 2, [1.0, 0.0, 0.0, 1.0]);
        let bottom = solid(2, 2, [0.0, 1.0, 0.0, 1.0]);
        let out = overlay_alpha_images(&top, &bottom).unwrap();
        assert_eq!(out.pixel(0, 0), &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn transparent_top_passes_bottom_through() {
        let top = solid(2, 2, [1.0, 0.0, 0.0, 0.0]);
        let bottom = solid(2, 2, [0.0, 1.0, 0.0, 1.0]);
        let out = overlay_alpha_images(&top, &bottom).unwrap();
        assert_eq!(out.pixel(1, 1), &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn half_alpha_mixes_evenly_over_opaque() {
        let top = solid(1, 1, [1.0, 0.0, 0.0, 0.5]);
        let bottom = solid(1, 1, [0.0, 0.0, 1.0, 1.0]);
        let out = overlay_alpha_images(&top, &bottom).unwrap();
        let p = out.pixel(0, 0);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!((p[2] - 0.5).abs() < 1e-6);
        assert!((p[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn both_transparent_stays_zero() {
        let top = solid(1, 1, [1.0, 1.0, 1.0, 0.0]);
        let bottom = solid(1, 1, [1.0, 1.0, 1.0, 0.0]);
        let out = overlay_alpha_images(&top, &bottom).unwrap();
        assert_eq!(out.pixel(0, 0), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn layer_stack_is_topmost_first() {
        let a = solid(1, 1, [1.0, 0.0, 0.0, 1.0]);
        let b = solid(1, 1, [0.0, 1.0, 0.0, 1.0]);
        let out = overlay_alpha_layers(&[a, b], false).unwrap();
        assert_eq!(out.channels, 3);
        assert_eq!(out.pixel(0, 0), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_layer_stack_is_rejected() {
        assert!(matches!(
            overlay_alpha_layers(&[], true),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn grayscale_gains_alpha_channel() {
        let g = ImageBuf::new(1, 2, 1, vec![0.25, 0.75]).unwrap();
        let out = ensure_alpha_channel(&g, 0.5).unwrap();
        assert_eq!(out.channels, 4);
        assert_eq!(out.pixel(0, 1), &[0.75, 0.75, 0.75, 0.5]);
    }

    #[test]
    fn mismatched_canvases_are_rejected() {
        let a = solid(2, 2, [0.0; 4]);
        let b = solid(2, 3, [0.0; 4]);
        assert!(matches!(
            overlay_alpha_images(&a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn mask_layer_marks_foreground_only() {
        let mut mask = Raster::zeros(2, 2, ScanOrder::RowMajor);
        mask.set(1, 0, 1);
        let layer = mask_alpha_layer(&mask, [0.0, 0.0, 1.0], 0.5);
        assert_eq!(layer.pixel(0, 1), &[0.0, 0.0, 1.0, 0.5]);
        assert_eq!(layer.pixel(0, 0), &[0.0, 0.0, 0.0, 0.0]);
    }
}
