//! Minimal 8-bit grayscale image types and the few resampling operations
//! needed to build multi-scale reference tiles.

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl GrayImageView<'_> {
    /// `true` when the view has a non-zero size and a buffer matching it.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.width * self.height
    }

    pub fn to_owned_image(&self) -> GrayImage {
        GrayImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height],
        }
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    /// Overwrite this image with `src`. Sizes must match.
    pub fn copy_from(&mut self, src: &GrayImageView<'_>) -> bool {
        if src.width != self.width || src.height != self.height || !src.is_valid() {
            return false;
        }
        self.data.copy_from_slice(src.data);
        true
    }
}

#[inline]
fn get_gray_clamped(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, src.width as i32 - 1);
    let y = y.clamp(0, src.height as i32 - 1);
    src.data[y as usize * src.width + x as usize]
}

/// Resize with bilinear interpolation, sampling at pixel centers and
/// replicating the border.
pub fn resize_bilinear(src: &GrayImageView<'_>, out_w: usize, out_h: usize) -> GrayImage {
    if out_w == 0 || out_h == 0 || !src.is_valid() {
        return GrayImage::new(out_w, out_h);
    }

    let sx = src.width as f32 / out_w as f32;
    let sy = src.height as f32 / out_h as f32;
    let mut out = Vec::with_capacity(out_w * out_h);

    for y in 0..out_h {
        let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        let y0 = fy.floor() as i32;
        let wy = fy - y0 as f32;
        for x in 0..out_w {
            let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let x0 = fx.floor() as i32;
            let wx = fx - x0 as f32;

            let p00 = get_gray_clamped(src, x0, y0) as f32;
            let p10 = get_gray_clamped(src, x0 + 1, y0) as f32;
            let p01 = get_gray_clamped(src, x0, y0 + 1) as f32;
            let p11 = get_gray_clamped(src, x0 + 1, y0 + 1) as f32;

            let a = p00 + wx * (p10 - p00);
            let b = p01 + wx * (p11 - p01);
            out.push((a + wy * (b - a)).round().clamp(0.0, 255.0) as u8);
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

/// Separable 3x3 Gaussian smoothing (kernel `[1 2 1] / 4` per axis).
pub fn gaussian_blur_3x3(src: &GrayImageView<'_>) -> GrayImage {
    if !src.is_valid() {
        return GrayImage::new(src.width, src.height);
    }

    let (w, h) = (src.width, src.height);
    let mut horizontal = vec![0u16; w * h];
    for y in 0..h {
        for x in 0..w {
            let l = get_gray_clamped(src, x as i32 - 1, y as i32) as u16;
            let c = get_gray_clamped(src, x as i32, y as i32) as u16;
            let r = get_gray_clamped(src, x as i32 + 1, y as i32) as u16;
            horizontal[y * w + x] = l + 2 * c + r;
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(h - 1);
        for x in 0..w {
            let sum = horizontal[up * w + x] + 2 * horizontal[y * w + x] + horizontal[down * w + x];
            // sum <= 16 * 255; +8 rounds to nearest.
            out[y * w + x] = ((sum + 8) / 16) as u8;
        }
    }

    GrayImage {
        width: w,
        height: h,
        data: out,
    }
}
