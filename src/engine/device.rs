//! Pixel targets handed to engines while running a display list

use super::geometry::IRect;

/// Bytes per pixel; all buffers are RGBA8
pub const BYTES_PER_PIXEL: usize = 4;

/// Opaque white, the paper colour a patch starts from
pub const PAPER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Caller-owned RGBA8 pixel buffer, rows packed without padding
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let len = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(len * BYTES_PER_PIXEL);
        for _ in 0..len {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.pixels[at..at + BYTES_PER_PIXEL]);
        Some(out)
    }

    /// Copies `src` into the top-left `src.width x src.height` region
    pub(crate) fn blit_from(&mut self, src: &PixelBuffer) {
        let rows = src.height.min(self.height) as usize;
        let row_bytes = src.width.min(self.width) as usize * BYTES_PER_PIXEL;
        let dst_stride = self.stride();
        let src_stride = src.stride();
        for y in 0..rows {
            let d = y * dst_stride;
            let s = y * src_stride;
            self.pixels[d..d + row_bytes].copy_from_slice(&src.pixels[s..s + row_bytes]);
        }
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Draw target for one patch of a page raster.
///
/// Engines paint in raster coordinates; the device maps raster pixel
/// `(origin_x + i, origin_y + j)` to buffer pixel `(i, j)` and clips everything
/// outside [`DrawDevice::area`].
pub struct DrawDevice<'a> {
    target: &'a mut PixelBuffer,
    origin_x: i32,
    origin_y: i32,
}

impl<'a> DrawDevice<'a> {
    pub fn new(target: &'a mut PixelBuffer, origin_x: i32, origin_y: i32) -> Self {
        Self {
            target,
            origin_x,
            origin_y,
        }
    }

    /// Raster-space rectangle this device covers
    #[must_use]
    pub fn area(&self) -> IRect {
        let width = i32::try_from(self.target.width).unwrap_or(i32::MAX);
        let height = i32::try_from(self.target.height).unwrap_or(i32::MAX);
        IRect::new(
            self.origin_x,
            self.origin_y,
            self.origin_x.saturating_add(width),
            self.origin_y.saturating_add(height),
        )
    }

    /// Fills the raster-space rectangle `rect`, clipped to the device area
    pub fn fill_rect(&mut self, rect: IRect, rgba: [u8; 4]) {
        let clip = rect.intersect(&self.area());
        if clip.is_empty() {
            return;
        }
        let stride = self.target.stride();
        for y in clip.y0..clip.y1 {
            let row = (y - self.origin_y) as usize * stride;
            for x in clip.x0..clip.x1 {
                let at = row + (x - self.origin_x) as usize * BYTES_PER_PIXEL;
                self.target.pixels[at..at + BYTES_PER_PIXEL].copy_from_slice(&rgba);
            }
        }
    }

    /// Mutable row `y` (raster space) restricted to the device columns
    pub fn row_mut(&mut self, y: i32) -> Option<&mut [u8]> {
        let area = self.area();
        if y < area.y0 || y >= area.y1 {
            return None;
        }
        let stride = self.target.stride();
        let start = (y - self.origin_y) as usize * stride;
        Some(&mut self.target.pixels[start..start + stride])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_is_clipped_and_offset_by_origin() {
        let mut buf = PixelBuffer::new(4, 4);
        {
            let mut dev = DrawDevice::new(&mut buf, 10, 10);
            dev.fill_rect(IRect::new(8, 8, 12, 11), [1, 2, 3, 4]);
        }
        assert_eq!(buf.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(buf.pixel(1, 0), Some([1, 2, 3, 4]));
        assert_eq!(buf.pixel(2, 0), Some([0, 0, 0, 0]));
        assert_eq!(buf.pixel(0, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn area_saturates_near_the_raster_edge() {
        let mut buf = PixelBuffer::new(10, 10);
        let mut dev = DrawDevice::new(&mut buf, i32::MAX - 5, i32::MAX - 2);
        assert_eq!(
            dev.area(),
            IRect::new(i32::MAX - 5, i32::MAX - 2, i32::MAX, i32::MAX)
        );
        dev.fill_rect(IRect::new(i32::MAX - 5, i32::MAX - 2, i32::MAX, i32::MAX), [7, 7, 7, 7]);
        assert!(dev.row_mut(i32::MAX - 1).is_some());
        assert!(dev.row_mut(i32::MAX).is_none());
        drop(dev);
        assert_eq!(buf.pixel(0, 0), Some([7, 7, 7, 7]));
        assert_eq!(buf.pixel(5, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn blit_copies_into_top_left() {
        let mut dst = PixelBuffer::filled(3, 3, [9, 9, 9, 9]);
        let src = PixelBuffer::filled(2, 1, [1, 1, 1, 1]);
        dst.blit_from(&src);
        assert_eq!(dst.pixel(1, 0), Some([1, 1, 1, 1]));
        assert_eq!(dst.pixel(2, 0), Some([9, 9, 9, 9]));
        assert_eq!(dst.pixel(0, 1), Some([9, 9, 9, 9]));
    }
}
