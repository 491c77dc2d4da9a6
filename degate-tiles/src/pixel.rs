//! Pixel formats stored in tiles.

use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

/// A value that can live in a tile.
///
/// Tiles are plain memory (possibly a mapped file), so a pixel must be
/// valid for any bit pattern and all-zero must mean "background".
pub trait Pixel: Pod + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Bytes per pixel.
    const SIZE: usize = std::mem::size_of::<Self>();

    /// Short name used in log output.
    const NAME: &'static str;
}

/// 8-bit channels packed as `A << 24 | B << 16 | G << 8 | R`.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug, Pod, Zeroable)]
pub struct RgbaPixel(pub u32);

impl RgbaPixel {
    pub fn merge_channels(r: u8, g: u8, b: u8, a: u8) -> RgbaPixel {
        RgbaPixel((a as u32) << 24 | (b as u32) << 16 | (g as u32) << 8 | r as u32)
    }

    /// Returns `(r, g, b, a)`.
    pub fn split_channels(self) -> (u8, u8, u8, u8) {
        (self.red(), self.green(), self.blue(), self.alpha())
    }

    pub fn red(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    pub fn green(self) -> u8 {
        ((self.0 >> 8) & 0xff) as u8
    }

    pub fn blue(self) -> u8 {
        ((self.0 >> 16) & 0xff) as u8
    }

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Mean of the three colour channels.
    pub fn luminance(self) -> u8 {
        let (r, g, b, _) = self.split_channels();
        ((r as u16 + g as u16 + b as u16) / 3) as u8
    }
}

impl From<[u8; 4]> for RgbaPixel {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        RgbaPixel::merge_channels(r, g, b, a)
    }
}

/// Single channel floating point intensity, used for filtered images.
pub type GreyscalePixel = f32;

/// Single byte per pixel, used for masks.
pub type BytePixel = u8;

impl Pixel for RgbaPixel {
    const NAME: &'static str = "rgba";
}

impl Pixel for f32 {
    const NAME: &'static str = "greyscale";
}

impl Pixel for u8 {
    const NAME: &'static str = "byte";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_split_channels() {
        let pixel = RgbaPixel::merge_channels(0x11, 0x22, 0x33, 0x44);
        assert_eq!(pixel.0, 0x4433_2211);
        assert_eq!(pixel.split_channels(), (0x11, 0x22, 0x33, 0x44));
        assert_eq!(RgbaPixel::from([0x11, 0x22, 0x33, 0x44]), pixel);
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(RgbaPixel::default().0, 0);
        assert_eq!(<GreyscalePixel as Default>::default(), 0.0);
        assert_eq!(<BytePixel as Default>::default(), 0);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(RgbaPixel::SIZE, 4);
        assert_eq!(<GreyscalePixel as Pixel>::SIZE, 4);
        assert_eq!(<BytePixel as Pixel>::SIZE, 1);
    }

    #[test]
    fn test_luminance() {
        assert_eq!(RgbaPixel::merge_channels(30, 60, 90, 255).luminance(), 60);
        assert_eq!(RgbaPixel::merge_channels(255, 255, 255, 0).luminance(), 255);
    }

    #[test]
    fn test_cast_from_bytes() {
        let bytes = [0x11u8, 0x22, 0x33, 0x44, 0, 0, 0, 0xff];
        let pixels: Vec<RgbaPixel> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(pixels.len(), 2);
        assert_eq!(pixels[0].0, u32::from_ne_bytes([0x11, 0x22, 0x33, 0x44]));
        assert_eq!(pixels[1].0, u32::from_ne_bytes([0, 0, 0, 0xff]));
    }
}
