use embedded_graphics::pixelcolor::{
    raw::RawU16, BinaryColor, Gray8, GrayColor, IntoStorage, Rgb565, Rgb888, RgbColor,
};

/// Byte layout of the decoded canvas.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PixelFormat {
    /// RGB565, low byte first (what most SPI TFT drivers want)
    #[default]
    Rgb565Le,
    /// RGB565, high byte first
    Rgb565Be,
    /// 24-bit R, G, B
    Rgb888,
    /// 32-bit with an always opaque alpha byte first
    Argb8888,
    /// 8-bit luminance
    Gray8,
    /// 1-bit, 8 pixels per byte, most significant bit is the leftmost pixel. Rows start on a
    /// byte boundary.
    Mono1,
}

/// Integer luma approximation, `(77R + 150G + 29B) >> 8`
pub fn luma(color: Rgb888) -> Gray8 {
    let weighted =
        77 * u32::from(color.r()) + 150 * u32::from(color.g()) + 29 * u32::from(color.b());
    Gray8::new((weighted >> 8) as u8)
}

/// Truncating 5-6-5 packing
pub fn rgb565(color: Rgb888) -> Rgb565 {
    Rgb565::new(color.r() >> 3, color.g() >> 2, color.b() >> 3)
}

/// Thresholded at the middle of the luma range
pub fn binary(color: Rgb888) -> BinaryColor {
    if luma(color).luma() > 127 {
        BinaryColor::On
    } else {
        BinaryColor::Off
    }
}

impl PixelFormat {
    /// Bits each pixel occupies in the canvas
    pub const fn bits_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565Le | PixelFormat::Rgb565Be => 16,
            PixelFormat::Rgb888 => 24,
            PixelFormat::Argb8888 => 32,
            PixelFormat::Gray8 => 8,
            PixelFormat::Mono1 => 1,
        }
    }

    /// Bytes per canvas row
    pub const fn row_stride(self, width: usize) -> usize {
        (width * self.bits_per_pixel() + 7) / 8
    }

    /// Bytes needed for a whole `width` x `height` canvas
    pub const fn buffer_len(self, width: usize, height: usize) -> usize {
        self.row_stride(width) * height
    }

    /// Store `color` at (`x`, `y`) of a canvas `width` pixels wide
    pub fn write(self, buf: &mut [u8], width: usize, x: usize, y: usize, color: Rgb888) {
        let row = y * self.row_stride(width);
        match self {
            PixelFormat::Rgb565Le => {
                let at = row + x * 2;
                buf[at..at + 2].copy_from_slice(&rgb565(color).into_storage().to_le_bytes());
            }
            PixelFormat::Rgb565Be => {
                let at = row + x * 2;
                buf[at..at + 2].copy_from_slice(&rgb565(color).into_storage().to_be_bytes());
            }
            PixelFormat::Rgb888 => {
                let at = row + x * 3;
                buf[at..at + 3].copy_from_slice(&[color.r(), color.g(), color.b()]);
            }
            PixelFormat::Argb8888 => {
                let at = row + x * 4;
                buf[at..at + 4].copy_from_slice(&[0xff, color.r(), color.g(), color.b()]);
            }
            PixelFormat::Gray8 => buf[row + x] = luma(color).luma(),
            PixelFormat::Mono1 => {
                let mask = 0x80 >> (x % 8);
                let byte = &mut buf[row + x / 8];
                if binary(color).is_on() {
                    *byte |= mask;
                } else {
                    *byte &= !mask;
                }
            }
        }
    }

    /// Read the pixel at (`x`, `y`) back as a 24-bit color. Lossy for every format that stores
    /// fewer than 24 bits.
    pub fn read(self, buf: &[u8], width: usize, x: usize, y: usize) -> Rgb888 {
        let row = y * self.row_stride(width);
        match self {
            PixelFormat::Rgb565Le => {
                let at = row + x * 2;
                let raw = u16::from_le_bytes([buf[at], buf[at + 1]]);
                Rgb888::from(Rgb565::from(RawU16::new(raw)))
            }
            PixelFormat::Rgb565Be => {
                let at = row + x * 2;
                let raw = u16::from_be_bytes([buf[at], buf[at + 1]]);
                Rgb888::from(Rgb565::from(RawU16::new(raw)))
            }
            PixelFormat::Rgb888 => {
                let at = row + x * 3;
                Rgb888::new(buf[at], buf[at + 1], buf[at + 2])
            }
            PixelFormat::Argb8888 => {
                let at = row + x * 4;
                Rgb888::new(buf[at + 1], buf[at + 2], buf[at + 3])
            }
            PixelFormat::Gray8 => Rgb888::from(Gray8::new(buf[row + x])),
            PixelFormat::Mono1 => {
                if buf[row + x / 8] & (0x80 >> (x % 8)) != 0 {
                    Rgb888::WHITE
                } else {
                    Rgb888::BLACK
                }
            }
        }
    }
}
