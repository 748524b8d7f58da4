use embedded_graphics::{pixelcolor::Rgb565, prelude::*};
use std::{convert::Infallible, vec, vec::Vec};
use weezl::{encode::Encoder, BitOrder};

use crate::frame::interlaced_row;

// TODO: use e-g framebuffer when it's added
pub(crate) struct Framebuffer<const WIDTH: usize, const HEIGHT: usize, C = Rgb565> {
    pixels: [[C; WIDTH]; HEIGHT],
}

impl<const WIDTH: usize, const HEIGHT: usize, C: RgbColor> Framebuffer<WIDTH, HEIGHT, C> {
    pub fn new() -> Self {
        Self {
            pixels: [[C::BLACK; WIDTH]; HEIGHT],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> C {
        self.pixels[y][x]
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, C: RgbColor> DrawTarget
    for Framebuffer<WIDTH, HEIGHT, C>
{
    type Error = Infallible;
    type Color = C;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<C>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(row) = self.pixels.get_mut(p.y as usize) {
                if let Some(px) = row.get_mut(p.x as usize) {
                    *px = c;
                }
            }
        }

        Ok(())
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, C> OriginDimensions
    for Framebuffer<WIDTH, HEIGHT, C>
{
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

/// Pack `(code, width)` pairs least significant bit first, the way gif image data is laid out.
pub(crate) fn pack_codes(codes: &[(u16, u8)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut acc = 0u32;
    let mut bits = 0u8;
    for &(code, width) in codes {
        acc |= u32::from(code) << bits;
        bits += width;
        while bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push(acc as u8);
    }
    out
}

/// Frame `data` as a sub-block chain, terminator included.
pub(crate) fn sub_blocks(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
    out
}

/// Bits needed to index `colors` entries; the padded table holds `1 << bits`
fn table_bits(colors: usize) -> u8 {
    let mut bits = 1;
    while (1usize << bits) < colors && bits < 8 {
        bits += 1;
    }
    bits
}

fn push_table(out: &mut Vec<u8>, colors: &[[u8; 3]]) {
    let len = 1usize << table_bits(colors.len());
    for idx in 0..len {
        out.extend_from_slice(colors.get(idx).unwrap_or(&[0; 3]));
    }
}

/// Assembles gif streams block by block, compressing image data with weezl.
pub(crate) struct GifBuilder {
    bytes: Vec<u8>,
    /// Where the packed flags byte of the screen descriptor lives
    flags_at: usize,
    global_bits: u8,
}

impl GifBuilder {
    pub fn new(width: u16, height: u16) -> Self {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        let flags_at = bytes.len();
        bytes.extend_from_slice(&[0, 0, 0]);
        Self {
            bytes,
            flags_at,
            global_bits: 1,
        }
    }

    /// Must come before any block
    pub fn global_table(mut self, colors: &[[u8; 3]]) -> Self {
        let bits = table_bits(colors.len());
        self.bytes[self.flags_at] = 0x80 | ((bits - 1) << 4) | (bits - 1);
        self.global_bits = bits;
        push_table(&mut self.bytes, colors);
        self
    }

    pub fn background(mut self, index: u8) -> Self {
        self.bytes[self.flags_at + 1] = index;
        self
    }

    pub fn aspect_ratio(mut self, ratio: u8) -> Self {
        self.bytes[self.flags_at + 2] = ratio;
        self
    }

    pub fn netscape_loop(mut self, count: u16) -> Self {
        self.bytes.extend_from_slice(&[0x21, 0xff, 11]);
        self.bytes.extend_from_slice(b"NETSCAPE2.0");
        let [lo, hi] = count.to_le_bytes();
        self.bytes.extend_from_slice(&[3, 1, lo, hi, 0]);
        self
    }

    pub fn comment(mut self, text: &[u8]) -> Self {
        self.bytes.extend_from_slice(&[0x21, 0xfe]);
        self.bytes.extend(sub_blocks(text));
        self
    }

    pub fn control(mut self, disposal: u8, delay_centis: u16, transparent: Option<u8>) -> Self {
        let packed = (disposal << 2) | u8::from(transparent.is_some());
        let [lo, hi] = delay_centis.to_le_bytes();
        self.bytes.extend_from_slice(&[
            0x21,
            0xf9,
            4,
            packed,
            lo,
            hi,
            transparent.unwrap_or(0),
            0,
        ]);
        self
    }

    fn descriptor(&mut self, x: u16, y: u16, width: u16, height: u16, flags: u8) {
        self.bytes.push(0x2c);
        for field in [x, y, width, height] {
            self.bytes.extend_from_slice(&field.to_le_bytes());
        }
        self.bytes.push(flags);
    }

    fn compressed(&mut self, bits: u8, indices: &[u8]) {
        let min_code_size = bits.max(2);
        let data = Encoder::new(BitOrder::Lsb, min_code_size)
            .encode(indices)
            .unwrap();
        self.bytes.push(min_code_size);
        self.bytes.extend(sub_blocks(&data));
    }

    /// An image using the global table, `indices` in row order
    pub fn image(mut self, x: u16, y: u16, width: u16, height: u16, indices: &[u8]) -> Self {
        self.descriptor(x, y, width, height, 0);
        let bits = self.global_bits;
        self.compressed(bits, indices);
        self
    }

    /// Like [`GifBuilder::image`], but stored interlaced
    pub fn interlaced_image(
        mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        indices: &[u8],
    ) -> Self {
        let (w, h) = (width as usize, height as usize);
        let mut stream = vec![0; w * h];
        for (stream_row, row) in stream.chunks_mut(w).enumerate() {
            let display = interlaced_row(stream_row, h);
            row.copy_from_slice(&indices[display * w..(display + 1) * w]);
        }
        self.descriptor(x, y, width, height, 0x40);
        let bits = self.global_bits;
        self.compressed(bits, &stream);
        self
    }

    /// An image with its own color table
    pub fn local_image(
        mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        colors: &[[u8; 3]],
        indices: &[u8],
    ) -> Self {
        let bits = table_bits(colors.len());
        self.descriptor(x, y, width, height, 0x80 | (bits - 1));
        push_table(&mut self.bytes, colors);
        self.compressed(bits, indices);
        self
    }

    /// An image whose compressed data is given as is
    pub fn raw_image(
        mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        min_code_size: u8,
        data: &[u8],
    ) -> Self {
        self.descriptor(x, y, width, height, 0);
        self.bytes.push(min_code_size);
        self.bytes.extend(sub_blocks(data));
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.push(0x3b);
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pads_tables_and_packs_codes() {
        let gif = GifBuilder::new(1, 1).global_table(&[[1, 1, 1]; 3]).finish();
        // 3 colors need a 4 entry table: exponent 1
        assert_eq!(gif[10], 0x80 | 0x10 | 1);
        assert_eq!(gif.len(), 13 + 12 + 1);

        assert_eq!(pack_codes(&[(4, 3), (1, 3), (5, 3)]), [0b0100_1100, 0b1]);
        assert_eq!(sub_blocks(&[7; 300])[..2], [255, 7]);
        assert_eq!(sub_blocks(&[7; 300])[256], 45);
    }
}
