use core::ops::{BitAnd, Shr};

use embedded_graphics::{
    pixelcolor::Rgb888,
    prelude::{Point, Size},
    primitives::Rectangle,
};
use smallvec::SmallVec;

use crate::{
    common::{DisposalMethod, GifError},
    source::ByteCursor,
};

/// Length of the signature plus logical screen descriptor.
pub const HEADER_LEN: u32 = 13;

/// Minimum frame delay; anything shorter is bumped up to this.
pub const MIN_DELAY_MS: u32 = 20;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Version {
    V87a,
    V89a,
}

/// Indexed palette of up to 256 colors.
#[derive(Clone, PartialEq, Eq)]
pub struct ColorTable {
    table: SmallVec<[Rgb888; 256]>,
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            table: SmallVec::new(),
        }
    }
}

impl core::fmt::Debug for ColorTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ColorTable")
            .field("len", &self.len())
            .finish()
    }
}

impl ColorTable {
    /// Number of entries encoded by the 3 bit size field of a packed flags byte
    pub fn len_from_flags(flags: u8) -> u16 {
        1 << (flags.bitand(0x7) + 1)
    }

    pub fn parse(len: u16, iter: &mut ByteCursor<'_>) -> Result<Self, GifError> {
        let mut table = SmallVec::new();

        for _ in 0..len {
            let [r, g, b] = iter.take_arr()?;
            table.push(Rgb888::new(r, g, b))
        }
        Ok(Self { table })
    }

    pub fn from_rgb(colors: &[[u8; 3]]) -> Self {
        Self {
            table: colors
                .iter()
                .take(256)
                .map(|[r, g, b]| Rgb888::new(*r, *g, *b))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns a color table entry, `None` if `index` is out of bounds.
    pub fn get(&self, index: u8) -> Option<Rgb888> {
        self.table.get(index as usize).copied()
    }
}

/// Signature and logical screen descriptor, plus the global color table if there is one.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    /// Gif size in pixels.
    pub width: u16,
    pub height: u16,
    pub background_index: u8,
    /// Pixel aspect ratio byte, 0 when unspecified
    pub aspect_ratio: u8,
    /// Global color table (if it exists)
    pub global_table: Option<ColorTable>,
    /// Where block scanning starts
    pub blocks_offset: u32,
}

impl Header {
    /// Parse the header, failing if the canvas is larger than `max_size`
    pub fn parse(raw_header: &mut ByteCursor<'_>, max_size: Size) -> Result<Header, GifError> {
        let name: [u8; 6] = raw_header.take_arr()?;

        let version = match &name {
            b"GIF89a" => Version::V89a,
            b"GIF87a" => Version::V87a,
            _ => return Err(GifError::BadFileFormat),
        };

        let width = raw_header.take_u16_le()?;
        let height = raw_header.take_u16_le()?;

        if u32::from(width) > max_size.width || u32::from(height) > max_size.height {
            return Err(GifError::FileTooWide);
        }

        let [flags, background_index, aspect_ratio] = raw_header.take_arr()?;

        let global_table = if flags.bitand(0x80) != 0 {
            Some(ColorTable::parse(
                ColorTable::len_from_flags(flags),
                raw_header,
            )?)
        } else {
            None
        };

        Ok(Header {
            version,
            width,
            height,
            background_index,
            aspect_ratio,
            global_table,
            blocks_offset: raw_header.get_offset(),
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width.into(), self.height.into())
    }

    /// Color used to clear frames with [`DisposalMethod::RestoreBackground`]. Black when the
    /// background index can't be resolved.
    pub fn background_color(&self) -> Rgb888 {
        self.global_table
            .as_ref()
            .and_then(|table| table.get(self.background_index))
            .unwrap_or(Rgb888::new(0, 0, 0))
    }
}

/// Graphics control extension; applies to the next image descriptor only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct GraphicsControl {
    pub disposal: DisposalMethod,
    ///table index for a transparent color
    pub transparent_idx: Option<u8>,
    /// Delay in milliseconds, already clamped to [`MIN_DELAY_MS`]. Frames without a control
    /// block have no delay at all.
    pub delay_ms: u32,
    pub user_input: bool,
}

impl GraphicsControl {
    /// Parse after the `0x21 0xf9` introducer; leaves the cursor after the block terminator
    pub fn parse(raw_header: &mut ByteCursor<'_>) -> Result<Self, GifError> {
        let [_len, ctrl] = raw_header.take_arr()?;
        let delay_centis = raw_header.take_u16_le()?;
        let transparent_idx = raw_header.take_byte()?;
        raw_header.skip_sub_blocks()?;

        Ok(Self {
            disposal: DisposalMethod::from_bits(ctrl.shr(2u8)),
            transparent_idx: (ctrl.bitand(1) == 1).then_some(transparent_idx),
            delay_ms: (u32::from(delay_centis) * 10).max(MIN_DELAY_MS),
            user_input: ctrl.bitand(2) == 2,
        })
    }
}

/// An image descriptor together with everything that determines how it's drawn.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub origin: Point,
    pub size: Size,
    pub interlaced: bool,
    pub local_table: Option<ColorTable>,
}

impl ImageDescriptor {
    /// Parse after the `0x2c` separator, including the local color table
    pub fn parse(raw_header: &mut ByteCursor<'_>) -> Result<Self, GifError> {
        let left = raw_header.take_u16_le()?;
        let top = raw_header.take_u16_le()?;
        let width = raw_header.take_u16_le()?;
        let height = raw_header.take_u16_le()?;
        let flags = raw_header.take_byte()?;

        let local_table = if flags.bitand(0x80) != 0 {
            Some(ColorTable::parse(ColorTable::len_from_flags(flags), raw_header)?)
        } else {
            None
        };

        Ok(Self {
            origin: Point::new(left.into(), top.into()),
            size: Size::new(width.into(), height.into()),
            interlaced: flags.bitand(0x40) != 0,
            local_table,
        })
    }

    pub fn bounding_box(&self) -> Rectangle {
        Rectangle::new(self.origin, self.size)
    }
}
