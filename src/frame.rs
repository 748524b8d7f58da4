use core::ops::Range;

use crate::{
    common::GifError,
    lzw::{ByteStream, IndexSink, LzwDecoder},
    source::{ByteCursor, ByteSource},
};

/// Holds one sub-block worth of image data
struct LilQ {
    buf: [u8; 255],
    idx: usize,
    size: usize,
}

impl LilQ {
    fn new() -> Self {
        Self {
            buf: [0; 255],
            idx: 0,
            size: 0,
        }
    }

    #[inline]
    fn empty(&self) -> bool {
        self.idx >= self.size
    }

    fn next(&mut self) -> Option<u8> {
        (!self.empty()).then(|| {
            let rv = self.buf[self.idx];
            self.idx += 1;
            rv
        })
    }
}

/// Presents a chain of length prefixed sub-blocks as one contiguous byte stream
pub(crate) struct SubBlocks<'c, 's> {
    cursor: &'c mut ByteCursor<'s>,
    block: LilQ,
    done: bool,
}

impl<'c, 's> SubBlocks<'c, 's> {
    pub(crate) fn new(cursor: &'c mut ByteCursor<'s>) -> Self {
        Self {
            cursor,
            block: LilQ::new(),
            done: false,
        }
    }

    fn fill_block(&mut self) -> Result<(), GifError> {
        let len = self.cursor.take_byte()? as usize;
        if len == 0 {
            self.done = true;
        } else {
            self.cursor.take_into(&mut self.block.buf[..len])?;
        }
        self.block.idx = 0;
        self.block.size = len;
        Ok(())
    }

    /// Skip whatever is left of the chain, terminator included
    pub(crate) fn drain(&mut self) -> Result<(), GifError> {
        if !self.done {
            self.cursor.skip_sub_blocks()?;
            self.done = true;
        }
        Ok(())
    }
}

impl ByteStream for SubBlocks<'_, '_> {
    fn next_byte(&mut self) -> Result<Option<u8>, GifError> {
        while self.block.empty() {
            if self.done {
                return Ok(None);
            }
            self.fill_block()?;
        }
        Ok(self.block.next())
    }
}

const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

fn rows_in_pass(start: usize, step: usize, height: usize) -> usize {
    if height > start {
        (height - start + step - 1) / step
    } else {
        0
    }
}

/// Display row of the `stream_row`th row of an interlaced image that is `height` rows tall.
///
/// Interlaced rows arrive in four passes: every 8th row from 0, every 8th from 4, every 4th
/// from 2, then every 2nd from 1.
pub fn interlaced_row(stream_row: usize, height: usize) -> usize {
    let mut row = stream_row;
    for (start, step) in PASSES {
        let in_pass = rows_in_pass(start, step, height);
        if row < in_pass {
            return start + row * step;
        }
        row -= in_pass;
    }
    stream_row
}

/// Inverse of [`interlaced_row`]: where display row `row` sits in the stream
pub fn interlaced_stream_row(row: usize, height: usize) -> usize {
    let mut before = 0;
    for (start, step) in PASSES {
        if row >= start && (row - start) % step == 0 {
            return before + (row - start) / step;
        }
        before += rows_in_pass(start, step, height);
    }
    row
}

/// A frame's dimensions and the columns and rows of it that land on the canvas, in frame
/// coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: usize,
    pub height: usize,
    pub interlaced: bool,
    pub columns: Range<usize>,
    pub rows: Range<usize>,
}

impl FrameLayout {
    /// Indices needed to hold the visible part
    pub fn visible_len(&self) -> usize {
        self.columns.len() * self.rows.len()
    }

    /// Stream positions worth decoding. Without interlacing nothing below the last visible row
    /// matters.
    pub fn stream_len(&self) -> usize {
        if self.rows.is_empty() || self.columns.is_empty() {
            0
        } else if self.interlaced {
            self.width * self.height
        } else {
            self.width * self.rows.end
        }
    }

    /// Stream row holding display row `row`
    pub fn stream_row(&self, row: usize) -> usize {
        if self.interlaced {
            interlaced_stream_row(row, self.height)
        } else {
            row
        }
    }

    /// How many leading visible indices of display row `row` are covered by the first `written`
    /// stream positions
    pub fn decoded_in_row(&self, row: usize, written: usize) -> usize {
        let first = self.stream_row(row) * self.width + self.columns.start;
        written.saturating_sub(first).min(self.columns.len())
    }
}

/// Decoding target that keeps only the visible part of a frame, row by row in display order.
pub struct FrameWindow<'a> {
    layout: &'a FrameLayout,
    indices: &'a mut [u8],
}

impl<'a> FrameWindow<'a> {
    /// `indices` has to hold at least [`FrameLayout::visible_len`] entries
    pub fn new(layout: &'a FrameLayout, indices: &'a mut [u8]) -> Self {
        Self { layout, indices }
    }
}

impl IndexSink for FrameWindow<'_> {
    fn capacity(&self) -> usize {
        self.layout.stream_len()
    }

    fn put(&mut self, pos: usize, index: u8) {
        let layout = self.layout;
        let (stream_row, col) = (pos / layout.width, pos % layout.width);
        let row = if layout.interlaced {
            interlaced_row(stream_row, layout.height)
        } else {
            stream_row
        };
        if layout.rows.contains(&row) && layout.columns.contains(&col) {
            let at = (row - layout.rows.start) * layout.columns.len() + col - layout.columns.start;
            self.indices[at] = index;
        }
    }
}

/// Where the data of a frame ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameData {
    /// Stream positions decoded, counted from the frame's first pixel
    pub written: usize,
    /// Offset just past the frame's data chain
    pub end_offset: u32,
}

/// Decompress the image data starting at `data_offset` (the minimum code size byte) into `out`.
pub fn decode_frame_data<O: IndexSink + ?Sized>(
    lzw: &mut LzwDecoder,
    source: &mut dyn ByteSource,
    data_offset: u32,
    out: &mut O,
) -> Result<FrameData, GifError> {
    let mut cursor = ByteCursor::new(source, data_offset);
    let min_code_size = cursor.take_byte()?;

    let mut blocks = SubBlocks::new(&mut cursor);
    let decoded = lzw.decode(min_code_size, &mut blocks, out)?;
    blocks.drain()?;

    if !decoded.saw_end {
        log::trace!("frame data at {} has no end code", data_offset);
    }
    if decoded.written < out.capacity() {
        log::warn!(
            "frame data at {} ended after {} of {} pixels",
            data_offset,
            decoded.written,
            out.capacity()
        );
    }

    Ok(FrameData {
        written: decoded.written,
        end_offset: cursor.get_offset(),
    })
}
