//! Walks the block structure that follows the header.
//!
//! There are two ways through the stream: [`StreamSummary::scan`] runs once after the header is
//! parsed and only counts, while [`FrameScanner`] is driven once per frame during playback and
//! stops with the cursor parked on the frame's compressed data.

use crate::{
    common::{Block, ExtensionLabel, GifError},
    header::{GraphicsControl, ImageDescriptor},
    source::{ByteCursor, ByteSource},
};

/// What a single pass over the whole stream tells us without decoding any pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub frame_count: u16,
    /// Sum of all frame delays in milliseconds
    pub total_duration_ms: u32,
    /// Repetition count from a NETSCAPE2.0 block, `Some(0)` meaning forever
    pub loop_count: Option<u16>,
    /// First transparent index declared by any frame
    pub transparent_idx: Option<u8>,
}

impl StreamSummary {
    /// Scan from the cursor to the trailer. A truncated or malformed stream ends the scan at the
    /// last complete frame instead of failing.
    pub fn scan(cursor: &mut ByteCursor<'_>) -> Self {
        let mut summary = Self::default();
        if let Err(err) = summary.scan_blocks(cursor) {
            log::warn!(
                "pre-scan stopped at offset {} ({}), counted {} frames",
                cursor.get_offset(),
                err,
                summary.frame_count
            );
        }
        summary
    }

    fn scan_blocks(&mut self, cursor: &mut ByteCursor<'_>) -> Result<(), GifError> {
        let mut control: Option<GraphicsControl> = None;
        loop {
            let Some(block) = next_block(cursor)? else {
                continue;
            };
            match block {
                Block::Image => {
                    ImageDescriptor::parse(cursor)?;
                    // minimum code size, then the data chain
                    cursor.take_byte()?;
                    cursor.skip_sub_blocks()?;

                    let control = control.take().unwrap_or_default();
                    self.frame_count = self.frame_count.saturating_add(1);
                    self.total_duration_ms = self.total_duration_ms.saturating_add(control.delay_ms);
                    if self.transparent_idx.is_none() {
                        self.transparent_idx = control.transparent_idx;
                    }
                }
                Block::Extension => match ExtensionLabel::from_u8(cursor.take_byte()?) {
                    ExtensionLabel::Graphics => control = Some(GraphicsControl::parse(cursor)?),
                    ExtensionLabel::App => {
                        if let Some(count) = parse_application(cursor)? {
                            self.loop_count = Some(count);
                        }
                    }
                    _ => cursor.skip_sub_blocks()?,
                },
                Block::Trailer => return Ok(()),
            }
        }
    }
}

/// A located frame: everything up to, but not including, its compressed data.
#[derive(Debug, Clone)]
pub struct ScannedFrame {
    pub descriptor: ImageDescriptor,
    pub control: GraphicsControl,
    /// Offset of the LZW minimum code size byte
    pub data_offset: u32,
}

/// Resumable per-frame block scanner.
#[derive(Debug, Clone, Copy)]
pub struct FrameScanner {
    first_block: u32,
    offset: u32,
}

impl FrameScanner {
    pub fn new(first_block: u32) -> Self {
        Self {
            first_block,
            offset: first_block,
        }
    }

    /// Go back to the first block after the header
    pub fn rewind(&mut self) {
        self.offset = self.first_block;
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Continue from `offset` on the next call, typically the end of a frame's data
    pub fn resume_at(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Find the next image descriptor along with the control block that precedes it.
    ///
    /// On success the scanner sits on the frame's compressed data; hitting the trailer first
    /// yields [`GifError::EmptyFrame`].
    pub fn next_frame(&mut self, source: &mut dyn ByteSource) -> Result<ScannedFrame, GifError> {
        let mut cursor = ByteCursor::new(source, self.offset);
        let mut control: Option<GraphicsControl> = None;

        loop {
            let Some(block) = next_block(&mut cursor)? else {
                continue;
            };
            match block {
                Block::Image => {
                    let descriptor = ImageDescriptor::parse(&mut cursor)?;
                    self.offset = cursor.get_offset();
                    return Ok(ScannedFrame {
                        descriptor,
                        control: control.unwrap_or_default(),
                        data_offset: self.offset,
                    });
                }
                Block::Extension => match ExtensionLabel::from_u8(cursor.take_byte()?) {
                    ExtensionLabel::Graphics => {
                        control = Some(GraphicsControl::parse(&mut cursor)?)
                    }
                    _ => cursor.skip_sub_blocks()?,
                },
                Block::Trailer => {
                    self.offset = cursor.get_offset() - 1;
                    return Err(GifError::EmptyFrame);
                }
            }
        }
    }
}

/// Read the next block label. Stray zero bytes between blocks are tolerated and yield `None`.
fn next_block(cursor: &mut ByteCursor<'_>) -> Result<Option<Block>, GifError> {
    match cursor.take_byte()? {
        0 => Ok(None),
        byte => Block::from_u8(byte).map(Some),
    }
}

/// Parse an application extension after its label, returning the loop count if it is one of
/// the looping extensions.
fn parse_application(cursor: &mut ByteCursor<'_>) -> Result<Option<u16>, GifError> {
    let len = cursor.take_byte()?;
    let mut ident = [0u8; 11];
    if len as usize == ident.len() {
        cursor.take_into(&mut ident)?;
    } else {
        cursor.seek_by(len.into());
    }
    let loops = len == 11 && (&ident == b"NETSCAPE2.0" || &ident == b"ANIMEXTS1.0");

    let mut loop_count = None;
    let mut data = [0u8; 255];
    loop {
        let sub_len = cursor.take_byte()? as usize;
        if sub_len == 0 {
            return Ok(loop_count);
        }
        cursor.take_into(&mut data[..sub_len])?;
        if loops && sub_len >= 3 && data[0] == 1 {
            loop_count = Some(u16::from_le_bytes([data[1], data[2]]));
        }
    }
}
