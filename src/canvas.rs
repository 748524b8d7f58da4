//! The canvas the frames of an animation are composited onto.
//!
//! Two equally sized buffers live here: `current`, what is on screen, and `previous`, a
//! snapshot kept for frames that ask to be undone once their display time is over. Both are
//! always (re)allocated together from the same size and pixel format, so their strides can't
//! drift apart. A third buffer holds one palette index per canvas pixel: the part of the frame
//! being decoded that is actually visible. However large a frame claims to be, it never needs
//! more than that.

use alloc::vec::Vec;
use core::ops::Range;

use embedded_graphics::{
    pixelcolor::{Rgb565, Rgb888},
    prelude::{Point, RgbColor, Size},
    primitives::Rectangle,
};

use crate::{
    common::{DisposalMethod, GifError},
    frame::{FrameLayout, FrameWindow},
    header::ColorTable,
    memory::BufferAllocator,
    pixel::{rgb565, PixelFormat},
};

/// Receives every canvas pixel that changes while a frame is composited.
pub trait PixelSink {
    fn pixel(&mut self, point: Point, color: Rgb565);
}

impl<F> PixelSink for F
where
    F: FnMut(Point, Rgb565),
{
    fn pixel(&mut self, point: Point, color: Rgb565) {
        self(point, color)
    }
}

/// Sink that throws everything away
pub(crate) struct Discard;

impl PixelSink for Discard {
    fn pixel(&mut self, _point: Point, _color: Rgb565) {}
}

/// One decoded frame, ready to be drawn
pub(crate) struct Layer<'a> {
    pub area: Rectangle,
    pub disposal: DisposalMethod,
    pub transparent_idx: Option<u8>,
    /// Local table if the frame has one, the global table otherwise
    pub palette: Option<&'a ColorTable>,
    /// Where the decoded indices sit in the canvas' index buffer
    pub layout: FrameLayout,
    /// Stream positions the frame's data covered
    pub written: usize,
}

pub struct Canvas {
    size: Size,
    format: PixelFormat,
    allocated: bool,
    current: Vec<u8>,
    previous: Vec<u8>,
    /// Visible palette indices of the frame being decoded
    indices: Vec<u8>,
    /// Disposal owed by the last drawn frame, applied right before the next one
    pending: Option<(DisposalMethod, Rectangle)>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::empty()
    }
}

impl Canvas {
    pub const fn empty() -> Self {
        Self {
            size: Size::zero(),
            format: PixelFormat::Rgb565Le,
            allocated: false,
            current: Vec::new(),
            previous: Vec::new(),
            indices: Vec::new(),
            pending: None,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Whether the buffers already fit a canvas of `size` in `format`
    pub fn matches(&self, size: Size, format: PixelFormat) -> bool {
        self.allocated && self.size == size && self.format == format
    }

    /// Replace all buffers with zeroed ones for `size` and `format`. On failure nothing stays
    /// allocated.
    pub(crate) fn allocate(
        &mut self,
        allocator: &mut dyn BufferAllocator,
        size: Size,
        format: PixelFormat,
    ) -> Result<(), GifError> {
        self.release(allocator);
        let len = format.buffer_len(size.width as usize, size.height as usize);
        let pixels = size.width as usize * size.height as usize;
        let current = allocator.allocate(len)?;
        let previous = match allocator.allocate(len) {
            Ok(previous) => previous,
            Err(err) => {
                allocator.release(current);
                return Err(err);
            }
        };
        let indices = match allocator.allocate(pixels) {
            Ok(indices) => indices,
            Err(err) => {
                allocator.release(current);
                allocator.release(previous);
                return Err(err);
            }
        };
        log::debug!(
            "canvas {}x{} {:?}: 2 x {} bytes, {} indices",
            size.width,
            size.height,
            format,
            len,
            pixels
        );
        self.size = size;
        self.format = format;
        self.current = current;
        self.previous = previous;
        self.indices = indices;
        self.allocated = true;
        Ok(())
    }

    /// Hand every buffer back to `allocator`
    pub(crate) fn release(&mut self, allocator: &mut dyn BufferAllocator) {
        if self.allocated {
            allocator.release(core::mem::take(&mut self.current));
            allocator.release(core::mem::take(&mut self.previous));
            allocator.release(core::mem::take(&mut self.indices));
        }
        *self = Self::empty();
    }

    /// Zero both buffers and forget any pending disposal
    pub(crate) fn clear(&mut self) {
        self.current.fill(0);
        self.previous.fill(0);
        self.pending = None;
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The visible canvas, `format.row_stride(width)` bytes per row
    pub fn pixels(&self) -> &[u8] {
        &self.current
    }

    /// The snapshot kept for [`DisposalMethod::RestorePrevious`]
    pub fn snapshot(&self) -> &[u8] {
        &self.previous
    }

    /// Color of the pixel at `point`, which has to lie on the canvas
    pub fn color_at(&self, point: Point) -> Rgb888 {
        self.format.read(
            &self.current,
            self.size.width as usize,
            point.x as usize,
            point.y as usize,
        )
    }

    /// Columns and rows of `area` that are on the canvas
    fn clip(&self, area: Rectangle) -> (Range<usize>, Range<usize>) {
        let span = |start: i32, len: u32, max: u32| {
            let end = (i64::from(start) + i64::from(len)).clamp(0, i64::from(max)) as usize;
            let start = i64::from(start).clamp(0, i64::from(max)) as usize;
            start..end
        };
        (
            span(area.top_left.x, area.size.width, self.size.width),
            span(area.top_left.y, area.size.height, self.size.height),
        )
    }

    /// How a frame covering `area` maps onto the canvas
    pub(crate) fn layout(&self, area: Rectangle, interlaced: bool) -> FrameLayout {
        let (columns, rows) = self.clip(area);
        let local = |range: Range<usize>, origin: i32| {
            let shift = |at: usize| (at as i64 - i64::from(origin)) as usize;
            shift(range.start)..shift(range.end)
        };
        FrameLayout {
            width: area.size.width as usize,
            height: area.size.height as usize,
            interlaced,
            columns: local(columns, area.top_left.x),
            rows: local(rows, area.top_left.y),
        }
    }

    /// Decoding target for a frame laid out by [`Canvas::layout`]
    pub(crate) fn window<'l>(&'l mut self, layout: &'l FrameLayout) -> FrameWindow<'l> {
        FrameWindow::new(layout, &mut self.indices[..layout.visible_len()])
    }

    fn put<S: PixelSink + ?Sized>(&mut self, x: usize, y: usize, color: Rgb888, sink: &mut S) {
        self.format
            .write(&mut self.current, self.size.width as usize, x, y, color);
        sink.pixel(Point::new(x as i32, y as i32), rgb565(color));
    }

    fn fill<S: PixelSink + ?Sized>(&mut self, area: Rectangle, color: Rgb888, sink: &mut S) {
        let (columns, rows) = self.clip(area);
        for y in rows {
            for x in columns.clone() {
                self.put(x, y, color, sink);
            }
        }
    }

    fn restore_previous<S: PixelSink + ?Sized>(&mut self, area: Rectangle, sink: &mut S) {
        self.current.copy_from_slice(&self.previous);
        let (columns, rows) = self.clip(area);
        for y in rows {
            for x in columns.clone() {
                let color = self.color_at(Point::new(x as i32, y as i32));
                sink.pixel(Point::new(x as i32, y as i32), rgb565(color));
            }
        }
    }

    /// Dispose of the previously drawn frame, snapshot if the new frame wants to be undone
    /// later, then draw it. `background` is what [`DisposalMethod::RestoreBackground`] clears to.
    pub(crate) fn compose<S: PixelSink + ?Sized>(
        &mut self,
        layer: &Layer<'_>,
        background: Rgb888,
        sink: &mut S,
    ) {
        match self.pending.take() {
            Some((DisposalMethod::RestoreBackground, area)) => self.fill(area, background, sink),
            Some((DisposalMethod::RestorePrevious, area)) => self.restore_previous(area, sink),
            _ => {}
        }

        if layer.disposal == DisposalMethod::RestorePrevious {
            self.previous.copy_from_slice(&self.current);
        }

        let layout = &layer.layout;
        let hidden = u64::from(layer.area.size.width) * u64::from(layer.area.size.height)
            - layout.visible_len() as u64;
        if hidden > 0 {
            log::warn!("{} pixels of the frame fall outside the canvas", hidden);
        }

        let origin = layer.area.top_left;
        let stride = layout.columns.len();
        let indices = core::mem::take(&mut self.indices);
        for (line, row) in layout.rows.clone().enumerate() {
            let decoded = layout.decoded_in_row(row, layer.written);
            let y = (i64::from(origin.y) + row as i64) as usize;
            let start = line * stride;
            for (offset, index) in indices[start..start + decoded].iter().enumerate() {
                if layer.transparent_idx == Some(*index) {
                    continue;
                }
                let x = (i64::from(origin.x) + (layout.columns.start + offset) as i64) as usize;
                let color = layer
                    .palette
                    .and_then(|palette| palette.get(*index))
                    .unwrap_or(Rgb888::BLACK);
                self.put(x, y, color, sink);
            }
        }
        self.indices = indices;

        self.pending = Some((layer.disposal, layer.area));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lzw::IndexSink;
    use crate::memory::{HeapAllocator, MemoryBudget};
    use std::{vec, vec::Vec};

    const RED: [u8; 3] = [0xff, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 0xff];
    const WHITE: [u8; 3] = [0xff, 0xff, 0xff];

    fn canvas(width: u32, height: u32) -> Canvas {
        let mut canvas = Canvas::empty();
        canvas
            .allocate(&mut HeapAllocator, Size::new(width, height), PixelFormat::Rgb888)
            .unwrap();
        canvas
    }

    /// Feed `indices`, the frame's pixels in row order, through the canvas' decoding window
    fn layer<'a>(
        canvas: &mut Canvas,
        palette: &'a ColorTable,
        area: Rectangle,
        indices: &[u8],
        disposal: DisposalMethod,
    ) -> Layer<'a> {
        let layout = canvas.layout(area, false);
        let mut window = canvas.window(&layout);
        let written = indices.len().min(window.capacity());
        for (pos, index) in indices.iter().take(written).enumerate() {
            window.put(pos, *index);
        }
        Layer {
            area,
            disposal,
            transparent_idx: None,
            palette: Some(palette),
            layout,
            written,
        }
    }

    fn rect(x: i32, y: i32, w: u32, h: u32) -> Rectangle {
        Rectangle::new(Point::new(x, y), Size::new(w, h))
    }

    fn rgb(canvas: &Canvas) -> Vec<[u8; 3]> {
        canvas
            .pixels()
            .chunks(3)
            .map(|px| [px[0], px[1], px[2]])
            .collect()
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let mut canvas = Canvas::empty();
        // 3x3 rgb888 needs 27 bytes per buffer plus 9 indices
        for capacity in [20, 40, 60] {
            let mut budget = MemoryBudget::new(capacity);
            assert_eq!(
                canvas.allocate(&mut budget, Size::new(3, 3), PixelFormat::Rgb888),
                Err(GifError::OutOfMemory)
            );
            assert_eq!(budget.used(), 0);
            assert!(!canvas.is_allocated());
        }

        let mut budget = MemoryBudget::new(63);
        canvas
            .allocate(&mut budget, Size::new(3, 3), PixelFormat::Rgb888)
            .unwrap();
        assert!(canvas.matches(Size::new(3, 3), PixelFormat::Rgb888));
        assert!(!canvas.matches(Size::new(3, 3), PixelFormat::Gray8));
        canvas.release(&mut budget);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn restore_background_clears_the_old_rectangle() {
        let palette = ColorTable::from_rgb(&[WHITE, RED, BLUE]);
        let mut canvas = canvas(3, 3);

        let first = layer(
            &mut canvas,
            &palette,
            rect(0, 0, 2, 2),
            &[1; 4],
            DisposalMethod::RestoreBackground,
        );
        canvas.compose(&first, Rgb888::new(1, 2, 3), &mut Discard);
        let second = layer(&mut canvas, &palette, rect(1, 1, 1, 1), &[2], DisposalMethod::None);
        canvas.compose(&second, Rgb888::new(1, 2, 3), &mut Discard);

        let bg = [1, 2, 3];
        let zero = [0, 0, 0];
        assert_eq!(
            rgb(&canvas),
            [bg, bg, zero, bg, BLUE, zero, zero, zero, zero]
        );
    }

    #[test]
    fn restore_previous_undoes_the_frame() {
        let palette = ColorTable::from_rgb(&[WHITE, RED, BLUE, [0, 0, 0]]);
        let mut canvas = canvas(3, 3);

        let base = layer(&mut canvas, &palette, rect(0, 0, 3, 3), &[2; 9], DisposalMethod::None);
        canvas.compose(&base, Rgb888::BLACK, &mut Discard);
        let before = canvas.pixels().to_vec();

        let undone = layer(
            &mut canvas,
            &palette,
            rect(0, 0, 2, 2),
            &[1; 4],
            DisposalMethod::RestorePrevious,
        );
        canvas.compose(&undone, Rgb888::BLACK, &mut Discard);
        assert_eq!(canvas.snapshot(), &before[..]);
        assert_ne!(canvas.pixels(), &before[..]);

        let mut changed = Vec::new();
        let mut sink = |point: Point, color: Rgb565| changed.push((point, color));
        let corner = layer(&mut canvas, &palette, rect(2, 2, 1, 1), &[0], DisposalMethod::None);
        canvas.compose(&corner, Rgb888::BLACK, &mut sink);
        let mut expected = before.clone();
        expected[24..27].copy_from_slice(&WHITE);
        assert_eq!(canvas.pixels(), &expected[..]);
        // four restored pixels, then the new one
        assert_eq!(changed.len(), 5);
        assert_eq!(changed[4], (Point::new(2, 2), Rgb565::WHITE));
    }

    #[test]
    fn transparent_pixels_keep_what_was_there() {
        let palette = ColorTable::from_rgb(&[WHITE, RED]);
        let mut canvas = canvas(2, 1);
        let base = layer(&mut canvas, &palette, rect(0, 0, 2, 1), &[1, 1], DisposalMethod::None);
        canvas.compose(&base, Rgb888::BLACK, &mut Discard);
        let mut top = layer(&mut canvas, &palette, rect(0, 0, 2, 1), &[0, 1], DisposalMethod::None);
        top.transparent_idx = Some(1);
        canvas.compose(&top, Rgb888::BLACK, &mut Discard);
        assert_eq!(rgb(&canvas), [WHITE, RED]);
    }

    #[test]
    fn frames_are_clipped_to_the_canvas() {
        let palette = ColorTable::from_rgb(&[WHITE, RED]);
        let mut canvas = canvas(2, 2);
        let mut count = 0;
        let mut sink = |_: Point, _: Rgb565| count += 1;
        let corner = layer(
            &mut canvas,
            &palette,
            rect(1, 1, 2, 2),
            &[1; 4],
            DisposalMethod::RestoreBackground,
        );
        assert_eq!(corner.layout.columns, 0..1);
        assert_eq!(corner.layout.rows, 0..1);
        canvas.compose(&corner, Rgb888::BLACK, &mut sink);
        assert_eq!(count, 1);
        assert_eq!(rgb(&canvas), [[0; 3], [0; 3], [0; 3], RED]);
    }

    #[test]
    fn huge_frames_only_need_a_canvas_sized_window() {
        let palette = ColorTable::from_rgb(&[WHITE, RED]);
        let mut canvas = canvas(2, 2);
        let layout = canvas.layout(rect(0, 0, 60_000, 60_000), false);
        assert_eq!(layout.visible_len(), 4);
        // rows under the canvas are never decoded
        assert_eq!(layout.stream_len(), 120_000);

        // a single decoded row: the second canvas row keeps what it had
        let mut row = vec![0; 60_000];
        row[1] = 1;
        let huge = layer(
            &mut canvas,
            &palette,
            rect(0, 0, 60_000, 60_000),
            &row,
            DisposalMethod::None,
        );
        canvas.compose(&huge, Rgb888::BLACK, &mut Discard);
        assert_eq!(rgb(&canvas), [WHITE, RED, [0; 3], [0; 3]]);
    }

    #[test]
    fn out_of_range_indices_draw_black() {
        let palette = ColorTable::from_rgb(&[WHITE, RED]);
        let mut canvas = canvas(1, 1);
        canvas.current.fill(0x55);
        let stray = layer(&mut canvas, &palette, rect(0, 0, 1, 1), &[7], DisposalMethod::None);
        canvas.compose(&stray, Rgb888::BLACK, &mut Discard);
        assert_eq!(canvas.pixels(), &[0, 0, 0]);
    }

    #[test]
    fn clear_zeroes_and_forgets_disposal() {
        let palette = ColorTable::from_rgb(&[WHITE, RED]);
        let mut canvas = canvas(1, 1);
        let first = layer(
            &mut canvas,
            &palette,
            rect(0, 0, 1, 1),
            &[1],
            DisposalMethod::RestoreBackground,
        );
        canvas.compose(&first, Rgb888::BLACK, &mut Discard);
        canvas.clear();
        assert_eq!(canvas.pixels(), vec![0; 3]);
        let empty = layer(&mut canvas, &palette, rect(0, 0, 0, 0), &[], DisposalMethod::None);
        canvas.compose(&empty, Rgb888::WHITE, &mut Discard);
        // nothing pending, so the white background was never painted
        assert_eq!(canvas.pixels(), vec![0; 3]);
    }
}
