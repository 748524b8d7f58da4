//! A small animated gif player, primarily for embedded, no-std environments but usable anywhere.
//!
//! Frames are decoded one at a time onto a canvas kept in the pixel format the display wants
//! (RGB565 in either byte order, RGB888, ARGB8888, 8-bit gray or 1-bit mono), with frame
//! disposal and transparency handled between frames. The canvas can be read directly, pushed
//! to a [`FrameSink`] or [`PixelSink`] as frames are produced, or drawn onto any
//! [`embedded_graphics`] [`DrawTarget`] through [`ImageDrawable`].
//!
//! ```
//! use animgif::{AnimatedGif, DecoderConfig, GifError, PixelFormat};
//!
//! fn play(bytes: &[u8], show: impl Fn(&[u8])) -> Result<(), GifError> {
//!     let config = DecoderConfig::default()
//!         .with_pixel_format(PixelFormat::Rgb565Be)
//!         .with_looping(false);
//!     let mut gif = AnimatedGif::new(config);
//!     gif.load_from_memory(bytes)?;
//!     loop {
//!         match gif.next_frame(true) {
//!             Ok(_) => show(gif.canvas().pixels()),
//!             Err(GifError::EmptyFrame) => return Ok(()),
//!             Err(err) => return Err(err),
//!         }
//!     }
//! }
//! ```
//!
//! Gifs that don't fit in memory can be pulled from anywhere through a [`ByteSource`]; large
//! buffers are taken from a [`BufferAllocator`] picked at construction.
//!
//! <!-- README-LINKS
//! [`embedded_graphics`]: https://docs.rs/embedded_graphics
//! [`DrawTarget`]: https://docs.rs/embedded-graphics/latest/embedded_graphics/draw_target/trait.DrawTarget.html
//! README-LINKS -->
//!
//! [`DrawTarget`]: embedded_graphics::draw_target::DrawTarget
//! [`ImageDrawable`]: embedded_graphics::image::ImageDrawable

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use embedded_graphics::{
    pixelcolor::Rgb888,
    prelude::*,
    primitives::Rectangle,
};

mod canvas;
mod common;
mod decoder;
mod frame;
mod header;
mod lzw;
mod memory;
mod pixel;
mod scanner;
mod source;
#[cfg(test)]
mod test_utils;

pub use canvas::{Canvas, PixelSink};
pub use common::{DisposalMethod, GifError, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH};
#[cfg(feature = "std")]
pub use decoder::ThreadSleep;
pub use decoder::{
    AnimatedGif, DecoderConfig, DrawTargetSink, FrameDelay, FrameInfo, FrameSink, GifInfo,
    NoDelay, PlaybackState, MAX_SCALE, MIN_SCALE,
};
pub use header::{Version, MIN_DELAY_MS};
pub use memory::{BufferAllocator, HeapAllocator, MemoryBudget, Preferring};
pub use pixel::PixelFormat;
pub use source::{ByteSource, FnSource, MemorySource};

impl ImageDrawable for AnimatedGif<'_> {
    type Color = Rgb888;

    fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let canvas = self.canvas();
        let area = Rectangle::new(Point::zero(), canvas.size());
        target.fill_contiguous(&area, area.points().map(|p| canvas.color_at(p)))
    }

    fn draw_sub_image<D>(&self, target: &mut D, area: &Rectangle) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Self::Color>,
    {
        let canvas = self.canvas();
        let bounds = Rectangle::new(Point::zero(), canvas.size());
        target.draw_iter(
            area.points()
                .filter(|p| bounds.contains(*p))
                .map(|p| Pixel(p, canvas.color_at(p))),
        )
    }
}

impl OriginDimensions for AnimatedGif<'_> {
    fn size(&self) -> Size {
        self.canvas().size()
    }
}
