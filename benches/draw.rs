use std::borrow::Cow;

use animgif::{AnimatedGif, DecoderConfig, DrawTargetSink, PixelFormat};
use criterion::{criterion_group, criterion_main, Criterion};
use embedded_graphics::{
    image::Image,
    pixelcolor::{Rgb565, Rgb888},
    prelude::*,
};

const SIZE: u16 = 240;
const FRAMES: u16 = 8;

// TODO: use e-g framebuffer when it's added
struct Framebuffer<C, const WIDTH: usize, const HEIGHT: usize> {
    pixels: Vec<[C; WIDTH]>,
}

impl<C: RgbColor, const WIDTH: usize, const HEIGHT: usize> Framebuffer<C, WIDTH, HEIGHT> {
    pub fn new() -> Self {
        Self {
            pixels: vec![[C::BLACK; WIDTH]; HEIGHT],
        }
    }
}

impl<C: RgbColor, const WIDTH: usize, const HEIGHT: usize> DrawTarget
    for Framebuffer<C, WIDTH, HEIGHT>
{
    type Error = std::convert::Infallible;
    type Color = C;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<C>>,
    {
        for Pixel(p, c) in pixels {
            self.pixels[p.y as usize][p.x as usize] = c;
        }

        Ok(())
    }
}

impl<C, const WIDTH: usize, const HEIGHT: usize> OriginDimensions
    for Framebuffer<C, WIDTH, HEIGHT>
{
    fn size(&self) -> embedded_graphics::prelude::Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

/// A full screen first frame followed by moving stripes over a shrinking window
fn stripes() -> Vec<u8> {
    let palette: Vec<u8> = (0..16u8)
        .flat_map(|i| [i * 16, 255 - i * 16, i * 8])
        .collect();
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, SIZE, SIZE, &palette).unwrap();
        encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        for k in 0..FRAMES {
            let inset = if k == 0 { 0 } else { k * 8 };
            let side = SIZE - 2 * inset;
            let pixels: Vec<u8> = (0..side)
                .flat_map(|y| (0..side).map(move |x| (((x + y + k * 8) / 16) % 16) as u8))
                .collect();
            let mut frame = gif::Frame::default();
            frame.left = inset;
            frame.top = inset;
            frame.width = side;
            frame.height = side;
            frame.delay = 4;
            frame.dispose = if k % 2 == 0 {
                gif::DisposalMethod::Keep
            } else {
                gif::DisposalMethod::Background
            };
            frame.buffer = Cow::Owned(pixels);
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

fn play_through(gif: &mut AnimatedGif<'_>) {
    for _ in 0..gif.frame_count() {
        gif.next_frame(false).unwrap();
    }
    gif.reset()
}

fn playback_benchmarks(c: &mut Criterion) {
    let bytes = stripes();

    for (name, format) in [
        ("playback_rgb565", PixelFormat::Rgb565Le),
        ("playback_rgb888", PixelFormat::Rgb888),
        ("playback_mono", PixelFormat::Mono1),
    ] {
        c.bench_function(name, |b| {
            let mut gif = AnimatedGif::new(DecoderConfig::default().with_pixel_format(format));
            gif.load_from_memory(&bytes).unwrap();
            b.iter(|| play_through(&mut gif))
        });
    }

    c.bench_function("playback_pixel_sink", |b| {
        let mut fb = Framebuffer::<Rgb565, 240, 240>::new();
        let mut gif = AnimatedGif::new(DecoderConfig::default());
        gif.set_pixel_sink(DrawTargetSink::new(&mut fb));
        gif.load_from_memory(&bytes).unwrap();
        b.iter(|| play_through(&mut gif))
    });

    c.bench_function("drawing_rgb888_buffer", |b| {
        let mut fb = Framebuffer::<Rgb888, 240, 240>::new();
        let mut gif = AnimatedGif::new(DecoderConfig::default().with_pixel_format(PixelFormat::Rgb888));
        gif.load_from_memory(&bytes).unwrap();
        b.iter(|| {
            for _ in 0..gif.frame_count() {
                gif.next_frame(false).unwrap();
                Image::new(&gif, Point::zero()).draw(&mut fb).unwrap();
            }
            gif.reset()
        })
    });
}

criterion_group!(benches, playback_benchmarks);
criterion_main!(benches);
