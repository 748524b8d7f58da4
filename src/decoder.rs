//! Playback of a loaded gif, one frame per [`AnimatedGif::next_frame`] call.

use alloc::boxed::Box;

use embedded_graphics::{
    draw_target::DrawTarget,
    pixelcolor::Rgb565,
    prelude::{Point, Size},
    primitives::Rectangle,
    Pixel,
};

use crate::{
    canvas::{Canvas, Discard, Layer, PixelSink},
    common::{DisposalMethod, GifError, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH},
    frame::decode_frame_data,
    header::{Header, Version, HEADER_LEN},
    lzw::LzwDecoder,
    memory::{BufferAllocator, HeapAllocator},
    pixel::PixelFormat,
    scanner::{FrameScanner, StreamSummary},
    source::{ByteCursor, ByteSource, MemorySource},
};

/// Smallest scale factor accepted by [`AnimatedGif::set_scale`]
pub const MIN_SCALE: f32 = 0.1;
/// Largest scale factor accepted by [`AnimatedGif::set_scale`]
pub const MAX_SCALE: f32 = 10.0;

/// Construction time settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    pub pixel_format: PixelFormat,
    /// Gifs with a larger canvas are refused with [`GifError::FileTooWide`]
    pub max_size: Size,
    /// Start over after the last frame instead of reporting [`GifError::EmptyFrame`]
    pub looping: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::default(),
            max_size: Size::new(DEFAULT_MAX_WIDTH.into(), DEFAULT_MAX_HEIGHT.into()),
            looping: true,
        }
    }
}

impl DecoderConfig {
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_max_size(mut self, max_size: Size) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

/// Where the decoder is in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlaybackState {
    /// Nothing loaded
    Unloaded,
    /// Header parsed, no frame decoded yet
    HeaderParsed,
    /// Looking for the next frame
    BetweenFrames,
    /// A frame's data is being decompressed
    DecodingFrame,
    /// The canvas holds a finished frame
    FrameReady,
    /// Every frame was played and looping is off
    Complete,
}

/// Facts about the whole stream, available right after loading.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GifInfo {
    pub version: Version,
    pub width: u16,
    pub height: u16,
    pub frame_count: u16,
    /// Sum of all frame delays
    pub total_duration_ms: u32,
    /// Repetitions requested by the stream, `Some(0)` meaning forever
    pub loop_count: Option<u16>,
    /// First transparent index any frame declares
    pub transparent_idx: Option<u8>,
    pub background_index: u8,
    /// Pixel aspect ratio byte of the screen descriptor, 0 when unspecified
    pub aspect_ratio: u8,
    pub has_global_table: bool,
}

/// Facts about the frame that was decoded last.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameInfo {
    /// Zero based position in the stream
    pub index: u16,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub delay_ms: u32,
    pub disposal: DisposalMethod,
    pub interlaced: bool,
    pub transparent_idx: Option<u8>,
    pub has_local_table: bool,
    /// The frame asks to wait for user input before moving on
    pub user_input: bool,
}

/// Receives the whole canvas every time a frame has been composited.
///
/// `pixels` is laid out in the decoder's [`PixelFormat`], `row_stride(width)` bytes per row.
pub trait FrameSink {
    fn frame(&mut self, area: Rectangle, pixels: &[u8]);
}

impl<F> FrameSink for F
where
    F: FnMut(Rectangle, &[u8]),
{
    fn frame(&mut self, area: Rectangle, pixels: &[u8]) {
        self(area, pixels)
    }
}

/// Feeds changed pixels straight into an embedded-graphics [`DrawTarget`].
pub struct DrawTargetSink<'d, D> {
    target: &'d mut D,
    failed: bool,
}

impl<'d, D> DrawTargetSink<'d, D>
where
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(target: &'d mut D) -> Self {
        Self {
            target,
            failed: false,
        }
    }

    /// Whether the target ever reported an error
    pub fn failed(&self) -> bool {
        self.failed
    }
}

impl<D> PixelSink for DrawTargetSink<'_, D>
where
    D: DrawTarget<Color = Rgb565>,
{
    fn pixel(&mut self, point: Point, color: Rgb565) {
        if self
            .target
            .draw_iter(core::iter::once(Pixel(point, color)))
            .is_err()
        {
            self.failed = true;
        }
    }
}

/// Waits out a frame's delay when playback is synchronous.
pub trait FrameDelay {
    fn wait(&mut self, delay_ms: u32);
}

impl<F> FrameDelay for F
where
    F: FnMut(u32),
{
    fn wait(&mut self, delay_ms: u32) {
        self(delay_ms)
    }
}

/// Returns immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl FrameDelay for NoDelay {
    fn wait(&mut self, _delay_ms: u32) {}
}

/// Puts the calling thread to sleep
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

#[cfg(feature = "std")]
impl FrameDelay for ThreadSleep {
    fn wait(&mut self, delay_ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(delay_ms.into()))
    }
}

#[cfg(feature = "std")]
fn default_delay<'a>() -> Box<dyn FrameDelay + 'a> {
    Box::new(ThreadSleep)
}

#[cfg(not(feature = "std"))]
fn default_delay<'a>() -> Box<dyn FrameDelay + 'a> {
    Box::new(NoDelay)
}

/// Where the gif bytes come from
enum Input<'a> {
    /// Copied into a buffer from the decoder's allocator
    Memory(MemorySource),
    Reader(Box<dyn ByteSource + 'a>),
}

impl<'a> Input<'a> {
    fn as_source(&mut self) -> &mut (dyn ByteSource + 'a) {
        match self {
            Input::Memory(memory) => memory,
            Input::Reader(reader) => reader.as_mut(),
        }
    }

    fn release(self, allocator: &mut dyn BufferAllocator) {
        if let Input::Memory(memory) = self {
            allocator.release(memory.into_inner());
        }
    }
}

/// Animated gif player.
///
/// ```
/// use animgif::{AnimatedGif, DecoderConfig, PixelFormat};
///
/// # fn play(bytes: &[u8]) -> Result<(), animgif::GifError> {
/// let mut gif = AnimatedGif::new(DecoderConfig::default().with_pixel_format(PixelFormat::Rgb888));
/// let info = gif.load_from_memory(bytes)?;
/// for _ in 0..info.frame_count {
///     gif.next_frame(false)?;
///     let _rgb = gif.canvas().pixels();
/// }
/// # Ok(())
/// # }
/// ```
pub struct AnimatedGif<'a> {
    config: DecoderConfig,
    allocator: Box<dyn BufferAllocator + 'a>,
    delay: Box<dyn FrameDelay + 'a>,
    frame_sink: Option<Box<dyn FrameSink + 'a>>,
    pixel_sink: Option<Box<dyn PixelSink + 'a>>,

    input: Option<Input<'a>>,
    header: Option<Header>,
    summary: StreamSummary,
    scanner: FrameScanner,
    lzw: Option<LzwDecoder>,
    canvas: Canvas,

    state: PlaybackState,
    last_error: Option<GifError>,
    current_frame: u16,
    frame_info: Option<FrameInfo>,
    display_size: Option<Size>,
    scale: f32,
}

impl<'a> AnimatedGif<'a> {
    /// A decoder that takes its buffers from the global allocator
    pub fn new(config: DecoderConfig) -> Self {
        Self::with_allocator(config, HeapAllocator)
    }

    pub fn with_allocator(config: DecoderConfig, allocator: impl BufferAllocator + 'a) -> Self {
        Self {
            config,
            allocator: Box::new(allocator),
            delay: default_delay(),
            frame_sink: None,
            pixel_sink: None,
            input: None,
            header: None,
            summary: StreamSummary::default(),
            scanner: FrameScanner::new(HEADER_LEN),
            lzw: None,
            canvas: Canvas::empty(),
            state: PlaybackState::Unloaded,
            last_error: None,
            current_frame: 0,
            frame_info: None,
            display_size: None,
            scale: 1.0,
        }
    }

    /// Copy `data` into decoder owned memory and parse it.
    pub fn load_from_memory(&mut self, data: &[u8]) -> Result<GifInfo, GifError> {
        self.unload();
        let loaded = self.copy_in(data).and_then(|input| self.install(input));
        self.record(loaded)
    }

    /// Parse a gif that is pulled from `source` on demand.
    pub fn load(&mut self, source: impl ByteSource + 'a) -> Result<GifInfo, GifError> {
        self.unload();
        let mut source = source;
        let mut head = [0u8; HEADER_LEN as usize];
        let loaded = if source.read_at(&mut head, 0) {
            self.install(Input::Reader(Box::new(source)))
        } else {
            Err(GifError::FileNotFound)
        };
        self.record(loaded)
    }

    fn copy_in(&mut self, data: &[u8]) -> Result<Input<'a>, GifError> {
        if data.is_empty() {
            return Err(GifError::InvalidParameter);
        }
        if data.len() < HEADER_LEN as usize {
            return Err(GifError::EarlyEof);
        }
        if &data[..6] != b"GIF89a" && &data[..6] != b"GIF87a" {
            return Err(GifError::BadFileFormat);
        }
        let mut raw = self.allocator.allocate(data.len())?;
        raw.copy_from_slice(data);
        Ok(Input::Memory(MemorySource::new(raw)))
    }

    fn install(&mut self, mut input: Input<'a>) -> Result<GifInfo, GifError> {
        match self.open(&mut input) {
            Ok(()) => {
                self.input = Some(input);
                self.state = PlaybackState::HeaderParsed;
                self.info().ok_or(GifError::UnknownError)
            }
            Err(err) => {
                input.release(&mut *self.allocator);
                self.canvas.release(&mut *self.allocator);
                self.header = None;
                Err(err)
            }
        }
    }

    fn open(&mut self, input: &mut Input<'a>) -> Result<(), GifError> {
        let mut cursor = ByteCursor::new(input.as_source(), 0);
        let header = Header::parse(&mut cursor, self.config.max_size)?;
        cursor.seek_to(header.blocks_offset);
        let summary = StreamSummary::scan(&mut cursor);

        if self.lzw.is_none() {
            self.lzw = Some(LzwDecoder::new()?);
        }
        self.canvas
            .allocate(&mut *self.allocator, header.size(), self.config.pixel_format)?;

        log::debug!(
            "loaded {}x{} gif: {} frames, {}ms",
            header.width,
            header.height,
            summary.frame_count,
            summary.total_duration_ms
        );
        self.scanner = FrameScanner::new(header.blocks_offset);
        self.summary = summary;
        self.header = Some(header);
        Ok(())
    }

    /// Drop the loaded gif and hand every buffer back to the allocator.
    pub fn unload(&mut self) {
        if let Some(input) = self.input.take() {
            input.release(&mut *self.allocator);
        }
        self.canvas.release(&mut *self.allocator);
        self.header = None;
        self.summary = StreamSummary::default();
        self.scanner = FrameScanner::new(HEADER_LEN);
        self.state = PlaybackState::Unloaded;
        self.last_error = None;
        self.current_frame = 0;
        self.frame_info = None;
    }

    fn record<T>(&mut self, result: Result<T, GifError>) -> Result<T, GifError> {
        if let Err(err) = &result {
            log::debug!("gif error: {}", err);
            self.last_error = Some(*err);
        }
        result
    }

    /// Go back to the first frame with a blank canvas. Also clears [`AnimatedGif::last_error`].
    pub fn reset(&mut self) {
        self.scanner.rewind();
        self.canvas.clear();
        self.current_frame = 0;
        self.frame_info = None;
        self.last_error = None;
        self.state = if self.header.is_some() {
            PlaybackState::HeaderParsed
        } else {
            PlaybackState::Unloaded
        };
    }

    /// Decode and composite the next frame.
    ///
    /// Past the last frame playback starts over if looping is on; otherwise the decoder becomes
    /// [`PlaybackState::Complete`] and [`GifError::EmptyFrame`] is returned. With `sync` set the
    /// call doesn't return before the frame's delay has passed.
    pub fn next_frame(&mut self, sync: bool) -> Result<FrameInfo, GifError> {
        if let Some(err) = self.last_error {
            return Err(err);
        }
        if self.header.is_none() {
            return Err(GifError::InvalidParameter);
        }
        if self.summary.frame_count == 0 {
            self.state = PlaybackState::Complete;
            return Err(GifError::EmptyFrame);
        }
        if self.current_frame >= self.summary.frame_count {
            if !self.config.looping {
                self.state = PlaybackState::Complete;
                return Err(GifError::EmptyFrame);
            }
            log::trace!("restarting animation");
            self.reset();
        }

        let advanced = self.advance();
        let info = self.record(advanced).map_err(|err| {
            self.state = PlaybackState::BetweenFrames;
            err
        })?;
        if sync {
            self.delay.wait(info.delay_ms);
        }
        Ok(info)
    }

    fn advance(&mut self) -> Result<FrameInfo, GifError> {
        let format = self.config.pixel_format;
        let (header, input) = match (self.header.as_ref(), self.input.as_mut()) {
            (Some(header), Some(input)) => (header, input),
            _ => return Err(GifError::InvalidParameter),
        };
        if !self.canvas.matches(header.size(), format) {
            self.canvas
                .allocate(&mut *self.allocator, header.size(), format)?;
        }
        let lzw = self.lzw.as_mut().ok_or(GifError::InvalidParameter)?;
        let source = input.as_source();

        self.state = PlaybackState::BetweenFrames;
        let scanned = self.scanner.next_frame(source)?;
        let descriptor = &scanned.descriptor;
        let control = scanned.control;

        self.state = PlaybackState::DecodingFrame;
        let area = descriptor.bounding_box();
        let layout = self.canvas.layout(area, descriptor.interlaced);
        let mut window = self.canvas.window(&layout);
        let data = decode_frame_data(lzw, source, scanned.data_offset, &mut window)?;
        self.scanner.resume_at(data.end_offset);

        let layer = Layer {
            area,
            disposal: control.disposal,
            transparent_idx: control.transparent_idx,
            palette: descriptor
                .local_table
                .as_ref()
                .or(header.global_table.as_ref()),
            layout,
            written: data.written,
        };
        let background = header.background_color();
        match self.pixel_sink.as_deref_mut() {
            Some(sink) => self.canvas.compose(&layer, background, sink),
            None => self.canvas.compose(&layer, background, &mut Discard),
        }
        if let Some(sink) = self.frame_sink.as_deref_mut() {
            sink.frame(
                Rectangle::new(Point::zero(), self.canvas.size()),
                self.canvas.pixels(),
            );
        }

        let info = FrameInfo {
            index: self.current_frame,
            x: descriptor.origin.x as u16,
            y: descriptor.origin.y as u16,
            width: descriptor.size.width as u16,
            height: descriptor.size.height as u16,
            delay_ms: control.delay_ms,
            disposal: control.disposal,
            interlaced: descriptor.interlaced,
            transparent_idx: control.transparent_idx,
            has_local_table: descriptor.local_table.is_some(),
            user_input: control.user_input,
        };
        log::trace!("frame {}: {:?}", info.index, layer.area);

        self.current_frame += 1;
        self.frame_info = Some(info);
        self.state = PlaybackState::FrameReady;
        Ok(info)
    }

    /// Stream level facts, `None` until a gif is loaded
    pub fn info(&self) -> Option<GifInfo> {
        let header = self.header.as_ref()?;
        Some(GifInfo {
            version: header.version,
            width: header.width,
            height: header.height,
            frame_count: self.summary.frame_count,
            total_duration_ms: self.summary.total_duration_ms,
            loop_count: self.summary.loop_count,
            transparent_idx: self.summary.transparent_idx,
            background_index: header.background_index,
            aspect_ratio: header.aspect_ratio,
            has_global_table: header.global_table.is_some(),
        })
    }

    /// The most recently decoded frame
    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.frame_info
    }

    /// First error since the last load or reset. While set, [`AnimatedGif::next_frame`] refuses
    /// to run.
    pub fn last_error(&self) -> Option<GifError> {
        self.last_error
    }

    /// Number of frames played since the start or the last loop restart
    pub fn current_frame(&self) -> u16 {
        self.current_frame
    }

    pub fn frame_count(&self) -> u16 {
        self.summary.frame_count
    }

    pub fn is_animation_complete(&self) -> bool {
        self.state == PlaybackState::Complete
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.config.looping = looping;
        if looping && self.state == PlaybackState::Complete {
            self.state = PlaybackState::BetweenFrames;
        }
    }

    /// Switch the canvas format. Both buffers are reallocated and playback restarts at the
    /// first frame, since the old canvas content can't be carried over.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<(), GifError> {
        if self.config.pixel_format == format {
            return Ok(());
        }
        self.config.pixel_format = format;
        let Some(size) = self.header.as_ref().map(Header::size) else {
            return Ok(());
        };
        let allocated = self.canvas.allocate(&mut *self.allocator, size, format);
        self.record(allocated)?;
        self.reset();
        Ok(())
    }

    pub fn set_frame_sink(&mut self, sink: impl FrameSink + 'a) {
        self.frame_sink = Some(Box::new(sink));
    }

    pub fn set_pixel_sink(&mut self, sink: impl PixelSink + 'a) {
        self.pixel_sink = Some(Box::new(sink));
    }

    pub fn clear_sinks(&mut self) {
        self.frame_sink = None;
        self.pixel_sink = None;
    }

    /// Replace how synchronous playback waits out frame delays
    pub fn set_delay(&mut self, delay: impl FrameDelay + 'a) {
        self.delay = Box::new(delay);
    }

    /// Size of the display the animation ends up on. Only used to compute [`AnimatedGif::fit_scale`].
    pub fn set_display_size(&mut self, size: Size) {
        self.display_size = Some(size);
    }

    pub fn display_size(&self) -> Option<Size> {
        self.display_size
    }

    /// Presentation scale hint, clamped to [`MIN_SCALE`]..=[`MAX_SCALE`]. Frames are always
    /// decoded at the native canvas size.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = if scale.is_nan() {
            1.0
        } else {
            scale.clamp(MIN_SCALE, MAX_SCALE)
        };
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Pick the largest scale at which the canvas still fits the display, and use it.
    pub fn fit_scale(&mut self) -> Result<f32, GifError> {
        let display = self.display_size.ok_or(GifError::DisplayNotSet)?;
        let canvas = self
            .header
            .as_ref()
            .map(Header::size)
            .ok_or(GifError::InvalidParameter)?;
        if canvas.width == 0 || canvas.height == 0 {
            return Err(GifError::InvalidParameter);
        }
        let horizontal = display.width as f32 / canvas.width as f32;
        let vertical = display.height as f32 / canvas.height as f32;
        self.set_scale(horizontal.min(vertical));
        Ok(self.scale)
    }
}
