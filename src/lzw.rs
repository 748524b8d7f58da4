//! Variable width LZW decompression as used by GIF image data.
//!
//! The dictionary is a fixed arena of 4096 entries addressed by code. Each entry stores the code
//! of its prefix and its last index, plus the cached first index and length of the whole string,
//! so a code can be expanded straight into the output back to front without a scratch stack.

use alloc::vec::Vec;

use crate::common::GifError;

/// Codes are never wider than this.
pub const MAX_CODE_WIDTH: u8 = 12;
const TABLE_SIZE: usize = 1 << MAX_CODE_WIDTH;

/// Something that hands out the bytes of an LZW stream one by one; `None` once exhausted.
pub trait ByteStream {
    fn next_byte(&mut self) -> Result<Option<u8>, GifError>;
}

impl ByteStream for &[u8] {
    fn next_byte(&mut self) -> Result<Option<u8>, GifError> {
        match self.split_first() {
            Some((first, rest)) => {
                *self = rest;
                Ok(Some(*first))
            }
            None => Ok(None),
        }
    }
}

/// Where decoded indices go, addressed by their position in the stream.
pub trait IndexSink {
    /// Positions from here on are discarded
    fn capacity(&self) -> usize;

    fn put(&mut self, pos: usize, index: u8);
}

impl IndexSink for [u8] {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn put(&mut self, pos: usize, index: u8) {
        self[pos] = index;
    }
}

/// Least significant bit first code reader
struct BitReader<'a, B: ByteStream> {
    bytes: &'a mut B,
    buffer: u32,
    bits: u8,
}

impl<'a, B: ByteStream> BitReader<'a, B> {
    fn new(bytes: &'a mut B) -> Self {
        Self {
            bytes,
            buffer: 0,
            bits: 0,
        }
    }

    /// Next `width` bit code, `None` if the stream ran out first
    fn read(&mut self, width: u8) -> Result<Option<u16>, GifError> {
        while self.bits < width {
            match self.bytes.next_byte()? {
                Some(byte) => {
                    self.buffer |= u32::from(byte) << self.bits;
                    self.bits += 8;
                }
                None => return Ok(None),
            }
        }
        let code = (self.buffer & ((1 << width) - 1)) as u16;
        self.buffer >>= width;
        self.bits -= width;
        Ok(Some(code))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    prefix: u16,
    suffix: u8,
    first: u8,
    len: u16,
}

/// Outcome of decoding one frame's worth of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Stream positions produced, never more than the output's capacity
    pub written: usize,
    /// Whether the stream was closed by an end code rather than simply running dry
    pub saw_end: bool,
}

/// Reusable decompressor state; the table is allocated once and shared across frames.
pub struct LzwDecoder {
    table: Vec<Entry>,
    min_code_size: u8,
    width: u8,
    next_code: u16,
    prev: Option<u16>,
}

impl LzwDecoder {
    pub fn new() -> Result<Self, GifError> {
        let mut table = Vec::new();
        table
            .try_reserve_exact(TABLE_SIZE)
            .map_err(|_| GifError::OutOfMemory)?;
        table.resize(TABLE_SIZE, Entry::default());
        Ok(Self {
            table,
            min_code_size: 2,
            width: 3,
            next_code: 6,
            prev: None,
        })
    }

    fn clear_code(&self) -> u16 {
        1 << self.min_code_size
    }

    fn end_code(&self) -> u16 {
        self.clear_code() + 1
    }

    /// Width of the next code to be read
    pub fn code_width(&self) -> u8 {
        self.width
    }

    /// Code the next dictionary entry will be assigned, `4096` once the table is full
    pub fn next_code(&self) -> u16 {
        self.next_code
    }

    fn start(&mut self, min_code_size: u8) -> Result<(), GifError> {
        if !(1..MAX_CODE_WIDTH).contains(&min_code_size) {
            return Err(GifError::UnsupportedFeature);
        }
        self.min_code_size = min_code_size;
        for code in 0..self.clear_code() {
            self.table[code as usize] = Entry {
                prefix: 0,
                suffix: code as u8,
                first: code as u8,
                len: 1,
            };
        }
        self.reset();
        Ok(())
    }

    /// Back to the singleton dictionary, as after a clear code
    fn reset(&mut self) {
        self.width = self.min_code_size + 1;
        self.next_code = self.end_code() + 1;
        self.prev = None;
    }

    /// Decode the stream into `out`, stopping at the end code or when the data runs out. Output
    /// past the capacity of `out` is discarded.
    pub fn decode<B: ByteStream, O: IndexSink + ?Sized>(
        &mut self,
        min_code_size: u8,
        bytes: &mut B,
        out: &mut O,
    ) -> Result<Decoded, GifError> {
        self.start(min_code_size)?;
        let clear = self.clear_code();
        let end = self.end_code();
        let mut reader = BitReader::new(bytes);
        let mut written = 0;

        loop {
            let Some(code) = reader.read(self.width)? else {
                return Ok(Decoded {
                    written,
                    saw_end: false,
                });
            };

            if code == clear {
                self.reset();
                continue;
            }
            if code == end {
                return Ok(Decoded {
                    written,
                    saw_end: true,
                });
            }

            let Some(prev) = self.prev else {
                // first code after a clear must be a literal
                if code >= clear {
                    return Err(GifError::DecodeError);
                }
                written += self.emit(code, out, written);
                self.prev = Some(code);
                continue;
            };

            if code > self.next_code || (code == self.next_code && self.table_full()) {
                return Err(GifError::DecodeError);
            }
            if code == self.next_code {
                // the code being defined by this very step: prev's string plus its own first index
                let first = self.table[prev as usize].first;
                self.insert(prev, first);
            } else {
                let first = self.table[code as usize].first;
                self.insert(prev, first);
            }
            written += self.emit(code, out, written);
            self.prev = Some(code);
        }
    }

    fn table_full(&self) -> bool {
        self.next_code as usize >= TABLE_SIZE
    }

    fn insert(&mut self, prefix: u16, suffix: u8) {
        if self.table_full() {
            return;
        }
        let parent = self.table[prefix as usize];
        self.table[self.next_code as usize] = Entry {
            prefix,
            suffix,
            first: parent.first,
            len: parent.len + 1,
        };
        self.next_code += 1;
        if self.next_code == 1 << self.width && self.width < MAX_CODE_WIDTH {
            self.width += 1;
        }
    }

    /// Expand `code` into `out` starting at `pos`, returning how many positions it filled
    fn emit<O: IndexSink + ?Sized>(&self, code: u16, out: &mut O, pos: usize) -> usize {
        let len = self.table[code as usize].len as usize;
        let room = out.capacity().saturating_sub(pos);
        if room == 0 {
            return 0;
        }
        let mut code = code;
        for idx in (0..len).rev() {
            let entry = self.table[code as usize];
            if idx < room {
                out.put(pos + idx, entry.suffix);
            }
            code = entry.prefix;
        }
        len.min(room)
    }
}
