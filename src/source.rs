use alloc::vec::Vec;

use crate::common::GifError;

/// Random access, pull style byte provider backing a gif stream.
///
/// This is what the decoder reads through for both in-memory gifs and gifs that live on some
/// external medium (flash, SD card, network buffer...).
pub trait ByteSource {
    /// Fill `buf` with the bytes starting at `offset`. Returns `false` if the source can't
    /// provide all of them.
    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> bool;

    /// Total length, if known up front.
    fn len(&self) -> Option<u32> {
        None
    }
}

/// A gif that has been copied into decoder owned memory
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSource for MemorySource {
    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> bool {
        let start = offset as usize;
        match self.data.get(start..start + buf.len()) {
            Some(bytes) => {
                buf.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> Option<u32> {
        Some(self.data.len() as u32)
    }
}

/// Adapts a closure of the shape `(buffer, offset) -> success` into a [`ByteSource`].
///
/// Whatever the closure captures is owned by the source and dropped together with the decoder.
pub struct FnSource<F>(pub F);

impl<F> ByteSource for FnSource<F>
where
    F: FnMut(&mut [u8], u32) -> bool,
{
    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> bool {
        (self.0)(buf, offset)
    }
}

///Abstraction for walking through a gif source, keeping track of where we are
pub struct ByteCursor<'s> {
    source: &'s mut dyn ByteSource,
    offset: u32,
}

impl<'s> ByteCursor<'s> {
    pub fn new(source: &'s mut dyn ByteSource, offset: u32) -> Self {
        Self { source, offset }
    }

    pub(crate) fn take_byte(&mut self) -> Result<u8, GifError> {
        let [byte] = self.take_arr::<1>()?;
        Ok(byte)
    }

    pub(crate) fn take_u16_le(&mut self) -> Result<u16, GifError> {
        self.take_arr().map(u16::from_le_bytes)
    }

    #[inline]
    pub(crate) fn take_arr<const N: usize>(&mut self) -> Result<[u8; N], GifError> {
        let mut arr = [0; N];
        self.take_into(&mut arr)?;
        Ok(arr)
    }

    pub(crate) fn take_into(&mut self, buf: &mut [u8]) -> Result<(), GifError> {
        if !self.source.read_at(buf, self.offset) {
            return Err(GifError::EarlyEof);
        }
        self.offset += buf.len() as u32;
        Ok(())
    }

    pub(crate) fn get_offset(&self) -> u32 {
        self.offset
    }

    pub(crate) fn seek_by(&mut self, len: u32) {
        self.offset += len;
    }

    pub(crate) fn seek_to(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Skip a chain of length prefixed sub-blocks, including the zero length terminator.
    ///
    /// Sources that know their length are skipped through without reading the block contents;
    /// for the others the last byte of every block is read to make sure it exists.
    pub(crate) fn skip_sub_blocks(&mut self) -> Result<(), GifError> {
        let total = self.source.len();
        loop {
            match self.take_byte()? {
                0 => return Ok(()),
                len => match total {
                    Some(total) => {
                        let end = self.offset.saturating_add(len.into());
                        if end > total {
                            return Err(GifError::EarlyEof);
                        }
                        self.seek_to(end);
                    }
                    None => {
                        let mut last = [0; 1];
                        self.seek_by(u32::from(len) - 1);
                        self.take_into(&mut last)?;
                    }
                },
            }
        }
    }
}
