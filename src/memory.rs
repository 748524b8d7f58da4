//! Where the decoder's large buffers come from.
//!
//! Boards with a big external RAM region and a small internal heap want the raw gif and the
//! canvas buffers to land in the external region whenever possible. Rather than hardwiring that
//! policy into the decoder, every large allocation goes through a [`BufferAllocator`] chosen when
//! the decoder is constructed.

use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::common::GifError;

/// Strategy for acquiring zeroed byte buffers.
pub trait BufferAllocator {
    /// Hand out a zeroed buffer of exactly `len` bytes.
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>, GifError>;

    /// Give a buffer handed out by [`BufferAllocator::allocate`] back.
    fn release(&mut self, buf: Vec<u8>) {
        drop(buf)
    }
}

impl<A: BufferAllocator + ?Sized> BufferAllocator for &mut A {
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>, GifError> {
        (**self).allocate(len)
    }

    fn release(&mut self, buf: Vec<u8>) {
        (**self).release(buf)
    }
}

/// Plain global allocator. Allocation failure is reported instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>, GifError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| GifError::OutOfMemory)?;
        buf.resize(len, 0);
        Ok(buf)
    }
}

/// Models a memory pool with a fixed capacity, e.g. a small internal heap.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBudget {
    capacity: usize,
    used: usize,
}

impl MemoryBudget {
    pub const fn new(capacity: usize) -> Self {
        Self { capacity, used: 0 }
    }

    /// Bytes currently handed out.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

impl BufferAllocator for MemoryBudget {
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>, GifError> {
        if len > self.remaining() {
            return Err(GifError::OutOfMemory);
        }
        let buf = HeapAllocator.allocate(len)?;
        self.used += len;
        Ok(buf)
    }

    fn release(&mut self, buf: Vec<u8>) {
        self.used = self.used.saturating_sub(buf.len());
    }
}

/// Try `primary` first and fall back to `fallback` when it is exhausted.
///
/// Every buffer is handed back to the pool it came from. Buffers taken from `primary` are
/// recognized on release by their address and length.
#[derive(Debug, Clone)]
pub struct Preferring<P, F> {
    primary: P,
    fallback: F,
    /// Address and length of the buffers `primary` has outstanding
    from_primary: SmallVec<[(usize, usize); 4]>,
}

impl<P, F> Preferring<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            from_primary: SmallVec::new(),
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

impl<P: BufferAllocator, F: BufferAllocator> BufferAllocator for Preferring<P, F> {
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>, GifError> {
        match self.primary.allocate(len) {
            Ok(buf) => {
                self.from_primary.push((buf.as_ptr() as usize, buf.len()));
                Ok(buf)
            }
            Err(_) => {
                log::debug!("primary pool exhausted, {} bytes from fallback", len);
                self.fallback.allocate(len)
            }
        }
    }

    fn release(&mut self, buf: Vec<u8>) {
        let key = (buf.as_ptr() as usize, buf.len());
        match self.from_primary.iter().position(|held| *held == key) {
            Some(at) => {
                self.from_primary.swap_remove(at);
                self.primary.release(buf)
            }
            None => self.fallback.release(buf),
        }
    }
}
