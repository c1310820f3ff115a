//! Linear-memory bookkeeping for the accelerated particle path.
//!
//! A WebAssembly instance exposes one flat byte buffer; the host writes input
//! arrays at agreed byte offsets ("pointers"), calls a batch export with those
//! pointers and reads the results back from the same offsets.

use fnv::FnvHashMap;
use thiserror::Error;

const F32_BYTES: u32 = 4;
const ALLOC_ALIGN: u32 = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("access of {len} bytes at {offset} exceeds memory size {size}")]
    OutOfBounds { offset: u32, len: u32, size: u32 },
    #[error("offset {0} is not aligned to 4 bytes")]
    Misaligned(u32),
}

/// Byte-addressed memory that can exchange `f32` arrays with the host.
pub trait LinearMemory {
    fn size(&self) -> u32;
    fn write_f32s(&mut self, byte_offset: u32, data: &[f32]) -> Result<(), MemoryError>;
    fn read_f32s(&self, byte_offset: u32, out: &mut [f32]) -> Result<(), MemoryError>;
}

/// Validate an `f32` access and return its starting word index.
pub fn check_f32_access(size: u32, byte_offset: u32, count: usize) -> Result<usize, MemoryError> {
    if byte_offset % F32_BYTES != 0 {
        return Err(MemoryError::Misaligned(byte_offset));
    }
    let len = u32::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(F32_BYTES))
        .ok_or(MemoryError::OutOfBounds {
            offset: byte_offset,
            len: u32::MAX,
            size,
        })?;
    match byte_offset.checked_add(len) {
        Some(end) if end <= size => Ok((byte_offset / F32_BYTES) as usize),
        _ => Err(MemoryError::OutOfBounds {
            offset: byte_offset,
            len,
            size,
        }),
    }
}

/// Blocks handed out by an allocator, keyed by start offset.
///
/// Raw pointer exports check their arguments against this before building
/// slices over linear memory.
#[derive(Debug, Default)]
pub struct LiveBlocks {
    blocks: FnvHashMap<u32, u32>,
}

impl LiveBlocks {
    pub fn insert(&mut self, ptr: u32, bytes: u32) {
        self.blocks.insert(ptr, bytes);
    }

    pub fn remove(&mut self, ptr: u32) -> Option<u32> {
        self.blocks.remove(&ptr)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Byte range `[ptr, ptr + floats * 4)` if it is aligned and lies inside one live block.
    pub fn checked_range(&self, ptr: u32, floats: usize) -> Option<(u32, u32)> {
        if ptr % F32_BYTES != 0 {
            return None;
        }
        let len = u32::try_from(floats).ok()?.checked_mul(F32_BYTES)?;
        let end = ptr.checked_add(len)?;
        self.blocks
            .iter()
            .any(|(&base, &size)| ptr >= base && end <= base.saturating_add(size))
            .then_some((ptr, end))
    }

    /// Check `(ptr, floats_per_item)` arrays of `count` items each: every
    /// array must sit inside a live block and no two may overlap.
    pub fn check_arrays(&self, count: u32, arrays: &[(u32, usize)]) -> bool {
        let ranges: Option<Vec<_>> = arrays
            .iter()
            .map(|&(ptr, stride)| {
                let floats = (count as usize).checked_mul(stride)?;
                self.checked_range(ptr, floats)
            })
            .collect();
        ranges.map_or(false, |r| disjoint(&r))
    }
}

/// Whether half-open byte ranges are pairwise disjoint. Empty ranges never overlap.
pub fn disjoint(ranges: &[(u32, u32)]) -> bool {
    ranges.iter().enumerate().all(|(i, a)| {
        ranges[i + 1..]
            .iter()
            .all(|b| a.1 <= b.0 || b.1 <= a.0 || a.0 == a.1 || b.0 == b.1)
    })
}

/// Growable word-backed memory with a bump allocator.
///
/// Offset 0 is never handed out so it can serve as a null pointer. Freed
/// blocks are kept on a free list and reused for requests of the same size.
#[derive(Debug)]
pub struct HeapMemory {
    words: Vec<u32>,
    next: u32,
    limit: u32,
    live: LiveBlocks,
    free: Vec<(u32, u32)>,
}

impl Default for HeapMemory {
    fn default() -> Self {
        Self::with_limit(64 * 1024 * 1024)
    }
}

impl HeapMemory {
    pub fn with_limit(limit_bytes: u32) -> Self {
        Self {
            words: Vec::new(),
            next: ALLOC_ALIGN,
            limit: limit_bytes,
            live: LiveBlocks::default(),
            free: Vec::new(),
        }
    }

    pub fn allocate(&mut self, bytes: u32) -> Option<u32> {
        if bytes == 0 {
            return None;
        }
        let size = bytes.checked_add(ALLOC_ALIGN - 1)? & !(ALLOC_ALIGN - 1);
        if let Some(i) = self.free.iter().position(|&(_, s)| s == size) {
            let (ptr, _) = self.free.swap_remove(i);
            self.words_for(ptr, size).fill(0);
            self.live.insert(ptr, size);
            return Some(ptr);
        }
        let ptr = self.next;
        let end = ptr.checked_add(size)?;
        if end > self.limit {
            log::warn!("[memory] allocation of {} bytes exceeds limit {}", bytes, self.limit);
            return None;
        }
        let needed_words = (end / F32_BYTES) as usize;
        if self.words.len() < needed_words {
            self.words.resize(needed_words, 0);
        }
        self.next = end;
        self.live.insert(ptr, size);
        Some(ptr)
    }

    /// Release a block. Unknown pointers are ignored.
    pub fn free(&mut self, ptr: u32) {
        if let Some(size) = self.live.remove(ptr) {
            self.free.push((ptr, size));
        }
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// Mutable `f32` view used by kernels running directly on this memory.
    pub fn f32_slice_mut(&mut self, byte_offset: u32, count: usize) -> Result<&mut [f32], MemoryError> {
        let start = check_f32_access(self.size(), byte_offset, count)?;
        let floats: &mut [f32] = bytemuck::cast_slice_mut(&mut self.words);
        Ok(&mut floats[start..start + count])
    }

    /// Two disjoint mutable views; `a` must end at or before `b` begins.
    pub fn f32_pair_mut(
        &mut self,
        a: (u32, usize),
        b: (u32, usize),
    ) -> Result<(&mut [f32], &mut [f32]), MemoryError> {
        let size = self.size();
        let a_start = check_f32_access(size, a.0, a.1)?;
        let b_start = check_f32_access(size, b.0, b.1)?;
        if a_start + a.1 > b_start {
            return Err(MemoryError::OutOfBounds {
                offset: b.0,
                len: (b.1 as u32).saturating_mul(F32_BYTES),
                size,
            });
        }
        let floats: &mut [f32] = bytemuck::cast_slice_mut(&mut self.words);
        let (head, tail) = floats.split_at_mut(b_start);
        Ok((&mut head[a_start..a_start + a.1], &mut tail[..b.1]))
    }

    fn words_for(&mut self, ptr: u32, size: u32) -> &mut [u32] {
        let start = (ptr / F32_BYTES) as usize;
        let end = start + (size / F32_BYTES) as usize;
        &mut self.words[start..end]
    }
}

impl LinearMemory for HeapMemory {
    fn size(&self) -> u32 {
        (self.words.len() as u32).saturating_mul(F32_BYTES)
    }

    fn write_f32s(&mut self, byte_offset: u32, data: &[f32]) -> Result<(), MemoryError> {
        self.f32_slice_mut(byte_offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    fn read_f32s(&self, byte_offset: u32, out: &mut [f32]) -> Result<(), MemoryError> {
        let start = check_f32_access(self.size(), byte_offset, out.len())?;
        let floats: &[f32] = bytemuck::cast_slice(&self.words);
        out.copy_from_slice(&floats[start..start + out.len()]);
        Ok(())
    }
}

/// Byte layout of a rain/mist batch: positions, then velocities, then offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLayout {
    pub base: u32,
    pub count: usize,
}

impl BatchLayout {
    pub fn bytes_for(count: usize) -> u32 {
        (count as u32).saturating_mul(5 * F32_BYTES)
    }

    pub fn positions(&self) -> u32 {
        self.base
    }

    pub fn velocities(&self) -> u32 {
        self.base + self.count as u32 * 3 * F32_BYTES
    }

    pub fn offsets(&self) -> u32 {
        self.base + self.count as u32 * 4 * F32_BYTES
    }

    pub fn byte_len(&self) -> u32 {
        Self::bytes_for(self.count)
    }
}

/// Byte layout of a compute batch: `[x, y, z, life]` then `[vx, vy, vz, speed]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComputeLayout {
    pub base: u32,
    pub count: usize,
}

impl ComputeLayout {
    pub fn bytes_for(count: usize) -> u32 {
        (count as u32).saturating_mul(8 * F32_BYTES)
    }

    pub fn positions(&self) -> u32 {
        self.base
    }

    pub fn velocities(&self) -> u32 {
        self.base + self.count as u32 * 4 * F32_BYTES
    }

    pub fn byte_len(&self) -> u32 {
        Self::bytes_for(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_layout_offsets() {
        let l = BatchLayout { base: 64, count: 10 };
        assert_eq!(l.positions(), 64);
        assert_eq!(l.velocities(), 64 + 120);
        assert_eq!(l.offsets(), 64 + 160);
        assert_eq!(l.byte_len(), 200);
    }

    #[test]
    fn compute_layout_offsets() {
        let l = ComputeLayout { base: 16, count: 3 };
        assert_eq!(l.velocities(), 16 + 48);
        assert_eq!(l.byte_len(), 96);
    }

    #[test]
    fn allocations_are_aligned_non_null_and_reused() {
        let mut m = HeapMemory::default();
        let a = m.allocate(10).unwrap();
        let b = m.allocate(40).unwrap();
        assert_ne!(a, 0);
        assert_eq!(a % 16, 0);
        assert_eq!(b % 16, 0);
        assert!(b >= a + 16);
        m.free(a);
        assert_eq!(m.live_allocations(), 1);
        assert_eq!(m.allocate(12), Some(a));
    }

    #[test]
    fn round_trips_floats_and_rejects_bad_access() {
        let mut m = HeapMemory::default();
        let p = m.allocate(16).unwrap();
        m.write_f32s(p, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = [0.0; 4];
        m.read_f32s(p, &mut out).unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.write_f32s(p + 1, &[1.0]), Err(MemoryError::Misaligned(p + 1)));
        assert!(matches!(
            m.read_f32s(m.size(), &mut out),
            Err(MemoryError::OutOfBounds { .. })
        ));
    }

    fn blocks() -> LiveBlocks {
        let mut live = LiveBlocks::default();
        live.insert(64, 64);
        live.insert(256, 32);
        live
    }

    #[test]
    fn ranges_must_sit_inside_one_block() {
        let live = blocks();
        assert_eq!(live.checked_range(64, 16), Some((64, 128)));
        assert_eq!(live.checked_range(96, 8), Some((96, 128)));
        // runs past the end of its block
        assert_eq!(live.checked_range(96, 9), None);
        // spans two blocks with a gap
        assert_eq!(live.checked_range(64, 60), None);
        assert_eq!(live.checked_range(16, 1), None);
        assert_eq!(live.checked_range(66, 1), None);
        assert_eq!(live.checked_range(u32::MAX - 3, 2), None);
    }

    #[test]
    fn arrays_are_checked_for_overlap() {
        let live = blocks();
        assert!(live.check_arrays(4, &[(64, 3), (112, 1), (256, 1)]));
        assert!(!live.check_arrays(4, &[(64, 3), (96, 1)]));
        assert!(!live.check_arrays(4, &[(64, 3), (300, 1)]));
        assert!(live.check_arrays(0, &[(64, 3), (64, 1)]));
    }

    #[test]
    fn huge_counts_are_rejected_without_overflow() {
        let live = blocks();
        assert!(!live.check_arrays(u32::MAX, &[(64, 4)]));
        assert!(!live.check_arrays(u32::MAX / 2, &[(64, 3), (256, 4)]));
    }

    #[test]
    fn disjoint_ignores_empty_ranges() {
        assert!(disjoint(&[(0, 8), (8, 16)]));
        assert!(!disjoint(&[(0, 8), (4, 12)]));
        assert!(disjoint(&[(4, 4), (0, 8)]));
        assert!(disjoint(&[]));
    }

    #[test]
    fn respects_limit() {
        let mut m = HeapMemory::with_limit(64);
        assert!(m.allocate(32).is_some());
        assert!(m.allocate(32).is_none());
        assert_eq!(m.allocate(0), None);
    }
}
