use std::{error, fmt, ptr::NonNull};

use crate::{
  align::{ALIGNMENT, MIN_PAYLOAD},
  block::{self, HEADER_SIZE, State},
  heap::Heap,
  region::Region,
};

/// A snapshot of one block, as seen while walking the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the region base.
  pub offset: u32,
  pub data: NonNull<u8>,
  pub size: u32,
  pub state: State,
  pub prev: Option<u32>,
  pub next: Option<u32>,
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let link = |link: Option<u32>| link.map_or_else(|| "-".to_string(), |offset| offset.to_string());

    write!(
      f,
      "LAST: {:>6}, THIS: {:>6}, NEXT: {:>6}, FREE?: {:>5}, DATA_SIZE: {} at {:?}",
      link(self.prev),
      self.offset,
      link(self.next),
      self.state == State::Free,
      self.size,
      self.data,
    )
  }
}

/// Iterator over the blocks of a heap in address order.
pub struct Blocks<'a, R: Region> {
  heap: &'a Heap<R>,
  current: Option<u32>,
}

impl<R: Region> Iterator for Blocks<'_, R> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.current?;
    let header = self.heap.header(offset);

    self.current = header.next();

    Some(BlockInfo {
      offset,
      data: self.heap.data_pointer(offset),
      size: header.size(),
      state: header.state(),
      prev: header.prev(),
      next: header.next(),
    })
  }
}

/// A broken heap invariant found by [`Heap::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
  /// Exactly one of `head` and `tail` is set.
  EndsMismatch { head: Option<u32>, tail: Option<u32> },
  /// A block does not start where its predecessor ends.
  Gap { offset: u32, expected: usize },
  /// A block's back link does not name its predecessor.
  BrokenLink { offset: u32 },
  /// A payload size is misaligned or below the minimum.
  BadSize { offset: u32, size: u32 },
  /// Two free blocks sit next to each other.
  AdjacentFree { offset: u32 },
  /// The last block is free instead of having been returned to the region.
  FreeTail { offset: u32 },
  /// `tail` does not name the last block of the list.
  WrongTail { expected: Option<u32>, found: Option<u32> },
  /// The blocks end somewhere other than the end of the region.
  Overrun { end: usize, len: usize },
}

impl fmt::Display for Corruption {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Corruption::EndsMismatch { head, tail } => {
        write!(f, "head {head:?} and tail {tail:?} disagree about emptiness")
      }
      Corruption::Gap { offset, expected } => {
        write!(f, "block at offset {offset} should start at {expected}")
      }
      Corruption::BrokenLink { offset } => {
        write!(f, "block at offset {offset} has a stale back link")
      }
      Corruption::BadSize { offset, size } => {
        write!(f, "block at offset {offset} has invalid size {size}")
      }
      Corruption::AdjacentFree { offset } => {
        write!(f, "free block at offset {offset} follows another free block")
      }
      Corruption::FreeTail { offset } => {
        write!(f, "tail block at offset {offset} is free")
      }
      Corruption::WrongTail { expected, found } => {
        write!(f, "tail is {found:?} but the list ends at {expected:?}")
      }
      Corruption::Overrun { end, len } => {
        write!(f, "blocks end at {end} but the region is {len} bytes")
      }
    }
  }
}

impl error::Error for Corruption {}

impl<R: Region> Heap<R> {
  /// Data pointer of the first block.
  pub fn head(&self) -> Option<NonNull<u8>> {
    self.head.map(|offset| self.data_pointer(offset))
  }

  /// Data pointer of the last block.
  pub fn tail(&self) -> Option<NonNull<u8>> {
    self.tail.map(|offset| self.data_pointer(offset))
  }

  pub fn blocks(&self) -> Blocks<'_, R> {
    Blocks {
      heap: self,
      current: self.head,
    }
  }

  pub fn log_head_and_tail(&self) {
    log::debug!("HEAD: {:?}\nTAIL: {:?}", self.head(), self.tail());
  }

  pub fn log_blocks(&self) {
    for block in self.blocks() {
      log::debug!("{block}");
    }
  }

  /// Walks the whole list and verifies that the blocks tile the region
  /// exactly and are fully coalesced.
  ///
  /// Stops at the first broken invariant without reading past it.
  pub fn check(&self) -> Result<(), Corruption> {
    if self.head.is_some() != self.tail.is_some() {
      return Err(Corruption::EndsMismatch {
        head: self.head,
        tail: self.tail,
      });
    }

    let len = self.region.len();
    let mut expected = 0usize;
    let mut prev: Option<u32> = None;
    let mut prev_free = false;
    let mut current = self.head;

    while let Some(offset) = current {
      if offset as usize != expected {
        return Err(Corruption::Gap { offset, expected });
      }
      if expected + HEADER_SIZE > len {
        return Err(Corruption::Overrun {
          end: expected + HEADER_SIZE,
          len,
        });
      }

      let header = self.header(offset);
      let size = header.size();

      if header.prev() != prev {
        return Err(Corruption::BrokenLink { offset });
      }
      if size as usize % ALIGNMENT != 0 || (size as usize) < MIN_PAYLOAD {
        return Err(Corruption::BadSize { offset, size });
      }
      if header.is_free() && prev_free {
        return Err(Corruption::AdjacentFree { offset });
      }

      expected = block::end_offset(offset, size);
      prev = Some(offset);
      prev_free = header.is_free();
      current = header.next();
    }

    if prev != self.tail {
      return Err(Corruption::WrongTail {
        expected: prev,
        found: self.tail,
      });
    }
    if expected != len {
      return Err(Corruption::Overrun { end: expected, len });
    }
    if let (Some(offset), true) = (prev, prev_free) {
      return Err(Corruption::FreeTail { offset });
    }

    Ok(())
  }
}

impl<R: Region> fmt::Display for Heap<R> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "HEAD: {:?}", self.head())?;
    writeln!(f, "TAIL: {:?}", self.tail())?;

    for block in self.blocks() {
      writeln!(f, "{block}")?;
    }

    Ok(())
  }
}
