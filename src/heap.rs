use std::ptr::{self, NonNull};

use crate::{
  align::{MIN_PAYLOAD, round_request},
  block::{self, BlockHeader, HEADER_SIZE, MAX_END, State},
  region::{Region, RegionError},
};

/// A first-fit heap laid over a [`Region`].
///
/// Blocks sit end to end in address order, each one a [`BlockHeader`]
/// followed by its payload. `head` and `tail` are header offsets from the
/// region base.
pub struct Heap<R: Region> {
  pub(crate) region: R,
  pub(crate) head: Option<u32>,
  pub(crate) tail: Option<u32>,
}

impl<R: Region> Heap<R> {
  /// Starts an empty heap. The region must not hold any bytes yet.
  pub fn new(region: R) -> Self {
    debug_assert!(region.is_empty(), "heap regions start empty");

    Self {
      region,
      head: None,
      tail: None,
    }
  }

  pub fn region(&self) -> &R {
    &self.region
  }

  /// Gives the region back. Pointers handed out by this heap stay valid only
  /// as long as the region does.
  pub fn into_region(self) -> R {
    self.region
  }

  /// Allocates at least `size` bytes and returns a pointer to them.
  ///
  /// Returns `None` without touching the heap when `size` is zero or when the
  /// region cannot grow to fit the request.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }

    let Ok(rounded) = u32::try_from(round_request(size)) else {
      log::warn!("allocate({size}): request does not fit in a block");
      return None;
    };

    let offset = match self.find_free_block(rounded) {
      Some(offset) => {
        self.update_block(offset, rounded);
        offset
      }
      None => match self.add_to_list(rounded) {
        Ok(offset) => offset,
        Err(error) => {
          log::warn!("allocate({size}): {error}");
          return None;
        }
      },
    };

    Some(self.data_pointer(offset))
  }

  /// Hands a block back to the heap, merging it with free neighbours and
  /// returning the tail of the region when possible.
  ///
  /// # Safety
  ///
  /// `ptr` must be `None` or a pointer returned by [`Heap::allocate`] on this
  /// heap that has not been released since.
  pub unsafe fn release(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) {
    let Some(ptr) = ptr else {
      return;
    };

    let Some(offset) = self.find_block(ptr) else {
      log::error!("release({ptr:?}): pointer is outside the heap, ignoring it");
      return;
    };

    self.header_mut(offset).set_state(State::Free);

    let merged = self.coalesce(offset);

    if Some(merged) == self.tail {
      self.remove_from_list(merged);
      self.contract_heap(merged);
    }
  }

  /// First block in address order that is free and holds at least `size`
  /// bytes.
  fn find_free_block(
    &self,
    size: u32,
  ) -> Option<u32> {
    let mut current = self.head;

    while let Some(offset) = current {
      let header = self.header(offset);

      if header.is_free() && header.size() >= size {
        log::trace!("first fit for {size} bytes at offset {offset}");
        return Some(offset);
      }

      current = header.next();
    }

    None
  }

  /// Marks a free block taken, splitting off the excess as a new free block
  /// when it can hold a header plus [`MIN_PAYLOAD`].
  fn update_block(
    &mut self,
    offset: u32,
    size: u32,
  ) {
    let header = self.header_mut(offset);
    header.set_state(State::Taken);

    let leftover = header.size() - size;

    if leftover as usize <= HEADER_SIZE + MIN_PAYLOAD {
      log::trace!("keeping {leftover} spare bytes in block at offset {offset}");
      return;
    }

    header.set_size(size);

    self.add_block_after(offset, leftover - HEADER_SIZE as u32, State::Free);
  }

  /// Writes a new block right after the payload of `prev` and links it in.
  fn add_block_after(
    &mut self,
    prev: u32,
    size: u32,
    state: State,
  ) {
    let prev_header = self.header(prev);
    let next = prev_header.next();
    // The list never reaches past MAX_END, so every end offset fits.
    let offset = block::end_offset(prev, prev_header.size()) as u32;

    self.write_header(offset, BlockHeader::new(size, state, Some(prev), next));

    match next {
      Some(next) => self.header_mut(next).set_prev(Some(offset)),
      None => self.tail = Some(offset),
    }
    self.header_mut(prev).set_next(Some(offset));

    log::trace!("split off {size} bytes at offset {offset}");
  }

  /// Grows the region by one block of `size` bytes and appends it, taken.
  fn add_to_list(
    &mut self,
    size: u32,
  ) -> Result<u32, RegionError> {
    self.check_ends();

    let total = HEADER_SIZE + size as usize;
    let start = self.region.len();

    let offset = start
      .checked_add(total)
      .filter(|&end| end <= MAX_END)
      .and_then(|_| u32::try_from(start).ok())
      .ok_or(RegionError::Exhausted { requested: total })?;

    self.region.extend(total)?;

    let prev_tail = self.tail;
    self.write_header(offset, BlockHeader::new(size, State::Taken, prev_tail, None));

    match prev_tail {
      Some(prev) => self.header_mut(prev).set_next(Some(offset)),
      None => self.head = Some(offset),
    }
    self.tail = Some(offset);

    log::debug!("grew region by {total} bytes for block at offset {offset}");

    Ok(offset)
  }

  /// Unlinks a block, fixing up `head` and `tail`.
  fn remove_from_list(
    &mut self,
    offset: u32,
  ) {
    let header = self.header(offset);
    let (prev, next) = (header.prev(), header.next());

    if let Some(prev) = prev {
      self.header_mut(prev).set_next(next);
    }
    if let Some(next) = next {
      self.header_mut(next).set_prev(prev);
    }

    if self.head == Some(offset) {
      self.head = next;
    }
    if self.tail == Some(offset) {
      self.tail = prev;
    }
  }

  /// Folds `offset` into `survivor`, the block right before it.
  fn absorb(
    &mut self,
    survivor: u32,
    offset: u32,
  ) -> u32 {
    let header = self.header(offset);
    let (next, size) = (header.next(), header.size());

    match next {
      Some(next) => self.header_mut(next).set_prev(Some(survivor)),
      None => self.tail = Some(survivor),
    }

    let survivor_header = self.header_mut(survivor);
    survivor_header.set_next(next);
    survivor_header.set_size(survivor_header.size() + HEADER_SIZE as u32 + size);

    log::trace!("merged block at offset {offset} into offset {survivor}");

    survivor
  }

  /// Merges a just-freed block with its free neighbours and returns the
  /// block that now covers it.
  fn coalesce(
    &mut self,
    offset: u32,
  ) -> u32 {
    let mut current = offset;

    if let Some(prev) = self
      .header(current)
      .prev()
      .filter(|&prev| self.header(prev).is_free())
    {
      current = self.absorb(prev, current);
    }

    if let Some(next) = self
      .header(current)
      .next()
      .filter(|&next| self.header(next).is_free())
    {
      current = self.absorb(current, next);
    }

    current
  }

  /// Gives everything from `offset` on back to the region's owner.
  fn contract_heap(
    &mut self,
    offset: u32,
  ) {
    let released = self.region.len() - offset as usize;
    self.region.contract(offset as usize);

    log::debug!("shrank region by {released} bytes to {offset}");
  }

  /// Header offset of the block owning `ptr`, if `ptr` lies in the region.
  fn find_block(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<u32> {
    let data = (ptr.as_ptr() as usize).checked_sub(self.region.base().as_ptr() as usize)?;

    if data >= self.region.len() {
      return None;
    }

    block::header_offset(data)
  }

  /// Both ends of the list are set, or neither is.
  fn check_ends(&self) {
    match (self.head, self.tail) {
      (None, Some(tail)) => panic!("heap corrupted: head is empty but tail is at offset {tail}"),
      (Some(head), None) => panic!("heap corrupted: tail is empty but head is at offset {head}"),
      _ => {}
    }
  }

  pub(crate) fn data_pointer(
    &self,
    offset: u32,
  ) -> NonNull<u8> {
    unsafe { self.region.base().add(block::data_offset(offset)) }
  }

  // Offsets handed to the header accessors always come from the block list,
  // and every listed block lies inside the region.

  pub(crate) fn header(
    &self,
    offset: u32,
  ) -> &BlockHeader {
    unsafe { &*self.header_ptr(offset) }
  }

  fn header_mut(
    &mut self,
    offset: u32,
  ) -> &mut BlockHeader {
    unsafe { &mut *self.header_ptr(offset) }
  }

  fn write_header(
    &mut self,
    offset: u32,
    header: BlockHeader,
  ) {
    unsafe { ptr::write(self.header_ptr(offset), header) }
  }

  fn header_ptr(
    &self,
    offset: u32,
  ) -> *mut BlockHeader {
    unsafe { self.region.base().as_ptr().add(offset as usize).cast::<BlockHeader>() }
  }
}
