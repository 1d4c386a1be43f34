use std::mem;

/// Bytes taken by a [`BlockHeader`] in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Encodes "no block" in a header link.
const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Free,
  Taken,
}

impl State {
  const FREE: u32 = 1;
  const TAKEN: u32 = 0;

  fn encode(self) -> u32 {
    match self {
      State::Free => Self::FREE,
      State::Taken => Self::TAKEN,
    }
  }

  fn decode(word: u32) -> Self {
    if word == Self::FREE {
      State::Free
    } else {
      State::Taken
    }
  }
}

/// Metadata written into the region right before a block's payload.
///
/// Links are byte offsets of other headers from the region base, so the list
/// stays meaningful no matter where the region is mapped.
#[repr(C)]
pub struct BlockHeader {
  next: u32,
  prev: u32,
  state: u32,
  size: u32,
}

impl BlockHeader {
  pub fn new(
    size: u32,
    state: State,
    prev: Option<u32>,
    next: Option<u32>,
  ) -> Self {
    Self {
      next: next.unwrap_or(NIL),
      prev: prev.unwrap_or(NIL),
      state: state.encode(),
      size,
    }
  }

  pub fn next(&self) -> Option<u32> {
    (self.next != NIL).then_some(self.next)
  }

  pub fn set_next(
    &mut self,
    next: Option<u32>,
  ) {
    self.next = next.unwrap_or(NIL);
  }

  pub fn prev(&self) -> Option<u32> {
    (self.prev != NIL).then_some(self.prev)
  }

  pub fn set_prev(
    &mut self,
    prev: Option<u32>,
  ) {
    self.prev = prev.unwrap_or(NIL);
  }

  pub fn state(&self) -> State {
    State::decode(self.state)
  }

  pub fn set_state(
    &mut self,
    state: State,
  ) {
    self.state = state.encode();
  }

  pub fn is_free(&self) -> bool {
    self.state() == State::Free
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn set_size(
    &mut self,
    size: u32,
  ) {
    self.size = size;
  }
}

/// Offset of the payload belonging to the header at `offset`.
pub fn data_offset(offset: u32) -> usize {
  offset as usize + HEADER_SIZE
}

/// Offset of the header owning the payload at `data`.
pub fn header_offset(data: usize) -> Option<u32> {
  data
    .checked_sub(HEADER_SIZE)
    .and_then(|offset| u32::try_from(offset).ok())
    .filter(|&offset| offset != NIL)
}

/// Offset right past the payload of a block, where its successor starts.
pub fn end_offset(
  offset: u32,
  size: u32,
) -> usize {
  offset as usize + HEADER_SIZE + size as usize
}

/// Largest offset a block may end at while every header stays addressable.
pub const MAX_END: usize = NIL as usize;
