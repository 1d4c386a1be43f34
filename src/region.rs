use std::{error, fmt, ptr, ptr::NonNull};

use libc::{brk, c_void, intptr_t, sbrk};

use crate::align::ALIGNMENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
  /// The backing store refused to hand out `requested` more bytes.
  Exhausted { requested: usize },
  /// Something other than the owner moved the end of the region, so the new
  /// bytes would not sit right after the old ones.
  Discontiguous,
}

impl fmt::Display for RegionError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      RegionError::Exhausted { requested } => {
        write!(f, "region cannot grow by {requested} bytes")
      }
      RegionError::Discontiguous => {
        write!(f, "region end was moved by another owner")
      }
    }
  }
}

impl error::Error for RegionError {}

/// A contiguous byte range that only grows or shrinks at its high end.
///
/// # Safety
///
/// Implementors guarantee that `[base, base + len)` is valid for reads and
/// writes for as long as the region lives, that `base` is aligned to
/// [`ALIGNMENT`] and never changes, and that a failed [`Region::extend`]
/// leaves the region untouched.
pub unsafe trait Region {
  fn base(&self) -> NonNull<u8>;

  fn len(&self) -> usize;

  /// Grows the region by `increment` bytes and returns the previous length,
  /// which is the offset of the first new byte.
  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<usize, RegionError>;

  /// Moves the end of the region back to `new_len`.
  fn contract(
    &mut self,
    new_len: usize,
  );

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Address one past the last byte of the region.
  fn end(&self) -> *mut u8 {
    self.base().as_ptr().wrapping_add(self.len())
  }
}

/// The process data segment, moved with `sbrk(2)` / `brk(2)`.
///
/// Only one of these should exist per process. Any other code moving the
/// program break in between (the system `malloc` may do so) makes the next
/// [`Region::extend`] fail with [`RegionError::Discontiguous`].
pub struct SbrkRegion {
  base: NonNull<u8>,
  len: usize,
}

impl SbrkRegion {
  /// Starts a region at the current program break, padded up to
  /// [`ALIGNMENT`].
  pub fn new() -> Result<Self, RegionError> {
    unsafe {
      let current = sbrk(0);

      if current == usize::MAX as *mut c_void {
        return Err(RegionError::Exhausted { requested: 0 });
      }

      let address = current as usize;
      let padding = crate::align!(address) - address;

      if padding > 0 && sbrk(padding as intptr_t) == usize::MAX as *mut c_void {
        return Err(RegionError::Exhausted { requested: padding });
      }

      let base = NonNull::new((current as *mut u8).add(padding))
        .ok_or(RegionError::Exhausted { requested: padding })?;

      log::debug!("sbrk region starts at {:?} (padded {} bytes)", base, padding);

      Ok(Self { base, len: 0 })
    }
  }
}

unsafe impl Region for SbrkRegion {
  fn base(&self) -> NonNull<u8> {
    self.base
  }

  fn len(&self) -> usize {
    self.len
  }

  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<usize, RegionError> {
    let delta = intptr_t::try_from(increment).map_err(|_| RegionError::Exhausted {
      requested: increment,
    })?;

    unsafe {
      let previous = sbrk(delta);

      if previous == usize::MAX as *mut c_void {
        return Err(RegionError::Exhausted {
          requested: increment,
        });
      }

      if previous as *mut u8 != self.end() {
        sbrk(-delta);
        return Err(RegionError::Discontiguous);
      }
    }

    let previous_len = self.len;
    self.len += increment;

    Ok(previous_len)
  }

  fn contract(
    &mut self,
    new_len: usize,
  ) {
    assert!(new_len <= self.len, "cannot contract a region upwards");

    unsafe {
      if sbrk(0) as *mut u8 == self.end() {
        brk(self.base.as_ptr().add(new_len) as *mut c_void);
      } else {
        log::warn!(
          "program break moved past {:?}, keeping {} trailing bytes mapped",
          self.end(),
          self.len - new_len
        );
      }
    }

    self.len = new_len;
  }
}

/// A fixed-capacity buffer whose end moves like a program break.
///
/// Addresses are stable for the lifetime of the region and nothing else can
/// touch its end, which makes it the region of choice for tests.
pub struct FixedRegion {
  base: NonNull<u8>,
  words: usize,
  len: usize,
}

impl FixedRegion {
  pub fn with_capacity(capacity: usize) -> Self {
    let words = capacity.div_ceil(ALIGNMENT);
    let buffer: &'static mut [u64] = Box::leak(vec![0u64; words].into_boxed_slice());

    Self {
      base: NonNull::from(buffer).cast::<u8>(),
      words,
      len: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.words * ALIGNMENT
  }
}

unsafe impl Region for FixedRegion {
  fn base(&self) -> NonNull<u8> {
    self.base
  }

  fn len(&self) -> usize {
    self.len
  }

  fn extend(
    &mut self,
    increment: usize,
  ) -> Result<usize, RegionError> {
    let new_len = self
      .len
      .checked_add(increment)
      .filter(|&new_len| new_len <= self.capacity())
      .ok_or(RegionError::Exhausted {
        requested: increment,
      })?;

    let previous_len = self.len;
    self.len = new_len;

    Ok(previous_len)
  }

  fn contract(
    &mut self,
    new_len: usize,
  ) {
    assert!(new_len <= self.len, "cannot contract a region upwards");
    self.len = new_len;
  }
}

impl Drop for FixedRegion {
  fn drop(&mut self) {
    unsafe {
      let words = ptr::slice_from_raw_parts_mut(self.base.as_ptr().cast::<u64>(), self.words);
      drop(Box::from_raw(words));
    }
  }
}
