/// Every payload size handed out by the heap is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Smallest payload a block can carry.
pub const MIN_PAYLOAD: usize = 16;

/// Rounds the given size up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use firstfit::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(24), 24);
/// assert_eq!(align!(25), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Turns a requested byte count into the payload size of the block that will
/// satisfy it.
///
/// Zero stays zero. Anything under [`MIN_PAYLOAD`] becomes [`MIN_PAYLOAD`],
/// everything else is rounded with [`align!`]. Sizes too large to round
/// saturate to `usize::MAX`, which no block can ever hold.
pub fn round_request(size: usize) -> usize {
  match size {
    0 => 0,
    size if size < MIN_PAYLOAD => MIN_PAYLOAD,
    size if size > usize::MAX - (ALIGNMENT - 1) => usize::MAX,
    size => align!(size),
  }
}
