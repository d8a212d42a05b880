//! Error type shared by the raw allocator API and [`SharedBuf`](crate::SharedBuf).

use thiserror::Error;

/// Errors surfaced by the reference-counted allocator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RefcntError {
  /// The underlying allocator could not satisfy a request, or the header
  /// plus payload size does not fit in `usize`.
  #[error("out of memory: could not allocate a block for {requested} payload bytes")]
  OutOfMemory {
    /// Payload bytes requested by the caller, header excluded.
    requested: usize,
  },

  /// A handle whose header sentinel does not match. Never returned: the
  /// validation layer panics with this message instead.
  #[error("invalid refcnt handle {addr:#x}: header sentinel is {found:#010x}")]
  InvalidHandle {
    /// Address of the rejected handle.
    addr: usize,
    /// Sentinel value found in the header.
    found: u32,
  },

  /// The block has more than one owner, so it cannot be mutated or moved.
  #[error("block is shared by {refcount} owners")]
  Shared {
    /// Owner count observed at the time of the call.
    refcount: usize,
  },
}

impl RefcntError {
  #[inline]
  pub(crate) fn out_of_memory(requested: usize) -> Self {
    Self::OutOfMemory { requested }
  }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RefcntError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_name_the_offending_values() {
    assert_eq!(
      RefcntError::out_of_memory(64).to_string(),
      "out of memory: could not allocate a block for 64 payload bytes"
    );
    assert_eq!(
      RefcntError::InvalidHandle { addr: 0x1000, found: 0 }.to_string(),
      "invalid refcnt handle 0x1000: header sentinel is 0x00000000"
    );
    assert_eq!(RefcntError::Shared { refcount: 3 }.to_string(), "block is shared by 3 owners");
  }
}
