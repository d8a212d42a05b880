use std::{
  mem,
  ptr::{self, NonNull},
  sync::atomic::AtomicUsize,
};

#[cfg(feature = "validation")]
use crate::error::RefcntError;

/// Sentinel written at the start of every header when validation is on.
#[cfg(feature = "validation")]
pub const MAGIC: u32 = 0xDEAD_BEEF;

/// Metadata stored in front of every payload.
///
/// ```text
///   block                          handle
///   ▼                              ▼
///   ┌───────┬──────────┬─────────┬──────────────────────┐
///   │ magic │ refcount │ padding │ payload ...          │
///   └───────┴──────────┴─────────┴──────────────────────┘
///   ◄──────────── HEADER_SIZE ──►
/// ```
#[repr(C)]
pub struct Header {
  #[cfg(feature = "validation")]
  pub magic: u32,
  pub refcount: AtomicUsize,
}

/// Distance from the start of a block to its payload. Rounded up to the
/// strictest fundamental alignment so payloads are as aligned as `malloc`'s.
pub const HEADER_SIZE: usize = crate::align_to!(
  mem::size_of::<Header>(),
  mem::align_of::<libc::max_align_t>()
);

impl Header {
  /// Writes a fresh header owning one reference at `block`.
  ///
  /// # Safety
  ///
  /// `block` must be valid for writes of `HEADER_SIZE` bytes and aligned for
  /// `Header`.
  pub unsafe fn init(block: NonNull<u8>) {
    let header = Header {
      #[cfg(feature = "validation")]
      magic: MAGIC,
      refcount: AtomicUsize::new(1),
    };

    unsafe { ptr::write(block.as_ptr() as *mut Header, header) }
  }
}

/// Steps back from a payload handle to its header.
///
/// # Safety
///
/// `handle` must point `HEADER_SIZE` bytes past the start of a block.
#[inline]
pub unsafe fn header_of(handle: NonNull<u8>) -> NonNull<Header> {
  unsafe { NonNull::new_unchecked(handle.as_ptr().sub(HEADER_SIZE) as *mut Header) }
}

/// Steps forward from a block start to its payload.
///
/// # Safety
///
/// `block` must be valid for at least `HEADER_SIZE` bytes.
#[inline]
pub unsafe fn payload_of(block: NonNull<u8>) -> NonNull<u8> {
  unsafe { NonNull::new_unchecked(block.as_ptr().add(HEADER_SIZE)) }
}

/// Panics unless the header in front of `handle` carries the sentinel.
///
/// # Safety
///
/// The `HEADER_SIZE` bytes before `handle` must be readable.
#[cfg(feature = "validation")]
#[inline]
#[cfg_attr(feature = "trace", track_caller)]
pub unsafe fn validate(handle: NonNull<u8>) {
  let found = unsafe { ptr::read(ptr::addr_of!((*header_of(handle).as_ptr()).magic)) };

  if found != MAGIC {
    invalid_handle(handle, found);
  }
}

#[cfg(not(feature = "validation"))]
#[inline(always)]
pub unsafe fn validate(_handle: NonNull<u8>) {}

#[cfg(feature = "validation")]
#[cold]
#[inline(never)]
#[cfg_attr(feature = "trace", track_caller)]
fn invalid_handle(
  handle: NonNull<u8>,
  found: u32,
) -> ! {
  let error = RefcntError::InvalidHandle {
    addr: handle.as_ptr() as usize,
    found,
  };

  tracing::error!(
    target: "refcnt",
    handle = ?handle,
    found,
    "handle was not produced by this allocator"
  );
  panic!("{error}");
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use super::*;

  #[test]
  fn test_header_offset_is_max_aligned() {
    let alignment = mem::align_of::<libc::max_align_t>();

    assert_eq!(HEADER_SIZE % alignment, 0);
    assert!(HEADER_SIZE >= mem::size_of::<Header>());
    assert!(alignment >= mem::align_of::<Header>());
  }

  #[test]
  fn test_header_roundtrip() {
    let mut storage = vec![0u128; 8];
    let block = NonNull::new(storage.as_mut_ptr() as *mut u8).unwrap();

    unsafe {
      Header::init(block);

      let handle = payload_of(block);
      assert_eq!(handle.as_ptr() as usize - block.as_ptr() as usize, HEADER_SIZE);

      let header = header_of(handle);
      assert_eq!(header.as_ptr() as *mut u8, block.as_ptr());
      assert_eq!(header.as_ref().refcount.load(Ordering::Relaxed), 1);

      validate(handle);
    }
  }

  #[cfg(feature = "validation")]
  #[test]
  #[should_panic(expected = "header sentinel is 0x00000000")]
  fn test_zeroed_header_is_rejected() {
    let mut storage = vec![0u128; 8];
    let block = NonNull::new(storage.as_mut_ptr() as *mut u8).unwrap();

    unsafe { validate(payload_of(block)) }
  }
}
