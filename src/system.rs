use libc::{c_void, free, malloc, realloc};

/// The allocator blocks are carved from.
///
/// Works in raw byte sizes like `malloc(3)`: the block size is not passed
/// back on `reallocate`/`deallocate`, because a handle carries nothing but
/// its address.
///
/// # Safety
///
/// Implementations must return either null or a pointer to at least `size`
/// bytes aligned to `libc::max_align_t`, and `reallocate` must preserve the
/// leading `min(old, new)` bytes exactly like `realloc(3)`.
pub unsafe trait RawAlloc {
  /// Allocates `size` bytes, returning null on failure.
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8;

  /// Grows or shrinks `block` to `size` bytes. On failure returns null and
  /// leaves `block` untouched.
  ///
  /// # Safety
  ///
  /// `block` must come from this allocator and not have been deallocated.
  unsafe fn reallocate(
    &self,
    block: *mut u8,
    size: usize,
  ) -> *mut u8;

  /// Returns `block` to the allocator.
  ///
  /// # Safety
  ///
  /// `block` must come from this allocator and not have been deallocated.
  unsafe fn deallocate(
    &self,
    block: *mut u8,
  );
}

/// Forwards to the C library's `malloc`, `realloc` and `free`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LibcAlloc;

unsafe impl RawAlloc for LibcAlloc {
  #[inline]
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    unsafe { malloc(size) as *mut u8 }
  }

  #[inline]
  unsafe fn reallocate(
    &self,
    block: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { realloc(block as *mut c_void, size) as *mut u8 }
  }

  #[inline]
  unsafe fn deallocate(
    &self,
    block: *mut u8,
  ) {
    unsafe { free(block as *mut c_void) }
  }
}

#[cfg(test)]
mod tests {
  use std::mem;

  use super::*;

  #[test]
  fn test_libc_roundtrip() {
    let alloc = LibcAlloc;

    unsafe {
      let block = alloc.allocate(32);
      assert!(!block.is_null());
      assert_eq!(block as usize % mem::align_of::<libc::max_align_t>(), 0);

      for i in 0..32 {
        block.add(i).write(i as u8);
      }

      let grown = alloc.reallocate(block, 4096);
      assert!(!grown.is_null());

      for i in 0..32 {
        assert_eq!(grown.add(i).read(), i as u8);
      }

      alloc.deallocate(grown);
    }
  }
}
