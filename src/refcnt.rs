use std::{
  ffi::CStr,
  process,
  ptr::{self, NonNull},
  sync::atomic::{self, Ordering},
};

use tracing::debug;

use crate::{
  block::{self, HEADER_SIZE, Header},
  error::{RefcntError, Result},
  system::{LibcAlloc, RawAlloc},
  trace::trace_call,
};

/// Counts beyond this abort the process instead of wrapping to zero.
const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Hands out reference-counted blocks carved from `A`.
///
/// Handles are plain payload pointers. Whatever allocator created a handle
/// must be the one that duplicates, releases and resizes it.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefAlloc<A: RawAlloc = LibcAlloc> {
  raw: A,
}

impl RefAlloc<LibcAlloc> {
  pub const fn new() -> Self {
    Self { raw: LibcAlloc }
  }
}

impl<A: RawAlloc> RefAlloc<A> {
  pub const fn with_allocator(raw: A) -> Self {
    Self { raw }
  }

  /// The allocator blocks are carved from.
  pub fn allocator(&self) -> &A {
    &self.raw
  }

  /// Allocates a block with `size` uninitialized payload bytes and one owner.
  #[cfg_attr(feature = "trace", track_caller)]
  pub fn create(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    trace_call!("create", size);

    self.create_block(size)
  }

  /// Copies `text` into a new block followed by a terminating zero byte.
  #[cfg_attr(feature = "trace", track_caller)]
  pub fn duplicate_str(
    &self,
    text: &str,
  ) -> Result<NonNull<u8>> {
    trace_call!("duplicate_str", text);

    self.copy_terminated(text.as_bytes())
  }

  /// Copies a C string, terminator included, into a new block.
  #[cfg_attr(feature = "trace", track_caller)]
  pub fn duplicate_cstr(
    &self,
    text: &CStr,
  ) -> Result<NonNull<u8>> {
    trace_call!("duplicate_cstr", text);

    self.copy_terminated(text.to_bytes())
  }

  /// Adds an owner to the block and returns the same handle.
  ///
  /// # Safety
  ///
  /// `handle` must come from this allocator and still be owned by the caller.
  #[cfg_attr(feature = "trace", track_caller)]
  pub unsafe fn duplicate(
    &self,
    handle: NonNull<u8>,
  ) -> NonNull<u8> {
    trace_call!("duplicate", handle);

    unsafe {
      block::validate(handle);

      // A new owner can only be made from an existing one, so the block
      // cannot be freed concurrently and no ordering is needed here.
      let old = block::header_of(handle).as_ref().refcount.fetch_add(1, Ordering::Relaxed);

      if old > MAX_REFCOUNT {
        process::abort();
      }
    }

    handle
  }

  /// Drops one owner. The call that drops the last one frees the block.
  ///
  /// # Safety
  ///
  /// `handle` must come from this allocator and be owned by the caller, who
  /// gives up that ownership. The handle must not be used afterwards.
  #[cfg_attr(feature = "trace", track_caller)]
  pub unsafe fn release(
    &self,
    handle: NonNull<u8>,
  ) {
    trace_call!("release", handle);

    unsafe {
      block::validate(handle);

      let header = block::header_of(handle);

      if header.as_ref().refcount.fetch_sub(1, Ordering::Release) != 1 {
        return;
      }

      // Every other owner's writes to the payload happen before the free.
      atomic::fence(Ordering::Acquire);

      debug!(target: "refcnt", ?handle, "last owner released, freeing block");
      self.raw.deallocate(header.as_ptr() as *mut u8);
    }
  }

  /// Moves the block to one with room for `new_size` payload bytes, keeping
  /// the header and the leading bytes that fit. On failure the original
  /// handle stays valid.
  ///
  /// # Safety
  ///
  /// `handle` must come from this allocator and the caller must have
  /// exclusive access to it for the duration of the call: no other thread
  /// may duplicate, release or resize it. Copies of the old handle held by
  /// other owners dangle if the block moves.
  #[cfg_attr(feature = "trace", track_caller)]
  pub unsafe fn resize(
    &self,
    handle: NonNull<u8>,
    new_size: usize,
  ) -> Result<NonNull<u8>> {
    trace_call!("resize", handle, new_size);

    unsafe {
      block::validate(handle);

      let total = HEADER_SIZE
        .checked_add(new_size)
        .ok_or_else(|| RefcntError::out_of_memory(new_size))?;
      let old = block::header_of(handle).as_ptr() as *mut u8;
      let block = NonNull::new(self.raw.reallocate(old, total))
        .ok_or_else(|| RefcntError::out_of_memory(new_size))?;

      let resized = block::payload_of(block);
      debug!(target: "refcnt", from = ?handle, to = ?resized, new_size, "resized block");

      Ok(resized)
    }
  }

  /// Current number of owners. Stale as soon as it is read unless the
  /// caller is the only owner.
  ///
  /// # Safety
  ///
  /// `handle` must come from this allocator and still be owned by the caller.
  #[cfg_attr(feature = "trace", track_caller)]
  pub unsafe fn refcount(
    &self,
    handle: NonNull<u8>,
  ) -> usize {
    trace_call!("refcount", handle);

    unsafe {
      block::validate(handle);
      block::header_of(handle).as_ref().refcount.load(Ordering::Acquire)
    }
  }

  fn create_block(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let total = HEADER_SIZE
      .checked_add(size)
      .ok_or_else(|| RefcntError::out_of_memory(size))?;
    let block = NonNull::new(self.raw.allocate(total))
      .ok_or_else(|| RefcntError::out_of_memory(size))?;

    unsafe {
      Header::init(block);
      Ok(block::payload_of(block))
    }
  }

  fn copy_terminated(
    &self,
    bytes: &[u8],
  ) -> Result<NonNull<u8>> {
    let size = bytes
      .len()
      .checked_add(1)
      .ok_or_else(|| RefcntError::out_of_memory(bytes.len()))?;
    let handle = self.create_block(size)?;

    unsafe {
      ptr::copy_nonoverlapping(bytes.as_ptr(), handle.as_ptr(), bytes.len());
      handle.as_ptr().add(bytes.len()).write(0);
    }

    Ok(handle)
  }
}
