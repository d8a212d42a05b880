use std::{
  ffi::CStr,
  fmt,
  mem::{self, ManuallyDrop},
  ops::Deref,
  ptr::{self, NonNull},
  slice,
};

use crate::{
  error::{RefcntError, Result},
  refcnt::RefAlloc,
  system::{LibcAlloc, RawAlloc},
};

/// An owning handle to a reference-counted byte buffer.
///
/// `clone` duplicates the handle and `drop` releases it, so the block is
/// freed when the last `SharedBuf` (or raw owner obtained with
/// [`into_raw`](Self::into_raw)) goes away. The bytes are shared, not copied:
/// every clone points at the same memory.
///
/// ```rust
/// use refcnt::SharedBuf;
///
/// let greeting = SharedBuf::from_str("Hello").unwrap();
/// let alias = greeting.clone();
///
/// assert_eq!(greeting.as_ptr(), alias.as_ptr());
/// assert_eq!(&*alias, b"Hello\0");
/// assert_eq!(greeting.refcount(), 2);
/// ```
pub struct SharedBuf<A: RawAlloc + Clone = LibcAlloc> {
  ptr: NonNull<u8>,
  len: usize,
  alloc: RefAlloc<A>,
}

// The count is atomic and the payload is only mutable through `&mut self`
// while unique, so owners may live on any thread.
unsafe impl<A: RawAlloc + Clone + Send + Sync> Send for SharedBuf<A> {}
unsafe impl<A: RawAlloc + Clone + Send + Sync> Sync for SharedBuf<A> {}

impl SharedBuf<LibcAlloc> {
  /// A zero-filled buffer of `len` bytes.
  pub fn new(len: usize) -> Result<Self> {
    Self::new_in(len, LibcAlloc)
  }

  /// A buffer holding a copy of `bytes`.
  pub fn from_slice(bytes: &[u8]) -> Result<Self> {
    Self::from_slice_in(bytes, LibcAlloc)
  }

  /// A buffer holding `text` followed by a zero byte.
  #[allow(clippy::should_implement_trait)]
  pub fn from_str(text: &str) -> Result<Self> {
    Self::from_str_in(text, LibcAlloc)
  }

  /// Takes ownership of a raw handle of `len` bytes.
  ///
  /// # Safety
  ///
  /// See [`from_raw_in`](Self::from_raw_in).
  pub unsafe fn from_raw(
    handle: NonNull<u8>,
    len: usize,
  ) -> Self {
    unsafe { Self::from_raw_in(handle, len, LibcAlloc) }
  }
}

impl<A: RawAlloc + Clone> SharedBuf<A> {
  #[cfg_attr(feature = "trace", track_caller)]
  pub fn new_in(
    len: usize,
    raw: A,
  ) -> Result<Self> {
    let alloc = RefAlloc::with_allocator(raw);
    let ptr = alloc.create(len)?;

    unsafe { ptr.as_ptr().write_bytes(0, len) };

    Ok(Self { ptr, len, alloc })
  }

  #[cfg_attr(feature = "trace", track_caller)]
  pub fn from_slice_in(
    bytes: &[u8],
    raw: A,
  ) -> Result<Self> {
    let alloc = RefAlloc::with_allocator(raw);
    let ptr = alloc.create(bytes.len())?;

    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };

    Ok(Self {
      ptr,
      len: bytes.len(),
      alloc,
    })
  }

  #[cfg_attr(feature = "trace", track_caller)]
  pub fn from_str_in(
    text: &str,
    raw: A,
  ) -> Result<Self> {
    let alloc = RefAlloc::with_allocator(raw);
    let ptr = alloc.duplicate_str(text)?;

    Ok(Self {
      ptr,
      len: text.len() + 1,
      alloc,
    })
  }

  /// Takes ownership of one reference to a raw handle.
  ///
  /// # Safety
  ///
  /// `handle` must come from a [`RefAlloc`] over an allocator equivalent to
  /// `raw`, the caller must own one reference to it and hand that reference
  /// over, and at least `len` payload bytes must be initialized.
  pub unsafe fn from_raw_in(
    handle: NonNull<u8>,
    len: usize,
    raw: A,
  ) -> Self {
    Self {
      ptr: handle,
      len,
      alloc: RefAlloc::with_allocator(raw),
    }
  }

  /// Gives up this owner's reference as a raw handle without releasing it.
  /// Pair with [`from_raw`](SharedBuf::from_raw) or a raw
  /// [`release`](RefAlloc::release) on the same allocator.
  pub fn into_raw(self) -> NonNull<u8> {
    let this = ManuallyDrop::new(self);
    // The allocator is dropped here; the reference itself is handed over.
    drop(unsafe { ptr::read(&this.alloc) });
    this.ptr
  }

  pub fn as_ptr(&self) -> *const u8 {
    self.ptr.as_ptr()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn as_bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }

  /// The bytes up to the first zero byte, if there is one.
  pub fn as_c_str(&self) -> Option<&CStr> {
    CStr::from_bytes_until_nul(self.as_bytes()).ok()
  }

  /// Number of owners of the underlying block.
  #[cfg_attr(feature = "trace", track_caller)]
  pub fn refcount(&self) -> usize {
    unsafe { self.alloc.refcount(self.ptr) }
  }

  pub fn is_unique(&self) -> bool {
    self.refcount() == 1
  }

  /// Mutable access to the bytes, only while this is the sole owner.
  pub fn get_mut(&mut self) -> Option<&mut [u8]> {
    if !self.is_unique() {
      return None;
    }

    Some(unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) })
  }

  /// Resizes the buffer, zero-filling any new tail. Refuses with
  /// [`RefcntError::Shared`] unless this is the sole owner, since other
  /// owners would be left holding the old address.
  #[cfg_attr(feature = "trace", track_caller)]
  pub fn try_resize(
    &mut self,
    new_len: usize,
  ) -> Result<()> {
    let refcount = self.refcount();

    if refcount != 1 {
      return Err(RefcntError::Shared { refcount });
    }

    let ptr = unsafe { self.alloc.resize(self.ptr, new_len)? };

    if new_len > self.len {
      unsafe { ptr.as_ptr().add(self.len).write_bytes(0, new_len - self.len) };
    }

    self.ptr = ptr;
    self.len = new_len;

    Ok(())
  }

  pub fn allocator(&self) -> &A {
    self.alloc.allocator()
  }
}

impl<A: RawAlloc + Clone> Clone for SharedBuf<A> {
  #[cfg_attr(feature = "trace", track_caller)]
  fn clone(&self) -> Self {
    Self {
      ptr: unsafe { self.alloc.duplicate(self.ptr) },
      len: self.len,
      alloc: self.alloc.clone(),
    }
  }
}

impl<A: RawAlloc + Clone> Drop for SharedBuf<A> {
  fn drop(&mut self) {
    unsafe { self.alloc.release(self.ptr) }
  }
}

impl<A: RawAlloc + Clone> Deref for SharedBuf<A> {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    self.as_bytes()
  }
}

impl<A: RawAlloc + Clone> AsRef<[u8]> for SharedBuf<A> {
  fn as_ref(&self) -> &[u8] {
    self.as_bytes()
  }
}

impl<A: RawAlloc + Clone> fmt::Debug for SharedBuf<A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("SharedBuf")
      .field("ptr", &self.ptr)
      .field("len", &self.len)
      .field("refcount", &self.refcount())
      .finish()
  }
}

const _: () = assert!(mem::size_of::<SharedBuf>() == 2 * mem::size_of::<usize>());
