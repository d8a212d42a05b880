//! # refcnt - Intrusive Reference-Counted Buffers
//!
//! This crate lets unrelated owners share a heap-allocated byte buffer and
//! agree, without a garbage collector or a designated owner, on when it is
//! safe to free. It is a thin layer over the C library's `malloc`: every
//! block carries a small header with an atomic owner count in front of the
//! payload, and callers only ever see a pointer to the payload.
//!
//! ## Overview
//!
//! ```text
//!   One Block:
//!   ┌───────────────────────────┬────────────────────────────────┐
//!   │        Header             │           Payload              │
//!   │  ┌─────────────────────┐  │                                │
//!   │  │ magic  (validation) │  │  ┌──────────────────────────┐  │
//!   │  │ refcount (atomic)   │  │  │     N bytes usable       │  │
//!   │  └─────────────────────┘  │  └──────────────────────────┘  │
//!   │       HEADER_SIZE         │                                │
//!   └───────────────────────────┴────────────────────────────────┘
//!                               ▲
//!                               └── Handle returned to callers
//! ```
//!
//! The header is found again by subtracting the fixed `HEADER_SIZE` from
//! the handle, so a bare pointer is all an owner needs to pass around.
//!
//! ```text
//!   Lifetime of a block:
//!
//!   create ─► Live(1) ─duplicate─► Live(2) ─release─► Live(1) ─release─► Freed
//!                                                        (last releaser frees)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   refcnt
//!   ├── align      - Alignment macro (align_to!)
//!   ├── block      - Block header layout and validation (internal)
//!   ├── error      - RefcntError
//!   ├── refcnt     - RefAlloc: create / duplicate / release / resize
//!   ├── shared     - SharedBuf owning handle (clone = duplicate, drop = release)
//!   ├── system     - RawAlloc trait and the libc-backed LibcAlloc
//!   └── trace      - Call-site tracing (traced!)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::thread;
//!
//! let text = refcnt::duplicate_str("Hello, world!").unwrap();
//!
//! let workers: Vec<_> = (0..4)
//!   .map(|_| {
//!     // Each thread gets its own reference, passed as a plain address.
//!     let mine = unsafe { refcnt::duplicate(text) }.as_ptr() as usize;
//!     thread::spawn(move || {
//!       let mine = std::ptr::NonNull::new(mine as *mut u8).unwrap();
//!       unsafe { refcnt::release(mine) };
//!     })
//!   })
//!   .collect();
//!
//! // Whichever owner releases last frees the block.
//! unsafe { refcnt::release(text) };
//!
//! for worker in workers {
//!   worker.join().unwrap();
//! }
//! ```
//!
//! [`SharedBuf`] wraps the same protocol in an owning type:
//!
//! ```rust
//! let buf = refcnt::SharedBuf::from_slice(b"payload").unwrap();
//! let alias = buf.clone();
//! assert_eq!(buf.as_ptr(), alias.as_ptr());
//! ```
//!
//! ## Features
//!
//! - **`validation`**: writes the sentinel `0xDEADBEEF` into each header and
//!   checks it on `duplicate`, `release`, `resize` and `refcount`. A mismatch
//!   means a foreign or corrupted handle and panics.
//! - **`trace`**: every operation emits a TRACE event on the `refcnt` target
//!   with the caller's file, line and column. [`traced!`] adds the enclosing
//!   function and the literal call expression.
//!
//! Both are off by default and cost nothing when off.
//!
//! ## Thread Safety
//!
//! - `create`, `duplicate`, `release` and `duplicate_str` may run
//!   concurrently on the same handle.
//! - `resize` may move the block: the caller must hold the only reference.
//! - The payload itself is not synchronized.
//!
//! ## Limitations
//!
//! - **No pooling**: every block is a separate `malloc`.
//! - **No weak references or cycle detection**.
//! - **Use after release is undefined**: it is caught only if the stale
//!   header happens to fail the sentinel check.

pub mod align;
mod block;
mod error;
mod refcnt;
mod shared;
mod system;
pub mod trace;

use std::{ffi::CStr, ptr::NonNull};

#[cfg(feature = "validation")]
pub use block::MAGIC;
pub use block::HEADER_SIZE;
pub use error::{RefcntError, Result};
pub use refcnt::RefAlloc;
pub use shared::SharedBuf;
pub use system::{LibcAlloc, RawAlloc};

#[doc(hidden)]
pub use tracing as __tracing;

const DEFAULT: RefAlloc = RefAlloc::new();

/// [`RefAlloc::create`] on the libc-backed allocator.
#[cfg_attr(feature = "trace", track_caller)]
pub fn create(size: usize) -> Result<NonNull<u8>> {
  DEFAULT.create(size)
}

/// [`RefAlloc::duplicate_str`] on the libc-backed allocator.
#[cfg_attr(feature = "trace", track_caller)]
pub fn duplicate_str(text: &str) -> Result<NonNull<u8>> {
  DEFAULT.duplicate_str(text)
}

/// [`RefAlloc::duplicate_cstr`] on the libc-backed allocator.
#[cfg_attr(feature = "trace", track_caller)]
pub fn duplicate_cstr(text: &CStr) -> Result<NonNull<u8>> {
  DEFAULT.duplicate_cstr(text)
}

/// [`RefAlloc::duplicate`] on the libc-backed allocator.
///
/// # Safety
///
/// `handle` must come from this module's allocation functions and still be
/// owned by the caller.
#[cfg_attr(feature = "trace", track_caller)]
pub unsafe fn duplicate(handle: NonNull<u8>) -> NonNull<u8> {
  unsafe { DEFAULT.duplicate(handle) }
}

/// [`RefAlloc::release`] on the libc-backed allocator.
///
/// # Safety
///
/// `handle` must come from this module's allocation functions and be owned
/// by the caller, who must not use it afterwards.
#[cfg_attr(feature = "trace", track_caller)]
pub unsafe fn release(handle: NonNull<u8>) {
  unsafe { DEFAULT.release(handle) }
}

/// [`RefAlloc::resize`] on the libc-backed allocator.
///
/// # Safety
///
/// As for [`RefAlloc::resize`]: the caller needs exclusive access.
#[cfg_attr(feature = "trace", track_caller)]
pub unsafe fn resize(
  handle: NonNull<u8>,
  new_size: usize,
) -> Result<NonNull<u8>> {
  unsafe { DEFAULT.resize(handle, new_size) }
}

/// [`RefAlloc::refcount`] on the libc-backed allocator.
///
/// # Safety
///
/// `handle` must come from this module's allocation functions and still be
/// owned by the caller.
#[cfg_attr(feature = "trace", track_caller)]
pub unsafe fn refcount(handle: NonNull<u8>) -> usize {
  unsafe { DEFAULT.refcount(handle) }
}
