use std::{
  ptr::{self, NonNull},
  sync::{
    Arc, Barrier,
    atomic::{AtomicUsize, Ordering},
  },
  thread,
  time::Duration,
};

use proptest::prelude::*;
use refcnt::{LibcAlloc, RawAlloc, RefAlloc, SharedBuf};

const NUM_THREADS: usize = 128;
const NUM_ITERATIONS: usize = 10_000;

/// Libc allocator that counts frees.
#[derive(Clone, Default)]
struct FreeCounter(Arc<AtomicUsize>);

impl FreeCounter {
  fn frees(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

unsafe impl RawAlloc for FreeCounter {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    LibcAlloc.allocate(size)
  }

  unsafe fn reallocate(
    &self,
    block: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { LibcAlloc.reallocate(block, size) }
  }

  unsafe fn deallocate(
    &self,
    block: *mut u8,
  ) {
    self.0.fetch_add(1, Ordering::SeqCst);
    unsafe { LibcAlloc.deallocate(block) }
  }
}

/// Raw handles are plain addresses; threads receive them untyped.
#[derive(Clone, Copy)]
struct SendHandle(usize);

impl SendHandle {
  fn new(handle: NonNull<u8>) -> Self {
    Self(handle.as_ptr() as usize)
  }

  fn get(self) -> NonNull<u8> {
    NonNull::new(self.0 as *mut u8).unwrap()
  }
}

#[test]
fn stress_many_threads_free_once() {
  let counter = FreeCounter::default();
  let alloc = RefAlloc::with_allocator(counter.clone());
  let text = alloc.duplicate_str("Hello, world!").unwrap();

  let workers: Vec<_> = (0..NUM_THREADS)
    .map(|_| {
      let mine = SendHandle::new(unsafe { alloc.duplicate(text) });
      let counter = counter.clone();

      thread::spawn(move || {
        let alloc = RefAlloc::with_allocator(counter);
        let mine = mine.get();

        for _ in 0..NUM_ITERATIONS {
          unsafe {
            let copy = alloc.duplicate(mine);
            assert_eq!(copy, mine);
            assert_eq!(*copy.as_ptr(), b'H');
            alloc.release(copy);
          }
        }

        unsafe { alloc.release(mine) };
      })
    })
    .collect();

  // The creator no longer owns the string; the last worker frees it.
  unsafe { alloc.release(text) };

  for worker in workers {
    worker.join().unwrap();
  }

  assert_eq!(counter.frees(), 1);
}

#[test]
fn shared_buf_stress_frees_once() {
  let counter = FreeCounter::default();
  let buf = SharedBuf::from_str_in("Hello, world!", counter.clone()).unwrap();
  let start = Arc::new(Barrier::new(16));

  let workers: Vec<_> = (0..16)
    .map(|_| {
      let mine = buf.clone();
      let start = Arc::clone(&start);

      thread::spawn(move || {
        start.wait();

        for _ in 0..NUM_ITERATIONS {
          let copy = mine.clone();
          assert_eq!(copy.as_c_str().unwrap().to_bytes(), b"Hello, world!");
        }
      })
    })
    .collect();

  drop(buf);

  for worker in workers {
    worker.join().unwrap();
  }

  assert_eq!(counter.frees(), 1);
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  #[test]
  fn last_releaser_frees_regardless_of_order(
    delays in proptest::collection::vec(0u64..200, 1..24),
    creator_delay in 0u64..200,
  ) {
    let counter = FreeCounter::default();
    let alloc = RefAlloc::with_allocator(counter.clone());
    let handle = alloc.create(64).unwrap();
    unsafe { ptr::write_bytes(handle.as_ptr(), 0xAB, 64) };

    let workers: Vec<_> = delays
      .iter()
      .map(|&delay| {
        let mine = SendHandle::new(unsafe { alloc.duplicate(handle) });
        let counter = counter.clone();

        thread::spawn(move || {
          let alloc = RefAlloc::with_allocator(counter);
          thread::sleep(Duration::from_micros(delay));
          unsafe { alloc.release(mine.get()) };
        })
      })
      .collect();

    thread::sleep(Duration::from_micros(creator_delay));
    unsafe { alloc.release(handle) };

    for worker in workers {
      worker.join().unwrap();
    }

    prop_assert_eq!(counter.frees(), 1);
  }
}
