//! Shares one string between many threads.
//!
//! Each thread receives its own reference as a plain address, duplicates
//! and releases it in a tight loop, then releases its reference. The main
//! thread gives up its reference right after spawning, so whichever thread
//! finishes last frees the string.
//!
//! ```text
//! cargo run --example threads
//! RUST_LOG=refcnt=trace cargo run --example threads --features trace,validation
//! ```

use std::{ptr::NonNull, thread};

use tracing::info;
use tracing_subscriber::EnvFilter;

const NUM_THREADS: usize = 128;
const NUM_ITERATIONS: usize = 10_000;

fn worker(addr: usize) {
  let text = NonNull::new(addr as *mut u8).expect("worker got a null handle");

  for i in 0..NUM_ITERATIONS {
    let copy = unsafe { refcnt::traced!(refcnt::duplicate(text)) };

    if i % 2_500 == 0 {
      let value = unsafe { std::ffi::CStr::from_ptr(copy.as_ptr() as *const libc::c_char) };
      info!(thread = ?thread::current().id(), i, value = ?value, "using shared string");
    }

    unsafe { refcnt::traced!(refcnt::release(copy)) };
  }

  unsafe { refcnt::traced!(refcnt::release(text)) };
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let text = refcnt::duplicate_str("Hello, world!").expect("out of memory");

  let threads: Vec<_> = (0..NUM_THREADS)
    .map(|_| {
      // Raw handles cross threads as plain addresses.
      let addr = unsafe { refcnt::duplicate(text) }.as_ptr() as usize;
      thread::spawn(move || worker(addr))
    })
    .collect();

  // We no longer own the reference.
  unsafe { refcnt::release(text) };

  for handle in threads {
    handle.join().expect("worker panicked");
  }

  info!(threads = NUM_THREADS, iterations = NUM_ITERATIONS, "all workers done");
}
