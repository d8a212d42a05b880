//! Call-site tracing, compiled in with the `trace` feature.
//!
//! Every public allocator operation emits one TRACE event on the `refcnt`
//! target carrying the operation name and the caller's file, line and
//! column. Wrapping a call in [`traced!`](crate::traced) additionally records
//! the enclosing function and the literal call expression as a span around
//! that event:
//!
//! ```text
//! TRACE refcnt_call{file="src/main.rs" line=12 function=app::worker call="alloc.release(h)"}:
//!   refcnt: call op="release" file="src/main.rs" line=12 column=14 handle=0x5581...
//! ```
//!
//! Without the feature both the events and the span vanish at compile time.

/// Emits the per-operation record. Must be expanded inside a
/// `#[track_caller]` function so the location is the user's call site.
#[cfg(feature = "trace")]
macro_rules! trace_call {
  ($op:literal $(, $field:ident)* $(,)?) => {{
    let location = ::std::panic::Location::caller();
    ::tracing::trace!(
      target: "refcnt",
      op = $op,
      file = location.file(),
      line = location.line(),
      column = location.column(),
      $($field = ?$field,)*
      "call"
    );
  }};
}

#[cfg(not(feature = "trace"))]
macro_rules! trace_call {
  ($($ignored:tt)*) => {};
}

pub(crate) use trace_call;

/// Evaluates a call expression inside a span naming its call site.
///
/// ```rust
/// let handle = refcnt::traced!(refcnt::create(16)).unwrap();
/// unsafe { refcnt::traced!(refcnt::release(handle)) };
/// ```
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! traced {
  ($call:expr) => {{
    fn __refcnt_here() {}
    let span = $crate::__tracing::trace_span!(
      target: "refcnt",
      "refcnt_call",
      file = ::core::file!(),
      line = ::core::line!(),
      function = $crate::trace::enclosing_function(::core::any::type_name_of_val(&__refcnt_here)),
      call = ::core::stringify!($call),
    );
    let _entered = span.enter();
    $call
  }};
}

/// Evaluates a call expression. The `trace` feature is off, so nothing is
/// recorded.
///
/// ```rust
/// let handle = refcnt::traced!(refcnt::create(16)).unwrap();
/// unsafe { refcnt::traced!(refcnt::release(handle)) };
/// ```
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! traced {
  ($call:expr) => {
    $call
  };
}

/// Strips the marker item `traced!` declares from its type name, leaving the
/// path of the function the macro was expanded in.
#[doc(hidden)]
pub fn enclosing_function(marker: &'static str) -> &'static str {
  marker.strip_suffix("::__refcnt_here").unwrap_or(marker)
}
