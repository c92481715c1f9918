//! Various macros. The `u` prefixed macros such as `uassert!` avoid performing any checks if the `unsafe` feature is active.

#![allow(unused_macros)]

/// Log topology construction to stderr. Compiles to nothing without the `trace` feature.
macro_rules! trace {
    ($fmt:expr $(,)? $(, $($name:expr),+ $(,)?)?) => {
        #[cfg(feature = "trace")]
        {
            let f = format!($fmt, $($($name),+)?);
            eprintln!("[{}:{}:{}] {f}", file!(), line!(), column!())
        }
    };
}
pub(crate) use trace;

/// Unsafe assert.
macro_rules! uassert {
    ($e:expr) => {{
        #[cfg(all(not(feature = "unsafe"), debug_assertions))]
        {
            assert!($e)
        }
        #[cfg(feature = "unsafe")]
        {
            unsafe { core::hint::assert_unchecked($e) }
        }
    }};
}
pub(crate) use uassert;

/// Unsafe unreachable
macro_rules! uunreachable {
    () => {{
        #[cfg(not(feature = "unsafe"))]
        let _res = unreachable!();
        #[cfg(feature = "unsafe")]
        let _res = unsafe { core::hint::unreachable_unchecked() };
        #[allow(unreachable_code)]
        _res
    }};
}
pub(crate) use uunreachable;
