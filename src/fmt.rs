//! Internal logging macros. Expand to `defmt` calls when the `defmt`
//! feature is enabled and to nothing otherwise, so call sites never need
//! their own `#[cfg(feature = "defmt")]` guard. Mirrors the `fmt.rs` shim
//! embassy crates carry for the same reason: `defmt` is an optional
//! dependency, so call sites can't reference it unconditionally.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
    };
}

// Named `warn_log` rather than `warn`: the bare name collides with the
// built-in `#[warn(...)]` lint-level attribute.
macro_rules! warn_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)*);
    };
}

pub(crate) use debug;
pub(crate) use trace;
pub(crate) use warn_log;
