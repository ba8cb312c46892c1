//! The error taxonomy from the design's error-handling section, as a
//! concrete enum instead of ad hoc bool/`Option` returns. Nothing here
//! unwinds: every fallible API returns `Result<T, Error>`, and protocol-
//! level outcomes (exceptions, timeouts) are still delivered through the
//! response callback, not through this type — `Error` is for the API edge
//! (`init`, `submit`, `register`), not for the async completion path.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Null/invalid handle, invalid callback, out-of-range count, zero
    /// timeout or period, or an overlapping slave work-table entry.
    InvalidArgument,
    /// No free request slot, no queue space, table full.
    ResourceExhausted,
}

pub type Result<T> = core::result::Result<T, Error>;
