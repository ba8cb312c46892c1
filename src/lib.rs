//! Core of an embedded Modbus RTU protocol engine: a lock-free byte ring
//! between ISR and foreground, CRC-16/Modbus, a byte-driven frame parser,
//! a cooperative tick scheduler, and master/slave engines built on top of
//! them. The crate never assumes an allocator or an operating system; the
//! embedder supplies a `Transport` and drives `poll`/`tick` from its own
//! timer or executor.
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod crc;
pub mod error;
pub mod modbus;
pub mod ring;
pub mod scheduler;
pub mod transport;
pub mod util;

pub use error::{Error, Result};
pub use modbus::master::{MasterEngine, MasterRequest, MasterResponse, ResponseCallback, RetryPolicy};
pub use modbus::pdu::{self, ExceptionCode};
pub use modbus::slave::{Handler, SlaveEngine, WorkEntry};
pub use ring::Ring;
pub use scheduler::Scheduler;
pub use transport::{Direction, Transport};
