//! The Modbus RTU protocol stack: wire constants, the frame parser shared
//! by both roles, and the master/slave engines built on top of it.

pub mod master;
pub mod parser;
pub mod pdu;
pub mod slave;
