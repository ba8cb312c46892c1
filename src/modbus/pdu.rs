//! Wire constants and the logical PDU shape shared by the parser, master and
//! slave engines. Modbus RTU on the wire:
//! `[addr:1][function:1][payload:N][crc_lo:1][crc_hi:1]`.

/// Per-frame byte ceiling.
pub const FRAME_MAX: usize = 256;

/// Maximum read registers per transaction (Modbus limit).
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum write registers per transaction (Modbus limit).
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Largest byte count a 0x03 response payload can carry
/// (`MAX_READ_REGISTERS * 2`), and therefore the size of the parser's
/// scratch buffer for read data.
pub const MAX_READ_BYTES: usize = MAX_READ_REGISTERS as usize * 2;

pub const FUNC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FUNC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
const EXCEPTION_BIT: u8 = 0x80;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    SlaveDeviceBusy = 0x06,
}

impl ExceptionCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Mark a function code as an exception response (`function | 0x80`).
pub const fn exception_function(function: u8) -> u8 {
    function | EXCEPTION_BIT
}

/// True if `function` carries the exception bit.
pub const fn is_exception(function: u8) -> bool {
    function & EXCEPTION_BIT != 0
}

/// Strip the exception bit back off, recovering the original function code.
pub const fn base_function(function: u8) -> u8 {
    function & !EXCEPTION_BIT
}
