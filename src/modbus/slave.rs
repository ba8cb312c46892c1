//! Modbus RTU slave engine: address filter, register-range dispatch table,
//! response assembly and exception encoding.

use crate::crc;
use crate::error::{Error, Result};
use crate::modbus::parser::{Emitted, FrameParser, Role};
use crate::modbus::pdu::{self, ExceptionCode, FRAME_MAX, MAX_READ_REGISTERS};
use crate::ring::Ring;
use crate::transport::{Direction, Transport};

/// `(function, reg_addr, reg_count, inout_regs)` → exception code, or `0`
/// for success. For `FUNC_READ_HOLDING_REGISTERS` the handler fills
/// `inout_regs`; for `FUNC_WRITE_MULTIPLE_REGISTERS` it reads the values
/// already placed there by the engine.
pub type Handler = fn(function: u8, reg_addr: u16, reg_count: u16, regs: &mut [u16]) -> u8;

/// One entry of the dispatch table: a register range `[reg_start, reg_end)`
/// and the handler that owns it.
#[derive(Copy, Clone)]
pub struct WorkEntry {
    pub reg_start: u16,
    pub reg_end: u16,
    pub handler: Handler,
}

fn overlaps(a: &WorkEntry, b: &WorkEntry) -> bool {
    a.reg_start < b.reg_end && b.reg_start < a.reg_end
}

pub struct SlaveEngine<Tport, const MAX_ENTRIES: usize, const RING_N: usize> {
    transport: Tport,
    own_addr: u8,
    table: heapless::Vec<WorkEntry, MAX_ENTRIES>,
    rx: Ring<u8, RING_N>,
    parser: FrameParser,
}

impl<Tport: Transport, const MAX_ENTRIES: usize, const RING_N: usize>
    SlaveEngine<Tport, MAX_ENTRIES, RING_N>
{
    /// Validates the work table (no overlapping ranges, `reg_start <
    /// reg_end` for every entry), stores `own_addr`, and calls
    /// `transport.init()`.
    pub fn init(mut transport: Tport, own_addr: u8, work_table: &[WorkEntry]) -> Result<Self> {
        if RING_N < FRAME_MAX {
            return Err(Error::InvalidArgument);
        }
        for i in 0..work_table.len() {
            if work_table[i].reg_start >= work_table[i].reg_end {
                return Err(Error::InvalidArgument);
            }
            for j in (i + 1)..work_table.len() {
                if overlaps(&work_table[i], &work_table[j]) {
                    return Err(Error::InvalidArgument);
                }
            }
        }
        let mut table = heapless::Vec::new();
        for entry in work_table {
            table.push(*entry).map_err(|_| Error::ResourceExhausted)?;
        }
        if !transport.init() {
            return Err(Error::InvalidArgument);
        }
        Ok(Self { transport, own_addr, table, rx: Ring::new(), parser: FrameParser::new(Role::SlaveRequest) })
    }

    pub fn destroy(self) {}

    /// Drain bytes, parse with `expected_slave = own_addr`, dispatch any
    /// resulting PDU through the work table and send a response.
    pub fn poll(&mut self) {
        let mut buf = [0u8; FRAME_MAX];
        let n = self.transport.read(&mut buf);
        if n > 0 {
            let (mut p, _) = self.rx.split();
            p.add(&buf[..n]);
        }
        let emitted = {
            let (_, mut c) = self.rx.split();
            self.parser.poll(&mut c, self.own_addr)
        };
        if let Some(frame) = emitted {
            self.dispatch(frame);
        }
    }

    fn dispatch(&mut self, frame: Emitted) {
        let reg_addr = frame.reg_addr;
        let reg_count = frame.reg_count;
        let last = reg_addr as u32 + reg_count as u32 - 1;
        let entry = self
            .table
            .iter()
            .find(|e| reg_addr >= e.reg_start && last < e.reg_end as u32)
            .copied();

        let Some(entry) = entry else {
            self.respond_exception(frame.function, ExceptionCode::IllegalDataAddress.code());
            return;
        };

        let mut regs = heapless::Vec::<u16, { MAX_READ_REGISTERS as usize }>::new();
        match frame.function {
            pdu::FUNC_READ_HOLDING_REGISTERS => {
                for _ in 0..reg_count {
                    let _ = regs.push(0);
                }
            }
            pdu::FUNC_WRITE_MULTIPLE_REGISTERS => {
                for chunk in frame.data.chunks_exact(2) {
                    let _ = regs.push(u16::from_be_bytes([chunk[0], chunk[1]]));
                }
            }
            _ => {
                self.respond_exception(frame.function, ExceptionCode::IllegalFunction.code());
                return;
            }
        }

        let result = (entry.handler)(frame.function, reg_addr, reg_count, &mut regs);
        if result != 0 {
            self.respond_exception(frame.function, result);
            return;
        }

        let mut body = heapless::Vec::<u8, FRAME_MAX>::new();
        let _ = body.push(self.own_addr);
        match frame.function {
            pdu::FUNC_READ_HOLDING_REGISTERS => {
                let _ = body.push(pdu::FUNC_READ_HOLDING_REGISTERS);
                let _ = body.push((reg_count * 2) as u8);
                for v in regs.iter() {
                    let _ = body.extend_from_slice(&v.to_be_bytes());
                }
            }
            pdu::FUNC_WRITE_MULTIPLE_REGISTERS => {
                let _ = body.push(pdu::FUNC_WRITE_MULTIPLE_REGISTERS);
                let _ = body.extend_from_slice(&reg_addr.to_be_bytes());
                let _ = body.extend_from_slice(&reg_count.to_be_bytes());
            }
            _ => unreachable!("function already filtered above"),
        }
        self.finish_and_send(body);
    }

    fn respond_exception(&mut self, function: u8, code: u8) {
        crate::fmt::debug!("slave exception: function {=u8} code {=u8}", function, code);
        let mut body = heapless::Vec::<u8, FRAME_MAX>::new();
        let _ = body.push(self.own_addr);
        let _ = body.push(pdu::exception_function(function));
        let _ = body.push(code);
        self.finish_and_send(body);
    }

    fn finish_and_send(&mut self, mut body: heapless::Vec<u8, FRAME_MAX>) {
        let (lo, hi) = crc::to_wire(crc::compute(&body));
        let _ = body.push(lo);
        let _ = body.push(hi);
        self.transport.dir_ctrl(Direction::TxOnly);
        self.transport.write(&body);
        self.transport.dir_ctrl(Direction::RxOnly);
    }
}
