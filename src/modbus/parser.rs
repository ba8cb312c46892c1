//! Byte-driven Modbus RTU frame parser: a sliding anchor/forward window over
//! the RX ring that produces validated PDUs or resynchronises one byte at a
//! time on mismatch.
//!
//! `anchor` is the hypothetical start of the frame under parse; `forward` is
//! the next unread byte, both in the ring's monotonic index space
//! (`rd <= anchor <= forward <= wr` always). Bytes between `anchor` and
//! `forward` are only *peeked*, never destructively consumed, until the
//! candidate frame either validates (both indices jump to `forward`, the
//! whole frame is dropped from the ring at once) or mismatches (exactly the
//! byte at the old `anchor` is dropped and parsing restarts one byte later)
//! — this is what guarantees a garbage byte preceding a valid frame can
//! never cause the valid frame itself to be dropped.

use crate::modbus::pdu::{self, MAX_READ_BYTES};
use crate::ring::Consumer;

/// Which side of an exchange this parser instance is validating: a master
/// only ever parses slave *responses*, a slave only ever parses master
/// *requests*. Requests and responses share a function code but not always
/// a wire shape: a 0x03 response carries `[byte_count][data...]` while a
/// 0x03 request carries only `[reg_addr:2][reg_count:2]`; a 0x10 request
/// carries `[reg_addr:2][reg_count:2][byte_count][data...]` while a 0x10
/// response carries only `[reg_addr:2][reg_count:2]`. Both request shapes
/// reuse the `Reg`/`RegLen` and `DataLen`/`Data` states already needed for
/// the response shapes; the role (plus, for `RegLen`'s exit edge, the
/// function code) only selects which are visited.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    MasterResponse,
    SlaveRequest,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    Addr,
    Func,
    Err,
    DataLen,
    Data,
    Reg,
    RegLen,
    Crc,
}

/// A successfully validated frame: the data it carries depends on which
/// function produced it. `err_code != 0` means this is an exception
/// response; otherwise `data` holds the 0x03 read payload or, for a slave
/// parsing an 0x10 request, the written register bytes (big-endian per
/// register, same as on the wire).
#[derive(Debug)]
pub struct Emitted {
    pub function: u8,
    pub err_code: u8,
    pub reg_addr: u16,
    pub reg_count: u16,
    pub data: heapless::Vec<u8, MAX_READ_BYTES>,
}

impl Emitted {
    pub fn is_exception(&self) -> bool {
        self.err_code != 0
    }
}

pub struct FrameParser {
    role: Role,
    state: State,
    anchor: usize,
    forward: usize,
    crc: u16,
    pdu_index: usize,
    pdu_expected: usize,
    function: u8,
    err_code: u8,
    reg_addr_buf: [u8; 2],
    reg_count_buf: [u8; 2],
    received_crc: [u8; 2],
    r_data: [u8; MAX_READ_BYTES],
    r_data_len: usize,
}

enum ByteOutcome {
    Continue,
    Resync,
    Emit,
}

impl FrameParser {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: State::Addr,
            anchor: 0,
            forward: 0,
            crc: crc16::initial(),
            pdu_index: 0,
            pdu_expected: 0,
            function: 0,
            err_code: 0,
            reg_addr_buf: [0; 2],
            reg_count_buf: [0; 2],
            received_crc: [0; 2],
            r_data: [0; MAX_READ_BYTES],
            r_data_len: 0,
        }
    }

    /// Resynchronise to the ring's current read position. Used when a
    /// caller abandons the frame currently under parse (e.g. the master
    /// FIFO becomes empty) so stale anchor/forward state doesn't linger.
    pub fn reset_to<const N: usize>(&mut self, consumer: &Consumer<'_, u8, N>) {
        self.anchor = consumer.rd_counter();
        self.forward = self.anchor;
        self.reset_candidate();
    }

    #[cfg(test)]
    pub(crate) fn anchor(&self) -> usize {
        self.anchor
    }

    fn reset_candidate(&mut self) {
        self.state = State::Addr;
        self.crc = crc16::initial();
        self.pdu_index = 0;
        self.pdu_expected = 0;
        self.function = 0;
        self.err_code = 0;
        self.reg_addr_buf = [0; 2];
        self.reg_count_buf = [0; 2];
        self.received_crc = [0; 2];
        self.r_data_len = 0;
    }

    /// Drive the state machine as far as currently-available bytes allow,
    /// emitting at most one frame per call. Returns `None` if no complete,
    /// valid frame is available yet.
    pub fn poll<const N: usize>(
        &mut self,
        consumer: &mut Consumer<'_, u8, N>,
        expected_slave: u8,
    ) -> Option<Emitted> {
        loop {
            if self.forward >= consumer.wr_counter() {
                return None;
            }
            let byte = consumer.peek_at(self.forward)?;
            match self.process_byte(byte, expected_slave) {
                ByteOutcome::Continue => {
                    self.forward += 1;
                }
                ByteOutcome::Resync => {
                    crate::fmt::trace!("parser resync: discarding byte {=u8}", byte);
                    consumer.advance_rd(1);
                    self.anchor += 1;
                    self.forward = self.anchor;
                    self.reset_candidate();
                }
                ByteOutcome::Emit => {
                    self.forward += 1;
                    let len = self.forward - self.anchor;
                    consumer.advance_rd(len);
                    let emitted = self.build_emitted();
                    crate::fmt::debug!(
                        "frame accepted: function {=u8} len {=usize}",
                        emitted.function,
                        len
                    );
                    self.anchor = self.forward;
                    self.reset_candidate();
                    return Some(emitted);
                }
            }
        }
    }

    fn process_byte(&mut self, c: u8, expected_slave: u8) -> ByteOutcome {
        match self.state {
            State::Addr => {
                if c == expected_slave {
                    self.crc = crc16::update(crc16::initial(), c);
                    self.state = State::Func;
                    ByteOutcome::Continue
                } else {
                    ByteOutcome::Resync
                }
            }
            State::Func => {
                self.crc = crc16::update(self.crc, c);
                self.function = c;
                if c == pdu::FUNC_READ_HOLDING_REGISTERS && self.role == Role::MasterResponse {
                    // `[addr][0x03][byte_count][data...][crc]`
                    self.state = State::DataLen;
                    ByteOutcome::Continue
                } else if c == pdu::FUNC_READ_HOLDING_REGISTERS
                    || c == pdu::FUNC_WRITE_MULTIPLE_REGISTERS
                {
                    // A 0x03 request (`[addr][0x03][reg_addr:2][reg_count:2][crc]`,
                    // no data at all) and a 0x10 response/request both start
                    // with the same two big-endian fields.
                    self.pdu_expected = 2;
                    self.pdu_index = 0;
                    self.state = State::Reg;
                    ByteOutcome::Continue
                } else if pdu::is_exception(c) {
                    self.state = State::Err;
                    ByteOutcome::Continue
                } else {
                    ByteOutcome::Resync
                }
            }
            State::Err => {
                self.crc = crc16::update(self.crc, c);
                self.err_code = c;
                self.pdu_expected = 2;
                self.pdu_index = 0;
                self.state = State::Crc;
                ByteOutcome::Continue
            }
            State::DataLen => {
                self.crc = crc16::update(self.crc, c);
                if (c as usize) <= MAX_READ_BYTES {
                    self.r_data_len = 0;
                    if c == 0 {
                        self.pdu_expected = 2;
                        self.pdu_index = 0;
                        self.state = State::Crc;
                    } else {
                        self.pdu_expected = c as usize;
                        self.pdu_index = 0;
                        self.state = State::Data;
                    }
                    ByteOutcome::Continue
                } else {
                    ByteOutcome::Resync
                }
            }
            State::Data => {
                self.crc = crc16::update(self.crc, c);
                self.r_data[self.pdu_index] = c;
                self.pdu_index += 1;
                if self.pdu_index == self.pdu_expected {
                    self.r_data_len = self.pdu_index;
                    self.pdu_expected = 2;
                    self.pdu_index = 0;
                    self.state = State::Crc;
                }
                ByteOutcome::Continue
            }
            State::Reg => {
                self.crc = crc16::update(self.crc, c);
                self.reg_addr_buf[self.pdu_index] = c;
                self.pdu_index += 1;
                if self.pdu_index == self.pdu_expected {
                    self.pdu_expected = 2;
                    self.pdu_index = 0;
                    self.state = State::RegLen;
                }
                ByteOutcome::Continue
            }
            State::RegLen => {
                self.crc = crc16::update(self.crc, c);
                self.reg_count_buf[self.pdu_index] = c;
                self.pdu_index += 1;
                if self.pdu_index == self.pdu_expected {
                    // Only a 0x10 write request carries a byte_count/data
                    // phase after the register fields; a 0x03 read request
                    // and a 0x10 response both go straight to the CRC.
                    let has_data_phase =
                        self.role == Role::SlaveRequest && self.function == pdu::FUNC_WRITE_MULTIPLE_REGISTERS;
                    if has_data_phase {
                        self.state = State::DataLen;
                    } else {
                        self.pdu_expected = 2;
                        self.pdu_index = 0;
                        self.state = State::Crc;
                    }
                }
                ByteOutcome::Continue
            }
            State::Crc => {
                self.received_crc[self.pdu_index] = c;
                self.pdu_index += 1;
                if self.pdu_index == 2 {
                    let received = crc16::from_wire(self.received_crc[0], self.received_crc[1]);
                    if received == self.crc {
                        ByteOutcome::Emit
                    } else {
                        ByteOutcome::Resync
                    }
                } else {
                    ByteOutcome::Continue
                }
            }
        }
    }

    fn build_emitted(&self) -> Emitted {
        let mut data = heapless::Vec::new();
        let _ = data.extend_from_slice(&self.r_data[..self.r_data_len]);
        Emitted {
            function: self.function,
            err_code: self.err_code,
            reg_addr: u16::from_be_bytes(self.reg_addr_buf),
            reg_count: u16::from_be_bytes(self.reg_count_buf),
            data,
        }
    }
}

use crate::crc as crc16;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Ring;

    fn parse_all<const N: usize>(
        parser: &mut FrameParser,
        ring: &mut Ring<u8, N>,
        expected_slave: u8,
    ) -> heapless::Vec<Emitted, 8> {
        let (_, mut c) = ring.split();
        let mut out = heapless::Vec::new();
        while let Some(e) = parser.poll(&mut c, expected_slave) {
            let _ = out.push(e);
        }
        out
    }

    #[test]
    fn scenario_1_read_holding_registers_response() {
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&[0x06, 0x03, 0x04, 0x00, 0x11, 0x00, 0x22, 0x5C, 0xEF]);
        }
        let mut parser = FrameParser::new(Role::MasterResponse);
        let emitted = parse_all(&mut parser, &mut ring, 0x06);
        assert_eq!(emitted.len(), 1);
        let f = &emitted[0];
        assert_eq!(f.function, 0x03);
        assert_eq!(f.err_code, 0);
        assert_eq!(f.data.as_slice(), &[0x00, 0x11, 0x00, 0x22]);
    }

    #[test]
    fn scenario_3_write_multiple_registers_response() {
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&crate::crc::compute_and_append(&[0x06, 0x10, 0x00, 0x10, 0x00, 0x02]));
        }
        let mut parser = FrameParser::new(Role::MasterResponse);
        let emitted = parse_all(&mut parser, &mut ring, 0x06);
        assert_eq!(emitted.len(), 1);
        let f = &emitted[0];
        assert_eq!(f.function, 0x10);
        assert_eq!(f.reg_addr, 0x0010);
        assert_eq!(f.reg_count, 0x0002);
        assert!(!f.is_exception());
    }

    #[test]
    fn scenario_4_exception_response() {
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&crate::crc::compute_and_append(&[0x06, 0x83, 0x02]));
        }
        let mut parser = FrameParser::new(Role::MasterResponse);
        let emitted = parse_all(&mut parser, &mut ring, 0x06);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].err_code, 0x02);
    }

    #[test]
    fn scenario_5_leading_garbage_does_not_drop_valid_frame() {
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&[0xFF, 0xFF]);
            p.add(&[0x06, 0x03, 0x04, 0x00, 0x11, 0x00, 0x22, 0x5C, 0xEF]);
        }
        let mut parser = FrameParser::new(Role::MasterResponse);
        let emitted = parse_all(&mut parser, &mut ring, 0x06);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].data.as_slice(), &[0x00, 0x11, 0x00, 0x22]);
    }

    #[test]
    fn resync_advances_anchor_by_exactly_one_per_junk_byte() {
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        }
        let mut parser = FrameParser::new(Role::MasterResponse);
        let (_, mut c) = ring.split();
        let start_anchor = parser.anchor();
        assert!(parser.poll(&mut c, 0x06).is_none());
        // None of these bytes match expected_slave 0x06, so every byte is
        // rejected one at a time; anchor tracks consumption exactly.
        assert_eq!(parser.anchor(), start_anchor + 5);
    }

    #[test]
    fn byte_splitting_independence() {
        let frame = crate::crc::compute_and_append(&[0x06, 0x03, 0x04, 0x00, 0x11, 0x00, 0x22]);

        let mut whole: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = whole.split();
            p.add(&frame);
        }
        let mut parser_whole = FrameParser::new(Role::MasterResponse);
        let whole_result = parse_all(&mut parser_whole, &mut whole, 0x06);

        let mut piecemeal: Ring<u8, 32> = Ring::new();
        let mut parser_piecemeal = FrameParser::new(Role::MasterResponse);
        let mut collected = heapless::Vec::<Emitted, 8>::new();
        for &b in frame.iter() {
            {
                let (mut p, _) = piecemeal.split();
                p.add(&[b]);
            }
            let (_, mut c) = piecemeal.split();
            if let Some(e) = parser_piecemeal.poll(&mut c, 0x06) {
                let _ = collected.push(e);
            }
        }

        assert_eq!(whole_result.len(), collected.len());
        assert_eq!(whole_result[0].data.as_slice(), collected[0].data.as_slice());
    }

    #[test]
    fn slave_request_parses_read_holding_registers_with_no_data_phase() {
        let request = crate::crc::compute_and_append(&[0x06, 0x03, 0x00, 0x0F, 0x00, 0x02]);
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&request);
        }
        let mut parser = FrameParser::new(Role::SlaveRequest);
        let emitted = parse_all(&mut parser, &mut ring, 0x06);
        assert_eq!(emitted.len(), 1);
        let f = &emitted[0];
        assert_eq!(f.function, 0x03);
        assert_eq!(f.reg_addr, 0x000F);
        assert_eq!(f.reg_count, 0x0002);
        assert_eq!(f.data.len(), 0);
    }

    #[test]
    fn slave_request_parses_write_register_payload() {
        let request = crate::crc::compute_and_append(&[
            0x06, 0x10, 0x00, 0x10, 0x00, 0x02, 0x04, 0x00, 0xAA, 0x00, 0xBB,
        ]);
        let mut ring: Ring<u8, 32> = Ring::new();
        {
            let (mut p, _) = ring.split();
            p.add(&request);
        }
        let mut parser = FrameParser::new(Role::SlaveRequest);
        let emitted = parse_all(&mut parser, &mut ring, 0x06);
        assert_eq!(emitted.len(), 1);
        let f = &emitted[0];
        assert_eq!(f.reg_addr, 0x0010);
        assert_eq!(f.reg_count, 0x0002);
        assert_eq!(f.data.as_slice(), &[0x00, 0xAA, 0x00, 0xBB]);
    }
}
