//! Modbus RTU master engine: request queue, transmission, response
//! correlation, timeout/retry, response-callback dispatch.
//!
//! Requests are served in strict FIFO order: the response to request *n*
//! (or its final retry timing out) must resolve before request *n+1* is
//! transmitted. This is enforced by `send_permit`, a binary token the head
//! of the queue must hold before it may transmit.

use crate::crc;
use crate::error::{Error, Result};
use crate::modbus::parser::{FrameParser, Role};
use crate::modbus::pdu::{self, FRAME_MAX, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};
use crate::ring::Ring;
use crate::transport::{Direction, Transport};
use crate::util::Pool;

/// A request the master wants answered. For `FUNC_WRITE_MULTIPLE_REGISTERS`
/// the register values to write are passed separately to `submit` and
/// copied into the slot, so the caller's buffer need not outlive the
/// request.
#[derive(Copy, Clone, Debug)]
pub struct MasterRequest {
    pub slave_addr: u8,
    pub function: u8,
    pub reg_addr: u16,
    pub reg_count: u16,
    pub timeout_ms: u32,
}

/// What the response callback receives: either the peer's payload, a
/// protocol exception, or a timeout. `err_code != 0` and `timed_out` are
/// mutually exclusive; `data` is empty for writes, exceptions, and
/// timeouts.
#[derive(Debug)]
pub struct MasterResponse<'a> {
    pub data: &'a [u8],
    pub err_code: u8,
    pub timed_out: bool,
}

/// A response callback plus an opaque context pointer, the no_std
/// rendering of a closure: no allocator is available to box one, so the
/// caller supplies a plain function and a pointer it controls the lifetime
/// of (typically a `'static` object or one that outlives the engine).
pub type ResponseCallback = fn(ctx: *mut (), response: MasterResponse);

/// Retry behaviour on timeout. Supersedes the `NO_RETRIES` compile-time
/// switch from the design with a runtime choice, so both behaviours are
/// available from one binary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryPolicy {
    Retry { max_attempts: u8 },
    NoRetries,
}

impl RetryPolicy {
    pub const fn default_repeats() -> Self {
        RetryPolicy::Retry { max_attempts: 3 }
    }
}

struct RequestSlot {
    request: MasterRequest,
    write_data: heapless::Vec<u16, { MAX_WRITE_REGISTERS as usize }>,
    on_response: ResponseCallback,
    ctx: *mut (),
    elapsed_ms: u32,
    attempts: u8,
}

/// `Tport`: the embedder's transport. `MAX_REQUESTS`: request-slot pool
/// size. `RING_N`: RX ring capacity (power of two, at least `FRAME_MAX`).
pub struct MasterEngine<Tport, const MAX_REQUESTS: usize, const RING_N: usize> {
    transport: Tport,
    pool: Pool<RequestSlot, MAX_REQUESTS>,
    fifo: heapless::Deque<usize, MAX_REQUESTS>,
    send_permit: bool,
    retry_policy: RetryPolicy,
    period_ms: u32,
    rx: Ring<u8, RING_N>,
    parser: FrameParser,
}

impl<Tport: Transport, const MAX_REQUESTS: usize, const RING_N: usize>
    MasterEngine<Tport, MAX_REQUESTS, RING_N>
{
    /// Validates that the ring capacity can hold a full frame, initialises
    /// the request-slot pool and FIFO, sets the send permit to idle, and
    /// calls `transport.init()`.
    pub fn init(mut transport: Tport, retry_policy: RetryPolicy, period_ms: u32) -> Result<Self> {
        if RING_N < FRAME_MAX || period_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        if !transport.init() {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            transport,
            pool: Pool::new(),
            fifo: heapless::Deque::new(),
            send_permit: true,
            retry_policy,
            period_ms,
            rx: Ring::new(),
            parser: FrameParser::new(Role::MasterResponse),
        })
    }

    /// Consume the engine, releasing its storage. Any still-pending
    /// requests' callbacks are dropped silently, per the design's
    /// cancellation policy — callers must not hold requests in flight
    /// across a `destroy`.
    pub fn destroy(self) {}

    /// Queue a request. Rejects out-of-range register counts, a zero
    /// timeout, an unsupported function code, a write whose `write_data`
    /// length disagrees with `request.reg_count`, or no free slot/FIFO
    /// space.
    pub fn submit(
        &mut self,
        request: MasterRequest,
        write_data: &[u16],
        on_response: ResponseCallback,
        ctx: *mut (),
    ) -> Result<()> {
        if request.timeout_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        match request.function {
            pdu::FUNC_READ_HOLDING_REGISTERS => {
                if request.reg_count == 0 || request.reg_count > MAX_READ_REGISTERS {
                    return Err(Error::InvalidArgument);
                }
            }
            pdu::FUNC_WRITE_MULTIPLE_REGISTERS => {
                if request.reg_count == 0 || request.reg_count > MAX_WRITE_REGISTERS {
                    return Err(Error::InvalidArgument);
                }
                if write_data.len() != request.reg_count as usize {
                    return Err(Error::InvalidArgument);
                }
            }
            _ => return Err(Error::InvalidArgument),
        }

        let mut write_data_owned = heapless::Vec::new();
        let _ = write_data_owned.extend_from_slice(write_data);

        let slot = RequestSlot {
            request,
            write_data: write_data_owned,
            on_response,
            ctx,
            elapsed_ms: 0,
            attempts: 0,
        };
        let idx = self.pool.acquire(slot).ok_or(Error::ResourceExhausted)?;
        if self.fifo.push_back(idx).is_err() {
            self.pool.release(idx);
            return Err(Error::ResourceExhausted);
        }
        Ok(())
    }

    /// One scheduler tick: receive step then transmit step.
    pub fn poll(&mut self, elapsed_ms: u32) {
        self.receive_step();
        self.transmit_step(elapsed_ms);
    }

    fn receive_step(&mut self) {
        let mut buf = [0u8; FRAME_MAX];
        let n = self.transport.read(&mut buf);
        if n > 0 {
            let (mut p, _) = self.rx.split();
            p.add(&buf[..n]);
        }

        let Some(&head_idx) = self.fifo.front() else {
            // Nothing pending to correlate against: drop stale parser state
            // and any buffered bytes rather than let a stray frame be
            // evaluated against whatever request arrives next.
            let (_, mut c) = self.rx.split();
            self.parser.reset_to(&c);
            c.advance_rd(c.occupancy());
            return;
        };

        // The FIFO only ever holds indices of slots it itself acquired and
        // has not yet released, so this is always occupied; debug_assert
        // rather than unwrap so a future desync is caught in tests, not in
        // a field panic.
        let Some(head) = self.pool.get(head_idx) else {
            debug_assert!(false, "fifo head references a released pool slot");
            return;
        };
        let expected_slave = head.request.slave_addr;
        let emitted = {
            let (_, mut c) = self.rx.split();
            self.parser.poll(&mut c, expected_slave)
        };
        let Some(frame) = emitted else { return };

        // A frame may only complete the head once at least one
        // transmission has been made on its behalf; otherwise it is a
        // straggling response to a prior, already-completed request and
        // must not be mistaken for this one's answer.
        let Some(head) = self.pool.get(head_idx) else {
            debug_assert!(false, "fifo head references a released pool slot");
            return;
        };
        if head.attempts == 0 {
            return;
        }
        self.complete_head(false, Some(frame));
    }

    fn transmit_step(&mut self, elapsed_ms: u32) {
        let Some(&head_idx) = self.fifo.front() else { return };

        enum Action {
            Transmit,
            Timeout,
            Wait,
        }

        // See the matching comment in `receive_step`: the FIFO head always
        // references a live pool slot by construction.
        let Some(slot) = self.pool.get_mut(head_idx) else {
            debug_assert!(false, "fifo head references a released pool slot");
            return;
        };
        let action = {
            if self.send_permit && slot.elapsed_ms == 0 {
                Action::Transmit
            } else {
                slot.elapsed_ms = slot.elapsed_ms.saturating_add(elapsed_ms);
                if slot.elapsed_ms > slot.request.timeout_ms {
                    Action::Timeout
                } else {
                    Action::Wait
                }
            }
        };

        match action {
            Action::Transmit => {
                self.send_permit = false;
                let Some(slot) = self.pool.get_mut(head_idx) else {
                    debug_assert!(false, "fifo head references a released pool slot");
                    return;
                };
                slot.attempts += 1;
                crate::fmt::debug!(
                    "master transmit: slave {=u8} function {=u8} attempt {=u8}",
                    slot.request.slave_addr,
                    slot.request.function,
                    slot.attempts
                );
                let frame = Self::serialize(slot);
                self.transport.dir_ctrl(Direction::TxOnly);
                self.transport.write(&frame);
                self.transport.dir_ctrl(Direction::RxOnly);
                if let Some(slot) = self.pool.get_mut(head_idx) {
                    slot.elapsed_ms = self.period_ms.max(1);
                }
            }
            Action::Timeout => {
                let Some(slot) = self.pool.get(head_idx) else {
                    debug_assert!(false, "fifo head references a released pool slot");
                    return;
                };
                let retries_remain = match self.retry_policy {
                    RetryPolicy::NoRetries => false,
                    RetryPolicy::Retry { max_attempts } => slot.attempts < max_attempts,
                };
                if retries_remain {
                    crate::fmt::debug!(
                        "master timeout: slave {=u8} retrying (attempt {=u8})",
                        slot.request.slave_addr,
                        slot.attempts
                    );
                    if let Some(slot) = self.pool.get_mut(head_idx) {
                        slot.elapsed_ms = 0;
                    }
                    self.send_permit = true;
                } else {
                    crate::fmt::warn_log!(
                        "master timeout: slave {=u8} retries exhausted after {=u8} attempts",
                        slot.request.slave_addr,
                        slot.attempts
                    );
                    self.complete_head(true, None);
                }
            }
            Action::Wait => {}
        }
    }

    fn serialize(slot: &RequestSlot) -> heapless::Vec<u8, FRAME_MAX> {
        let req = &slot.request;
        let mut body = heapless::Vec::<u8, FRAME_MAX>::new();
        let _ = body.push(req.slave_addr);
        let _ = body.push(req.function);
        let _ = body.extend_from_slice(&req.reg_addr.to_be_bytes());
        let _ = body.extend_from_slice(&req.reg_count.to_be_bytes());
        if req.function == pdu::FUNC_WRITE_MULTIPLE_REGISTERS {
            let _ = body.push((slot.write_data.len() * 2) as u8);
            for v in slot.write_data.iter() {
                let _ = body.extend_from_slice(&v.to_be_bytes());
            }
        }
        let (lo, hi) = crc::to_wire(crc::compute(&body));
        let _ = body.push(lo);
        let _ = body.push(hi);
        body
    }

    fn complete_head(
        &mut self,
        timed_out: bool,
        frame: Option<crate::modbus::parser::Emitted>,
    ) {
        let Some(idx) = self.fifo.pop_front() else { return };
        let Some(slot) = self.pool.get(idx) else {
            debug_assert!(false, "fifo head references a released pool slot");
            self.send_permit = true;
            return;
        };
        let response = match &frame {
            Some(f) => MasterResponse { data: f.data.as_slice(), err_code: f.err_code, timed_out },
            None => MasterResponse { data: &[], err_code: 0, timed_out },
        };
        (slot.on_response)(slot.ctx, response);
        self.pool.release(idx);
        self.send_permit = true;
    }
}
