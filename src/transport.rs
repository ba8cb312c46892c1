//! The narrow interface the protocol engine needs from the embedder: a
//! non-blocking byte transport plus a half-duplex direction switch. The
//! engine never assumes `write` blocks until bytes are physically on the
//! wire, and it never infers when the RS-485 direction pin should flip back
//! to RX relative to the last bit shifted out — it only requests the
//! switch; the embedder schedules the actual pin toggle.

/// Which half of a half-duplex link should currently be active.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    RxOnly,
    TxOnly,
}

/// The transport capabilities the master and slave engines consume. An
/// embedder implements this once per physical link (UART + optional RS-485
/// transceiver) and hands it to `MasterEngine`/`SlaveEngine` by value.
pub trait Transport {
    /// Prepare the underlying UART/DMA/GPIO. Called once from `init`.
    fn init(&mut self) -> bool;

    /// Non-blocking read: copies up to `dst.len()` currently-buffered bytes
    /// and returns how many were copied (possibly 0).
    fn read(&mut self, dst: &mut [u8]) -> usize;

    /// Non-blocking write: enqueues up to `src.len()` bytes to the outbound
    /// path and returns how many were accepted.
    fn write(&mut self, src: &[u8]) -> usize;

    /// Request a half-duplex direction switch. Invoked immediately before a
    /// write and after a completed exchange.
    fn dir_ctrl(&mut self, direction: Direction);
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::ring::Ring;

    /// An in-memory transport standing in for a real UART: bytes pushed
    /// with `feed` become readable via `read`; bytes `write`ten land in
    /// `sent` for assertions. Mirrors the teacher's own byte-oriented
    /// `serial.rs` wiring, minus the hardware.
    pub struct MockTransport<const N: usize> {
        rx: Ring<u8, N>,
        pub sent: heapless::Vec<u8, 4096>,
        pub dir_log: heapless::Vec<Direction, 32>,
        pub init_called: bool,
    }

    impl<const N: usize> MockTransport<N> {
        pub fn new() -> Self {
            Self {
                rx: Ring::new(),
                sent: heapless::Vec::new(),
                dir_log: heapless::Vec::new(),
                init_called: false,
            }
        }

        pub fn feed(&mut self, bytes: &[u8]) {
            let mut rx = self.rx.split();
            rx.0.add(bytes);
        }
    }

    impl<const N: usize> Transport for MockTransport<N> {
        fn init(&mut self) -> bool {
            self.init_called = true;
            true
        }

        fn read(&mut self, dst: &mut [u8]) -> usize {
            let mut rx = self.rx.split();
            rx.1.get(dst)
        }

        fn write(&mut self, src: &[u8]) -> usize {
            let n = src.len().min(self.sent.capacity() - self.sent.len());
            let _ = self.sent.extend_from_slice(&src[..n]);
            n
        }

        fn dir_ctrl(&mut self, direction: Direction) {
            let _ = self.dir_log.push(direction);
        }
    }
}
