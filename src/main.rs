#![cfg_attr(feature = "hardware", no_std)]
#![cfg_attr(feature = "hardware", no_main)]

//! Modbus RTU master demo: polls a single holding-register range on one
//! slave over a UART, at a fixed period, printing each response via
//! `defmt`. Built only with `--features hardware`; the default build of
//! this crate is the library, not this binary.

#[cfg(feature = "hardware")]
mod hardware_demo {
    use defmt::*;
    use embassy_executor::Spawner;
    use embassy_rp::bind_interrupts;
    use embassy_rp::peripherals::UART0;
    use embassy_rp::uart::{self, Uart};
    use embassy_time::{Duration, Ticker};
    use modbus_rtu_core::{
        Direction, MasterEngine, MasterRequest, MasterResponse, RetryPolicy, Transport, pdu,
    };
    use {defmt_rtt as _, panic_probe as _};

    bind_interrupts!(struct Irqs {
        UART0_IRQ => uart::InterruptHandler<UART0>;
    });

    /// Adapts `embassy_rp`'s buffered UART to the engine's non-blocking
    /// `Transport`. RS-485 direction switching is left to a GPIO the board
    /// wires to the transceiver's DE/RE pins; toggling it is outside this
    /// demo's scope, so `dir_ctrl` only logs the request.
    struct EmbassyUart {
        uart: Uart<'static, UART0, uart::Blocking>,
    }

    impl Transport for EmbassyUart {
        fn init(&mut self) -> bool {
            true
        }

        fn read(&mut self, dst: &mut [u8]) -> usize {
            self.uart.blocking_read(dst).map(|_| dst.len()).unwrap_or(0)
        }

        fn write(&mut self, src: &[u8]) -> usize {
            self.uart.blocking_write(src).map(|_| src.len()).unwrap_or(0)
        }

        fn dir_ctrl(&mut self, direction: Direction) {
            debug!("dir_ctrl {:?}", direction == Direction::TxOnly);
        }
    }

    fn on_response(_ctx: *mut (), response: MasterResponse) {
        if response.timed_out {
            warn!("request timed out");
        } else if response.err_code != 0 {
            warn!("slave exception {=u8}", response.err_code);
        } else {
            info!("holding registers: {=[u8]}", response.data);
        }
    }

    #[embassy_executor::main]
    pub async fn main(_spawner: Spawner) {
        let p = embassy_rp::init(Default::default());
        let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart::Config::default());

        let transport = EmbassyUart { uart };
        let mut engine: MasterEngine<EmbassyUart, 8, 512> =
            MasterEngine::init(transport, RetryPolicy::default_repeats(), 20)
                .expect("engine init");

        let mut ticker = Ticker::every(Duration::from_millis(20));
        loop {
            ticker.next().await;
            engine.poll(20);
            static REQUEST_DUE: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);
            let due = REQUEST_DUE.fetch_add(20, core::sync::atomic::Ordering::Relaxed);
            if due % 1000 == 0 {
                let _ = engine.submit(
                    MasterRequest {
                        slave_addr: 0x06,
                        function: pdu::FUNC_READ_HOLDING_REGISTERS,
                        reg_addr: 0x0000,
                        reg_count: 2,
                        timeout_ms: 200,
                    },
                    &[],
                    on_response,
                    core::ptr::null_mut(),
                );
            }
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn main() {}
