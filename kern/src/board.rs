//! Narrow traits for the external collaborators named in `spec.md` §6.
//!
//! These are declared and used by the fault handlers and by `demos/`, but
//! never given a real peripheral-register implementation here -- the
//! UART driver, GPIO driver, and string utilities are out of scope
//! (`spec.md` §1) and stay behind these seams.

/// Corresponds to `uart_puts`/`uart_kbhit`/`uart_gets`.
pub trait Console {
    fn puts(&self, s: &str);
    fn kbhit(&self) -> bool;
    fn gets(&self, buf: &mut [u8]) -> usize;
}

/// Opaque GPIO port/pin handles. The concrete mapping onto a part number's
/// registers belongs to a board crate, not the kernel.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Port(pub u8);

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Pin(pub u8);

/// Corresponds to `port_enable`/`pin_set_output`/`pin_set_input`/
/// `pin_read`/`pin_write`.
pub trait Gpio {
    fn enable_port(&self, port: Port);
    fn set_output(&self, pin: Pin);
    fn set_input(&self, pin: Pin);
    fn read(&self, pin: Pin) -> bool;
    fn write(&self, pin: Pin, val: bool);
}

/// Corresponds to `delay_cycles`/`wait_us`; used only during board init,
/// never on the scheduling-critical path.
pub trait Timing {
    fn delay_cycles(&self, n: u32);
    fn wait_us(&self, n: u32);
}
