//! XDP programs for portwatch
//!
//! This crate contains the kernel-space half of portwatch:
//! - `port_counter` (XDP): counts TCP packets per destination port
//!
//! The classifier and counting protocol come from `portwatch-common`; this
//! crate only binds them to `XdpContext` and the BPF maps.
//!
//! Program implementations are in src/bin/

#![cfg_attr(not(test), no_std)]

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
