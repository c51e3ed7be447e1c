//! Background Tasks Module
//!
//! Long-running tasks spawned alongside a scan.
//!
//! # Tasks
//! - Cache reaper: purges expired entries at a configured interval
//! - Interrupt listener: turns Ctrl+C / SIGTERM into a shutdown signal

mod interrupt;
mod reaper;

pub use interrupt::spawn_interrupt_listener;
pub use reaper::spawn_reaper_task;
