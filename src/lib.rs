//! Status bar for wlroots-style Wayland compositors.
//!
//! Widgets draw into zones, zones are composited into one shared-memory
//! buffer per monitor, and a cooperative scheduler decides when widgets run.
//! Everything happens on one thread; the only blocking point is the wait on
//! the Wayland connection in [`wayland::Session::pump_events`].

pub mod bar;
pub mod config;
pub mod modules;
pub mod sched;
pub mod signal;
pub mod ui;
pub mod wayland;
