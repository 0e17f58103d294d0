//! Process-wide flags written from signal handlers.
//!
//! Handlers only store to atomics. Everything else reads the flags from the
//! main loop. Handlers are installed without `SA_RESTART` so a blocking
//! `poll` returns `EINTR` as soon as a signal lands.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static TIMER_EXPIRED: AtomicBool = AtomicBool::new(false);
static CLOSE_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_alarm(_signo: libc::c_int) {
    TIMER_EXPIRED.store(true, Ordering::Relaxed);
}

extern "C" fn on_close(_signo: libc::c_int) {
    CLOSE_REQUESTED.store(true, Ordering::Relaxed);
}

/// `None` restores the default disposition
fn set_handler(signo: libc::c_int, handler: Option<extern "C" fn(libc::c_int)>) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = match handler {
            Some(handler) => handler as libc::sighandler_t,
            None => libc::SIG_DFL,
        };
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(signo, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub fn install_timer_handler() -> io::Result<()> {
    set_handler(libc::SIGALRM, Some(on_alarm))
}

pub fn restore_timer_handler() -> io::Result<()> {
    set_handler(libc::SIGALRM, None)
}

/// SIGINT and SIGTERM ask the main loop to exit
pub fn install_close_handlers() -> io::Result<()> {
    set_handler(libc::SIGINT, Some(on_close))?;
    set_handler(libc::SIGTERM, Some(on_close))
}

pub fn restore_close_handlers() -> io::Result<()> {
    set_handler(libc::SIGINT, None)?;
    set_handler(libc::SIGTERM, None)
}

pub fn timer_expired() -> bool {
    TIMER_EXPIRED.load(Ordering::Relaxed)
}

pub fn reset_timer_expired() {
    TIMER_EXPIRED.store(false, Ordering::Relaxed);
}

pub fn close_requested() -> bool {
    CLOSE_REQUESTED.load(Ordering::Relaxed)
}
