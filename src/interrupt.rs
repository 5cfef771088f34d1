//! SIGINT handling around engine construction.
//!
//! Native engines install their own interrupt handler when they start,
//! which would swallow Ctrl-C for the rest of the run. After an engine is
//! created the disposition is put back to the system default.

use std::io;




/// Reset SIGINT to its default disposition (terminate the process).
///
#[cfg(unix)]
pub fn restore_default_interrupt() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        if libc::sigemptyset(&mut action.sa_mask) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::sigaction(signal_hook::consts::SIGINT, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn restore_default_interrupt() -> io::Result<()> {
    Ok(())
}




/// Whether SIGINT currently has its default disposition.
///
#[cfg(unix)]
pub fn interrupt_is_default() -> io::Result<bool> {
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signal_hook::consts::SIGINT, std::ptr::null(), &mut current) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(current.sa_sigaction == libc::SIG_DFL)
    }
}

#[cfg(not(unix))]
pub fn interrupt_is_default() -> io::Result<bool> {
    Ok(true)
}
