//! Capture of terminating signals.
//!
//! A terminating signal must not kill the process before the impairment is removed from the
//! network device. The handlers only record the signal and pass it on to whichever external
//! command is currently running; the session unwinds normally afterwards.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::*;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static FOREGROUND: AtomicI32 = AtomicI32::new(0);

const TERMINATING: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
pub fn install() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for &signal in TERMINATING.iter() {
        unsafe { sigaction(signal, &action) }?;
    }

    Ok(())
}

/// Whether a terminating signal has been received.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Forward terminating signals to the given process, or to nobody if `pid` is 0.
pub fn forward_to(pid: i32) {
    FOREGROUND.store(pid, Ordering::SeqCst);
}

extern "C" fn on_signal(signo: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);

    let pid = FOREGROUND.load(Ordering::SeqCst);
    if pid > 0 {
        unsafe {
            libc::kill(pid, signo);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::command::{Host, Invocation, Status, System};

    // Both checks share the process-wide handler state, so they run in one test.
    #[test]
    fn signals_are_recorded_and_forwarded() {
        install().unwrap();

        forward_to(0);
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert!(interrupted());

        let sender = thread::spawn(|| {
            while FOREGROUND.load(Ordering::SeqCst) <= 0 {
                thread::sleep(Duration::from_millis(10));
            }
            unsafe {
                libc::raise(libc::SIGTERM);
            }
        });

        let status = System::default()
            .status(&Invocation::new(vec!["sleep", "5"]))
            .unwrap();
        sender.join().unwrap();

        assert_eq!(status, Status::Signaled(libc::SIGTERM));
        assert_eq!(FOREGROUND.load(Ordering::SeqCst), 0);
    }
}
