use anyhow::Result;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

// Cross-platform signal handling
#[cfg(unix)]
use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};

#[cfg(windows)]
use signal_hook::{consts::SIGINT, flag};

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
    SignalInt = 130,  // 128 + SIGINT (2)
    SignalPipe = 141, // 128 + SIGPIPE (13)
    SignalTerm = 143, // 128 + SIGTERM (15)
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

/// Global termination flag for graceful shutdown
pub static SHOULD_TERMINATE: AtomicBool = AtomicBool::new(false);
pub static TERMINATED_BY_SIGNAL: AtomicBool = AtomicBool::new(false);
pub static TERMINATED_BY_SIGTERM: AtomicBool = AtomicBool::new(false);

/// Signal handler for graceful shutdown
///
/// The first SIGINT/SIGTERM only raises [`SHOULD_TERMINATE`] so the input side
/// stops feeding the pool and in-flight chunks drain. A second one exits
/// immediately.
pub struct SignalHandler {
    _handle: thread::JoinHandle<()>,
}

impl SignalHandler {
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            let mut signals = Signals::new([SIGINT, SIGTERM])?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                for sig in signals.forever() {
                    SHOULD_TERMINATE.store(true, Ordering::Relaxed);
                    TERMINATED_BY_SIGNAL.store(true, Ordering::Relaxed);
                    shutdown_count += 1;

                    let exit_code = if sig == SIGTERM {
                        TERMINATED_BY_SIGTERM.store(true, Ordering::Relaxed);
                        ExitCode::SignalTerm
                    } else {
                        ExitCode::SignalInt
                    };
                    if shutdown_count > 1 {
                        exit_code.exit();
                    }
                    tracing::warn!(signal = sig, "received signal, draining in-flight work");
                }
            });

            Ok(SignalHandler { _handle: handle })
        }

        #[cfg(windows)]
        {
            let term_flag = std::sync::Arc::new(AtomicBool::new(false));
            flag::register(SIGINT, std::sync::Arc::clone(&term_flag))?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                loop {
                    thread::sleep(std::time::Duration::from_millis(100));
                    if term_flag.swap(false, Ordering::Relaxed) {
                        SHOULD_TERMINATE.store(true, Ordering::Relaxed);
                        TERMINATED_BY_SIGNAL.store(true, Ordering::Relaxed);
                        shutdown_count += 1;
                        if shutdown_count > 1 {
                            ExitCode::SignalInt.exit();
                        }
                    }
                }
            });

            Ok(SignalHandler { _handle: handle })
        }
    }

    /// Check if we should terminate processing
    pub fn should_terminate() -> bool {
        SHOULD_TERMINATE.load(Ordering::Relaxed)
    }

    /// Exit code for a run cut short by a signal, if any
    pub fn termination_exit_code() -> Option<ExitCode> {
        if !TERMINATED_BY_SIGNAL.load(Ordering::Relaxed) {
            return None;
        }
        if TERMINATED_BY_SIGTERM.load(Ordering::Relaxed) {
            Some(ExitCode::SignalTerm)
        } else {
            Some(ExitCode::SignalInt)
        }
    }
}

/// Iterator adapter that stops yielding once a termination signal arrived
pub struct UntilTerminated<I> {
    inner: I,
}

impl<I> UntilTerminated<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Iterator> Iterator for UntilTerminated<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        if SignalHandler::should_terminate() {
            return None;
        }
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_terminated_passes_items_through() {
        // the flag is process-global; only assert the untripped path here
        if SignalHandler::should_terminate() {
            return;
        }
        let items: Vec<u32> = UntilTerminated::new(1..4).collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert!(SignalHandler::termination_exit_code().is_none());
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::InvalidUsage as i32, 2);
        assert_eq!(ExitCode::SignalPipe as i32, 141);
        assert_eq!(ExitCode::SignalTerm as i32, 143);
    }
}
