//! `dev6!` traces: one JSON line per statement sent to the store and per commit write.
//!
//! Lines go to the `n1qlite::dev6` log target at TRACE. A test can also capture them for
//! its own thread with `capture()`, without installing a logger.

use std::cell::RefCell;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Stops capturing on this thread when dropped.
pub struct Capture;

impl Drop for Capture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

/// Start capturing traces emitted on the current thread.
#[must_use]
pub fn capture() -> Capture {
    CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
    Capture
}

#[doc(hidden)]
pub fn record(line: &str) {
    CAPTURED.with(|c| {
        if let Some(lines) = c.borrow_mut().as_mut() {
            lines.push(line.to_owned());
        }
    });
}

/// Captured lines so far; empty when not capturing.
pub fn take() -> Vec<String> {
    CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let line = format!($($arg)*);
        $crate::utils::devlog::record(&line);
        log::trace!(target: $crate::utils::logger::DEV6_TARGET, "{line}");
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_on_this_thread_only() {
        let _c = capture();
        crate::dev6!("{{\"op\":\"upsert\",\"key\":\"{}\"}}", "b1");
        let other = std::thread::spawn(|| {
            crate::dev6!("elsewhere");
            take()
        })
        .join()
        .unwrap();
        assert!(other.is_empty());
        assert_eq!(take(), vec!["{\"op\":\"upsert\",\"key\":\"b1\"}"]);
        assert!(take().is_empty());
    }

    #[test]
    fn nothing_is_kept_after_capture_ends() {
        {
            let _c = capture();
            crate::dev6!("inside");
        }
        crate::dev6!("outside");
        assert!(take().is_empty());
    }
}
