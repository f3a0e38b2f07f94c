use std::{
    sync::{Arc, atomic::AtomicBool},
    time::{Duration, Instant},
};

use mio::Token;

/// Re-arming interval timer, polled once per `run_once()` turn.
///
/// Ported from `flux_timing::Repeater`, reimplemented against
/// `std::time::{Duration, Instant}` rather than pulling in the whole
/// `flux-timing` crate's `Nanos`/telemetry machinery for a single
/// fires-every-N-seconds check.
#[derive(Debug, Clone, Copy)]
pub struct Repeater {
    interval: Duration,
    last_acted: Instant,
}

impl Repeater {
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_acted: Instant::now() }
    }

    /// Returns `true` and resets the clock if the interval has elapsed.
    pub fn fired(&mut self) -> bool {
        if self.last_acted.elapsed() >= self.interval {
            self.last_acted = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_acted = Instant::now();
    }

    /// Makes the next [`Repeater::fired`] call return `true` regardless of
    /// elapsed time.
    pub fn force_fire(&mut self) {
        self.last_acted -= self.interval.max(Duration::from_secs(1));
    }
}

/// One registered watcher's kind, closed over the five event sources spec.md
/// §4.7 names. An enum instead of `Box<dyn Trait>` per spec.md §9's redesign
/// note: the kinds are closed, so dynamic dispatch buys nothing and costs an
/// allocation per watcher.
pub enum Watcher {
    /// A `mio`-registered file descriptor (socket). `token` is the key used
    /// to look the host back up in the reactor's registry when `mio`
    /// reports an event for it.
    Io { token: Token },
    /// Fires every time `repeater` elapses.
    Timer { repeater: Repeater },
    /// Set by a `signal_hook::flag::register`-installed handler; polled
    /// once per turn and cleared after dispatch.
    ///
    /// Ported from the `SIGINT`/`SIGTERM`/`SIGQUIT` handling pattern in
    /// `flux::spine::scoped::ScopedSpine::new`.
    Signal { flag: Arc<AtomicBool> },
    /// Polls `std::fs::metadata` on `path` once per `poll_interval` and
    /// fires when `(mtime, len)` changes. There is no async filesystem
    /// watcher in the teacher's dependency stack, so this trades
    /// sub-millisecond latency for zero extra dependencies.
    FileStat { path: std::path::PathBuf, poll_interval: Repeater, last_seen: Option<(std::time::SystemTime, u64)> },
    /// Polls `libc::waitpid(pid, WNOHANG)` on the same cadence as
    /// `FileStat`.
    Child { pid: libc::pid_t, poll_interval: Repeater, reaped: bool },
}

impl Watcher {
    pub fn io(token: Token) -> Self {
        Watcher::Io { token }
    }

    pub fn timer(interval: Duration) -> Self {
        Watcher::Timer { repeater: Repeater::every(interval) }
    }

    /// Registers `signal` with `signal_hook::flag::register` and returns a
    /// watcher that polls the resulting flag.
    pub fn signal(signal: std::os::raw::c_int) -> std::io::Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal, Arc::clone(&flag))?;
        Ok(Watcher::Signal { flag })
    }

    pub fn file_stat(path: std::path::PathBuf, poll_interval: Duration) -> Self {
        Watcher::FileStat {
            path,
            poll_interval: Repeater::every(poll_interval),
            last_seen: None,
        }
    }

    pub fn child(pid: libc::pid_t, poll_interval: Duration) -> Self {
        Watcher::Child { pid, poll_interval: Repeater::every(poll_interval), reaped: false }
    }

    /// Called once per `run_once()` turn for every non-`Io` watcher (`Io`
    /// watchers are driven directly by `mio::Events`). Returns `true` if the
    /// watcher's condition fired this turn.
    pub fn poll_fired(&mut self) -> bool {
        match self {
            Watcher::Io { .. } => false,
            Watcher::Timer { repeater } => repeater.fired(),
            Watcher::Signal { flag } => flag.swap(false, std::sync::atomic::Ordering::Relaxed),
            Watcher::FileStat { path, poll_interval, last_seen } => {
                if !poll_interval.fired() {
                    return false;
                }
                let Ok(meta) = std::fs::metadata(path) else {
                    return false;
                };
                let current = (meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH), meta.len());
                let changed = last_seen.is_some_and(|prev| prev != current);
                *last_seen = Some(current);
                changed
            }
            Watcher::Child { pid, poll_interval, reaped } => {
                if *reaped || !poll_interval.fired() {
                    return false;
                }
                let mut status = 0i32;
                // SAFETY: `pid` names a child of this process; WNOHANG never blocks.
                let ret = unsafe { libc::waitpid(*pid, &raw mut status, libc::WNOHANG) };
                if ret == *pid {
                    *reaped = true;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeater_fires_once_per_interval() {
        let mut r = Repeater::every(Duration::from_millis(10));
        assert!(!r.fired());
        std::thread::sleep(Duration::from_millis(15));
        assert!(r.fired());
        assert!(!r.fired());
    }

    #[test]
    fn force_fire_makes_the_next_poll_true() {
        let mut r = Repeater::every(Duration::from_secs(60));
        assert!(!r.fired());
        r.force_fire();
        assert!(r.fired());
    }

    #[test]
    fn file_stat_watcher_fires_on_mtime_or_size_change() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"a").unwrap();
        let mut w = Watcher::file_stat(file.path().to_path_buf(), Duration::from_millis(0));
        // first poll only primes `last_seen`, never fires
        assert!(!w.poll_fired());
        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(file.path(), b"ab").unwrap();
        assert!(w.poll_fired());
    }

    #[test]
    fn child_watcher_fires_exactly_once_when_the_process_exits() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as libc::pid_t;
        let mut w = Watcher::child(pid, Duration::from_millis(0));
        // poll until the child actually exits; avoid a flaky race on slow CI
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut fired = false;
        while Instant::now() < deadline {
            if w.poll_fired() {
                fired = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(fired);
        assert!(!w.poll_fired());
        let _ = child.wait();
    }
}
