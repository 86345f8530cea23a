use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One-shot termination signal shared between a reader thread and its owner.
///
/// The owner calls [`ThreadFence::terminate`] once; the thread polls
/// [`ThreadFence::terminated`] between blocking reads or parks on
/// [`ThreadFence::wait_timeout`].
#[derive(Default)]
pub struct ThreadFence {
    state: Mutex<bool>,
    cv: Condvar,
}

impl ThreadFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminated(&self) -> bool {
        *self.state.lock().unwrap()
    }

    /// Blocks until terminated.
    pub fn wait(&self) {
        let guard = self.state.lock().unwrap();
        let _guard = self.cv.wait_while(guard, |done| !*done).unwrap();
    }

    /// Blocks until terminated or the timeout elapses. Returns whether the
    /// fence was terminated.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.state.lock().unwrap();
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap();
        *guard
    }

    pub fn terminate(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard = true;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn wait_timeout_expires_when_not_terminated() {
        let fence = ThreadFence::new();
        let start = Instant::now();
        assert!(!fence.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn terminate_wakes_waiter() {
        let fence = Arc::new(ThreadFence::new());
        let waiter = {
            let fence = fence.clone();
            std::thread::spawn(move || fence.wait_timeout(Duration::from_secs(5)))
        };
        fence.terminate();
        assert!(waiter.join().unwrap());
        assert!(fence.terminated());
    }
}
