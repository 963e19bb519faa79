// per-attempt wake signal for threads parked on a let, and the cancel token that can abort them.
//
// a parked thread never waits on a topology lock. it waits on a Signal owned by its own waiting
// party record. whoever matches the record fires the signal with Wake::Matched. a cancel token
// fires every signal registered with it with Wake::Cancelled. a deadline produces
// Wake::TimedOut. the first of these to happen wins, but the caller must still re-check the
// record under the topology lock before believing anything other than Matched.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc, Condvar, Mutex, Weak,
    },
    time::Instant,
};


/// How a parked wait ended, before being resolved under the topology lock.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Wake {
    Matched,
    TimedOut,
    Cancelled,
}

// synchronization signal state
enum State {
    Empty,
    Fired(Wake),
}

// synchronization signal
pub(crate) struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Signal {
            state: Mutex::new(State::Empty),
            cond: Condvar::new(),
        }
    }

    // fire the signal with the given wake reason, unless it already fired.
    pub(crate) fn fire(&self, wake: Wake) {
        let mut lock = self.state.lock().unwrap();
        if let State::Empty = &*lock {
            *lock = State::Fired(wake);
            self.cond.notify_all();
        }
    }

    // block until the signal fires or the deadline passes.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> Wake {
        let mut lock = self.state.lock().unwrap();
        loop {
            if let &State::Fired(wake) = &*lock {
                return wake;
            }
            match deadline {
                // block on mutex + condvar indefinitely
                None => lock = self.cond.wait(lock).unwrap(),
                // block on mutex + condvar until deadline
                Some(deadline) => {
                    let Some(duration) = deadline.checked_duration_since(Instant::now())
                        else { return Wake::TimedOut };
                    let (lock2, wait_result) = self.cond.wait_timeout(lock, duration).unwrap();
                    lock = lock2;
                    if wait_result.timed_out() {
                        if let &State::Fired(wake) = &*lock {
                            return wake;
                        }
                        return Wake::TimedOut;
                    }
                }
            }
        }
    }
}


/// Handle for aborting blocking sends and receives from another thread
///
/// Pass a token to [`Inlet::send_cancellable`](crate::Inlet::send_cancellable),
/// [`Outlet::receive_cancellable`](crate::Outlet::receive_cancellable) or their `timeout_`
/// variants. Calling [`cancel`](Self::cancel) on any clone wakes every thread currently parked
/// with the token, and any thread that would park with it later, with
/// [`PipeError::Cancelled`](crate::error::PipeError::Cancelled).
///
/// An operation that finds a partner without parking succeeds even if the token is already
/// cancelled, and a thread whose message was matched a moment before the cancellation arrived
/// reports success rather than cancellation.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<CancelInner>);

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    parked: Mutex<Vec<Weak<Signal>>>,
}

impl CancelToken {
    /// Construct a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel all current and future blocking operations using this token.
    pub fn cancel(&self) {
        self.0.cancelled.store(true, SeqCst);
        let parked = std::mem::take(&mut *self.0.parked.lock().unwrap());
        trace!(parked = parked.len(), "cancelling parked operations");
        for signal in parked.iter().filter_map(Weak::upgrade) {
            signal.fire(Wake::Cancelled);
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called on this token or any of its clones.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(SeqCst)
    }

    // register a signal to be fired on cancellation. fires it right away if already cancelled.
    pub(crate) fn register(&self, signal: &Arc<Signal>) {
        {
            let mut parked = self.0.parked.lock().unwrap();
            parked.retain(|weak| weak.strong_count() > 0);
            parked.push(Arc::downgrade(signal));
        }
        // checked after pushing so a concurrent cancel cannot slip between the two
        if self.is_cancelled() {
            signal.fire(Wake::Cancelled);
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}
