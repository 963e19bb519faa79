// record of a thread parked on a let.

use crate::signal::{Signal, Wake};
use std::sync::{
    atomic::{AtomicBool, Ordering::SeqCst},
    Arc, Mutex,
};


// a thread parked in a blocking send or receive.
//
// for a parked sender, `slot` starts out holding the message and the matcher takes it. for a
// parked receiver, `slot` starts out empty and the matcher fills it.
pub(crate) struct WaitingParty<T> {
    slot: Mutex<Option<T>>,
    // set exactly once, while the topology lock is held, by the thread that matches this party.
    // the parked thread reads it under the same lock to resolve timeout and cancellation races.
    done: AtomicBool,
    signal: Arc<Signal>,
}

impl<T> WaitingParty<T> {
    pub(crate) fn sender(msg: T) -> Arc<Self> {
        Self::with_slot(Some(msg))
    }

    pub(crate) fn receiver() -> Arc<Self> {
        Self::with_slot(None)
    }

    fn with_slot(slot: Option<T>) -> Arc<Self> {
        Arc::new(WaitingParty {
            slot: Mutex::new(slot),
            done: AtomicBool::new(false),
            signal: Arc::new(Signal::new()),
        })
    }

    pub(crate) fn signal(&self) -> &Arc<Signal> {
        &self.signal
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(SeqCst)
    }

    // match a parked sender: take its message, record it as sent, and wake it.
    pub(crate) fn take_message(&self) -> T {
        let msg = self.slot.lock().unwrap().take()
            .expect("waiting sender without a message (internal bug)");
        self.resolve();
        msg
    }

    // match a parked receiver: hand it the message, record it as received, and wake it.
    pub(crate) fn deliver(&self, msg: T) {
        let prev = self.slot.lock().unwrap().replace(msg);
        debug_assert!(prev.is_none(), "waiting receiver delivered to twice (internal bug)");
        self.resolve();
    }

    fn resolve(&self) {
        let was_done = self.done.swap(true, SeqCst);
        debug_assert!(!was_done, "waiting party resolved twice (internal bug)");
        self.signal.fire(Wake::Matched);
    }

    // reclaim whatever is in the slot once the party has left the queue.
    pub(crate) fn take_slot(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }
}
