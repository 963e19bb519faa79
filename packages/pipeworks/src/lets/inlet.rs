// the sending end of a pipe.

use super::{connect, deadline_after, disconnect, park, waiting::WaitingParty, Outlet};
use crate::{
    error::{InvalidStateReason, PipeError, SendError},
    pipes::{probe, Pipe, Receiver, Search, Sender},
    resource::SharedResource,
    signal::CancelToken,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
    time::{Duration, Instant},
};


/// Endpoint through which messages enter a pipe
///
/// Messages can only be sent through an inlet that is not connected to an outlet. Connected
/// inlets are interior to a topology, and traffic reaches them through whatever they are
/// connected to.
pub struct Inlet<T> {
    pipe: Weak<dyn Pipe<T>>,
    resource: Arc<SharedResource>,
    // only accessed while `resource`'s group is held.
    state: Mutex<InletState<T>>,
}

struct InletState<T> {
    // if set, that outlet's connected inlet is this inlet.
    connected_outlet: Option<Weak<Outlet<T>>>,
    // threads parked in `send`, oldest first.
    waiting_senders: VecDeque<Arc<WaitingParty<T>>>,
}

impl<T: Send + 'static> Inlet<T> {
    pub(crate) fn new(pipe: Weak<dyn Pipe<T>>, resource: Arc<SharedResource>) -> Self {
        Inlet {
            pipe,
            resource,
            state: Mutex::new(InletState {
                connected_outlet: None,
                waiting_senders: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn resource(&self) -> &Arc<SharedResource> {
        &self.resource
    }

    pub(crate) fn owner(&self) -> &Weak<dyn Pipe<T>> {
        &self.pipe
    }

    /// The pipe this inlet belongs to, unless it has been dropped
    pub fn pipe(&self) -> Option<Arc<dyn Pipe<T>>> {
        self.pipe.upgrade()
    }

    /// The outlet this inlet is connected to, if any
    pub fn connected_outlet(&self) -> Option<Arc<Outlet<T>>> {
        let _guard = self.resource.lock();
        self.peer()
    }

    /// Whether this inlet is connected to an outlet
    pub fn is_connected(&self) -> bool {
        self.connected_outlet().is_some()
    }

    /// Number of threads currently parked sending through this inlet
    pub fn waiting_senders(&self) -> usize {
        let _guard = self.resource.lock();
        self.state.lock().unwrap().waiting_senders.len()
    }

    // connected outlet. caller holds the lock.
    pub(crate) fn peer(&self) -> Option<Arc<Outlet<T>>> {
        let mut state = self.state.lock().unwrap();
        let outlet = state.connected_outlet.as_ref().and_then(Weak::upgrade);
        if outlet.is_none() {
            // the outlet's pipe may have been dropped out from under us
            state.connected_outlet = None;
        }
        outlet
    }

    // caller holds the lock.
    pub(crate) fn set_peer(&self, outlet: Option<&Arc<Outlet<T>>>) {
        self.state.lock().unwrap().connected_outlet = outlet.map(Arc::downgrade);
    }

    // caller holds the lock.
    pub(crate) fn has_waiting(&self) -> bool {
        !self.state.lock().unwrap().waiting_senders.is_empty()
    }

    /// Send a message, blocking until it is received
    ///
    /// Fails without blocking if this inlet is connected.
    pub fn send(&self, msg: T) -> Result<(), SendError<T>> {
        self.send_inner(msg, None, None)
    }

    /// Send a message, blocking until it is received or the timeout elapses
    ///
    /// On timeout, the message is handed back in the error. If the message was taken by a
    /// receiver at the same moment the timeout elapsed, this returns success.
    pub fn send_timeout(&self, msg: T, timeout: Duration) -> Result<(), SendError<T>> {
        match deadline_after(timeout) {
            Ok(deadline) => self.send_inner(msg, Some(deadline), None),
            Err(e) => Err(SendError::new(msg, e)),
        }
    }

    /// Send a message, blocking until it is received or `cancel` is cancelled
    pub fn send_cancellable(&self, msg: T, cancel: &CancelToken) -> Result<(), SendError<T>> {
        self.send_inner(msg, None, Some(cancel))
    }

    /// Send a message, blocking until it is received, the timeout elapses, or `cancel` is
    /// cancelled
    pub fn send_timeout_cancellable(
        &self,
        msg: T,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), SendError<T>> {
        match deadline_after(timeout) {
            Ok(deadline) => self.send_inner(msg, Some(deadline), Some(cancel)),
            Err(e) => Err(SendError::new(msg, e)),
        }
    }

    /// Send a message only if a receiver is available right now, never blocking
    pub fn send_immediately(&self, msg: T) -> Result<(), SendError<T>> {
        let _guard = self.resource.lock();
        if self.peer().is_some() {
            return Err(SendError::new(msg, InvalidStateReason::SendOnConnectedInlet));
        }
        if self.pipe.strong_count() == 0 {
            return Err(SendError::new(msg, InvalidStateReason::PipeDropped));
        }
        match self.probe_receiver() {
            Some(receiver) => {
                receiver(msg);
                Ok(())
            }
            None => Err(SendError::new(msg, InvalidStateReason::NothingAvailable)),
        }
    }

    fn send_inner(
        &self,
        msg: T,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<(), SendError<T>> {
        let guard = self.resource.lock();
        if self.peer().is_some() {
            return Err(SendError::new(msg, InvalidStateReason::SendOnConnectedInlet));
        }
        if self.pipe.strong_count() == 0 {
            return Err(SendError::new(msg, InvalidStateReason::PipeDropped));
        }

        // senders already queued go first
        if !self.has_waiting() {
            if let Some(receiver) = self.probe_receiver() {
                receiver(msg);
                return Ok(());
            }
        }

        let party = WaitingParty::sender(msg);
        self.state.lock().unwrap().waiting_senders.push_back(Arc::clone(&party));
        drop(guard);

        park(&party, &self.resource, deadline, cancel, |party| self.remove_waiting(party))
            .map_err(|cause| {
                let msg = party.take_slot()
                    .expect("unmatched waiting sender lost its message (internal bug)");
                SendError::new(msg, cause)
            })
    }

    fn probe_receiver(&self) -> Option<Receiver<T>> {
        probe(&self.pipe, &mut Search::new(), |pipe, search| pipe.find_receiver(search))
    }

    fn remove_waiting(&self, party: &Arc<WaitingParty<T>>) {
        self.state.lock().unwrap().waiting_senders.retain(|queued| !Arc::ptr_eq(queued, party));
    }

    /// Find where a message sent into this inlet's pipe could come from right now
    ///
    /// If connected, the probe continues upstream through the connected outlet's pipe.
    /// Otherwise, if threads are parked sending through this inlet, the returned callback takes
    /// the oldest one's message and releases it. Must be called with the topology locked, which
    /// is the case inside [`Pipe::find_sender`].
    pub fn find_sender(self: &Arc<Self>, search: &mut Search) -> Option<Sender<T>> {
        if let Some(outlet) = self.peer() {
            return probe(outlet.owner(), search, |pipe, search| pipe.find_sender(search));
        }
        if self.has_waiting() {
            let inlet = Arc::clone(self);
            return Some(Box::new(move || inlet.use_waiting_sender()));
        }
        None
    }

    fn use_waiting_sender(&self) -> T {
        let party = self.state.lock().unwrap().waiting_senders.pop_front()
            .expect("waiting sender vanished between probe and use (internal bug)");
        party.take_message()
    }

    /// Connect this inlet to an outlet, refusing if that would close a cycle
    ///
    /// The cycle check walks the whole topology. Use
    /// [`connect_to_unchecked`](Self::connect_to_unchecked) to skip it.
    pub fn connect_to(self: &Arc<Self>, outlet: &Arc<Outlet<T>>) -> Result<(), PipeError> {
        connect(self, outlet, true)
    }

    /// Connect this inlet to an outlet without checking for cycles
    pub fn connect_to_unchecked(self: &Arc<Self>, outlet: &Arc<Outlet<T>>) -> Result<(), PipeError> {
        connect(self, outlet, false)
    }

    /// Disconnect this inlet from the outlet it is connected to
    pub fn disconnect(&self) -> Result<(), PipeError> {
        let guard = self.resource.lock();
        let outlet = self.peer().ok_or(InvalidStateReason::NotConnected)?;
        disconnect(self, &outlet, guard);
        Ok(())
    }
}
