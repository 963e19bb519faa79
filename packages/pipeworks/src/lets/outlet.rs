// the receiving end of a pipe.

use super::{connect, deadline_after, disconnect, park, waiting::WaitingParty, Inlet};
use crate::{
    error::{InvalidStateReason, PipeError},
    pipes::{probe, Pipe, Receiver, Search, Sender},
    resource::SharedResource,
    signal::CancelToken,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
    time::{Duration, Instant},
};


/// Endpoint through which messages leave a pipe
///
/// Messages can only be received through an outlet that is not connected to an inlet.
pub struct Outlet<T> {
    pipe: Weak<dyn Pipe<T>>,
    resource: Arc<SharedResource>,
    // only accessed while `resource`'s group is held.
    state: Mutex<OutletState<T>>,
}

struct OutletState<T> {
    // if set, that inlet's connected outlet is this outlet.
    connected_inlet: Option<Weak<Inlet<T>>>,
    // threads parked in `receive`, oldest first.
    waiting_receivers: VecDeque<Arc<WaitingParty<T>>>,
}

impl<T: Send + 'static> Outlet<T> {
    pub(crate) fn new(pipe: Weak<dyn Pipe<T>>, resource: Arc<SharedResource>) -> Self {
        Outlet {
            pipe,
            resource,
            state: Mutex::new(OutletState {
                connected_inlet: None,
                waiting_receivers: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn resource(&self) -> &Arc<SharedResource> {
        &self.resource
    }

    pub(crate) fn owner(&self) -> &Weak<dyn Pipe<T>> {
        &self.pipe
    }

    /// The pipe this outlet belongs to, unless it has been dropped
    pub fn pipe(&self) -> Option<Arc<dyn Pipe<T>>> {
        self.pipe.upgrade()
    }

    /// The inlet this outlet is connected to, if any
    pub fn connected_inlet(&self) -> Option<Arc<Inlet<T>>> {
        let _guard = self.resource.lock();
        self.peer()
    }

    /// Whether this outlet is connected to an inlet
    pub fn is_connected(&self) -> bool {
        self.connected_inlet().is_some()
    }

    /// Number of threads currently parked receiving through this outlet
    pub fn waiting_receivers(&self) -> usize {
        let _guard = self.resource.lock();
        self.state.lock().unwrap().waiting_receivers.len()
    }

    // connected inlet. caller holds the lock.
    pub(crate) fn peer(&self) -> Option<Arc<Inlet<T>>> {
        let mut state = self.state.lock().unwrap();
        let inlet = state.connected_inlet.as_ref().and_then(Weak::upgrade);
        if inlet.is_none() {
            state.connected_inlet = None;
        }
        inlet
    }

    // caller holds the lock.
    pub(crate) fn set_peer(&self, inlet: Option<&Arc<Inlet<T>>>) {
        self.state.lock().unwrap().connected_inlet = inlet.map(Arc::downgrade);
    }

    // caller holds the lock.
    pub(crate) fn has_waiting(&self) -> bool {
        !self.state.lock().unwrap().waiting_receivers.is_empty()
    }

    /// Receive a message, blocking until one is sent
    ///
    /// Fails without blocking if this outlet is connected.
    pub fn receive(&self) -> Result<T, PipeError> {
        self.receive_inner(None, None)
    }

    /// Receive a message, blocking until one is sent or the timeout elapses
    ///
    /// If a message was handed over at the same moment the timeout elapsed, this returns the
    /// message.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T, PipeError> {
        self.receive_inner(Some(deadline_after(timeout)?), None)
    }

    /// Receive a message, blocking until one is sent or `cancel` is cancelled
    pub fn receive_cancellable(&self, cancel: &CancelToken) -> Result<T, PipeError> {
        self.receive_inner(None, Some(cancel))
    }

    /// Receive a message, blocking until one is sent, the timeout elapses, or `cancel` is
    /// cancelled
    pub fn receive_timeout_cancellable(
        &self,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<T, PipeError> {
        self.receive_inner(Some(deadline_after(timeout)?), Some(cancel))
    }

    /// Receive a message only if a sender is available right now, never blocking
    pub fn receive_immediately(&self) -> Result<T, PipeError> {
        let _guard = self.resource.lock();
        if self.peer().is_some() {
            return Err(InvalidStateReason::ReceiveOnConnectedOutlet.into());
        }
        if self.pipe.strong_count() == 0 {
            return Err(InvalidStateReason::PipeDropped.into());
        }
        let sender = self.probe_sender().ok_or(InvalidStateReason::NothingAvailable)?;
        Ok(sender())
    }

    fn receive_inner(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<T, PipeError> {
        let guard = self.resource.lock();
        if self.peer().is_some() {
            return Err(InvalidStateReason::ReceiveOnConnectedOutlet.into());
        }
        if self.pipe.strong_count() == 0 {
            return Err(InvalidStateReason::PipeDropped.into());
        }

        // receivers already queued go first
        if !self.has_waiting() {
            if let Some(sender) = self.probe_sender() {
                return Ok(sender());
            }
        }

        let party = WaitingParty::receiver();
        self.state.lock().unwrap().waiting_receivers.push_back(Arc::clone(&party));
        drop(guard);

        park(&party, &self.resource, deadline, cancel, |party| self.remove_waiting(party))?;
        Ok(party.take_slot().expect("matched waiting receiver without a message (internal bug)"))
    }

    fn probe_sender(&self) -> Option<Sender<T>> {
        probe(&self.pipe, &mut Search::new(), |pipe, search| pipe.find_sender(search))
    }

    fn remove_waiting(&self, party: &Arc<WaitingParty<T>>) {
        self.state.lock().unwrap().waiting_receivers.retain(|queued| !Arc::ptr_eq(queued, party));
    }

    /// Find where a message leaving this outlet's pipe could go right now
    ///
    /// If connected, the probe continues downstream through the connected inlet's pipe.
    /// Otherwise, if threads are parked receiving through this outlet, the returned callback
    /// hands the message to the oldest one and releases it. Must be called with the topology
    /// locked, which is the case inside [`Pipe::find_receiver`].
    pub fn find_receiver(self: &Arc<Self>, search: &mut Search) -> Option<Receiver<T>> {
        if let Some(inlet) = self.peer() {
            return probe(inlet.owner(), search, |pipe, search| pipe.find_receiver(search));
        }
        if self.has_waiting() {
            let outlet = Arc::clone(self);
            return Some(Box::new(move |msg| outlet.use_waiting_receiver(msg)));
        }
        None
    }

    fn use_waiting_receiver(&self, msg: T) {
        let party = self.state.lock().unwrap().waiting_receivers.pop_front()
            .expect("waiting receiver vanished between probe and use (internal bug)");
        party.deliver(msg);
    }

    /// Connect this outlet to an inlet, refusing if that would close a cycle
    pub fn connect_to(self: &Arc<Self>, inlet: &Arc<Inlet<T>>) -> Result<(), PipeError> {
        connect(inlet, self, true)
    }

    /// Connect this outlet to an inlet without checking for cycles
    pub fn connect_to_unchecked(self: &Arc<Self>, inlet: &Arc<Inlet<T>>) -> Result<(), PipeError> {
        connect(inlet, self, false)
    }

    /// Disconnect this outlet from the inlet it is connected to
    pub fn disconnect(&self) -> Result<(), PipeError> {
        let guard = self.resource.lock();
        let inlet = self.peer().ok_or(InvalidStateReason::NotConnected)?;
        disconnect(&inlet, self, guard);
        Ok(())
    }
}
