// inlets and outlets: the connectable endpoints of pipes.
//
// an inlet is where messages go into a pipe, an outlet is where they come out. sends happen on
// unconnected inlets at the upstream edge of a topology, receives on unconnected outlets at the
// downstream edge. a blocking send first probes for a receiver across the whole topology, and
// only if none exists does it queue a waiting party on its inlet and park. it is then the
// receiving side's probe that finds the party and hands the message over.
//
// connection state lives in each let behind a mutex, but it is only ever read or written while
// the let's resource group is held, and a connected pair always shares one group. that is what
// makes `a.connected_outlet == b <=> b.connected_inlet == a` hold for every observer.

pub(crate) mod waiting;

mod inlet;
mod outlet;

pub use self::{
    inlet::Inlet,
    outlet::Outlet,
};

use self::waiting::WaitingParty;
use crate::{
    error::{InvalidStateReason, PipeError},
    pipes::{pipe_id, release_matches},
    resource::{ResourceGuard, SharedResource},
    signal::{CancelToken, Wake},
    validate,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};


// convert a timeout into a deadline.
pub(crate) fn deadline_after(timeout: Duration) -> Result<Instant, PipeError> {
    Instant::now()
        .checked_add(timeout)
        .ok_or(PipeError::ArgumentInvalid("timeout is too large to represent a deadline"))
}

// park on a queued waiting party until it is matched, times out, or is cancelled.
//
// returns ok if the party was matched, even if the wake itself was a timeout or cancellation that
// raced with the match. otherwise, removes the party from its queue with `dequeue` and returns the
// cause. the resolution happens under the let's lock.
pub(crate) fn park<T>(
    party: &Arc<WaitingParty<T>>,
    resource: &SharedResource,
    deadline: Option<Instant>,
    cancel: Option<&CancelToken>,
    dequeue: impl FnOnce(&Arc<WaitingParty<T>>),
) -> Result<(), PipeError> {
    if let Some(cancel) = cancel {
        cancel.register(party.signal());
    }
    trace!(resource = resource.id(), ?deadline, "parking");
    let cause = match party.signal().wait(deadline) {
        Wake::Matched => return Ok(()),
        Wake::TimedOut => PipeError::Timeout,
        Wake::Cancelled => PipeError::Cancelled,
    };
    let _guard = resource.lock();
    if party.is_done() {
        trace!(resource = resource.id(), %cause, "matched before wake could take effect");
        return Ok(());
    }
    dequeue(party);
    trace!(resource = resource.id(), %cause, "leaving wait");
    Err(cause)
}

// connect an outlet to an inlet.
pub(crate) fn connect<T: Send + 'static>(
    inlet: &Arc<Inlet<T>>,
    outlet: &Arc<Outlet<T>>,
    check_for_cycles: bool,
) -> Result<(), PipeError> {
    let guard = SharedResource::lock_with(outlet.resource(), inlet.resource());

    let (Some(inlet_pipe), Some(outlet_pipe)) = (inlet.pipe(), outlet.pipe()) else {
        return Err(InvalidStateReason::PipeDropped.into());
    };
    if pipe_id(&*inlet_pipe) == pipe_id(&*outlet_pipe) {
        return Err(InvalidStateReason::SamePipe.into());
    }
    if inlet.peer().is_some() {
        return Err(InvalidStateReason::InletConnected.into());
    }
    if outlet.peer().is_some() {
        return Err(InvalidStateReason::OutletConnected.into());
    }
    if inlet.has_waiting() || outlet.has_waiting() {
        return Err(InvalidStateReason::HasWaitingParties.into());
    }
    if check_for_cycles && validate::would_conflict(&outlet_pipe, &inlet_pipe) {
        debug!(
            inlet = inlet.resource().id(),
            outlet = outlet.resource().id(),
            "refusing connection that would close a cycle"
        );
        return Err(PipeError::TopologyConflict);
    }

    inlet.set_peer(Some(outlet));
    outlet.set_peer(Some(inlet));
    SharedResource::link(outlet.resource(), inlet.resource(), &guard);
    trace!(inlet = inlet.resource().id(), outlet = outlet.resource().id(), "connected");

    // parties parked at the far ends may now be able to meet
    if validate::is_tree(&outlet_pipe) {
        release_matches(&*outlet_pipe, &*inlet_pipe);
    }
    Ok(())
}

// disconnect a connected pair. the caller must have looked up the pair under `guard`.
pub(crate) fn disconnect<T: Send + 'static>(
    inlet: &Inlet<T>,
    outlet: &Outlet<T>,
    mut guard: ResourceGuard,
) {
    inlet.set_peer(None);
    outlet.set_peer(None);
    SharedResource::unlink(outlet.resource(), inlet.resource(), &mut guard);
    trace!(inlet = inlet.resource().id(), outlet = outlet.resource().id(), "disconnected");
}

// wire a pair together without any checks, as raw topology construction would. lets tests build
// self-loops, which `connect` refuses.
#[cfg(test)]
pub(crate) fn connect_raw<T: Send + 'static>(inlet: &Arc<Inlet<T>>, outlet: &Arc<Outlet<T>>) {
    let guard = SharedResource::lock_with(outlet.resource(), inlet.resource());
    inlet.set_peer(Some(outlet));
    outlet.set_peer(Some(inlet));
    SharedResource::link(outlet.resource(), inlet.resource(), &guard);
}
