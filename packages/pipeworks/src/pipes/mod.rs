//! Pipes and the probe contract that connects them
//!
//! A pipe owns a fixed set of [`Inlet`]s and [`Outlet`]s and decides how messages move between
//! them. Transfers are found by probing: [`Pipe::find_receiver`] asks "if a message arrived at
//! one of your inlets right now, where would it go?" and [`Pipe::find_sender`] asks "if one of
//! your outlets wanted a message right now, where would it come from?". A probe only looks. It
//! answers with a one-shot callback, and nothing moves until that callback is invoked.
//!
//! Probes and callbacks always run while the caller holds the lock of the whole connected
//! topology, so a pipe may read and mutate its state from them without further locking of its
//! own beyond interior mutability.

use crate::{
    lets::{Inlet, Outlet},
    resource::{ResourceGuard, ResourceKind, SharedResource},
};
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

mod basic;
mod capacity;
mod either_inlet;
mod either_outlet;
mod source;
mod valved;

pub use self::{
    basic::BasicPipe,
    capacity::CapacityPipe,
    either_inlet::EitherInletPipe,
    either_outlet::EitherOutletPipe,
    source::SourcePipe,
    valved::ValvedPipe,
};


/// One-shot callback that accepts a message, returned by a successful receiver probe
pub type Receiver<T> = Box<dyn FnOnce(T)>;

/// One-shot callback that yields a message, returned by a successful sender probe
pub type Sender<T> = Box<dyn FnOnce() -> T>;

/// A component of a pipe system
///
/// Implementations must keep `find_receiver` and `find_sender` free of side effects: a probe
/// may be discarded (for example by a tie-breaker choosing the other side), so all mutation
/// belongs inside the returned callback.
///
/// Custom pipes are built with [`Arc::new_cyclic`], creating their lets through a
/// [`PipeResource`] so that the lets are locked together with the pipe.
pub trait Pipe<T>: Send + Sync {
    /// The lock resource the pipe's lets are linked to
    fn resource(&self) -> &PipeResource;

    /// The pipe's connectable inlets
    fn inlets(&self) -> SmallVec<[Arc<Inlet<T>>; 2]>;

    /// The pipe's connectable outlets
    fn outlets(&self) -> SmallVec<[Arc<Outlet<T>>; 2]>;

    /// Find somewhere a message entering this pipe could go right now
    fn find_receiver(&self, search: &mut Search) -> Option<Receiver<T>>;

    /// Find somewhere a message leaving this pipe could come from right now
    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>>;
}

/// The chain of pipes a probe is currently passing through
///
/// A probe that would re-enter a pipe already on its path stops there and finds nothing. This is
/// what makes probing terminate on topologies wired into cycles.
#[derive(Debug, Default, Clone)]
pub struct Search {
    path: SmallVec<[usize; 8]>,
    waiting_only: bool,
}

impl Search {
    /// Start a new probe.
    pub fn new() -> Self {
        Self::default()
    }

    // start a new probe that treats `pipe` as already entered.
    pub(crate) fn from_pipe<T: Send + 'static>(pipe: &dyn Pipe<T>) -> Self {
        let mut search = Self::new();
        search.path.push(pipe_id(pipe));
        search
    }

    // start a new probe that treats both `pipes` as already entered.
    pub(crate) fn from_pipes<T: Send + 'static>(first: &dyn Pipe<T>, second: &dyn Pipe<T>) -> Self {
        let mut search = Self::from_pipe(first);
        search.path.push(pipe_id(second));
        search
    }

    // restrict the search to parties that already exist: buffers offer no free space and sources
    // offer nothing to produce.
    pub(crate) fn waiting_only(mut self) -> Self {
        self.waiting_only = true;
        self
    }

    /// Number of pipes on the current path.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Whether the search only looks for parties that are already waiting
    ///
    /// Pipes that store or produce messages should offer neither storage nor production to such
    /// a search, since nobody has asked for a transfer yet.
    pub fn is_waiting_only(&self) -> bool {
        self.waiting_only
    }
}

// identity of a pipe, for probe paths and graph deduplication.
pub(crate) fn pipe_id<T: Send + 'static>(pipe: &dyn Pipe<T>) -> usize {
    pipe as *const dyn Pipe<T> as *const () as usize
}

// run `f` against `pipe` one level deeper in the probe, unless the pipe is already on the path
// or has been dropped.
pub(crate) fn probe<T, R>(
    pipe: &Weak<dyn Pipe<T>>,
    search: &mut Search,
    f: impl FnOnce(&dyn Pipe<T>, &mut Search) -> Option<R>,
) -> Option<R>
where
    T: Send + 'static,
{
    let pipe = pipe.upgrade()?;
    let id = pipe_id(&*pipe);
    if search.path.contains(&id) {
        trace!(depth = search.depth(), "probe re-entered a pipe on its path, cutting cycle");
        return None;
    }
    search.path.push(id);
    let found = f(&*pipe, search);
    search.path.pop();
    found
}

// match parties that may have become able to meet through a newly opened path from `upstream`
// to `downstream`, until no more pairs remain. must be called with the topology locked, and only
// on acyclic topologies, where the two sides cannot reach each other's buffers.
//
// nothing is produced or buffered without demand: a source only feeds a receiver that is
// already parked, and a buffer only takes a message that already exists.
pub(crate) fn release_matches<T: Send + 'static>(
    upstream: &dyn Pipe<T>,
    downstream: &dyn Pipe<T>,
) -> usize {
    let mut released = 0;
    while let Some((receiver, sender)) = next_match(upstream, downstream) {
        receiver(sender());
        released += 1;
    }
    if released > 0 {
        trace!(released, "released parked parties across new path");
    }
    released
}

fn next_match<T: Send + 'static>(
    upstream: &dyn Pipe<T>,
    downstream: &dyn Pipe<T>,
) -> Option<(Receiver<T>, Sender<T>)> {
    // a parked receiver may be fed from anything upstream
    let receiver = downstream.find_receiver(&mut Search::from_pipes(downstream, upstream).waiting_only());
    if let Some(receiver) = receiver {
        if let Some(sender) = upstream.find_sender(&mut Search::from_pipes(upstream, downstream)) {
            return Some((receiver, sender));
        }
    }
    // otherwise only messages that already exist upstream may move on, into buffers included
    let receiver = downstream.find_receiver(&mut Search::from_pipes(downstream, upstream))?;
    let sender = upstream.find_sender(&mut Search::from_pipes(upstream, downstream).waiting_only())?;
    Some((receiver, sender))
}


/// Lock resource of a pipe
///
/// Lets created through a pipe's resource are locked together with it, and with everything they
/// are later connected to.
pub struct PipeResource(Arc<SharedResource>);

impl PipeResource {
    /// Construct a resource for a new pipe.
    pub fn new() -> Self {
        PipeResource(SharedResource::new(ResourceKind::Pipe))
    }

    /// Create an inlet owned by `pipe`.
    pub fn inlet<T: Send + 'static>(&self, pipe: Weak<dyn Pipe<T>>) -> Arc<Inlet<T>> {
        let resource = self.attach(ResourceKind::Inlet);
        Arc::new(Inlet::new(pipe, resource))
    }

    /// Create an outlet owned by `pipe`.
    pub fn outlet<T: Send + 'static>(&self, pipe: Weak<dyn Pipe<T>>) -> Arc<Outlet<T>> {
        let resource = self.attach(ResourceKind::Outlet);
        Arc::new(Outlet::new(pipe, resource))
    }

    fn attach(&self, kind: ResourceKind) -> Arc<SharedResource> {
        let resource = SharedResource::new(kind);
        let guard = SharedResource::lock_with(&self.0, &resource);
        SharedResource::link(&self.0, &resource, &guard);
        resource
    }

    // lock the whole topology the pipe is part of.
    pub(crate) fn lock(&self) -> ResourceGuard {
        self.0.lock()
    }
}

impl Default for PipeResource {
    fn default() -> Self {
        Self::new()
    }
}
