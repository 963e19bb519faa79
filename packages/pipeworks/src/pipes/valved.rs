use super::{release_matches, Pipe, PipeResource, Receiver, Search, Sender};
use crate::{
    lets::{Inlet, Outlet},
    tie_breaker::TieBreaker,
    validate,
};
use smallvec::{smallvec, SmallVec};
use std::sync::{
    atomic::{AtomicBool, Ordering::SeqCst},
    Arc, Weak,
};


/// Pipe with one inlet and one outlet that only lets messages through while its valve is open
///
/// A closed valve looks like a pipe that nothing can be sent into or received from. Opening it
/// releases any senders upstream and receivers downstream that could now meet.
pub struct ValvedPipe<T> {
    resource: PipeResource,
    inlet: Arc<Inlet<T>>,
    outlet: Arc<Outlet<T>>,
    // only written while the topology is locked.
    open: AtomicBool,
    tie_breaker: TieBreaker,
}

impl<T: Send + 'static> ValvedPipe<T> {
    /// Construct a new, unconnected pipe with its valve open or closed.
    pub fn new(open: bool) -> Arc<Self> {
        Self::with_tie_breaker(open, TieBreaker::default())
    }

    /// Construct a new, unconnected pipe carrying `tie_breaker`.
    ///
    /// A single path through the valve never ties, so the tie-breaker is carried but never
    /// consulted.
    pub fn with_tie_breaker(open: bool, tie_breaker: TieBreaker) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let resource = PipeResource::new();
            let pipe: Weak<dyn Pipe<T>> = this.clone();
            ValvedPipe {
                inlet: resource.inlet(pipe.clone()),
                outlet: resource.outlet(pipe),
                resource,
                open: AtomicBool::new(open),
                tie_breaker,
            }
        })
    }

    /// The inlet in front of the valve
    pub fn inlet(&self) -> &Arc<Inlet<T>> {
        &self.inlet
    }

    /// The outlet behind the valve
    pub fn outlet(&self) -> &Arc<Outlet<T>> {
        &self.outlet
    }

    /// Whether messages currently pass
    pub fn is_open(&self) -> bool {
        self.open.load(SeqCst)
    }

    /// The tie-breaker the pipe was built with
    pub fn tie_breaker(&self) -> &TieBreaker {
        &self.tie_breaker
    }

    /// Open the valve, matching any parties it was keeping apart.
    pub fn open(self: &Arc<Self>) {
        let _guard = self.resource.lock();
        if self.open.swap(true, SeqCst) {
            return;
        }
        let this: Arc<dyn Pipe<T>> = self.clone();
        let released = if validate::is_tree(&this) { release_matches(&*this, &*this) } else { 0 };
        trace!(released, "valve opened");
    }

    /// Close the valve. Transfers already under way are unaffected.
    pub fn close(&self) {
        let _guard = self.resource.lock();
        self.open.store(false, SeqCst);
        trace!("valve closed");
    }
}

impl<T: Send + 'static> Pipe<T> for ValvedPipe<T> {
    fn resource(&self) -> &PipeResource {
        &self.resource
    }

    fn inlets(&self) -> SmallVec<[Arc<Inlet<T>>; 2]> {
        smallvec![Arc::clone(&self.inlet)]
    }

    fn outlets(&self) -> SmallVec<[Arc<Outlet<T>>; 2]> {
        smallvec![Arc::clone(&self.outlet)]
    }

    fn find_receiver(&self, search: &mut Search) -> Option<Receiver<T>> {
        if !self.is_open() {
            return None;
        }
        self.outlet.find_receiver(search)
    }

    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>> {
        if !self.is_open() {
            return None;
        }
        self.inlet.find_sender(search)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{InvalidStateReason, PipeError},
        pipes::{BasicPipe, CapacityPipe},
        tie_breaker::{Side, TieBreakerKind},
    };
    use std::{thread, time::Duration};

    const SETTLE: Duration = Duration::from_millis(100);

    #[test]
    fn open_valve_passes_messages() {
        let pipe = ValvedPipe::<i32>::new(true);
        assert!(pipe.is_open());
        let join = thread::spawn({
            let outlet = Arc::clone(pipe.outlet());
            move || outlet.receive()
        });
        thread::sleep(SETTLE);
        pipe.inlet().send(1).unwrap();
        assert_eq!(join.join().unwrap(), Ok(1));
    }

    #[test]
    fn closed_valve_finds_nothing() {
        let pipe = ValvedPipe::<i32>::new(false);
        let join = thread::spawn({
            let outlet = Arc::clone(pipe.outlet());
            move || outlet.receive_timeout(Duration::from_millis(300))
        });
        thread::sleep(SETTLE);

        let e = pipe.inlet().send_immediately(1).unwrap_err();
        assert_eq!(e.cause, PipeError::InvalidState(InvalidStateReason::NothingAvailable));
        assert_eq!(join.join().unwrap(), Err(PipeError::Timeout));
    }

    #[test]
    fn opening_releases_parked_parties() {
        let pipe = ValvedPipe::<i32>::new(false);
        let send = thread::spawn({
            let inlet = Arc::clone(pipe.inlet());
            move || inlet.send_timeout(2, Duration::from_secs(5))
        });
        let recv = thread::spawn({
            let outlet = Arc::clone(pipe.outlet());
            move || outlet.receive_timeout(Duration::from_secs(5))
        });
        thread::sleep(SETTLE);
        assert_eq!(pipe.inlet().waiting_senders(), 1);

        pipe.open();
        send.join().unwrap().unwrap();
        assert_eq!(recv.join().unwrap(), Ok(2));
    }

    #[test]
    fn opening_drains_an_upstream_buffer_into_downstream_receivers() {
        let upstream = CapacityPipe::<i32>::new(2);
        let valve = ValvedPipe::new(false);
        let downstream = BasicPipe::new();
        upstream.outlet().connect_to(valve.inlet()).unwrap();
        valve.outlet().connect_to(downstream.inlet()).unwrap();
        for msg in [1, 2] {
            upstream.inlet().send(msg).unwrap();
        }

        let joins: Vec<_> = (0..2)
            .map(|_| {
                let outlet = Arc::clone(downstream.outlet());
                let join = thread::spawn(move || outlet.receive_timeout(Duration::from_secs(5)));
                thread::sleep(Duration::from_millis(30));
                join
            })
            .collect();
        thread::sleep(SETTLE);

        valve.open();
        let got: Vec<_> = joins.into_iter().map(|join| join.join().unwrap().unwrap()).collect();
        assert_eq!(got, [1, 2]);
        assert_eq!(upstream.stored_count(), 0);
    }

    #[test]
    fn closing_holds_back_later_messages() {
        let pipe = ValvedPipe::<i32>::new(true);
        pipe.close();
        assert!(!pipe.is_open());
        assert_eq!(
            pipe.outlet().receive_immediately(),
            Err(PipeError::InvalidState(InvalidStateReason::NothingAvailable)),
        );
    }

    #[test]
    fn carries_its_tie_breaker() {
        let pipe = ValvedPipe::<i32>::new(true);
        assert_eq!(pipe.tie_breaker().kind(), TieBreakerKind::Prioritising(Side::Left));

        let pipe = ValvedPipe::<i32>::with_tie_breaker(false, TieBreaker::alternating(Side::Right));
        assert_eq!(pipe.tie_breaker().kind(), TieBreakerKind::Alternating);
        assert!(!pipe.is_open());
    }
}
