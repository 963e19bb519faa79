
use super::{Pipe, PipeResource, Receiver, Search, Sender};
use crate::{
    lets::{Inlet, Outlet},
    tie_breaker::{Side, TieBreaker},
};
use smallvec::{smallvec, SmallVec};
use std::sync::{Arc, Weak};


/// Pipe with one inlet and two outlets, routing each message to whichever outlet can take it
///
/// When both outlets could take a message, the pipe's [`TieBreaker`] picks one.
pub struct EitherOutletPipe<T> {
    resource: PipeResource,
    inlet: Arc<Inlet<T>>,
    left_outlet: Arc<Outlet<T>>,
    right_outlet: Arc<Outlet<T>>,
    tie_breaker: TieBreaker,
}

impl<T: Send + 'static> EitherOutletPipe<T> {
    /// Construct a pipe that prefers the left outlet.
    pub fn new() -> Arc<Self> {
        Self::with_tie_breaker(TieBreaker::default())
    }

    /// Construct a pipe that settles ties between its outlets with `tie_breaker`.
    pub fn with_tie_breaker(tie_breaker: TieBreaker) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let resource = PipeResource::new();
            let pipe: Weak<dyn Pipe<T>> = this.clone();
            EitherOutletPipe {
                inlet: resource.inlet(pipe.clone()),
                left_outlet: resource.outlet(pipe.clone()),
                right_outlet: resource.outlet(pipe),
                resource,
                tie_breaker,
            }
        })
    }

    /// The single inlet
    pub fn inlet(&self) -> &Arc<Inlet<T>> {
        &self.inlet
    }

    /// The outlet on the left side
    pub fn left_outlet(&self) -> &Arc<Outlet<T>> {
        &self.left_outlet
    }

    /// The outlet on the right side
    pub fn right_outlet(&self) -> &Arc<Outlet<T>> {
        &self.right_outlet
    }

    /// The outlet on `side`
    pub fn outlet(&self, side: Side) -> &Arc<Outlet<T>> {
        match side {
            Side::Left => &self.left_outlet,
            Side::Right => &self.right_outlet,
        }
    }

    /// The strategy choosing between outlets
    pub fn tie_breaker(&self) -> &TieBreaker {
        &self.tie_breaker
    }
}

impl<T: Send + 'static> Pipe<T> for EitherOutletPipe<T> {
    fn resource(&self) -> &PipeResource {
        &self.resource
    }

    fn inlets(&self) -> SmallVec<[Arc<Inlet<T>>; 2]> {
        smallvec![Arc::clone(&self.inlet)]
    }

    fn outlets(&self) -> SmallVec<[Arc<Outlet<T>>; 2]> {
        smallvec![Arc::clone(&self.left_outlet), Arc::clone(&self.right_outlet)]
    }

    fn find_receiver(&self, search: &mut Search) -> Option<Receiver<T>> {
        let left = self.left_outlet.find_receiver(search);
        let right = self.right_outlet.find_receiver(search);
        match (left, right) {
            (Some(left), Some(right)) => Some(match self.tie_breaker.resolve_tie() {
                Side::Left => left,
                Side::Right => right,
            }),
            (left, right) => left.or(right),
        }
    }

    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>> {
        self.inlet.find_sender(search)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipes::BasicPipe;
    use std::{
        sync::atomic::{AtomicUsize, Ordering::SeqCst},
        thread,
        time::Duration,
    };

    const SETTLE: Duration = Duration::from_millis(100);

    // a basic pipe downstream of each outlet, with a receiver parked on each.
    fn with_receivers_on_both_sides(
        tie_breaker: TieBreaker,
    ) -> (Arc<EitherOutletPipe<i32>>, [Arc<BasicPipe<i32>>; 2]) {
        let pipe = EitherOutletPipe::with_tie_breaker(tie_breaker);
        let left = BasicPipe::new();
        let right = BasicPipe::new();
        pipe.left_outlet().connect_to(left.inlet()).unwrap();
        pipe.right_outlet().connect_to(right.inlet()).unwrap();
        (pipe, [left, right])
    }

    fn park_receiver(pipe: &BasicPipe<i32>) -> thread::JoinHandle<Result<i32, crate::error::PipeError>> {
        let outlet = Arc::clone(pipe.outlet());
        thread::spawn(move || outlet.receive_timeout(Duration::from_secs(5)))
    }

    #[test]
    fn has_one_inlet_and_two_outlets() {
        let pipe = EitherOutletPipe::<i32>::new();
        assert_eq!(pipe.inlets().len(), 1);
        assert!(Arc::ptr_eq(&pipe.inlets()[0], pipe.inlet()));
        let outlets = pipe.outlets();
        assert_eq!(outlets.len(), 2);
        assert!(Arc::ptr_eq(&outlets[0], pipe.outlet(Side::Left)));
        assert!(Arc::ptr_eq(&outlets[1], pipe.outlet(Side::Right)));
    }

    #[test]
    fn finds_nothing_with_nobody_waiting() {
        let pipe = EitherOutletPipe::<i32>::new();
        let _guard = pipe.resource().lock();
        assert!(pipe.find_receiver(&mut Search::new()).is_none());
        assert!(pipe.find_sender(&mut Search::new()).is_none());
    }

    #[test]
    fn uses_whichever_side_has_a_receiver() {
        for side in [Side::Left, Side::Right] {
            let pipe = EitherOutletPipe::<i32>::with_tie_breaker(TieBreaker::prioritising(side.opposite()));
            let join = thread::spawn({
                let outlet = Arc::clone(pipe.outlet(side));
                move || outlet.receive()
            });
            thread::sleep(SETTLE);

            pipe.inlet().send(3).unwrap();
            assert_eq!(join.join().unwrap(), Ok(3));
        }
    }

    #[test]
    fn either_outlet_can_take_from_a_parked_sender() {
        let pipe = EitherOutletPipe::<i32>::new();
        let join = thread::spawn({
            let inlet = Arc::clone(pipe.inlet());
            move || inlet.send(3)
        });
        thread::sleep(SETTLE);
        assert_eq!(pipe.right_outlet().receive_immediately(), Ok(3));
        join.join().unwrap().unwrap();
    }

    #[test]
    fn prioritising_tie_goes_to_the_priority_side() {
        let (pipe, [left, right]) = with_receivers_on_both_sides(TieBreaker::prioritising(Side::Right));
        let left_join = park_receiver(&left);
        let right_join = park_receiver(&right);
        thread::sleep(SETTLE);

        pipe.inlet().send(1).unwrap();
        assert_eq!(right_join.join().unwrap(), Ok(1));
        // now only the left receiver remains, so no tie
        pipe.inlet().send(2).unwrap();
        assert_eq!(left_join.join().unwrap(), Ok(2));
    }

    #[test]
    fn tie_breaker_is_consulted_only_for_ties() {
        let ties = Arc::new(AtomicUsize::new(0));
        let (pipe, [left, _right]) = with_receivers_on_both_sides(TieBreaker::custom({
            let ties = Arc::clone(&ties);
            move || {
                ties.fetch_add(1, SeqCst);
                Side::Left
            }
        }));
        let join = park_receiver(&left);
        thread::sleep(SETTLE);

        pipe.inlet().send(1).unwrap();
        assert_eq!(join.join().unwrap(), Ok(1));
        assert_eq!(ties.load(SeqCst), 0);
    }

    #[test]
    fn alternating_ties_switch_sides() {
        let (pipe, [left, right]) = with_receivers_on_both_sides(TieBreaker::alternating(Side::Left));
        for round in 0..2 {
            let left_join = park_receiver(&left);
            let right_join = park_receiver(&right);
            thread::sleep(SETTLE);

            // the first send of each round is a tie, the second is not
            pipe.inlet().send(round * 10).unwrap();
            pipe.inlet().send(round * 10 + 1).unwrap();
            let (l, r) = (left_join.join().unwrap().unwrap(), right_join.join().unwrap().unwrap());
            if round == 0 {
                assert_eq!((l, r), (0, 1));
            } else {
                assert_eq!((l, r), (11, 10));
            }
        }
    }
}
