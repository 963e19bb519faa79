
use super::{Pipe, PipeResource, Receiver, Search, Sender};
use crate::{
    lets::{Inlet, Outlet},
    tie_breaker::{Side, TieBreaker},
};
use smallvec::{smallvec, SmallVec};
use std::sync::{Arc, Weak};


/// Pipe with two inlets and one outlet, merging messages from whichever inlet has one
///
/// When both inlets could supply a message, the pipe's [`TieBreaker`] picks one.
pub struct EitherInletPipe<T> {
    resource: PipeResource,
    left_inlet: Arc<Inlet<T>>,
    right_inlet: Arc<Inlet<T>>,
    outlet: Arc<Outlet<T>>,
    tie_breaker: TieBreaker,
}

impl<T: Send + 'static> EitherInletPipe<T> {
    /// Construct a pipe that prefers the left inlet.
    pub fn new() -> Arc<Self> {
        Self::with_tie_breaker(TieBreaker::default())
    }

    /// Construct a pipe that settles ties between its inlets with `tie_breaker`.
    pub fn with_tie_breaker(tie_breaker: TieBreaker) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let resource = PipeResource::new();
            let pipe: Weak<dyn Pipe<T>> = this.clone();
            EitherInletPipe {
                left_inlet: resource.inlet(pipe.clone()),
                right_inlet: resource.inlet(pipe.clone()),
                outlet: resource.outlet(pipe),
                resource,
                tie_breaker,
            }
        })
    }

    /// The inlet on the left side
    pub fn left_inlet(&self) -> &Arc<Inlet<T>> {
        &self.left_inlet
    }

    /// The inlet on the right side
    pub fn right_inlet(&self) -> &Arc<Inlet<T>> {
        &self.right_inlet
    }

    /// The inlet on `side`
    pub fn inlet(&self, side: Side) -> &Arc<Inlet<T>> {
        match side {
            Side::Left => &self.left_inlet,
            Side::Right => &self.right_inlet,
        }
    }

    /// The single outlet
    pub fn outlet(&self) -> &Arc<Outlet<T>> {
        &self.outlet
    }

    /// The strategy choosing between inlets
    pub fn tie_breaker(&self) -> &TieBreaker {
        &self.tie_breaker
    }
}

impl<T: Send + 'static> Pipe<T> for EitherInletPipe<T> {
    fn resource(&self) -> &PipeResource {
        &self.resource
    }

    fn inlets(&self) -> SmallVec<[Arc<Inlet<T>>; 2]> {
        smallvec![Arc::clone(&self.left_inlet), Arc::clone(&self.right_inlet)]
    }

    fn outlets(&self) -> SmallVec<[Arc<Outlet<T>>; 2]> {
        smallvec![Arc::clone(&self.outlet)]
    }

    fn find_receiver(&self, search: &mut Search) -> Option<Receiver<T>> {
        self.outlet.find_receiver(search)
    }

    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>> {
        let left = self.left_inlet.find_sender(search);
        let right = self.right_inlet.find_sender(search);
        match (left, right) {
            (Some(left), Some(right)) => Some(match self.tie_breaker.resolve_tie() {
                Side::Left => left,
                Side::Right => right,
            }),
            (left, right) => left.or(right),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use std::{thread, time::Duration};

    const SETTLE: Duration = Duration::from_millis(100);

    fn park_sender(inlet: &Arc<Inlet<i32>>, msg: i32) -> thread::JoinHandle<Result<(), SendError<i32>>> {
        let inlet = Arc::clone(inlet);
        thread::spawn(move || inlet.send_timeout(msg, Duration::from_secs(5)))
    }

    #[test]
    fn has_two_inlets_and_one_outlet() {
        let pipe = EitherInletPipe::<i32>::new();
        let inlets = pipe.inlets();
        assert_eq!(inlets.len(), 2);
        assert!(Arc::ptr_eq(&inlets[0], pipe.inlet(Side::Left)));
        assert!(Arc::ptr_eq(&inlets[1], pipe.inlet(Side::Right)));
        assert_eq!(pipe.outlets().len(), 1);
        assert!(Arc::ptr_eq(&pipe.outlets()[0], pipe.outlet()));
    }

    #[test]
    fn finds_nothing_with_nobody_waiting() {
        let pipe = EitherInletPipe::<i32>::new();
        let _guard = pipe.resource().lock();
        assert!(pipe.find_receiver(&mut Search::new()).is_none());
        assert!(pipe.find_sender(&mut Search::new()).is_none());
    }

    #[test]
    fn either_inlet_reaches_a_parked_receiver() {
        let pipe = EitherInletPipe::<i32>::new();
        let join = thread::spawn({
            let outlet = Arc::clone(pipe.outlet());
            move || outlet.receive()
        });
        thread::sleep(SETTLE);
        pipe.right_inlet().send(4).unwrap();
        assert_eq!(join.join().unwrap(), Ok(4));
    }

    #[test]
    fn takes_from_whichever_side_has_a_sender() {
        for side in [Side::Left, Side::Right] {
            let pipe = EitherInletPipe::<i32>::with_tie_breaker(TieBreaker::prioritising(side.opposite()));
            let join = park_sender(pipe.inlet(side), 5);
            thread::sleep(SETTLE);
            assert_eq!(pipe.outlet().receive(), Ok(5));
            join.join().unwrap().unwrap();
        }
    }

    #[test]
    fn prioritising_tie_goes_to_the_priority_side() {
        let pipe = EitherInletPipe::<i32>::with_tie_breaker(TieBreaker::prioritising(Side::Left));
        let left = park_sender(pipe.left_inlet(), 1);
        let right = park_sender(pipe.right_inlet(), 2);
        thread::sleep(SETTLE);

        assert_eq!(pipe.outlet().receive(), Ok(1));
        assert_eq!(pipe.outlet().receive(), Ok(2));
        left.join().unwrap().unwrap();
        right.join().unwrap().unwrap();
    }

    #[test]
    fn alternating_ties_switch_sides() {
        let pipe = EitherInletPipe::<i32>::with_tie_breaker(TieBreaker::alternating(Side::Right));
        let joins = [
            park_sender(pipe.left_inlet(), 10),
            park_sender(pipe.right_inlet(), 20),
        ];
        thread::sleep(SETTLE);
        let joins_2 = [
            park_sender(pipe.left_inlet(), 11),
            park_sender(pipe.right_inlet(), 21),
        ];
        thread::sleep(SETTLE);

        // every receive is a tie until one side runs dry
        let got: Vec<_> = (0..4).map(|_| pipe.outlet().receive().unwrap()).collect();
        assert_eq!(got, [20, 10, 21, 11]);
        for join in joins.into_iter().chain(joins_2) {
            join.join().unwrap().unwrap();
        }
    }
}
