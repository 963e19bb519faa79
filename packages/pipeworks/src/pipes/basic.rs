
use super::{Pipe, PipeResource, Receiver, Search, Sender};
use crate::lets::{Inlet, Outlet};
use smallvec::{smallvec, SmallVec};
use std::sync::{Arc, Weak};


/// Pipe with one inlet and one outlet that passes messages straight through, without buffering
pub struct BasicPipe<T> {
    resource: PipeResource,
    inlet: Arc<Inlet<T>>,
    outlet: Arc<Outlet<T>>,
}

impl<T: Send + 'static> BasicPipe<T> {
    /// Construct a new, unconnected basic pipe.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let resource = PipeResource::new();
            let pipe: Weak<dyn Pipe<T>> = this.clone();
            BasicPipe {
                inlet: resource.inlet(pipe.clone()),
                outlet: resource.outlet(pipe),
                resource,
            }
        })
    }

    /// The inlet messages enter through
    pub fn inlet(&self) -> &Arc<Inlet<T>> {
        &self.inlet
    }

    /// The outlet messages leave through
    pub fn outlet(&self) -> &Arc<Outlet<T>> {
        &self.outlet
    }
}

impl<T: Send + 'static> Pipe<T> for BasicPipe<T> {
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
        self.outlet.find_receiver(search)
    }

    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>> {
        self.inlet.find_sender(search)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    const SETTLE: Duration = Duration::from_millis(100);

    #[test]
    fn has_one_inlet_and_one_outlet() {
        let pipe = BasicPipe::<i32>::new();
        assert_eq!(pipe.inlets().len(), 1);
        assert_eq!(pipe.outlets().len(), 1);
        assert!(Arc::ptr_eq(&pipe.inlets()[0], pipe.inlet()));
        assert!(Arc::ptr_eq(&pipe.outlets()[0], pipe.outlet()));
    }

    #[test]
    fn find_receiver_with_nobody_waiting_finds_nothing() {
        let pipe = BasicPipe::<i32>::new();
        let _guard = pipe.resource().lock();
        assert!(pipe.find_receiver(&mut Search::new()).is_none());
        assert!(pipe.find_sender(&mut Search::new()).is_none());
    }

    #[test]
    fn find_receiver_finds_a_parked_receiver() {
        let pipe = BasicPipe::<i32>::new();
        let join = thread::spawn({
            let outlet = Arc::clone(pipe.outlet());
            move || outlet.receive()
        });
        thread::sleep(SETTLE);

        let guard = pipe.resource().lock();
        let receiver = pipe.find_receiver(&mut Search::new()).unwrap();
        receiver(3);
        drop(guard);
        assert_eq!(join.join().unwrap(), Ok(3));
    }

    #[test]
    fn find_sender_finds_a_parked_sender() {
        let pipe = BasicPipe::<i32>::new();
        let join = thread::spawn({
            let inlet = Arc::clone(pipe.inlet());
            move || inlet.send(3)
        });
        thread::sleep(SETTLE);

        let guard = pipe.resource().lock();
        let sender = pipe.find_sender(&mut Search::new()).unwrap();
        assert_eq!(sender(), 3);
        drop(guard);
        join.join().unwrap().unwrap();
    }

    #[test]
    fn lookups_reach_across_a_line_of_pipes() {
        let pipes: Vec<_> = (0..3).map(|_| BasicPipe::<i32>::new()).collect();
        pipes[0].outlet().connect_to(pipes[1].inlet()).unwrap();
        pipes[1].outlet().connect_to(pipes[2].inlet()).unwrap();

        let join = thread::spawn({
            let outlet = Arc::clone(pipes[2].outlet());
            move || outlet.receive()
        });
        thread::sleep(SETTLE);

        let guard = pipes[0].resource().lock();
        let mut search = Search::new();
        let receiver = pipes[0].find_receiver(&mut search).unwrap();
        assert_eq!(search.depth(), 0);
        receiver(12);
        drop(guard);
        assert_eq!(join.join().unwrap(), Ok(12));
    }

    #[test]
    fn probing_a_self_loop_terminates() {
        let pipe = BasicPipe::<i32>::new();
        crate::lets::connect_raw(pipe.inlet(), pipe.outlet());

        let _guard = pipe.resource().lock();
        let this: Arc<dyn Pipe<i32>> = pipe.clone();
        assert!(crate::pipes::probe(&Arc::downgrade(&this), &mut Search::new(), |p, s| {
            p.find_receiver(s)
        })
        .is_none());
        assert!(pipe.find_sender(&mut Search::new()).is_none());
    }
}
