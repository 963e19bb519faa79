
use super::{Pipe, PipeResource, Receiver, Search, Sender};
use crate::lets::{Inlet, Outlet};
use smallvec::{smallvec, SmallVec};
use std::sync::{Arc, Mutex, Weak};


type Producer<T> = Arc<Mutex<Box<dyn FnMut() -> T + Send>>>;

/// Pipe with no inlets that produces a fresh message every time its outlet is pulled from
pub struct SourcePipe<T> {
    resource: PipeResource,
    outlet: Arc<Outlet<T>>,
    producer: Producer<T>,
}

impl<T: Send + 'static> SourcePipe<T> {
    /// Construct a source pipe producing messages with `producer`.
    ///
    /// The producer runs with the topology locked, so calls to it never overlap.
    pub fn new<F>(producer: F) -> Arc<Self>
    where
        F: FnMut() -> T + Send + 'static,
    {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let resource = PipeResource::new();
            let pipe: Weak<dyn Pipe<T>> = this.clone();
            SourcePipe {
                outlet: resource.outlet(pipe),
                resource,
                producer: Arc::new(Mutex::new(Box::new(producer))),
            }
        })
    }

    /// The outlet produced messages leave through
    pub fn outlet(&self) -> &Arc<Outlet<T>> {
        &self.outlet
    }
}

impl<T: Send + 'static> Pipe<T> for SourcePipe<T> {
    fn resource(&self) -> &PipeResource {
        &self.resource
    }

    fn inlets(&self) -> SmallVec<[Arc<Inlet<T>>; 2]> {
        SmallVec::new()
    }

    fn outlets(&self) -> SmallVec<[Arc<Outlet<T>>; 2]> {
        smallvec![Arc::clone(&self.outlet)]
    }

    fn find_receiver(&self, _: &mut Search) -> Option<Receiver<T>> {
        None
    }

    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>> {
        if search.is_waiting_only() {
            return None;
        }
        let producer = Arc::clone(&self.producer);
        Some(Box::new(move || {
            let mut producer = producer.lock().unwrap();
            (*producer)()
        }))
    }
}
