
use super::{Pipe, PipeResource, Receiver, Search, Sender};
use crate::lets::{Inlet, Outlet};
use smallvec::{smallvec, SmallVec};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
};


/// Pipe with one inlet and one outlet that buffers up to a fixed number of messages
///
/// Messages leave in the order they entered. While the buffer holds anything, incoming messages
/// queue behind it rather than bypassing it to a waiting receiver. A capacity of zero makes this
/// behave like a [`BasicPipe`](super::BasicPipe).
pub struct CapacityPipe<T> {
    resource: PipeResource,
    inlet: Arc<Inlet<T>>,
    outlet: Arc<Outlet<T>>,
    capacity: usize,
    // only mutated while the topology is locked. shared with the callbacks this pipe hands out.
    buffer: Arc<Mutex<VecDeque<T>>>,
}

impl<T: Send + 'static> CapacityPipe<T> {
    /// Construct a new, unconnected pipe that can hold `capacity` messages.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let resource = PipeResource::new();
            let pipe: Weak<dyn Pipe<T>> = this.clone();
            CapacityPipe {
                inlet: resource.inlet(pipe.clone()),
                outlet: resource.outlet(pipe),
                resource,
                capacity,
                buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            }
        })
    }

    /// The inlet messages are buffered from
    pub fn inlet(&self) -> &Arc<Inlet<T>> {
        &self.inlet
    }

    /// The outlet buffered messages leave through
    pub fn outlet(&self) -> &Arc<Outlet<T>> {
        &self.outlet
    }

    /// Maximum number of messages held at once
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently held
    pub fn stored_count(&self) -> usize {
        let _guard = self.resource.lock();
        self.buffer.lock().unwrap().len()
    }

    /// Snapshot of the messages currently held, oldest first
    pub fn stored_messages(&self) -> Vec<T>
    where
        T: Clone,
    {
        let _guard = self.resource.lock();
        self.buffer.lock().unwrap().iter().cloned().collect()
    }

    fn buffering_receiver(&self, search: &Search) -> Option<Receiver<T>> {
        if search.is_waiting_only() || self.buffer.lock().unwrap().len() >= self.capacity {
            return None;
        }
        let buffer = Arc::clone(&self.buffer);
        Some(Box::new(move |msg| buffer.lock().unwrap().push_back(msg)))
    }
}

impl<T: Send + 'static> Pipe<T> for CapacityPipe<T> {
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
        let empty = self.buffer.lock().unwrap().is_empty();
        if empty {
            if let Some(receiver) = self.outlet.find_receiver(search) {
                return Some(receiver);
            }
        }
        self.buffering_receiver(search)
    }

    fn find_sender(&self, search: &mut Search) -> Option<Sender<T>> {
        if self.buffer.lock().unwrap().is_empty() {
            return if self.capacity == 0 { self.inlet.find_sender(search) } else { None };
        }

        let buffer = Arc::clone(&self.buffer);
        let inlet = Arc::clone(&self.inlet);
        let capacity = self.capacity;
        let this: &dyn Pipe<T> = self;
        let mut refill_search = Search::from_pipe(this);
        Some(Box::new(move || {
            let (msg, was_full) = {
                let mut buffer = buffer.lock().unwrap();
                let msg = buffer.pop_front()
                    .expect("capacity pipe buffer drained between probe and use (internal bug)");
                (msg, buffer.len() + 1 == capacity)
            };
            // a full buffer may have held back upstream traffic, so pull the next message in
            if was_full {
                if let Some(sender) = inlet.find_sender(&mut refill_search) {
                    let next = sender();
                    buffer.lock().unwrap().push_back(next);
                }
            }
            msg
        }))
    }
}
