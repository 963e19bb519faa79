// structural checks over pipe topologies.
//
// these walk connections by reading each let's peer directly, so callers must hold the lock of
// the topology being walked.

use crate::pipes::{pipe_id, Pipe};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};


// pipes directly connected to `pipe`, through any of its lets, in either direction.
fn neighbours<T: Send + 'static>(pipe: &dyn Pipe<T>) -> Vec<Arc<dyn Pipe<T>>> {
    let upstream = pipe.inlets().into_iter()
        .filter_map(|inlet| inlet.peer())
        .filter_map(|outlet| outlet.pipe());
    let downstream = pipe.outlets().into_iter()
        .filter_map(|outlet| outlet.peer())
        .filter_map(|inlet| inlet.pipe());
    upstream.chain(downstream).collect()
}

// whether connecting an outlet of `from` to an inlet of `to` would create a cycle or a second
// path between two pipes, ie whether `to` is already reachable from `from`.
pub(crate) fn would_conflict<T: Send + 'static>(
    from: &Arc<dyn Pipe<T>>,
    to: &Arc<dyn Pipe<T>>,
) -> bool {
    let target = pipe_id(&**to);
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([Arc::clone(from)]);
    while let Some(pipe) = queue.pop_front() {
        if !seen.insert(pipe_id(&*pipe)) {
            continue;
        }
        if pipe_id(&*pipe) == target {
            return true;
        }
        queue.extend(neighbours(&*pipe));
    }
    false
}

// whether the topology containing `pipe` is a tree, ie connected with exactly one path between
// any two pipes. counts each connection once, from its outlet side.
pub(crate) fn is_tree<T: Send + 'static>(pipe: &Arc<dyn Pipe<T>>) -> bool {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([Arc::clone(pipe)]);
    let mut connections = 0;
    while let Some(pipe) = queue.pop_front() {
        if !seen.insert(pipe_id(&*pipe)) {
            continue;
        }
        connections += pipe.outlets().iter().filter(|outlet| outlet.peer().is_some()).count();
        queue.extend(neighbours(&*pipe));
    }
    connections + 1 == seen.len()
}
