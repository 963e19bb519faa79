//! Snapshot of a pipe topology as a graph of pipes and lets
//!
//! Every pipe and let in the topology becomes a [`Vertex`]. Edges run from each inlet to its
//! pipe, from each pipe to each of its outlets, and from each connected outlet to the inlet it is
//! connected to, so following edges follows the direction messages flow.

use crate::{
    lets::{Inlet, Outlet},
    pipes::{pipe_id, Pipe},
};
use petgraph::{
    algo::is_cyclic_directed,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};


/// A pipe or let in a [`PipeGraph`], compared by identity
pub enum Vertex<T> {
    Pipe(Arc<dyn Pipe<T>>),
    Inlet(Arc<Inlet<T>>),
    Outlet(Arc<Outlet<T>>),
}

impl<T: Send + 'static> Vertex<T> {
    fn addr(&self) -> usize {
        match self {
            Vertex::Pipe(pipe) => pipe_id(&**pipe),
            Vertex::Inlet(inlet) => Arc::as_ptr(inlet) as usize,
            Vertex::Outlet(outlet) => Arc::as_ptr(outlet) as usize,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Vertex::Pipe(_) => "Pipe",
            Vertex::Inlet(_) => "Inlet",
            Vertex::Outlet(_) => "Outlet",
        }
    }
}

impl<T> Clone for Vertex<T> {
    fn clone(&self) -> Self {
        match self {
            Vertex::Pipe(pipe) => Vertex::Pipe(Arc::clone(pipe)),
            Vertex::Inlet(inlet) => Vertex::Inlet(Arc::clone(inlet)),
            Vertex::Outlet(outlet) => Vertex::Outlet(Arc::clone(outlet)),
        }
    }
}

impl<T: Send + 'static> PartialEq for Vertex<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.addr() == other.addr()
    }
}

impl<T: Send + 'static> Eq for Vertex<T> {}

impl<T: Send + 'static> Hash for Vertex<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.addr().hash(state);
    }
}

impl<T: Send + 'static> fmt::Debug for Vertex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({:#x})", self.kind(), self.addr())
    }
}

/// What an [`Edge`] stands for
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// From an inlet to the pipe owning it
    IntoPipe,
    /// From a pipe to an outlet it owns
    OutOfPipe,
    /// From an outlet to the inlet it is connected to
    Connection,
}

/// A directed edge between two vertices
pub struct Edge<T> {
    pub source: Vertex<T>,
    pub target: Vertex<T>,
    pub kind: EdgeKind,
}

impl<T> Clone for Edge<T> {
    fn clone(&self) -> Self {
        Edge { source: self.source.clone(), target: self.target.clone(), kind: self.kind }
    }
}

impl<T: Send + 'static> PartialEq for Edge<T> {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target && self.kind == other.kind
    }
}

impl<T: Send + 'static> Eq for Edge<T> {}

impl<T: Send + 'static> Hash for Edge<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
        self.kind.hash(state);
    }
}

impl<T: Send + 'static> fmt::Debug for Edge<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} -> {:?} ({:?})", self.source, self.target, self.kind)
    }
}

/// Vertices and edges of a whole topology
///
/// Backed by a petgraph [`DiGraph`], which [`as_digraph`](Self::as_digraph) exposes for
/// running graph algorithms directly.
pub struct PipeGraph<T> {
    graph: DiGraph<Vertex<T>, EdgeKind>,
    index: HashMap<Vertex<T>, NodeIndex>,
}

impl<T: Send + 'static> PipeGraph<T> {
    fn new() -> Self {
        PipeGraph { graph: DiGraph::new(), index: HashMap::new() }
    }

    // node of `vertex`, added on first sight.
    fn node(&mut self, vertex: Vertex<T>) -> NodeIndex {
        if let Some(&idx) = self.index.get(&vertex) {
            return idx;
        }
        let idx = self.graph.add_node(vertex.clone());
        self.index.insert(vertex, idx);
        idx
    }

    fn add_edge(&mut self, source: Vertex<T>, target: Vertex<T>, kind: EdgeKind) {
        let source = self.node(source);
        let target = self.node(target);
        self.graph.add_edge(source, target, kind);
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex<T>> + '_ {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge<T>> + '_ {
        self.graph.edge_references().map(|edge| Edge {
            source: self.graph[edge.source()].clone(),
            target: self.graph[edge.target()].clone(),
            kind: *edge.weight(),
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_vertex(&self, vertex: &Vertex<T>) -> bool {
        self.index.contains_key(vertex)
    }

    /// Number of edges from `source` to `target`
    pub fn count_edges(&self, source: &Vertex<T>, target: &Vertex<T>) -> usize {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&source), Some(&target)) => self.graph.edges_connecting(source, target).count(),
            _ => 0,
        }
    }

    /// Whether following edges can lead back to where it started
    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    pub fn as_digraph(&self) -> &DiGraph<Vertex<T>, EdgeKind> {
        &self.graph
    }
}

impl<T: Send + 'static> fmt::Debug for PipeGraph<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PipeGraph")
            .field("graph", &self.graph)
            .finish()
    }
}

/// Build the graph of the whole topology `pipe` is part of.
///
/// The topology is locked while it is walked, so the result is a consistent snapshot.
pub fn of<T: Send + 'static>(pipe: Arc<dyn Pipe<T>>) -> PipeGraph<T> {
    let _guard = pipe.resource().lock();
    let mut graph = PipeGraph::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([pipe]);

    while let Some(pipe) = queue.pop_front() {
        if !seen.insert(pipe_id(&*pipe)) {
            continue;
        }
        let pipe_vertex = Vertex::Pipe(Arc::clone(&pipe));
        graph.node(pipe_vertex.clone());

        for inlet in pipe.inlets() {
            let inlet_vertex = Vertex::Inlet(Arc::clone(&inlet));
            graph.add_edge(inlet_vertex, pipe_vertex.clone(), EdgeKind::IntoPipe);
            if let Some(upstream) = inlet.peer().and_then(|outlet| outlet.pipe()) {
                queue.push_back(upstream);
            }
        }
        for outlet in pipe.outlets() {
            let outlet_vertex = Vertex::Outlet(Arc::clone(&outlet));
            graph.add_edge(pipe_vertex.clone(), outlet_vertex.clone(), EdgeKind::OutOfPipe);
            // each connection is added once, from its outlet side
            if let Some(inlet) = outlet.peer() {
                graph.add_edge(outlet_vertex, Vertex::Inlet(Arc::clone(&inlet)), EdgeKind::Connection);
                if let Some(downstream) = inlet.pipe() {
                    queue.push_back(downstream);
                }
            }
        }
    }
    trace!(vertices = graph.vertex_count(), edges = graph.edge_count(), "built pipe graph");
    graph
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lets::connect_raw,
        pipes::{BasicPipe, EitherOutletPipe},
    };

    fn dyn_pipe<P: Pipe<i32> + 'static>(pipe: &Arc<P>) -> Arc<dyn Pipe<i32>> {
        Arc::clone(pipe) as Arc<dyn Pipe<i32>>
    }

    fn line_of_three() -> Vec<Arc<BasicPipe<i32>>> {
        let pipes: Vec<_> = (0..3).map(|_| BasicPipe::<i32>::new()).collect();
        pipes[0].outlet().connect_to(pipes[1].inlet()).unwrap();
        pipes[1].outlet().connect_to(pipes[2].inlet()).unwrap();
        pipes
    }

    #[test]
    fn single_pipe() {
        let pipe = BasicPipe::<i32>::new();
        let graph = of(dyn_pipe(&pipe));
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let pipe_vertex = Vertex::Pipe(dyn_pipe(&pipe));
        assert_eq!(graph.count_edges(&Vertex::Inlet(pipe.inlet().clone()), &pipe_vertex), 1);
        assert_eq!(graph.count_edges(&pipe_vertex, &Vertex::Outlet(pipe.outlet().clone())), 1);
        assert!(!graph.is_cyclic());
    }

    #[test]
    fn line_of_three_pipes() {
        let pipes = line_of_three();
        // the same graph results from any pipe in the line
        for pipe in &pipes {
            let graph = of(dyn_pipe(pipe));
            assert_eq!(graph.vertex_count(), 9);
            assert_eq!(graph.edge_count(), 8);
            for pipe in &pipes {
                assert!(graph.contains_vertex(&Vertex::Pipe(dyn_pipe(pipe))));
                assert!(graph.contains_vertex(&Vertex::Inlet(pipe.inlet().clone())));
                assert!(graph.contains_vertex(&Vertex::Outlet(pipe.outlet().clone())));
            }
            assert_eq!(
                graph.count_edges(
                    &Vertex::Outlet(pipes[0].outlet().clone()),
                    &Vertex::Inlet(pipes[1].inlet().clone()),
                ),
                1,
            );
            assert!(!graph.is_cyclic());
        }
    }

    #[test]
    fn three_cycle() {
        let pipes = line_of_three();
        pipes[2].outlet().connect_to_unchecked(pipes[0].inlet()).unwrap();

        let graph = of(dyn_pipe(&pipes[1]));
        assert_eq!(graph.vertex_count(), 9);
        assert_eq!(graph.edge_count(), 9);
        assert!(graph.is_cyclic());
        assert_eq!(
            graph.count_edges(
                &Vertex::Outlet(pipes[2].outlet().clone()),
                &Vertex::Inlet(pipes[0].inlet().clone()),
            ),
            1,
        );
    }

    #[test]
    fn self_loop() {
        let pipe = BasicPipe::<i32>::new();
        connect_raw(pipe.inlet(), pipe.outlet());

        let graph = of(dyn_pipe(&pipe));
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.is_cyclic());
        assert_eq!(
            graph.count_edges(
                &Vertex::Outlet(pipe.outlet().clone()),
                &Vertex::Inlet(pipe.inlet().clone()),
            ),
            1,
        );
    }

    #[test]
    fn tree_of_either_outlet_pipes() {
        let root = EitherOutletPipe::<i32>::new();
        let left = EitherOutletPipe::<i32>::new();
        let right = EitherOutletPipe::<i32>::new();
        root.left_outlet().connect_to(left.inlet()).unwrap();
        root.right_outlet().connect_to(right.inlet()).unwrap();

        let graph = of(dyn_pipe(&right));
        assert_eq!(graph.vertex_count(), 12);
        assert_eq!(graph.edge_count(), 11);
        assert!(graph.contains_vertex(&Vertex::Outlet(left.right_outlet().clone())));
    }

    #[test]
    fn vertices_compare_by_identity() {
        let a = BasicPipe::<i32>::new();
        let b = BasicPipe::<i32>::new();
        assert_eq!(Vertex::Inlet(a.inlet().clone()), Vertex::Inlet(a.inlet().clone()));
        assert_ne!(Vertex::Inlet(a.inlet().clone()), Vertex::Inlet(b.inlet().clone()));
        assert_ne!(Vertex::Pipe(dyn_pipe(&a)), Vertex::Pipe(dyn_pipe(&b)));
    }

    #[test]
    fn edges_are_labelled_by_kind() {
        let pipes = line_of_three();
        let graph = of(dyn_pipe(&pipes[0]));
        let count = |kind| graph.edges().filter(|edge| edge.kind == kind).count();
        assert_eq!(count(EdgeKind::IntoPipe), 3);
        assert_eq!(count(EdgeKind::OutOfPipe), 3);
        assert_eq!(count(EdgeKind::Connection), 2);

        let connection = graph.edges().find(|edge| edge.kind == EdgeKind::Connection).unwrap();
        assert!(matches!(connection.source, Vertex::Outlet(_)));
        assert!(matches!(connection.target, Vertex::Inlet(_)));
        assert_eq!(graph.as_digraph().node_count(), graph.vertices().count());
    }
}
