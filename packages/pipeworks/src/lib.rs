//! Thread-blocking message pipes that can be wired into topologies
//!
//! A [`Pipe`] owns [`Inlet`]s and [`Outlet`]s. Threads send through unconnected inlets and
//! receive through unconnected outlets, and connecting an outlet to another pipe's inlet joins
//! the two pipes so messages flow across. Sends and receives rendezvous: a blocking send returns
//! once some receiver has taken the message, whether that receiver was already parked or arrives
//! later. Buffering, splitting and merging are the business of the pipe variants in between.

#[macro_use]
extern crate tracing;

mod lets;
mod pipes;
mod resource;
mod signal;
mod validate;

pub mod error;
pub mod graph;
pub mod tie_breaker;

pub use crate::{
    lets::{Inlet, Outlet},
    pipes::{
        BasicPipe,
        CapacityPipe,
        EitherInletPipe,
        EitherOutletPipe,
        Pipe,
        PipeResource,
        Receiver,
        Search,
        Sender,
        SourcePipe,
        ValvedPipe,
    },
    signal::CancelToken,
    tie_breaker::{Side, TieBreaker},
};

// route tracing output of tests through the test harness.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
