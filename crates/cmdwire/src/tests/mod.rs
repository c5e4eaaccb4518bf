//! Behavioural test suites for the dispatcher and the socket listener.

mod socket_behaviour;
mod support;
