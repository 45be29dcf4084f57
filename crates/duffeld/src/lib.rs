//! duffeld: daemon internals, split out for the binary and integration tests.

pub mod daemon;
pub mod grpc;
