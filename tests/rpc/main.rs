//! busrpc integration tests, run against the in-memory bus.

mod support;
mod call;
mod notify;
mod subscription;
mod errors;
mod session;
