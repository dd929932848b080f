//! BFV protobuf definitions.

#[allow(clippy::all)]
mod generated;

pub use generated::*;
