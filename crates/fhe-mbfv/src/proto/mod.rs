//! Protobuf definitions for the wire format of parameters, keys and shares.

/// Protobuf for the BFV encryption scheme.
pub mod bfv;
/// Protobuf for the multiparty protocol shares.
pub mod mbfv;
