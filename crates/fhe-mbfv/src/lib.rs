#![crate_name = "fhe_mbfv"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Multiparty protocols for the Brakerski-Fan-Vercauteren (BFV) homomorphic
//! encryption scheme, following [Multiparty BFV](https://eprint.iacr.org/2020/304.pdf).
//!
//! A set of parties, each holding an additive share `s_i` of the secret key
//! `s = Σ s_i`, jointly run the protocols of the [`mbfv`] module without ever
//! reconstructing `s`:
//!
//! - [`mbfv::CkgProtocol`]: collective public key generation;
//! - [`mbfv::CksProtocol`] and [`mbfv::PcksProtocol`]: collective key
//!   switching towards a shared secret or a public key;
//! - [`mbfv::RkgProtocol`] and [`mbfv::RkgNaiveProtocol`]: relinearization
//!   key generation;
//! - [`mbfv::RtgProtocol`]: rotation key generation;
//! - [`mbfv::RefreshProtocol`]: collective ciphertext refresh.
//!
//! The [`bfv`] module contains the single-party scheme layer consumed by the
//! protocols.

mod errors;

pub mod bfv;
pub mod mbfv;
pub(crate) mod proto;

pub use errors::{Error, ParametersError, Result};
