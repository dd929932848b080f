//! Multiparty protocols for BFV.
//!
//! Every protocol follows the same pattern. Each party allocates a share,
//! fills it from its secret key share and the public inputs of the round,
//! and sends it to an aggregator. The aggregator combines the shares, in any
//! order, and finalizes the output once all the contributions are folded in.
//! Protocol instances track their [`Phase`] and reject out-of-order calls.
//!
//! Shares count their contributions but do not identify them. The transport
//! must authenticate the parties and forward each share once: a duplicated or
//! forged share passes the completeness check of `finalize`.
//!
//! The protocols that reveal partial decryptions (key switching, collective
//! decryption and refresh) add flooding noise configured by a
//! [`FloodingConfig`].

mod aggregate;
mod crp;
mod ephemeral;
mod flooding;
mod public_key_gen;
mod public_key_switch;
mod refresh;
mod relin_key_gen;
mod relin_key_gen_naive;
mod rotation_key_gen;
mod round;
mod secret_key_switch;
mod share;

pub use aggregate::{aggregate_all, aggregate_tree, AggregateIter, ShareCombiner};
pub use crp::{CommonRandomPoly, CrpGenerator};
pub use ephemeral::EphemeralKey;
pub use flooding::{FloodingConfig, MIN_STATISTICAL_SECURITY};
pub use public_key_gen::{CkgProtocol, CkgShare};
pub use public_key_switch::{PcksProtocol, PcksShare};
pub use refresh::{RefreshProtocol, RefreshShare};
pub use relin_key_gen::{RkgProtocol, RkgShareRoundOne, RkgShareRoundThree, RkgShareRoundTwo};
pub use relin_key_gen_naive::{RkgNaiveProtocol, RkgNaiveShareRoundOne, RkgNaiveShareRoundTwo};
pub use rotation_key_gen::{RtgProtocol, RtgShare};
pub use round::Phase;
pub(crate) use round::RoundTracker;
pub use secret_key_switch::{CksProtocol, CksShare, DecryptionProtocol, DecryptionShare};
