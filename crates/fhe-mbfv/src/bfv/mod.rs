//! The Brakerski-Fan-Vercauteren homomorphic encryption scheme, as consumed
//! by the multiparty protocols.

mod ciphertext;
mod evaluator;
mod keys;
mod ops;
mod parameters;
mod plaintext;

pub use ciphertext::Ciphertext;
pub use evaluator::{
    BfvEvaluator, Evaluator, HomomorphicAdd, HomomorphicMul, HomomorphicSub, Relinearize,
    Rescale, Rotate,
};
pub(crate) use keys::{gadget_products, sample_ternary};
pub use keys::{
    GaloisKey, KeySwitchingKey, PublicKey, RelinearizationKey, RotationDirection, SecretKey,
};
pub use parameters::{BfvParameters, BfvParametersBuilder};
pub use plaintext::{Encoding, Plaintext};
