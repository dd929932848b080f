//! Keys for the BFV encryption scheme

mod galois_key;
mod key_switching_key;
mod public_key;
mod relinearization_key;
mod secret_key;

pub use galois_key::{GaloisKey, RotationDirection};
pub(crate) use key_switching_key::gadget_products;
pub use key_switching_key::KeySwitchingKey;
pub use public_key::PublicKey;
pub use relinearization_key::RelinearizationKey;
pub(crate) use secret_key::sample_ternary;
pub use secret_key::SecretKey;
