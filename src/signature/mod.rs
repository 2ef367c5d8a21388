//! Validated D-Bus signatures.

pub use self::signature::Signature;
mod signature;

pub use self::owned_signature::OwnedSignature;
mod owned_signature;

pub use self::signature_error::SignatureError;
mod signature_error;

mod validation;

pub(crate) use self::skip::skip;
mod skip;


/// The maximum depth of nested arrays or structs.
const MAX_CONTAINER_DEPTH: usize = 32;

/// The maximum total depth of containers.
const MAX_DEPTH: usize = MAX_CONTAINER_DEPTH * 2;
