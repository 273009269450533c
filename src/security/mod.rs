//! Inbound request authentication.
//!
//! Every request must pass [`SignatureVerifier::verify`] before any other
//! component sees it; the resulting [`VerifiedRequest`] is the only input the
//! command parser accepts.

pub mod signature;

pub use signature::{SignatureError, SignatureScheme, SignatureVerifier, VerifiedRequest};
