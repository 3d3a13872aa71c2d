pub mod client;
pub mod traits;
pub mod verifier;

#[cfg(test)]
pub mod scripted;

pub use client::{AuthorityConfig, CertificateAuthorityClient};
pub use traits::AuthorityClient;
pub use verifier::TwoTierVerifier;
