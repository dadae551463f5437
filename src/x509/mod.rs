//! X.509 client identity.
//!
//! - [`certificate`]: PEM/DER parsing and the peer-certificate extension
//! - [`dn`]: distinguished name attribute maps
//! - [`token`]: the per-request authentication token
//! - [`converter`]: headers / TLS session → candidate token
//! - [`manager`]: organisation policy → authenticated token

pub mod certificate;
pub mod converter;
pub mod dn;
pub mod manager;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use certificate::{CertificateParser, ClientCertificate, PeerCertificates, X509CertificateParser};
pub use converter::{AuthenticationConverter, FORWARDED_SERVICE_PRINCIPAL};
pub use dn::{AttributeType, DistinguishedName};
pub use manager::X509AuthenticationManager;
pub use token::{AuthenticationToken, Credentials};
