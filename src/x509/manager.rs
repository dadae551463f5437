//! Principal authorization against the allowed organisation.
//!
//! Shared by the direct TLS path and the forwarding guard.  The manager holds
//! only its immutable policy, so one instance serves every request.

use tracing::debug;

use crate::config::X509Config;
use crate::x509::dn::DistinguishedName;
use crate::x509::token::{AuthenticationToken, Credentials};
use crate::Result;

/// Decides whether a candidate token is authenticated.
#[derive(Debug, Clone, Default)]
pub struct X509AuthenticationManager {
    allowed_organisation: String,
}

impl X509AuthenticationManager {
    /// Create a manager.  A blank `allowed_organisation` accepts any
    /// organisation once the credential shape is valid.
    pub fn new(allowed_organisation: impl Into<String>) -> Self {
        Self {
            allowed_organisation: allowed_organisation.into().trim().to_string(),
        }
    }

    /// Manager for `x509.organisation.mrn`.
    #[must_use]
    pub fn from_config(config: &X509Config) -> Self {
        Self::new(config.organisation.mrn.clone())
    }

    /// Configured organisation prefix (empty when unrestricted).
    #[must_use]
    pub fn allowed_organisation(&self) -> &str {
        &self.allowed_organisation
    }

    /// Return `token` with its `authenticated` flag decided.
    ///
    /// Never fails: absent credentials, unparseable DNs and organisation
    /// mismatches all produce an unauthenticated token.
    #[must_use]
    pub fn authenticate(&self, token: AuthenticationToken) -> AuthenticationToken {
        let authorized = match token.credentials() {
            Credentials::Certificate(cert) => self.is_organisation_allowed(cert.subject()),
            Credentials::SubjectDn(raw) => match Self::parse_x509_principal(raw) {
                Ok(dn) => self.is_organisation_allowed(&dn),
                Err(e) => {
                    debug!(principal = token.principal(), error = %e, "Subject DN rejected");
                    false
                }
            },
            Credentials::None => false,
        };

        debug!(
            principal = token.principal(),
            authorized,
            "X.509 principal evaluated"
        );
        token.with_authenticated(authorized)
    }

    /// Case-sensitive prefix match of the `O` attribute.
    ///
    /// A missing `O` fails whenever an organisation is configured.
    #[must_use]
    pub fn is_organisation_allowed(&self, subject: &DistinguishedName) -> bool {
        if self.allowed_organisation.is_empty() {
            return true;
        }
        subject
            .organization()
            .is_some_and(|org| org.starts_with(&self.allowed_organisation))
    }

    /// Parse a subject DN string into its attribute map.
    ///
    /// # Errors
    ///
    /// Returns `Error::DistinguishedName` for malformed input.
    pub fn parse_x509_principal(raw: &str) -> Result<DistinguishedName> {
        DistinguishedName::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::certificate::ClientCertificate;
    use crate::x509::test_support::CertSpec;

    fn cert_token(builder: &CertSpec) -> AuthenticationToken {
        let cert = ClientCertificate::from_der(&builder.generate().der).unwrap();
        AuthenticationToken::unauthenticated("device", Credentials::Certificate(cert))
    }

    #[test]
    fn organisation_prefix_match_authenticates() {
        // GIVEN: allowed organisation is a prefix of the certificate's O
        let manager = X509AuthenticationManager::new("urn:mrn:mcp:org:mcc:grad");
        // WHEN: authenticating a grad:sub device
        let token = manager.authenticate(cert_token(&CertSpec::grad_device()));
        // THEN: authenticated
        assert!(token.is_authenticated());
    }

    #[test]
    fn organisation_mismatch_is_rejected() {
        let manager = X509AuthenticationManager::new("urn:mrn:mcp:org:other");
        let token = manager.authenticate(cert_token(&CertSpec::grad_device()));
        assert!(!token.is_authenticated());
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let manager = X509AuthenticationManager::new("URN:MRN:MCP:ORG:MCC:GRAD");
        let token = manager.authenticate(cert_token(&CertSpec::grad_device()));
        assert!(!token.is_authenticated());
    }

    #[test]
    fn missing_organisation_fails_closed() {
        let manager = X509AuthenticationManager::new("urn:mrn:mcp:org:mcc:grad");
        let token = manager.authenticate(cert_token(&CertSpec::grad_device().without_org()));
        assert!(!token.is_authenticated());
    }

    #[test]
    fn blank_policy_accepts_any_valid_shape() {
        let manager = X509AuthenticationManager::new("  ");
        assert_eq!(manager.allowed_organisation(), "");
        let token = manager.authenticate(cert_token(&CertSpec::grad_device().without_org()));
        assert!(token.is_authenticated());
    }

    #[test]
    fn subject_dn_credentials_are_parsed() {
        let manager = X509AuthenticationManager::new("urn:mrn:mcp:org:mcc:grad");
        let token = AuthenticationToken::unauthenticated(
            "x509-forwarded",
            Credentials::SubjectDn("CN=svc,OU=service,O=urn:mrn:mcp:org:mcc:grad:sub".into()),
        );
        assert!(manager.authenticate(token).is_authenticated());
    }

    #[test]
    fn unparseable_subject_dn_is_rejected() {
        let manager = X509AuthenticationManager::new("");
        let token = AuthenticationToken::unauthenticated(
            "x509-forwarded",
            Credentials::SubjectDn("not a dn".into()),
        );
        assert!(!manager.authenticate(token).is_authenticated());
    }

    #[test]
    fn absent_credentials_are_rejected_even_without_policy() {
        let manager = X509AuthenticationManager::default();
        let token = AuthenticationToken::unauthenticated("anon", Credentials::None);
        assert!(!manager.authenticate(token).is_authenticated());
    }

    #[test]
    fn from_config_reads_organisation() {
        let mut config = X509Config::default();
        config.organisation.mrn = "urn:mrn:mcp:org:mcc".to_string();
        let manager = X509AuthenticationManager::from_config(&config);
        assert_eq!(manager.allowed_organisation(), "urn:mrn:mcp:org:mcc");
    }
}
