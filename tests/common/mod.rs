//! Shared helpers for integration tests

#![allow(dead_code)]

use api_gateway::config::{Config, ForwardingConfig, OrganisationConfig, RouteConfig, X509Config};
use api_gateway::gateway::TrustPipeline;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rcgen::string::Ia5String;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use std::sync::Arc;

/// Host the test proxy forwards from
pub const FORWARDING_HOST: &str = "gateway.example.org";
/// Organisation in the test device certificate
pub const DEVICE_ORG: &str = "urn:mrn:mcp:org:mcc:grad:sub";
/// MRN in the test device certificate
pub const DEVICE_MRN: &str = "urn:mrn:mcp:device:mcc:grad:sub:test";

/// Self-signed client certificate
pub struct TestCert {
    pub der: Vec<u8>,
    pub pem: String,
}

impl TestCert {
    /// URL-encoded PEM as sent in `X-SSL-CERT`
    pub fn escaped_pem(&self) -> String {
        utf8_percent_encode(&self.pem, NON_ALPHANUMERIC).to_string()
    }
}

/// MRN in the test proxy certificate
pub const PROXY_MRN: &str = "urn:mrn:mcp:service:infra:edge-proxy";

/// Generate a device certificate with OU, O and UID.
pub fn device_cert(org: &str) -> TestCert {
    issue_cert("Test Device", "device", org, DEVICE_MRN)
}

/// Certificate a TLS-terminating proxy presents on its own connection.
pub fn proxy_cert() -> TestCert {
    issue_cert("Edge Proxy", "proxy", "urn:mrn:mcp:org:infra", PROXY_MRN)
}

fn issue_cert(cn: &str, ou: &str, org: &str, mrn: &str) -> TestCert {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn.push(DnType::OrganizationalUnitName, ou);
    dn.push(DnType::OrganizationName, org);
    dn.push(
        DnType::CustomDnType(vec![0, 9, 2342, 19_200_300, 100, 1, 1]),
        mrn,
    );

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.subject_alt_names = vec![SanType::DnsName(
        Ia5String::try_from("device.example.org").unwrap(),
    )];

    let key_pair = KeyPair::generate().expect("key generation failed");
    let cert = params
        .self_signed(&key_pair)
        .expect("rcgen cert generation failed");
    TestCert {
        der: cert.der().to_vec(),
        pem: cert.pem(),
    }
}

/// Trust policy forwarding from [`FORWARDING_HOST`] with `allowed_org`.
pub fn x509_config(allowed_org: &str) -> X509Config {
    X509Config {
        forwarding: ForwardingConfig {
            hosts: vec![FORWARDING_HOST.to_string()],
            ..ForwardingConfig::default()
        },
        organisation: OrganisationConfig {
            mrn: allowed_org.to_string(),
        },
        ..X509Config::default()
    }
}

/// Pipeline for `allowed_org`.
pub fn pipeline(allowed_org: &str) -> TrustPipeline {
    TrustPipeline::from_config(Arc::new(x509_config(allowed_org)))
}

/// Gateway config with a single route.
pub fn gateway_config(allowed_org: &str, route: RouteConfig) -> Config {
    Config {
        x509: x509_config(allowed_org),
        routes: vec![route],
        ..Config::default()
    }
}

/// Header map from name/value pairs.
pub fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

/// Headers a TLS-terminating proxy sends for `cert`.
pub fn forwarded_headers(cert: &TestCert) -> HeaderMap {
    headers(&[
        ("host", FORWARDING_HOST),
        ("x-ssl-verify", "SUCCESS"),
        ("x-ssl-cert", &cert.escaped_pem()),
    ])
}
