//! rcgen-backed certificate builders shared by unit tests.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use rcgen::string::Ia5String;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, KeyPair, SanType, date_time_ymd,
};

/// OID arcs of the `UID` attribute (0.9.2342.19200300.100.1.1).
pub(crate) const UID_ARCS: [u64; 7] = [0, 9, 2342, 19_200_300, 100, 1, 1];

pub(crate) struct GeneratedCert {
    pub der: Vec<u8>,
    pub pem: String,
}

#[derive(Default)]
pub(crate) struct CertSpec {
    cn: Option<String>,
    ou: Option<String>,
    org: Option<String>,
    uid: Option<String>,
    expired: bool,
}

impl CertSpec {
    /// Device certificate under `urn:mrn:mcp:org:mcc:grad:sub`.
    pub fn grad_device() -> Self {
        Self::default()
            .cn("Test Device")
            .ou("device")
            .org("urn:mrn:mcp:org:mcc:grad:sub")
            .uid("urn:mrn:mcp:device:mcc:grad:sub:test")
    }

    pub fn cn(mut self, value: &str) -> Self {
        self.cn = Some(value.to_string());
        self
    }

    pub fn ou(mut self, value: &str) -> Self {
        self.ou = Some(value.to_string());
        self
    }

    pub fn org(mut self, value: &str) -> Self {
        self.org = Some(value.to_string());
        self
    }

    pub fn uid(mut self, value: &str) -> Self {
        self.uid = Some(value.to_string());
        self
    }

    pub fn without_ou(mut self) -> Self {
        self.ou = None;
        self
    }

    pub fn without_org(mut self) -> Self {
        self.org = None;
        self
    }

    pub fn without_uid(mut self) -> Self {
        self.uid = None;
        self
    }

    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    pub fn generate(&self) -> GeneratedCert {
        let mut dn = DistinguishedName::new();
        if let Some(cn) = &self.cn {
            dn.push(DnType::CommonName, cn.as_str());
        }
        if let Some(ou) = &self.ou {
            dn.push(DnType::OrganizationalUnitName, ou.as_str());
        }
        if let Some(org) = &self.org {
            dn.push(DnType::OrganizationName, org.as_str());
        }
        if let Some(uid) = &self.uid {
            dn.push(DnType::CustomDnType(UID_ARCS.to_vec()), uid.as_str());
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.subject_alt_names = vec![SanType::DnsName(
            Ia5String::try_from("client.example.org").unwrap(),
        )];
        if self.expired {
            params.not_before = date_time_ymd(2000, 1, 1);
            params.not_after = date_time_ymd(2001, 1, 1);
        }

        let key_pair = KeyPair::generate().expect("key generation failed");
        let cert = params
            .self_signed(&key_pair)
            .expect("rcgen cert generation failed");
        GeneratedCert {
            der: cert.der().to_vec(),
            pem: cert.pem(),
        }
    }
}

/// URL-encode a PEM the way nginx `$ssl_client_escaped_cert` does.
pub(crate) fn escape_pem(pem: &str) -> String {
    utf8_percent_encode(pem, NON_ALPHANUMERIC).to_string()
}
