//! Distinguished name attribute maps.
//!
//! A [`DistinguishedName`] is built either from a certificate subject
//! (`x509-parser` [`X509Name`]) or from the textual form a TLS-terminating
//! proxy forwards in `X-SSL-SDN`.  Both accepted text forms are handled:
//!
//! - RFC 4514 / RFC 2253 (`CN=svc,OU=device,O=urn:mrn:mcp:org:mcc:grad,C=GB`),
//!   with `;` separators (RFC 1779), quoted values and `\` escapes;
//! - the legacy OpenSSL one-line form (`/C=GB/O=urn:mrn:mcp:org:mcc:grad/CN=svc`).
//!
//! Lookups of absent attributes return `None`; no accessor panics.

use std::fmt;

use x509_parser::x509::X509Name;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Attribute types
// ─────────────────────────────────────────────────────────────────────────────

/// A subject attribute type.
///
/// Well-known types get a variant; anything else is kept as a dotted OID
/// (or an upper-cased keyword when the text form used an unknown keyword).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// `CN` (2.5.4.3)
    CommonName,
    /// `OU` (2.5.4.11)
    OrganizationalUnit,
    /// `O` (2.5.4.10)
    Organization,
    /// `C` (2.5.4.6)
    Country,
    /// `L` (2.5.4.7)
    Locality,
    /// `ST` (2.5.4.8)
    State,
    /// `SERIALNUMBER` (2.5.4.5)
    SerialNumber,
    /// `UniqueIdentifier` (2.5.4.45)
    UniqueIdentifier,
    /// `UID` (0.9.2342.19200300.100.1.1), carries the MRN in maritime PKIs
    UserId,
    /// `DC` (0.9.2342.19200300.100.1.25)
    DomainComponent,
    /// `E` (1.2.840.113549.1.9.1)
    Email,
    /// Any other attribute
    Other(String),
}

/// `(variant, dotted OID, canonical keyword, accepted aliases)`
const KNOWN_ATTRIBUTES: &[(AttributeType, &str, &str, &[&str])] = &[
    (AttributeType::CommonName, "2.5.4.3", "CN", &[]),
    (AttributeType::OrganizationalUnit, "2.5.4.11", "OU", &[]),
    (AttributeType::Organization, "2.5.4.10", "O", &[]),
    (AttributeType::Country, "2.5.4.6", "C", &[]),
    (AttributeType::Locality, "2.5.4.7", "L", &[]),
    (AttributeType::State, "2.5.4.8", "ST", &["S"]),
    (AttributeType::SerialNumber, "2.5.4.5", "SERIALNUMBER", &[]),
    (
        AttributeType::UniqueIdentifier,
        "2.5.4.45",
        "UNIQUEIDENTIFIER",
        &["X500UNIQUEIDENTIFIER"],
    ),
    (AttributeType::UserId, "0.9.2342.19200300.100.1.1", "UID", &["USERID"]),
    (AttributeType::DomainComponent, "0.9.2342.19200300.100.1.25", "DC", &[]),
    (AttributeType::Email, "1.2.840.113549.1.9.1", "E", &["EMAILADDRESS", "EMAIL"]),
];

impl AttributeType {
    /// Resolve a dotted OID such as `2.5.4.10`.
    #[must_use]
    pub fn from_oid(oid: &str) -> Self {
        KNOWN_ATTRIBUTES
            .iter()
            .find(|(_, known, _, _)| *known == oid)
            .map_or_else(|| Self::Other(oid.to_string()), |(ty, ..)| ty.clone())
    }

    /// Resolve a keyword (`O`, `cn`, `OID.2.5.4.10`, `2.5.4.10`).
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Self {
        let keyword = keyword.trim();
        let dotted = keyword
            .strip_prefix("OID.")
            .or_else(|| keyword.strip_prefix("oid."))
            .unwrap_or(keyword);
        if dotted.starts_with(|c: char| c.is_ascii_digit()) {
            return Self::from_oid(dotted);
        }

        let upper = keyword.to_ascii_uppercase();
        KNOWN_ATTRIBUTES
            .iter()
            .find(|(_, _, name, aliases)| *name == upper || aliases.contains(&upper.as_str()))
            .map_or(Self::Other(upper), |(ty, ..)| ty.clone())
    }

    /// Dotted OID of a well-known type.  `Other` returns its stored key.
    #[must_use]
    pub fn oid(&self) -> &str {
        match self {
            Self::Other(key) => key,
            known => KNOWN_ATTRIBUTES
                .iter()
                .find(|(ty, ..)| ty == known)
                .map_or("", |(_, oid, _, _)| *oid),
        }
    }

    /// Short keyword used when formatting.
    #[must_use]
    pub fn keyword(&self) -> &str {
        match self {
            Self::Other(key) => key,
            known => KNOWN_ATTRIBUTES
                .iter()
                .find(|(ty, ..)| ty == known)
                .map_or("", |(_, _, name, _)| *name),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Distinguished name
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed subject attributes, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    attributes: Vec<(AttributeType, String)>,
}

impl DistinguishedName {
    /// Parse a textual distinguished name.
    ///
    /// # Errors
    ///
    /// Returns `Error::DistinguishedName` for blank input, a component without
    /// `=`, an empty attribute type, an unterminated quote or a dangling
    /// escape.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::DistinguishedName("empty distinguished name".to_string()));
        }

        let attributes = if trimmed.starts_with('/') {
            parse_slash_form(trimmed)?
        } else {
            Rfc4514Parser::new(trimmed).parse()?
        };

        Ok(Self { attributes })
    }

    /// Build from a certificate name, in DER order.
    ///
    /// Attribute values that are not string types are skipped.
    #[must_use]
    pub fn from_x509_name(name: &X509Name<'_>) -> Self {
        let attributes = name
            .iter()
            .flat_map(|rdn| rdn.iter())
            .filter_map(|attr| {
                let value = attr.as_str().ok()?;
                let ty = AttributeType::from_oid(&attr.attr_type().to_id_string());
                Some((ty, value.to_string()))
            })
            .collect();

        Self { attributes }
    }

    /// First value of `ty`, if present.
    #[must_use]
    pub fn first(&self, ty: &AttributeType) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(t, _)| t == ty)
            .map(|(_, v)| v.as_str())
    }

    /// All values of `ty`, in order.
    pub fn all<'a>(&'a self, ty: &'a AttributeType) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |(t, _)| t == ty)
            .map(|(_, v)| v.as_str())
    }

    /// `O`
    #[must_use]
    pub fn organization(&self) -> Option<&str> {
        self.first(&AttributeType::Organization)
    }

    /// `OU`
    #[must_use]
    pub fn organizational_unit(&self) -> Option<&str> {
        self.first(&AttributeType::OrganizationalUnit)
    }

    /// `CN`
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.first(&AttributeType::CommonName)
    }

    /// `UID`
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.first(&AttributeType::UserId)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// `true` when no attribute was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Display for DistinguishedName {
    /// RFC 4514 form, attributes in stored order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (ty, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=", ty.keyword())?;
            write_escaped(f, value)?;
        }
        Ok(())
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && matches!(c, ' ' | '#'))
            || (i == last && c == ' ');
        if needs_escape {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsers
// ─────────────────────────────────────────────────────────────────────────────

/// `/C=GB/O=org/CN=name`.  A segment without `=` belongs to the previous
/// value, which had a literal `/` in it.
fn parse_slash_form(input: &str) -> Result<Vec<(AttributeType, String)>> {
    let mut attributes: Vec<(AttributeType, String)> = Vec::new();

    for segment in input.split('/').filter(|s| !s.is_empty()) {
        match segment.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                attributes.push((AttributeType::from_keyword(key), value.trim().to_string()));
            }
            Some(_) => {
                return Err(Error::DistinguishedName(format!(
                    "empty attribute type in '{segment}'"
                )));
            }
            None => match attributes.last_mut() {
                Some((_, value)) => {
                    value.push('/');
                    value.push_str(segment);
                }
                None => {
                    return Err(Error::DistinguishedName(format!(
                        "component without '=': '{segment}'"
                    )));
                }
            },
        }
    }

    if attributes.is_empty() {
        return Err(Error::DistinguishedName("no attributes".to_string()));
    }
    Ok(attributes)
}

struct Rfc4514Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Rfc4514Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Vec<(AttributeType, String)>> {
        let mut attributes = Vec::new();

        loop {
            let key = self.attribute_type()?;
            let value = self.attribute_value()?;
            attributes.push((AttributeType::from_keyword(key), value));

            match self.bump() {
                None => break,
                Some(',' | ';' | '+') => {
                    if self.rest().trim().is_empty() {
                        return Err(Error::DistinguishedName(
                            "trailing separator".to_string(),
                        ));
                    }
                }
                Some(c) => {
                    return Err(Error::DistinguishedName(format!(
                        "unexpected '{c}' at offset {}",
                        self.pos - c.len_utf8()
                    )));
                }
            }
        }

        Ok(attributes)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn attribute_type(&mut self) -> Result<&'a str> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some('=') => break,
                Some(c @ (',' | ';' | '+')) => {
                    return Err(Error::DistinguishedName(format!(
                        "component without '=' before '{c}'"
                    )));
                }
                Some(c) => self.pos += c.len_utf8(),
                None => {
                    return Err(Error::DistinguishedName(format!(
                        "component without '=': '{}'",
                        &self.input[start..]
                    )));
                }
            }
        }
        let key = self.input[start..self.pos].trim();
        self.pos += 1; // '='
        if key.is_empty() {
            return Err(Error::DistinguishedName("empty attribute type".to_string()));
        }
        Ok(key)
    }

    fn attribute_value(&mut self) -> Result<String> {
        self.skip_spaces();
        if self.peek() == Some('"') {
            self.pos += 1;
            return self.quoted_value();
        }

        let mut bytes = Vec::new();
        // Length of `bytes` up to the last character that must be kept, so
        // unescaped trailing spaces can be trimmed.
        let mut significant = 0;
        while let Some(c) = self.peek() {
            match c {
                ',' | ';' | '+' => break,
                '\\' => {
                    self.pos += 1;
                    self.escape(&mut bytes)?;
                    significant = bytes.len();
                }
                _ => {
                    self.pos += c.len_utf8();
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    if c != ' ' {
                        significant = bytes.len();
                    }
                }
            }
        }
        bytes.truncate(significant);

        String::from_utf8(bytes)
            .map_err(|_| Error::DistinguishedName("value is not valid UTF-8".to_string()))
    }

    fn quoted_value(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => self.escape(&mut bytes)?,
                Some(c) => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
                None => {
                    return Err(Error::DistinguishedName("unterminated quoted value".to_string()));
                }
            }
        }
        self.skip_spaces();

        String::from_utf8(bytes)
            .map_err(|_| Error::DistinguishedName("value is not valid UTF-8".to_string()))
    }

    /// Decode the character(s) after a backslash: a hex pair or a literal.
    fn escape(&mut self, bytes: &mut Vec<u8>) -> Result<()> {
        let rest = self.rest();
        let mut chars = rest.chars();
        let first = chars
            .next()
            .ok_or_else(|| Error::DistinguishedName("dangling escape".to_string()))?;

        if let (Some(hi), Some(lo)) = (first.to_digit(16), chars.next().and_then(|c| c.to_digit(16))) {
            // Both are ASCII hex digits, so the pair is two bytes long.
            bytes.push(u8::try_from(hi * 16 + lo).unwrap_or_default());
            self.pos += 2;
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            self.pos += first.len_utf8();
        }
        Ok(())
    }
}
