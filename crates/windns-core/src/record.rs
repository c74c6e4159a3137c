//! Declared DNS records
//!
//! A [`DnsRecord`] is the desired state of one entry in a zone. Its zone, name and type
//! are immutable for the lifetime of the managed resource and together form its
//! [identity](DnsRecord::identity).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Record types the Windows DNS reconciler manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// Host address record
    A,
    /// Canonical name (alias) record
    Cname,
    /// Reverse lookup pointer record
    Ptr,
}

impl RecordType {
    /// The `-RRType` spelling used by the DNS server cmdlets
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
            RecordType::Ptr => "PTR",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "CNAME" => Ok(RecordType::Cname),
            "PTR" => Ok(RecordType::Ptr),
            _ => Err(Error::validation("unsupported record type")),
        }
    }
}

/// A declared DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Zone the record lives in (e.g. "corp.local")
    pub zone_name: String,

    /// Record name relative to the zone (e.g. "svc1")
    pub record_name: String,

    /// Record type
    pub record_type: RecordType,

    /// Target address, required for A records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4address: Option<String>,

    /// Alias target, required for CNAME records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostnamealias: Option<String>,

    /// Pointer target, required for PTR records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptrdomainname: Option<String>,
}

impl DnsRecord {
    /// Create a record with no type-specific data set
    pub fn new(
        zone_name: impl Into<String>,
        record_name: impl Into<String>,
        record_type: RecordType,
    ) -> Self {
        Self {
            zone_name: zone_name.into(),
            record_name: record_name.into(),
            record_type,
            ipv4address: None,
            hostnamealias: None,
            ptrdomainname: None,
        }
    }

    /// Declare an A record
    pub fn a(
        zone_name: impl Into<String>,
        record_name: impl Into<String>,
        ipv4address: impl Into<String>,
    ) -> Self {
        Self::new(zone_name, record_name, RecordType::A).with_ipv4address(ipv4address)
    }

    /// Declare a CNAME record
    pub fn cname(
        zone_name: impl Into<String>,
        record_name: impl Into<String>,
        hostnamealias: impl Into<String>,
    ) -> Self {
        Self::new(zone_name, record_name, RecordType::Cname).with_hostnamealias(hostnamealias)
    }

    /// Declare a PTR record
    pub fn ptr(
        zone_name: impl Into<String>,
        record_name: impl Into<String>,
        ptrdomainname: impl Into<String>,
    ) -> Self {
        Self::new(zone_name, record_name, RecordType::Ptr).with_ptrdomainname(ptrdomainname)
    }

    /// Set the IPv4 address
    pub fn with_ipv4address(mut self, ipv4address: impl Into<String>) -> Self {
        self.ipv4address = Some(ipv4address.into());
        self
    }

    /// Set the alias target
    pub fn with_hostnamealias(mut self, hostnamealias: impl Into<String>) -> Self {
        self.hostnamealias = Some(hostnamealias.into());
        self
    }

    /// Set the pointer target
    pub fn with_ptrdomainname(mut self, ptrdomainname: impl Into<String>) -> Self {
        self.ptrdomainname = Some(ptrdomainname.into());
        self
    }

    /// The reconciliation key: `zone_name + "_" + record_name + "_" + record_type`
    pub fn identity(&self) -> String {
        identity(&self.zone_name, &self.record_name, self.record_type)
    }

    /// Validate the key fields, which every operation needs.
    pub fn validate_key(&self) -> Result<()> {
        require_text("zone_name", Some(&self.zone_name))?;
        require_text("record_name", Some(&self.record_name))?;
        Ok(())
    }

    /// Validate the record for creation: key fields plus the data field its type requires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.validate_key()?;

        match self.record_type {
            RecordType::A => {
                let address = self.required_data()?;
                if address.parse::<Ipv4Addr>().is_err() {
                    return Err(Error::validation("ipv4address must be a valid IPv4 address"));
                }
            }
            RecordType::Cname | RecordType::Ptr => {
                self.required_data()?;
            }
        }

        Ok(())
    }

    /// The data value for this record's type, failing if it is missing.
    pub fn required_data(&self) -> Result<&str> {
        let (field, value) = match self.record_type {
            RecordType::A => ("ipv4address", &self.ipv4address),
            RecordType::Cname => ("hostnamealias", &self.hostnamealias),
            RecordType::Ptr => ("ptrdomainname", &self.ptrdomainname),
        };

        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => {
                reject_control_chars(field, v)?;
                Ok(v)
            }
            _ => Err(Error::validation(format!(
                "{} required for {} records",
                field, self.record_type
            ))),
        }
    }
}

/// Derive the identity of a record from its key fields
pub fn identity(zone_name: &str, record_name: &str, record_type: RecordType) -> String {
    format!("{}_{}_{}", zone_name, record_name, record_type)
}

fn require_text(field: &str, value: Option<&str>) -> Result<()> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => reject_control_chars(field, v),
        _ => Err(Error::validation(format!("{} must not be empty", field))),
    }
}

fn reject_control_chars(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(Error::validation(format!(
            "{} contains control characters",
            field
        )));
    }
    Ok(())
}
