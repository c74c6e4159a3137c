// # Command Builder
//
// Renders the PowerShell script sent to the remote server for each operation.
//
// ## Operations
//
// - **Probe** (Read): look the record up; a not-found condition is swallowed and
//   `RECORD_FOUND` is written only when the record exists.
// - **Upsert** (Create): fetch the existing record; modify it in place when found,
//   add it otherwise. Writes `RECORD_MODIFIED` or `RECORD_CREATED`.
// - **Remove** (Delete): delete by zone/name/type. In jump-host mode the record is
//   resolved through the probe lookup and piped into the removal.
//
// ## Routing
//
// With jump-host routing enabled every cmdlet carries `-ComputerName <target>`, where the
// target is the configured domain controller or, failing that, the record's zone name.
// Without it, cmdlets run against the session host directly.

mod cmdlet;

pub use cmdlet::{Cmdlet, quote};

use std::fmt;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::record::{DnsRecord, RecordType};

/// Written by the probe script when the record exists
pub const RECORD_FOUND: &str = "RECORD_FOUND";

/// Written by the upsert script when it took the add branch
pub const RECORD_CREATED: &str = "RECORD_CREATED";

/// Written by the upsert script when it took the modify branch
pub const RECORD_MODIFIED: &str = "RECORD_MODIFIED";

// Rethrow anything that is not an object-not-found error record.
const CATCH_NOT_FOUND: &str =
    "catch { if ($_.CategoryInfo.Category -ne 'ObjectNotFound') { throw }; $record = $null }";

/// Kind of script to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Non-mutating existence check
    Probe,
    /// Create-or-modify
    Upsert,
    /// Delete
    Remove,
}

impl Operation {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::Probe)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Probe => "probe",
            Operation::Upsert => "upsert",
            Operation::Remove => "remove",
        })
    }
}

/// A rendered script, ready for a [`RemoteExecutor`](crate::traits::RemoteExecutor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub operation: Operation,
    pub text: String,
}

impl Script {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Renders scripts for records under one [`ClientConfig`]
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    config: &'a ClientConfig,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(config: &'a ClientConfig) -> Self {
        Self { config }
    }

    /// Render the script for `operation`.
    ///
    /// # Errors
    ///
    /// Upsert validates the full record (type-specific data included); probe and remove
    /// only need the key fields. No script is produced for an invalid record.
    pub fn build(&self, record: &DnsRecord, operation: Operation) -> Result<Script> {
        let text = match operation {
            Operation::Probe => {
                record.validate_key()?;
                self.probe_text(record)
            }
            Operation::Upsert => {
                record.validate()?;
                self.upsert_text(record)?
            }
            Operation::Remove => {
                record.validate_key()?;
                self.remove_text(record)
            }
        };

        tracing::debug!(
            operation = %operation,
            identity = %record.identity(),
            routed = self.config.use_jump_host,
            "Rendered script"
        );

        Ok(Script { operation, text })
    }

    pub fn probe(&self, record: &DnsRecord) -> Result<Script> {
        self.build(record, Operation::Probe)
    }

    pub fn upsert(&self, record: &DnsRecord) -> Result<Script> {
        self.build(record, Operation::Upsert)
    }

    pub fn remove(&self, record: &DnsRecord) -> Result<Script> {
        self.build(record, Operation::Remove)
    }

    fn route<'r>(&'r self, record: &'r DnsRecord) -> Option<&'r str> {
        self.config.routing_target(&record.zone_name)
    }

    fn lookup(&self, record: &DnsRecord) -> Cmdlet {
        Cmdlet::new("Get-DnsServerResourceRecord")
            .arg("ZoneName", record.zone_name.as_str())
            .arg("RRType", record.record_type.as_str())
            .arg("Name", record.record_name.as_str())
            .arg_opt("ComputerName", self.route(record))
            .arg("ErrorAction", "Stop")
    }

    fn probe_text(&self, record: &DnsRecord) -> String {
        format!(
            "try {{ $record = {} | Select-Object -First 1 }} {}; if ($record) {{ Write-Host {} }}",
            self.lookup(record),
            CATCH_NOT_FOUND,
            quote(RECORD_FOUND),
        )
    }

    fn upsert_text(&self, record: &DnsRecord) -> Result<String> {
        let data = record.required_data()?;
        let zone = record.zone_name.as_str();
        let route = self.route(record);

        let (data_property, data_value, add) = match record.record_type {
            RecordType::A => (
                "IPv4Address",
                format!("[System.Net.IPAddress]::Parse({})", quote(data)),
                Cmdlet::new("Add-DnsServerResourceRecord")
                    .arg("ZoneName", zone)
                    .switch("A")
                    .arg("Name", record.record_name.as_str())
                    .arg("IPv4Address", data)
                    .switch_if("CreatePtr", self.config.auto_create_ptr),
            ),
            RecordType::Cname => (
                "HostNameAlias",
                quote(data),
                Cmdlet::new("Add-DnsServerResourceRecord")
                    .arg("ZoneName", zone)
                    .switch("CName")
                    .arg("Name", record.record_name.as_str())
                    .arg("HostNameAlias", data),
            ),
            RecordType::Ptr => (
                "PtrDomainName",
                quote(data),
                Cmdlet::new("Add-DnsServerResourceRecord")
                    .arg("ZoneName", zone)
                    .switch("Ptr")
                    .arg("Name", record.record_name.as_str())
                    .arg("PtrDomainName", data),
            ),
        };
        let add = add.arg_opt("ComputerName", route).arg("ErrorAction", "Stop");

        let modify = Cmdlet::new("Set-DnsServerResourceRecord")
            .arg("ZoneName", zone)
            .var("OldObject", "record")
            .var("NewObject", "newRecord")
            .arg_opt("ComputerName", route)
            .arg("ErrorAction", "Stop");

        Ok(format!(
            "$ErrorActionPreference = 'Stop'\n\
             try {{ $record = {lookup} | Select-Object -First 1 }} {catch}\n\
             if ($record) {{\n\
             \x20   $newRecord = $record.Clone()\n\
             \x20   $newRecord.RecordData.{property} = {value}\n\
             \x20   {modify} | Out-Null\n\
             \x20   Write-Host {modified}\n\
             }} else {{\n\
             \x20   {add} | Out-Null\n\
             \x20   Write-Host {created}\n\
             }}",
            lookup = self.lookup(record),
            catch = CATCH_NOT_FOUND,
            property = data_property,
            value = data_value,
            modify = modify,
            modified = quote(RECORD_MODIFIED),
            add = add,
            created = quote(RECORD_CREATED),
        ))
    }

    fn remove_text(&self, record: &DnsRecord) -> String {
        let remove = Cmdlet::new("Remove-DnsServerResourceRecord")
            .arg("ZoneName", record.zone_name.as_str());

        match self.route(record) {
            // Removal by name cannot be routed onward; resolve the object first.
            Some(target) => format!(
                "{} | {}",
                self.lookup(record),
                remove
                    .arg("ComputerName", target)
                    .switch("Force")
                    .raw("-Confirm:$false")
            ),
            None => remove
                .arg("RRType", record.record_type.as_str())
                .arg("Name", record.record_name.as_str())
                .switch("Force")
                .raw("-Confirm:$false")
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn direct() -> ClientConfig {
        ClientConfig::new("admin", "dc01.corp.local").with_password("secret")
    }

    fn jump() -> ClientConfig {
        direct().with_jump_host(Some("dc02.corp.local".into()))
    }

    #[test]
    fn probe_swallows_not_found_and_writes_sentinel() {
        let config = direct();
        let script = CommandBuilder::new(&config)
            .probe(&DnsRecord::new("corp.local", "svc1", RecordType::A))
            .unwrap();

        assert_eq!(script.operation, Operation::Probe);
        assert!(script.text.contains(
            "Get-DnsServerResourceRecord -ZoneName 'corp.local' -RRType 'A' -Name 'svc1' \
             -ErrorAction 'Stop'"
        ));
        assert!(script.text.contains("'ObjectNotFound'"));
        assert!(script.text.contains("Write-Host 'RECORD_FOUND'"));
        assert!(!script.text.contains("-ComputerName"));
    }

    #[test]
    fn probe_does_not_require_record_data() {
        let config = direct();
        let record = DnsRecord::new("corp.local", "www", RecordType::Cname);
        assert!(CommandBuilder::new(&config).probe(&record).is_ok());
    }

    #[test]
    fn upsert_a_record_has_modify_and_add_branches() {
        let config = direct();
        let script = CommandBuilder::new(&config)
            .upsert(&DnsRecord::a("corp.local", "svc1", "10.0.0.5"))
            .unwrap();

        let text = &script.text;
        assert!(text.contains(
            "$newRecord.RecordData.IPv4Address = [System.Net.IPAddress]::Parse('10.0.0.5')"
        ));
        assert!(text.contains(
            "Set-DnsServerResourceRecord -ZoneName 'corp.local' \
             -OldObject $record -NewObject $newRecord"
        ));
        assert!(text.contains(
            "Add-DnsServerResourceRecord -ZoneName 'corp.local' -A -Name 'svc1' \
             -IPv4Address '10.0.0.5' -ErrorAction 'Stop'"
        ));
        assert!(text.contains("Write-Host 'RECORD_MODIFIED'"));
        assert!(text.contains("Write-Host 'RECORD_CREATED'"));
        assert!(!text.contains("-CreatePtr"));
    }

    #[test]
    fn upsert_cname_and_ptr_use_type_specific_parameters() {
        let config = direct();
        let builder = CommandBuilder::new(&config);

        let cname = builder
            .upsert(&DnsRecord::cname("corp.local", "www", "web01.corp.local"))
            .unwrap();
        assert!(cname.text.contains("$newRecord.RecordData.HostNameAlias = 'web01.corp.local'"));
        assert!(cname.text.contains("-CName -Name 'www' -HostNameAlias 'web01.corp.local'"));

        let ptr = builder
            .upsert(&DnsRecord::ptr("0.0.10.in-addr.arpa", "5", "svc1.corp.local"))
            .unwrap();
        assert!(ptr.text.contains("$newRecord.RecordData.PtrDomainName = 'svc1.corp.local'"));
        assert!(ptr.text.contains("-Ptr -Name '5' -PtrDomainName 'svc1.corp.local'"));
    }

    #[test]
    fn upsert_adds_create_ptr_when_enabled() {
        let config = direct().with_auto_create_ptr(true);
        let script = CommandBuilder::new(&config)
            .upsert(&DnsRecord::a("corp.local", "svc1", "10.0.0.5"))
            .unwrap();
        assert!(script.text.contains("-IPv4Address '10.0.0.5' -CreatePtr"));
    }

    #[test]
    fn upsert_validates_before_rendering() {
        let config = direct();
        let err = CommandBuilder::new(&config)
            .upsert(&DnsRecord::new("corp.local", "svc1", RecordType::A))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ref m) if m == "ipv4address required for A records"
        ));
    }

    #[test]
    fn remove_direct_addresses_by_name() {
        let config = direct();
        let script = CommandBuilder::new(&config)
            .remove(&DnsRecord::new("corp.local", "svc1", RecordType::A))
            .unwrap();
        assert_eq!(
            script.text,
            "Remove-DnsServerResourceRecord -ZoneName 'corp.local' -RRType 'A' -Name 'svc1' \
             -Force -Confirm:$false"
        );
    }

    #[test]
    fn remove_via_jump_host_pipes_resolved_record() {
        let config = jump();
        let script = CommandBuilder::new(&config)
            .remove(&DnsRecord::new("corp.local", "svc1", RecordType::A))
            .unwrap();
        assert_eq!(
            script.text,
            "Get-DnsServerResourceRecord -ZoneName 'corp.local' -RRType 'A' -Name 'svc1' \
             -ComputerName 'dc02.corp.local' -ErrorAction 'Stop' | \
             Remove-DnsServerResourceRecord -ZoneName 'corp.local' \
             -ComputerName 'dc02.corp.local' -Force -Confirm:$false"
        );
    }

    #[test]
    fn jump_host_routes_every_cmdlet() {
        let config = ClientConfig::new("admin", "jump01")
            .with_password("secret")
            .with_jump_host(None);
        let builder = CommandBuilder::new(&config);
        let record = DnsRecord::a("corp.local", "svc1", "10.0.0.5");

        let probe = builder.probe(&record).unwrap();
        assert!(probe.text.contains("-ComputerName 'corp.local'"));

        let upsert = builder.upsert(&record).unwrap();
        assert_eq!(upsert.text.matches("-ComputerName 'corp.local'").count(), 3);
    }

    #[test]
    fn quoted_values_cannot_break_out() {
        let config = direct();
        let record =
            DnsRecord::cname("corp.local", "www", "x'; Remove-DnsServerZone corp.local; '");
        let script = CommandBuilder::new(&config).upsert(&record).unwrap();
        assert!(script.text.contains("'x''; Remove-DnsServerZone corp.local; '''"));
    }

    #[test]
    fn only_probe_is_non_mutating() {
        assert!(!Operation::Probe.is_mutating());
        assert!(Operation::Upsert.is_mutating());
        assert!(Operation::Remove.is_mutating());
    }
}
