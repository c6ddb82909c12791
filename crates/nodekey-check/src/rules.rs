//! Per-type field rules.
//!
//! Each core node type has a typed view ([`Host`], [`Port`], [`Finding`], ...)
//! read out of the generic property bag by [`FieldRules`]. Reading reports
//! values of the wrong kind; [`NodeRules::check`] then applies the type's
//! business rules to the typed view. Both steps push into the same
//! violation list.

use std::fmt;
use std::net::IpAddr;

use nodekey_core::value::{Properties, PropertyValue};

use crate::error::Violation;

/// The fixed set of node types with structural rules.
///
/// Types outside this set are extension types and skip validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreNodeType {
    Mission,
    MissionRun,
    Domain,
    Subdomain,
    Host,
    Port,
    Service,
    Endpoint,
    Technology,
    Certificate,
    Finding,
    Evidence,
    Mitigation,
    Technique,
    CloudAsset,
    Api,
}

impl CoreNodeType {
    pub const ALL: [CoreNodeType; 16] = [
        CoreNodeType::Mission,
        CoreNodeType::MissionRun,
        CoreNodeType::Domain,
        CoreNodeType::Subdomain,
        CoreNodeType::Host,
        CoreNodeType::Port,
        CoreNodeType::Service,
        CoreNodeType::Endpoint,
        CoreNodeType::Technology,
        CoreNodeType::Certificate,
        CoreNodeType::Finding,
        CoreNodeType::Evidence,
        CoreNodeType::Mitigation,
        CoreNodeType::Technique,
        CoreNodeType::CloudAsset,
        CoreNodeType::Api,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoreNodeType::Mission => "mission",
            CoreNodeType::MissionRun => "mission_run",
            CoreNodeType::Domain => "domain",
            CoreNodeType::Subdomain => "subdomain",
            CoreNodeType::Host => "host",
            CoreNodeType::Port => "port",
            CoreNodeType::Service => "service",
            CoreNodeType::Endpoint => "endpoint",
            CoreNodeType::Technology => "technology",
            CoreNodeType::Certificate => "certificate",
            CoreNodeType::Finding => "finding",
            CoreNodeType::Evidence => "evidence",
            CoreNodeType::Mitigation => "mitigation",
            CoreNodeType::Technique => "technique",
            CoreNodeType::CloudAsset => "cloud_asset",
            CoreNodeType::Api => "api",
        }
    }

    /// Looks up a core type by name. `None` means an extension type.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Runs this type's field rules against a property bag.
    pub fn check_fields(self, props: &Properties) -> Vec<Violation> {
        match self {
            CoreNodeType::Mission => evaluate::<Mission>(self, props),
            CoreNodeType::MissionRun => evaluate::<MissionRun>(self, props),
            CoreNodeType::Domain => evaluate::<Domain>(self, props),
            CoreNodeType::Subdomain => evaluate::<Subdomain>(self, props),
            CoreNodeType::Host => evaluate::<Host>(self, props),
            CoreNodeType::Port => evaluate::<Port>(self, props),
            CoreNodeType::Service => evaluate::<Service>(self, props),
            CoreNodeType::Endpoint => evaluate::<Endpoint>(self, props),
            CoreNodeType::Technology => evaluate::<Technology>(self, props),
            CoreNodeType::Certificate => evaluate::<Certificate>(self, props),
            CoreNodeType::Finding => evaluate::<Finding>(self, props),
            CoreNodeType::Evidence => evaluate::<Evidence>(self, props),
            CoreNodeType::Mitigation => evaluate::<Mitigation>(self, props),
            CoreNodeType::Technique => evaluate::<Technique>(self, props),
            CoreNodeType::CloudAsset => evaluate::<CloudAsset>(self, props),
            CoreNodeType::Api => evaluate::<Api>(self, props),
        }
    }
}

impl fmt::Display for CoreNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed view of one core node type with its business rules.
pub trait NodeRules: Sized {
    /// Extracts the typed view, reporting fields of the wrong kind.
    fn read(fields: &mut FieldRules<'_>) -> Self;

    /// Applies the type's business rules.
    fn check(&self, rules: &mut FieldRules<'_>);
}

fn evaluate<T: NodeRules>(node_type: CoreNodeType, props: &Properties) -> Vec<Violation> {
    let mut rules = FieldRules::new(node_type, props);
    let node = T::read(&mut rules);
    node.check(&mut rules);
    rules.finish()
}

/// Field extraction and constraint helpers that collect violations.
pub struct FieldRules<'a> {
    node_type: CoreNodeType,
    props: &'a Properties,
    violations: Vec<Violation>,
}

impl<'a> FieldRules<'a> {
    pub fn new(node_type: CoreNodeType, props: &'a Properties) -> Self {
        FieldRules {
            node_type,
            props,
            violations: Vec::new(),
        }
    }

    pub fn finish(self) -> Vec<Violation> {
        self.violations
    }

    pub fn violate(&mut self, field: &str, constraint: impl Into<String>) {
        self.violations.push(Violation::FieldConstraintViolation {
            node_type: self.node_type.as_str().to_string(),
            field: field.to_string(),
            constraint: constraint.into(),
        });
    }

    /// True if a violation for `field` was already recorded, e.g. a value
    /// of the wrong kind found while reading.
    fn reported(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field() == Some(field))
    }

    fn present(&self, field: &str) -> Option<&'a PropertyValue> {
        match self.props.get(field) {
            None | Some(PropertyValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Reads a string field. Absent and null read as `None`.
    pub fn text(&mut self, field: &str) -> Option<String> {
        let value = self.present(field)?;
        match value.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                self.violate(field, format!("must be a string, got {}", value.kind_name()));
                None
            }
        }
    }

    /// Reads an integer field.
    pub fn integer(&mut self, field: &str) -> Option<i64> {
        let value = self.present(field)?;
        match value {
            PropertyValue::Int(_) | PropertyValue::UInt(_) => {
                let n = value.as_i64();
                if n.is_none() {
                    self.violate(field, format!("is out of range, got {}", value));
                }
                n
            }
            other => {
                self.violate(field, format!("must be an integer, got {}", other.kind_name()));
                None
            }
        }
    }

    /// Reads a numeric field; integers are accepted.
    pub fn number(&mut self, field: &str) -> Option<f64> {
        let value = self.present(field)?;
        let n = value.as_f64();
        if n.is_none() {
            self.violate(field, format!("must be a number, got {}", value.kind_name()));
        }
        n
    }

    pub fn non_blank(&mut self, field: &str, value: Option<&str>) {
        if value.map_or(true, |s| s.trim().is_empty()) && !self.reported(field) {
            self.violate(field, "must not be empty");
        }
    }

    /// Requires an integer in `lo..=hi`.
    pub fn int_between(&mut self, field: &str, value: Option<i64>, lo: i64, hi: i64) {
        match value {
            Some(n) if (lo..=hi).contains(&n) => {}
            Some(n) => self.violate(field, format!("must be between {} and {}, got {}", lo, hi, n)),
            None if !self.reported(field) => self.violate(field, "is required"),
            // Wrong kind, already reported while reading.
            None => {}
        }
    }

    /// Requires an integer `>= lo`.
    pub fn int_at_least(&mut self, field: &str, value: Option<i64>, lo: i64) {
        match value {
            Some(n) if n >= lo => {}
            Some(n) => self.violate(field, format!("must be at least {}, got {}", lo, n)),
            None if !self.reported(field) => self.violate(field, "is required"),
            None => {}
        }
    }

    /// If present, the value must lie in `lo..=hi`.
    pub fn optional_float_between(&mut self, field: &str, value: Option<f64>, lo: f64, hi: f64) {
        if let Some(n) = value {
            if !(lo..=hi).contains(&n) {
                self.violate(
                    field,
                    format!("must be between {:.1} and {:.1}, got {}", lo, hi, n),
                );
            }
        }
    }

    /// If present, the value must be one of `allowed` (case-insensitive).
    pub fn optional_one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) {
        if let Some(s) = value {
            let normalized = s.trim().to_lowercase();
            if !allowed.contains(&normalized.as_str()) {
                self.violate(
                    field,
                    format!("must be one of {}, got '{}'", allowed.join(", "), s),
                );
            }
        }
    }

    /// At least one of the alternatives must be non-blank.
    pub fn any_present(&mut self, alternatives: &[(&str, Option<&str>)]) {
        let found = alternatives
            .iter()
            .any(|(_, value)| value.is_some_and(|s| !s.trim().is_empty()));
        if !found {
            let names: Vec<&str> = alternatives.iter().map(|(name, _)| *name).collect();
            self.violate(
                &names.join("|"),
                format!("requires at least one of {}", names.join(", ")),
            );
        }
    }
}

const RUN_STATUSES: &[&str] = &["pending", "running", "completed", "failed", "cancelled"];
const SEVERITIES: &[&str] = &["critical", "high", "medium", "low", "info"];

#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    pub name: Option<String>,
    pub target: Option<String>,
}

impl NodeRules for Mission {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Mission {
            name: f.text("name"),
            target: f.text("target"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("name", self.name.as_deref());
        r.non_blank("target", self.target.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionRun {
    pub mission_id: Option<String>,
    pub run_number: Option<i64>,
    pub status: Option<String>,
}

impl NodeRules for MissionRun {
    fn read(f: &mut FieldRules<'_>) -> Self {
        MissionRun {
            mission_id: f.text("mission_id"),
            run_number: f.integer("run_number"),
            status: f.text("status"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("mission_id", self.mission_id.as_deref());
        r.int_at_least("run_number", self.run_number, 1);
        r.optional_one_of("status", self.status.as_deref(), RUN_STATUSES);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub name: Option<String>,
}

impl NodeRules for Domain {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Domain { name: f.text("name") }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("name", self.name.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subdomain {
    pub name: Option<String>,
    pub domain_id: Option<String>,
}

impl NodeRules for Subdomain {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Subdomain {
            name: f.text("name"),
            domain_id: f.text("domain_id"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("name", self.name.as_deref());
    }
}

/// A host is identified by address, but a hostname alone is admissible.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

impl NodeRules for Host {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Host {
            ip: f.text("ip"),
            hostname: f.text("hostname"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.any_present(&[("ip", self.ip.as_deref()), ("hostname", self.hostname.as_deref())]);
        if let Some(ip) = self.ip.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if ip.parse::<IpAddr>().is_err() {
                r.violate("ip", format!("must be a valid IP address, got '{}'", ip));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub host_id: Option<String>,
    pub number: Option<i64>,
    pub protocol: Option<String>,
}

impl NodeRules for Port {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Port {
            host_id: f.text("host_id"),
            number: f.integer("number"),
            protocol: f.text("protocol"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.int_between("number", self.number, 1, 65535);
        r.non_blank("protocol", self.protocol.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub port_id: Option<String>,
    pub name: Option<String>,
}

impl NodeRules for Service {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Service {
            port_id: f.text("port_id"),
            name: f.text("name"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("name", self.name.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub service_id: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
}

impl NodeRules for Endpoint {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Endpoint {
            service_id: f.text("service_id"),
            url: f.text("url"),
            method: f.text("method"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("url", self.url.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Technology {
    pub name: Option<String>,
    pub version: Option<String>,
    pub confidence: Option<f64>,
}

impl NodeRules for Technology {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Technology {
            name: f.text("name"),
            version: f.text("version"),
            confidence: f.number("confidence"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("name", self.name.as_deref());
        r.optional_float_between("confidence", self.confidence, 0.0, 1.0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    pub host_id: Option<String>,
    pub fingerprint: Option<String>,
}

impl NodeRules for Certificate {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Certificate {
            host_id: f.text("host_id"),
            fingerprint: f.text("fingerprint"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("fingerprint", self.fingerprint.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub title: Option<String>,
    pub severity: Option<String>,
    pub confidence: Option<f64>,
    pub cvss_score: Option<f64>,
}

impl NodeRules for Finding {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Finding {
            title: f.text("title"),
            severity: f.text("severity"),
            confidence: f.number("confidence"),
            cvss_score: f.number("cvss_score"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("title", self.title.as_deref());
        r.optional_one_of("severity", self.severity.as_deref(), SEVERITIES);
        r.optional_float_between("confidence", self.confidence, 0.0, 1.0);
        r.optional_float_between("cvss_score", self.cvss_score, 0.0, 10.0);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub finding_id: Option<String>,
    pub kind: Option<String>,
}

impl NodeRules for Evidence {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Evidence {
            finding_id: f.text("finding_id"),
            kind: f.text("type"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("type", self.kind.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mitigation {
    pub finding_id: Option<String>,
    pub title: Option<String>,
}

impl NodeRules for Mitigation {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Mitigation {
            finding_id: f.text("finding_id"),
            title: f.text("title"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("title", self.title.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Technique {
    pub technique_id: Option<String>,
    pub name: Option<String>,
}

impl NodeRules for Technique {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Technique {
            technique_id: f.text("technique_id"),
            name: f.text("name"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("technique_id", self.technique_id.as_deref());
        r.non_blank("name", self.name.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudAsset {
    pub provider: Option<String>,
    pub resource_id: Option<String>,
}

impl NodeRules for CloudAsset {
    fn read(f: &mut FieldRules<'_>) -> Self {
        CloudAsset {
            provider: f.text("provider"),
            resource_id: f.text("resource_id"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("provider", self.provider.as_deref());
        r.non_blank("resource_id", self.resource_id.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Api {
    pub base_url: Option<String>,
}

impl NodeRules for Api {
    fn read(f: &mut FieldRules<'_>) -> Self {
        Api {
            base_url: f.text("base_url"),
        }
    }

    fn check(&self, r: &mut FieldRules<'_>) {
        r.non_blank("base_url", self.base_url.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(violations: &[Violation]) -> Vec<&str> {
        violations.iter().filter_map(Violation::field).collect()
    }

    #[test]
    fn names_roundtrip() {
        for t in CoreNodeType::ALL {
            assert_eq!(CoreNodeType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(CoreNodeType::from_name("Host"), None);
        assert_eq!(CoreNodeType::from_name("custom_widget"), None);
    }

    #[test]
    fn port_number_range() {
        let ok = Properties::new().with("number", 443).with("protocol", "tcp");
        assert!(CoreNodeType::Port.check_fields(&ok).is_empty());

        for bad in [0i64, 65536, -1] {
            let props = Properties::new().with("number", bad).with("protocol", "tcp");
            let v = CoreNodeType::Port.check_fields(&props);
            assert_eq!(fields(&v), ["number"]);
            assert!(v[0].to_string().contains("must be between 1 and 65535"));
        }

        let edge = Properties::new().with("number", 65535u32).with("protocol", "udp");
        assert!(CoreNodeType::Port.check_fields(&edge).is_empty());
    }

    #[test]
    fn port_number_wrong_kind() {
        let props = Properties::new().with("number", "eighty").with("protocol", "tcp");
        let v = CoreNodeType::Port.check_fields(&props);
        assert_eq!(v.len(), 1);
        assert!(v[0].to_string().contains("must be an integer, got string"));
    }

    #[test]
    fn port_number_required() {
        let props = Properties::new().with("protocol", "tcp");
        let v = CoreNodeType::Port.check_fields(&props);
        assert_eq!(v[0].to_string(), "port.number is required");
    }

    #[test]
    fn host_needs_ip_or_hostname() {
        let none = CoreNodeType::Host.check_fields(&Properties::new().with("ip", " "));
        assert_eq!(fields(&none), ["ip|hostname"]);

        let by_name = Properties::new().with("hostname", "db01");
        assert!(CoreNodeType::Host.check_fields(&by_name).is_empty());

        let by_ip = Properties::new().with("ip", "fe80::1");
        assert!(CoreNodeType::Host.check_fields(&by_ip).is_empty());
    }

    #[test]
    fn host_ip_must_parse() {
        let props = Properties::new().with("ip", "10.0.0.300");
        let v = CoreNodeType::Host.check_fields(&props);
        assert_eq!(fields(&v), ["ip"]);
    }

    #[test]
    fn finding_scores() {
        let props = Properties::new()
            .with("title", "SQL injection")
            .with("severity", "HIGH")
            .with("confidence", 0.9)
            .with("cvss_score", 9);
        assert!(CoreNodeType::Finding.check_fields(&props).is_empty());

        let bad = Properties::new()
            .with("title", "   ")
            .with("severity", "apocalyptic")
            .with("confidence", 1.5)
            .with("cvss_score", 10.5);
        let v = CoreNodeType::Finding.check_fields(&bad);
        assert_eq!(fields(&v), ["title", "severity", "confidence", "cvss_score"]);
        assert!(v[2].to_string().contains("must be between 0.0 and 1.0, got 1.5"));
        assert!(v[3].to_string().contains("must be between 0.0 and 10.0, got 10.5"));
    }

    #[test]
    fn nan_confidence_is_out_of_range() {
        let props = Properties::new().with("name", "nginx").with("confidence", f64::NAN);
        let v = CoreNodeType::Technology.check_fields(&props);
        assert_eq!(fields(&v), ["confidence"]);
    }

    #[test]
    fn mission_run_rules() {
        let ok = Properties::new()
            .with("mission_id", "mission:abc")
            .with("run_number", 1)
            .with("status", "Running");
        assert!(CoreNodeType::MissionRun.check_fields(&ok).is_empty());

        let bad = Properties::new().with("mission_id", "m").with("run_number", 0);
        let v = CoreNodeType::MissionRun.check_fields(&bad);
        assert_eq!(v[0].to_string(), "mission_run.run_number must be at least 1, got 0");
    }

    #[test]
    fn evidence_reads_type_field() {
        let v = CoreNodeType::Evidence.check_fields(&Properties::new());
        assert_eq!(fields(&v), ["type"]);
        let ok = Properties::new().with("type", "http_response");
        assert!(CoreNodeType::Evidence.check_fields(&ok).is_empty());
    }

    #[test]
    fn text_field_of_wrong_kind() {
        let props = Properties::new().with("name", 42).with("target", "10.0.0.0/24");
        let v = CoreNodeType::Mission.check_fields(&props);
        assert_eq!(fields(&v), ["name"]);
        assert!(v[0].to_string().contains("must be a string, got integer"));
    }

    #[test]
    fn blank_string_number_is_reported_once() {
        let props = Properties::new().with("number", "").with("protocol", "tcp");
        let v = CoreNodeType::Port.check_fields(&props);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].to_string(), "port.number must be an integer, got string");
    }
}
