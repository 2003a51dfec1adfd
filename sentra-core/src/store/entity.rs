//! Entity graph data models
//!
//! Every entity's id is a pure function of its semantic key (see the
//! identity module), so re-discovering the same real-world object is an
//! upsert, never a duplicate. `EntityData` carries one typed variant per
//! entity kind plus a narrow `extra` map for tool-specific fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity;

/// Entity kinds stored in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Host,
    Port,
    Service,
    Vulnerability,
    WebResource,
    Dns,
    Certificate,
    Credential,
    File,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Host => "host",
            EntityType::Port => "port",
            EntityType::Service => "service",
            EntityType::Vulnerability => "vulnerability",
            EntityType::WebResource => "web_resource",
            EntityType::Dns => "dns",
            EntityType::Certificate => "certificate",
            EntityType::Credential => "credential",
            EntityType::File => "file",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "host" => Ok(EntityType::Host),
            "port" => Ok(EntityType::Port),
            "service" => Ok(EntityType::Service),
            "vulnerability" => Ok(EntityType::Vulnerability),
            "web_resource" => Ok(EntityType::WebResource),
            "dns" => Ok(EntityType::Dns),
            "certificate" => Ok(EntityType::Certificate),
            "credential" => Ok(EntityType::Credential),
            "file" => Ok(EntityType::File),
            _ => Err(format!("Unknown entity type: {}", s)),
        }
    }
}

/// Typed relationship edges between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    HasPort,
    HasService,
    HasVulnerability,
    HasWebResource,
    ResolvesTo,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::HasPort => "has_port",
            RelationshipType::HasService => "has_service",
            RelationshipType::HasVulnerability => "has_vulnerability",
            RelationshipType::HasWebResource => "has_web_resource",
            RelationshipType::ResolvesTo => "resolves_to",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Vulnerability severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Base weight used for risk scoring
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 8.5,
            Severity::Medium => 6.0,
            Severity::Low => 3.0,
            Severity::Info => 1.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" | "informational" => Ok(Severity::Info),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

type ExtraMap = BTreeMap<String, serde_json::Value>;

fn extra_is_empty(extra: &ExtraMap) -> bool {
    extra.is_empty()
}

/// Typed payload, one variant per entity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityData {
    Host {
        ip_address: String,
        is_alive: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hostname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        os_type: Option<String>,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    Port {
        host_id: String,
        port: u16,
        protocol: String,
        state: String,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    Service {
        port_id: String,
        service_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        banner: Option<String>,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    Vulnerability {
        service_id: String,
        /// CVE id or vulnerability type this finding is keyed on
        reference: String,
        severity: Severity,
        exploitable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cve_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cvss_score: Option<f64>,
        risk_score: f64,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    WebResource {
        service_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    Dns {
        domain: String,
        record_type: String,
        value: String,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    Certificate {
        fingerprint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issuer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        not_after: Option<String>,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    Credential {
        username: String,
        service_id: String,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
    File {
        host_id: String,
        path: String,
        #[serde(default, skip_serializing_if = "extra_is_empty")]
        extra: ExtraMap,
    },
}

impl EntityData {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityData::Host { .. } => EntityType::Host,
            EntityData::Port { .. } => EntityType::Port,
            EntityData::Service { .. } => EntityType::Service,
            EntityData::Vulnerability { .. } => EntityType::Vulnerability,
            EntityData::WebResource { .. } => EntityType::WebResource,
            EntityData::Dns { .. } => EntityType::Dns,
            EntityData::Certificate { .. } => EntityType::Certificate,
            EntityData::Credential { .. } => EntityType::Credential,
            EntityData::File { .. } => EntityType::File,
        }
    }

    fn extra_mut(&mut self) -> &mut ExtraMap {
        match self {
            EntityData::Host { extra, .. }
            | EntityData::Port { extra, .. }
            | EntityData::Service { extra, .. }
            | EntityData::Vulnerability { extra, .. }
            | EntityData::WebResource { extra, .. }
            | EntityData::Dns { extra, .. }
            | EntityData::Certificate { extra, .. }
            | EntityData::Credential { extra, .. }
            | EntityData::File { extra, .. } => extra,
        }
    }
}

/// A node in the entity graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confidence: f64,
    pub data: EntityData,
}

impl Entity {
    fn with_data(id: String, data: EntityData) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            confidence: 1.0,
            data,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.data.entity_type()
    }

    /// The canonical parent edge implied by this entity's payload, if any
    pub fn parent_link(&self) -> Option<(String, RelationshipType)> {
        match &self.data {
            EntityData::Port { host_id, .. } => {
                Some((host_id.clone(), RelationshipType::HasPort))
            }
            EntityData::Service { port_id, .. } => {
                Some((port_id.clone(), RelationshipType::HasService))
            }
            EntityData::Vulnerability { service_id, .. } => {
                Some((service_id.clone(), RelationshipType::HasVulnerability))
            }
            EntityData::WebResource { service_id, .. } => {
                Some((service_id.clone(), RelationshipType::HasWebResource))
            }
            EntityData::Dns {
                record_type, value, ..
            } if record_type == "A" => {
                Some((identity::host_id(value), RelationshipType::ResolvesTo))
            }
            _ => None,
        }
    }

    // Constructors, one per entity kind. These thread the identity layer
    // through so callers never compute an id by hand.

    pub fn host(ip: &str) -> Self {
        Self::with_data(
            identity::host_id(ip),
            EntityData::Host {
                ip_address: ip.to_string(),
                is_alive: true,
                hostname: None,
                os_type: None,
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn port(ip: &str, port: u16, protocol: &str) -> Self {
        Self::with_data(
            identity::port_id(ip, port, protocol),
            EntityData::Port {
                host_id: identity::host_id(ip),
                port,
                protocol: protocol.to_lowercase(),
                state: "open".to_string(),
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn service(port_id: &str, service_name: &str) -> Self {
        Self::with_data(
            identity::service_id(port_id, service_name),
            EntityData::Service {
                port_id: port_id.to_string(),
                service_name: service_name.to_lowercase(),
                version: None,
                banner: None,
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn vulnerability(service_id: &str, reference: &str, severity: Severity) -> Self {
        Self::with_data(
            identity::vuln_id(service_id, reference),
            EntityData::Vulnerability {
                service_id: service_id.to_string(),
                reference: reference.to_string(),
                severity,
                exploitable: false,
                description: None,
                cve_ids: Vec::new(),
                cvss_score: None,
                risk_score: severity.weight(),
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn web_resource(service_id: &str, url: &str) -> Self {
        Self::with_data(
            identity::web_resource_id(service_id, url),
            EntityData::WebResource {
                service_id: service_id.to_string(),
                url: url.to_string(),
                status_code: None,
                size: None,
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn dns(domain: &str, record_type: &str, value: &str) -> Self {
        Self::with_data(
            identity::dns_id(domain),
            EntityData::Dns {
                domain: domain.to_lowercase(),
                record_type: record_type.to_uppercase(),
                value: value.to_string(),
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn certificate(fingerprint: &str) -> Self {
        Self::with_data(
            identity::cert_id(fingerprint),
            EntityData::Certificate {
                fingerprint: fingerprint.to_string(),
                subject: None,
                issuer: None,
                not_after: None,
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn credential(username: &str, service_id: &str) -> Self {
        Self::with_data(
            identity::credential_id(username, service_id),
            EntityData::Credential {
                username: username.to_string(),
                service_id: service_id.to_string(),
                extra: ExtraMap::new(),
            },
        )
    }

    pub fn file(host_id: &str, path: &str) -> Self {
        Self::with_data(
            identity::file_id(host_id, path),
            EntityData::File {
                host_id: host_id.to_string(),
                path: path.to_string(),
                extra: ExtraMap::new(),
            },
        )
    }

    // Builder-style modifiers

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.extra_mut().insert(key.into(), value);
        self
    }

    pub fn with_alive(mut self, alive: bool) -> Self {
        if let EntityData::Host { is_alive, .. } = &mut self.data {
            *is_alive = alive;
        }
        self
    }

    pub fn with_hostname(mut self, name: impl Into<String>) -> Self {
        if let EntityData::Host { hostname, .. } = &mut self.data {
            *hostname = Some(name.into());
        }
        self
    }

    pub fn with_os_type(mut self, os: impl Into<String>) -> Self {
        if let EntityData::Host { os_type, .. } = &mut self.data {
            *os_type = Some(os.into());
        }
        self
    }

    pub fn with_state(mut self, new_state: impl Into<String>) -> Self {
        if let EntityData::Port { state, .. } = &mut self.data {
            *state = new_state.into();
        }
        self
    }

    pub fn with_version(mut self, v: impl Into<String>) -> Self {
        if let EntityData::Service { version, .. } = &mut self.data {
            *version = Some(v.into());
        }
        self
    }

    pub fn with_banner(mut self, b: impl Into<String>) -> Self {
        if let EntityData::Service { banner, .. } = &mut self.data {
            *banner = Some(b.into());
        }
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        if let EntityData::Vulnerability { description, .. } = &mut self.data {
            *description = Some(desc.into());
        }
        self
    }

    pub fn with_exploitable(mut self, value: bool) -> Self {
        if let EntityData::Vulnerability { exploitable, .. } = &mut self.data {
            *exploitable = value;
        }
        self
    }

    pub fn with_cves(mut self, ids: Vec<String>) -> Self {
        if let EntityData::Vulnerability { cve_ids, .. } = &mut self.data {
            *cve_ids = ids;
        }
        self
    }

    pub fn with_cvss(mut self, score: f64) -> Self {
        if let EntityData::Vulnerability { cvss_score, .. } = &mut self.data {
            *cvss_score = Some(score);
        }
        self
    }

    pub fn with_risk_score(mut self, score: f64) -> Self {
        if let EntityData::Vulnerability { risk_score, .. } = &mut self.data {
            *risk_score = score;
        }
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        if let EntityData::WebResource { status_code, .. } = &mut self.data {
            *status_code = Some(code);
        }
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        if let EntityData::WebResource { size, .. } = &mut self.data {
            *size = Some(bytes);
        }
        self
    }

    pub fn with_subject(mut self, s: impl Into<String>) -> Self {
        if let EntityData::Certificate { subject, .. } = &mut self.data {
            *subject = Some(s.into());
        }
        self
    }

    pub fn with_issuer(mut self, i: impl Into<String>) -> Self {
        if let EntityData::Certificate { issuer, .. } = &mut self.data {
            *issuer = Some(i.into());
        }
        self
    }

    pub fn with_not_after(mut self, date: impl Into<String>) -> Self {
        if let EntityData::Certificate { not_after, .. } = &mut self.data {
            *not_after = Some(date.into());
        }
        self
    }
}
