//! Intent model - the classified request consumed from the language-model collaborator
//!
//! The model only classifies what the operator wants. Tool selection,
//! arguments, root requirement, and risk level all come from the registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Command risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

/// Operator intent types
///
/// The classifier picks exactly one of these; everything else is static.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    // Scanning
    HostDiscovery,
    PortScan,
    ServiceDetection,
    OsDetection,
    VulnScan,
    SslScan,

    // Web enumeration
    WebDirEnum,
    WebVulnScan,

    // Recon
    DnsLookup,
    WhoisLookup,
    SubdomainEnum,

    // Brute force
    BruteForceSsh,
    BruteForceHttp,

    // Exploit
    SqlInjection,

    // No command produced
    InfoQuery,
    Unknown,
}

impl IntentType {
    /// All intent variants, in declaration order
    pub const ALL: [IntentType; 16] = [
        IntentType::HostDiscovery,
        IntentType::PortScan,
        IntentType::ServiceDetection,
        IntentType::OsDetection,
        IntentType::VulnScan,
        IntentType::SslScan,
        IntentType::WebDirEnum,
        IntentType::WebVulnScan,
        IntentType::DnsLookup,
        IntentType::WhoisLookup,
        IntentType::SubdomainEnum,
        IntentType::BruteForceSsh,
        IntentType::BruteForceHttp,
        IntentType::SqlInjection,
        IntentType::InfoQuery,
        IntentType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::HostDiscovery => "host_discovery",
            IntentType::PortScan => "port_scan",
            IntentType::ServiceDetection => "service_detection",
            IntentType::OsDetection => "os_detection",
            IntentType::VulnScan => "vuln_scan",
            IntentType::SslScan => "ssl_scan",
            IntentType::WebDirEnum => "web_dir_enum",
            IntentType::WebVulnScan => "web_vuln_scan",
            IntentType::DnsLookup => "dns_lookup",
            IntentType::WhoisLookup => "whois_lookup",
            IntentType::SubdomainEnum => "subdomain_enum",
            IntentType::BruteForceSsh => "brute_force_ssh",
            IntentType::BruteForceHttp => "brute_force_http",
            IntentType::SqlInjection => "sql_injection",
            IntentType::InfoQuery => "info_query",
            IntentType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IntentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IntentType::ALL
            .iter()
            .find(|i| i.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown intent type: {}", s))
    }
}

/// The classified request, as received from the external classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: IntentType,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarification_reason: Option<String>,
}

impl Intent {
    /// Create a bare intent with no target or parameters
    pub fn new(intent_type: IntentType) -> Self {
        Self {
            intent_type,
            target: None,
            params: HashMap::new(),
            needs_clarification: false,
            clarification_reason: None,
        }
    }

    /// Set the target
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}
