//! Policy gate - locked safety rules for actionable intents
//!
//! Exploit execution and credential brute force always require explicit
//! operator confirmation, and persistent-change tactics are blocked
//! outright. The confirm and blocked sets are compile-time constants;
//! there is no API to relax them, and `validate_locked` rejects any
//! policy value that tries.

use crate::intent::{IntentType, RiskLevel};
use crate::registry::ToolRegistry;
use crate::{Error, Result};

/// Coarse tactical category used only for policy decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tactic {
    // Reconnaissance
    PingSweep,
    PortScan,
    ServiceDetection,
    OsFingerprint,
    DnsEnumeration,
    SubdomainEnumeration,

    // Web enumeration
    DirectoryBruteForce,
    TechnologyDetection,
    ParameterFuzzing,

    // Vulnerability assessment
    VulnScan,
    SslTlsAnalysis,

    // High risk
    ExploitWeakness,
    CredentialBruteForce,
    PasswordSpray,
}

impl Tactic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tactic::PingSweep => "ping_sweep",
            Tactic::PortScan => "port_scan",
            Tactic::ServiceDetection => "service_detection",
            Tactic::OsFingerprint => "os_fingerprint",
            Tactic::DnsEnumeration => "dns_enumeration",
            Tactic::SubdomainEnumeration => "subdomain_enumeration",
            Tactic::DirectoryBruteForce => "directory_brute_force",
            Tactic::TechnologyDetection => "technology_detection",
            Tactic::ParameterFuzzing => "parameter_fuzzing",
            Tactic::VulnScan => "vuln_scan",
            Tactic::SslTlsAnalysis => "ssl_tls_analysis",
            Tactic::ExploitWeakness => "exploit_weakness",
            Tactic::CredentialBruteForce => "credential_brute_force",
            Tactic::PasswordSpray => "password_spray",
        }
    }
}

/// Tactics that always require explicit confirmation (locked)
pub const CONFIRM_BEFORE_TACTICS: [Tactic; 2] =
    [Tactic::ExploitWeakness, Tactic::CredentialBruteForce];

/// Tactics with persistent-change risk, blocked while
/// `allow_persistent_changes` is false (locked)
pub const PERSISTENT_CHANGE_TACTICS: [Tactic; 3] = [
    Tactic::ExploitWeakness,
    Tactic::CredentialBruteForce,
    Tactic::PasswordSpray,
];

/// Map an actionable intent to its tactical category
pub fn tactic_for_intent(intent: IntentType) -> Option<Tactic> {
    match intent {
        IntentType::HostDiscovery => Some(Tactic::PingSweep),
        IntentType::PortScan => Some(Tactic::PortScan),
        IntentType::ServiceDetection => Some(Tactic::ServiceDetection),
        IntentType::OsDetection => Some(Tactic::OsFingerprint),
        IntentType::VulnScan => Some(Tactic::VulnScan),
        IntentType::SslScan => Some(Tactic::SslTlsAnalysis),
        IntentType::WebDirEnum => Some(Tactic::DirectoryBruteForce),
        IntentType::DnsLookup => Some(Tactic::DnsEnumeration),
        IntentType::SubdomainEnum => Some(Tactic::SubdomainEnumeration),
        IntentType::BruteForceSsh | IntentType::BruteForceHttp => {
            Some(Tactic::CredentialBruteForce)
        }
        IntentType::SqlInjection => Some(Tactic::ExploitWeakness),
        IntentType::WhoisLookup
        | IntentType::WebVulnScan
        | IntentType::InfoQuery
        | IntentType::Unknown => None,
    }
}

/// Execution policy, safe by default
///
/// `allow_persistent_changes` exists so the guard has something to check;
/// the locked configuration never sets it true.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub allow_persistent_changes: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            allow_persistent_changes: false,
        }
    }
}

impl ExecutionPolicy {
    /// Whether a tactic may run without operator confirmation
    pub fn is_tactic_allowed_auto(&self, tactic: Tactic) -> bool {
        if CONFIRM_BEFORE_TACTICS.contains(&tactic) {
            return false;
        }
        if PERSISTENT_CHANGE_TACTICS.contains(&tactic) && !self.allow_persistent_changes {
            return false;
        }
        true
    }

    /// Whether a tactic is in the locked confirm-before set
    pub fn requires_confirmation(&self, tactic: Tactic) -> bool {
        CONFIRM_BEFORE_TACTICS.contains(&tactic)
    }

    /// Tactics fully blocked by the current policy
    pub fn blocked_tactics(&self) -> Vec<Tactic> {
        if self.allow_persistent_changes {
            Vec::new()
        } else {
            PERSISTENT_CHANGE_TACTICS.to_vec()
        }
    }

    /// Reject any policy value that relaxes the locked rules
    pub fn validate_locked(&self) -> Result<()> {
        if self.allow_persistent_changes {
            return Err(Error::Policy(
                "locked policy violation: allow_persistent_changes must be false".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Permitted, nothing to report
    Allow,
    /// Permitted with a non-blocking warning
    Warn(String),
    /// Blocked; execution must not be attempted
    Deny(String),
}

impl PolicyDecision {
    pub fn allowed(&self) -> bool {
        !matches!(self, PolicyDecision::Deny(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PolicyDecision::Allow => None,
            PolicyDecision::Warn(msg) | PolicyDecision::Deny(msg) => Some(msg),
        }
    }
}

/// Intent-level policy gate
///
/// Stateless across calls apart from its enabled toggle.
pub struct PolicyGate {
    enabled: bool,
    policy: ExecutionPolicy,
}

impl PolicyGate {
    /// Create a gate; enabled by default
    pub fn new(enabled: bool) -> Result<Self> {
        let policy = ExecutionPolicy::default();
        policy.validate_locked()?;
        Ok(Self { enabled, policy })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Check an intent against the policy
    ///
    /// With the gate disabled everything passes silently. Enabled, the
    /// confirm-before tactics and blocked tactics are denied, high-risk
    /// tools produce a warning, and everything else passes.
    pub fn check(&self, intent: IntentType, registry: &ToolRegistry) -> PolicyDecision {
        if !self.enabled {
            return PolicyDecision::Allow;
        }

        if let Some(tactic) = tactic_for_intent(intent) {
            if !self.policy.is_tactic_allowed_auto(tactic) {
                if self.policy.requires_confirmation(tactic) {
                    return PolicyDecision::Deny(format!(
                        "{} requires explicit operator confirmation before it can run",
                        intent
                    ));
                }
                return PolicyDecision::Deny(format!("{} is blocked by policy", intent));
            }
        }

        if let Some(def) = registry.get(intent) {
            if def.risk_level == RiskLevel::High {
                return PolicyDecision::Warn(format!(
                    "{} is a high-risk operation; use only against authorized systems",
                    intent
                ));
            }
        }

        PolicyDecision::Allow
    }
}
