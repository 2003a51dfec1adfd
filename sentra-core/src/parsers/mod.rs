//! Parser framework - tool output to typed entities
//!
//! Every parser either returns at least one entity or raises the typed
//! no-usable-data failure; an empty success is not a legal outcome (truly
//! empty output is classified by the coordinator before parsing). Parsers
//! never compute ids themselves: entity constructors thread the identity
//! layer through.

pub mod analysis;
pub mod dns;
pub mod exploit;
pub mod nmap;
pub mod tls;
pub mod web;

pub use analysis::{analyze_banner, extract_cve_info, parse_service_version, risk_score};

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::intent::IntentType;
use crate::registry::ToolRegistry;
use crate::store::Entity;
use crate::{Error, Result};

/// Typed parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The output was readable but contained nothing usable
    #[error("no usable data in tool output: {0}")]
    NoData(String),
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// A tool-output parser
///
/// Implementations are line-oriented single-pass scanners; those that
/// handle host-scoped output keep a current-host cursor while scanning.
pub trait OutputParser: Send + Sync {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>>;
}

/// Explicit parser dispatch table, keyed by intent
///
/// Replaces string-keyed duck dispatch: lookups are typed and the table is
/// checked at startup for completeness against the tool registry.
pub struct ParserRegistry {
    parsers: HashMap<IntentType, Arc<dyn OutputParser>>,
}

impl ParserRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry covering every intent the tool registry can execute
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(IntentType::HostDiscovery, Arc::new(nmap::PingSweepParser));
        registry.register(IntentType::PortScan, Arc::new(nmap::PortScanParser));
        registry.register(
            IntentType::ServiceDetection,
            Arc::new(nmap::ServiceDetectionParser),
        );
        // OS detection output carries the same port/service table plus an
        // OS details line, which the service parser also understands
        registry.register(
            IntentType::OsDetection,
            Arc::new(nmap::ServiceDetectionParser),
        );
        registry.register(IntentType::VulnScan, Arc::new(nmap::VulnScanParser));
        registry.register(IntentType::SslScan, Arc::new(tls::TlsScanParser));
        registry.register(IntentType::WebDirEnum, Arc::new(web::DirEnumParser));
        registry.register(IntentType::WebVulnScan, Arc::new(web::NiktoScanParser));
        registry.register(IntentType::DnsLookup, Arc::new(dns::DnsLookupParser));
        registry.register(IntentType::WhoisLookup, Arc::new(dns::WhoisParser));
        registry.register(IntentType::SubdomainEnum, Arc::new(dns::SubdomainParser));
        registry.register(IntentType::BruteForceSsh, Arc::new(exploit::HydraParser));
        registry.register(IntentType::BruteForceHttp, Arc::new(exploit::HydraParser));
        registry.register(IntentType::SqlInjection, Arc::new(exploit::SqlmapParser));

        registry
    }

    /// Register a parser for an intent
    pub fn register(&mut self, intent: IntentType, parser: Arc<dyn OutputParser>) {
        self.parsers.insert(intent, parser);
    }

    /// Look up the parser for an intent
    pub fn get(&self, intent: IntentType) -> Option<Arc<dyn OutputParser>> {
        self.parsers.get(&intent).cloned()
    }

    /// Startup check: every intent with a registered tool must have a parser
    pub fn verify_coverage(&self, tools: &ToolRegistry) -> Result<()> {
        let missing: Vec<&str> = tools
            .supported_intents()
            .into_iter()
            .filter(|intent| !self.parsers.contains_key(intent))
            .map(|intent| intent.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::ParserMissing(missing.join(", ")))
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_tool_registry() {
        let parsers = ParserRegistry::with_defaults();
        let tools = ToolRegistry::new();
        parsers.verify_coverage(&tools).expect("coverage complete");
    }

    #[test]
    fn test_empty_registry_fails_coverage() {
        let parsers = ParserRegistry::new();
        let tools = ToolRegistry::new();
        let err = parsers.verify_coverage(&tools).unwrap_err();
        assert!(err.to_string().contains("port_scan"));
    }

    #[test]
    fn test_get_after_register() {
        let mut parsers = ParserRegistry::new();
        assert!(parsers.get(IntentType::PortScan).is_none());
        parsers.register(IntentType::PortScan, Arc::new(nmap::PortScanParser));
        assert!(parsers.get(IntentType::PortScan).is_some());
    }
}
