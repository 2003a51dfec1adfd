//! Tool registry - static intent to tool mapping
//!
//! The registry is the only source for tool names, base arguments, root
//! requirements, and risk levels. Nothing here is ever produced by the
//! language model; the classifier only supplies the intent and parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::intent::{IntentType, RiskLevel};

/// A security tool definition, immutable at runtime
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub tool: &'static str,
    pub base_args: &'static [&'static str],
    pub requires_root: bool,
    pub risk_level: RiskLevel,
    pub description: &'static str,
    /// Parameter name -> argument template with a `{value}` placeholder
    pub arg_templates: &'static [(&'static str, &'static str)],
}

/// A resolved tool invocation, ready for the command builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub tool: String,
    pub arguments: Vec<String>,
    pub target: Option<String>,
    pub requires_root: bool,
    pub risk_level: RiskLevel,
}

/// Registry of tools keyed by intent
pub struct ToolRegistry {
    tools: HashMap<IntentType, ToolDef>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create the registry with the curated tool table
    pub fn new() -> Self {
        let mut tools = HashMap::new();

        // Scanning
        tools.insert(
            IntentType::HostDiscovery,
            ToolDef {
                tool: "nmap",
                base_args: &["-sn"],
                requires_root: false,
                risk_level: RiskLevel::Low,
                description: "Ping sweep for live hosts",
                arg_templates: &[],
            },
        );
        tools.insert(
            IntentType::PortScan,
            ToolDef {
                tool: "nmap",
                base_args: &["-sS", "-sV"],
                // SYN scan needs raw sockets
                requires_root: true,
                risk_level: RiskLevel::Medium,
                description: "TCP SYN port scan with service detection",
                arg_templates: &[("ports", "-p {value}")],
            },
        );
        tools.insert(
            IntentType::ServiceDetection,
            ToolDef {
                tool: "nmap",
                base_args: &["-sV", "--version-intensity", "5"],
                requires_root: false,
                risk_level: RiskLevel::Medium,
                description: "Service version detection",
                arg_templates: &[("ports", "-p {value}")],
            },
        );
        tools.insert(
            IntentType::OsDetection,
            ToolDef {
                tool: "nmap",
                base_args: &["-O", "-sV"],
                requires_root: true,
                risk_level: RiskLevel::Medium,
                description: "Operating system fingerprinting",
                arg_templates: &[],
            },
        );
        tools.insert(
            IntentType::VulnScan,
            ToolDef {
                tool: "nmap",
                base_args: &["--script", "vuln"],
                requires_root: true,
                risk_level: RiskLevel::High,
                description: "NSE vulnerability script scan",
                arg_templates: &[("ports", "-p {value}")],
            },
        );
        tools.insert(
            IntentType::SslScan,
            ToolDef {
                tool: "nmap",
                base_args: &["--script", "ssl-cert,ssl-enum-ciphers"],
                requires_root: false,
                risk_level: RiskLevel::Medium,
                description: "TLS certificate and cipher analysis",
                arg_templates: &[("ports", "-p {value}")],
            },
        );

        // Web enumeration
        tools.insert(
            IntentType::WebDirEnum,
            ToolDef {
                tool: "gobuster",
                base_args: &["dir", "-w", "/usr/share/wordlists/dirb/common.txt"],
                requires_root: false,
                risk_level: RiskLevel::Medium,
                description: "Web directory and file discovery",
                arg_templates: &[("wordlist", "-w {value}"), ("extensions", "-x {value}")],
            },
        );
        tools.insert(
            IntentType::WebVulnScan,
            ToolDef {
                tool: "nikto",
                base_args: &[],
                requires_root: false,
                risk_level: RiskLevel::Medium,
                description: "Web server vulnerability scan",
                arg_templates: &[("port", "-p {value}")],
            },
        );

        // Recon
        tools.insert(
            IntentType::DnsLookup,
            ToolDef {
                tool: "nslookup",
                base_args: &[],
                requires_root: false,
                risk_level: RiskLevel::Low,
                description: "DNS query",
                arg_templates: &[],
            },
        );
        tools.insert(
            IntentType::WhoisLookup,
            ToolDef {
                tool: "whois",
                base_args: &[],
                requires_root: false,
                risk_level: RiskLevel::Low,
                description: "Domain registration lookup",
                arg_templates: &[],
            },
        );
        tools.insert(
            IntentType::SubdomainEnum,
            ToolDef {
                tool: "gobuster",
                base_args: &["dns", "-w", "/usr/share/wordlists/dnsmap.txt"],
                requires_root: false,
                risk_level: RiskLevel::Low,
                description: "Subdomain enumeration",
                arg_templates: &[("wordlist", "-w {value}")],
            },
        );

        // Brute force
        tools.insert(
            IntentType::BruteForceSsh,
            ToolDef {
                tool: "hydra",
                base_args: &["-t", "4"],
                requires_root: false,
                risk_level: RiskLevel::High,
                description: "SSH credential brute force",
                arg_templates: &[
                    ("username", "-l {value}"),
                    ("userlist", "-L {value}"),
                    ("password", "-p {value}"),
                    ("passlist", "-P {value}"),
                ],
            },
        );
        tools.insert(
            IntentType::BruteForceHttp,
            ToolDef {
                tool: "hydra",
                base_args: &["-t", "4"],
                requires_root: false,
                risk_level: RiskLevel::High,
                description: "HTTP form brute force",
                arg_templates: &[("username", "-l {value}"), ("passlist", "-P {value}")],
            },
        );

        // Exploit
        tools.insert(
            IntentType::SqlInjection,
            ToolDef {
                tool: "sqlmap",
                base_args: &["--batch", "--level", "3"],
                requires_root: false,
                risk_level: RiskLevel::High,
                description: "SQL injection testing",
                arg_templates: &[("url", "-u {value}"), ("data", "--data {value}")],
            },
        );

        Self { tools }
    }

    /// Look up the tool definition for an intent
    ///
    /// Returns None for pure-information intents (info_query, unknown).
    pub fn get(&self, intent: IntentType) -> Option<&ToolDef> {
        self.tools.get(&intent)
    }

    /// All intents with a registered tool
    pub fn supported_intents(&self) -> Vec<IntentType> {
        IntentType::ALL
            .iter()
            .filter(|i| self.tools.contains_key(i))
            .copied()
            .collect()
    }

    /// Intents that resolve to a given tool name
    pub fn intents_for_tool(&self, tool_name: &str) -> Vec<IntentType> {
        IntentType::ALL
            .iter()
            .filter(|i| {
                self.tools
                    .get(i)
                    .map(|def| def.tool == tool_name)
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// Assemble a ToolSpec from an intent, target, and parameters
    ///
    /// Starts from the tool's base arguments, then for every parameter
    /// present both in the input and in the tool's template table, expands
    /// the template and splits it on whitespace into discrete tokens.
    /// Root/risk metadata is carried from the table untouched. Consults
    /// nothing but the static table and its inputs.
    pub fn build_tool_spec(
        &self,
        intent: IntentType,
        target: Option<&str>,
        params: &HashMap<String, String>,
    ) -> Option<ToolSpec> {
        let def = self.get(intent)?;

        let mut arguments: Vec<String> = def.base_args.iter().map(|s| s.to_string()).collect();

        // Deterministic expansion order regardless of map iteration order
        for (name, template) in def.arg_templates {
            if let Some(value) = params.get(*name) {
                let formatted = template.replace("{value}", value);
                arguments.extend(formatted.split_whitespace().map(String::from));
            }
        }

        Some(ToolSpec {
            tool: def.tool.to_string(),
            arguments,
            target: target.map(String::from),
            requires_root: def.requires_root,
            risk_level: def.risk_level,
        })
    }
}
