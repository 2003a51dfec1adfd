//! Command builder - deterministic ToolSpec to argument-vector synthesis
//!
//! No free-form text ever reaches a process invocation: every token is a
//! discrete argv element, validated against strict allow-patterns, and no
//! shell is ever asked to interpret string concatenation. Rejections are
//! values, not faults.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::RiskLevel;
use crate::registry::ToolSpec;

/// IPv4 address with optional CIDR suffix
#[allow(clippy::expect_used)] // Static initialization with hardcoded regex - panic is appropriate
static IP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(?:/(?:3[0-2]|[12]?[0-9]))?$",
    )
    .expect("Hardcoded IP regex pattern should be valid")
});

/// Hostname / domain name
#[allow(clippy::expect_used)]
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
        .expect("Hardcoded domain regex pattern should be valid")
});

/// http/https URL
#[allow(clippy::expect_used)]
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*(?::\d{1,5})?(?:/\S*)?$",
    )
    .expect("Hardcoded URL regex pattern should be valid")
});

/// Port list/range: "80", "22,80,443", "1-1000", mixed
#[allow(clippy::expect_used)]
static PORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,5}(?:-\d{1,5})?(?:,\d{1,5}(?:-\d{1,5})?)*$")
        .expect("Hardcoded port regex pattern should be valid")
});

/// Characters that can alter shell or argv structure
pub const DANGEROUS_CHARS: [char; 13] = [
    ';', '|', '&', '$', '`', '(', ')', '{', '}', '<', '>', '\n', '\r',
];

/// The only placeholder tolerated post-registry, consumed downstream
pub const TARGET_PLACEHOLDER: &str = "{target}";

const MAX_ARG_LENGTH: usize = 512;

/// Why a command was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("tool name is empty")]
    EmptyTool,
    #[error("target contains dangerous character {0:?}")]
    DangerousTarget(char),
    #[error("target is not a valid IP, network, domain, or URL: {0}")]
    InvalidTarget(String),
    #[error("argument is empty")]
    EmptyArgument,
    #[error("argument exceeds {MAX_ARG_LENGTH} characters")]
    ArgumentTooLong,
    #[error("argument contains control character")]
    ControlCharacter,
    #[error("argument contains dangerous character {0:?}")]
    DangerousArgument(char),
    #[error("invalid port specification: {0}")]
    InvalidPorts(String),
}

/// Accepted target shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Ipv4,
    Network,
    Domain,
    Url,
}

/// Classify a target string, assuming dangerous characters were already
/// screened out
pub fn classify_target(target: &str) -> Option<TargetKind> {
    if IP_PATTERN.is_match(target) {
        if target.contains('/') {
            return Some(TargetKind::Network);
        }
        return Some(TargetKind::Ipv4);
    }
    if DOMAIN_PATTERN.is_match(target) {
        return Some(TargetKind::Domain);
    }
    if URL_PATTERN.is_match(target) {
        return Some(TargetKind::Url);
    }
    None
}

/// The final synthesized command, handed to the execution layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCommand {
    pub executable: String,
    pub arguments: Vec<String>,
    pub requires_root: bool,
    pub risk_level: RiskLevel,
    pub explanation: String,
}

impl FinalCommand {
    /// Full argument vector including the executable
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.arguments.len() + 1);
        argv.push(self.executable.clone());
        argv.extend(self.arguments.iter().cloned());
        argv
    }

    /// Display form for the operator
    pub fn command_line(&self) -> String {
        format!("{} {}", self.executable, self.arguments.join(" "))
    }
}

/// ToolSpec + explanation -> FinalCommand converter
///
/// Pure per call; holds no state.
#[derive(Debug, Default)]
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build an executable command or report why it was refused
    pub fn build(
        &self,
        spec: &ToolSpec,
        explanation: &str,
    ) -> std::result::Result<FinalCommand, RejectReason> {
        if spec.tool.is_empty() {
            return Err(RejectReason::EmptyTool);
        }

        if let Some(target) = spec.target.as_deref() {
            validate_target(target)?;
        }

        let mut arguments = Vec::with_capacity(spec.arguments.len() + 2);
        for raw in &spec.arguments {
            arguments.push(validate_argument(raw)?);
        }

        if let Some(target) = spec.target.as_deref() {
            append_target(&spec.tool, &mut arguments, target);
        }

        Ok(FinalCommand {
            executable: spec.tool.clone(),
            arguments,
            requires_root: spec.requires_root,
            risk_level: spec.risk_level,
            explanation: explanation.to_string(),
        })
    }
}

/// Dangerous-character screen plus shape check, in that order
///
/// The raw string is screened before any shape matching so that a target
/// like "192.168.1.1; rm -rf /" is refused for the injection attempt, not
/// for its shape.
fn validate_target(target: &str) -> std::result::Result<(), RejectReason> {
    for ch in target.chars() {
        if ch == '\0' {
            return Err(RejectReason::DangerousTarget(ch));
        }
        if DANGEROUS_CHARS.contains(&ch) {
            return Err(RejectReason::DangerousTarget(ch));
        }
    }

    if classify_target(target).is_none() {
        return Err(RejectReason::InvalidTarget(target.to_string()));
    }

    Ok(())
}

/// Validate and normalize a single argument token
fn validate_argument(raw: &str) -> std::result::Result<String, RejectReason> {
    let arg = raw.trim();
    if arg.is_empty() {
        return Err(RejectReason::EmptyArgument);
    }

    // One layer of surrounding matching quotes, a common classifier artifact
    let arg = if (arg.starts_with('"') && arg.ends_with('"') && arg.len() >= 2)
        || (arg.starts_with('\'') && arg.ends_with('\'') && arg.len() >= 2)
    {
        arg[1..arg.len() - 1].trim()
    } else {
        arg
    };

    if arg.is_empty() {
        return Err(RejectReason::EmptyArgument);
    }
    if arg.len() > MAX_ARG_LENGTH {
        return Err(RejectReason::ArgumentTooLong);
    }
    if arg.chars().any(|c| c.is_control()) {
        return Err(RejectReason::ControlCharacter);
    }

    // Braces are legal only as the exact {target} marker
    let without_placeholder = arg.replace(TARGET_PLACEHOLDER, "");
    for ch in without_placeholder.chars() {
        if DANGEROUS_CHARS.contains(&ch) {
            return Err(RejectReason::DangerousArgument(ch));
        }
    }

    Ok(arg.to_string())
}

/// Insert the target according to the tool's convention
///
/// URL/host flag tools get the target through their flag unless the flag
/// is already present; everything else takes it positionally at the end.
fn append_target(tool: &str, arguments: &mut Vec<String>, target: &str) {
    match tool {
        "gobuster" | "nikto" => {
            let has_flag = arguments.iter().any(|a| a == "-u" || a == "-h");
            if !has_flag {
                let flag = if tool == "gobuster" { "-u" } else { "-h" };
                arguments.push(flag.to_string());
                arguments.push(target.to_string());
            }
        }
        _ => arguments.push(target.to_string()),
    }
}

/// Validate a port specification: single port, list, range, mixed, or the
/// bare "-" all-ports wildcard
pub fn validate_port_range(ports: &str) -> std::result::Result<(), RejectReason> {
    if ports == "-" {
        return Ok(());
    }

    if !PORT_PATTERN.is_match(ports) {
        return Err(RejectReason::InvalidPorts(ports.to_string()));
    }

    for part in ports.split(',') {
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .parse()
                .map_err(|_| RejectReason::InvalidPorts(ports.to_string()))?;
            let end: u32 = end
                .parse()
                .map_err(|_| RejectReason::InvalidPorts(ports.to_string()))?;
            if start > end || end > 65535 {
                return Err(RejectReason::InvalidPorts(ports.to_string()));
            }
        } else {
            let port: u32 = part
                .parse()
                .map_err(|_| RejectReason::InvalidPorts(ports.to_string()))?;
            if port > 65535 {
                return Err(RejectReason::InvalidPorts(ports.to_string()));
            }
        }
    }

    Ok(())
}
