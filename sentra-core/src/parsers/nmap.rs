//! Parsers for the nmap tool family
//!
//! All four share the same scan shape: a "Nmap scan report for" line sets
//! the current-host cursor, and subsequent port/script lines attach to it.

use once_cell::sync::Lazy;
use regex::Regex;

use super::analysis::{extract_cve_info, parse_service_version, risk_score};
use super::{OutputParser, ParseError, ParseResult};
use crate::store::{Entity, EntityData};

#[allow(clippy::expect_used)] // Static initialization with hardcoded regex - panic is appropriate
static PORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,5})/(tcp|udp)\s+(\S+)\s*(\S*)\s*(.*)$")
        .expect("Hardcoded port line regex pattern should be valid")
});

/// Extract the address from a "Nmap scan report for" line
///
/// Handles both "report for 10.0.0.1" and "report for name (10.0.0.1)".
fn scan_report_address(line: &str) -> Option<String> {
    let rest = line.strip_prefix("Nmap scan report for ")?.trim();
    let addr = rest
        .rsplit(' ')
        .next()?
        .trim_matches(|c| c == '(' || c == ')');
    if addr.is_empty() {
        None
    } else {
        Some(addr.to_string())
    }
}

/// Parser for `nmap -sn` ping sweep output
pub struct PingSweepParser;

impl OutputParser for PingSweepParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let mut current_ip: Option<String> = None;

        for line in output.lines() {
            let line = line.trim();

            if line.starts_with("Nmap scan report for") {
                current_ip = scan_report_address(line);
            } else if line.starts_with("Host is up") {
                if let Some(ip) = current_ip.take() {
                    entities.push(Entity::host(&ip));
                }
            }
        }

        if entities.is_empty() {
            return Err(ParseError::NoData(
                "no alive hosts found in ping sweep output".to_string(),
            ));
        }

        Ok(entities)
    }
}

/// Parser for nmap port scan output (`-sS`/`-sT`)
pub struct PortScanParser;

impl OutputParser for PortScanParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let entities = scan_ports(output, false);

        if entities.is_empty() {
            return Err(ParseError::NoData(
                "no open ports found in scan output".to_string(),
            ));
        }

        Ok(entities)
    }
}

/// Parser for `nmap -sV` service/version detection output
///
/// Also understands the `OS details:` line emitted by `-O`, so it doubles
/// as the OS-detection parser.
pub struct ServiceDetectionParser;

impl OutputParser for ServiceDetectionParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let entities = scan_ports(output, true);

        if entities.is_empty() {
            return Err(ParseError::NoData(
                "no services found in detection output".to_string(),
            ));
        }

        Ok(entities)
    }
}

/// Single-pass port table scan shared by the port and service parsers
fn scan_ports(output: &str, with_versions: bool) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    let mut current_ip: Option<String> = None;
    let mut host_index: Option<usize> = None;

    for line in output.lines() {
        let line = line.trim();

        if line.starts_with("Nmap scan report for") {
            current_ip = scan_report_address(line);
            host_index = None;
            continue;
        }

        if let Some(ip) = current_ip.clone() {
            if line.starts_with("OS details:") {
                if let (Some(idx), Some(os)) = (host_index, line.strip_prefix("OS details:")) {
                    if let EntityData::Host { os_type, .. } = &mut entities[idx].data {
                        *os_type = Some(os.trim().to_string());
                    }
                }
                continue;
            }

            let Some(caps) = PORT_LINE.captures(line) else {
                continue;
            };
            let state = &caps[3];
            if state != "open" {
                continue;
            }
            let Ok(port_num) = caps[1].parse::<u16>() else {
                continue;
            };
            let protocol = caps[2].to_string();

            // First open port creates the host entity for this cursor
            if host_index.is_none() {
                entities.push(Entity::host(&ip));
                host_index = Some(entities.len() - 1);
            }

            let port = Entity::port(&ip, port_num, &protocol).with_state(state);
            let port_id = port.id.clone();
            entities.push(port);

            let service_name = caps.get(4).map(|m| m.as_str()).unwrap_or("");
            if !service_name.is_empty() && service_name != "unknown" {
                let mut service = Entity::service(&port_id, service_name);

                if with_versions {
                    let version_column = caps.get(5).map(|m| m.as_str().trim()).unwrap_or("");
                    if !version_column.is_empty() {
                        let parsed = parse_service_version(version_column);
                        service = service.with_version(version_column);
                        if let Some(product) = parsed.product {
                            service =
                                service.with_extra("product", serde_json::json!(product));
                        }
                        if let Some(extra_info) = parsed.extra_info {
                            service =
                                service.with_extra("extra_info", serde_json::json!(extra_info));
                        }
                    }
                }

                entities.push(service);
            }
        }
    }

    entities
}

/// Parser for `nmap --script vuln` output
///
/// NSE results appear as `|`-prefixed blocks under the port they belong
/// to; a block mentioning VULNERABLE becomes a vulnerability entity with
/// CVE ids, CVSS score, and a computed risk score.
pub struct VulnScanParser;

impl OutputParser for VulnScanParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut entities: Vec<Entity> = Vec::new();
        let mut current_ip: Option<String> = None;
        let mut current_service_id: Option<String> = None;
        let mut host_emitted = false;

        let mut script_name: Option<String> = None;
        let mut block_lines: Vec<String> = Vec::new();
        let mut found_vuln = false;

        for line in output.lines() {
            let trimmed = line.trim();

            if let Some(stripped) = trimmed.strip_prefix('|') {
                let content = stripped.trim_start_matches('_').trim();
                // The first pipe line of a block is "script-name:"
                if script_name.is_none() && content.ends_with(':') && !content.contains(' ') {
                    script_name = Some(content.trim_end_matches(':').to_string());
                } else {
                    block_lines.push(content.to_string());
                }
                continue;
            }

            // Leaving a script block
            found_vuln |= flush_script_block(
                &mut entities,
                current_service_id.as_deref(),
                script_name.take(),
                &block_lines,
            );
            block_lines.clear();

            if trimmed.starts_with("Nmap scan report for") {
                current_ip = scan_report_address(trimmed);
                current_service_id = None;
                host_emitted = false;
                continue;
            }

            if let Some(ip) = current_ip.clone() {
                if let Some(caps) = PORT_LINE.captures(trimmed) {
                    if &caps[3] == "open" {
                        if let Ok(port_num) = caps[1].parse::<u16>() {
                            if !host_emitted {
                                entities.push(Entity::host(&ip));
                                host_emitted = true;
                            }
                            let port = Entity::port(&ip, port_num, &caps[2]);
                            let port_id = port.id.clone();
                            entities.push(port);

                            let service_name = caps.get(4).map(|m| m.as_str()).unwrap_or("");
                            let service_name = if service_name.is_empty() {
                                "unknown"
                            } else {
                                service_name
                            };
                            let service = Entity::service(&port_id, service_name);
                            current_service_id = Some(service.id.clone());
                            entities.push(service);
                        }
                    }
                }
            }
        }

        found_vuln |= flush_script_block(
            &mut entities,
            current_service_id.as_deref(),
            script_name.take(),
            &block_lines,
        );

        if !found_vuln {
            return Err(ParseError::NoData(
                "no vulnerabilities found in script output".to_string(),
            ));
        }

        Ok(entities)
    }
}

/// Turn a completed NSE script block into a vulnerability entity if it
/// reports a VULNERABLE state
fn flush_script_block(
    entities: &mut Vec<Entity>,
    service_id: Option<&str>,
    script: Option<String>,
    lines: &[String],
) -> bool {
    let (Some(service_id), Some(script)) = (service_id, script) else {
        return false;
    };

    let text = lines.join("\n");
    if !text.contains("VULNERABLE") {
        return false;
    }

    let info = extract_cve_info(&text);
    let reference = info
        .cve_ids
        .first()
        .cloned()
        .unwrap_or_else(|| script.clone());
    let confidence = 0.9;
    let description = lines
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty() && !l.starts_with("State:") && *l != "VULNERABLE:")
        .unwrap_or(script.as_str())
        .to_string();

    let mut vuln = Entity::vulnerability(service_id, &reference, info.severity)
        .with_confidence(confidence)
        .with_description(description)
        .with_risk_score(risk_score(confidence, info.severity))
        .with_extra("script", serde_json::json!(script));
    if !info.cve_ids.is_empty() {
        vuln = vuln.with_cves(info.cve_ids.clone());
    }
    if let Some(score) = info.cvss_score {
        vuln = vuln.with_cvss(score);
    }
    entities.push(vuln);
    true
}
