//! Parsers for web enumeration output: gobuster dir and nikto

use once_cell::sync::Lazy;
use regex::Regex;

use super::analysis::{parse_service_version, risk_score};
use super::{OutputParser, ParseError, ParseResult};
use crate::store::{Entity, Severity};

#[allow(clippy::expect_used)] // Static initialization with hardcoded regex - panic is appropriate
static DIR_HIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(/\S*)\s+\(Status:\s*(\d{3})\)(?:\s*\[Size:\s*(\d+)\])?")
        .expect("Hardcoded gobuster hit regex pattern should be valid")
});

/// Base URL split into the pieces the identity chain needs
pub(super) struct UrlParts {
    pub(super) scheme: String,
    pub(super) host: String,
    pub(super) port: u16,
}

pub(super) fn split_url(url: &str) -> Option<UrlParts> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let authority = rest.split('/').next()?;
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (authority, if scheme == "https" { 443 } else { 80 }),
    };
    if host.is_empty() {
        return None;
    }
    Some(UrlParts {
        scheme: scheme.to_string(),
        host: host.to_string(),
        port,
    })
}

/// Parser for gobuster dir output
///
/// The banner's `Url:` line supplies the base the discovered paths hang
/// off; each hit line becomes a web resource under the site's service.
pub struct DirEnumParser;

impl OutputParser for DirEnumParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut base: Option<(String, UrlParts)> = None;
        let mut hits: Vec<(String, u16, Option<u64>)> = Vec::new();

        for line in output.lines() {
            let line = line.trim();

            if base.is_none() {
                if let Some(idx) = line.find("Url:") {
                    let url = line[idx + 4..].trim().trim_end_matches('/').to_string();
                    if let Some(parts) = split_url(&url) {
                        base = Some((url, parts));
                    }
                    continue;
                }
            }

            if let Some(caps) = DIR_HIT.captures(line) {
                let path = caps[1].to_string();
                let Ok(status) = caps[2].parse::<u16>() else {
                    continue;
                };
                let size = caps.get(3).and_then(|m| m.as_str().parse().ok());
                hits.push((path, status, size));
            }
        }

        let Some((base_url, parts)) = base else {
            return Err(ParseError::NoData(
                "no target URL found in directory scan output".to_string(),
            ));
        };
        if hits.is_empty() {
            return Err(ParseError::NoData(
                "no paths found in directory scan output".to_string(),
            ));
        }

        let mut entities = Vec::new();
        entities.push(Entity::host(&parts.host));
        let port = Entity::port(&parts.host, parts.port, "tcp");
        let port_id = port.id.clone();
        entities.push(port);
        let service = Entity::service(&port_id, &parts.scheme);
        let service_id = service.id.clone();
        entities.push(service);

        for (path, status, size) in hits {
            let url = format!("{}{}", base_url, path);
            let mut resource = Entity::web_resource(&service_id, &url).with_status_code(status);
            if let Some(size) = size {
                resource = resource.with_size(size);
            }
            entities.push(resource);
        }

        Ok(entities)
    }
}

/// Parser for nikto web scan output
///
/// `+ Target ...` banner lines establish the host/port/service chain;
/// finding lines become web resources, and OSVDB-tagged ones additionally
/// become low-severity vulnerabilities.
pub struct NiktoScanParser;

impl OutputParser for NiktoScanParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut target_ip: Option<String> = None;
        let mut hostname: Option<String> = None;
        let mut port: u16 = 80;
        let mut server: Option<String> = None;
        let mut findings: Vec<(Option<String>, String, String)> = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix('+') else {
                continue;
            };
            let rest = rest.trim();

            if let Some(value) = rest.strip_prefix("Target IP:") {
                target_ip = Some(value.trim().to_string());
            } else if let Some(value) = rest.strip_prefix("Target Hostname:") {
                hostname = Some(value.trim().to_string());
            } else if let Some(value) = rest.strip_prefix("Target Port:") {
                if let Ok(parsed) = value.trim().parse() {
                    port = parsed;
                }
            } else if let Some(value) = rest.strip_prefix("Server:") {
                server = Some(value.trim().to_string());
            } else if let Some(osvdb_rest) = rest.strip_prefix("OSVDB-") {
                // "+ OSVDB-3233: /icons/README: Apache default file found."
                if let Some((id, tail)) = osvdb_rest.split_once(':') {
                    if let Some((path, description)) = tail.trim().split_once(':') {
                        findings.push((
                            Some(format!("osvdb_{}", id.trim())),
                            path.trim().to_string(),
                            description.trim().to_string(),
                        ));
                    }
                }
            } else if rest.starts_with('/') {
                // "+ /admin/: Directory indexing found."
                if let Some((path, description)) = rest.split_once(':') {
                    findings.push((
                        None,
                        path.trim().to_string(),
                        description.trim().to_string(),
                    ));
                }
            }
        }

        let Some(ip) = target_ip else {
            return Err(ParseError::NoData(
                "no target information in scan output".to_string(),
            ));
        };
        if findings.is_empty() {
            return Err(ParseError::NoData(
                "no findings in scan output".to_string(),
            ));
        }

        let scheme = if port == 443 { "https" } else { "http" };
        let mut entities = Vec::new();

        let mut host = Entity::host(&ip);
        if let Some(hostname) = hostname.clone() {
            host = host.with_hostname(hostname);
        }
        entities.push(host);

        let port_entity = Entity::port(&ip, port, "tcp");
        let port_id = port_entity.id.clone();
        entities.push(port_entity);

        let mut service = Entity::service(&port_id, scheme);
        if let Some(server) = server {
            let parsed = parse_service_version(&server);
            service = service.with_banner(server);
            if let Some(product) = parsed.product {
                service = service.with_extra("product", serde_json::json!(product));
            }
        }
        let service_id = service.id.clone();
        entities.push(service);

        let site = hostname.unwrap_or(ip);
        for (reference, path, description) in findings {
            let url = format!("{}://{}:{}{}", scheme, site, port, path);
            entities.push(
                Entity::web_resource(&service_id, &url)
                    .with_extra("note", serde_json::json!(description.clone())),
            );

            if let Some(reference) = reference {
                entities.push(
                    Entity::vulnerability(&service_id, &reference, Severity::Low)
                        .with_description(description)
                        .with_risk_score(risk_score(0.8, Severity::Low)),
                );
            }
        }

        Ok(entities)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::store::{EntityData, EntityType};

    const GOBUSTER_OUTPUT: &str = "\
===============================================================
Gobuster v3.6
===============================================================
[+] Url:                     http://192.168.1.10
[+] Method:                  GET
[+] Wordlist:                /usr/share/wordlists/dirb/common.txt
===============================================================
/admin                (Status: 301) [Size: 313]
/images               (Status: 200) [Size: 1234]
/server-status        (Status: 403)
===============================================================
";

    #[test]
    fn test_dir_enum_resources() {
        let entities = DirEnumParser.parse(GOBUSTER_OUTPUT).unwrap();

        let resources: Vec<_> = entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::WebResource)
            .collect();
        assert_eq!(resources.len(), 3);

        if let EntityData::WebResource {
            url,
            status_code,
            size,
            ..
        } = &resources[0].data
        {
            assert_eq!(url, "http://192.168.1.10/admin");
            assert_eq!(*status_code, Some(301));
            assert_eq!(*size, Some(313));
        } else {
            panic!("expected web resource data");
        }

        // Third hit has no size column
        if let EntityData::WebResource { size, .. } = &resources[2].data {
            assert_eq!(*size, None);
        } else {
            panic!("expected web resource data");
        }
    }

    #[test]
    fn test_dir_enum_service_chain() {
        let entities = DirEnumParser.parse(GOBUSTER_OUTPUT).unwrap();
        assert_eq!(entities[0].id, "host_192_168_1_10");
        assert_eq!(entities[1].id, "host_192_168_1_10_port_80_tcp");
        assert_eq!(
            entities[2].id,
            "host_192_168_1_10_port_80_tcp_service_http"
        );
    }

    #[test]
    fn test_dir_enum_https_port_from_scheme() {
        let output = "\
[+] Url: https://example.com
/admin (Status: 200) [Size: 1]
";
        let entities = DirEnumParser.parse(output).unwrap();
        assert!(entities.iter().any(|e| e.id.contains("_port_443_tcp")));
    }

    #[test]
    fn test_dir_enum_no_hits_is_typed_failure() {
        let output = "[+] Url: http://192.168.1.10\nProgress: done\n";
        assert!(matches!(
            DirEnumParser.parse(output),
            Err(ParseError::NoData(_))
        ));
    }

    const NIKTO_OUTPUT: &str = "\
- Nikto v2.5.0
+ Target IP:          192.168.1.10
+ Target Hostname:    example.com
+ Target Port:        80
+ Server: Apache/2.4.41 (Ubuntu)
+ /admin/: Directory indexing found.
+ OSVDB-3233: /icons/README: Apache default file found.
+ 7915 requests: 0 error(s) and 2 item(s) reported
";

    #[test]
    fn test_nikto_findings() {
        let entities = NiktoScanParser.parse(NIKTO_OUTPUT).unwrap();

        let resources = entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::WebResource)
            .count();
        assert_eq!(resources, 2);

        let vuln = entities
            .iter()
            .find(|e| e.entity_type() == EntityType::Vulnerability)
            .expect("osvdb finding becomes a vulnerability");
        assert!(vuln.id.contains("_vuln_osvdb_3233"));
    }

    #[test]
    fn test_nikto_service_banner() {
        let entities = NiktoScanParser.parse(NIKTO_OUTPUT).unwrap();
        let service = entities
            .iter()
            .find(|e| e.entity_type() == EntityType::Service)
            .unwrap();
        if let EntityData::Service { banner, extra, .. } = &service.data {
            assert_eq!(banner.as_deref(), Some("Apache/2.4.41 (Ubuntu)"));
            assert_eq!(
                extra.get("product"),
                Some(&serde_json::json!("Apache/2.4.41"))
            );
        } else {
            panic!("expected service data");
        }
    }

    #[test]
    fn test_nikto_hostname_recorded() {
        let entities = NiktoScanParser.parse(NIKTO_OUTPUT).unwrap();
        if let EntityData::Host { hostname, .. } = &entities[0].data {
            assert_eq!(hostname.as_deref(), Some("example.com"));
        } else {
            panic!("expected host data");
        }
    }

    #[test]
    fn test_nikto_no_target_is_typed_failure() {
        assert!(matches!(
            NiktoScanParser.parse("- Nikto v2.5.0\n"),
            Err(ParseError::NoData(_))
        ));
    }
}
