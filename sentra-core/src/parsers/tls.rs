//! Parser for TLS handshake summaries (nmap ssl-cert / ssl-enum-ciphers)

use super::analysis::risk_score;
use super::{OutputParser, ParseError, ParseResult};
use crate::store::{Entity, Severity};

/// Protocols old enough to report as a weakness
const WEAK_PROTOCOLS: [&str; 3] = ["SSLv3", "TLSv1.0", "TLSv1.1"];

/// Parser for nmap TLS script output
///
/// Builds the host/port/service chain from the scan header, a certificate
/// entity from the ssl-cert block, and a weak-protocol vulnerability when
/// ssl-enum-ciphers lists a deprecated protocol version.
pub struct TlsScanParser;

impl OutputParser for TlsScanParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut entities: Vec<Entity> = Vec::new();
        let mut current_ip: Option<String> = None;
        let mut service_id: Option<String> = None;

        let mut subject: Option<String> = None;
        let mut issuer: Option<String> = None;
        let mut not_after: Option<String> = None;
        let mut fingerprint: Option<String> = None;
        let mut weak_protocols: Vec<String> = Vec::new();

        for line in output.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with("Nmap scan report for") {
                current_ip = trimmed
                    .strip_prefix("Nmap scan report for ")
                    .and_then(|rest| rest.trim().rsplit(' ').next())
                    .map(|addr| addr.trim_matches(|c| c == '(' || c == ')').to_string());
                continue;
            }

            // Port line establishes the service the certificate belongs to
            if let Some(ip) = current_ip.clone() {
                let mut parts = trimmed.split_whitespace();
                if let (Some(port_proto), Some("open")) = (parts.next(), parts.next()) {
                    if let Some((port, proto)) = port_proto.split_once('/') {
                        if let Ok(port_num) = port.parse::<u16>() {
                            let service_name = parts.next().unwrap_or("https");
                            entities.push(Entity::host(&ip));
                            let port_entity = Entity::port(&ip, port_num, proto);
                            let port_id = port_entity.id.clone();
                            entities.push(port_entity);
                            let service = Entity::service(&port_id, service_name);
                            service_id = Some(service.id.clone());
                            entities.push(service);
                            continue;
                        }
                    }
                }
            }

            let content = trimmed
                .trim_start_matches('|')
                .trim_start_matches('_')
                .trim();

            if let Some(value) = content.strip_prefix("ssl-cert: Subject:") {
                subject = first_common_name(value);
            } else if let Some(value) = content.strip_prefix("Subject:") {
                if subject.is_none() {
                    subject = first_common_name(value);
                }
            } else if let Some(value) = content.strip_prefix("Issuer:") {
                issuer = first_common_name(value);
            } else if let Some(value) = content.strip_prefix("Not valid after:") {
                not_after = Some(value.trim().to_string());
            } else if let Some(value) = content.strip_prefix("SHA-1:") {
                fingerprint = Some(value.trim().replace(' ', ""));
            } else {
                for proto in WEAK_PROTOCOLS {
                    if content.starts_with(proto) {
                        let name = proto.to_string();
                        if !weak_protocols.contains(&name) {
                            weak_protocols.push(name);
                        }
                    }
                }
            }
        }

        // The certificate is keyed on its fingerprint; fall back to the
        // subject CN when the scan didn't print one
        let cert_key = fingerprint.clone().or_else(|| subject.clone());
        let Some(cert_key) = cert_key else {
            return Err(ParseError::NoData(
                "no certificate found in TLS output".to_string(),
            ));
        };

        let mut cert = Entity::certificate(&cert_key);
        if let Some(subject) = subject {
            cert = cert.with_subject(subject);
        }
        if let Some(issuer) = issuer {
            cert = cert.with_issuer(issuer);
        }
        if let Some(not_after) = not_after {
            cert = cert.with_not_after(not_after);
        }
        entities.push(cert);

        if let Some(service_id) = service_id.as_deref() {
            for proto in &weak_protocols {
                let reference = format!("weak_protocol_{}", proto.to_lowercase().replace('.', "_"));
                entities.push(
                    Entity::vulnerability(service_id, &reference, Severity::Medium)
                        .with_description(format!("Server accepts deprecated protocol {}", proto))
                        .with_risk_score(risk_score(1.0, Severity::Medium)),
                );
            }
        }

        Ok(entities)
    }
}

/// Pull the commonName value out of an "x=y/x=y" distinguished name
fn first_common_name(dn: &str) -> Option<String> {
    let dn = dn.trim();
    for part in dn.split('/') {
        if let Some(value) = part.trim().strip_prefix("commonName=") {
            return Some(value.trim().to_string());
        }
    }
    // Already a bare name
    if dn.is_empty() {
        None
    } else {
        Some(dn.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::store::{EntityData, EntityType};

    const TLS_OUTPUT: &str = "\
Nmap scan report for example.com (93.184.216.34)
PORT    STATE SERVICE
443/tcp open  https
| ssl-cert: Subject: commonName=example.com/organizationName=Example Corp
| Issuer: commonName=DigiCert TLS RSA SHA256 2020 CA1
| Not valid before: 2023-01-13T00:00:00
| Not valid after:  2024-02-13T23:59:59
| SHA-1: 1234 5678 9abc def0 1234 5678 9abc def0 1234 5678
| ssl-enum-ciphers:
|   TLSv1.0:
|     least strength: C
|   TLSv1.2:
|_    least strength: A
";

    #[test]
    fn test_certificate_entity() {
        let entities = TlsScanParser.parse(TLS_OUTPUT).unwrap();

        let cert = entities
            .iter()
            .find(|e| e.entity_type() == EntityType::Certificate)
            .expect("certificate entity");

        if let EntityData::Certificate {
            fingerprint,
            subject,
            issuer,
            not_after,
            ..
        } = &cert.data
        {
            assert_eq!(fingerprint, "123456789abcdef0123456789abcdef012345678");
            assert_eq!(subject.as_deref(), Some("example.com"));
            assert_eq!(
                issuer.as_deref(),
                Some("DigiCert TLS RSA SHA256 2020 CA1")
            );
            assert_eq!(not_after.as_deref(), Some("2024-02-13T23:59:59"));
        } else {
            panic!("expected certificate data");
        }

        assert_eq!(cert.id, "cert_123456789abcdef0123456789abcdef012345678");
    }

    #[test]
    fn test_weak_protocol_vulnerability() {
        let entities = TlsScanParser.parse(TLS_OUTPUT).unwrap();

        let vuln = entities
            .iter()
            .find(|e| e.entity_type() == EntityType::Vulnerability)
            .expect("weak protocol vulnerability");
        assert!(vuln.id.contains("weak_protocol_tlsv1_0"));

        // TLSv1.2 is fine and must not be flagged
        let vuln_count = entities
            .iter()
            .filter(|e| e.entity_type() == EntityType::Vulnerability)
            .count();
        assert_eq!(vuln_count, 1);
    }

    #[test]
    fn test_service_chain_present() {
        let entities = TlsScanParser.parse(TLS_OUTPUT).unwrap();
        assert!(entities.iter().any(|e| e.entity_type() == EntityType::Host));
        assert!(entities.iter().any(|e| e.id.ends_with("_port_443_tcp")));
        assert!(entities.iter().any(|e| e.id.ends_with("_service_https")));
    }

    #[test]
    fn test_no_certificate_is_typed_failure() {
        let output = "Nmap scan report for example.com\n443/tcp open https\n";
        assert!(matches!(
            TlsScanParser.parse(output),
            Err(ParseError::NoData(_))
        ));
    }
}
