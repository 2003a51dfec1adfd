//! Parsers for DNS-shaped output: nslookup, whois, and subdomain listings

use once_cell::sync::Lazy;
use regex::Regex;

use super::{OutputParser, ParseError, ParseResult};
use crate::store::Entity;

#[allow(clippy::expect_used)] // Static initialization with hardcoded regex - panic is appropriate
static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,3}\.){3}\d{1,3}$")
        .expect("Hardcoded IPv4 regex pattern should be valid")
});

/// Parser for nslookup output
///
/// Tracks the current `Name:` cursor; `Address:` lines before any name
/// belong to the resolver and are skipped.
pub struct DnsLookupParser;

impl OutputParser for DnsLookupParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let mut current_name: Option<String> = None;

        for line in output.lines() {
            let line = line.trim();

            if let Some(name) = line.strip_prefix("Name:") {
                current_name = Some(name.trim().to_string());
            } else if let Some(addr) = line
                .strip_prefix("Address:")
                .or_else(|| line.strip_prefix("Addresses:"))
            {
                let addr = addr.trim();
                // Resolver addresses carry a #port suffix and precede any Name:
                if addr.contains('#') {
                    continue;
                }
                if let Some(name) = current_name.as_deref() {
                    let record_type = if IPV4.is_match(addr) { "A" } else { "AAAA" };
                    entities.push(Entity::dns(name, record_type, addr));
                }
            }
        }

        if entities.is_empty() {
            return Err(ParseError::NoData(
                "no resolved records in lookup output".to_string(),
            ));
        }

        Ok(entities)
    }
}

/// Parser for whois output
///
/// Emits one record for the domain registration and one NS record per
/// listed name server.
pub struct WhoisParser;

impl OutputParser for WhoisParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut domain: Option<String> = None;
        let mut registrar: Option<String> = None;
        let mut name_servers: Vec<String> = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            let lower = line.to_lowercase();

            if let Some(value) = value_after(&lower, line, "domain name:") {
                if domain.is_none() {
                    domain = Some(value.to_lowercase());
                }
            } else if let Some(value) = value_after(&lower, line, "registrar:") {
                if registrar.is_none() {
                    registrar = Some(value);
                }
            } else if let Some(value) = value_after(&lower, line, "name server:") {
                let server = value.to_lowercase();
                if !name_servers.contains(&server) {
                    name_servers.push(server);
                }
            }
        }

        let Some(domain) = domain else {
            return Err(ParseError::NoData(
                "no domain registration found in whois output".to_string(),
            ));
        };

        let mut entities = Vec::new();
        let mut registration = Entity::dns(&domain, "WHOIS", registrar.as_deref().unwrap_or(""));
        if let Some(registrar) = registrar {
            registration = registration.with_extra("registrar", serde_json::json!(registrar));
        }
        entities.push(registration);

        for server in name_servers {
            entities.push(Entity::dns(&domain, "NS", &server).with_extra(
                "source",
                serde_json::json!("whois"),
            ));
        }

        Ok(entities)
    }
}

fn value_after(lower: &str, original: &str, prefix: &str) -> Option<String> {
    if lower.starts_with(prefix) {
        let value = original[prefix.len()..].trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    } else {
        None
    }
}

/// Parser for subdomain enumeration listings (gobuster dns)
///
/// `Found: sub.example.com` lines, optionally with a bracketed address
/// when the tool resolved the name.
pub struct SubdomainParser;

impl OutputParser for SubdomainParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut entities = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("Found:") else {
                continue;
            };
            let rest = rest.trim();

            let (name, address) = match rest.split_once('[') {
                Some((name, addr)) => (name.trim(), Some(addr.trim_end_matches(']').trim())),
                None => (rest, None),
            };
            if name.is_empty() {
                continue;
            }

            match address {
                Some(addr) if IPV4.is_match(addr) => {
                    entities.push(Entity::dns(name, "A", addr));
                }
                _ => {
                    entities.push(Entity::dns(name, "SUBDOMAIN", ""));
                }
            }
        }

        if entities.is_empty() {
            return Err(ParseError::NoData(
                "no subdomains found in enumeration output".to_string(),
            ));
        }

        Ok(entities)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::store::{EntityData, EntityType, RelationshipType};

    const NSLOOKUP_OUTPUT: &str = "\
Server:         192.168.1.1
Address:        192.168.1.1#53

Non-authoritative answer:
Name:   example.com
Address: 93.184.216.34
Name:   example.com
Address: 2606:2800:220:1:248:1893:25c8:1946
";

    #[test]
    fn test_nslookup_records() {
        let entities = DnsLookupParser.parse(NSLOOKUP_OUTPUT).unwrap();
        assert_eq!(entities.len(), 2);

        if let EntityData::Dns {
            domain,
            record_type,
            value,
            ..
        } = &entities[0].data
        {
            assert_eq!(domain, "example.com");
            assert_eq!(record_type, "A");
            assert_eq!(value, "93.184.216.34");
        } else {
            panic!("expected dns data");
        }

        if let EntityData::Dns { record_type, .. } = &entities[1].data {
            assert_eq!(record_type, "AAAA");
        } else {
            panic!("expected dns data");
        }
    }

    #[test]
    fn test_nslookup_resolver_address_skipped() {
        let output = "Server:  192.168.1.1\nAddress: 192.168.1.1#53\n";
        assert!(matches!(
            DnsLookupParser.parse(output),
            Err(ParseError::NoData(_))
        ));
    }

    #[test]
    fn test_nslookup_a_record_links_to_host() {
        let entities = DnsLookupParser.parse(NSLOOKUP_OUTPUT).unwrap();
        let (parent, rel) = entities[0].parent_link().unwrap();
        assert_eq!(parent, "host_93_184_216_34");
        assert_eq!(rel, RelationshipType::ResolvesTo);
    }

    const WHOIS_OUTPUT: &str = "\
   Domain Name: EXAMPLE.COM
   Registry Domain ID: 2336799_DOMAIN_COM-VRSN
   Registrar: RESERVED-Internet Assigned Numbers Authority
   Name Server: A.IANA-SERVERS.NET
   Name Server: B.IANA-SERVERS.NET
";

    #[test]
    fn test_whois_registration_and_nameservers() {
        let entities = WhoisParser.parse(WHOIS_OUTPUT).unwrap();
        assert_eq!(entities.len(), 3);
        assert!(entities.iter().all(|e| e.entity_type() == EntityType::Dns));

        if let EntityData::Dns {
            domain,
            record_type,
            extra,
            ..
        } = &entities[0].data
        {
            assert_eq!(domain, "example.com");
            assert_eq!(record_type, "WHOIS");
            assert!(extra
                .get("registrar")
                .and_then(|v| v.as_str())
                .unwrap()
                .contains("IANA"));
        } else {
            panic!("expected dns data");
        }

        let ns_values: Vec<&str> = entities[1..]
            .iter()
            .filter_map(|e| match &e.data {
                EntityData::Dns { value, .. } => Some(value.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ns_values, vec!["a.iana-servers.net", "b.iana-servers.net"]);
    }

    #[test]
    fn test_whois_no_domain_is_typed_failure() {
        assert!(matches!(
            WhoisParser.parse("No match for domain \"NOPE.INVALID\".\n"),
            Err(ParseError::NoData(_))
        ));
    }

    const GOBUSTER_DNS_OUTPUT: &str = "\
===============================================================
Gobuster v3.6
===============================================================
Found: mail.example.com
Found: www.example.com [93.184.216.34]
Found: vpn.example.com
===============================================================
";

    #[test]
    fn test_subdomain_listing() {
        let entities = SubdomainParser.parse(GOBUSTER_DNS_OUTPUT).unwrap();
        assert_eq!(entities.len(), 3);

        if let EntityData::Dns {
            domain,
            record_type,
            ..
        } = &entities[0].data
        {
            assert_eq!(domain, "mail.example.com");
            assert_eq!(record_type, "SUBDOMAIN");
        } else {
            panic!("expected dns data");
        }

        if let EntityData::Dns {
            record_type, value, ..
        } = &entities[1].data
        {
            assert_eq!(record_type, "A");
            assert_eq!(value, "93.184.216.34");
        } else {
            panic!("expected dns data");
        }
    }

    #[test]
    fn test_subdomain_empty_is_typed_failure() {
        assert!(matches!(
            SubdomainParser.parse("Gobuster v3.6\nProgress: 100%\n"),
            Err(ParseError::NoData(_))
        ));
    }
}
