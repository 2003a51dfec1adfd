//! Canonical entity identifiers
//!
//! Every parser derives ids through these functions so that the same
//! real-world object always maps to the same row. Ids are hierarchical:
//! a port id embeds its host id, a service id embeds its port id, and a
//! vulnerability id embeds its service id. Unbounded keys (URLs, file
//! paths) are folded through a fixed 8-hex digest to keep ids bounded.

use sha2::{Digest, Sha256};

/// First 8 hex characters of a SHA-256 digest over the input
fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Canonical host id from an IP address
///
/// `192.168.1.10` -> `host_192_168_1_10`
pub fn host_id(ip: &str) -> String {
    let normalized = ip.replace(['.', ':'], "_");
    format!("host_{}", normalized)
}

/// Canonical port id
///
/// `192.168.1.10:80/tcp` -> `host_192_168_1_10_port_80_tcp`
pub fn port_id(ip: &str, port: u16, protocol: &str) -> String {
    format!("{}_port_{}_{}", host_id(ip), port, protocol.to_lowercase())
}

/// Canonical service id
///
/// `host_..._port_80_tcp` + `http` -> `host_..._port_80_tcp_service_http`
pub fn service_id(port_id: &str, service_name: &str) -> String {
    let normalized = service_name.to_lowercase().replace(' ', "_");
    format!("{}_service_{}", port_id, normalized)
}

/// Canonical vulnerability id from a CVE id or vulnerability type
///
/// `CVE-2024-1234` -> `..._vuln_cve_2024_1234`
pub fn vuln_id(service_id: &str, cve_or_type: &str) -> String {
    let normalized = cve_or_type.to_lowercase().replace('-', "_");
    format!("{}_vuln_{}", service_id, normalized)
}

/// Canonical web resource id; the URL is folded through a short hash
pub fn web_resource_id(service_id: &str, url: &str) -> String {
    let normalized = url.to_lowercase();
    let normalized = normalized.trim_end_matches('/');
    format!("{}_web_hash_{}", service_id, short_hash(normalized))
}

/// Canonical DNS id from a domain name
///
/// `example.com` -> `dns_example_com`
pub fn dns_id(domain: &str) -> String {
    let normalized = domain.to_lowercase().replace('.', "_");
    format!("dns_{}", normalized)
}

/// Canonical certificate id from a fingerprint
///
/// `AB:CD:EF...` -> `cert_abcdef...`
pub fn cert_id(fingerprint: &str) -> String {
    let normalized = fingerprint.to_lowercase().replace(':', "");
    format!("cert_{}", normalized)
}

/// Canonical credential id; the secret itself never enters the id
pub fn credential_id(username: &str, service_id: &str) -> String {
    format!("cred_{}_{}", username.to_lowercase(), service_id)
}

/// Canonical file id; the path is folded through a short hash
pub fn file_id(host_id: &str, file_path: &str) -> String {
    format!("file_{}_hash_{}", host_id, short_hash(file_path))
}
