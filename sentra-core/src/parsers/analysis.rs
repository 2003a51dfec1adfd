//! Shared analysis helpers for tool-output parsers
//!
//! CVE extraction, risk scoring, service version parsing, and banner
//! analysis used across the nmap-family parsers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::store::Severity;

#[allow(clippy::expect_used)] // Static initialization with hardcoded regex - panic is appropriate
static CVE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").expect("Hardcoded CVE regex pattern should be valid"));

#[allow(clippy::expect_used)]
static CVSS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"CVSS[:\s]+(\d{1,2}(?:\.\d)?)")
        .expect("Hardcoded CVSS regex pattern should be valid")
});

/// CVE ids, CVSS score, and severity extracted from vulnerability text
#[derive(Debug, Clone, PartialEq)]
pub struct CveInfo {
    pub cve_ids: Vec<String>,
    pub cvss_score: Option<f64>,
    pub severity: Severity,
}

/// Extract CVE ids, CVSS score, and a severity estimate from free text
///
/// The CVSS score, when present, decides severity; otherwise severity
/// keywords in the text do.
pub fn extract_cve_info(text: &str) -> CveInfo {
    let mut cve_ids: Vec<String> = CVE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    cve_ids.dedup();

    let cvss_score = CVSS_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|score| (0.0..=10.0).contains(score));

    let severity = match cvss_score {
        Some(score) if score >= 9.0 => Severity::Critical,
        Some(score) if score >= 7.0 => Severity::High,
        Some(score) if score >= 4.0 => Severity::Medium,
        Some(_) => Severity::Low,
        None => severity_from_keywords(text),
    };

    CveInfo {
        cve_ids,
        cvss_score,
        severity,
    }
}

fn severity_from_keywords(text: &str) -> Severity {
    let lower = text.to_lowercase();
    if lower.contains("critical") {
        Severity::Critical
    } else if lower.contains("high") {
        Severity::High
    } else if lower.contains("medium") {
        Severity::Medium
    } else if lower.contains("low") {
        Severity::Low
    } else {
        Severity::Medium
    }
}

/// Risk score: severity weight scaled by parse confidence, rounded to two
/// decimal places
pub fn risk_score(confidence: f64, severity: Severity) -> f64 {
    let raw = confidence.clamp(0.0, 1.0) * severity.weight();
    (raw * 100.0).round() / 100.0
}

/// Product/version split of an nmap VERSION column
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceVersion {
    pub product: Option<String>,
    pub version: Option<String>,
    pub extra_info: Option<String>,
}

/// Parse a service version string like "OpenSSH 8.2p1 Ubuntu 4ubuntu0.5"
///
/// The product is the first token, the version the first token starting
/// with a digit, and anything after the version is extra info.
pub fn parse_service_version(version_string: &str) -> ServiceVersion {
    let tokens: Vec<&str> = version_string.split_whitespace().collect();
    if tokens.is_empty() {
        return ServiceVersion {
            product: None,
            version: None,
            extra_info: None,
        };
    }

    let product = Some(tokens[0].to_string());
    let version_idx = tokens
        .iter()
        .position(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()));

    match version_idx {
        Some(idx) => {
            let rest = tokens[idx + 1..].join(" ");
            ServiceVersion {
                product,
                version: Some(tokens[idx].to_string()),
                extra_info: if rest.is_empty() { None } else { Some(rest) },
            }
        }
        None => ServiceVersion {
            product,
            version: None,
            extra_info: None,
        },
    }
}

/// Service type and OS hints recovered from a raw banner
#[derive(Debug, Clone, PartialEq)]
pub struct BannerInfo {
    pub service_type: Option<String>,
    pub os_hints: Vec<String>,
}

const OS_MARKERS: [&str; 7] = [
    "Ubuntu", "Debian", "CentOS", "Red Hat", "Windows", "FreeBSD", "Alpine",
];

/// Analyze a service banner for protocol type and OS hints
pub fn analyze_banner(banner: &str) -> BannerInfo {
    let lower = banner.to_lowercase();

    let service_type = if lower.starts_with("ssh-") || lower.contains("openssh") {
        Some("ssh".to_string())
    } else if lower.starts_with("220") || lower.contains("ftp") {
        Some("ftp".to_string())
    } else if lower.contains("smtp") {
        Some("smtp".to_string())
    } else if lower.contains("http") {
        Some("http".to_string())
    } else {
        None
    };

    let os_hints = OS_MARKERS
        .iter()
        .filter(|marker| banner.contains(*marker))
        .map(|marker| marker.to_string())
        .collect();

    BannerInfo {
        service_type,
        os_hints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cve_extraction_with_cvss() {
        let info = extract_cve_info("CVE-2021-44228 Log4Shell vulnerability CVSS: 10.0");
        assert_eq!(info.cve_ids, vec!["CVE-2021-44228"]);
        assert_eq!(info.cvss_score, Some(10.0));
        assert_eq!(info.severity, Severity::Critical);
    }

    #[test]
    fn test_cve_extraction_multiple_ids() {
        let info = extract_cve_info(
            "Multiple vulnerabilities: CVE-2019-11510, CVE-2019-11539 CVSS: 8.5",
        );
        assert_eq!(info.cve_ids, vec!["CVE-2019-11510", "CVE-2019-11539"]);
        assert_eq!(info.cvss_score, Some(8.5));
        assert_eq!(info.severity, Severity::High);
    }

    #[test]
    fn test_severity_from_keywords_without_cvss() {
        let info = extract_cve_info("SSL vulnerability detected (medium severity)");
        assert!(info.cve_ids.is_empty());
        assert_eq!(info.cvss_score, None);
        assert_eq!(info.severity, Severity::Medium);

        let info = extract_cve_info("Critical security issue found");
        assert_eq!(info.severity, Severity::Critical);
    }

    #[test]
    fn test_risk_score_table() {
        assert!((risk_score(1.0, Severity::Critical) - 10.0).abs() < f64::EPSILON);
        assert!((risk_score(0.9, Severity::High) - 7.65).abs() < f64::EPSILON);
        assert!((risk_score(0.8, Severity::Medium) - 4.8).abs() < f64::EPSILON);
        assert!((risk_score(1.0, Severity::Low) - 3.0).abs() < f64::EPSILON);
        assert!((risk_score(0.5, Severity::Critical) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_service_version() {
        let v = parse_service_version("OpenSSH 8.2p1 Ubuntu 4ubuntu0.5");
        assert_eq!(v.product.as_deref(), Some("OpenSSH"));
        assert_eq!(v.version.as_deref(), Some("8.2p1"));
        assert_eq!(v.extra_info.as_deref(), Some("Ubuntu 4ubuntu0.5"));

        let v = parse_service_version("Apache httpd 2.4.41");
        assert_eq!(v.product.as_deref(), Some("Apache"));
        assert_eq!(v.version.as_deref(), Some("2.4.41"));
        assert_eq!(v.extra_info, None);

        let v = parse_service_version("nginx 1.18.0");
        assert_eq!(v.product.as_deref(), Some("nginx"));
        assert_eq!(v.version.as_deref(), Some("1.18.0"));

        let v = parse_service_version("MySQL 5.7.33-0ubuntu0.18.04.1");
        assert_eq!(v.version.as_deref(), Some("5.7.33-0ubuntu0.18.04.1"));
    }

    #[test]
    fn test_parse_service_version_no_digits() {
        let v = parse_service_version("tcpwrapped");
        assert_eq!(v.product.as_deref(), Some("tcpwrapped"));
        assert_eq!(v.version, None);
        assert_eq!(v.extra_info, None);
    }

    #[test]
    fn test_analyze_banner() {
        let info = analyze_banner("SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5");
        assert_eq!(info.service_type.as_deref(), Some("ssh"));
        assert!(info.os_hints.contains(&"Ubuntu".to_string()));

        let info = analyze_banner("220 ProFTPD 1.3.5 Server (Debian)");
        assert_eq!(info.service_type.as_deref(), Some("ftp"));
        assert!(info.os_hints.contains(&"Debian".to_string()));

        let info = analyze_banner("HTTP/1.1 200 OK\r\nServer: nginx/1.18.0 (Ubuntu)");
        assert_eq!(info.service_type.as_deref(), Some("http"));
        assert!(info.os_hints.contains(&"Ubuntu".to_string()));
    }

    #[test]
    fn test_analyze_banner_unknown() {
        let info = analyze_banner("garbled bytes");
        assert_eq!(info.service_type, None);
        assert!(info.os_hints.is_empty());
    }
}
