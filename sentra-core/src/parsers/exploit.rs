//! Parsers for credential and injection tooling: hydra and sqlmap

use once_cell::sync::Lazy;
use regex::Regex;

use super::web::split_url;
use super::{OutputParser, ParseError, ParseResult};
use crate::store::{Entity, Severity};

#[allow(clippy::expect_used)] // Static initialization with hardcoded regex - panic is appropriate
static HYDRA_HIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d{1,5})\]\[([a-z0-9-]+)\]\s+host:\s+(\S+)\s+login:\s+(\S+)\s+password:\s+(\S+)")
        .expect("Hardcoded hydra hit regex pattern should be valid")
});

#[allow(clippy::expect_used)]
static URL_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[^\s'\x22]+")
        .expect("Hardcoded URL regex pattern should be valid")
});

#[allow(clippy::expect_used)]
static SQLMAP_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Parameter:\s+(\S+)\s+\((GET|POST|PUT|Cookie|URI)\)")
        .expect("Hardcoded sqlmap parameter regex pattern should be valid")
});

/// Parser for hydra credential brute-force output
///
/// Each `[port][service] host: ... login: ... password: ...` hit becomes a
/// credential entity under the service it was found on.
pub struct HydraParser;

impl OutputParser for HydraParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let mut seen_services: Vec<String> = Vec::new();

        for line in output.lines() {
            let Some(caps) = HYDRA_HIT.captures(line.trim()) else {
                continue;
            };
            let Ok(port_num) = caps[1].parse::<u16>() else {
                continue;
            };
            let service_name = caps[2].to_string();
            let host = caps[3].to_string();
            let login = caps[4].to_string();
            let password = caps[5].to_string();

            let port = Entity::port(&host, port_num, "tcp");
            let port_id = port.id.clone();
            let service = Entity::service(&port_id, &service_name);
            let service_id = service.id.clone();

            if !seen_services.contains(&service_id) {
                entities.push(Entity::host(&host));
                entities.push(port);
                entities.push(service);
                seen_services.push(service_id.clone());
            }

            entities.push(
                Entity::credential(&login, &service_id)
                    .with_extra("password", serde_json::json!(password)),
            );
        }

        if entities.is_empty() {
            return Err(ParseError::NoData(
                "no valid credentials found in output".to_string(),
            ));
        }

        Ok(entities)
    }
}

/// Parser for sqlmap output
///
/// Confirmed injection points ("Parameter: x (GET)" blocks) become
/// exploitable vulnerability entities on the target URL's service.
pub struct SqlmapParser;

impl OutputParser for SqlmapParser {
    fn parse(&self, output: &str) -> ParseResult<Vec<Entity>> {
        let url = URL_IN_TEXT
            .find(output)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ParseError::NoData("no target URL found in sqlmap output".to_string())
            })?;
        let parts = split_url(&url).ok_or_else(|| {
            ParseError::NoData(format!("unparseable target URL in sqlmap output: {}", url))
        })?;

        let mut params: Vec<(String, String)> = Vec::new();
        let mut current_param: Option<String> = None;
        let mut current_types: Vec<String> = Vec::new();
        let mut dbms: Option<String> = None;

        for line in output.lines() {
            let trimmed = line.trim();

            if let Some(caps) = SQLMAP_PARAM.captures(trimmed) {
                if let Some(param) = current_param.take() {
                    params.push((param, current_types.join(", ")));
                    current_types.clear();
                }
                current_param = Some(format!("{}_{}", &caps[1], caps[2].to_lowercase()));
            } else if let Some(injection_type) = trimmed.strip_prefix("Type:") {
                current_types.push(injection_type.trim().to_string());
            } else if let Some(value) = trimmed
                .strip_prefix("back-end DBMS:")
                .or_else(|| trimmed.split_once("the back-end DBMS is").map(|(_, v)| v))
            {
                dbms = Some(value.trim().to_string());
            }
        }
        if let Some(param) = current_param.take() {
            params.push((param, current_types.join(", ")));
        }

        if params.is_empty() {
            return Err(ParseError::NoData(
                "no injection points found in sqlmap output".to_string(),
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

        for (param, types) in params {
            let reference = format!("sqli_{}", param);
            let mut vuln = Entity::vulnerability(&service_id, &reference, Severity::High)
                .with_exploitable(true)
                .with_description(format!("SQL injection in parameter {}", param))
                .with_extra("url", serde_json::json!(url.clone()));
            if !types.is_empty() {
                vuln = vuln.with_extra("injection_types", serde_json::json!(types));
            }
            if let Some(dbms) = dbms.clone() {
                vuln = vuln.with_extra("dbms", serde_json::json!(dbms));
            }
            entities.push(vuln);
        }

        Ok(entities)
    }
}
