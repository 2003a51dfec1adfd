//! Integration tests for the intent -> policy -> registry -> builder pipeline

use std::collections::HashMap;

use sentra_core::command::CommandBuilder;
use sentra_core::intent::{Intent, IntentType};
use sentra_core::policy::{PolicyDecision, PolicyGate};
use sentra_core::registry::ToolRegistry;

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_port_scan_pipeline_produces_expected_command() {
    let tools = ToolRegistry::new();
    let gate = PolicyGate::new(true).expect("should build gate");
    let builder = CommandBuilder::new();

    let intent = Intent::new(IntentType::PortScan)
        .with_target("192.168.1.1")
        .with_param("ports", "22,80,443");

    assert!(gate.check(intent.intent_type, &tools).allowed());

    let spec = tools
        .build_tool_spec(
            intent.intent_type,
            intent.target.as_deref(),
            &intent.params,
        )
        .expect("port_scan has a registered tool");
    assert!(spec.requires_root);

    let command = builder
        .build(&spec, "TCP SYN port scan")
        .expect("valid target should build");

    assert_eq!(command.executable, "nmap");
    let args = command.arguments.join(" ");
    assert!(args.contains("-sS"));
    assert!(args.contains("-p 22,80,443"));
    assert!(command.requires_root);
    // Target lands at the end for nmap-style tools
    assert_eq!(command.arguments.last().map(String::as_str), Some("192.168.1.1"));
}

#[test]
fn test_injection_attempt_is_rejected_end_to_end() {
    let tools = ToolRegistry::new();
    let builder = CommandBuilder::new();

    let spec = tools
        .build_tool_spec(
            IntentType::HostDiscovery,
            Some("192.168.1.1; rm -rf /"),
            &HashMap::new(),
        )
        .expect("spec still assembles; validation is the builder's job");

    let result = builder.build(&spec, "");
    assert!(result.is_err(), "dangerous target must never build");
}

#[test]
fn test_locked_policy_blocks_exploit_intents_end_to_end() {
    let tools = ToolRegistry::new();
    let gate = PolicyGate::new(true).expect("should build gate");

    for intent in [
        IntentType::SqlInjection,
        IntentType::BruteForceSsh,
        IntentType::BruteForceHttp,
    ] {
        let decision = gate.check(intent, &tools);
        assert!(
            matches!(decision, PolicyDecision::Deny(_)),
            "{} must be denied by the locked policy",
            intent
        );
    }
}

#[test]
fn test_disabled_gate_passes_everything() {
    let tools = ToolRegistry::new();
    let gate = PolicyGate::new(false).expect("should build gate");

    for intent in IntentType::ALL {
        assert_eq!(gate.check(intent, &tools), PolicyDecision::Allow);
    }
}

#[test]
fn test_informational_intents_produce_no_command() {
    let tools = ToolRegistry::new();
    for intent in [IntentType::InfoQuery, IntentType::Unknown] {
        assert!(tools
            .build_tool_spec(intent, Some("example.com"), &HashMap::new())
            .is_none());
    }
}

#[test]
fn test_web_enum_pipeline_uses_url_flag() {
    let tools = ToolRegistry::new();
    let builder = CommandBuilder::new();

    let spec = tools
        .build_tool_spec(
            IntentType::WebDirEnum,
            Some("http://example.com"),
            &params(&[("extensions", "php,txt")]),
        )
        .expect("web_dir_enum has a registered tool");

    let command = builder.build(&spec, "").expect("should build");
    let args = command.arguments.join(" ");
    assert!(args.starts_with("dir"));
    assert!(args.contains("-x php,txt"));
    assert!(args.contains("-u http://example.com"));
}

#[test]
fn test_classifier_json_round_trip_through_pipeline() {
    let json = r#"{
        "intent_type": "service_detection",
        "target": "10.0.0.5",
        "params": {"ports": "1-1024"},
        "needs_clarification": false,
        "clarification_reason": null
    }"#;
    let intent: Intent = serde_json::from_str(json).expect("classifier contract parses");

    let tools = ToolRegistry::new();
    let spec = tools
        .build_tool_spec(intent.intent_type, intent.target.as_deref(), &intent.params)
        .expect("should resolve");
    let command = CommandBuilder::new()
        .build(&spec, "")
        .expect("should build");

    assert_eq!(command.executable, "nmap");
    assert!(!command.requires_root);
    assert!(command.arguments.join(" ").contains("--version-intensity 5"));
}
