//! CNI configuration the operator renders into attachment definitions

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use crate::k8s::sriov::SriovNetworkSpec;

pub const CNI_VERSION: &str = "0.3.1";

/// Keys whose value depends on the operator release
const IGNORED_KEYS: [&str; 2] = ["cniVersion", "name"];

/// The sriov CNI config expected for a SriovNetwork
pub fn expected_cni_config(name: &str, spec: &SriovNetworkSpec) -> Result<Value> {
    let mut config = Map::new();
    config.insert("cniVersion".into(), json!(CNI_VERSION));
    config.insert("name".into(), json!(name));
    config.insert("type".into(), json!("sriov"));
    config.insert("vlan".into(), json!(spec.vlan));

    if matches!(spec.spoof_chk.as_str(), "on" | "off") {
        config.insert("spoofchk".into(), json!(spec.spoof_chk));
    }
    if matches!(spec.trust.as_str(), "on" | "off") {
        config.insert("trust".into(), json!(spec.trust));
    }
    if matches!(spec.link_state.as_str(), "auto" | "enable" | "disable") {
        config.insert("link_state".into(), json!(spec.link_state));
    }

    config.insert("vlanQoS".into(), json!(spec.vlan_qos));

    if let Some(rate) = spec.max_tx_rate {
        config.insert("max_tx_rate".into(), json!(rate));
    }
    if let Some(rate) = spec.min_tx_rate {
        config.insert("min_tx_rate".into(), json!(rate));
    }

    let ipam = if spec.ipam.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&spec.ipam).context("Invalid IPAM configuration")?
    };
    config.insert("ipam".into(), ipam);

    Ok(Value::Object(config))
}

/// Differences between the expected config and the rendered one
pub fn config_mismatches(expected: &Value, rendered: &str) -> Result<Vec<String>> {
    let rendered: Value =
        serde_json::from_str(rendered.trim()).context("Rendered CNI config is not valid JSON")?;
    let rendered = rendered
        .as_object()
        .context("Rendered CNI config is not an object")?;
    let expected = expected
        .as_object()
        .context("Expected CNI config is not an object")?;

    let mut mismatches = Vec::new();
    for (key, want) in expected {
        if IGNORED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match rendered.get(key) {
            Some(got) if got == want => {}
            Some(got) => mismatches.push(format!("{key}: expected {want}, got {got}")),
            None => mismatches.push(format!("{key}: expected {want}, missing")),
        }
    }
    for (key, got) in rendered {
        if !IGNORED_KEYS.contains(&key.as_str()) && !expected.contains_key(key) {
            mismatches.push(format!("{key}: not requested, got {got}"));
        }
    }
    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPAM: &str = r#"{"type":"host-local","subnet":"10.56.217.0/24","rangeStart":"10.56.217.171","rangeEnd":"10.56.217.181","routes":[{"dst":"0.0.0.0/0"}],"gateway":"10.56.217.1"}"#;

    fn spec() -> SriovNetworkSpec {
        SriovNetworkSpec {
            resource_name: "resource_1".to_string(),
            ipam: IPAM.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_expected_config_with_vlan() {
        let config = expected_cni_config("test-0", &SriovNetworkSpec { vlan: 100, ..spec() }).unwrap();

        assert_eq!(config["type"], "sriov");
        assert_eq!(config["vlan"], 100);
        assert_eq!(config["vlanQoS"], 0);
        assert_eq!(config["ipam"]["subnet"], "10.56.217.0/24");
        assert!(config.get("spoofchk").is_none());
        assert!(config.get("trust").is_none());
    }

    #[test]
    fn test_expected_config_flags() {
        let config = expected_cni_config(
            "test-2",
            &SriovNetworkSpec {
                spoof_chk: "on".to_string(),
                trust: "off".to_string(),
                link_state: "auto".to_string(),
                max_tx_rate: Some(100),
                ..spec()
            },
        )
        .unwrap();

        assert_eq!(config["spoofchk"], "on");
        assert_eq!(config["trust"], "off");
        assert_eq!(config["link_state"], "auto");
        assert_eq!(config["max_tx_rate"], 100);
        assert!(config.get("min_tx_rate").is_none());
    }

    #[test]
    fn test_unknown_flag_values_are_not_rendered() {
        let config = expected_cni_config(
            "net",
            &SriovNetworkSpec {
                link_state: "sometimes".to_string(),
                ..spec()
            },
        )
        .unwrap();
        assert!(config.get("link_state").is_none());
    }

    #[test]
    fn test_rendered_config_matches_despite_formatting() {
        let expected = expected_cni_config("test-0", &SriovNetworkSpec { vlan: 100, ..spec() }).unwrap();
        let rendered = format!(
            r#"{{ "cniVersion":"0.3.1", "name":"sriov-net", "type":"sriov", "vlan":100,"vlanQoS":0,"ipam":{IPAM} }}"#
        );

        assert!(config_mismatches(&expected, &rendered).unwrap().is_empty());
    }

    #[test]
    fn test_rendered_config_mismatch_reported() {
        let expected = expected_cni_config(
            "test-3",
            &SriovNetworkSpec {
                trust: "on".to_string(),
                ..spec()
            },
        )
        .unwrap();
        let rendered = format!(r#"{{"type":"sriov","vlan":0,"vlanQoS":0,"ipam":{IPAM}}}"#);

        let mismatches = config_mismatches(&expected, &rendered).unwrap();
        assert_eq!(mismatches, vec![r#"trust: expected "on", missing"#.to_string()]);
    }

    #[test]
    fn test_unrequested_flags_reported() {
        let expected = expected_cni_config("test-0", &SriovNetworkSpec { vlan: 100, ..spec() }).unwrap();
        let rendered = format!(
            r#"{{"cniVersion":"0.3.1","name":"test-0","type":"sriov","vlan":100,"spoofchk":"off","trust":"on","vlanQoS":0,"ipam":{IPAM}}}"#
        );

        let mismatches = config_mismatches(&expected, &rendered).unwrap();
        assert_eq!(
            mismatches,
            vec![
                r#"spoofchk: not requested, got "off""#.to_string(),
                r#"trust: not requested, got "on""#.to_string(),
            ]
        );
    }

    #[test]
    fn test_invalid_ipam() {
        let err = expected_cni_config(
            "net",
            &SriovNetworkSpec {
                ipam: "{".to_string(),
                ..spec()
            },
        );
        assert!(err.is_err());
    }
}
