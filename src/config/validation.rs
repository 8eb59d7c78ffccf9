//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one node
/// - Parseable "host:port" node addresses
/// - Non-zero agent ports
/// - No duplicate node addresses
/// - A sane poll interval and log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.nodes.is_empty() {
        errors.push("at least one node must be defined".to_string());
    }

    let mut addresses = HashSet::new();

    for node in &config.nodes {
        match split_host_port(&node.address) {
            Ok(_) => {}
            Err(e) => errors.push(format!("invalid node address '{}': {}", node.address, e)),
        }

        if node.resource_monitor_agent_port == 0 {
            errors.push(format!(
                "node '{}' has resource monitor agent port 0",
                node.address
            ));
        }

        if !addresses.insert(node.address.as_str()) {
            errors.push(format!("duplicate node address: {}", node.address));
        }
    }

    if config.rma_query_interval.is_zero() {
        errors.push("resource_monitoring_agent_query_interval must be greater than zero".to_string());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Split a "host:port" string, validating both halves.
pub fn split_host_port(address: &str) -> Result<(&str, u16), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| "missing ':' separator".to_string())?;

    if host.is_empty() {
        return Err("empty host".to_string());
    }

    let port: u16 = port.parse().map_err(|_| format!("invalid port '{}'", port))?;
    if port == 0 {
        return Err("port 0 is not routable".to_string());
    }

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, NodeConfig};
    use std::time::Duration;

    fn minimal_config() -> Config {
        Config {
            service_name: "test".to_string(),
            sticky_connections: false,
            rma_query_interval: Duration::from_secs(5),
            nodes: vec![NodeConfig {
                address: "127.0.0.1:9000".to_string(),
                resource_monitor_agent_port: 9500,
                max_connections: 100,
            }],
            global: GlobalConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&minimal_config()).is_ok());
    }

    #[test]
    fn test_empty_pool() {
        let mut config = minimal_config();
        config.nodes.clear();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("at least one node"));
    }

    #[test]
    fn test_bad_address() {
        let mut config = minimal_config();
        config.nodes[0].address = "no-port-here".to_string();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("invalid node address"));
    }

    #[test]
    fn test_duplicate_address() {
        let mut config = minimal_config();
        let duplicate = config.nodes[0].clone();
        config.nodes.push(duplicate);
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("duplicate node address"));
    }

    #[test]
    fn test_zero_agent_port() {
        let mut config = minimal_config();
        config.nodes[0].resource_monitor_agent_port = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("agent port 0"));
    }

    #[test]
    fn test_zero_interval() {
        let mut config = minimal_config();
        config.rma_query_interval = Duration::ZERO;
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("query_interval"));
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = minimal_config();
        config.global.log_level = "verbose".to_string();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("invalid log level"));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("10.0.0.1:9000").unwrap(), ("10.0.0.1", 9000));
        assert_eq!(split_host_port("backend.local:80").unwrap(), ("backend.local", 80));
        assert!(split_host_port("no-separator").is_err());
        assert!(split_host_port(":9000").is_err());
        assert!(split_host_port("host:notaport").is_err());
        assert!(split_host_port("host:0").is_err());
    }
}
