//! `cadence config`: print the effective configuration.

use anyhow::{Context, Result};
use clap::Args;

use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {}

/// Render `config` as YAML, or pretty JSON in JSON mode.
pub fn render(config: &Config, json_mode: bool) -> Result<String> {
    if json_mode {
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")
    } else {
        serde_yaml::to_string(config).context("Failed to serialize configuration")
    }
}

pub fn execute(_args: ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    println!("{}", render(config, json_mode)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_render_roundtrips() {
        let mut config = Config::default();
        config.shadow.sampling_divisor = 25;

        let yaml = render(&config, false).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.shadow.sampling_divisor, 25);
        assert!(yaml.contains("stability_window: 3"));
    }

    #[test]
    fn test_json_render() {
        let json = render(&Config::default(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["orchestrator"]["max_workers"], 8);
        assert_eq!(value["storage"]["backend"], "memory");
    }
}
