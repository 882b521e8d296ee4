use serde::{Deserialize, Serialize};

/// Configuration for the API surface assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriberConfig {
    /// Display name attached to the assembled `ApiDescription`.
    pub api_name: String,
    /// When set, the emitted description is limited to properties accessible
    /// to these group names (the well-known all/reflexive groups always
    /// qualify). Entities whose property list filters down to empty are
    /// dropped from the description.
    pub limit_group_names: Option<Vec<String>>,
}

impl Default for DescriberConfig {
    fn default() -> Self {
        Self {
            api_name: "API".to_string(),
            limit_group_names: None,
        }
    }
}

impl DescriberConfig {
    /// Load configuration from defaults, an optional `descpack` config file
    /// and `DESCPACK_`-prefixed environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&DescriberConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("descpack").required(false));

        // Add environment variables with prefix "DESCPACK_"
        config = config.add_source(
            config::Environment::with_prefix("DESCPACK")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let describer_config: DescriberConfig = config.try_deserialize()?;

        Ok(describer_config)
    }

    pub fn with_api_name(mut self, api_name: &str) -> Self {
        self.api_name = api_name.to_string();
        self
    }

    pub fn with_limit_groups(mut self, groups: &[&str]) -> Self {
        self.limit_group_names = Some(groups.iter().map(|g| g.to_string()).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_sources() {
        let config = DescriberConfig::default();
        assert_eq!(config.api_name, "API");
        assert!(config.limit_group_names.is_none());
    }

    #[test]
    fn builders_override_defaults() {
        let config = DescriberConfig::default()
            .with_api_name("Demo API")
            .with_limit_groups(&["admin"]);
        assert_eq!(config.api_name, "Demo API");
        assert_eq!(
            config.limit_group_names,
            Some(vec!["admin".to_string()])
        );
    }
}
