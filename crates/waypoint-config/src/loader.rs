use std::collections::HashSet;
use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if router tunables are out of range or the
    /// registry is empty or contains duplicate identifiers
    pub fn validate(&self) -> anyhow::Result<()> {
        self.router.validate().map_err(|e| anyhow::anyhow!(e))?;
        self.validate_registry()?;

        if self.mcp.connect_timeout.is_zero() || self.mcp.call_timeout.is_zero() {
            anyhow::bail!("mcp timeouts must be greater than zero");
        }

        if self.router.preload_count > self.router.cache_max_size {
            tracing::warn!(
                preload_count = self.router.preload_count,
                cache_max_size = self.router.cache_max_size,
                "preload_count exceeds cache_max_size, only the most used servers will be kept"
            );
        }

        Ok(())
    }

    /// Ensure every registry entry is addressable and unique
    fn validate_registry(&self) -> anyhow::Result<()> {
        if self.registry.is_empty() {
            anyhow::bail!("at least one [[registry]] entry must be configured");
        }

        let mut seen = HashSet::new();
        for entry in &self.registry {
            if entry.id.trim().is_empty() {
                anyhow::bail!("registry entries must have a non-empty id");
            }
            if entry.description.trim().is_empty() {
                anyhow::bail!("registry entry '{}' must have a description", entry.id);
            }
            if !seen.insert(entry.id.as_str()) {
                anyhow::bail!("duplicate registry id '{}'", entry.id);
            }
        }

        Ok(())
    }
}
