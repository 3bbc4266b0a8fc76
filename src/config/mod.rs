use aipfilter::dsl::ParserConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings read from an optional YAML file and `AIPFILTER_*` environment
/// variables. Command-line flags take precedence over both.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub parser: ParserConfig,
    pub format: OutputFormat,
    pub stats: bool,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load with `env` standing in for the process environment when given.
    fn load_with_env(
        path: Option<&Path>,
        env: Option<::config::Map<String, String>>,
    ) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        // AIPFILTER_FORMAT, AIPFILTER_PARSER__MAX_DEPTH, ...
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("AIPFILTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Canonical filter text
    #[default]
    Text,
    /// Rust debug tree, with positions
    Ast,
    /// JSON, one document per line
    Json,
    /// YAML documents
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.parser, ParserConfig::default());
        assert_eq!(config.format, OutputFormat::Text);
        assert!(!config.stats);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "format: json\nstats: true\nparser:\n  max_depth: 8").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.stats);
        assert_eq!(config.parser.max_depth, 8);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "format: yaml").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.format, OutputFormat::Yaml);
        assert_eq!(config.parser, ParserConfig::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "format: yaml\nparser:\n  max_depth: 8").unwrap();

        let env = ::config::Map::from_iter([
            ("AIPFILTER_FORMAT".to_string(), "json".to_string()),
            ("AIPFILTER_STATS".to_string(), "true".to_string()),
            ("AIPFILTER_PARSER__MAX_DEPTH".to_string(), "4".to_string()),
            ("OTHER_FORMAT".to_string(), "ast".to_string()),
        ]);
        let config = AppConfig::load_with_env(Some(file.path()), Some(env)).unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.stats);
        assert_eq!(config.parser.max_depth, 4);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/aipfilter.yaml"))).is_err());
    }
}
