use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Configuration keys are plain strings, scoped per stage.
pub type StageConf = HashMap<String, String>;

/// The full configuration for a single pipeline: one input, an optional chain of filters, and one
/// output. The filter chain is a singly linked list in the document itself, each node nesting the
/// next one, which keeps the filter order explicit in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// The source stage description.
    pub input: StageDesc,
    /// The first filter, if any. An absent field or an empty `type` means no filters.
    #[serde(default)]
    pub filters: Option<FilterDesc>,
    /// The sink stage description.
    pub output: StageDesc,
}

/// Description of a single stage: its registered type name and its private configuration map.
#[derive(Debug, Clone, Deserialize)]
pub struct StageDesc {
    /// Name under which the stage constructor is registered.
    #[serde(rename = "type")]
    pub kind: String,
    /// Stage scoped configuration keys.
    #[serde(default)]
    pub config: StageConf,
}

/// A node in the filter chain.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterDesc {
    /// The stage description of this filter.
    #[serde(flatten)]
    pub stage: StageDesc,
    /// The next filter downstream, if any.
    pub next: Option<Box<FilterDesc>>,
}

impl PipelineConfig {
    /// Load and parse a pipeline configuration from the JSON file at the given path.
    pub fn load(path: &Path) -> Result<PipelineConfig, ConfigError> {
        let data = fs::read(path)
            .map_err(|e| ConfigError::from(format!("couldn't read {:?}: {}", path, e)))?;
        serde_json::from_slice(&data)
            .map_err(|e| ConfigError::from(format!("couldn't parse {:?}: {}", path, e)))
    }
}

/// Merge process environment variables into a stage configuration. Every `PREFIX_KEY=VALUE`
/// environment entry sets `KEY` to `VALUE` in the map, overriding a file provided value. This lets
/// secrets (bucket credentials, key material) stay out of the config file.
pub fn merge_env(prefix: &str, conf: StageConf) -> StageConf {
    merge_vars(prefix, conf, std::env::vars())
}

fn merge_vars(
    prefix: &str,
    mut conf: StageConf,
    vars: impl IntoIterator<Item = (String, String)>,
) -> StageConf {
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(prefix) {
            conf.insert(stripped.to_string(), value);
        }
    }
    conf
}

/// An error in the pipeline configuration
#[derive(Debug)]
pub struct ConfigError {
    msg: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "config error: {}", self.msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<String> for ConfigError {
    fn from(s: String) -> Self {
        ConfigError { msg: s }
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_vars, PipelineConfig, StageConf};

    #[test]
    fn parse_full_chain() {
        let doc = r#"{
            "input": {"type": "file", "config": {"path": "/tmp/in"}},
            "filters": {"type": "gzip", "config": {}, "next": {"type": "rot13"}},
            "output": {"type": "stdout"}
        }"#;
        let conf: PipelineConfig = serde_json::from_str(doc).unwrap();
        assert_eq!(conf.input.kind, "file");
        assert_eq!(conf.input.config["path"], "/tmp/in");
        let first = conf.filters.unwrap();
        assert_eq!(first.stage.kind, "gzip");
        let second = first.next.unwrap();
        assert_eq!(second.stage.kind, "rot13");
        assert!(second.next.is_none());
        assert_eq!(conf.output.kind, "stdout");
        assert!(conf.output.config.is_empty());
    }

    #[test]
    fn parse_without_filters() {
        let doc = r#"{
            "input": {"type": "stdin"},
            "output": {"type": "discard"}
        }"#;
        let conf: PipelineConfig = serde_json::from_str(doc).unwrap();
        assert!(conf.filters.is_none());
    }

    // merge_vars is exercised directly: mutating the process environment would race against
    // every other test iterating it
    #[test]
    fn env_overrides_file_values() {
        let mut conf = StageConf::new();
        conf.insert("foo".to_string(), "bar".to_string());
        conf.insert("bla".to_string(), "blub".to_string());
        let env = vec![
            ("FILTER_bla".to_string(), "baz".to_string()),
            ("UNRELATED_bla".to_string(), "nope".to_string()),
        ];
        let conf = merge_vars("FILTER_", conf, env);
        assert_eq!(conf["foo"], "bar");
        assert_eq!(conf["bla"], "baz");
        assert_eq!(conf.len(), 2);
    }
}
