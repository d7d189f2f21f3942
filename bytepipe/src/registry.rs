use crate::adapter;
use crate::config::StageConf;
use crate::stage::{Filter, Sink, Source};
use crate::PipeResult;
use std::collections::HashMap;
use std::fmt;

/// Constructor for a source stage.
pub type SourceBuilder = fn(&StageConf) -> PipeResult<Source>;
/// Constructor for a filter stage.
pub type FilterBuilder = fn(&StageConf) -> PipeResult<Box<dyn Filter>>;
/// Constructor for a sink stage.
pub type SinkBuilder = fn(&StageConf) -> PipeResult<Box<dyn Sink>>;

/// The three independent stage namespaces. A type name may be registered in more than one
/// namespace with unrelated meanings (e.g. `file` is both a source and a sink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// A stage producing bytes.
    Source,
    /// A stage transforming bytes.
    Filter,
    /// A stage consuming bytes.
    Sink,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StageKind::Source => "input",
                StageKind::Filter => "filter",
                StageKind::Sink => "output",
            }
        )
    }
}

/// Name to constructor registry for every stage kind.
///
/// The registry is an explicit object rather than process global state, so construction order is
/// deterministic and tests can build private registries with doubles. Registering a name twice
/// silently replaces the earlier constructor, last registration wins.
pub struct Registry {
    sources: HashMap<&'static str, SourceBuilder>,
    filters: HashMap<&'static str, FilterBuilder>,
    sinks: HashMap<&'static str, SinkBuilder>,
}

impl Registry {
    /// Create a new, empty registry.
    pub fn new() -> Registry {
        Registry {
            sources: HashMap::new(),
            filters: HashMap::new(),
            sinks: HashMap::new(),
        }
    }

    /// Create a registry with every built-in adapter registered, in a fixed order.
    pub fn with_defaults() -> Registry {
        let mut registry = Registry::new();

        registry.register_source("file", adapter::file::new_source);
        registry.register_source("stdin", adapter::stdio::new_stdin);
        registry.register_source("command", adapter::command::new_source);
        registry.register_source("tar", adapter::tar::new_source);
        registry.register_source("docker", adapter::docker::new_source);
        registry.register_source("s3", adapter::s3::new_source);

        registry.register_filter("rot13", adapter::rot13::new);
        registry.register_filter("gzip", adapter::gzip::new_compress);
        registry.register_filter("gunzip", adapter::gzip::new_decompress);
        registry.register_filter("snappy", adapter::snappy::new_compress);
        registry.register_filter("unsnappy", adapter::snappy::new_decompress);
        registry.register_filter("pgp", adapter::pgp::new_encrypt);
        registry.register_filter("unpgp", adapter::pgp::new_decrypt);
        registry.register_filter("command", adapter::command::new_filter);

        registry.register_sink("file", adapter::file::new_sink);
        registry.register_sink("stdout", adapter::stdio::new_stdout);
        registry.register_sink("discard", adapter::stdio::new_discard);
        registry.register_sink("command", adapter::command::new_sink);
        registry.register_sink("untar", adapter::tar::new_sink);
        registry.register_sink("s3", adapter::s3::new_sink);

        registry
    }

    /// Register a source constructor under the given name.
    pub fn register_source(&mut self, name: &'static str, builder: SourceBuilder) {
        self.sources.insert(name, builder);
    }

    /// Register a filter constructor under the given name.
    pub fn register_filter(&mut self, name: &'static str, builder: FilterBuilder) {
        self.filters.insert(name, builder);
    }

    /// Register a sink constructor under the given name.
    pub fn register_sink(&mut self, name: &'static str, builder: SinkBuilder) {
        self.sinks.insert(name, builder);
    }

    /// Look up a source constructor by name.
    pub fn source(&self, name: &str) -> Option<&SourceBuilder> {
        self.sources.get(name)
    }

    /// Look up a filter constructor by name.
    pub fn filter(&self, name: &str) -> Option<&FilterBuilder> {
        self.filters.get(name)
    }

    /// Look up a sink constructor by name.
    pub fn sink(&self, name: &str) -> Option<&SinkBuilder> {
        self.sinks.get(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::with_defaults()
    }
}
