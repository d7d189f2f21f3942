use crate::config::{merge_env, PipelineConfig, StageConf};
use crate::registry::{FilterBuilder, Registry, SinkBuilder, SourceBuilder, StageKind};
use crate::stage::{Filter, Sink, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use log::debug;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Default size of the buffer between the end of the chain and the sink.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// A fully constructed but not yet linked chain: one source, zero or more ordered filters, one
/// sink. Created once per run and consumed by [`Pipeline::run`].
pub struct Pipeline {
    source: Source,
    filters: Vec<(String, Box<dyn Filter>)>,
    sink: Box<dyn Sink>,
    buffer_size: usize,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "filters",
                &self.filters.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build a new pipeline from the config file at the given path, resolving every stage type
    /// through the registry.
    ///
    /// All stage names are resolved before any stage is constructed, so an unknown type name in
    /// any slot fails the whole chain without side effects. Stages are then constructed in
    /// source, sink, filter order, each from its own environment-merged configuration.
    /// Constructor failures are propagated with the failing stage identified.
    pub fn new(path: &Path, registry: &Registry) -> PipeResult<Pipeline> {
        let conf = PipelineConfig::load(path)?;
        Pipeline::assemble(conf, registry)
    }

    /// Use a custom buffer size for the copy into the sink.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Pipeline {
        self.buffer_size = buffer_size;
        self
    }

    fn assemble(conf: PipelineConfig, registry: &Registry) -> PipeResult<Pipeline> {
        // resolution pass: every name must be known before anything is constructed
        let source_builder: SourceBuilder = *registry.source(&conf.input.kind).ok_or_else(|| {
            PipeError::new_msg(
                PipeErrorKind::UnknownStage(StageKind::Source, conf.input.kind.clone()),
                "no such input type registered".to_string(),
            )
        })?;
        let sink_builder: SinkBuilder = *registry.sink(&conf.output.kind).ok_or_else(|| {
            PipeError::new_msg(
                PipeErrorKind::UnknownStage(StageKind::Sink, conf.output.kind.clone()),
                "no such output type registered".to_string(),
            )
        })?;

        let mut filter_descs: Vec<(String, StageConf, FilterBuilder)> = Vec::new();
        let mut prefix = "FILTER_".to_string();
        let mut node = conf.filters.as_ref();
        while let Some(desc) = node {
            if desc.stage.kind.is_empty() {
                break;
            }
            let builder = *registry.filter(&desc.stage.kind).ok_or_else(|| {
                PipeError::new_msg(
                    PipeErrorKind::UnknownStage(StageKind::Filter, desc.stage.kind.clone()),
                    "no such filter type registered".to_string(),
                )
            })?;
            filter_descs.push((
                desc.stage.kind.clone(),
                merge_env(&prefix, desc.stage.config.clone()),
                builder,
            ));
            prefix.push_str("FILTER_");
            node = desc.next.as_deref();
        }

        // construction pass
        let source = source_builder(&merge_env("INPUT_", conf.input.config)).map_err(|e| {
            PipeError::new(
                PipeErrorKind::Construct(StageKind::Source, conf.input.kind.clone()),
                Box::new(e),
            )
        })?;
        let sink = sink_builder(&merge_env("OUTPUT_", conf.output.config)).map_err(|e| {
            PipeError::new(
                PipeErrorKind::Construct(StageKind::Sink, conf.output.kind.clone()),
                Box::new(e),
            )
        })?;

        let mut filters = Vec::with_capacity(filter_descs.len());
        for (name, stage_conf, builder) in filter_descs {
            debug!("constructing filter {}", name);
            let filter = builder(&stage_conf).map_err(|e| {
                PipeError::new(
                    PipeErrorKind::Construct(StageKind::Filter, name.clone()),
                    Box::new(e),
                )
            })?;
            filters.push((name, filter));
        }

        Ok(Pipeline {
            source,
            filters,
            sink,
            buffer_size: DEFAULT_BUFFER_SIZE,
        })
    }

    /// Drive the pipeline to completion and return the total amount of bytes moved into the sink.
    ///
    /// Filters are linked strictly in source to sink order before any byte flows; a link failure
    /// aborts the run immediately. After linking, bytes are pulled from the end of the chain
    /// through a bounded buffer into the sink, which is then flushed and closed. Each failure
    /// mode carries its own error kind so callers can tell a linking failure from a streaming,
    /// flush or close failure.
    pub fn run(self) -> PipeResult<u64> {
        let mut last: Source = self.source;
        for (name, mut filter) in self.filters {
            debug!("linking filter {}", name);
            filter
                .link(last)
                .map_err(|e| PipeError::new(PipeErrorKind::Link(name.clone()), Box::new(e)))?;
            last = Box::new(filter);
        }

        let mut out = BufWriter::with_capacity(self.buffer_size, self.sink);
        let total = io::copy(&mut last, &mut out)
            .map_err(|e| PipeError::new_io(PipeErrorKind::Stream, e))?;
        debug!("copied {} bytes", total);
        out.flush()
            .map_err(|e| PipeError::new_io(PipeErrorKind::Flush, e))?;
        let mut sink = out
            .into_inner()
            .map_err(|e| PipeError::new_io(PipeErrorKind::Flush, e.into_error()))?;
        sink.close()
            .map_err(|e| PipeError::new(PipeErrorKind::Close, Box::new(e)))?;
        debug!("pipeline closed");
        Ok(total)
    }
}
