use bytepipe::pipeline::Pipeline;
use bytepipe::registry::Registry;
use bytepipe::PipeResult;
use log::{error, info};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(about = "declarative streaming byte pipelines")]
/// Bytepipe
///
/// Runs one or more byte pipelines described by JSON config files: an input, an optional filter
/// chain and an output, streamed with bounded buffering. Pipelines run one after another in the
/// order their configs are given.
struct Opts {
    /// Path to a pipeline config file, may be repeated.
    #[structopt(
        name = "config",
        long,
        short,
        required = true,
        parse(from_os_str),
        number_of_values = 1
    )]
    configs: Vec<PathBuf>,
    /// Size in bytes of the write buffer in front of the output stage.
    #[structopt(name = "buffer-size", long, short, default_value = "1048576")]
    buffer_size: usize,
    /// Repeat the pipelines every given number of seconds instead of exiting after one pass.
    #[structopt(name = "interval", long, short = "l")]
    interval: Option<u64>,
}

fn main() {
    let opts = Opts::from_args();
    init_logging();

    if let Err(e) = run(&opts) {
        error!("running pipeline: {}", e);
        process::exit(1);
    }
}

fn run(opts: &Opts) -> PipeResult<()> {
    let registry = Registry::with_defaults();
    loop {
        // pipelines are rebuilt every pass, stages hold resources that don't survive a run
        for config in &opts.configs {
            let pipeline =
                Pipeline::new(config, &registry)?.with_buffer_size(opts.buffer_size);
            let copied = pipeline.run()?;
            info!("{}: piped {} bytes", config.display(), copied);
        }
        match opts.interval {
            Some(secs) => {
                info!("sleeping for {}s", secs);
                thread::sleep(Duration::from_secs(secs));
            }
            None => return Ok(()),
        }
    }
}

fn init_logging() {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S %Z)(local)}: {l} {m}{n}",
        )))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(
            Root::builder()
                .appender("stderr")
                .build(log::LevelFilter::Info),
        )
        // the config above is statically valid, failure here is fatal anyway
        .unwrap();
    log4rs::init_config(config).unwrap();
}
