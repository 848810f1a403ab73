use clap::Parser;
use kubvernor_translator::Configuration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    #[arg(long)]
    with_config_file: String,
}

fn init_tracing_logging(configuration: &Configuration) -> Option<WorkerGuard> {
    let console_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()));
    let console_layer = fmt::layer()
        .event_format(fmt::format().compact())
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(console_filter);

    match &configuration.log_file {
        Some(log_file) => {
            let file_appender = tracing_appender::rolling::never(".", log_file);
            let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
            let file_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_FILE_LOG").unwrap_or_else(|_| "debug".to_owned()));
            let file_layer = fmt::layer()
                .with_writer(non_blocking_appender)
                .with_span_events(FmtSpan::NONE)
                .with_target(true)
                .with_ansi(false)
                .with_filter(filter::filter_fn(|meta| !meta.is_span()))
                .with_filter(file_filter);
            Registry::default().with(console_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            Registry::default().with(console_layer).init();
            None
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> kubvernor_translator::Result<()> {
    let args = CommandArgs::parse();
    let configuration: Configuration = serde_yaml::from_str(&std::fs::read_to_string(args.with_config_file)?)?;
    let _guard = init_tracing_logging(&configuration);

    configuration.validate()?;
    kubvernor_translator::start(configuration).await
}
