use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use type_pollution::agent::Agent;
use type_pollution::cli::Cli;
use type_pollution::demo;
use type_pollution::report::{ConsoleSink, FileSink, ReportSink};

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Pick the report sink: a file when --output is given, stdout otherwise
fn report_sink(args: &Cli) -> Result<Arc<dyn ReportSink>> {
    let sink: Arc<dyn ReportSink> = match &args.output {
        Some(path) => Arc::new(FileSink::append(path, args.format)?),
        None => Arc::new(ConsoleSink::stdout(args.format)),
    };
    Ok(sink)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if args.threads == 0 {
        anyhow::bail!("Invalid value for --threads: 0 (must be >= 1)");
    }

    init_tracing(args.debug);

    let agent = Agent::attach(args.agent.clone(), report_sink(&args)?)?;

    let checks = demo::run(
        agent.probe(),
        args.threads,
        Duration::from_millis(args.duration_ms),
    );
    tracing::info!(checks, threads = args.threads, "workload finished");

    // Final report; dropping the agent afterwards does not print again
    agent.shutdown();

    Ok(())
}
