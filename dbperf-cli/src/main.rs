mod args;

use anyhow::{Context, Result};
use args::{Cli, Command, CompareArgs, Format, RunArgs};
use clap::Parser;
use dbperf::compare::Comparison;
use dbperf::core::ConnectionPool;
use dbperf::mysql::MySqlStore;
use dbperf::report::{self, StoredReport, Summary};
use dbperf::{Orchestrator, RunStatus};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::ExitCode;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let res = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Compare(args) => compare(args),
    };

    match res {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbperf=info")),
        1 => EnvFilter::new("dbperf=debug,dbperf_cli=debug"),
        _ => EnvFilter::new("dbperf=trace,dbperf_cli=trace,sqlx=debug"),
    };
    FmtSubscriber::builder().with_env_filter(filter).init();
}

async fn run(args: RunArgs) -> Result<u8> {
    let config = Arc::new(args.to_config()?);

    if let Some(addr) = args.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("unable to start the Prometheus exporter")?;
        dbperf::describe_metrics();
        info!("Serving metrics on {addr}");
    }

    info!("Pool: {}", config.pool);
    let store = MySqlStore::new(&config.connection, &config.pool);
    let mut orchestrator = Orchestrator::new(config.clone(), store.clone());

    if args.test_connection_only {
        let checked = orchestrator.check_connection().await;
        store.close().await;
        return Ok(match checked {
            Ok(server) => {
                println!("Connection OK");
                println!("  Version: {}", server.version);
                println!("  Database: {}", server.database.as_deref().unwrap_or("<none>"));
                println!("  User: {}", server.user);
                println!("  TLS: {}", server.ssl_cipher.as_deref().unwrap_or("off"));
                0
            }
            Err(err) => {
                error!("Connection test failed: {err}");
                2
            }
        });
    }

    let outcome = orchestrator.run().await;
    store.close().await;

    if let RunStatus::ConnectionFailed(err) = &outcome.status {
        error!("Connection test failed: {err}");
        return Ok(exit_code(&outcome.status));
    }

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| report::default_report_path(&config.label, OffsetDateTime::now_utc()));
    report::write_report(&outcome.report, &path)?;

    println!("{}", Summary(&outcome.report));
    println!("Results saved to: {}", path.display());
    Ok(exit_code(&outcome.status))
}

fn exit_code(status: &RunStatus) -> u8 {
    u8::try_from(status.exit_code()).unwrap_or(1)
}

fn compare(args: CompareArgs) -> Result<u8> {
    let first = StoredReport::load(&args.file1)?;
    let second = StoredReport::load(&args.file2)?;
    let comparison = Comparison::new(
        &first,
        &second,
        (args.label1.as_deref(), args.label2.as_deref()),
        args.threshold,
    );

    let text = match args.format {
        Format::Table => comparison.table().to_string(),
        Format::Markdown => comparison.markdown().to_string(),
        Format::Json => serde_json::to_string_pretty(&comparison.to_json())?,
    };

    match args.output {
        Some(path) => {
            let path = report::resolve_output(&path);
            report::write_text(&text, &path)?;
            println!("Comparison saved to: {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(0)
}
