use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use veto_engine::config::{Config, LoggingConfig};
use veto_engine::{RequestDetails, ResourceType, Stage, WebRequestDispatcher};

#[derive(Parser, Debug)]
#[command(name = "veto", author, version, about = "Evaluate webRequest rules against requests")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one request against the configured rules and print the report
    Evaluate {
        #[arg(short, long, env = "VETO_CONFIG")]
        config: PathBuf,
        #[arg(short, long)]
        url: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Resource type, e.g. script, image, main_frame; guessed from the
        /// URL and --accept when omitted
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,
        /// Accept request header
        #[arg(long)]
        accept: Option<String>,
        /// onBeforeRequest, onBeforeSendHeaders or onHeadersReceived
        #[arg(short, long, default_value = "onBeforeRequest")]
        stage: String,
        #[arg(long)]
        tab: Option<u64>,
        /// Also print Prometheus metrics after the report
        #[arg(long)]
        metrics: bool,
    },
    /// Compile every rule of a configuration file and report errors
    Check {
        #[arg(short, long, env = "VETO_CONFIG")]
        config: PathBuf,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Evaluate {
            config,
            url,
            method,
            resource_type,
            accept,
            stage,
            tab,
            metrics,
        } => {
            let config = Config::from_file(&config)?;
            init_tracing(&config.logging);

            let stage = Stage::parse(&stage)
                .with_context(|| format!("Unknown stage '{stage}'"))?;
            let mut details = RequestDetails::parse(&url)
                .with_context(|| format!("Invalid URL '{url}'"))?
                .with_method(method)
                .with_stage(stage);
            if let Some(accept) = accept {
                details = details.with_request_headers([("Accept", accept)].into_iter().collect());
            }
            details = match resource_type {
                Some(name) => details.with_resource_type(ResourceType::parse(&name)),
                None => details.with_detected_resource_type(),
            };
            if let Some(tab) = tab {
                details = details.with_tab(tab);
            }

            let host = Arc::new(config.host.build());
            let dispatcher = WebRequestDispatcher::from_config(&config, host)?;
            let report = dispatcher.evaluate_with_report(details).await;
            dispatcher.shutdown();

            println!("{}", serde_json::to_string_pretty(&report)?);
            if metrics {
                println!("{}", veto_engine::metrics::collect_metrics());
            }
        }
        Command::Check { config } => {
            let config = Config::from_file(&config)?;
            init_tracing(&config.logging);
            // Duplicate callback ids only show up on registration
            let dispatcher =
                WebRequestDispatcher::from_config(&config, Arc::new(veto_engine::NoOpHost))?;
            println!(
                "OK: {} rule(s), {} listener(s), {} registered",
                config.rules.len(),
                config.listeners.len(),
                dispatcher.registry().len()
            );
        }
    }

    Ok(())
}
