//! DSP TCK CLI binary.
//!
//! Contract-negotiation conformance checks against a connector under test.
//!
//! # Commands
//!
//! - `run` - Run the standard consumer negotiation against the connector
//! - `state` - Print the connector's state for a negotiation
//! - `config` - Print the effective configuration, authorization masked

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dsp_tck::{
    protocol::{message, paths, NegotiationState},
    CallbackEndpoint, Config, ExpectedOutcome, HttpTransport, PipelineContext, PROTOCOL_VERSION,
    VERSION,
};

#[derive(Parser)]
#[command(name = "dsp-tck")]
#[command(version = VERSION)]
#[command(about = "DSP TCK - Contract negotiation conformance harness", long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// DSP base URL of the connector under test
    #[arg(long, global = true)]
    connector: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate a contract with the connector acting as provider
    Run {
        /// Dataset offered by the connector
        #[arg(long, default_value = "ACN0101")]
        dataset: String,

        /// Offer to request
        #[arg(long, default_value = "CD123:ACN0101:456")]
        offer: String,
    },

    /// Fetch a negotiation from the connector and print its state
    State {
        /// Process id the connector assigned
        id: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.connector {
        config.connector.base_url = url;
    }

    match cli.command {
        Commands::Run { dataset, offer } => cmd_run(&config, &dataset, &offer),
        Commands::State { id } => cmd_state(&config, &id),
        Commands::Config => cmd_config(&config),
    }
}

fn cmd_run(config: &Config, dataset: &str, offer: &str) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let endpoint = CallbackEndpoint::bind(&config.callback).await?;
        tracing::info!("Callback endpoint at {}", endpoint.address());
        tracing::info!(
            "Connector under test: {} (DSP {})",
            config.connector.base_url,
            PROTOCOL_VERSION
        );

        let ctx = PipelineContext::from_config(config, endpoint.clone())?;
        let mut pipeline = ctx
            .consumer_pipeline()
            .send_request_message(dataset, offer)
            .then_verify_state(NegotiationState::Requested)
            .expect_agreement()
            .accept_last_offer()
            .then_wait_for_state(NegotiationState::Agreed)
            .expect_finalized_event()
            .send_verified_event()
            .then_wait_for_state(NegotiationState::Finalized)
            .then_verify_provider_state(NegotiationState::Finalized);

        let result = pipeline.execute().await;
        endpoint.shutdown();

        match &result {
            Ok(()) => println!("PASS  contract negotiation reached FINALIZED"),
            Err(e) => println!("FAIL  {e}"),
        }
        result.map_err(anyhow::Error::from)
    })
}

fn cmd_state(config: &Config, id: &str) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let transport = HttpTransport::new(&config.transport)?;
        let url = paths::negotiation_url(&config.connector.base_url, id);
        let response = transport.get_json(&url, ExpectedOutcome::Success).await?;
        let negotiation = response.json()?;

        match message::state_property(&negotiation) {
            Some(state) => println!("{id}: {state}"),
            None => println!("{id}: <no state>\n{}", serde_json::to_string_pretty(&negotiation)?),
        }
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_toml_redacted()?);
    Ok(())
}
