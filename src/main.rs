//! snowsample - a bounded Snowflake sample in four steps.

use std::sync::Arc;

use serde_json::json;
use snowsample::cli::{Cli, Command, RunArgs};
use snowsample::config::Config;
use snowsample::error::{Result, SnowsampleError};
use snowsample::logging::{self, LogTarget};
use snowsample::pipeline::{Pipeline, PipelineOutput};
use snowsample::provision::{
    Artifact, HttpArtifactFetcher, LocalArtifactStore, MavenRepository, Provisioner,
};
use snowsample::secrets::{SecretStore, SsmClient, StaticSecretStore};
use snowsample::source::{VariantSource, VARIANT_FORMAT};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Pick up AWS_* and SNOWSAMPLE_* from a local .env before clap reads env
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    if let LogTarget::File(path) = logging::init(cli.log_target()) {
        info!("Logging to {}", path.display());
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply(&mut config)?;

    let provisioner = Provisioner::new(
        MavenRepository::new(&config.drivers.repository, &config.drivers.group),
        Box::new(HttpArtifactFetcher::new()?),
        Box::new(LocalArtifactStore::new(&config.drivers.dir)),
    );

    match &cli.command {
        Command::Provision => {
            let artifacts = provisioner.ensure_all(&config.drivers.products).await?;
            print_artifacts(&artifacts);
        }
        Command::Status => {
            let artifacts = provisioner.list_local(&config.drivers.products).await?;
            if artifacts.is_empty() {
                println!("No drivers in {}", config.drivers.dir.display());
            } else {
                print_artifacts(&artifacts);
            }
        }
        Command::Run(args) => {
            let pipeline = build_pipeline(config, provisioner, args).await?;
            let output = pipeline.run().await?;
            print_output(&output, args)?;
        }
    }

    Ok(())
}

async fn build_pipeline(
    mut config: Config,
    provisioner: Provisioner,
    args: &RunArgs,
) -> Result<Pipeline> {
    if args.mock_warehouse {
        info!("Using built-in sample documents");
        config.query.format = VARIANT_FORMAT.to_string();
        let secrets = StaticSecretStore::with_placeholders(&config.secrets.names);
        return Ok(Pipeline::new(config, provisioner, Box::new(secrets))
            .with_source(Arc::new(VariantSource::sample_weather()))
            .offline());
    }

    let secrets: Box<dyn SecretStore> = Box::new(
        SsmClient::from_env(&config.secrets.region, config.secrets.endpoint.as_deref()).await?,
    );
    let pipeline = Pipeline::new(config, provisioner, secrets);
    Ok(if args.offline { pipeline.offline() } else { pipeline })
}

fn print_artifacts(artifacts: &[Artifact]) {
    for artifact in artifacts {
        println!(
            "{:<24} {:<16} {}",
            artifact.product,
            artifact.version,
            artifact.path.display()
        );
    }
}

fn print_output(output: &PipelineOutput, args: &RunArgs) -> Result<()> {
    if args.json {
        let shown = output.result.rows.len().min(args.preview);
        let doc = json!({
            "artifacts": output.artifacts,
            "columns": output.result.columns,
            "rows": &output.result.rows[..shown],
            "row_count": output.result.row_count,
            "was_truncated": output.result.was_truncated,
            "summary": output.summary,
        });
        let text = serde_json::to_string_pretty(&doc)
            .map_err(|e| SnowsampleError::internal(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", output.result.preview(args.preview));
    println!(
        "{} row(s) in {:.2?}",
        output.result.row_count, output.result.execution_time
    );
    if let Some(warning) = output.result.truncation_warning() {
        println!("{warning}");
    }
    println!();
    println!("{}", output.summary);
    Ok(())
}
