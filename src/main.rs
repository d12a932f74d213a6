//! AutoML pipeline - main entry point

use std::time::Duration;

use automl_pipeline::cli::{cmd_algorithms, cmd_serve, cmd_train, Cli, Commands, TrainArgs};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "automl_pipeline=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => {
            cmd_serve(host, port).await?;
        }
        Commands::Train {
            data,
            target,
            problem_type,
            algorithms,
            features,
            test_size,
            cv_folds,
            seed,
            workers,
            timeout_secs,
            output,
        } => {
            let args = TrainArgs {
                data,
                target,
                problem_type,
                algorithms,
                features,
                test_size,
                cv_folds,
                seed,
                workers,
                timeout: Duration::from_secs(timeout_secs),
                output,
            };
            tokio::task::spawn_blocking(move || cmd_train(args)).await??;
        }
        Commands::Algorithms { problem_type } => {
            cmd_algorithms(problem_type.as_deref())?;
        }
    }

    Ok(())
}
