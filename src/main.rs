use clap::Parser;

use store_placement::{
    config::{Cli, Commands},
    datasets, model, server,
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Preprocess(args) => {
            datasets::preprocess(&args.raw_dir, &args.processed_dir).map(|written| {
                log::info!("Pre-processing complete: {} table(s) written.", written.len());
            })
        }
        Commands::Train(args) => {
            model::run_training(&args.processed_dir, &args.model_dir, args.seed).map(|outcome| {
                log::info!(
                    "Training complete (hold-out accuracy {:.2}).",
                    outcome.report.accuracy
                );
            })
        }
        Commands::Serve(args) => match args
            .scorer()
            .and_then(|scorer| ServiceContext::load(&args.processed_dir, scorer))
        {
            Ok(context) => {
                server::serve(context, args.socket_addr(), &args.allowed_origins).await
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = &result {
        log::error!("{e}");
    }
    result.map_err(Into::into)
}
