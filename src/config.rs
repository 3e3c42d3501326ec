//! Command-line configuration. Every option can also come from the
//! environment.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::Result;
use crate::labeling::{HeuristicScorer, Scorer};
use crate::model::{ModelArtifact, ModelScorer};

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "https://se-project-rishi.vercel.app",
];

fn default_allowed_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect()
}

#[derive(Debug, Parser)]
#[command(
    name = "store-placement",
    about = "Preprocess map layers, train the placement model and serve predictions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reduce raw GeoJSON layers to point tables
    Preprocess(PreprocessArgs),
    /// Label places by clustering and fit the classifier
    Train(TrainArgs),
    /// Serve circle predictions over HTTP
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct PreprocessArgs {
    /// Directory holding `<category>.geojson` files
    #[arg(long, env = "RAW_DATA_DIR", default_value = "data/raw")]
    pub raw_dir: PathBuf,

    /// Directory the point tables are written to
    #[arg(long, env = "PROCESSED_DATA_DIR", default_value = "data/processed")]
    pub processed_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct TrainArgs {
    #[arg(long, env = "PROCESSED_DATA_DIR", default_value = "data/processed")]
    pub processed_dir: PathBuf,

    /// Directory the model artifact pair is written to
    #[arg(long, env = "MODEL_DIR", default_value = "app")]
    pub model_dir: PathBuf,

    /// Seed for clustering, splitting and the forest
    #[arg(long, env = "TRAIN_SEED", default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScoringMode {
    /// Distance thresholds with random jitter
    Heuristic,
    /// The trained classifier
    Model,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "PROCESSED_DATA_DIR", default_value = "data/processed")]
    pub processed_dir: PathBuf,

    #[arg(long, env = "MODEL_DIR", default_value = "app")]
    pub model_dir: PathBuf,

    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
    pub bind: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Origin allowed to call the API; repeat for several
    #[arg(
        long = "allowed-origin",
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = default_allowed_origins()
    )]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "SCORING", value_enum, default_value_t = ScoringMode::Heuristic)]
    pub scoring: ScoringMode,
}

impl ServeArgs {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Builds the configured scorer, loading the model artifact if needed.
    pub fn scorer(&self) -> Result<Box<dyn Scorer>> {
        match self.scoring {
            ScoringMode::Heuristic => Ok(Box::new(HeuristicScorer::default())),
            ScoringMode::Model => {
                let artifact = ModelArtifact::load(&self.model_dir)?;
                log::info!("Loaded model artifact from {}", self.model_dir.display());
                Ok(Box::new(ModelScorer::new(artifact)))
            }
        }
    }
}
