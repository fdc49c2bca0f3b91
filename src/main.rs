use anyhow::Context;
use clap::{Parser, ValueEnum};
use sentinel_fetch::auth::Credentials;
use sentinel_fetch::config::RunConfig;
use sentinel_fetch::download::Downloader;
use sentinel_fetch::missions::{Sentinel1, Sentinel2};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sentinel-fetch",
    about = "Resumable Sentinel product downloads from the Copernicus Data Space"
)]
struct Cli {
    /// Product family to fetch.
    #[arg(long, value_enum, default_value = "s2")]
    mission: MissionArg,

    /// Run configuration, defaults to config/<mission>.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MissionArg {
    S1,
    S2,
}

impl MissionArg {
    fn default_config(self) -> PathBuf {
        match self {
            MissionArg::S1 => PathBuf::from("config/s1.toml"),
            MissionArg::S2 => PathBuf::from("config/s2.toml"),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentinel_fetch=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.mission.default_config());
    let config = RunConfig::read(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let credentials = Credentials::from_env()?;

    match cli.mission {
        MissionArg::S2 => {
            let section = config
                .sentinel2
                .context("configuration has no [sentinel2] section")?;
            Downloader::new(
                Sentinel2::new(section),
                config.campaign,
                config.download,
                config.endpoints,
                credentials,
            )?
            .run()
            .await?;
        }
        MissionArg::S1 => {
            let section = config
                .sentinel1
                .context("configuration has no [sentinel1] section")?;
            Downloader::new(
                Sentinel1::new(section),
                config.campaign,
                config.download,
                config.endpoints,
                credentials,
            )?
            .run()
            .await?;
        }
    }
    Ok(())
}
