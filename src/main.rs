use anyhow::{Context, Result};
use censusforge::{
    engine_from_config, Catalog, CatalogResolver, Config, GeoPuller, HttpFetcher, QueryEngine, Table,
    Workspace,
};
use clap::{Parser, Subcommand};
use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Validated queries against the U.S. Census data API")]
struct Args {
    /// YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the dataset catalog
    Datasets,
    /// Print the geography catalog
    Geographies,
    /// Print the years a dataset is published for
    Years {
        #[arg(short, long)]
        dataset: String,
    },
    /// Validate and run a query
    Query {
        #[arg(short, long)]
        dataset: String,
        #[arg(short, long)]
        year: i32,
        /// Comma-separated variables, e.g. AGEP,PWGTP
        #[arg(short, long, value_delimiter = ',', required = true)]
        get: Vec<String>,
        /// Appended verbatim, e.g. '&for=state:*'
        #[arg(short, long, default_value = "")]
        extra: String,
    },
    /// Download and cache a geography archive
    Geo {
        /// Name in the geography catalog, also the cache directory name
        #[arg(long)]
        name: String,
        /// Archive URL; looked up in the catalog by name when omitted
        #[arg(long)]
        url: Option<String>,
    },
}

fn init_logging(cfg: &Config) -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &cfg.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            fmt::Subscriber::builder()
                .with_env_filter(env)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            fmt::Subscriber::builder()
                .with_env_filter(env)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_engine(cfg: &Config) -> Result<QueryEngine<Catalog, HttpFetcher>> {
    engine_from_config(cfg).context("opening catalog")
}

fn print_table(table: &Table) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(table)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = Config::load(args.config.as_deref()).context("loading config")?;
    init_logging(&cfg)?;
    info!(catalog = %cfg.catalog_path.display(), "startup");

    match args.command {
        Command::Datasets => print_table(&open_engine(&cfg)?.catalog().list_all_datasets()?)?,
        Command::Geographies => print_table(&open_engine(&cfg)?.catalog().list_geographies()?)?,
        Command::Years { dataset } => {
            for year in open_engine(&cfg)?.catalog().available_years(&dataset)? {
                println!("{year}");
            }
        }
        Command::Query {
            dataset,
            year,
            get,
            extra,
        } => {
            let mut engine = open_engine(&cfg)?;
            let result = engine.query(&dataset, get.as_slice(), year, &extra).await;
            if let Some(url) = engine.last_url() {
                eprintln!("{url}");
            }
            print_table(&result?)?;
        }
        Command::Geo { name, url } => {
            let url = match url {
                Some(url) => url,
                None => open_engine(&cfg)?.catalog().geography_url(&name)?,
            };
            let ws = Workspace::bootstrap(&cfg.data_dir)
                .with_context(|| format!("preparing {}", cfg.data_dir.display()))?;
            let client = reqwest::Client::builder()
                .timeout(cfg.request_timeout())
                .build()?;
            let puller = GeoPuller::new(client, ws.external(), cfg.retry.policy());
            let path = puller.pull(&url, &name).await?;
            println!("{}", path.display());
        }
    }

    info!("all done");
    Ok(())
}
