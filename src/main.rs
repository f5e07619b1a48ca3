use std::{fs, io, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    api::http::{HttpBackend, DEFAULT_API_URL},
    catalog::CatalogSource,
    search::SearchStatus,
    selector::{Dropdown, ListView},
    server::ServerConfig,
    session::{
        driver::{Event, Page},
        LatLng,
    },
};
mod api;
mod catalog;
mod map;
mod search;
mod selector;
mod server;
mod session;

#[derive(Parser)]
#[command(about = "Pick a start stop and time, and fetch a travel-time heatmap")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the backend service
    Serve(ServeArgs),
    /// List the stops the selector offers
    Stops(ClientArgs),
    /// Resolve a map click to the nearest stop
    #[command(allow_negative_numbers = true)]
    Click {
        #[command(flatten)]
        client: ClientArgs,
        lat: f64,
        lng: f64,
    },
    /// Submit a heatmap search starting from a stop
    Search {
        #[command(flatten)]
        client: ClientArgs,
        /// Exact stop name, as listed by `stops`
        stop: String,
        /// Departure date and time, defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Write the resulting map as GeoJSON
        #[arg(long)]
        map_out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "localhost")]
    bind: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Directory with unified_stops.csv; heatmap.svg is written here
    #[arg(long, default_value = "public")]
    public_dir: PathBuf,
    /// Directory searched for the requested script
    #[arg(long, default_value = ".")]
    script_dir: PathBuf,
    #[arg(long, default_value = "python3")]
    interpreter: String,
}

#[derive(Args)]
struct ClientArgs {
    /// Base URL of the backend service
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,
    /// Stop catalog URL or path, defaults to the one the service publishes
    #[arg(long)]
    catalog: Option<CatalogSource>,
    /// Per-request timeout; requests wait indefinitely without it
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl ClientArgs {
    async fn mount(&self) -> anyhow::Result<Page<HttpBackend>> {
        let backend = HttpBackend::new(&self.api_url, self.timeout_secs.map(Duration::from_secs))?;
        let source = self
            .catalog
            .clone()
            .unwrap_or_else(|| CatalogSource::Url(backend.catalog_url()));

        let mut page = Page::new(backend, Utc::now());
        page.mount(source);
        page.settle().await;

        Ok(page)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Serve(args) => {
            let config = ServerConfig {
                public_dir: args.public_dir,
                script_dir: args.script_dir,
                interpreter: args.interpreter,
            };
            actix_web::rt::System::new().block_on(server::serve(config, &args.bind, args.port))
        }
        Command::Stops(client) => block_on(list_stops(client)),
        Command::Click { client, lat, lng } => block_on(click(client, LatLng::new(lat, lng))),
        Command::Search {
            client,
            stop,
            at,
            map_out,
        } => block_on(search(client, stop, at, map_out)),
    }
}

fn block_on<F: std::future::Future<Output = anyhow::Result<()>>>(f: F) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?
        .block_on(f)
}

async fn list_stops(client: ClientArgs) -> anyhow::Result<()> {
    let mut page = client.mount().await?;
    page.dispatch(Event::ToggleDropdown(Dropdown::Startpoint));

    match page.selector().view(Dropdown::Startpoint, page.catalog()) {
        ListView::Entries(entries) => println!("{}", entries.iter().join("\n")),
        ListView::Empty(message) => println!("{message}"),
        ListView::Closed => {}
    }

    Ok(())
}

async fn click(client: ClientArgs, at: LatLng) -> anyhow::Result<()> {
    let mut page = client.mount().await?;
    let before = page.state().selected_stop.clone();

    page.dispatch(Event::MapClicked(at));
    page.settle().await;

    let stop = &page.state().selected_stop;
    if *stop == before {
        bail!("No stop resolved near {}, {}", at.lat, at.lng);
    }
    println!("{}", serde_json::to_string_pretty(stop)?);

    Ok(())
}

async fn search(
    client: ClientArgs,
    stop: String,
    at: Option<DateTime<Utc>>,
    map_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut page = client.mount().await?;
    let index = page
        .catalog()
        .position_by_name(&stop)
        .with_context(|| format!("No stop named {stop:?} in the catalog"))?;

    page.dispatch(Event::ToggleDropdown(Dropdown::Startpoint));
    page.dispatch(Event::SelectStop(index));
    if let Some(at) = at {
        page.dispatch(Event::SetDateTime(at));
    }

    info!(
        "Searching from {} at {}",
        page.selector().button_label(&page.state().selected_stop),
        page.state().selected_date_time
    );
    page.dispatch(Event::SearchRequested);
    page.settle().await;

    if page.search_status() != SearchStatus::Completed {
        bail!("Search did not complete");
    }
    println!("{}", page.state().overlay);

    if let Some(path) = map_out {
        let map = page.map().render(page.state());
        fs::write(&path, serde_json::to_string_pretty(&map)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}
