use clap::{Parser, Subcommand};
use lib::config::{ConfigFileCredentials, CredentialsProvider};
use lib::host::{next_event, BridgeEvent, HostBridge, HostWindow};
use lib::resolve::{CustomerRecord, DetailView, Resolution, SearchOutcome, SearchView};
use lib::store::StoreClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "clerk")]
#[command(about = "Look up the person you are chatting with in your store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a template config with empty store credentials.
    Init {
        /// Config file path (default: CLERK_CONFIG_PATH or ~/.clerk/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Find the customer with this email and list their orders.
    Lookup {
        /// Config file path (default: CLERK_CONFIG_PATH or ~/.clerk/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        email: String,
    },

    /// Search customers by email, 20 per page.
    Search {
        /// Config file path (default: CLERK_CONFIG_PATH or ~/.clerk/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Fetch up to this many pages.
        #[arg(long, default_value_t = 1)]
        pages: u32,

        query: String,
    },

    /// Connect to the host application and resolve each contact it reports (Ctrl+C to stop).
    Watch {
        /// Config file path (default: CLERK_CONFIG_PATH or ~/.clerk/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Host WebSocket URL (default from config host.url)
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("clerk {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Lookup { config, email }) => {
            if let Err(e) = run_lookup(config, email).await {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Search {
            config,
            pages,
            query,
        }) => {
            if let Err(e) = run_search(config, pages, query).await {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Watch { config, url }) => {
            if let Err(e) = run_watch(config, url).await {
                log::error!("watch failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", path.display());
    Ok(())
}

fn credentials(config_path: Option<PathBuf>) -> Arc<dyn CredentialsProvider> {
    Arc::new(ConfigFileCredentials::new(config_path))
}

fn print_record(record: &CustomerRecord) {
    let c = &record.customer;
    println!("{} <{}> (customer #{})", c.display_name(), c.email, c.id);
    if record.orders.is_empty() {
        println!("  no orders");
    }
    for o in &record.orders {
        println!(
            "  #{:<8} {:<12} {:>10}  {}",
            o.number,
            o.status,
            o.total,
            o.created_on()
        );
    }
}

async fn run_lookup(config_path: Option<PathBuf>, email: String) -> Result<(), String> {
    let view = DetailView::new(Arc::new(StoreClient::new()), credentials(config_path));
    match view.resolve(&email).await {
        Ok(Resolution::Found(record)) => print_record(&record),
        Ok(Resolution::NotFound) => println!("no customer found for {}", email.trim()),
        Ok(Resolution::Superseded) => {}
        Err(e) => return Err(e.user_message()),
    }
    Ok(())
}

async fn run_search(config_path: Option<PathBuf>, pages: u32, query: String) -> Result<(), String> {
    let view = SearchView::new(Arc::new(StoreClient::new()), credentials(config_path));
    let mut outcome = view.search(&query).await;
    for _ in 1..pages.max(1) {
        if outcome.is_err() || !view.snapshot().has_more() {
            break;
        }
        outcome = view.load_more().await;
    }

    let acc = view.snapshot();
    for c in acc.results() {
        println!("{:>8}  {:<32} {}", c.id, c.email, c.display_name());
    }
    match outcome {
        Ok(SearchOutcome::NotFound { query }) => {
            println!("no customers found for {}", query)
        }
        Ok(_) if acc.has_more() => println!("(more results available; use --pages)"),
        Ok(_) => {}
        Err(e) => return Err(e.user_message()),
    }
    Ok(())
}

async fn run_watch(config_path: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path.clone())?;
    let url = url
        .or(config.host.url.clone())
        .ok_or_else(|| anyhow::anyhow!("no host url: pass --url or set host.url in the config"))?;

    let window = HostWindow::new();
    let host = Arc::new(lib::host::connect_host(&url, window.clone()).await?);
    let mut bridge = HostBridge::new(
        host.clone(),
        config.host.fetch_signal.clone(),
        Duration::from_millis(config.host.context_timeout_ms),
    );
    let mut events = bridge.subscribe();
    bridge.attach(&window);
    let detail = DetailView::new(Arc::new(StoreClient::new()), credentials(config_path));

    bridge.request_context().await;
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = host.closed() => break Err(anyhow::anyhow!("host closed the connection")),
            event = next_event(&mut events) => {
                let Some(event) = event else { break Ok(()) };
                match event {
                    BridgeEvent::Context(ctx) => {
                        if let Some(agent) = ctx.agent_name() {
                            log::info!("context from agent {}", agent);
                        }
                        match detail.on_context(&ctx).await {
                            Some(Ok(Resolution::Found(record))) => print_record(&record),
                            Some(Ok(Resolution::NotFound)) => println!(
                                "no customer found for {}",
                                ctx.contact_email().unwrap_or_default()
                            ),
                            Some(Ok(Resolution::Superseded)) | None => {}
                            Some(Err(e)) => eprintln!("{}", e.user_message()),
                        }
                    }
                    BridgeEvent::Error(e) => eprintln!("host: {}", e),
                }
            }
        }
    };
    bridge.detach();
    result
}
