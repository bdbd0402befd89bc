use clap::{Parser, Subcommand};
use photo_sync::admin::AdminService;
use photo_sync::metadata::{MetadataStore, open_engine};
use photo_sync::shutdown::{self, EngineGuard};
use photo_sync::{check, config, output, server, sync};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let hash = env!("PHOTO_SYNC_GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup
        Box::leak(format!("{}@{hash}", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

#[derive(Parser)]
#[command(name = "photo-sync")]
#[command(about = "Build the photo manifest and responsive images for a portfolio site")]
#[command(long_about = "\
Build the photo manifest and responsive images for a portfolio site

Source JPEGs are the only source of truth. Tags, descriptions and capture
times live in each file's embedded metadata; `sync` reads them, generates
resized AVIF/WebP/JPEG variants, and writes manifest.json for the site.

Layout (defaults, relative to --root):

  photos/original/                     # source JPEGs
  apps/public/src/
  └── assets/photos/
      ├── manifest.json                # written by sync
      └── generated/
          ├── thumb/<id>.{avif,webp,jpg}
          ├── medium/<id>.{avif,webp,jpg}
          └── large/<id>.{avif,webp,jpg}

A photo's <id> is a hash of its decoded pixels, so renaming a file or
editing its tags never regenerates its images.

Run 'photo-sync gen-config' to generate a documented photo-sync.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project root; relative config paths resolve against it
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/photo-sync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate derivatives and write the manifest
    Sync,
    /// Validate the manifest and the files it references
    Check,
    /// Run the admin HTTP API for editing tags and descriptions
    Serve {
        /// Listen address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a stock photo-sync.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let load = || {
        let config = config::load_config(&cli.root, cli.config.as_deref());
        if let Ok(config) = &config {
            tracing::debug!(?config, "configuration loaded");
        }
        config
    };

    match &cli.command {
        Command::Sync => run_sync(load()?).await?,
        Command::Check => {
            let config = load()?;
            let manifest_path = config.manifest_path();
            match check::check_manifest(&manifest_path, &config.paths.public_root)? {
                None => {
                    for line in output::format_no_manifest("photo-sync") {
                        println!("{}", line);
                    }
                }
                Some(report) => {
                    output::print_check_report(&report);
                    if report.has_errors() {
                        std::process::exit(1);
                    }
                }
            }
        }
        Command::Serve { host, port } => {
            let config = load()?;
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host.clone();
            }
            if let Some(port) = port {
                server_config.port = *port;
            }
            init_thread_pool(&config.processing);

            let engine = open_engine(&config.metadata)?;
            let guard = EngineGuard::new(Arc::clone(&engine));
            let service = Arc::new(AdminService::new(&config, MetadataStore::new(engine)));
            let addr = format!("{}:{}", server_config.host, server_config.port);
            let served = server::serve(&addr, service, shutdown::wait_for_signal()).await;
            guard.close()?;
            served?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

async fn run_sync(config: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(&config.metadata)?;
    let guard = EngineGuard::new(Arc::clone(&engine));
    shutdown::exit_on_signal(Arc::clone(&guard));

    let manifest_path = config.manifest_path();
    let result = tokio::task::spawn_blocking(move || {
        init_thread_pool(&config.processing);
        let store = MetadataStore::new(engine);
        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                output::print_sync_event(&event);
            }
        });
        let result = sync::sync(&config, &store, Some(tx));
        if printer.join().is_err() {
            tracing::warn!("progress printer stopped early");
        }
        result
    })
    .await?;
    guard.close()?;

    let report = result?;
    output::print_sync_summary(&report);
    println!("Manifest: {}", manifest_path.display());
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
