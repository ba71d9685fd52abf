//! Storefront cart CLI - inspect and edit the remote cart, start checkout.
//!
//! # Usage
//!
//! ```bash
//! # Show the server cart
//! cart-cli show
//!
//! # Add two mugs
//! cart-cli add mug --name "Mug" --price 1250 --quantity 2
//!
//! # Change or remove a line
//! cart-cli set mug 3
//! cart-cli remove mug
//!
//! # Start checkout and wait for the return URL on stdin
//! cart-cli checkout --wait
//! ```
//!
//! Configuration is read from the environment (see `storefront_cart::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storefront_cart::config::CartClientConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Storefront cart and checkout client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the server cart
    Show,
    /// Add units of a product
    Add {
        /// Product identifier
        product_id: String,

        /// Display name shown until the server confirms the line
        #[arg(short, long)]
        name: Option<String>,

        /// Unit price in minor units
        #[arg(short, long, default_value_t = 0)]
        price: i64,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
    },
    /// Set a line's quantity (0 removes it)
    Set {
        /// Product identifier
        product_id: String,

        /// New quantity
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Product identifier
        product_id: String,
    },
    /// Remove every line
    Clear,
    /// Refetch the server cart, discarding local state
    Sync,
    /// Create a payment session for the cart
    Checkout {
        /// Wait for the payment page's return URL on stdin
        #[arg(short, long)]
        wait: bool,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Errors and warnings become Sentry events; info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = CartClientConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_cart=info,cart_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: CartClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = commands::Client::connect(&config).await?;
    match cli.command {
        Commands::Show => commands::cart::show(&client),
        Commands::Add {
            product_id,
            name,
            price,
            quantity,
        } => commands::cart::add(&client, &product_id, name, price, quantity).await?,
        Commands::Set {
            product_id,
            quantity,
        } => commands::cart::set(&client, &product_id, quantity).await?,
        Commands::Remove { product_id } => commands::cart::remove(&client, &product_id).await?,
        Commands::Clear => commands::cart::clear(&client).await?,
        Commands::Sync => commands::cart::sync(&client).await?,
        Commands::Checkout { wait } => commands::checkout::begin(&client, wait).await?,
    }
    Ok(())
}
