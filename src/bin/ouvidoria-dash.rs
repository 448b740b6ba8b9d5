//! Ouvidoria Dash CLI
//!
//! Drives the filter engine against a live aggregation backend, the same way
//! a dashboard page would: dropdown filters first, then chart clicks, then a
//! pull-on-show refresh of a single registered page.
//!
//! # CLI Commands
//!
//! - `check-config` - Validate and print the resolved configuration
//! - `aggregate` - Apply filters and clicks, print the resulting KPIs
//! - `months` - List the months available under the given filters
//!
//! # Configuration
//!
//! 1. `--config` path
//! 2. `OUVIDORIA_CONFIG` environment variable
//! 3. `./ouvidoria.toml`
//! 4. Default configuration

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use ouvidoria_dash::{
    config::load_config, Config, FilterEngine, FilterValue, Loaded, Modifiers, PageId,
    Subscription,
};
use parking_lot::Mutex;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page id the CLI registers under
const CLI_PAGE: &str = "cli";

// =============================================================================
// CLI Definition
// =============================================================================

/// Ouvidoria Dash - filtered aggregation for the ombudsman dashboard
#[derive(Parser)]
#[command(name = "ouvidoria-dash")]
#[command(version)]
#[command(about = "Filter state and filtered aggregation engine for the ombudsman dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides OUVIDORIA_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override backend base URL (e.g., http://localhost:3000/api)
    #[arg(short, long, global = true)]
    backend_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file and print the resolved settings
    CheckConfig,

    /// Apply filters and chart clicks, then print the aggregated KPIs
    Aggregate {
        #[command(flatten)]
        filters: PageFilters,

        /// Chart click as field=value (repeatable, applied in order)
        #[arg(long = "click", value_name = "FIELD=VALUE")]
        clicks: Vec<String>,

        /// Treat clicks as multi-select (toggle) instead of replace
        #[arg(long)]
        multi: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List months available under the given filters
    Months {
        #[command(flatten)]
        filters: PageFilters,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Page-local dropdowns
#[derive(Args)]
struct PageFilters {
    /// Status dropdown (e.g., ABERTO)
    #[arg(long)]
    status: Option<String>,

    /// Month dropdown (YYYY-MM)
    #[arg(long)]
    month: Option<String>,

    /// Creation date lower bound (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Creation date upper bound (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Print the resolved configuration
fn cmd_check_config(config: &Config) -> Result<(), Box<dyn Error>> {
    println!("Configuration is valid!");
    println!();
    println!("Backend:");
    println!("  Base URL: {}", config.backend.base_url);
    println!("  Timeout: {} ms", config.backend.timeout_ms);
    println!();
    println!("Loader:");
    println!("  Debounce: {} ms", config.loader.debounce_ms);
    println!("  Filtered TTL: {} ms", config.loader.filtered_ttl_ms);
    println!("  Full dataset TTL: {} ms", config.loader.full_dataset_ttl_ms);
    println!();
    println!("Cache:");
    println!("  Enabled: {}", config.cache.enabled);
    println!("  Max entries per tier: {}", config.cache.max_entries);
    println!();
    println!("Snapshots:");
    println!("  Enabled: {}", config.snapshot.enabled);
    println!("  Directory: {:?}", config.snapshot.dir);
    println!("  Max age: {} days", config.snapshot.max_age_days);
    if !config.fields.is_empty() {
        println!();
        println!("Field mappings:");
        for (ui, backend) in &config.fields {
            println!("  {} -> {}", ui, backend);
        }
    }
    println!();
    println!("Log level: {}", config.logging.level);

    Ok(())
}

/// Apply the dropdowns to the engine's page-local fragment
async fn apply_page_filters(engine: &FilterEngine, filters: &PageFilters) {
    if let Some(status) = &filters.status {
        engine.set_page_filter("status", status.as_str()).await;
    }
    if let Some(month) = &filters.month {
        engine.set_page_filter("month", month.as_str()).await;
    }
    if filters.from.is_some() || filters.to.is_some() {
        engine.set_page_date_range(filters.from, filters.to).await;
    }
}

/// Split `field=value`
fn parse_click(click: &str) -> Result<(&str, FilterValue), Box<dyn Error>> {
    let (field, value) = click
        .split_once('=')
        .ok_or_else(|| format!("invalid --click '{}': expected FIELD=VALUE", click))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("invalid --click '{}': empty field", click).into());
    }
    Ok((field, FilterValue::from(value.trim())))
}

/// Apply filters and clicks, then print what a page would render
async fn cmd_aggregate(
    config: &Config,
    filters: &PageFilters,
    clicks: &[String],
    multi: bool,
    format: &str,
) -> Result<(), Box<dyn Error>> {
    let engine = FilterEngine::from_config(config)?;
    apply_page_filters(&engine, filters).await;

    let modifiers = if multi {
        Modifiers::multi()
    } else {
        Modifiers::none()
    };
    for click in clicks {
        let (field, value) = parse_click(click)?;
        engine.on_element_activated(field, value, modifiers).await;
    }

    // Register only now so the filters above do not each trigger a fetch
    let delivered: Arc<Mutex<Option<Loaded>>> = Arc::new(Mutex::new(None));
    let sink = delivered.clone();
    engine.subscribe(Subscription::new(CLI_PAGE, || true, move |loaded: &Loaded| {
        *sink.lock() = Some(loaded.clone());
        Ok(())
    }));
    engine.show_page(&PageId::new(CLI_PAGE)).await;

    let loaded = delivered.lock().take().ok_or("no data was delivered")?;
    debug!(sequence = loaded.sequence, status = ?loaded.status, "aggregation delivered");

    if format == "json" {
        let output = serde_json::json!({
            "filters": engine.effective_filters(),
            "status": loaded.status,
            "result": &*loaded.result,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Filters: {}", engine.effective_filters());
        println!("Status: {:?}", loaded.status);
        if loaded.status.is_degraded() {
            println!("(backend unavailable; showing fallback data)");
        }
        println!();
        print!("{}", loaded.result.to_table());
    }

    Ok(())
}

/// List the available months
async fn cmd_months(config: &Config, filters: &PageFilters, format: &str) -> Result<(), Box<dyn Error>> {
    let engine = FilterEngine::from_config(config)?;
    apply_page_filters(&engine, filters).await;

    let months = engine.available_months().await;
    if months.is_empty() {
        warn!("no months available (empty dataset or backend unavailable)");
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&months)?);
    } else {
        for month in months {
            println!("{}", month);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.trim_end_matches('/').to_string();
    }
    config.validate()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Ouvidoria Dash v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Aggregate {
            filters,
            clicks,
            multi,
            format,
        } => cmd_aggregate(&config, filters, clicks, *multi, format).await,
        Commands::Months { filters, format } => cmd_months(&config, filters, format).await,
    }
}
