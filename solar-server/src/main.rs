use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;

use solar_pipeline::clock::SystemClock;
use solar_pipeline::config::PricingConfig;
use solar_pipeline::memory_store::MemoryStore;
use solar_pipeline::quotation_loader::load_lines_file;
use solar_pipeline::service::{PricedQuotation, QuotationDraft, QuotationService};
use solar_pipeline::transition::{ProvisioningResult, TransitionOutcome};
use solar_pipeline::types::{Actor, LineKind, QuotationStatus};
use solar_pricing::{format_amount, CascadeBreakdown, CascadeRates};

#[derive(Parser)]
#[command(name = "solar-server")]
#[command(about = "Price a solar installation quotation and optionally approve it")]
struct Args {
    /// CSV of quotation rows: kind,description,quantity,unit_price,profit_percentage
    lines: PathBuf,

    /// Client name
    #[arg(long, default_value = "Walk-in client")]
    client: String,

    #[arg(long, default_value_t = 1)]
    client_id: u64,

    /// Project name (defaults to the CSV file name)
    #[arg(long)]
    project: Option<String>,

    /// Installed power in kWp
    #[arg(long, default_value_t = Decimal::ZERO)]
    power_kwp: Decimal,

    /// JSON file with cascade rates; individual rate flags override it
    #[arg(long)]
    rates: Option<PathBuf>,

    #[arg(long)]
    commercial: Option<Decimal>,
    #[arg(long)]
    administration: Option<Decimal>,
    #[arg(long)]
    contingency: Option<Decimal>,
    #[arg(long)]
    profit: Option<Decimal>,
    #[arg(long)]
    profit_iva: Option<Decimal>,
    #[arg(long)]
    withholding: Option<Decimal>,

    /// JSON pricing configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Approve the quotation after pricing and provision its project
    #[arg(long)]
    approve: bool,

    /// User id recorded as the actor of every change
    #[arg(long, default_value_t = 1)]
    user: u64,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

// ---------------------------------------------------------------------------
// JSON output contract
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct QuotationJson {
    generated_at: String,
    number: String,
    status: QuotationStatus,
    client: String,
    project: String,
    power_kwp: Decimal,
    valid_until: NaiveDate,
    pipeline_ms: u128,
    rates: CascadeRates,
    lines: Vec<LineJson>,
    breakdown: CascadeBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    provisioning: Option<ProvisioningResult>,
}

#[derive(Serialize)]
struct LineJson {
    kind: LineKind,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    profit_percentage: Decimal,
    cost: Decimal,
    profit: Decimal,
    row_total: Decimal,
}

fn build_json(
    priced: &PricedQuotation,
    transition: Option<&TransitionOutcome>,
    pipeline_ms: u128,
) -> QuotationJson {
    let quotation = transition.map_or(&priced.quotation, |t| &t.quotation);
    QuotationJson {
        generated_at: Utc::now().to_rfc3339(),
        number: quotation.number.clone(),
        status: quotation.status,
        client: quotation.client_name.clone(),
        project: quotation.project_name.clone(),
        power_kwp: quotation.power_kwp,
        valid_until: quotation.valid_until,
        pipeline_ms,
        rates: quotation.rates,
        lines: priced
            .pricing
            .lines
            .iter()
            .map(|c| {
                let valuation = c.valuation.unwrap_or_default();
                LineJson {
                    kind: c.line.kind,
                    description: c.line.description.clone(),
                    quantity: c.line.quantity,
                    unit_price: c.line.unit_price,
                    profit_percentage: c.line.profit_percentage,
                    cost: valuation.cost,
                    profit: valuation.profit,
                    row_total: valuation.row_total,
                }
            })
            .collect(),
        breakdown: priced.pricing.breakdown,
        provisioning: transition.map(|t| t.provisioning.clone()),
    }
}

// ---------------------------------------------------------------------------
// Human output
// ---------------------------------------------------------------------------

fn percent(rate: Decimal) -> String {
    format!("{}%", (rate * Decimal::ONE_HUNDRED).normalize())
}

fn print_human(priced: &PricedQuotation, transition: Option<&TransitionOutcome>, pipeline_ms: u128) {
    let quotation = transition.map_or(&priced.quotation, |t| &t.quotation);
    let b = &priced.pricing.breakdown;
    let r = &quotation.rates;

    println!();
    println!("  \u{2554}{}\u{2557}", "\u{2550}".repeat(66));
    println!("  \u{2551}{:^66}\u{2551}", format!("SOLAR QUOTATION {}", quotation.number));
    println!("  \u{255a}{}\u{255d}", "\u{2550}".repeat(66));
    println!();
    println!(
        "  {}  \u{00b7}  {}  \u{00b7}  {} kWp  \u{00b7}  valid until {}",
        quotation.client_name, quotation.project_name, quotation.power_kwp, quotation.valid_until
    );
    println!();

    println!("  {:\u{2500}<66}", "");
    for c in &priced.pricing.lines {
        let row_total = c.valuation.map(|v| v.row_total).unwrap_or_default();
        println!(
            "  {:7} {:28} {:>8} x {:>12} {:>6}  {:>14}",
            c.line.kind.to_string(),
            truncate(&c.line.description, 28),
            c.line.quantity.normalize().to_string(),
            format_amount(c.line.unit_price),
            percent(c.line.profit_percentage),
            format_amount(row_total),
        );
    }
    println!("  {:\u{2500}<66}", "");

    let rows = [
        ("Subtotal".to_string(), b.subtotal),
        (format!("Commercial management {}", percent(r.commercial_management)), b.commercial_management),
        ("Subtotal 2".to_string(), b.subtotal2),
        (format!("Administration {}", percent(r.administration)), b.administration),
        (format!("Contingency {}", percent(r.contingency)), b.contingency),
        (format!("Profit {}", percent(r.profit)), b.profit),
        (format!("IVA on profit {}", percent(r.profit_iva)), b.profit_iva),
        ("Subtotal 3".to_string(), b.subtotal3),
        (format!("Withholdings {}", percent(r.withholding)), b.withholdings),
    ];
    for (label, amount) in rows {
        println!("  {:<44} {:>20}", label, format_amount(amount));
    }
    println!("  {:\u{2500}<66}", "");
    println!("  {:<44} {:>20}", "TOTAL (COP)", format_amount(b.total_value));
    println!();

    if let Some(t) = transition {
        println!("  Status: {}", t.quotation.status);
        match &t.provisioning {
            ProvisioningResult::Created {
                project,
                cost_center,
            } => println!(
                "  Project {} created with cost center {}",
                project.code, cost_center.code
            ),
            ProvisioningResult::AlreadyProvisioned { project_id } => {
                println!("  Project {} already exists", project_id)
            }
            ProvisioningResult::Failed { reason } => {
                println!("  Project provisioning failed: {}", reason)
            }
            ProvisioningResult::NotApplicable => {}
        }
        println!();
    }

    println!("  \u{23f1}  Priced in {}ms", pipeline_ms);
    println!();
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width - 1).collect();
        out.push('\u{2026}');
        out
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "solar_server={level},solar_pipeline={level},solar_pricing={level}"
        ))
    });
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_rates(args: &Args, config: &PricingConfig) -> Result<CascadeRates> {
    let mut rates = match &args.rates {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read rates file '{}'", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid rates file '{}'", path.display()))?
        }
        None => config.default_rates,
    };
    let overrides = [
        (&mut rates.commercial_management, args.commercial),
        (&mut rates.administration, args.administration),
        (&mut rates.contingency, args.contingency),
        (&mut rates.profit, args.profit),
        (&mut rates.profit_iva, args.profit_iva),
        (&mut rates.withholding, args.withholding),
    ];
    for (field, value) in overrides {
        if let Some(value) = value {
            *field = value;
        }
    }
    Ok(rates)
}

fn default_project_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_else(|| "Solar project".to_string())
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => PricingConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => PricingConfig::default(),
    };
    let rates = resolve_rates(&args, &config)?;

    let lines = load_lines_file(&args.lines)
        .with_context(|| format!("failed to load quotation rows from '{}'", args.lines.display()))?;
    log::info!("loaded {} rows from {}", lines.len(), args.lines.display());

    let store = Arc::new(MemoryStore::with_default_project_states());
    let service = QuotationService::new(store, Arc::new(SystemClock), config);
    let actor = Actor::new(args.user);

    let pipeline_start = Instant::now();
    let priced = service
        .create_quotation(
            &actor,
            QuotationDraft {
                client_id: args.client_id,
                client_name: args.client.clone(),
                project_name: args
                    .project
                    .clone()
                    .unwrap_or_else(|| default_project_name(&args.lines)),
                power_kwp: args.power_kwp,
                rates: Some(rates),
                lines,
            },
        )
        .await
        .context("failed to price quotation")?;
    let pipeline_ms = pipeline_start.elapsed().as_millis();

    let transition = if args.approve {
        Some(
            service
                .transition_status(
                    &actor,
                    priced.quotation.id,
                    QuotationStatus::Approved,
                    Some("approved from the command line".into()),
                )
                .await
                .context("failed to approve quotation")?,
        )
    } else {
        None
    };

    if args.json {
        let out = build_json(&priced, transition.as_ref(), pipeline_ms);
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_human(&priced, transition.as_ref(), pipeline_ms);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
