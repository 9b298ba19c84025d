use crate::infra::Backend;
use clap::Args;
use fuel_rewards::commission::{CommissionResult, EvaluationRequest};
use fuel_rewards::config::{AppConfig, SeedConfig};
use fuel_rewards::error::AppError;
use fuel_rewards::import;
use fuel_rewards::recalculation::{CancellationFlag, RecalculationSummary};
use fuel_rewards::telemetry;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Sale amount in currency units
    #[arg(long)]
    pub(crate) amount: Decimal,
    /// Loyalty tier of the selling user (lead, bronze, silver, gold, platinum)
    #[arg(long)]
    pub(crate) tier: String,
    /// Liters sold
    #[arg(long, default_value_t = Decimal::ZERO)]
    pub(crate) liters: Decimal,
    #[arg(long)]
    pub(crate) sales_count: Option<u64>,
    #[arg(long)]
    pub(crate) network_size: Option<u64>,
    #[arg(long)]
    pub(crate) growth_rate: Option<Decimal>,
    /// Settings JSON file (defaults to APP_SETTINGS_PATH, then built-in defaults)
    #[arg(long)]
    pub(crate) settings: Option<PathBuf>,
    /// Rule drafts JSON file (defaults to APP_RULES_PATH)
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct RecalculateArgs {
    /// Historical sales CSV
    #[arg(long)]
    pub(crate) sales: PathBuf,
    /// User profiles CSV
    #[arg(long)]
    pub(crate) users: PathBuf,
    /// Settings JSON file (defaults to APP_SETTINGS_PATH, then built-in defaults)
    #[arg(long)]
    pub(crate) settings: Option<PathBuf>,
    /// Rule drafts JSON file (defaults to APP_RULES_PATH)
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Override APP_RECALC_WORKERS
    #[arg(long, value_parser = parse_workers)]
    pub(crate) workers: Option<usize>,
    /// Write the recalculated sales to this CSV file
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

fn parse_workers(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(workers) if workers > 0 => Ok(workers),
        _ => Err(format!("'{raw}' is not a positive worker count")),
    }
}

fn seed_for(
    config: &AppConfig,
    settings: Option<PathBuf>,
    rules: Option<PathBuf>,
) -> SeedConfig {
    SeedConfig {
        settings_path: settings.or_else(|| config.seed.settings_path.clone()),
        rules_path: rules.or_else(|| config.seed.rules_path.clone()),
    }
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let EvaluateArgs {
        amount,
        tier,
        liters,
        sales_count,
        network_size,
        growth_rate,
        settings,
        rules,
    } = args;

    let backend = Backend::seeded(&seed_for(&config, settings, rules))?;
    let result = backend.service.evaluate(EvaluationRequest {
        sales_amount: amount,
        user_tier: tier,
        liters,
        sales_count,
        network_size,
        growth_rate,
    })?;

    render_evaluation(&result);
    Ok(())
}

pub(crate) async fn run_recalculate(args: RecalculateArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let RecalculateArgs {
        sales,
        users,
        settings,
        rules,
        workers,
        output,
    } = args;
    if let Some(workers) = workers {
        config.recalculation.workers = workers;
    }

    let backend = Backend::seeded(&seed_for(&config, settings, rules))?;
    backend
        .sales
        .load(import::sales_from_path(&sales)?, import::users_from_path(&users)?);

    let job = backend.recalculation_job(config.recalculation.clone());
    let summary = job.run(&CancellationFlag::new()).await?;
    render_summary(&summary);

    if let Some(path) = output {
        let file = File::create(&path)?;
        import::write_sales(BufWriter::new(file), &backend.sales.sales())?;
        println!("Recalculated sales written to {}", path.display());
    }

    Ok(())
}

fn render_evaluation(result: &CommissionResult) {
    println!("Commission evaluation");
    println!("  Rule used: {}", result.rule_used);
    println!("  Commission: {}", result.commission_amount);
    println!("  Effective rate: {}%", result.commission_rate);
    println!("  Cashback: {}", result.cashback_amount);
    println!("  Settings: {}", result.settings_snapshot.reference);
}

fn render_summary(summary: &RecalculationSummary) {
    println!("Commission recalculation ({})", summary.snapshot_reference);
    println!("  Rules loaded: {}", summary.rules_loaded);
    println!(
        "  Sales: {} total, {} updated, {} skipped, {} errored",
        summary.total, summary.updated, summary.skipped, summary.errored
    );
    if summary.cancelled {
        println!("  Run was cancelled before every sale was processed");
    }
    for failure in &summary.failures {
        match &failure.sale_id {
            Some(sale_id) => println!("  - {sale_id}: {}", failure.reason),
            None => println!("  - {}", failure.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_parser_rejects_zero() {
        assert_eq!(parse_workers("3"), Ok(3));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn explicit_paths_override_configured_seed() {
        let mut config = test_config();
        config.seed.settings_path = Some(PathBuf::from("/etc/rewards/settings.json"));
        config.seed.rules_path = Some(PathBuf::from("/etc/rewards/rules.json"));

        let seed = seed_for(&config, Some(PathBuf::from("local.json")), None);

        assert_eq!(seed.settings_path, Some(PathBuf::from("local.json")));
        assert_eq!(seed.rules_path, Some(PathBuf::from("/etc/rewards/rules.json")));
    }

    fn test_config() -> AppConfig {
        use fuel_rewards::config::{
            AppEnvironment, RecalculationConfig, ServerConfig, TelemetryConfig,
        };

        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
            recalculation: RecalculationConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}
