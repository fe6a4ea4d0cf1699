use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::canonical::CanonicalMode;
use crate::catalog::{production_coverage, status_audit};
use crate::config::PipelineConfig;
use crate::constants::canonical::DEFAULT_DELIMITER;
use crate::metrics::{
    KeyCount, category_counts, detect_anomalies, failure_code_counts, model_counts, rare_keys,
};
use crate::pipeline::{ReconciliationReport, Reconciler};
use crate::ppm::{
    AggregationBucket, CorrectionOverlay, Granularity, MonthlyDetailRow, sort_by_ppm_desc,
};
use crate::transport::write_delimited;

const SUMMARY_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Keep every token, join with `--delimiter`.
    Delimited,
    /// Drop stopwords, join with spaces.
    Stopword,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GranularityArg {
    Day,
    Month,
    Year,
    Model,
    Category,
}

impl From<GranularityArg> for Granularity {
    fn from(value: GranularityArg) -> Self {
        match value {
            GranularityArg::Day => Granularity::Day,
            GranularityArg::Month => Granularity::Month,
            GranularityArg::Year => Granularity::Year,
            GranularityArg::Model => Granularity::Model,
            GranularityArg::Category => Granularity::Category,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "ppm_report",
    disable_help_subcommand = true,
    about = "Reconcile production and defect logs and report PPM",
    long_about = "Resolve defect models through the catalog, classify failure descriptions, and compute defects per million produced units.",
    after_help = "Files are read from the conventional layout under --data-dir: data/raw/*.csv, data/processed/catalogo_lookup.parquet, models/*."
)]
/// CLI for `ppm_report`.
///
/// Common usage:
/// - Monthly PPM per model: `--mode delimited`
/// - Yearly PPM written to CSV: `--mode delimited --granularity year --output ppm.csv`
/// - Detail rows with corrections applied: `--mode stopword --monthly-detail`
struct PpmReportCli {
    #[arg(
        long = "data-dir",
        value_name = "PATH",
        default_value = ".",
        help = "Root holding the data/ and models/ directories"
    )]
    data_dir: PathBuf,
    #[arg(
        long,
        value_enum,
        help = "Canonicalization mode the catalog and lexicon were keyed with"
    )]
    mode: ModeArg,
    #[arg(
        long,
        default_value_t = DEFAULT_DELIMITER,
        value_parser = parse_delimiter,
        help = "Token delimiter for --mode delimited"
    )]
    delimiter: char,
    #[arg(
        long,
        value_enum,
        default_value_t = GranularityArg::Month,
        help = "Aggregation key for the PPM table"
    )]
    granularity: GranularityArg,
    #[arg(long, value_name = "PATH", help = "Write the table as CSV instead of printing it")]
    output: Option<PathBuf>,
    #[arg(
        long = "monthly-detail",
        help = "Report per date/model/code/description rows with the correction overlay applied"
    )]
    monthly_detail: bool,
    #[arg(long = "no-synonyms", help = "Disable technical synonym rewrites")]
    no_synonyms: bool,
}

/// Entry point for the `ppm_report` binary. `args_iter` excludes the program name.
pub fn run_ppm_report<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<PpmReportCli, _>(std::iter::once("ppm_report".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let mode = match cli.mode {
        ModeArg::Delimited => CanonicalMode::Delimited {
            delimiter: cli.delimiter,
        },
        ModeArg::Stopword => CanonicalMode::StopwordStripped,
    };
    let mut config = PipelineConfig::with_data_dir(&cli.data_dir, mode);
    config.use_synonyms = !cli.no_synonyms;

    let reconciler = Reconciler::open(&config)?;
    let report = reconciler.run(&config)?;

    let (headers, rows) = if cli.monthly_detail {
        let overlay = CorrectionOverlay::load(&config.corrections)?;
        monthly_table(&report.monthly_detail(&overlay))
    } else {
        let mut buckets = report.ppm(cli.granularity.into());
        sort_by_ppm_desc(&mut buckets);
        bucket_table(&buckets)
    };

    match &cli.output {
        Some(path) => {
            write_delimited(path, &headers, &rows)?;
            println!("wrote {} rows to {}", rows.len(), path.display());
        }
        None => print_table(&headers, &rows),
    }
    println!();
    print_summary(&reconciler, &report, &config);
    Ok(())
}

fn parse_delimiter(raw: &str) -> Result<char, String> {
    let mut chars = raw.chars();
    let (Some(delimiter), None) = (chars.next(), chars.next()) else {
        return Err(format!("--delimiter must be a single character, got '{raw}'"));
    };
    if delimiter.is_alphanumeric() || delimiter.is_whitespace() {
        return Err(format!(
            "--delimiter must be punctuation, got '{delimiter}'"
        ));
    }
    Ok(delimiter)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn bucket_table(buckets: &[AggregationBucket]) -> (Vec<&'static str>, Vec<Vec<String>>) {
    let headers = vec!["PERIOD", "GROUP", "DEFECTS", "PRODUCTION", "PPM"];
    let rows = buckets
        .iter()
        .map(|bucket| {
            vec![
                bucket
                    .key
                    .period
                    .map(|period| period.to_string())
                    .unwrap_or_default(),
                bucket.label.clone(),
                bucket.defect_count.to_string(),
                format_quantity(bucket.production_qty),
                format!("{:.2}", bucket.ppm),
            ]
        })
        .collect();
    (headers, rows)
}

fn monthly_table(detail: &[MonthlyDetailRow]) -> (Vec<&'static str>, Vec<Vec<String>>) {
    let headers = vec![
        "DATE",
        "MODEL",
        "FAILURE_CODE",
        "DESCRIPTION",
        "DEFECTS",
        "PRODUCTION",
        "PPM",
    ];
    let rows = detail
        .iter()
        .map(|row| {
            vec![
                row.date
                    .map(|date| date.format("%d/%m/%Y").to_string())
                    .unwrap_or_default(),
                row.model.clone(),
                row.failure_code.clone(),
                row.description.clone(),
                row.defect_count.to_string(),
                format_quantity(row.production_qty),
                format!("{:.2}", row.ppm),
            ]
        })
        .collect();
    (headers, rows)
}

fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        format!("{quantity:.2}")
    }
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}", width = *width))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(headers.to_vec()));
    for row in rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

fn print_summary(reconciler: &Reconciler, report: &ReconciliationReport, config: &PipelineConfig) {
    let lookup = reconciler.catalog().lookup();
    let status = status_audit(lookup);
    let coverage = production_coverage(&report.production_models(), lookup);
    let join = report.join_audit();
    let agreement = report.agreement();
    let codes = failure_code_counts(&report.defect_facts());

    println!("=== reconciliation summary ===");
    println!(
        "production rows: {} kept / {} read (dates coerced: {})",
        report.production.len(),
        report.production_skipped.rows_read,
        report.production_skipped.malformed_date
    );
    println!(
        "defect rows    : {} kept / {} read (dates coerced: {})",
        report.defects.len(),
        report.defect_skipped.rows_read,
        report.defect_skipped.malformed_date
    );
    println!(
        "catalog        : {} entries, {} OK, {} not counted",
        status.total, status.ok, status.not_counted
    );
    println!(
        "coverage       : {:.1}% of {} production models",
        coverage.kpi, coverage.total_models
    );
    println!(
        "classifier     : {:.1}% agreement over {} recorded codes{}",
        agreement.kpi * 100.0,
        agreement.total,
        if reconciler.classifier().has_model() {
            ""
        } else {
            " (lexicon only)"
        }
    );
    println!();
    println!("[JOIN]");
    println!("  defect models without production: {}", join.missing_in_production.len());
    for model in &join.missing_in_production {
        println!("    {model}");
    }
    println!("  produced models without defects : {}", join.missing_in_defects.len());

    let facts = report.defect_facts();
    print_counts("[TOP MODELS]", &model_counts(&facts, Some(SUMMARY_TOP_N)));
    print_counts("[TOP CATEGORIES]", &category_counts(&facts, Some(SUMMARY_TOP_N)));

    let anomalies = detect_anomalies(&codes, config.anomaly_z);
    if !anomalies.is_empty() {
        println!();
        println!("[ANOMALIES z >= {}]", config.anomaly_z);
        for anomaly in &anomalies {
            println!("  {:<12} {:>6}  z={:.2}", anomaly.key, anomaly.count, anomaly.z_score);
        }
    }
    let rare = rare_keys(&codes, config.rare_threshold);
    if !rare.is_empty() {
        println!();
        println!("[RARE CODES <= {}]", config.rare_threshold);
        for code in &rare {
            println!("  {:<12} {:>6}", code.key, code.count);
        }
    }
}

fn print_counts(title: &str, counts: &[KeyCount]) {
    if counts.is_empty() {
        return;
    }
    println!();
    println!("{title}");
    for entry in counts {
        println!("  {:<40} {:>6}", entry.key, entry.count);
    }
}
