//! Comment Insights CLI
//!
//! The `insights` command runs batch AI analysis over a spreadsheet of
//! customer comments and writes an Excel report.
//!
//! ## Commands
//!
//! - `analyze`: analyse a file and write the report
//! - `inspect`: show the detected columns and row counts
//! - `plan`: show the batch plan and token budget without calling the API
//! - `config`: print the effective configuration (key redacted)

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use insights_core::batcher::estimate_input_tokens;
use insights_core::{
    inspect_file, read_comments, render_summary_markdown, write_excel_report, write_json,
    AnalysisConfig, AnalysisSpan, BatchPlan, FileInspection, Services,
};

#[derive(Parser)]
#[command(name = "insights")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch sentiment, emotion and theme analysis of customer comments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Project config file (default: ./insights.toml when present)
    #[arg(long, global = true, env = "INSIGHTS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a comment file and write the report
    Analyze {
        /// Spreadsheet or CSV with a comment column
        file: PathBuf,

        /// Excel report path (default: <file>_insights.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also dump the full analysis as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,

        /// Override the configured batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show detected columns and row counts
    Inspect {
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the batch plan and token budget (no API calls)
    Plan {
        file: PathBuf,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    insights_core::init_tracing(
        cli.json_logs,
        insights_core::telemetry::level_for(cli.verbose),
    );

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AnalysisConfig::load_with_dotenv(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Analyze {
            file,
            output,
            json,
            model,
            batch_size,
        } => {
            let config = apply_overrides(config, model, batch_size)?;
            cmd_analyze(config, &file, output.as_deref(), json.as_deref()).await
        }
        Commands::Inspect { file, json } => cmd_inspect(&config, &file, json),
        Commands::Plan {
            file,
            model,
            batch_size,
        } => {
            let config = apply_overrides(config, model, batch_size)?;
            cmd_plan(&config, &file)
        }
        Commands::Config => cmd_config(&config),
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(
    mut config: AnalysisConfig,
    model: Option<String>,
    batch_size: Option<usize>,
) -> Result<AnalysisConfig> {
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }
    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

/// `survey.xlsx` -> `survey_insights.xlsx` in the same directory.
fn default_report_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("comments");
    input.with_file_name(format!("{stem}_insights.xlsx"))
}

/// Analyse a file end to end
async fn cmd_analyze(
    config: AnalysisConfig,
    file: &Path,
    output: Option<&Path>,
    json: Option<&Path>,
) -> Result<()> {
    let ingested = read_comments(file, config.max_comments)
        .with_context(|| format!("Failed to read comments from {}", file.display()))?;
    let services = Services::from_config(&config)?;
    let pipeline = services.pipeline();

    let analysis = pipeline
        .analyze(ingested.comments)
        .await
        .context("Analysis failed")?;

    let _span = AnalysisSpan::enter(&analysis.analysis_id.to_string());
    let report_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_report_path(file));
    write_excel_report(&analysis, &report_path)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    if let Some(json_path) = json {
        write_json(&analysis, json_path)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
    }

    println!("{}", render_summary_markdown(&analysis));
    println!("Report: {}", report_path.display());
    info!(
        cache_hits = services.cache().stats().hits,
        report = %report_path.display(),
        "analysis complete"
    );
    Ok(())
}

/// Show detected columns and row counts
fn cmd_inspect(config: &AnalysisConfig, file: &Path, json: bool) -> Result<()> {
    let inspection = inspect_file(file, config.max_comments)
        .with_context(|| format!("Failed to inspect {}", file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print!("{}", render_inspection(&inspection));
    }
    Ok(())
}

fn render_inspection(inspection: &FileInspection) -> String {
    let columns = &inspection.columns;
    let optional = |c: &Option<insights_core::ingest::ColumnRef>| {
        c.as_ref()
            .map(|c| format!("{} (column {})", c.header, c.index + 1))
            .unwrap_or_else(|| "-".to_string())
    };
    let mut out = String::new();
    out.push_str(&format!("File:          {}\n", inspection.path.display()));
    if let Some(sheet) = &inspection.sheet {
        out.push_str(&format!("Sheet:         {sheet}\n"));
    }
    out.push_str(&format!(
        "Comment:       {} (column {})\n",
        columns.comment.header,
        columns.comment.index + 1
    ));
    out.push_str(&format!("NPS:           {}\n", optional(&columns.nps)));
    out.push_str(&format!("Satisfaction:  {}\n", optional(&columns.satisfaction)));
    out.push_str(&format!(
        "Rows:          {} read, {} kept, {} skipped, {} over limit\n",
        inspection.rows_read,
        inspection.rows_kept,
        inspection.rows_skipped,
        inspection.rows_truncated
    ));
    out
}

/// Show the batch plan without calling the API
fn cmd_plan(config: &AnalysisConfig, file: &Path) -> Result<()> {
    let ingested = read_comments(file, config.max_comments)
        .with_context(|| format!("Failed to read comments from {}", file.display()))?;
    let plan = BatchPlan::new(config, ingested.comments.len());
    print!("{}", render_plan(&plan, plan.runs_parallel(&config.parallel)));
    Ok(())
}

fn render_plan(plan: &BatchPlan, parallel: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Model:         {} (context {}, max output {})\n",
        plan.model, plan.profile.context_window, plan.profile.max_output_tokens
    ));
    out.push_str(&format!("Comments:      {}\n", plan.total_comments));
    out.push_str(&format!(
        "Batch size:    {}{}\n",
        plan.batch_size,
        if plan.reduced {
            format!(" (reduced from {})", plan.configured_batch_size)
        } else {
            String::new()
        }
    ));
    out.push_str(&format!("Batches:       {}\n", plan.batch_count));
    out.push_str(&format!(
        "Tokens/batch:  ~{} in, {} max out\n",
        estimate_input_tokens(plan.batch_size),
        plan.max_tokens
    ));
    out.push_str(&format!(
        "Mode:          {}\n",
        if parallel { "parallel" } else { "sequential" }
    ));
    out
}

/// Print the effective configuration
fn cmd_config(config: &AnalysisConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    println!("api_key: {}", config.redacted_api_key());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("survey.csv");
        let mut body = String::from("id,comentario,nps\n");
        for i in 1..=rows {
            body.push_str(&format!("{i},comentario numero {i},{}\n", i % 11));
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_analyze_with_globals() {
        let cli = Cli::try_parse_from([
            "insights",
            "analyze",
            "survey.xlsx",
            "-o",
            "out.xlsx",
            "--batch-size",
            "10",
            "--verbose",
            "--json-logs",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.json_logs);
        match cli.command {
            Commands::Analyze {
                file,
                output,
                batch_size,
                model,
                json,
            } => {
                assert_eq!(file, PathBuf::from("survey.xlsx"));
                assert_eq!(output, Some(PathBuf::from("out.xlsx")));
                assert_eq!(batch_size, Some(10));
                assert!(model.is_none());
                assert!(json.is_none());
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_default_report_path() {
        assert_eq!(
            default_report_path(Path::new("/data/survey.xlsx")),
            PathBuf::from("/data/survey_insights.xlsx")
        );
    }

    #[test]
    fn test_overrides_are_validated() {
        let config = apply_overrides(AnalysisConfig::default(), Some("gpt-4o".into()), Some(40))
            .unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.batch_size, 40);
        assert!(apply_overrides(AnalysisConfig::default(), None, Some(0)).is_err());
    }

    #[test]
    fn test_render_plan_for_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), 45);
        let config = AnalysisConfig::default();
        let file = read_comments(&path, config.max_comments).unwrap();
        let plan = BatchPlan::new(&config, file.comments.len());

        let text = render_plan(&plan, plan.runs_parallel(&config.parallel));
        assert!(text.contains("Comments:      45"));
        assert!(text.contains("Batches:       3"));
        assert!(text.contains("sequential"));
    }

    #[test]
    fn test_render_inspection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), 3);
        let inspection = inspect_file(&path, 100).unwrap();
        let text = render_inspection(&inspection);
        assert!(text.contains("Comment:       comentario (column 2)"));
        assert!(text.contains("NPS:           nps (column 3)"));
        assert!(text.contains("3 read, 3 kept"));
    }

    #[tokio::test]
    async fn test_analyze_without_key_fails_before_calling_api() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), 3);
        let err = cmd_analyze(AnalysisConfig::default(), &path, None, None)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("api_key"));
    }
}
