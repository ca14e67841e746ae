use chrono::Utc;
use clap::{Parser, Subcommand};
use shipment_extract_core::{
    evaluate, save_shipment, AnthropicTransport, ComparatorTable, ExtractionClient,
    ExtractionConfig, GroundTruth, InMemoryMetrics, PdfiumRenderer, ShipmentPipeline,
    ShipmentResponse, UploadedDocument,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pages rendered per PDF by the evaluation run.
const EVALUATION_MAX_PAGES: usize = 2;

#[derive(Parser)]
#[command(name = "shipment-extract", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model used for extraction
    #[arg(long, global = true, env = "EXTRACTION_MODEL")]
    model: Option<String>,

    /// Messages API base URL
    #[arg(long, global = true, env = "ANTHROPIC_BASE_URL")]
    base_url: Option<String>,

    /// Output token budget for the extraction call
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Upstream request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Model calls allowed when the output fails schema validation
    #[arg(long, global = true)]
    validation_attempts: Option<u32>,

    /// Directory holding the pdfium shared library
    #[arg(long, global = true, env = "PDFIUM_LIBRARY_DIR")]
    pdfium_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract shipment data from a Bill of Lading PDF and a packing list spreadsheet.
    Extract {
        /// Bill of Lading PDF.
        #[arg(long)]
        pdf: PathBuf,
        /// Packing list / invoice spreadsheet(s).
        #[arg(long, required = true)]
        spreadsheet: Vec<PathBuf>,
        /// Pages rendered from the PDF.
        #[arg(long, env = "EXTRACTION_MAX_PAGES")]
        max_pages: Option<usize>,
        /// Also write the response to a timestamped JSON file in this directory.
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Print collected metrics in Prometheus text format.
        #[arg(long, default_value_t = false)]
        print_metrics: bool,
    },
    /// Extract from a document pair and score it field by field against ground truth.
    Evaluate {
        /// Bill of Lading PDF.
        #[arg(long)]
        pdf: PathBuf,
        /// Packing list / invoice spreadsheet.
        #[arg(long)]
        spreadsheet: PathBuf,
        /// JSON file with expected values; defaults to the bundled sample record.
        #[arg(long)]
        ground_truth: Option<PathBuf>,
    },
    /// Save an (edited) shipment response JSON to a timestamped file.
    Save {
        /// Response JSON to save.
        #[arg(long)]
        input: PathBuf,
        /// Target directory.
        #[arg(long, default_value = "data")]
        dir: PathBuf,
    },
}

impl Cli {
    fn extraction_config(&self, max_pages: Option<usize>) -> anyhow::Result<ExtractionConfig> {
        let mut config = ExtractionConfig::from_env()?;
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout = std::time::Duration::from_secs(timeout);
        }
        if let Some(attempts) = self.validation_attempts {
            config.validation_attempts = attempts;
        }
        if let Some(max_pages) = max_pages {
            config.max_pages = max_pages;
        }
        config.validate()?;
        Ok(config)
    }

    fn renderer(&self) -> PdfiumRenderer {
        PdfiumRenderer {
            library_dir: self.pdfium_dir.clone(),
            ..Default::default()
        }
    }
}

fn build_pipeline(
    cli: &Cli,
    config: ExtractionConfig,
    metrics: Arc<InMemoryMetrics>,
) -> anyhow::Result<ShipmentPipeline<PdfiumRenderer, AnthropicTransport>> {
    let transport = AnthropicTransport::new(&config)?;
    let client = ExtractionClient::new(transport, metrics.clone(), config);
    Ok(ShipmentPipeline::new(cli.renderer(), client, metrics))
}

fn read_uploads(pdf: &Path, spreadsheets: &[PathBuf]) -> anyhow::Result<Vec<UploadedDocument>> {
    let mut uploads = vec![UploadedDocument::read(pdf)?];
    for path in spreadsheets {
        uploads.push(UploadedDocument::read(path)?);
    }
    Ok(uploads)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "shipment-extract boot"
    );

    match &cli.command {
        Command::Extract {
            pdf,
            spreadsheet,
            max_pages,
            save_dir,
            print_metrics,
        } => {
            let metrics = Arc::new(InMemoryMetrics::new());
            let pipeline = build_pipeline(&cli, cli.extraction_config(*max_pages)?, metrics.clone())?;
            let uploads = read_uploads(pdf, spreadsheet)?;

            let outcome = pipeline.process_uploads(uploads).await;
            if *print_metrics {
                print!("{}", metrics.render_prometheus());
            }
            let response = outcome.map_err(|error| {
                let fault = if error.is_client_fault() { "input" } else { "server" };
                warn!(fault, %error, "extraction failed");
                anyhow::anyhow!("extraction failed ({fault} fault): {error}")
            })?;

            println!("{}", serde_json::to_string_pretty(&response)?);

            if let Some(dir) = save_dir {
                let path = save_shipment(&response, dir)?;
                info!(path = %path.display(), "shipment saved");
            }
        }
        Command::Evaluate {
            pdf,
            spreadsheet,
            ground_truth,
        } => {
            let truth = match ground_truth {
                Some(path) => GroundTruth::load(path)?,
                None => GroundTruth::default(),
            };

            println!("--- Starting Evaluation ---");
            let metrics = Arc::new(InMemoryMetrics::new());
            let pipeline = build_pipeline(
                &cli,
                cli.extraction_config(Some(EVALUATION_MAX_PAGES))?,
                metrics,
            )?;
            let uploads = read_uploads(pdf, std::slice::from_ref(spreadsheet))?;

            println!("Processing files and calling the model...");
            let extracted = match pipeline.process_uploads(uploads).await {
                Ok(response) => response,
                Err(error) => {
                    println!("Extraction Failed: {error}");
                    return Err(error.into());
                }
            };

            let report = evaluate(&extracted, &truth, &ComparatorTable::default());
            println!("\n--- Comparison Results ---");
            print!("{}", report.render_table());
            println!("\n--- Final Metrics ---");
            print!("{}", report.render_summary());
        }
        Command::Save { input, dir } => {
            let json = std::fs::read_to_string(input)?;
            let response: ShipmentResponse = serde_json::from_str(&json)?;
            let path = save_shipment(&response, dir)?;
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            println!("Data saved successfully: {file_name}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "shipment-extract",
            "extract",
            "--pdf",
            "bl.pdf",
            "--spreadsheet",
            "packing.xlsx",
            "--model",
            "claude-test",
            "--timeout-secs",
            "30",
        ])
        .expect("flags after the subcommand");

        assert_eq!(cli.model.as_deref(), Some("claude-test"));
        assert_eq!(cli.timeout_secs, Some(30));
        assert!(matches!(cli.command, Command::Extract { .. }));
    }

    #[test]
    fn global_options_parse_before_the_subcommand() {
        let cli = Cli::try_parse_from([
            "shipment-extract",
            "--validation-attempts",
            "2",
            "save",
            "--input",
            "edited.json",
        ])
        .expect("flags before the subcommand");

        assert_eq!(cli.validation_attempts, Some(2));
        assert!(matches!(cli.command, Command::Save { .. }));
    }
}
