use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use colored::*;
use soundguard::{
    CaptionTokenizer, Catalog, ClipReport, DummyBackend, InferenceBackend, Pipeline,
    PipelineConfig, TextTokenizer, TextTokenizerKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "soundguard",
    about = "Caption audio clips and match them against a sound-category catalog"
)]
struct Args {
    /// Files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Caption decoder vocabulary (tokenizer.json)
    #[arg(long = "caption-vocab")]
    caption_vocab: PathBuf,

    /// Text embedding vocabulary (tokenizer.json or vocab.txt)
    #[arg(long = "text-vocab")]
    text_vocab: PathBuf,

    /// Category catalog JSON with reference embeddings
    #[arg(long = "catalog")]
    catalog: PathBuf,

    /// Pipeline config JSON; flags below override it
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Top-K categories
    #[arg(long = "top-k")]
    top_k: Option<usize>,

    /// Decoder step budget
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,

    /// Text tokenizer: word-piece | byte-level
    #[arg(long = "text-tokenizer")]
    text_tokenizer: Option<TextTokenizerKind>,

    /// Output JSON (array) to stdout only
    #[arg(long = "json", default_value_t = false)]
    json: bool,

    /// Show pretty table (stderr); disable with --show-table false
    #[arg(long = "show-table", default_value_t = true, action = clap::ArgAction::Set)]
    show_table: bool,

    /// Backend: dummy | onnx (requires --features onnx) | tract (requires --features tract)
    #[arg(long = "backend", default_value = "dummy")]
    backend: String,

    /// Directory holding encoder.onnx, decoder.onnx and embedding.onnx
    #[arg(long = "model-dir")]
    model_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(k) = args.top_k {
        cfg.top_k = k;
    }
    if let Some(n) = args.max_steps {
        cfg.max_steps = n;
    }
    if let Some(kind) = args.text_tokenizer {
        cfg.text_tokenizer = kind;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn select_backend(
    args: &Args,
    cfg: &PipelineConfig,
    caption: &CaptionTokenizer,
) -> anyhow::Result<Box<dyn InferenceBackend>> {
    let backend: Box<dyn InferenceBackend> = match args.backend.as_str() {
        "dummy" => Box::new(DummyBackend::new(
            caption.vocab_size(),
            caption.specials().eos,
            cfg.embedding_dim,
            cfg.sample_rate,
        )?),
        #[cfg(feature = "onnx")]
        "onnx" => {
            let dir = args
                .model_dir
                .as_ref()
                .context("--model-dir required for onnx")?;
            Box::new(soundguard::OrtBackend::from_dir(dir)?)
        }
        #[cfg(feature = "tract")]
        "tract" => {
            let dir = args
                .model_dir
                .as_ref()
                .context("--model-dir required for tract")?;
            Box::new(soundguard::TractBackend::from_dir(dir)?)
        }
        other => bail!("unknown or disabled backend {other:?}"),
    };
    Ok(backend)
}

fn print_table(results: &[ClipReport]) {
    let mut table = comfy_table::Table::new();
    table.set_header(vec!["File".bold(), "Caption".bold(), "Top categories".bold()]);
    for r in results {
        let fname = r.file.file_name().and_then(|s| s.to_str()).unwrap_or("?");
        let (caption, categories) = match &r.error {
            Some(err) => ("-".to_string(), err.red().to_string()),
            None => (
                r.caption.clone().unwrap_or_default(),
                r.matches
                    .iter()
                    .map(|m| format!("{} ({:.2})", m.label, m.score))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        };
        table.add_row(vec![fname.to_string(), caption, categories]);
    }
    eprintln!("{}", "Results".green().bold());
    eprintln!("{}", table);
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let cfg = load_config(&args)?;
    let caption = CaptionTokenizer::from_path(&args.caption_vocab)
        .with_context(|| format!("load caption vocab {}", args.caption_vocab.display()))?;
    let text = TextTokenizer::from_path(&args.text_vocab, cfg.text_tokenizer, cfg.max_text_len)
        .with_context(|| format!("load text vocab {}", args.text_vocab.display()))?;
    let catalog = Catalog::from_path(&args.catalog)
        .with_context(|| format!("load catalog {}", args.catalog.display()))?;

    let backend = select_backend(&args, &cfg, &caption)?;
    let pipeline = Pipeline::new(backend, caption, text, Arc::new(catalog), cfg)?;
    let results = pipeline.infer_paths(args.paths.clone())?;

    if args.show_table && !args.json {
        print_table(&results);
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
