use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faq_core::{
    decide, evaluate_cases, ingest_directory, load_embedder, load_knowledge_base,
    read_eval_cases_json, save_index_jsonl, Assistant, AssistantConfig, Decision,
    EmbeddingProvider, KnowledgeBase, KnowledgeSource, OpenAiChatGenerator, ParquetVectorStore,
    DEFAULT_CHAT_MODEL, DEFAULT_COLLECTION, DEFAULT_OPENAI_BASE_URL, DEFAULT_REQUIRED_PASS_RATE,
    DEFAULT_THRESHOLD,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "faq")]
#[command(about = "Telecom FAQ assistant tooling")]
struct Cli {
    /// all-MiniLM-L6-v2 .safetensors weights. Without it the hashing embedder is used.
    #[arg(long, global = true, env = "FAQ_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Path to the tokenizer.json file. Required when --model-path is set.
    #[arg(long, global = true, env = "FAQ_TOKENIZER_PATH")]
    tokenizer_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Embed a FAQ dataset and write the index.
    BuildIndex {
        /// FAQ dataset (JSONL). Defaults to the built-in telecom FAQs.
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Run the matcher only; never calls the fallback.
    Query {
        #[arg(long)]
        question: String,
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },
    /// Answer a question end to end, including the LLM fallback.
    Ask {
        #[arg(long)]
        question: String,
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
        #[arg(long, env = "FAQ_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
        chat_model: String,
        #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
        openai_base_url: String,
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_api_key: Option<String>,
    },
    /// Embed every .txt file of a directory into a vector collection.
    Ingest {
        #[arg(long, default_value = "data/faqs")]
        docs: PathBuf,
        #[arg(long, default_value = "vector_db")]
        db: PathBuf,
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,
    },
    /// Score labeled cases against the matcher.
    Eval {
        #[arg(long)]
        cases: PathBuf,
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
        #[arg(long, default_value_t = DEFAULT_REQUIRED_PASS_RATE)]
        min_pass_rate: f32,
    },
}

fn make_embedder(cli: &Cli) -> Result<Box<dyn EmbeddingProvider>> {
    load_embedder(cli.model_path.as_deref(), cli.tokenizer_path.as_deref())
}

fn knowledge_base(
    dataset: &Option<PathBuf>,
    index: &Option<PathBuf>,
    embedder: &dyn EmbeddingProvider,
) -> Result<KnowledgeBase> {
    let source = KnowledgeSource::resolve(dataset.clone(), index.clone());
    load_knowledge_base(&source, embedder)
}

fn run() -> Result<()> {
    // OPENAI_API_KEY and friends may live in a .env file; a missing file is fine.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::BuildIndex { dataset, output } => {
            let embedder = make_embedder(&cli)?;
            let kb = knowledge_base(dataset, &None, embedder.as_ref())?;
            save_index_jsonl(output, kb.entries())?;
            println!(
                "model={} indexed_entries={} output={}",
                kb.model_id(),
                kb.len(),
                output.display()
            );
        }
        Commands::Query {
            question,
            dataset,
            index,
            threshold,
        } => {
            let embedder = make_embedder(&cli)?;
            let kb = knowledge_base(dataset, index, embedder.as_ref())?;
            let q = embedder.embed(question.trim())?;
            let result = decide(&q, &kb, *threshold)?;

            println!(
                "model={} decision={:?} score={:.4} entry_id={}",
                kb.model_id(),
                result.decision,
                result.score,
                result.entry_id
            );
            if result.decision == Decision::Hit {
                println!("answer={}", result.answer.as_deref().unwrap_or(""));
            }
        }
        Commands::Ask {
            question,
            dataset,
            index,
            threshold,
            chat_model,
            openai_base_url,
            openai_api_key,
        } => {
            let api_key = openai_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .context("OPENAI_API_KEY is missing or empty")?;

            let embedder: Arc<dyn EmbeddingProvider> = Arc::from(make_embedder(&cli)?);
            let kb = knowledge_base(dataset, index, embedder.as_ref())?;
            let config = AssistantConfig::default().with_threshold(*threshold);
            let generator = OpenAiChatGenerator::with_endpoint(
                api_key,
                openai_base_url,
                chat_model,
                Some(config.fallback_timeout),
            )?;
            let assistant = Assistant::new(kb, embedder, Arc::new(generator), config)?;

            let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
            let answer = runtime.block_on(assistant.handle(question))?;
            let source = if answer.is_generated() { "generated" } else { "faq" };
            println!("source={source}");
            println!("answer={}", answer.text);
        }
        Commands::Ingest {
            docs,
            db,
            collection,
        } => {
            let embedder = make_embedder(&cli)?;
            let store = ParquetVectorStore::open(db, collection)?;
            match ingest_directory(docs, &store, embedder.as_ref())? {
                Some(report) => println!(
                    "model={} upserted={} collection={} collection_size={} path={}",
                    embedder.model_id(),
                    report.upserted,
                    collection,
                    report.collection_size,
                    store.path().display()
                ),
                None => println!("no documents found in {}", docs.display()),
            }
        }
        Commands::Eval {
            cases,
            dataset,
            index,
            threshold,
            min_pass_rate,
        } => {
            let embedder = make_embedder(&cli)?;
            let kb = knowledge_base(dataset, index, embedder.as_ref())?;
            let cases = read_eval_cases_json(cases)?;
            let summary = evaluate_cases(embedder.as_ref(), &kb, &cases, *threshold)?;
            let meets = summary.meets(*min_pass_rate);

            println!(
                "model={} threshold={:.2} total={} passed={} failed={} pass_rate={:.4} required={:.4} meets_threshold={}",
                kb.model_id(),
                threshold,
                summary.total,
                summary.passed,
                summary.failed,
                summary.pass_rate,
                min_pass_rate,
                meets
            );

            for o in &summary.outcomes {
                println!(
                    "case={} passed={} decision={:?} faq_id={} score={:.4} latency={:.1}ms",
                    o.case_id, o.passed, o.actual_decision, o.nearest_faq_id, o.score, o.latency_ms
                );
            }
            println!("avg_latency={:.1}ms", summary.avg_latency_ms());

            if !meets {
                bail!(
                    "pass rate {:.4} is below the required {:.4}",
                    summary.pass_rate,
                    min_pass_rate
                );
            }
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
