use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

use tweet_word_rnn::checkpoint::{latest_run_dir, load_history, write_error_log, MODEL_FILE};
use tweet_word_rnn::config::RunConfig;
use tweet_word_rnn::corpus::{join_tweets, load_tweets};
use tweet_word_rnn::embedding::EmbeddingTable;
use tweet_word_rnn::generator::generate_text;
use tweet_word_rnn::model::LinearBaseline;
use tweet_word_rnn::resolver::{NearestWordResolver, DIAGNOSTIC_TOP_K};
use tweet_word_rnn::tokenizer::Tokenizer;
use tweet_word_rnn::training::{fit_resumed, SamplingHandler, TrainingData, TrainingHistory};
use tweet_word_rnn::windows::make_windows;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Word-level tweet generation over GloVe Twitter vectors", long_about = None)]
struct CliArgs {
    /// JSON run configuration; defaults are used when omitted
    #[clap(long, value_parser)]
    config: Option<PathBuf>,
    /// Log per-token generation traces and neighbour rankings
    #[clap(short, long)]
    verbose: bool,
    #[clap(long, value_parser)]
    embeddings_path: Option<PathBuf>,
    #[clap(long, value_parser)]
    corpus_path: Option<PathBuf>,
    #[clap(long, value_parser)]
    total_epochs: Option<usize>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the baseline model, saving it with samples and loss history per epoch
    Train {
        /// Continue the latest run of this configuration
        #[clap(long)]
        resume: bool,
    },
    /// Generate text from a saved model
    Generate {
        #[clap(long, value_parser)]
        seed: Option<String>,
        #[clap(long, value_parser)]
        size: Option<usize>,
        /// Saved `model.json`; an untrained model is used when omitted
        #[clap(long, value_parser)]
        model: Option<PathBuf>,
    },
    /// Print the nearest table words to a word's vector
    Nearest {
        #[clap(long, value_parser)]
        word: String,
    },
}

fn resolve_config(args: &CliArgs) -> Result<RunConfig, Box<dyn Error>> {
    let base = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let config = RunConfig {
        embeddings_path: args.embeddings_path.clone().unwrap_or(base.embeddings_path.clone()),
        corpus_path: args.corpus_path.clone().unwrap_or(base.corpus_path.clone()),
        total_epochs: args.total_epochs.unwrap_or(base.total_epochs),
        ..base
    };
    config.validate()?;
    Ok(config)
}

fn load_table(config: &RunConfig) -> Result<EmbeddingTable, Box<dyn Error>> {
    log::info!("Loading word vectors from {}", config.embeddings_path.display());
    let (table, report) = EmbeddingTable::load(&config.embeddings_path, config.vector_len)?;
    log::info!(
        "Table ready: {} entries ({} skipped)",
        report.loaded,
        report.wrong_sized
    );
    Ok(table)
}

fn train(config: &RunConfig, resume: bool) -> Result<(), Box<dyn Error>> {
    let run_dir = if resume {
        let run_dir = latest_run_dir(&config.model_dir())?;
        log::info!("Resuming {} from {}", config.model_name(), run_dir.display());
        run_dir
    } else {
        let timestamp = chrono::Local::now().format("%y_%m_%d-%H_%M").to_string();
        config.run_dir(&timestamp)
    };
    fs::create_dir_all(&run_dir)?;
    log::info!("Writing run output to {}", run_dir.display());

    let result = train_in(config, &run_dir, resume);
    if let Err(e) = &result {
        match write_error_log(&run_dir, &**e) {
            Ok(path) => log::error!("Training failed, details in {}", path.display()),
            Err(log_err) => log::warn!("Could not write error log: {}", log_err),
        }
    }
    result
}

fn train_in(config: &RunConfig, run_dir: &Path, resume: bool) -> Result<(), Box<dyn Error>> {
    let table = load_table(config)?;
    let tokenizer = Tokenizer::new()?;
    let split = load_tweets(&config.corpus_path, config.data_fraction, config.validation_fraction)?;

    let (train, train_report) = make_windows(&tokenizer, &table, &join_tweets(&split.train), config.maxlen)?;
    let (validation, _) = make_windows(&tokenizer, &table, &join_tweets(&split.validation), config.maxlen)?;
    log::info!(
        "Training on {} windows ({} of {} tokens found), validating on {}",
        train.len(),
        train_report.found(),
        train_report.total,
        validation.len()
    );

    let model_path = run_dir.join(MODEL_FILE);
    let (mut model, history) = if resume && model_path.exists() {
        (
            LinearBaseline::load(&model_path, config.maxlen, config.vector_len)?,
            load_history(run_dir)?,
        )
    } else {
        (
            LinearBaseline::new(config.maxlen, config.vector_len, config.learning_rate),
            TrainingHistory::default(),
        )
    };

    let latest = config.output_dir.join("latest_tweets.txt");
    let mut handler = SamplingHandler::new(run_dir, &latest, split.train, config.seed);
    let history = fit_resumed(
        &mut model,
        TrainingData { train, validation },
        &tokenizer,
        &table,
        config,
        &mut handler,
        history,
    )?;

    if let Some(last) = history.last() {
        println!("Final loss: {}", last.loss);
    }
    Ok(())
}

fn generate(
    config: &RunConfig,
    seed: Option<String>,
    size: Option<usize>,
    model_path: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let table = load_table(config)?;
    let tokenizer = Tokenizer::new()?;
    let model = match model_path {
        Some(path) => LinearBaseline::load(&path, config.maxlen, config.vector_len)?,
        None => {
            log::warn!("No --model given, generating from an untrained model");
            LinearBaseline::new(config.maxlen, config.vector_len, config.learning_rate)
        }
    };
    let seed = seed.unwrap_or_else(|| config.seed_sentence.clone());
    let size = size.unwrap_or(config.generated_text_size);

    let text = generate_text(&model, &tokenizer, &table, &seed, size, config.maxlen)?;
    println!("{}", text);
    Ok(())
}

fn nearest(config: &RunConfig, word: &str) -> Result<(), Box<dyn Error>> {
    let table = load_table(config)?;
    let vector = table
        .get(word)
        .ok_or_else(|| format!("'{}' is not in the embedding table", word))?;
    let ranking = NearestWordResolver::new(&table).rank(vector, DIAGNOSTIC_TOP_K)?;

    println!("{:<32} {}", "euclidean", "cosine");
    for (e, c) in ranking.euclidean.iter().zip(ranking.cosine.iter()) {
        println!(
            "{:<32} {}",
            format!("{:.4}  {}", e.1, e.0),
            format!("{:.4}  {}", c.1, c.0)
        );
    }
    Ok(())
}

fn run_cli() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = resolve_config(&args)?;
    match args.command {
        Command::Train { resume } => train(&config, resume),
        Command::Generate { seed, size, model } => generate(&config, seed, size, model),
        Command::Nearest { word } => nearest(&config, &word),
    }
}

fn main() {
    if let Err(e) = run_cli() {
        eprintln!("Application error: {}", e);
        let mut current_err: Option<&(dyn Error + 'static)> = e.source();
        while let Some(source) = current_err {
            eprintln!("Caused by: {}", source);
            current_err = source.source();
        }
        std::process::exit(1);
    }
}
