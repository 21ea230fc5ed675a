use approx::assert_abs_diff_eq;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

use tweet_word_rnn::checkpoint::{latest_run_dir, load_history, MODEL_FILE};
use tweet_word_rnn::config::RunConfig;
use tweet_word_rnn::corpus::{join_tweets, load_tweets};
use tweet_word_rnn::embedding::{EmbeddingTable, EOT_TOKEN};
use tweet_word_rnn::generator::generate_text;
use tweet_word_rnn::model::{LinearBaseline, SequenceModel};
use tweet_word_rnn::normalize::IdentityNormalizer;
use tweet_word_rnn::resolver::NearestWordResolver;
use tweet_word_rnn::tokenizer::Tokenizer;
use tweet_word_rnn::training::{fit, fit_resumed, NoopHandler, SamplingHandler, TrainingData};
use tweet_word_rnn::windows::make_windows;

// Three coefficients per word, so vector_len is 4 once the flag slot is added.
const GLOVE_FIXTURE: &str = "hello 1.0 2.0 3.0\n\
world -1.0 0.5 2.0\n\
<user> 0.0 0.0 1.0\n\
bad 1.0\n";

fn fixture_table() -> Result<EmbeddingTable, Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{}", GLOVE_FIXTURE)?;
    let (table, report) = EmbeddingTable::load(file.path(), 4)?;
    assert_eq!(report.loaded, 3);
    assert_eq!(report.wrong_sized, 1);
    Ok(table)
}

#[test]
fn test_loaded_table_is_normalized_with_eot_last() -> Result<(), Box<dyn std::error::Error>> {
    let table = fixture_table()?;
    assert_eq!(table.len(), 4);
    assert_eq!(table.word_at(3), Some(EOT_TOKEN));

    // min -1, max 3: v -> (v + 1) / 2 - 1
    let hello = table.get("hello").ok_or("hello missing")?;
    for (got, want) in hello.iter().zip([0.0, 0.5, 1.0, -0.5]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn test_windows_resolve_back_to_following_tokens() -> Result<(), Box<dyn std::error::Error>> {
    let table = fixture_table()?;
    let tokenizer = Tokenizer::new()?;

    let text = "Hello @bob world\n---\nhello";
    let tokens = tokenizer.tokenize(text);
    assert_eq!(tokens, vec!["hello", "<user>", "world", EOT_TOKEN, "hello"]);

    let (windows, report) = make_windows(&tokenizer, &table, text, 2)?;
    assert_eq!(report.total, 5);
    assert_eq!(report.misses, 0);
    assert_eq!(windows.len(), 3);

    let resolver = NearestWordResolver::new(&table);
    let resolved: Vec<&str> = windows
        .targets
        .outer_iter()
        .map(|target| resolver.resolve(target).map(|n| n.word))
        .collect::<Result<_, _>>()?;
    assert_eq!(resolved, vec!["world", EOT_TOKEN, "hello"]);
    Ok(())
}

#[test]
fn test_unknown_tokens_are_counted_and_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let table = fixture_table()?;
    let tokenizer = Tokenizer::new()?;

    let tokens = tokenizer.tokenize("hello zzyzx world");
    let (vectors, report) = table.vectorize(&tokens);
    assert_eq!(report.total, 3);
    assert_eq!(report.misses, 1);
    assert_abs_diff_eq!(report.miss_rate(), 1.0 / 3.0, epsilon = 1e-6);
    assert_eq!(vectors.nrows(), 2);
    Ok(())
}

#[test]
fn test_corpus_to_fit_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let table = fixture_table()?;
    let tokenizer = Tokenizer::new()?;
    let dir = tempdir()?;
    let corpus_path = dir.path().join("tweets.txt");
    let tweets: Vec<String> = (0..10).map(|_| "hello world @someone hello".to_string()).collect();
    std::fs::write(&corpus_path, join_tweets(&tweets))?;

    let config = RunConfig {
        vector_len: 4,
        maxlen: 2,
        batch_size: 8,
        learning_rate: 0.1,
        total_epochs: 3,
        validation_fraction: 0.2,
        corpus_path: corpus_path.clone(),
        ..RunConfig::default()
    };
    config.validate()?;

    let split = load_tweets(&config.corpus_path, config.data_fraction, config.validation_fraction)?;
    assert_eq!(split.train.len(), 8);
    assert_eq!(split.validation.len(), 2);

    let (train, _) = make_windows(&tokenizer, &table, &join_tweets(&split.train), config.maxlen)?;
    let (validation, _) = make_windows(&tokenizer, &table, &join_tweets(&split.validation), config.maxlen)?;
    let mut model = LinearBaseline::new(config.maxlen, config.vector_len, config.learning_rate);

    let history = fit(
        &mut model,
        TrainingData { train, validation },
        &tokenizer,
        &table,
        &config,
        &mut NoopHandler,
    )?;
    assert_eq!(history.epochs.len(), 3);
    assert!(history.epochs.iter().all(|r| r.loss.is_finite()));
    assert!(history.epochs.iter().all(|r| r.val_loss.is_some()));
    Ok(())
}

fn colour_table() -> Result<EmbeddingTable, Box<dyn std::error::Error>> {
    Ok(EmbeddingTable::from_vectors(
        vec![
            ("red", vec![1.0, 0.0, 0.0]),
            ("green", vec![0.0, 1.0, 0.0]),
            ("blue", vec![0.0, 0.0, 1.0]),
        ],
        3,
    )?)
}

#[test]
fn test_saved_model_generates_learned_sequence() -> Result<(), Box<dyn std::error::Error>> {
    let table = colour_table()?;
    let tokenizer = Tokenizer::with_normalizer(Box::new(IdentityNormalizer))?;
    let (windows, _) = make_windows(&tokenizer, &table, &"red green blue ".repeat(4), 2)?;

    let mut model = LinearBaseline::new(2, 3, 0.2);
    for _ in 0..300 {
        model.train_batch(windows.inputs.view(), windows.targets.view())?;
    }
    let dir = tempdir()?;
    let path = dir.path().join(MODEL_FILE);
    model.save(&path)?;

    let restored = LinearBaseline::load(&path, 2, 3)?;
    let text = generate_text(&restored, &tokenizer, &table, "red green", 4, 2)?;
    assert_eq!(text, "red green blue red green blue");

    let untrained = LinearBaseline::new(2, 3, 0.2);
    assert_ne!(generate_text(&untrained, &tokenizer, &table, "red green", 4, 2)?, text);
    Ok(())
}

#[test]
fn test_interrupted_run_resumes_from_latest_checkpoint() -> Result<(), Box<dyn std::error::Error>> {
    let table = colour_table()?;
    let tokenizer = Tokenizer::with_normalizer(Box::new(IdentityNormalizer))?;
    let tweets = vec!["red green blue red".to_string(), "green blue red green".to_string()];
    let (windows, _) = make_windows(&tokenizer, &table, &join_tweets(&tweets), 2)?;
    let data = TrainingData {
        train: windows.clone(),
        validation: windows,
    };

    let dir = tempdir()?;
    let interrupted = RunConfig {
        vector_len: 3,
        maxlen: 2,
        batch_size: 4,
        learning_rate: 0.1,
        total_epochs: 2,
        output_dir: dir.path().to_path_buf(),
        ..RunConfig::default()
    };
    let latest = dir.path().join("latest_tweets.txt");
    std::fs::create_dir_all(interrupted.run_dir("24_01_01-08_00"))?;
    let run_dir = interrupted.run_dir("24_01_02-09_15");
    let mut handler = SamplingHandler::new(&run_dir, &latest, tweets.clone(), interrupted.seed);
    let mut model = LinearBaseline::new(2, 3, interrupted.learning_rate);
    fit(&mut model, data.clone(), &tokenizer, &table, &interrupted, &mut handler)?;

    // Same configuration, more epochs wanted.
    let config = RunConfig {
        total_epochs: 5,
        ..interrupted
    };
    let resumed_dir = latest_run_dir(&config.model_dir())?;
    assert_eq!(resumed_dir, run_dir);
    let mut model = LinearBaseline::load(&resumed_dir.join(MODEL_FILE), 2, 3)?;
    let history = load_history(&resumed_dir)?;
    assert_eq!(history.epochs.len(), 2);

    let mut handler = SamplingHandler::new(&resumed_dir, &latest, tweets, config.seed);
    let history = fit_resumed(&mut model, data, &tokenizer, &table, &config, &mut handler, history)?;
    let epochs: Vec<usize> = history.epochs.iter().map(|r| r.epoch).collect();
    assert_eq!(epochs, vec![0, 1, 2, 3, 4]);
    assert_eq!(load_history(&resumed_dir)?, history);
    Ok(())
}
