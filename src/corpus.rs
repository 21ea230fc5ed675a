use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::io;
use std::path::Path;

use crate::tokenizer::TWEET_SEPARATOR;

#[derive(Debug)]
pub enum CorpusError {
    IoError(io::Error),
    Empty(String),
}

impl std::fmt::Display for CorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusError::IoError(e) => write!(f, "Corpus IO error: {}", e),
            CorpusError::Empty(path) => write!(f, "Corpus at {} contains no tweets", path),
        }
    }
}

impl std::error::Error for CorpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorpusError::IoError(e) => Some(e),
            CorpusError::Empty(_) => None,
        }
    }
}

impl From<io::Error> for CorpusError {
    fn from(err: io::Error) -> CorpusError {
        CorpusError::IoError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetSplit {
    pub train: Vec<String>,
    pub validation: Vec<String>,
}

/// Splits text on the tweet separator, dropping blank entries.
pub fn parse_tweets(text: &str) -> Vec<String> {
    text.split(TWEET_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a corpus file, keeps the leading `data_fraction` of its tweets and
/// holds out the trailing `validation_fraction` of those.
pub fn load_tweets(
    path: &Path,
    data_fraction: f32,
    validation_fraction: f32,
) -> Result<TweetSplit, CorpusError> {
    let text = fs::read_to_string(path)?;
    let mut tweets = parse_tweets(&text);

    let keep = ((tweets.len() as f32) * data_fraction.clamp(0.0, 1.0)).round() as usize;
    tweets.truncate(keep);
    if tweets.is_empty() {
        return Err(CorpusError::Empty(path.display().to_string()));
    }

    let split = split_train_validation(tweets, validation_fraction);
    log::info!(
        "Loaded {} training and {} validation tweets",
        split.train.len(),
        split.validation.len()
    );
    Ok(split)
}

/// Order-preserving split; the validation part is taken from the tail.
pub fn split_train_validation(tweets: Vec<String>, validation_fraction: f32) -> TweetSplit {
    let fraction = validation_fraction.clamp(0.0, 1.0);
    if tweets.len() < 2 || fraction <= 0.0 {
        return TweetSplit {
            train: tweets,
            validation: Vec::new(),
        };
    }

    let val_len = (((tweets.len() as f32) * fraction).round() as usize).clamp(1, tweets.len() - 1);
    let mut train = tweets;
    let validation = train.split_off(train.len() - val_len);
    TweetSplit { train, validation }
}

/// Joins tweets back into one text so the tokenizer emits `<eot>` between them.
pub fn join_tweets(tweets: &[String]) -> String {
    tweets.join(TWEET_SEPARATOR)
}

pub fn shuffled<R: Rng + ?Sized>(tweets: &[String], rng: &mut R) -> Vec<String> {
    let mut out = tweets.to_vec();
    out.shuffle(rng);
    out
}
