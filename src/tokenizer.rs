use regex::Regex;

use crate::embedding::EOT_TOKEN;
use crate::normalize::{GloveTwitterNormalizer, TextNormalizer};

/// Separator between consecutive tweets in a corpus file.
pub const TWEET_SEPARATOR: &str = "\n---\n";

// Longest run of one repeated character kept by `reduce_lengthening`.
const MAX_REPEAT: usize = 2;

#[derive(Debug)]
pub enum TokenizerError {
    PatternError(regex::Error),
}

impl std::fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenizerError::PatternError(e) => write!(f, "Tokenizer pattern error: {}", e),
        }
    }
}

impl std::error::Error for TokenizerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TokenizerError::PatternError(e) => Some(e),
        }
    }
}

impl From<regex::Error> for TokenizerError {
    fn from(err: regex::Error) -> TokenizerError {
        TokenizerError::PatternError(err)
    }
}

/// Twitter-aware word splitter: lowercases everything but emoticons,
/// strips `@handles`, and caps character runs at two (`soooo` -> `soo`).
#[derive(Debug, Clone)]
pub struct TweetTokenizer {
    handles: Regex,
    words: Regex,
    emoticon: Regex,
}

impl TweetTokenizer {
    pub fn new() -> Result<Self, TokenizerError> {
        let emoticon = r#"(?:[<>]?[:;=8][\-o\*']?[\)\]\(\[dDpP/:\}\{@\|\\]|[\)\]\(\[dDpP/:\}\{@\|\\][\-o\*']?[:;=8][<>]?|<3)"#;
        let patterns = [
            r"(?:https?://\S+)",
            emoticon,
            r"(?:<[^>\s]+>)",
            r"(?:[\-]+>|<[\-]+)",
            r"(?:@[\w_]+)",
            r"(?:#+[\w_]+[\w'_\-]*[\w_]+)",
            r"(?:[\w.+\-]+@[\w\-]+\.(?:[\w\-]\.?)+[\w\-])",
            r"(?:[^\W\d_](?:[^\W\d_]|['\-_])+[^\W\d_])",
            r"(?:[+\-]?\d+[,/.:\-]\d+[+\-]?)",
            r"(?:[\w_]+)",
            r"(?:\.(?:\s*\.)+)",
            r"(?:\S)",
        ];
        Ok(Self {
            handles: Regex::new(r"(^|[^A-Za-z0-9_!@#$%&*])@[A-Za-z0-9_]{1,15}")?,
            words: Regex::new(&patterns.join("|"))?,
            emoticon: Regex::new(&format!("^{}$", emoticon))?,
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = html_escape::decode_html_entities(text);
        let text = self.handles.replace_all(&text, "$1 ");
        let text = reduce_lengthening(&text);
        self.words
            .find_iter(&text)
            .map(|m| {
                let token = m.as_str();
                // Emoticons keep their case (`:D` and `:d` differ).
                if self.emoticon.is_match(token) {
                    token.to_string()
                } else {
                    token.to_lowercase()
                }
            })
            .collect()
    }
}

fn reduce_lengthening(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;
    for ch in text.chars() {
        if Some(ch) == prev {
            run += 1;
        } else {
            prev = Some(ch);
            run = 1;
        }
        if run <= MAX_REPEAT {
            out.push(ch);
        }
    }
    out
}

/// Full text-to-token pipeline.
///
/// 1. tweet separators become standalone `<eot>` tokens
/// 2. text is canonicalized by the configured [`TextNormalizer`]
/// 3. doubled angle brackets left by canonicalization are undone
/// 4. the result is split by [`TweetTokenizer`]
///
/// Pure: the same text always yields the same tokens.
pub struct Tokenizer {
    normalizer: Box<dyn TextNormalizer>,
    splitter: TweetTokenizer,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("splitter", &self.splitter)
            .finish_non_exhaustive()
    }
}

impl Tokenizer {
    /// Tokenizer with GloVe Twitter canonicalization.
    pub fn new() -> Result<Self, TokenizerError> {
        Self::with_normalizer(Box::new(GloveTwitterNormalizer::new()?))
    }

    pub fn with_normalizer(normalizer: Box<dyn TextNormalizer>) -> Result<Self, TokenizerError> {
        Ok(Self {
            normalizer,
            splitter: TweetTokenizer::new()?,
        })
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = text.replace(TWEET_SEPARATOR, &format!(" {} ", EOT_TOKEN));
        let text = self.normalizer.normalize(&text);
        let text = text.replace("<<", "<").replace(">>", ">");
        self.splitter.tokenize(&text)
    }
}
