//! Tweet text canonicalization matching the GloVe Twitter vocabulary.
//!
//! URLs, mentions, emoticons, numbers and hashtags become the placeholder
//! tokens the pretrained table was built with (`<url>`, `<user>`, `<smile>`,
//! `<number>`, `<hashtag>` ...), repeated punctuation and elongated words get
//! `<repeat>` / `<elong>` markers, and shouted words get `<allcaps>`.

use regex::{Captures, Regex};

/// Step 2 of tokenization: domain-specific text rewriting.
pub trait TextNormalizer {
    fn normalize(&self, text: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct GloveTwitterNormalizer {
    url: Regex,
    user: Regex,
    smile: Regex,
    lolface: Regex,
    sadface: Regex,
    neutralface: Regex,
    slash: Regex,
    heart: Regex,
    number: Regex,
    hashtag: Regex,
    repeat: Regex,
    word: Regex,
    allcaps: Regex,
}

const EYES: &str = r"[8:=;]";
const NOSE: &str = r"['`\-]?";

impl GloveTwitterNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            url: Regex::new(r"https?://\S+\b|www\.(\w+\.)+\S*")?,
            user: Regex::new(r"@\w+")?,
            smile: Regex::new(&format!(r"{EYES}{NOSE}[)dD]+|[)dD]+{NOSE}{EYES}"))?,
            lolface: Regex::new(&format!(r"{EYES}{NOSE}p+"))?,
            sadface: Regex::new(&format!(r"{EYES}{NOSE}\(+|\)+{NOSE}{EYES}"))?,
            neutralface: Regex::new(&format!(r"{EYES}{NOSE}[/|l*]"))?,
            slash: Regex::new(r"/")?,
            heart: Regex::new(r"<3")?,
            number: Regex::new(r"[-+]?[.\d]*\d+[:,.\d]*")?,
            hashtag: Regex::new(r"#\S+")?,
            repeat: Regex::new(r"([!?.]){2,}")?,
            word: Regex::new(r"\w+")?,
            allcaps: Regex::new(r"[A-Z]{2,}")?,
        })
    }

    fn hashtag(caps: &Captures) -> String {
        let body = &caps[0][1..];
        let has_lower = body.chars().any(char::is_lowercase);
        let has_upper = body.chars().any(char::is_uppercase);
        if has_upper && !has_lower {
            return format!("<hashtag> {} <allcaps>", body);
        }
        let mut parts = vec!["<hashtag>".to_string()];
        let mut current = String::new();
        for ch in body.chars() {
            if ch.is_ascii_uppercase() && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
        if !current.is_empty() {
            parts.push(current);
        }
        parts.join(" ")
    }

    /// `soooo` -> `so <elong>`; only runs of 3+ closing a word count.
    fn elongated(caps: &Captures) -> String {
        let word = &caps[0];
        let chars: Vec<char> = word.chars().collect();
        let last = chars[chars.len() - 1];
        let run = chars.iter().rev().take_while(|&&c| c == last).count();
        if run < 3 {
            return word.to_string();
        }
        let stem: String = chars[..chars.len() - run + 1].iter().collect();
        format!("{} <elong>", stem)
    }
}

impl TextNormalizer for GloveTwitterNormalizer {
    fn normalize(&self, text: &str) -> String {
        let text = self.url.replace_all(text, "<url>");
        let text = self.user.replace_all(&text, "<user>");
        let text = self.smile.replace_all(&text, "<smile>");
        let text = self.lolface.replace_all(&text, "<lolface>");
        let text = self.sadface.replace_all(&text, "<sadface>");
        let text = self.neutralface.replace_all(&text, "<neutralface>");
        let text = self.slash.replace_all(&text, " / ");
        let text = self.heart.replace_all(&text, "<heart>");
        let text = self.number.replace_all(&text, "<number>");
        let text = self.hashtag.replace_all(&text, Self::hashtag);
        let text = self.repeat.replace_all(&text, "$1 <repeat>");
        let text = self.word.replace_all(&text, Self::elongated);
        let text = self
            .allcaps
            .replace_all(&text, |caps: &Captures| format!("{} <allcaps>", caps[0].to_lowercase()));
        text.to_lowercase()
    }
}

/// Leaves text untouched; useful when input is already canonical.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl TextNormalizer for IdentityNormalizer {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> GloveTwitterNormalizer {
        GloveTwitterNormalizer::new().expect("patterns compile")
    }

    #[test]
    fn test_urls_and_users_are_replaced() {
        let out = normalizer().normalize("see https://t.co/abc and www.example.com/x @POTUS");
        assert!(out.contains("<url>"));
        assert!(out.contains("<user>"));
        assert!(!out.contains("potus"));
    }

    #[test]
    fn test_emoticons() {
        let n = normalizer();
        assert_eq!(n.normalize(":)"), "<smile>");
        assert_eq!(n.normalize(":-("), "<sadface>");
        assert_eq!(n.normalize(";p"), "<lolface>");
        assert_eq!(n.normalize("<3"), "<heart>");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(normalizer().normalize("up 3.5 and 1,000"), "up <number> and <number>");
    }

    #[test]
    fn test_hashtag_splits_camel_case() {
        assert_eq!(normalizer().normalize("#MakeAmerica"), "<hashtag> make america");
    }

    #[test]
    fn test_hashtag_all_caps() {
        let out = normalizer().normalize("#MAGA");
        assert!(out.starts_with("<hashtag> maga <allcaps>"));
    }

    #[test]
    fn test_repeated_punctuation_and_elongation() {
        let n = normalizer();
        assert_eq!(n.normalize("wow!!!"), "wow! <repeat>");
        assert_eq!(n.normalize("soooo good"), "so <elong> good");
        assert_eq!(n.normalize("hello"), "hello");
    }

    #[test]
    fn test_allcaps_marker() {
        assert_eq!(normalizer().normalize("FAKE news"), "fake <allcaps> news");
    }

    #[test]
    fn test_eot_marker_survives() {
        assert_eq!(normalizer().normalize("bye <eot> hi"), "bye <eot> hi");
    }

    #[test]
    fn test_identity_normalizer() {
        assert_eq!(IdentityNormalizer.normalize("As Is!!"), "As Is!!");
    }
}
