//! Keyword-count sentiment classification for product reviews.
//!
//! Each lexicon entry scores one point when it occurs anywhere in the text.
//! Matching is a raw substring scan: no tokenisation, normalisation or stemming.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::core::errors::SentimentError;

const DEFAULT_POSITIVE: &[&str] = &[
    "좋다", "만족", "예쁘다", "감사", "추천", "맘에 들어", "빠르다", "훌륭",
];

const DEFAULT_NEGATIVE: &[&str] = &[
    "별로", "불만", "나쁘다", "실망", "늦다", "망함", "최악", "짜증",
];

/// Classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two disjoint, non-empty marker lists of non-blank words
#[derive(Debug, Clone)]
pub struct Lexicon {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl Lexicon {
    pub fn new<P, N>(positive: P, negative: N) -> Result<Self, SentimentError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        let positive: Vec<String> = positive.into_iter().map(Into::into).collect();
        let negative: Vec<String> = negative.into_iter().map(Into::into).collect();

        if positive.is_empty() {
            return Err(SentimentError::EmptyLexicon("positive"));
        }
        if negative.is_empty() {
            return Err(SentimentError::EmptyLexicon("negative"));
        }

        // a blank word is a substring of every text
        if positive.iter().any(|w| w.trim().is_empty()) {
            return Err(SentimentError::BlankWord("positive"));
        }
        if negative.iter().any(|w| w.trim().is_empty()) {
            return Err(SentimentError::BlankWord("negative"));
        }

        let positive_set: HashSet<&str> = positive.iter().map(String::as_str).collect();
        if let Some(shared) = negative.iter().find(|w| positive_set.contains(w.as_str())) {
            return Err(SentimentError::OverlappingLexicon(shared.clone()));
        }

        Ok(Self { positive, negative })
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            positive: DEFAULT_POSITIVE.iter().map(|w| w.to_string()).collect(),
            negative: DEFAULT_NEGATIVE.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// Per-lexicon match counts for one text
#[derive(Debug, Clone, Serialize)]
pub struct SentimentScore {
    pub label: Sentiment,
    pub positive: usize,
    pub negative: usize,
    pub matched_positive: Vec<String>,
    pub matched_negative: Vec<String>,
}

/// Keyword-count sentiment analyzer
#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer {
    lexicon: Lexicon,
}

impl SentimentAnalyzer {
    /// Analyzer with the built-in review lexicon
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexicon(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    /// Classify `text`; ties (including empty input) are neutral
    pub fn analyze(&self, text: &str) -> Sentiment {
        self.score(text).label
    }

    pub fn score(&self, text: &str) -> SentimentScore {
        let matched_positive = matches(text, &self.lexicon.positive);
        let matched_negative = matches(text, &self.lexicon.negative);

        let positive = matched_positive.len();
        let negative = matched_negative.len();

        let label = if positive > negative {
            Sentiment::Positive
        } else if negative > positive {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        SentimentScore {
            label,
            positive,
            negative,
            matched_positive,
            matched_negative,
        }
    }
}

fn matches(text: &str, words: &[String]) -> Vec<String> {
    words
        .iter()
        .filter(|word| text.contains(word.as_str()))
        .cloned()
        .collect()
}
