//! Mixed-language segmentation
//!
//! Text is tokenized and every window of `window` tokens is identified on
//! its own. Window answers are aggregated per token, then smoothed into
//! runs: undetermined tokens join their neighbours, one-off flips inside a
//! run and weak short runs are absorbed, and equal neighbours merge.

use crate::config::CodeSwitchConfig;
use crate::error::Result;
use crate::normalize::{tokenize, Token};
use crate::types::{is_determined, DetectionResult, UNDETERMINED};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies the language of one window of text
pub trait WindowDetector {
    /// Detect without conversation context
    fn detect_window(&self, text: &str) -> Result<DetectionResult>;
}

impl<F> WindowDetector for F
where
    F: Fn(&str) -> Result<DetectionResult>,
{
    fn detect_window(&self, text: &str) -> Result<DetectionResult> {
        self(text)
    }
}

/// One same-language stretch of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSwitchSpan {
    /// Language of the span
    pub language: String,
    /// Mean confidence of the span's determined tokens
    pub confidence: f64,
    /// First token index
    pub start_token: usize,
    /// One past the last token index
    pub end_token: usize,
    /// Byte offset of the first token
    pub start: usize,
    /// Byte offset just past the last token
    pub end: usize,
    /// Covered text
    pub text: String,
}

impl CodeSwitchSpan {
    /// Number of tokens
    pub fn token_len(&self) -> usize {
        self.end_token - self.start_token
    }
}

/// Segmentation of a text into language spans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSwitchResult {
    /// Spans in text order
    pub spans: Vec<CodeSwitchSpan>,
    /// Whether at least two spans qualify
    pub is_mixed: bool,
    /// Language with the largest confidence-weighted length
    pub primary: String,
    /// Other qualifying languages, largest first
    pub secondaries: Vec<String>,
    /// Share of confidence-weighted length per language
    pub distribution: BTreeMap<String, f64>,
}

impl CodeSwitchResult {
    fn empty() -> Self {
        Self {
            spans: Vec::new(),
            is_mixed: false,
            primary: UNDETERMINED.to_string(),
            secondaries: Vec::new(),
            distribution: BTreeMap::new(),
        }
    }

    /// Languages of all spans in text order, consecutive repeats removed
    pub fn languages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for span in &self.spans {
            if out.last() != Some(&span.language.as_str()) {
                out.push(&span.language);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Label {
    language: String,
    confidence: f64,
    voted: bool,
}

#[derive(Debug, Clone)]
struct Run {
    language: String,
    start: usize,
    end: usize,
}

/// Sliding-window code-switch detector
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeSwitchDetector {
    config: CodeSwitchConfig,
}

impl CodeSwitchDetector {
    /// Detector with the given settings
    pub fn new(config: CodeSwitchConfig) -> Self {
        Self { config }
    }

    /// Settings in use
    pub fn config(&self) -> &CodeSwitchConfig {
        &self.config
    }

    /// Segment `text`, asking `detector` about every window
    pub fn detect<D: WindowDetector + ?Sized>(&self, text: &str, detector: &D) -> CodeSwitchResult {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return CodeSwitchResult::empty();
        }

        let labels = self.label_tokens(text, &tokens, detector);
        if labels.iter().all(|l| !l.voted) {
            let mut result = CodeSwitchResult::empty();
            result.spans.push(span(text, &tokens, &labels, UNDETERMINED, 0, tokens.len()));
            return result;
        }

        let runs = self.smooth(&labels);
        let spans: Vec<CodeSwitchSpan> = runs
            .iter()
            .map(|run| span(text, &tokens, &labels, &run.language, run.start, run.end))
            .collect();
        self.summarize(text, &tokens, &labels, spans)
    }

    /// Per-token language from overlapping windows
    fn label_tokens<D: WindowDetector + ?Sized>(
        &self,
        text: &str,
        tokens: &[Token<'_>],
        detector: &D,
    ) -> Vec<Label> {
        let window = self.config.window.max(1).min(tokens.len());
        let mut votes: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); tokens.len()];
        let mut coverage = vec![0usize; tokens.len()];

        for first in 0..=(tokens.len() - window) {
            let last = first + window - 1;
            let slice = &text[tokens[first].start..tokens[last].end];
            let answer = match detector.detect_window(slice) {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!("window {first}..={last} undetermined: {e}");
                    continue;
                }
            };
            for index in first..=last {
                coverage[index] += 1;
                if answer.is_determined() {
                    *votes[index].entry(answer.language.clone()).or_insert(0.0) +=
                        answer.confidence;
                }
            }
        }

        votes
            .into_iter()
            .zip(coverage)
            .zip(tokens)
            .map(|((tally, windows), token)| {
                // Numbers say nothing about language
                let best = if token.is_numeric() {
                    None
                } else {
                    tally
                        .into_iter()
                        .fold(None, |best: Option<(String, f64)>, (lang, score)| match best {
                            Some((_, b)) if b >= score => best,
                            _ => Some((lang, score)),
                        })
                };
                match best {
                    Some((language, score)) if score > 0.0 => Label {
                        language,
                        confidence: score / windows.max(1) as f64,
                        voted: true,
                    },
                    _ => Label {
                        language: UNDETERMINED.to_string(),
                        confidence: 0.0,
                        voted: false,
                    },
                }
            })
            .collect()
    }

    fn smooth(&self, labels: &[Label]) -> Vec<Run> {
        // Undetermined tokens take the preceding language, or the following
        // one at the start of the text
        let mut langs: Vec<String> = Vec::with_capacity(labels.len());
        let mut previous: Option<&str> = None;
        for label in labels {
            if label.voted {
                previous = Some(&label.language);
            }
            langs.push(previous.unwrap_or(UNDETERMINED).to_string());
        }
        if let Some(first) = labels.iter().find(|l| l.voted) {
            for lang in langs.iter_mut().take_while(|l| !is_determined(l)) {
                *lang = first.language.clone();
            }
        }

        let mut runs = build_runs(&langs);
        loop {
            let mut changed = false;
            for i in 0..runs.len() {
                let len = runs[i].end - runs[i].start;
                if len >= self.config.min_run_tokens {
                    continue;
                }
                let prev = i.checked_sub(1).map(|p| runs[p].language.clone());
                let next = runs.get(i + 1).map(|n| n.language.clone());
                let target = match (&prev, &next) {
                    // A short flip between two runs of one language
                    (Some(p), Some(n)) if p == n => Some(p.clone()),
                    _ if mean_confidence(labels, runs[i].start, runs[i].end)
                        < self.config.min_confidence =>
                    {
                        prev.clone().or_else(|| next.clone())
                    }
                    _ => None,
                };
                if let Some(target) = target {
                    runs[i].language = target;
                    changed = true;
                    break;
                }
            }
            runs = merge_runs(runs);
            if !changed {
                break;
            }
        }
        runs
    }

    fn summarize(
        &self,
        text: &str,
        tokens: &[Token<'_>],
        labels: &[Label],
        spans: Vec<CodeSwitchSpan>,
    ) -> CodeSwitchResult {
        let mut weighted: BTreeMap<String, f64> = BTreeMap::new();
        for span in &spans {
            let length: f64 = (span.start_token..span.end_token)
                .filter(|&i| labels[i].voted && labels[i].language == span.language)
                .map(|i| tokens[i].text.chars().count() as f64 * labels[i].confidence)
                .sum();
            *weighted.entry(span.language.clone()).or_insert(0.0) += length;
        }

        let mut ranked: Vec<(String, f64)> = weighted.clone().into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let primary = ranked
            .first()
            .map(|(lang, _)| lang.clone())
            .unwrap_or_else(|| UNDETERMINED.to_string());

        let qualifying: Vec<&CodeSwitchSpan> = spans
            .iter()
            .filter(|s| {
                s.confidence >= self.config.min_confidence
                    && s.token_len() >= self.config.min_span_tokens
            })
            .collect();
        let is_mixed = qualifying.len() >= 2
            && qualifying
                .iter()
                .any(|s| s.language != qualifying[0].language);

        let total: f64 = weighted.values().sum();
        let distribution = weighted
            .iter()
            .map(|(lang, w)| (lang.clone(), if total > 0.0 { w / total } else { 0.0 }))
            .collect();

        if !is_mixed {
            let whole = span(text, tokens, labels, &primary, 0, tokens.len());
            return CodeSwitchResult {
                spans: vec![whole],
                is_mixed: false,
                primary,
                secondaries: Vec::new(),
                distribution,
            };
        }

        let secondaries = ranked
            .iter()
            .map(|(lang, _)| lang)
            .filter(|lang| **lang != primary && qualifying.iter().any(|s| &s.language == *lang))
            .cloned()
            .collect();

        CodeSwitchResult {
            spans,
            is_mixed,
            primary,
            secondaries,
            distribution,
        }
    }
}

fn build_runs(langs: &[String]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (i, lang) in langs.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if &run.language == lang => run.end = i + 1,
            _ => runs.push(Run {
                language: lang.clone(),
                start: i,
                end: i + 1,
            }),
        }
    }
    runs
}

fn merge_runs(runs: Vec<Run>) -> Vec<Run> {
    let mut merged: Vec<Run> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if last.language == run.language => last.end = run.end,
            _ => merged.push(run),
        }
    }
    merged
}

fn mean_confidence(labels: &[Label], start: usize, end: usize) -> f64 {
    let voted: Vec<f64> = labels[start..end]
        .iter()
        .filter(|l| l.voted)
        .map(|l| l.confidence)
        .collect();
    if voted.is_empty() {
        0.0
    } else {
        voted.iter().sum::<f64>() / voted.len() as f64
    }
}

fn span(
    text: &str,
    tokens: &[Token<'_>],
    labels: &[Label],
    language: &str,
    start_token: usize,
    end_token: usize,
) -> CodeSwitchSpan {
    let start = tokens[start_token].start;
    let end = tokens[end_token - 1].end;
    let voted: Vec<f64> = labels[start_token..end_token]
        .iter()
        .filter(|l| l.voted && l.language == language)
        .map(|l| l.confidence)
        .collect();
    let confidence = if voted.is_empty() {
        0.0
    } else {
        voted.iter().sum::<f64>() / voted.len() as f64
    };
    CodeSwitchSpan {
        language: language.to_string(),
        confidence,
        start_token,
        end_token,
        start,
        end,
        text: text[start..end].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::types::Reason;

    /// Looks single words up in a fixed table
    fn table(entries: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Result<DetectionResult> {
        move |text: &str| {
            let lower = text.to_lowercase();
            let hit = entries.iter().find(|(word, _)| *word == lower);
            Ok(match hit {
                Some((_, lang)) => {
                    let mut result = DetectionResult::certain(lang, Reason::Ensemble, Script::Latin);
                    result.confidence = 0.9;
                    result
                }
                None => DetectionResult::undetermined(Reason::NoEvidence, Script::Latin),
            })
        }
    }

    const WORDS: &[(&str, &str)] = &[
        ("that's", "en"),
        ("the", "en"),
        ("house", "en"),
        ("is", "en"),
        ("big", "en"),
        ("muy", "es"),
        ("casa", "es"),
        ("grande", "es"),
        ("la", "es"),
    ];

    #[test]
    fn test_empty_text() {
        let result = CodeSwitchDetector::default().detect("", &table(WORDS));
        assert!(!result.is_mixed);
        assert_eq!(result.primary, "und");
        assert!(result.spans.is_empty());
    }

    #[test]
    fn test_english_spanish_mix() {
        let result = CodeSwitchDetector::default().detect("That's muy importante", &table(WORDS));
        assert!(result.is_mixed);
        assert_eq!(result.primary, "en");
        assert_eq!(result.secondaries, vec!["es"]);
        assert_eq!(result.languages(), vec!["en", "es"]);
        assert_eq!(result.spans[1].text, "muy importante");
    }

    #[test]
    fn test_single_language_is_one_span() {
        let result = CodeSwitchDetector::default().detect("the house is big", &table(WORDS));
        assert!(!result.is_mixed);
        assert_eq!(result.primary, "en");
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.spans[0].text, "the house is big");
    }

    #[test]
    fn test_single_flip_absorbed() {
        const FLIPPY: &[(&str, &str)] = &[
            ("the", "en"),
            ("house", "en"),
            ("casa", "es"),
            ("is", "en"),
            ("big", "en"),
        ];
        let config = CodeSwitchConfig {
            min_run_tokens: 2,
            ..Default::default()
        };
        let result = CodeSwitchDetector::new(config).detect("the house casa is big", &table(FLIPPY));
        assert!(!result.is_mixed);
        assert_eq!(result.primary, "en");
    }

    #[test]
    fn test_longer_spans_mix() {
        let result =
            CodeSwitchDetector::default().detect("the house is big la casa grande", &table(WORDS));
        assert!(result.is_mixed);
        assert_eq!(result.languages(), vec!["en", "es"]);
        assert_eq!(result.spans[0].end_token, 4);
        let total: f64 = result.distribution.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_unknown() {
        let result = CodeSwitchDetector::default().detect("zzz qqq", &table(WORDS));
        assert!(!result.is_mixed);
        assert_eq!(result.primary, "und");
        assert_eq!(result.spans.len(), 1);
    }

    #[test]
    fn test_wider_window_is_deterministic() {
        let config = CodeSwitchConfig {
            window: 2,
            ..Default::default()
        };
        let detector = CodeSwitchDetector::new(config);
        let a = detector.detect("the house is big", &table(WORDS));
        let b = detector.detect("the house is big", &table(WORDS));
        assert_eq!(a, b);
    }
}
