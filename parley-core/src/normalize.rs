//! Text and language-tag normalization

use crate::types::UNDETERMINED;
use regex::Regex;
use std::sync::OnceLock;

static WORD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn word_regex() -> &'static Regex {
    WORD_PATTERN.get_or_init(|| {
        // Letters and combining marks, with inner apostrophes kept ("that's")
        Regex::new(r"[\p{L}\p{M}]+(?:['’][\p{L}\p{M}]+)*|\p{N}+")
            .expect("token pattern is a valid literal")
    })
}

/// A word token with byte offsets into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token text as written
    pub text: &'a str,
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Token<'_> {
    /// Whether the token is purely numeric
    pub fn is_numeric(&self) -> bool {
        self.text.chars().all(|c| c.is_numeric())
    }
}

/// Split text into word tokens
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    word_regex()
        .find_iter(text)
        .map(|m| Token {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Canonical form used for cache keys and lexicon lookups:
/// trimmed, whitespace collapsed, lowercased, curly apostrophes straightened
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for c in word.chars() {
            match c {
                '’' | '‘' => out.push('\''),
                _ => out.extend(c.to_lowercase()),
            }
        }
    }
    out
}

/// Lowercase a single word for dictionary lookups
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .map(|c| if c == '’' || c == '‘' { '\'' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Reduce a language tag to its lowercase primary subtag.
///
/// `"pt-BR"` becomes `"pt"`, three-letter codes with a two-letter equivalent
/// are folded, and anything unusable becomes `"und"`.
pub fn normalize_lang_tag(tag: &str) -> String {
    let primary = tag
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if primary.is_empty() || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return UNDETERMINED.to_string();
    }

    match iso639_3_to_1(&primary) {
        Some(code) => code.to_string(),
        None => primary,
    }
}

/// Map an ISO 639-3 code to ISO 639-1 where one exists
pub fn iso639_3_to_1(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "afr" => "af",
        "amh" => "am",
        "ara" | "arb" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bos" => "bs",
        "bul" => "bg",
        "cat" => "ca",
        "ces" | "cze" => "cs",
        "cym" | "wel" => "cy",
        "dan" => "da",
        "deu" | "ger" => "de",
        "ell" | "gre" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" | "ekk" => "et",
        "eus" | "baq" => "eu",
        "fas" | "per" | "pes" => "fa",
        "fin" => "fi",
        "fra" | "fre" => "fr",
        "gle" => "ga",
        "glg" => "gl",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" | "arm" => "hy",
        "ind" => "id",
        "isl" | "ice" => "is",
        "ita" => "it",
        "jpn" => "ja",
        "jav" => "jv",
        "kat" | "geo" => "ka",
        "kan" => "kn",
        "kaz" => "kk",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" | "lvs" => "lv",
        "lit" => "lt",
        "ltz" => "lb",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" | "mac" => "mk",
        "mon" | "khk" => "mn",
        "msa" | "may" | "zsm" => "ms",
        "mya" | "bur" => "my",
        "nep" | "npi" => "ne",
        "nld" | "dut" => "nl",
        "nob" | "nor" => "no",
        "nno" => "nn",
        "ori" | "ory" => "or",
        "pan" => "pa",
        "pol" => "pl",
        "por" => "pt",
        "ron" | "rum" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" | "slo" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "som" => "so",
        "spa" => "es",
        "sqi" | "alb" | "als" => "sq",
        "srp" => "sr",
        "swa" | "swh" => "sw",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" | "uzn" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "yor" => "yo",
        "zho" | "chi" | "cmn" => "zh",
        "zul" => "zu",
        _ => return None,
    };
    Some(mapped)
}
