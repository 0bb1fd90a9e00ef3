//! Unicode script classification
//!
//! A single pass over the alphabetic characters of the input decides the
//! plurality script. Scripts used by exactly one language short-circuit the
//! ensemble when they cover enough of the text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum share of alphabetic characters a script needs to short-circuit
pub const SHORT_CIRCUIT_COVERAGE: f64 = 0.8;

/// Plurality share below which a multi-script text is reported as mixed
const MIXED_THRESHOLD: f64 = 0.5;

/// Writing system of a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    /// Latin alphabet, basic and extended
    Latin,
    /// Cyrillic; Russian, Ukrainian, Bulgarian and others
    Cyrillic,
    /// Greek
    Greek,
    /// Armenian
    Armenian,
    /// Georgian Mkhedruli
    Georgian,
    /// Hebrew; also Yiddish
    Hebrew,
    /// Arabic; also Persian and Urdu
    Arabic,
    /// Devanagari; Hindi, Marathi, Nepali
    Devanagari,
    /// Bengali-Assamese
    Bengali,
    /// Gurmukhi; Punjabi
    Gurmukhi,
    /// Gujarati
    Gujarati,
    /// Oriya (Odia)
    Oriya,
    /// Tamil
    Tamil,
    /// Telugu
    Telugu,
    /// Kannada
    Kannada,
    /// Malayalam
    Malayalam,
    /// Sinhala
    Sinhala,
    /// Thai
    Thai,
    /// Lao
    Lao,
    /// Myanmar (Burmese)
    Myanmar,
    /// Khmer
    Khmer,
    /// Ethiopic (Ge'ez); Amharic, Tigrinya
    Ethiopic,
    /// Korean Hangul syllables and jamo
    Hangul,
    /// Japanese Hiragana
    Hiragana,
    /// Japanese Katakana
    Katakana,
    /// CJK ideographs, shared by Chinese and Japanese
    Han,
    /// Several scripts without a clear plurality
    Mixed,
    /// No alphabetic characters
    Unknown,
}

impl Script {
    /// Classify a single character; `None` for characters outside known blocks
    pub fn of(c: char) -> Option<Script> {
        let script = match c as u32 {
            0x0041..=0x005A | 0x0061..=0x007A => Script::Latin,
            0x00C0..=0x024F | 0x1E00..=0x1EFF | 0x2C60..=0x2C7F | 0xA720..=0xA7FF => Script::Latin,
            0xFF21..=0xFF3A | 0xFF41..=0xFF5A => Script::Latin,
            0x0370..=0x03FF | 0x1F00..=0x1FFF => Script::Greek,
            0x0400..=0x052F | 0x1C80..=0x1C8F | 0x2DE0..=0x2DFF | 0xA640..=0xA69F => {
                Script::Cyrillic
            }
            0x0530..=0x058F => Script::Armenian,
            0x0590..=0x05FF | 0xFB1D..=0xFB4F => Script::Hebrew,
            0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF => Script::Arabic,
            0xFB50..=0xFDFF | 0xFE70..=0xFEFF => Script::Arabic,
            0x0900..=0x097F | 0xA8E0..=0xA8FF => Script::Devanagari,
            0x0980..=0x09FF => Script::Bengali,
            0x0A00..=0x0A7F => Script::Gurmukhi,
            0x0A80..=0x0AFF => Script::Gujarati,
            0x0B00..=0x0B7F => Script::Oriya,
            0x0B80..=0x0BFF => Script::Tamil,
            0x0C00..=0x0C7F => Script::Telugu,
            0x0C80..=0x0CFF => Script::Kannada,
            0x0D00..=0x0D7F => Script::Malayalam,
            0x0D80..=0x0DFF => Script::Sinhala,
            0x0E00..=0x0E7F => Script::Thai,
            0x0E80..=0x0EFF => Script::Lao,
            0x1000..=0x109F => Script::Myanmar,
            0x10A0..=0x10FF | 0x1C90..=0x1CBF | 0x2D00..=0x2D2F => Script::Georgian,
            0x1100..=0x11FF | 0x3130..=0x318F | 0xA960..=0xA97F => Script::Hangul,
            0xAC00..=0xD7AF | 0xD7B0..=0xD7FF => Script::Hangul,
            0x1200..=0x139F => Script::Ethiopic,
            0x1780..=0x17FF => Script::Khmer,
            0x3040..=0x309F => Script::Hiragana,
            0x30A0..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F => Script::Katakana,
            0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FFFF => Script::Han,
            _ => return None,
        };
        Some(script)
    }

    /// Lowercase script name
    pub fn as_str(&self) -> &'static str {
        match self {
            Script::Latin => "latin",
            Script::Cyrillic => "cyrillic",
            Script::Greek => "greek",
            Script::Armenian => "armenian",
            Script::Georgian => "georgian",
            Script::Hebrew => "hebrew",
            Script::Arabic => "arabic",
            Script::Devanagari => "devanagari",
            Script::Bengali => "bengali",
            Script::Gurmukhi => "gurmukhi",
            Script::Gujarati => "gujarati",
            Script::Oriya => "oriya",
            Script::Tamil => "tamil",
            Script::Telugu => "telugu",
            Script::Kannada => "kannada",
            Script::Malayalam => "malayalam",
            Script::Sinhala => "sinhala",
            Script::Thai => "thai",
            Script::Lao => "lao",
            Script::Myanmar => "myanmar",
            Script::Khmer => "khmer",
            Script::Ethiopic => "ethiopic",
            Script::Hangul => "hangul",
            Script::Hiragana => "hiragana",
            Script::Katakana => "katakana",
            Script::Han => "han",
            Script::Mixed => "mixed",
            Script::Unknown => "unknown",
        }
    }

    /// The single language written in this script, if there is one
    pub fn unique_language(&self) -> Option<&'static str> {
        let lang = match self {
            Script::Hangul => "ko",
            Script::Hiragana | Script::Katakana => "ja",
            Script::Thai => "th",
            Script::Hebrew => "he",
            Script::Greek => "el",
            Script::Georgian => "ka",
            Script::Armenian => "hy",
            Script::Bengali => "bn",
            Script::Gurmukhi => "pa",
            Script::Gujarati => "gu",
            Script::Oriya => "or",
            Script::Tamil => "ta",
            Script::Telugu => "te",
            Script::Kannada => "kn",
            Script::Malayalam => "ml",
            Script::Sinhala => "si",
            Script::Khmer => "km",
            Script::Lao => "lo",
            Script::Myanmar => "my",
            _ => return None,
        };
        Some(lang)
    }

    fn is_cjk(&self) -> bool {
        matches!(self, Script::Han | Script::Hiragana | Script::Katakana)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Languages written in a multi-language script.
///
/// Returns `None` for Latin and for scripts without a curated list, which
/// means "do not filter".
pub fn compatible_languages(script: Script) -> Option<&'static [&'static str]> {
    const CYRILLIC: &[&str] = &["ru", "uk", "be", "bg", "sr", "mk", "kk", "ky", "mn", "tg", "ba", "tt"];
    const ARABIC: &[&str] = &["ar", "fa", "ur", "ps", "ku", "sd", "ug"];
    const DEVANAGARI: &[&str] = &["hi", "mr", "ne", "sa", "mai", "bho"];
    const HAN: &[&str] = &["zh", "ja"];
    const ETHIOPIC: &[&str] = &["am", "ti"];

    match script {
        Script::Cyrillic => Some(CYRILLIC),
        Script::Arabic => Some(ARABIC),
        Script::Devanagari => Some(DEVANAGARI),
        Script::Han => Some(HAN),
        Script::Ethiopic => Some(ETHIOPIC),
        _ => None,
    }
}

/// Result of classifying a text
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptAnalysis {
    /// Plurality script, `Mixed`, or `Unknown`
    pub script: Script,
    /// Share of alphabetic characters in the plurality script
    pub coverage: f64,
    /// Number of alphabetic characters seen
    pub letters: usize,
    /// Whether any Hiragana or Katakana was present
    pub has_kana: bool,
    cjk_coverage: f64,
}

impl ScriptAnalysis {
    /// Language decided by the script alone, if the short circuit applies
    pub fn short_circuit(&self) -> Option<&'static str> {
        if self.letters == 0 {
            return None;
        }
        // Kanji mixed with kana is Japanese
        if self.script.is_cjk() && self.has_kana && self.cjk_coverage >= SHORT_CIRCUIT_COVERAGE {
            return Some("ja");
        }
        if self.coverage < SHORT_CIRCUIT_COVERAGE {
            return None;
        }
        self.script.unique_language()
    }

    /// Languages the dominant script permits, when it is dominant enough to filter
    pub fn compatible_languages(&self) -> Option<&'static [&'static str]> {
        if self.coverage < SHORT_CIRCUIT_COVERAGE {
            return None;
        }
        if self.script == Script::Han && self.has_kana {
            return Some(&["ja"]);
        }
        compatible_languages(self.script)
    }

    /// Whether a language is consistent with the dominant script
    pub fn allows(&self, language: &str) -> bool {
        self.compatible_languages()
            .map_or(true, |langs| langs.contains(&language))
    }
}

/// Classify the script of `text` in one pass
pub fn classify(text: &str) -> ScriptAnalysis {
    let mut counts: [usize; 26] = [0; 26];
    let mut letters = 0usize;

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if let Some(script) = Script::of(c) {
            counts[script as usize] += 1;
        }
    }

    if letters == 0 {
        return ScriptAnalysis {
            script: Script::Unknown,
            coverage: 0.0,
            letters: 0,
            has_kana: false,
            cjk_coverage: 0.0,
        };
    }

    // Ties resolve to the earlier variant so the result is deterministic
    let (best_idx, best_count) = counts
        .iter()
        .enumerate()
        .fold((0usize, 0usize), |best, (idx, &count)| {
            if count > best.1 {
                (idx, count)
            } else {
                best
            }
        });

    let distinct = counts.iter().filter(|&&n| n > 0).count();
    let coverage = best_count as f64 / letters as f64;
    let has_kana = counts[Script::Hiragana as usize] + counts[Script::Katakana as usize] > 0;
    let cjk = counts[Script::Han as usize]
        + counts[Script::Hiragana as usize]
        + counts[Script::Katakana as usize];
    let cjk_coverage = cjk as f64 / letters as f64;

    let script = if best_count == 0 {
        Script::Unknown
    } else if distinct > 1 && coverage < MIXED_THRESHOLD && cjk_coverage < MIXED_THRESHOLD {
        Script::Mixed
    } else {
        SCRIPTS[best_idx]
    };

    ScriptAnalysis {
        script,
        coverage,
        letters,
        has_kana,
        cjk_coverage,
    }
}

const SCRIPTS: [Script; 26] = [
    Script::Latin,
    Script::Cyrillic,
    Script::Greek,
    Script::Armenian,
    Script::Georgian,
    Script::Hebrew,
    Script::Arabic,
    Script::Devanagari,
    Script::Bengali,
    Script::Gurmukhi,
    Script::Gujarati,
    Script::Oriya,
    Script::Tamil,
    Script::Telugu,
    Script::Kannada,
    Script::Malayalam,
    Script::Sinhala,
    Script::Thai,
    Script::Lao,
    Script::Myanmar,
    Script::Khmer,
    Script::Ethiopic,
    Script::Hangul,
    Script::Hiragana,
    Script::Katakana,
    Script::Han,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_table_matches_discriminants() {
        for (idx, script) in SCRIPTS.iter().enumerate() {
            assert_eq!(*script as usize, idx);
        }
    }

    #[test]
    fn test_single_scripts() {
        let cases = [
            ("Привет мир", Script::Cyrillic),
            ("مرحبا بالعالم", Script::Arabic),
            ("שלום עולם", Script::Hebrew),
            ("Γεια σου κόσμε", Script::Greek),
            ("Hello world", Script::Latin),
            ("नमस्ते दुनिया", Script::Devanagari),
            ("สวัสดีโลก", Script::Thai),
            ("안녕하세요", Script::Hangul),
            ("你好世界", Script::Han),
            ("こんにちは", Script::Hiragana),
        ];
        for (text, expected) in cases {
            let analysis = classify(text);
            assert_eq!(analysis.script, expected, "{text}");
            assert!(analysis.coverage > 0.9, "{text}");
        }
    }

    #[test]
    fn test_empty_and_symbols() {
        let analysis = classify("");
        assert_eq!(analysis.script, Script::Unknown);
        assert_eq!(analysis.coverage, 0.0);

        assert_eq!(classify("123 !!").script, Script::Unknown);
    }

    #[test]
    fn test_mixed_scripts() {
        let analysis = classify("Hello Привет مرحبا");
        assert!(analysis.script == Script::Mixed || analysis.coverage < 0.7);
        assert_eq!(analysis.short_circuit(), None);
    }

    #[test]
    fn test_short_circuit_languages() {
        assert_eq!(classify("안녕하세요").short_circuit(), Some("ko"));
        assert_eq!(classify("สวัสดีครับ").short_circuit(), Some("th"));
        assert_eq!(classify("日本語テスト").short_circuit(), Some("ja"));
        assert_eq!(classify("你好世界").short_circuit(), None);
        assert_eq!(classify("Hello").short_circuit(), None);
    }

    #[test]
    fn test_short_circuit_needs_coverage() {
        // Greek is under the coverage threshold here
        let analysis = classify("Καλημέρα my good friend");
        assert_eq!(analysis.short_circuit(), None);
    }

    #[test]
    fn test_compatible_languages() {
        let cyrillic = classify("Привет мир");
        assert!(cyrillic.allows("ru"));
        assert!(cyrillic.allows("uk"));
        assert!(!cyrillic.allows("en"));

        let arabic = classify("مرحبا");
        assert!(arabic.allows("fa"));

        assert!(classify("Hello world").compatible_languages().is_none());
        assert!(classify("Hello world").allows("en"));
    }
}
