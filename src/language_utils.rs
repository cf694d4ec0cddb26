/*!
 * ISO 639 language code handling.
 *
 * The pipeline needs two spellings of every requested language: a 3-letter
 * code for the generated-subtitle filename convention and the shortest code
 * the subtitle service accepts for its `languages` query parameter.
 */

use anyhow::{anyhow, Result};
use isolang::Language;

/// ISO 639-2/B codes that differ from the 639-2/T codes isolang resolves
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// A requested subtitle language in the spellings the pipeline needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleLanguage {
    /// 3-letter ISO 639-2/T code, used in generated filenames (e.g. "eng")
    pub file_code: String,
    /// Shortest ISO code (639-1 when it exists), used in API queries (e.g. "en")
    pub query_code: String,
    /// English language name for log lines
    pub name: String,
}

impl SubtitleLanguage {
    /// Parse a user-supplied 2- or 3-letter language code.
    pub fn parse(code: &str) -> Result<Self> {
        let language = resolve(code)
            .ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
        let file_code = language.to_639_3().to_string();
        let query_code = language
            .to_639_1()
            .map(|c| c.to_string())
            .unwrap_or_else(|| file_code.clone());
        Ok(Self {
            file_code,
            query_code,
            name: language.to_name().to_string(),
        })
    }
}

fn resolve(code: &str) -> Option<Language> {
    let normalized = code.trim().to_lowercase();
    match normalized.len() {
        2 => Language::from_639_1(&normalized),
        3 => {
            let part2t = PART2B_TO_PART2T
                .iter()
                .find(|(b, _)| *b == normalized)
                .map(|(_, t)| *t)
                .unwrap_or(normalized.as_str());
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Check if two language codes refer to the same language.
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (resolve(code1), resolve(code2)) {
        (Some(l1), Some(l2)) => l1 == l2,
        _ => false,
    }
}
