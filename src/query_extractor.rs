/*!
 * Query extraction from unstructured media file paths.
 *
 * Turns a loosely-named file path into one or more normalized, ranked
 * search strings ("query candidates"), and scores the similarity of two
 * normalized queries. The heuristics are an ordered set of small rules so
 * each one can be tested on its own.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Separators treated as whitespace when breaking a name into tokens
const SEPARATORS: &[char] = &[' ', '.', '-', '_', ',', ':', '?', '`', '\'', '\u{b7}'];

/// Tokens that always end the title (resolution/codec/audio/release tags)
const HARD_END_WORDS: &[&str] = &[
    "720p", "1080p", "2160p", "mkv", "mp4", "avi", "x264", "x265", "x266", "h264", "h265",
    "h266", "10bit", "hdrip", "bdrip", "br", "dts", "bluray", "remux", "unrated", "remastered",
    "theatrical", "extended", "korsub", "swedish", "english", "nordic", "extras", "extra",
];

/// Tokens that only end the title when no year token exists
const SOFT_END_WORDS: &[&str] = &["hevc", "avc", "hdr", "sdr", "hc", "ee"];

/// Leetspeak digit substitutions, reversed only for mixed digit/letter tokens
const LEETSPEAK_TABLE: &[(char, char)] = &[
    ('0', 'o'),
    ('1', 'l'),
    ('2', 'z'),
    ('3', 'e'),
    ('4', 'a'),
    ('5', 's'),
    ('6', 'g'),
    ('7', 't'),
    ('8', 'b'),
    ('9', 'p'),
];

/// Accented Latin letters folded to their ASCII base form
const TRANSLITERATION_TABLE: &[(char, &str)] = &[
    ('à', "a"),
    ('á', "a"),
    ('â', "a"),
    ('ã', "a"),
    ('ä', "a"),
    ('å', "a"),
    ('æ', "ae"),
    ('ç', "c"),
    ('è', "e"),
    ('é', "e"),
    ('ê', "e"),
    ('ë', "e"),
    ('ì', "i"),
    ('í', "i"),
    ('î', "i"),
    ('ï', "i"),
    ('ñ', "n"),
    ('ò', "o"),
    ('ó', "o"),
    ('ô', "o"),
    ('õ', "o"),
    ('ö', "o"),
    ('ø', "o"),
    ('ù', "u"),
    ('ú', "u"),
    ('û', "u"),
    ('ü', "u"),
    ('ý', "y"),
    ('ÿ', "y"),
    ('ß', "ss"),
];

/// Roman numerals mapped to Arabic digits. I, V and X are deliberately
/// excluded: they are too easy to confuse with initials or ratings.
const ROMAN_NUMERAL_TABLE: &[(&str, &str)] = &[
    ("II", "2"),
    ("III", "3"),
    ("IV", "4"),
    ("VI", "6"),
    ("VII", "7"),
    ("VIII", "8"),
    ("IX", "9"),
    ("XI", "11"),
];

static BRACKET_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\[]*\]").unwrap());
static PAREN_BLOCK_NO_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^0-9)]*\)").unwrap());
static MOVIE_PACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^r][^e]pack)|(complete)|(collection)").unwrap());
static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_[0-9]{4}$").unwrap());
static DIRECTORS_CUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_directors_cut").unwrap());
static DOUBLE_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__+").unwrap());

/// Special edition tag of a release, used to prefer subtitle releases
/// matching the same cut of a film.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialEdition {
    Unrated,
    DirectorsCut,
    UltimateCut,
    RogueCut,
    Uncut,
    Remastered,
    Extended,
}

/// One pattern→label rule for special edition detection
enum EditionPattern {
    /// Matches when one of the broken-up tokens equals the word exactly
    Word(&'static [&'static str]),
    /// Matches anywhere in the lowercased raw text
    Pattern(&'static str),
}

/// Ordered rule table; first match wins
const SPECIAL_EDITION_RULES: &[(SpecialEdition, EditionPattern)] = &[
    (SpecialEdition::Unrated, EditionPattern::Word(&["unrated"])),
    (SpecialEdition::DirectorsCut, EditionPattern::Pattern(r"director.?s.?cut|dir.?cut")),
    (SpecialEdition::UltimateCut, EditionPattern::Pattern(r"ultimate.?cut|ult.?cut")),
    (SpecialEdition::RogueCut, EditionPattern::Pattern(r"rogue.?cut")),
    (SpecialEdition::Uncut, EditionPattern::Word(&["uncut"])),
    (SpecialEdition::Remastered, EditionPattern::Word(&["remastered"])),
    (SpecialEdition::Extended, EditionPattern::Word(&["extended", "ext"])),
];

/// Check whether a directory name looks like a movie pack/collection.
/// The `[^r][^e]pack` form keeps "repack" from counting as a pack.
pub fn is_movie_pack(text: &str) -> bool {
    MOVIE_PACK.is_match(&text.to_lowercase())
}

/// Extract the year carried by a normalized query, if any.
/// The last year-shaped token wins.
pub fn year(query: &str) -> Option<u32> {
    query
        .split('_')
        .rev()
        .find(|t| t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()))
        .and_then(|t| t.parse().ok())
}

/// Strip a trailing `_YYYY` year suffix from a query.
pub fn trim_year(query: &str) -> String {
    YEAR_SUFFIX.replace(query, "").to_string()
}

/// Append a year suffix to a query, replacing any existing one.
pub fn ensure_year(query: &str, year: u32) -> String {
    if query.is_empty() {
        return query.to_string();
    }
    format!("{}_{}", trim_year(query), year)
}

fn is_remove_word(token: &str) -> bool {
    token.is_empty()
        || token == "+"
        || (token.starts_with('[') && token.contains(']'))
        || (token.starts_with('(')
            && token.ends_with(')')
            && !token.chars().any(|c| c.is_ascii_digit()))
}

/// Break unstructured text into cleaned tokens: bracketed and non-numeric
/// parenthesized annotations dropped, possessive apostrophes removed,
/// leading zero-padding stripped.
fn break_into_words(text: &str) -> Vec<String> {
    let text = BRACKET_BLOCK.replace_all(text, " ");
    let text = PAREN_BLOCK_NO_DIGITS.replace_all(&text, " ");
    let text = text.replace('\'', "");
    text.split(SEPARATORS)
        .filter(|w| !is_remove_word(w))
        .map(|w| {
            w.trim()
                .chars()
                .filter(|c| !matches!(c, '(' | ')' | '[' | ']'))
                .collect::<String>()
        })
        .map(|w| w.trim_start_matches('0').to_string())
        .collect()
}

fn transliterate(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        let lower = c.to_lowercase().next().unwrap_or(c);
        match TRANSLITERATION_TABLE.iter().find(|(from, _)| *from == lower) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

fn unescape_leetspeak(word: &str) -> String {
    let has_digit = word.chars().any(|c| c.is_ascii_digit());
    let has_alpha = word.chars().any(|c| c.is_ascii_alphabetic());
    if !(has_digit && has_alpha) {
        return word.to_string();
    }
    word.chars()
        .map(|c| {
            LEETSPEAK_TABLE
                .iter()
                .find(|(digit, _)| *digit == c)
                .map(|(_, letter)| *letter)
                .unwrap_or(c)
        })
        .collect()
}

fn unescape_roman_numeral(word: &str) -> String {
    ROMAN_NUMERAL_TABLE
        .iter()
        .find(|(roman, _)| *roman == word)
        .map(|(_, arabic)| arabic.to_string())
        .unwrap_or_else(|| word.to_string())
}

fn is_year_token(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|c| c.is_ascii_digit())
}

/// Normalize a single name (filename or directory name) into a query.
pub fn from_text(name: &str) -> String {
    let words = break_into_words(name);
    let hard_end = words
        .iter()
        .position(|w| HARD_END_WORDS.contains(&w.to_lowercase().as_str()));
    let soft_end = words
        .iter()
        .position(|w| SOFT_END_WORDS.contains(&w.to_lowercase().as_str()));
    // Cut right after the last year token; soft markers only apply when
    // no year exists at all.
    let year_cutoff = words
        .iter()
        .rposition(|w| is_year_token(w))
        .map(|i| i + 1);

    let mut cutoffs = vec![words.len()];
    if let Some(i) = hard_end {
        cutoffs.push(i);
    }
    match year_cutoff {
        Some(i) => cutoffs.push(i),
        None => {
            if let Some(i) = soft_end {
                cutoffs.push(i);
            }
        }
    }
    let end = cutoffs.into_iter().filter(|i| *i > 0).min().unwrap_or(0);

    let joined = words[..end]
        .iter()
        .map(|w| transliterate(w))
        .map(|w| unescape_leetspeak(&w))
        .map(|w| unescape_roman_numeral(&w))
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    let joined = DOUBLE_UNDERSCORE.replace_all(&joined, "_");
    DIRECTORS_CUT.replace_all(&joined, "").to_string()
}

/// Derive ranked query candidates from a file path.
///
/// Returns a comma-joined, de-duplicated list, ordered by (has-year, length)
/// descending so year-qualified, more specific candidates are tried first.
pub fn from_path(filepath: &str) -> String {
    let path = Path::new(filepath);
    let component = |p: Option<&Path>| {
        p.and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    };
    let filename = component(Some(path));
    let parent = component(path.parent());
    let grandparent = component(path.parent().and_then(|p| p.parent()));

    // A pack/collection directory name describes many films, not this one.
    let mut results = if !is_movie_pack(&parent) {
        vec![from_text(&parent), from_text(&filename)]
    } else {
        vec![from_text(&filename)]
    };
    results.retain(|r| !r.is_empty());

    // No year anywhere? The grandparent sometimes carries it.
    if !results.iter().any(|r| year(r).is_some()) && !is_movie_pack(&grandparent) {
        let tmp = from_text(&grandparent);
        if year(&tmp).is_some() {
            results.push(tmp);
        }
    }

    // Propagate the first discovered year to candidates that lack one, so a
    // year-qualified query can always be tried first.
    if let Some(first_year) = results.iter().find_map(|r| year(r)) {
        results = results
            .iter()
            .map(|r| ensure_year(r, year(r).unwrap_or(first_year)))
            .collect();
    }

    let mut unique: Vec<String> = Vec::new();
    for r in results {
        if !unique.contains(&r) {
            unique.push(r);
        }
    }
    unique.sort_by(|a, b| {
        let key = |q: &str| (year(q).is_some(), q.len());
        key(b).cmp(&key(a))
    });
    unique.join(",")
}

fn comparison_tokens(query: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for t in query.split('_').filter(|t| !t.is_empty()) {
        // "the" matches almost anything; only keep it when it IS the query.
        if t == "the" && query != "the" {
            continue;
        }
        if !tokens.contains(&t) {
            tokens.push(t);
        }
    }
    tokens
}

/// Score the similarity of two normalized queries. Higher is more similar.
pub fn compare(q1: &str, q2: &str) -> f64 {
    let t1 = comparison_tokens(q1);
    let t2 = comparison_tokens(q2);

    let matching = t1.iter().filter(|w| q2.contains(*w)).count()
        + t2.iter().filter(|w| q1.contains(*w)).count();
    let missing = t1.iter().filter(|w| !q2.contains(*w)).count()
        + t2.iter().filter(|w| !q1.contains(*w)).count();
    let is_substring = !q1.is_empty() && !q2.is_empty() && (q1.contains(q2) || q2.contains(q1));
    let perfect_match = trim_year(q1) == trim_year(q2);
    // Coincidental substring hits alone must never score high.
    let no_matching_words = matching == 0;

    (is_substring as u32 * 5) as f64
        + (perfect_match as u32 * 10) as f64
        + (matching * matching) as f64
        - missing as f64
        - (no_matching_words as u32 * 10) as f64
        - (t1.len().abs_diff(t2.len()) * 2) as f64
}

/// Detect the special edition tag of a release name or path, if any.
pub fn special_release_type(name_or_path: &str) -> Option<SpecialEdition> {
    static PATTERN_CACHE: Lazy<Vec<Option<Regex>>> = Lazy::new(|| {
        SPECIAL_EDITION_RULES
            .iter()
            .map(|(_, p)| match p {
                EditionPattern::Word(_) => None,
                EditionPattern::Pattern(re) => Some(Regex::new(re).unwrap()),
            })
            .collect()
    });
    let lower = name_or_path.to_lowercase();
    let words = break_into_words(&lower);
    for (i, (edition, pattern)) in SPECIAL_EDITION_RULES.iter().enumerate() {
        let matched = match pattern {
            EditionPattern::Word(options) => {
                words.iter().any(|w| options.contains(&w.as_str()))
            }
            EditionPattern::Pattern(_) => {
                PATTERN_CACHE[i].as_ref().is_some_and(|re| re.is_match(&lower))
            }
        };
        if matched {
            return Some(*edition);
        }
    }
    None
}
