/*!
 * Subtitle text post-processing.
 *
 * Downloaded SRT files are frequently mangled by encoding round-trips and
 * padded with advertisement boxes. This filter re-splits broken textboxes,
 * drops the first box (which almost always carries the uploader's ad),
 * and renumbers the rest.
 */

use once_cell::sync::Lazy;
use regex::Regex;

static TIMESTAMP_ARROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{2}:[0-9]{2}:[0-9]{2},[0-9]{3} -->").unwrap());
static BOX_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n(?:[0-9]{1,4}\n)?").unwrap());

/// Split a textbox that contains more than one timestamp line back into
/// separate boxes by inserting a blank line before each extra timestamp.
fn split_merged_textbox(textbox: &str) -> String {
    let starts: Vec<usize> = TIMESTAMP_ARROW
        .find_iter(textbox)
        .skip(1)
        .map(|m| m.start())
        .collect();
    if starts.is_empty() {
        return textbox.to_string();
    }
    let mut out = String::with_capacity(textbox.len() + starts.len());
    let mut last = 0;
    for start in starts {
        out.push_str(&textbox[last..start]);
        out.push('\n');
        last = start;
    }
    out.push_str(&textbox[last..]);
    out
}

/// Repair an SRT payload: normalize newlines, re-split merged textboxes,
/// drop the leading ad box and renumber the remaining entries.
pub fn fix_srt(subtitle: &str) -> String {
    let unix_newlines = subtitle.replace('\r', "");
    let rejoined = unix_newlines
        .split("\n\n")
        .map(split_merged_textbox)
        .collect::<Vec<_>>()
        .join("\n\n");
    // Strip the per-box sequence numbers; they are regenerated below.
    let unnumbered = BOX_NUMBER.replace_all(&rejoined, "\n\n");
    unnumbered
        .split("\n\n")
        .skip(1)
        .enumerate()
        .map(|(i, text)| format!("{}\n{}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
