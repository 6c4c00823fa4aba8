// Rule-based sentence segmentation for extracted document text.

use once_cell::sync::Lazy;
use regex::Regex;

// Terminal punctuation, optional closing quotes/brackets, then whitespace or
// end of line.
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.!?]+["'\)\]\u{201D}\u{2019}]*(?:\s+|$)"#).expect("valid sentence regex")
});

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "jr", "sr", "st", "no", "inc", "ltd", "co", "corp", "vs", "etc",
    "e.g", "i.e", "approx", "dept", "acct", "jan", "feb", "mar", "apr", "jun", "jul", "aug",
    "sep", "sept", "oct", "nov", "dec",
];

/// Splits `text` into sentences in document order.
///
/// Line breaks always end a sentence; within a line a sentence ends after
/// `.`, `!` or `?` followed by whitespace, unless the dot closes an
/// abbreviation or an initial. Returned slices are trimmed and non-empty.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();

    for line in text.lines() {
        let mut start = 0;
        for m in SENTENCE_END.find_iter(line) {
            let matched = m.as_str();
            if matched.starts_with('.')
                && !matched.starts_with("..")
                && ends_with_abbreviation(&line[start..m.start()])
            {
                continue;
            }

            let end = m.start() + matched.trim_end().len();
            push_trimmed(&mut sentences, &line[start..end]);
            start = m.end();
        }
        push_trimmed(&mut sentences, &line[start..]);
    }

    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

fn ends_with_abbreviation(before_dot: &str) -> bool {
    let word = before_dot
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| matches!(c, '(' | '"' | '\'' | '[' | '\u{201C}'));

    if word.is_empty() {
        return false;
    }

    // Initials and initialisms: "J", "U.S", "P.O"
    if word
        .split('.')
        .all(|part| part.chars().count() == 1 && part.chars().all(|c| c.is_uppercase()))
    {
        return true;
    }

    let lowered = word.to_lowercase();
    ABBREVIATIONS.contains(&lowered.as_str())
}
