// src/rewrite/scrub.rs
use once_cell::sync::Lazy;
use regex::Regex;

// Meta-commentary models leak despite the prompt (counts, timing, confirmations).
static META: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\(\s*\d+\s*(?:palavras?|words?)\s*\)",
        r"(?i)\b\d+\s*(?:palavras?|words?)\b",
        r"(?i)\b(?:exatamente|exactly)\s+\d+\b",
        r"(?i)\b(?:contagem|word\s+count|exact(?:ly)?\s+count)\b",
        r"(?i)\b(?:total\s*de|total\s*of)\s*\d+\b",
        r"(?i)\b\d+\s*(?:segundos?|seconds?)\b",
        r"(?i)\b(?:tempo\s*alvo|target\s*time)\b",
        r"(?i)\b(?:resultado\s*esperado|expected\s*result)\b",
        r"(?i)\bconfirm[oa]\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+([.,;:!?])").unwrap());
static EMPTY_PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\)").unwrap());
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])[\s.!?:;,]*$").unwrap());

/// Strip word-count/timing/confirmation chatter and tidy spacing. Idempotent.
pub fn scrub_meta_commentary(text: &str) -> String {
    // a removal can expose a new match ("7 10 segundos palavras"), so run to a fixed point;
    // every pass only shortens the text
    let mut out = scrub_once(text);
    loop {
        let next = scrub_once(&out);
        if next == out {
            return out;
        }
        out = next;
    }
}

fn scrub_once(text: &str) -> String {
    let mut out = text.to_string();
    for re in META.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out = EMPTY_PARENS.replace_all(&out, "").into_owned();
    out = MULTI_SPACE.replace_all(&out, " ").into_owned();
    out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1").into_owned();
    out = TRAILING_PUNCT.replace(out.trim(), "$1").into_owned();
    out.trim().to_string()
}
