//! Splitting budget-proposal documents into top-level proposal segments.
//!
//! # Document conventions
//!
//! - A top-level proposal opens a line with a parenthesized Chinese ordinal:
//!   `(一)`, `(十二)`, or the full-width `（三）`.
//! - Budget line headings open with `第N項` or `第N款`. They close the previous
//!   proposal but are not proposals themselves.
//! - Sub-items inside a proposal are numbered `1.`, `2.`, ... and stay embedded
//!   in their parent's text.
//! - Proposer and co-signer lists are introduced by `提案人：` and `連署人：`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::record::{DocId, Segment};

/// A line that starts a new chunk: an ordinal proposal or an item/clause heading.
static CHUNK_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[(（][一二三四五六七八九十百○]+[)）]|第[0-9]+[項款])").expect("valid regex")
});

/// A chunk that is a proposal. `○`-only ordinals mark placeholders, not proposals.
static PROPOSAL_OPENER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[(（][一二三四五六七八九十百]+[)）]").expect("valid regex"));

static LEADING_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[(（][一二三四五六七八九十百○]+[)）]\s*").expect("valid regex")
});

/// `N.` followed by a non-digit, so decimal amounts like `1.5萬元` are left alone.
static SUB_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"　?([0-9]+)\.([^0-9]|$)").expect("valid regex"));

const LINE_JOINER: &str = "　";
const LABELS: [&str; 2] = ["提案人：", "連署人："];

/// Splits documents into [`Segment`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct Segmenter;

impl Segmenter {
    /// Segments of `text`, indexed in document order.
    pub fn split(&self, doc: &DocId, text: &str) -> Vec<Segment> {
        let segments: Vec<Segment> = segment_document(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Segment {
                doc: doc.clone(),
                index,
                text,
            })
            .collect();
        debug!(%doc, segments = segments.len(), "segmented document");
        segments
    }
}

/// Split raw document text into normalized proposal texts.
///
/// Returns an empty list when the document has no ordinal-prefixed proposal.
pub fn segment_document(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    split_chunks(text)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty() && PROPOSAL_OPENER.is_match(chunk))
        .map(|chunk| normalize(&chunk))
        .collect()
}

/// Remove a leading `(一)`-style marker from proposal content.
pub fn strip_ordinal_marker(content: &str) -> &str {
    match LEADING_ORDINAL.find(content) {
        Some(m) => &content[m.end()..],
        None => content,
    }
}

fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if CHUNK_OPENER.is_match(line) && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Flatten a chunk onto one line, then re-open paragraph breaks before the
/// proposer/co-signer labels and numbered sub-items.
fn normalize(chunk: &str) -> String {
    let mut text = chunk
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(LINE_JOINER);

    for label in LABELS {
        text = text
            .replace(&format!("{LINE_JOINER}{label}"), label)
            .replace(label, &format!("\n\n{label}"));
    }

    SUB_ITEM.replace_all(&text, "\n\n${1}.${2}").into_owned()
}
