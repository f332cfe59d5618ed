//! Vertical card display for search results.

use std::fmt::Write;

use budgetlaw_core::ProposalRecord;
use budgetlaw_core::proposals::NAME_SEPARATOR;
use budgetlaw_store::SearchHit;

// ── Public API ──

/// Print every hit as a numbered card.
pub fn print_hits(query: &str, hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No proposals match {query:?}.");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        print!("{}", render_card(rank + 1, hit));
        println!();
    }
}

/// One proposal as a card grouped into identity, amounts, people and text.
pub fn render_card(rank: usize, hit: &SearchHit) -> String {
    let r = &hit.record;
    let mut out = String::new();

    match hit.distance {
        Some(d) => {
            let _ = writeln!(out, "=== #{rank} {} (distance {d:.4}) ===", r.category);
        }
        None => {
            let _ = writeln!(out, "=== #{rank} {} ===", r.category);
        }
    }

    section(
        &mut out,
        "Proposal",
        &[
            ("committee", Some(r.committee.clone())),
            ("action", Some(r.action.to_string())),
        ],
    );
    section(&mut out, "Amounts", &amount_rows(r));
    section(
        &mut out,
        "People",
        &[
            ("proposer", names(&r.proposer)),
            ("co_signers", names(&r.co_signers)),
        ],
    );

    let _ = writeln!(out, "Content");
    for line in r.content.lines().filter(|l| !l.trim().is_empty()) {
        let _ = writeln!(out, "  {}", line.trim());
    }
    if let Some(remarks) = &r.remarks {
        let _ = writeln!(out, "Remarks");
        let _ = writeln!(out, "  {remarks}");
    }
    out
}

// ── Section rendering ──

fn section(out: &mut String, header: &str, rows: &[(&str, Option<String>)]) {
    if rows.iter().all(|(_, v)| v.is_none()) {
        return;
    }
    let _ = writeln!(out, "{header}");
    for (label, value) in rows {
        if let Some(value) = value {
            let _ = writeln!(out, "  {label:<12} {value}");
        }
    }
}

fn amount_rows(r: &ProposalRecord) -> Vec<(&'static str, Option<String>)> {
    vec![
        ("cost", r.cost.map(format_amount)),
        ("frozen", r.frozen.map(format_amount)),
        ("deleted", r.deleted.map(format_amount)),
        ("added", r.added.map(format_amount)),
    ]
}

fn names(list: &[String]) -> Option<String> {
    (!list.is_empty()).then(|| list.join(NAME_SEPARATOR))
}

/// Thousands-grouped amount in 元.
fn format_amount(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{grouped} 元")
}
