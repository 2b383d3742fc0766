// src/digest.rs
//! Digest composer: order by category priority then recency, cap, and render as markdown.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::Fingerprint;
use crate::sources::Category;

/// One entry of the outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestItem {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source_name: String,
    pub category: Category,
    pub published_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub date_label: String,
    pub items: Vec<DigestItem>,
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Item count per category, in priority order; categories without items are omitted.
    pub fn category_counts(&self) -> Vec<(Category, usize)> {
        let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
        for it in &self.items {
            *counts.entry(it.category).or_default() += 1;
        }
        counts.into_iter().collect()
    }
}

/// Order `candidates` by category priority, then newest first, and keep at most `max_count`.
///
/// The sort is stable, so equal keys keep their input order. Total: an empty input
/// yields an empty digest.
pub fn compose(
    mut candidates: Vec<DigestItem>,
    max_count: usize,
    date_label: impl Into<String>,
    generated_at: DateTime<Utc>,
) -> Digest {
    candidates.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
    candidates.truncate(max_count);
    Digest {
        date_label: date_label.into(),
        items: candidates,
        generated_at,
    }
}

/// `YYYY.MM.DD` of `now` shifted by `offset_hours` from UTC. Out-of-range offsets fall back to UTC.
pub fn date_label(now: DateTime<Utc>, offset_hours: i32) -> String {
    const FORMAT: &str = "%Y.%m.%d";
    match FixedOffset::east_opt(offset_hours.saturating_mul(3600)) {
        Some(offset) => now.with_timezone(&offset).format(FORMAT).to_string(),
        None => now.format(FORMAT).to_string(),
    }
}

/// Heading of the message, also used as the webhook title field.
pub fn headline(digest: &Digest, title: &str) -> String {
    format!("🤖 {} | {}", title, digest.date_label)
}

/// Markdown body shared by the webhook transports.
pub fn render_markdown(digest: &Digest, title: &str) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(8 + digest.items.len() * 3);

    lines.push(format!("## 🤖 {title}"));
    lines.push(format!("### 📅 {}", digest.date_label));
    lines.push(String::new());
    lines.push("---".into());
    lines.push(format!("📈 **{} stories today**", digest.items.len()));
    lines.push(String::new());

    let stats: Vec<String> = digest
        .category_counts()
        .into_iter()
        .map(|(c, n)| format!("{} {}: {}", c.emoji(), c.label(), n))
        .collect();
    if !stats.is_empty() {
        lines.push(stats.join(" | "));
        lines.push(String::new());
    }
    lines.push("---".into());
    lines.push(String::new());

    for it in &digest.items {
        lines.push(format!("#### {} **{}**", it.category.emoji(), it.title));
        if !it.summary.is_empty() {
            lines.push(format!("> {}", it.summary));
        }
        if it.link.is_empty() {
            lines.push(format!("> 📍 **{}**", it.source_name));
        } else {
            lines.push(format!("> 📍 **{}** | 🔗 [Read more]({})", it.source_name, it.link));
        }
        lines.push(String::new());
    }

    lines.push("---".into());
    lines.push(String::new());
    lines.push(format!(
        "🤖 *Generated automatically at {} UTC*",
        digest.generated_at.format("%H:%M")
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_label_uses_offset() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(date_label(now, 0), "2025.03.01");
        assert_eq!(date_label(now, 8), "2025.03.02");
        assert_eq!(date_label(now, -21), "2025.02.28");
        // invalid offset => UTC
        assert_eq!(date_label(now, 99), "2025.03.01");
    }

    #[test]
    fn renders_stats_and_links() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 1, 30, 0).unwrap();
        let item = |title: &str, cat, link: &str| DigestItem {
            title: title.into(),
            summary: "s".into(),
            link: link.into(),
            source_name: "Src".into(),
            category: cat,
            published_at: at,
            fingerprint: crate::dedup::fingerprint(link, title),
        };
        let d = compose(
            vec![
                item("B", Category::Other, ""),
                item("A", Category::Funding, "https://x.test/a"),
            ],
            10,
            "2025.03.01",
            at,
        );
        let md = render_markdown(&d, "AI Daily Brief");
        assert!(md.starts_with("## 🤖 AI Daily Brief\n### 📅 2025.03.01"));
        assert!(md.contains("💰 Funding: 1 | 📰 General: 1"));
        assert!(md.contains("[Read more](https://x.test/a)"));
        assert!(md.find("**A**").unwrap() < md.find("**B**").unwrap());
        assert_eq!(headline(&d, "AI Daily Brief"), "🤖 AI Daily Brief | 2025.03.01");
    }
}
