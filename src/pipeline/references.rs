//! Reference Extractor
//!
//! Builds the labeled reference list from a research report and checks that
//! bracketed citations in the sections point at existing labels.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate};
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::types::{
    Reference, ResearchReport, Result, Section, ValidationError, ValidationErrorKind,
};

static YEAR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").ok());

static CITATION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(\d+(?:\s*[,\-–]\s*\d+)*)\]").ok());

/// Extract labeled references from a research report.
///
/// Source entries are preferred; bare citation URLs are used only when there are
/// no source entries. Empty and duplicate URLs are skipped, and labels `1..N` are
/// assigned in source order over the entries actually consumed.
pub fn extract(report: &ResearchReport) -> Vec<Reference> {
    let candidates: Vec<(String, String, Option<String>)> = if report.source_entries.is_empty()
    {
        report
            .citations
            .iter()
            .map(|url| (url.clone(), url.clone(), None))
            .collect()
    } else {
        report
            .source_entries
            .iter()
            .map(|e| (e.title.clone(), e.url.clone(), e.date.clone()))
            .collect()
    };

    let mut seen = HashSet::new();
    let mut references = Vec::new();

    for (title, url, date) in candidates {
        let url = url.trim().to_string();
        if url.is_empty() {
            continue;
        }
        if !seen.insert(normalize_url(&url)) {
            debug!(url = %url, "Skipping duplicate reference");
            continue;
        }

        let title = if title.trim().is_empty() {
            url.clone()
        } else {
            title.trim().to_string()
        };
        let year = date.as_deref().and_then(parse_year);

        references.push(Reference {
            label: (references.len() + 1).to_string(),
            title,
            url,
            date,
            year,
            authors: Vec::new(),
            journal: None,
            enriched: false,
        });
    }

    references
}

/// Comparison key for duplicate detection.
///
/// Lowercases scheme and host, drops `www.`, the fragment and a trailing slash.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };

    url.set_fragment(None);
    let host = url
        .host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
        .unwrap_or_default();

    let path = url.path().trim_end_matches('/');
    let query = url.query().map(|q| format!("?{}", q)).unwrap_or_default();
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}{}", url.scheme(), host, port, path, query)
}

/// Publication year from a free-form date.
///
/// Accepts RFC 3339, `YYYY-MM-DD`, `DD/MM/YYYY`, or any standalone year in
/// 1800-2099. Returns `None` rather than guessing.
pub fn parse_year(date: &str) -> Option<i32> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.year());
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(date, format) {
            return Some(d.year());
        }
    }
    YEAR_RE
        .as_ref()?
        .captures(date)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Citation numbers appearing in `[k]`, `[k, m]` and `[k-m]` markers.
///
/// Ranges contribute their endpoints only.
pub fn cited_numbers(text: &str) -> Vec<u32> {
    let Some(re) = CITATION_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .flat_map(|m| {
            m.as_str()
                .split([',', '-', '–'])
                .filter_map(|n| n.trim().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Citation numbers in `sections` that fall outside `1..=reference_count`,
/// sorted and deduplicated
pub fn dangling_citations(sections: &[Section], reference_count: usize) -> Vec<u32> {
    let mut dangling: Vec<u32> = sections
        .iter()
        .flat_map(|s| cited_numbers(&s.content))
        .filter(|&k| k == 0 || k as usize > reference_count)
        .collect();
    dangling.sort_unstable();
    dangling.dedup();
    dangling
}

/// Labels must read `"1".."N"` in order
pub fn check_labels(references: &[Reference]) -> Result<()> {
    for (i, reference) in references.iter().enumerate() {
        let expected = (i + 1).to_string();
        if reference.label != expected {
            return Err(ValidationError::new(
                ValidationErrorKind::Consistency,
                format!(
                    "reference at position {} has label {:?}, expected {:?}",
                    i, reference.label, expected
                ),
            )
            .with_field("references")
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalSectionId, SourceEntry};
    use proptest::prelude::*;

    fn entry(title: &str, url: &str, date: Option<&str>) -> SourceEntry {
        SourceEntry {
            title: title.to_string(),
            url: url.to_string(),
            date: date.map(String::from),
        }
    }

    #[test]
    fn test_extract_prefers_source_entries() {
        let report = ResearchReport {
            answer_text: "answer".to_string(),
            source_entries: vec![
                entry("A", "https://a.org/x", Some("2021-06-01")),
                entry("B", "https://b.org/y", None),
            ],
            citations: vec!["https://c.org".to_string()],
        };
        let refs = extract(&report);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].label, "1");
        assert_eq!(refs[0].year, Some(2021));
        assert_eq!(refs[1].label, "2");
        assert_eq!(refs[1].year, None);
        assert!(refs.iter().all(|r| !r.url.contains("c.org")));
    }

    #[test]
    fn test_extract_falls_back_to_citations() {
        let report = ResearchReport {
            answer_text: "answer".to_string(),
            source_entries: vec![],
            citations: vec!["https://c.org/paper".to_string(), "".to_string()],
        };
        let refs = extract(&report);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].title, "https://c.org/paper");
        assert_eq!(refs[0].label, "1");
    }

    #[test]
    fn test_extract_skips_empty_and_duplicate_urls() {
        let report = ResearchReport {
            answer_text: String::new(),
            source_entries: vec![
                entry("A", "https://www.Example.org/study/", None),
                entry("Blank", "  ", None),
                entry("A again", "https://example.org/study#results", None),
                entry("C", "https://example.org/other", None),
            ],
            citations: vec![],
        };
        let refs = extract(&report);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].title, "A");
        assert_eq!(refs[1].title, "C");
        assert_eq!(refs[1].label, "2");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://WWW.Example.org/a/b/#frag"),
            "https://example.org/a/b"
        );
        assert_eq!(
            normalize_url("https://example.org/search?q=1"),
            "https://example.org/search?q=1"
        );
        assert_eq!(normalize_url("not a url/"), "not a url");
    }

    #[test]
    fn test_parse_year_formats() {
        assert_eq!(parse_year("2020-02-29T10:00:00Z"), Some(2020));
        assert_eq!(parse_year("2019-11-03"), Some(2019));
        assert_eq!(parse_year("03/11/2018"), Some(2018));
        assert_eq!(parse_year("Published March 2017"), Some(2017));
        assert_eq!(parse_year("n.d."), None);
        assert_eq!(parse_year("12345"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn test_cited_numbers() {
        assert_eq!(cited_numbers("see [1] and [2, 4] or [5-7]"), vec![1, 2, 4, 5, 7]);
        assert!(cited_numbers("[a] [1.5] [3 days]").is_empty());
    }

    #[test]
    fn test_dangling_citations() {
        let sections = vec![
            Section::new(CanonicalSectionId::DiagnosticHypotheses, "Takotsubo [1][3]"),
            Section::new(CanonicalSectionId::ComplementaryExams, "MRI [2-5], [0]"),
        ];
        assert_eq!(dangling_citations(&sections, 3), vec![0, 5]);
        assert!(dangling_citations(&sections[..1], 3).is_empty());
    }

    #[test]
    fn test_check_labels() {
        let report = ResearchReport {
            answer_text: String::new(),
            source_entries: vec![entry("A", "https://a.org", None)],
            citations: vec![],
        };
        let mut refs = extract(&report);
        assert!(check_labels(&refs).is_ok());
        refs[0].label = "2".to_string();
        assert!(check_labels(&refs).is_err());
    }

    proptest! {
        #[test]
        fn prop_labels_are_contiguous(
            urls in prop::collection::vec("https://[a-c]{1,2}\\.org/[a-c]{0,2}", 0..20),
        ) {
            let report = ResearchReport {
                answer_text: String::new(),
                source_entries: urls.iter().map(|u| entry("t", u, None)).collect(),
                citations: vec![],
            };
            let refs = extract(&report);

            let distinct: HashSet<_> = urls.iter().map(|u| normalize_url(u)).collect();
            prop_assert_eq!(refs.len(), distinct.len());
            for (i, r) in refs.iter().enumerate() {
                prop_assert_eq!(&r.label, &(i + 1).to_string());
            }
        }
    }
}
