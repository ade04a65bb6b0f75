//! Section Parser
//!
//! Turns the reasoning model's free text into the fixed, ordered section list.
//! Parsing is total: every required section is always present, with placeholder
//! content when no marker could be located.
//!
//! Each section id is tried against an ordered matcher chain:
//!
//! | Kind | Accepts |
//! |------|---------|
//! | `Exact` | `KEY_DATA:` at line start |
//! | `Decorated` | `## KEY_DATA:`, `**KEY_DATA:**`, `**KEY_DATA**:`, `[KEY_DATA]:` |
//! | `Relaxed` | `Key data -`, `key-data:`, `KEY DATA` alone on a line |
//! | `Heading` | `## Differential diagnosis`, `**Key findings**` |
//!
//! The first matcher yielding non-empty content wins; within a matcher the first
//! occurrence in the text wins. A section's content runs to the next located marker
//! of any section, so marker order in the text does not matter.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::types::{CanonicalSectionId, Section};

/// Matcher kinds in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Exact,
    Decorated,
    Relaxed,
    Heading,
}

impl MatcherKind {
    pub const ALL: [MatcherKind; 4] = [
        Self::Exact,
        Self::Decorated,
        Self::Relaxed,
        Self::Heading,
    ];
}

/// A parsed section together with the matcher that located it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMatch {
    pub section: Section,
    /// `None` for placeholder sections
    pub matched_by: Option<MatcherKind>,
}

struct IdMatchers {
    id: CanonicalSectionId,
    decorated: Option<Regex>,
    relaxed: Option<Regex>,
    heading: Option<Regex>,
}

static MATCHERS: LazyLock<Vec<IdMatchers>> = LazyLock::new(|| {
    CanonicalSectionId::ALL
        .into_iter()
        .map(|id| IdMatchers {
            id,
            decorated: Regex::new(&decorated_pattern(id.marker())).ok(),
            relaxed: Regex::new(&relaxed_pattern(id.marker())).ok(),
            heading: Regex::new(&heading_pattern(id.heading_aliases())).ok(),
        })
        .collect()
});

fn decorated_pattern(marker: &str) -> String {
    format!(
        r"^\s*(?:#{{1,6}}\s*)?(?:[*_]{{1,3}}|\[)?\s*{}\s*(?::\s*(?:[*_]{{1,3}}|\])?|(?:[*_]{{1,3}}|\])\s*:)",
        regex::escape(marker)
    )
}

fn relaxed_pattern(marker: &str) -> String {
    let words = marker
        .split('_')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s_\-]+");
    format!(
        r"(?i)^\s*(?:#{{1,6}}\s*)?[*_\[]*\s*{}\s*[*_\]]*\s*(?::[*_\]]*|[\-–—]|$)",
        words
    )
}

fn heading_pattern(aliases: &[&str]) -> String {
    let alternatives = aliases
        .iter()
        .map(|a| regex::escape(a))
        .collect::<Vec<_>>()
        .join("|");
    format!(
        r"(?i)^\s*(?:#{{1,6}}\s*(?:\d+[.)]\s*)?(?:{a})\s*:?|(?:\*\*|__)\s*(?:\d+[.)]\s*)?(?:{a})\s*:?\s*(?:\*\*|__)\s*:?)\s*$",
        a = alternatives
    )
}

/// Offset within `line` where section content starts, if `kind` recognizes the
/// line as a marker for `id`
pub fn match_line(kind: MatcherKind, id: CanonicalSectionId, line: &str) -> Option<usize> {
    if kind == MatcherKind::Exact {
        let marker = id.marker();
        return (line.starts_with(marker) && line[marker.len()..].starts_with(':'))
            .then_some(marker.len() + 1);
    }

    let matchers = MATCHERS.iter().find(|m| m.id == id)?;
    let regex = match kind {
        MatcherKind::Decorated => matchers.decorated.as_ref(),
        MatcherKind::Relaxed => matchers.relaxed.as_ref(),
        MatcherKind::Heading => matchers.heading.as_ref(),
        MatcherKind::Exact => None,
    }?;
    regex.find(line).map(|m| m.end())
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    id: CanonicalSectionId,
    kind: MatcherKind,
    line_start: usize,
    content_start: usize,
}

/// Every marker line in the text, with the strongest matcher per (line, id)
fn collect_hits(raw: &str) -> Vec<Hit> {
    let mut hits = Vec::new();
    let mut offset = 0;

    for chunk in raw.split_inclusive('\n') {
        let line = chunk.trim_end_matches(['\n', '\r']);
        for id in CanonicalSectionId::ALL {
            let found = MatcherKind::ALL
                .into_iter()
                .find_map(|kind| match_line(kind, id, line).map(|end| (kind, end)));
            if let Some((kind, end)) = found {
                hits.push(Hit {
                    id,
                    kind,
                    line_start: offset,
                    content_start: offset + end,
                });
            }
        }
        offset += chunk.len();
    }

    hits
}

fn content_of<'a>(raw: &'a str, hit: &Hit, boundaries: &[usize]) -> &'a str {
    let end = boundaries
        .iter()
        .copied()
        .filter(|&b| b > hit.line_start)
        .min()
        .unwrap_or(raw.len());
    raw.get(hit.content_start..end.max(hit.content_start))
        .unwrap_or_default()
        .trim()
}

/// Parse sections, reporting which matcher located each one
pub fn parse_detailed(raw: &str) -> Vec<SectionMatch> {
    let hits = collect_hits(raw);
    let mut selected: BTreeMap<CanonicalSectionId, Hit> = BTreeMap::new();

    for kind in MatcherKind::ALL {
        let boundaries: Vec<usize> = hits
            .iter()
            .filter(|h| h.kind <= kind)
            .map(|h| h.line_start)
            .collect();

        for id in CanonicalSectionId::ALL {
            if selected.contains_key(&id) {
                continue;
            }
            let winner = hits
                .iter()
                .filter(|h| h.id == id && h.kind == kind)
                .find(|h| !content_of(raw, h, &boundaries).is_empty());
            if let Some(hit) = winner {
                selected.insert(id, *hit);
            }
        }
    }

    // Weaker markers bound a section only once they were themselves selected
    let selected_starts: Vec<usize> = selected.values().map(|h| h.line_start).collect();
    let final_content = |hit: &Hit| {
        let boundaries: Vec<usize> = hits
            .iter()
            .filter(|h| h.kind <= hit.kind)
            .map(|h| h.line_start)
            .chain(selected_starts.iter().copied())
            .collect();
        content_of(raw, hit, &boundaries)
    };

    CanonicalSectionId::ALL
        .into_iter()
        .filter_map(|id| {
            let located = selected
                .get(&id)
                .map(|hit| (hit.kind, final_content(hit)))
                .filter(|(_, content)| !content.is_empty());

            match located {
                Some((kind, content)) => Some(SectionMatch {
                    section: Section::new(id, content),
                    matched_by: Some(kind),
                }),
                None if id == CanonicalSectionId::RareDisease => None,
                None => {
                    debug!(section = %id, "Section not located, using placeholder");
                    Some(SectionMatch {
                        section: Section::placeholder(id),
                        matched_by: None,
                    })
                }
            }
        })
        .collect()
}

/// Parse free text into canonical sections. Never fails.
pub fn parse(raw: &str) -> Vec<Section> {
    parse_detailed(raw).into_iter().map(|m| m.section).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::pipeline::SECTION_PLACEHOLDER;
    use crate::types::CanonicalSectionId::*;
    use proptest::prelude::*;

    fn all_markers_text() -> String {
        CanonicalSectionId::REQUIRED
            .iter()
            .map(|id| format!("{}:\ncontent of {}", id.marker(), id.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_exact_matcher() {
        assert_eq!(match_line(MatcherKind::Exact, KeyData, "KEY_DATA: BP 90/60"), Some(9));
        assert_eq!(match_line(MatcherKind::Exact, KeyData, "key_data: x"), None);
        assert_eq!(match_line(MatcherKind::Exact, KeyData, " KEY_DATA:"), None);
        assert_eq!(match_line(MatcherKind::Exact, KeyData, "KEY_DATA"), None);
    }

    #[test]
    fn test_decorated_matcher() {
        for line in [
            "## KEY_DATA:",
            "**KEY_DATA:**",
            "**KEY_DATA**:",
            "[KEY_DATA]:",
            "### **KEY_DATA:**",
        ] {
            assert!(
                match_line(MatcherKind::Decorated, KeyData, line).is_some(),
                "{line}"
            );
        }
        assert!(match_line(MatcherKind::Decorated, KeyData, "**Key data:**").is_none());
    }

    #[test]
    fn test_relaxed_matcher() {
        for line in [
            "Key data:",
            "key-data - BP 90/60",
            "KEY DATA",
            "**Diagnostic Hypotheses** —",
        ] {
            let id = if line.contains("iagnostic") {
                DiagnosticHypotheses
            } else {
                KeyData
            };
            assert!(match_line(MatcherKind::Relaxed, id, line).is_some(), "{line}");
        }
        assert!(match_line(MatcherKind::Relaxed, KeyData, "Key data were reviewed").is_none());
    }

    #[test]
    fn test_heading_matcher() {
        assert!(
            match_line(MatcherKind::Heading, DiagnosticHypotheses, "## Differential diagnosis")
                .is_some()
        );
        assert!(match_line(MatcherKind::Heading, KeyData, "**Key findings**").is_some());
        assert!(match_line(MatcherKind::Heading, KeyData, "### 2. Key findings:").is_some());
        assert!(match_line(MatcherKind::Heading, KeyData, "Key findings").is_none());
        assert!(
            match_line(MatcherKind::Heading, TherapeuticDecisions, "## Treatment of sepsis")
                .is_none()
        );
    }

    #[test]
    fn test_all_markers_present() {
        let sections = parse(&all_markers_text());
        assert_eq!(sections.len(), 7);
        for (section, id) in sections.iter().zip(CanonicalSectionId::REQUIRED) {
            assert_eq!(section.section_type, id);
            assert_eq!(section.content, format!("content of {}", id.as_str()));
            assert!(!section.degraded);
        }
    }

    #[test]
    fn test_one_marker_missing_gets_placeholder() {
        let text = all_markers_text().replace("COMPLEMENTARY_EXAMS:", "");
        let sections = parse(&text);

        assert_eq!(sections.len(), 7);
        let degraded: Vec<_> = sections.iter().filter(|s| s.degraded).collect();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].section_type, ComplementaryExams);
        assert_eq!(degraded[0].content, SECTION_PLACEHOLDER);
    }

    #[test]
    fn test_empty_input_is_all_placeholders() {
        let sections = parse("");
        assert_eq!(sections.len(), 7);
        assert!(sections.iter().all(|s| s.degraded));
    }

    #[test]
    fn test_empty_exact_falls_through_to_weaker_matcher() {
        let text = "KEY_DATA:\nCLINICAL_CONTEXT: ctx\n**Key data:** lactate 4.2";
        let detailed = parse_detailed(text);
        let key = detailed
            .iter()
            .find(|m| m.section.section_type == KeyData)
            .unwrap();
        assert_eq!(key.matched_by, Some(MatcherKind::Relaxed));
        assert_eq!(key.section.content, "lactate 4.2");
        assert_eq!(detailed[0].section.content, "ctx");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let text = "KEY_DATA: first\nCLINICAL_CONTEXT: ctx\nKEY_DATA: second";
        let sections = parse(text);
        assert_eq!(sections[0].content, "ctx");
        assert_eq!(sections[1].content, "first");
    }

    #[test]
    fn test_mixed_decoration_styles() {
        let text = "\
## CLINICAL_CONTEXT:
54-year-old woman with chest pain.
**KEY_DATA:** troponin 0.8
Diagnostic hypotheses -
1. Takotsubo
## Further investigations
Coronary angiography
THERAPEUTIC_DECISIONS:
Beta blockers
PROGNOSIS_FOLLOWUP:
Good
PATIENT_EXPLANATIONS:
Stress-related heart condition.";
        let detailed = parse_detailed(text);
        let kinds: Vec<_> = detailed.iter().map(|m| m.matched_by).collect();
        assert_eq!(
            kinds,
            vec![
                Some(MatcherKind::Decorated),
                Some(MatcherKind::Decorated),
                Some(MatcherKind::Relaxed),
                Some(MatcherKind::Heading),
                Some(MatcherKind::Exact),
                Some(MatcherKind::Exact),
                Some(MatcherKind::Exact),
            ]
        );
        assert_eq!(detailed[1].section.content, "troponin 0.8");
        assert_eq!(detailed[2].section.content, "1. Takotsubo");
        assert_eq!(detailed[3].section.content, "Coronary angiography");
    }

    #[test]
    fn test_rare_disease_only_when_located() {
        assert_eq!(parse(&all_markers_text()).len(), 7);

        let text = format!("{}\nRARE_DISEASE:\nFabry disease", all_markers_text());
        let sections = parse(&text);
        assert_eq!(sections.len(), 8);
        assert_eq!(sections[7].section_type, RareDisease);
        assert_eq!(sections[7].content, "Fabry disease");
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = all_markers_text().replace('\n', "\r\n");
        let sections = parse(&text);
        assert!(sections.iter().all(|s| !s.degraded));
        assert_eq!(sections[0].content, "content of clinical_context");
    }

    proptest! {
        #[test]
        fn prop_markers_in_any_order(
            order in Just(CanonicalSectionId::REQUIRED.to_vec()).prop_shuffle(),
            bodies in prop::collection::vec("[a-z]{1,10}( [a-z]{1,10}){0,4}", 7),
        ) {
            let text = order
                .iter()
                .zip(&bodies)
                .map(|(id, body)| format!("{}:\nnote {}", id.marker(), body))
                .collect::<Vec<_>>()
                .join("\n\n");
            let sections = parse(&text);

            prop_assert_eq!(sections.len(), 7);
            for (i, section) in sections.iter().enumerate() {
                prop_assert_eq!(section.section_type, CanonicalSectionId::REQUIRED[i]);
                prop_assert!(!section.degraded);
                let pos = order.iter().position(|id| *id == section.section_type).unwrap();
                prop_assert_eq!(&section.content, &format!("note {}", bodies[pos]));
            }
        }

        #[test]
        fn prop_parse_is_total(raw in ".{0,400}") {
            let sections = parse(&raw);
            prop_assert!(sections.len() == 7 || sections.len() == 8);
            for pair in sections.windows(2) {
                prop_assert!(pair[0].section_type < pair[1].section_type);
            }
        }
    }
}
