//! Prompt Builder System
//!
//! Standardized prompt construction for the clinical pipeline's model calls.
//!
//! ## Design Principles
//!
//! 1. **Role Definition**: Clear clinical role for each task
//! 2. **Structured Objectives**: Numbered goals
//! 3. **Context Sections**: Case text, image findings, prior analysis
//! 4. **Focus Enforcement**: Prevent topic drift
//! 5. **Output Contract**: Section markers or JSON schema spelled out verbatim

use crate::constants::pipeline::MAX_SEED_SECTION_CHARS;
use crate::types::{
    CanonicalSectionId, ImageDomain, ModificationRecord, Reference, Result, Section,
    truncate_chars,
};

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Ordered key-value pairs
    Context(Vec<(String, String)>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Fenced block
    Code { language: String, content: String },
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
    /// Custom section
    Custom(String),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add objectives section
    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Add a context item, appending to the first context section if one exists
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        for section in &mut self.sections {
            if let PromptSection::Context(ctx) = section {
                ctx.push((key.to_string(), value.to_string()));
                return self;
            }
        }
        self.sections.push(PromptSection::Context(vec![(
            key.to_string(),
            value.to_string(),
        )]));
        self
    }

    /// Add text section
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    /// Add code block
    pub fn code(mut self, language: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Code {
            language: language.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Add focus enforcement section
    pub fn focus(mut self, target: &str, restrictions: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.into_iter().map(String::from).collect(),
        });
        self
    }

    /// Add custom section
    pub fn custom(mut self, content: &str) -> Self {
        self.sections
            .push(PromptSection::Custom(content.to_string()));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(ctx) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in ctx {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Code { language, content } => {
                    prompt.push_str(&format!("```{}\n", language));
                    prompt.push_str(&content);
                    prompt.push_str("\n```\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Focus EXCLUSIVELY on: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
                PromptSection::Custom(content) => {
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

/// Output contract appended to every reasoning prompt
fn marker_contract() -> String {
    let mut contract = String::from(
        "Structure your answer in exactly these sections, each introduced by its marker \
         alone at the start of a line, followed by a colon:\n\n",
    );
    for id in CanonicalSectionId::REQUIRED {
        contract.push_str(&format!("{}:\n", id.marker()));
    }
    contract.push_str(
        "\nDo not rename, translate or decorate the markers. Do not add other sections.",
    );
    contract
}

fn image_findings(image_analyses: &[String]) -> Option<String> {
    if image_analyses.is_empty() {
        return None;
    }
    Some(
        image_analyses
            .iter()
            .enumerate()
            .map(|(i, text)| format!("Image {}: {}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// Render sections as `MARKER:\ncontent` blocks, each bounded in size
fn seed_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| {
            format!(
                "{}:\n{}",
                s.section_type.marker(),
                truncate_chars(&s.content, MAX_SEED_SECTION_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn modification_notes(modifications: &[ModificationRecord]) -> String {
    modifications
        .iter()
        .map(|m| format!("- [{}] {}", m.section_type.title(), m.added_text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Preset prompt templates for the pipeline's model calls
pub struct PromptTemplates;

impl PromptTemplates {
    fn clinical_reasoning() -> PromptBuilder {
        PromptBuilder::new()
            .role("internal medicine physician", "structured clinical case analysis")
            .objectives(vec![
                "Summarize the clinical context and the data that matter",
                "Rank diagnostic hypotheses with supporting and opposing arguments",
                "Propose complementary exams and therapeutic decisions",
                "State prognosis, follow-up, and a plain-language explanation for the patient",
            ])
    }

    /// Initial reasoning over the case text and image findings
    pub fn reasoning(case_text: &str, image_analyses: &[String]) -> String {
        let mut builder = Self::clinical_reasoning().section("Clinical case", case_text);
        if let Some(findings) = image_findings(image_analyses) {
            builder = builder.section("Image findings", &findings);
        }
        builder
            .focus(
                "this patient",
                vec![
                    "Do NOT invent findings absent from the case or image findings",
                    "Flag uncertainty explicitly",
                ],
            )
            .custom(&marker_contract())
            .build()
    }

    /// Reasoning seeded with the prior analysis and the clinician's notes
    pub fn relaunch_reasoning(
        case_text: &str,
        image_analyses: &[String],
        prior_sections: &[Section],
        modifications: &[ModificationRecord],
    ) -> String {
        let mut builder = Self::clinical_reasoning()
            .section("Clinical case", case_text)
            .section("Previous analysis", &seed_sections(prior_sections));
        if !modifications.is_empty() {
            builder = builder.section(
                "Clinician notes added since the previous analysis",
                &modification_notes(modifications),
            );
        }
        if let Some(findings) = image_findings(image_analyses) {
            builder = builder.section("Image findings", &findings);
        }
        builder
            .focus(
                "updating the previous analysis",
                vec![
                    "Integrate every clinician note; they take precedence over earlier reasoning",
                    "Keep conclusions that remain valid",
                ],
            )
            .custom(&marker_contract())
            .build()
    }

    /// Literature research for a fresh analysis
    pub fn research(case_text: &str, sections: &[Section]) -> String {
        let hypotheses = sections
            .iter()
            .find(|s| s.section_type == CanonicalSectionId::DiagnosticHypotheses)
            .map(|s| truncate_chars(&s.content, MAX_SEED_SECTION_CHARS))
            .unwrap_or_default();

        PromptBuilder::new()
            .role("clinical researcher", "evidence synthesis")
            .objectives(vec![
                "Find current guidelines and peer-reviewed studies relevant to this case",
                "Support or challenge each diagnostic hypothesis with evidence",
                "Cite every source with a bracketed number, e.g. [1]",
            ])
            .section("Clinical case", case_text)
            .section("Diagnostic hypotheses", hypotheses)
            .build()
    }

    /// Research seeded with the whole prior analysis and all clinician notes
    pub fn deep_research(
        case_text: &str,
        prior_sections: &[Section],
        modifications: &[ModificationRecord],
    ) -> String {
        let mut builder = PromptBuilder::new()
            .role("clinical researcher", "in-depth evidence review")
            .objectives(vec![
                "Re-examine the previous analysis against current literature",
                "Address each clinician note with supporting evidence",
                "Point out where the evidence contradicts the previous analysis",
                "Cite every source with a bracketed number, e.g. [1]",
            ])
            .section("Clinical case", case_text)
            .section("Previous analysis", &seed_sections(prior_sections));
        if !modifications.is_empty() {
            builder = builder.section("Clinician notes", &modification_notes(modifications));
        }
        builder.build()
    }

    /// Rare-disease screening over the finished sections
    pub fn rare_disease(case_text: &str, sections: &[Section]) -> String {
        PromptBuilder::new()
            .role("clinical geneticist", "rare and orphan diseases")
            .objectives(vec![
                "List rare diseases compatible with this presentation, if any",
                "For each, give the discriminating findings and the confirmatory test",
                "Say plainly when no rare disease is a reasonable consideration",
            ])
            .section("Clinical case", case_text)
            .section("Current analysis", &seed_sections(sections))
            .custom(&format!(
                "Start your answer with the marker {}: alone on its first line.",
                CanonicalSectionId::RareDisease.marker()
            ))
            .build()
    }

    pub fn image_analysis(domain: ImageDomain) -> String {
        PromptBuilder::new()
            .role("medical imaging reader", &format!("{} interpretation", domain.as_str()))
            .text(domain.instruction())
            .focus(
                "what is visible in the image",
                vec!["Do NOT speculate about the diagnosis beyond the image content"],
            )
            .build()
    }

    /// JSON-mode prompt asking for missing bibliographic metadata
    pub fn reference_enrichment(references: &[Reference], context: &str) -> Result<String> {
        let listing: Vec<serde_json::Value> = references
            .iter()
            .map(|r| {
                serde_json::json!({
                    "label": r.label,
                    "title": r.title,
                    "url": r.url,
                    "date": r.date,
                })
            })
            .collect();
        let listing = serde_json::to_string_pretty(&listing)?;

        Ok(PromptBuilder::new()
            .role("medical librarian", "bibliographic metadata")
            .objectives(vec![
                "Identify the authors, journal and publication year of each reference",
                "Leave a field out when you are not certain of it",
            ])
            .context_item("Case topic", context)
            .code("json", &listing)
            .custom(
                "Respond with a JSON object of the form \
                 {\"references\": [{\"label\": \"1\", \"authors\": [\"Doe J\"], \
                 \"journal\": \"...\", \"year\": 2020}]}. Use the labels given above.",
            )
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_prompt() {
        let prompt = PromptBuilder::new()
            .role("cardiologist", "heart failure")
            .objectives(vec!["Assess", "Plan"])
            .build();

        assert!(prompt.contains("<ROLE>"));
        assert!(prompt.contains("cardiologist"));
        assert!(prompt.contains("1. Assess"));
        assert!(prompt.contains("2. Plan"));
    }

    #[test]
    fn test_context_items_keep_order() {
        let prompt = PromptBuilder::new()
            .context_item("Age", "54")
            .context_item("Sex", "F")
            .build();

        let age = prompt.find("**Age**: 54").unwrap();
        let sex = prompt.find("**Sex**: F").unwrap();
        assert!(age < sex);
    }

    #[test]
    fn test_reasoning_lists_every_marker() {
        let prompt = PromptTemplates::reasoning("Chest pain", &["Sinus rhythm".to_string()]);
        for id in CanonicalSectionId::REQUIRED {
            assert!(prompt.contains(&format!("{}:", id.marker())));
        }
        assert!(prompt.contains("Image 1: Sinus rhythm"));
        assert!(!prompt.contains("RARE_DISEASE"));
    }

    #[test]
    fn test_relaunch_includes_notes_and_truncates_seed() {
        let long = "x".repeat(MAX_SEED_SECTION_CHARS + 500);
        let sections = vec![Section::new(CanonicalSectionId::KeyData, long)];
        let notes = vec![ModificationRecord::new(
            CanonicalSectionId::KeyData,
            "Troponin normal",
            1,
        )];
        let prompt = PromptTemplates::relaunch_reasoning("Case", &[], &sections, &notes);

        assert!(prompt.contains("Troponin normal"));
        assert!(!prompt.contains(&"x".repeat(MAX_SEED_SECTION_CHARS + 1)));
    }

    #[test]
    fn test_enrichment_prompt_lists_labels() {
        let refs = vec![Reference {
            label: "1".to_string(),
            title: "Study".to_string(),
            url: "https://example.org".to_string(),
            date: None,
            year: None,
            authors: vec![],
            journal: None,
            enriched: false,
        }];
        let prompt = PromptTemplates::reference_enrichment(&refs, "sepsis").unwrap();
        assert!(prompt.contains("\"label\": \"1\""));
        assert!(prompt.contains("```json"));
    }
}
