//! Case input records: the text and images a run analyzes.

use serde::{Deserialize, Serialize};

use super::analysis::AnalysisResult;
use super::error::{CaseError, Result};
use super::version::ModificationRecord;
use super::utils::ParseWithDefault;

/// Domain hint passed with each image to the vision endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDomain {
    Ecg,
    Biology,
    Radiology,
    Dermatology,
    #[default]
    General,
}

impl ImageDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecg => "ecg",
            Self::Biology => "biology",
            Self::Radiology => "radiology",
            Self::Dermatology => "dermatology",
            Self::General => "general",
        }
    }

    /// Instruction given to the vision model for this kind of image
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Ecg => {
                "Interpret this electrocardiogram: rhythm, rate, axis, intervals, \
                 conduction abnormalities and repolarization changes."
            }
            Self::Biology => {
                "Extract every laboratory value shown with its unit and reference range, \
                 and flag abnormal results."
            }
            Self::Radiology => {
                "Describe this imaging study: modality, anatomical region, notable findings \
                 and their likely significance."
            }
            Self::Dermatology => {
                "Describe this skin lesion: morphology, color, borders, distribution and \
                 relevant differential features."
            }
            Self::General => "Describe the clinically relevant content of this image.",
        }
    }
}

impl ParseWithDefault for ImageDomain {
    fn type_name() -> &'static str {
        "ImageDomain"
    }

    fn default_value() -> Self {
        ImageDomain::General
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ecg" | "ekg" => Some(ImageDomain::Ecg),
            "biology" | "lab" | "labs" => Some(ImageDomain::Biology),
            "radiology" | "imaging" => Some(ImageDomain::Radiology),
            "dermatology" | "skin" => Some(ImageDomain::Dermatology),
            "general" => Some(ImageDomain::General),
            _ => None,
        }
    }
}

/// One image attached to a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseImage {
    pub bytes: Vec<u8>,
    pub domain: ImageDomain,
    pub mime_type: String,
}

impl CaseImage {
    pub fn new(bytes: Vec<u8>, domain: ImageDomain) -> Self {
        let mime_type = sniff_mime_type(&bytes).to_string();
        Self {
            bytes,
            domain,
            mime_type,
        }
    }
}

/// Detect the image MIME type from magic bytes, defaulting to JPEG
fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Immutable snapshot of what a run analyzes
#[derive(Debug, Clone, Default)]
pub struct CaseInput {
    pub case_text: String,
    pub images: Vec<CaseImage>,
}

impl CaseInput {
    pub fn new(case_text: impl Into<String>) -> Self {
        Self {
            case_text: case_text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: CaseImage) -> Self {
        self.images.push(image);
        self
    }

    /// Reject empty case text before any endpoint is called
    pub fn validate(&self) -> Result<()> {
        if self.case_text.trim().is_empty() {
            return Err(CaseError::validation(
                "case_text",
                "case text must not be empty",
            ));
        }
        Ok(())
    }
}

/// Prior case state consumed by relaunch and deep runs
#[derive(Debug, Clone, Default)]
pub struct PriorState {
    pub result: AnalysisResult,
    pub modifications: Vec<ModificationRecord>,
}
