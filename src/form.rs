use thiserror::Error;

use crate::preview::SourceFile;
use crate::tones::ToneSelection;

pub const IMAGES_FIELD: &str = "images";

/// Platforms offered in the selector, with the width:height the backend renders for them.
pub const PLATFORMS: &[(&str, &str, u32, u32)] = &[
    ("youtube", "YouTube", 16, 9),
    ("facebook", "Facebook", 16, 9),
    ("instagram", "Instagram", 9, 16),
    ("tiktok", "TikTok", 9, 16),
    ("twitter", "Twitter", 16, 9),
    ("television", "Television", 16, 9),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Please select at least one image.")]
    NoImages,
    #[error("You can only submit up to {capacity} images (got {count}).")]
    TooManyImages { count: usize, capacity: usize },
    #[error("Images are still loading; try again in a moment.")]
    ImagesLoading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub company_name: String,
    pub emphasis: String,
    pub avoid: String,
    pub press_release: String,
    pub mood: String,
    pub platform: String,
    pub voice: ToneSelection,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            company_name: String::new(),
            emphasis: String::new(),
            avoid: String::new(),
            press_release: String::new(),
            mood: String::new(),
            platform: PLATFORMS[0].0.to_string(),
            voice: ToneSelection::default(),
        }
    }
}

impl FormFields {
    /// Every non-file field, named as the backend's form names them. Empty
    /// text fields are left out; the platform is always sent.
    pub fn entries(&self) -> Vec<(String, String)> {
        let candidates = [
            ("company-name", &self.company_name),
            ("emphasis", &self.emphasis),
            ("avoid", &self.avoid),
            ("press-release", &self.press_release),
            ("mood", &self.mood),
            ("tone", &self.voice.tone),
            ("age-gender", &self.voice.age_gender),
        ];

        let mut entries = vec![("platform".to_string(), self.platform.trim().to_string())];
        entries.extend(
            candidates
                .into_iter()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(name, value)| (name.to_string(), value.trim().to_string())),
        );
        entries
    }
}

/// What gets posted to the job-submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub fields: Vec<(String, String)>,
    pub images: Vec<SourceFile>,
}

impl SubmissionPayload {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub fn prepare_submission(
    fields: &FormFields,
    images: Vec<SourceFile>,
    capacity: usize,
    images_loading: bool,
) -> Result<SubmissionPayload, SubmitError> {
    if images.is_empty() {
        if images_loading {
            return Err(SubmitError::ImagesLoading);
        }
        return Err(SubmitError::NoImages);
    }
    if images.len() > capacity {
        return Err(SubmitError::TooManyImages {
            count: images.len(),
            capacity,
        });
    }
    if images_loading {
        return Err(SubmitError::ImagesLoading);
    }

    Ok(SubmissionPayload {
        fields: fields.entries(),
        images,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn file(name: &str) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            mime: "image/jpeg".to_string(),
            bytes: Arc::from(name.as_bytes()),
        }
    }

    #[test]
    fn entries_skip_empty_text_but_keep_platform() {
        let fields = FormFields {
            company_name: " Sunfire ".to_string(),
            mood: "upbeat".to_string(),
            platform: "instagram".to_string(),
            ..FormFields::default()
        };
        assert_eq!(
            fields.entries(),
            vec![
                ("platform".to_string(), "instagram".to_string()),
                ("company-name".to_string(), "Sunfire".to_string()),
                ("mood".to_string(), "upbeat".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        let fields = FormFields::default();
        assert_eq!(
            prepare_submission(&fields, Vec::new(), 6, false),
            Err(SubmitError::NoImages)
        );
        let seven = (0..7).map(|i| file(&format!("{i}.jpg"))).collect();
        assert_eq!(
            prepare_submission(&fields, seven, 6, false),
            Err(SubmitError::TooManyImages {
                count: 7,
                capacity: 6
            })
        );
        assert_eq!(
            prepare_submission(&fields, vec![file("a.jpg")], 6, true),
            Err(SubmitError::ImagesLoading)
        );
    }

    #[test]
    fn payload_keeps_image_order() {
        let fields = FormFields::default();
        let payload = prepare_submission(
            &fields,
            vec![file("c.jpg"), file("a.jpg"), file("b.jpg")],
            6,
            false,
        )
        .expect("payload should build");
        let names = payload
            .images
            .iter()
            .map(|image| image.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["c.jpg", "a.jpg", "b.jpg"]);
        assert_eq!(payload.field("platform"), Some("youtube"));
    }
}
