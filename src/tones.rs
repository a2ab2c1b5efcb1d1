use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Voice {
    #[serde(default)]
    pub voice_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub accent: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: String,
}

impl Voice {
    fn age_gender(&self) -> Option<String> {
        let age = self.age.trim();
        let gender = self.gender.trim();
        if age.is_empty() || gender.is_empty() {
            return None;
        }
        Some(format!("{age} {gender}"))
    }
}

/// Tone name to voice groups, as served by `GET /api/get_tones_data`.
///
/// Each tone maps to one voice list per use case; the groups only matter for
/// collecting which age/gender combinations a tone can be voiced with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ToneCatalog {
    tones: BTreeMap<String, Vec<Vec<Voice>>>,
}

impl ToneCatalog {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }

    pub fn tone_names(&self) -> impl Iterator<Item = &str> {
        self.tones.keys().map(String::as_str)
    }

    pub fn age_gender_options(&self, tone: &str) -> Vec<String> {
        let Some(groups) = self.tones.get(tone) else {
            return Vec::new();
        };
        groups
            .iter()
            .flatten()
            .filter_map(Voice::age_gender)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// The two dependent selection controls: tone first, then an age/gender
/// combination the tone offers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToneSelection {
    pub tone: String,
    pub age_gender: String,
}

impl ToneSelection {
    pub fn select_tone(&mut self, catalog: &ToneCatalog, tone: &str) {
        if self.tone == tone {
            return;
        }
        self.tone = tone.to_string();
        let options = catalog.age_gender_options(tone);
        if !options.contains(&self.age_gender) {
            self.age_gender = options.into_iter().next().unwrap_or_default();
        }
    }

    pub fn select_age_gender(&mut self, catalog: &ToneCatalog, age_gender: &str) -> bool {
        let allowed = catalog.is_empty()
            || catalog
                .age_gender_options(&self.tone)
                .iter()
                .any(|option| option == age_gender);
        if allowed {
            self.age_gender = age_gender.to_string();
        }
        allowed
    }
}
