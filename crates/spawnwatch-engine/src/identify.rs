use std::sync::Arc;
use std::time::Duration;

use spawnwatch_contracts::species::{is_valid_species_name, normalize_answer, Resolution, SpeciesIndex};

use crate::config::VisionConfig;
use crate::error::PipelineError;
use crate::vision::{mime_for_bytes, VisionClassifier, VisionRequest};

const BASE_PROMPT: &str =
    "What Pokémon is this? Reply ONLY with the lowercase English name, nothing else.";

fn primary_prompt(previous_guess: Option<&str>) -> String {
    match previous_guess {
        Some(previous) => format!(
            "{BASE_PROMPT} A previous identification said \"{previous}\", which may be wrong."
        ),
        None => BASE_PROMPT.to_string(),
    }
}

fn retry_prompt(previous_guess: &str) -> String {
    format!("{BASE_PROMPT} This is definitely not {previous_guess}.")
}

/// Result of one identification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifyOutcome {
    Identified(String),
    /// The model kept answering with the previous guess.
    Repeated(String),
    NoAnswer,
}

impl IdentifyOutcome {
    pub fn into_species(self) -> Option<String> {
        match self {
            Self::Identified(name) => Some(name),
            Self::Repeated(_) | Self::NoAnswer => None,
        }
    }
}

pub struct SpeciesIdentifier {
    classifier: Arc<dyn VisionClassifier>,
    index: Option<SpeciesIndex>,
    primary_timeout: Duration,
    retry_timeout: Duration,
}

impl SpeciesIdentifier {
    pub fn new(classifier: Arc<dyn VisionClassifier>, config: &VisionConfig) -> Self {
        Self {
            classifier,
            index: None,
            primary_timeout: config.primary_timeout,
            retry_timeout: config.retry_timeout,
        }
    }

    pub fn with_index(mut self, index: SpeciesIndex) -> Self {
        self.set_index(index);
        self
    }

    /// Empty lists are ignored so that names pass through unresolved.
    pub fn set_index(&mut self, index: SpeciesIndex) {
        self.index = if index.is_empty() { None } else { Some(index) };
    }

    pub fn identify(&self, image: &[u8], previous_guess: Option<&str>) -> Option<String> {
        self.identify_detailed(image, previous_guess).into_species()
    }

    pub fn identify_detailed(&self, image: &[u8], previous_guess: Option<&str>) -> IdentifyOutcome {
        let previous_guess = previous_guess
            .map(normalize_answer)
            .filter(|previous| !previous.is_empty());
        let mime_type = mime_for_bytes(image);

        let prompt = primary_prompt(previous_guess.as_deref());
        let Some(first) = self.ask(&prompt, image, mime_type, self.primary_timeout) else {
            return IdentifyOutcome::NoAnswer;
        };
        let first = self.resolve(&first);

        let Some(previous) = previous_guess else {
            return IdentifyOutcome::Identified(first);
        };
        if first != previous {
            return IdentifyOutcome::Identified(first);
        }

        tracing::info!(previous = %previous, "model repeated previous guess, retrying once");
        let retry = self
            .ask(&retry_prompt(&previous), image, mime_type, self.retry_timeout)
            .map(|answer| self.resolve(&answer));
        match retry {
            Some(answer) if answer != previous => IdentifyOutcome::Identified(answer),
            Some(_) => IdentifyOutcome::Repeated(previous),
            None => IdentifyOutcome::NoAnswer,
        }
    }

    /// One model call, normalized and validated. Every failure is logged and
    /// collapses to `None`.
    fn ask(&self, prompt: &str, image: &[u8], mime_type: &str, timeout: Duration) -> Option<String> {
        let request = VisionRequest {
            instruction: prompt,
            image,
            mime_type,
        };
        let raw = match self.classifier.classify(&request, timeout) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(failure = err.failure_kind(), "identification failed: {err}");
                return None;
            }
        };
        let answer = normalize_answer(&raw);
        if !is_valid_species_name(&answer) {
            let err = PipelineError::ModelInvalidOutput { answer };
            tracing::warn!(failure = err.failure_kind(), "{err}");
            return None;
        }
        Some(answer)
    }

    fn resolve(&self, answer: &str) -> String {
        let Some(index) = &self.index else {
            return answer.to_string();
        };
        match index.resolve(answer) {
            Resolution::Exact(name) => name,
            Resolution::Fuzzy(name) => {
                tracing::debug!(answer, resolved = %name, "fuzzy species match");
                name
            }
            Resolution::Unresolved(name) => {
                tracing::debug!(answer, "species not in reference list");
                name
            }
        }
    }
}
