use indexmap::IndexSet;

pub const MIN_SPECIES_NAME_CHARS: usize = 3;

/// Normalizes a raw model answer: first line only, trimmed, lowercased,
/// with wrapping quotes, backticks, asterisks and trailing periods removed.
pub fn normalize_answer(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`' | '*' | '.'))
        .trim()
        .to_lowercase()
}

/// A species name is plausible when it has at least three characters and no
/// digits.
pub fn is_valid_species_name(name: &str) -> bool {
    name.chars().count() >= MIN_SPECIES_NAME_CHARS && !name.chars().any(|ch| ch.is_ascii_digit())
}

/// How a candidate name was resolved against the reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Exact(String),
    Fuzzy(String),
    Unresolved(String),
}

impl Resolution {
    pub fn name(&self) -> &str {
        match self {
            Self::Exact(name) | Self::Fuzzy(name) | Self::Unresolved(name) => name,
        }
    }

    pub fn into_name(self) -> String {
        match self {
            Self::Exact(name) | Self::Fuzzy(name) | Self::Unresolved(name) => name,
        }
    }
}

/// Known species names in reference order.
///
/// Exact lookups hit the hash index; the substring scan only runs when the
/// exact lookup misses.
#[derive(Debug, Clone, Default)]
pub struct SpeciesIndex {
    names: IndexSet<String>,
}

impl SpeciesIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Exact match wins; otherwise the first entry (in reference order) that
    /// is a substring of the candidate or contains it; otherwise the
    /// candidate itself.
    pub fn resolve(&self, candidate: &str) -> Resolution {
        let candidate = candidate.trim().to_lowercase();
        if self.names.contains(candidate.as_str()) {
            return Resolution::Exact(candidate);
        }
        self.names
            .iter()
            .find(|known| candidate.contains(known.as_str()) || known.contains(candidate.as_str()))
            .map(|known| Resolution::Fuzzy(known.clone()))
            .unwrap_or(Resolution::Unresolved(candidate))
    }
}
