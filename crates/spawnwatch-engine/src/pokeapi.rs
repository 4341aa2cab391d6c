use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use serde_json::Value;

use spawnwatch_contracts::species::SpeciesIndex;

use crate::error::{PipelineError, PipelineResult};
use crate::http::{client_with_timeout, response_json_or_error};

pub const POKEAPI_SERVICE: &str = "pokeapi";
pub const SPECIES_LIST_LIMIT: u32 = 1000;

/// Species metadata source.
pub trait SpeciesLookup: Send + Sync {
    /// Name of the species' first listed type, or `None` when the species is
    /// unknown or has no type.
    fn primary_type(&self, species: &str) -> PipelineResult<Option<String>>;
}

pub struct PokeApiClient {
    base: String,
    http: HttpClient,
}

impl PokeApiClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            http: client_with_timeout(timeout),
        }
    }

    /// Reference list of species names in PokeAPI order.
    pub fn species_names(&self, limit: u32) -> PipelineResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/pokemon", self.base))
            .query(&[("limit", limit)])
            .send()
            .map_err(|err| PipelineError::transport(POKEAPI_SERVICE, &err))?;
        let parsed = response_json_or_error(POKEAPI_SERVICE, response)?;
        parse_species_names(&parsed)
    }

    pub fn species_index(&self) -> PipelineResult<SpeciesIndex> {
        let names = self.species_names(SPECIES_LIST_LIMIT)?;
        Ok(SpeciesIndex::new(names))
    }
}

impl SpeciesLookup for PokeApiClient {
    fn primary_type(&self, species: &str) -> PipelineResult<Option<String>> {
        let response = self
            .http
            .get(format!("{}/pokemon/{}", self.base, species.trim().to_lowercase()))
            .send()
            .map_err(|err| PipelineError::transport(POKEAPI_SERVICE, &err))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed = response_json_or_error(POKEAPI_SERVICE, response)?;
        Ok(parse_primary_type(&parsed))
    }
}

pub(crate) fn parse_primary_type(payload: &Value) -> Option<String> {
    payload
        .get("types")?
        .as_array()?
        .first()?
        .get("type")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

pub(crate) fn parse_species_names(payload: &Value) -> PipelineResult<Vec<String>> {
    let results = payload
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::UnexpectedPayload {
            service: POKEAPI_SERVICE,
            message: "missing results array".to_string(),
        })?;
    Ok(results
        .iter()
        .filter_map(|entry| entry.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}
