use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::anyhow;
use serde::Serialize;
use sha2::{Digest, Sha256};

use spawnwatch_contracts::corrections::{CorrectionRegistry, PendingCorrection};
use spawnwatch_contracts::events::EventWriter;
use spawnwatch_contracts::inbound::InboundEvent;
use spawnwatch_contracts::interaction::InteractionKind;
use spawnwatch_contracts::notification::{NotificationCard, SpawnCardSpec};
use spawnwatch_contracts::spawn::{ChatMessage, ImageSource, Scope, SpawnEvent};
use spawnwatch_contracts::species::SpeciesIndex;
use spawnwatch_contracts::subscriptions::SubscriptionStore;
use spawnwatch_contracts::{CorrelationId, ScopeId};

use crate::color::TypeColorResolver;
use crate::config::EngineConfig;
use crate::fanout::fan_out;
use crate::fetch::{acquire_image, HttpImageFetcher, ImageFetcher};
use crate::gateway::ChatGateway;
use crate::identify::SpeciesIdentifier;
use crate::isolate::{BackgroundIsolator, ForegroundSegmenter, RembgSegmenter};
use crate::pokeapi::{PokeApiClient, SpeciesLookup};
use crate::vision::{GeminiClassifier, VisionClassifier};

/// Pipeline stages in the order a spawn passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detected,
    ImageAcquired,
    Isolated,
    Identified,
    ColorResolved,
    FannedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
    NoImage,
    FetchFailed,
    NotIdentified,
    StateUnavailable,
}

/// What happened to one detected spawn. `stage` is the last stage completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    pub scope: ScopeId,
    pub stage: Stage,
    pub halt: Option<Halt>,
    pub species: Option<String>,
    pub color: Option<u32>,
    pub image_sha256: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub delivered: usize,
    pub failed: usize,
}

impl PipelineRun {
    fn detected(scope: ScopeId) -> Self {
        Self {
            scope,
            stage: Stage::Detected,
            halt: None,
            species: None,
            color: None,
            image_sha256: None,
            correlation_id: None,
            delivered: 0,
            failed: 0,
        }
    }

    fn halted(mut self, halt: Halt) -> Self {
        tracing::info!(scope = %self.scope, stage = ?self.stage, halt = ?halt, "spawn pipeline halted");
        self.halt = Some(halt);
        self
    }

    pub fn completed(&self) -> bool {
        self.stage == Stage::FannedOut
    }
}

/// Outbound dependencies of the pipeline.
pub struct PipelineParts {
    pub fetcher: Arc<dyn ImageFetcher>,
    pub segmenter: Option<Arc<dyn ForegroundSegmenter>>,
    pub classifier: Arc<dyn VisionClassifier>,
    pub lookup: Arc<dyn SpeciesLookup>,
    pub gateway: Arc<dyn ChatGateway>,
}

impl PipelineParts {
    /// HTTP-backed parts configured from `config`.
    pub fn from_config(config: &EngineConfig, gateway: Arc<dyn ChatGateway>) -> Self {
        let segmenter = config.segmenter_url.as_deref().map(|url| {
            Arc::new(RembgSegmenter::new(url, config.segmenter_timeout)) as Arc<dyn ForegroundSegmenter>
        });
        Self {
            fetcher: Arc::new(HttpImageFetcher::new(config.fetch_timeout)),
            segmenter,
            classifier: Arc::new(GeminiClassifier::new(&config.vision)),
            lookup: Arc::new(PokeApiClient::new(
                config.pokeapi_base.clone(),
                config.lookup_timeout,
            )),
            gateway,
        }
    }
}

/// Event handler for the watcher: spawn messages, correction interactions
/// and subscription commands, processed one at a time in arrival order.
pub struct SpawnPipeline {
    pub(crate) upstream_bot_id: u64,
    pub(crate) fetcher: Arc<dyn ImageFetcher>,
    pub(crate) isolator: BackgroundIsolator,
    pub(crate) identifier: SpeciesIdentifier,
    pub(crate) colors: TypeColorResolver,
    pub(crate) gateway: Arc<dyn ChatGateway>,
    pub(crate) store: Arc<Mutex<SubscriptionStore>>,
    pub(crate) corrections: Arc<Mutex<CorrectionRegistry>>,
    pub(crate) journal: Option<EventWriter>,
    pub(crate) scope_names: BTreeMap<ScopeId, String>,
}

impl SpawnPipeline {
    pub fn new(
        config: &EngineConfig,
        parts: PipelineParts,
        store: Arc<Mutex<SubscriptionStore>>,
        corrections: Arc<Mutex<CorrectionRegistry>>,
    ) -> Self {
        Self {
            upstream_bot_id: config.upstream_bot_id,
            fetcher: parts.fetcher,
            isolator: BackgroundIsolator::new(parts.segmenter),
            identifier: SpeciesIdentifier::new(parts.classifier, &config.vision),
            colors: TypeColorResolver::new(parts.lookup, config.color_cache_capacity),
            gateway: parts.gateway,
            store,
            corrections,
            journal: None,
            scope_names: BTreeMap::new(),
        }
    }

    pub fn with_journal(mut self, journal: EventWriter) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn set_species_index(&mut self, index: SpeciesIndex) {
        tracing::info!(species = index.len(), "species reference list loaded");
        self.identifier.set_index(index);
    }

    pub fn remember_scope(&mut self, scope: &Scope) {
        self.scope_names.insert(scope.id, scope.name.clone());
    }

    pub fn scope_name(&self, scope: ScopeId) -> Option<&str> {
        self.scope_names.get(&scope).map(String::as_str)
    }

    /// Routes one inbound event. Failures are logged, never returned.
    pub fn dispatch(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => {
                self.handle_message(&message);
            }
            InboundEvent::Interaction(interaction) => {
                self.handle_interaction(&interaction);
            }
            InboundEvent::Command(command) => {
                self.handle_command(&command);
            }
        }
    }

    /// Runs the pipeline for a spawn announcement from the upstream bot.
    /// Returns `None` for every other message.
    pub fn handle_message(&mut self, message: &ChatMessage) -> Option<PipelineRun> {
        let scope = message.scope.as_ref()?;
        self.remember_scope(scope);
        if message.author_id != self.upstream_bot_id || !message.announces_spawn() {
            return None;
        }
        let link = message.message_link()?;
        tracing::info!(scope = %scope.id, message_id = message.message_id, "spawn detected");

        let run = match message.spawn_image_url() {
            Some(url) => self.run_spawn(&SpawnEvent {
                scope: scope.id,
                scope_name: scope.name.clone(),
                message_link: link,
                image: ImageSource::Url(url.to_string()),
            }),
            None => PipelineRun::detected(scope.id).halted(Halt::NoImage),
        };
        self.journal_run(&run);
        Some(run)
    }

    /// Acquire, isolate, identify, color and fan out one spawn.
    pub fn run_spawn(&mut self, spawn: &SpawnEvent) -> PipelineRun {
        let mut run = PipelineRun::detected(spawn.scope);

        let raw = match acquire_image(self.fetcher.as_ref(), &spawn.image) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(scope = %spawn.scope, failure = err.failure_kind(), "spawn image fetch failed: {err}");
                return run.halted(Halt::FetchFailed);
            }
        };
        run.image_sha256 = Some(image_digest(&raw));
        run.stage = Stage::ImageAcquired;

        let isolated = self.isolator.isolate(&raw);
        run.stage = Stage::Isolated;

        let Some(species) = self.identifier.identify(&isolated, None) else {
            return run.halted(Halt::NotIdentified);
        };
        tracing::info!(scope = %spawn.scope, species = %species, "spawn identified");
        run.species = Some(species.clone());
        run.stage = Stage::Identified;

        let color = self.colors.resolve(&species);
        run.color = Some(color);
        run.stage = Stage::ColorResolved;

        let recipients = match lock(&self.store, "subscription store") {
            Ok(store) => store.subscribers_for(spawn.scope),
            Err(err) => {
                tracing::error!("{err}");
                return run.halted(Halt::StateUnavailable);
            }
        };
        if recipients.is_empty() {
            tracing::debug!(scope = %spawn.scope, "no subscribers for scope");
            run.stage = Stage::FannedOut;
            return run;
        }

        let correction = PendingCorrection {
            image: spawn.image.clone(),
            image_bytes: Arc::new(raw),
            scope_name: spawn.scope_name.clone(),
            message_link: spawn.message_link.clone(),
            created_at: Instant::now(),
        };
        let correlation_id = match lock(&self.corrections, "correction registry") {
            Ok(mut corrections) => corrections.register(correction),
            Err(err) => {
                tracing::error!("{err}");
                return run.halted(Halt::StateUnavailable);
            }
        };
        run.correlation_id = Some(correlation_id);

        let card = NotificationCard::spawn(&SpawnCardSpec {
            species: &species,
            scope_name: &spawn.scope_name,
            color,
            message_link: &spawn.message_link,
            thumbnail_url: spawn.image.url(),
            upstream_bot_id: self.upstream_bot_id,
        });
        let control = InteractionKind::WrongSpecies { correlation_id };
        let report = fan_out(self.gateway.as_ref(), &recipients, &card, &control);
        run.delivered = report.delivered.len();
        run.failed = report.failed.len();
        run.stage = Stage::FannedOut;
        tracing::info!(
            scope = %spawn.scope,
            species = %species,
            delivered = run.delivered,
            failed = run.failed,
            "spawn notifications sent"
        );
        run
    }

    fn journal_run(&self, run: &PipelineRun) {
        self.journal_event("spawn_pipeline", run);
    }

    pub(crate) fn journal_event<T: Serialize>(&self, event_type: &str, payload: &T) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.emit_serialized(event_type, payload) {
            tracing::warn!(event_type, "failed to journal event: {err:#}");
        }
    }
}

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> anyhow::Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| anyhow!("{what} lock poisoned"))
}

pub fn image_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
