//! In-memory doubles for the engine's outbound seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;

use spawnwatch_contracts::corrections::CorrectionRegistry;
use spawnwatch_contracts::events::EventWriter;
use spawnwatch_contracts::interaction::InteractionKind;
use spawnwatch_contracts::notification::NotificationCard;
use spawnwatch_contracts::subscriptions::SubscriptionStore;
use spawnwatch_contracts::{MessageRef, ScopeId, SubscriberId};

use crate::config::EngineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fetch::ImageFetcher;
use crate::gateway::{ChatGateway, Presence};
use crate::isolate::ForegroundSegmenter;
use crate::pipeline::{PipelineParts, SpawnPipeline};
use crate::pokeapi::SpeciesLookup;
use crate::vision::{VisionClassifier, VisionRequest};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub instruction: String,
    pub mime_type: String,
    pub timeout: Duration,
}

/// Replays canned answers in order; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<PipelineResult<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<PipelineResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::default(),
        }
    }

    pub fn answering<'a>(answers: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(answers.into_iter().map(|answer| Ok(answer.to_string())).collect())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl VisionClassifier for ScriptedClassifier {
    fn classify(&self, request: &VisionRequest<'_>, timeout: Duration) -> PipelineResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                instruction: request.instruction.to_string(),
                mime_type: request.mime_type.to_string(),
                timeout,
            });
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| {
                Err(PipelineError::UnexpectedPayload {
                    service: "scripted",
                    message: "script exhausted".to_string(),
                })
            })
    }
}

#[derive(Default)]
pub struct StaticLookup {
    types: HashMap<String, String>,
    failing: HashSet<String>,
    failing_once: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl StaticLookup {
    pub fn with_types<'a>(types: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            types: types
                .into_iter()
                .map(|(species, type_name)| (species.to_string(), type_name.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_for(mut self, species: &str) -> Self {
        self.failing.insert(species.to_string());
        self
    }

    /// The first lookup of `species` fails; later ones succeed.
    pub fn failing_once_for(self, species: &str) -> Self {
        if let Ok(mut failing_once) = self.failing_once.lock() {
            failing_once.insert(species.to_string());
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeciesLookup for StaticLookup {
    fn primary_type(&self, species: &str) -> PipelineResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed_once = self
            .failing_once
            .lock()
            .map(|mut failing_once| failing_once.remove(species))
            .unwrap_or(false);
        if failed_once || self.failing.contains(species) {
            return Err(PipelineError::TransientNetwork {
                service: "pokeapi",
                message: "connection reset".to_string(),
            });
        }
        Ok(self.types.get(species).cloned())
    }
}

#[derive(Default)]
pub struct StaticFetcher {
    images: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn serving(url: &str, bytes: Vec<u8>) -> Self {
        Self {
            images: HashMap::from([(url.to_string(), bytes)]),
            requested: Mutex::default(),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().map(|urls| urls.clone()).unwrap_or_default()
    }
}

impl ImageFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(url.to_string());
        }
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::TransientNetwork {
                service: "image_fetch",
                message: format!("status 404: {url}"),
            })
    }
}

pub struct ScriptedSegmenter {
    script: Mutex<VecDeque<PipelineResult<Vec<u8>>>>,
    calls: AtomicUsize,
}

impl ScriptedSegmenter {
    pub fn new(script: Vec<PipelineResult<Vec<u8>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ForegroundSegmenter for ScriptedSegmenter {
    fn segment(&self, _image: &[u8]) -> PipelineResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| {
                Err(PipelineError::TransientNetwork {
                    service: "segmenter",
                    message: "connection refused".to_string(),
                })
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Direct {
        recipient: SubscriberId,
        card: NotificationCard,
        custom_id: String,
    },
    Edit {
        message: MessageRef,
        card: NotificationCard,
    },
    Acknowledge(u64),
    Ephemeral {
        interaction_id: u64,
        text: String,
    },
    Presence(Presence),
}

pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failing: HashSet<SubscriberId>,
    next_message: AtomicU64,
    servers: usize,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            calls: Mutex::default(),
            failing: HashSet::new(),
            next_message: AtomicU64::new(1000),
            servers: 1,
        }
    }
}

impl RecordingGateway {
    pub fn failing_for(mut self, recipients: impl IntoIterator<Item = SubscriberId>) -> Self {
        self.failing.extend(recipients);
        self
    }

    pub fn with_servers(mut self, servers: usize) -> Self {
        self.servers = servers;
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn direct_messages(&self) -> Vec<(SubscriberId, NotificationCard, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Direct {
                    recipient,
                    card,
                    custom_id,
                } => Some((recipient, card, custom_id)),
                _ => None,
            })
            .collect()
    }

    pub fn ephemeral_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Ephemeral { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl ChatGateway for RecordingGateway {
    fn send_direct(
        &self,
        recipient: SubscriberId,
        card: &NotificationCard,
        control: &InteractionKind,
    ) -> anyhow::Result<MessageRef> {
        if self.failing.contains(&recipient) {
            bail!("cannot send messages to {recipient}");
        }
        self.record(GatewayCall::Direct {
            recipient,
            card: card.clone(),
            custom_id: control.custom_id(),
        });
        Ok(MessageRef {
            channel: recipient.0,
            message: self.next_message.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn edit_message(&self, message: MessageRef, card: &NotificationCard) -> anyhow::Result<()> {
        self.record(GatewayCall::Edit {
            message,
            card: card.clone(),
        });
        Ok(())
    }

    fn acknowledge(&self, interaction_id: u64) -> anyhow::Result<()> {
        self.record(GatewayCall::Acknowledge(interaction_id));
        Ok(())
    }

    fn reply_ephemeral(&self, interaction_id: u64, text: &str) -> anyhow::Result<()> {
        self.record(GatewayCall::Ephemeral {
            interaction_id,
            text: text.to_string(),
        });
        Ok(())
    }

    fn set_presence(&self, presence: &Presence) -> anyhow::Result<()> {
        self.record(GatewayCall::Presence(presence.clone()));
        Ok(())
    }

    fn server_count(&self) -> usize {
        self.servers
    }
}

pub const SPAWN_URL: &str = "https://cdn.test/spawn.png";
pub const SPAWN_IMAGE: &[u8] = b"spawn image bytes";

/// A pipeline wired to in-memory doubles. The classifier answers in script
/// order; the lookup knows a handful of species.
pub struct Harness {
    pub pipeline: SpawnPipeline,
    pub gateway: Arc<RecordingGateway>,
    pub classifier: Arc<ScriptedClassifier>,
    pub fetcher: Arc<StaticFetcher>,
    pub store: Arc<Mutex<SubscriptionStore>>,
    pub corrections: Arc<Mutex<CorrectionRegistry>>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new<'a>(answers: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_gateway(answers, RecordingGateway::default())
    }

    pub fn with_gateway<'a>(
        answers: impl IntoIterator<Item = &'a str>,
        gateway: RecordingGateway,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = Arc::new(gateway);
        let classifier = Arc::new(ScriptedClassifier::answering(answers));
        let fetcher = Arc::new(StaticFetcher::serving(SPAWN_URL, SPAWN_IMAGE.to_vec()));
        let lookup = Arc::new(StaticLookup::with_types([
            ("pikachu", "electric"),
            ("eevee", "normal"),
            ("flareon", "fire"),
            ("vaporeon", "water"),
        ]));
        let store = Arc::new(Mutex::new(SubscriptionStore::new(
            dir.path().join("subscriptions.json"),
        )));
        let corrections = Arc::new(Mutex::new(CorrectionRegistry::default()));
        let parts = PipelineParts {
            fetcher: fetcher.clone(),
            segmenter: None,
            classifier: classifier.clone(),
            lookup,
            gateway: gateway.clone(),
        };
        let pipeline = SpawnPipeline::new(
            &EngineConfig::default(),
            parts,
            store.clone(),
            corrections.clone(),
        );
        Self {
            pipeline,
            gateway,
            classifier,
            fetcher,
            store,
            corrections,
            dir,
        }
    }

    pub fn subscribe(&mut self, subscriber: SubscriberId, scope: ScopeId) {
        self.store
            .lock()
            .expect("store lock")
            .subscribe(subscriber, scope);
    }

    pub fn corrections_len(&self) -> usize {
        self.corrections.lock().expect("registry lock").len()
    }

    pub fn attach_journal(&mut self, journal: EventWriter) {
        self.pipeline.journal = Some(journal);
    }
}
