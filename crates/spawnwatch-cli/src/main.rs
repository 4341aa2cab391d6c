mod outbox;

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use spawnwatch_contracts::corrections::CorrectionRegistry;
use spawnwatch_contracts::events::EventWriter;
use spawnwatch_contracts::inbound::{parse_inbound_line, InboundEvent};
use spawnwatch_contracts::subscriptions::SubscriptionStore;
use spawnwatch_contracts::{ScopeId, SubscriberId};
use spawnwatch_engine::background::{spawn_persistence_loop, spawn_presence_loop};
use spawnwatch_engine::color::TypeColorResolver;
use spawnwatch_engine::identify::SpeciesIdentifier;
use spawnwatch_engine::isolate::{BackgroundIsolator, ForegroundSegmenter, RembgSegmenter};
use spawnwatch_engine::pokeapi::PokeApiClient;
use spawnwatch_engine::vision::GeminiClassifier;
use spawnwatch_engine::{EngineConfig, PipelineParts, SpawnPipeline};

use crate::outbox::OutboxGateway;

#[derive(Debug, Parser)]
#[command(name = "spawnwatch", version, about = "Spawn watcher and notifier")]
struct Cli {
    /// Log filter; falls back to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run(RunArgs),
    Identify(IdentifyArgs),
    Isolate(IsolateArgs),
    Subs(SubsArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// JSONL inbound events; stdin when omitted.
    #[arg(long)]
    inbound: Option<PathBuf>,
    #[arg(long, default_value = "spawnwatch-data")]
    data_dir: PathBuf,
    #[arg(long)]
    subscriptions: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    outbox: Option<PathBuf>,
    #[arg(long)]
    upstream_bot_id: Option<u64>,
    /// Skip downloading the species reference list.
    #[arg(long)]
    offline_species: bool,
}

#[derive(Debug, Parser)]
struct IdentifyArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    previous: Option<String>,
    #[arg(long)]
    no_isolate: bool,
}

#[derive(Debug, Parser)]
struct IsolateArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct SubsArgs {
    #[arg(long, default_value = "spawnwatch-data/subscriptions.json")]
    file: PathBuf,
    #[command(subcommand)]
    action: SubsAction,
}

#[derive(Debug, Subcommand)]
enum SubsAction {
    Sub {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        scope: u64,
    },
    Unsub {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        scope: u64,
    },
    Status {
        #[arg(long)]
        user: u64,
    },
    UnsubAll {
        #[arg(long)]
        user: u64,
    },
    Stats,
}

impl SubsAction {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Sub { .. } | Self::Unsub { .. } | Self::UnsubAll { .. }
        )
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spawnwatch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_file.as_deref())?;
    match cli.command {
        Command::Run(args) => run_watch(args),
        Command::Identify(args) => run_identify(args),
        Command::Isolate(args) => run_isolate(args),
        Command::Subs(args) => run_subs(args),
    }
}

fn init_tracing(level: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    if let Some(log_file) = log_file {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("failed to open log file {}", log_file.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
    Ok(())
}

fn run_watch(args: RunArgs) -> Result<i32> {
    let mut config = EngineConfig::from_env();
    if let Some(id) = args.upstream_bot_id {
        config.upstream_bot_id = id;
    }
    if config.vision.api_key.is_none() {
        bail!("GEMINI_API_KEY or GOOGLE_API_KEY must be set");
    }

    fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create {}", args.data_dir.display()))?;
    let subscriptions_path = args
        .subscriptions
        .unwrap_or_else(|| args.data_dir.join("subscriptions.json"));
    let events_path = args
        .events
        .unwrap_or_else(|| args.data_dir.join("events.jsonl"));
    let outbox_path = args
        .outbox
        .unwrap_or_else(|| args.data_dir.join("outbox.jsonl"));

    let inbound: Box<dyn BufRead> = match &args.inbound {
        Some(path) => Box::new(BufReader::new(
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let gateway = Arc::new(OutboxGateway::new(EventWriter::new(
        &outbox_path,
        session_id.clone(),
    )));
    let store = Arc::new(Mutex::new(SubscriptionStore::load(&subscriptions_path)));
    let corrections = Arc::new(Mutex::new(CorrectionRegistry::new(
        config.correction_capacity,
        config.correction_ttl,
    )));
    let parts = PipelineParts::from_config(&config, gateway.clone());
    let mut pipeline = SpawnPipeline::new(&config, parts, store.clone(), corrections.clone())
        .with_journal(EventWriter::new(&events_path, session_id.clone()));

    if !args.offline_species {
        let client = PokeApiClient::new(config.pokeapi_base.clone(), config.lookup_timeout);
        match client.species_index() {
            Ok(index) => pipeline.set_species_index(index),
            Err(err) => tracing::warn!(
                failure = err.failure_kind(),
                "species reference list unavailable, answers are accepted unchecked: {err}"
            ),
        }
    }

    tracing::info!(
        session_id = %session_id,
        subscriptions = %subscriptions_path.display(),
        outbox = %outbox_path.display(),
        "watcher started"
    );
    let persistence = spawn_persistence_loop(store.clone(), corrections, &config.loops)?;
    let presence = spawn_presence_loop(gateway.clone(), &config.loops)?;

    let pumped = pump_events(inbound, &mut pipeline, &gateway);

    for handle in [presence, persistence] {
        let name = handle.name();
        if let Err(err) = handle.stop() {
            tracing::error!(thread = name, "{err:#}");
        }
    }
    store
        .lock()
        .map_err(|_| anyhow!("subscription store lock poisoned"))?
        .save()
        .context("final subscription save failed")?;

    let handled = pumped?;
    tracing::info!(events = handled, "watcher stopped");
    Ok(0)
}

/// Feeds inbound JSONL to the pipeline in arrival order. Malformed lines are
/// logged and skipped. Returns the number of events dispatched.
fn pump_events(
    reader: impl BufRead,
    pipeline: &mut SpawnPipeline,
    gateway: &OutboxGateway,
) -> Result<usize> {
    let mut handled = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read inbound events")?;
        let event = match parse_inbound_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(line = index + 1, "skipping inbound line: {err:#}");
                continue;
            }
        };
        if let Some(scope) = event_scope(&event) {
            gateway.observe_scope(scope);
        }
        tracing::debug!(kind = event.kind(), "inbound event");
        pipeline.dispatch(event);
        handled += 1;
    }
    Ok(handled)
}

fn event_scope(event: &InboundEvent) -> Option<ScopeId> {
    match event {
        InboundEvent::Message(message) => message.scope.as_ref().map(|scope| scope.id),
        InboundEvent::Command(command) => command.scope.as_ref().map(|scope| scope.id),
        InboundEvent::Interaction(_) => None,
    }
}

fn run_identify(args: IdentifyArgs) -> Result<i32> {
    let config = EngineConfig::from_env();
    if config.vision.api_key.is_none() {
        bail!("GEMINI_API_KEY or GOOGLE_API_KEY must be set");
    }
    let raw = fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let image = if args.no_isolate {
        raw
    } else {
        isolator_from_config(&config).isolate(&raw)
    };

    let identifier = SpeciesIdentifier::new(
        Arc::new(GeminiClassifier::new(&config.vision)),
        &config.vision,
    );
    let Some(species) = identifier.identify(&image, args.previous.as_deref()) else {
        println!("No identification.");
        return Ok(2);
    };
    let lookup = Arc::new(PokeApiClient::new(
        config.pokeapi_base.clone(),
        config.lookup_timeout,
    ));
    let color = TypeColorResolver::new(lookup, 1).resolve(&species);
    println!("{species} #{color:06X}");
    Ok(0)
}

fn run_isolate(args: IsolateArgs) -> Result<i32> {
    let config = EngineConfig::from_env();
    let raw = fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let isolated = isolator_from_config(&config).isolate(&raw);
    fs::write(&args.out, &isolated)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    if isolated == raw {
        println!("No background removed; copied to {}", args.out.display());
    } else {
        println!("Wrote {}", args.out.display());
    }
    Ok(0)
}

fn isolator_from_config(config: &EngineConfig) -> BackgroundIsolator {
    let segmenter = config.segmenter_url.as_deref().map(|url| {
        Arc::new(RembgSegmenter::new(url, config.segmenter_timeout)) as Arc<dyn ForegroundSegmenter>
    });
    BackgroundIsolator::new(segmenter)
}

fn run_subs(args: SubsArgs) -> Result<i32> {
    let mut store = SubscriptionStore::load(&args.file);
    let reply = apply_subs_action(&mut store, &args.action);
    if args.action.is_mutating() {
        store.save()?;
    }
    println!("{reply}");
    Ok(0)
}

fn apply_subs_action(store: &mut SubscriptionStore, action: &SubsAction) -> String {
    match *action {
        SubsAction::Sub { user, scope } => {
            if store.subscribe(SubscriberId(user), ScopeId(scope)) {
                format!("Subscribed {user} to {scope}.")
            } else {
                format!("{user} is already subscribed to {scope}.")
            }
        }
        SubsAction::Unsub { user, scope } => {
            if store.unsubscribe(SubscriberId(user), ScopeId(scope)) {
                format!("Unsubscribed {user} from {scope}.")
            } else {
                format!("{user} was not subscribed to {scope}.")
            }
        }
        SubsAction::Status { user } => match store.scopes_for(SubscriberId(user)) {
            Some(scopes) if !scopes.is_empty() => scopes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => format!("{user} has no subscriptions."),
        },
        SubsAction::UnsubAll { user } => match store.unsubscribe_all(SubscriberId(user)) {
            Some(count) => format!("Removed {count} subscriptions for {user}."),
            None => format!("{user} has no subscriptions."),
        },
        SubsAction::Stats => {
            let stats = store.stats();
            format!(
                "subscribers={} scopes={} subscriptions={}",
                stats.subscribers, stats.scopes, stats.subscriptions
            )
        }
    }
}
