//! Command dispatch - wires the core together and runs one subcommand
//!
//! Everything is constructed once here and handed down; the core has no
//! global state.

use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use sentra_core::command::CommandBuilder;
use sentra_core::config::SentraConfig;
use sentra_core::exec::{ExecutionCoordinator, ProcessRunner, RunEvent};
use sentra_core::intent::{Intent, IntentType};
use sentra_core::parsers::ParserRegistry;
use sentra_core::policy::{PolicyDecision, PolicyGate};
use sentra_core::registry::ToolRegistry;
use sentra_core::store::{EntityStore, EntityType};

use crate::args::{parse_params, Args, Command};

pub async fn dispatch(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SentraConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SentraConfig::load_default(),
    };
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }

    let store = EntityStore::open(&config.database.path)
        .with_context(|| format!("failed to open store at {}", config.database.path.display()))?;
    let store = Arc::new(Mutex::new(store));

    match args.command {
        Command::Run {
            intent,
            target,
            param,
            intent_file,
            stage,
            no_policy,
            dry_run,
        } => {
            let intent = match intent_file {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str::<Intent>(&content)
                        .context("intent file is not a valid intent structure")?
                }
                None => {
                    let Some(name) = intent else {
                        bail!("either --intent or --intent-file is required");
                    };
                    let intent_type = IntentType::from_str(&name)
                        .map_err(|e| anyhow::anyhow!(e))?;
                    Intent {
                        intent_type,
                        target,
                        params: parse_params(&param)?,
                        needs_clarification: false,
                        clarification_reason: None,
                    }
                }
            };

            run_intent(intent, stage, no_policy, dry_run, &config, store).await
        }

        Command::Entities { entity_type } => {
            let store = lock(&store)?;
            let types: Vec<EntityType> = match entity_type {
                Some(name) => vec![EntityType::from_str(&name).map_err(|e| anyhow::anyhow!(e))?],
                None => vec![
                    EntityType::Host,
                    EntityType::Port,
                    EntityType::Service,
                    EntityType::Vulnerability,
                    EntityType::WebResource,
                    EntityType::Dns,
                    EntityType::Certificate,
                    EntityType::Credential,
                    EntityType::File,
                ],
            };
            for entity_type in types {
                for entity in store.entities_by_type(entity_type)? {
                    println!(
                        "{:<14} {}  (confidence {:.2})",
                        entity.entity_type().to_string(),
                        entity.id,
                        entity.confidence
                    );
                }
            }
            Ok(())
        }

        Command::History { tool } => {
            let store = lock(&store)?;
            for record in store.executions(tool.as_deref())? {
                println!(
                    "{}  {:<18} {:<8} {:<13} entities={} {}",
                    record.started_at.format("%Y-%m-%d %H:%M:%S"),
                    record.tool_id,
                    record.status.to_string(),
                    record.parse_status.to_string(),
                    record.entities_created,
                    record.error_message.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }

        Command::Stats => {
            let store = lock(&store)?;
            let stats = store.stats()?;
            for (entity_type, count) in &stats.entities {
                println!("{:<14} {}", entity_type.to_string(), count);
            }
            println!("executions     {}", stats.total_executions);
            Ok(())
        }

        Command::Prune { ttl_secs } => {
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(config.database.entity_ttl_secs));
            let deleted = lock(&store)?.prune_stale(ttl)?;
            println!("pruned {} stale entities", deleted);
            Ok(())
        }

        Command::Checkpoint { path } => {
            lock(&store)?.checkpoint(&path)?;
            println!("checkpoint written to {}", path.display());
            Ok(())
        }

        Command::Restore { path } => {
            lock(&store)?.restore(&path)?;
            println!("state restored from {}", path.display());
            Ok(())
        }
    }
}

async fn run_intent(
    intent: Intent,
    stage: Option<i64>,
    no_policy: bool,
    dry_run: bool,
    config: &SentraConfig,
    store: Arc<Mutex<EntityStore>>,
) -> Result<()> {
    if intent.needs_clarification {
        bail!(
            "intent needs clarification: {}",
            intent
                .clarification_reason
                .as_deref()
                .unwrap_or("no reason given")
        );
    }

    let tools = ToolRegistry::new();
    let gate = PolicyGate::new(config.policy.enabled && !no_policy)?;
    let builder = CommandBuilder::new();

    match gate.check(intent.intent_type, &tools) {
        PolicyDecision::Deny(message) => bail!("blocked by policy: {}", message),
        PolicyDecision::Warn(message) => eprintln!("warning: {}", message),
        PolicyDecision::Allow => {}
    }

    let Some(spec) = tools.build_tool_spec(
        intent.intent_type,
        intent.target.as_deref(),
        &intent.params,
    ) else {
        println!(
            "{} is informational; no command to run",
            intent.intent_type
        );
        return Ok(());
    };

    let explanation = tools
        .get(intent.intent_type)
        .map(|def| def.description.to_string())
        .unwrap_or_default();
    let command = builder
        .build(&spec, &explanation)
        .map_err(|reason| anyhow::anyhow!("command rejected: {}", reason))?;

    println!("$ {}", command.command_line());
    if command.requires_root {
        eprintln!("note: this tool requires root privileges");
    }
    if dry_run {
        return Ok(());
    }

    let coordinator = ExecutionCoordinator::new(
        Arc::new(ProcessRunner),
        ParserRegistry::with_defaults(),
        &tools,
        store,
        Duration::from_secs(config.execution.timeout_secs),
    )?;

    let mut handle = coordinator.start(intent.intent_type, command, stage)?;

    while let Some(event) = handle.events.recv().await {
        match event {
            RunEvent::Started { execution_id } => {
                info!(execution_id = %execution_id, "run started");
            }
            RunEvent::Output { chunk } => {
                print!("{}", chunk);
                if !chunk.ends_with('\n') {
                    println!();
                }
            }
            RunEvent::Completed { record } => {
                println!(
                    "{}: {} ({}), {} entities",
                    record.tool_id,
                    record.status,
                    record.parse_status,
                    record.entities_created
                );
                if let Some(error) = &record.error_message {
                    eprintln!("  {}", error);
                }
            }
        }
    }

    handle.join().await?;
    Ok(())
}

fn lock(store: &Arc<Mutex<EntityStore>>) -> Result<std::sync::MutexGuard<'_, EntityStore>> {
    store
        .lock()
        .map_err(|_| anyhow::anyhow!("store lock poisoned"))
}
