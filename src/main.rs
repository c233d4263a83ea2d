// =============================================================================
// Matrixon Matrix NextServer - Main Entry Point
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 2.0.0-alpha (Timeline Store)
// License: Apache 2.0 / MIT
//
// Description:
//   Command line entry point. Replays recorded sync responses through the
//   timeline writer and prints the stored timeline.
//
// Features:
//   • Figment configuration
//   • tracing-subscriber logging
//   • Sync replay
//
// Dependencies:
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix protocol types with ruma
//
// References:
//   • Matrix spec: https://spec.matrix.org/
//   • Client-server sync: https://spec.matrix.org/latest/client-server-api/#syncing
//
// =============================================================================

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{bail, Context};
use matrixon_timeline::{
    clap::{self, Commands},
    core::{LogFormat, RoomSyncResponse, TimelineConfig},
    db::{Database, Fragment, TimelineEventStore, TimelineFragmentStore},
    FragmentIdComparer, FragmentOrder, RoomMemberWriter, RoomRelationWriter, SyncWriter,
};
use ruma::{OwnedRoomId, RoomId};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = clap::parse();

    let config = TimelineConfig::load(args.config.as_deref())?;
    init_tracing(&config, args.log_level.as_deref())?;
    info!("🔧 matrixon-timeline {}", clap::version());

    match args.command {
        Commands::Replay { room, files } => {
            let room_id = RoomId::parse(&room).with_context(|| format!("Invalid room id {room}"))?;
            if let Err(e) = replay(&config, room_id, &files).await {
                error!("❌ Replay failed: {e:#}");
                return Err(e);
            }
        }
    }
    Ok(())
}

fn init_tracing(config: &TimelineConfig, log_level: Option<&str>) -> anyhow::Result<()> {
    let directive = log_level.unwrap_or(&config.logging.level);
    let filter_layer = match EnvFilter::try_new(directive) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("It looks like your log level is invalid. The following error occurred while parsing it: {e}");
            EnvFilter::new("warn")
        }
    };

    let registry = tracing_subscriber::Registry::default().with(filter_layer);
    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

/// Reads one response file. Accepts the joined-room section itself or a
/// whole `/sync` body, from which the room's section is picked.
async fn read_response(path: &Path, room_id: &RoomId) -> anyhow::Result<RoomSyncResponse> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let section = match value.get("rooms") {
        Some(rooms) => match rooms.get("join").and_then(|join| join.get(room_id.as_str())) {
            Some(section) => section.clone(),
            None => {
                warn!("⚠️ {} has no section for {}", path.display(), room_id);
                Value::Object(Default::default())
            }
        },
        None => value,
    };
    serde_json::from_value(section).with_context(|| format!("Malformed sync response in {}", path.display()))
}

async fn replay(config: &TimelineConfig, room_id: OwnedRoomId, files: &[PathBuf]) -> anyhow::Result<()> {
    let start = Instant::now();
    let db = Database::open_in_memory();

    let order: Arc<dyn FragmentOrder> = {
        let txn = db.transaction();
        Arc::new(FragmentIdComparer::from_fragments(&txn.fragments(&room_id)?)?)
    };
    let mut writer = SyncWriter::new(
        room_id.clone(),
        order,
        Arc::new(RoomMemberWriter::new(room_id.clone())),
        Arc::new(RoomRelationWriter::new(config.own_user_id.clone())),
    );
    writer.load(&db.transaction())?;

    for (i, path) in files.iter().enumerate() {
        let response = read_response(path, &room_id).await?;
        let is_rejoin = i == 0 && config.replay.treat_first_as_rejoin;

        let mut txn = db.transaction();
        let result = writer.write_sync(&response, is_rejoin, &mut txn).await?;
        txn.commit()?;
        writer.after_sync(result.new_live_key);

        for change in result.member_changes.values() {
            if change.has_joined() {
                info!("👤 {} joined", change.user_id());
            } else if change.has_left() {
                info!("👤 {} left", change.user_id());
            }
        }
        info!(
            "✅ Replayed {} ({} entries, {} updated)",
            path.display(),
            result.entries.len(),
            result.updated_entries.len()
        );
    }

    let txn = db.transaction();
    let fragments = txn.fragments(&room_id)?;
    if fragments.is_empty() {
        bail!("Nothing was written for {room_id}");
    }

    for fragment in timeline_order(fragments) {
        println!(
            "── fragment {} (previous token: {}, next token: {})",
            fragment.id,
            fragment.previous_token.as_deref().unwrap_or("-"),
            fragment.next_token.as_deref().unwrap_or("-"),
        );
        for entry in txn.first_events(&room_id, fragment.id, usize::MAX)? {
            let sender = entry.display_name.as_deref().unwrap_or(entry.event.sender.as_str());
            let body = entry.event.content.get("body").and_then(Value::as_str).unwrap_or_default();
            let annotations: Vec<String> = entry
                .annotations
                .iter()
                .map(|(key, annotation)| format!("{key}×{}", annotation.count))
                .collect();
            println!(
                "[{}/{}] {} {} <{}> {} {}",
                entry.fragment_id,
                entry.event_index,
                entry.event.event_id,
                entry.event.kind,
                sender,
                body,
                annotations.join(" ")
            );
        }
    }

    info!("✅ Replay of {} files finished in {:?}", files.len(), start.elapsed());
    Ok(())
}

/// Fragments in timeline order, following their stored links. Unlinked
/// islands follow each other in creation order.
fn timeline_order(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut remaining: BTreeMap<u32, Fragment> = fragments.into_iter().map(|f| (f.id, f)).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    loop {
        let head = remaining
            .values()
            .find(|f| f.previous_id.map_or(true, |previous| !remaining.contains_key(&previous)))
            .map(|f| f.id)
            .or_else(|| remaining.keys().next().copied());
        let Some(mut id) = head else {
            break;
        };
        while let Some(fragment) = remaining.remove(&id) {
            let next = fragment.next_id;
            ordered.push(fragment);
            match next {
                Some(next) => id = next,
                None => break,
            }
        }
    }
    ordered
}
