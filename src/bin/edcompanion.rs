//! edcompanion: journal companion daemon
//!
//! Tails the journal directory and logs notable events: low fuel after a
//! jump, chat, bounties and unknown event kinds. While the player is outside
//! the bubble, the EDSM live map is crawled and commanders moving nearby are
//! reported.
//!
//! ## Configuration
//! - EDCOMPANION_CONFIG: YAML configuration file
//! - EDCOMPANION_LOG: tracing filter (default: info)
//! - First CLI argument: optional configuration file path

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use edcompanion::config::{Config, NotificationConfig};
use edcompanion::galaxy::{
    Coordinates, CrawlerEvent, CrawlerOptions, EdsmClient, GalaxyCrawler, SOL,
};
use edcompanion::journal::schema::{Bounty, FsdJump, Location, ReceiveText, SendText, StartJump};
use edcompanion::journal::{handler_fn, unknown_kinds, EventKind, EventLog, LogNotice};
use edcompanion::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        directory = %config.journal.directory.display(),
        "Starting edcompanion"
    );

    let log = EventLog::from_config(&config.journal);
    let (position_tx, position_rx) = watch::channel::<Option<Coordinates>>(None);
    let position_tx = Arc::new(position_tx);

    attach_handlers(&log, &config.notifications, &position_tx).await;
    tokio::spawn(report_notices(log.notices()));

    let backlog = log.start(config.journal.backlog).await?;
    let unknown = unknown_kinds(backlog.iter().map(|e| e.as_ref()));
    if !unknown.is_empty() {
        warn!(count = unknown.len(), kinds = ?unknown, "Unknown event kinds in backlog");
    }

    if config.journal.backlog.store {
        if let Some(position) = log.last_known_position().await? {
            position_tx.send_replace(Some(position));
        }
    }

    let crawler = if config.galaxy.enabled {
        let client = EdsmClient::from_config(&config.galaxy)?;
        let crawler = Arc::new(GalaxyCrawler::new(
            Arc::new(client),
            CrawlerOptions::from_config(&config.galaxy),
        ));
        tokio::spawn(report_commanders(
            crawler.subscribe(),
            position_rx.clone(),
            config.notifications.clone(),
        ));
        tokio::spawn(supervise_crawler(
            Arc::clone(&crawler),
            position_rx,
            config.notifications.min_sol_distance,
        ));
        Some(crawler)
    } else {
        None
    };

    info!("edcompanion running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    if let Some(crawler) = crawler {
        if crawler.is_running().await {
            crawler.stop().await?;
        }
    }
    log.end().await?;
    Ok(())
}

async fn attach_handlers(
    log: &EventLog,
    notifications: &NotificationConfig,
    position: &Arc<watch::Sender<Option<Coordinates>>>,
) {
    log.on_any(handler_fn(|event| async move {
        debug!(kind = %event.kind(), timestamp = %event.timestamp(), "Journal event");
        if !event.kind().is_known() {
            info!(kind = %event.kind(), "Unknown event discovered");
        }
        Ok(())
    }))
    .await;

    let critical_fuel = notifications.critical_fuel_level;
    let tx = Arc::clone(position);
    log.on(
        EventKind::FsdJump,
        handler_fn(move |event| {
            let tx = Arc::clone(&tx);
            async move {
                let jump: FsdJump = event.decode()?;
                info!(
                    system = %jump.system.star_system,
                    distance = jump.jump_dist,
                    fuel = jump.fuel_level,
                    "Jumped"
                );
                if jump.fuel_level < critical_fuel {
                    warn!(fuel = jump.fuel_level, "Fuel level critical");
                }
                tx.send_replace(Some(jump.system.position()));
                Ok(())
            }
        }),
    )
    .await;

    let tx = Arc::clone(position);
    log.on(
        EventKind::Location,
        handler_fn(move |event| {
            let tx = Arc::clone(&tx);
            async move {
                let location: Location = event.decode()?;
                info!(system = %location.system.star_system, docked = location.docked, "Location");
                tx.send_replace(Some(location.system.position()));
                Ok(())
            }
        }),
    )
    .await;

    log.on(
        EventKind::StartJump,
        handler_fn(|event| async move {
            let jump: StartJump = event.decode()?;
            if let Some(system) = jump.star_system {
                info!(system = %system, class = ?jump.star_class, "Jumping");
            }
            Ok(())
        }),
    )
    .await;

    log.on(
        EventKind::ReceiveText,
        handler_fn(|event| async move {
            let text: ReceiveText = event.decode()?;
            // NPC chatter is noise.
            if text.channel != "npc" {
                info!(
                    channel = %text.channel,
                    from = text.from_localised.as_deref().or(text.from.as_deref()).unwrap_or_default(),
                    "{}",
                    text.display_message()
                );
            }
            Ok(())
        }),
    )
    .await;

    log.on(
        EventKind::SendText,
        handler_fn(|event| async move {
            let text: SendText = event.decode()?;
            info!(to = %text.to, "{}", text.message);
            Ok(())
        }),
    )
    .await;

    log.on(
        EventKind::Bounty,
        handler_fn(|event| async move {
            let bounty: Bounty = event.decode()?;
            info!(target = %bounty.target, reward = bounty.total(), "Bounty");
            Ok(())
        }),
    )
    .await;
}

async fn report_notices(mut notices: broadcast::Receiver<LogNotice>) {
    loop {
        match notices.recv().await {
            Ok(LogNotice::FileSwitched { path }) => info!(path = %path.display(), "Journal file"),
            Ok(LogNotice::Warning { message }) => warn!("{}", message),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "Notices lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run the crawler only while the player is outside the bubble.
async fn supervise_crawler(
    crawler: Arc<GalaxyCrawler>,
    mut position: watch::Receiver<Option<Coordinates>>,
    min_sol_distance: f64,
) {
    loop {
        let current = *position.borrow_and_update();
        if let Some(pos) = current {
            let outside = pos.distance(&SOL) >= min_sol_distance;
            let running = crawler.is_running().await;
            if outside && !running {
                info!("Starting galaxy crawler");
                if let Err(e) = crawler.start().await {
                    warn!(error = %e, "Galaxy crawler start failed");
                }
            } else if !outside && running {
                info!("Back in the bubble, stopping galaxy crawler");
                if let Err(e) = crawler.stop().await {
                    warn!(error = %e, "Galaxy crawler stop failed");
                }
            }
        }

        if position.changed().await.is_err() {
            break;
        }
    }
}

async fn report_commanders(
    mut events: broadcast::Receiver<CrawlerEvent>,
    position: watch::Receiver<Option<Coordinates>>,
    notifications: NotificationConfig,
) {
    let mut announced_cycle = false;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "Crawler events lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            CrawlerEvent::Moved { entry, .. } => {
                let Some(pos) = *position.borrow() else {
                    continue;
                };
                if pos.distance(&SOL) < notifications.min_sol_distance {
                    continue;
                }
                let distance = entry.coordinates.distance(&pos);
                if distance < notifications.commander_distance {
                    info!(
                        commander = entry.cmdr_name.as_deref().unwrap_or(&entry.user),
                        system = entry.system_name.as_deref().unwrap_or("unknown"),
                        distance = format!("{:.1}", distance),
                        "Nearby commander"
                    );
                }
            }
            CrawlerEvent::Cycle(_) if !announced_cycle => {
                announced_cycle = true;
                info!("Galaxy crawler fetch complete");
            }
            CrawlerEvent::Error(e) => warn!(error = %e, "Galaxy crawler error"),
            _ => {}
        }
    }
}
