mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use palaver_accounts::{AccountManager, ManagerEvent};
use palaver_rpc::{
    AccountEvent, AccountPath, AccountProperties, AccountService, ConnectionHandle,
    ConnectionStatus, CreateAccountRequest, MemoryService, Presence, PresenceKind, StatusReason,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Demo) {
        Commands::Demo => run_demo(config).await,
        Commands::ConfigSample { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("./palaver.sample.yml"));
            Config::sample().save(&path)?;
            println!("sample configuration written to {}", path.display());
            Ok(())
        }
    }
}

/// Drive a scripted account session against the in-memory service so the
/// aggregator's event flow can be watched end to end.
async fn run_demo(config: Config) -> Result<()> {
    info!("watching account service {}", config.service.bus_name);

    let service = MemoryService::new();
    let manager = AccountManager::shared(Arc::new(service.clone()));
    let mut events = manager.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Two accounts already configured on the service.
    let work = AccountPath::from("/am/gabble/jabber/work");
    let irc = AccountPath::from("/am/idle/irc/libera");
    service.add_valid_account(work.clone());
    service.add_valid_account(irc.clone());
    service.set_owner_present();

    service.publish_account(
        work.clone(),
        AccountEvent::Ready(AccountProperties {
            display_name: "Work (XMPP)".to_string(),
            enabled: true,
            connection: None,
            status: ConnectionStatus::Disconnected,
            presence: Presence::offline(),
        }),
    );
    service.publish_account(
        irc.clone(),
        AccountEvent::Ready(AccountProperties {
            display_name: "IRC".to_string(),
            enabled: true,
            connection: None,
            status: ConnectionStatus::Disconnected,
            presence: Presence::offline(),
        }),
    );

    // The XMPP account signs in.
    service.publish_account(
        work.clone(),
        AccountEvent::StatusChanged {
            old: ConnectionStatus::Disconnected,
            new: ConnectionStatus::Connecting,
            reason: StatusReason::Requested,
        },
    );
    service.publish_account(
        work.clone(),
        AccountEvent::ConnectionChanged {
            connection: Some(ConnectionHandle::new("/conn/gabble/jabber/work0")),
        },
    );
    service.publish_account(
        work.clone(),
        AccountEvent::StatusChanged {
            old: ConnectionStatus::Connecting,
            new: ConnectionStatus::Connected,
            reason: StatusReason::Requested,
        },
    );
    service.publish_account(
        work.clone(),
        AccountEvent::PresenceChanged {
            presence: Presence::new(PresenceKind::Available, "available", "at my desk"),
        },
    );

    // The IRC account arrives away.
    service.publish_account(
        irc.clone(),
        AccountEvent::PresenceChanged {
            presence: Presence::new(PresenceKind::Away, "away", "lurking"),
        },
    );

    // The user asks for busy everywhere.
    manager
        .request_global_presence(Presence::new(PresenceKind::Busy, "busy", "in a call"))
        .await;

    // A new account is created and picks the desired presence up.
    let pending = tokio::spawn(manager.create_account(
        CreateAccountRequest::new("gabble", "jabber", "Personal")
            .with_parameter("account", json!("romeo@example.net")),
    ));

    let personal_path = AccountPath::from("/am/gabble/jabber/account0");
    wait_for_account(&service, &personal_path).await?;
    service.publish_account(
        personal_path,
        AccountEvent::Ready(AccountProperties {
            display_name: "Personal".to_string(),
            enabled: true,
            connection: None,
            status: ConnectionStatus::Disconnected,
            presence: Presence::offline(),
        }),
    );
    let personal = pending.await.context("create task failed")??;
    info!("created account {}", personal.unique_name());

    // The leading account drops; presence falls back to the runner-up.
    service.publish_account(
        work.clone(),
        AccountEvent::PresenceChanged {
            presence: Presence::new(PresenceKind::Offline, "offline", ""),
        },
    );

    // The IRC account is deleted on the service side.
    service.publish_account(irc, AccountEvent::Removed);

    // Let the printer drain before summarizing.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let global = manager.global_presence().await;
    info!(
        accounts = manager.count().await,
        connecting = manager.connecting_count().await,
        connected = manager.connected_count().await,
        global = ?global.kind,
        "session summary"
    );

    printer.abort();
    Ok(())
}

/// Poll until the service lists `path` among its valid accounts.
async fn wait_for_account(service: &MemoryService, path: &AccountPath) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let properties = service.get_all().await?;
            if properties.valid_accounts.contains(path) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("timed out waiting for created account")?
}

async fn log_event(event: &ManagerEvent) {
    match event {
        ManagerEvent::AccountCreated(account) => {
            info!(account = %account.unique_name(), "account created: {}", account.display_name().await)
        }
        ManagerEvent::AccountDeleted(account) => {
            info!(account = %account.unique_name(), "account deleted")
        }
        ManagerEvent::AccountEnabled(account) => {
            info!(account = %account.unique_name(), "account enabled")
        }
        ManagerEvent::AccountDisabled(account) => {
            info!(account = %account.unique_name(), "account disabled")
        }
        ManagerEvent::AccountChanged(account) => {
            info!(account = %account.unique_name(), "account changed")
        }
        ManagerEvent::AccountConnectionChanged {
            account,
            reason,
            new,
            old,
        } => {
            info!(account = %account.unique_name(), ?old, ?new, ?reason, "connection status changed")
        }
        ManagerEvent::GlobalPresenceChanged(presence) => {
            info!(
                kind = ?presence.kind,
                status = presence.status.as_deref().unwrap_or("-"),
                message = presence.message.as_deref().unwrap_or("-"),
                "global presence changed"
            )
        }
        ManagerEvent::NewConnection(connection) => {
            info!(connection = %connection, "new connection")
        }
        ManagerEvent::Ready => info!("account enumeration complete"),
    }
}
