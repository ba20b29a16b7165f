//! `aimsrv`: the OSCAR protocol server binary (`SPEC_FULL.md` §4.13).

mod cli;
mod config;
mod connection;
mod listener;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use aimsrv_core::cookie::CookieSigner;
use aimsrv_core::Engine;
use aimsrv_db::model::Account;
use aimsrv_db::Repository;
use aimsrv_handlers::{ServiceAddrs, ServiceKind};
use aimsrv_wire::screen_name::ScreenName;

use cli::{Cli, Command, ServeArgs};
use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_serve = ServeArgs::default();
    let serve_args = match &cli.command {
        Some(Command::Serve(args)) => args,
        _ => &default_serve,
    };
    let config = ServerConfig::load(cli.config.as_deref(), serve_args)?;

    init_tracing(&config.log_level);

    match cli.command.unwrap_or(Command::Serve(default_serve)) {
        Command::Serve(_) => run_server(config).await,
        Command::CreateAccount { screen_name, password_hash } => create_account(&config, &screen_name, &password_hash),
        Command::ListRooms => list_rooms(&config),
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_repository(dsn: &str) -> anyhow::Result<Arc<dyn Repository>> {
    if let Some(path) = dsn.strip_prefix("sqlite://") {
        if path.is_empty() {
            Ok(Arc::new(aimsrv_db::sqlite::SqliteRepository::open_in_memory()?))
        } else {
            Ok(Arc::new(aimsrv_db::sqlite::SqliteRepository::open(std::path::Path::new(path))?))
        }
    } else if dsn == "memory://" || dsn.is_empty() {
        Ok(Arc::new(aimsrv_db::memory::InMemoryRepository::new()))
    } else {
        anyhow::bail!("unrecognized DSN scheme: {dsn}")
    }
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let repo = open_repository(&config.dsn)?;
    let engine = Arc::new(Engine::new(repo, CookieSigner::generate_key(), config.registration_open)?);

    if config.tls_cert_path.is_some() || config.tls_key_path.is_some() {
        tracing::warn!("tls_cert_path/tls_key_path configured but no TLS acceptor is wired up; serving plaintext only");
    }

    let services: Vec<(config::ServiceConfig, ServiceKind)> = vec![
        (config.auth.clone(), ServiceKind::Auth),
        (config.bos.clone(), ServiceKind::Bos),
        (config.chat.clone(), ServiceKind::Chat),
        (config.chat_nav.clone(), ServiceKind::ChatNav),
        (config.bart.clone(), ServiceKind::Bart),
        (config.admin.clone(), ServiceKind::Admin),
        (config.alert.clone(), ServiceKind::Alert),
        (config.odir.clone(), ServiceKind::ODir),
    ];

    let advertised_bos: Arc<str> = format!("{}:{}", config.advertised_host, config.bos.bind_port).into();
    let service_addrs = Arc::new(ServiceAddrs {
        bos: advertised_bos.to_string(),
        chat: format!("{}:{}", config.advertised_host, config.chat.bind_port),
        chat_nav: format!("{}:{}", config.advertised_host, config.chat_nav.bind_port),
        bart: format!("{}:{}", config.advertised_host, config.bart.bind_port),
        admin: format!("{}:{}", config.advertised_host, config.admin.bind_port),
        alert: format!("{}:{}", config.advertised_host, config.alert.bind_port),
        odir: format!("{}:{}", config.advertised_host, config.odir.bind_port),
    });

    let mut tasks = Vec::new();
    for (service_config, kind) in services {
        let engine = engine.clone();
        let advertised_bos = advertised_bos.clone();
        let service_addrs = service_addrs.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = listener::serve(service_config, kind, engine, advertised_bos, service_addrs).await {
                tracing::error!(?kind, %err, "listener exited");
            }
        }));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        _ = futures_all(tasks) => {
            tracing::error!("all listeners exited unexpectedly");
        }
    }

    Ok(())
}

async fn futures_all(tasks: Vec<tokio::task::JoinHandle<()>>) {
    for task in tasks {
        let _ = task.await;
    }
}

fn create_account(config: &ServerConfig, screen_name: &str, password_hash: &str) -> anyhow::Result<()> {
    let repo = open_repository(&config.dsn)?;
    let screen_name = ScreenName::parse(screen_name).context("invalid screen name")?;
    let account = Account {
        identity: screen_name.identity(),
        display_screen_name: screen_name.as_str().to_string(),
        password_hash: hex::decode(password_hash).context("password_hash must be hex-encoded")?,
        email: String::new(),
        confirmed: true,
        uin: None,
        created_at: 0,
        profile: String::new(),
        registration_open: config.registration_open,
    };
    repo.create_account(account)?;
    println!("account created: {}", screen_name.as_str());
    Ok(())
}

fn list_rooms(config: &ServerConfig) -> anyhow::Result<()> {
    let repo = open_repository(&config.dsn)?;
    let chat_rooms = aimsrv_core::chatroom::ChatRoomRegistry::new(repo)?;
    for room in chat_rooms.list_exchange(aimsrv_core::chatroom::PUBLIC_EXCHANGE) {
        println!("{}\t{}", room.cookie, room.display_name);
    }
    Ok(())
}
