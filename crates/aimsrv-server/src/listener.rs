//! Per-service accept loops (`SPEC_FULL.md` §4.12: eight independent
//! listeners, one per OSCAR service).

use std::sync::Arc;

use tokio::net::TcpListener;

use aimsrv_core::Engine;
use aimsrv_handlers::{ServiceAddrs, ServiceKind};

use crate::config::ServiceConfig;
use crate::connection;

/// Binds `config`'s address and spawns a connection handler per accepted
/// socket until cancelled. Runs until the listener itself errors (bind
/// failure is reported to the caller so boot can fail fast). `advertised_bos`
/// is only meaningful for the Auth listener; `service_addrs` is consulted by
/// every other listener's `ServiceRequest` handling.
pub async fn serve(config: ServiceConfig, kind: ServiceKind, engine: Arc<Engine>, advertised_bos: Arc<str>, service_addrs: Arc<ServiceAddrs>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, ?kind, "listening");

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(?kind, %err, "accept failed");
                continue;
            }
        };
        let engine = engine.clone();
        let advertised_bos = advertised_bos.clone();
        let service_addrs = service_addrs.clone();
        tokio::spawn(async move {
            connection::handle(stream, remote_addr, kind, engine, advertised_bos, service_addrs).await;
        });
    }
}
