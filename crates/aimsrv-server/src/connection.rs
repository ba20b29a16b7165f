//! Per-connection lifecycle (`spec.md` §4.1-§4.3, §5; `SPEC_FULL.md` §5):
//! one read task and one write task per accepted socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncWrite};

use aimsrv_core::cookie::CookiePayload;
use aimsrv_core::session::{Outbound, Session};
use aimsrv_core::Engine;
use aimsrv_handlers::dispatcher::HandlerOutcome;
use aimsrv_handlers::{auth, oservice, HandlerContext, ServiceAddrs, ServiceKind};
use aimsrv_wire::flap::{self, FlapChannel, SequenceCounter};
use aimsrv_wire::food_group::{group, service_code};
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::Snac;
use aimsrv_wire::tlv;

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn expected_service_code(kind: ServiceKind) -> Option<u16> {
    match kind {
        ServiceKind::Auth => None,
        ServiceKind::Bos => Some(service_code::BOS),
        ServiceKind::Chat => Some(group::CHAT),
        ServiceKind::ChatNav => Some(group::CHAT_NAV),
        ServiceKind::Bart => Some(group::BART),
        ServiceKind::Admin => Some(group::ADMIN),
        ServiceKind::Alert => Some(group::ALERT),
        ServiceKind::ODir => Some(group::ODIR),
    }
}

fn food_groups_for(kind: ServiceKind) -> &'static [u16] {
    match kind {
        ServiceKind::Auth => &[group::BUCP],
        ServiceKind::Bos => &[group::OSERVICE, group::LOCATE, group::BUDDY, group::ICBM, group::FEEDBAG, group::ICQ, group::PERMIT_DENY, group::USER_LOOKUP],
        ServiceKind::Chat => &[group::OSERVICE, group::CHAT],
        ServiceKind::ChatNav => &[group::OSERVICE, group::CHAT_NAV],
        ServiceKind::Bart => &[group::OSERVICE, group::BART],
        ServiceKind::Admin => &[group::OSERVICE, group::ADMIN],
        ServiceKind::Alert => &[group::OSERVICE, group::ALERT],
        ServiceKind::ODir => &[group::OSERVICE, group::ODIR],
    }
}

/// Handles one accepted connection for `kind` to completion. Generic over
/// the stream type so both plaintext `TcpStream` and (when configured) a
/// TLS-wrapped stream share this one code path. `advertised_bos` is the
/// `host:port` handed to clients in the BUCP login response; it is only
/// consulted for `ServiceKind::Auth` connections. `service_addrs` is the
/// full per-service address table consulted by `ServiceRequest` handling
/// on every other connection.
pub async fn handle<S>(stream: S, remote_addr: SocketAddr, kind: ServiceKind, engine: Arc<Engine>, advertised_bos: Arc<str>, service_addrs: Arc<ServiceAddrs>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);

    let Ok(Some(hello)) = flap::read_frame(&mut reader).await else {
        return;
    };
    if !matches!(hello.channel, FlapChannel::SignOn) {
        return;
    }

    if kind == ServiceKind::Auth {
        handle_auth(&mut reader, writer, &engine, &advertised_bos).await;
        return;
    }

    let Some(expected) = expected_service_code(kind) else {
        return;
    };
    let Some(cookie) = tlv::decode_rest(&hello.payload).ok().and_then(|tlvs| tlv::find(&tlvs, 0x06).and_then(|t| t.as_str().map(str::to_string))) else {
        return;
    };
    let now = now_secs();
    let Ok(payload) = engine.cookies.crack(&cookie, expected, now) else {
        tracing::debug!(?kind, "rejected invalid service-dispatch cookie");
        return;
    };

    let identity = Identity::from_display(&payload.display_screen_name);
    let Ok(Some(account)) = engine.repo.get_account(&identity) else {
        return;
    };

    let session = Arc::new(Session::with_rate_classes(identity.clone(), account.display_screen_name.clone(), account.uin, remote_addr, now, engine.rate_classes));
    if let Some(room_cookie) = &payload.chat_room_cookie {
        session.set_chat_room_cookie(Some(room_cookie.clone()));
    }

    let evicted = if kind == ServiceKind::Bos {
        match engine.registry.register(session.clone(), true) {
            Ok(evicted) => evicted,
            Err(_) => return,
        }
    } else {
        None
    };
    if let Some(evicted) = evicted {
        evicted.enqueue(Outbound::Close);
    }

    session.enqueue(Outbound::Snac(oservice::host_online(food_groups_for(kind))));

    run_session(reader, writer, session.clone(), kind, engine.clone(), service_addrs.clone()).await;

    teardown(&session, kind, &engine, &payload, service_addrs);
}

async fn handle_auth<R, W>(reader: &mut R, mut writer: W, engine: &Arc<Engine>, advertised_bos: &str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Ok(Some(frame)) = flap::read_frame(reader).await else {
        return;
    };
    if !matches!(frame.channel, FlapChannel::Data) {
        return;
    }
    let Ok(snac) = Snac::decode(&frame.payload) else {
        return;
    };

    let now = now_secs();
    let reply = auth::handle_login(engine, &snac, advertised_bos, now);
    let body = reply.encode();
    let _ = flap::write_frame(&mut writer, FlapChannel::Data, 0, &body).await;
}

async fn run_session<R, W>(mut reader: R, writer: W, session: Arc<Session>, kind: ServiceKind, engine: Arc<Engine>, service_addrs: Arc<ServiceAddrs>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let write_task = tokio::spawn(write_loop(writer, session.clone()));

    let ctx = HandlerContext::new(engine, kind, session.identity.clone(), service_addrs);
    loop {
        let frame = match flap::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            _ => break,
        };
        match frame.channel {
            FlapChannel::Data => {
                let Ok(snac) = Snac::decode(&frame.payload) else {
                    continue;
                };
                let now = now_secs();
                let now_ms = now_millis();
                match aimsrv_handlers::dispatch(&ctx, &session, snac, now, now_ms) {
                    HandlerOutcome::None => {}
                    HandlerOutcome::Reply(reply) => session.enqueue(Outbound::Snac(reply)),
                    HandlerOutcome::CloseAfterReply(reply) => {
                        session.enqueue(Outbound::Snac(reply));
                        session.enqueue(Outbound::Close);
                    }
                    HandlerOutcome::Close => session.enqueue(Outbound::Close),
                }
            }
            FlapChannel::SignOff => break,
            _ => {}
        }
        if session.is_closed() {
            break;
        }
    }

    session.close();
    let _ = write_task.await;
}

async fn write_loop<W>(mut writer: W, session: Arc<Session>)
where
    W: AsyncWrite + Unpin,
{
    let Some(mut rx) = session.take_receiver() else {
        return;
    };
    let mut seq = SequenceCounter::new(0);
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Snac(snac) => {
                let body = snac.encode();
                if flap::write_frame(&mut writer, FlapChannel::Data, seq.advance(), &body).await.is_err() {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
}

fn teardown(session: &Arc<Session>, kind: ServiceKind, engine: &Arc<Engine>, payload: &CookiePayload, service_addrs: Arc<ServiceAddrs>) {
    match kind {
        ServiceKind::Bos => {
            engine.registry.deregister(&session.identity, session);
            if !session.invisible() {
                engine.buddies.broadcast_departure(session);
            }
        }
        ServiceKind::Chat => {
            if let Some(cookie) = &payload.chat_room_cookie {
                aimsrv_handlers::chat::announce_leave(&HandlerContext::new(engine.clone(), kind, session.identity.clone(), service_addrs), session, cookie);
            }
        }
        _ => {}
    }
}
