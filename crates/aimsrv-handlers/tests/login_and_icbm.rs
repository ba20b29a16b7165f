//! End-to-end checks driven straight against in-memory SNACs, per the
//! guidance that wire-layout is a narrow-interface collaborator not worth
//! exercising over a real socket in this suite.

use std::sync::Arc;

use aimsrv_core::session::{Outbound, Session};
use aimsrv_core::Engine;
use aimsrv_db::memory::InMemoryRepository;
use aimsrv_db::model::Account;
use aimsrv_db::Repository;
use aimsrv_handlers::dispatcher::HandlerOutcome;
use aimsrv_handlers::{auth, dispatch, HandlerContext, ServiceAddrs, ServiceKind};
use aimsrv_wire::food_group::{bart, bucp, group, icbm, service_code};
use aimsrv_wire::screen_name::Identity;
use aimsrv_wire::snac::{Snac, SnacHeader};
use aimsrv_wire::tlv::{self, write_prefixed_string_8, Tlv};

fn test_service_addrs() -> Arc<ServiceAddrs> {
    Arc::new(ServiceAddrs {
        bos: "127.0.0.1:5191".to_string(),
        chat: "127.0.0.1:5192".to_string(),
        chat_nav: "127.0.0.1:5193".to_string(),
        bart: "127.0.0.1:5194".to_string(),
        admin: "127.0.0.1:5195".to_string(),
        alert: "127.0.0.1:5196".to_string(),
        odir: "127.0.0.1:5197".to_string(),
    })
}

fn test_engine() -> Arc<Engine> {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    Arc::new(Engine::new(repo, [7u8; 32], true).unwrap())
}

fn seed_account(engine: &Engine, name: &str) -> Identity {
    let identity = Identity::from_display(name);
    engine
        .repo
        .create_account(Account {
            identity: identity.clone(),
            display_screen_name: name.to_string(),
            password_hash: vec![],
            email: "user@example.test".to_string(),
            confirmed: true,
            uin: None,
            created_at: 0,
            profile: String::new(),
            registration_open: true,
        })
        .unwrap();
    identity
}

fn login(engine: &Engine, name: &str) -> String {
    let body = tlv::encode_rest(&[Tlv::string(auth::info_tag::SCREEN_NAME, name)]);
    let snac = Snac::new(SnacHeader::new(group::BUCP, bucp::LOGIN_REQUEST, 1), body);
    let reply = auth::handle_login(engine, &snac, "127.0.0.1:5191", 0);
    assert_eq!(reply.header.subgroup, bucp::LOGIN_RESPONSE);
    let tlvs = tlv::decode_rest(&reply.body).unwrap();
    tlv::find(&tlvs, auth::info_tag::COOKIE).map(|t| String::from_utf8(t.value.clone()).unwrap()).unwrap()
}

#[test]
fn login_without_existing_account_provisions_when_registration_open() {
    let engine = test_engine();
    let cookie = login(&engine, "newbie");
    let payload = engine.cookies.crack(&cookie, service_code::BOS, 0).unwrap();
    assert_eq!(payload.display_screen_name, "newbie");
    assert!(engine.repo.get_account(&Identity::from_display("newbie")).unwrap().is_some());
}

#[test]
fn login_is_rejected_when_registration_is_closed_and_account_is_unknown() {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let engine = Engine::new(repo, [3u8; 32], false).unwrap();
    let body = tlv::encode_rest(&[Tlv::string(auth::info_tag::SCREEN_NAME, "ghost")]);
    let snac = Snac::new(SnacHeader::new(group::BUCP, bucp::LOGIN_REQUEST, 1), body);
    let reply = auth::handle_login(&engine, &snac, "127.0.0.1:5191", 0);
    assert_eq!(reply.header.subgroup, aimsrv_wire::food_group::ERROR_SUBGROUP);
}

#[test]
fn online_recipient_receives_an_icbm_message_delivered_live() {
    let engine = test_engine();
    let alice = seed_account(&engine, "alice");
    let bob = seed_account(&engine, "bob");

    let alice_session = Arc::new(Session::new(alice.clone(), "alice".to_string(), None, "127.0.0.1:1".parse().unwrap(), 0));
    let bob_session = Arc::new(Session::new(bob.clone(), "bob".to_string(), None, "127.0.0.1:2".parse().unwrap(), 0));
    engine.registry.register(alice_session.clone(), true).unwrap();
    engine.registry.register(bob_session.clone(), true).unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes());
    write_prefixed_string_8(&mut body, "bob");
    body.push(0);
    body.extend_from_slice(b"hello there");
    let snac = Snac::new(SnacHeader::new(group::ICBM, icbm::CHANNEL_MSG_TO_HOST, 1), body);

    let ctx = HandlerContext::new(engine.clone(), ServiceKind::Bos, alice.clone(), test_service_addrs());
    let outcome = dispatch(&ctx, &alice_session, snac, 0, 0);
    assert!(matches!(outcome, HandlerOutcome::None));

    let mut rx = bob_session.take_receiver().unwrap();
    let delivered = rx.try_recv().expect("bob should have an enqueued message");
    match delivered {
        Outbound::Snac(snac) => assert_eq!(snac.header.subgroup, icbm::CHANNEL_MSG_TO_CLIENT),
        Outbound::Close => panic!("expected a message, not a close"),
    }
}

#[test]
fn offline_recipient_gets_the_message_on_their_next_sign_on() {
    let engine = test_engine();
    let alice = seed_account(&engine, "alice");
    let bob = seed_account(&engine, "bob");

    let alice_session = Arc::new(Session::new(alice.clone(), "alice".to_string(), None, "127.0.0.1:1".parse().unwrap(), 0));
    engine.registry.register(alice_session.clone(), true).unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes());
    write_prefixed_string_8(&mut body, "bob");
    body.push(0);
    body.extend_from_slice(b"catch this later");
    let snac = Snac::new(SnacHeader::new(group::ICBM, icbm::CHANNEL_MSG_TO_HOST, 1), body);

    let ctx = HandlerContext::new(engine.clone(), ServiceKind::Bos, alice.clone(), test_service_addrs());
    dispatch(&ctx, &alice_session, snac, 0, 0);

    let bob_session = Arc::new(Session::new(bob.clone(), "bob".to_string(), None, "127.0.0.1:2".parse().unwrap(), 1));
    engine.registry.register(bob_session.clone(), true).unwrap();
    engine.icbm.deliver_offline_backlog(&bob_session);

    let mut rx = bob_session.take_receiver().unwrap();
    let delivered = rx.try_recv().expect("bob should receive the backlog on sign-on");
    match delivered {
        Outbound::Snac(snac) => assert_eq!(snac.header.subgroup, icbm::CHANNEL_MSG_TO_CLIENT),
        Outbound::Close => panic!("expected a message, not a close"),
    }
}

#[test]
fn retrieving_the_clear_icon_hash_returns_a_blank_gif_without_any_upload() {
    let engine = test_engine();
    let alice = seed_account(&engine, "alice");
    let alice_session = Arc::new(Session::new(alice.clone(), "alice".to_string(), None, "127.0.0.1:1".parse().unwrap(), 0));
    engine.registry.register(alice_session.clone(), true).unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&[0u8; 16]);
    let snac = Snac::new(SnacHeader::new(group::BART, bart::RETRIEVE_ITEM, 1), body);

    let ctx = HandlerContext::new(engine.clone(), ServiceKind::Bos, alice.clone(), test_service_addrs());
    let outcome = dispatch(&ctx, &alice_session, snac, 0, 0);
    match outcome {
        HandlerOutcome::Reply(reply) => {
            assert_eq!(reply.header.subgroup, bart::RETRIEVE_REPLY);
            assert_eq!(&reply.body[18..24], b"GIF89a");
        }
        _ => panic!("expected a retrieve reply"),
    }
}
