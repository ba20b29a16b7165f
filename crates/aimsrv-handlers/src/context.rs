//! Per-connection handler context (`spec.md` §4.6 step 4: "handler
//! invocation: pass context, session, frame, decoded body").

use std::sync::Arc;

use aimsrv_core::Engine;
use aimsrv_wire::food_group::group;
use aimsrv_wire::screen_name::Identity;

/// Which logical service a connection belongs to — used by handlers whose
/// behavior depends on it (e.g. `ServiceRequest` is BOS-only, `ClientOnline`
/// orders its replies differently on BOS vs Chat, `spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Auth,
    Bos,
    Chat,
    ChatNav,
    Bart,
    Admin,
    Alert,
    ODir,
}

/// The `host:port` a client should reconnect to for each service, built by
/// the server binary from `ServerConfig`'s `advertised_host` and each
/// service's configured port (`spec.md` §4.8: the `ServiceRequest`/
/// `LoginResponse` reply carries the receiving service's real address, not
/// a fixed one).
#[derive(Debug, Clone)]
pub struct ServiceAddrs {
    pub bos: String,
    pub chat: String,
    pub chat_nav: String,
    pub bart: String,
    pub admin: String,
    pub alert: String,
    pub odir: String,
}

impl ServiceAddrs {
    /// Looks up the advertised address for a `ServiceRequest`'s requested
    /// food group. Falls back to the BOS address for anything unlisted —
    /// `handle_service_request` already rejects unsupported food groups
    /// before this is consulted.
    pub fn for_food_group(&self, food_group: u16) -> &str {
        match food_group {
            group::CHAT => &self.chat,
            group::CHAT_NAV => &self.chat_nav,
            group::BART => &self.bart,
            group::ADMIN => &self.admin,
            group::ALERT => &self.alert,
            group::ODIR => &self.odir,
            _ => &self.bos,
        }
    }
}

/// Bundles the shared engine with the identity of the connection currently
/// being served. Handlers borrow this plus the `Arc<Session>` for the
/// connection to do their work.
pub struct HandlerContext {
    pub engine: Arc<Engine>,
    pub service: ServiceKind,
    pub identity: Identity,
    pub service_addrs: Arc<ServiceAddrs>,
}

impl HandlerContext {
    pub fn new(engine: Arc<Engine>, service: ServiceKind, identity: Identity, service_addrs: Arc<ServiceAddrs>) -> Self {
        Self { engine, service, identity, service_addrs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> ServiceAddrs {
        ServiceAddrs {
            bos: "bos:5191".to_string(),
            chat: "chat:5192".to_string(),
            chat_nav: "chatnav:5193".to_string(),
            bart: "bart:5194".to_string(),
            admin: "admin:5195".to_string(),
            alert: "alert:5196".to_string(),
            odir: "odir:5197".to_string(),
        }
    }

    #[test]
    fn for_food_group_routes_each_service_to_its_own_address() {
        let addrs = addrs();
        assert_eq!(addrs.for_food_group(group::CHAT), "chat:5192");
        assert_eq!(addrs.for_food_group(group::CHAT_NAV), "chatnav:5193");
        assert_eq!(addrs.for_food_group(group::BART), "bart:5194");
        assert_eq!(addrs.for_food_group(group::ADMIN), "admin:5195");
        assert_eq!(addrs.for_food_group(group::ALERT), "alert:5196");
        assert_eq!(addrs.for_food_group(group::ODIR), "odir:5197");
    }

    #[test]
    fn for_food_group_falls_back_to_bos() {
        assert_eq!(addrs().for_food_group(group::OSERVICE), "bos:5191");
    }
}
