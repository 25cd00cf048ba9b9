//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use rstest::fixture;

use super::{Bound, GateServer};
use crate::{config::ServerConfig, hooks::ConnectionHooks};

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port.
///
/// Keeping the listener bound prevents another process claiming the port
/// between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Bind an echo gateway to `listener`.
pub fn bind_echo_server(config: ServerConfig, listener: StdTcpListener) -> GateServer<Bound> {
    let handler = ConnectionHooks::new()
        .on_receive(|_conn, payload, _kind| Ok(Some(payload)))
        .into_handler();
    GateServer::new(config, handler)
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn bound_server_reports_listener_address() {
        let listener = free_listener();
        let expected = listener.local_addr().expect("failed to get address");
        let server = bind_echo_server(ServerConfig::default(), listener);
        assert_eq!(server.local_addr(), Some(expected));
    }
}
