use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::RecordType as WireRecordType;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::resolver::AuthResolver;

/// Per-connection socket timeout. The 2 s budget is shared between the read
/// and write halves of a single exchange, matching the source's single
/// deadline per TCP connection.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(2);

/// `edns0`-free UDP responses are capped by the classic 512-byte limit, but
/// this server accepts oversized queries up to the full 16-bit length a TCP
/// message could carry.
const UDP_BUFFER_SIZE: usize = 65535;

/// Binds a UDP socket and a TCP listener at the same address and dispatches
/// inbound DNS messages to an [`AuthResolver`]. Both transports run
/// concurrently; either may be handed in pre-bound (see [`Self::from_sockets`])
/// to support listener handoff across a graceful restart.
pub struct AuthServer {
    tcp_listener: TcpListener,
    udp_socket: UdpSocket,
    resolver: Arc<AuthResolver>,
}

impl AuthServer {
    /// Bind fresh UDP and TCP sockets at `addr`.
    pub async fn bind(addr: SocketAddr, resolver: Arc<AuthResolver>) -> anyhow::Result<Self> {
        let udp_socket = UdpSocket::bind(addr).await?;
        let tcp_listener = TcpListener::bind(addr).await?;
        Ok(Self::from_sockets(tcp_listener, udp_socket, resolver))
    }

    /// Adopt already-bound sockets, e.g. ones a supervisor passed down across
    /// a graceful restart instead of letting this process bind its own.
    pub fn from_sockets(tcp_listener: TcpListener, udp_socket: UdpSocket, resolver: Arc<AuthResolver>) -> Self {
        Self { tcp_listener, udp_socket, resolver }
    }

    pub async fn run(self, shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
        let local_addr = self.udp_socket.local_addr()?;
        info!("auth DNS server listening on {local_addr} (UDP+TCP)");

        let mut buf = vec![0u8; UDP_BUFFER_SIZE];
        let mut shutdown_udp = shutdown.clone();
        let mut shutdown_tcp = shutdown;

        let resolver_tcp = self.resolver.clone();
        let tcp_listener = self.tcp_listener;

        let tcp_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = tcp_listener.accept() => {
                        match result {
                            Ok((stream, src)) => {
                                debug!("TCP connection from {src}");
                                let resolver = resolver_tcp.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_tcp_connection(stream, src, &resolver).await {
                                        warn!("TCP handler error from {src}: {e}");
                                    }
                                });
                            }
                            Err(e) => {
                                error!("TCP accept error: {e}");
                            }
                        }
                    }
                    _ = shutdown_tcp.changed() => {
                        if *shutdown_tcp.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        let socket = self.udp_socket;
        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    let (len, src) = result?;
                    let data = buf[..len].to_vec();

                    metrics::counter!("request.handler.udp.requests").increment(1);
                    let started = std::time::Instant::now();
                    let reply = handle_query(&self.resolver, &data, src.ip());
                    metrics::histogram!("request.handler.udp.response_time").record(started.elapsed());

                    match reply {
                        Some(resp) => {
                            if let Err(e) = socket.send_to(&resp, src).await {
                                error!("failed to send response to {src}: {e}");
                            }
                        }
                        None => {
                            debug!("dropping unparseable query from {src}");
                        }
                    }
                }
                _ = shutdown_udp.changed() => {
                    if *shutdown_udp.borrow() {
                        info!("auth DNS server shutting down");
                        break;
                    }
                }
            }
        }

        tcp_handle.abort();
        Ok(())
    }
}

/// Parse, resolve, and serialize a single query. Returns `None` for
/// unparseable messages, which the caller drops silently rather than
/// answering (malformed-input queries get no response at all).
fn handle_query(resolver: &AuthResolver, data: &[u8], client_ip: std::net::IpAddr) -> Option<Vec<u8>> {
    let request = match Message::from_bytes(data) {
        Ok(m) => m,
        Err(e) => {
            debug!("failed to parse DNS message from {client_ip}: {e}");
            return None;
        }
    };

    if request.op_code() != OpCode::Query {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(request.op_code());
        response.set_response_code(ResponseCode::NotImp);
        return response.to_bytes().ok();
    }

    let queries = request.queries();
    if queries.is_empty() {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(OpCode::Query);
        response.set_response_code(ResponseCode::FormErr);
        return response.to_bytes().ok();
    }

    let query = &queries[0];
    debug!("query: {} {} from {client_ip}", query.name(), query.query_type());

    // Zone transfers are out of scope: refuse rather than walk zone contents.
    if matches!(query.query_type(), WireRecordType::AXFR | WireRecordType::IXFR) {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(OpCode::Query);
        for q in queries {
            response.add_query(q.clone());
        }
        response.set_response_code(ResponseCode::NotImp);
        return response.to_bytes().ok();
    }

    // RFC 8482: answer ANY with the zone's SOA alone rather than a full
    // record dump, the same minimal-response posture most resolvers take.
    if query.query_type() == WireRecordType::ANY {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(OpCode::Query);
        response.set_recursion_desired(request.recursion_desired());
        response.set_recursion_available(false);
        response.set_authoritative(true);
        for q in queries {
            response.add_query(q.clone());
        }
        if let Some(soa) = resolver.authority_soa(query.name()) {
            response.add_answer(soa);
        }
        response.set_response_code(ResponseCode::NoError);
        return response.to_bytes().ok();
    }

    let response = resolver.lookup(&request, client_ip);
    response.to_bytes().ok()
}

async fn handle_tcp_connection(
    mut stream: tokio::net::TcpStream,
    src: SocketAddr,
    resolver: &AuthResolver,
) -> anyhow::Result<()> {
    let msg_len = timeout(SOCKET_TIMEOUT, stream.read_u16()).await??;
    if msg_len == 0 {
        return Ok(());
    }

    let mut buf = vec![0u8; msg_len as usize];
    timeout(SOCKET_TIMEOUT, stream.read_exact(&mut buf)).await??;

    metrics::counter!("request.handler.tcp.requests").increment(1);
    let started = std::time::Instant::now();
    let reply = handle_query(resolver, &buf, src.ip());
    metrics::histogram!("request.handler.tcp.response_time").record(started.elapsed());

    let Some(response) = reply else {
        return Ok(());
    };
    let len = response.len() as u16;

    timeout(SOCKET_TIMEOUT, async {
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(&response).await?;
        stream.flush().await
    })
    .await??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodns_core::config::SoaConfig;
    use geodns_core::db::RedbStore;
    use hickory_proto::op::Query;
    use hickory_proto::rr::{DNSClass, Name};
    use std::str::FromStr;

    fn test_resolver() -> (Arc<AuthResolver>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("server.redb")).unwrap();
        store.add_zone("example.com.").unwrap();
        let soa = SoaConfig {
            ns: vec!["ns1.example.com.".to_string()],
            mbox: "hostmaster.example.com.".to_string(),
            refresh: 3600,
            retry: 600,
            expire: 604800,
            ttl: 300,
        };
        let resolver = Arc::new(AuthResolver::new(Arc::new(store), None, soa));
        (resolver, dir)
    }

    fn query_bytes(name: &str, qtype: WireRecordType) -> Vec<u8> {
        let mut q = Query::new();
        q.set_name(Name::from_str(name).unwrap());
        q.set_query_type(qtype);
        q.set_query_class(DNSClass::IN);
        let mut msg = Message::new();
        msg.set_id(7);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.add_query(q);
        msg.to_bytes().unwrap()
    }

    #[test]
    fn malformed_query_is_dropped_without_a_response() {
        let (resolver, _dir) = test_resolver();
        assert!(handle_query(&resolver, b"not a dns message", "198.51.100.1".parse().unwrap()).is_none());
    }

    #[test]
    fn nonquery_opcode_gets_notimp() {
        let (resolver, _dir) = test_resolver();
        let mut msg = Message::new();
        msg.set_id(1);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Status);
        let bytes = msg.to_bytes().unwrap();

        let response_bytes = handle_query(&resolver, &bytes, "198.51.100.1".parse().unwrap()).unwrap();
        let response = Message::from_bytes(&response_bytes).unwrap();
        assert_eq!(response.response_code(), ResponseCode::NotImp);
    }

    #[test]
    fn any_query_answers_with_soa_only() {
        let (resolver, _dir) = test_resolver();
        let bytes = query_bytes("example.com.", WireRecordType::ANY);

        let response_bytes = handle_query(&resolver, &bytes, "198.51.100.1".parse().unwrap()).unwrap();
        let response = Message::from_bytes(&response_bytes).unwrap();
        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.answers()[0].record_type(), WireRecordType::SOA);
    }

    #[test]
    fn axfr_is_refused_with_notimp() {
        let (resolver, _dir) = test_resolver();
        let bytes = query_bytes("example.com.", WireRecordType::AXFR);

        let response_bytes = handle_query(&resolver, &bytes, "198.51.100.1".parse().unwrap()).unwrap();
        let response = Message::from_bytes(&response_bytes).unwrap();
        assert_eq!(response.response_code(), ResponseCode::NotImp);
        assert!(response.answers().is_empty());
    }

    #[test]
    fn unknown_name_under_no_zone_still_gets_answered_not_refused() {
        // The listener does not pre-filter by zone ownership; the resolver
        // itself decides NXDOMAIN vs authoritative, per the covering-zone
        // lookup it performs internally.
        let (resolver, _dir) = test_resolver();
        let bytes = query_bytes("nowhere.invalid.", WireRecordType::A);

        let response_bytes = handle_query(&resolver, &bytes, "198.51.100.1".parse().unwrap()).unwrap();
        let response = Message::from_bytes(&response_bytes).unwrap();
        assert_eq!(response.response_code(), ResponseCode::NXDomain);
        assert!(!response.authoritative());
    }
}
