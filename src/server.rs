//! The HTTP update server.
//!
//! The listener loop accepts connections itself instead of handing the
//! listener to axum, because with `--accept-proxy` a PROXY protocol header
//! has to be stripped off the stream before HTTP begins.  Each connection is
//! served through hyper with the resolved client address attached as a
//! request extension.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::api::{
    AcmeUpdateRequest, AcmeUpdateResponse, ApiError, LegoRequest, LegoResponse, ZmUpdateRequest,
    ZmUpdateResponse,
};
use crate::auth::{self, Htpasswd};
use crate::config::Args;
use crate::zone::{ZoneManager, EMPTY_PLACEHOLDER};

/// How long shutdown waits for open connections to finish.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// The PROXY protocol v2 signature.
const V2_SIGNATURE: [u8; 12] = *b"\r\n\r\n\0\r\nQUIT\n";

/// A PROXY protocol v1 line is at most this long.
const V1_MAX_LEN: usize = 107;

//----------- AppState ---------------------------------------------------------

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub zones: Arc<ZoneManager>,
    pub htpasswd: Arc<Htpasswd>,
}

/// The address a request really came from, PROXY protocol applied.
#[derive(Copy, Clone, Debug)]
pub struct ClientAddr(pub SocketAddr);

//----------- run --------------------------------------------------------------

/// Bind, serve, and drain the update server.  Returns after SIGINT/SIGTERM.
pub async fn run(args: &Args, htpasswd: Htpasswd, zones: ZoneManager) -> io::Result<()> {
    let state = AppState {
        zones: Arc::new(zones),
        htpasswd: Arc::new(htpasswd),
    };
    let router = router(state);

    let listener = TcpListener::bind(args.listen.as_str()).await?;
    info!(addr = %args.listen, accept_proxy = args.accept_proxy, "listening");

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            () = shutdown_signal() => break,

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let router = router.clone();
                        let accept_proxy = args.accept_proxy;
                        let header_timeout = args.proxy_header_timeout.as_duration();
                        connections.spawn(async move {
                            let served = serve_connection(
                                stream, peer, router, accept_proxy, header_timeout,
                            )
                            .await;
                            if let Err(err) = served {
                                debug!(%peer, "connection ended: {err}");
                            }
                        });
                    }
                    Err(err) => error!("accept failed: {err}"),
                }
            }

            // Reap finished connection tasks as we go.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    info!("shutting down, draining connections");
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
        warn!("connections still open after {SHUTDOWN_DRAIN:?}, aborting them");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("installing the SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

//----------- Connection handling ----------------------------------------------

/// Serve one accepted connection.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    accept_proxy: bool,
    header_timeout: Duration,
) -> io::Result<()> {
    let client = if accept_proxy {
        let header = tokio::time::timeout(header_timeout, read_proxy_header(&mut stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "PROXY header timed out"))??;
        // A LOCAL command or UNKNOWN family falls back to the socket peer.
        header.unwrap_or(peer)
    } else {
        peer
    };

    let service = TowerToHyperService::new(router.layer(Extension(ClientAddr(client))));
    ConnectionBuilder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(stream), service)
        .await
        .map_err(io::Error::other)
}

/// Read and consume the PROXY protocol header at the start of a stream.
///
/// Returns the advertised source address, or `None` when the header does not
/// carry one.  The reads are sized exactly so no application bytes are
/// consumed.
async fn read_proxy_header(stream: &mut TcpStream) -> io::Result<Option<SocketAddr>> {
    let mut buf = vec![0u8; V2_SIGNATURE.len()];
    stream.read_exact(&mut buf).await?;

    if buf == V2_SIGNATURE {
        // Version/command, family, and the 16-bit payload length.
        let mut rest = [0u8; 4];
        stream.read_exact(&mut rest).await?;
        buf.extend_from_slice(&rest);

        let len = usize::from(u16::from_be_bytes([rest[2], rest[3]]));
        let start = buf.len();
        buf.resize(start + len, 0);
        stream.read_exact(&mut buf[start..]).await?;
    } else if buf.starts_with(b"PROXY ") {
        while !buf.ends_with(b"\n") {
            if buf.len() >= V1_MAX_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "PROXY v1 header too long",
                ));
            }
            buf.push(stream.read_u8().await?);
        }
    } else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing PROXY protocol header",
        ));
    }

    parse_proxy_addresses(&buf)
}

/// Pull the source address out of a complete PROXY protocol header.
fn parse_proxy_addresses(buf: &[u8]) -> io::Result<Option<SocketAddr>> {
    use ppp::{v1, v2, HeaderResult};

    match HeaderResult::parse(buf) {
        HeaderResult::V1(Ok(header)) => Ok(match header.addresses {
            v1::Addresses::Tcp4(a) => Some(SocketAddr::new(
                IpAddr::V4(a.source_address),
                a.source_port,
            )),
            v1::Addresses::Tcp6(a) => Some(SocketAddr::new(
                IpAddr::V6(a.source_address),
                a.source_port,
            )),
            v1::Addresses::Unknown => None,
        }),
        HeaderResult::V2(Ok(header)) => Ok(match header.addresses {
            v2::Addresses::IPv4(a) => Some(SocketAddr::new(
                IpAddr::V4(a.source_address),
                a.source_port,
            )),
            v2::Addresses::IPv6(a) => Some(SocketAddr::new(
                IpAddr::V6(a.source_address),
                a.source_port,
            )),
            v2::Addresses::Unix(_) | v2::Addresses::Unspecified => None,
        }),
        HeaderResult::V1(Err(_)) | HeaderResult::V2(Err(_)) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid PROXY protocol header",
        )),
    }
}

//----------- Routes -----------------------------------------------------------

fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/nic/update", get(nic_update))
        .route("/acme/update", post(acme_update))
        // NOTE: lego joins `present`/`cleanup` onto its endpoint URL without
        // a leading slash, so these must live at the root.
        .route("/present", post(lego_present))
        .route("/cleanup", post(lego_cleanup))
        .route("/zm/update", post(zm_update))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/myip", get(myip))
        .merge(protected)
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn myip(Extension(ClientAddr(addr)): Extension<ClientAddr>) -> String {
    format!("{}\n", addr.ip())
}

/// The dyndns2-style update endpoint.
///
/// `hostname` is required; `myip`/`myipv6` may each appear any number of
/// times, and when neither is given the connection peer address is used.  The
/// `offline` parameter some clients send is accepted and ignored.
async fn nic_update(
    State(state): State<AppState>,
    Extension(ClientAddr(peer)): Extension<ClientAddr>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<&'static str, ApiError> {
    let mut hostnames = Vec::new();
    let mut addrs = Vec::new();
    let mut invalid = Vec::new();

    for (key, value) in &params {
        match key.as_str() {
            "hostname" => hostnames.push(value.as_str()),
            "myip" | "myipv6" => match value.parse::<IpAddr>() {
                Ok(addr) => addrs.push(addr),
                Err(_) => invalid.push(value.as_str()),
            },
            _ => {}
        }
    }

    if hostnames.len() > 1 {
        warn!(?hostnames, "updating more than one hostname is not supported");
    }
    let Some(hostname) = hostnames.first().filter(|hostname| !hostname.is_empty()) else {
        return Err(ApiError::bad_request(
            "missing required query parameter: hostname",
        ));
    };
    if !invalid.is_empty() {
        return Err(ApiError::bad_request(format!(
            "invalid ip in myip/myipv6: {}",
            invalid.join(", ")
        )));
    }
    if addrs.is_empty() {
        addrs.push(peer.ip());
    }

    state.zones.update_ddns_address(hostname, &addrs).await?;
    Ok("OK")
}

async fn acme_update(
    State(state): State<AppState>,
    Json(request): Json<AcmeUpdateRequest>,
) -> Result<Json<AcmeUpdateResponse>, ApiError> {
    state
        .zones
        .update_acme_challenge(&request.subdomain, &request.txt, "")
        .await?;
    Ok(Json(AcmeUpdateResponse { txt: request.txt }))
}

/// LEGO HTTP-req "present": replace the parked placeholder with the token.
async fn lego_present(
    State(state): State<AppState>,
    Json(request): Json<LegoRequest>,
) -> Result<Json<LegoResponse>, ApiError> {
    state
        .zones
        .update_acme_challenge(&request.fqdn, &request.value, EMPTY_PLACEHOLDER)
        .await?;
    Ok(Json(LegoResponse {
        fqdn: request.fqdn,
        value: request.value,
    }))
}

/// LEGO HTTP-req "cleanup": park the placeholder again.
async fn lego_cleanup(
    State(state): State<AppState>,
    Json(request): Json<LegoRequest>,
) -> Result<Json<LegoResponse>, ApiError> {
    state
        .zones
        .update_acme_challenge(&request.fqdn, "", &request.value)
        .await?;
    Ok(Json(LegoResponse {
        fqdn: request.fqdn,
        value: request.value,
    }))
}

async fn zm_update(
    State(state): State<AppState>,
    Json(request): Json<ZmUpdateRequest>,
) -> Result<Json<ZmUpdateResponse>, ApiError> {
    let changed = state
        .zones
        .update_record(&request.fqdn, &request.rtype, &request.values)
        .await?;
    Ok(Json(ZmUpdateResponse {
        fqdn: request.fqdn,
        changed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_v1_header_addresses() {
        let header = b"PROXY TCP4 192.0.2.7 192.0.2.1 56324 443\r\n";
        assert_eq!(
            parse_proxy_addresses(header).unwrap(),
            Some("192.0.2.7:56324".parse().unwrap())
        );

        let header = b"PROXY UNKNOWN\r\n";
        assert_eq!(parse_proxy_addresses(header).unwrap(), None);

        assert!(parse_proxy_addresses(b"PROXY NONSENSE\r\n").is_err());
    }

    #[test]
    fn proxy_v2_header_addresses() {
        let mut header = V2_SIGNATURE.to_vec();
        header.extend_from_slice(&[0x21, 0x11, 0x00, 0x0C]);
        header.extend_from_slice(&[192, 0, 2, 7]);
        header.extend_from_slice(&[192, 0, 2, 1]);
        header.extend_from_slice(&56324u16.to_be_bytes());
        header.extend_from_slice(&443u16.to_be_bytes());

        assert_eq!(
            parse_proxy_addresses(&header).unwrap(),
            Some("192.0.2.7:56324".parse().unwrap())
        );
    }
}
