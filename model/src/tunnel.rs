use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use log::{debug, info, warn};
use snafu::{ensure, ResultExt, Snafu};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;

pub type DialError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type DialResult = std::result::Result<Box<dyn PodStream>, DialError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Expected exactly one port to forward, got {}", count))]
    WrongPortCount { count: usize },

    #[snafu(display("Unable to forward port {} of pod '{}': {}", port, pod, source))]
    Dial {
        pod: String,
        port: u16,
        source: DialError,
    },

    #[snafu(display("Unable to bind a local port for pod '{}': {}", pod, source))]
    Bind { pod: String, source: std::io::Error },

    #[snafu(display("Cancelled while opening a tunnel to pod '{}'", pod))]
    Cancelled { pod: String },

    #[snafu(display("The tunnel to pod '{}' stopped before it was ready", pod))]
    Stopped { pod: String },
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

/// A bidirectional byte stream to a port of a pod.
pub trait PodStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> PodStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Opens streams to pods. Every local connection to a tunnel gets its own stream.
#[async_trait]
pub trait PodDialer: Send + Sync {
    async fn dial(&self, pod: &str, port: u16) -> DialResult;
}

/// Dials pods through the API server's port-forward subresource.
#[derive(Clone)]
pub struct KubePodDialer {
    api: Api<Pod>,
}

impl KubePodDialer {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl PodDialer for KubePodDialer {
    async fn dial(&self, pod: &str, port: u16) -> DialResult {
        let mut forwarder = self.api.portforward(pod, &[port]).await?;
        let stream = forwarder
            .take_stream(port)
            .ok_or_else(|| format!("no stream for port {}", port))?;
        let pod = pod.to_string();
        tokio::spawn(async move {
            if let Err(e) = forwarder.join().await {
                warn!("Port forward to pod '{}' ended with an error: {}", pod, e);
            }
        });
        Ok(Box::new(stream))
    }
}

/// Forwards a local port to the single port in `ports` of `pod` and returns the local alias, e.g.
/// `localhost:40123`.
///
/// The forwarding runs in a background task until `cancel` fires; there is nothing to close.
/// The call returns once the first stream to the pod has been established, fails if the pod
/// refuses it, and returns a cancellation error if `cancel` fires first.
pub async fn open_tunnel(
    dialer: Arc<dyn PodDialer>,
    pod: &str,
    ports: &[u16],
    cancel: CancellationToken,
) -> Result<String> {
    ensure!(
        ports.len() == 1,
        WrongPortCountSnafu { count: ports.len() }
    );
    let port = ports[0];
    let (ready_tx, ready_rx) = oneshot::channel();
    tokio::spawn(forward(
        dialer,
        pod.to_string(),
        port,
        cancel.clone(),
        ready_tx,
    ));

    let local = tokio::select! {
        biased;
        _ = cancel.cancelled() => return CancelledSnafu { pod }.fail(),
        ready = ready_rx => ready.map_err(|_| Error::Stopped { pod: pod.to_string() })??,
    };
    info!(
        "Forwarding localhost:{} to port {} of pod '{}'",
        local.port(),
        port,
        pod
    );
    Ok(format!("localhost:{}", local.port()))
}

/// The background half of a tunnel. Reports readiness once, then serves local connections until
/// cancelled.
async fn forward(
    dialer: Arc<dyn PodDialer>,
    pod: String,
    port: u16,
    cancel: CancellationToken,
    ready: oneshot::Sender<Result<SocketAddr>>,
) {
    let setup = async {
        let first = dialer
            .dial(&pod, port)
            .await
            .context(DialSnafu { pod: &pod, port })?;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .context(BindSnafu { pod: &pod })?;
        let local = listener.local_addr().context(BindSnafu { pod: &pod })?;
        Ok::<_, Error>((first, listener, local))
    };
    let (first, listener, local) = tokio::select! {
        _ = cancel.cancelled() => return,
        setup = setup => match setup {
            Ok(setup) => setup,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        },
    };
    if ready.send(Ok(local)).is_err() {
        return;
    }

    let mut first = Some(first);
    loop {
        let (connection, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Unable to accept a connection for pod '{}': {}", pod, e);
                    continue;
                }
            },
        };
        debug!("Accepted {} for pod '{}'", peer, pod);
        let stream = match first.take() {
            Some(stream) => stream,
            None => match dialer.dial(&pod, port).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Unable to forward port {} of pod '{}': {}", port, pod, e);
                    continue;
                }
            },
        };
        tokio::spawn(pipe(connection, stream, cancel.clone()));
    }
    debug!("Stopped forwarding to pod '{}'", pod);
}

async fn pipe(
    mut connection: TcpStream,
    mut stream: Box<dyn PodStream>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        copied = tokio::io::copy_bidirectional(&mut connection, &mut stream) => {
            if let Err(e) = copied {
                debug!("Forwarded connection closed: {}", e);
            }
        }
    }
}
