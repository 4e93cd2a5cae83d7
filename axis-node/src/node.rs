//! UDP host for [`AxisCore`]: owns the socket, runs the receive loop and executes outbound actions.

use std::sync::Arc;
use std::time::Duration;

use axis_core::{AxisCore, Endpoint, Inbound, OutboundAction, Payload, ToDescriptor};
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::NodeError;
use crate::event::{EventSender, Events, NodeEvent};
use crate::resolve::{resolve, resolve_all};

const RECV_BUF_LEN: usize = 65536;
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Core and socket behind one lock, so the closed check and the registry change it
/// guards cannot interleave with `close`.
struct Shared {
    core: AxisCore,
    /// `None` once closed.
    socket: Option<Arc<UdpSocket>>,
}

impl Shared {
    fn socket(&self) -> Result<Arc<UdpSocket>, NodeError> {
        self.socket.clone().ok_or(NodeError::NodeClosed)
    }
}

struct RecvTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// A bound mesh participant.
///
/// Connect, disconnect and send are fire-and-forget: they return once the datagrams
/// are handed to the socket. Transport failures are logged and otherwise ignored.
/// Dropping a node without [`close`](Node::close) stops receiving but notifies no peer.
pub struct Node {
    local: Endpoint,
    shared: Arc<Mutex<Shared>>,
    recv_task: Mutex<Option<RecvTask>>,
}

impl Node {
    /// Resolve `descriptor`, bind a UDP socket to it and start receiving.
    ///
    /// The returned [`Events`] queue is unbounded: if the application stops reading it,
    /// inbound events accumulate in memory. Use [`bind_bounded`](Node::bind_bounded) to
    /// cap the queue instead.
    pub async fn bind<D: ToDescriptor + ?Sized>(descriptor: &D) -> Result<(Self, Events), NodeError> {
        let (tx, events) = Events::unbounded();
        Ok((Self::start(descriptor, tx).await?, events))
    }

    /// Like [`bind`](Node::bind), but at most `capacity` events are queued. Events that
    /// arrive while the queue is full are dropped; the registry is still updated.
    pub async fn bind_bounded<D: ToDescriptor + ?Sized>(
        descriptor: &D,
        capacity: usize,
    ) -> Result<(Self, Events), NodeError> {
        let (tx, events) = Events::bounded(capacity);
        Ok((Self::start(descriptor, tx).await?, events))
    }

    async fn start<D: ToDescriptor + ?Sized>(
        descriptor: &D,
        events: EventSender,
    ) -> Result<Self, NodeError> {
        let requested = resolve(descriptor).await?;
        let socket = UdpSocket::bind(requested.socket_addr())
            .await
            .map_err(|source| NodeError::Bind {
                endpoint: requested,
                source,
            })?;
        let local = Endpoint::from(socket.local_addr()?);
        let socket = Arc::new(socket);
        let shared = Arc::new(Mutex::new(Shared {
            core: AxisCore::new(local),
            socket: Some(socket.clone()),
        }));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(recv_loop(socket, shared.clone(), events, shutdown_rx));
        info!(%local, "node bound");

        Ok(Self {
            local,
            shared,
            recv_task: Mutex::new(Some(RecvTask {
                shutdown: shutdown_tx,
                handle,
            })),
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    /// Snapshot of the registry, in insertion order.
    pub async fn peers(&self) -> Vec<Endpoint> {
        self.shared.lock().await.core.registry().peers().to_vec()
    }

    pub async fn is_closed(&self) -> bool {
        self.shared.lock().await.socket.is_none()
    }

    /// Send CONNECT to each endpoint and register it without waiting for a reply.
    /// Every descriptor is resolved before anything is sent.
    pub async fn connect<I, D>(&self, descriptors: I) -> Result<&Self, NodeError>
    where
        I: IntoIterator<Item = D>,
        D: ToDescriptor,
    {
        self.ensure_open().await?;
        let endpoints = resolve_all(descriptors).await?;
        let mut shared = self.open().await?;
        let socket = shared.socket()?;
        let actions = shared.core.connect(&endpoints);
        for ep in &endpoints {
            debug!(local = %self.local, peer = %ep, "connect");
        }
        transmit(&socket, actions).await;
        Ok(self)
    }

    /// Send DISCONNECT to each endpoint and remove it from the registry.
    pub async fn disconnect<I, D>(&self, descriptors: I) -> Result<&Self, NodeError>
    where
        I: IntoIterator<Item = D>,
        D: ToDescriptor,
    {
        self.ensure_open().await?;
        let endpoints = resolve_all(descriptors).await?;
        let mut shared = self.open().await?;
        let socket = shared.socket()?;
        let actions = shared.core.disconnect(&endpoints);
        for ep in &endpoints {
            debug!(local = %self.local, peer = %ep, "disconnect");
        }
        transmit(&socket, actions).await;
        Ok(self)
    }

    /// Broadcast `payload` to every registered peer.
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<(), NodeError> {
        let shared = self.open().await?;
        let socket = shared.socket()?;
        let actions = shared.core.send(&payload.into(), None)?;
        transmit(&socket, actions).await;
        Ok(())
    }

    /// Send `payload` to a single endpoint, registered or not. The registry is not touched.
    pub async fn send_to<D: ToDescriptor + ?Sized>(
        &self,
        payload: impl Into<Payload>,
        target: &D,
    ) -> Result<(), NodeError> {
        self.ensure_open().await?;
        let target = resolve(target).await?;
        let shared = self.open().await?;
        let socket = shared.socket()?;
        let actions = shared.core.send(&payload.into(), Some(target))?;
        transmit(&socket, actions).await;
        Ok(())
    }

    /// Send DISCONNECT to every registered peer, stop receiving and release the socket.
    /// Later operations fail with [`NodeError::NodeClosed`]. Closing twice is a no-op.
    pub async fn close(&self) {
        {
            let mut shared = self.shared.lock().await;
            let Some(socket) = shared.socket.take() else {
                return;
            };
            let actions = shared.core.close();
            transmit(&socket, actions).await;
        }
        if let Some(task) = self.recv_task.lock().await.take() {
            let _ = task.shutdown.send(());
            let _ = task.handle.await;
        }
        info!(local = %self.local, "node closed");
    }

    /// Lock the shared state, failing if the node is closed. Datagrams are sent while
    /// the guard is held, so `close` cannot slip in between.
    async fn open(&self) -> Result<MutexGuard<'_, Shared>, NodeError> {
        let shared = self.shared.lock().await;
        if shared.socket.is_none() {
            return Err(NodeError::NodeClosed);
        }
        Ok(shared)
    }

    /// Closed check before descriptor lookup, which runs without the lock.
    async fn ensure_open(&self) -> Result<(), NodeError> {
        self.open().await.map(drop)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.get_mut().take() {
            task.handle.abort();
        }
    }
}

async fn transmit(socket: &UdpSocket, actions: Vec<OutboundAction>) {
    for OutboundAction::SendDatagram(to, bytes) in actions {
        match socket.send_to(&bytes, to.socket_addr()).await {
            Ok(n) => trace!(%to, len = n, "datagram sent"),
            Err(e) => debug!(%to, "send failed: {e}"),
        }
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    shared: Arc<Mutex<Shared>>,
    events: EventSender,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; RECV_BUF_LEN];
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            result = socket.recv_from(&mut buf) => {
                let (n, from) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        // ICMP unreachable from an earlier send can surface here; keep going.
                        debug!("recv error: {e}");
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                let from = Endpoint::from(from);
                trace!(%from, len = n, "datagram received");
                let inbound = {
                    let mut shared = shared.lock().await;
                    if shared.socket.is_none() {
                        break;
                    }
                    shared.core.on_datagram(from, &buf[..n])
                };
                let event = match inbound {
                    Ok(Some(Inbound::Message(payload))) => NodeEvent::Message { payload, from },
                    Ok(Some(Inbound::PeerJoined(peer))) => {
                        debug!(%peer, "peer joined");
                        NodeEvent::PeerJoined(peer)
                    }
                    Ok(Some(Inbound::PeerLeft(peer))) => {
                        debug!(%peer, "peer left");
                        NodeEvent::PeerLeft(peer)
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(%from, "dropping malformed datagram: {e}");
                        NodeEvent::Malformed {
                            from,
                            error: NodeError::MalformedPayload(e),
                        }
                    }
                };
                events.deliver(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::future::Future;

    const WAIT: Duration = Duration::from_secs(5);

    async fn node() -> (Node, Events) {
        Node::bind("127.0.0.1:0").await.unwrap()
    }

    async fn within<F: Future>(f: F) -> F::Output {
        tokio::time::timeout(WAIT, f).await.expect("timed out")
    }

    async fn next_message(events: &mut Events) -> (Payload, Endpoint) {
        within(events.next_message()).await.expect("event stream ended")
    }

    async fn wait_joined(events: &mut Events, peer: Endpoint) {
        within(async {
            loop {
                match events.recv().await {
                    Some(NodeEvent::PeerJoined(p)) if p == peer => return,
                    Some(_) => {}
                    None => panic!("event stream ended"),
                }
            }
        })
        .await
    }

    async fn wait_left(events: &mut Events, peer: Endpoint) {
        within(async {
            loop {
                match events.recv().await {
                    Some(NodeEvent::PeerLeft(p)) if p == peer => return,
                    Some(_) => {}
                    None => panic!("event stream ended"),
                }
            }
        })
        .await
    }

    #[tokio::test]
    async fn broadcast_reaches_all_peers() {
        let (luke, _luke_events) = node().await;
        let (darth, mut darth_events) = node().await;
        let (han, mut han_events) = node().await;

        luke.connect([darth.local_endpoint(), han.local_endpoint()])
            .await
            .unwrap();
        luke.send("Darth is my father.").await.unwrap();

        for events in [&mut darth_events, &mut han_events] {
            let (payload, from) = next_message(events).await;
            assert_eq!(payload, Payload::from("Darth is my father."));
            assert_eq!(from, luke.local_endpoint());
        }
    }

    #[tokio::test]
    async fn unicast_reaches_only_target() {
        let (luke, _luke_events) = node().await;
        let (darth, mut darth_events) = node().await;
        let (han, mut han_events) = node().await;

        luke.connect([darth.local_endpoint(), han.local_endpoint()])
            .await
            .unwrap();
        luke.send_to("for darth only", &darth.local_endpoint())
            .await
            .unwrap();
        luke.send_to("marker", &han.local_endpoint()).await.unwrap();

        assert_eq!(next_message(&mut darth_events).await.0, Payload::from("for darth only"));
        // Han's first message is the marker sent after the unicast.
        assert_eq!(next_message(&mut han_events).await.0, Payload::from("marker"));
        assert_eq!(
            luke.peers().await,
            vec![darth.local_endpoint(), han.local_endpoint()]
        );
    }

    #[tokio::test]
    async fn sends_objects() {
        let (luke, mut luke_events) = node().await;
        let (darth, _darth_events) = node().await;

        darth.connect([luke.local_endpoint()]).await.unwrap();
        darth
            .send(json!({"darth": "Luke, I am your father."}))
            .await
            .unwrap();

        let (payload, from) = next_message(&mut luke_events).await;
        assert_eq!(payload, Payload::Object(json!({"darth": "Luke, I am your father."})));
        assert_eq!(from, darth.local_endpoint());
    }

    #[tokio::test]
    async fn sends_strings() {
        let (luke, mut luke_events) = node().await;
        let (han, _han_events) = node().await;

        han.connect([luke.local_endpoint()]).await.unwrap();
        han.send("Great, kid. Dont get cocky.").await.unwrap();

        let (payload, _) = next_message(&mut luke_events).await;
        assert_eq!(payload.as_text(), Some("Great, kid. Dont get cocky."));
    }

    #[tokio::test]
    async fn sends_buffers() {
        let (luke, mut luke_events) = node().await;
        let (han, _han_events) = node().await;

        han.connect([luke.local_endpoint()]).await.unwrap();
        han.send(b"YAHOOO!".to_vec()).await.unwrap();

        let (payload, _) = next_message(&mut luke_events).await;
        assert_eq!(payload, Payload::Binary(b"YAHOOO!".to_vec()));
    }

    #[tokio::test]
    async fn inbound_control_updates_registry_by_source_address() {
        let (a, _a_events) = node().await;
        let (b, mut b_events) = node().await;

        a.connect([b.local_endpoint()]).await.unwrap();
        wait_joined(&mut b_events, a.local_endpoint()).await;
        assert_eq!(b.peers().await, vec![a.local_endpoint()]);

        // Second CONNECT from the same source changes nothing.
        a.connect([b.local_endpoint()]).await.unwrap();
        a.send_to("sync", &b.local_endpoint()).await.unwrap();
        next_message(&mut b_events).await;
        assert_eq!(b.peers().await, vec![a.local_endpoint()]);

        a.disconnect([b.local_endpoint()]).await.unwrap();
        wait_left(&mut b_events, a.local_endpoint()).await;
        assert!(b.peers().await.is_empty());
        assert!(a.peers().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_datagram_does_not_stop_node() {
        let (a, mut a_events) = node().await;
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let raw_addr = Endpoint::from(raw.local_addr().unwrap());

        raw.send_to(&[4, b'{', b'x'], a.local_endpoint().socket_addr())
            .await
            .unwrap();
        raw.send_to(&[99], a.local_endpoint().socket_addr())
            .await
            .unwrap();
        let frame = axis_core::encode_frame(&Payload::from("still here")).unwrap();
        raw.send_to(&frame, a.local_endpoint().socket_addr())
            .await
            .unwrap();

        let mut malformed = 0;
        loop {
            match within(a_events.recv()).await.expect("event stream ended") {
                NodeEvent::Malformed { from, error } => {
                    assert_eq!(from, raw_addr);
                    assert!(matches!(error, NodeError::MalformedPayload(_)));
                    malformed += 1;
                }
                NodeEvent::Message { payload, from } => {
                    assert_eq!(payload, Payload::from("still here"));
                    assert_eq!(from, raw_addr);
                    break;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(malformed, 2);
        assert!(a.peers().await.is_empty());
    }

    #[tokio::test]
    async fn close_notifies_every_peer() {
        let (a, _a_events) = node().await;
        let (b, mut b_events) = node().await;
        let (c, mut c_events) = node().await;

        a.connect([b.local_endpoint(), c.local_endpoint()])
            .await
            .unwrap();
        wait_joined(&mut b_events, a.local_endpoint()).await;
        wait_joined(&mut c_events, a.local_endpoint()).await;

        a.close().await;
        wait_left(&mut b_events, a.local_endpoint()).await;
        wait_left(&mut c_events, a.local_endpoint()).await;
        assert!(b.peers().await.is_empty());
        assert!(c.peers().await.is_empty());
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let (a, mut a_events) = node().await;
        a.close().await;
        assert!(a.is_closed().await);

        assert!(matches!(a.send("late").await, Err(NodeError::NodeClosed)));
        assert!(matches!(
            a.send_to("late", &4001u16).await,
            Err(NodeError::NodeClosed)
        ));
        assert!(matches!(a.connect([4001u16]).await, Err(NodeError::NodeClosed)));
        assert!(matches!(
            a.disconnect([4001u16]).await,
            Err(NodeError::NodeClosed)
        ));
        // Second close is a no-op and the event stream has ended.
        a.close().await;
        assert!(within(a_events.recv()).await.is_none());
    }

    #[tokio::test]
    async fn close_releases_the_socket() {
        let (a, _a_events) = node().await;
        let local = a.local_endpoint();
        a.close().await;
        let (again, _events) = Node::bind(&local).await.unwrap();
        assert_eq!(again.local_endpoint(), local);
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let (a, _a_events) = node().await;
        let err = Node::bind(&a.local_endpoint()).await.err().unwrap();
        assert!(matches!(err, NodeError::Bind { endpoint, .. } if endpoint == a.local_endpoint()));
    }

    #[tokio::test]
    async fn malformed_descriptors_have_no_side_effects() {
        let (a, _a_events) = node().await;
        assert!(matches!(
            Node::bind("localhost:http").await,
            Err(NodeError::MalformedEndpoint(_))
        ));
        assert!(matches!(
            a.connect(["127.0.0.1:4001", "nope"]).await,
            Err(NodeError::MalformedEndpoint(_))
        ));
        assert!(a.peers().await.is_empty());
        assert!(matches!(
            a.send_to("x", "").await,
            Err(NodeError::MalformedEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn send_to_unreachable_peer_succeeds_locally() {
        let (a, _a_events) = node().await;
        let (b, _b_events) = node().await;
        let gone = b.local_endpoint();
        b.close().await;
        a.connect([gone]).await.unwrap();
        a.send("anyone home?").await.unwrap();
        a.send_to("hello?", &gone).await.unwrap();
    }

    #[tokio::test]
    async fn oversized_payload_is_encode_error() {
        let (a, _a_events) = node().await;
        let (b, _b_events) = node().await;
        a.connect([b.local_endpoint()]).await.unwrap();
        let big = vec![0u8; axis_core::wire::MAX_DATAGRAM_LEN];
        assert!(matches!(a.send(big).await, Err(NodeError::Encode(_))));
    }

    #[tokio::test]
    async fn connect_chains() {
        let (a, _a_events) = node().await;
        let (b, _b_events) = node().await;
        let (c, _c_events) = node().await;
        a.connect([b.local_endpoint()])
            .await
            .unwrap()
            .connect([c.local_endpoint()])
            .await
            .unwrap();
        assert_eq!(a.peers().await, vec![b.local_endpoint(), c.local_endpoint()]);
    }

    #[tokio::test]
    async fn connect_by_host_name() {
        let (a, _a_events) = node().await;
        let (b, mut b_events) = node().await;
        let named = axis_core::Descriptor::Host {
            host: "localhost".into(),
            port: b.local_endpoint().port(),
        };
        a.connect([named]).await.unwrap();
        wait_joined(&mut b_events, a.local_endpoint()).await;
        assert_eq!(a.peers().await, vec![b.local_endpoint()]);
    }

    #[tokio::test]
    async fn unresolvable_host_registers_nothing() {
        let (a, _a_events) = node().await;
        assert!(matches!(
            a.connect(["4001", "no-such-host.invalid:4002"]).await,
            Err(NodeError::MalformedEndpoint(
                axis_core::EndpointError::Unresolvable(_)
            ))
        ));
        assert!(a.peers().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_racing_connect_leaves_no_peers() {
        for _ in 0..200 {
            let (a, _a_events) = node().await;
            let a = Arc::new(a);
            let mut tasks = Vec::new();
            for i in 0..8u16 {
                let a = a.clone();
                tasks.push(tokio::spawn(async move {
                    a.connect([20000 + i]).await.map(|_| ())
                }));
            }
            let closer = {
                let a = a.clone();
                tokio::spawn(async move { a.close().await })
            };
            for task in tasks {
                match task.await.unwrap() {
                    Ok(()) | Err(NodeError::NodeClosed) => {}
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
            closer.await.unwrap();
            assert!(a.is_closed().await);
            assert!(a.peers().await.is_empty());
        }
    }

    #[tokio::test]
    async fn bounded_events_drop_overflow_but_registry_updates() {
        let (a, _a_events) = node().await;
        let (c, _c_events) = node().await;
        let (b, mut b_events) = Node::bind_bounded("127.0.0.1:0", 1).await.unwrap();

        a.connect([b.local_endpoint()]).await.unwrap();
        for n in 0..3 {
            a.send(format!("overflow {n}")).await.unwrap();
        }
        a.disconnect([b.local_endpoint()]).await.unwrap();
        // Sent after everything from a, so seeing c alone means a's datagrams were handled.
        c.connect([b.local_endpoint()]).await.unwrap();

        within(async {
            while b.peers().await != vec![c.local_endpoint()] {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(matches!(
            b_events.try_recv(),
            Some(NodeEvent::PeerJoined(p)) if p == a.local_endpoint()
        ));
        assert!(b_events.try_recv().is_none());
    }
}
