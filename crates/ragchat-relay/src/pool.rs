//! Relay connection pool.
//!
//! Dials every configured relay once at startup and keeps the sockets for the
//! life of the process. There is no reconnect, retry, or backpressure: a relay
//! whose socket drops is marked dead and excluded from the live count, and the
//! pool errors only once no relay is left.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use ragchat_proto::{ClientMessage, Event, Filter, RelayMessage};

use crate::error::RelayError;

/// Duplicate-suppression cap per subscription. Best-effort: the set is
/// cleared when it grows past this, so a very old duplicate could slip
/// through after that.
const SEEN_CAP: usize = 8192;

/// A message routed to one subscription.
#[derive(Debug)]
enum SubMessage {
    Event(Event),
    EndOfStored { relay_url: String },
}

/// Routing entry for one open subscription.
struct Route {
    tx: mpsc::Sender<SubMessage>,
    seen: HashSet<String>,
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;

/// Write-side handle to one relay.
struct Relay {
    url: String,
    outbound: mpsc::Sender<String>,
    alive: Arc<AtomicBool>,
}

/// A persistent subscription: a stream of deduplicated events.
pub struct Subscription {
    pub id: String,
    rx: mpsc::Receiver<SubMessage>,
}

impl Subscription {
    /// Next event, across all relays. `None` once every relay is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await? {
                SubMessage::Event(event) => return Some(event),
                // Persistent subscriptions outlive stored history.
                SubMessage::EndOfStored { .. } => {}
            }
        }
    }
}

/// Connection pool over a fixed relay set.
pub struct RelayPool {
    relays: Vec<Relay>,
    routes: Routes,
}

impl RelayPool {
    /// Dial every relay. Relays that fail to dial are skipped with a warning;
    /// errors only if none connect.
    pub async fn connect(urls: &[String]) -> Result<Self, RelayError> {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let mut relays = Vec::new();

        for url in urls {
            match connect_async(url.as_str()).await {
                Ok((stream, _response)) => {
                    info!(relay = %url, "Connected");
                    relays.push(spawn_relay_tasks(url.clone(), stream, Arc::clone(&routes)));
                }
                Err(e) => {
                    warn!(relay = %url, error = %e, "Failed to connect, skipping");
                }
            }
        }

        if relays.is_empty() {
            return Err(RelayError::NoRelaysAvailable);
        }
        Ok(Self { relays, routes })
    }

    /// Number of relays whose socket is still up.
    pub fn live_count(&self) -> usize {
        self.relays
            .iter()
            .filter(|r| r.alive.load(Ordering::Relaxed))
            .count()
    }

    /// Send a frame to every live relay. Returns how many accepted it.
    async fn broadcast(&self, frame: &str) -> usize {
        let mut sent = 0;
        for relay in &self.relays {
            if !relay.alive.load(Ordering::Relaxed) {
                continue;
            }
            if relay.outbound.send(frame.to_string()).await.is_ok() {
                sent += 1;
            } else {
                relay.alive.store(false, Ordering::Relaxed);
                warn!(relay = %relay.url, "Writer gone, marking relay dead");
            }
        }
        sent
    }

    /// Publish a signed event to all live relays. `OK` acknowledgements are
    /// logged as they arrive, never awaited.
    pub async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let frame = ClientMessage::Event(event.clone()).to_json()?;
        if self.broadcast(&frame).await == 0 {
            return Err(RelayError::NoRelaysAvailable);
        }
        debug!(event_id = %event.id, kind = event.kind, "Published event");
        Ok(())
    }

    /// Open a persistent subscription on all live relays.
    pub async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription, RelayError> {
        let id = subscription_id();
        let (tx, rx) = mpsc::channel(64);
        self.routes.lock().await.insert(
            id.clone(),
            Route {
                tx,
                seen: HashSet::new(),
            },
        );

        let frame = ClientMessage::Req {
            subscription_id: id.clone(),
            filters,
        }
        .to_json()?;
        if self.broadcast(&frame).await == 0 {
            self.routes.lock().await.remove(&id);
            return Err(RelayError::NoRelaysAvailable);
        }
        debug!(subscription = %id, "Subscribed");
        Ok(Subscription { id, rx })
    }

    /// One-shot point query: collect stored events until every live relay has
    /// reported end-of-stored, then close the subscription.
    pub async fn query(&self, filter: Filter) -> Result<Vec<Event>, RelayError> {
        let id = subscription_id();
        let (tx, mut rx) = mpsc::channel(64);
        self.routes.lock().await.insert(
            id.clone(),
            Route {
                tx,
                seen: HashSet::new(),
            },
        );

        let frame = ClientMessage::Req {
            subscription_id: id.clone(),
            filters: vec![filter],
        }
        .to_json()?;
        if self.broadcast(&frame).await == 0 {
            self.routes.lock().await.remove(&id);
            return Err(RelayError::NoRelaysAvailable);
        }

        let mut events = Vec::new();
        let mut done_relays: HashSet<String> = HashSet::new();
        let mut liveness = tokio::time::interval(Duration::from_secs(1));

        let result = loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(SubMessage::Event(event)) => events.push(event),
                    Some(SubMessage::EndOfStored { relay_url }) => {
                        done_relays.insert(relay_url);
                    }
                    None => break Ok(std::mem::take(&mut events)),
                },
                _ = liveness.tick() => {}
            }
            let live = self.live_count();
            if live == 0 && events.is_empty() {
                break Err(RelayError::NoRelaysAvailable);
            }
            if done_relays.len() >= live {
                break Ok(std::mem::take(&mut events));
            }
        };

        self.routes.lock().await.remove(&id);
        let close = ClientMessage::Close {
            subscription_id: id,
        }
        .to_json()?;
        let _ = self.broadcast(&close).await;
        result
    }
}

/// A fresh random subscription id.
fn subscription_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Spawn the reader and writer tasks for one connected relay.
fn spawn_relay_tasks(
    url: String,
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    routes: Routes,
) -> Relay {
    let (mut sink, mut source) = stream.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(64);
    let alive = Arc::new(AtomicBool::new(true));

    // Writer: forward serialized frames to the socket.
    let writer_alive = Arc::clone(&alive);
    let writer_url = url.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                warn!(relay = %writer_url, error = %e, "Write failed");
                writer_alive.store(false, Ordering::Relaxed);
                break;
            }
        }
    });

    // Reader: parse frames and route them to subscriptions.
    let reader_alive = Arc::clone(&alive);
    let reader_url = url.clone();
    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(raw)) => {
                    route_frame(&routes, &reader_url, &raw).await;
                }
                Ok(Message::Close(_)) => {
                    info!(relay = %reader_url, "Relay closed the connection");
                    break;
                }
                Ok(_) => {} // ping/pong/binary
                Err(e) => {
                    warn!(relay = %reader_url, error = %e, "Read failed");
                    break;
                }
            }
        }
        reader_alive.store(false, Ordering::Relaxed);
    });

    Relay {
        url,
        outbound,
        alive,
    }
}

/// Parse one inbound frame and deliver it to the owning subscription.
///
/// Events are verified before delivery — relays are untrusted — and
/// deduplicated by id across relays.
async fn route_frame(routes: &Mutex<HashMap<String, Route>>, relay_url: &str, raw: &str) {
    let message = match RelayMessage::from_json(raw) {
        Ok(message) => message,
        Err(e) => {
            debug!(relay = %relay_url, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match message {
        RelayMessage::Event {
            subscription_id,
            event,
        } => {
            if let Err(e) = event.verify() {
                warn!(relay = %relay_url, event_id = %event.id, error = %e, "Dropping unverifiable event");
                return;
            }
            let mut routes = routes.lock().await;
            let Some(route) = routes.get_mut(&subscription_id) else {
                trace!(subscription = %subscription_id, "Event for unknown subscription");
                return;
            };
            if route.seen.len() > SEEN_CAP {
                route.seen.clear();
            }
            if !route.seen.insert(event.id.clone()) {
                return; // already delivered via another relay
            }
            let tx = route.tx.clone();
            drop(routes);
            let _ = tx.send(SubMessage::Event(event)).await;
        }
        RelayMessage::EndOfStored { subscription_id } => {
            let routes = routes.lock().await;
            if let Some(route) = routes.get(&subscription_id) {
                let tx = route.tx.clone();
                drop(routes);
                let _ = tx
                    .send(SubMessage::EndOfStored {
                        relay_url: relay_url.to_string(),
                    })
                    .await;
            }
        }
        RelayMessage::Ok {
            event_id,
            accepted,
            message,
        } => {
            debug!(relay = %relay_url, event_id = %event_id, accepted, %message, "Publish acknowledged");
        }
        RelayMessage::Notice(notice) => {
            debug!(relay = %relay_url, %notice, "Relay notice");
        }
        RelayMessage::Closed {
            subscription_id,
            message,
        } => {
            warn!(relay = %relay_url, subscription = %subscription_id, %message, "Subscription closed by relay");
        }
        RelayMessage::Unknown { frame_type } => {
            trace!(relay = %relay_url, %frame_type, "Ignoring unknown frame");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use ragchat_proto::{EventTemplate, Keys};

    fn event_frame(sub_id: &str, event: &Event) -> String {
        serde_json::json!(["EVENT", sub_id, event]).to_string()
    }

    async fn routes_with_sub(sub_id: &str) -> (Routes, mpsc::Receiver<SubMessage>) {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(8);
        routes.lock().await.insert(
            sub_id.to_string(),
            Route {
                tx,
                seen: HashSet::new(),
            },
        );
        (routes, rx)
    }

    fn signed_event() -> Event {
        let keys = Keys::generate();
        EventTemplate::new(7000, vec![vec!["status".into(), "log".into()]], "hello")
            .sign(&keys)
            .unwrap()
    }

    #[tokio::test]
    async fn routes_event_to_matching_subscription() {
        let (routes, mut rx) = routes_with_sub("sub-1").await;
        let event = signed_event();
        route_frame(&routes, "wss://r1", &event_frame("sub-1", &event)).await;

        match rx.try_recv().unwrap() {
            SubMessage::Event(received) => assert_eq!(received, event),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deduplicates_across_relays() {
        let (routes, mut rx) = routes_with_sub("sub-1").await;
        let event = signed_event();
        route_frame(&routes, "wss://r1", &event_frame("sub-1", &event)).await;
        route_frame(&routes, "wss://r2", &event_frame("sub-1", &event)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drops_event_for_unknown_subscription() {
        let (routes, mut rx) = routes_with_sub("sub-1").await;
        let event = signed_event();
        route_frame(&routes, "wss://r1", &event_frame("other", &event)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drops_unverifiable_event() {
        let (routes, mut rx) = routes_with_sub("sub-1").await;
        let mut event = signed_event();
        event.content = "forged".into();
        route_frame(&routes, "wss://r1", &event_frame("sub-1", &event)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn routes_eose_with_relay_url() {
        let (routes, mut rx) = routes_with_sub("sub-1").await;
        route_frame(&routes, "wss://r1", r#"["EOSE","sub-1"]"#).await;
        match rx.try_recv().unwrap() {
            SubMessage::EndOfStored { relay_url } => assert_eq!(relay_url, "wss://r1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tolerates_notices_and_garbage() {
        let (routes, mut rx) = routes_with_sub("sub-1").await;
        route_frame(&routes, "wss://r1", r#"["NOTICE","slow down"]"#).await;
        route_frame(&routes, "wss://r1", "not json at all").await;
        route_frame(&routes, "wss://r1", r#"["OK","abc",true,""]"#).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscription_recv_skips_eose() {
        let (tx, rx) = mpsc::channel(8);
        let mut sub = Subscription {
            id: "sub-1".into(),
            rx,
        };
        let event = signed_event();
        tx.send(SubMessage::EndOfStored {
            relay_url: "wss://r1".into(),
        })
        .await
        .unwrap();
        tx.send(SubMessage::Event(event.clone())).await.unwrap();

        assert_eq!(sub.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn subscription_recv_ends_when_senders_drop() {
        let (tx, rx) = mpsc::channel::<SubMessage>(8);
        let mut sub = Subscription {
            id: "sub-1".into(),
            rx,
        };
        drop(tx);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn subscription_ids_are_distinct() {
        assert_ne!(subscription_id(), subscription_id());
    }
}
