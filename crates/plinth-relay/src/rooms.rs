//! Client registry, room membership, and store-and-forward queues.
//!
//! All mutation happens under one [`parking_lot::RwLock`] and outbound
//! frames are pushed onto per-connection unbounded channels while the lock
//! is held, so every socket observes room traffic in the order it was
//! relayed.

use crate::protocol::{BridgeEnvelope, ClientInfo, Envelope};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Messages pushed to a connection's writer half.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outbound {
    /// A JSON text frame ready to go on the wire.
    Frame(String),
    /// Heartbeat probe.
    Ping,
    /// The registry gave up on this peer; the writer closes the socket.
    Terminate,
}

struct Client {
    info: ClientInfo,
    tx: mpsc::UnboundedSender<Outbound>,
    /// Cleared by each heartbeat round, set again when the peer answers.
    alive: bool,
}

#[derive(Default)]
struct Room {
    members: HashSet<String>,
    /// Direct rooms are the per-client rooms named by a connection id. They
    /// make one-to-one addressing work but stay out of the stats table.
    direct: bool,
}

struct Queued {
    frame: String,
    deadline: Instant,
}

#[derive(Default)]
struct Inner {
    clients: HashMap<String, Client>,
    rooms: HashMap<String, Room>,
    /// Frames addressed to rooms that had no members at emission time.
    queues: HashMap<String, VecDeque<Queued>>,
}

/// Shared connection and room state for one relay instance.
pub struct Registry {
    queue_ttl: Duration,
    inner: RwLock<Inner>,
}

impl Registry {
    pub(crate) fn new(queue_ttl: Duration) -> Self {
        Self {
            queue_ttl,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers a new connection and returns its identity together with the
    /// receiving half of its outbound channel.
    ///
    /// Every connection is also placed in a direct room named by its own id,
    /// so peers can address it without knowing any shared room name.
    pub(crate) fn connect(&self, source: &str) -> (ClientInfo, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let info = ClientInfo {
            id: Uuid::new_v4().to_string(),
            source: source.to_owned(),
        };

        let mut inner = self.inner.write();
        let mut direct = Room {
            members: HashSet::new(),
            direct: true,
        };
        direct.members.insert(info.id.clone());
        inner.rooms.insert(info.id.clone(), direct);
        inner.clients.insert(
            info.id.clone(),
            Client {
                info: info.clone(),
                tx,
                alive: true,
            },
        );
        (info, rx)
    }

    /// Adds a client to a room and flushes frames queued for it.
    ///
    /// Queued frames that outlived the TTL are dropped, the rest go to the
    /// joining socket in the order they were relayed. Either way the queue is
    /// gone afterwards; a second joiner starts clean.
    pub(crate) fn join(&self, client_id: &str, room: &str) {
        let mut inner = self.inner.write();
        inner
            .rooms
            .entry(room.to_owned())
            .or_default()
            .members
            .insert(client_id.to_owned());

        if let Some(queue) = inner.queues.remove(room) {
            if let Some(client) = inner.clients.get(client_id) {
                let now = Instant::now();
                let (live, expired): (Vec<_>, Vec<_>) =
                    queue.into_iter().partition(|queued| queued.deadline > now);
                if !expired.is_empty() {
                    debug!(room, expired = expired.len(), "dropped expired queued frames");
                }
                for queued in live {
                    let _ = client.tx.send(Outbound::Frame(queued.frame));
                }
            }
        }
    }

    /// Relays an event to each target room.
    ///
    /// The payload is stamped with the room it is delivered to and with the
    /// originating peer under `sender`, then sent to every member of that
    /// room, the sender included if it is one. Rooms without members get the
    /// frame queued instead.
    pub(crate) fn emit(&self, sender_id: &str, event: &str, data: &Value, rooms: &[String]) {
        let mut inner = self.inner.write();
        let sender = match inner.clients.get(sender_id) {
            Some(client) => client.info.clone(),
            None => return,
        };
        let now = Instant::now();

        for room in rooms {
            let mut payload = data.clone();
            if let Value::Object(map) = &mut payload {
                map.insert("room".to_owned(), Value::String(room.clone()));
                map.insert(
                    "sender".to_owned(),
                    serde_json::json!({ "id": sender.id, "source": sender.source }),
                );
            }
            let frame = Envelope::new(event, payload).to_frame();

            let members: Vec<String> = inner
                .rooms
                .get(room)
                .map(|entry| entry.members.iter().cloned().collect())
                .unwrap_or_default();

            if members.is_empty() {
                debug!(room, event, "no members, queueing frame");
                inner.queues.entry(room.clone()).or_default().push_back(Queued {
                    frame,
                    deadline: now + self.queue_ttl,
                });
            } else {
                for member in &members {
                    if let Some(client) = inner.clients.get(member) {
                        let _ = client.tx.send(Outbound::Frame(frame.clone()));
                    }
                }
            }
        }
    }

    /// Sends a raw frame to every connected socket, the sender included.
    pub(crate) fn broadcast(&self, frame: &str) {
        let inner = self.inner.read();
        for client in inner.clients.values() {
            let _ = client.tx.send(Outbound::Frame(frame.to_owned()));
        }
    }

    /// Pushes the membership table to every socket. Direct rooms are
    /// omitted.
    pub(crate) fn announce_stats(&self) {
        let inner = self.inner.read();
        let rooms: BTreeMap<String, usize> = inner
            .rooms
            .iter()
            .filter(|(_, room)| !room.direct)
            .map(|(name, room)| (name.clone(), room.members.len()))
            .collect();
        let frame = Envelope::room_stats(rooms).to_frame();
        for client in inner.clients.values() {
            let _ = client.tx.send(Outbound::Frame(frame.clone()));
        }
    }

    /// Tells a freshly connected peer who else is here, and everyone else
    /// about the new peer. Both go out in the sandbox bridge shape.
    pub(crate) fn announce_connected(&self, client_id: &str) {
        let inner = self.inner.read();
        let Some(joined) = inner.clients.get(client_id) else {
            return;
        };

        let others: Vec<ClientInfo> = inner
            .clients
            .values()
            .filter(|client| client.info.id != client_id)
            .map(|client| client.info.clone())
            .collect();
        let list = BridgeEnvelope::client_list(others, joined.info.source.clone()).to_frame();
        let _ = joined.tx.send(Outbound::Frame(list));

        let connected = BridgeEnvelope::client_connected(joined.info.clone()).to_frame();
        for client in inner
            .clients
            .values()
            .filter(|client| client.info.id != client_id)
        {
            let _ = client.tx.send(Outbound::Frame(connected.clone()));
        }
    }

    /// Announces a departure to the remaining peers.
    pub(crate) fn announce_disconnected(&self, info: &ClientInfo) {
        let inner = self.inner.read();
        let frame = BridgeEnvelope::client_disconnected(info.clone()).to_frame();
        for client in inner.clients.values() {
            let _ = client.tx.send(Outbound::Frame(frame.clone()));
        }
    }

    /// Tells every connection's writer to shut down. Used at relay teardown
    /// so graceful shutdown is not held up by idle sockets.
    pub(crate) fn close_all(&self) {
        let inner = self.inner.read();
        for client in inner.clients.values() {
            let _ = client.tx.send(Outbound::Terminate);
        }
    }

    /// Records a heartbeat answer from a peer.
    pub(crate) fn mark_alive(&self, client_id: &str) {
        if let Some(client) = self.inner.write().clients.get_mut(client_id) {
            client.alive = true;
        }
    }

    /// Runs one heartbeat round and returns how many peers were given up on.
    ///
    /// A peer that never answered the previous round's ping is told to
    /// terminate; everyone else has their flag cleared and is pinged again.
    /// Expired queue entries are dropped on the same pass.
    pub(crate) fn sweep(&self) -> usize {
        let mut inner = self.inner.write();
        let mut dead = 0;
        for client in inner.clients.values_mut() {
            if client.alive {
                client.alive = false;
                let _ = client.tx.send(Outbound::Ping);
            } else {
                dead += 1;
                let _ = client.tx.send(Outbound::Terminate);
            }
        }

        let now = Instant::now();
        inner.queues.retain(|_, queue| {
            queue.retain(|queued| queued.deadline > now);
            !queue.is_empty()
        });
        dead
    }

    /// Drops all state for a connection. Returns its identity when it was
    /// still registered, so the caller can announce the departure once.
    pub(crate) fn disconnect(&self, client_id: &str) -> Option<ClientInfo> {
        let mut inner = self.inner.write();
        let client = inner.clients.remove(client_id)?;
        inner.rooms.retain(|_, room| {
            room.members.remove(client_id);
            !room.members.is_empty()
        });
        Some(client.info)
    }

    /// Number of connected sockets.
    pub fn client_count(&self) -> usize {
        self.inner.read().clients.len()
    }

    /// Number of members currently in a room.
    pub fn room_members(&self, room: &str) -> usize {
        self.inner
            .read()
            .rooms
            .get(room)
            .map_or(0, |entry| entry.members.len())
    }

    /// Number of frames queued for a room.
    pub fn queued(&self, room: &str) -> usize {
        self.inner
            .read()
            .queues
            .get(room)
            .map_or(0, |queue| queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
        drain(rx)
            .into_iter()
            .filter_map(|message| match message {
                Outbound::Frame(frame) => serde_json::from_str(&frame).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_places_client_in_direct_room() {
        let registry = Registry::new(Duration::from_secs(10));
        let (info, _rx) = registry.connect("browser");
        assert_eq!(registry.client_count(), 1);
        assert_eq!(registry.room_members(&info.id), 1);
    }

    #[test]
    fn emit_stamps_room_and_sender() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, mut a_rx) = registry.connect("test");
        let (b, mut b_rx) = registry.connect("browser");
        registry.join(&b.id, "preview");

        registry.emit(
            &a.id,
            "compile_done",
            &json!({ "room": "preview", "ms": 12 }),
            &[String::from("preview")],
        );

        let received = frames(&mut b_rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["event"], "compile_done");
        assert_eq!(received[0]["data"]["room"], "preview");
        assert_eq!(received[0]["data"]["ms"], 12);
        assert_eq!(received[0]["data"]["sender"]["id"], a.id);
        assert_eq!(received[0]["data"]["sender"]["source"], "test");
        // The sender is not in the room, so it hears nothing.
        assert!(frames(&mut a_rx).is_empty());
    }

    #[test]
    fn emit_to_several_rooms_stamps_each_target() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, _a_rx) = registry.connect("test");
        let (b, mut b_rx) = registry.connect("browser");
        let (c, mut c_rx) = registry.connect("sandbox");
        registry.join(&b.id, "r1");
        registry.join(&c.id, "r2");

        registry.emit(
            &a.id,
            "ev",
            &json!({ "room": ["r1", "r2"] }),
            &[String::from("r1"), String::from("r2")],
        );

        assert_eq!(frames(&mut b_rx)[0]["data"]["room"], "r1");
        assert_eq!(frames(&mut c_rx)[0]["data"]["room"], "r2");
    }

    #[test]
    fn sender_receives_its_own_emission_when_in_the_room() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, mut a_rx) = registry.connect("test");
        registry.join(&a.id, "shared");

        registry.emit(&a.id, "ev", &json!({ "room": "shared" }), &[String::from("shared")]);

        assert_eq!(frames(&mut a_rx).len(), 1);
    }

    #[test]
    fn direct_room_allows_addressing_by_client_id() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, _a_rx) = registry.connect("test");
        let (b, mut b_rx) = registry.connect("browser");

        registry.emit(&a.id, "ev", &json!({ "room": b.id }), &[b.id.clone()]);

        let received = frames(&mut b_rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["data"]["room"], b.id);
    }

    #[test]
    fn empty_room_queues_until_join_then_clears() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, _a_rx) = registry.connect("test");

        registry.emit(&a.id, "first", &json!({ "room": "later" }), &[String::from("later")]);
        registry.emit(&a.id, "second", &json!({ "room": "later" }), &[String::from("later")]);
        assert_eq!(registry.queued("later"), 2);

        let (b, mut b_rx) = registry.connect("browser");
        registry.join(&b.id, "later");

        let received = frames(&mut b_rx);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0]["event"], "first");
        assert_eq!(received[1]["event"], "second");
        assert_eq!(registry.queued("later"), 0);

        // A later joiner starts clean.
        let (c, mut c_rx) = registry.connect("sandbox");
        registry.join(&c.id, "later");
        assert!(frames(&mut c_rx).is_empty());
    }

    #[test]
    fn expired_queue_entries_are_not_flushed() {
        let registry = Registry::new(Duration::ZERO);
        let (a, _a_rx) = registry.connect("test");
        registry.emit(&a.id, "stale", &json!({ "room": "later" }), &[String::from("later")]);

        std::thread::sleep(Duration::from_millis(5));
        let (b, mut b_rx) = registry.connect("browser");
        registry.join(&b.id, "later");
        assert!(frames(&mut b_rx).is_empty());
    }

    #[test]
    fn sweep_expires_queues() {
        let registry = Registry::new(Duration::ZERO);
        let (a, mut a_rx) = registry.connect("test");
        registry.emit(&a.id, "stale", &json!({ "room": "later" }), &[String::from("later")]);
        assert_eq!(registry.queued("later"), 1);

        std::thread::sleep(Duration::from_millis(5));
        registry.sweep();
        assert_eq!(registry.queued("later"), 0);
        drain(&mut a_rx);
    }

    #[test]
    fn broadcast_reaches_every_socket_including_sender() {
        let registry = Registry::new(Duration::from_secs(10));
        let (_a, mut a_rx) = registry.connect("test");
        let (_b, mut b_rx) = registry.connect("browser");

        registry.broadcast(r#"{"event":"ev"}"#);

        assert_eq!(frames(&mut a_rx).len(), 1);
        assert_eq!(frames(&mut b_rx).len(), 1);
    }

    #[test]
    fn sweep_pings_responsive_and_terminates_silent_peers() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, mut a_rx) = registry.connect("test");

        assert_eq!(registry.sweep(), 0);
        assert_eq!(drain(&mut a_rx), vec![Outbound::Ping]);

        registry.mark_alive(&a.id);
        assert_eq!(registry.sweep(), 0);
        assert_eq!(drain(&mut a_rx), vec![Outbound::Ping]);

        // No answer this time.
        assert_eq!(registry.sweep(), 1);
        assert_eq!(drain(&mut a_rx), vec![Outbound::Terminate]);
    }

    #[test]
    fn disconnect_drops_membership_and_empty_rooms() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, _a_rx) = registry.connect("test");
        let (b, _b_rx) = registry.connect("browser");
        registry.join(&a.id, "shared");
        registry.join(&b.id, "shared");

        let info = registry.disconnect(&a.id).unwrap();
        assert_eq!(info.id, a.id);
        assert_eq!(registry.client_count(), 1);
        assert_eq!(registry.room_members("shared"), 1);
        assert_eq!(registry.room_members(&a.id), 0);

        registry.disconnect(&b.id).unwrap();
        assert_eq!(registry.room_members("shared"), 0);
        assert!(registry.disconnect(&b.id).is_none());
    }

    #[test]
    fn announce_connected_sends_list_and_notice() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, mut a_rx) = registry.connect("test");
        let (b, mut b_rx) = registry.connect("browser");

        registry.announce_connected(&b.id);

        let to_b = frames(&mut b_rx);
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0]["pluginMessage"]["event"], "client_list");
        assert_eq!(to_b[0]["pluginMessage"]["clients"][0]["id"], a.id);

        let to_a = frames(&mut a_rx);
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_a[0]["pluginMessage"]["event"], "client_connected");
        assert_eq!(to_a[0]["pluginMessage"]["client"]["id"], b.id);
    }

    #[test]
    fn stats_exclude_direct_rooms() {
        let registry = Registry::new(Duration::from_secs(10));
        let (a, mut a_rx) = registry.connect("test");
        registry.join(&a.id, "browser");
        registry.join(&a.id, "browser");

        registry.announce_stats();

        let received = frames(&mut a_rx);
        assert_eq!(received.len(), 1);
        let rooms = received[0]["data"]["rooms"].as_object().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms["browser"], 1);
    }
}
