//! Connection hub.
//!
//! The hub owns the live connections, the player to room mapping and the room directory.
//! Inbound work lands on one of four bounded queues (registration, membership, gameplay
//! actions, room broadcasts), each drained by a single worker task. Workers never await a
//! room: requests are pushed into the room mailbox in queue order and the reply is awaited by
//! a short-lived task, so a slow wallet in one room cannot hold up any other room.

use fishhunt_execution::room::{
    self, Actor, FireRequest, Fired, JoinOutcome, Mailbox, Pending, PlayerSeed, RoomEvent,
    RoomReport,
};
use fishhunt_execution::{Engine, InventoryRepository, Wallet};
use fishhunt_types::{
    now_millis, BulletId, Cannon, ClientMessage, ErrorKind, FishId, GameError, HitResult,
    PlayerId, RoomId, ServerMessage, Tier, TierCatalog, TierConfig, WalletId,
};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

mod stats;
pub use stats::{HubStats, HubStatsSnapshot};


pub type ConnectionId = u64;

/// Configuration for the [Hub].
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of each of the registration, membership and action queues.
    pub message_queue_size: usize,

    /// Capacity of the queue carrying room broadcasts.
    pub broadcast_buffer: usize,

    /// Rooms that may exist at once, bootstrap rooms included.
    pub max_rooms: usize,

    /// Permanent rooms opened per tier at startup.
    pub bootstrap_rooms_per_tier: usize,

    pub room_mailbox_size: usize,
    pub tick_interval: Duration,
    pub snapshot_interval: Duration,

    /// Empty time after which a room opened on demand closes.
    pub room_idle_timeout: Duration,

    pub min_join_balance: i64,

    /// How often counters are logged.
    pub stats_interval: Duration,

    pub catalog: TierCatalog,
}

/// Who is behind a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub player_id: PlayerId,
    pub wallet_id: WalletId,
    pub name: String,
}

struct Connection {
    identity: Identity,
    outbound: mpsc::Sender<ServerMessage>,
}

struct RoomEntry {
    tier: Tier,
    mailbox: Mailbox,
}

#[derive(Default)]
struct Directory {
    connections: HashMap<ConnectionId, Connection>,
    /// Live connection of each player.
    players: HashMap<PlayerId, ConnectionId>,
    /// Room each player is seated in, or has a join in flight for.
    memberships: HashMap<PlayerId, RoomId>,
    rooms: BTreeMap<RoomId, RoomEntry>,
}

impl Directory {
    fn occupancy(&self, room_id: &str) -> usize {
        self.memberships
            .values()
            .filter(|member_of| member_of.as_str() == room_id)
            .count()
    }

    /// First room of `tier` with a free seat.
    fn open_room(&self, tier: Tier, max_players: usize) -> Option<RoomId> {
        self.rooms
            .iter()
            .filter(|(_, entry)| entry.tier == tier && !entry.mailbox.is_closed())
            .find(|(room_id, _)| self.occupancy(room_id) < max_players)
            .map(|(room_id, _)| room_id.clone())
    }

    fn room_of(&self, player_id: PlayerId) -> Result<(RoomId, Mailbox), GameError> {
        self.memberships
            .get(&player_id)
            .and_then(|room_id| {
                self.rooms
                    .get(room_id)
                    .map(|entry| (room_id.clone(), entry.mailbox.clone()))
            })
            .ok_or(GameError::PlayerNotInRoom(player_id))
    }
}

enum Registration {
    Register {
        connection_id: ConnectionId,
        identity: Identity,
        outbound: mpsc::Sender<ServerMessage>,
        done: oneshot::Sender<Result<(), GameError>>,
    },
    Unregister {
        connection_id: ConnectionId,
    },
}

enum Membership {
    Join {
        connection_id: ConnectionId,
        request_id: Option<String>,
        room_id: Option<RoomId>,
        tier: Option<Tier>,
    },
    Leave {
        connection_id: ConnectionId,
        request_id: Option<String>,
    },
}

enum Action {
    Fire {
        connection_id: ConnectionId,
        request_id: Option<String>,
        request: FireRequest,
    },
    Hit {
        connection_id: ConnectionId,
        request_id: Option<String>,
        bullet_id: BulletId,
        fish_id: FishId,
    },
    SwitchCannon {
        connection_id: ConnectionId,
        request_id: Option<String>,
        kind: Option<u32>,
        level: u32,
    },
    RoomList {
        connection_id: ConnectionId,
        request_id: Option<String>,
        tier: Option<Tier>,
    },
    PlayerInfo {
        connection_id: ConnectionId,
        request_id: Option<String>,
    },
}

struct Inner<W: Wallet, R: InventoryRepository> {
    config: Config,
    engine: Engine<W, R>,
    stats: HubStats,
    directory: RwLock<Directory>,
    next_connection: AtomicU64,
    next_room: AtomicU64,
    registration: mpsc::Sender<Registration>,
    membership: mpsc::Sender<Membership>,
    actions: mpsc::Sender<Action>,
    events: mpsc::Sender<RoomEvent>,
}

/// Handle to the hub. Cloning is cheap.
pub struct Hub<W: Wallet, R: InventoryRepository> {
    inner: Arc<Inner<W, R>>,
}

impl<W: Wallet, R: InventoryRepository> Clone for Hub<W, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Build the client-facing error for a failed request.
pub fn error_response(request_id: Option<String>, err: &GameError) -> ServerMessage {
    match err.kind() {
        ErrorKind::Internal => error!(?err, "request failed"),
        _ => debug!(code = err.code(), %err, "request rejected"),
    }
    ServerMessage::error(request_id, err.code(), err.to_string())
}

async fn settle<T>(pending: Result<Pending<T>, GameError>) -> Result<T, GameError> {
    pending?.await
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

impl<W: Wallet, R: InventoryRepository> Hub<W, R> {
    /// Spawn the hub workers and return a handle.
    pub fn start(engine: Engine<W, R>, config: Config) -> Self {
        let (registration, registration_queue) = mpsc::channel(config.message_queue_size);
        let (membership, membership_queue) = mpsc::channel(config.message_queue_size);
        let (actions, action_queue) = mpsc::channel(config.message_queue_size);
        let (events, event_queue) = mpsc::channel(config.broadcast_buffer);
        let inner = Arc::new(Inner {
            config,
            engine,
            stats: HubStats::default(),
            directory: RwLock::new(Directory::default()),
            next_connection: AtomicU64::new(1),
            next_room: AtomicU64::new(1),
            registration,
            membership,
            actions,
            events,
        });
        tokio::spawn(inner.clone().run_registration(registration_queue));
        tokio::spawn(inner.clone().run_membership(membership_queue));
        tokio::spawn(inner.clone().run_actions(action_queue));
        tokio::spawn(inner.clone().run_broadcast(event_queue));
        tokio::spawn(inner.clone().run_stats());
        Self { inner }
    }

    /// Open the permanent rooms for every tier.
    pub fn bootstrap(&self) -> Result<Vec<RoomId>, GameError> {
        let mut created = Vec::new();
        let mut directory = self.inner.directory_mut();
        for tier in Tier::ALL {
            for _ in 0..self.inner.config.bootstrap_rooms_per_tier {
                created.push(self.inner.create_room(&mut directory, tier, false)?);
            }
        }
        Ok(created)
    }

    /// Attach a connection. On success the connection has already been sent its `welcome`.
    pub async fn register(
        &self,
        identity: Identity,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionId, GameError> {
        let connection_id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let (done, registered) = oneshot::channel();
        self.inner.enqueue(
            &self.inner.registration,
            "registration",
            Registration::Register {
                connection_id,
                identity,
                outbound,
                done,
            },
        )?;
        registered
            .await
            .map_err(|_| GameError::Internal("registration worker stopped".to_string()))??;
        Ok(connection_id)
    }

    /// Detach a connection and leave its room. Waits for queue space.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        let request = Registration::Unregister { connection_id };
        if self.inner.registration.send(request).await.is_err() {
            warn!(connection_id, "registration worker stopped; unregister lost");
        }
    }

    /// Route a parsed client message. Replies arrive on the connection's outbound channel.
    pub fn dispatch(&self, connection_id: ConnectionId, message: ClientMessage) {
        let inner = &self.inner;
        inner.stats.message();
        let reply_id = message.request_id().map(str::to_string);
        let kind = message.kind();
        let queued = match message {
            ClientMessage::JoinRoom {
                request_id,
                room_id,
                tier,
            } => inner.enqueue(
                &inner.membership,
                "membership",
                Membership::Join {
                    connection_id,
                    request_id,
                    room_id,
                    tier,
                },
            ),
            ClientMessage::LeaveRoom { request_id } => inner.enqueue(
                &inner.membership,
                "membership",
                Membership::Leave {
                    connection_id,
                    request_id,
                },
            ),
            ClientMessage::FireBullet {
                request_id,
                angle,
                power,
                origin,
            } => inner.enqueue(
                &inner.actions,
                "action",
                Action::Fire {
                    connection_id,
                    request_id,
                    request: FireRequest {
                        angle,
                        power,
                        origin,
                    },
                },
            ),
            ClientMessage::HitFish {
                request_id,
                bullet_id,
                fish_id,
            } => inner.enqueue(
                &inner.actions,
                "action",
                Action::Hit {
                    connection_id,
                    request_id,
                    bullet_id,
                    fish_id,
                },
            ),
            ClientMessage::SwitchCannon {
                request_id,
                cannon_type,
                level,
            } => inner.enqueue(
                &inner.actions,
                "action",
                Action::SwitchCannon {
                    connection_id,
                    request_id,
                    kind: cannon_type,
                    level,
                },
            ),
            ClientMessage::GetRoomList { request_id, tier } => inner.enqueue(
                &inner.actions,
                "action",
                Action::RoomList {
                    connection_id,
                    request_id,
                    tier,
                },
            ),
            ClientMessage::GetPlayerInfo { request_id } => inner.enqueue(
                &inner.actions,
                "action",
                Action::PlayerInfo {
                    connection_id,
                    request_id,
                },
            ),
            ClientMessage::Heartbeat { request_id } => {
                inner.deliver(
                    connection_id,
                    ServerMessage::Heartbeat {
                        request_id,
                        server_time: now_millis(),
                    },
                );
                Ok(())
            }
        };
        if let Err(err) = queued {
            warn!(connection_id, kind, %err, "message dropped");
            inner.deliver(connection_id, error_response(reply_id, &err));
        }
    }

    /// Reply to one connection outside of any request.
    pub fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) {
        self.inner.deliver(connection_id, message);
    }

    pub fn stats(&self) -> HubStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Close every room and collect their reports.
    pub async fn shutdown(&self, reason: &str) -> Vec<RoomReport> {
        let mailboxes: Vec<Mailbox> = self
            .inner
            .directory()
            .rooms
            .values()
            .map(|entry| entry.mailbox.clone())
            .collect();
        info!(rooms = mailboxes.len(), reason, "closing rooms");
        let results = join_all(mailboxes.iter().map(|mailbox| mailbox.close(reason))).await;
        results
            .into_iter()
            .zip(mailboxes.iter())
            .filter_map(|(result, mailbox)| match result {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(room_id = mailbox.room_id(), %err, "room did not close cleanly");
                    None
                }
            })
            .collect()
    }
}

impl<W: Wallet, R: InventoryRepository> Inner<W, R> {
    fn directory(&self) -> RwLockReadGuard<'_, Directory> {
        self.directory.read().unwrap_or_else(|p| p.into_inner())
    }

    fn directory_mut(&self) -> RwLockWriteGuard<'_, Directory> {
        self.directory.write().unwrap_or_else(|p| p.into_inner())
    }

    fn enqueue<T>(
        &self,
        queue: &mpsc::Sender<T>,
        name: &'static str,
        item: T,
    ) -> Result<(), GameError> {
        match queue.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.dropped();
                Err(GameError::QueueFull(name))
            }
            Err(TrySendError::Closed(_)) => Err(GameError::Internal(format!("{name} worker stopped"))),
        }
    }

    fn identity(&self, connection_id: ConnectionId) -> Option<Identity> {
        self.directory()
            .connections
            .get(&connection_id)
            .map(|connection| connection.identity.clone())
    }

    fn tier_config(&self, tier: Tier) -> TierConfig {
        self.config
            .catalog
            .get(tier)
            .cloned()
            .unwrap_or_else(|| TierConfig::for_tier(tier))
    }

    fn create_room(
        &self,
        directory: &mut Directory,
        tier: Tier,
        ephemeral: bool,
    ) -> Result<RoomId, GameError> {
        if directory.rooms.len() >= self.config.max_rooms {
            return Err(GameError::RoomLimit(self.config.max_rooms));
        }
        let sequence = self.next_room.fetch_add(1, Ordering::Relaxed);
        let room_id = format!("room_{tier}_{}_{sequence}", unix_secs());
        let mut config = room::Config::new(room_id.clone(), tier, self.tier_config(tier));
        config.mailbox_size = self.config.room_mailbox_size;
        config.tick_interval = self.config.tick_interval;
        config.snapshot_interval = self.config.snapshot_interval;
        config.min_join_balance = self.config.min_join_balance;
        config.idle_timeout = ephemeral.then_some(self.config.room_idle_timeout);
        let (actor, mailbox) = Actor::new(self.engine.clone(), config, self.events.clone());
        actor.start();
        directory
            .rooms
            .insert(room_id.clone(), RoomEntry { tier, mailbox });
        self.stats.room_opened();
        info!(%room_id, %tier, ephemeral, "room created");
        Ok(room_id)
    }

    /// Push a message to one connection. A full buffer disconnects it.
    fn deliver(&self, connection_id: ConnectionId, message: ServerMessage) {
        let result = match self.directory().connections.get(&connection_id) {
            Some(connection) => connection.outbound.try_send(message),
            None => return,
        };
        if let Err(TrySendError::Full(_)) = result {
            self.stats.dropped();
            warn!(connection_id, "outbound buffer full; disconnecting");
            self.detach(connection_id);
        }
    }

    fn reply_error(&self, connection_id: ConnectionId, request_id: Option<String>, err: &GameError) {
        self.deliver(connection_id, error_response(request_id, err));
    }

    /// Drop a connection and leave its room. Dropping the outbound sender ends the writer.
    fn detach(&self, connection_id: ConnectionId) {
        let (player_id, membership) = {
            let mut directory = self.directory_mut();
            let Some(connection) = directory.connections.remove(&connection_id) else {
                return;
            };
            let player_id = connection.identity.player_id;
            if directory.players.get(&player_id) == Some(&connection_id) {
                directory.players.remove(&player_id);
            }
            let membership = directory.room_of(player_id).ok();
            directory.memberships.remove(&player_id);
            (player_id, membership)
        };
        self.stats.connection_closed();
        info!(connection_id, player_id, "client disconnected");
        if let Some((room_id, mailbox)) = membership {
            match mailbox.leave(player_id) {
                Ok(pending) => {
                    tokio::spawn(async move {
                        if let Err(err) = pending.await {
                            debug!(%room_id, player_id, %err, "leave on disconnect failed");
                        }
                    });
                }
                Err(err) => {
                    warn!(%room_id, player_id, %err, "leave on disconnect dropped");
                }
            }
        }
    }

    /// Await a room reply off the worker and send the response to the requester.
    fn forward<T: Send + 'static>(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        request_id: Option<String>,
        pending: Result<Pending<T>, GameError>,
        respond: impl FnOnce(Option<String>, T) -> ServerMessage + Send + 'static,
    ) {
        let hub = self.clone();
        tokio::spawn(async move {
            let message = match settle(pending).await {
                Ok(value) => respond(request_id, value),
                Err(err) => error_response(request_id, &err),
            };
            hub.deliver(connection_id, message);
        });
    }

    async fn run_registration(self: Arc<Self>, mut queue: mpsc::Receiver<Registration>) {
        while let Some(request) = queue.recv().await {
            match request {
                Registration::Register {
                    connection_id,
                    identity,
                    outbound,
                    done,
                } => {
                    let result = self.attach(connection_id, identity, outbound);
                    let _ = done.send(result);
                }
                Registration::Unregister { connection_id } => self.detach(connection_id),
            }
        }
    }

    fn attach(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        let player_id = identity.player_id;
        {
            let mut directory = self.directory_mut();
            if directory.players.contains_key(&player_id) {
                warn!(connection_id, player_id, "duplicate connection rejected");
                return Err(GameError::AlreadyConnected(player_id));
            }
            directory.players.insert(player_id, connection_id);
            directory
                .connections
                .insert(connection_id, Connection { identity, outbound });
        }
        self.stats.connection_opened();
        info!(connection_id, player_id, "client connected");
        self.deliver(
            connection_id,
            ServerMessage::Welcome {
                client_id: format!("conn-{connection_id}"),
                player_id,
                server_time: now_millis(),
            },
        );
        Ok(())
    }

    async fn run_membership(self: Arc<Self>, mut queue: mpsc::Receiver<Membership>) {
        while let Some(request) = queue.recv().await {
            match request {
                Membership::Join {
                    connection_id,
                    request_id,
                    room_id,
                    tier,
                } => self.join(connection_id, request_id, room_id, tier),
                Membership::Leave {
                    connection_id,
                    request_id,
                } => self.leave(connection_id, request_id),
            }
        }
    }

    /// Hold a seat in the directory and queue the room join.
    ///
    /// The connection is checked and the join queued under the same write lock as the
    /// membership insert, so a disconnect either lands first (and nothing is reserved) or
    /// queues its leave behind the join. Returns `None` when the connection is gone.
    fn reserve(
        &self,
        connection_id: ConnectionId,
        room_id: Option<RoomId>,
        tier: Option<Tier>,
    ) -> Result<Option<(PlayerId, RoomId, Pending<JoinOutcome>)>, GameError> {
        let mut directory = self.directory_mut();
        let Some(identity) = directory
            .connections
            .get(&connection_id)
            .map(|connection| connection.identity.clone())
        else {
            return Ok(None);
        };
        let player_id = identity.player_id;
        if directory.memberships.contains_key(&player_id) {
            return Err(GameError::AlreadyInRoom(player_id));
        }
        let room_id = match room_id {
            Some(room_id) if directory.rooms.contains_key(&room_id) => room_id,
            Some(room_id) => return Err(GameError::RoomNotFound(room_id)),
            None => {
                let tier = tier.unwrap_or(Tier::Novice);
                let max_players = self.tier_config(tier).max_players;
                match directory.open_room(tier, max_players) {
                    Some(room_id) => room_id,
                    None => self.create_room(&mut directory, tier, true)?,
                }
            }
        };
        let mailbox = directory
            .rooms
            .get(&room_id)
            .map(|entry| entry.mailbox.clone())
            .ok_or_else(|| GameError::RoomNotFound(room_id.clone()))?;
        let pending = mailbox.join(PlayerSeed {
            player_id,
            wallet_id: identity.wallet_id,
            name: identity.name,
        })?;
        directory.memberships.insert(player_id, room_id.clone());
        Ok(Some((player_id, room_id, pending)))
    }

    fn release(&self, player_id: PlayerId, room_id: &str) {
        let mut directory = self.directory_mut();
        if directory.memberships.get(&player_id).map(String::as_str) == Some(room_id) {
            directory.memberships.remove(&player_id);
        }
    }

    fn join(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        request_id: Option<String>,
        room_id: Option<RoomId>,
        tier: Option<Tier>,
    ) {
        let (player_id, room_id, pending) = match self.reserve(connection_id, room_id, tier) {
            Ok(Some(reserved)) => reserved,
            Ok(None) => return,
            Err(err) => return self.reply_error(connection_id, request_id, &err),
        };
        let hub = self.clone();
        tokio::spawn(async move {
            match pending.await {
                Ok(joined) => hub.deliver(
                    connection_id,
                    ServerMessage::RoomJoined {
                        request_id,
                        room_id,
                        tier: joined.snapshot.tier,
                        seat: joined.player.seat,
                        balance: joined.player.balance,
                        player_count: joined.player_count,
                        snapshot: joined.snapshot,
                    },
                ),
                Err(err) => {
                    hub.release(player_id, &room_id);
                    hub.reply_error(connection_id, request_id, &err);
                }
            }
        });
    }

    fn leave(self: &Arc<Self>, connection_id: ConnectionId, request_id: Option<String>) {
        let Some(identity) = self.identity(connection_id) else {
            return;
        };
        let player_id = identity.player_id;
        let room = self.directory().room_of(player_id);
        let (room_id, pending) = match room.and_then(|(room_id, mailbox)| {
            mailbox.leave(player_id).map(|pending| (room_id, pending))
        }) {
            Ok(queued) => queued,
            Err(err) => return self.reply_error(connection_id, request_id, &err),
        };
        self.release(player_id, &room_id);
        self.forward(connection_id, request_id, Ok(pending), move |request_id, session| {
            ServerMessage::RoomLeft {
                request_id,
                room_id,
                session,
            }
        });
    }

    async fn run_actions(self: Arc<Self>, mut queue: mpsc::Receiver<Action>) {
        while let Some(action) = queue.recv().await {
            self.act(action);
        }
    }

    /// Resolve the player behind a connection and the room they are seated in.
    fn seat_of(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(PlayerId, Result<(RoomId, Mailbox), GameError>)> {
        let directory = self.directory();
        let player_id = directory.connections.get(&connection_id)?.identity.player_id;
        Some((player_id, directory.room_of(player_id)))
    }

    fn act(self: &Arc<Self>, action: Action) {
        match action {
            Action::Fire {
                connection_id,
                request_id,
                request,
            } => {
                let Some((player_id, room)) = self.seat_of(connection_id) else {
                    return;
                };
                let pending = room.and_then(|(_, mailbox)| mailbox.fire_bullet(player_id, request));
                self.forward(connection_id, request_id, pending, |request_id, fired: Fired| {
                    ServerMessage::BulletAccepted {
                        request_id,
                        bullet: fired.bullet,
                        balance: fired.balance,
                    }
                });
            }
            Action::Hit {
                connection_id,
                request_id,
                bullet_id,
                fish_id,
            } => {
                let Some((player_id, room)) = self.seat_of(connection_id) else {
                    return;
                };
                let pending = room
                    .and_then(|(_, mailbox)| mailbox.hit_fish(player_id, bullet_id, fish_id));
                self.forward(connection_id, request_id, pending, |request_id, result: HitResult| {
                    ServerMessage::HitResolved { request_id, result }
                });
            }
            Action::SwitchCannon {
                connection_id,
                request_id,
                kind,
                level,
            } => {
                let Some((player_id, room)) = self.seat_of(connection_id) else {
                    return;
                };
                let pending =
                    room.and_then(|(_, mailbox)| mailbox.switch_cannon(player_id, kind, level));
                self.forward(connection_id, request_id, pending, move |request_id, cannon: Cannon| {
                    ServerMessage::CannonSwitched {
                        request_id,
                        player_id,
                        cannon,
                    }
                });
            }
            Action::PlayerInfo {
                connection_id,
                request_id,
            } => {
                let Some((player_id, room)) = self.seat_of(connection_id) else {
                    return;
                };
                let (room_id, mailbox) = match room {
                    Ok(seated) => seated,
                    Err(_) => {
                        return self.deliver(
                            connection_id,
                            ServerMessage::PlayerInfo {
                                request_id,
                                player_id,
                                room_id: None,
                                player: None,
                            },
                        )
                    }
                };
                let pending = mailbox.player(player_id);
                self.forward(connection_id, request_id, pending, move |request_id, player| {
                    ServerMessage::PlayerInfo {
                        request_id,
                        player_id,
                        room_id: Some(room_id),
                        player: Some(player),
                    }
                });
            }
            Action::RoomList {
                connection_id,
                request_id,
                tier,
            } => {
                let mailboxes: Vec<Mailbox> = self
                    .directory()
                    .rooms
                    .values()
                    .filter(|entry| tier.map_or(true, |tier| entry.tier == tier))
                    .map(|entry| entry.mailbox.clone())
                    .collect();
                let hub = self.clone();
                tokio::spawn(async move {
                    let mut rooms = Vec::with_capacity(mailboxes.len());
                    for mailbox in mailboxes {
                        match settle(mailbox.summary()).await {
                            Ok(summary) => rooms.push(summary),
                            Err(err) => {
                                debug!(room_id = mailbox.room_id(), %err, "room skipped in list")
                            }
                        }
                    }
                    hub.deliver(connection_id, ServerMessage::RoomList { request_id, rooms });
                });
            }
        }
    }

    async fn run_broadcast(self: Arc<Self>, mut queue: mpsc::Receiver<RoomEvent>) {
        while let Some(event) = queue.recv().await {
            let mut slow = Vec::new();
            {
                let directory = self.directory();
                let members = directory
                    .memberships
                    .iter()
                    .filter(|(player_id, room_id)| {
                        **room_id == event.room_id && event.audience.includes(**player_id)
                    })
                    .filter_map(|(player_id, _)| directory.players.get(player_id));
                for connection_id in members {
                    let Some(connection) = directory.connections.get(connection_id) else {
                        continue;
                    };
                    if let Err(TrySendError::Full(_)) =
                        connection.outbound.try_send(event.message.clone())
                    {
                        slow.push(*connection_id);
                    }
                }
            }
            if matches!(event.message, ServerMessage::RoomClosed { .. }) {
                self.forget_room(&event.room_id);
            }
            for connection_id in slow {
                self.stats.dropped();
                warn!(connection_id, room_id = %event.room_id, "outbound buffer full; disconnecting");
                self.detach(connection_id);
            }
        }
    }

    fn forget_room(&self, room_id: &str) {
        let removed = {
            let mut directory = self.directory_mut();
            directory
                .memberships
                .retain(|_, member_of| member_of.as_str() != room_id);
            directory.rooms.remove(room_id).is_some()
        };
        if removed {
            self.stats.room_closed();
            info!(room_id, "room removed");
        }
    }

    async fn run_stats(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = self.stats.snapshot();
            info!(
                total_connections = stats.total_connections,
                active_connections = stats.active_connections,
                active_rooms = stats.active_rooms,
                total_messages = stats.total_messages,
                dropped_messages = stats.dropped_messages,
                "hub stats"
            );
        }
    }
}
