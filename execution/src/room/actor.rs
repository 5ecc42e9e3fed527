use fishhunt_types::{
    now_millis, BulletId, Cannon, FishId, GameError, HitResult, PlayerId, RoomStatus,
    ServerMessage, SessionRecord,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::ingress::{Mailbox, Message};
use super::state::RoomState;
use super::{
    Audience, Config, Engine, FireRequest, Fired, JoinOutcome, PlayerSeed, RoomEvent, RoomReport,
};
use crate::inventory::InventoryRepository;
use crate::spawner::Spawner;
use crate::wallet::{Transfer, Wallet, REASON_BULLET_COST, REASON_FISH_REWARD};

type CloseRequest = (String, oneshot::Sender<Result<RoomReport, GameError>>);

/// Owns one room and serializes every operation on it.
pub struct Actor<W: Wallet, R: InventoryRepository> {
    engine: Engine<W, R>,
    config: Config,
    state: RoomState,
    mailbox: mpsc::Receiver<Message>,
    events: mpsc::Sender<RoomEvent>,
}

impl<W: Wallet, R: InventoryRepository> Actor<W, R> {
    pub fn new(
        engine: Engine<W, R>,
        config: Config,
        events: mpsc::Sender<RoomEvent>,
    ) -> (Self, Mailbox) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_size.max(1));
        let spawner = Spawner::new(engine.species.as_ref().clone());
        let state = RoomState::new(&config, spawner);
        let handle = Mailbox::new(config.room_id.clone(), sender);
        (
            Self {
                engine,
                config,
                state,
                mailbox,
                events,
            },
            handle,
        )
    }

    pub fn start(self) -> JoinHandle<RoomReport> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> RoomReport {
        let initial = self.state.spawn_initial(self.config.initial_fish);
        info!(
            room_id = %self.state.room_id,
            tier = %self.state.tier,
            fish = initial.len(),
            "room started"
        );

        let mut ticker = interval(self.config.tick_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (reason, responder) = loop {
            tokio::select! {
                message = self.mailbox.recv() => {
                    let Some(message) = message else {
                        break ("mailbox closed".to_string(), None);
                    };
                    if let Some((reason, response)) = self.handle(message).await {
                        break (reason, Some(response));
                    }
                }
                _ = ticker.tick() => {
                    if let Some(reason) = self.tick().await {
                        break (reason.to_string(), None);
                    }
                }
            }
        };

        let report = self.shutdown(reason).await;
        if let Some(response) = responder {
            let _ = response.send(Ok(report.clone()));
        }
        report
    }

    /// Handle one request. Returns the close request when asked to stop.
    async fn handle(&mut self, message: Message) -> Option<CloseRequest> {
        match message {
            Message::Join { seed, response } => {
                let result = self.join(seed).await;
                let _ = response.send(result);
            }
            Message::Leave {
                player_id,
                response,
            } => {
                let _ = response.send(self.leave(player_id));
            }
            Message::Fire {
                player_id,
                request,
                response,
            } => {
                let result = self.fire(player_id, request).await;
                let _ = response.send(result);
            }
            Message::Hit {
                player_id,
                bullet_id,
                fish_id,
                response,
            } => {
                let result = self.hit(Some(player_id), bullet_id, fish_id).await;
                let _ = response.send(result);
            }
            Message::SwitchCannon {
                player_id,
                kind,
                level,
                response,
            } => {
                let _ = response.send(self.switch_cannon(player_id, kind, level));
            }
            Message::Player {
                player_id,
                response,
            } => {
                let _ = response.send(self.state.player(player_id).cloned());
            }
            Message::Snapshot { response } => {
                let _ = response.send(Ok(self.state.snapshot()));
            }
            Message::Summary { response } => {
                let _ = response.send(Ok(self.state.summary()));
            }
            Message::Close { reason, response } => return Some((reason, response)),
        }
        None
    }

    async fn join(&mut self, seed: PlayerSeed) -> Result<JoinOutcome, GameError> {
        self.state.check_join(seed.player_id)?;
        let balance = self.engine.wallet.balance(seed.wallet_id).await?;
        let required = self
            .config
            .min_join_balance
            .max(self.state.tier_config.min_bet);
        if balance < required {
            return Err(GameError::InsufficientBalance {
                required,
                available: balance,
            });
        }

        let player = self
            .state
            .seat(seed, balance, self.config.min_players_to_start)?;
        let player_count = self.state.player_count();
        info!(
            room_id = %self.state.room_id,
            player_id = player.id,
            seat = player.seat,
            balance,
            player_count,
            "player joined"
        );
        self.emit(
            Audience::AllExcept(player.id),
            ServerMessage::PlayerJoined {
                room_id: self.state.room_id.clone(),
                player: player.clone(),
                player_count,
            },
        );
        Ok(JoinOutcome {
            player,
            player_count,
            snapshot: self.state.snapshot(),
        })
    }

    fn leave(&mut self, player_id: PlayerId) -> Result<SessionRecord, GameError> {
        let session = self.state.unseat(player_id)?;
        let player_count = self.state.player_count();
        info!(
            room_id = %self.state.room_id,
            player_id,
            bullets_fired = session.bullets_fired,
            net_profit = session.net_profit,
            player_count,
            "player left"
        );
        self.engine.sessions.record(session.clone());
        self.emit(
            Audience::All,
            ServerMessage::PlayerLeft {
                room_id: self.state.room_id.clone(),
                player_id,
                player_count,
            },
        );
        Ok(session)
    }

    fn switch_cannon(
        &mut self,
        player_id: PlayerId,
        kind: Option<u32>,
        level: u32,
    ) -> Result<Cannon, GameError> {
        let cannon = self.state.switch_cannon(player_id, kind, level)?;
        self.emit(
            Audience::AllExcept(player_id),
            ServerMessage::CannonSwitched {
                request_id: None,
                player_id,
                cannon,
            },
        );
        Ok(cannon)
    }

    /// Debit first, then create the bullet. A failed debit leaves the room untouched.
    async fn fire(&mut self, player_id: PlayerId, request: FireRequest) -> Result<Fired, GameError> {
        let shot = self.state.prepare_shot(player_id, &request)?;
        let cost = shot.cost;
        let transfer = Transfer {
            wallet_id: shot.wallet_id,
            amount: cost,
            reason: REASON_BULLET_COST,
            reference: format!("game:{}:bullet:{}", self.state.room_id, shot.bullet_id),
        };
        if let Err(err) = self.engine.wallet.debit(transfer).await {
            debug!(
                room_id = %self.state.room_id,
                player_id,
                bullet_id = shot.bullet_id,
                cost,
                ?err,
                "bullet rejected by wallet"
            );
            return Err(err);
        }

        let (bullet, balance) = self.state.commit_shot(player_id, shot)?;
        self.engine.ledger.add_bet(self.state.tier, cost).await;
        debug!(
            room_id = %self.state.room_id,
            player_id,
            bullet_id = bullet.id,
            cost,
            balance,
            "bullet fired"
        );
        self.emit(
            Audience::AllExcept(player_id),
            ServerMessage::BulletFired {
                room_id: self.state.room_id.clone(),
                bullet: bullet.clone(),
            },
        );
        Ok(Fired { bullet, balance })
    }

    /// Resolve a bullet striking a fish. `reporter` is the client that reported the hit, or
    /// `None` for a collision found by the game loop.
    async fn hit(
        &mut self,
        reporter: Option<PlayerId>,
        bullet_id: BulletId,
        fish_id: FishId,
    ) -> Result<HitResult, GameError> {
        let target = self.state.target(reporter, bullet_id, fish_id)?;
        let outcome = self.engine.model.resolve(
            &mut self.state.rng,
            target.power,
            target.fish_health,
            target.fish_value,
        );
        let (killed, remaining_health) = self.state.damage_fish(fish_id, outcome.damage)?;
        self.state.consume_bullet(bullet_id);
        self.state.stats.hits += 1;
        if outcome.critical {
            self.state.stats.critical_hits += 1;
        }

        let mut result = HitResult {
            bullet_id,
            fish_id,
            player_id: target.shooter,
            damage: outcome.damage,
            critical: outcome.critical,
            killed,
            success: false,
            reward: 0,
            multiplier: outcome.multiplier,
            remaining_health,
            balance: self.state.balance_of(target.shooter),
        };
        if !killed {
            self.emit(
                Audience::All,
                ServerMessage::FishHit {
                    room_id: self.state.room_id.clone(),
                    result: result.clone(),
                },
            );
            return Ok(result);
        }

        // Death is final from here on, whatever happens to the payout.
        self.state.remove_dead(fish_id);
        self.state.stats.fish_killed += 1;
        let reward = outcome.potential_reward;
        let approved = self
            .engine
            .rtp
            .approve_kill(
                &mut self.state.rng,
                self.state.tier,
                self.state.tier_config.target_rtp,
                reward,
            )
            .await;
        if !approved {
            self.state.stats.kills_denied += 1;
            debug!(
                room_id = %self.state.room_id,
                fish_id,
                player_id = target.shooter,
                reward,
                "payout suppressed"
            );
            self.emit_kill(&result);
            return Ok(result);
        }

        let wallet_id = match self.state.player(target.shooter) {
            Ok(player) => player.wallet_id,
            Err(_) => {
                error!(
                    room_id = %self.state.room_id,
                    bullet_id,
                    player_id = target.shooter,
                    "bullet outlived its shooter"
                );
                self.emit_kill(&result);
                return Err(GameError::Internal(format!(
                    "shooter {} of bullet {bullet_id} is not seated",
                    target.shooter
                )));
            }
        };
        let transfer = Transfer {
            wallet_id,
            amount: reward,
            reason: REASON_FISH_REWARD,
            reference: format!("game:{}:fish:{}", self.state.room_id, fish_id),
        };
        if let Err(err) = self.engine.wallet.credit(transfer).await {
            warn!(
                room_id = %self.state.room_id,
                fish_id,
                player_id = target.shooter,
                reward,
                ?err,
                "reward credit failed; payout withheld"
            );
            self.emit_kill(&result);
            return Err(err);
        }

        result.balance = self.state.pay(target.shooter, reward, outcome.critical);
        result.reward = reward;
        result.success = true;
        self.engine.ledger.add_win(self.state.tier, reward).await;
        debug!(
            room_id = %self.state.room_id,
            fish_id,
            player_id = target.shooter,
            reward,
            critical = outcome.critical,
            balance = result.balance,
            "fish caught"
        );
        self.emit_kill(&result);
        Ok(result)
    }

    fn emit_kill(&self, result: &HitResult) {
        self.emit(
            Audience::All,
            ServerMessage::FishKilled {
                room_id: self.state.room_id.clone(),
                result: result.clone(),
            },
        );
    }

    /// Advance the game loop once. Returns a reason when the room should close.
    async fn tick(&mut self) -> Option<&'static str> {
        let dt = self.config.tick_interval.as_secs_f64();
        self.state.stats.ticks += 1;
        self.state.advance(dt);

        if self.config.server_collisions {
            for (bullet_id, fish_id) in self.state.collisions() {
                // An earlier collision this tick may already have killed the fish.
                if let Err(err) = self.hit(None, bullet_id, fish_id).await {
                    debug!(
                        room_id = %self.state.room_id,
                        bullet_id,
                        fish_id,
                        ?err,
                        "collision unresolved"
                    );
                }
            }
        }

        if self.state.status == RoomStatus::Active {
            let spawned = self.state.replenish(dt);
            if !spawned.is_empty() {
                self.emit(
                    Audience::All,
                    ServerMessage::FishSpawned {
                        room_id: self.state.room_id.clone(),
                        fish: spawned,
                    },
                );
            }
        }

        if self.state.last_snapshot.elapsed() >= self.config.snapshot_interval {
            self.state.last_snapshot = tokio::time::Instant::now();
            self.emit(
                Audience::All,
                ServerMessage::RoomState {
                    room_id: self.state.room_id.clone(),
                    snapshot: self.state.snapshot(),
                },
            );
        }

        match (self.config.idle_timeout, self.state.empty_since) {
            (Some(timeout), Some(since)) if since.elapsed() >= timeout => Some("idle"),
            _ => None,
        }
    }

    /// Queue a broadcast. Rooms without players have nobody to tell.
    fn emit(&self, audience: Audience, message: ServerMessage) {
        if self.state.players.is_empty() {
            return;
        }
        let event = RoomEvent {
            room_id: self.state.room_id.clone(),
            audience,
            message,
        };
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %self.state.room_id, "event queue full; broadcast dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(room_id = %self.state.room_id, "event queue closed");
            }
        }
    }

    async fn shutdown(&mut self, reason: String) -> RoomReport {
        self.state.status = RoomStatus::Closing;
        self.mailbox.close();
        let mut drained = 0;
        while let Ok(message) = self.mailbox.try_recv() {
            message.reject(GameError::RoomClosing(self.state.room_id.clone()));
            drained += 1;
        }

        let left_at = now_millis();
        let sessions: Vec<SessionRecord> = std::mem::take(&mut self.state.players)
            .into_values()
            .map(|mut seat| {
                seat.session.finish(left_at);
                seat.session
            })
            .collect();
        for session in &sessions {
            self.engine.sessions.record(session.clone());
        }
        self.state.bullets.clear();

        let closed = RoomEvent {
            room_id: self.state.room_id.clone(),
            audience: Audience::All,
            message: ServerMessage::RoomClosed {
                room_id: self.state.room_id.clone(),
                reason: reason.clone(),
            },
        };
        if self.events.send(closed).await.is_err() {
            debug!(room_id = %self.state.room_id, "event queue closed before room close");
        }

        self.state.status = RoomStatus::Destroyed;
        let stats = self.state.stats;
        info!(
            room_id = %self.state.room_id,
            reason = %reason,
            drained,
            players = sessions.len(),
            bullets_fired = stats.bullets_fired,
            total_wagered = stats.total_wagered,
            fish_killed = stats.fish_killed,
            total_paid = stats.total_paid,
            "room closed"
        );
        RoomReport {
            room_id: self.state.room_id.clone(),
            tier: self.state.tier,
            reason,
            stats,
            sessions,
        }
    }
}
