use fishhunt_types::{
    BulletId, Cannon, FishId, GameError, HitResult, Player, PlayerId, RoomId, RoomSnapshot,
    RoomSummary, SessionRecord,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::warn;

use super::{FireRequest, Fired, JoinOutcome, PlayerSeed, RoomReport};

type Responder<T> = oneshot::Sender<Result<T, GameError>>;

/// Messages sent to a room.
pub enum Message {
    Join {
        seed: PlayerSeed,
        response: Responder<JoinOutcome>,
    },
    Leave {
        player_id: PlayerId,
        response: Responder<SessionRecord>,
    },
    Fire {
        player_id: PlayerId,
        request: FireRequest,
        response: Responder<Fired>,
    },
    Hit {
        player_id: PlayerId,
        bullet_id: BulletId,
        fish_id: FishId,
        response: Responder<HitResult>,
    },
    SwitchCannon {
        player_id: PlayerId,
        kind: Option<u32>,
        level: u32,
        response: Responder<Cannon>,
    },
    Player {
        player_id: PlayerId,
        response: Responder<Player>,
    },
    Snapshot {
        response: Responder<RoomSnapshot>,
    },
    Summary {
        response: Responder<RoomSummary>,
    },
    Close {
        reason: String,
        response: Responder<RoomReport>,
    },
}

impl Message {
    /// Answer the request without handling it.
    pub(super) fn reject(self, error: GameError) {
        match self {
            Message::Join { response, .. } => {
                let _ = response.send(Err(error));
            }
            Message::Leave { response, .. } => {
                let _ = response.send(Err(error));
            }
            Message::Fire { response, .. } => {
                let _ = response.send(Err(error));
            }
            Message::Hit { response, .. } => {
                let _ = response.send(Err(error));
            }
            Message::SwitchCannon { response, .. } => {
                let _ = response.send(Err(error));
            }
            Message::Player { response, .. } => {
                let _ = response.send(Err(error));
            }
            Message::Snapshot { response } => {
                let _ = response.send(Err(error));
            }
            Message::Summary { response } => {
                let _ = response.send(Err(error));
            }
            Message::Close { response, .. } => {
                let _ = response.send(Err(error));
            }
        }
    }
}

/// Reply to a request that a room accepted into its mailbox.
///
/// Resolves to [`GameError::RoomUnavailable`] if the room exits without answering.
pub struct Pending<T> {
    room_id: RoomId,
    receiver: oneshot::Receiver<Result<T, GameError>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T, GameError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(GameError::RoomUnavailable(this.room_id.clone())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Mailbox for a room.
///
/// Requests are enqueued with `try_send`: a full mailbox rejects the request immediately rather
/// than stalling the caller. Only [`Mailbox::close`] waits for space.
#[derive(Clone)]
pub struct Mailbox {
    room_id: RoomId,
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(room_id: RoomId, sender: mpsc::Sender<Message>) -> Self {
        Self { room_id, sender }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// True once the room has stopped reading its mailbox.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn request<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> Message,
    ) -> Result<Pending<T>, GameError> {
        let (response, receiver) = oneshot::channel();
        match self.sender.try_send(build(response)) {
            Ok(()) => Ok(Pending {
                room_id: self.room_id.clone(),
                receiver,
            }),
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %self.room_id, "room mailbox full; request dropped");
                Err(GameError::QueueFull("room"))
            }
            Err(TrySendError::Closed(_)) => Err(GameError::RoomUnavailable(self.room_id.clone())),
        }
    }

    pub fn join(&self, seed: PlayerSeed) -> Result<Pending<JoinOutcome>, GameError> {
        self.request(|response| Message::Join { seed, response })
    }

    pub fn leave(&self, player_id: PlayerId) -> Result<Pending<SessionRecord>, GameError> {
        self.request(|response| Message::Leave {
            player_id,
            response,
        })
    }

    pub fn fire_bullet(
        &self,
        player_id: PlayerId,
        request: FireRequest,
    ) -> Result<Pending<Fired>, GameError> {
        self.request(|response| Message::Fire {
            player_id,
            request,
            response,
        })
    }

    pub fn hit_fish(
        &self,
        player_id: PlayerId,
        bullet_id: BulletId,
        fish_id: FishId,
    ) -> Result<Pending<HitResult>, GameError> {
        self.request(|response| Message::Hit {
            player_id,
            bullet_id,
            fish_id,
            response,
        })
    }

    pub fn switch_cannon(
        &self,
        player_id: PlayerId,
        kind: Option<u32>,
        level: u32,
    ) -> Result<Pending<Cannon>, GameError> {
        self.request(|response| Message::SwitchCannon {
            player_id,
            kind,
            level,
            response,
        })
    }

    pub fn player(&self, player_id: PlayerId) -> Result<Pending<Player>, GameError> {
        self.request(|response| Message::Player {
            player_id,
            response,
        })
    }

    pub fn snapshot(&self) -> Result<Pending<RoomSnapshot>, GameError> {
        self.request(|response| Message::Snapshot { response })
    }

    pub fn summary(&self) -> Result<Pending<RoomSummary>, GameError> {
        self.request(|response| Message::Summary { response })
    }

    /// Ask the room to drain and exit, waiting for mailbox space if necessary.
    pub async fn close(&self, reason: impl Into<String>) -> Result<RoomReport, GameError> {
        let (response, receiver) = oneshot::channel();
        let message = Message::Close {
            reason: reason.into(),
            response,
        };
        if self.sender.send(message).await.is_err() {
            return Err(GameError::RoomUnavailable(self.room_id.clone()));
        }
        Pending {
            room_id: self.room_id.clone(),
            receiver,
        }
        .await
    }
}
