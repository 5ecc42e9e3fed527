use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::entities::{BulletId, FishId, PlayerId, RoomId, RoomStatus};

/// Broad error class used to decide how callers react.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or unknown id. No state changed.
    Validation,
    /// Wallet failure or timeout. Optimistic changes were rolled back.
    Resource,
    /// Room full or queue saturated. Caller may retry.
    Capacity,
    /// Should be impossible under per-room serialization.
    Internal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletOperation {
    Debit,
    Credit,
    Balance,
}

impl fmt::Display for WalletOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WalletOperation::Debit => "debit",
            WalletOperation::Credit => "credit",
            WalletOperation::Balance => "balance",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum GameError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("player {0} is not in the room")]
    PlayerNotInRoom(PlayerId),
    #[error("player {0} is already in a room")]
    AlreadyInRoom(PlayerId),
    #[error("player {0} already has a live connection")]
    AlreadyConnected(PlayerId),
    #[error("bullet {0} not found")]
    BulletNotFound(BulletId),
    #[error("fish {0} not found")]
    FishNotFound(FishId),
    #[error("bullet {bullet} does not belong to player {player}")]
    BulletNotOwned { bullet: BulletId, player: PlayerId },
    #[error("invalid bullet power {0}")]
    InvalidPower(u32),
    #[error("invalid cannon level {0}")]
    InvalidCannonLevel(u32),
    #[error("bullet cost {cost} exceeds max bet {max_bet}")]
    BetTooLarge { cost: i64, max_bet: i64 },
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: i64, available: i64 },
    #[error("room is {0}")]
    RoomNotActive(RoomStatus),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("wallet {operation} failed: {reason}")]
    Wallet {
        operation: WalletOperation,
        reason: String,
    },
    #[error("wallet {operation} timed out after {timeout_ms}ms")]
    WalletTimeout {
        operation: WalletOperation,
        timeout_ms: u64,
    },
    #[error("room is full ({0} players)")]
    RoomFull(usize),
    #[error("room limit reached ({0})")]
    RoomLimit(usize),
    #[error("connection limit reached ({0})")]
    ConnectionLimit(usize),
    #[error("{0} queue is full")]
    QueueFull(&'static str),
    #[error("room {0} is closing")]
    RoomClosing(RoomId),
    #[error("room {0} is unavailable")]
    RoomUnavailable(RoomId),
    #[error("internal inconsistency: {0}")]
    Internal(String),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::RoomNotFound(_)
            | GameError::PlayerNotInRoom(_)
            | GameError::AlreadyInRoom(_)
            | GameError::AlreadyConnected(_)
            | GameError::BulletNotFound(_)
            | GameError::FishNotFound(_)
            | GameError::BulletNotOwned { .. }
            | GameError::InvalidPower(_)
            | GameError::InvalidCannonLevel(_)
            | GameError::BetTooLarge { .. }
            | GameError::InsufficientBalance { .. }
            | GameError::RoomNotActive(_)
            | GameError::Malformed(_) => ErrorKind::Validation,
            GameError::Wallet { .. } | GameError::WalletTimeout { .. } => ErrorKind::Resource,
            GameError::RoomFull(_)
            | GameError::RoomLimit(_)
            | GameError::ConnectionLimit(_)
            | GameError::QueueFull(_)
            | GameError::RoomClosing(_)
            | GameError::RoomUnavailable(_) => ErrorKind::Capacity,
            GameError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            GameError::PlayerNotInRoom(_) => "NOT_IN_ROOM",
            GameError::AlreadyInRoom(_) => "ALREADY_IN_ROOM",
            GameError::AlreadyConnected(_) => "ALREADY_CONNECTED",
            GameError::BulletNotFound(_) => "BULLET_NOT_FOUND",
            GameError::FishNotFound(_) => "FISH_NOT_FOUND",
            GameError::BulletNotOwned { .. } => "BULLET_NOT_OWNED",
            GameError::InvalidPower(_) => "INVALID_POWER",
            GameError::InvalidCannonLevel(_) => "INVALID_CANNON_LEVEL",
            GameError::BetTooLarge { .. } => "BET_TOO_LARGE",
            GameError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            GameError::RoomNotActive(_) => "ROOM_NOT_ACTIVE",
            GameError::Malformed(_) => "MALFORMED_REQUEST",
            GameError::Wallet { .. } => "WALLET_FAILED",
            GameError::WalletTimeout { .. } => "WALLET_TIMEOUT",
            GameError::RoomFull(_) => "ROOM_FULL",
            GameError::RoomLimit(_) => "ROOM_LIMIT",
            GameError::ConnectionLimit(_) => "CONNECTION_LIMIT",
            GameError::QueueFull(_) => "QUEUE_FULL",
            GameError::RoomClosing(_) => "ROOM_CLOSING",
            GameError::RoomUnavailable(_) => "ROOM_UNAVAILABLE",
            GameError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        assert_eq!(GameError::FishNotFound(3).kind(), ErrorKind::Validation);
        assert_eq!(
            GameError::WalletTimeout {
                operation: WalletOperation::Debit,
                timeout_ms: 10
            }
            .kind(),
            ErrorKind::Resource
        );
        assert_eq!(GameError::RoomFull(4).kind(), ErrorKind::Capacity);
        assert_eq!(GameError::QueueFull("actions").kind(), ErrorKind::Capacity);
        assert_eq!(GameError::Internal("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_messages_and_codes() {
        let err = GameError::Wallet {
            operation: WalletOperation::Credit,
            reason: "ledger offline".into(),
        };
        assert_eq!(err.to_string(), "wallet credit failed: ledger offline");
        assert_eq!(err.code(), "WALLET_FAILED");
        assert_eq!(
            GameError::RoomNotActive(RoomStatus::Waiting).to_string(),
            "room is waiting"
        );
    }
}
