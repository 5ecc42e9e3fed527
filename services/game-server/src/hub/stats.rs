use fishhunt_types::now_millis;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct HubStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    active_rooms: AtomicU64,
    total_messages: AtomicU64,
    dropped_messages: AtomicU64,
    start_time: u64,
    last_activity: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HubStatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub active_rooms: u64,
    pub total_messages: u64,
    pub dropped_messages: u64,
    pub start_time: u64,
    pub last_activity: u64,
}

impl Default for HubStats {
    fn default() -> Self {
        let now = now_millis();
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            active_rooms: AtomicU64::new(0),
            total_messages: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            start_time: now,
            last_activity: AtomicU64::new(now),
        }
    }
}

impl HubStats {
    fn touch(&self) {
        self.last_activity.store(now_millis(), Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn room_opened(&self) {
        self.active_rooms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_closed(&self) {
        self.active_rooms.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message(&self) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn dropped(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_rooms: self.active_rooms.load(Ordering::Relaxed),
            total_messages: self.total_messages.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            start_time: self.start_time,
            last_activity: self.last_activity.load(Ordering::Relaxed),
        }
    }
}
