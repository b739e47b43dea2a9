//! Atomic counters shared between concurrent test clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Counters {
    connections: AtomicUsize,
    disconnects: AtomicUsize,
    messages_sent: AtomicUsize,
    messages_received: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    counters: Arc<Counters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.counters.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.counters.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_sent(&self) {
        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> usize {
        self.counters.disconnects.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> usize {
        self.counters.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> usize {
        self.counters.messages_received.load(Ordering::Relaxed)
    }
}
