#![allow(dead_code)]

use async_trait::async_trait;
use secret_santa::application::dispatcher::{CancelToken, NotificationDispatcher};
use secret_santa::domain::dispatch::{Message, RetryPolicy, TransportError};
use secret_santa::domain::participant::{Participant, RosterSnapshot};
use secret_santa::domain::ports::{Transport, TransportRef};
use secret_santa::infrastructure::templates::BuiltinCatalog;
use std::collections::HashMap;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NAMES: [&str; 8] = ["Ana", "Ben", "Cleo", "Dan", "Eva", "Finn", "Gus", "Hana"];

/// Roster of `n` participants with ids `p0..pN` and addresses `pN@example.com`.
pub fn roster(n: usize) -> RosterSnapshot {
    let participants = (0..n)
        .map(|i| {
            let suffix = (b'A' + (i / NAMES.len()) as u8) as char;
            let name = format!("{} {suffix}", NAMES[i % NAMES.len()]);
            Participant::new(
                format!("p{i}"),
                name,
                format!("p{i}@example.com"),
                "en",
            )
        })
        .collect();
    RosterSnapshot::new(participants).unwrap()
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 1,
        multiplier: 2.0,
        max_backoff_ms: 4,
    }
}

pub fn dispatcher(
    transport: TransportRef,
    policy: RetryPolicy,
    max_in_flight: usize,
) -> NotificationDispatcher {
    NotificationDispatcher::new(
        transport,
        Arc::new(BuiltinCatalog::default()),
        policy,
        max_in_flight,
    )
}

pub fn write_roster_csv(path: &Path, rows: &[(&str, &str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["name", "email", "language"])?;
    for (name, email, language) in rows {
        wtr.write_record([name, email, language])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Delivers everything except messages to the addresses it was given, which
/// fail with the configured error every time.
#[derive(Default)]
pub struct SelectiveTransport {
    failing: Mutex<HashMap<String, TransportError>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl SelectiveTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str, error: TransportError) {
        self.failing
            .lock()
            .unwrap()
            .insert(address.to_string(), error);
    }

    pub fn heal(&self, address: &str) {
        self.failing.lock().unwrap().remove(address);
    }

    pub fn attempts_for(&self, address: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for SelectiveTransport {
    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(message.to.clone())
            .or_default() += 1;
        match self.failing.lock().unwrap().get(&message.to) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Sleeps on every send and records the highest number of sends that were
/// in flight at the same time.
#[derive(Default)]
pub struct PeakTrackingTransport {
    current: AtomicUsize,
    peak: AtomicUsize,
    sent: AtomicUsize,
}

impl PeakTrackingTransport {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for PeakTrackingTransport {
    async fn send(&self, _message: &Message) -> Result<(), TransportError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cancels the run from inside the first send, then completes that send.
pub struct CancellingTransport {
    pub cancel: CancelToken,
    pub sent: AtomicUsize,
}

#[async_trait]
impl Transport for CancellingTransport {
    async fn send(&self, _message: &Message) -> Result<(), TransportError> {
        self.cancel.cancel();
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
