/// Upstream entry stream (spec.md §6.1). A unidirectional, reconnecting
/// stream of `{slot: u64, entries: bytes}` frames over TCP, length-prefixed
/// the way the rest of this wire layer is (see `core::wire`). Reconnects
/// with a fixed delay and surfaces connection-state transitions, mirroring
/// the teacher's stream-reconnect loops.
use crate::logger::{self, LogTag};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Error(String),
    MaxReconnectAttemptsReached,
}

pub struct EntryFrame {
    pub slot: u64,
    pub entries: Vec<u8>,
}

pub struct StreamConfig {
    pub endpoint: String,
    pub reconnect_delay: Duration,
    pub max_attempts: Option<u32>,
}

/// Runs the reconnect loop, pushing frames to `frame_tx` and state
/// transitions to `state_tx`. Returns once `max_attempts` is exhausted or
/// `shutdown` fires.
pub async fn run(
    config: StreamConfig,
    frame_tx: mpsc::Sender<EntryFrame>,
    state_tx: mpsc::Sender<ConnectionState>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut attempts: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }
        if let Some(max) = config.max_attempts {
            if attempts >= max {
                let _ = state_tx.send(ConnectionState::MaxReconnectAttemptsReached).await;
                return;
            }
        }
        attempts += 1;

        match TcpStream::connect(&config.endpoint).await {
            Ok(stream) => {
                logger::info(LogTag::Ingest, &format!("connected to {}", config.endpoint));
                let _ = state_tx.send(ConnectionState::Connected).await;
                attempts = 0;
                if let Err(e) = read_frames(stream, &frame_tx, &mut shutdown).await {
                    logger::warn(LogTag::Ingest, &format!("stream error: {}", e));
                    let _ = state_tx.send(ConnectionState::Error(e)).await;
                }
            }
            Err(e) => {
                let _ = state_tx.send(ConnectionState::Error(e.to_string())).await;
            }
        }

        let _ = state_tx.send(ConnectionState::Disconnected).await;
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn read_frames(
    mut stream: TcpStream,
    frame_tx: &mpsc::Sender<EntryFrame>,
    shutdown: &mut tokio::sync::watch::Receiver<bool>,
) -> Result<(), String> {
    loop {
        tokio::select! {
            result = read_one_frame(&mut stream) => {
                let frame = result?;
                if frame_tx.send(frame).await.is_err() {
                    return Ok(());
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

async fn read_one_frame(stream: &mut TcpStream) -> Result<EntryFrame, String> {
    let mut slot_buf = [0u8; 8];
    stream.read_exact(&mut slot_buf).await.map_err(|e| e.to_string())?;
    let slot = u64::from_le_bytes(slot_buf);

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| e.to_string())?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut entries = vec![0u8; len];
    stream.read_exact(&mut entries).await.map_err(|e| e.to_string())?;

    Ok(EntryFrame { slot, entries })
}
