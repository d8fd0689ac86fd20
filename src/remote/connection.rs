use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};

use crate::error::ActorError;
use crate::remote::codec;
use crate::remote::protocol::Frame;

type PendingReply = oneshot::Sender<Result<Value, ActorError>>;

/// Serves incoming request frames on a connection. Replies are matched to
/// pending requests by the connection itself and never reach the handler.
#[async_trait]
pub(crate) trait FrameHandler: Send + Sync + 'static {
  async fn handle(&self, frame: Frame, conn: Connection) -> Option<Frame>;
}

/// One duplex framed channel to another process: a writer half behind a
/// mutex, a reader task dispatching frames, and a pending-reply map keyed
/// by sequence number. Disconnect is the death signal: every outstanding
/// reply fails with *delivery failure* and the watch flips.
#[derive(Clone)]
pub(crate) struct Connection {
  inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
  writer: Mutex<OwnedWriteHalf>,
  pending: DashMap<u64, PendingReply>,
  seq: AtomicU64,
  alive: watch::Sender<bool>,
}

impl Connection {
  pub fn spawn(stream: TcpStream, handler: Arc<dyn FrameHandler>) -> Connection {
    let (read_half, write_half) = stream.into_split();
    let (alive, _) = watch::channel(true);
    let conn = Connection {
      inner: Arc::new(ConnectionInner {
        writer: Mutex::new(write_half),
        pending: DashMap::new(),
        seq: AtomicU64::new(1),
        alive,
      }),
    };
    tokio::spawn(read_loop(conn.clone(), read_half, handler));
    conn
  }

  pub fn next_seq(&self) -> u64 {
    self.inner.seq.fetch_add(1, Ordering::Relaxed)
  }

  pub fn is_alive(&self) -> bool {
    *self.inner.alive.borrow()
  }

  pub fn death_watch(&self) -> watch::Receiver<bool> {
    self.inner.alive.subscribe()
  }

  pub async fn send_frame(&self, frame: &Frame) -> Result<(), ActorError> {
    if !self.is_alive() {
      return Err(ActorError::delivery("connection closed"));
    }
    let mut writer = self.inner.writer.lock().await;
    match codec::write_frame(&mut *writer, frame).await {
      Ok(()) => Ok(()),
      Err(error) => {
        drop(writer);
        self.mark_dead();
        Err(ActorError::delivery(format!("connection write failed: {}", error)))
      }
    }
  }

  /// Registers a pending reply for `seq`, then sends. The returned
  /// receiver settles when the matching reply frame arrives or the
  /// connection dies.
  pub async fn request(&self, frame: Frame, seq: u64) -> Result<oneshot::Receiver<Result<Value, ActorError>>, ActorError> {
    let (tx, rx) = oneshot::channel();
    self.inner.pending.insert(seq, tx);
    if let Err(error) = self.send_frame(&frame).await {
      self.inner.pending.remove(&seq);
      return Err(error);
    }
    Ok(rx)
  }

  pub async fn close(&self) {
    {
      let mut writer = self.inner.writer.lock().await;
      let _ = writer.shutdown().await;
    }
    self.mark_dead();
  }

  fn mark_dead(&self) {
    self.inner.alive.send_replace(false);
    let pending: Vec<u64> = self.inner.pending.iter().map(|entry| *entry.key()).collect();
    for seq in pending {
      if let Some((_, tx)) = self.inner.pending.remove(&seq) {
        let _ = tx.send(Err(ActorError::delivery("connection closed")));
      }
    }
  }
}

impl Debug for Connection {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Connection").field("alive", &self.is_alive()).finish()
  }
}

async fn read_loop(conn: Connection, mut read_half: OwnedReadHalf, handler: Arc<dyn FrameHandler>) {
  loop {
    match codec::read_frame(&mut read_half).await {
      Ok(Frame::Reply { seq, result }) => {
        if let Some((_, tx)) = conn.inner.pending.remove(&seq) {
          let _ = tx.send(Result::from(result));
        }
      }
      Ok(frame) => {
        let conn = conn.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
          if let Some(reply) = handler.handle(frame, conn.clone()).await {
            let _ = conn.send_frame(&reply).await;
          }
        });
      }
      Err(error) => {
        tracing::debug!(error = %error, "connection reader stopped");
        break;
      }
    }
  }
  conn.mark_dead();
}
