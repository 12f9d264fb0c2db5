use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// Application events
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
  /// One line of user input
  Line(String),
  /// Input closed
  Eof,
  /// Periodic tick for query polling and cache housekeeping
  Tick,
}

/// Event handler that produces events from line input and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Read lines from stdin, ticking at `tick_rate`
  pub fn new(tick_rate: Duration) -> Self {
    Self::from_reader(tokio::io::stdin(), tick_rate)
  }

  pub fn from_reader<R>(reader: R, tick_rate: Duration) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn input reader
    let input_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(reader).lines();
      loop {
        let event = match lines.next_line().await {
          Ok(Some(line)) => Event::Line(line),
          Ok(None) => Event::Eof,
          Err(e) => {
            warn!(error = %e, "failed to read input");
            Event::Eof
          }
        };
        let done = event == Event::Eof;
        if input_tx.send(event).is_err() || done {
          break;
        }
      }
    });

    // Spawn ticker
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        if tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
