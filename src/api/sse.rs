//! Live update channel: an incremental `text/event-stream` decoder and the
//! channel handle the tracker listens on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type; `"message"` when the server sent no `event:` field.
    pub event: String,
    pub data: String,
}

impl SseFrame {
    /// Unnamed events are the only ones delivered as progress messages.
    pub fn is_message(&self) -> bool {
        self.event == "message"
    }
}

/// Incremental `text/event-stream` parser.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly. LF and CRLF line endings
/// are accepted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and collect every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry only matter for automatic reconnection, which the
            // tracker replaces with polling.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Connection status of a live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }
}

/// Signals delivered by a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The connection was acknowledged.
    Open,
    /// Raw payload of an unnamed event.
    Message(String),
    /// The connection failed; check [`LiveChannel::ready_state`] for whether it is gone.
    Error,
}

/// Receiving end of a live update channel.
///
/// Dropping or closing the channel aborts the task that feeds it.
pub struct LiveChannel {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    ready_state: Arc<AtomicU8>,
    reader: Option<JoinHandle<()>>,
    drained: bool,
}

/// Producing end of a live update channel.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    ready_state: Arc<AtomicU8>,
}

impl LiveChannel {
    /// Create a connected sender/channel pair in the `Connecting` state.
    pub fn pair() -> (ChannelSender, LiveChannel) {
        let (tx, events) = mpsc::unbounded_channel();
        let ready_state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let sender = ChannelSender {
            tx,
            ready_state: ready_state.clone(),
        };
        let channel = LiveChannel {
            events,
            ready_state,
            reader: None,
            drained: false,
        };
        (sender, channel)
    }

    /// Tie the lifetime of the task producing events to this channel.
    pub fn attach(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::SeqCst))
    }

    /// Wait for the next signal.
    ///
    /// When every sender is gone the channel reports `Closed` with one final
    /// `Error`, then never yields again.
    pub async fn next_event(&mut self) -> ChannelEvent {
        if self.drained {
            return std::future::pending().await;
        }
        match self.events.recv().await {
            Some(event) => event,
            None => {
                self.drained = true;
                self.ready_state
                    .store(ReadyState::Closed as u8, Ordering::SeqCst);
                ChannelEvent::Error
            }
        }
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&mut self) {
        self.ready_state
            .store(ReadyState::Closed as u8, Ordering::SeqCst);
        self.events.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl ChannelSender {
    pub fn open(&self) -> bool {
        self.ready_state
            .store(ReadyState::Open as u8, Ordering::SeqCst);
        self.tx.send(ChannelEvent::Open).is_ok()
    }

    pub fn message(&self, data: impl Into<String>) -> bool {
        self.tx.send(ChannelEvent::Message(data.into())).is_ok()
    }

    /// Report a transient error; the channel keeps its current state.
    pub fn error(&self) -> bool {
        self.tx.send(ChannelEvent::Error).is_ok()
    }

    /// Report that the connection is gone for good.
    pub fn fail(&self) -> bool {
        self.ready_state
            .store(ReadyState::Closed as u8, Ordering::SeqCst);
        self.tx.send(ChannelEvent::Error).is_ok()
    }

    /// True once the receiving channel was closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
