//! Server-sent events parsing
//!
//! Turns arbitrary byte chunks of a `text/event-stream` body into discrete
//! events, following the WHATWG event stream interpretation rules:
//!
//! - lines end in `\r\n`, `\n` or `\r`, even when split across chunks
//! - a blank line dispatches the event being built
//! - lines starting with `:` are comments
//! - `event`, `data`, `id` and `retry` fields are recognised, others ignored
//! - an event without data is never dispatched

use crate::producer::Producer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::mem;
use tracing::debug;

/// Event type used when the stream does not name one
pub const DEFAULT_EVENT: &str = "message";

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSentEvent {
    /// Last event id seen on the stream when this event was dispatched
    pub id: Option<String>,

    /// Event type
    pub event: String,

    /// Data lines joined with `\n`
    pub data: String,

    /// Reconnection time in milliseconds, if this event carried one
    pub retry: Option<u64>,
}

/// Incremental event stream parser
#[derive(Debug, Default)]
pub struct EventStreamParser {
    line: Vec<u8>,
    after_cr: bool,
    event: String,
    data: String,
    retry: Option<u64>,
    last_event_id: Option<String>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and collect every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerSentEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if mem::take(&mut self.after_cr) && byte == LF {
                continue;
            }
            match byte {
                CR => {
                    self.after_cr = true;
                    self.end_line(&mut events);
                }
                LF => self.end_line(&mut events),
                _ => self.line.push(byte),
            }
        }

        events
    }

    /// Discard whatever was not terminated by a blank line
    pub fn finish(&mut self) {
        if !self.line.is_empty() || !self.data.is_empty() {
            debug!("Dropping incomplete trailing event");
        }
        self.line.clear();
        self.after_cr = false;
        self.event.clear();
        self.data.clear();
        self.retry = None;
    }

    /// Id carried by the most recent `id` field
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn end_line(&mut self, events: &mut Vec<ServerSentEvent>) {
        let raw = mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&raw);

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };

        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => {
                self.last_event_id = (!value.is_empty()).then(|| value.to_string());
            }
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                self.retry = value.parse().ok();
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<ServerSentEvent> {
        let event = mem::take(&mut self.event);
        let retry = self.retry.take();
        let mut data = mem::take(&mut self.data);

        if data.is_empty() {
            return None;
        }
        if data.ends_with('\n') {
            data.pop();
        }

        Some(ServerSentEvent {
            id: self.last_event_id.clone(),
            event: if event.is_empty() {
                DEFAULT_EVENT.to_string()
            } else {
                event
            },
            data,
            retry,
        })
    }
}

/// Producer of events parsed from a producer of byte chunks
pub struct SseProducer<P> {
    inner: P,
    parser: EventStreamParser,
    pending: VecDeque<ServerSentEvent>,
    exhausted: bool,
}

impl<P> SseProducer<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            parser: EventStreamParser::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }
}

#[async_trait]
impl<P> Producer for SseProducer<P>
where
    P: Producer<Item = Vec<u8>>,
{
    type Item = ServerSentEvent;
    type Error = P::Error;

    async fn pull(&mut self) -> Result<Option<ServerSentEvent>, P::Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.exhausted {
                return Ok(None);
            }

            match self.inner.pull().await? {
                Some(chunk) => self.pending.extend(self.parser.feed(&chunk)),
                None => {
                    self.parser.finish();
                    self.exhausted = true;
                    debug!(
                        last_event_id = ?self.parser.last_event_id(),
                        "Event stream ended"
                    );
                }
            }
        }
    }
}
