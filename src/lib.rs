//! Rebroadcast - multicast replay cache for async producers
//!
//! Drives a single-use, pull-based producer at most once and replays the
//! whole produced sequence, or its failure, to any number of cursors
//! attached before, during or after production.

pub mod cli;
pub mod config;
pub mod error;
pub mod producer;
pub mod replay;
pub mod sse;

pub use error::{RebroadcastError, RebroadcastResult, ReplayError};
pub use producer::{BoxProducer, IterProducer, OnComplete, Producer, ProducerExt, StreamProducer};
pub use replay::{CacheStatus, Cursor, ReplayCache, ReplayOptions};
pub use sse::{EventStreamParser, ServerSentEvent, SseProducer};
