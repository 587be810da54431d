//! Replay command - parse an event stream once and fan it out

use crate::cli::args::{OutputFormat, ReplayArgs};
use crate::config::Config;
use crate::error::{RebroadcastError, RebroadcastResult, ReplayError};
use crate::producer::{ProducerExt, StreamProducer};
use crate::replay::{ReplayCache, ReplayOptions};
use crate::sse::{ServerSentEvent, SseProducer};
use console::style;
use futures_util::stream;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Cache of events parsed from one input
pub type EventCache = ReplayCache<ServerSentEvent, io::Error>;

/// Execute the replay command
pub async fn execute(args: ReplayArgs, config: &Config) -> RebroadcastResult<()> {
    let consumers = args.consumers.unwrap_or(config.replay.consumers).max(1);
    let label = args.label.unwrap_or_else(|| config.replay.label.clone());

    let input = open_input(args.file.as_deref()).await?;
    let cache = event_cache(input, config.replay.chunk_size, label);
    let events = fan_out(&cache, consumers).await?;

    info!(
        "Replayed {} event(s) to {} consumer(s)",
        events.len(),
        consumers
    );

    match args.format {
        OutputFormat::Table => print_table(&events, consumers),
        OutputFormat::Json => print_json(&events)?,
        OutputFormat::Plain => print_plain(&events),
    }

    Ok(())
}

async fn open_input(path: Option<&Path>) -> RebroadcastResult<Box<dyn AsyncRead + Unpin + Send>> {
    match path {
        None => Ok(Box::new(tokio::io::stdin())),
        Some(path) if path == Path::new("-") => Ok(Box::new(tokio::io::stdin())),
        Some(path) => {
            if !path.exists() {
                return Err(RebroadcastError::PathNotFound(path.to_path_buf()));
            }
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| RebroadcastError::io(format!("opening {}", path.display()), e))?;
            Ok(Box::new(file))
        }
    }
}

/// Build a cache of the events read from `reader`, `chunk_size` bytes per pull
pub fn event_cache<R>(reader: R, chunk_size: usize, label: String) -> EventCache
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    let chunks = stream::unfold(reader, move |mut reader| async move {
        let mut buf = vec![0u8; chunk_size];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), reader))
            }
            Err(e) => Some((Err(e), reader)),
        }
    });

    SseProducer::new(StreamProducer::new(Box::pin(chunks)))
        .on_complete(|| debug!("Event stream input exhausted"))
        .replay_with(ReplayOptions::default().with_label(label))
}

/// Run `consumers` concurrent cursors over the cache and return the
/// sequence they all observed
pub async fn fan_out(
    cache: &EventCache,
    consumers: usize,
) -> RebroadcastResult<Vec<ServerSentEvent>> {
    let handles: Vec<_> = (0..consumers)
        .map(|consumer| {
            let mut cursor = cache.attach();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(event) = cursor.next().await? {
                    seen.push(event);
                }
                debug!(consumer, events = seen.len(), "Consumer finished");
                Ok::<_, ReplayError<io::Error>>(seen)
            })
        })
        .collect();

    let mut observed = Vec::with_capacity(consumers);
    for handle in handles {
        let seen = handle
            .await
            .map_err(|e| RebroadcastError::Internal(format!("consumer task failed: {}", e)))??;
        observed.push(seen);
    }

    agreed_sequence(observed)
}

/// The sequence every consumer saw, or the first index where two differ
fn agreed_sequence(
    observed: Vec<Vec<ServerSentEvent>>,
) -> RebroadcastResult<Vec<ServerSentEvent>> {
    let mut observed = observed.into_iter();
    let first = observed.next().unwrap_or_default();

    for other in observed {
        let len = first.len().max(other.len());
        if let Some(index) = (0..len).find(|&i| first.get(i) != other.get(i)) {
            return Err(RebroadcastError::Divergence { index });
        }
    }

    Ok(first)
}

fn print_table(events: &[ServerSentEvent], consumers: usize) {
    println!(
        "{:<6} {:<16} {:<12} {}",
        style("#").bold(),
        style("EVENT").bold(),
        style("ID").bold(),
        style("DATA").bold()
    );
    println!("{}", "-".repeat(60));

    for (index, event) in events.iter().enumerate() {
        println!(
            "{:<6} {:<16} {:<12} {}",
            index,
            event.event,
            event.id.as_deref().unwrap_or("-"),
            event.data.replace('\n', "\\n")
        );
    }

    println!();
    println!(
        "{} event(s) replayed to {} consumer(s)",
        events.len(),
        consumers
    );
}

fn print_json(events: &[ServerSentEvent]) -> RebroadcastResult<()> {
    println!("{}", serde_json::to_string_pretty(events)?);
    Ok(())
}

fn print_plain(events: &[ServerSentEvent]) {
    for event in events {
        println!("{}", event.data);
    }
}
