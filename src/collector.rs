//! Fan-out to every enabled source, fan-in to one stream.

use std::sync::Arc;

use ahash::AHashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::sources::{Session, Source, SourceResult, CHANNEL_CAPACITY};

pub struct Collector {
    session: Arc<Session>,
    sources: Vec<Arc<dyn Source>>,
}

impl Collector {
    pub fn new(session: Arc<Session>, sources: Vec<Arc<dyn Source>>) -> Self {
        Self { session, sources }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Start every source and merge their streams. Items from one source keep their
    /// order; across sources, whichever is ready first goes first. The merged stream
    /// closes once every source stream has closed.
    pub fn collect(&self) -> mpsc::Receiver<SourceResult> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let streams: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let name = source.name();
                let worker_rx = source.run(self.session.clone());
                receiver_stream(worker_rx)
                    .chain(stream::once(async move { Event::Closed(name) }))
                    .boxed()
            })
            .collect();
        let names: Vec<&'static str> = self.sources.iter().map(|s| s.name()).collect();

        tokio::spawn(async move {
            tracing::debug!(sources = ?names, "collection started");
            let mut merged = stream::select_all(streams);
            let mut counts: AHashMap<&'static str, (usize, usize)> = AHashMap::new();

            while let Some(event) = merged.next().await {
                match event {
                    Event::Item(result) => {
                        let entry = counts.entry(result.source()).or_default();
                        match &result {
                            SourceResult::Url { .. } => entry.0 += 1,
                            SourceResult::Error { .. } => entry.1 += 1,
                        }
                        if tx.send(result).await.is_err() {
                            tracing::debug!("collector output dropped, stopping");
                            return;
                        }
                    }
                    Event::Closed(name) => {
                        let (urls, errors) = counts.get(name).copied().unwrap_or_default();
                        tracing::info!(source = name, urls, errors, "source finished");
                    }
                }
            }
            tracing::debug!("all sources finished");
        });

        rx
    }
}

enum Event {
    Item(SourceResult),
    Closed(&'static str),
}

fn receiver_stream(rx: mpsc::Receiver<SourceResult>) -> impl futures::Stream<Item = Event> + Send {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (Event::Item(item), rx)) })
}
