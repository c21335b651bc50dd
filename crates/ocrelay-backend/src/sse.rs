// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use ocrelay_model::parse_session_event;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::EventStream;

/// SSE connections are treated as dead if no byte arrives within this window,
/// matching the idle-disconnect convention used for the upstream model
/// provider stream.
const IDLE_TIMEOUT: Duration = Duration::from_secs(35);

pub(crate) async fn open_event_stream(
    client: &Client,
    url: &str,
    cancel: CancellationToken,
) -> Result<EventStream, BackendError> {
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    let (tx, rx) = mpsc::channel(64);
    let byte_stream = resp.bytes_stream();
    tokio::spawn(pump(byte_stream, tx, cancel));
    Ok(Box::pin(ReceiverStream::new(rx)))
}

async fn pump<S>(
    stream: S,
    tx: mpsc::Sender<Result<ocrelay_model::SessionEvent, BackendError>>,
    cancel: CancellationToken,
) where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
{
    let mut stream = stream.eventsource();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("event stream cancelled");
                return;
            }
            next = timeout(IDLE_TIMEOUT, stream.next()) => next,
        };

        let item = match next {
            Ok(Some(Ok(event))) => event,
            Ok(Some(Err(e))) => {
                let _ = tx
                    .send(Err(BackendError::protocol(format!("sse stream error: {e}"))))
                    .await;
                return;
            }
            Ok(None) => {
                let _ = tx
                    .send(Err(BackendError::protocol("event stream closed")))
                    .await;
                return;
            }
            Err(_) => {
                let _ = tx.send(Err(BackendError::Timeout)).await;
                return;
            }
        };

        match parse_session_event(&item.data) {
            Ok(event) => {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, data = %item.data, "dropping malformed sse event");
                continue;
            }
        }
    }
}
