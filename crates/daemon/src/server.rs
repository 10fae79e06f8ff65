// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Unix socket server.
//!
//! Each connected page gets its own task. Replies and worker broadcasts
//! share one outgoing queue per page; fetches run concurrently and are
//! matched to their request by id.

use std::io;

use tether_ipc::{framing, PageMessage, WorkerMessage};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::worker::Worker;

/// Accept pages until a `SHUTDOWN` message arrives or `shutdown` flips.
pub async fn serve(
    listener: UnixListener,
    worker: Worker,
    shutdown: watch::Sender<bool>,
) -> io::Result<()> {
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let worker = worker.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, worker, shutdown).await {
                            warn!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => warn!("failed to accept connection: {}", e),
            },
            _ = stop.changed() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Serve a single page connection.
pub(crate) async fn handle_connection(
    stream: UnixStream,
    worker: Worker,
    shutdown: watch::Sender<bool>,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    debug!("page connected");

    let (out_tx, mut out_rx) = mpsc::channel::<WorkerMessage>(64);
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Err(e) = framing::write_message_async(&mut writer, &message).await {
                debug!("write to page failed: {}", e);
                break;
            }
        }
    });

    // Reads are not cancel-safe, so they run in their own task.
    let (in_tx, mut in_rx) = mpsc::channel::<io::Result<PageMessage>>(16);
    let reader_task = tokio::spawn(async move {
        loop {
            match framing::read_message_async::<_, PageMessage>(&mut reader).await {
                Ok(Some(message)) => {
                    if in_tx.send(Ok(message)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = in_tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    let mut events = worker.subscribe();
    let mut stop = shutdown.subscribe();
    let result = loop {
        tokio::select! {
            incoming = in_rx.recv() => match incoming {
                Some(Ok(PageMessage::Fetch { id, request })) => {
                    let worker = worker.clone();
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let response = worker.fetch(request).await;
                        let _ = out_tx.send(WorkerMessage::Response { id, response }).await;
                    });
                }
                Some(Ok(PageMessage::Shutdown)) => {
                    let _ = out_tx.send(WorkerMessage::ShuttingDown).await;
                    let _ = shutdown.send(true);
                    break Ok(());
                }
                Some(Ok(message)) => {
                    if let Some(reply) = worker.handle(message).await {
                        if out_tx.send(reply).await.is_err() {
                            break Ok(());
                        }
                    }
                }
                Some(Err(e)) => {
                    let _ = out_tx
                        .send(WorkerMessage::Error { message: e.to_string() })
                        .await;
                    break Err(e);
                }
                None => break Ok(()),
            },
            event = events.recv() => match event {
                Ok(message) => {
                    if out_tx.send(message).await.is_err() {
                        break Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("page lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
            _ = stop.changed() => break Ok(()),
        }
    };

    reader_task.abort();
    drop(out_tx);
    let _ = writer_task.await;
    debug!("page disconnected");
    result
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
