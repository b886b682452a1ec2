//! Locator RPC server.
//!
//! Accepts TCP connections on the locator port. Each connection gets a
//! reader loop and a writer task joined by an unbounded frame queue. The
//! queue's sender is what a synchronize subscriber hands to the publisher,
//! weakly, so a connection that goes away simply stops receiving pushes.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use locator_core::frame::{read_frame, write_frame};
use locator_core::{ErrorCode, Frame, LocatorError};
use locator_services::{SubscriberId, Upstream};

use crate::locator::Command;

/// Accept connections until the task is aborted. Aborting also drops every
/// connection this loop spawned.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<Command>,
) -> Result<()> {
    let mut connections = JoinSet::new();
    let mut next_id: SubscriberId = 1;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                let id = next_id;
                next_id += 1;
                tracing::debug!(%remote, connection = id, "locator connection accepted");
                connections.spawn(serve_connection(stream, remote, id, commands.clone()));
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    id: SubscriberId,
    commands: mpsc::UnboundedSender<Command>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = frame == Frame::Choke;
            if let Err(e) = write_frame(&mut writer, &frame).await {
                tracing::debug!(%remote, error = %e, "locator connection write failed");
                break;
            }
            if closing {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%remote, error = %e, "dropping locator connection");
                let _ = tx.send(Frame::error(&LocatorError::from(e)));
                break;
            }
        };

        let handled = match frame {
            Frame::Resolve { name } => {
                let (reply, answer) = oneshot::channel();
                if commands.send(Command::Resolve { name, reply }).is_err() {
                    break;
                }
                let Ok(result) = answer.await else { break };
                let response = match result {
                    Ok(info) => Frame::Resolved { info },
                    Err(e) => Frame::error(&e),
                };
                tx.send(response).is_ok()
            }
            Frame::Synchronize => commands
                .send(Command::Subscribe(Upstream::new(id, &tx)))
                .is_ok(),
            other => {
                tracing::debug!(%remote, kind = other.kind(), "unsupported locator request");
                tx.send(Frame::Error {
                    code: ErrorCode::UnknownMethod,
                    message: format!("unsupported request '{}'", other.kind()),
                })
                .is_ok()
            }
        };

        if !handled {
            break;
        }
    }

    drop(tx);
    let _ = writer_task.await;
    tracing::debug!(%remote, connection = id, "locator connection closed");
}
