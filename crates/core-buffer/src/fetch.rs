//! The fetch loop: the one thread allowed to touch the record source.
//!
//! Lifecycle mirrors the buffer's condition protocol: clear the buffer, open
//! the connection, then wait for commands. `Stop` releases the source and
//! exits; `GetRecords` executes the current prefetch plan. A transient query
//! failure is logged and the loop resumes waiting so one bad fetch does not
//! tear down the viewer; a failed connection is fatal to the thread (the
//! buffer stays stoppable).

use crate::{FetchCommand, RecordSource, ScreenBuffer};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Stopped,
    ConnectFailed,
}

impl ExitReason {
    fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Stopped => "stopped",
            ExitReason::ConnectFailed => "connect_failed",
        }
    }
}

pub(crate) fn run(buffer: Arc<ScreenBuffer>, mut source: Box<dyn RecordSource>) {
    info!(target: "buffer.fetch", "fetch_thread_started");
    buffer.clear();

    if let Err(e) = source.start_connection() {
        error!(target: "buffer.fetch", error = %e, "source_connect_failed");
        info!(
            target: "buffer.fetch",
            reason = ExitReason::ConnectFailed.as_str(),
            "fetch_thread_stopped"
        );
        return;
    }

    loop {
        match buffer.wait_command() {
            FetchCommand::Stop => break,
            FetchCommand::GetRecords => {
                if let Err(e) = buffer.pull_records(source.as_mut()) {
                    warn!(target: "buffer.fetch", error = %e, "fetch_failed");
                }
            }
        }
    }

    if let Err(e) = source.stop_connection() {
        warn!(target: "buffer.fetch", error = %e, "source_disconnect_failed");
    }
    info!(
        target: "buffer.fetch",
        reason = ExitReason::Stopped.as_str(),
        "fetch_thread_stopped"
    );
}
