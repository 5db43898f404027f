//! Session orchestration
//!
//! Drives one read session end to end: device lock, tool launch, fragment
//! consumption, graph assembly, reconcile, and terminal state. Cancellation
//! is honored at any point before the commit; the commit itself is the
//! point of no return.

use crate::error::SessionError;
use crate::graph::{Discovery, GraphBuilder};
use crate::parser::{parse_record, Fragment};
use crate::publish::StatusPublisher;
use crate::reconcile::{CommitOutcome, ReconcileOptions, Reconciler};
use crate::session::{ReadSession, SessionState};
use crate::tool::{RawEvent, ReadStream, ToolAdapter};
use discat_common::db::ReadStatus;
use discat_common::events::{EventBus, Milestone};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tracks which devices have an active session.
///
/// Locks are per device path as given; symlinks are not resolved, so a
/// symlink to `/dev/sr0` is a distinct device to the registry.
#[derive(Debug, Default)]
pub struct DeviceLockRegistry {
    held: Mutex<HashSet<PathBuf>>,
}

impl DeviceLockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim a device, or `None` if another session holds it
    pub fn try_acquire(self: &Arc<Self>, device: &Path) -> Option<DeviceLockGuard> {
        let mut held = self.held.lock().unwrap();
        if !held.insert(device.to_path_buf()) {
            return None;
        }
        Some(DeviceLockGuard {
            registry: Arc::clone(self),
            device: device.to_path_buf(),
        })
    }

    pub fn is_held(&self, device: &Path) -> bool {
        self.held.lock().unwrap().contains(device)
    }
}

/// Releases the device claim on drop
#[derive(Debug)]
pub struct DeviceLockGuard {
    registry: Arc<DeviceLockRegistry>,
    device: PathBuf,
}

impl Drop for DeviceLockGuard {
    fn drop(&mut self) {
        self.registry.held.lock().unwrap().remove(&self.device);
    }
}

/// One request to read and catalog a disc
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub device_path: PathBuf,
    pub explicit_reread: bool,
}

/// Final report for a finished session
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub state: SessionState,
    pub commit: Option<CommitOutcome>,
    pub error: Option<String>,
}

/// Runs read sessions
pub struct Orchestrator {
    bus: Arc<EventBus>,
    adapter: ToolAdapter,
    device_locks: Arc<DeviceLockRegistry>,
    reconciler: Reconciler,
    idle_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<EventBus>,
        adapter: ToolAdapter,
        reconciler: Reconciler,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            adapter,
            device_locks: DeviceLockRegistry::new(),
            reconciler,
            idle_timeout,
        }
    }

    /// Run one session against a real tool process.
    ///
    /// `DeviceBusy` is the only error returned directly; everything after
    /// the device claim is reported through the outcome so the session
    /// always reaches a terminal state.
    pub async fn run(
        &self,
        request: ReadRequest,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        let (guard, mut session, publisher) = self.begin(&request)?;

        let stream = match self.adapter.start_read(&request.device_path).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(session_id = %session.session_id, "Tool launch failed: {}", e);
                return Ok(self.fail_session(&mut session, &publisher, e));
            }
        };

        let outcome = self
            .drive_session(&mut session, &publisher, stream, cancel)
            .await;
        drop(guard);
        Ok(outcome)
    }

    /// Run a session over an already-open event stream. Exercises the same
    /// pipeline as `run` without spawning a tool process; tests feed it a
    /// scripted stream.
    pub async fn run_with_stream(
        &self,
        request: ReadRequest,
        stream: ReadStream,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        let (guard, mut session, publisher) = self.begin(&request)?;

        let outcome = self
            .drive_session(&mut session, &publisher, stream, cancel)
            .await;
        drop(guard);
        Ok(outcome)
    }

    /// Claim the device, announce the session, and enter `Launching`
    fn begin(
        &self,
        request: &ReadRequest,
    ) -> Result<(DeviceLockGuard, ReadSession, StatusPublisher), SessionError> {
        let guard = self
            .device_locks
            .try_acquire(&request.device_path)
            .ok_or_else(|| {
                SessionError::DeviceBusy(request.device_path.display().to_string())
            })?;

        let mut session = ReadSession::new(request.device_path.clone(), request.explicit_reread);
        let publisher = StatusPublisher::new(Arc::clone(&self.bus), session.session_id);
        publisher.publish(Milestone::SessionStarted {
            device_path: request.device_path.display().to_string(),
        });
        session.transition_to(SessionState::Launching);

        Ok((guard, session, publisher))
    }

    async fn drive_session(
        &self,
        session: &mut ReadSession,
        publisher: &StatusPublisher,
        mut stream: ReadStream,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        session.transition_to(SessionState::Reading);

        let mut builder = GraphBuilder::new();
        let mut current_operation = String::new();
        let mut saw_output = false;
        let (clean, detail) = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(session_id = %session.session_id, "Session cancelled during read");
                    return self.fail_session(session, publisher, SessionError::Cancelled);
                }
                event = timeout(self.idle_timeout, stream.next_event()) => event,
            };

            match event {
                Err(_) => {
                    break (false, "No tool output before idle timeout".to_string());
                }
                Ok(None) => {
                    break (false, "Tool output channel closed unexpectedly".to_string());
                }
                Ok(Some(RawEvent::Closed { clean, detail })) => break (clean, detail),
                Ok(Some(RawEvent::Record(record))) => {
                    if !saw_output {
                        saw_output = true;
                        publisher.publish(Milestone::ToolConnected);
                        session.transition_to(SessionState::Parsing);
                    }
                    let fragment = match parse_record(&record) {
                        Ok(fragment) => fragment,
                        Err(e) => {
                            warn!(session_id = %session.session_id, "Skipping record: {}", e);
                            continue;
                        }
                    };
                    self.observe_fragment(session, publisher, &fragment, &mut current_operation);
                    match builder.apply(&fragment) {
                        Ok(Discovery::Title(title_index)) => {
                            publisher.publish(Milestone::TitleDiscovered { title_index });
                        }
                        Ok(Discovery::Stream {
                            title_index,
                            stream_index,
                        }) => {
                            publisher.publish(Milestone::StreamDiscovered {
                                title_index,
                                stream_index,
                            });
                        }
                        Ok(Discovery::None) => {}
                        Err(e) => {
                            warn!(session_id = %session.session_id, "Skipping fragment: {}", e);
                        }
                    }
                }
            }
        };

        if !builder.has_disc_info() {
            let reason = if clean {
                "Tool produced no disc metadata".to_string()
            } else {
                detail.clone()
            };
            return self.fail_session(session, publisher, SessionError::ToolCrashed(reason));
        }

        if let Some(declared) = builder.declared_title_count() {
            if usize::from(declared) != builder.title_count() {
                warn!(
                    session_id = %session.session_id,
                    declared,
                    seen = builder.title_count(),
                    "Title count mismatch between TCOUT and observed titles"
                );
            }
        }

        let read_status = if clean {
            ReadStatus::Complete
        } else {
            warn!(session_id = %session.session_id, "Tool exited uncleanly: {}", detail);
            ReadStatus::Partial
        };
        let graph = builder.finish();

        if clean {
            publisher.publish(Milestone::ParseComplete {
                title_count: graph.titles.len(),
            });
        }

        // Last cancellation check; the commit is not interruptible
        if cancel.is_cancelled() {
            info!(session_id = %session.session_id, "Session cancelled before commit");
            return self.fail_session(session, publisher, SessionError::Cancelled);
        }

        session.transition_to(SessionState::Reconciling);
        let opts = ReconcileOptions {
            explicit_reread: session.explicit_reread,
            read_status,
            device_path: Some(session.device_path.display().to_string()),
        };
        let commit = match self.reconciler.reconcile(&graph, &opts).await {
            Ok(commit) => commit,
            Err(e) => {
                error!(session_id = %session.session_id, "Reconcile failed: {}", e);
                return self.fail_session(session, publisher, e);
            }
        };

        session.transition_to(SessionState::Finalizing);
        publisher.publish(Milestone::CommitComplete {
            fingerprint: commit.fingerprint.clone(),
            generation: commit.generation,
            read_status: commit.read_status.clone(),
        });

        let terminal = match read_status {
            ReadStatus::Partial => SessionState::Partial,
            _ => SessionState::Complete,
        };
        session.transition_to(terminal);
        info!(
            session_id = %session.session_id,
            state = %session.state,
            fingerprint = %commit.fingerprint,
            generation = commit.generation,
            "Session finished"
        );

        SessionOutcome {
            session_id: session.session_id,
            state: session.state,
            commit: Some(commit),
            error: None,
        }
    }

    fn observe_fragment(
        &self,
        session: &ReadSession,
        publisher: &StatusPublisher,
        fragment: &Fragment,
        current_operation: &mut String,
    ) {
        match fragment {
            Fragment::Message { code, text } => {
                info!(session_id = %session.session_id, code, "Tool: {}", text);
            }
            Fragment::ProgressCurrent { name, .. } | Fragment::ProgressTotal { name, .. } => {
                *current_operation = name.clone();
            }
            Fragment::ProgressValue {
                current,
                total,
                max,
            } => {
                if *max > 0 {
                    publisher.publish(Milestone::Progress {
                        operation: current_operation.clone(),
                        current_fraction: *current as f64 / *max as f64,
                        total_fraction: *total as f64 / *max as f64,
                    });
                }
            }
            Fragment::DriveScan {
                index,
                drive_name,
                disc_name,
                ..
            } => {
                debug!(
                    session_id = %session.session_id,
                    drive = index,
                    "Drive scan: {} ({})",
                    drive_name,
                    disc_name
                );
            }
            Fragment::Unknown { kind } => {
                debug!(session_id = %session.session_id, kind = %kind, "Skipping unknown record kind");
            }
            _ => {}
        }
    }

    fn fail_session(
        &self,
        session: &mut ReadSession,
        publisher: &StatusPublisher,
        error: SessionError,
    ) -> SessionOutcome {
        publisher.publish(Milestone::SessionFailed {
            reason: error.to_string(),
        });
        session.transition_to(SessionState::Failed);
        SessionOutcome {
            session_id: session.session_id,
            state: session.state,
            commit: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lock_exclusive() {
        let registry = DeviceLockRegistry::new();
        let guard = registry.try_acquire(Path::new("/dev/sr0"));
        assert!(guard.is_some());
        assert!(registry.try_acquire(Path::new("/dev/sr0")).is_none());
        // Different device is independent
        assert!(registry.try_acquire(Path::new("/dev/sr1")).is_some());
    }

    #[test]
    fn test_device_lock_released_on_drop() {
        let registry = DeviceLockRegistry::new();
        {
            let _guard = registry.try_acquire(Path::new("/dev/sr0")).unwrap();
            assert!(registry.is_held(Path::new("/dev/sr0")));
        }
        assert!(!registry.is_held(Path::new("/dev/sr0")));
    }

}
