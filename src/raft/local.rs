//! In-process log driver for a single replica group.
//!
//! The driver owns the ordered log and every replica's state machine. Proposals are
//! handled one at a time: the entry is appended, committed, and applied to the leader
//! replica and then to each follower replica in the same order. Only the leader's
//! result travels back to the proposer; follower results are discarded.

use super::{LogEntry, RaftLog, RaftState, ReplicatedLog, StateMachine};
use crate::error::{MetanodeError, Result};
use crate::observability;
use crate::types::{LogIndex, NodeId};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Command for the log driver.
pub enum LogCommand<R> {
    /// Propose a new command to be replicated.
    Propose {
        data: Vec<u8>,
        response: oneshot::Sender<Result<R>>,
    },
    /// Lose leadership; proposals fail with `NotLeader` until re-elected.
    StepDown { leader: Option<NodeId> },
    /// Regain leadership in a new term.
    Elect,
    /// Read committed entries from `index` onwards.
    EntriesFrom {
        index: LogIndex,
        response: oneshot::Sender<Vec<LogEntry>>,
    },
    /// Snapshot the leader replica and compact the log behind it.
    Snapshot {
        response: oneshot::Sender<Result<(LogIndex, Vec<u8>)>>,
    },
    /// Stop the driver.
    Shutdown,
}

/// The log driver, ordering proposals for a replica group.
pub struct LocalLog<S: StateMachine> {
    state: RaftState,
    log: RaftLog,
    leader: S,
    followers: Vec<S>,
    command_rx: mpsc::Receiver<LogCommand<S::Result>>,
}

impl<S> LocalLog<S>
where
    S: StateMachine + 'static,
    S::Result: 'static,
{
    /// Create a driver and the handle used to talk to it.
    ///
    /// The log continues after the leader's last applied index, so a leader restored
    /// from a snapshot keeps numbering entries where the snapshot left off.
    pub fn new(node_id: NodeId, leader: S, followers: Vec<S>) -> (Self, LogHandle<S::Result>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let base = leader.last_applied();
        for (i, follower) in followers.iter().enumerate() {
            if follower.last_applied() != base {
                warn!(
                    follower = i,
                    follower_applied = follower.last_applied(),
                    leader_applied = base,
                    "Follower does not start from the leader's applied index"
                );
            }
        }

        let state = RaftState::resumed(node_id, base);
        // Snapshots carry no term; count them as the term before the current one.
        let log = RaftLog::with_snapshot(base, state.current_term - 1);
        let driver = Self {
            state,
            log,
            leader,
            followers,
            command_rx,
        };
        (driver, LogHandle { command_tx })
    }

    /// Create a driver and run it on the current tokio runtime.
    pub fn spawn(node_id: NodeId, leader: S, followers: Vec<S>) -> LogHandle<S::Result> {
        let (driver, handle) = Self::new(node_id, leader, followers);
        tokio::spawn(driver.run());
        handle
    }

    /// Run the driver until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            node_id = self.state.node_id,
            replicas = self.followers.len() + 1,
            "Log driver started"
        );

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                LogCommand::Propose { data, response } => {
                    let result = self.handle_propose(data);
                    let _ = response.send(result);
                }
                LogCommand::StepDown { leader } => {
                    self.state.become_follower(leader);
                }
                LogCommand::Elect => {
                    if !self.state.is_leader() {
                        self.state.become_leader();
                    }
                }
                LogCommand::EntriesFrom { index, response } => {
                    let _ = response.send(self.log.entries_from(index));
                }
                LogCommand::Snapshot { response } => {
                    let _ = response.send(self.handle_snapshot());
                }
                LogCommand::Shutdown => {
                    info!(node_id = self.state.node_id, "Log driver shutting down");
                    break;
                }
            }
        }
    }

    /// Append, commit, and apply one proposal on every replica.
    fn handle_propose(&mut self, data: Vec<u8>) -> Result<S::Result> {
        if !self.state.is_leader() {
            return Err(MetanodeError::NotLeader {
                leader: self.state.leader_id,
            });
        }

        let index = self.log.last_index() + 1;
        let entry = LogEntry::new(self.state.current_term, index, data);
        self.log.append(entry.clone())?;
        self.state.commit_index = index;

        let result = self.leader.apply(&entry);
        for follower in &mut self.followers {
            follower.apply(&entry);
        }
        self.state.last_applied = index;
        observability::update_log_metrics(self.state.current_term, index);

        debug!(index, term = entry.term, "Applied committed entry");
        Ok(result)
    }

    fn handle_snapshot(&mut self) -> Result<(LogIndex, Vec<u8>)> {
        let data = self.leader.snapshot()?;
        let index = self.leader.last_applied();
        let term = self
            .log
            .get(index)
            .map(|e| e.term)
            .unwrap_or_else(|| self.log.last_term());
        self.log.compact(index, term);
        info!(index, bytes = data.len(), "Snapshot taken, log compacted");
        Ok((index, data))
    }
}

/// Cloneable handle to a running [`LocalLog`].
pub struct LogHandle<R> {
    command_tx: mpsc::Sender<LogCommand<R>>,
}

impl<R> Clone for LogHandle<R> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
        }
    }
}

impl<R: Send + 'static> LogHandle<R> {
    async fn send(&self, cmd: LogCommand<R>) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| MetanodeError::Unavailable("Log driver stopped".into()))
    }

    /// Drop leadership, remembering `leader` as the new leader hint.
    pub async fn step_down(&self, leader: Option<NodeId>) -> Result<()> {
        self.send(LogCommand::StepDown { leader }).await
    }

    /// Regain leadership.
    pub async fn elect(&self) -> Result<()> {
        self.send(LogCommand::Elect).await
    }

    /// Committed entries from `index` onwards.
    pub async fn entries_from(&self, index: LogIndex) -> Result<Vec<LogEntry>> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::EntriesFrom { index, response: tx }).await?;
        rx.await
            .map_err(|_| MetanodeError::Unavailable("Response channel closed".into()))
    }

    /// Snapshot the leader replica; returns the covered index and the snapshot bytes.
    pub async fn snapshot(&self) -> Result<(LogIndex, Vec<u8>)> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::Snapshot { response: tx }).await?;
        rx.await
            .map_err(|_| MetanodeError::Unavailable("Response channel closed".into()))?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(LogCommand::Shutdown).await
    }
}

#[async_trait]
impl<R: Send + 'static> ReplicatedLog<R> for LogHandle<R> {
    async fn propose(&self, command: Vec<u8>) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.send(LogCommand::Propose {
            data: command,
            response: tx,
        })
        .await?;

        rx.await
            .map_err(|_| MetanodeError::Unavailable("Proposal dropped".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appends every command byte to a vector.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<u8>,
        last_applied: LogIndex,
    }

    impl StateMachine for Recorder {
        type Result = usize;

        fn apply(&mut self, entry: &LogEntry) -> usize {
            self.seen.extend_from_slice(entry.data_bytes());
            self.last_applied = entry.index;
            self.seen.len()
        }

        fn last_applied(&self) -> LogIndex {
            self.last_applied
        }

        fn snapshot(&self) -> Result<Vec<u8>> {
            Ok(self.seen.clone())
        }

        fn restore(&mut self, snapshot: &[u8]) -> Result<()> {
            self.seen = snapshot.to_vec();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_propose_returns_leader_result() {
        let handle = LocalLog::spawn(1, Recorder::default(), vec![Recorder::default()]);

        assert_eq!(handle.propose(vec![1, 2]).await.unwrap(), 2);
        assert_eq!(handle.propose(vec![3]).await.unwrap(), 3);

        let entries = handle.entries_from(1).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].index, 2);
    }

    #[tokio::test]
    async fn test_follower_rejects_proposals() {
        let handle = LocalLog::spawn(1, Recorder::default(), Vec::new());

        handle.step_down(Some(2)).await.unwrap();
        match handle.propose(vec![1]).await {
            Err(MetanodeError::NotLeader { leader }) => assert_eq!(leader, Some(2)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(handle.entries_from(1).await.unwrap().is_empty());

        handle.elect().await.unwrap();
        assert_eq!(handle.propose(vec![1]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_compacts_log() {
        let handle = LocalLog::spawn(1, Recorder::default(), Vec::new());
        handle.propose(vec![1]).await.unwrap();
        handle.propose(vec![2]).await.unwrap();

        let (index, data) = handle.snapshot().await.unwrap();
        assert_eq!(index, 2);
        assert_eq!(data, vec![1, 2]);
        assert!(handle.entries_from(1).await.unwrap().is_empty());

        handle.propose(vec![3]).await.unwrap();
        let tail = handle.entries_from(1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].index, 3);
    }

    #[tokio::test]
    async fn test_log_resumes_after_leader_applied_index() {
        let leader = Recorder {
            seen: vec![9],
            last_applied: 7,
        };
        let handle = LocalLog::spawn(1, leader, Vec::new());

        handle.propose(vec![1]).await.unwrap();
        let entries = handle.entries_from(1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, 8);

        let (index, _) = handle.snapshot().await.unwrap();
        assert_eq!(index, 8);
    }

    #[tokio::test]
    async fn test_shutdown_makes_log_unavailable() {
        let handle = LocalLog::spawn(1, Recorder::default(), Vec::new());
        handle.shutdown().await.unwrap();

        let err = handle.propose(vec![1]).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
