//! Replica group state tracked by the log driver.

use crate::types::{LogIndex, NodeId, Term};
use serde::{Deserialize, Serialize};

/// Role of this node in the replica group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Follower state - forwards nothing, rejects proposals.
    Follower,
    /// Leader state - accepts proposals and orders them.
    Leader,
}

impl NodeState {
    pub fn is_leader(&self) -> bool {
        matches!(self, NodeState::Leader)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Follower => write!(f, "Follower"),
            NodeState::Leader => write!(f, "Leader"),
        }
    }
}

/// Leadership and apply progress of a replica group.
#[derive(Debug)]
pub struct RaftState {
    /// This node's ID.
    pub node_id: NodeId,
    /// Current role.
    pub state: NodeState,
    /// Current leader ID (if known).
    pub leader_id: Option<NodeId>,
    /// Current term.
    pub current_term: Term,
    /// Index of highest log entry known to be committed.
    pub commit_index: LogIndex,
    /// Index of highest log entry applied to every replica.
    pub last_applied: LogIndex,
}

impl RaftState {
    /// New group state; the local node starts as leader of term 1.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: NodeState::Leader,
            leader_id: Some(node_id),
            current_term: 1,
            commit_index: 0,
            last_applied: 0,
        }
    }

    /// Group state resuming after everything up to `applied` is already applied.
    pub fn resumed(node_id: NodeId, applied: LogIndex) -> Self {
        Self {
            commit_index: applied,
            last_applied: applied,
            ..Self::new(node_id)
        }
    }

    /// Transition to follower state.
    pub fn become_follower(&mut self, leader_id: Option<NodeId>) {
        self.state = NodeState::Follower;
        self.leader_id = leader_id;

        tracing::info!(
            node_id = self.node_id,
            term = self.current_term,
            leader = ?leader_id,
            "Became follower"
        );
    }

    /// Transition to leader state in a new term.
    pub fn become_leader(&mut self) {
        self.current_term += 1;
        self.state = NodeState::Leader;
        self.leader_id = Some(self.node_id);

        tracing::info!(
            node_id = self.node_id,
            term = self.current_term,
            "Became leader"
        );
    }

    pub fn is_leader(&self) -> bool {
        self.state.is_leader()
    }
}
