//! Poll group membership.

use std::collections::BTreeSet;

use crate::core::ConnectionHandle;

/// A set of connections drained together.
///
/// Membership is changed only through the sockets API, which keeps each
/// connection in at most one group.
#[derive(Debug, Default)]
pub(crate) struct PollGroup {
    members: BTreeSet<ConnectionHandle>,
}

impl PollGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Returns false if it was already present.
    pub fn insert(&mut self, connection: ConnectionHandle) -> bool {
        self.members.insert(connection)
    }

    /// Remove a member. Returns false if it was not present.
    pub fn remove(&mut self, connection: ConnectionHandle) -> bool {
        self.members.remove(&connection)
    }

    pub fn members(&self) -> impl Iterator<Item = ConnectionHandle> + '_ {
        self.members.iter().copied()
    }

    /// Empty the group, returning the former members.
    pub fn take_members(&mut self) -> Vec<ConnectionHandle> {
        std::mem::take(&mut self.members).into_iter().collect()
    }
}

/// Pick the member whose oldest pending message arrived first.
///
/// `front` yields the arrival sequence of a member's oldest inbound message.
pub(crate) fn next_ready(
    members: impl IntoIterator<Item = ConnectionHandle>,
    mut front: impl FnMut(ConnectionHandle) -> Option<u64>,
) -> Option<ConnectionHandle> {
    members
        .into_iter()
        .filter_map(|c| front(c).map(|seq| (seq, c)))
        .min()
        .map(|(_, c)| c)
}
