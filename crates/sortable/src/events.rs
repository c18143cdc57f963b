use crate::dom::NodeId;

/// Payload of a completed drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortUpdate {
    pub item: NodeId,
    pub origin: NodeId,
    pub destination: NodeId,
    pub old_index: usize,
    pub new_index: usize,
}

impl SortUpdate {
    /// False when the item was dropped back into the slot it came from.
    pub fn changed(&self) -> bool {
        self.origin != self.destination || self.old_index != self.new_index
    }
}

/// Notifications queued for the host, each addressed to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortEvent {
    Start {
        container: NodeId,
        item: NodeId,
        index: usize,
    },
    Update(SortUpdate),
    Stop {
        container: NodeId,
        item: NodeId,
    },
}

impl SortEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SortEvent::Start { .. } => "sortstart",
            SortEvent::Update(_) => "sortupdate",
            SortEvent::Stop { .. } => "sortstop",
        }
    }

    /// The container the notification is dispatched on.
    pub fn target(&self) -> NodeId {
        match self {
            SortEvent::Start { container, .. } | SortEvent::Stop { container, .. } => *container,
            SortEvent::Update(update) => update.destination,
        }
    }
}
