use crate::cluster::DatanodeId;

/// Where the invalidation rotation resumes on the next pass.
///
/// Stores the last datanode served rather than an index, so nodes joining
/// or leaving the backlog map between passes never leave it dangling: the
/// next pass simply starts at the first datanode ordered after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassCursor {
    last_served: Option<DatanodeId>,
}

impl PassCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last datanode served, `None` at the start of the rotation
    pub fn position(&self) -> Option<&DatanodeId> {
        self.last_served.as_ref()
    }

    pub fn advance(&mut self, served: DatanodeId) {
        self.last_served = Some(served);
    }

    pub fn reset(&mut self) {
        self.last_served = None;
    }
}
