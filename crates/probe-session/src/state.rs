use probe_core::{
    DirectoryNode, InvocationRecord, InvokeOutcome, Notification, Selection, TargetDescriptor,
    TargetId,
};

/// Counter bumped whenever the active target or service changes. Every
/// asynchronous completion carries the epoch current when the request was
/// issued; a mismatch on arrival means the result belongs to a session
/// shape that no longer exists and it is dropped. This is the only
/// cancellation mechanism: in-flight requests are never aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// The consumer-read snapshot of the session. Mutated exclusively by the
/// synchronizer task and published wholesale over a watch channel.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub targets: Vec<TargetDescriptor>,
    pub active_target: Option<TargetId>,
    pub services: Vec<String>,
    pub active_service: Option<String>,
    pub methods: Vec<String>,
    pub active_method: Option<String>,
    pub records: Vec<InvocationRecord>,
    pub selection: Option<Selection>,
    pub edit_buffer: String,
    pub directory: Vec<DirectoryNode>,
    pub last_response: Option<InvokeOutcome>,
    pub loading_services: bool,
    pub loading_methods: bool,
    pub loading_invoke: bool,
    pub notification: Option<Notification>,
    pub epoch: Epoch,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            edit_buffer: "{}".to_string(),
            ..Self::default()
        }
    }

    pub fn selected_record_id(&self) -> Option<i64> {
        self.selection.as_ref().map(|selection| selection.record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_bumps_monotonically() {
        let mut epoch = Epoch::default();
        let start = epoch.value();
        epoch.bump();
        epoch.bump();
        assert_eq!(epoch.value(), start + 2);
    }

    #[test]
    fn new_state_starts_with_empty_object_buffer() {
        let state = SessionState::new();
        assert_eq!(state.edit_buffer, "{}");
        assert!(state.selection.is_none());
        assert!(state.active_target.is_none());
    }
}
