use probe_core::{TargetDescriptor, TargetId};

/// Partial edit of a target; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPatch {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// The set of named connection targets and which one is active. Lives
/// inside the session task, so every mutation is synchronous and atomic
/// from the caller's perspective.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<TargetDescriptor>,
    active: Option<TargetId>,
}

impl TargetRegistry {
    pub fn new(seed: Vec<TargetDescriptor>) -> Self {
        let active = seed.first().map(|target| target.id);
        Self {
            targets: seed,
            active,
        }
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    pub fn active_id(&self) -> Option<TargetId> {
        self.active
    }

    pub fn active(&self) -> Option<&TargetDescriptor> {
        let id = self.active?;
        self.targets.iter().find(|target| target.id == id)
    }

    pub fn get(&self, id: TargetId) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|target| target.id == id)
    }

    /// Adds a target and makes it active.
    pub fn add(&mut self, name: impl Into<String>, host: impl Into<String>, port: u16) -> TargetId {
        let id = TargetId::new();
        self.targets.push(TargetDescriptor {
            id,
            name: name.into(),
            host: host.into(),
            port,
        });
        self.active = Some(id);
        id
    }

    pub fn update(&mut self, id: TargetId, patch: TargetPatch) -> bool {
        let Some(target) = self.targets.iter_mut().find(|target| target.id == id) else {
            return false;
        };
        if let Some(name) = patch.name {
            target.name = name;
        }
        if let Some(host) = patch.host {
            target.host = host;
        }
        if let Some(port) = patch.port {
            target.port = port;
        }
        true
    }

    /// Removes a target. Removing the active one promotes the first
    /// remaining target, or leaves the registry with no active target.
    pub fn remove(&mut self, id: TargetId) -> bool {
        let before = self.targets.len();
        self.targets.retain(|target| target.id != id);
        if self.targets.len() == before {
            return false;
        }
        if self.active == Some(id) {
            self.active = self.targets.first().map(|target| target.id);
        }
        true
    }

    pub fn set_active(&mut self, id: TargetId) -> bool {
        if self.targets.iter().any(|target| target.id == id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_two() -> (TargetRegistry, TargetId, TargetId) {
        let mut registry = TargetRegistry::default();
        let first = registry.add("dev", "localhost", 31802);
        let second = registry.add("test", "localhost", 31362);
        (registry, first, second)
    }

    #[test]
    fn add_creates_unique_ids_and_activates() {
        let (registry, first, second) = registry_with_two();
        assert_ne!(first, second);
        assert_eq!(registry.active_id(), Some(second));
        assert_eq!(registry.targets().len(), 2);
    }

    #[test]
    fn removing_active_target_promotes_first_remaining() {
        let (mut registry, first, second) = registry_with_two();
        assert!(registry.remove(second));
        assert_eq!(registry.active_id(), Some(first));
    }

    #[test]
    fn removing_non_active_target_keeps_active() {
        let (mut registry, first, second) = registry_with_two();
        assert!(registry.remove(first));
        assert_eq!(registry.active_id(), Some(second));
    }

    #[test]
    fn removing_last_target_leaves_none_active() {
        let mut registry = TargetRegistry::default();
        let only = registry.add("dev", "localhost", 31802);
        assert!(registry.remove(only));
        assert_eq!(registry.active_id(), None);
        assert!(registry.active().is_none());
    }

    #[test]
    fn set_active_rejects_unknown_id() {
        let (mut registry, _, second) = registry_with_two();
        assert!(!registry.set_active(TargetId::new()));
        assert_eq!(registry.active_id(), Some(second));
    }

    #[test]
    fn update_merges_partial_fields() {
        let (mut registry, first, _) = registry_with_two();
        assert!(registry.update(
            first,
            TargetPatch {
                port: Some(20880),
                ..TargetPatch::default()
            },
        ));
        let target = registry.get(first).unwrap();
        assert_eq!(target.port, 20880);
        assert_eq!(target.name, "dev");
        assert_eq!(target.host, "localhost");
    }
}
