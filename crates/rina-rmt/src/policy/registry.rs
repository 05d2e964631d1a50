//! Named queue policy constructors.

use super::default::DefaultQueuePolicy;
use super::QueuePolicy;
use crate::error::{Result, RmtError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Flat name → value parameter set.
pub type PolicyParams = BTreeMap<String, String>;

/// Builds a policy instance from its parameters.
pub type PolicyConstructor = fn(&PolicyParams) -> Result<Arc<dyn QueuePolicy>>;

fn create_default(params: &PolicyParams) -> Result<Arc<dyn QueuePolicy>> {
    Ok(Arc::new(DefaultQueuePolicy::from_params(params)?))
}

/// Registry of queue policies selectable by name.
pub struct PolicyRegistry {
    constructors: RwLock<HashMap<String, PolicyConstructor>>,
}

impl PolicyRegistry {
    /// Creates a registry with the default policy published.
    pub fn new() -> Self {
        let registry = Self {
            constructors: RwLock::new(HashMap::new()),
        };
        registry
            .constructors
            .write()
            .insert(DefaultQueuePolicy::NAME.to_string(), create_default);
        registry
    }

    /// Publishes a constructor under `name`, replacing any previous one.
    pub fn publish(&self, name: impl Into<String>, constructor: PolicyConstructor) {
        let name = name.into();
        if self
            .constructors
            .write()
            .insert(name.clone(), constructor)
            .is_some()
        {
            warn!(policy = %name, "PolicyRegistry: replaced existing policy");
        } else {
            info!(policy = %name, "PolicyRegistry: policy published");
        }
    }

    /// Withdraws a policy. Existing instances keep working.
    pub fn unpublish(&self, name: &str) -> Result<()> {
        if self.constructors.write().remove(name).is_none() {
            return Err(RmtError::UnknownPolicy(name.to_string()));
        }
        info!(policy = name, "PolicyRegistry: policy unpublished");
        Ok(())
    }

    /// Instantiates the policy published under `name`.
    pub fn create(&self, name: &str, params: &PolicyParams) -> Result<Arc<dyn QueuePolicy>> {
        let constructor = self
            .constructors
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| RmtError::UnknownPolicy(name.to_string()))?;
        constructor(params)
    }

    /// Published policy names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EnqueueOutcome;
    use crate::pdu::Pdu;
    use crate::ports::QueueSet;
    use pretty_assertions::assert_eq;
    use rina_types::PortId;

    /// Policy that queues everything.
    struct AlwaysQueue;

    impl QueuePolicy for AlwaysQueue {
        fn name(&self) -> &str {
            "always-queue"
        }

        fn enqueue(&self, _: PortId, queues: &mut QueueSet, pdu: Pdu, _: bool) -> EnqueueOutcome {
            queues.push_data(pdu);
            EnqueueOutcome::Scheduled
        }

        fn dequeue(&self, _: PortId, queues: &mut QueueSet) -> Option<Pdu> {
            queues.pop_data()
        }

        fn set_param(&self, name: &str, _: &str) -> Result<()> {
            Err(RmtError::UnknownParameter {
                scope: "always-queue".to_string(),
                name: name.to_string(),
            })
        }

        fn params(&self) -> PolicyParams {
            PolicyParams::new()
        }
    }

    fn create_always_queue(_: &PolicyParams) -> Result<Arc<dyn QueuePolicy>> {
        Ok(Arc::new(AlwaysQueue))
    }

    #[test]
    fn test_default_published() {
        let registry = PolicyRegistry::new();
        assert_eq!(registry.names(), vec!["default".to_string()]);

        let policy = registry.create("default", &PolicyParams::new()).unwrap();
        assert_eq!(policy.name(), "default");
        assert_eq!(policy.param("q_max"), Some("1000".to_string()));
    }

    #[test]
    fn test_unknown_policy() {
        let registry = PolicyRegistry::new();
        assert!(matches!(
            registry.create("red", &PolicyParams::new()),
            Err(RmtError::UnknownPolicy(_))
        ));
        assert!(registry.unpublish("red").is_err());
    }

    #[test]
    fn test_publish_and_unpublish() {
        let registry = PolicyRegistry::new();
        registry.publish("always-queue", create_always_queue);

        let policy = registry.create("always-queue", &PolicyParams::new()).unwrap();
        assert_eq!(policy.name(), "always-queue");

        registry.unpublish("always-queue").unwrap();
        assert!(registry.create("always-queue", &PolicyParams::new()).is_err());
        // existing instance unaffected
        assert_eq!(policy.name(), "always-queue");
    }

    #[test]
    fn test_create_propagates_param_errors() {
        let registry = PolicyRegistry::new();
        let params = PolicyParams::from([("q_max".to_string(), "0".to_string())]);
        assert!(matches!(
            registry.create("default", &params),
            Err(RmtError::InvalidParameter { .. })
        ));
    }
}
