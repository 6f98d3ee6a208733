use std::error::Error;

use crate::env::POD_NAME_ENV;
use crate::record::{Level, LogEntry};

/// Callback run on entries before they are formatted.
///
/// Hooks are registered once on the [`crate::logger::Logger`] and fired for
/// every entry whose level is listed in [`Hook::levels`].
pub trait Hook: Send + Sync {
    /// Levels this hook fires on.
    fn levels(&self) -> &[Level];

    /// Inspect or enrich the entry.
    ///
    /// A failing hook is reported on stderr; the entry is still written.
    fn fire(&self, entry: &mut LogEntry) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Deployed service name and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: String,
    pub version: String,
}

impl ServiceIdentity {
    /// Derive the identity from a pod name of the form
    /// `<service-with-dashes>-<replica-set-hash>-<pod-suffix>`.
    ///
    /// The replica set hash is used as the version. Names with fewer than
    /// three segments yield `None` rather than an empty service: stripping
    /// two segments from `svc-abc` would leave no service name at all.
    pub fn from_pod_name(pod_name: &str) -> Option<Self> {
        let segments: Vec<&str> = pod_name.split('-').collect();
        if segments.len() < 3 {
            return None;
        }
        let version = segments[segments.len() - 2];
        Some(ServiceIdentity {
            service: segments[..segments.len() - 2].join("-"),
            version: version.to_string(),
        })
    }
}

const ERROR_LEVELS: [Level; 3] = [Level::Error, Level::Fatal, Level::Panic];

/// Adds `service` and `version` to error-class entries.
#[derive(Debug, Clone, Default)]
pub struct ServiceHook {
    identity: Option<ServiceIdentity>,
}

impl ServiceHook {
    pub fn new(identity: Option<ServiceIdentity>) -> Self {
        ServiceHook { identity }
    }

    /// Resolve the identity from `POD_NAME`. A missing variable disables
    /// the hook.
    pub fn from_env() -> Self {
        let identity = std::env::var(POD_NAME_ENV)
            .ok()
            .and_then(|name| ServiceIdentity::from_pod_name(&name));
        ServiceHook { identity }
    }

    pub fn identity(&self) -> Option<&ServiceIdentity> {
        self.identity.as_ref()
    }
}

impl Hook for ServiceHook {
    fn levels(&self) -> &[Level] {
        &ERROR_LEVELS
    }

    fn fire(&self, entry: &mut LogEntry) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(identity) = &self.identity {
            entry.fields.insert("service".to_string(), identity.service.clone().into());
            entry.fields.insert("version".to_string(), identity.version.clone().into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn pod_name_yields_service_and_version() {
        let identity = ServiceIdentity::from_pod_name("golang-service-123-abcde").unwrap();
        assert_eq!(identity.service, "golang-service");
        assert_eq!(identity.version, "123");
    }

    #[test]
    fn short_pod_names_are_ignored() {
        assert_eq!(ServiceIdentity::from_pod_name(""), None);
        assert_eq!(ServiceIdentity::from_pod_name("solo"), None);
        assert_eq!(ServiceIdentity::from_pod_name("svc-abc"), None);
        assert!(ServiceIdentity::from_pod_name("svc-abc-x1").is_some());
    }

    #[test]
    fn hook_enriches_entries() {
        let hook = ServiceHook::new(ServiceIdentity::from_pod_name("billing-api-7f9c-z2"));
        let mut entry = LogEntry::new(Level::Error, "failed");
        hook.fire(&mut entry).unwrap();

        match (&entry.fields["service"], &entry.fields["version"]) {
            (FieldValue::Plain(service), FieldValue::Plain(version)) => {
                assert_eq!(service, "billing-api");
                assert_eq!(version, "7f9c");
            }
            other => panic!("unexpected fields: {:?}", other),
        }
        assert!(!hook.levels().contains(&Level::Info));
    }

    #[test]
    fn hook_without_identity_is_a_no_op() {
        let mut entry = LogEntry::new(Level::Error, "failed");
        ServiceHook::default().fire(&mut entry).unwrap();
        assert!(entry.fields.is_empty());
    }
}
