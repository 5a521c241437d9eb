use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Newtype wrappers for type safety

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// A company (tenant) identifier.
    CompanyId
);
id_type!(
    /// An employee's membership record within a company.
    EmployeeId
);
id_type!(
    /// A workflow identifier.
    WorkflowId
);
id_type!(
    /// A task identifier.
    TaskId
);
id_type!(
    /// A workflow template reference (owned by an external catalog).
    TemplateId
);
id_type!(
    /// A workflow access grant identifier.
    GrantId
);

/// Serialize/deserialize a `chrono::Duration` as whole seconds.
///
/// Used for task deltas and durations, which are always second-granular.
pub mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(secs))
    }
}

/// Render an optional displayable value for audit history ("none" when unset).
pub fn display_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}

/// Render a duration as whole seconds for audit history.
pub fn display_secs(value: &Duration) -> String {
    value.num_seconds().to_string()
}
