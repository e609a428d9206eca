//! Sensitivity taxonomies and emit levels.

use serde_json::Value;

use crate::error::ConfigError;

/// Caller-ordered list of category labels.
///
/// A label's index is its rank: a field is "at or below" an emit level when
/// its label's index is not greater than the emit level's index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    labels: Vec<String>,
}

impl Taxonomy {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Index of `label`, or `None` when the taxonomy does not know it.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Maximum sensitivity a consumer is willing to receive unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitLevel {
    Numeric(u32),
    Categorical(String),
}

impl EmitLevel {
    /// Resolve a configured emit level against the active taxonomy.
    ///
    /// Integers select numeric mode. Strings select categorical mode, except
    /// that digit-only strings are read as numbers when no taxonomy is
    /// configured (environment variables only carry strings). A numeric level
    /// while a taxonomy is configured is rejected.
    pub fn from_setting(value: &Value, taxonomy: &Taxonomy) -> Result<Self, ConfigError> {
        let level = match value {
            Value::Number(n) => {
                let n = n.as_u64().ok_or_else(|| {
                    ConfigError::invalid(
                        "masking_emit_level",
                        format!("expected a non-negative integer, got {n}"),
                    )
                })?;
                let n = u32::try_from(n)
                    .map_err(|_| ConfigError::invalid("masking_emit_level", "level out of range"))?;
                Self::Numeric(n)
            }
            Value::String(s) if taxonomy.is_empty() => match s.trim().parse::<u32>() {
                Ok(n) => Self::Numeric(n),
                Err(_) => Self::Categorical(s.clone()),
            },
            Value::String(s) => Self::Categorical(s.clone()),
            other => {
                return Err(ConfigError::invalid(
                    "masking_emit_level",
                    format!("expected an integer or a category label, got {other}"),
                ));
            }
        };

        if matches!(level, Self::Numeric(_)) && !taxonomy.is_empty() {
            return Err(ConfigError::invalid(
                "masking_emit_level",
                "numeric level given while a category taxonomy is configured",
            ));
        }

        Ok(level)
    }
}

impl std::fmt::Display for EmitLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Categorical(label) => write!(f, "{label:?}"),
        }
    }
}
