//! Trigger definitions, matching and action execution.
//!
//! Triggers are loaded once from a JSON document:
//!
//! ```json
//! {"triggers": [{
//!     "properties": {"event": "media.play", "Player.local": true},
//!     "actions": [{"type": "webhook", "config": {"url": "http://hue/scene/dim", "action": "PUT"}}]
//! }]}
//! ```
//!
//! A trigger matches when every property path resolves in the payload to a
//! value equal to the configured one. A trigger without properties matches
//! every payload.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::actions::{Action, ActionConfigError, ActionError, RawAction};
use crate::domain::{is_scalar, scalar_eq, RawPayload, WebhookPayload};

/// Errors that make a trigger configuration unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read trigger config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse trigger config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Trigger {trigger}: property path must not be empty")]
    EmptyPath { trigger: usize },

    #[error("Trigger {trigger}: property '{path}' must be a string, number, boolean or null")]
    NonScalarProperty { trigger: usize, path: String },

    #[error("Trigger {trigger}, action {action}: {source}")]
    Action {
        trigger: usize,
        action: usize,
        #[source]
        source: ActionConfigError,
    },
}

/// Trigger as written in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// Dotted JSON path → expected scalar value
    #[serde(default)]
    pub properties: Map<String, Value>,

    /// Raw action descriptors, parsed at load time
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct TriggerFile {
    #[serde(default)]
    triggers: Vec<TriggerDefinition>,
}

/// A loaded trigger: equality constraints plus the actions to run on match
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    properties: Vec<(String, Value)>,
    actions: Vec<Action>,
}

impl Trigger {
    pub fn new(properties: Vec<(String, Value)>, actions: Vec<Action>) -> Self {
        Self { properties, actions }
    }

    /// Validate a definition and parse its action descriptors.
    ///
    /// `index` is only used to make error messages point at the right trigger.
    pub fn from_definition(definition: &TriggerDefinition, index: usize) -> Result<Self, ConfigError> {
        let mut properties = Vec::with_capacity(definition.properties.len());
        for (path, expected) in &definition.properties {
            if path.is_empty() {
                return Err(ConfigError::EmptyPath { trigger: index });
            }
            if !is_scalar(expected) {
                return Err(ConfigError::NonScalarProperty {
                    trigger: index,
                    path: path.clone(),
                });
            }
            properties.push((path.clone(), expected.clone()));
        }

        let mut actions = Vec::with_capacity(definition.actions.len());
        for (action_index, raw) in definition.actions.iter().enumerate() {
            match Action::from_raw(raw) {
                Ok(Some(action)) => actions.push(action),
                Ok(None) => {
                    warn!(trigger = index, action_type = %raw.kind, "Ignoring action of unknown type");
                }
                Err(source) => {
                    return Err(ConfigError::Action {
                        trigger: index,
                        action: action_index,
                        source,
                    })
                }
            }
        }

        Ok(Self { properties, actions })
    }

    /// Property constraints in declaration order
    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    /// Parsed actions in declaration order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// True when every constraint path resolves to an equal scalar
    pub fn is_match(&self, payload: &RawPayload) -> bool {
        self.properties.iter().all(|(path, expected)| {
            payload
                .lookup(path)
                .is_some_and(|actual| scalar_eq(actual, expected))
        })
    }

    /// Match against raw bytes; bytes that are not JSON never match
    pub fn is_match_bytes(&self, raw: &[u8]) -> bool {
        RawPayload::parse(raw)
            .map(|payload| self.is_match(&payload))
            .unwrap_or(false)
    }
}

/// A failed action within a matched trigger
#[derive(Debug)]
pub struct TriggerFailure {
    /// Position of the trigger in the configuration
    pub trigger: usize,

    /// Description of the action that failed
    pub action: String,

    pub error: ActionError,
}

impl std::fmt::Display for TriggerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trigger {}: {}", self.trigger, self.error)
    }
}

/// Outcome of evaluating every trigger against one payload
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Number of triggers that matched
    pub matched: usize,

    /// One entry per matched trigger whose actions stopped on an error
    pub failures: Vec<TriggerFailure>,
}

impl Evaluation {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure in trigger declaration order
    pub fn first_failure(&self) -> Option<&TriggerFailure> {
        self.failures.first()
    }
}

/// The full set of triggers, immutable once loaded
#[derive(Debug, Clone, Default)]
pub struct TriggerConfig {
    triggers: Vec<Trigger>,
}

impl TriggerConfig {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }

    /// Parse a trigger document. One malformed trigger fails the whole load.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let file: TriggerFile = serde_json::from_reader(reader)?;
        Self::from_definitions(&file.triggers)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Self::from_reader(content.as_bytes())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_definitions(definitions: &[TriggerDefinition]) -> Result<Self, ConfigError> {
        let triggers = definitions
            .iter()
            .enumerate()
            .map(|(index, definition)| Trigger::from_definition(definition, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { triggers })
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Evaluate every trigger in order and run the actions of those that match.
    ///
    /// Within a trigger, actions run in order and stop at the first failure.
    /// A failure never stops later triggers from being evaluated.
    #[instrument(skip_all, fields(event = %payload.event))]
    pub async fn evaluate_all(
        &self,
        client: &reqwest::Client,
        raw: &RawPayload,
        payload: &WebhookPayload,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for (index, trigger) in self.triggers.iter().enumerate() {
            if !trigger.is_match(raw) {
                debug!(trigger = index, "Trigger did not match");
                continue;
            }

            evaluation.matched += 1;
            info!(trigger = index, actions = trigger.actions.len(), "Matched trigger, executing actions");

            for action in &trigger.actions {
                if let Err(e) = action.execute(client, payload).await {
                    error!(trigger = index, action = %action, error = %e, "Action failed");
                    evaluation.failures.push(TriggerFailure {
                        trigger: index,
                        action: action.to_string(),
                        error: e,
                    });
                    break;
                }
            }
        }

        if evaluation.matched == 0 {
            info!("Received hook, but did not match any configured triggers");
        }

        evaluation
    }
}
