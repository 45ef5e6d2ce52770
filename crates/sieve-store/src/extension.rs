use std::fs;
use std::path::Path;
use std::sync::Arc;

use sieve_core::{
    ActionDecision, Category, ClassificationInput, ClassificationResult, Model, Thresholds,
    Verdict, evaluate,
};

use crate::config::FilterConfig;
use crate::error::{Result, StoreError};
use crate::notify::Notifier;
use crate::spam_log::{SpamLog, SpamRecord};

/// What one invocation decided and whether it left a trace in the log.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterOutcome {
    pub verdict: Verdict,
    pub result: Option<ClassificationResult>,
    /// Log length after the append, when a spam record was persisted.
    pub logged: Option<usize>,
}

impl FilterOutcome {
    fn undecided() -> Self {
        Self {
            verdict: Verdict::unknown(),
            result: None,
            logged: None,
        }
    }
}

/// Entry point the extension runtime calls once per incoming message.
///
/// Classification is pure and shared; persistence and notification run only
/// for spam and only after the verdict is fixed, so their failure cannot
/// change the returned action.
pub struct FilterExtension {
    model: Option<Arc<Model>>,
    thresholds: Thresholds,
    log: Option<SpamLog>,
    notifier: Option<Notifier>,
}

impl FilterExtension {
    /// Classification only; nothing is persisted.
    pub fn new(model: Arc<Model>, thresholds: Thresholds) -> Self {
        Self {
            model: Some(model),
            thresholds,
            log: None,
            notifier: None,
        }
    }

    pub fn with_persistence(mut self, log: SpamLog, notifier: Notifier) -> Self {
        self.log = Some(log);
        self.notifier = Some(notifier);
        self
    }

    /// Read `<container>/sieve.toml` and build the filter. Never fails: an
    /// unreadable config falls back to defaults.
    pub fn open(container: &Path) -> Self {
        let config = FilterConfig::load_from_container(container).unwrap_or_else(|e| {
            tracing::warn!("ignoring config in {}: {e}", container.display());
            FilterConfig::default()
        });
        Self::from_config(container, &config)
    }

    /// Build from an explicit config. A model that fails to load leaves the
    /// filter answering `none` for every message.
    pub fn from_config(container: &Path, config: &FilterConfig) -> Self {
        let model = match load_model(config) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!("no usable model, every message will get no action: {e}");
                None
            }
        };

        let (log, notifier) = if config.store.enabled {
            let log = SpamLog::new(container)
                .with_mode(config.store.append_mode)
                .with_busy_timeout(config.store.busy_timeout_ms);
            (Some(log), Some(Notifier::new(container, &config.notify.channel)))
        } else {
            (None, None)
        };

        Self {
            model,
            thresholds: config.policy,
            log,
            notifier,
        }
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn spam_log(&self) -> Option<&SpamLog> {
        self.log.as_ref()
    }

    /// Decide one message. Always returns an action; `none` on any failure.
    pub fn handle(&self, input: &ClassificationInput<'_>) -> ActionDecision {
        self.process(input).verdict.decision
    }

    /// `handle` with the scores and persistence result exposed.
    pub fn process(&self, input: &ClassificationInput<'_>) -> FilterOutcome {
        let Some(model) = &self.model else {
            return FilterOutcome::undecided();
        };

        let evaluation = evaluate(model, &self.thresholds, input);
        let logged = match (evaluation.verdict.category, input.text) {
            (Category::Spam, Some(text)) => self.record_spam(input.sender, text),
            _ => None,
        };

        FilterOutcome {
            verdict: evaluation.verdict,
            result: evaluation.result,
            logged,
        }
    }

    /// Best-effort, single attempt: append then signal. Errors are logged
    /// and dropped.
    fn record_spam(&self, sender: Option<&str>, text: &str) -> Option<usize> {
        let log = self.log.as_ref()?;
        match log.append(SpamRecord::observed_now(sender, text)) {
            Ok(len) => {
                if let Some(notifier) = &self.notifier {
                    notifier.notify_changed();
                }
                Some(len)
            }
            Err(e) => {
                tracing::warn!("spam record not persisted: {e}");
                None
            }
        }
    }
}

fn load_model(config: &FilterConfig) -> Result<Arc<Model>> {
    match &config.model.path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            let model = Model::from_json(&json)?;
            tracing::info!("loaded model from {}", path.display());
            Ok(Arc::new(model))
        }
        None => Model::bundled()
            .ok_or_else(|| StoreError::InvalidData("bundled model unavailable".into())),
    }
}
