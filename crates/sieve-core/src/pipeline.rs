use crate::model::{ClassificationResult, Model};
use crate::policy::{Thresholds, Verdict};

/// One incoming message as seen by the filter. Either field may be absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassificationInput<'a> {
    pub text: Option<&'a str>,
    pub sender: Option<&'a str>,
}

impl<'a> ClassificationInput<'a> {
    pub fn new(text: Option<&'a str>, sender: Option<&'a str>) -> Self {
        Self { text, sender }
    }
}

/// Verdict plus the scores that produced it. `result` is `None` when there
/// was no text to classify.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub result: Option<ClassificationResult>,
}

/// Tokenize, classify and decide. Never fails: absent or blank text
/// resolves to `unknown` with no action.
pub fn evaluate(model: &Model, thresholds: &Thresholds, input: &ClassificationInput<'_>) -> Evaluation {
    let Some(text) = input.text.filter(|t| !t.trim().is_empty()) else {
        return Evaluation {
            verdict: Verdict::unknown(),
            result: None,
        };
    };

    let tokens = model.tokenize(text);
    let result = model.classify(&tokens);
    let verdict = thresholds.decide(&result);

    tracing::debug!(
        category = ?verdict.category,
        p_spam = result.spam_probability(),
        p_ham = result.ham_probability(),
        evidence = result.evidence,
        "message evaluated"
    );

    Evaluation {
        verdict,
        result: Some(result),
    }
}
