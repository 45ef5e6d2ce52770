/// Reserved vocabulary entry for words the model has never seen.
pub const OOV_TOKEN: &str = "<oov>";

/// Reserved vocabulary entry used to pad short messages up to the sequence length.
pub const PAD_TOKEN: &str = "<pad>";

/// Class label the decision policy treats as spam.
pub const SPAM_CLASS: &str = "spam";

/// Class label the decision policy treats as legitimate.
pub const HAM_CLASS: &str = "ham";

/// Sequence length used when a model bundle does not specify one.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 64;

/// Largest sequence length a model bundle may declare.
pub const MAX_SEQUENCE_LENGTH: usize = 4096;

/// Inputs longer than this are cut (at a char boundary) before normalization.
pub const MAX_INPUT_BYTES: usize = 16 * 1024;

/// Default P(spam) needed to junk a message.
pub const DEFAULT_SPAM_THRESHOLD: f64 = 0.8;

/// Default P(ham) needed to explicitly allow a message.
pub const DEFAULT_HAM_THRESHOLD: f64 = 0.8;

/// Allowed deviation of a probability distribution's sum from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-4;
