use std::collections::HashMap;

use crate::constants::{OOV_TOKEN, PAD_TOKEN};
use crate::error::{CoreError, Result};
use crate::tokenizer::split_words;

pub type TokenId = u32;

/// Fixed-length, ordered sequence of token ids for one message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenVector {
    ids: Vec<TokenId>,
}

impl TokenVector {
    pub fn from_ids(ids: Vec<TokenId>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Immutable word → id mapping with reserved OOV and padding ids.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    ids: HashMap<String, TokenId>,
    oov_id: TokenId,
    pad_id: TokenId,
}

impl Vocabulary {
    /// Build a vocabulary from a raw mapping. The mapping must contain the
    /// reserved `<oov>` and `<pad>` entries under different ids, and no other
    /// word may reuse either reserved id.
    pub fn new(ids: HashMap<String, TokenId>) -> Result<Self> {
        let oov_id = *ids
            .get(OOV_TOKEN)
            .ok_or_else(|| CoreError::InvalidModel(format!("vocabulary lacks {OOV_TOKEN}")))?;
        let pad_id = *ids
            .get(PAD_TOKEN)
            .ok_or_else(|| CoreError::InvalidModel(format!("vocabulary lacks {PAD_TOKEN}")))?;
        if oov_id == pad_id {
            return Err(CoreError::InvalidModel(format!(
                "{OOV_TOKEN} and {PAD_TOKEN} share id {oov_id}"
            )));
        }
        let reserved = |w: &str| w == OOV_TOKEN || w == PAD_TOKEN;
        if let Some((word, id)) = ids
            .iter()
            .find(|(w, id)| (**id == oov_id || **id == pad_id) && !reserved(w.as_str()))
        {
            return Err(CoreError::InvalidModel(format!(
                "word '{word}' reuses reserved id {id}"
            )));
        }
        Ok(Self { ids, oov_id, pad_id })
    }

    pub fn oov_id(&self) -> TokenId {
        self.oov_id
    }

    pub fn pad_id(&self) -> TokenId {
        self.pad_id
    }

    /// Number of entries, reserved tokens included.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Largest id in the mapping.
    pub fn max_id(&self) -> TokenId {
        self.ids.values().copied().max().unwrap_or(0)
    }

    /// Id for an already-normalized word. Unknown words map to OOV.
    pub fn id_of(&self, word: &str) -> TokenId {
        self.ids.get(word).copied().unwrap_or(self.oov_id)
    }

    /// Normalize, segment and look up `text`, then truncate or pad to `len`.
    pub fn vectorize(&self, text: &str, len: usize) -> TokenVector {
        let mut ids: Vec<TokenId> = split_words(text)
            .iter()
            .take(len)
            .map(|w| self.id_of(w))
            .collect();
        ids.resize(len, self.pad_id);
        TokenVector { ids }
    }
}
