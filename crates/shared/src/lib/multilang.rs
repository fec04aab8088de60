use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedText {
    #[error("text contains a byte-order mark")]
    ContainsBom,
    #[error("text contains control character U+{0:04X}")]
    ContainsControl(u32),
    #[error("text contains tag or private-use codepoint U+{0:04X}")]
    ContainsTagOrPrivateUse(u32),
    #[error("text contains markup")]
    ContainsMarkup,
    #[error("language tag must not be blank")]
    BlankLanguage,
}

/// Checks the hygiene rules for human-readable strings carried in a list:
/// no BOM, no ISO 6429 C0/C1 controls, no tag or private-use codepoints,
/// no markup.
pub fn validate_text(value: &str) -> Result<(), MalformedText> {
    for ch in value.chars() {
        let cp = ch as u32;
        if ch == '\u{FEFF}' {
            return Err(MalformedText::ContainsBom);
        }
        if cp <= 0x1F || (0x7F..=0x9F).contains(&cp) {
            return Err(MalformedText::ContainsControl(cp));
        }
        let tag = (0xE0000..=0xE007F).contains(&cp);
        let private_use = (0xE000..=0xF8FF).contains(&cp)
            || (0xF0000..=0xFFFFD).contains(&cp)
            || (0x100000..=0x10FFFD).contains(&cp);
        if tag || private_use {
            return Err(MalformedText::ContainsTagOrPrivateUse(cp));
        }
        if ch == '<' || ch == '>' {
            return Err(MalformedText::ContainsMarkup);
        }
    }
    Ok(())
}

/// A single language-tagged string, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMultiLangString")]
pub struct MultiLangString {
    lang: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMultiLangString {
    lang: String,
    value: String,
}

impl MultiLangString {
    pub fn new(lang: impl Into<String>, value: impl Into<String>) -> Result<Self, MalformedText> {
        let lang = lang.into();
        let value = value.into();
        if lang.trim().is_empty() {
            return Err(MalformedText::BlankLanguage);
        }
        validate_text(&lang)?;
        validate_text(&value)?;
        Ok(Self { lang, value })
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl TryFrom<RawMultiLangString> for MultiLangString {
    type Error = MalformedText;

    fn try_from(raw: RawMultiLangString) -> Result<Self, Self::Error> {
        Self::new(raw.lang, raw.value)
    }
}
