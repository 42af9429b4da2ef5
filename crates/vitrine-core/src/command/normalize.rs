//! Text normalization for command matching.
//!
//! Chat clients sprinkle direction marks and zero-width characters into
//! messages (especially when text is pasted or forwarded). Those are removed
//! before matching so `"\u{200e}@tabela"` matches `@tabela`.

use vitrine_types::message::InboundContent;

/// Message text prepared for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    /// Cleaned and trimmed, original case.
    pub original: String,
    /// `original` lower-cased, used for matching.
    pub lowered: String,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        let original = strip_invisible(raw).trim().to_string();
        let lowered = original.to_lowercase();
        Self { original, lowered }
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Everything after the first word, original case.
    ///
    /// `".compra 3 Camisa"` yields `"3 Camisa"`.
    pub fn arguments(&self) -> &str {
        match self.original.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim_start(),
            None => "",
        }
    }
}

/// Normalize whatever text the content carries.
///
/// Returns `None` when the content has no text or only invisible characters.
pub fn normalize(content: &InboundContent) -> Option<NormalizedText> {
    let text = NormalizedText::new(content.text()?);
    (!text.is_empty()).then_some(text)
}

/// Remove bidirectional controls and invisible formatting characters.
pub fn strip_invisible(raw: &str) -> String {
    raw.chars().filter(|c| !is_invisible(*c)).collect()
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'                      // soft hyphen
            | '\u{061C}'                // arabic letter mark
            | '\u{200B}'..='\u{200F}'   // zero-width space/joiners, LRM, RLM
            | '\u{202A}'..='\u{202E}'   // embeddings and overrides
            | '\u{2060}'..='\u{2064}'   // word joiner, invisible operators
            | '\u{2066}'..='\u{2069}'   // isolates
            | '\u{FEFF}'                // BOM / zero-width no-break space
    )
}
