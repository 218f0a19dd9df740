//! # markers: removal of `//{DEL NAME} ... //{DEL}` blocks
//!
//! A block opens with `//{DEL` followed by the marker name and a closing
//! brace, and ends at the next bare `//{DEL}`. Everything from the whitespace
//! preceding the opening token up to and including the closing token is
//! dropped. Blocks may span several lines. Tokens that are left over once all
//! blocks for the requested marker are gone (other markers' openers, stray
//! closers) are removed on their own, again with their leading whitespace.
//!
//! An opener is a single token: its names never reach past its own `}`, so a
//! block for another marker on the same line is left alone. Names match as
//! whole words, so `FOO` does not open `//{DEL FOOBAR}` but does open
//! `//{DEL PROD FOO}`.
//!
//! Nested or overlapping blocks with the same name are not given any special
//! treatment; the non-greedy scan simply pairs each opener with the first
//! closer after it.

use regex::Regex;

use crate::action::ActionError;

const BARE_TOKEN: &str = r"\s*//\{DEL[^}\n]*\}";

/// A compiled stripper for one marker name.
#[derive(Debug, Clone)]
pub struct MarkerStripper {
    marker: String,
    span: Regex,
    bare: Regex,
}

impl MarkerStripper {
    /// Validates `marker` (digits, uppercase ASCII letters and `_` only) and
    /// compiles the block and token patterns.
    pub fn new(marker: &str) -> Result<Self, ActionError> {
        if !is_valid_marker(marker) {
            return Err(ActionError::InvalidMarker(marker.to_string()));
        }
        Self::compile(marker).map_err(ActionError::from)
    }

    fn compile(marker: &str) -> Result<Self, regex::Error> {
        let span = Regex::new(&format!(
            r"\s*//\{{DEL[^}}\n]*?\b{}\b[^}}\n]*?\}}[^\x0B]*?//\{{DEL\}}",
            regex::escape(marker)
        ))?;
        Ok(Self {
            marker: marker.to_string(),
            span,
            bare: Regex::new(BARE_TOKEN)?,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn strip(&self, content: &str) -> String {
        self.strip_counted(content).0
    }

    /// Strips `content` and reports how many marker blocks were removed.
    pub fn strip_counted(&self, content: &str) -> (String, usize) {
        let removed = self.span.find_iter(content).count();
        let without_blocks = self.span.replace_all(content, "");
        let cleaned = self.bare.replace_all(&without_blocks, "");
        (cleaned.into_owned(), removed)
    }
}

/// Marker names are made of digits, uppercase ASCII letters and underscores.
pub fn is_valid_marker(marker: &str) -> bool {
    !marker.is_empty()
        && marker
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase() || c == '_')
}

/// One-shot form of [`MarkerStripper::strip`].
///
/// The marker name is not validated here; it is escaped and matched
/// literally.
pub fn strip_markers(content: &str, marker: &str) -> String {
    match MarkerStripper::compile(marker) {
        Ok(stripper) => stripper.strip(content),
        Err(_) => content.to_string(),
    }
}
