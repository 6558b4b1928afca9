//! Line-oriented text example format
//!
//! ```text
//! <label tokens> ['tag] |[namespace] feature[:value] ... |[namespace] ...
//! ```
//!
//! A `|` directly followed by a name opens a named namespace; `| ` uses the
//! default one. Feature names are hashed with FNV-1a seeded by the namespace
//! hash; purely numeric names are offset from it instead. A line with no label,
//! no features and a `save` / `save_<path>` tag is a control record.

use crate::example::{ControlRecord, Example, Feature};
use crate::label;
use crate::weights::WeightSpace;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash of the bias feature added to every instance
pub const CONSTANT_HASH: u64 = 11_650_396;

/// FNV-1a over `bytes`, starting from `seed`
pub fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    bytes
        .iter()
        .fold(seed, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

pub fn hash_namespace(name: &str) -> u64 {
    if name.is_empty() {
        0
    } else {
        fnv1a(name.as_bytes(), FNV_OFFSET)
    }
}

pub fn hash_feature(name: &str, namespace_hash: u64) -> u64 {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = name.parse::<u64>() {
            return namespace_hash.wrapping_add(n);
        }
    }
    fnv1a(name.as_bytes(), namespace_hash ^ FNV_OFFSET)
}

/// Parser for one text line at a time
#[derive(Debug, Clone)]
pub struct TextParser {
    space: WeightSpace,
    add_constant: bool,
    lines: u64,
}

impl TextParser {
    /// `space` supplies bit precision and stride for feature addresses.
    pub fn new(space: WeightSpace) -> Self {
        Self {
            space,
            add_constant: true,
            lines: 0,
        }
    }

    pub fn without_constant(mut self) -> Self {
        self.add_constant = false;
        self
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Parse one line; blank lines yield `None`.
    pub fn parse_line(&mut self, line: &str) -> Option<Example> {
        self.lines += 1;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        let mut sections = line.split('|');
        let head = sections.next().unwrap_or_default();
        let mut label_tokens = Vec::new();
        let mut tag = None;
        for token in head.split_whitespace() {
            match token.strip_prefix('\'') {
                Some(t) => tag = Some(t.to_string()),
                None => label_tokens.push(token),
            }
        }

        let mut features = Vec::new();
        for section in sections {
            self.parse_namespace(section, &mut features);
        }

        if label_tokens.is_empty() && features.is_empty() {
            if let Some(record) = tag.as_deref().and_then(ControlRecord::from_save_tag) {
                let mut ex = Example::control(record);
                ex.tag = tag;
                return Some(ex);
            }
        }

        let mut lbl = label::default_label();
        if label::parse_text(&mut lbl, &label_tokens).is_err() {
            log::debug!("line {}: continuing with label {:?}", self.lines, lbl);
        }
        if self.add_constant {
            features.push(Feature::new(self.space.feature_address(CONSTANT_HASH), 1.0));
        }
        let mut ex = Example::new(lbl, features);
        ex.tag = tag;
        Some(ex)
    }

    fn parse_namespace(&self, section: &str, out: &mut Vec<Feature>) {
        let named = section.chars().next().is_some_and(|c| !c.is_whitespace());
        let mut tokens = section.split_whitespace();
        let ns_hash = if named {
            let name = tokens.next().unwrap_or_default();
            // `name:scale` namespace scaling is not supported; the scale is ignored
            hash_namespace(name.split(':').next().unwrap_or_default())
        } else {
            hash_namespace("")
        };

        for token in tokens {
            let (name, value) = match token.rsplit_once(':') {
                Some((name, v)) => (name, parse_value(v, self.lines)),
                None => (token, 1.0),
            };
            if value == 0.0 {
                continue;
            }
            let hash = hash_feature(name, ns_hash);
            out.push(Feature::new(self.space.feature_address(hash), value));
        }
    }
}

fn parse_value(token: &str, line: u64) -> f32 {
    match token.parse::<f32>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            log::warn!("line {line}: invalid feature value '{token}', using 0");
            0.0
        }
    }
}
