//! Label codec
//!
//! The label attached to every example is a `(value, weight)` pair. On disk it is
//! a fixed 8-byte little-endian record; in text it is `<value> [weight]`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::LabelError;

/// Byte length of one encoded label record (value f32 + weight f32)
pub const LABEL_RECORD_SIZE: usize = 8;

/// Sentinel value for "no label": the example is predicted but never trained on
pub const UNKNOWN_LABEL: f32 = f32::MAX;

/// Target value and importance weight of one example
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label {
    pub value: f32,
    pub weight: f32,
}

impl Label {
    pub fn new(value: f32, weight: f32) -> Self {
        Self { value, weight }
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.value == UNKNOWN_LABEL
    }
}

impl Default for Label {
    fn default() -> Self {
        default_label()
    }
}

/// Label every freshly parsed example starts from
pub fn default_label() -> Label {
    Label {
        value: UNKNOWN_LABEL,
        weight: 1.0,
    }
}

/// Importance weight; negative weights never reach aggregation
#[inline]
pub fn weight(label: &Label) -> f32 {
    if label.weight > 0.0 { label.weight } else { 0.0 }
}

/// Seed for the initial prediction bias
#[inline]
pub fn initial(_label: &Label) -> f32 {
    0.0
}

/// Decode one label record from the front of `bytes`.
///
/// Returns `LabelError::ShortRead` when fewer than [`LABEL_RECORD_SIZE`] bytes
/// are available; readers treat that as end of input.
pub fn decode(bytes: &[u8]) -> Result<Label, LabelError> {
    if bytes.len() < LABEL_RECORD_SIZE {
        return Err(LabelError::ShortRead {
            needed: LABEL_RECORD_SIZE,
            available: bytes.len(),
        });
    }
    Ok(Label {
        value: LittleEndian::read_f32(&bytes[0..4]),
        weight: LittleEndian::read_f32(&bytes[4..8]),
    })
}

/// Encode a label record; exact inverse of [`decode`].
pub fn encode(label: &Label) -> [u8; LABEL_RECORD_SIZE] {
    let mut buf = [0u8; LABEL_RECORD_SIZE];
    LittleEndian::write_f32(&mut buf[0..4], label.value);
    LittleEndian::write_f32(&mut buf[4..8], label.weight);
    buf
}

/// Apply the label section of a text record.
///
/// - no tokens: label untouched
/// - `<value>`: integer value, weight 1.0
/// - `<value> <weight>`: integer value, float weight
///
/// More tokens log a diagnostic and return `LabelError::Malformed`; the label
/// keeps whatever state it had and the record is still processed.
pub fn parse_text(label: &mut Label, tokens: &[&str]) -> Result<(), LabelError> {
    match tokens {
        [] => Ok(()),
        [value] => {
            label.value = int_prefix(value) as f32;
            label.weight = 1.0;
            Ok(())
        }
        [value, weight] => {
            label.value = int_prefix(value) as f32;
            label.weight = parse_weight(weight);
            Ok(())
        }
        _ => {
            log::warn!(
                "malformed example: label section has {} tokens ({})",
                tokens.len(),
                tokens.join(" ")
            );
            Err(LabelError::Malformed {
                tokens: tokens.len(),
            })
        }
    }
}

/// Leading-integer parse: optional sign then digits, anything else stops.
/// No digits gives 0; overflow saturates.
fn int_prefix(token: &str) -> i64 {
    let s = token.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0;
    }
    match s[..end].parse::<i64>() {
        Ok(v) => v,
        Err(_) if bytes[0] == b'-' => i64::MIN,
        Err(_) => i64::MAX,
    }
}

fn parse_weight(token: &str) -> f32 {
    token.parse::<f32>().unwrap_or_else(|_| {
        log::warn!("invalid label weight '{token}', using 0");
        0.0
    })
}
