//! Schedule DSL
//!
//! One entry per line:
//!
//! ```text
//! <lora:NAME:STRENGTH_MODEL:STRENGTH_CLIP[:FIELD]...>
//! ```
//!
//! Two encodings exist for the trailing fields. The legacy one is a fixed
//! ramp `S_START:S_END:_:P_START:P_END:COUNT`; the modern one is any mix of
//! `preset=ID`, `vectors=K=V;K=V` and `X,Y;X,Y` point lists. Both parse to
//! an explicit point list, so the legacy form is never written back.
//!
//! A whole input starting with `[` is also tried as a JSON entry array.
//!
//! Parsing never fails: unparseable numbers keep their default, malformed
//! points and vector values are dropped one by one, and lines outside the
//! `<lora:...>` envelope are ignored.

use crate::config::entries_from_values;
use loraplan_core::{FLAT_CURVE, KeyPoint, ScheduleEntry};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const ENVELOPE_OPEN: &str = "<lora:";
const ENVELOPE_CLOSE: &str = ">";

/// Field count from which a numeric fourth field means the legacy ramp
const LEGACY_MIN_FIELDS: usize = 9;

/// Largest legacy ramp point count; larger counts fall back to the flat curve
pub const LEGACY_MAX_POINTS: i64 = 1000;

/// Trailing-field encoding of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `S_START:S_END:_:P_START:P_END:COUNT`
    LegacyRamp,
    /// `preset=`, `vectors=` and point-list fields
    Modern,
}

impl Encoding {
    /// Pick the encoding of a line's colon-separated fields
    pub fn detect(fields: &[&str]) -> Self {
        if fields.len() >= LEGACY_MIN_FIELDS {
            let head = fields[3];
            if parse_number(head).is_some() && !head.contains(['=', ',', ';']) {
                return Self::LegacyRamp;
            }
        }
        Self::Modern
    }
}

/// Parse DSL text (or a JSON entry array) into schedule entries
pub fn parse(input: &str) -> Vec<ScheduleEntry> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(items) => return entries_from_values(items),
            Err(e) => debug!(error = %e, "Not a JSON entry array, parsing as DSL"),
        }
    }

    input.lines().filter_map(parse_line).collect()
}

/// Parse one `<lora:...>` line
pub fn parse_line(line: &str) -> Option<ScheduleEntry> {
    let body = line
        .trim()
        .strip_prefix(ENVELOPE_OPEN)?
        .strip_suffix(ENVELOPE_CLOSE)?;
    let fields: Vec<&str> = body.split(':').collect();

    let mut entry = ScheduleEntry::new(fields[0]);
    if let Some(v) = fields.get(1).and_then(|f| parse_number(f)) {
        entry.strength_model = v;
    }
    if let Some(v) = fields.get(2).and_then(|f| parse_number(f)) {
        entry.strength_clip = v;
    }

    match Encoding::detect(&fields) {
        Encoding::LegacyRamp => entry.points = legacy_ramp(&fields),
        Encoding::Modern => {
            for field in fields.iter().skip(3) {
                apply_modern_field(&mut entry, field.trim());
            }
        }
    }

    if entry.points.is_empty() {
        entry.points = FLAT_CURVE.to_vec();
    }
    entry.sort_points();
    Some(entry)
}

/// Finite number with surrounding whitespace allowed
fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Round to 4 decimals the way the text form renders them
fn quantize(value: f64) -> f64 {
    format!("{value:.4}").parse().unwrap_or(value)
}

/// Points of a legacy fixed ramp; empty when any field is malformed
fn legacy_ramp(fields: &[&str]) -> Vec<KeyPoint> {
    let numbers = (
        parse_number(fields[3]),
        parse_number(fields[4]),
        parse_number(fields[6]),
        parse_number(fields[7]),
        fields[8].trim().parse::<i64>().ok(),
    );
    let (Some(s_start), Some(s_end), Some(p_start), Some(p_end), Some(count)) = numbers else {
        return Vec::new();
    };
    if count > LEGACY_MAX_POINTS {
        warn!(
            count,
            max = LEGACY_MAX_POINTS,
            "Legacy ramp point count too large, using flat curve"
        );
        return Vec::new();
    }

    (0..count.max(0))
        .map(|i| {
            let t = if count > 1 {
                i as f64 / (count - 1) as f64
            } else {
                0.0
            };
            KeyPoint::new(
                quantize(p_start + (p_end - p_start) * t),
                quantize(s_start + (s_end - s_start) * t),
            )
        })
        .collect()
}

fn apply_modern_field(entry: &mut ScheduleEntry, field: &str) {
    if field.is_empty() {
        return;
    }

    if let Some(preset) = field.strip_prefix("preset=") {
        entry.preset = Some(preset.trim().into());
    } else if let Some(vectors) = field.strip_prefix("vectors=") {
        parse_vectors(vectors, &mut entry.vectors);
    } else if field.contains(',') {
        entry.points.extend(parse_points(field));
    }
}

/// `k=v;k:v;...` into `out`; pairs with a bad value are skipped
fn parse_vectors(text: &str, out: &mut BTreeMap<String, f64>) {
    for pair in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=').or_else(|| pair.split_once(':')) else {
            continue;
        };
        if let Some(v) = parse_number(value) {
            out.insert(key.trim().to_string(), v);
        }
    }
}

/// `x,y;x,y` pairs; malformed pairs are skipped
fn parse_points(text: &str) -> impl Iterator<Item = KeyPoint> + '_ {
    text.split(';').filter_map(|pair| {
        let mut coords = pair.split(',');
        let (x, y) = (coords.next()?, coords.next()?);
        if coords.next().is_some() {
            return None;
        }
        Some(KeyPoint::new(parse_number(x)?, parse_number(y)?))
    })
}

/// Render a number with up to 4 decimals, trailing zeros removed
pub fn format_value(value: f64) -> String {
    let text = format!("{value:.4}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Canonical `k=v;k=v` rendering, keys ascending
pub fn format_vectors(vectors: &BTreeMap<String, f64>) -> String {
    vectors
        .iter()
        .map(|(k, v)| format!("{k}={}", format_value(*v)))
        .collect::<Vec<_>>()
        .join(";")
}

/// Canonical `x,y;x,y` rendering, ascending by `x`
pub fn format_points(points: &[KeyPoint]) -> String {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));
    sorted
        .iter()
        .map(|p| format!("{},{}", format_value(p.x), format_value(p.y)))
        .collect::<Vec<_>>()
        .join(";")
}

/// Canonical line for one entry.
///
/// An active preset is written by name; otherwise non-empty vectors are
/// written out. An entry without points is written with the flat curve it
/// would parse back to.
pub fn serialize_entry(entry: &ScheduleEntry) -> String {
    let points = if entry.points.is_empty() {
        format_points(&FLAT_CURVE)
    } else {
        format_points(&entry.points)
    };

    let extra = match entry.active_preset() {
        Some(preset) => format!(":preset={preset}"),
        None if !entry.vectors.is_empty() => format!(":vectors={}", format_vectors(&entry.vectors)),
        None => String::new(),
    };

    format!(
        "{ENVELOPE_OPEN}{}:{}:{}:{points}{extra}{ENVELOPE_CLOSE}",
        entry.lora_name,
        format_value(entry.strength_model),
        format_value(entry.strength_clip),
    )
}

/// Canonical text for a list of entries, one line each
pub fn serialize<'a>(entries: impl IntoIterator<Item = &'a ScheduleEntry>) -> String {
    entries
        .into_iter()
        .map(serialize_entry)
        .collect::<Vec<_>>()
        .join("\n")
}
