//! Minimal writer for revision 3 source maps.
//!
//! Only what the built-in minifier needs: one source file, segments mapping a
//! generated position to an original line and column, no symbol names.

use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original_line: u32,
    pub original_column: u32,
}

#[derive(Serialize)]
struct Document<'a> {
    version: u8,
    file: &'a str,
    sources: [&'a str; 1],
    names: [&'a str; 0],
    mappings: String,
}

#[derive(Debug)]
pub struct SourceMap {
    file: String,
    source: String,
    mappings: Vec<Mapping>,
}

impl SourceMap {
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            source: source.into(),
            mappings: Vec::new(),
        }
    }

    /// Adds a mapping. Mappings must be added in generated order.
    pub fn add(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Document {
            version: 3,
            file: &self.file,
            sources: [&self.source],
            names: [],
            mappings: self.encode_mappings(),
        })
    }

    fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut line = 0;
        let mut prev_original_line = 0i64;
        let mut prev_original_column = 0i64;
        let mut prev_generated_column = 0i64;
        let mut first_in_line = true;

        for m in &self.mappings {
            while line < m.generated_line {
                out.push(';');
                line += 1;
                prev_generated_column = 0;
                first_in_line = true;
            }

            if !first_in_line {
                out.push(',');
            }
            first_in_line = false;

            vlq(&mut out, m.generated_column as i64 - prev_generated_column);
            // single source, its index never changes
            vlq(&mut out, 0);
            vlq(&mut out, m.original_line as i64 - prev_original_line);
            vlq(&mut out, m.original_column as i64 - prev_original_column);

            prev_generated_column = m.generated_column as i64;
            prev_original_line = m.original_line as i64;
            prev_original_column = m.original_column as i64;
        }

        out
    }
}

fn vlq(out: &mut String, value: i64) {
    let mut v = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    } as u64;

    loop {
        let mut digit = (v & 0b11111) as usize;
        v >>= 5;
        if v > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if v == 0 {
            break;
        }
    }
}

/// Decodes a `mappings` string back into absolute positions.
#[cfg(test)]
pub(crate) fn decode(mappings: &str) -> Vec<Mapping> {
    let mut result = Vec::new();
    let (mut original_line, mut original_column) = (0i64, 0i64);

    for (line, group) in mappings.split(';').enumerate() {
        let mut generated_column = 0i64;
        for segment in group.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_segment(segment);
            generated_column += fields[0];
            original_line += fields[2];
            original_column += fields[3];
            result.push(Mapping {
                generated_line: line as u32,
                generated_column: generated_column as u32,
                original_line: original_line as u32,
                original_column: original_column as u32,
            });
        }
    }

    result
}

#[cfg(test)]
fn decode_segment(segment: &str) -> Vec<i64> {
    let mut fields = Vec::new();
    let (mut value, mut shift) = (0u64, 0);

    for c in segment.bytes() {
        let digit = BASE64.iter().position(|&b| b == c).unwrap() as u64;
        value |= (digit & 0b11111) << shift;
        if digit & 0b100000 != 0 {
            shift += 5;
        } else {
            let negative = value & 1 == 1;
            let magnitude = (value >> 1) as i64;
            fields.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }

    fields
}
