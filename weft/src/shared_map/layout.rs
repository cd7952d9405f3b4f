//! Byte layout of a SharedMap.
//!
//! The keys buffer holds `name(start,end);` descriptors back to back, followed by
//! zero bytes. Ranges are half-open and address the values buffer. Descriptors are
//! kept in value order and the values are packed from offset 0 without gaps, so the
//! last descriptor's `end` is the number of value bytes in use.

use serde_json::Value;

use crate::error::SharedMapError;

/// Encoding stored for empty values and for `delete`.
pub const NULL_ENCODING: &[u8] = b"null";

/// Strings are stored as their UTF-8 bytes, everything else as JSON text.
/// Empty encodings become `NULL_ENCODING` so no range is ever empty.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, SharedMapError> {
    let bytes = match value {
        Value::String(text) => text.as_bytes().to_vec(),
        other => serde_json::to_vec(other).map_err(|e| SharedMapError::Encode(e.to_string()))?,
    };
    if bytes.is_empty() {
        Ok(NULL_ENCODING.to_vec())
    } else {
        Ok(bytes)
    }
}

pub fn validate_name(name: &str) -> Result<(), SharedMapError> {
    let forbidden = |c: char| matches!(c, '(' | ')' | ';' | ',' | '\0');
    if name.is_empty() || name.contains(forbidden) {
        return Err(SharedMapError::InvalidKey(name.to_string()));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl Descriptor {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Decoded index of a keys buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Layout {
    descriptors: Vec<Descriptor>,
}

/// Byte edits that move a layout from one state to the next.
#[derive(Debug, PartialEq, Eq)]
pub struct Rewrite {
    /// Index of the descriptor whose value changes
    pub index: usize,
    /// Bytes in use before and after
    pub old_used: usize,
    pub new_used: usize,
    /// Old end of the target value; everything from here to `old_used` moves
    pub old_end: usize,
    pub new_end: usize,
    /// Serialized keys after the change
    pub keys: Vec<u8>,
}

impl Layout {
    /// Lay out `entries` back to back, in the given order.
    pub fn pack<'a, I>(entries: I) -> Result<Self, SharedMapError>
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let mut descriptors: Vec<Descriptor> = Vec::new();
        let mut offset = 0;
        for (name, len) in entries {
            validate_name(name)?;
            if descriptors.iter().any(|d| d.name == name) {
                return Err(SharedMapError::DuplicateKey(name.to_string()));
            }
            descriptors.push(Descriptor {
                name: name.to_string(),
                start: offset,
                end: offset + len,
            });
            offset += len;
        }
        Ok(Self { descriptors })
    }

    /// Parse the keys buffer, ignoring the zero-filled tail.
    pub fn decode(keys: &[u8]) -> Result<Self, SharedMapError> {
        let used = keys.iter().position(|b| *b == 0).unwrap_or(keys.len());
        let text = std::str::from_utf8(&keys[..used])
            .map_err(|e| SharedMapError::Corrupted(e.to_string()))?;

        let mut descriptors = Vec::new();
        for entry in text.split(';').filter(|entry| !entry.is_empty()) {
            descriptors.push(parse_descriptor(entry)?);
        }
        Ok(Self { descriptors })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        for d in &self.descriptors {
            out.push_str(&format!("{}({},{});", d.name, d.start, d.end));
        }
        out.into_bytes()
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn find(&self, name: &str) -> Option<(usize, &Descriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.name == name)
    }

    /// Value bytes in use.
    pub fn used(&self) -> usize {
        self.descriptors.last().map(|d| d.end).unwrap_or(0)
    }

    /// Resize the value at `index` to `new_len`, shifting every later range by the
    /// difference. Returns the edits to apply to the buffers; `self` is updated only
    /// when both capacities hold.
    pub fn resize(
        &mut self,
        index: usize,
        new_len: usize,
        values_capacity: usize,
        keys_capacity: usize,
    ) -> Result<Rewrite, SharedMapError> {
        let old_used = self.used();
        let target = &self.descriptors[index];
        let old_end = target.end;
        let new_end = target.start + new_len;
        let new_used = old_used + new_end - old_end;

        if new_used > values_capacity {
            return Err(SharedMapError::CapacityExceeded {
                buffer: "values",
                required: new_used,
                capacity: values_capacity,
            });
        }

        let mut next = self.clone();
        next.descriptors[index].end = new_end;
        for d in next.descriptors.iter_mut().skip(index + 1) {
            d.start = d.start + new_end - old_end;
            d.end = d.end + new_end - old_end;
        }

        let keys = next.encode();
        if keys.len() > keys_capacity {
            return Err(SharedMapError::CapacityExceeded {
                buffer: "keys",
                required: keys.len(),
                capacity: keys_capacity,
            });
        }

        *self = next;
        Ok(Rewrite {
            index,
            old_used,
            new_used,
            old_end,
            new_end,
            keys,
        })
    }
}

fn parse_descriptor(entry: &str) -> Result<Descriptor, SharedMapError> {
    let corrupted = || SharedMapError::Corrupted(format!("bad descriptor {entry:?}"));

    let open = entry.find('(').ok_or_else(corrupted)?;
    let range = entry[open + 1..].strip_suffix(')').ok_or_else(corrupted)?;
    let (start, end) = range.split_once(',').ok_or_else(corrupted)?;
    let start: usize = start.parse().map_err(|_| corrupted())?;
    let end: usize = end.parse().map_err(|_| corrupted())?;
    if end < start {
        return Err(corrupted());
    }

    Ok(Descriptor {
        name: entry[..open].to_string(),
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_strings_verbatim_and_others_as_json() {
        assert_eq!(encode_value(&json!("hi")).unwrap(), b"hi");
        assert_eq!(encode_value(&json!(1)).unwrap(), b"1");
        assert_eq!(encode_value(&json!({"a": [1]})).unwrap(), br#"{"a":[1]}"#);
        assert_eq!(encode_value(&json!("")).unwrap(), NULL_ENCODING);
    }

    #[test]
    fn decode_ignores_zero_tail() {
        let mut keys = b"a(0,1);bb(1,4);".to_vec();
        keys.resize(64, 0);
        let layout = Layout::decode(&keys).unwrap();
        assert_eq!(layout.descriptors().len(), 2);
        assert_eq!(layout.find("bb").unwrap().1.start, 1);
        assert_eq!(layout.used(), 4);
        assert_eq!(layout.encode(), b"a(0,1);bb(1,4);");
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_name("ok_name").is_ok());
        for bad in ["", "a(b", "a;b", "a,b", "x)"] {
            assert!(matches!(validate_name(bad), Err(SharedMapError::InvalidKey(_))));
        }
    }

    #[test]
    fn resize_shifts_later_ranges() {
        let mut layout = Layout::pack([("a", 1), ("b", 3), ("c", 2)]).unwrap();
        let rewrite = layout.resize(0, 4, 100, 100).unwrap();
        assert_eq!(rewrite.old_used, 6);
        assert_eq!(rewrite.new_used, 9);
        assert_eq!(rewrite.old_end, 1);
        assert_eq!(rewrite.new_end, 4);
        assert_eq!(layout.encode(), b"a(0,4);b(4,7);c(7,9);");

        layout.resize(1, 1, 100, 100).unwrap();
        assert_eq!(layout.encode(), b"a(0,4);b(4,5);c(5,7);");
    }

    #[test]
    fn resize_over_capacity_leaves_layout_untouched() {
        let mut layout = Layout::pack([("a", 1), ("b", 1)]).unwrap();
        let before = layout.clone();
        let err = layout.resize(0, 10, 5, 100).unwrap_err();
        assert!(matches!(err, SharedMapError::CapacityExceeded { buffer: "values", .. }));
        assert_eq!(layout, before);

        let err = layout.resize(0, 2, 100, 4).unwrap_err();
        assert!(matches!(err, SharedMapError::CapacityExceeded { buffer: "keys", .. }));
        assert_eq!(layout, before);
    }
}
