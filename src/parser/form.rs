//! Decoder for `application/x-www-form-urlencoded` bodies.

use std::collections::HashMap;

/// Media type of bodies this decoder understands.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Decodes a form body into field name/value pairs.
///
/// `+` becomes a space and `%XY` becomes the byte `0xXY`. A `%` that is not
/// followed by two hex digits is kept literally. Later fields overwrite
/// earlier ones with the same name.
pub fn parse_urlencoded(body: &[u8]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut key: Option<Vec<u8>> = None;
    let mut current = Vec::new();

    let mut i = 0;
    while i < body.len() {
        match body[i] {
            b'=' if key.is_none() => key = Some(std::mem::take(&mut current)),
            b'&' => finish_pair(&mut fields, key.take(), std::mem::take(&mut current)),
            b'+' => current.push(b' '),
            b'%' => match decode_hex_pair(body.get(i + 1..i + 3)) {
                Some(byte) => {
                    current.push(byte);
                    i += 2;
                }
                None => current.push(b'%'),
            },
            other => current.push(other),
        }
        i += 1;
    }
    finish_pair(&mut fields, key, current);

    fields
}

fn finish_pair(fields: &mut HashMap<String, String>, key: Option<Vec<u8>>, current: Vec<u8>) {
    let (key, value) = match key {
        Some(key) => (key, current),
        None if current.is_empty() => return,
        None => (current, Vec::new()),
    };
    fields.insert(
        String::from_utf8_lossy(&key).into_owned(),
        String::from_utf8_lossy(&value).into_owned(),
    );
}

fn decode_hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = pair?;
    let hi = (pair[0] as char).to_digit(16)?;
    let lo = (pair[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
