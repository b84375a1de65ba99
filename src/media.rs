//! Media type values: `type/subtype; key=value; ...` as found in Content-Type and
//! Content-Disposition.

use crate::decode::for_charset;
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Parameters of a media type, keyed by lower-cased name.
pub type Params = HashMap<String, String>;

/// Split a media type value into its lower-cased bare type and its parameters.
///
/// Dispositions are accepted too, as they share the syntax but carry no subtype. RFC 2231
/// extended (`name*=utf-8''caf%C3%A9`) and continued (`name*0=`, `name*1*=`) parameters are merged
/// back under their plain name. Single-quoted values are tolerated since some mailers produce them.
pub fn parse_media_type(value: &str) -> Result<(String, Params)> {
    let fail = |reason| Error::MediaType {
        value: value.to_string(),
        reason,
    };

    let (base, mut rest) = match value.find(';') {
        Some(i) => (&value[..i], &value[i..]),
        None => (value, ""),
    };
    let media_type = base.trim().to_ascii_lowercase();
    check_media_type(&media_type).map_err(fail)?;

    let mut params = Params::new();
    let mut pieces: HashMap<String, Params> = HashMap::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let (key, value, next) = match consume_param(rest) {
            Some(param) => param,
            None if rest.trim() == ";" => break,
            None => return Err(fail("invalid media parameter")),
        };
        let target = match key.find('*') {
            Some(star) => pieces.entry(key[..star].to_string()).or_default(),
            None => &mut params,
        };
        if target.contains_key(&key) {
            return Err(fail("duplicate parameter name"));
        }
        target.insert(key, value);
        rest = next;
    }

    for (key, parts) in pieces {
        if let Some(value) = merge_pieces(&key, &parts) {
            params.insert(key, value);
        }
    }

    Ok((media_type, params))
}

fn check_media_type(media_type: &str) -> std::result::Result<(), &'static str> {
    let (main, rest) = consume_token(media_type);
    if main.is_empty() {
        return Err("no media type");
    }
    if rest.is_empty() {
        return Ok(());
    }
    let rest = rest
        .strip_prefix('/')
        .ok_or("expected slash after first token")?;
    let (sub, rest) = consume_token(rest);
    if sub.is_empty() {
        return Err("expected token after slash");
    }
    if !rest.is_empty() {
        return Err("unexpected content after media subtype");
    }
    Ok(())
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?=".contains(c)
}

fn consume_token(v: &str) -> (&str, &str) {
    let end = v.find(|c| !is_token_char(c)).unwrap_or_else(|| v.len());
    v.split_at(end)
}

/// Parse `; key=value`, returning the lower-cased key, the value and the remaining input.
fn consume_param(v: &str) -> Option<(String, String, &str)> {
    let v = v.trim_start().strip_prefix(';')?.trim_start();
    let (key, v) = consume_token(v);
    if key.is_empty() {
        return None;
    }
    let v = v.trim_start().strip_prefix('=')?.trim_start();
    let (value, rest) = consume_value(v)?;
    Some((key.to_ascii_lowercase(), value, rest))
}

fn consume_value(v: &str) -> Option<(String, &str)> {
    if let Some(quoted) = v.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Some((value, &quoted[i + 1..])),
                '\\' => value.push(chars.next()?.1),
                _ => value.push(c),
            }
        }
        return None;
    }

    if let Some(quoted) = v.strip_prefix('\'') {
        if let Some(end) = quoted.find('\'') {
            return Some((quoted[..end].to_string(), &quoted[end + 1..]));
        }
    }

    let (token, rest) = consume_token(v);
    if token.is_empty() {
        return None;
    }
    Some((token.to_string(), rest))
}

/// Reassemble the RFC 2231 pieces collected for `key`.
fn merge_pieces(key: &str, parts: &Params) -> Option<String> {
    if let Some(value) = parts.get(&format!("{}*", key)) {
        return decode_extended(value);
    }

    let mut bytes = Vec::new();
    let mut encoding = None;
    let mut found = false;
    for n in 0.. {
        let plain = format!("{}*{}", key, n);
        if let Some(value) = parts.get(&plain) {
            bytes.extend_from_slice(value.as_bytes());
            found = true;
            continue;
        }
        let value = match parts.get(&format!("{}*", plain)) {
            Some(value) => value,
            None => break,
        };
        found = true;
        if n == 0 {
            let (charset, encoded) = split_extended(value)?;
            encoding = charset;
            bytes.extend(percent_decode_str(encoded));
        } else {
            bytes.extend(percent_decode_str(value));
        }
    }

    if !found {
        return None;
    }
    Some(match encoding {
        Some(encoding) => encoding.decode_without_bom_handling(&bytes).0.into_owned(),
        None => String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Decode `charset'language'percent-encoded`.
fn decode_extended(value: &str) -> Option<String> {
    let (encoding, encoded) = split_extended(value)?;
    let bytes: Vec<u8> = percent_decode_str(encoded).collect();
    Some(match encoding {
        Some(encoding) => encoding.decode_without_bom_handling(&bytes).0.into_owned(),
        None => String::from_utf8_lossy(&bytes).into_owned(),
    })
}

fn split_extended(value: &str) -> Option<(Option<&'static encoding_rs::Encoding>, &str)> {
    let mut fields = value.splitn(3, '\'');
    let charset = fields.next()?;
    let _language = fields.next()?;
    let encoded = fields.next()?;
    if charset.is_empty() {
        return Some((None, encoded));
    }
    let encoding = for_charset(charset).ok()?;
    Some((Some(encoding), encoded))
}
