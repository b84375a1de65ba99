//! RFC 2047 encoded words (`=?charset?B?...?=`) in header values.

use crate::decode::{for_charset, BASE64};
use base64::Engine;
use regex::Regex;

/// Decode every encoded word in `input`.
///
/// Whitespace separating two adjacent encoded words is dropped. Words in an unknown charset or
/// with a broken payload are kept verbatim.
pub fn decode_header(input: &str) -> String {
    lazy_static! {
        static ref WORD: Regex = Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").unwrap();
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut joined = false;

    for caps in WORD.captures_iter(input) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let gap = &input[last..whole.start()];
        match decode_word(&caps[1], &caps[2], &caps[3]) {
            Some(text) => {
                if !(joined && gap.trim().is_empty()) {
                    out.push_str(gap);
                }
                out.push_str(&text);
                joined = true;
            }
            None => {
                out.push_str(gap);
                out.push_str(whole.as_str());
                joined = false;
            }
        }
        last = whole.end();
    }

    out.push_str(&input[last..]);
    out
}

fn decode_word(charset: &str, encoding: &str, payload: &str) -> Option<String> {
    // RFC 2231 allows a language suffix: =?utf-8*en?Q?...?=
    let charset = charset.split('*').next().unwrap_or(charset);
    let charset = for_charset(charset).ok()?;
    let bytes = if encoding.eq_ignore_ascii_case("b") {
        BASE64.decode(payload).ok()?
    } else {
        decode_q(payload)
    };
    Some(charset.decode_without_bom_handling(&bytes).0.into_owned())
}

/// Q encoding: underscores are spaces, `=XX` is a byte.
fn decode_q(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}
