// CLASSIFICATION: COMMUNITY
// Filename: number.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Value helpers shared by both backends.

extern crate alloc;
use alloc::string::String;
use core::net::Ipv4Addr;

use super::MacAddress;

/// Lower-case `s` and drop spaces, underscores and hyphens, so that
/// `"Bed Heater"`, `"bed_heater"` and `"bed-heater"` compare equal.
pub fn reduce(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fill the unsupplied tail of `out` with the last supplied value when
/// `pad` is set. Returns the count the caller should report.
pub fn pad_tail<T: Copy>(out: &mut [T], supplied: usize, pad: bool) -> usize {
    if pad && supplied > 0 && supplied < out.len() {
        let last = out[supplied - 1];
        out[supplied..].fill(last);
        out.len()
    } else {
        supplied
    }
}

fn number_span(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && matches!(bytes[end], b'+' | b'-') {
        end += 1;
    }
    let mut seen_exp = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' | b'.' => end += 1,
            b'e' | b'E' if !seen_exp && end > 0 => {
                // only an exponent when digits follow
                let next = bytes.get(end + 1).copied();
                let digit_after = match next {
                    Some(b'+' | b'-') => bytes.get(end + 2).is_some_and(u8::is_ascii_digit),
                    Some(d) => d.is_ascii_digit(),
                    None => false,
                };
                if !digit_after {
                    break;
                }
                seen_exp = true;
                end += 2;
            }
            _ => break,
        }
    }
    end
}

/// Parse a float at the start of `s`, returning it and the bytes consumed.
pub fn float_prefix(s: &str) -> Option<(f32, usize)> {
    let end = number_span(s);
    s[..end].parse::<f32>().ok().map(|v| (v, end))
}

/// Parse a signed decimal integer at the start of `s`.
pub fn int_prefix(s: &str) -> Option<(i32, usize)> {
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    s[..end].parse::<i32>().ok().map(|v| (v, end))
}

/// Parse an unsigned integer at the start of `s`; `0x` selects hex.
pub fn uint_prefix(s: &str) -> Option<(u32, usize)> {
    let bytes = s.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'0' && matches!(bytes[1], b'x' | b'X') {
        let mut end = 2;
        while end < bytes.len() && bytes[end].is_ascii_hexdigit() {
            end += 1;
        }
        return u32::from_str_radix(&s[2..end], 16).ok().map(|v| (v, end));
    }
    let mut end = usize::from(bytes.first() == Some(&b'+'));
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    s[usize::from(bytes.first() == Some(&b'+'))..end]
        .parse::<u32>()
        .ok()
        .map(|v| (v, end))
}

/// Parse a dotted quad such as `192.168.1.10`.
pub fn ipv4(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Parse six colon-separated hex bytes such as `be:ef:de:ad:fe:ed`.
pub fn mac(s: &str) -> Option<MacAddress> {
    let mut bytes = [0u8; 6];
    let mut parts = s.split(':');
    for byte in bytes.iter_mut() {
        let part = parts.next()?.trim();
        if part.is_empty() || part.len() > 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(MacAddress(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_strips_separators() {
        assert_eq!(reduce("Bed_Heater - 2"), "bedheater2");
    }

    #[test]
    fn pad_repeats_last_value() {
        let mut out = [1.0f32, 2.0, 0.0];
        assert_eq!(pad_tail(&mut out, 2, true), 3);
        assert_eq!(out, [1.0, 2.0, 2.0]);
        let mut out = [1, 0, 0];
        assert_eq!(pad_tail(&mut out, 1, false), 1);
    }

    #[test]
    fn numeric_prefixes() {
        assert_eq!(float_prefix("-2.5Y"), Some((-2.5, 4)));
        assert_eq!(float_prefix("1e3 "), Some((1000.0, 3)));
        assert_eq!(float_prefix("3E"), Some((3.0, 1)));
        assert_eq!(float_prefix("abc"), None);
        assert_eq!(int_prefix("+17:"), Some((17, 3)));
        assert_eq!(uint_prefix("0x1F "), Some((31, 4)));
        assert_eq!(uint_prefix("-1"), None);
    }

    #[test]
    fn addresses() {
        assert_eq!(ipv4("10.0.0.2"), Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(ipv4("10.0.0"), None);
        assert_eq!(ipv4("10.0.0.256"), None);
        assert_eq!(
            mac("be:ef:de:ad:fe:ed"),
            Some(MacAddress([0xbe, 0xef, 0xde, 0xad, 0xfe, 0xed]))
        );
        assert_eq!(mac("be:ef"), None);
    }
}
