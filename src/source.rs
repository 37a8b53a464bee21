//! Text helpers for decompiled sources: placeholder stubs and unicode unescaping.

/// The part of an internal name after the last `/`.
pub fn simple_name(name: &str) -> &str {
    name.rsplit_once('/').map_or(name, |(_, simple)| simple)
}

/// Compilable stand-in for a class the backend failed on.
pub fn failure_stub(name: &str) -> String {
    stub(name, &format!("Failed to decompile: {name}"))
}

/// Compilable stand-in for a class that ran past its timeout.
pub fn timeout_stub(name: &str) -> String {
    stub(name, &format!("Failed to decompile, took too long to decompile: {name}"))
}

fn stub(name: &str, comment: &str) -> String {
    format!("public class {} {{\n\t// {comment}\n}}", simple_name(name))
}

/// Replaces `\uXXXX` escapes emitted by decompilers with the characters they denote.
///
/// An escape only counts when its backslash is not itself escaped, the `u` may be
/// repeated as Java allows, and surrogate pairs are joined. Anything malformed is
/// copied through untouched.
pub fn unescape_unicode(input: &str) -> String {
    if !input.contains("\\u") {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail[1..].starts_with('\\') {
            out.push_str("\\\\");
            rest = &tail[2..];
            continue;
        }

        let Some((unit, len)) = parse_escape(tail) else {
            out.push('\\');
            rest = &tail[1..];
            continue;
        };

        if let Some(ch) = char::from_u32(u32::from(unit)) {
            out.push(ch);
            rest = &tail[len..];
            continue;
        }

        if (0xD800..0xDC00).contains(&unit)
            && let Some((low, low_len)) = parse_escape(&tail[len..])
            && (0xDC00..0xE000).contains(&low)
        {
            let code = 0x10000 + ((u32::from(unit) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
            if let Some(ch) = char::from_u32(code) {
                out.push(ch);
                rest = &tail[len + low_len..];
                continue;
            }
        }

        out.push_str(&tail[..len]);
        rest = &tail[len..];
    }
    out.push_str(rest);
    out
}

fn parse_escape(s: &str) -> Option<(u16, usize)> {
    let rest = s.strip_prefix('\\')?;
    let us = rest.bytes().take_while(|b| *b == b'u').count();
    if us == 0 {
        return None;
    }
    let hex = rest.get(us..us + 4)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let unit = u16::from_str_radix(hex, 16).ok()?;
    Some((unit, 1 + us + 4))
}
