//! `server.properties` in the Java properties format.

use std::path::Path;

use packsync_core::KeyValueEntry;

use super::{MergeError, apply_entries, read_optional, set_pair, write_atomic};

const HEADER: &str = "#Minecraft server properties";

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{c}')
}

/// Parses properties text into ordered pairs. Later duplicates overwrite
/// earlier values in place.
pub fn parse(text: &str) -> Result<Vec<(String, String)>, MergeError> {
    let mut pairs = Vec::new();
    let lines = natural_lines(text);
    let mut index = 0;

    while index < lines.len() {
        let start_line = index + 1;
        let first = lines[index].trim_start_matches(is_blank);
        index += 1;
        if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
            continue;
        }

        let mut logical = String::from(first);
        while ends_with_continuation(&logical) {
            logical.pop();
            let Some(next) = lines.get(index) else {
                break;
            };
            logical.push_str(next.trim_start_matches(is_blank));
            index += 1;
        }

        let (key, value) = split_key_value(&logical);
        set_pair(
            &mut pairs,
            unescape(key, start_line)?,
            unescape(value, start_line)?,
        );
    }
    Ok(pairs)
}

/// Splits on `\n`, `\r` or `\r\n`.
fn natural_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\n' => {
                lines.push(&text[start..pos]);
                pos += 1;
                start = pos;
            }
            b'\r' => {
                lines.push(&text[start..pos]);
                pos += 1;
                if bytes.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
                start = pos;
            }
            _ => pos += 1,
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (pos, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = pos;
                break;
            }
            c if is_blank(c) => {
                key_end = pos;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(is_blank);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(is_blank);
    }
    (key, rest)
}

fn unescape(raw: &str, line: usize) -> Result<String, MergeError> {
    let mut out = String::with_capacity(raw.len());
    let mut units: Vec<u16> = Vec::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_units(&mut units, &mut out);
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            break;
        };
        if next == 'u' {
            let hex: String = chars.by_ref().take(4).collect();
            if hex.len() != 4 {
                return Err(MergeError::MalformedEscape { line });
            }
            let unit =
                u16::from_str_radix(&hex, 16).map_err(|_| MergeError::MalformedEscape { line })?;
            units.push(unit);
            continue;
        }
        flush_units(&mut units, &mut out);
        out.push(match next {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'f' => '\u{c}',
            other => other,
        });
    }
    flush_units(&mut units, &mut out);
    Ok(out)
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    if units.is_empty() {
        return;
    }
    out.extend(char::decode_utf16(units.drain(..)).map(|c| c.unwrap_or('\u{fffd}')));
}

fn escape(text: &str, is_key: bool, out: &mut String) {
    for (pos, c) in text.chars().enumerate() {
        match c {
            ' ' if pos == 0 || is_key => out.push_str("\\ "),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c if (' '..='~').contains(&c) => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{unit:04X}"));
                }
            }
        }
    }
}

pub fn render(pairs: &[(String, String)]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (key, value) in pairs {
        escape(key, true, &mut out);
        out.push('=');
        escape(value, false, &mut out);
        out.push('\n');
    }
    out
}

/// Merges `entries` into `server.properties`. Returns whether the file was
/// rewritten.
pub async fn merge_file(path: &Path, entries: &[KeyValueEntry]) -> Result<bool, MergeError> {
    let mut pairs = match read_optional(path).await? {
        Some(text) => parse(&text)?,
        None => Vec::new(),
    };
    if !apply_entries(&mut pairs, entries) {
        return Ok(false);
    }
    tracing::info!(path = %path.display(), "updating server properties");
    write_atomic(path, render(&pairs).as_bytes()).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_separators_and_comments() {
        let text = "#comment\n! also comment\n\nmotd=Hello World\npvp : true\n  difficulty hard\nempty=\n";
        assert_eq!(
            parse(text).unwrap(),
            pairs(&[
                ("motd", "Hello World"),
                ("pvp", "true"),
                ("difficulty", "hard"),
                ("empty", "")
            ])
        );
    }

    #[test]
    fn parses_escapes_and_continuations() {
        let text = "key\\ with\\ spaces=a\\=b\\tc\nmotd=caf\\u00e9 \\\n    line two\nsmile=\\uD83D\\uDE00\n";
        assert_eq!(
            parse(text).unwrap(),
            pairs(&[
                ("key with spaces", "a=b\tc"),
                ("motd", "café line two"),
                ("smile", "\u{1F600}")
            ])
        );
    }

    #[test]
    fn continuation_across_crlf() {
        let text = "motd=one \\\r\n  two\r\nport=25565\r\n";
        assert_eq!(
            parse(text).unwrap(),
            pairs(&[("motd", "one two"), ("port", "25565")])
        );
    }

    #[test]
    fn rejects_malformed_unicode_escape() {
        assert!(matches!(
            parse("a=\\u12"),
            Err(MergeError::MalformedEscape { line: 1 })
        ));
    }

    #[test]
    fn renders_java_escapes() {
        let out = render(&pairs(&[
            ("motd", " Welcome: caf\u{e9}"),
            ("a key", "x#y"),
        ]));
        assert_eq!(
            out,
            "#Minecraft server properties\nmotd=\\ Welcome\\: caf\\u00E9\na\\ key=x\\#y\n"
        );
        assert_eq!(
            parse(&out).unwrap(),
            pairs(&[("motd", " Welcome: caf\u{e9}"), ("a key", "x#y")])
        );
    }

    #[tokio::test]
    async fn merge_keeps_order_and_local_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.properties");
        std::fs::write(
            &path,
            "#Minecraft server properties\n#Mon Jan 01 00:00:00 UTC 2024\npvp=false\nmotd=Local\n",
        )
        .unwrap();

        let entries = [
            KeyValueEntry::new("motd", "Remote", false),
            KeyValueEntry::new("pvp", "true", true),
            KeyValueEntry::new("max-players", "50", false),
        ];
        assert!(merge_file(&path, &entries).await.unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#Minecraft server properties\npvp=true\nmotd=Local\nmax-players=50\n"
        );

        assert!(!merge_file(&path, &entries).await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_without_entries_is_not_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.properties");
        assert!(!merge_file(&path, &[]).await.unwrap());
        assert!(!path.exists());
    }
}
