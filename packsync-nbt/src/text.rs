use std::fmt::{self, Display, Formatter, Write};

use crate::tag::{Compound, Tag};

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Byte(value) => write!(f, "{value}b"),
            Tag::Short(value) => write!(f, "{value}s"),
            Tag::Int(value) => write!(f, "{value}"),
            Tag::Long(value) => write!(f, "{value}L"),
            Tag::Float(value) => write!(f, "{value}f"),
            Tag::Double(value) => write!(f, "{value}d"),
            Tag::ByteArray(values) => array(f, "B", values),
            Tag::String(value) => escape(f, value),
            Tag::List(values) => {
                f.write_char('[')?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    Display::fmt(value, f)?;
                }
                f.write_char(']')
            }
            Tag::Compound(compound) => Display::fmt(compound, f),
            Tag::IntArray(values) => array(f, "I", values),
            Tag::LongArray(values) => array(f, "L", values),
        }
    }
}

impl Display for Compound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_char('{')?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            escape(f, key)?;
            f.write_char(':')?;
            Display::fmt(value, f)?;
        }
        f.write_char('}')
    }
}

fn array<T: Display>(f: &mut Formatter<'_>, prefix: &str, values: &[T]) -> fmt::Result {
    write!(f, "[{prefix};")?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_char(',')?;
        }
        write!(f, "{value}")?;
    }
    f.write_char(']')
}

/// Quotes with `"` unless the value contains one before any `'`, in which
/// case `'` is used; only the chosen quote character is escaped.
fn escape(f: &mut Formatter<'_>, value: &str) -> fmt::Result {
    let quote = match value.chars().find(|c| *c == '"' || *c == '\'') {
        Some('"') => '\'',
        _ => '"',
    };
    f.write_char(quote)?;
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\u{8}' => f.write_str("\\b")?,
            '\t' => f.write_str("\\t")?,
            '\n' => f.write_str("\\n")?,
            '\u{c}' => f.write_str("\\f")?,
            '\r' => f.write_str("\\r")?,
            c if c < ' ' => write!(f, "\\x{:02X}", c as u32)?,
            c if c == quote => {
                f.write_char('\\')?;
                f.write_char(c)?;
            }
            c => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_nested_document() {
        let server: Compound = [("name", Tag::from("S1")), ("hidden", Tag::Byte(1))]
            .into_iter()
            .collect();
        let mut root = Compound::new();
        root.insert("servers", Tag::List(vec![Tag::Compound(server)]));

        assert_eq!(root.to_string(), r#"{"servers":[{"name":"S1","hidden":1b}]}"#);
    }

    #[test]
    fn picks_quote_that_avoids_escaping() {
        assert_eq!(Tag::from(r#"say "hi""#).to_string(), r#"'say "hi"'"#);
        assert_eq!(Tag::from("it's").to_string(), r#""it's""#);
        assert_eq!(Tag::from("a\tb\u{1}").to_string(), r#""a\tb\x01""#);
    }

    #[test]
    fn formats_arrays_and_suffixes() {
        assert_eq!(Tag::IntArray(vec![1, 2]).to_string(), "[I;1,2]");
        assert_eq!(Tag::Long(5).to_string(), "5L");
        assert_eq!(Tag::Short(-3).to_string(), "-3s");
    }
}
