use std::fmt;
use std::io;

const INDENT_SIZE: usize = 2;

/// Wraps an [io::Write] for use as a [fmt::Write].
pub struct ToWriteFmt<T: io::Write>(pub T);

// Wraps a [fmt::Write] to prepend [str] to each line.
pub struct LinePrefixWrite<'a, W: fmt::Write>(W, &'a str, bool);

impl<T: io::Write> fmt::Write for ToWriteFmt<T> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl<'a, W: fmt::Write> LinePrefixWrite<'a, W> {
    pub fn new(inner: W, line_prefix: &'a str) -> Self {
        LinePrefixWrite(inner, line_prefix, true)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: fmt::Write> fmt::Write for LinePrefixWrite<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.2 && !s.is_empty() {
            self.0.write_str(self.1)?;
        }

        let mut split_iter = s.split_inclusive('\n').peekable();
        while let Some(substring) = split_iter.next() {
            self.0.write_str(substring)?;
            if split_iter.peek().is_some() {
                self.0.write_str(self.1)?;
            }
        }
        self.2 = s.ends_with('\n');
        Ok(())
    }
}

/// Generate a lowercase ASCII name from an index.
///
/// # Examples
/// ```
/// # use xtensa_codegen::utils::ascii_name;
/// assert_eq!(ascii_name(0), "a");
/// assert_eq!(ascii_name(25), "z");
/// assert_eq!(ascii_name(26), "aa");
/// assert_eq!(ascii_name(27), "ab");
/// ```
pub fn ascii_name(idx: usize) -> String {
    let mut n = idx.saturating_add(1);
    let mut characters: Vec<u8> = Vec::with_capacity(3);
    while n > 0 {
        let q = (n - 1) / 26;
        let r = ((n - 1) % 26) as u8;
        characters.push(b'a' + r);
        n = q;
    }
    characters.reverse();
    characters.into_iter().map(char::from).collect()
}

/// Returns `b` if `n == 2^b` for some `b > 0`.
pub const fn exact_log2(n: i64) -> Option<u32> {
    if n > 1 && n & (n - 1) == 0 {
        Some(n.trailing_zeros())
    } else {
        None
    }
}

/// Turns an IR name into a valid C identifier.
pub fn c_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    if name
        .chars()
        .next()
        .map_or(true, |c| c.is_ascii_digit() || c == '_')
    {
        out.push('v');
    }
    out.extend(name.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        }
    }));
    out
}

/// Quotes and escapes a string as a C string literal.
pub fn c_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("\\{:03o}", b));
                }
            }
        }
    }
    out.push('"');
    out
}

pub fn indent(depth: usize) -> String {
    " ".repeat(depth * INDENT_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_lineprefixwrite_prefixes_each_line() {
        let mut write = LinePrefixWrite::new(String::new(), "// ");
        writeln!(write, "for x:").unwrap();
        writeln!(write, "  f[x] = 1").unwrap();
        assert_eq!(write.into_inner(), "// for x:\n//   f[x] = 1\n");
    }

    #[test]
    fn test_lineprefixwrite_supports_incremental_line_writing() {
        let mut write = LinePrefixWrite::new(String::new(), "--");
        write!(write, "a").unwrap();
        write!(write, "b").unwrap();
        assert_eq!(write.into_inner(), "--ab");
    }

    #[test]
    fn test_lineprefixwrite_noop_with_empty_string() {
        let mut write = LinePrefixWrite::new(String::new(), "--");
        write!(write, "").unwrap();
        assert_eq!(write.into_inner(), "");
    }

    #[test]
    fn test_exact_log2() {
        assert_eq!(exact_log2(8), Some(3));
        assert_eq!(exact_log2(2), Some(1));
        assert_eq!(exact_log2(1), None);
        assert_eq!(exact_log2(0), None);
        assert_eq!(exact_log2(-8), None);
        assert_eq!(exact_log2(12), None);
    }

    #[test]
    fn test_c_name() {
        assert_eq!(c_name("input"), "input");
        assert_eq!(c_name("f.s0.x"), "f_s0_x");
        assert_eq!(c_name("0buf"), "v0buf");
        assert_eq!(c_name("_t"), "v_t");
        assert_eq!(c_name("a$b"), "a_b");
    }

    #[test]
    fn test_c_string_literal() {
        assert_eq!(c_string_literal("out of \"memory\"\n"), "\"out of \\\"memory\\\"\\n\"");
    }
}
