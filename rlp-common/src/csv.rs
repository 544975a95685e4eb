//! CSV export
//!
//! RFC 4180 output: CRLF record separators, fields quoted only when they
//! contain a comma, double quote, CR or LF, embedded quotes doubled.

/// Escape a single field
pub fn escape_field(value: &str) -> String {
    if value.contains(&[',', '"', '\r', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Row-at-a-time CSV builder
#[derive(Debug, Default)]
pub struct CsvWriter {
    out: String,
    columns: usize,
}

impl CsvWriter {
    /// Start a document with a header row
    pub fn with_headers(headers: &[&str]) -> Self {
        let mut writer = Self {
            out: String::new(),
            columns: headers.len(),
        };
        writer.push_line(headers.iter().copied());
        writer
    }

    /// Append a record; must have as many fields as there are headers
    pub fn write_record<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<S> = fields.into_iter().collect();
        debug_assert_eq!(fields.len(), self.columns, "CSV record width mismatch");
        self.push_line(fields.iter().map(|f| f.as_ref()));
    }

    fn push_line<'a>(&mut self, fields: impl Iterator<Item = &'a str>) {
        let line: Vec<String> = fields.map(escape_field).collect();
        self.out.push_str(&line.join(","));
        self.out.push_str("\r\n");
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Format cents as a plain decimal amount ("1234.50")
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal RFC 4180 reader, enough to prove exported values survive.
    fn parse(input: &str) -> Vec<Vec<String>> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if in_quotes {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        field.push('"');
                        chars.next();
                    }
                    '"' => in_quotes = false,
                    _ => field.push(c),
                }
            } else {
                match c {
                    '"' => in_quotes = true,
                    ',' => record.push(std::mem::take(&mut field)),
                    '\r' if chars.peek() == Some(&'\n') => {
                        chars.next();
                        record.push(std::mem::take(&mut field));
                        records.push(std::mem::take(&mut record));
                    }
                    _ => field.push(c),
                }
            }
        }
        records
    }

    #[test]
    fn test_plain_field_untouched() {
        assert_eq!(escape_field("Gold"), "Gold");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn test_special_characters_quoted() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_values_survive_export() {
        let values = [
            "plain",
            "comma, inside",
            "\"quoted\" word",
            "multi\r\nline",
            "",
            "trailing,",
        ];
        let mut writer = CsvWriter::with_headers(&["value", "index"]);
        for (i, v) in values.iter().enumerate() {
            writer.write_record([v.to_string(), i.to_string()]);
        }
        let records = parse(&writer.finish());

        assert_eq!(records[0], vec!["value", "index"]);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(records[i + 1], vec![v.to_string(), i.to_string()]);
        }
    }

    #[test]
    fn test_crlf_terminated() {
        let mut writer = CsvWriter::with_headers(&["a"]);
        writer.write_record(["1"]);
        assert_eq!(writer.finish(), "a\r\n1\r\n");
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(123_450), "1234.50");
        assert_eq!(format_cents(-250), "-2.50");
    }
}
