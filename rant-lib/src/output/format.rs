//! Formatting applied to text as it is printed

use strum_macros::EnumString;

/// How numbers are turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NumberFormat {
    #[default]
    Normal,
    /// `1,234,567.5`
    GroupCommas,
    /// `1.234.567,5`
    GroupDots,
}

/// Capitalization mode of an output chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Capitalization {
    #[default]
    None,
    Upper,
    Lower,
    /// capitalize the next letter, then fall back to None
    First,
    Word,
    Sentence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatOptions {
    pub number_format: NumberFormat,
    pub capitalization: Capitalization,
}

pub fn format_number(n: f64, format: NumberFormat) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    let plain = if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    };
    let (thousands, decimal) = match format {
        NumberFormat::Normal => return plain,
        NumberFormat::GroupCommas => (',', '.'),
        NumberFormat::GroupDots => ('.', ','),
    };
    let (sign, unsigned) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(thousands);
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{sign}{grouped}{decimal}{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Applies a capitalization mode to text as it streams in.
///
/// Word and sentence boundaries are tracked across appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseFormatter {
    pub mode: Capitalization,
    word_start: bool,
    sentence_start: bool,
}

impl Default for CaseFormatter {
    fn default() -> Self {
        Self::new(Capitalization::None)
    }
}

impl CaseFormatter {
    pub fn new(mode: Capitalization) -> Self {
        CaseFormatter {
            mode,
            word_start: true,
            sentence_start: true,
        }
    }

    pub fn set_mode(&mut self, mode: Capitalization) {
        *self = Self::new(mode);
    }

    pub fn apply(&mut self, text: &str) -> String {
        match self.mode {
            Capitalization::None => text.to_owned(),
            Capitalization::Upper => text.to_uppercase(),
            Capitalization::Lower => text.to_lowercase(),
            Capitalization::First => {
                let Some(idx) = text.find(char::is_alphabetic) else {
                    return text.to_owned();
                };
                self.mode = Capitalization::None;
                let mut out = String::with_capacity(text.len());
                out.push_str(&text[..idx]);
                let mut rest = text[idx..].chars();
                if let Some(c) = rest.next() {
                    out.extend(c.to_uppercase());
                }
                out.push_str(rest.as_str());
                out
            }
            Capitalization::Word => text
                .chars()
                .flat_map(|c| {
                    let upper = self.word_start && c.is_alphabetic();
                    self.word_start = c.is_whitespace();
                    Self::cased(c, upper)
                })
                .collect(),
            Capitalization::Sentence => text
                .chars()
                .flat_map(|c| {
                    let upper = self.sentence_start && c.is_alphabetic();
                    if matches!(c, '.' | '!' | '?') {
                        self.sentence_start = true;
                    } else if c.is_alphanumeric() {
                        self.sentence_start = false;
                    }
                    Self::cased(c, upper)
                })
                .collect(),
        }
    }

    fn cased(c: char, upper: bool) -> Vec<char> {
        if upper {
            c.to_uppercase().collect()
        } else {
            vec![c]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(3.0, NumberFormat::Normal, "3")]
    #[case(-12.5, NumberFormat::Normal, "-12.5")]
    #[case(1234567.0, NumberFormat::GroupCommas, "1,234,567")]
    #[case(-1234.25, NumberFormat::GroupCommas, "-1,234.25")]
    #[case(1234567.5, NumberFormat::GroupDots, "1.234.567,5")]
    #[case(123.0, NumberFormat::GroupDots, "123")]
    fn numbers(#[case] n: f64, #[case] format: NumberFormat, #[case] expected: &str) {
        assert_eq!(format_number(n, format), expected);
    }

    #[rstest]
    #[case(Capitalization::Upper, &["hello ", "world"], "HELLO WORLD")]
    #[case(Capitalization::Lower, &["HeLLo"], "hello")]
    #[case(Capitalization::First, &[" ", "hello ", "world"], " Hello world")]
    #[case(Capitalization::Word, &["the qu", "ick fox"], "The Quick Fox")]
    #[case(Capitalization::Sentence, &["one. two", "! three"], "One. Two! Three")]
    fn capitalization(
        #[case] mode: Capitalization,
        #[case] parts: &[&str],
        #[case] expected: &str,
    ) {
        let mut formatter = CaseFormatter::new(mode);
        let out: String = parts.iter().map(|p| formatter.apply(p)).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn modes_parse_from_names() {
        assert_eq!(Capitalization::from_str("sentence"), Ok(Capitalization::Sentence));
        assert_eq!(NumberFormat::from_str("group-commas"), Ok(NumberFormat::GroupCommas));
        assert!(Capitalization::from_str("shouty").is_err());
    }
}
