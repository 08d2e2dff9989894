//! Compiles user-authored statement format templates into a line parser.
//!
//! Template tokens: literal text, `{FieldName}`, `{Any}`, `{Optional:text}`,
//! `{Tab}` and `{Newline}`. Compilation lowers the whole template to one
//! multiline regex anchored at start-of-line, with a named group per field.

use crate::models::{ParsedRow, StatementLine};
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::warn;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d/%m/%y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d.%m.%Y",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field(String),
    Any,
    Optional(String),
    Tab,
    Newline,
}

impl Token {
    fn is_placeholder(&self) -> bool {
        matches!(self, Token::Field(_) | Token::Any)
    }
}

fn tokenize(template: &str) -> Result<Vec<Token>, AppError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        let mut body = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            body.push(c);
        }
        if !closed {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unterminated '{{' in statement format"
            )));
        }
        let token = match body.as_str() {
            "Tab" => Token::Tab,
            "Newline" => Token::Newline,
            "Any" => Token::Any,
            _ if body.starts_with("Optional:") => {
                Token::Optional(body["Optional:".len()..].to_string())
            }
            _ => {
                if body.is_empty()
                    || !body.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                    || !body.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Invalid field name '{{{}}}' in statement format",
                        body
                    )));
                }
                Token::Field(body)
            }
        };
        tokens.push(token);
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    if tokens.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Statement format is empty"
        )));
    }
    Ok(tokens)
}

/// A compiled statement format, ready to run over pasted statement text.
#[derive(Debug, Clone)]
pub struct CompiledFormat {
    regex: Regex,
}

impl CompiledFormat {
    pub fn compile(template: &str) -> Result<Self, AppError> {
        let tokens = tokenize(template)?;

        let mut seen_fields: Vec<&str> = Vec::new();
        let mut pattern = String::from("(?m)^");
        for (i, token) in tokens.iter().enumerate() {
            // A placeholder followed by another placeholder has no
            // terminator of its own, so it matches lazily and lets the
            // next token's terminator decide where it ends.
            let next_is_placeholder = tokens.get(i + 1).is_some_and(Token::is_placeholder);
            let capture_body = if next_is_placeholder {
                ".+?"
            } else {
                "[^\\t\\r\\n]*?"
            };
            match token {
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
                Token::Tab => pattern.push_str("\\t"),
                Token::Newline => pattern.push_str("\\r?\\n"),
                Token::Optional(text) => {
                    pattern.push_str("(?:");
                    pattern.push_str(&regex::escape(text));
                    pattern.push_str(")?");
                }
                Token::Any => {
                    pattern.push_str("(?:");
                    pattern.push_str(capture_body);
                    pattern.push(')');
                }
                Token::Field(name) => {
                    if seen_fields.contains(&name.as_str()) {
                        return Err(AppError::BadRequest(anyhow::anyhow!(
                            "Field '{{{}}}' appears more than once in statement format",
                            name
                        )));
                    }
                    seen_fields.push(name);
                    pattern.push_str("(?P<");
                    pattern.push_str(name);
                    pattern.push('>');
                    pattern.push_str(capture_body);
                    pattern.push(')');
                }
            }
        }
        // Each match must consume its final line fully, or trailing text
        // would silently vanish.
        pattern.push_str("[^\\S\\r\\n]*$");

        let regex = Regex::new(&pattern).map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Statement format does not compile: {}", e))
        })?;
        Ok(Self { regex })
    }

    /// Run the format over pasted statement text. Lines the format does
    /// not recognise become warning rows rather than failing the import.
    pub fn parse(&self, text: &str) -> Vec<ParsedRow> {
        let mut matches: Vec<(std::ops::Range<usize>, ParsedRow)> = Vec::new();
        for caps in self.regex.captures_iter(text) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
            matches.push((whole, row_from_captures(&caps)));
        }

        let mut rows = Vec::new();
        let mut offset = 0usize;
        let mut next_match = 0usize;
        for raw_line in text.split_inclusive('\n') {
            let start = offset;
            offset += raw_line.len();

            if next_match < matches.len() && matches[next_match].0.start <= start {
                if matches[next_match].0.start == start {
                    rows.push(matches[next_match].1.clone());
                }
                // Lines inside a multi-line match produce nothing further.
                if matches[next_match].0.end <= offset {
                    next_match += 1;
                }
                continue;
            }

            let line = raw_line.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                warn!(line = %line, "Statement line did not match the format");
                rows.push(ParsedRow::Warning {
                    text: format!("Unrecognised line: {}", line),
                });
            }
        }
        rows
    }
}

fn row_from_captures(caps: &regex::Captures<'_>) -> ParsedRow {
    let field = |name: &str| -> Option<String> {
        caps.name(name)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut line = StatementLine {
        date: None,
        amount: None,
        name: field("Payee").or_else(|| field("Name")).unwrap_or_default(),
        memo: field("Memo").unwrap_or_default(),
    };

    if let Some(text) = field("Date") {
        match parse_date(&text) {
            Some(date) => line.date = Some(date),
            None => {
                return ParsedRow::Warning {
                    text: format!("Unrecognised date '{}'", text),
                }
            }
        }
    }

    // Payment and Deposit are mutually exclusive absolute-value columns;
    // Amount carries its own sign.
    let amount_text = field("Amount");
    let payment_text = field("Payment");
    let deposit_text = field("Deposit");
    let parsed = if let Some(text) = amount_text {
        parse_amount(&text).map(Some).ok_or(text)
    } else if let Some(text) = payment_text {
        parse_amount(&text).map(|a| Some(-a.abs())).ok_or(text)
    } else if let Some(text) = deposit_text {
        parse_amount(&text).map(|a| Some(a.abs())).ok_or(text)
    } else {
        Ok(None)
    };
    match parsed {
        Ok(amount) => line.amount = amount,
        Err(text) => {
            return ParsedRow::Warning {
                text: format!("Unrecognised amount '{}'", text),
            }
        }
    }

    ParsedRow::Line(line)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Free-text amount normalisation. A trailing "CR" or a leading "-"
/// flips the sign; thousands separators and currency symbols are noise.
fn parse_amount(text: &str) -> Option<Decimal> {
    let mut text = text.trim();
    let mut negate = false;

    let upper = text.to_ascii_uppercase();
    if let Some(stripped) = upper.strip_suffix("CR") {
        negate = !negate;
        text = &text[..stripped.len()];
    }
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '£' && *c != '$' && *c != '€')
        .collect();
    let cleaned = cleaned.as_str();
    let cleaned = match cleaned.strip_prefix('-') {
        Some(rest) => {
            negate = !negate;
            rest
        }
        None => cleaned,
    };

    let amount: Decimal = cleaned.parse().ok()?;
    Some(if negate { -amount } else { amount })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn lines(rows: &[ParsedRow]) -> Vec<&StatementLine> {
        rows.iter().filter_map(|r| r.as_line()).collect()
    }

    #[test]
    fn tab_separated_template_parses_one_record() {
        let format = CompiledFormat::compile("{Date}{Tab}{Amount}{Tab}{Payee}").unwrap();
        let rows = format.parse("2024-01-05\t-12.50\tACME\n");
        assert_eq!(rows.len(), 1);
        let line = rows[0].as_line().unwrap();
        assert_eq!(line.date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(line.amount, Some(dec("-12.50")));
        assert_eq!(line.name, "ACME");
    }

    #[test]
    fn unmatched_lines_become_warnings() {
        let format = CompiledFormat::compile("{Date}{Tab}{Amount}{Tab}{Payee}").unwrap();
        let rows = format.parse("garbage header\n2024-01-05\t-12.50\tACME\n");
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0], ParsedRow::Warning { .. }));
        assert!(rows[1].as_line().is_some());
    }

    #[test]
    fn trailing_cr_flips_the_sign() {
        assert_eq!(parse_amount("12.50CR"), Some(dec("-12.50")));
        assert_eq!(parse_amount("12.50 cr"), Some(dec("-12.50")));
        assert_eq!(parse_amount("-12.50CR"), Some(dec("12.50")));
        assert_eq!(parse_amount("1,234.00"), Some(dec("1234.00")));
    }

    #[test]
    fn payment_and_deposit_force_the_sign() {
        let format =
            CompiledFormat::compile("{Date},{Payee},{Payment},{Deposit}").unwrap();
        let rows = format.parse("05/01/2024,SHOP,12.50,\n05/01/2024,WAGES,,900.00\n");
        let lines = lines(&rows);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].amount, Some(dec("-12.50")));
        assert_eq!(lines[1].amount, Some(dec("900.00")));
    }

    #[test]
    fn optional_literal_may_be_absent() {
        let format = CompiledFormat::compile("{Optional:DR }{Amount} {Payee}").unwrap();
        let rows = format.parse("DR 5.00 ACME\n6.00 OTHER\n");
        let lines = lines(&rows);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].amount, Some(dec("5.00")));
        assert_eq!(lines[1].amount, Some(dec("6.00")));
    }

    #[test]
    fn adjacent_placeholders_split_on_the_following_literal() {
        let format = CompiledFormat::compile("{Any}{Payee} ref {Memo}").unwrap();
        let rows = format.parse("xACME ref 123\n");
        let line = rows[0].as_line().unwrap();
        assert_eq!(line.memo, "123");
        assert!(line.name.ends_with("ACME"));
    }

    #[test]
    fn bad_templates_are_rejected() {
        assert!(CompiledFormat::compile("{Date").is_err());
        assert!(CompiledFormat::compile("{Date}{Date}").is_err());
        assert!(CompiledFormat::compile("{9Bad}").is_err());
    }

    #[test]
    fn us_dates_parse_and_day_first_wins_ambiguous_cases() {
        let format = CompiledFormat::compile("{Date}{Tab}{Amount}").unwrap();

        // Only valid month-first, so the US format applies.
        let rows = format.parse("01/13/2026\t-5.00\n");
        let line = rows[0].as_line().unwrap();
        assert_eq!(line.date, NaiveDate::from_ymd_opt(2026, 1, 13));

        // Ambiguous dates stay day-first.
        let rows = format.parse("03/04/2026\t-5.00\n");
        let line = rows[0].as_line().unwrap();
        assert_eq!(line.date, NaiveDate::from_ymd_opt(2026, 4, 3));
    }

    #[test]
    fn unrecognised_date_is_a_warning_row() {
        let format = CompiledFormat::compile("{Date}{Tab}{Amount}").unwrap();
        let rows = format.parse("bogus-date\t5.00\n");
        assert!(matches!(rows[0], ParsedRow::Warning { .. }));
    }
}
