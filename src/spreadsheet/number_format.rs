//! Number formats: built-in format table, date pattern detection, serial dates and display masks.

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use chrono::Timelike;
use std::collections::HashMap;

/// Workbook date system.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DateEpoch {
    /// Day 1 is 1900-01-01, including the fictitious 1900-02-29
    #[default]
    Excel1900,
    /// Day 0 is 1904-01-01
    Excel1904,
}

impl DateEpoch {
    pub fn from_1904_flag(is_1904: bool) -> Self {
        if is_1904 { Self::Excel1904 } else { Self::Excel1900 }
    }

    /// Date-time for a serial day number, `None` when out of range.
    /// The time of day is rounded to the millisecond.
    pub fn to_datetime(self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 {
            return None;
        }
        let days = serial.trunc() as i64;
        let offset = match self {
            // Lotus 1-2-3 leap year bug
            Self::Excel1900 if days < 60 => 1,
            Self::Excel1900 => 0,
            Self::Excel1904 => 1462,
        };
        let milliseconds = (serial.fract() * 86_400_000f64).round() as i64;
        NaiveDate::from_ymd_opt(1899, 12, 30)?
            .and_hms_opt(0, 0, 0)?
            .checked_add_signed(TimeDelta::try_days(days + offset)?)?
            .checked_add_signed(TimeDelta::try_milliseconds(milliseconds)?)
    }
}

/// Number format attached to a cell style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberFormat {
    pub id: u16,
    pub code: String,
    pub is_date: bool,
}

impl NumberFormat {
    fn general() -> Self {
        NumberFormat { id: 0, code: "General".to_owned(), is_date: false }
    }
}

/// Number formats indexed by cell style (XF) position.
#[derive(Clone, Debug, Default)]
pub(crate) struct NumberFormats {
    formats: Vec<NumberFormat>,
}

impl NumberFormats {
    /// Resolves each style's format id against the workbook's custom formats, then the built-in table.
    pub(crate) fn new(format_ids: Vec<u16>, custom_formats: &HashMap<u16, String>) -> Self {
        let formats = format_ids
            .into_iter()
            .map(|id| match custom_formats.get(&id) {
                Some(code) => NumberFormat { id, code: code.to_owned(), is_date: is_date_format(code) },
                None => NumberFormat {
                    id,
                    code: builtin_format_code(id).unwrap_or("General").to_owned(),
                    is_date: is_builtin_date_format(id),
                },
            })
            .collect();
        NumberFormats { formats }
    }

    pub(crate) fn get(&self, style: usize) -> Option<&NumberFormat> {
        self.formats.get(style)
    }

    /// Format of a style, General when the style is unknown.
    pub(crate) fn get_or_general(&self, style: usize) -> NumberFormat {
        self.get(style).cloned().unwrap_or_else(NumberFormat::general)
    }

    pub(crate) fn len(&self) -> usize {
        self.formats.len()
    }
}

/// Format code of a built-in number format id.
pub fn builtin_format_code(id: u16) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        5 => "\"$\"#,##0_);(\"$\"#,##0)",
        6 => "\"$\"#,##0_);[Red](\"$\"#,##0)",
        7 => "\"$\"#,##0.00_);(\"$\"#,##0.00)",
        8 => "\"$\"#,##0.00_);[Red](\"$\"#,##0.00)",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "m/d/yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0_);(#,##0)",
        38 => "#,##0_);[Red](#,##0)",
        39 => "#,##0.00_);(#,##0.00)",
        40 => "#,##0.00_);[Red](#,##0.00)",
        41 => "_(* #,##0_);_(* (#,##0);_(* \"-\"_);_(@_)",
        42 => "_(\"$\"* #,##0_);_(\"$\"* (#,##0);_(\"$\"* \"-\"_);_(@_)",
        43 => "_(* #,##0.00_);_(* (#,##0.00);_(* \"-\"??_);_(@_)",
        44 => "_(\"$\"* #,##0.00_);_(\"$\"* (#,##0.00);_(\"$\"* \"-\"??_);_(@_)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mm:ss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

/// Built-in ids that denote dates or times.
pub fn is_builtin_date_format(id: u16) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// Whether a custom format code renders a date or time.
/// Quoted literals, escaped characters and bracketed sections are ignored.
pub fn is_date_format(format: &str) -> bool {
    let mut is_escaped = false;
    let mut is_literal = false;
    let mut is_bracket = false;
    for character in format.chars() {
        match character {
            _ if is_escaped => is_escaped = false,
            '_' | '\\' | '*' if !is_literal => is_escaped = true,

            '"' if is_literal => is_literal = false,
            '"' if !is_bracket => is_literal = true,

            ']' if is_bracket => is_bracket = false,
            '[' if !is_literal => is_bracket = true,
            _ if is_literal || is_bracket => (),

            ';' => break,
            'Y' | 'y' | 'D' | 'd' | 'H' | 'h' | 'S' | 's' => return true,
            _ => (),
        }
    }
    false
}

/// Shortest decimal text of a number, integral values without a fraction.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_owned()
    } else {
        value.to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Year(usize),
    Month(usize),
    MonthOrMinute(usize),
    Minute(usize),
    Day(usize),
    Hour(usize),
    Second(usize),
    SubSecond(usize),
    AmPm { short: bool, lowercase: bool },
}

impl Token {
    fn is_time_part(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }
}

fn starts_with_ignore_case(characters: &[char], prefix: &str) -> bool {
    let length = prefix.chars().count();
    characters.len() >= length && characters.iter().zip(prefix.chars()).all(|(c, p)| c.eq_ignore_ascii_case(&p))
}

/// Splits the first section of a format code into date and time tokens.
fn tokenize(mask: &str) -> Vec<Token> {
    let characters: Vec<char> = mask.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;
    let run = |index: usize, target: char| {
        characters[index..]
            .iter()
            .take_while(|character| character.eq_ignore_ascii_case(&target))
            .count()
    };
    while index < characters.len() {
        let character = characters[index];
        match character {
            ';' => break,
            '"' => {
                let literal: String = characters[index + 1..].iter().take_while(|c| **c != '"').collect();
                index += literal.chars().count() + 2;
                tokens.push(Token::Literal(literal));
                continue;
            }
            '\\' => {
                if let Some(next) = characters.get(index + 1) {
                    tokens.push(Token::Literal(next.to_string()));
                }
                index += 2;
                continue;
            }
            '_' => {
                tokens.push(Token::Literal(" ".to_owned()));
                index += 2;
                continue;
            }
            '*' => {
                index += 2;
                continue;
            }
            '[' => {
                let content: String = characters[index + 1..].iter().take_while(|c| **c != ']').collect();
                index += content.chars().count() + 2;
                let length = content.chars().count();
                match content.chars().next().map(|c| c.to_ascii_lowercase()) {
                    Some('h') => tokens.push(Token::Hour(length)),
                    Some('m') => tokens.push(Token::Minute(length)),
                    Some('s') => tokens.push(Token::Second(length)),
                    _ => (), // colors, conditions and locales
                }
                continue;
            }
            'y' | 'Y' | 'e' => {
                let length = run(index, character);
                tokens.push(Token::Year(length));
                index += length;
                continue;
            }
            'm' | 'M' => {
                let length = run(index, 'm');
                tokens.push(Token::MonthOrMinute(length));
                index += length;
                continue;
            }
            'd' | 'D' => {
                let length = run(index, 'd');
                tokens.push(Token::Day(length));
                index += length;
                continue;
            }
            'h' | 'H' => {
                let length = run(index, 'h');
                tokens.push(Token::Hour(length));
                index += length;
                continue;
            }
            's' | 'S' => {
                let length = run(index, 's');
                tokens.push(Token::Second(length));
                index += length;
                continue;
            }
            'a' | 'A' => {
                if starts_with_ignore_case(&characters[index..], "am/pm") {
                    tokens.push(Token::AmPm { short: false, lowercase: character == 'a' });
                    index += 5;
                    continue;
                }
                if starts_with_ignore_case(&characters[index..], "a/p") {
                    tokens.push(Token::AmPm { short: true, lowercase: character == 'a' });
                    index += 3;
                    continue;
                }
            }
            '.' if matches!(tokens.last(), Some(Token::Second(_))) && characters.get(index + 1) == Some(&'0') => {
                let length = run(index + 1, '0');
                tokens.push(Token::Literal(".".to_owned()));
                tokens.push(Token::SubSecond(length));
                index += length + 1;
                continue;
            }
            _ => (),
        }
        tokens.push(Token::Literal(character.to_string()));
        index += 1;
    }
    resolve_minutes(tokens)
}

/// `m` means minutes right after an hour or right before a second, months otherwise.
fn resolve_minutes(mut tokens: Vec<Token>) -> Vec<Token> {
    for index in 0..tokens.len() {
        if let Token::MonthOrMinute(length) = tokens[index] {
            let previous = tokens[..index].iter().rev().find(|token| token.is_time_part());
            let next = tokens[index + 1..].iter().find(|token| token.is_time_part());
            let is_minute = matches!(previous, Some(Token::Hour(_))) || matches!(next, Some(Token::Second(_)));
            tokens[index] = if is_minute { Token::Minute(length) } else { Token::Month(length) };
        }
    }
    tokens
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

fn pad(value: u32, length: usize) -> String {
    if length >= 2 { format!("{value:02}") } else { value.to_string() }
}

/// Renders a date-time through an Excel display mask such as `yyyy-mm-dd hh:mm:ss`.
pub fn format_datetime(value: &NaiveDateTime, mask: &str) -> String {
    let tokens = tokenize(mask);
    let has_sub_second = tokens.iter().any(|token| matches!(token, Token::SubSecond(_)));
    let is_twelve_hour = tokens.iter().any(|token| matches!(token, Token::AmPm { .. }));
    let value = if has_sub_second {
        *value
    } else {
        // whole seconds are rounded, not truncated
        let rounded = *value + TimeDelta::milliseconds(500);
        rounded.with_nanosecond(0).unwrap_or(rounded)
    };

    let mut text = String::new();
    for token in &tokens {
        match token {
            Token::Literal(literal) => text.push_str(literal),
            Token::Year(length) if *length <= 2 => text.push_str(&format!("{:02}", value.year().rem_euclid(100))),
            Token::Year(_) => text.push_str(&format!("{:04}", value.year())),
            Token::Month(length) => {
                let name = MONTHS[value.month0() as usize];
                match length {
                    1 | 2 => text.push_str(&pad(value.month(), *length)),
                    3 => text.push_str(&name[..3]),
                    4 => text.push_str(name),
                    _ => text.push_str(&name[..1]),
                }
            }
            Token::Day(length) => {
                let name = WEEKDAYS[value.weekday().num_days_from_monday() as usize];
                match length {
                    1 | 2 => text.push_str(&pad(value.day(), *length)),
                    3 => text.push_str(&name[..3]),
                    _ => text.push_str(name),
                }
            }
            Token::Hour(length) => {
                let hour = if is_twelve_hour {
                    match value.hour() % 12 {
                        0 => 12,
                        hour => hour,
                    }
                } else {
                    value.hour()
                };
                text.push_str(&pad(hour, *length));
            }
            Token::Minute(length) | Token::MonthOrMinute(length) => text.push_str(&pad(value.minute(), *length)),
            Token::Second(length) => text.push_str(&pad(value.second(), *length)),
            Token::SubSecond(length) => {
                let milliseconds = format!("{:03}", value.nanosecond() / 1_000_000);
                let digits: String = milliseconds.chars().chain(std::iter::repeat('0')).take(*length).collect();
                text.push_str(&digits);
            }
            Token::AmPm { short, lowercase } => {
                let marker = match (value.hour() < 12, short) {
                    (true, false) => "AM",
                    (false, false) => "PM",
                    (true, true) => "A",
                    (false, true) => "P",
                };
                if *lowercase {
                    text.push_str(&marker.to_ascii_lowercase());
                } else {
                    text.push_str(marker);
                }
            }
        }
    }
    text
}
