// src/services/parser.rs
//
// Pasted spreadsheet rows -> draft leads. Pure and deterministic.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::DraftLead;

/// Every parsed row gets this process; it is not read from the line.
pub const DEFAULT_PROCESS_TYPE: &str = "Legal Service";
pub const UNKNOWN_NAME: &str = "Unknown";
pub const DEFAULT_LOCATION: &str = "Other";

// Tabs, commas, or two-or-more spaces separate columns.
static COLUMN_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\t|,| {2,}").expect("column separator pattern is valid"));

fn tokenize(line: &str) -> Vec<&str> {
    COLUMN_SEPARATOR
        .split(line)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_phone(token: &str) -> bool {
    token.len() == 10 && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_serial_number(token: &str) -> bool {
    (1..=4).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_digit())
}

fn parse_line(index: usize, line: &str) -> DraftLead {
    let tokens = tokenize(line);

    let Some(k) = tokens.iter().position(|t| is_phone(t)) else {
        return DraftLead {
            index,
            customer_name: tokens.first().copied().unwrap_or(UNKNOWN_NAME).to_string(),
            customer_mobile: String::new(),
            location: DEFAULT_LOCATION.to_string(),
            process_type: DEFAULT_PROCESS_TYPE.to_string(),
            valid: false,
        };
    };

    let name_tokens = &tokens[..k];
    let name = match name_tokens.split_first() {
        Some((first, rest)) if is_serial_number(first) => rest.join(" "),
        _ => name_tokens.join(" "),
    };
    let customer_name = if name.is_empty() {
        name_tokens.first().copied().unwrap_or(UNKNOWN_NAME).to_string()
    } else {
        name
    };

    DraftLead {
        index,
        customer_name,
        customer_mobile: tokens[k].to_string(),
        location: tokens.get(k + 1).copied().unwrap_or(DEFAULT_LOCATION).to_string(),
        process_type: DEFAULT_PROCESS_TYPE.to_string(),
        valid: true,
    }
}

/// One draft per non-blank line, in input order.
pub fn parse_leads_from_text(text: &str) -> Vec<DraftLead> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| parse_line(index, line))
        .collect()
}
