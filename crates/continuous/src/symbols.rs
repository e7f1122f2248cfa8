use chrono::{Datelike, NaiveDate};

/// CME month-code alphabet, January..December.
pub const MONTH_CODES: [char; 12] = ['F', 'G', 'H', 'J', 'K', 'M', 'N', 'Q', 'U', 'V', 'X', 'Z'];

pub fn month_code(month: u32) -> Option<char> {
    MONTH_CODES.get(month.checked_sub(1)? as usize).copied()
}

pub fn month_from_code(mc: char) -> Option<u32> {
    Some(match mc.to_ascii_uppercase() {
        'F' => 1, 'G' => 2, 'H' => 3, 'J' => 4, 'K' => 5, 'M' => 6,
        'N' => 7, 'Q' => 8, 'U' => 9, 'V' => 10, 'X' => 11, 'Z' => 12,
        _ => return None,
    })
}

/// Components of a parsed native futures symbol (e.g. "SR3H25").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub root: String,
    pub month: u32,
    pub year: i32,
    pub month_code: char,
}

/// Parse a CME-style native symbol: ROOT + MONTH_CODE + YEAR.
///
/// Roots are 1-4 characters; years are 1 or 2 digits. Two-digit years
/// pivot at 50 (00-50 -> 2000s, 51-99 -> 1900s); single-digit years are
/// always 202x.
///
/// Examples: "ESH6" -> ES / Mar / 2026, "SR3H25" -> SR3 / Mar / 2025.
pub fn parse_native_symbol(native: &str) -> Option<ParsedSymbol> {
    if native.len() < 3 || !native.is_ascii() {
        return None;
    }
    for root_len in 1..=4usize.min(native.len() - 2) {
        let (root, rest) = native.split_at(root_len);
        let mut chars = rest.chars();
        let mc = chars.next()?;
        let year_str: &str = chars.as_str();
        if year_str.is_empty() || year_str.len() > 2 || !year_str.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Some(month) = month_from_code(mc) else { continue };
        let yy: i32 = year_str.parse().ok()?;
        let year = if year_str.len() == 1 {
            2020 + yy
        } else if yy <= 50 {
            2000 + yy
        } else {
            1900 + yy
        };
        return Some(ParsedSymbol {
            root: root.to_string(),
            month,
            year,
            month_code: mc.to_ascii_uppercase(),
        });
    }
    None
}

/// IMM date: third Wednesday of the month. Standard expiry anchor for rate
/// and index futures.
pub fn imm_date(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    // weekday offset to the first Wednesday, then two more weeks
    let to_wed = (3 + 7 - first.weekday().number_from_monday()) % 7;
    first.checked_add_days(chrono::Days::new(u64::from(to_wed) + 14))
}

/// Expiry for a parsed symbol, IMM convention.
pub fn imm_expiry(parsed: &ParsedSymbol) -> Option<NaiveDate> {
    imm_date(parsed.year, parsed.month)
}
