const ABN_WEIGHTS: [u32; 11] = [10, 1, 3, 5, 7, 9, 11, 13, 15, 17, 19];

/// Cents to an AUD display string, e.g. `123456` -> `$1,234.56`.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{:02}", abs % 100)
}

pub fn generate_quote_number(year: i32, sequence: i64) -> String {
    format!("QT-{year}-{sequence:04}")
}

/// Australian Business Number checksum. Whitespace is ignored.
pub fn validate_abn(abn: &str) -> bool {
    let digits: Vec<u32> = abn
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();

    if digits.len() != 11 {
        return false;
    }

    // leading digit is reduced by one before weighting
    let sum: i64 = digits
        .iter()
        .zip(ABN_WEIGHTS)
        .enumerate()
        .map(|(i, (&d, w))| {
            let d = if i == 0 { i64::from(d) - 1 } else { i64::from(d) };
            d * i64::from(w)
        })
        .sum();

    sum % 89 == 0
}

/// Normalises an Australian number to E.164 (`0412 345 678` -> `+61412345678`).
pub fn format_australian_phone(phone: &str) -> String {
    let cleaned: String = phone.chars().filter(char::is_ascii_digit).collect();

    if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+61{rest}")
    } else if cleaned.starts_with("61") {
        format!("+{cleaned}")
    } else {
        format!("+61{cleaned}")
    }
}

/// Drops `<...>` tags and `<style>` blocks, collapsing whitespace. Used for plain-text email bodies.
pub fn strip_tags(html: &str) -> String {
    let mut source = html.to_string();
    while let Some(open) = source.find("<style") {
        let close = source[open..]
            .find("</style>")
            .map(|i| open + i + "</style>".len())
            .unwrap_or(source.len());
        source.replace_range(open..close, " ");
    }

    let mut text = String::with_capacity(source.len());
    let mut in_tag = false;
    for ch in source.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
