use rust_decimal::{Decimal, RoundingStrategy};

/// Renders an amount as `$1,234.56`.
pub fn format_currency(amount: Decimal) -> String {
    format!("${}", format_grouped(amount))
}

/// Two decimal places with comma thousands separators.
pub fn format_grouped(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    let rendered = format!("{:.2}", rounded.abs());
    let (whole, fraction) = rendered.split_once('.').unwrap_or((rendered.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}

/// Two decimal places, no grouping.
pub fn format_plain(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    format!("{rounded:.2}")
}

pub fn to_f64(amount: Decimal) -> f64 {
    amount.try_into().unwrap_or(0.0)
}
