/// Conversion of station labels ("50N", "12S") to signed station numbers
use crate::error::{PemError, Result};

/// Convert a station label to a signed integer
///
/// A single trailing direction letter is extracted first. South and west stations are negative,
/// north, east and unsuffixed stations keep their sign. All other non-digit, non-sign characters
/// are stripped before parsing.
///
/// # Arguments
/// - `label`: The station label, e.g. "50N", "12s", "-100" or "L200E"
///
/// # Examples
/// ```
/// assert_eq!(convert("15S").unwrap(), -15);
/// assert_eq!(convert("15N").unwrap(), 15);
/// ```
///
/// # Returns
/// The signed station number, or a parse error if the label holds no digits.
pub fn convert(label: &str) -> Result<i64> {
    let trimmed = label.trim();

    let (body, negate) = match trimmed.chars().last() {
        Some(c) if matches!(c.to_ascii_uppercase(), 'S' | 'W') => (&trimmed[..trimmed.len() - 1], true),
        Some(c) if matches!(c.to_ascii_uppercase(), 'N' | 'E') => (&trimmed[..trimmed.len() - 1], false),
        _ => (trimmed, false),
    };

    let numeric: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() | (*c == '-') | (*c == '+'))
        .collect();

    if !numeric.chars().any(|c| c.is_ascii_digit()) {
        return Err(PemError::Parse(format!("No digits in station label: {label:?}")));
    }

    let value: i64 = numeric
        .parse()
        .map_err(|e| PemError::Parse(format!("Invalid station label {label:?}: {e}")))?;

    match negate {
        true => value
            .checked_abs()
            .map(|v| -v)
            .ok_or_else(|| PemError::Parse(format!("Station label out of range: {label:?}"))),
        false => Ok(value),
    }
}

/// Find the byte range of the last run of ASCII digits in a label
fn last_digit_run(label: &str) -> Option<(usize, usize)> {
    let bytes = label.as_bytes();
    let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    Some((start, end))
}

/// Check whether a station is a repeat of a neighbouring 0- or 5-ending station
///
/// Repeat stations are recorded with a number ending in 1, 4, 6 or 9.
pub fn is_repeat(label: &str) -> bool {
    repeat_replacement(label).is_some()
}

/// Rename a repeat station to the station it repeats
///
/// The last digit is moved to the nearest multiple of 5: 1 → 0, 4 → 5, 6 → 5 and 9 → 10.
/// Any prefix and direction suffix of the label are kept.
///
/// # Examples
/// ```
/// assert_eq!(repeat_replacement("101N"), Some("100N".to_string()));
/// assert_eq!(repeat_replacement("99W"), Some("100W".to_string()));
/// assert_eq!(repeat_replacement("100N"), None);
/// ```
pub fn repeat_replacement(label: &str) -> Option<String> {
    let (start, end) = last_digit_run(label)?;
    let number: u64 = label[start..end].parse().ok()?;

    let renamed = match number % 10 {
        1 | 6 => number - 1,
        4 | 9 => number + 1,
        _ => return None,
    };

    Some(format!("{}{}{}", &label[..start], renamed, &label[end..]))
}

/// Move a station by an offset, relabelling it in the style of the original label
///
/// Suffixed labels keep their axis (N/S or E/W) with the letter following the new sign.
/// Any prefix text is dropped.
///
/// # Returns
/// The new label and station number.
pub fn shift(label: &str, offset: i64) -> Result<(String, i64)> {
    let number = convert(label)?
        .checked_add(offset)
        .ok_or_else(|| PemError::Parse(format!("Station {label:?} shifted by {offset} is out of range")))?;
    let suffix = label.trim().chars().last().map(|c| c.to_ascii_uppercase());

    let label = match suffix {
        Some('N') | Some('S') => format!("{}{}", number.unsigned_abs(), if number < 0 { 'S' } else { 'N' }),
        Some('E') | Some('W') => format!("{}{}", number.unsigned_abs(), if number < 0 { 'W' } else { 'E' }),
        _ => number.to_string(),
    };
    Ok((label, number))
}

#[cfg(test)]
mod tests {

    #[test]
    fn test_convert() {
        assert_eq!(super::convert("15S").unwrap(), -15);
        assert_eq!(super::convert("15N").unwrap(), 15);
        assert_eq!(super::convert("7W").unwrap(), -7);
        assert_eq!(super::convert("7e").unwrap(), 7);
        assert_eq!(super::convert("200").unwrap(), 200);
        assert_eq!(super::convert("-200").unwrap(), -200);
        assert_eq!(super::convert(" L1200E ").unwrap(), 1200);
        assert_eq!(super::convert("0S").unwrap(), 0);
    }

    #[test]
    fn test_convert_direction_sign() {
        for label in ["1S", "25W", "-30S", "400w", "0W", "L10s"] {
            assert!(super::convert(label).unwrap() <= 0, "{label} should be <= 0");
        }
        for label in ["1N", "25E", "400n", "0", "L10e", "95"] {
            assert!(super::convert(label).unwrap() >= 0, "{label} should be >= 0");
        }
    }

    #[test]
    fn test_convert_idempotent() {
        for label in ["15S", "15N", "7W", "-42", "300"] {
            let first = super::convert(label).unwrap();
            assert_eq!(super::convert(&first.to_string()).unwrap(), first);
        }
    }

    #[test]
    fn test_convert_failure() {
        for label in ["", "N", "abc", "--S", "-9223372036854775808S", "99999999999999999999N"] {
            match super::convert(label) {
                Err(crate::error::PemError::Parse(message)) => assert!(!message.is_empty()),
                other => panic!("Expected a parse error for {label:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_repeats() {
        assert_eq!(super::repeat_replacement("101N"), Some("100N".to_string()));
        assert_eq!(super::repeat_replacement("104S"), Some("105S".to_string()));
        assert_eq!(super::repeat_replacement("96"), Some("95".to_string()));
        assert_eq!(super::repeat_replacement("99W"), Some("100W".to_string()));
        assert_eq!(super::repeat_replacement("L11E"), Some("L10E".to_string()));
        assert_eq!(super::repeat_replacement("100N"), None);
        assert_eq!(super::repeat_replacement("125"), None);
        assert_eq!(super::repeat_replacement("N"), None);

        assert!(super::is_repeat("1N"));
        assert!(!super::is_repeat("50N"));
    }

    #[test]
    fn test_shift() {
        assert_eq!(super::shift("50N", 25).unwrap(), ("75N".to_string(), 75));
        assert_eq!(super::shift("50N", -75).unwrap(), ("25S".to_string(), -25));
        assert_eq!(super::shift("10W", 30).unwrap(), ("20E".to_string(), 20));
        assert_eq!(super::shift("L100E", 0).unwrap(), ("100E".to_string(), 100));
        assert_eq!(super::shift("200", -50).unwrap(), ("150".to_string(), 150));
        assert!(super::shift("abc", 1).is_err());
        assert!(super::shift("9223372036854775807N", 1).is_err());
        assert_eq!(
            super::shift("-9223372036854775807", -1).unwrap(),
            (i64::MIN.to_string(), i64::MIN)
        );
    }
}
