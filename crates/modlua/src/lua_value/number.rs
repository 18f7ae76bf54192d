// Number <-> string conversions.
// Scripts see a single f64 number type; strings coerce through a restricted
// literal grammar (decimal or hex, each with an optional exponent).

/// Parse a numeric string. Leading and trailing whitespace is ignored.
/// Returns `None` for anything that is not a complete numeric literal
/// (`"inf"`, `"nan"`, `"1e"`, `"0x"`, `"1.2.3"` are all rejected).
pub fn parse_lua_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let (negative, rest) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let value = if rest.starts_with("0x") || rest.starts_with("0X") {
        parse_hex_float(&rest[2..])?
    } else {
        parse_decimal(rest)?
    };

    Some(if negative { -value } else { value })
}

/// Parse a string as an integer in the given base (2..=36), as used by
/// `tonumber(s, base)`.
pub fn parse_with_base(s: &str, base: u32) -> Option<f64> {
    if !(2..=36).contains(&base) {
        return None;
    }
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value = 0.0f64;
    for ch in digits.chars() {
        let digit = ch.to_digit(base)?;
        value = value * base as f64 + digit as f64;
    }
    Some(if negative { -value } else { value })
}

fn parse_decimal(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut pos = 0;
    let mut digits = 0;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
        digits += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        pos += 1;
        if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
            pos += 1;
        }
        let start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == start {
            return None;
        }
    }
    if pos != bytes.len() {
        return None;
    }

    s.parse::<f64>().ok()
}

/// Hexadecimal mantissa with optional fraction and binary exponent,
/// e.g. `1.8p+1` (the `0x` prefix is already stripped) = 3.0.
fn parse_hex_float(s: &str) -> Option<f64> {
    let (mantissa_str, exp_str) = match s.find(['p', 'P']) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };

    let mut mantissa = 0.0f64;
    let mut found_dot = false;
    let mut fraction_digits = 0i32;
    let mut digits = 0;

    for ch in mantissa_str.chars() {
        if ch == '.' {
            if found_dot {
                return None;
            }
            found_dot = true;
        } else {
            let digit = ch.to_digit(16)?;
            mantissa = mantissa * 16.0 + digit as f64;
            digits += 1;
            if found_dot {
                fraction_digits += 1;
            }
        }
    }
    if digits == 0 {
        return None;
    }
    if fraction_digits > 0 {
        mantissa /= 16.0f64.powi(fraction_digits);
    }

    let exponent = match exp_str {
        Some(exp) => {
            let unsigned = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            exp.parse::<i32>().ok()?
        }
        None => 0,
    };

    Some(mantissa * 2.0f64.powi(exponent))
}

/// `f` as an integer when it has no fractional part and fits in an i64.
pub fn number_to_integer(f: f64) -> Option<i64> {
    if f >= (i64::MIN as f64) && f < -(i64::MIN as f64) && f == (f as i64 as f64) {
        Some(f as i64)
    } else {
        None
    }
}

/// Render a number the way scripts print it (`%.14g`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if n == n.trunc() && n.abs() < 1e14 {
        if n == 0.0 && n.is_sign_negative() {
            return "-0".to_owned();
        }
        let mut buf = itoa::Buffer::new();
        return buf.format(n as i64).to_owned();
    }
    format_general(n, 14)
}

fn format_general(n: f64, precision: usize) -> String {
    let scientific = format!("{:.*e}", precision - 1, n);
    let (mantissa, exp) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= precision as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
