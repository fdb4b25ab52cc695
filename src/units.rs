// CSS length handling. Everything downstream works in points.

use crate::error::{Error, Result};

/// Margins and text indents never exceed 5.5in.
pub const MAX_INDENT_PT: f32 = 5.5 * 72.0;

/// Letter page minus 1in margins on both sides; the base for `%` widths.
pub const CONTENT_WIDTH_PT: f32 = 6.5 * 72.0;

/// `medium`, and the base for relative font sizes when nothing is inherited.
pub const DEFAULT_FONT_SIZE_PT: f32 = 12.0;

fn unit_factor(unit: &str) -> Option<f32> {
    match unit {
        "px" => Some(0.75),
        "pt" => Some(1.0),
        "in" => Some(72.0),
        "pc" => Some(12.0),
        "cm" => Some(28.3465),
        "mm" => Some(2.83465),
        "em" | "rem" => Some(12.0),
        _ => None,
    }
}

fn split_number(token: &str) -> Option<(f32, &str)> {
    let end = token
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    let value: f32 = token[..end].parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value, &token[end..]))
}

/// Convert a CSS length to points. `percent_base` resolves `%`; without one a
/// percentage is an [`Error::InvalidUnit`].
pub fn to_points(token: &str, percent_base: Option<f32>) -> Result<f32> {
    let lower = token.trim().to_ascii_lowercase();
    let invalid = || Error::InvalidUnit(token.trim().to_string());
    let (value, unit) = split_number(&lower).ok_or_else(invalid)?;
    match unit {
        "" if value == 0.0 => Ok(0.0),
        "%" => percent_base.map(|base| base * value / 100.0).ok_or_else(invalid),
        unit => unit_factor(unit).map(|f| value * f).ok_or_else(invalid),
    }
}

/// Presentational attributes (`width="120"`) take bare numbers as pixels.
pub fn attribute_length(raw: &str, percent_base: Option<f32>) -> Result<f32> {
    let trimmed = raw.trim();
    match trimmed.parse::<f32>() {
        Ok(px) if px.is_finite() => Ok(px * 0.75),
        _ => to_points(trimmed, percent_base),
    }
}

pub fn font_size_keyword(keyword: &str) -> Option<f32> {
    let pt = match keyword.trim().to_ascii_lowercase().as_str() {
        "xx-small" => 6.75,
        "x-small" => 7.5,
        "small" => 9.75,
        "medium" => 12.0,
        "large" => 13.5,
        "x-large" => 18.0,
        "xx-large" => 24.0,
        _ => return None,
    };
    Some(pt)
}

pub fn border_width_keyword(keyword: &str) -> Option<f32> {
    let pt = match keyword.trim().to_ascii_lowercase().as_str() {
        "thin" => 0.75,
        "medium" => 2.25,
        "thick" => 3.75,
        _ => return None,
    };
    Some(pt)
}

/// Font size in points: a keyword, `smaller`/`larger`, or a length where `%`
/// is relative to the inherited size.
pub fn font_size(token: &str, inherited: Option<f32>) -> Result<f32> {
    if let Some(pt) = font_size_keyword(token) {
        return Ok(pt);
    }
    let base = inherited.unwrap_or(DEFAULT_FONT_SIZE_PT);
    match token.trim().to_ascii_lowercase().as_str() {
        "smaller" => Ok(base / 1.2),
        "larger" => Ok(base * 1.2),
        _ => to_points(token, Some(base)),
    }
}

pub fn border_width(token: &str) -> Result<f32> {
    match border_width_keyword(token) {
        Some(pt) => Ok(pt),
        None => to_points(token, None),
    }
}

pub fn clamp_indent(pt: f32) -> f32 {
    pt.min(MAX_INDENT_PT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn converts_every_supported_unit() {
        assert!(close(to_points("16px", None).unwrap(), 12.0));
        assert!(close(to_points("12pt", None).unwrap(), 12.0));
        assert!(close(to_points("1in", None).unwrap(), 72.0));
        assert!(close(to_points("1pc", None).unwrap(), 12.0));
        assert!(close(to_points("1cm", None).unwrap(), 28.3465));
        assert!(close(to_points("10mm", None).unwrap(), 28.3465));
        assert!(close(to_points("2em", None).unwrap(), 24.0));
        assert!(close(to_points("1.5rem", None).unwrap(), 18.0));
        assert!(close(to_points("-0.5in", None).unwrap(), -36.0));
    }

    #[test]
    fn bare_zero_is_zero_but_bare_numbers_are_not_lengths() {
        assert_eq!(to_points("0", None).unwrap(), 0.0);
        assert!(matches!(to_points("12", None), Err(Error::InvalidUnit(_))));
    }

    #[test]
    fn percent_needs_a_base() {
        assert!(matches!(to_points("50%", None), Err(Error::InvalidUnit(_))));
        assert!(close(to_points("50%", Some(468.0)).unwrap(), 234.0));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "px", "12furlongs", "abc", "1..2px", "auto"] {
            assert!(to_points(bad, Some(10.0)).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn attribute_lengths_default_to_pixels() {
        assert!(close(attribute_length("200", None).unwrap(), 150.0));
        assert!(close(attribute_length("2in", None).unwrap(), 144.0));
    }

    #[test]
    fn keyword_tables() {
        assert_eq!(font_size_keyword("XX-Large"), Some(24.0));
        assert_eq!(font_size_keyword("huge"), None);
        assert_eq!(border_width_keyword("thin"), Some(0.75));
        assert_eq!(border_width("thick").unwrap(), 3.75);
        assert!(close(border_width("2px").unwrap(), 1.5));
    }

    #[test]
    fn font_size_percent_is_relative_to_inherited_size() {
        assert!(close(font_size("150%", Some(10.0)).unwrap(), 15.0));
        assert!(close(font_size("150%", None).unwrap(), 18.0));
        assert!(close(font_size("larger", Some(10.0)).unwrap(), 12.0));
    }

    #[test]
    fn indents_are_clamped() {
        assert_eq!(clamp_indent(1000.0), MAX_INDENT_PT);
        assert_eq!(clamp_indent(36.0), 36.0);
    }
}
