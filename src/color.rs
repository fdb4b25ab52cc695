// CSS color values: named colors, hex notation and rgb()/rgba().

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Upper-case hex without `#`, the form WordprocessingML expects.
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    fn from_u32(v: u32) -> Self {
        Rgb((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }
}

const NAMED: &[(&str, u32)] = &[
    ("aliceblue", 0xF0F8FF), ("antiquewhite", 0xFAEBD7), ("aqua", 0x00FFFF),
    ("aquamarine", 0x7FFFD4), ("azure", 0xF0FFFF), ("beige", 0xF5F5DC),
    ("bisque", 0xFFE4C4), ("black", 0x000000), ("blanchedalmond", 0xFFEBCD),
    ("blue", 0x0000FF), ("blueviolet", 0x8A2BE2), ("brown", 0xA52A2A),
    ("burlywood", 0xDEB887), ("cadetblue", 0x5F9EA0), ("chartreuse", 0x7FFF00),
    ("chocolate", 0xD2691E), ("coral", 0xFF7F50), ("cornflowerblue", 0x6495ED),
    ("cornsilk", 0xFFF8DC), ("crimson", 0xDC143C), ("cyan", 0x00FFFF),
    ("darkblue", 0x00008B), ("darkcyan", 0x008B8B), ("darkgoldenrod", 0xB8860B),
    ("darkgray", 0xA9A9A9), ("darkgreen", 0x006400), ("darkgrey", 0xA9A9A9),
    ("darkkhaki", 0xBDB76B), ("darkmagenta", 0x8B008B), ("darkolivegreen", 0x556B2F),
    ("darkorange", 0xFF8C00), ("darkorchid", 0x9932CC), ("darkred", 0x8B0000),
    ("darksalmon", 0xE9967A), ("darkseagreen", 0x8FBC8F), ("darkslateblue", 0x483D8B),
    ("darkslategray", 0x2F4F4F), ("darkslategrey", 0x2F4F4F), ("darkturquoise", 0x00CED1),
    ("darkviolet", 0x9400D3), ("deeppink", 0xFF1493), ("deepskyblue", 0x00BFFF),
    ("dimgray", 0x696969), ("dimgrey", 0x696969), ("dodgerblue", 0x1E90FF),
    ("firebrick", 0xB22222), ("floralwhite", 0xFFFAF0), ("forestgreen", 0x228B22),
    ("fuchsia", 0xFF00FF), ("gainsboro", 0xDCDCDC), ("ghostwhite", 0xF8F8FF),
    ("gold", 0xFFD700), ("goldenrod", 0xDAA520), ("gray", 0x808080),
    ("green", 0x008000), ("greenyellow", 0xADFF2F), ("grey", 0x808080),
    ("honeydew", 0xF0FFF0), ("hotpink", 0xFF69B4), ("indianred", 0xCD5C5C),
    ("indigo", 0x4B0082), ("ivory", 0xFFFFF0), ("khaki", 0xF0E68C),
    ("lavender", 0xE6E6FA), ("lavenderblush", 0xFFF0F5), ("lawngreen", 0x7CFC00),
    ("lemonchiffon", 0xFFFACD), ("lightblue", 0xADD8E6), ("lightcoral", 0xF08080),
    ("lightcyan", 0xE0FFFF), ("lightgoldenrodyellow", 0xFAFAD2), ("lightgray", 0xD3D3D3),
    ("lightgreen", 0x90EE90), ("lightgrey", 0xD3D3D3), ("lightpink", 0xFFB6C1),
    ("lightsalmon", 0xFFA07A), ("lightseagreen", 0x20B2AA), ("lightskyblue", 0x87CEFA),
    ("lightslategray", 0x778899), ("lightslategrey", 0x778899), ("lightsteelblue", 0xB0C4DE),
    ("lightyellow", 0xFFFFE0), ("lime", 0x00FF00), ("limegreen", 0x32CD32),
    ("linen", 0xFAF0E6), ("magenta", 0xFF00FF), ("maroon", 0x800000),
    ("mediumaquamarine", 0x66CDAA), ("mediumblue", 0x0000CD), ("mediumorchid", 0xBA55D3),
    ("mediumpurple", 0x9370DB), ("mediumseagreen", 0x3CB371), ("mediumslateblue", 0x7B68EE),
    ("mediumspringgreen", 0x00FA9A), ("mediumturquoise", 0x48D1CC), ("mediumvioletred", 0xC71585),
    ("midnightblue", 0x191970), ("mintcream", 0xF5FFFA), ("mistyrose", 0xFFE4E1),
    ("moccasin", 0xFFE4B5), ("navajowhite", 0xFFDEAD), ("navy", 0x000080),
    ("oldlace", 0xFDF5E6), ("olive", 0x808000), ("olivedrab", 0x6B8E23),
    ("orange", 0xFFA500), ("orangered", 0xFF4500), ("orchid", 0xDA70D6),
    ("palegoldenrod", 0xEEE8AA), ("palegreen", 0x98FB98), ("paleturquoise", 0xAFEEEE),
    ("palevioletred", 0xDB7093), ("papayawhip", 0xFFEFD5), ("peachpuff", 0xFFDAB9),
    ("peru", 0xCD853F), ("pink", 0xFFC0CB), ("plum", 0xDDA0DD),
    ("powderblue", 0xB0E0E6), ("purple", 0x800080), ("rebeccapurple", 0x663399),
    ("red", 0xFF0000), ("rosybrown", 0xBC8F8F), ("royalblue", 0x4169E1),
    ("saddlebrown", 0x8B4513), ("salmon", 0xFA8072), ("sandybrown", 0xF4A460),
    ("seagreen", 0x2E8B57), ("seashell", 0xFFF5EE), ("sienna", 0xA0522D),
    ("silver", 0xC0C0C0), ("skyblue", 0x87CEEB), ("slateblue", 0x6A5ACD),
    ("slategray", 0x708090), ("slategrey", 0x708090), ("snow", 0xFFFAFA),
    ("springgreen", 0x00FF7F), ("steelblue", 0x4682B4), ("tan", 0xD2B48C),
    ("teal", 0x008080), ("thistle", 0xD8BFD8), ("tomato", 0xFF6347),
    ("turquoise", 0x40E0D0), ("violet", 0xEE82EE), ("wheat", 0xF5DEB3),
    ("white", 0xFFFFFF), ("whitesmoke", 0xF5F5F5), ("yellow", 0xFFFF00),
    ("yellowgreen", 0x9ACD32),
];

lazy_static! {
    static ref NAMED_COLORS: HashMap<&'static str, Rgb> =
        NAMED.iter().map(|(name, v)| (*name, Rgb::from_u32(*v))).collect();
}

fn parse_hex(digits: &str) -> Option<Rgb> {
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).ok().map(|n| n * 17);
    let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    match digits.len() {
        // the fourth and eighth digit forms carry alpha, which is dropped
        3 | 4 => Some(Rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        6 | 8 => Some(Rgb(byte(0)?, byte(2)?, byte(4)?)),
        _ => None,
    }
}

fn parse_channel(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    let value = match raw.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f32>().ok()? * 255.0 / 100.0,
        None => raw.parse::<f32>().ok()?,
    };
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 255.0) as u8)
}

fn parse_functional(args: &str) -> Option<Rgb> {
    // rgb(1, 2, 3) | rgb(1 2 3 / 50%) | rgba(1, 2, 3, 0.5)
    let channels = args.split('/').next()?;
    let parts: Vec<&str> = if channels.contains(',') {
        channels.split(',').collect()
    } else {
        channels.split_whitespace().collect()
    };
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    Some(Rgb(
        parse_channel(parts[0])?,
        parse_channel(parts[1])?,
        parse_channel(parts[2])?,
    ))
}

/// Parse a CSS color. Anything that cannot be turned into a concrete RGB
/// triple (unknown names, `transparent`, `currentcolor`, `inherit`) is an
/// [`Error::InvalidColor`]; callers drop it rather than fall back to black.
pub fn parse_color(raw: &str) -> Result<Rgb> {
    let value = raw.trim().to_ascii_lowercase();
    let invalid = || Error::InvalidColor(raw.trim().to_string());

    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(invalid);
    }
    for prefix in ["rgba(", "rgb("] {
        if let Some(rest) = value.strip_prefix(prefix) {
            let args = rest.strip_suffix(')').ok_or_else(invalid)?;
            return parse_functional(args).ok_or_else(invalid);
        }
    }
    NAMED_COLORS.get(value.as_str()).copied().ok_or_else(invalid)
}

pub fn is_color(token: &str) -> bool {
    parse_color(token).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_colors_are_case_insensitive() {
        assert_eq!(parse_color("Red").unwrap(), Rgb(255, 0, 0));
        assert_eq!(parse_color(" rebeccapurple ").unwrap(), Rgb(0x66, 0x33, 0x99));
    }

    #[test]
    fn hex_forms() {
        assert_eq!(parse_color("#fff").unwrap(), Rgb(255, 255, 255));
        assert_eq!(parse_color("#0000EE").unwrap(), Rgb(0, 0, 0xEE));
        assert_eq!(parse_color("#11223344").unwrap(), Rgb(0x11, 0x22, 0x33));
        assert!(parse_color("#12").is_err());
        assert!(parse_color("#ggg").is_err());
    }

    #[test]
    fn functional_forms() {
        assert_eq!(parse_color("rgb(255, 0, 0)").unwrap(), Rgb(255, 0, 0));
        assert_eq!(parse_color("rgba(0,128,0,0.5)").unwrap(), Rgb(0, 128, 0));
        assert_eq!(parse_color("rgb(0 0 255 / 40%)").unwrap(), Rgb(0, 0, 255));
        assert_eq!(parse_color("rgb(100%, 0%, 300)").unwrap(), Rgb(255, 0, 255));
        assert!(parse_color("rgb(1, 2)").is_err());
        assert!(parse_color("rgb(1, 2, 3").is_err());
    }

    #[test]
    fn unresolvable_values_are_errors_not_black() {
        for bad in ["notacolor", "transparent", "currentcolor", "inherit", ""] {
            assert!(
                matches!(parse_color(bad), Err(Error::InvalidColor(_))),
                "{bad} should not resolve"
            );
        }
    }

    #[test]
    fn hex_output_matches_word_format() {
        assert_eq!(Rgb(0, 0, 0xEE).to_hex(), "0000EE");
        assert_eq!(Rgb(0, 0x80, 0).to_hex(), "008000");
    }
}
