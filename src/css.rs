// Flat CSS: declarations, stylesheets and simple selectors.
//
// Shorthands are expanded into longhands while parsing, so the cascade only
// ever compares one property against the same property.

use crate::color;
use crate::error::{Error, Result};
use crate::units;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Top, Side::Right, Side::Bottom, Side::Left];

    fn from_name(name: &str) -> Option<Side> {
        match name {
            "top" => Some(Side::Top),
            "right" => Some(Side::Right),
            "bottom" => Some(Side::Bottom),
            "left" => Some(Side::Left),
            _ => None,
        }
    }
}

/// Supported longhand properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    Color,
    BackgroundColor,
    FontFamily,
    FontSize,
    FontWeight,
    FontStyle,
    TextDecorationLine,
    TextDecorationStyle,
    TextDecorationColor,
    TextAlign,
    TextTransform,
    TextIndent,
    LineHeight,
    Margin(Side),
    BorderWidth(Side),
    BorderStyle(Side),
    BorderColor(Side),
    VerticalAlign,
    Width,
    Height,
    PageBreakBefore,
    PageBreakAfter,
    WhiteSpace,
    Float,
    /// Word paragraph style name, set by tag defaults, overrides and the class map.
    DocxStyle,
}

impl Property {
    /// Properties a child takes from its parent when it sets nothing itself.
    pub const INHERITED: [Property; 10] = [
        Property::Color,
        Property::FontFamily,
        Property::FontSize,
        Property::FontWeight,
        Property::FontStyle,
        Property::TextDecorationLine,
        Property::TextDecorationStyle,
        Property::TextDecorationColor,
        Property::TextTransform,
        Property::WhiteSpace,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleDeclaration {
    pub property: Property,
    pub value: String,
    pub important: bool,
}

impl StyleDeclaration {
    pub fn new(property: Property, value: impl Into<String>) -> Self {
        Self {
            property,
            value: value.into(),
            important: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Tag(String),
    Class(String),
    Id(String),
}

impl Selector {
    pub fn specificity(&self) -> u8 {
        match self {
            Selector::Tag(_) => 0,
            Selector::Class(_) => 1,
            Selector::Id(_) => 2,
        }
    }
}

/// Where a rule came from. Declaration order of the variants is precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    TagDefault,
    ClassMap,
    ExternalCss,
    Inline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selector: Selector,
    pub declarations: Vec<StyleDeclaration>,
    pub origin: Origin,
}

/// Byte offsets of characters outside quotes and parentheses.
fn top_level_chars(input: &str) -> Vec<(usize, char)> {
    let mut out = Vec::new();
    let mut depth = 0u32;
    let mut quote: Option<char> = None;
    for (i, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 => out.push((i, c)),
            _ => {}
        }
    }
    out
}

fn split_top_level(input: &str, is_separator: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, ch) in top_level_chars(input) {
        if is_separator(ch) {
            parts.push(&input[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Whitespace-separated components of a value, keeping `rgb(1, 2, 3)` and
/// `url(a b:c)` whole.
pub fn split_components(value: &str) -> Vec<&str> {
    split_top_level(value, char::is_whitespace)
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect()
}

fn strip_important(value: &str) -> (&str, bool) {
    if let Some(bang) = value.rfind('!') {
        if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
            return (value[..bang].trim_end(), true);
        }
    }
    (value, false)
}

fn box_sides(value: &str) -> Option<[&str; 4]> {
    match *split_components(value).as_slice() {
        [a] => Some([a, a, a, a]),
        [a, b] => Some([a, b, a, b]),
        [a, b, c] => Some([a, b, c, b]),
        [a, b, c, d] => Some([a, b, c, d]),
        _ => None,
    }
}

fn per_side(value: &str, make: fn(Side) -> Property) -> Option<Vec<(Property, String)>> {
    let sides = box_sides(value)?;
    Some(
        Side::ALL
            .iter()
            .zip(sides)
            .map(|(side, v)| (make(*side), v.to_string()))
            .collect(),
    )
}

fn is_border_style(token: &str) -> bool {
    matches!(
        token.to_ascii_lowercase().as_str(),
        "none" | "hidden" | "dotted" | "dashed" | "solid" | "double" | "groove" | "ridge"
            | "inset" | "outset" | "initial"
    )
}

fn is_border_width(token: &str) -> bool {
    units::border_width(token).is_ok()
}

fn expand_border(value: &str, sides: &[Side]) -> Option<Vec<(Property, String)>> {
    let parts = split_components(value);
    if parts.is_empty() {
        return None;
    }
    if sides.len() == 4 && parts.len() > 1 && parts.iter().all(|p| is_border_width(p)) {
        return per_side(value, Property::BorderWidth);
    }
    let (mut width, mut style, mut color) = (None, None, None);
    for part in parts {
        if is_border_style(part) {
            style.get_or_insert(part);
        } else if is_border_width(part) {
            width.get_or_insert(part);
        } else {
            // validated when resolved, so an unknown color only drops itself
            color.get_or_insert(part);
        }
    }
    let mut out = Vec::new();
    for side in sides {
        if let Some(w) = width {
            out.push((Property::BorderWidth(*side), w.to_string()));
        }
        if let Some(s) = style {
            out.push((Property::BorderStyle(*side), s.to_string()));
        }
        if let Some(c) = color {
            out.push((Property::BorderColor(*side), c.to_string()));
        }
    }
    Some(out)
}

fn expand_text_decoration(value: &str) -> Option<Vec<(Property, String)>> {
    let (mut line, mut style, mut color) = (None, None, None);
    for part in split_components(value) {
        match part.to_ascii_lowercase().as_str() {
            "none" | "underline" | "overline" | "line-through" | "blink" => {
                line.get_or_insert(part);
            }
            "solid" | "double" | "dotted" | "dashed" | "wavy" => {
                style.get_or_insert(part);
            }
            _ => {
                color.get_or_insert(part);
            }
        }
    }
    let out: Vec<(Property, String)> = [
        (Property::TextDecorationLine, line),
        (Property::TextDecorationStyle, style),
        (Property::TextDecorationColor, color),
    ]
    .into_iter()
    .filter_map(|(p, v)| v.map(|v| (p, v.to_string())))
    .collect();
    (!out.is_empty()).then_some(out)
}

fn expand_font(value: &str) -> Option<Vec<(Property, String)>> {
    let parts = split_components(value);
    let mut out = Vec::new();
    let mut size_at = None;
    for (i, part) in parts.iter().enumerate() {
        let lower = part.to_ascii_lowercase();
        let (size, line_height) = match lower.split_once('/') {
            Some((s, lh)) => (s, Some(lh)),
            None => (lower.as_str(), None),
        };
        if units::font_size(size, None).is_ok() {
            out.push((Property::FontSize, size.to_string()));
            if let Some(lh) = line_height {
                out.push((Property::LineHeight, lh.to_string()));
            }
            size_at = Some(i);
            break;
        }
        match lower.as_str() {
            "normal" | "small-caps" => {}
            "italic" | "oblique" => out.push((Property::FontStyle, lower.clone())),
            "bold" | "bolder" | "lighter" | "100" | "200" | "300" | "400" | "500" | "600"
            | "700" | "800" | "900" => out.push((Property::FontWeight, lower.clone())),
            _ => return None,
        }
    }
    let family = parts[size_at? + 1..].join(" ");
    if family.is_empty() {
        return None;
    }
    out.push((Property::FontFamily, family));
    Some(out)
}

fn expand_background(value: &str) -> Option<Vec<(Property, String)>> {
    split_components(value)
        .into_iter()
        .find(|part| color::is_color(part))
        .map(|c| vec![(Property::BackgroundColor, c.to_string())])
}

/// Map a property name and value onto longhand `(property, value)` pairs.
fn expand(name: &str, value: &str) -> Option<Vec<(Property, String)>> {
    use Property::*;

    let single = |p: Property| Some(vec![(p, value.to_string())]);
    match name {
        "color" => single(Color),
        "background-color" => single(BackgroundColor),
        "background" => expand_background(value),
        "font-family" => single(FontFamily),
        "font-size" => single(FontSize),
        "font-weight" => single(FontWeight),
        "font-style" => single(FontStyle),
        "font" => expand_font(value),
        "text-decoration" => expand_text_decoration(value),
        "text-decoration-line" => single(TextDecorationLine),
        "text-decoration-style" => single(TextDecorationStyle),
        "text-decoration-color" => single(TextDecorationColor),
        "text-align" => single(TextAlign),
        "text-transform" => single(TextTransform),
        "text-indent" => single(TextIndent),
        "line-height" => single(LineHeight),
        "vertical-align" => single(VerticalAlign),
        "width" => single(Width),
        "height" => single(Height),
        "white-space" => single(WhiteSpace),
        "float" => single(Float),
        "page-break-before" | "break-before" => single(PageBreakBefore),
        "page-break-after" | "break-after" => single(PageBreakAfter),
        "-docx-style" => single(DocxStyle),
        "margin" => per_side(value, Margin),
        "border" => expand_border(value, &Side::ALL),
        "border-width" => per_side(value, BorderWidth),
        "border-style" => per_side(value, BorderStyle),
        "border-color" => per_side(value, BorderColor),
        _ => {
            if let Some(side) = name.strip_prefix("margin-").and_then(Side::from_name) {
                return single(Margin(side));
            }
            let rest = name.strip_prefix("border-")?;
            let (side, part) = match rest.split_once('-') {
                Some((side, part)) => (Side::from_name(side)?, Some(part)),
                None => (Side::from_name(rest)?, None),
            };
            match part {
                None => expand_border(value, &[side]),
                Some("width") => single(BorderWidth(side)),
                Some("style") => single(BorderStyle(side)),
                Some("color") => single(BorderColor(side)),
                Some(_) => None,
            }
        }
    }
}

/// Parse one `name: value [!important]` declaration into its longhands.
pub fn parse_declaration(raw: &str) -> Result<Vec<StyleDeclaration>> {
    let malformed = || Error::MalformedDeclaration(raw.trim().to_string());
    let colon = top_level_chars(raw)
        .into_iter()
        .find(|(_, c)| *c == ':')
        .map(|(i, _)| i)
        .ok_or_else(malformed)?;
    let name = raw[..colon].trim().to_ascii_lowercase();
    let (value, important) = strip_important(raw[colon + 1..].trim());
    if name.is_empty() || value.is_empty() {
        return Err(malformed());
    }
    let longhands = expand(&name, value).ok_or_else(malformed)?;
    Ok(longhands
        .into_iter()
        .map(|(property, value)| StyleDeclaration {
            property,
            value,
            important,
        })
        .collect())
}

/// Parse a `;`-separated declaration block, skipping bad declarations.
pub fn parse_declarations(block: &str) -> Vec<StyleDeclaration> {
    let mut out = Vec::new();
    for raw in split_top_level(block, |c| c == ';') {
        if raw.trim().is_empty() {
            continue;
        }
        match parse_declaration(raw) {
            Ok(decls) => out.extend(decls),
            Err(err) => debug!(%err, "skipping declaration"),
        }
    }
    out
}

fn parse_compound(compound: &str) -> Option<Selector> {
    let mut chars = compound.chars().peekable();
    let mut tag = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*' {
            tag.push(c);
            chars.next();
        } else {
            break;
        }
    }

    let mut simple = Vec::new();
    while let Some(kind) = chars.next() {
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '.' || c == '#' {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            return None;
        }
        match kind {
            '.' => simple.push(Selector::Class(name)),
            '#' => simple.push(Selector::Id(name)),
            _ => return None,
        }
    }

    if !tag.is_empty() && tag != "*" {
        return Some(Selector::Tag(tag.to_ascii_lowercase()));
    }
    match simple.len() {
        1 => simple.pop(),
        _ => None,
    }
}

/// Reduce a selector to a flat tag, class or id selector.
///
/// Descendant and child chains keep only their rightmost compound, and a
/// compound that names a tag becomes that tag. Pseudo-classes, pseudo-
/// elements and attribute tests cannot be approximated and are dropped.
pub fn parse_selector(raw: &str) -> Option<Selector> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains(':') || raw.contains('[') {
        return None;
    }
    let rightmost = raw
        .split(|c: char| c.is_whitespace() || c == '>' || c == '+' || c == '~')
        .filter(|part| !part.is_empty())
        .last()?;
    parse_compound(rightmost)
}

/// Skip an at-rule starting at `input`, returning what follows it.
fn skip_at_rule(input: &str) -> &str {
    let mut depth = 0u32;
    for (i, ch) in input.char_indices() {
        match ch {
            ';' if depth == 0 => return &input[i + 1..],
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &input[i + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

/// Parse a stylesheet into one rule per selector, in source order.
pub fn parse_stylesheet(source: &str) -> Vec<StyleRule> {
    let text = COMMENT_RE.replace_all(source, "");
    let mut rules = Vec::new();
    let mut rest: &str = &text;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('@') {
            debug!(at_rule = rest.split_whitespace().next().unwrap_or("@"), "skipping at-rule");
            rest = skip_at_rule(rest);
            continue;
        }
        let Some(open) = rest.find('{') else {
            debug!(trailing = rest, "stylesheet ends without a block");
            break;
        };
        let prelude = &rest[..open];
        let after = &rest[open + 1..];
        let close = after.find('}').unwrap_or(after.len());
        let body = &after[..close];
        rest = after.get(close + 1..).unwrap_or("");

        let declarations = parse_declarations(body);
        if declarations.is_empty() {
            continue;
        }
        for raw in prelude.split(',') {
            match parse_selector(raw) {
                Some(selector) => rules.push(StyleRule {
                    selector,
                    declarations: declarations.clone(),
                    origin: Origin::ExternalCss,
                }),
                None => debug!(selector = raw.trim(), "dropping unsupported selector"),
            }
        }
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(decls: &[StyleDeclaration]) -> Vec<(Property, &str)> {
        decls.iter().map(|d| (d.property, d.value.as_str())).collect()
    }

    #[test]
    fn splits_on_first_top_level_colon_only() {
        let decls = parse_declarations("background: url(http://x.test/a:b.png) #fff; color: red");
        assert_eq!(
            props(&decls),
            vec![(Property::BackgroundColor, "#fff"), (Property::Color, "red")]
        );
    }

    #[test]
    fn semicolons_inside_functions_do_not_split() {
        let decls = parse_declarations("background: url('a;b.png') blue");
        assert_eq!(props(&decls), vec![(Property::BackgroundColor, "blue")]);
    }

    #[test]
    fn detects_important() {
        let decls = parse_declarations("color: red ! IMPORTANT; font-weight: bold");
        assert!(decls[0].important);
        assert_eq!(decls[0].value, "red");
        assert!(!decls[1].important);
    }

    #[test]
    fn skips_bad_declarations_and_keeps_the_rest() {
        let decls = parse_declarations("colour: red; color; : x; font-style: italic;;");
        assert_eq!(props(&decls), vec![(Property::FontStyle, "italic")]);
    }

    #[test]
    fn text_decoration_components_ignore_functional_commas() {
        let plain = parse_declarations("text-decoration: underline dotted red");
        let functional = parse_declarations("text-decoration: underline dotted rgb(255, 0, 0)");
        assert_eq!(plain.len(), 3);
        assert_eq!(functional.len(), 3);
        for (a, b) in plain.iter().zip(&functional) {
            assert_eq!(a.property, b.property);
        }
        assert_eq!(functional[2].value, "rgb(255, 0, 0)");
    }

    #[test]
    fn border_shorthand_expands_to_every_side() {
        let decls = parse_declarations("border: 1px solid rgb(0, 0, 255)");
        assert_eq!(decls.len(), 12);
        assert!(decls.contains(&StyleDeclaration::new(
            Property::BorderColor(Side::Left),
            "rgb(0, 0, 255)"
        )));
        assert!(decls.contains(&StyleDeclaration::new(Property::BorderWidth(Side::Top), "1px")));
    }

    #[test]
    fn border_with_only_widths_is_a_box() {
        let decls = parse_declarations("border: 1px 2px");
        assert_eq!(
            props(&decls),
            vec![
                (Property::BorderWidth(Side::Top), "1px"),
                (Property::BorderWidth(Side::Right), "2px"),
                (Property::BorderWidth(Side::Bottom), "1px"),
                (Property::BorderWidth(Side::Left), "2px"),
            ]
        );
    }

    #[test]
    fn side_specific_border_and_margin() {
        let decls = parse_declarations("border-bottom: thick double; margin-left: auto; border-top-color: red");
        assert_eq!(
            props(&decls),
            vec![
                (Property::BorderWidth(Side::Bottom), "thick"),
                (Property::BorderStyle(Side::Bottom), "double"),
                (Property::Margin(Side::Left), "auto"),
                (Property::BorderColor(Side::Top), "red"),
            ]
        );
    }

    #[test]
    fn margin_box_expansion() {
        let decls = parse_declarations("margin: 0 auto");
        assert_eq!(
            props(&decls),
            vec![
                (Property::Margin(Side::Top), "0"),
                (Property::Margin(Side::Right), "auto"),
                (Property::Margin(Side::Bottom), "0"),
                (Property::Margin(Side::Left), "auto"),
            ]
        );
        assert!(parse_declaration("margin: 1px 2px 3px 4px 5px").is_err());
    }

    #[test]
    fn font_shorthand() {
        let decls = parse_declarations("font: italic bold 12px/1.5 \"Times New Roman\", serif");
        assert_eq!(
            props(&decls),
            vec![
                (Property::FontStyle, "italic"),
                (Property::FontWeight, "bold"),
                (Property::FontSize, "12px"),
                (Property::LineHeight, "1.5"),
                (Property::FontFamily, "\"Times New Roman\", serif"),
            ]
        );
        assert!(parse_declaration("font: bold").is_err());
    }

    #[test]
    fn selectors_reduce_to_flat_forms() {
        assert_eq!(parse_selector("P"), Some(Selector::Tag("p".into())));
        assert_eq!(parse_selector(".note"), Some(Selector::Class("note".into())));
        assert_eq!(parse_selector("#main"), Some(Selector::Id("main".into())));
        assert_eq!(parse_selector("div > p.intro"), Some(Selector::Tag("p".into())));
        assert_eq!(parse_selector("article .note"), Some(Selector::Class("note".into())));
        assert_eq!(parse_selector("*.note"), Some(Selector::Class("note".into())));
        assert_eq!(parse_selector("a:hover"), None);
        assert_eq!(parse_selector("p::first-line"), None);
        assert_eq!(parse_selector("input[type=text]"), None);
        assert_eq!(parse_selector(".a.b"), None);
        assert_eq!(parse_selector("*"), None);
    }

    #[test]
    fn stylesheet_expands_comma_lists_and_skips_at_rules() {
        let css = r#"
            @charset "utf-8";
            /* heading colors */
            h1, h2 { color: red }
            @media print { p { color: blue } }
            a:hover, .note { font-weight: bold; bogus: 1 }
            p {}
        "#;
        let rules = parse_stylesheet(css);
        let selectors: Vec<&Selector> = rules.iter().map(|r| &r.selector).collect();
        assert_eq!(
            selectors,
            vec![
                &Selector::Tag("h1".into()),
                &Selector::Tag("h2".into()),
                &Selector::Class("note".into()),
            ]
        );
        assert!(rules.iter().all(|r| r.origin == Origin::ExternalCss));
        assert_eq!(rules[2].declarations.len(), 1);
    }

    #[test]
    fn unterminated_block_still_parses() {
        let rules = parse_stylesheet("p { color: green");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].declarations[0].value, "green");
    }
}
