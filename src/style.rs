// Computed styles and the cascade reducer.

use crate::color::{parse_color, Rgb};
use crate::css::{Origin, Property, Side, StyleRule};
use crate::error::{Error, Result};
use crate::units::{self, CONTENT_WIDTH_PT};
use std::collections::BTreeMap;
use tracing::debug;

/// Precedence tiers, lowest first. `!important` beats every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    TagDefault,
    Inherited,
    ClassMap,
    ExternalCss,
    Inline,
}

impl From<Origin> for Tier {
    fn from(origin: Origin) -> Self {
        match origin {
            Origin::TagDefault => Tier::TagDefault,
            Origin::ClassMap => Tier::ClassMap,
            Origin::ExternalCss => Tier::ExternalCss,
            Origin::Inline => Tier::Inline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationLine {
    None,
    Underline,
    LineThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationStyle {
    Solid,
    Double,
    Dotted,
    Dashed,
    Wavy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextDecoration {
    pub line: Option<DecorationLine>,
    pub style: Option<DecorationStyle>,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTransform {
    None,
    Uppercase,
    Lowercase,
    Capitalize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineHeight {
    Multiple(f32),
    Points(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Margin {
    Auto,
    Points(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderStyle {
    None,
    Single,
    Dotted,
    Dashed,
    Double,
    Inset,
    Outset,
    Groove,
    Ridge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BorderSide {
    pub width: Option<f32>,
    pub style: Option<BorderStyle>,
    pub color: Option<Rgb>,
}

impl BorderSide {
    /// A side is drawn once it has a visible style.
    pub fn is_visible(&self) -> bool {
        matches!(self.style, Some(s) if s != BorderStyle::None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edges<T> {
    pub top: T,
    pub right: T,
    pub bottom: T,
    pub left: T,
}

impl<T> Edges<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Top => &self.top,
            Side::Right => &self.right,
            Side::Bottom => &self.bottom,
            Side::Left => &self.left,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Top => &mut self.top,
            Side::Right => &mut self.right,
            Side::Bottom => &mut self.bottom,
            Side::Left => &mut self.left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Baseline,
    Super,
    Sub,
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Normal,
    Pre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Float {
    None,
    Left,
    Right,
}

/// The resolved formatting of one element. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedStyle {
    pub color: Option<Rgb>,
    pub background_color: Option<Rgb>,
    pub font_family: Option<String>,
    /// Points.
    pub font_size: Option<f32>,
    pub font_weight: Option<FontWeight>,
    pub font_style: Option<FontStyle>,
    pub text_decoration: TextDecoration,
    pub text_align: Option<TextAlign>,
    pub text_transform: Option<TextTransform>,
    pub text_indent: Option<f32>,
    pub line_height: Option<LineHeight>,
    pub margin: Edges<Option<Margin>>,
    pub border: Edges<BorderSide>,
    pub vertical_align: Option<VerticalAlign>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub page_break_before: Option<bool>,
    pub page_break_after: Option<bool>,
    pub white_space: Option<WhiteSpace>,
    pub float: Option<Float>,
    pub style_name: Option<String>,
}

fn keyword(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn bad_value(property: Property, value: &str) -> Error {
    Error::MalformedDeclaration(format!("{property:?}: {value}"))
}

fn font_family(value: &str) -> Option<String> {
    let first = value.split(',').next()?.trim().trim_matches(|c| c == '"' || c == '\'');
    let family = match first.to_ascii_lowercase().as_str() {
        "" => return None,
        "monospace" => "Courier New",
        "serif" => "Times New Roman",
        "sans-serif" => "Arial",
        _ => first,
    };
    Some(family.to_string())
}

fn line_height(value: &str) -> Result<LineHeight> {
    let v = keyword(value);
    if v == "normal" {
        return Ok(LineHeight::Multiple(1.0));
    }
    if let Ok(n) = v.parse::<f32>() {
        if n.is_finite() && n >= 0.0 {
            return Ok(LineHeight::Multiple(n));
        }
    }
    if let Some(pct) = v.strip_suffix('%') {
        if let Ok(n) = pct.trim().parse::<f32>() {
            return Ok(LineHeight::Multiple(n / 100.0));
        }
    }
    units::to_points(&v, None).map(LineHeight::Points)
}

fn margin(value: &str) -> Result<Margin> {
    if keyword(value) == "auto" {
        return Ok(Margin::Auto);
    }
    units::to_points(value, Some(CONTENT_WIDTH_PT)).map(|pt| Margin::Points(units::clamp_indent(pt)))
}

fn border_style(value: &str) -> Option<BorderStyle> {
    let style = match keyword(value).as_str() {
        "none" | "hidden" | "initial" => BorderStyle::None,
        "solid" => BorderStyle::Single,
        "dotted" => BorderStyle::Dotted,
        "dashed" => BorderStyle::Dashed,
        "double" => BorderStyle::Double,
        "inset" => BorderStyle::Inset,
        "outset" => BorderStyle::Outset,
        "groove" => BorderStyle::Groove,
        "ridge" => BorderStyle::Ridge,
        _ => return None,
    };
    Some(style)
}

fn page_break(value: &str) -> Option<bool> {
    match keyword(value).as_str() {
        "always" | "page" | "left" | "right" => Some(true),
        "auto" | "avoid" | "avoid-page" => Some(false),
        _ => None,
    }
}

impl ComputedStyle {
    /// Resolve `value` for `property` onto this style. On error nothing changes.
    pub fn apply(&mut self, property: Property, value: &str, parent: Option<&ComputedStyle>) -> Result<()> {
        let kw = keyword(value);
        let bad = || bad_value(property, value);
        match property {
            Property::Color => self.color = Some(parse_color(value)?),
            Property::BackgroundColor => self.background_color = Some(parse_color(value)?),
            Property::FontFamily => self.font_family = Some(font_family(value).ok_or_else(bad)?),
            Property::FontSize => {
                let inherited = parent.and_then(|p| p.font_size);
                self.font_size = Some(units::font_size(value, inherited)?);
            }
            Property::FontWeight => {
                let weight = match kw.as_str() {
                    "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                    "normal" | "lighter" | "100" | "200" | "300" | "400" | "500" => FontWeight::Normal,
                    _ => return Err(bad()),
                };
                self.font_weight = Some(weight);
            }
            Property::FontStyle => {
                let style = match kw.as_str() {
                    "italic" | "oblique" => FontStyle::Italic,
                    "normal" => FontStyle::Normal,
                    _ => return Err(bad()),
                };
                self.font_style = Some(style);
            }
            Property::TextDecorationLine => {
                let line = match kw.as_str() {
                    "none" => DecorationLine::None,
                    "underline" => DecorationLine::Underline,
                    "line-through" => DecorationLine::LineThrough,
                    // overline and blink have no Word equivalent
                    _ => return Err(bad()),
                };
                self.text_decoration.line = Some(line);
            }
            Property::TextDecorationStyle => {
                let style = match kw.as_str() {
                    "solid" => DecorationStyle::Solid,
                    "double" => DecorationStyle::Double,
                    "dotted" => DecorationStyle::Dotted,
                    "dashed" => DecorationStyle::Dashed,
                    "wavy" => DecorationStyle::Wavy,
                    _ => return Err(bad()),
                };
                self.text_decoration.style = Some(style);
            }
            Property::TextDecorationColor => self.text_decoration.color = Some(parse_color(value)?),
            Property::TextAlign => {
                let align = match kw.as_str() {
                    "left" | "start" => TextAlign::Left,
                    "center" => TextAlign::Center,
                    "right" | "end" => TextAlign::Right,
                    "justify" => TextAlign::Justify,
                    _ => return Err(bad()),
                };
                self.text_align = Some(align);
            }
            Property::TextTransform => {
                let transform = match kw.as_str() {
                    "none" => TextTransform::None,
                    "uppercase" => TextTransform::Uppercase,
                    "lowercase" => TextTransform::Lowercase,
                    "capitalize" => TextTransform::Capitalize,
                    _ => return Err(bad()),
                };
                self.text_transform = Some(transform);
            }
            Property::TextIndent => {
                let pt = units::to_points(value, Some(CONTENT_WIDTH_PT))?;
                self.text_indent = Some(units::clamp_indent(pt));
            }
            Property::LineHeight => self.line_height = Some(line_height(value)?),
            Property::Margin(side) => *self.margin.get_mut(side) = Some(margin(value)?),
            Property::BorderWidth(side) => self.border.get_mut(side).width = Some(units::border_width(value)?),
            Property::BorderStyle(side) => self.border.get_mut(side).style = Some(border_style(value).ok_or_else(bad)?),
            Property::BorderColor(side) => self.border.get_mut(side).color = Some(parse_color(value)?),
            Property::VerticalAlign => {
                let align = match kw.as_str() {
                    "baseline" => VerticalAlign::Baseline,
                    "super" => VerticalAlign::Super,
                    "sub" => VerticalAlign::Sub,
                    "top" | "text-top" => VerticalAlign::Top,
                    "middle" => VerticalAlign::Middle,
                    "bottom" | "text-bottom" => VerticalAlign::Bottom,
                    _ => return Err(bad()),
                };
                self.vertical_align = Some(align);
            }
            Property::Width => self.width = Some(units::to_points(value, Some(CONTENT_WIDTH_PT))?),
            Property::Height => self.height = Some(units::to_points(value, None)?),
            Property::PageBreakBefore => self.page_break_before = Some(page_break(value).ok_or_else(bad)?),
            Property::PageBreakAfter => self.page_break_after = Some(page_break(value).ok_or_else(bad)?),
            Property::WhiteSpace => {
                let ws = match kw.as_str() {
                    "pre" | "pre-wrap" | "pre-line" | "break-spaces" => WhiteSpace::Pre,
                    "normal" | "nowrap" => WhiteSpace::Normal,
                    _ => return Err(bad()),
                };
                self.white_space = Some(ws);
            }
            Property::Float => {
                let float = match kw.as_str() {
                    "left" => Float::Left,
                    "right" => Float::Right,
                    "none" => Float::None,
                    _ => return Err(bad()),
                };
                self.float = Some(float);
            }
            Property::DocxStyle => {
                let name = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
                if name.is_empty() {
                    return Err(bad());
                }
                self.style_name = Some(name.to_string());
            }
        }
        Ok(())
    }

    fn is_set(&self, property: Property) -> bool {
        match property {
            Property::Color => self.color.is_some(),
            Property::FontFamily => self.font_family.is_some(),
            Property::FontSize => self.font_size.is_some(),
            Property::FontWeight => self.font_weight.is_some(),
            Property::FontStyle => self.font_style.is_some(),
            Property::TextDecorationLine => self.text_decoration.line.is_some(),
            Property::TextDecorationStyle => self.text_decoration.style.is_some(),
            Property::TextDecorationColor => self.text_decoration.color.is_some(),
            Property::TextTransform => self.text_transform.is_some(),
            Property::WhiteSpace => self.white_space.is_some(),
            _ => false,
        }
    }

    fn inherit(&mut self, property: Property, parent: &ComputedStyle) {
        match property {
            Property::Color => self.color = parent.color,
            Property::FontFamily => self.font_family = parent.font_family.clone(),
            Property::FontSize => self.font_size = parent.font_size,
            Property::FontWeight => self.font_weight = parent.font_weight,
            Property::FontStyle => self.font_style = parent.font_style,
            Property::TextDecorationLine => self.text_decoration.line = parent.text_decoration.line,
            Property::TextDecorationStyle => self.text_decoration.style = parent.text_decoration.style,
            Property::TextDecorationColor => self.text_decoration.color = parent.text_decoration.color,
            Property::TextTransform => self.text_transform = parent.text_transform,
            Property::WhiteSpace => self.white_space = parent.white_space,
            _ => {}
        }
    }

    /// The part of this style that carries over to a paragraph opened
    /// implicitly inside the element: inherited text properties plus
    /// alignment and spacing between lines.
    pub fn carried(&self) -> ComputedStyle {
        let mut out = ComputedStyle {
            text_align: self.text_align,
            line_height: self.line_height,
            ..ComputedStyle::default()
        };
        for property in Property::INHERITED {
            out.inherit(property, self);
        }
        out
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == Some(FontWeight::Bold)
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == Some(FontStyle::Italic)
    }

    pub fn is_pre(&self) -> bool {
        self.white_space == Some(WhiteSpace::Pre)
    }

    pub fn breaks_before(&self) -> bool {
        self.page_break_before == Some(true)
    }

    pub fn breaks_after(&self) -> bool {
        self.page_break_after == Some(true)
    }

    /// Image alignment: `float: right`, or centered by `auto` side margins.
    pub fn block_alignment(&self) -> Option<TextAlign> {
        if self.float == Some(Float::Right) {
            return Some(TextAlign::Right);
        }
        if self.margin.left == Some(Margin::Auto) && self.margin.right == Some(Margin::Auto) {
            return Some(TextAlign::Center);
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Declared(&'a str),
    Inherited,
}

#[derive(Debug, Clone, Copy)]
struct Entry<'a> {
    tier: Tier,
    important: bool,
    order: usize,
    source: Source<'a>,
}

/// Resolve one element's style from its rules (as returned by the cascade)
/// and its parent's computed style.
///
/// Every property gets an ordered list of `(tier, important, order, value)`
/// entries. The highest entry whose value resolves wins; failing values fall
/// through to the next entry, so an invalid color never shadows a valid one.
pub fn resolve(rules: &[StyleRule], parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut entries: BTreeMap<Property, Vec<Entry<'_>>> = BTreeMap::new();
    if let Some(parent) = parent {
        for property in Property::INHERITED.into_iter().filter(|p| parent.is_set(*p)) {
            entries.entry(property).or_default().push(Entry {
                tier: Tier::Inherited,
                important: false,
                order: 0,
                source: Source::Inherited,
            });
        }
    }

    let mut order = 0;
    for rule in rules {
        for decl in &rule.declarations {
            order += 1;
            entries.entry(decl.property).or_default().push(Entry {
                tier: rule.origin.into(),
                important: decl.important,
                order,
                source: Source::Declared(&decl.value),
            });
        }
    }

    let mut style = ComputedStyle::default();
    for (property, mut candidates) in entries {
        candidates.sort_by_key(|e| (e.important, e.tier, e.order));
        for entry in candidates.iter().rev() {
            match (entry.source, parent) {
                (Source::Inherited, Some(parent)) => {
                    style.inherit(property, parent);
                    break;
                }
                (Source::Inherited, None) => {}
                (Source::Declared(value), _) => match style.apply(property, value, parent) {
                    Ok(()) => break,
                    Err(err) => debug!(%err, ?property, tier = ?entry.tier, "value rejected, falling back"),
                },
            }
        }
    }
    style
}
