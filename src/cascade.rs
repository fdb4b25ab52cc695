// Collects the rules that apply to an element, lowest precedence first.

use crate::css::{self, Origin, Property, Selector, StyleDeclaration, StyleRule};
use crate::dom::{self, Element};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::style::{self, ComputedStyle};
use std::collections::HashMap;
use tracing::debug;

/// Caller-supplied styling inputs.
#[derive(Debug, Clone, Default)]
pub struct StyleSources {
    /// Tag name to Word style name. Replaces the tag's built-in defaults.
    pub tag_overrides: HashMap<String, String>,
    /// Class name to Word style name.
    pub class_map: HashMap<String, String>,
    pub default_paragraph_style: Option<String>,
    /// Stylesheet text, applied before any stylesheet found in the document.
    pub stylesheets: Vec<String>,
}

impl StyleSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_override(mut self, tag: impl Into<String>, style: impl Into<String>) -> Self {
        self.tag_overrides.insert(tag.into().to_ascii_lowercase(), style.into());
        self
    }

    pub fn with_class_style(mut self, class: impl Into<String>, style: impl Into<String>) -> Self {
        self.class_map.insert(class.into(), style.into());
        self
    }

    pub fn with_default_paragraph_style(mut self, style: impl Into<String>) -> Self {
        self.default_paragraph_style = Some(style.into());
        self
    }

    pub fn with_stylesheet(mut self, css: impl Into<String>) -> Self {
        self.stylesheets.push(css.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (kind, map) in [("tag override", &self.tag_overrides), ("class map", &self.class_map)] {
            for (key, style) in map {
                if key.trim().is_empty() || style.trim().is_empty() {
                    return Err(Error::InvalidConfig(format!("{kind} entry `{key}` -> `{style}`")));
                }
            }
        }
        if let Some(name) = &self.default_paragraph_style {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfig("empty default paragraph style".into()));
            }
        }
        Ok(())
    }
}

fn decl(property: Property, value: &str) -> StyleDeclaration {
    StyleDeclaration::new(property, value)
}

/// Built-in formatting of a tag, including presentational attributes.
fn tag_defaults(el: &Element) -> Vec<StyleDeclaration> {
    use Property::*;

    let mut out = match el.tag.as_str() {
        "b" | "strong" | "th" => vec![decl(FontWeight, "bold")],
        "i" | "em" | "cite" | "var" => vec![decl(FontStyle, "italic")],
        "u" | "ins" => vec![decl(TextDecorationLine, "underline")],
        "s" | "strike" | "del" => vec![decl(TextDecorationLine, "line-through")],
        "sup" => vec![decl(VerticalAlign, "super")],
        "sub" => vec![decl(VerticalAlign, "sub")],
        "code" | "kbd" | "samp" | "tt" => vec![decl(FontFamily, "Courier")],
        "pre" => vec![decl(FontFamily, "Courier"), decl(WhiteSpace, "pre")],
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            vec![decl(DocxStyle, &format!("Heading {}", &el.tag[1..]))]
        }
        "center" => vec![decl(TextAlign, "center")],
        "a" if el.attr("href").and_then(dom::sanitize_href).is_some() => {
            vec![decl(Color, "#0000EE"), decl(TextDecorationLine, "underline")]
        }
        "mark" => vec![decl(BackgroundColor, "yellow")],
        "small" => vec![decl(FontSize, "smaller")],
        "big" => vec![decl(FontSize, "larger")],
        "font" => {
            let mut font = Vec::new();
            if let Some(color) = el.attr("color") {
                font.push(decl(Color, color));
            }
            if let Some(face) = el.attr("face") {
                font.push(decl(FontFamily, face));
            }
            font
        }
        _ => Vec::new(),
    };
    if let Some(align) = el.attr("align") {
        out.push(decl(TextAlign, align));
    }
    if let Some(bg) = el.attr("bgcolor") {
        out.push(decl(BackgroundColor, bg));
    }
    out
}

/// The style rules of one document, indexed for lookup by tag, class and id.
#[derive(Debug, Clone, Default)]
pub struct Cascade {
    tag_overrides: HashMap<String, String>,
    class_map: HashMap<String, String>,
    author_styles: bool,
    rules: Vec<StyleRule>,
    by_tag: HashMap<String, Vec<usize>>,
    by_class: HashMap<String, Vec<usize>>,
    by_id: HashMap<String, Vec<usize>>,
}

impl Cascade {
    pub fn new(sources: &StyleSources, options: &Options) -> Result<Self> {
        sources.validate()?;
        let mut cascade = Cascade {
            tag_overrides: if options.tag_override {
                sources
                    .tag_overrides
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect()
            } else {
                HashMap::new()
            },
            class_map: if options.style_map_enabled() {
                sources.class_map.clone()
            } else {
                HashMap::new()
            },
            author_styles: options.styles,
            ..Cascade::default()
        };
        for sheet in &sources.stylesheets {
            cascade.add_stylesheet(sheet);
        }
        Ok(cascade)
    }

    /// Append a stylesheet. Later sheets win ties against earlier ones.
    pub fn add_stylesheet(&mut self, source: &str) {
        if !self.author_styles {
            return;
        }
        for rule in css::parse_stylesheet(source) {
            let index = self.rules.len();
            let (map, key) = match &rule.selector {
                Selector::Tag(tag) => (&mut self.by_tag, tag.clone()),
                Selector::Class(class) => (&mut self.by_class, class.clone()),
                Selector::Id(id) => (&mut self.by_id, id.clone()),
            };
            map.entry(key).or_default().push(index);
            self.rules.push(rule);
        }
        debug!(rules = self.rules.len(), "stylesheet indexed");
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Rules for `el` in ascending precedence: tag default (or override),
    /// class map, stylesheet rules by specificity then source order, inline.
    pub fn rules_for(&self, el: &Element) -> Vec<StyleRule> {
        let mut out = Vec::new();

        let defaults = match self.tag_overrides.get(&el.tag) {
            Some(style) => vec![decl(Property::DocxStyle, style)],
            None => tag_defaults(el),
        };
        if !defaults.is_empty() {
            out.push(StyleRule {
                selector: Selector::Tag(el.tag.clone()),
                declarations: defaults,
                origin: Origin::TagDefault,
            });
        }

        let mapped = el
            .classes()
            .find_map(|class| self.class_map.get(class).map(|style| (class, style)));
        if let Some((class, style)) = mapped {
            out.push(StyleRule {
                selector: Selector::Class(class.to_string()),
                declarations: vec![decl(Property::DocxStyle, style)],
                origin: Origin::ClassMap,
            });
        }

        if !self.author_styles {
            return out;
        }

        let mut matched: Vec<usize> = Vec::new();
        if let Some(ids) = self.by_tag.get(&el.tag) {
            matched.extend(ids);
        }
        for class in el.classes() {
            if let Some(ids) = self.by_class.get(class) {
                matched.extend(ids);
            }
        }
        if let Some(ids) = el.id().and_then(|id| self.by_id.get(id)) {
            matched.extend(ids);
        }
        matched.sort_by_key(|&i| (self.rules[i].selector.specificity(), i));
        matched.dedup();
        out.extend(matched.into_iter().map(|i| self.rules[i].clone()));

        if let Some(inline) = el.attr("style") {
            let declarations = css::parse_declarations(inline);
            if !declarations.is_empty() {
                out.push(StyleRule {
                    selector: Selector::Tag(el.tag.clone()),
                    declarations,
                    origin: Origin::Inline,
                });
            }
        }
        out
    }

    pub fn compute(&self, el: &Element, parent: Option<&ComputedStyle>) -> ComputedStyle {
        style::resolve(&self.rules_for(el), parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::style::{DecorationLine, FontWeight, TextAlign};

    fn cascade(sources: StyleSources) -> Cascade {
        Cascade::new(&sources, &Options::default()).unwrap()
    }

    #[test]
    fn tag_defaults_apply() {
        let c = cascade(StyleSources::new());
        assert!(c.compute(&Element::new("strong", &[]), None).is_bold());
        assert_eq!(
            c.compute(&Element::new("h3", &[]), None).style_name.as_deref(),
            Some("Heading 3")
        );
        let link = c.compute(&Element::new("a", &[("href", "https://x.test")]), None);
        assert_eq!(link.color, Some(Rgb(0, 0, 0xEE)));
        assert_eq!(link.text_decoration.line, Some(DecorationLine::Underline));
        assert_eq!(c.compute(&Element::new("a", &[("name", "top")]), None).color, None);
        assert_eq!(c.compute(&Element::new("a", &[("href", "javascript:void(0)")]), None).color, None);
    }

    #[test]
    fn tag_override_replaces_defaults() {
        let c = cascade(StyleSources::new().with_tag_override("H1", "Title").with_tag_override("b", "Strong"));
        assert_eq!(c.compute(&Element::new("h1", &[]), None).style_name.as_deref(), Some("Title"));
        let b = c.compute(&Element::new("b", &[]), None);
        assert_eq!(b.style_name.as_deref(), Some("Strong"));
        assert!(!b.is_bold());
    }

    #[test]
    fn tag_override_toggle() {
        let sources = StyleSources::new().with_tag_override("h1", "Title");
        let options = Options {
            tag_override: false,
            ..Options::default()
        };
        let c = Cascade::new(&sources, &options).unwrap();
        assert_eq!(c.compute(&Element::new("h1", &[]), None).style_name.as_deref(), Some("Heading 1"));
    }

    #[test]
    fn first_mapped_class_wins_and_beats_tag_override() {
        let c = cascade(
            StyleSources::new()
                .with_class_style("b", "Style B")
                .with_class_style("c", "Style C")
                .with_tag_override("p", "Body Text"),
        );
        let el = Element::new("p", &[("class", "a c b")]);
        assert_eq!(c.compute(&el, None).style_name.as_deref(), Some("Style C"));
    }

    #[test]
    fn stylesheet_specificity_then_source_order() {
        let c = cascade(StyleSources::new().with_stylesheet(
            "#x { color: red } .y { color: green } p { color: blue } .z { color: yellow }",
        ));
        let el = Element::new("p", &[("id", "x"), ("class", "y z")]);
        assert_eq!(c.compute(&el, None).color, Some(Rgb(255, 0, 0)));
        let el = Element::new("p", &[("class", "z y")]);
        assert_eq!(c.compute(&el, None).color, Some(Rgb(255, 255, 0)));
        let el = Element::new("p", &[]);
        assert_eq!(c.compute(&el, None).color, Some(Rgb(0, 0, 255)));
    }

    #[test]
    fn inline_beats_stylesheet_unless_important() {
        let c = cascade(StyleSources::new().with_stylesheet("p { color: red !important; font-weight: bold }"));
        let el = Element::new("p", &[("style", "color: blue; font-weight: normal")]);
        let style = c.compute(&el, None);
        assert_eq!(style.color, Some(Rgb(255, 0, 0)));
        assert_eq!(style.font_weight, Some(FontWeight::Normal));
    }

    #[test]
    fn class_mapped_element_with_inline_important_color() {
        let c = cascade(
            StyleSources::new()
                .with_class_style("warn", "Intense Quote")
                .with_stylesheet(".warn { color: green !important }"),
        );
        let el = Element::new("p", &[("class", "warn"), ("style", "color: #f00 !important; color: blue")]);
        let style = c.compute(&el, None);
        assert_eq!(style.color, Some(Rgb(255, 0, 0)));
        assert_eq!(style.style_name.as_deref(), Some("Intense Quote"));
    }

    #[test]
    fn styles_off_keeps_only_tag_defaults() {
        let sources = StyleSources::new()
            .with_class_style("q", "Quote")
            .with_stylesheet("b { color: red }");
        let options = Options {
            styles: false,
            ..Options::default()
        };
        let c = Cascade::new(&sources, &options).unwrap();
        assert_eq!(c.rule_count(), 0);
        let style = c.compute(&Element::new("b", &[("class", "q"), ("style", "color: blue")]), None);
        assert!(style.is_bold());
        assert_eq!(style.color, None);
        assert_eq!(style.style_name, None);
    }

    #[test]
    fn presentational_attributes() {
        let c = cascade(StyleSources::new());
        let style = c.compute(&Element::new("td", &[("align", "center"), ("bgcolor", "#eeeeee")]), None);
        assert_eq!(style.text_align, Some(TextAlign::Center));
        assert_eq!(style.background_color, Some(Rgb(0xEE, 0xEE, 0xEE)));
        let font = c.compute(&Element::new("font", &[("color", "red"), ("face", "Arial")]), None);
        assert_eq!(font.font_family.as_deref(), Some("Arial"));
    }

    #[test]
    fn empty_map_entries_are_rejected() {
        let err = Cascade::new(&StyleSources::new().with_class_style("x", " "), &Options::default());
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
        let err = Cascade::new(&StyleSources::new().with_default_paragraph_style(""), &Options::default());
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }
}
