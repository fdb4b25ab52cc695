//! HTML to WordprocessingML conversion.
//!
//! [`convert_html`] parses a document, resolves its CSS cascade and walks it
//! into [`DocumentConstruct`]s; [`docx::write_docx`] turns the result into a
//! `.docx` package. Malformed content never aborts a conversion: what was
//! skipped or repaired is reported in [`Conversion::recovered`].

pub mod cascade;
pub mod color;
pub mod css;
pub mod document;
pub mod docx;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod images;
pub mod lists;
pub mod options;
pub mod style;
pub mod table;
pub mod units;
pub mod walker;

pub use cascade::{Cascade, StyleSources};
pub use document::{Conversion, DocumentConstruct, Paragraph, Run, Table, TableCell};
pub use dom::{collect_stylesheets, parse_html, StylesheetSource};
pub use error::{Error, Result};
pub use lists::ListContinuation;
pub use options::Options;
pub use style::ComputedStyle;
pub use walker::{NoResources, ResourceLoader, Walker};

use markup5ever_rcdom::RcDom;
use tracing::{debug, warn};

/// Convert a parsed document.
///
/// Fails only on caller errors: an invalid style map or a tree with no
/// element in it.
pub fn convert(
    dom: &RcDom,
    sources: &StyleSources,
    options: &Options,
    loader: &dyn ResourceLoader,
) -> Result<Conversion> {
    let mut cascade = Cascade::new(sources, options)?;
    if !dom::has_element(dom) {
        return Err(Error::EmptyDocument);
    }

    let mut recovered = Vec::new();
    for sheet in collect_stylesheets(dom) {
        match sheet {
            StylesheetSource::Embedded(css) => cascade.add_stylesheet(&css),
            StylesheetSource::Linked(_) if !options.styles => {}
            StylesheetSource::Linked(href) => match loader.load_stylesheet(&href) {
                Some(css) => cascade.add_stylesheet(&css),
                None => {
                    warn!(href = %href, "stylesheet unavailable, skipped");
                    recovered.push(Error::ResourceUnavailable(href));
                }
            },
        }
    }
    debug!(rules = cascade.rule_count(), "cascade ready");

    let walker =
        Walker::new(&cascade, options, loader).with_default_style(sources.default_paragraph_style.as_deref());
    let mut conversion = walker.walk(&dom.document);
    recovered.append(&mut conversion.recovered);
    conversion.recovered = recovered;
    Ok(conversion)
}

/// Parse `html` and [`convert`] it.
pub fn convert_html(
    html: &str,
    sources: &StyleSources,
    options: &Options,
    loader: &dyn ResourceLoader,
) -> Result<Conversion> {
    if html.trim().is_empty() {
        return Err(Error::EmptyDocument);
    }
    convert(&parse_html(html), sources, options, loader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Sheets {
        requested: RefCell<Vec<String>>,
    }

    impl ResourceLoader for Sheets {
        fn load_image(&self, _src: &str) -> Option<Vec<u8>> {
            None
        }

        fn load_stylesheet(&self, href: &str) -> Option<String> {
            self.requested.borrow_mut().push(href.to_string());
            (href == "site.css").then(|| "p { color: red }".to_string())
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = convert_html("  \n", &StyleSources::new(), &Options::default(), &NoResources).unwrap_err();
        assert!(matches!(err, Error::EmptyDocument));
    }

    #[test]
    fn invalid_map_is_an_error() {
        let sources = StyleSources::new().with_class_style("note", " ");
        let err = convert_html("<p>x</p>", &sources, &Options::default(), &NoResources).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn linked_stylesheets_go_through_the_loader() {
        let loader = Sheets {
            requested: RefCell::new(Vec::new()),
        };
        let html = r#"<link rel="stylesheet" href="site.css"><link rel="stylesheet" href="gone.css"><p>x</p>"#;
        let c = convert_html(html, &StyleSources::new(), &Options::default(), &loader).unwrap();
        assert_eq!(*loader.requested.borrow(), vec!["site.css", "gone.css"]);
        let p = c.paragraphs().next().unwrap();
        assert_eq!(p.runs().next().unwrap().style.color.map(|c| c.to_hex()), Some("FF0000".to_string()));
        assert_eq!(c.recovered.len(), 1);
        assert!(matches!(&c.recovered[0], Error::ResourceUnavailable(href) if href == "gone.css"));
    }

    #[test]
    fn linked_stylesheets_skipped_without_styles() {
        let loader = Sheets {
            requested: RefCell::new(Vec::new()),
        };
        let options = Options {
            styles: false,
            ..Options::default()
        };
        let html = r#"<link rel="stylesheet" href="site.css"><p>x</p>"#;
        let c = convert_html(html, &StyleSources::new(), &options, &loader).unwrap();
        assert!(loader.requested.borrow().is_empty());
        assert!(c.recovered.is_empty());
    }

    #[test]
    fn default_paragraph_style_applies() {
        let sources = StyleSources::new().with_default_paragraph_style("Body Text");
        let c = convert_html("<p>x</p><h2>y</h2>", &sources, &Options::default(), &NoResources).unwrap();
        let names: Vec<&str> = c.paragraphs().map(|p| p.style_name.as_str()).collect();
        assert_eq!(names, vec!["Body Text", "Heading 2"]);
    }

    #[test]
    fn caller_stylesheets_apply_before_document_ones() {
        let sources = StyleSources::new().with_stylesheet("p { color: blue; font-weight: bold }");
        let html = "<style>p { color: green }</style><p>x</p>";
        let c = convert_html(html, &sources, &Options::default(), &NoResources).unwrap();
        let run = c.paragraphs().next().unwrap().runs().next().unwrap().clone();
        assert_eq!(run.style.color.map(|c| c.to_hex()), Some("008000".to_string()));
        assert!(run.style.is_bold());
    }
}
