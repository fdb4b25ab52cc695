use crate::lists::ListContinuation;

/// Conversion switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub images: bool,
    pub tables: bool,
    /// Inline styles, stylesheets and the class map. Tag defaults always apply.
    pub styles: bool,
    pub html_comments: bool,
    pub style_map: bool,
    pub tag_override: bool,
    pub list_continuation: ListContinuation,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            images: true,
            tables: true,
            styles: true,
            html_comments: false,
            style_map: true,
            tag_override: true,
            list_continuation: ListContinuation::AcrossItems,
        }
    }
}

impl Options {
    pub fn style_map_enabled(&self) -> bool {
        self.styles && self.style_map
    }
}
