// What the walker produces and the emitter consumes.

use crate::error::Error;
use crate::lists::ListItem;
use crate::style::ComputedStyle;
use crate::table::TableGrid;

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentConstruct {
    Paragraph(Paragraph),
    Run(Run),
    Table(Table),
    Image(Image),
    Bookmark(Bookmark),
    PageBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub style: ComputedStyle,
    /// Word paragraph style, e.g. "Heading 1" or "List Number 2".
    pub style_name: String,
    pub list: Option<ListItem>,
    /// Runs, images and bookmarks.
    pub children: Vec<DocumentConstruct>,
}

impl Paragraph {
    pub fn new(style: ComputedStyle, style_name: impl Into<String>) -> Self {
        Self {
            style,
            style_name: style_name.into(),
            list: None,
            children: Vec::new(),
        }
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.children.iter().filter_map(|c| match c {
            DocumentConstruct::Run(run) => Some(run),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.children.iter().filter_map(|c| match c {
            DocumentConstruct::Image(image) => Some(image),
            _ => None,
        })
    }

    pub fn bookmarks(&self) -> impl Iterator<Item = &Bookmark> {
        self.children.iter().filter_map(|c| match c {
            DocumentConstruct::Bookmark(b) => Some(b),
            _ => None,
        })
    }

    /// Plain text, with line breaks as `\n`.
    pub fn text(&self) -> String {
        self.runs()
            .map(|run| match &run.content {
                RunContent::Text(t) => t.as_str(),
                RunContent::Break => "\n",
            })
            .collect()
    }

    /// Anything other than bookmarks in it yet.
    pub fn has_inline_content(&self) -> bool {
        self.children.iter().any(|c| !matches!(c, DocumentConstruct::Bookmark(_)))
    }

    pub fn has_content(&self) -> bool {
        self.children.iter().any(|c| match c {
            DocumentConstruct::Run(Run {
                content: RunContent::Text(t),
                ..
            }) => !t.is_empty(),
            _ => true,
        })
    }

    /// Append text, extending the last run when style and link match.
    pub fn push_text(&mut self, text: &str, style: &ComputedStyle, link: Option<&Hyperlink>) {
        if let Some(DocumentConstruct::Run(last)) = self.children.last_mut() {
            if let RunContent::Text(existing) = &mut last.content {
                if last.style == *style && last.link.as_ref() == link {
                    existing.push_str(text);
                    return;
                }
            }
        }
        self.children.push(DocumentConstruct::Run(Run {
            style: style.clone(),
            content: RunContent::Text(text.to_string()),
            link: link.cloned(),
        }));
    }

    pub fn push_break(&mut self, style: &ComputedStyle) {
        self.children.push(DocumentConstruct::Run(Run {
            style: style.clone(),
            content: RunContent::Break,
            link: None,
        }));
    }

    pub fn ends_with_space(&self) -> bool {
        matches!(
            self.children.last(),
            Some(DocumentConstruct::Run(Run { content: RunContent::Text(t), .. })) if t.ends_with(' ')
        )
    }

    /// Drop trailing collapsible whitespace.
    pub fn trim_end(&mut self) {
        while let Some(DocumentConstruct::Run(run)) = self.children.last_mut() {
            if run.style.is_pre() {
                return;
            }
            let RunContent::Text(text) = &mut run.content else {
                return;
            };
            let trimmed_len = text.trim_end().len();
            if trimmed_len > 0 {
                text.truncate(trimmed_len);
                return;
            }
            self.children.pop();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunContent {
    Text(String),
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub style: ComputedStyle,
    pub content: RunContent,
    pub link: Option<Hyperlink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    External(String),
    /// Bookmark name, without `#`.
    Anchor(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    pub target: LinkTarget,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub style: ComputedStyle,
    pub src: String,
    pub alt: Option<String>,
    pub data: Vec<u8>,
    /// Points.
    pub width: Option<f32>,
    pub height: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub style: ComputedStyle,
    pub header: bool,
    pub content: Vec<DocumentConstruct>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub style: ComputedStyle,
    pub grid: TableGrid<TableCell>,
}

/// Constructs in document order plus the problems recovered on the way.
#[derive(Debug, Default)]
pub struct Conversion {
    pub constructs: Vec<DocumentConstruct>,
    pub recovered: Vec<Error>,
}

impl Conversion {
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.constructs.iter().filter_map(|c| match c {
            DocumentConstruct::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.constructs.iter().filter_map(|c| match c {
            DocumentConstruct::Table(t) => Some(t),
            _ => None,
        })
    }
}
