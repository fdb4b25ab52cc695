// Depth-first walk of the parsed tree into document constructs.
//
// Styles flow down through `Ctx`, one value per recursion level. Output
// flows through `Sink`, which owns the open paragraph, the list counters
// and the problems recovered along the way.

use crate::cascade::Cascade;
use crate::color::Rgb;
use crate::document::{
    Bookmark, Conversion, DocumentConstruct, Hyperlink, Image, LinkTarget, Paragraph, Table, TableCell,
};
use crate::dom::{collapse_ws, sanitize_href, tag_lower, Element};
use crate::error::Error;
use crate::lists::{ListContext, ListContinuation, ListKind};
use crate::options::Options;
use crate::style::{BorderSide, BorderStyle, ComputedStyle, FontStyle};
use crate::table::{parse_span, CellSpec, TableGrid};
use crate::units::{attribute_length, CONTENT_WIDTH_PT};
use markup5ever_rcdom::{Handle, NodeData};
use tracing::{debug, warn};

pub const DEFAULT_PARAGRAPH_STYLE: &str = "Normal";

const COMMENT_COLOR: Rgb = Rgb(0x00, 0x80, 0x00);

/// Supplies the bytes of images and linked stylesheets.
pub trait ResourceLoader {
    fn load_image(&self, src: &str) -> Option<Vec<u8>>;

    fn load_stylesheet(&self, _href: &str) -> Option<String> {
        None
    }
}

/// Loads nothing: every image is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl ResourceLoader for NoResources {
    fn load_image(&self, _src: &str) -> Option<Vec<u8>> {
        None
    }
}

impl<F> ResourceLoader for F
where
    F: Fn(&str) -> Option<Vec<u8>>,
{
    fn load_image(&self, src: &str) -> Option<Vec<u8>> {
        self(src)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Container,
    Block,
    List(ListKind),
    ListItem,
    Table,
    Inline,
    LineBreak,
    Rule,
    Image,
    Ignored,
    /// Unknown tag: children are walked as if the tag were not there.
    Transparent,
}

fn classify(tag: &str, tables: bool) -> TagKind {
    match tag {
        "html" | "body" | "dl" => TagKind::Container,
        "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "pre" | "blockquote" | "address" | "section"
        | "article" | "header" | "footer" | "main" | "nav" | "aside" | "figure" | "figcaption" | "dd" | "dt"
        | "center" | "form" | "fieldset" | "legend" | "details" | "summary" | "caption" => TagKind::Block,
        "ul" | "menu" | "dir" => TagKind::List(ListKind::Unordered),
        "ol" => TagKind::List(ListKind::Ordered),
        "li" => TagKind::ListItem,
        "table" if tables => TagKind::Table,
        "table" | "thead" | "tbody" | "tfoot" | "tr" => TagKind::Container,
        "td" | "th" => TagKind::Block,
        "span" | "b" | "strong" | "i" | "em" | "u" | "s" | "strike" | "del" | "ins" | "sup" | "sub" | "code"
        | "kbd" | "samp" | "var" | "a" | "font" | "small" | "big" | "mark" | "abbr" | "cite" | "q" | "label"
        | "time" | "tt" | "dfn" => TagKind::Inline,
        "br" => TagKind::LineBreak,
        "hr" => TagKind::Rule,
        "img" => TagKind::Image,
        "script" | "style" | "head" | "title" | "meta" | "link" | "noscript" | "template" | "col" | "colgroup" => {
            TagKind::Ignored
        }
        _ => TagKind::Transparent,
    }
}

/// Context carried downward.
#[derive(Debug, Clone, Default)]
struct Ctx {
    /// Parent style for inheritance.
    style: ComputedStyle,
    /// Style of text runs written here.
    run: ComputedStyle,
    /// Style of a paragraph opened implicitly here.
    block: ComputedStyle,
    /// Style name of a paragraph opened implicitly here, set inside list items.
    block_name: Option<String>,
    link: Option<Hyperlink>,
}

impl Ctx {
    fn for_block(style: &ComputedStyle, block_name: Option<String>, link: Option<Hyperlink>) -> Ctx {
        Ctx {
            style: style.clone(),
            run: style.carried(),
            block: style.carried(),
            block_name,
            link,
        }
    }
}

/// A run inside an inline element keeps the highlight and baseline shift of
/// the inline element around it.
fn inline_run_style(style: &ComputedStyle, enclosing: &ComputedStyle) -> ComputedStyle {
    let mut run = style.clone();
    if run.background_color.is_none() {
        run.background_color = enclosing.background_color;
    }
    if run.vertical_align.is_none() {
        run.vertical_align = enclosing.vertical_align;
    }
    run
}

fn hyperlink(el: &Element) -> Option<Hyperlink> {
    let href = sanitize_href(el.attr("href")?)?;
    let target = match href.strip_prefix('#') {
        Some("") => return None,
        Some(anchor) => LinkTarget::Anchor(anchor.to_string()),
        None => LinkTarget::External(href),
    };
    let tooltip = el
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Some(Hyperlink { target, tooltip })
}

fn bookmark_name(el: &Element) -> Option<&str> {
    el.id().or_else(|| {
        (el.tag == "a")
            .then(|| el.attr("name"))
            .flatten()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    })
}

struct Sink {
    constructs: Vec<DocumentConstruct>,
    open: Option<Paragraph>,
    lists: ListContext,
    /// Bookmarks waiting for the next paragraph.
    pending: Vec<String>,
    recovered: Vec<Error>,
    default_name: String,
}

impl Sink {
    fn new(policy: ListContinuation, default_name: &str) -> Self {
        Self {
            constructs: Vec::new(),
            open: None,
            lists: ListContext::new(policy),
            pending: Vec::new(),
            recovered: Vec::new(),
            default_name: default_name.to_string(),
        }
    }

    fn recover(&mut self, err: Error) {
        debug!(%err, "recovered");
        self.recovered.push(err);
    }

    /// Flush the open paragraph. Empty paragraphs are dropped unless they
    /// carry a list marker.
    fn close(&mut self) {
        if let Some(mut p) = self.open.take() {
            p.trim_end();
            if p.has_content() || p.list.is_some() {
                self.constructs.push(DocumentConstruct::Paragraph(p));
            }
        }
    }

    fn push_block(&mut self, construct: DocumentConstruct) {
        self.close();
        self.constructs.push(construct);
    }

    fn open_paragraph(&mut self, mut p: Paragraph) {
        self.close();
        p.children
            .extend(self.pending.drain(..).map(|name| DocumentConstruct::Bookmark(Bookmark { name })));
        self.open = Some(p);
    }

    fn ensure_open(&mut self, make: impl FnOnce() -> Paragraph) -> &mut Paragraph {
        let pending = &mut self.pending;
        self.open.get_or_insert_with(|| {
            let mut p = make();
            p.children
                .extend(pending.drain(..).map(|name| DocumentConstruct::Bookmark(Bookmark { name })));
            p
        })
    }

    fn bookmark(&mut self, name: &str) {
        match self.open.as_mut() {
            Some(p) => p.children.push(DocumentConstruct::Bookmark(Bookmark { name: name.to_string() })),
            None => self.pending.push(name.to_string()),
        }
    }

    /// Give waiting bookmarks a paragraph of their own.
    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.close();
        let names = self.pending.join(", ");
        self.recover(Error::UnbalancedStructure(format!("bookmark {names} outside any paragraph")));
        let mut p = Paragraph::new(ComputedStyle::default(), self.default_name.clone());
        p.children
            .extend(self.pending.drain(..).map(|name| DocumentConstruct::Bookmark(Bookmark { name })));
        self.constructs.push(DocumentConstruct::Paragraph(p));
    }

    fn finish(mut self) -> Conversion {
        self.close();
        self.flush_pending();
        Conversion {
            constructs: self.constructs,
            recovered: self.recovered,
        }
    }
}

pub struct Walker<'a> {
    cascade: &'a Cascade,
    options: &'a Options,
    loader: &'a dyn ResourceLoader,
    default_name: String,
}

impl<'a> Walker<'a> {
    pub fn new(cascade: &'a Cascade, options: &'a Options, loader: &'a dyn ResourceLoader) -> Self {
        Self {
            cascade,
            options,
            loader,
            default_name: DEFAULT_PARAGRAPH_STYLE.to_string(),
        }
    }

    /// Style name of paragraphs that resolve none of their own.
    pub fn with_default_style(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name {
            self.default_name = name.to_string();
        }
        self
    }

    /// Walk `root` and everything under it.
    pub fn walk(&self, root: &Handle) -> Conversion {
        let mut sink = self.sink();
        self.node(root, &Ctx::default(), &mut sink);
        sink.finish()
    }

    fn sink(&self) -> Sink {
        Sink::new(self.options.list_continuation, &self.default_name)
    }

    fn paragraph_for(&self, ctx: &Ctx) -> Paragraph {
        let name = ctx.block_name.clone().unwrap_or_else(|| self.default_name.clone());
        Paragraph::new(ctx.block.clone(), name)
    }

    fn children(&self, node: &Handle, ctx: &Ctx, sink: &mut Sink) {
        for child in node.children.borrow().iter() {
            self.node(child, ctx, sink);
        }
    }

    fn node(&self, node: &Handle, ctx: &Ctx, sink: &mut Sink) {
        match &node.data {
            NodeData::Document => self.children(node, ctx, sink),
            NodeData::Text { contents } => self.text(&contents.borrow(), ctx, sink),
            NodeData::Comment { contents } => {
                if self.options.html_comments {
                    self.comment(contents, ctx, sink);
                }
            }
            NodeData::Element { .. } => self.element(node, ctx, sink),
            _ => {}
        }
    }

    fn element(&self, node: &Handle, ctx: &Ctx, sink: &mut Sink) {
        let Some(el) = Element::from_handle(node) else {
            return;
        };
        let kind = classify(&el.tag, self.options.tables);
        match kind {
            TagKind::Ignored => return,
            TagKind::Transparent => return self.children(node, ctx, sink),
            TagKind::Image if !self.options.images => return,
            _ => {}
        }

        let style = self.cascade.compute(&el, Some(&ctx.style));
        if style.breaks_before() {
            sink.push_block(DocumentConstruct::PageBreak);
        }

        match kind {
            TagKind::Container => {
                if let Some(name) = bookmark_name(&el) {
                    sink.bookmark(name);
                }
                let child = Ctx::for_block(&style, ctx.block_name.clone(), ctx.link.clone());
                self.children(node, &child, sink);
            }
            TagKind::Block => self.block(node, &el, &style, ctx, sink),
            TagKind::List(list_kind) => self.list(node, &el, list_kind, &style, ctx, sink),
            TagKind::ListItem => self.list_item(node, &el, &style, ctx, sink),
            TagKind::Table => self.table(node, &el, &style, ctx, sink),
            TagKind::Inline => self.inline(node, &el, &style, ctx, sink),
            TagKind::LineBreak => {
                let run = inline_run_style(&style, &ctx.run);
                sink.ensure_open(|| self.paragraph_for(ctx)).push_break(&run);
            }
            TagKind::Rule => self.rule(&style, sink),
            TagKind::Image => self.image(&el, &style, ctx, sink),
            TagKind::Ignored | TagKind::Transparent => {}
        }

        if style.breaks_after() {
            sink.push_block(DocumentConstruct::PageBreak);
        }
    }

    fn block(&self, node: &Handle, el: &Element, style: &ComputedStyle, ctx: &Ctx, sink: &mut Sink) {
        // A block right at the start of a list item takes over the item's
        // paragraph instead of leaving an empty numbered line behind.
        let reuse = sink
            .open
            .as_ref()
            .map_or(false, |p| p.list.is_some() && !p.has_inline_content());
        if reuse {
            if let Some(p) = sink.open.as_mut() {
                p.style = style.clone();
            }
        } else {
            let name = style
                .style_name
                .clone()
                .or_else(|| ctx.block_name.clone())
                .unwrap_or_else(|| self.default_name.clone());
            sink.open_paragraph(Paragraph::new(style.clone(), name));
        }
        if let Some(name) = bookmark_name(el) {
            sink.bookmark(name);
        }

        let child = Ctx::for_block(style, ctx.block_name.clone(), ctx.link.clone());
        self.children(node, &child, sink);
        sink.close();
    }

    fn list(
        &self,
        node: &Handle,
        el: &Element,
        kind: ListKind,
        style: &ComputedStyle,
        ctx: &Ctx,
        sink: &mut Sink,
    ) {
        sink.close();
        if let Some(name) = bookmark_name(el) {
            sink.bookmark(name);
        }
        let start = match kind {
            ListKind::Ordered => el
                .attr("start")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(|n| n.clamp(0, i64::from(u32::MAX)) as u32),
            ListKind::Unordered => None,
        };
        sink.lists.enter_list(kind, start);
        let child = Ctx::for_block(style, ctx.block_name.clone(), ctx.link.clone());
        self.children(node, &child, sink);
        sink.close();
        sink.lists.exit_list();
    }

    fn list_item(&self, node: &Handle, el: &Element, style: &ComputedStyle, ctx: &Ctx, sink: &mut Sink) {
        sink.close();
        let (item, synthesized) = match sink.lists.enter_item() {
            Some(item) => (item, false),
            None => {
                sink.recover(Error::UnbalancedStructure("list item outside any list".into()));
                (sink.lists.synthesize_item(), true)
            }
        };
        let name = style.style_name.clone().unwrap_or_else(|| item.style_name());
        let mut p = Paragraph::new(style.clone(), name.clone());
        p.list = Some(item);
        sink.open_paragraph(p);
        if let Some(id) = bookmark_name(el) {
            sink.bookmark(id);
        }

        let child = Ctx::for_block(style, Some(name), ctx.link.clone());
        self.children(node, &child, sink);
        sink.close();
        if synthesized {
            sink.lists.exit_list();
        }
    }

    fn inline(&self, node: &Handle, el: &Element, style: &ComputedStyle, ctx: &Ctx, sink: &mut Sink) {
        if let Some(name) = bookmark_name(el) {
            sink.bookmark(name);
        }
        let mut child = ctx.clone();
        child.style = style.clone();
        child.run = inline_run_style(style, &ctx.run);
        if el.tag == "a" {
            if let Some(link) = hyperlink(el) {
                child.link = Some(link);
            } else if el.attr("href").is_some() {
                debug!(href = el.attr("href").unwrap_or_default(), "link target dropped");
            }
        }
        self.children(node, &child, sink);
    }

    fn text(&self, raw: &str, ctx: &Ctx, sink: &mut Sink) {
        let pre = ctx.run.is_pre();
        let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
        let text = if pre { normalized } else { collapse_ws(&normalized) };
        if text.is_empty() || (!pre && sink.open.is_none() && text.trim().is_empty()) {
            return;
        }

        let paragraph = sink.ensure_open(|| self.paragraph_for(ctx));
        let link = ctx.link.as_ref();
        if pre {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    paragraph.push_break(&ctx.run);
                }
                if !line.is_empty() {
                    paragraph.push_text(line, &ctx.run, link);
                }
            }
            return;
        }

        let text = if !paragraph.has_inline_content() || paragraph.ends_with_space() {
            text.trim_start()
        } else {
            text.as_str()
        };
        if !text.is_empty() {
            paragraph.push_text(text, &ctx.run, link);
        }
    }

    fn comment(&self, contents: &str, ctx: &Ctx, sink: &mut Sink) {
        let text = contents.trim();
        if text.is_empty() {
            return;
        }
        let mut run = ctx.run.clone();
        run.font_style = Some(FontStyle::Italic);
        run.color = Some(COMMENT_COLOR);
        let text = format!("# {text}");
        match sink.open.as_mut() {
            Some(p) => p.push_text(&text, &run, None),
            None => {
                let mut p = Paragraph::new(ctx.block.clone(), self.default_name.clone());
                p.push_text(&text, &run, None);
                sink.push_block(DocumentConstruct::Paragraph(p));
            }
        }
    }

    fn rule(&self, style: &ComputedStyle, sink: &mut Sink) {
        let mut style = style.clone();
        if !style.border.bottom.is_visible() {
            style.border.bottom = BorderSide {
                width: Some(0.75),
                style: Some(BorderStyle::Single),
                color: None,
            };
        }
        // Pushed directly: the paragraph has no content but must stay.
        sink.push_block(DocumentConstruct::Paragraph(Paragraph::new(style, self.default_name.clone())));
    }

    fn image(&self, el: &Element, style: &ComputedStyle, ctx: &Ctx, sink: &mut Sink) {
        let Some(src) = el.attr("src").map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("image without src skipped");
            sink.recover(Error::ResourceUnavailable("<img> without src".into()));
            return;
        };
        let Some(data) = self.loader.load_image(src) else {
            warn!(src, "image unavailable, skipped");
            sink.recover(Error::ResourceUnavailable(src.to_string()));
            return;
        };

        let dimension = |css: Option<f32>, attr: &str| {
            css.or_else(|| el.attr(attr).and_then(|v| attribute_length(v, Some(CONTENT_WIDTH_PT)).ok()))
                .filter(|pt| *pt > 0.0)
        };
        let image = Image {
            style: style.clone(),
            src: src.to_string(),
            alt: el.attr("alt").map(str::to_string),
            data,
            width: dimension(style.width, "width"),
            height: dimension(style.height, "height"),
        };

        if let Some(name) = bookmark_name(el) {
            sink.bookmark(name);
        }
        let alignment = style.block_alignment();
        let paragraph = sink.ensure_open(|| self.paragraph_for(ctx));
        if alignment.is_some() {
            paragraph.style.text_align = alignment;
        }
        paragraph.children.push(DocumentConstruct::Image(image));
    }

    fn table(&self, node: &Handle, el: &Element, style: &ComputedStyle, ctx: &Ctx, sink: &mut Sink) {
        sink.close();
        let table_ctx = Ctx::for_block(style, None, ctx.link.clone());
        if let Some(name) = bookmark_name(el) {
            sink.bookmark(name);
        }

        let mut rows: Vec<Vec<CellSpec<TableCell>>> = Vec::new();
        for child in node.children.borrow().iter() {
            let Some(tag) = tag_lower(child) else {
                continue;
            };
            match tag.as_str() {
                "caption" => self.node(child, &table_ctx, sink),
                "tr" => rows.push(self.table_row(child, &table_ctx, sink)),
                "thead" | "tbody" | "tfoot" => {
                    for tr in child.children.borrow().iter() {
                        if tag_lower(tr).as_deref() == Some("tr") {
                            rows.push(self.table_row(tr, &table_ctx, sink));
                        }
                    }
                }
                _ => {}
            }
        }

        let grid = TableGrid::build(rows);
        if grid.is_empty() {
            debug!("table without cells dropped");
            return;
        }
        if grid.padded() > 0 {
            sink.recover(Error::UnbalancedStructure(format!(
                "ragged table padded with {} empty cells",
                grid.padded()
            )));
        }
        if grid.truncated() > 0 {
            sink.recover(Error::UnbalancedStructure(format!(
                "{} overlapping table spans truncated",
                grid.truncated()
            )));
        }
        sink.flush_pending();
        sink.push_block(DocumentConstruct::Table(Table {
            style: style.clone(),
            grid,
        }));
    }

    fn table_row(&self, tr: &Handle, ctx: &Ctx, sink: &mut Sink) -> Vec<CellSpec<TableCell>> {
        let Some(row_el) = Element::from_handle(tr) else {
            return Vec::new();
        };
        let row_style = self.cascade.compute(&row_el, Some(&ctx.style));
        let mut cells = Vec::new();
        for child in tr.children.borrow().iter() {
            let Some(cell_el) = Element::from_handle(child) else {
                continue;
            };
            if cell_el.tag != "td" && cell_el.tag != "th" {
                continue;
            }
            let mut cell_style = self.cascade.compute(&cell_el, Some(&row_style));
            if cell_style.background_color.is_none() {
                cell_style.background_color = row_style.background_color;
            }

            let mut inner = self.sink();
            if let Some(name) = bookmark_name(&cell_el) {
                inner.bookmark(name);
            }
            let cell_ctx = Ctx::for_block(&cell_style, None, ctx.link.clone());
            self.children(child, &cell_ctx, &mut inner);
            let content = inner.finish();
            sink.recovered.extend(content.recovered);

            cells.push(CellSpec::spanning(
                parse_span(cell_el.attr("rowspan")),
                parse_span(cell_el.attr("colspan")),
                TableCell {
                    style: cell_style,
                    header: cell_el.tag == "th",
                    content: content.constructs,
                },
            ));
        }
        cells
    }
}
