// WordprocessingML package writer for a `Conversion`.

use crate::css::Side;
use crate::document::{
    Bookmark, Conversion, DocumentConstruct, Hyperlink, Image, LinkTarget, Paragraph, Run, RunContent, Table,
    TableCell,
};
use crate::error::Result;
use crate::images::{self, ImageFormat};
use crate::lists::{ListItem, ListKind, MAX_DEPTH};
use crate::style::{
    BorderSide, BorderStyle, ComputedStyle, DecorationLine, DecorationStyle, FontStyle, FontWeight, LineHeight,
    Margin, TextAlign, TextTransform, VerticalAlign,
};
use crate::table::TableGrid;
use crate::units::CONTENT_WIDTH_PT;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const REL_HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_NUMBERING: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";

const BULLET_NUM_ID: u32 = 1;
const EMU_PER_PT: f32 = 12700.0;

fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // not representable in XML 1.0
            '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' => {}
            _ => out.push(ch),
        }
    }
    out
}

fn twips(pt: f32) -> i64 {
    (pt * 20.0).round() as i64
}

/// Word style id for a style name: "List Number 2" is `ListNumber2`.
pub fn style_id(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn transform(text: &str, t: Option<TextTransform>) -> String {
    match t {
        Some(TextTransform::Lowercase) => text.to_lowercase(),
        Some(TextTransform::Capitalize) => {
            let mut out = String::with_capacity(text.len());
            let mut at_word_start = true;
            for ch in text.chars() {
                if at_word_start && ch.is_alphabetic() {
                    out.extend(ch.to_uppercase());
                } else {
                    out.push(ch);
                }
                at_word_start = ch.is_whitespace();
            }
            out
        }
        _ => text.to_string(),
    }
}

fn border_xml(tag: &str, side: &BorderSide) -> String {
    let val = match side.style {
        Some(BorderStyle::None) | None => "nil",
        Some(BorderStyle::Single) => "single",
        Some(BorderStyle::Dotted) => "dotted",
        Some(BorderStyle::Dashed) => "dashed",
        Some(BorderStyle::Double) => "double",
        Some(BorderStyle::Inset) => "inset",
        Some(BorderStyle::Outset) => "outset",
        Some(BorderStyle::Groove) => "threeDEngrave",
        Some(BorderStyle::Ridge) => "threeDEmboss",
    };
    if val == "nil" {
        return format!(r#"<w:{tag} w:val="nil"/>"#);
    }
    // eighths of a point, within Word's 2..96
    let size = (side.width.unwrap_or(0.75) * 8.0).round().clamp(2.0, 96.0) as i64;
    let color = side.color.map(|c| c.to_hex()).unwrap_or_else(|| "auto".into());
    format!(r#"<w:{tag} w:val="{val}" w:sz="{size}" w:space="0" w:color="{color}"/>"#)
}

/// Borders of the visible sides, or nothing.
fn borders_xml(wrapper: &str, style: &ComputedStyle) -> String {
    if !Side::ALL.iter().any(|s| style.border.get(*s).is_visible()) {
        return String::new();
    }
    let mut out = format!("<w:{wrapper}>");
    for (side, tag) in [(Side::Top, "top"), (Side::Left, "left"), (Side::Bottom, "bottom"), (Side::Right, "right")] {
        let b = style.border.get(side);
        if b.is_visible() {
            out.push_str(&border_xml(tag, b));
        }
    }
    out.push_str(&format!("</w:{wrapper}>"));
    out
}

fn shading_xml(style: &ComputedStyle) -> String {
    style
        .background_color
        .map(|c| format!(r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#, c.to_hex()))
        .unwrap_or_default()
}

fn run_properties(style: &ComputedStyle, char_style: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(name) = char_style {
        out.push_str(&format!(r#"<w:rStyle w:val="{}Char"/>"#, style_id(name)));
    }
    if let Some(font) = &style.font_family {
        let font = xml_escape_text(font);
        out.push_str(&format!(
            r#"<w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}" w:eastAsia="{font}"/>"#
        ));
    }
    match style.font_weight {
        Some(FontWeight::Bold) => out.push_str("<w:b/>"),
        Some(FontWeight::Normal) => out.push_str(r#"<w:b w:val="0"/>"#),
        None => {}
    }
    match style.font_style {
        Some(FontStyle::Italic) => out.push_str("<w:i/>"),
        Some(FontStyle::Normal) => out.push_str(r#"<w:i w:val="0"/>"#),
        None => {}
    }
    if style.text_transform == Some(TextTransform::Uppercase) {
        out.push_str("<w:caps/>");
    }
    if style.text_decoration.line == Some(DecorationLine::LineThrough) {
        if style.text_decoration.style == Some(DecorationStyle::Double) {
            out.push_str("<w:dstrike/>");
        } else {
            out.push_str("<w:strike/>");
        }
    }
    if let Some(color) = style.color {
        out.push_str(&format!(r#"<w:color w:val="{}"/>"#, color.to_hex()));
    }
    if let Some(size) = style.font_size {
        let half_points = (size * 2.0).round().max(1.0) as i64;
        out.push_str(&format!(r#"<w:sz w:val="{half_points}"/><w:szCs w:val="{half_points}"/>"#));
    }
    if style.text_decoration.line == Some(DecorationLine::Underline) {
        let val = match style.text_decoration.style {
            Some(DecorationStyle::Double) => "double",
            Some(DecorationStyle::Dotted) => "dotted",
            Some(DecorationStyle::Dashed) => "dash",
            Some(DecorationStyle::Wavy) => "wave",
            Some(DecorationStyle::Solid) | None => "single",
        };
        match style.text_decoration.color {
            Some(c) => out.push_str(&format!(r#"<w:u w:val="{val}" w:color="{}"/>"#, c.to_hex())),
            None => out.push_str(&format!(r#"<w:u w:val="{val}"/>"#)),
        }
    }
    out.push_str(&shading_xml(style));
    match style.vertical_align {
        Some(VerticalAlign::Super) => out.push_str(r#"<w:vertAlign w:val="superscript"/>"#),
        Some(VerticalAlign::Sub) => out.push_str(r#"<w:vertAlign w:val="subscript"/>"#),
        _ => {}
    }
    if out.is_empty() {
        return out;
    }
    format!("<w:rPr>{out}</w:rPr>")
}

/// A numbering instance: bullets share one, each restarted ordered list
/// gets its own with a start override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumInstance {
    id: u32,
    level: usize,
    start: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleKind {
    Paragraph,
    Character,
}

const BUILTIN_PARAGRAPH_STYLES: [&str; 14] = [
    "Normal",
    "Heading 1",
    "Heading 2",
    "Heading 3",
    "Heading 4",
    "Heading 5",
    "Heading 6",
    "List Number",
    "List Number 2",
    "List Number 3",
    "List Bullet",
    "List Bullet 2",
    "List Bullet 3",
    "Quote",
];

#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    kind: &'static str,
    target: String,
    external: bool,
}

/// All parts of a package, rendered in memory.
#[derive(Debug, Clone)]
pub struct Package {
    pub document: String,
    pub document_rels: String,
    pub styles: String,
    pub numbering: Option<String>,
    pub content_types: String,
    /// `word/media/...` names and bytes.
    pub media: Vec<(String, Vec<u8>)>,
}

#[derive(Default)]
struct Emitter {
    rels: Vec<Relationship>,
    next_rid: u32,
    links: BTreeMap<String, String>,
    media: Vec<(String, Vec<u8>)>,
    media_formats: BTreeSet<&'static str>,
    bookmark_id: u32,
    bookmark_names: HashSet<String>,
    drawing_id: u32,
    numbering_used: bool,
    ordered: [Option<u32>; MAX_DEPTH],
    nums: Vec<NumInstance>,
    custom_styles: BTreeSet<(String, u8)>,
}

impl Emitter {
    fn new() -> Self {
        Self {
            // rId1 and rId2 are styles and numbering
            next_rid: 10,
            ..Self::default()
        }
    }

    fn relationship(&mut self, kind: &'static str, target: String, external: bool) -> String {
        let id = format!("rId{}", self.next_rid);
        self.next_rid += 1;
        self.rels.push(Relationship {
            id: id.clone(),
            kind,
            target,
            external,
        });
        id
    }

    fn link_rid(&mut self, href: &str) -> String {
        if let Some(rid) = self.links.get(href) {
            return rid.clone();
        }
        let rid = self.relationship(REL_HYPERLINK, href.to_string(), true);
        self.links.insert(href.to_string(), rid.clone());
        rid
    }

    fn note_style(&mut self, name: &str, kind: StyleKind) {
        if kind == StyleKind::Paragraph && BUILTIN_PARAGRAPH_STYLES.contains(&name) {
            return;
        }
        if style_id(name).is_empty() {
            return;
        }
        let tag = match kind {
            StyleKind::Paragraph => 0,
            StyleKind::Character => 1,
        };
        self.custom_styles.insert((name.to_string(), tag));
    }

    fn num_id(&mut self, item: &ListItem) -> u32 {
        self.numbering_used = true;
        match item.kind {
            ListKind::Unordered => BULLET_NUM_ID,
            ListKind::Ordered => {
                let slot = item.level.clamp(1, MAX_DEPTH) - 1;
                match self.ordered[slot] {
                    Some(id) if !item.restart => id,
                    _ => {
                        // numIds 1 is bullets; ordered instances follow
                        let id = self.nums.len() as u32 + 2;
                        self.nums.push(NumInstance {
                            id,
                            level: slot,
                            start: item.number.unwrap_or(1),
                        });
                        self.ordered[slot] = Some(id);
                        id
                    }
                }
            }
        }
    }

    fn constructs(&mut self, items: &[DocumentConstruct], out: &mut String) {
        for item in items {
            match item {
                DocumentConstruct::Paragraph(p) => self.paragraph(p, out),
                DocumentConstruct::Table(t) => self.table(t, out),
                DocumentConstruct::PageBreak => out.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
                // inline constructs outside a paragraph get one of their own
                DocumentConstruct::Run(_) | DocumentConstruct::Image(_) | DocumentConstruct::Bookmark(_) => {
                    out.push_str("<w:p>");
                    let mut open = Vec::new();
                    self.inline(std::slice::from_ref(item), &mut open, out);
                    self.close_bookmarks(&open, out);
                    out.push_str("</w:p>");
                }
            }
        }
    }

    fn paragraph_properties(&mut self, p: &Paragraph) -> String {
        let mut out = String::new();
        let style = &p.style;
        if p.style_name != "Normal" && !style_id(&p.style_name).is_empty() {
            self.note_style(&p.style_name, StyleKind::Paragraph);
            out.push_str(&format!(r#"<w:pStyle w:val="{}"/>"#, style_id(&p.style_name)));
        }
        if let Some(item) = &p.list {
            let num_id = self.num_id(item);
            let ilvl = item.level.clamp(1, MAX_DEPTH) - 1;
            out.push_str(&format!(
                r#"<w:numPr><w:ilvl w:val="{ilvl}"/><w:numId w:val="{num_id}"/></w:numPr>"#
            ));
        }
        out.push_str(&borders_xml("pBdr", style));
        out.push_str(&shading_xml(style));

        let before = match style.margin.top {
            Some(Margin::Points(pt)) => Some(twips(pt.max(0.0))),
            _ => None,
        };
        let after = match style.margin.bottom {
            Some(Margin::Points(pt)) => Some(twips(pt.max(0.0))),
            _ => None,
        };
        let line = match style.line_height {
            Some(LineHeight::Multiple(m)) => Some(((m * 240.0).round() as i64, "auto")),
            Some(LineHeight::Points(pt)) => Some((twips(pt), "exact")),
            None => None,
        };
        if before.is_some() || after.is_some() || line.is_some() {
            out.push_str("<w:spacing");
            if let Some(b) = before {
                out.push_str(&format!(r#" w:before="{b}""#));
            }
            if let Some(a) = after {
                out.push_str(&format!(r#" w:after="{a}""#));
            }
            if let Some((l, rule)) = line {
                out.push_str(&format!(r#" w:line="{l}" w:lineRule="{rule}""#));
            }
            out.push_str("/>");
        }

        // list paragraphs take their indent from the numbering level
        let left = match style.margin.left {
            Some(Margin::Points(pt)) if p.list.is_none() => Some(twips(pt)),
            _ => None,
        };
        let right = match style.margin.right {
            Some(Margin::Points(pt)) => Some(twips(pt)),
            _ => None,
        };
        if left.is_some() || right.is_some() || style.text_indent.is_some() {
            out.push_str("<w:ind");
            if let Some(l) = left {
                out.push_str(&format!(r#" w:left="{l}""#));
            }
            if let Some(r) = right {
                out.push_str(&format!(r#" w:right="{r}""#));
            }
            match style.text_indent.map(twips) {
                Some(i) if i >= 0 => out.push_str(&format!(r#" w:firstLine="{i}""#)),
                Some(i) => out.push_str(&format!(r#" w:hanging="{}""#, -i)),
                None => {}
            }
            out.push_str("/>");
        }

        if let Some(align) = style.text_align {
            let jc = match align {
                TextAlign::Left => "left",
                TextAlign::Center => "center",
                TextAlign::Right => "right",
                TextAlign::Justify => "both",
            };
            out.push_str(&format!(r#"<w:jc w:val="{jc}"/>"#));
        }

        if out.is_empty() {
            return out;
        }
        format!("<w:pPr>{out}</w:pPr>")
    }

    fn paragraph(&mut self, p: &Paragraph, out: &mut String) {
        out.push_str("<w:p>");
        let props = self.paragraph_properties(p);
        out.push_str(&props);
        let mut open = Vec::new();
        self.inline(&p.children, &mut open, out);
        self.close_bookmarks(&open, out);
        out.push_str("</w:p>");
    }

    fn close_bookmarks(&self, open: &[u32], out: &mut String) {
        for id in open {
            out.push_str(&format!(r#"<w:bookmarkEnd w:id="{id}"/>"#));
        }
    }

    /// Inline children; consecutive runs with the same link share one
    /// hyperlink element.
    fn inline(&mut self, children: &[DocumentConstruct], open: &mut Vec<u32>, out: &mut String) {
        let mut i = 0;
        while i < children.len() {
            match &children[i] {
                DocumentConstruct::Run(run) if run.link.is_some() => {
                    let link = run.link.as_ref();
                    let mut end = i + 1;
                    while let Some(DocumentConstruct::Run(next)) = children.get(end) {
                        if next.link.as_ref() != link {
                            break;
                        }
                        end += 1;
                    }
                    let runs: Vec<&Run> = children[i..end]
                        .iter()
                        .filter_map(|c| match c {
                            DocumentConstruct::Run(r) => Some(r),
                            _ => None,
                        })
                        .collect();
                    if let Some(link) = link {
                        self.hyperlink(link, &runs, out);
                    }
                    i = end;
                    continue;
                }
                DocumentConstruct::Run(run) => self.run(run, out),
                DocumentConstruct::Image(image) => self.image(image, out),
                DocumentConstruct::Bookmark(b) => {
                    if let Some(id) = self.bookmark(b, out) {
                        open.push(id);
                    }
                }
                DocumentConstruct::Paragraph(_) | DocumentConstruct::Table(_) | DocumentConstruct::PageBreak => {
                    debug!("block construct inside a paragraph skipped");
                }
            }
            i += 1;
        }
    }

    fn hyperlink(&mut self, link: &Hyperlink, runs: &[&Run], out: &mut String) {
        let tooltip = link
            .tooltip
            .as_deref()
            .map(|t| format!(r#" w:tooltip="{}""#, xml_escape_text(t)))
            .unwrap_or_default();
        match &link.target {
            LinkTarget::External(href) => {
                let rid = self.link_rid(href);
                out.push_str(&format!(r#"<w:hyperlink r:id="{rid}"{tooltip} w:history="1">"#));
            }
            LinkTarget::Anchor(name) => {
                out.push_str(&format!(
                    r#"<w:hyperlink w:anchor="{}"{tooltip} w:history="1">"#,
                    xml_escape_text(name)
                ));
            }
        }
        for run in runs {
            self.run(run, out);
        }
        out.push_str("</w:hyperlink>");
    }

    fn run(&mut self, run: &Run, out: &mut String) {
        let char_style = run.style.style_name.as_deref();
        if let Some(name) = char_style {
            self.note_style(name, StyleKind::Character);
        }
        let props = run_properties(&run.style, char_style.filter(|n| !style_id(n).is_empty()));
        match &run.content {
            RunContent::Break => {
                out.push_str(&format!("<w:r>{props}<w:br/></w:r>"));
            }
            RunContent::Text(text) => {
                if text.is_empty() {
                    return;
                }
                let text = transform(text, run.style.text_transform);
                out.push_str(&format!(
                    r#"<w:r>{props}<w:t xml:space="preserve">{}</w:t></w:r>"#,
                    xml_escape_text(&text)
                ));
            }
        }
    }

    fn bookmark(&mut self, b: &Bookmark, out: &mut String) -> Option<u32> {
        if !self.bookmark_names.insert(b.name.clone()) {
            debug!(name = %b.name, "duplicate bookmark skipped");
            return None;
        }
        let id = self.bookmark_id;
        self.bookmark_id += 1;
        out.push_str(&format!(
            r#"<w:bookmarkStart w:id="{id}" w:name="{}"/>"#,
            xml_escape_text(&b.name)
        ));
        Some(id)
    }

    fn image(&mut self, image: &Image, out: &mut String) {
        let Some(info) = images::sniff(&image.data) else {
            warn!(src = %image.src, "unsupported image format, skipped");
            return;
        };
        let (w, h) = images::display_size(&info, image.width, image.height);
        let (cx, cy) = ((w * EMU_PER_PT).round() as i64, (h * EMU_PER_PT).round() as i64);

        self.drawing_id += 1;
        let n = self.drawing_id;
        let name = format!("image{n}.{}", info.format.extension());
        self.media_formats.insert(info.format.extension());
        self.media.push((format!("word/media/{name}"), image.data.clone()));
        let rid = self.relationship(REL_IMAGE, format!("media/{name}"), false);
        let descr = xml_escape_text(image.alt.as_deref().unwrap_or(""));

        out.push_str(&format!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{n}" name="Picture {n}" descr="{descr}"/><wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="{n}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ));
    }

    fn table(&mut self, t: &Table, out: &mut String) {
        let grid: &TableGrid<TableCell> = &t.grid;
        let total = t.style.width.unwrap_or(CONTENT_WIDTH_PT);
        let col_w = total / grid.cols().max(1) as f32;

        out.push_str("<w:tbl><w:tblPr>");
        match t.style.width {
            Some(w) => out.push_str(&format!(r#"<w:tblW w:w="{}" w:type="dxa"/>"#, twips(w))),
            None => out.push_str(r#"<w:tblW w:w="0" w:type="auto"/>"#),
        }
        match t.style.block_alignment().or(t.style.text_align) {
            Some(TextAlign::Center) => out.push_str(r#"<w:jc w:val="center"/>"#),
            Some(TextAlign::Right) => out.push_str(r#"<w:jc w:val="right"/>"#),
            _ => {}
        }
        let borders = borders_xml("tblBorders", &t.style);
        if borders.is_empty() {
            out.push_str(
                r#"<w:tblBorders><w:top w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/><w:left w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/><w:bottom w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/><w:right w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/><w:insideH w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/><w:insideV w:val="single" w:sz="4" w:space="0" w:color="D9D9D9"/></w:tblBorders>"#,
            );
        } else {
            out.push_str(&borders);
        }
        out.push_str(&shading_xml(&t.style));
        out.push_str("</w:tblPr><w:tblGrid>");
        for _ in 0..grid.cols() {
            out.push_str(&format!(r#"<w:gridCol w:w="{}"/>"#, twips(col_w)));
        }
        out.push_str("</w:tblGrid>");

        for r in 0..grid.rows() {
            out.push_str("<w:tr>");
            let header_row = grid
                .row(r)
                .iter()
                .filter_map(|cell| cell.content.as_ref())
                .fold(None, |acc: Option<bool>, cell| Some(acc.unwrap_or(true) && cell.header));
            if header_row == Some(true) {
                out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }

            let mut c = 0;
            while c < grid.cols() {
                let Some(slot) = grid.cell(r, c) else {
                    break;
                };
                match slot.occupied_by {
                    Some(_) if grid.is_origin(r, c) => {
                        if let Some(content) = &slot.content {
                            self.cell(content, slot.colspan, slot.rowspan > 1, col_w, out);
                        } else {
                            self.empty_cell(1, None, col_w, out);
                        }
                        c += slot.colspan.max(1);
                    }
                    Some((or, oc)) if oc == c && or < r => {
                        let span = grid.cell(or, oc).map_or(1, |o| o.colspan.max(1));
                        let style = grid.cell(or, oc).and_then(|o| o.content.as_ref()).map(|cell| &cell.style);
                        self.empty_cell(span, style, col_w, out);
                        c += span;
                    }
                    Some(_) => c += 1,
                    None => {
                        self.empty_cell(1, None, col_w, out);
                        c += 1;
                    }
                }
            }
            out.push_str("</w:tr>");
        }
        out.push_str("</w:tbl>");
    }

    fn cell_properties(style: &ComputedStyle, colspan: usize, merge: Option<&str>, col_w: f32) -> String {
        let mut out = String::from("<w:tcPr>");
        let width = style.width.unwrap_or(col_w * colspan as f32);
        out.push_str(&format!(r#"<w:tcW w:w="{}" w:type="dxa"/>"#, twips(width)));
        if colspan > 1 {
            out.push_str(&format!(r#"<w:gridSpan w:val="{colspan}"/>"#));
        }
        match merge {
            Some("restart") => out.push_str(r#"<w:vMerge w:val="restart"/>"#),
            Some(_) => out.push_str("<w:vMerge/>"),
            None => {}
        }
        out.push_str(&borders_xml("tcBorders", style));
        out.push_str(&shading_xml(style));
        match style.vertical_align {
            Some(VerticalAlign::Top) => out.push_str(r#"<w:vAlign w:val="top"/>"#),
            Some(VerticalAlign::Middle) => out.push_str(r#"<w:vAlign w:val="center"/>"#),
            Some(VerticalAlign::Bottom) => out.push_str(r#"<w:vAlign w:val="bottom"/>"#),
            _ => {}
        }
        out.push_str("</w:tcPr>");
        out
    }

    fn cell(&mut self, cell: &TableCell, colspan: usize, merged_down: bool, col_w: f32, out: &mut String) {
        out.push_str("<w:tc>");
        let merge = merged_down.then_some("restart");
        out.push_str(&Self::cell_properties(&cell.style, colspan, merge, col_w));
        self.constructs(&cell.content, out);
        // a cell must end with a paragraph
        if !matches!(cell.content.last(), Some(DocumentConstruct::Paragraph(_) | DocumentConstruct::PageBreak)) {
            out.push_str("<w:p/>");
        }
        out.push_str("</w:tc>");
    }

    /// A padding slot, or the continuation of a vertical merge when
    /// `origin_style` is set.
    fn empty_cell(&mut self, colspan: usize, origin_style: Option<&ComputedStyle>, col_w: f32, out: &mut String) {
        out.push_str("<w:tc>");
        let props = match origin_style {
            Some(style) => Self::cell_properties(style, colspan, Some("continue"), col_w),
            None => Self::cell_properties(&ComputedStyle::default(), colspan, None, col_w),
        };
        out.push_str(&props);
        out.push_str("<w:p/></w:tc>");
    }
}

fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:wpc="http://schemas.microsoft.com/office/word/2010/wordprocessingCanvas"
 xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"
 xmlns:o="urn:schemas-microsoft-com:office:office"
 xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"
 xmlns:v="urn:schemas-microsoft-com:vml"
 xmlns:wp14="http://schemas.microsoft.com/office/word/2010/wordprocessingDrawing"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:w10="urn:schemas-microsoft-com:office:word"
 xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordprocessingml"
 xmlns:w15="http://schemas.microsoft.com/office/word/2012/wordprocessingml"
 xmlns:wpg="http://schemas.microsoft.com/office/word/2010/wordprocessingGroup"
 xmlns:wpi="http://schemas.microsoft.com/office/word/2010/wordprocessingInk"
 xmlns:wne="http://schemas.microsoft.com/office/word/2006/wordml"
 xmlns:wps="http://schemas.microsoft.com/office/word/2010/wordprocessingShape"
 mc:Ignorable="w14 w15 wp14">
  <w:body>
    {body}
    <w:sectPr>
      <w:pgSz w:w="12240" w:h="15840"/>
      <w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/>
      <w:cols w:space="708"/>
      <w:docGrid w:linePitch="360"/>
    </w:sectPr>
  </w:body>
</w:document>"#
    )
}

fn content_types_xml(has_numbering: bool, media: &BTreeSet<&'static str>) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    out.push('\n');
    out.push_str(
        r#"  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    out.push('\n');
    out.push_str(r#"  <Default Extension="xml" ContentType="application/xml"/>"#);
    out.push('\n');
    for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif] {
        if media.contains(format.extension()) {
            out.push_str(&format!(
                r#"  <Default Extension="{}" ContentType="{}"/>"#,
                format.extension(),
                format.content_type()
            ));
            out.push('\n');
        }
    }
    out.push_str(r#"  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#);
    out.push('\n');
    if has_numbering {
        out.push_str(r#"  <Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#);
        out.push('\n');
    }
    out.push_str("</Types>");
    out
}

fn rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#
}

fn document_rels_xml(rels: &[Relationship], has_numbering: bool) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    out.push('\n');
    out.push_str(&format!(r#"  <Relationship Id="rId1" Type="{REL_STYLES}" Target="styles.xml"/>"#));
    out.push('\n');
    if has_numbering {
        out.push_str(&format!(r#"  <Relationship Id="rId2" Type="{REL_NUMBERING}" Target="numbering.xml"/>"#));
        out.push('\n');
    }
    for rel in rels {
        let mode = if rel.external { r#" TargetMode="External""# } else { "" };
        out.push_str(&format!(
            r#"  <Relationship Id="{}" Type="{}" Target="{}"{mode}/>"#,
            rel.id,
            rel.kind,
            xml_escape_text(&rel.target),
        ));
        out.push('\n');
    }
    out.push_str("</Relationships>");
    out
}

fn heading_style(level: u8) -> String {
    let size = match level {
        1 => 32,
        2 => 28,
        3 => 26,
        4 => 24,
        5 => 22,
        _ => 20,
    };
    let italic = if level >= 4 { "<w:i/>" } else { "" };
    format!(
        r#"
  <w:style w:type="paragraph" w:styleId="Heading{level}">
    <w:name w:val="heading {level}"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:spacing w:before="240" w:after="120"/>
      <w:outlineLvl w:val="{outline}"/>
    </w:pPr>
    <w:rPr>
      <w:b/>{italic}
      <w:sz w:val="{size}"/>
    </w:rPr>
  </w:style>"#,
        outline = level - 1,
    )
}

fn list_style(name: &str, level: usize) -> String {
    format!(
        r#"
  <w:style w:type="paragraph" w:styleId="{id}">
    <w:name w:val="{name}"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="99"/>
    <w:pPr>
      <w:ind w:left="{left}" w:hanging="360"/>
      <w:contextualSpacing/>
    </w:pPr>
  </w:style>"#,
        id = style_id(name),
        left = 720 * level,
    )
}

fn styles_xml(custom: &BTreeSet<(String, u8)>) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>"#,
    );
    for level in 1..=6 {
        out.push_str(&heading_style(level));
    }
    for base in ["List Number", "List Bullet"] {
        out.push_str(&list_style(base, 1));
        for level in 2..=MAX_DEPTH {
            out.push_str(&list_style(&format!("{base} {level}"), level));
        }
    }
    out.push_str(
        r#"
  <w:style w:type="paragraph" w:styleId="Quote">
    <w:name w:val="Quote"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="29"/>
    <w:qFormat/>
    <w:pPr>
      <w:ind w:left="720" w:right="720"/>
    </w:pPr>
    <w:rPr>
      <w:i/>
    </w:rPr>
  </w:style>"#,
    );
    for (name, kind) in custom {
        let id = style_id(name);
        let name = xml_escape_text(name);
        if *kind == 0 {
            out.push_str(&format!(
                r#"
  <w:style w:type="paragraph" w:customStyle="1" w:styleId="{id}">
    <w:name w:val="{name}"/>
    <w:basedOn w:val="Normal"/>
    <w:qFormat/>
  </w:style>"#
            ));
        } else {
            out.push_str(&format!(
                r#"
  <w:style w:type="character" w:customStyle="1" w:styleId="{id}Char">
    <w:name w:val="{name} Char"/>
    <w:qFormat/>
  </w:style>"#
            ));
        }
    }
    out.push_str("\n</w:styles>");
    out
}

const BULLET_GLYPHS: [&str; MAX_DEPTH] = ["\u{2022}", "\u{25E6}", "\u{25AA}"];

fn level_xml(ilvl: usize, format: &str, text: &str) -> String {
    format!(
        r#"<w:lvl w:ilvl="{ilvl}"><w:start w:val="1"/><w:numFmt w:val="{format}"/><w:lvlText w:val="{text}"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="{left}" w:hanging="360"/></w:pPr></w:lvl>"#,
        left = 720 * (ilvl + 1),
    )
}

fn numbering_xml(nums: &[NumInstance]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="1">
    <w:multiLevelType w:val="hybridMultilevel"/>
    "#,
    );
    for ilvl in 0..9 {
        out.push_str(&level_xml(ilvl, "bullet", BULLET_GLYPHS[ilvl.min(MAX_DEPTH - 1)]));
    }
    out.push_str(
        r#"
  </w:abstractNum>
  <w:abstractNum w:abstractNumId="2">
    <w:multiLevelType w:val="hybridMultilevel"/>
    "#,
    );
    for ilvl in 0..9 {
        out.push_str(&level_xml(ilvl, "decimal", &format!("%{}.", ilvl + 1)));
    }
    out.push_str("\n  </w:abstractNum>\n");
    out.push_str(&format!(
        r#"  <w:num w:numId="{BULLET_NUM_ID}"><w:abstractNumId w:val="1"/></w:num>"#
    ));
    out.push('\n');
    for num in nums {
        out.push_str(&format!(
            r#"  <w:num w:numId="{}"><w:abstractNumId w:val="2"/><w:lvlOverride w:ilvl="{}"><w:startOverride w:val="{}"/></w:lvlOverride></w:num>"#,
            num.id, num.level, num.start
        ));
        out.push('\n');
    }
    out.push_str("</w:numbering>");
    out
}

impl Package {
    pub fn render(conversion: &Conversion) -> Package {
        let mut emitter = Emitter::new();
        let mut body = String::new();
        emitter.constructs(&conversion.constructs, &mut body);
        let has_numbering = emitter.numbering_used;
        Package {
            document: document_xml(&body),
            document_rels: document_rels_xml(&emitter.rels, has_numbering),
            styles: styles_xml(&emitter.custom_styles),
            numbering: has_numbering.then(|| numbering_xml(&emitter.nums)),
            content_types: content_types_xml(has_numbering, &emitter.media_formats),
            media: emitter.media,
        }
    }

    pub fn write<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", opts)?;
        zip.write_all(self.content_types.as_bytes())?;

        zip.start_file("_rels/.rels", opts)?;
        zip.write_all(rels_xml().as_bytes())?;

        zip.start_file("word/document.xml", opts)?;
        zip.write_all(self.document.as_bytes())?;

        zip.start_file("word/styles.xml", opts)?;
        zip.write_all(self.styles.as_bytes())?;

        if let Some(numbering) = &self.numbering {
            zip.start_file("word/numbering.xml", opts)?;
            zip.write_all(numbering.as_bytes())?;
        }

        zip.start_file("word/_rels/document.xml.rels", opts)?;
        zip.write_all(self.document_rels.as_bytes())?;

        for (name, data) in &self.media {
            zip.start_file(name.as_str(), opts)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?)
    }
}

/// Render and write `conversion` as a `.docx` package to `writer`.
pub fn write_docx<W: Write + Seek>(conversion: &Conversion, writer: W) -> Result<W> {
    Package::render(conversion).write(writer)
}

pub fn write_docx_file(path: &Path, conversion: &Conversion) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_docx(conversion, file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::StyleSources;
    use crate::options::Options;
    use crate::walker::NoResources;
    use std::io::{Cursor, Read};

    fn render(html: &str) -> Package {
        let conversion = crate::convert_html(html, &StyleSources::new(), &Options::default(), &NoResources).unwrap();
        Package::render(&conversion)
    }

    fn png_bytes() -> Vec<u8> {
        let mut out = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
        out.extend_from_slice(&8u32.to_be_bytes());
        out.extend_from_slice(&4u32.to_be_bytes());
        out.extend_from_slice(&[8, 6, 0, 0, 0]);
        out
    }

    #[test]
    fn run_formatting() {
        let doc = render(
            r#"<p><b>b</b><i>i</i><u>u</u><s>s</s><sup>2</sup><span style="color: #336699; font-size: 14pt; background-color: yellow; text-transform: uppercase">c</span></p>"#,
        )
        .document;
        assert!(doc.contains("<w:rPr><w:b/></w:rPr>"));
        assert!(doc.contains("<w:rPr><w:i/></w:rPr>"));
        assert!(doc.contains(r#"<w:u w:val="single"/>"#));
        assert!(doc.contains("<w:strike/>"));
        assert!(doc.contains(r#"<w:vertAlign w:val="superscript"/>"#));
        assert!(doc.contains(r#"<w:color w:val="336699"/>"#));
        assert!(doc.contains(r#"<w:sz w:val="28"/>"#));
        assert!(doc.contains(r#"<w:shd w:val="clear" w:color="auto" w:fill="FFFF00"/>"#));
        assert!(doc.contains("<w:caps/>"));
    }

    #[test]
    fn headings_and_alignment() {
        let pkg = render(r#"<h1>T</h1><p style="text-align: justify; margin-left: 36pt; text-indent: -18pt">x</p>"#);
        assert!(pkg.document.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(pkg.document.contains(r#"<w:jc w:val="both"/>"#));
        assert!(pkg.document.contains(r#"<w:ind w:left="720" w:hanging="360"/>"#));
        assert!(pkg.styles.contains(r#"w:styleId="Heading6""#));
    }

    #[test]
    fn lists_use_numbering_with_restarts() {
        let pkg = render("<ol><li>a<li>b</ol><ol><li>c</ol><ul><li>d</ul>");
        let numbering = pkg.numbering.expect("numbering part");
        assert!(pkg.document.contains(r#"<w:numId w:val="2"/>"#));
        assert!(pkg.document.contains(r#"<w:numId w:val="3"/>"#));
        assert!(pkg.document.contains(r#"<w:numId w:val="1"/>"#));
        assert!(numbering.contains(r#"<w:num w:numId="3"><w:abstractNumId w:val="2"/>"#));
        assert!(pkg.content_types.contains("numbering+xml"));
        assert!(pkg.document_rels.contains("numbering.xml"));
    }

    #[test]
    fn empty_first_item_gets_a_fresh_instance() {
        let pkg = render("<ol><li>a<li>b<li>c</ol><ol><li></li><li>z</ol>");
        let ids: Vec<&str> = pkg
            .document
            .match_indices(r#"<w:numId w:val=""#)
            .map(|(at, m)| &pkg.document[at + m.len()..at + m.len() + 1])
            .collect();
        assert_eq!(ids, vec!["2", "2", "2", "3", "3"]);
    }

    #[test]
    fn no_numbering_part_without_lists() {
        let pkg = render("<p>x</p>");
        assert!(pkg.numbering.is_none());
        assert!(!pkg.content_types.contains("numbering"));
    }

    #[test]
    fn external_and_internal_links() {
        let pkg = render(
            r##"<h1 id="intro">Intro</h1><p><a href="https://a.test/?x=1&amp;y=2">a</a><a href="https://a.test/?x=1&amp;y=2">b</a><a href="#intro" title="Link to intro">back</a></p>"##,
        );
        assert!(pkg.document.contains(r#"<w:bookmarkStart w:id="0" w:name="intro"/>"#));
        assert!(pkg.document.contains(r#"<w:bookmarkEnd w:id="0"/>"#));
        assert!(pkg.document.contains(r#"<w:hyperlink w:anchor="intro" w:tooltip="Link to intro" w:history="1">"#));
        assert_eq!(pkg.document.matches(r#"<w:hyperlink r:id="rId10""#).count(), 1);
        assert!(pkg.document_rels.contains(r#"Target="https://a.test/?x=1&amp;y=2" TargetMode="External""#));
    }

    #[test]
    fn merged_table_cells() {
        let doc = render(
            "<table><tr><td rowspan=2 colspan=2>A</td><td>B</td></tr><tr><td>C</td></tr><tr><td>D</td></tr></table>",
        )
        .document;
        assert!(doc.contains(r#"<w:gridSpan w:val="2"/><w:vMerge w:val="restart"/>"#));
        assert!(doc.contains(r#"<w:gridSpan w:val="2"/><w:vMerge/>"#));
        assert_eq!(doc.matches("<w:gridCol ").count(), 3);
        assert_eq!(doc.matches("<w:tr>").count(), 3);
        // every row covers three grid columns
        for row in doc.split("<w:tr>").skip(1) {
            let row = &row[..row.find("</w:tr>").unwrap()];
            let spans: usize = row
                .split("<w:tc>")
                .skip(1)
                .map(|tc| if tc.contains(r#"<w:gridSpan w:val="2"/>"#) { 2 } else { 1 })
                .sum();
            assert_eq!(spans, 3);
        }
    }

    #[test]
    fn custom_styles_are_declared() {
        let sources = StyleSources::new().with_class_style("note", "Intense Quote").with_tag_override("b", "Strong");
        let conversion = crate::convert_html(
            r#"<p class="note">x <b>y</b></p>"#,
            &sources,
            &Options::default(),
            &NoResources,
        )
        .unwrap();
        let pkg = Package::render(&conversion);
        assert!(pkg.document.contains(r#"<w:pStyle w:val="IntenseQuote"/>"#));
        assert!(pkg.document.contains(r#"<w:rStyle w:val="StrongChar"/>"#));
        assert!(pkg.styles.contains(r#"w:styleId="IntenseQuote""#));
        assert!(pkg.styles.contains(r#"w:styleId="StrongChar""#));
    }

    #[test]
    fn images_become_media_parts() {
        let loader = |_: &str| Some(png_bytes());
        let conversion = crate::convert_html(
            r#"<p><img src="a.png" alt="A &amp; B"></p><p><img src="b.png" width="16"></p>"#,
            &StyleSources::new(),
            &Options::default(),
            &loader,
        )
        .unwrap();
        let pkg = Package::render(&conversion);
        assert_eq!(pkg.media.len(), 2);
        assert_eq!(pkg.media[0].0, "word/media/image1.png");
        assert!(pkg.content_types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
        // 8x4 px is 6x3 pt
        assert!(pkg.document.contains(r#"<wp:extent cx="76200" cy="38100"/>"#));
        // 16px wide is 12pt, height follows
        assert!(pkg.document.contains(r#"<wp:extent cx="152400" cy="76200"/>"#));
        assert!(pkg.document.contains(r#"descr="A &amp; B""#));
        assert!(pkg.document_rels.contains(r#"Target="media/image2.png""#));
    }

    #[test]
    fn page_break_and_rule() {
        let doc = render(r#"<p>a</p><hr><p style="page-break-before: always">b</p>"#).document;
        assert!(doc.contains(r#"<w:br w:type="page"/>"#));
        assert!(doc.contains(r#"<w:pBdr><w:bottom w:val="single" w:sz="6" w:space="0" w:color="auto"/></w:pBdr>"#));
    }

    #[test]
    fn text_is_escaped_and_transformed() {
        let doc = render(r#"<p style="text-transform: capitalize">a &lt;b&gt; c</p>"#).document;
        assert!(doc.contains("A &lt;b&gt; C"));
    }

    #[test]
    fn package_round_trips_through_zip() {
        let conversion =
            crate::convert_html("<ul><li>x</ul>", &StyleSources::new(), &Options::default(), &NoResources).unwrap();
        let cursor = write_docx(&conversion, Cursor::new(Vec::new())).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "word/_rels/document.xml.rels",
                "word/document.xml",
                "word/numbering.xml",
                "word/styles.xml",
            ]
        );
        let mut doc = String::new();
        archive.by_name("word/document.xml").unwrap().read_to_string(&mut doc).unwrap();
        assert!(doc.contains(r#"<w:t xml:space="preserve">x</w:t>"#));
    }
}
