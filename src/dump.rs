//! Streams a MediaWiki XML export into one `RawPage` JSON object per line.

use std::borrow::Cow;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::Value;
use tracing::info;

use crate::model::RawPage;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DumpStats {
    pub pages: u64,
    pub kept: u64,
    pub redirects: u64,
    pub other_ns: u64,
}

#[derive(Debug, Default)]
struct PageAcc {
    title: String,
    ns: String,
    id: String,
    timestamp: String,
    text: String,
    redirect: bool,
    revisions: usize,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Ns,
    Id,
    Timestamp,
    Text,
}

impl PageAcc {
    fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Ns => &mut self.ns,
            Field::Id => &mut self.id,
            Field::Timestamp => &mut self.timestamp,
            Field::Text => &mut self.text,
        }
    }

    fn into_raw_page(self) -> RawPage {
        RawPage {
            page_id: Some(Value::String(self.id.trim().to_string())),
            title: Some(fix_mojibake(&self.title).into_owned()),
            timestamp: Some(self.timestamp.trim().to_string()),
            wikitext: fix_mojibake(&self.text).into_owned(),
        }
    }
}

/// Which page field the text under `stack` belongs to. Only the first revision is read.
fn field_of(stack: &[Vec<u8>], revisions: usize) -> Option<Field> {
    let page = stack.iter().rposition(|n| n == b"page")?;
    match &stack[page + 1..] {
        [a] if a == b"title" => Some(Field::Title),
        [a] if a == b"ns" => Some(Field::Ns),
        [a] if a == b"id" => Some(Field::Id),
        [r, a] if r == b"revision" && a == b"timestamp" && revisions == 1 => Some(Field::Timestamp),
        [r, a] if r == b"revision" && a == b"text" && revisions == 1 => Some(Field::Text),
        _ => None,
    }
}

/// Undo UTF-8 text that was decoded as latin-1 somewhere upstream ("ChÃ­nh" -> "Chính").
/// Left untouched when the string does not round-trip.
pub fn fix_mojibake(s: &str) -> Cow<'_, str> {
    if !(s.contains('Ã') || s.contains('Â')) {
        return Cow::Borrowed(s);
    }
    let bytes = s.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>();
    match bytes.and_then(|b| String::from_utf8(b).ok()) {
        Some(fixed) => Cow::Owned(fixed),
        None => Cow::Borrowed(s),
    }
}

/// Keep article pages (namespace 0, not a redirect) and write them as JSON lines.
pub fn extract<R: BufRead, W: Write>(input: R, out: &mut W) -> Result<DumpStats> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);

    let mut stats = DumpStats::default();
    let mut buf = Vec::with_capacity(1 << 16);
    let mut stack: Vec<Vec<u8>> = Vec::with_capacity(8);
    let mut page: Option<PageAcc> = None;

    loop {
        let event = reader.read_event_into(&mut buf)
            .with_context(|| format!("xml error near byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"page" => page = Some(PageAcc::default()),
                    b"redirect" => if let Some(p) = page.as_mut() { p.redirect = true },
                    b"revision" => if let Some(p) = page.as_mut() { p.revisions += 1 },
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"redirect" {
                    if let Some(p) = page.as_mut() { p.redirect = true }
                }
            }
            Event::Text(t) => {
                if let Some(p) = page.as_mut() {
                    if let Some(field) = field_of(&stack, p.revisions) {
                        let text = t.unescape().context("bad xml entity")?;
                        p.field_mut(field).push_str(&text);
                    }
                }
            }
            Event::CData(c) => {
                if let Some(p) = page.as_mut() {
                    if let Some(field) = field_of(&stack, p.revisions) {
                        p.field_mut(field).push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
            }
            Event::End(e) => {
                stack.pop();
                if e.local_name().as_ref() == b"page" {
                    if let Some(p) = page.take() {
                        stats.pages += 1;
                        if stats.pages % 10_000 == 0 {
                            info!("{} pages read, {} articles kept", stats.pages, stats.kept);
                        }
                        if p.redirect {
                            stats.redirects += 1;
                        } else if p.ns.trim() != "0" {
                            stats.other_ns += 1;
                        } else {
                            serde_json::to_writer(&mut *out, &p.into_raw_page())?;
                            out.write_all(b"\n")?;
                            stats.kept += 1;
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    out.flush()?;
    info!(
        "dump done: {} pages, {} articles, {} redirects, {} outside namespace 0",
        stats.pages, stats.kept, stats.redirects, stats.other_ns
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const DUMP: &str = r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/">
  <siteinfo><sitename>Wikipedia</sitename></siteinfo>
  <page>
    <title>Trang ChÃ­nh</title>
    <ns>0</ns>
    <id>2</id>
    <revision>
      <id>100</id>
      <timestamp>2023-11-05T00:00:00Z</timestamp>
      <contributor><username>A</username><id>9</id></contributor>
      <text bytes="40">Xin &lt;ref&gt;chào&lt;/ref&gt; [[Thể loại:Thử]]</text>
    </revision>
  </page>
  <page>
    <title>Hà Nội cũ</title>
    <ns>0</ns>
    <id>3</id>
    <redirect title="Hà Nội" />
    <revision><id>101</id><timestamp>2020-01-01T00:00:00Z</timestamp><text>#REDIRECT [[Hà Nội]]</text></revision>
  </page>
  <page>
    <title>Thảo luận:Hà Nội</title>
    <ns>1</ns>
    <id>4</id>
    <revision><id>102</id><timestamp>2020-01-01T00:00:00Z</timestamp><text>bàn</text></revision>
  </page>
</mediawiki>"#;

    #[test]
    fn keeps_only_articles() {
        let mut out = vec![];
        let stats = extract(Cursor::new(DUMP), &mut out).unwrap();
        assert_eq!(stats, DumpStats { pages: 3, kept: 1, redirects: 1, other_ns: 1 });

        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);
        let page: RawPage = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(page.page_id, Some(Value::String("2".into())));
        assert_eq!(page.title.as_deref(), Some("Trang Chính"));
        assert_eq!(page.timestamp.as_deref(), Some("2023-11-05T00:00:00Z"));
        assert_eq!(page.wikitext, "Xin <ref>chào</ref> [[Thể loại:Thử]]");
    }

    #[test]
    fn mojibake_only_fixed_when_it_round_trips() {
        assert_eq!(fix_mojibake("Trang Ch\u{c3}\u{ad}nh"), "Trang Chính");
        assert_eq!(fix_mojibake("Hà Nội"), "Hà Nội");
        // 'ộ' is above U+00FF, so this is not latin-1 mojibake
        assert_eq!(fix_mojibake("Ã Nội"), "Ã Nội");
    }
}
