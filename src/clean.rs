use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use anyhow::Result;
use regex::Regex;
use tracing::info;

use crate::constant::*;
use crate::misc::*;
use crate::model::{CleanedDoc, RawPage};

/// Turns raw wikitext into plain text and pulls out its `Thể loại` categories.
pub struct Cleaner {
    comment_re: Regex,
    ref_block_re: Regex,
    ref_single_re: Regex,
    tag_re: Regex,
    template_re: Regex,
    labelled_link_re: Regex,
    link_re: Regex,
    emphasis_re: Regex,
    space_re: Regex,
    category_re: Regex,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner {
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).unwrap_or_else(|e| panic!("bad pattern {pattern}: {e}"));
        Self {
            comment_re: re(r"(?s)<!--.*?-->"),
            ref_block_re: re(r"(?si)<ref.*?>.*?</ref>"),
            ref_single_re: re(r"(?i)<ref[^>/]*/?>"),
            tag_re: re(r"</?[^>]+>"),
            template_re: re(r"\{\{[^{}]*\}\}"),
            labelled_link_re: re(r"\[\[([^|\]]+)\|([^\]]+)\]\]"),
            link_re: re(r"\[\[([^\]]+)\]\]"),
            emphasis_re: re(r"'{2,}"),
            space_re: re(r"\s+"),
            category_re: re(r"(?i)\[\[\s*Thể\s*loại\s*:\s*([^\]|]+)"),
        }
    }

    pub fn clean_wikitext(&self, wikitext: &str) -> String {
        if wikitext.is_empty() {
            return String::new();
        }
        let mut text = self.comment_re.replace_all(wikitext, " ").into_owned();
        text = self.ref_block_re.replace_all(&text, " ").into_owned();
        text = self.ref_single_re.replace_all(&text, " ").into_owned();
        text = self.tag_re.replace_all(&text, " ").into_owned();

        // innermost templates first, a bounded number of levels
        for _ in 0..TEMPLATE_PASSES {
            let stripped = self.template_re.replace_all(&text, " ");
            if stripped == text.as_str() {
                break;
            }
            text = stripped.into_owned();
        }

        text = self.labelled_link_re.replace_all(&text, "${2}").into_owned();
        text = self.link_re.replace_all(&text, "${1}").into_owned();
        text = self.emphasis_re.replace_all(&text, " ").into_owned();
        self.space_re.replace_all(&text, " ").trim().to_string()
    }

    /// Sorted, deduplicated category names found in the raw wikitext.
    pub fn categories(&self, wikitext: &str) -> Vec<String> {
        self.category_re.captures_iter(wikitext)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn clean_page(&self, page: RawPage) -> CleanedDoc {
        CleanedDoc {
            categories: self.categories(&page.wikitext),
            text: self.clean_wikitext(&page.wikitext),
            page_id: page.page_id,
            title: page.title,
            timestamp: page.timestamp,
        }
    }

    /// RawPage JSON lines in, CleanedDoc JSON lines out. Unparsable lines are skipped.
    pub fn run<R: BufRead, W: Write>(&self, input: R, out: &mut W) -> Result<LineStats> {
        let mut stats = LineStats::default();
        for_each_line(input, |line| {
            stats.read += 1;
            let line = line.trim();
            if line.is_empty() {
                return Ok(());
            }
            match serde_json::from_str::<RawPage>(line) {
                Ok(page) => {
                    serde_json::to_writer(&mut *out, &self.clean_page(page))?;
                    out.write_all(b"\n")?;
                    stats.emitted += 1;
                }
                Err(e) => stats.skip("json", e),
            }
            Ok(())
        })?;
        out.flush()?;
        info!("clean done: {} read, {} written, {} skipped", stats.read, stats.emitted, stats.skipped);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn category_and_markup() {
        let cleaner = Cleaner::new();
        let raw = "[[Thể loại: Lịch sử]] Some '''bold''' text {{infobox}}";
        assert_eq!(cleaner.categories(raw), vec!["Lịch sử"]);
        let text = cleaner.clean_wikitext(raw);
        assert_eq!(text, "Thể loại: Lịch sử Some bold text");
        assert!(!text.contains("{{") && !text.contains("infobox"));
    }

    #[test]
    fn refs_comments_and_tags() {
        let cleaner = Cleaner::new();
        let raw = "A<!-- note\nmore -->B<ref name=\"x\">nguồn</ref> C<ref name=\"y\" /> <small>D</small>";
        assert_eq!(cleaner.clean_wikitext(raw), "A B C D");
    }

    #[test]
    fn nested_templates_and_links() {
        let cleaner = Cleaner::new();
        assert_eq!(cleaner.clean_wikitext("x {{a|{{b|{{c}}}}}} y"), "x y");
        assert_eq!(cleaner.clean_wikitext("[[Hà Nội|thủ đô]] và [[Huế]]"), "thủ đô và Huế");
        assert_eq!(cleaner.clean_wikitext("''nghiêng'' '''''cả hai'''''"), "nghiêng cả hai");
    }

    #[test]
    fn template_passes_are_bounded() {
        let cleaner = Cleaner::new();
        let deep = format!("{}x{}", "{{".repeat(7), "}}".repeat(7));
        assert!(cleaner.clean_wikitext(&deep).contains("{{"));
    }

    #[test]
    fn categories_dedup_sorted_case_insensitive() {
        let cleaner = Cleaner::new();
        let raw = "[[Thể loại:Toán học|*]] [[thể loại:Vật lý]] [[THỂ LOẠI : Toán học ]] [[Thể loại: ]]";
        assert_eq!(cleaner.categories(raw), vec!["Toán học", "Vật lý"]);
    }

    #[test]
    fn run_skips_bad_lines() {
        let input = concat!(
            r#"{"page_id": "1", "title": "A", "timestamp": "2024-01-02T00:00:00Z", "wikitext": "[[Thể loại:X]] xin chào"}"#, "\n",
            "not json\n",
            "\n",
            r#"{"page_id": "2", "title": "B"}"#, "\n",
        );
        let mut out = vec![];
        let stats = Cleaner::new().run(Cursor::new(input), &mut out).unwrap();
        assert_eq!((stats.read, stats.emitted, stats.skipped), (4, 2, 1));

        let docs = String::from_utf8(out).unwrap()
            .lines()
            .map(|l| serde_json::from_str::<CleanedDoc>(l).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(docs[0].categories, vec!["X"]);
        assert_eq!(docs[0].text, "Thể loại:X xin chào");
        assert_eq!(docs[1].text, "");
        assert!(docs[1].timestamp.is_none());
    }
}
