//! Tag-level scanner for HTML directory listings.

use std::collections::HashSet;

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, trace};

use super::{DirectoryListing, LinkEntry};

/// Transient state while walking the tag stream.
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    /// Between a `<table>` start tag and the next `</table>` end tag
    pub inside_table: bool,
    /// Raw href values already recorded
    pub seen: HashSet<String>,
}

impl ScanState {
    fn start_tag(&mut self, tag: &BytesStart<'_>, reader: &Reader<&[u8]>, out: &mut Vec<LinkEntry>) {
        let name = tag.local_name();
        let name = name.as_ref();

        if !self.inside_table && name.eq_ignore_ascii_case(b"table") {
            self.inside_table = true;
        }

        if !self.inside_table || !name.eq_ignore_ascii_case(b"a") {
            return;
        }

        let Some(href) = href_of(tag, reader) else {
            return;
        };

        if is_out_of_listing(&href) || !self.seen.insert(href.clone()) {
            return;
        }

        trace!(href = %href, "Listing entry");
        out.push(LinkEntry::from_href(href));
    }

    fn end_tag(&mut self, name: &[u8]) {
        if self.inside_table && name.eq_ignore_ascii_case(b"table") {
            self.inside_table = false;
        }
    }
}

/// Absolute paths, scheme-qualified URLs and mail links never name a listed file.
fn is_out_of_listing(href: &str) -> bool {
    href.starts_with('/') || href.contains("://") || href.starts_with("mailto:")
}

fn href_of(tag: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Option<String> {
    tag.html_attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref().eq_ignore_ascii_case(b"href"))
        .map(|attr| {
            attr.decode_and_unescape_value_with(reader.decoder(), resolve_html5_entity)
                .map(|v| v.into_owned())
                // Unknown entities (`&bogus;`) are kept verbatim
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
        })
        .filter(|href| !href.is_empty())
}

/// Walk `html` and collect the anchors found inside `<table>` regions.
///
/// Markup the tokenizer rejects (`<![if !IE]>`, stray `<!`) is skipped up to
/// the next `<` and the scan resumes there with the same state.
pub(crate) fn scan(html: &str) -> DirectoryListing {
    let bytes = html.as_bytes();
    let mut state = ScanState::default();
    let mut entries = Vec::new();
    let mut offset = 0;

    while let Some(resume) = scan_from(&bytes[offset..], &mut state, &mut entries) {
        let skip_from = offset + resume + 1;
        match bytes
            .get(skip_from..)
            .and_then(|rest| rest.iter().position(|&b| b == b'<'))
        {
            Some(next) => offset = skip_from + next,
            None => break,
        }
    }

    DirectoryListing { entries }
}

/// Scan until end of input, or until a tokenizer error; returns where the
/// rejected markup starts.
fn scan_from(input: &[u8], state: &mut ScanState, entries: &mut Vec<LinkEntry>) -> Option<usize> {
    let mut reader = Reader::from_reader(input);
    {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;
    }

    let mut buf = Vec::new();

    loop {
        let event_start = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => state.start_tag(e, &reader, entries),
            Ok(Event::Empty(ref e)) => {
                // `<x/>` is a start tag immediately followed by its end tag
                state.start_tag(e, &reader, entries);
                state.end_tag(e.local_name().as_ref());
            }
            Ok(Event::End(ref e)) => state.end_tag(e.local_name().as_ref()),
            Ok(Event::Eof) => return None,
            Err(e) => {
                debug!(
                    position = event_start,
                    error = %e,
                    "Skipping malformed markup in directory listing"
                );
                return Some(event_start);
            }
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(html: &str) -> Vec<String> {
        scan(html).files().map(str::to_string).collect()
    }

    #[test]
    fn test_anchor_outside_table_is_ignored() {
        assert!(files(r#"<html><body><a href="a.txt">a</a></body></html>"#).is_empty());
    }

    #[test]
    fn test_unquoted_and_uppercase_attributes() {
        let html = "<TABLE><TR><TD><A HREF=setup.exe>setup</A></TD></TR></TABLE>";
        assert_eq!(files(html), vec!["setup.exe"]);
    }

    #[test]
    fn test_void_elements_do_not_break_scan() {
        let html = r#"<!DOCTYPE html><table><tr><td><img src="i.gif"><br></td>
            <td><a href="x.msi">x</a></td></tr><hr></table>"#;
        assert_eq!(files(html), vec!["x.msi"]);
    }

    #[test]
    fn test_entity_in_href_is_decoded() {
        let html = r#"<table><a href="a&amp;b.txt">x</a></table>"#;
        assert_eq!(files(html), vec!["a&b.txt"]);
    }

    #[test]
    fn test_html_entities_in_href() {
        let html = r#"<table><a href="a&nbsp;b.txt">x</a><a href="c&bogus;d.txt">y</a></table>"#;
        assert_eq!(files(html), vec!["a\u{a0}b.txt", "c&bogus;d.txt"]);
    }

    #[test]
    fn test_conditional_comments_before_table() {
        let html = concat!(
            "<!--[if IE]><p>old</p><![endif]-->",
            "<![if !IE]><p>x</p><![endif]>",
            r#"<table><a href="x.exe">x</a></table>"#
        );
        assert_eq!(files(html), vec!["x.exe"]);
    }

    #[test]
    fn test_malformed_markup_inside_table_keeps_state() {
        let html = r#"<table><a href="a.exe">a</a><!bogus <a href="b.exe">b</a></table><a href="c.exe">c</a>"#;
        assert_eq!(files(html), vec!["a.exe", "b.exe"]);
    }

    #[test]
    fn test_truncated_markup_at_end() {
        let html = r#"<table><a href="a.exe">a</a><![if"#;
        assert_eq!(files(html), vec!["a.exe"]);
    }

    #[test]
    fn test_self_closing_table_opens_and_closes() {
        let html = r#"<table/><a href="late.txt">late</a>"#;
        assert!(files(html).is_empty());
    }

    #[test]
    fn test_empty_href_is_skipped() {
        let html = r#"<table><a href="">none</a><a name="anchor">n</a><a href="b.txt">b</a></table>"#;
        assert_eq!(files(html), vec!["b.txt"]);
    }

    #[test]
    fn test_scan_state_dedups_raw_href() {
        let html = r#"<table><a href="sub/">s</a><a href="sub/">s</a><a href="sub">s</a></table>"#;
        let listing = scan(html);
        assert_eq!(listing.folders().collect::<Vec<_>>(), vec!["sub"]);
        assert_eq!(listing.files().collect::<Vec<_>>(), vec!["sub"]);
    }
}
