use std::sync::LazyLock;

use pulldown_cmark::{Options, Parser, html};
use regex::{Captures, Regex};
use url::Url;

static MARKDOWN_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<a[^>]*href=")([^"]+\.md)("[^>]*>)"#).expect("markdown href pattern")
});

pub fn render_markdown_to_html(md: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(md, options);
    let mut html_out = String::new();
    html::push_html(&mut html_out, parser);
    html_out
}

/// Points links at sibling `.md` documents to their rendered output.
///
/// Absolute URLs and hrefs that fail to parse are left alone.
pub fn rewrite_markdown_links(html: &str, pretty_urls: bool) -> String {
    MARKDOWN_HREF
        .replace_all(html, |caps: &Captures<'_>| {
            let href = &caps[2];
            if !is_relative_href(href) {
                return caps[0].to_string();
            }
            let stem = href.strip_suffix(".md").unwrap_or(href);
            let suffix = if pretty_urls { "" } else { ".html" };
            format!("{}{stem}{suffix}{}", &caps[1], &caps[3])
        })
        .into_owned()
}

fn is_relative_href(href: &str) -> bool {
    matches!(
        Url::parse(href),
        Err(url::ParseError::RelativeUrlWithoutBase)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_tables() {
        let html = render_markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn rewrites_relative_links() {
        let html = render_markdown_to_html("[next](next.md) and [deep](../blog/post.md)");
        let out = rewrite_markdown_links(&html, false);
        assert!(out.contains(r#"<a href="next.html">"#));
        assert!(out.contains(r#"<a href="../blog/post.html">"#));
        assert!(!out.contains(".md\""));
    }

    #[test]
    fn pretty_links_drop_the_extension() {
        let out = rewrite_markdown_links(r#"<a href="about.md">About</a>"#, true);
        assert_eq!(out, r#"<a href="about">About</a>"#);
    }

    #[test]
    fn absolute_links_are_untouched() {
        let input = r#"<p><a href="http://example.com/x.md">x</a></p>"#;
        assert_eq!(rewrite_markdown_links(input, false), input);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let once = rewrite_markdown_links(r#"<a href="a.md">a</a> <a href="b.md">b</a>"#, false);
        let twice = rewrite_markdown_links(&once, false);
        assert_eq!(once, r#"<a href="a.html">a</a> <a href="b.html">b</a>"#);
        assert_eq!(twice, once);
    }

    #[test]
    fn extra_attributes_are_kept() {
        let out = rewrite_markdown_links(r#"<a class="x" href="a.md" title="t">a</a>"#, false);
        assert_eq!(out, r#"<a class="x" href="a.html" title="t">a</a>"#);
    }
}
