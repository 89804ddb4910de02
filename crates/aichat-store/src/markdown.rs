//! Markdown to plain text, for reading answers aloud.
//!
//! Uses comrak for CommonMark parsing; only literal text survives. Inline
//! and block HTML is dropped.

use comrak::nodes::{AstNode, NodeValue};
use comrak::{Arena, Options, parse_document};

pub fn plain_text(markdown: &str) -> String {
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &Options::default());

    let mut out = String::new();
    collect(root, &mut out);

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect<'a>(node: &'a AstNode<'a>, out: &mut String) {
    let block = {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::Text(text) => out.push_str(text),
            NodeValue::Code(code) => out.push_str(&code.literal),
            NodeValue::CodeBlock(block) => out.push_str(&block.literal),
            NodeValue::SoftBreak => out.push(' '),
            NodeValue::LineBreak => out.push('\n'),
            _ => {}
        }
        matches!(
            data.value,
            NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::CodeBlock(_)
        )
    };

    for child in node.children() {
        collect(child, out);
    }

    if block {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_emphasis_and_links() {
        let text = plain_text("**Hello** _there_, see [the docs](https://example.com).");
        assert_eq!(text, "Hello there, see the docs.");
    }

    #[test]
    fn keeps_paragraphs_and_list_items_on_lines() {
        let text = plain_text("# Plan\n\nFirst paragraph\ncontinues.\n\n- one\n- two\n");
        assert_eq!(text, "Plan\nFirst paragraph continues.\none\ntwo");
    }

    #[test]
    fn keeps_code_literals() {
        let text = plain_text("Run `cargo fmt` then:\n\n```\nmake\n```\n");
        assert_eq!(text, "Run cargo fmt then:\nmake");
    }

    #[test]
    fn drops_html() {
        assert_eq!(plain_text("a <b>bold</b> move"), "a bold move");
    }

    #[test]
    fn empty_input() {
        assert_eq!(plain_text(""), "");
    }
}
