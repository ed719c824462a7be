//! Neutralizing protocol-looking text where it must not be interpreted.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{TagKind, LOOKALIKE_GT, LOOKALIKE_LT};

fn tag_name_alternation() -> String {
    TagKind::ALL
        .iter()
        .map(|kind| regex::escape(kind.name()))
        .collect::<Vec<_>>()
        .join("|")
}

static REASONING_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<(/?)({}|think)\b", tag_name_alternation()))
        .expect("reasoning tag regex must compile")
});

static TAG_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<({})(?:[\s/>]|\z)", tag_name_alternation()))
        .expect("tag-open regex must compile")
});

static TAG_CLOSE_RE: LazyLock<HashMap<TagKind, Regex>> = LazyLock::new(|| {
    TagKind::ALL
        .iter()
        .map(|kind| {
            let regex = Regex::new(&format!(r"(?i)</{}\s*>", regex::escape(kind.name())))
                .expect("tag-close regex must compile");
            (*kind, regex)
        })
        .collect()
});

/// Rewrite protocol tag openers and closers in reasoning text.
///
/// `<write` becomes `＜write`, `</think` becomes `＜/think` and so on, so
/// thinking output can neither issue commands nor close its own block.
pub fn escape_protocol_tags(text: &str) -> String {
    let replacement = format!("{LOOKALIKE_LT}${{1}}${{2}}");
    REASONING_TAG_RE
        .replace_all(text, replacement.as_str())
        .into_owned()
}

/// Rewrite `<` and `>` inside double-quoted attribute values of protocol tags.
///
/// Runs a small scanner (outside tag / inside tag / inside attribute value /
/// inside body). Tag bodies and surrounding prose are copied verbatim, and
/// re-running the pass on its own output is a no-op.
pub fn clean_attribute_values(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(caps) = TAG_OPEN_RE.captures(rest) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let Ok(kind) = name.as_str().parse::<TagKind>() else {
            break;
        };
        debug_assert_eq!(whole.start(), name.start() - 1);

        out.push_str(&rest[..name.end()]);
        rest = &rest[name.end()..];

        let mut in_value = false;
        let mut previous = '\0';
        let mut tag_end = None;
        for (index, ch) in rest.char_indices() {
            if in_value {
                match ch {
                    '"' => {
                        in_value = false;
                        out.push(ch);
                    }
                    '<' => out.push(LOOKALIKE_LT),
                    '>' => out.push(LOOKALIKE_GT),
                    _ => out.push(ch),
                }
            } else {
                out.push(ch);
                match ch {
                    '"' => in_value = true,
                    '>' => {
                        tag_end = Some((index + ch.len_utf8(), previous == '/'));
                        break;
                    }
                    _ => {}
                }
            }
            previous = ch;
        }

        let Some((consumed, self_closing)) = tag_end else {
            return out;
        };
        rest = &rest[consumed..];

        if kind.requires_body() && !self_closing {
            match TAG_CLOSE_RE[&kind].find(rest) {
                Some(close) => {
                    out.push_str(&rest[..close.end()]);
                    rest = &rest[close.end()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replaces_lt_and_gt_in_write_attributes() {
        let input = r#"<write path="src/file.tsx" description="Testing <a> tags.">content</write>"#;
        let expected = "<write path=\"src/file.tsx\" description=\"Testing ＜a＞ tags.\">content</write>";
        assert_eq!(clean_attribute_values(input), expected);
    }

    #[test]
    fn handles_multiple_attributes_and_nested_tags() {
        let input = r#"<write path="src/<component>.tsx" description="Testing <div> and <span> tags.">content</write>"#;
        let expected = "<write path=\"src/＜component＞.tsx\" description=\"Testing ＜div＞ and ＜span＞ tags.\">content</write>";
        assert_eq!(clean_attribute_values(input), expected);
    }

    #[test]
    fn handles_rename_and_delete_tags() {
        assert_eq!(
            clean_attribute_values(r#"<rename from="src/<old>.tsx" to="src/<new>.tsx"></rename>"#),
            "<rename from=\"src/＜old＞.tsx\" to=\"src/＜new＞.tsx\"></rename>"
        );
        assert_eq!(
            clean_attribute_values(r#"<delete path="src/<component>.tsx"></delete>"#),
            "<delete path=\"src/＜component＞.tsx\"></delete>"
        );
    }

    #[test]
    fn leaves_prose_and_bodies_untouched() {
        let input = r#"Some text with <regular> HTML. <write path="test.tsx" description="With <nested> tags."><div class="x">hi</div></write> More <html> here."#;
        let expected = "Some text with <regular> HTML. <write path=\"test.tsx\" description=\"With ＜nested＞ tags.\"><div class=\"x\">hi</div></write> More <html> here.";
        assert_eq!(clean_attribute_values(input), expected);
    }

    #[test]
    fn leaves_plain_attributes_alone() {
        let input = r#"<write path="src/file.tsx" description="Normal description">content</write>"#;
        assert_eq!(clean_attribute_values(input), input);
        let bare = r#"<write path="src/file.tsx">content</write>"#;
        assert_eq!(clean_attribute_values(bare), bare);
    }

    #[test]
    fn cleans_a_partially_streamed_opening_tag() {
        let partial = r#"intro <write path="a.ts" description="uses <b"#;
        assert_eq!(
            clean_attribute_values(partial),
            "intro <write path=\"a.ts\" description=\"uses ＜b"
        );
    }

    #[test]
    fn cleaning_is_idempotent() {
        let inputs = [
            r#"<write path="a<b>.ts" description="x > y">body <write path="<z>"></write> tail"#,
            r#"<delete path="<x>"/> <problem-report summary="1 <problem>"></problem-report>"#,
            r#"unterminated <rename from="a"#,
            "",
        ];
        for input in inputs {
            let once = clean_attribute_values(input);
            assert_eq!(clean_attribute_values(&once), once);
        }
    }

    #[test]
    fn escapes_protocol_tags_in_reasoning() {
        let input = "I should use <write path=\"a.ts\"> and </write>, then </think> <Delete x>";
        let expected = "I should use ＜write path=\"a.ts\"> and ＜/write>, then ＜/think> ＜Delete x>";
        assert_eq!(escape_protocol_tags(input), expected);
        assert_eq!(escape_protocol_tags("a <div> b"), "a <div> b");
    }

    #[test]
    fn reasoning_escape_is_idempotent() {
        let input = "<write><rename></rename><chat-summary><think>";
        let once = escape_protocol_tags(input);
        assert_eq!(escape_protocol_tags(&once), once);
    }
}
