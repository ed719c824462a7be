//! Rendering protocol blocks back into text and stripping blocks from it.

use std::sync::LazyLock;

use regex::Regex;

use super::tags::tag_matches;
use super::TagKind;
use crate::types::{Problem, ProblemReport};

static THINKING_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("thinking block regex must compile")
});

static PROBLEM_REPORT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<problem-report[^>]*>.*?</problem-report\s*>")
        .expect("problem-report block regex must compile")
});

static PROTOCOL_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names = TagKind::ALL
        .iter()
        .map(|kind| regex::escape(kind.name()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?is)<({names})\b[^>]*>.*?</({names})\s*>"))
        .expect("protocol block regex must compile")
});

/// Entity-escape `&`, `<`, `>` and `"`.
pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_xml`].
pub fn unescape_xml(escaped: &str) -> String {
    escaped
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// The visible `<problem-report>` block appended during auto-fix.
pub fn render_problem_report(report: &ProblemReport) -> String {
    let entries = report
        .problems
        .iter()
        .map(|problem| {
            format!(
                r#"<problem file="{}" line="{}" column="{}" code="{}">{}</problem>"#,
                escape_xml(&problem.file),
                problem.line,
                problem.column,
                escape_xml(&problem.code),
                escape_xml(&problem.message),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<problem-report summary=\"{} problems\">\n{entries}\n</problem-report>",
        report.len()
    )
}

/// Every `<problem-report>` block in `text`, parsed back into reports.
///
/// Entries with a non-numeric `line`/`column` are kept with a zero position.
pub fn parse_problem_reports(text: &str) -> Vec<ProblemReport> {
    tag_matches(text, TagKind::ProblemReport)
        .into_iter()
        .map(|block| {
            let body = block.body.unwrap_or_default();
            let problems = tag_matches(&body, TagKind::Problem)
                .into_iter()
                .map(|entry| Problem {
                    file: unescape_xml(entry.attribute("file").unwrap_or_default()),
                    line: entry
                        .attribute("line")
                        .and_then(|line| line.parse().ok())
                        .unwrap_or_default(),
                    column: entry
                        .attribute("column")
                        .and_then(|column| column.parse().ok())
                        .unwrap_or_default(),
                    code: unescape_xml(entry.attribute("code").unwrap_or_default()),
                    message: unescape_xml(entry.body.as_deref().unwrap_or_default()),
                })
                .collect();
            ProblemReport::new(problems)
        })
        .collect()
}

/// User-turn prompt asking the model to fix `report`.
pub fn problem_fix_prompt(report: &ProblemReport) -> String {
    let total = report.len();
    let noun = if total == 1 { "problem" } else { "problems" };
    let mut prompt = format!("Fix these {total} {noun}:\n");
    for (index, problem) in report.problems.iter().enumerate() {
        prompt.push_str(&format!(
            "\n{}. {}:{}:{} - {} ({})",
            index + 1,
            problem.file,
            problem.line,
            problem.column,
            problem.message,
            problem.code,
        ));
    }
    prompt.push_str("\n\nPlease fix all problems in a concise way.");
    prompt
}

/// Drop closed `<think>` blocks, then trim.
pub fn remove_thinking_blocks(text: &str) -> String {
    THINKING_BLOCK_RE.replace_all(text, "").trim().to_string()
}

/// Drop `<problem-report>` blocks, then trim.
pub fn remove_problem_report_blocks(text: &str) -> String {
    PROBLEM_REPORT_BLOCK_RE
        .replace_all(text, "")
        .trim()
        .to_string()
}

/// Reasoning and problem-report blocks removed; what the model sees of its
/// own earlier answer.
pub fn remove_non_essential_tags(text: &str) -> String {
    remove_problem_report_blocks(&remove_thinking_blocks(text))
}

/// Drop every closed protocol block, then trim. Used for read-only history.
pub fn remove_protocol_tags(text: &str) -> String {
    PROTOCOL_BLOCK_RE.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn problem(file: &str, line: u32, message: &str) -> Problem {
        Problem {
            file: file.to_string(),
            line,
            column: 3,
            code: "2304".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn renders_problem_report_block() {
        let report = ProblemReport::new(vec![
            problem("src/a.ts", 1, "Cannot find name 'x'."),
            problem("src/<b>.ts", 7, "Type \"a\" & \"b\""),
        ]);
        let expected = "<problem-report summary=\"2 problems\">\n\
<problem file=\"src/a.ts\" line=\"1\" column=\"3\" code=\"2304\">Cannot find name 'x'.</problem>\n\
<problem file=\"src/&lt;b&gt;.ts\" line=\"7\" column=\"3\" code=\"2304\">Type &quot;a&quot; &amp; &quot;b&quot;</problem>\n\
</problem-report>";
        assert_eq!(render_problem_report(&report), expected);
    }

    #[test]
    fn rendered_reports_parse_back() {
        let report = ProblemReport::new(vec![
            problem("src/<b>.ts", 7, "a < b && c > d"),
            problem("src/c.ts", 12, "plain"),
        ]);
        let text = format!("prose {} more", render_problem_report(&report));
        assert_eq!(parse_problem_reports(&text), vec![report]);
    }

    #[test]
    fn fix_prompt_lists_every_problem() {
        let report = ProblemReport::new(vec![problem("src/a.ts", 1, "bad")]);
        assert_eq!(
            problem_fix_prompt(&report),
            "Fix these 1 problem:\n\n1. src/a.ts:1:3 - bad (2304)\n\nPlease fix all problems in a concise way."
        );
    }

    #[test]
    fn strips_non_essential_blocks() {
        let text = "<think>plan</think>Done.<write path=\"a.ts\">x</write>\n<problem-report summary=\"1 problems\">\n<problem file=\"a.ts\" line=\"1\" column=\"1\" code=\"1\">m</problem>\n</problem-report>";
        assert_eq!(
            remove_non_essential_tags(text),
            "Done.<write path=\"a.ts\">x</write>"
        );
    }

    #[test]
    fn strips_protocol_blocks_for_read_only_history() {
        let text = "Here you go <write path=\"a.ts\">x</write> and <rename from=\"a\" to=\"b\"></rename> done";
        assert_eq!(remove_protocol_tags(text), "Here you go  and  done");
    }

    #[test]
    fn xml_escaping_round_trips() {
        let raw = r#"<a href="x">&amp;</a>"#;
        assert_eq!(unescape_xml(&escape_xml(raw)), raw);
    }
}
