use std::sync::LazyLock;

use codetorch_core::AnnotationUnit;
use regex::Regex;
use serde_json::Value;

use crate::InferError;

static NUMBERED_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*[|:-]\s*(.+)$").expect("invalid numbered summary pattern")
});

/// Prefixes every line with its 1-based number, `N: code`.
pub fn number_lines(code: &str) -> String {
    code.lines()
        .enumerate()
        .map(|(index, line)| format!("{}: {}", index + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(code: &str, language_id: &str) -> String {
    format!(
        "You explain {language} code to a reader seeing it for the first time. \
Split the function below into semantic units (a declaration, a guard, a loop, a return...). \
For every unit reply with exactly one line `N | summary`, where N is the line number the unit starts on \
and summary is one short sentence. The first line (N = 1) must summarize the whole function. \
Reply with those lines only: no markdown, no code fences, no prose.\n\n{numbered}",
        language = if language_id.trim().is_empty() {
            "source"
        } else {
            language_id
        },
        numbered = number_lines(code),
    )
}

/// Turns a model reply into ordered units for `code`.
///
/// `N | summary` lines (also `N: summary`, `N - summary`) are tried first, then a
/// JSON array of `{ "line": N, "summary": "..." }`. A reply with no usable unit
/// is an [`InferError::InvalidResponse`].
pub fn parse_units(response: &str, code: &str) -> Result<Vec<AnnotationUnit>, InferError> {
    let mut summaries = parse_numbered_lines(response);
    if summaries.is_empty() {
        summaries = parse_json_units(response);
    }

    let units = units_from_summaries(code, summaries);
    if units.is_empty() {
        return Err(InferError::InvalidResponse(format!(
            "no line summaries in model reply: {}",
            excerpt(response)
        )));
    }
    Ok(units)
}

fn excerpt(response: &str) -> String {
    const LIMIT: usize = 80;
    let trimmed = response.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

/// Sorts by line, keeps the first summary per line, drops lines outside `code`
/// and attaches each unit's chunk: its line up to the line before the next unit.
pub fn units_from_summaries(code: &str, mut summaries: Vec<(usize, String)>) -> Vec<AnnotationUnit> {
    let lines = code.lines().collect::<Vec<_>>();

    summaries.retain(|(line, summary)| (1..=lines.len()).contains(line) && !summary.is_empty());
    summaries.sort_by_key(|(line, _)| *line);
    summaries.dedup_by_key(|(line, _)| *line);

    let starts = summaries.iter().map(|(line, _)| *line).collect::<Vec<_>>();
    summaries
        .into_iter()
        .enumerate()
        .map(|(index, (line, summary))| {
            let end = starts.get(index + 1).map_or(lines.len(), |next| next - 1);
            let chunk = lines[line - 1..end].join("\n");
            AnnotationUnit::new(line, chunk, summary)
        })
        .collect()
}

fn parse_numbered_lines(response: &str) -> Vec<(usize, String)> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let captures = NUMBERED_SUMMARY.captures(line)?;
            let number = captures.get(1)?.as_str().parse::<usize>().ok()?;
            let summary = captures.get(2)?.as_str().trim().to_owned();
            Some((number, summary))
        })
        .collect()
}

fn parse_json_units(response: &str) -> Vec<(usize, String)> {
    let Ok(value) = serde_json::from_str::<Value>(&strip_code_fence(response)) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let line = item.get("line").and_then(Value::as_u64)?;
            let summary = item.get("summary").and_then(Value::as_str)?;
            Some((line as usize, summary.trim().to_owned()))
        })
        .collect()
}

pub(crate) fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();

    if !trimmed.starts_with("```") {
        return trimmed.to_owned();
    }

    let mut lines = trimmed.lines();
    let _fence_line = lines.next();

    let mut body: Vec<&str> = lines.collect();
    if body.last().is_some_and(|line| line.trim() == "```") {
        body.pop();
    }

    body.join("\n").trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO: &str = "function foo() {\n  const x = 1;\n  return x;\n}\n";

    #[test]
    fn prompt_numbers_every_line() {
        let prompt = build_prompt(FOO, "typescript");
        assert!(prompt.contains("typescript"));
        assert!(prompt.ends_with("1: function foo() {\n2:   const x = 1;\n3:   return x;\n4: }"));
    }

    #[test]
    fn parses_numbered_lines_with_any_separator() {
        let response = "1 | declares foo\n\n2: binds x\nnoise\n3 - returns x\n";

        let units = parse_units(response, FOO).expect("units");
        let summaries = units
            .iter()
            .map(|unit| (unit.line, unit.summary.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            summaries,
            vec![(1, "declares foo"), (2, "binds x"), (3, "returns x")]
        );
    }

    #[test]
    fn falls_back_to_fenced_json_array() {
        let response = "```json\n[{\"line\": 3, \"summary\": \" returns x \"}, {\"line\": 1, \"summary\": \"declares foo\"}, {\"line\": \"2\"}]\n```";

        let units = parse_units(response, FOO).expect("units");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].line, 1);
        assert_eq!(units[1].summary, "returns x");
    }

    #[test]
    fn unparseable_response_is_an_invalid_response() {
        let err = parse_units("I cannot help with that.", FOO).expect_err("prose reply");
        assert!(matches!(err, InferError::InvalidResponse(message) if message.contains("I cannot help")));

        let out_of_range = parse_units("7 | after the function", FOO).expect_err("no line in range");
        assert!(matches!(out_of_range, InferError::InvalidResponse(_)));
    }

    #[test]
    fn chunks_span_to_the_next_unit_and_bad_lines_are_dropped() {
        let units = units_from_summaries(
            FOO,
            vec![
                (3, "returns".to_owned()),
                (1, "declares".to_owned()),
                (1, "duplicate".to_owned()),
                (0, "before the function".to_owned()),
                (9, "after the function".to_owned()),
            ],
        );

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].summary, "declares");
        assert_eq!(units[0].chunk_code, "function foo() {\n  const x = 1;");
        assert_eq!(units[1].chunk_code, "  return x;\n}");
    }
}
