use codetorch_core::{DocumentKey, DocumentSnapshot, sort_spans};
use codetorch_parse::{FunctionDetector, default_detector};

#[test]
fn default_detector_prefers_grammar_and_falls_back_to_patterns() {
    let detector = default_detector();

    let typescript = DocumentSnapshot::new(
        DocumentKey::new("src/math.ts"),
        "typescript",
        "function foo() {\n  return 1;\n}\n\nfunction bar() {\n  return 2;\n}\n",
        false,
    );
    let spans = sort_spans(&detector.detect(&typescript).expect("typescript spans"));
    assert_eq!(
        spans
            .iter()
            .map(|span| (span.name.as_str(), span.start_line))
            .collect::<Vec<_>>(),
        vec![("foo", 0), ("bar", 4)]
    );

    let unknown = DocumentSnapshot::new(
        DocumentKey::new("notes/scratch"),
        "plaintext",
        "intro\nfunction helper(x) {\n}\n",
        true,
    );
    let spans = detector.detect(&unknown).expect("fallback spans");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "helper");
    assert_eq!(spans[0].start_line, 1);
}

#[test]
fn nested_functions_are_reported_as_separate_spans() {
    let detector = default_detector();
    let document = DocumentSnapshot::new(
        DocumentKey::new("nested.py"),
        "python",
        "def outer():\n    def inner():\n        return 1\n    return inner\n",
        false,
    );

    let spans = sort_spans(&detector.detect(&document).expect("python spans"));
    assert_eq!(
        spans
            .iter()
            .map(|span| (span.name.as_str(), span.start_line))
            .collect::<Vec<_>>(),
        vec![("outer", 0), ("inner", 1)]
    );
}
