use actionkit_core::markers::{is_valid_marker, MarkerStripper};
use actionkit_core::{strip_markers, ActionError};

#[test]
fn strips_single_line_block_with_leading_whitespace() {
    let out = strip_markers("keep //{DEL FOO} drop //{DEL} keep2", "FOO");
    assert_eq!(out, "keep keep2");
}

#[test]
fn strips_multiline_block() {
    let input = "const a = 1;\n  //{DEL DEBUG}\n  console.log(a);\n  //{DEL}\nconst b = 2;\n";
    let out = strip_markers(input, "DEBUG");
    assert_eq!(out, "const a = 1;\nconst b = 2;\n");
}

#[test]
fn strips_every_block_of_the_marker() {
    let input = "a //{DEL X} 1 //{DEL} b //{DEL X} 2 //{DEL} c";
    assert_eq!(strip_markers(input, "X"), "a b c");
}

#[test]
fn other_markers_keep_their_content_but_lose_their_tokens() {
    let input = "a //{DEL BAR} kept //{DEL} b";
    assert_eq!(strip_markers(input, "FOO"), "a kept b");
}

#[test]
fn opener_may_carry_several_names() {
    let input = "a //{DEL PROD STAGING} gone //{DEL} b";
    assert_eq!(strip_markers(input, "STAGING"), "a b");
}

#[test]
fn content_without_markers_is_unchanged() {
    let input = "let x = 1; // plain comment\n";
    assert_eq!(strip_markers(input, "FOO"), input);
}

#[test]
fn counts_removed_blocks() {
    let stripper = MarkerStripper::new("FOO").expect("valid marker");
    let (out, removed) = stripper.strip_counted("x //{DEL FOO} 1 //{DEL}\ny //{DEL FOO} 2 //{DEL}");
    assert_eq!(removed, 2);
    assert_eq!(out, "x\ny");
    assert_eq!(stripper.marker(), "FOO");
}

#[test]
fn rejects_invalid_marker_names() {
    for bad in ["", "foo", "A-B", "A B", "Ä"] {
        assert!(!is_valid_marker(bad), "{bad:?} should be rejected");
        match MarkerStripper::new(bad) {
            Err(ActionError::InvalidMarker(name)) => assert_eq!(name, bad),
            other => panic!("expected InvalidMarker for {bad:?}, got {other:?}"),
        }
    }
    assert!(is_valid_marker("RELEASE_2"));
}

#[test]
fn marker_name_is_matched_literally() {
    // regex metacharacters in an unvalidated name must not widen the match
    let input = "a //{DEL A.B} x //{DEL} b //{DEL AXB} y //{DEL} c";
    assert_eq!(strip_markers(input, "A.B"), "a b y c");
}

#[test]
fn opener_does_not_reach_into_another_markers_block() {
    let input = "a //{DEL BAR} kept //{DEL} b //{DEL FOO} x //{DEL} c";
    assert_eq!(strip_markers(input, "FOO"), "a kept b c");
}

#[test]
fn marker_names_match_whole_words_only() {
    let input = "a //{DEL FOOBAR} long //{DEL} b //{DEL FOO} short //{DEL} c";
    assert_eq!(strip_markers(input, "FOO"), "a long b c");
    assert_eq!(strip_markers(input, "FOOBAR"), "a b short c");
    assert_eq!(strip_markers("a //{DEL X_FOO} y //{DEL} b", "FOO"), "a y b");
}
