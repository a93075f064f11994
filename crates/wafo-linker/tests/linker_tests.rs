//! Integration tests for the dictionary linker.
//!
//! Tests the full link pass over a small core source:
//! - string and dictionary layout, markers, table size and elem slots
//! - annotation evaluation
//! - idempotence and check mode
//! - word insertion
//! - failure modes

use wafo_expr::ExprError;
use wafo_linker::{
    link, preprocess, LinkError, LinkMode, LinkOptions, LinkOutput, LinkReport, PreprocessOptions,
};
use wafo_types::{DictionaryEntry, Flags, SourceFile};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const CORE: &str = r#";; DATA_SPACE_BASE := 0x200
(module
  (table (export "table") 0x1 funcref)
  (global $here (mut i32) (i32.const 0x0))
  (global $latest (mut i32) (i32.const 0x0))
  (global $nextTableIndex (mut i32) (i32.const 0x0))

  (data (i32.const 0x0) "\0a" "redefined ")
  (data (i32.const 0x0) "\02" "ok")

  (func $dup (param $tos i32) (result i32)
    (local.get $tos))
  (data (i32.const 0x0) "\00\00\00\00" "\03" "DUP" "\00\00\00\00")
  (elem (i32.const 0x0) $dup)

  (func $swap (param $tos i32) (result i32)
    (local.get $tos))
  (data (i32.const 0x0) "\00\00\00\00" "\04" "SWAP   " "\00\00\00\00")
  (elem (i32.const 0x0) $swap)

  (func $yyy (param $tos i32) (result i32)
    (drop (i32.const 0x0 (; = body(DUP) ;)))
    (local.get $tos))
  (data (i32.const 0x0) "\00\00\00\00" "\43" (; F_DATA ;) "YYY" "\00\00\00\00" "\00\00\00\00" (; = pack(str("ok")) ;))
  (elem (i32.const 0x0) $yyy)
)
"#;

fn source(text: &str) -> SourceFile {
    SourceFile::new("core.wat", text)
}

fn link_default(text: &str) -> LinkOutput {
    link(&source(text), &LinkOptions::default()).expect("link failed")
}

fn link_with(text: &str, options: LinkOptions) -> Result<LinkOutput, LinkError> {
    link(&source(text), &options)
}

fn entry<'a>(output: &'a LinkOutput, name: &str) -> &'a DictionaryEntry {
    output
        .entries
        .iter()
        .find(|e| e.name == name.as_bytes())
        .unwrap_or_else(|| panic!("no entry {name}"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Layout
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_strings_laid_out_from_base() {
    let out = link_default(CORE);
    assert_eq!(out.strings[0].offset, 0x200);
    assert_eq!(out.strings[1].offset, 0x20b);
    assert!(out
        .text
        .contains(r#"  (data (i32.const 0x20b) "\02" "ok")"#));
}

#[test]
fn test_entries_and_markers() {
    let out = link_default(CORE);
    assert_eq!(entry(&out, "DUP").offset, 0x210);
    assert_eq!(entry(&out, "SWAP").offset, 0x21c);
    assert_eq!(entry(&out, "YYY").offset, 0x22c);
    assert_eq!(entry(&out, "DUP").index, 0x10);
    assert_eq!(entry(&out, "SWAP").index, 0x11);
    assert_eq!(entry(&out, "YYY").index, 0x12);
    assert!(entry(&out, "YYY").flags.contains(Flags::DATA));

    assert_eq!(out.markers.here, 0x23c);
    assert_eq!(out.markers.latest, 0x22c);
    assert_eq!(out.markers.next_table_index, 0x13);
}

#[test]
fn test_layout_invariant_between_consecutive_entries() {
    let out = link_default(CORE);
    for pair in out.entries.windows(2) {
        assert_eq!(pair[1].offset, pair[0].offset + pair[0].size());
        assert_eq!(pair[1].prev, pair[0].offset);
        assert_eq!(pair[0].offset % 4, 0);
    }
}

#[test]
fn test_list_integrity_from_latest() {
    let out = link_default(CORE);
    let mut visited = 0;
    let mut at = out.markers.latest;
    while at != 0 {
        let e = out
            .entries
            .iter()
            .find(|e| e.offset == at)
            .expect("prev points at an entry");
        visited += 1;
        at = e.prev;
    }
    assert_eq!(visited, out.entries.len());
}

#[test]
fn test_serialized_entry_lines() {
    let out = link_default(CORE);
    assert!(out.text.contains(
        r#"  (data (i32.const 0x21c) "\10\02\00\00" "\04" "SWAP   " "\11\00\00\00")"#
    ));
    assert!(out.text.contains(
        r#"  (data (i32.const 0x22c) "\1c\02\00\00" "\43" (; F_DATA ;) "YYY" "\12\00\00\00" "\0b\02\00\00" (; = pack(str("ok")) ;))"#
    ));
}

#[test]
fn test_annotations_markers_table_and_elems() {
    let out = link_default(CORE);
    assert!(out.text.contains("(drop (i32.const 0x218 (; = body(DUP) ;)))"));
    assert!(out.text.contains(r#"(table (export "table") 0x13 funcref)"#));
    assert!(out.text.contains("(global $here (mut i32) (i32.const 0x23c))"));
    assert!(out.text.contains("(global $latest (mut i32) (i32.const 0x22c))"));
    assert!(out
        .text
        .contains("(global $nextTableIndex (mut i32) (i32.const 0x13))"));
    assert!(out.text.contains("  (elem (i32.const 0x10) $dup)"));
    assert!(out.text.contains("  (elem (i32.const 0x11) $swap)"));
    assert!(out.text.contains("  (elem (i32.const 0x12) $yyy)"));
}

#[test]
fn test_code_refs_recorded() {
    let out = link_default(CORE);
    assert_eq!(entry(&out, "SWAP").code_ref.as_deref(), Some("$swap"));
}

#[test]
fn test_fixed_segment_offset_follows_constant() {
    let text = CORE.replace(
        "(module\n",
        "(module\n  ;; MODULE_HEADER_BASE := 0x1000\n  (data (i32.const 0x0 (; = MODULE_HEADER_BASE ;)) \"\\00\\61\\73\\6d\")\n",
    );
    let out = link_default(&text);
    assert_eq!(out.entries.len(), 3);
    assert!(out
        .text
        .contains(r#"(data (i32.const 0x1000 (; = MODULE_HEADER_BASE ;)) "\00\61\73\6d")"#));
}

// ══════════════════════════════════════════════════════════════════════════════
// Idempotence & check mode
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_idempotent() {
    let once = link_default(CORE);
    let twice = link_default(&once.text);
    assert_eq!(once.text, twice.text);
    assert_eq!(once.markers, twice.markers);
}

#[test]
fn test_check_mode_accepts_linked_source() {
    let linked = link_default(CORE).text;
    let checked = link_with(
        &linked,
        LinkOptions {
            mode: LinkMode::Check,
            ..LinkOptions::default()
        },
    )
    .expect("linked source is consistent");
    assert_eq!(checked.text, linked);
}

fn check(text: &str) -> Result<LinkOutput, LinkError> {
    link_with(
        text,
        LinkOptions {
            mode: LinkMode::Check,
            ..LinkOptions::default()
        },
    )
}

#[test]
fn test_integer_annotation_on_data_field_stays_packed() {
    let text = CORE.replace(r#"(; = pack(str("ok")) ;)"#, r#"(; = str("ok") ;)"#);
    let once = link_default(&text);
    assert!(once
        .text
        .contains(r#""YYY" "\12\00\00\00" "\0b\02\00\00" (; = str("ok") ;))"#));
    let twice = link_default(&once.text);
    assert_eq!(once.text, twice.text);
    check(&once.text).expect("relinked source is consistent");
}

#[test]
fn test_negative_annotation_packs_twos_complement() {
    let text = CORE.replace(r#"(; = pack(str("ok")) ;)"#, "(; = -1 ;)");
    let out = link_default(&text);
    assert_eq!(entry(&out, "YYY").data.as_deref(), Some(r"\ff\ff\ff\ff"));
    assert!(out.text.contains(r#""\ff\ff\ff\ff" (; = -1 ;))"#));
    assert_eq!(link_default(&out.text).text, out.text);
}

#[test]
fn test_check_mode_accepts_any_spelling_of_annotated_literal() {
    let linked = link_default(CORE).text;
    let decimal = linked.replace("0x218 (; = body(DUP) ;)", "536 (; = body(DUP) ;)");
    assert_ne!(decimal, linked);
    let checked = check(&decimal).expect("decimal literal has the annotated value");
    assert_eq!(checked.text, decimal);
}

#[test]
fn test_crlf_line_endings_preserved() {
    let crlf = CORE.replace('\n', "\r\n");
    let out = link_default(&crlf);
    assert_eq!(out.text, link_default(CORE).text.replace('\n', "\r\n"));
    check(&out.text).expect("CRLF source is consistent");
}

#[test]
fn test_check_mode_reports_stale_annotation() {
    let linked = link_default(CORE).text;
    let stale = linked.replace("0x218 (; = body(DUP) ;)", "0x999 (; = body(DUP) ;)");
    let err = link_with(
        &stale,
        LinkOptions {
            mode: LinkMode::Check,
            ..LinkOptions::default()
        },
    )
    .unwrap_err();
    match err {
        LinkError::Consistency {
            expected, found, ..
        } => {
            assert_eq!(expected, "0x218");
            assert_eq!(found, "0x999");
        }
        other => panic!("expected consistency error, got {other:?}"),
    }
}

#[test]
fn test_check_mode_reports_stale_layout() {
    let err = link_with(
        CORE,
        LinkOptions {
            mode: LinkMode::Check,
            ..LinkOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, LinkError::Consistency { .. }), "{err:?}");
}

// ══════════════════════════════════════════════════════════════════════════════
// Insertion
// ══════════════════════════════════════════════════════════════════════════════

fn with_new_entry(name: &str) -> LinkOptions {
    LinkOptions {
        add_entry: Some(name.to_string()),
        ..LinkOptions::default()
    }
}

#[test]
fn test_insert_after_last_entry() {
    let before = link_default(CORE);
    let after = link_with(&before.text, with_new_entry("ZZZ")).unwrap();

    let zzz = entry(&after, "ZZZ");
    assert_eq!(zzz.prev, before.markers.latest);
    assert_eq!(zzz.index, before.markers.next_table_index);
    assert_eq!(after.markers.next_table_index, before.markers.next_table_index + 1);
    assert_eq!(after.markers.latest, zzz.offset);
    assert_eq!(after.markers.here, before.markers.here + 12);

    let snippet = after.inserted.expect("snippet");
    assert_eq!(snippet.func_stub, "  (func $ZZZ (param $tos i32) (result i32))");
    assert_eq!(
        snippet.data_line,
        r#"  (data (i32.const 0x23c) "\2c\02\00\00" "\03" "ZZZ" "\13\00\00\00")"#
    );
    assert_eq!(snippet.elem_line, "  (elem (i32.const 0x13) $ZZZ)");
}

#[test]
fn test_insert_in_sorted_position() {
    let out = link_with(CORE, with_new_entry("EMIT")).unwrap();
    let names: Vec<_> = out.entries.iter().map(|e| e.name_lossy().into_owned()).collect();
    assert_eq!(names, ["DUP", "EMIT", "SWAP", "YYY"]);

    // EMIT takes the slot after DUP; SWAP moves along.
    assert_eq!(entry(&out, "EMIT").index, 0x11);
    assert_eq!(entry(&out, "SWAP").index, 0x12);
    assert_eq!(entry(&out, "SWAP").prev, entry(&out, "EMIT").offset);
    assert!(out.text.contains("  (elem (i32.const 0x12) $swap)"));

    // The new word is not spliced into the text.
    assert!(!out.text.contains("EMIT"));
}

#[test]
fn test_insert_name_too_long() {
    let err = link_with(CORE, with_new_entry(&"W".repeat(32))).unwrap_err();
    assert!(matches!(err, LinkError::Format { .. }), "{err:?}");
}

// ══════════════════════════════════════════════════════════════════════════════
// Failures
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unknown_symbol_is_resolution_error() {
    let text = CORE.replace("(local.get $tos))\n  (data (i32.const 0x0) \"\\00\\00\\00\\00\" \"\\03\"", "(i32.const 0x0 (; = NOPE ;)))\n  (data (i32.const 0x0) \"\\00\\00\\00\\00\" \"\\03\"");
    assert_ne!(text, CORE);
    match link_with(&text, LinkOptions::default()).unwrap_err() {
        LinkError::Resolution { source, .. } => {
            assert_eq!(source, ExprError::UnknownSymbol("NOPE".into()))
        }
        other => panic!("expected resolution error, got {other:?}"),
    }
}

#[test]
fn test_unknown_entry_is_resolution_error() {
    let text = CORE.replace("body(DUP)", "body(ROT)");
    assert!(matches!(
        link_with(&text, LinkOptions::default()).unwrap_err(),
        LinkError::Resolution {
            source: ExprError::UnknownEntry(_),
            ..
        }
    ));
}

#[test]
fn test_malformed_annotation_is_format_error() {
    let text = CORE.replace("body(DUP)", "1 +");
    assert!(matches!(
        link_with(&text, LinkOptions::default()).unwrap_err(),
        LinkError::Format { line: Some(_), .. }
    ));
}

#[test]
fn test_missing_base_constant() {
    let text = CORE.replace(";; DATA_SPACE_BASE := 0x200", ";; OTHER := 0x200");
    assert!(matches!(
        link_with(&text, LinkOptions::default()).unwrap_err(),
        LinkError::Format { .. }
    ));
}

#[test]
fn test_overlong_name_field_in_source_is_format_error() {
    let text = CORE.replace(
        r#""\03" "DUP""#,
        r#""\03" "DUPLICATE_WORD_NAME_LONGER_THAN_31_BYTES""#,
    );
    assert_ne!(text, CORE);
    assert!(matches!(
        link_with(&text, LinkOptions::default()).unwrap_err(),
        LinkError::Format { line: Some(13), .. }
    ));
}

#[test]
fn test_unmatched_data_line() {
    let text = CORE.replace(r#""\02" "ok""#, "42");
    assert!(matches!(
        link_with(&text, LinkOptions::default()).unwrap_err(),
        LinkError::Format { line: Some(9), .. }
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Report & preprocessing
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_json_report() {
    let out = link_default(CORE);
    let json = LinkReport::from_output(&out).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["markers"]["nextTableIndex"], 0x13);
    assert_eq!(value["entries"][2]["name"], "YYY");
    assert_eq!(value["entries"][2]["flags"][0], "F_DATA");
    assert_eq!(value["strings"][1]["text"], "ok");
}

#[test]
fn test_preprocessed_constants_are_kept_in_sync() {
    let text = CORE.replace(
        "(drop (i32.const 0x0 (; = body(DUP) ;)))",
        "(drop (i32.const DATA_SPACE_BASE))",
    );
    let pre = preprocess(&text, &PreprocessOptions::default());
    assert!(pre.contains("(drop (i32.const 0x200 (; = DATA_SPACE_BASE ;)))"));

    let relinked = link_default(&pre.replace(";; DATA_SPACE_BASE := 0x200", ";; DATA_SPACE_BASE := 0x400"));
    assert!(relinked
        .text
        .contains("(drop (i32.const 0x400 (; = DATA_SPACE_BASE ;)))"));
    assert_eq!(relinked.strings[0].offset, 0x400);
}
