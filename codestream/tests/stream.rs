use std::fs;
use std::path::Path;

use codestream::source::{bind_source_lines, class_template_path};
use codestream::{BlockSignature, CodeStream, CodeStreamError, StreamConfig, indent};

const RAMP: &str = "\
/*** preinitBlock ***/
int $actorSymbol(state);
/**/

/*** fireBlock ***/
$put(output, $actorSymbol(state));
/**/

/*** initBlock($init, step) ***/
$actorSymbol(state) = $init;
$actorSymbol(step) = $step;
/**/
";

fn stream(text: &str) -> CodeStream {
    CodeStream::from_text(StreamConfig::default(), "Ramp.c", text)
}

/// A stream whose nearest scope is `derived`, backed by `base`.
fn chain(derived: &str, base: &str) -> CodeStream {
    let mut stream = CodeStream::from_text(StreamConfig::default(), "Derived.c", derived);
    stream.parse_text("Base.c", base).expect("base template parses");
    stream
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[test]
fn block_bodies_are_trimmed() {
    let mut s = stream(RAMP);
    assert_eq!(
        s.get_code_block("preinitBlock", &[], false).unwrap(),
        "int $actorSymbol(state);\n"
    );
}

#[test]
fn body_without_trailing_blank_has_no_newline() {
    let mut s = stream("/*** inline ***/x + 1/**/");
    assert_eq!(s.get_code_block("inline", &[], false).unwrap(), "x + 1");
}

#[test]
fn parameters_are_substituted() {
    let mut s = stream(RAMP);
    let code = s
        .get_code_block("initBlock", &args(&["0", "2"]), false)
        .unwrap();
    assert_eq!(code, "$actorSymbol(state) = 0;\n$actorSymbol(step) = 2;\n");
}

#[test]
fn blocks_overload_on_parameter_count() {
    let mut s = stream("/*** f ***/\nzero\n/**/\n/*** f($a) ***/\none $a\n/**/\n");
    assert_eq!(s.get_code_block("f", &[], false).unwrap(), "zero\n");
    assert_eq!(s.get_code_block("f", &args(&["x"]), false).unwrap(), "one x\n");
}

#[test]
fn longest_parameter_name_wins() {
    let mut s = stream("/*** f($a, $ab) ***/\n$ab $a\n/**/\n");
    assert_eq!(s.get_code_block("f", &args(&["1", "2"]), false).unwrap(), "2 1\n");
}

#[test]
fn duplicate_signature_in_one_file_is_a_parse_error() {
    let mut s = stream("/*** f ***/\na\n/**/\n/*** f ***/\nb\n/**/\n");
    let err = s.get_code_block("f", &[], false).unwrap_err();
    match err {
        CodeStreamError::Parse { errors, .. } => {
            assert!(errors[0].message.contains("same signature: f()"));
            assert_eq!(errors[0].notes, vec!["first declared on line 1".to_string()]);
        }
        other => panic!("expected parse error, got {other}"),
    }
}

#[test]
fn missing_header_end_is_a_parse_error() {
    let mut s = stream("/*** f \nbody\n/**/\n");
    let err = s.get_code_block("f", &[], false).unwrap_err();
    assert!(err.to_string().contains("Missing code block close header"));
}

#[test]
fn unclosed_header_parameters_are_a_parse_error() {
    let mut s = stream("/*** a(x ***/\nbody\n/**/\n");
    let err = s.all_code_block_signatures().unwrap_err();
    assert!(err.to_string().contains("Missing close parenthesis in code block header"));
}

#[test]
fn header_parameters_close_at_the_matching_paren() {
    let mut s = stream("/*** a(x, y) ***/\n$x + $y\n/**/\n");
    assert_eq!(s.get_code_block("a", &args(&["1", "2"]), false).unwrap(), "1 + 2\n");
}

#[test]
fn missing_block_end_is_a_parse_error() {
    let mut s = stream("/*** f ***/\nbody\n");
    let err = s.get_code_block("f", &[], false).unwrap_err();
    assert!(err.to_string().contains("Missing close block"));
}

#[test]
fn nested_block_markers_stay_in_the_body() {
    let mut s = stream("/*** outer ***/\nA\n/*** inner ***/\nB\n/**/\nC\n/**/\n");
    let code = s.get_code_block("outer", &[], false).unwrap();
    assert_eq!(code, "A\n/*** inner ***/\nB\n/**/\nC\n");
    let names = s.all_code_block_names().unwrap();
    assert_eq!(names, vec!["outer".to_string()]);
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[test]
fn missing_block() {
    let mut s = stream(RAMP);
    assert_eq!(s.get_code_block("wrapupBlock", &[], true).unwrap(), "");
    let err = s.get_code_block("wrapupBlock", &[], false).unwrap_err();
    assert!(matches!(err, CodeStreamError::BlockNotFound { .. }));
    assert!(err.to_string().contains("\"wrapupBlock()\""));
}

#[test]
fn derived_block_overrides_base() {
    let mut s = chain("/*** fireBlock ***/\nderived();\n/**/\n", "/*** fireBlock ***/\nbase();\n/**/\n");
    assert_eq!(s.get_code_block("fireBlock", &[], false).unwrap(), "derived();\n");
}

#[test]
fn base_blocks_are_inherited() {
    let mut s = chain("/*** fireBlock ***/\nderived();\n/**/\n", "/*** wrapupBlock ***/\nbase();\n/**/\n");
    assert_eq!(s.get_code_block("wrapupBlock", &[], false).unwrap(), "base();\n");
}

#[test]
fn super_calls_the_overridden_block() {
    let mut s = chain(
        "/*** fireBlock ***/\n$super()\nderived();\n/**/\n",
        "/*** fireBlock ***/\nbase();\n/**/\n",
    );
    assert_eq!(
        s.get_code_block("fireBlock", &[], false).unwrap(),
        "base();\n\nderived();\n"
    );
}

#[test]
fn super_with_name_and_arguments() {
    let mut s = chain(
        "/*** fireBlock($x) ***/\n$super.helper($x, 7)/**/\n",
        "/*** helper($a, $b) ***/\nh($a, $b);\n/**/\n",
    );
    assert_eq!(
        s.get_code_block("fireBlock", &args(&["in"]), false).unwrap(),
        "h(in, 7);\n"
    );
}

#[test]
fn this_prefers_the_nearest_scope() {
    let mut s = chain(
        "/*** fireBlock ***/\n$this.helper()/**/\n/*** helper ***/\nderived\n/**/\n",
        "/*** helper ***/\nbase\n/**/\n",
    );
    assert_eq!(s.get_code_block("fireBlock", &[], false).unwrap(), "derived\n");
}

#[test]
fn this_from_base_does_not_see_derived_overrides() {
    let mut s = chain(
        "/*** helper ***/\nderived\n/**/\n",
        "/*** fireBlock ***/\n$this.helper()/**/\n/*** helper ***/\nbase\n/**/\n",
    );
    assert_eq!(s.get_code_block("fireBlock", &[], false).unwrap(), "base\n");
}

#[test]
fn this_calling_itself_is_an_error() {
    let mut s = stream("/*** loop ***/\n$this()\n/**/\n");
    let err = s.get_code_block("loop", &[], false).unwrap_err();
    assert!(matches!(err, CodeStreamError::RecursiveAppend { .. }));
}

#[test]
fn super_without_base_block_is_an_error() {
    let mut s = chain("/*** fireBlock ***/\n$super()\n/**/\n", "/*** other ***/\nx\n/**/\n");
    let err = s.get_code_block("fireBlock", &[], false).unwrap_err();
    assert!(matches!(err, CodeStreamError::SuperThisNotFound { .. }));
    assert!(err.to_string().contains("super"));
}

#[test]
fn unclosed_super_call_is_an_error() {
    let mut s = chain("/*** fireBlock ***/\n$super(\n/**/\n", "/*** fireBlock ***/\nx\n/**/\n");
    let err = s.get_code_block("fireBlock", &[], false).unwrap_err();
    assert!(matches!(err, CodeStreamError::IllFormattedCall { .. }));
}

#[test]
fn raw_block_is_unsubstituted() {
    let mut s = stream(RAMP);
    let signature = BlockSignature::new("initBlock", 2);
    let raw = s.get_block(&signature, None, false).unwrap();
    assert!(raw.contains("$init;"));
}

// ---------------------------------------------------------------------------
// Template arguments
// ---------------------------------------------------------------------------

#[test]
fn template_arguments_apply_file_wide() {
    let text = "<$T, N>\n/*** declare ***/\n$T buffer[$N];\n/**/\n";
    let mut s = stream(text).with_template_arguments(args(&["double", "16"]));
    assert_eq!(
        s.get_code_block("declare", &[], false).unwrap(),
        "double buffer[16];\n"
    );
}

#[test]
fn template_argument_count_must_match() {
    let text = "<$T>\n/*** declare ***/\n$T x;\n/**/\n";
    let mut s = stream(text).with_template_arguments(args(&["int", "4"]));
    let err = s.get_code_block("declare", &[], false).unwrap_err();
    assert!(matches!(err, CodeStreamError::TemplateArguments { .. }));
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[test]
fn append_with_indent() {
    let mut s = stream("/*** body ***/\na;\nb;\n/**/\n");
    s.append("{\n");
    s.append_code_block("body", &[], false, 1).unwrap();
    s.append("}\n");
    assert_eq!(s.output(), "{\n    a;\n    b;\n}\n");
}

#[test]
fn indent_levels() {
    assert_eq!(indent(0, "a\n"), "a\n");
    assert_eq!(indent(2, "a\nb"), "        a\n        b");
    assert_eq!(indent(1, ""), "");
}

#[test]
fn append_matching_blocks_in_order() {
    let mut s = stream(
        "/*** initB ***/\nB\n/**/\n/*** other ***/\nO\n/**/\n/*** initA ***/\nA\n/**/\n/*** initC($x) ***/\nC\n/**/\n",
    );
    s.append_code_blocks("init.*").unwrap();
    assert_eq!(s.output(), "A\nB\n");
}

#[test]
fn pattern_must_match_whole_name() {
    let mut s = stream("/*** initBlock ***/\nI\n/**/\n");
    s.append_code_blocks("init").unwrap();
    assert!(s.is_empty());
}

#[test]
fn invalid_pattern_is_an_error() {
    let mut s = stream(RAMP);
    assert!(matches!(
        s.append_code_blocks("(unclosed").unwrap_err(),
        CodeStreamError::Pattern(_)
    ));
}

#[test]
fn insert_into_output() {
    let mut s = CodeStream::new(StreamConfig::default());
    s.append("hello world");
    s.insert(5, ",").unwrap();
    assert_eq!(s.to_string(), "hello, world");
    assert!(matches!(
        s.insert(100, "!").unwrap_err(),
        CodeStreamError::InsertOutOfBounds { offset: 100, len: 12 }
    ));
}

#[test]
fn reparse_after_reset_replaces_sources() {
    let mut s = stream(RAMP);
    let signature = BlockSignature::new("initBlock", 2);
    for _ in 0..3 {
        s.reset();
        let (_, entry) = s.table().unwrap().lookup(&signature).unwrap();
        assert_eq!(entry.file_id, 0);
    }
    assert!(s.files().get(0).is_ok());
    assert!(s.files().get(1).is_err());
}

#[test]
fn clear_keeps_parsed_blocks() {
    let mut s = stream(RAMP);
    s.append_code_block("preinitBlock", &[], false, 0).unwrap();
    s.clear();
    assert!(s.is_empty());
    s.append_code_block("preinitBlock", &[], false, 0).unwrap();
    assert_eq!(s.take_output(), "int $actorSymbol(state);\n");
    assert!(s.is_empty());
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

#[test]
fn block_names_and_signatures() {
    let mut s = stream(RAMP);
    assert_eq!(
        s.all_code_block_names().unwrap(),
        vec!["fireBlock", "initBlock", "preinitBlock"]
    );
    let signatures: Vec<String> = s
        .all_code_block_signatures()
        .unwrap()
        .iter()
        .map(|sig| sig.to_string())
        .collect();
    assert_eq!(signatures, vec!["fireBlock()", "initBlock($, $)", "preinitBlock()"]);
}

#[test]
fn block_template_round_trips_header() {
    let mut s = stream(RAMP);
    let template = s
        .get_code_block_template(&BlockSignature::new("initBlock", 2))
        .unwrap();
    assert_eq!(
        template,
        "/*** initBlock(init, step) ***/\n$actorSymbol(state) = $init;\n$actorSymbol(step) = $step;\n/**/\n\n"
    );
    assert_eq!(
        s.get_code_block_template(&BlockSignature::new("missing", 0))
            .unwrap(),
        ""
    );
}

#[test]
fn description_lists_scopes_nearest_first() {
    let mut s = chain("/*** a ***/\nA\n/**/\n", "/*** b ***/\nB\n/**/\n");
    let description = s.description().unwrap();
    assert_eq!(
        description,
        "// scope 0: Derived.c\n/*** a ***/\nA\n/**/\n\n// scope 1: Base.c\n/*** b ***/\nB\n/**/\n\n"
    );
}

#[test]
fn header_files_from_include_block() {
    let mut s = stream("/*** includeFiles ***/\n#include <math.h>\n#include \"ramp.h\"\n/**/\n");
    let headers: Vec<String> = s.header_files().unwrap().into_iter().collect();
    assert_eq!(headers, vec!["\"ramp.h\"", "<math.h>"]);
    let mut none = stream(RAMP);
    assert!(none.header_files().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[test]
fn class_chain_reads_template_files() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "lib/Ramp.c",
        "/*** fireBlock ***/\n$super()\nramp();\n/**/\n",
    );
    write(
        dir.path(),
        "Source.c",
        "/*** fireBlock ***/\nsource();\n/**/\n",
    );

    let config = StreamConfig {
        template_root: dir.path().to_path_buf(),
        ..StreamConfig::default()
    };
    let mut s = CodeStream::for_class_chain(config, &["lib.Ramp", "lib.Missing", "Source"], false);
    assert_eq!(
        s.get_code_block("fireBlock", &[], false).unwrap(),
        "source();\n\nramp();\n"
    );
    assert_eq!(s.table().unwrap().len(), 2);
}

#[test]
fn class_chain_guards_default_blocks() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Ramp.c", "/*** fireBlock ***/\nfire();\n/**/\n");
    let config = StreamConfig {
        template_root: dir.path().to_path_buf(),
        ..StreamConfig::default()
    };
    let mut s = CodeStream::for_class_chain(config, &["Ramp"], false);

    let err = s.append_code_block("fireBlock", &[], false, 0).unwrap_err();
    assert!(matches!(err, CodeStreamError::DefaultBlock { .. }));
    assert!(err.to_string().contains("appended by default"));

    s.append_code_block("fireBlock", &[], true, 0).unwrap();
    assert_eq!(s.output(), "fire();\n");
}

#[test]
fn missing_derived_template() {
    let dir = tempfile::tempdir().unwrap();
    let config = StreamConfig {
        template_root: dir.path().to_path_buf(),
        ..StreamConfig::default()
    };
    let mut optional = CodeStream::for_class_chain(config.clone(), &["Nowhere"], true);
    assert_eq!(optional.get_code_block("fireBlock", &[], true).unwrap(), "");

    let mut required = CodeStream::for_class_chain(config, &["Nowhere"], false);
    assert!(matches!(
        required.get_code_block("fireBlock", &[], true).unwrap_err(),
        CodeStreamError::Io { .. }
    ));
}

#[test]
fn parse_file_adds_a_farther_scope() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.c", "/*** shared ***/\nfrom file\n/**/\n");
    let mut s = stream("/*** local ***/\nhere\n/**/\n");
    s.parse_file(dir.path().join("base.c"), false).unwrap();
    s.parse_file(dir.path().join("absent.c"), true).unwrap();
    assert_eq!(s.get_code_block("shared", &[], false).unwrap(), "from file\n");
    assert_eq!(s.table().unwrap().len(), 2);
    assert!(s.parse_file(dir.path().join("absent.c"), false).is_err());
}

#[test]
fn source_line_binding() {
    let config = StreamConfig::default();
    assert_eq!(
        bind_source_lines("a\nb", "f.c", &config),
        "#line 1 \"f.c\"\na\n#line 2 \"f.c\"\nb\n"
    );

    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "bound.c", "/*** f ***/\nx\n/**/\n");
    let config = StreamConfig {
        source_line_binding: true,
        ..StreamConfig::default()
    };
    let path = dir.path().join("bound.c");
    let mut s = CodeStream::from_file(config, &path, false);
    let code = s.get_code_block("f", &[], false).unwrap();
    let file = path.display();
    assert_eq!(code, format!("#line 2 \"{file}\"\nx\n#line 3 \"{file}\"\n"));
}

#[test]
fn class_names_map_to_paths() {
    let config = StreamConfig {
        template_root: "/templates".into(),
        ..StreamConfig::default()
    };
    assert_eq!(
        class_template_path(&config, "ptolemy.actor.lib.Ramp"),
        Path::new("/templates/ptolemy/actor/lib/Ramp.c")
    );
}
