use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use codestream::{CodeStream, CodeStreamError, StreamConfig};
use expander::{GenerationContext, ModelComponent, Target, TemplateParser};

use crate::config::default_component;
use crate::error_chain;

const EXTENSION: &str = ".test.cg";

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Block to resolve. Defaults to "fireBlock".
    #[serde(default = "default_block")]
    pub block: String,

    /// Arguments passed to the block.
    #[serde(default)]
    pub args: Vec<String>,

    /// Values for the template's `<...>` parameters.
    #[serde(default)]
    pub template_args: Vec<String>,

    /// Expand macros in the resolved block. When false, the block is
    /// compared as resolved.
    #[serde(default = "default_process")]
    pub process: bool,

    #[serde(default)]
    pub target: Target,

    /// Extra `${NAME}` constants.
    #[serde(default)]
    pub constants: BTreeMap<String, String>,

    /// Component macros are expanded against.
    #[serde(default)]
    pub component: Option<ModelComponent>,

    /// Expected output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Substring the error message or one of its causes must contain.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// If true, the template is expected to fail to parse.
    #[serde(default)]
    pub expect_parse_error: bool,
}

fn default_block() -> String {
    "fireBlock".to_string()
}

fn default_process() -> bool {
    true
}

/// Split a `.test.cg` file into its TOML frontmatter and template text.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let after_open = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let after_open = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))
        .unwrap_or(after_open);

    let (frontmatter, rest) = after_open
        .split_once("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;
    let template = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig = toml::from_str(frontmatter.trim_end_matches('\r'))
        .map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, template))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.trim_end_matches(EXTENSION))
                .unwrap_or("?")
        })
    }
}

/// Resolve (and unless disabled, expand) the configured block.
fn render(config: &TestConfig, path: &Path, template: &str) -> Result<String, String> {
    let mut stream = CodeStream::from_text(StreamConfig::default(), path.display().to_string(), template);
    if !config.template_args.is_empty() {
        stream = stream.with_template_arguments(config.template_args.clone());
    }

    if !config.process {
        return stream
            .get_code_block(&config.block, &config.args, false)
            .map_err(|e| error_chain(&e));
    }

    let component = config
        .component
        .clone()
        .unwrap_or_else(|| default_component(path));
    let mut context = GenerationContext::new();
    context.constants.extend(config.constants.clone());
    let mut parser = TemplateParser::new(&component, &config.target, &mut context);
    parser
        .generate_block_code(&mut stream, &config.block, &config.args)
        .map_err(|e| error_chain(&e))
}

fn check_parse_error(path: &Path, template: &str) -> Option<String> {
    let mut stream = CodeStream::from_text(StreamConfig::default(), path.display().to_string(), template);
    match stream.ensure_parsed() {
        Err(CodeStreamError::Parse { .. }) => None,
        Err(other) => Some(format!("expected parse error, got: {}", other)),
        Ok(()) => Some("expected parse error, but parsing succeeded".into()),
    }
}

fn check_result(config: &TestConfig, result: Result<String, String>) -> Option<String> {
    match (&config.expect_error, result) {
        (Some(expected), Err(actual)) if actual.contains(expected.as_str()) => None,
        (Some(expected), Err(actual)) => Some(format!(
            "expected error containing \"{}\", got: {}",
            expected, actual
        )),
        (Some(expected), Ok(_)) => Some(format!(
            "expected error containing \"{}\", but expansion succeeded",
            expected
        )),
        (None, Err(actual)) => Some(format!("unexpected error: {}", actual)),
        (None, Ok(actual)) => {
            let expected = config.expect_output.as_deref()?.trim();
            let actual = actual.trim();
            (expected != actual).then(|| {
                format!(
                    "output mismatch\n  expected: {}\n  actual:   {}",
                    expected.replace('\n', "\n            "),
                    actual.replace('\n', "\n            ")
                )
            })
        }
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };
    let (config, template) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };

    let failure = if config.expect_parse_error {
        check_parse_error(path, template)
    } else {
        check_result(&config, render(&config, path, template))
    };
    tracing::debug!(path = %path.display(), passed = failure.is_none(), "ran golden test");

    TestResult {
        path: path.to_path_buf(),
        description: config.description,
        outcome: match failure {
            Some(reason) => TestOutcome::Fail(reason),
            None => TestOutcome::Pass,
        },
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// `.test.cg` files keyed by their directory relative to `root`; files
/// directly in `root` are in category "".
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(EXTENSION));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// Categories matching `requested`, including their subcategories.
fn select_categories<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }
    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let prefix = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files);
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                available.join(", ")
            );
        }
    }
    selected
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", EXTENSION, path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

struct Reporter {
    no_color: bool,
    passed: usize,
    failures: Vec<TestResult>,
}

impl Reporter {
    fn new(no_color: bool) -> Self {
        Reporter {
            no_color,
            passed: 0,
            failures: Vec::new(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn heading(&self, category: &str) {
        eprintln!();
        eprintln!("{}", self.paint(category_label(category), "1"));
    }

    fn record(&mut self, result: TestResult) {
        match result.outcome {
            TestOutcome::Pass => {
                self.passed += 1;
                eprintln!("  {}  {}", self.paint("PASS", "32"), result.label());
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", self.paint("FAIL", "31"), result.label());
                self.failures.push(result);
            }
        }
    }

    /// Print failure details and the summary line; returns the exit code.
    fn finish(self) -> i32 {
        if !self.failures.is_empty() {
            eprintln!();
            eprintln!("failures:");
            for failure in &self.failures {
                eprintln!();
                eprintln!("  --- {} ---", failure.path.display());
                if let TestOutcome::Fail(reason) = &failure.outcome {
                    for line in reason.lines() {
                        eprintln!("  {}", line);
                    }
                }
            }
        }

        eprintln!();
        let failed = self.failures.len();
        if failed == 0 {
            eprintln!("test result: {}. {} passed, 0 failed", self.paint("ok", "32"), self.passed);
            0
        } else {
            eprintln!(
                "test result: {}. {} passed, {} failed (of {})",
                self.paint("FAILED", "31"),
                self.passed,
                failed,
                self.passed + failed
            );
            1
        }
    }
}

/// Run every `.test.cg` file under `path` (or the single file `path`),
/// optionally restricted to `categories`. Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let mut reporter = Reporter::new(no_color);

    if path.is_file() {
        reporter.record(run_single_test(path));
        return reporter.finish();
    }

    let all = discover_categorized(path);
    if all.is_empty() {
        eprintln!("no {} files found in {}", EXTENSION, path.display());
        return 1;
    }
    let selected = select_categories(&all, categories);
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    for (category, files) in selected {
        reporter.heading(category);
        for file in files {
            reporter.record(run_single_test(file));
        }
    }
    reporter.finish()
}
