mod config;
mod test_runner;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use codestream::{CodeStream, CodeStreamError, indent};
use expander::{ExpandError, TemplateParser};

use config::ProjectConfig;

#[derive(Parser)]
#[command(name = "cgt", version, about = "Code block template expander")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log debug events to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project file (defaults to ./cgt.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a code block and expand its macros
    Expand(ExpandArgs),

    /// List the block signatures a template declares
    Blocks(TemplateArgs),

    /// Print every scope and block of a template
    Describe(TemplateArgs),

    /// Parse a template and report structural errors
    Check(TemplateArgs),

    /// Run .test.cg golden files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct TemplateArgs {
    /// Template file
    template: PathBuf,

    /// Values for the template's <...> parameters. Repeatable.
    #[arg(short = 't', long = "template-arg")]
    template_args: Vec<String>,
}

#[derive(clap::Args)]
struct ExpandArgs {
    #[command(flatten)]
    template: TemplateArgs,

    /// Block to resolve
    #[arg(short, long, default_value = "fireBlock")]
    block: String,

    /// Arguments passed to the block
    #[arg(long, num_args = 1..)]
    args: Vec<String>,

    /// Indent level of the emitted block (4 spaces each)
    #[arg(long, default_value_t = 0)]
    indent: usize,

    /// Print the resolved block without expanding macros
    #[arg(long)]
    raw: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.cg file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    if let Command::Test(test_args) = &cli.command {
        let path = Path::new(&test_args.path);
        if test_args.list_categories {
            test_runner::list_categories(path);
            return;
        }
        process::exit(test_runner::run_tests(path, cli.no_color, &test_args.category));
    }

    let project = match ProjectConfig::load(cli.config.as_deref()) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let code = match cli.command {
        Command::Expand(args) => do_expand(args, &project, color),
        Command::Blocks(args) => do_blocks(args, &project, color),
        Command::Describe(args) => do_describe(args, &project, color),
        Command::Check(args) => do_check(args, &project, color),
        Command::Test(_) => 0,
    };
    process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn open_stream(args: &TemplateArgs, project: &ProjectConfig) -> CodeStream {
    let stream = CodeStream::from_file(project.stream.clone(), &args.template, false);
    if args.template_args.is_empty() {
        stream
    } else {
        stream.with_template_arguments(args.template_args.clone())
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn do_expand(args: ExpandArgs, project: &ProjectConfig, color: ColorChoice) -> i32 {
    let mut stream = open_stream(&args.template, project);

    if args.raw {
        return match stream.append_code_block(&args.block, &args.args, false, args.indent) {
            Ok(()) => {
                print!("{}", stream);
                0
            }
            Err(e) => {
                emit_stream_error(&e, stream.files(), color);
                1
            }
        };
    }

    let component = project.component_for(&args.template.template);
    let mut context = project.context();
    let mut parser = TemplateParser::new(&component, &project.target, &mut context);
    match parser.generate_block_code(&mut stream, &args.block, &args.args) {
        Ok(code) => {
            print!("{}", indent(args.indent, &code));
            0
        }
        Err(e) => {
            emit_expand_error(&e, stream.files(), color);
            1
        }
    }
}

fn do_blocks(args: TemplateArgs, project: &ProjectConfig, color: ColorChoice) -> i32 {
    let mut stream = open_stream(&args, project);
    match stream.all_code_block_signatures() {
        Ok(signatures) => {
            for signature in signatures {
                println!("{}", signature);
            }
            0
        }
        Err(e) => {
            emit_stream_error(&e, stream.files(), color);
            1
        }
    }
}

fn do_describe(args: TemplateArgs, project: &ProjectConfig, color: ColorChoice) -> i32 {
    let mut stream = open_stream(&args, project);
    match stream.description() {
        Ok(description) => {
            print!("{}", description);
            0
        }
        Err(e) => {
            emit_stream_error(&e, stream.files(), color);
            1
        }
    }
}

fn do_check(args: TemplateArgs, project: &ProjectConfig, color: ColorChoice) -> i32 {
    let mut stream = open_stream(&args, project);
    let count = stream.table().map(|table| {
        table.scopes().iter().map(|scope| scope.len()).sum::<usize>()
    });
    match count {
        Ok(count) => {
            eprintln!("ok: {} parsed successfully ({} blocks)", args.template.display(), count);
            0
        }
        Err(e) => {
            emit_stream_error(&e, stream.files(), color);
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Error reporting
// ---------------------------------------------------------------------------

/// Parse errors are rendered against their source; anything else prints
/// its message and cause chain.
fn emit_stream_error(error: &CodeStreamError, files: &SimpleFiles<String, String>, color: ColorChoice) {
    let CodeStreamError::Parse { errors, .. } = error else {
        eprintln!("error: {}", error_chain(error));
        return;
    };
    let writer = StandardStream::stderr(color);
    let config = term::Config::default();
    for parse_error in errors {
        let diagnostic = parse_error.to_diagnostic();
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &diagnostic);
    }
}

fn emit_expand_error(error: &ExpandError, files: &SimpleFiles<String, String>, color: ColorChoice) {
    match error {
        ExpandError::Block(inner) => emit_stream_error(inner, files, color),
        other => eprintln!("error: {}", error_chain(other)),
    }
}

/// `error` followed by each of its sources, one per line.
pub fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    message
}
