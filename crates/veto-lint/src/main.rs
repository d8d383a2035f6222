//! veto rule file linter CLI
//!
//! Usage:
//!   veto-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use veto_lint::{collect_rule_files, lint_file, LintIssue, LintOptions, LintResult, Severity};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const RULER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "veto-lint")]
#[command(author, version, about = "Validate veto rule files before registering them")]
struct Args {
    /// Rule file, or directory of .json/.yaml/.yml rule files
    #[arg(required = true)]
    path: PathBuf,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Print a rule count per file
    #[arg(short, long)]
    verbose: bool,

    /// Treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let options = LintOptions {
        verbose: args.verbose,
    };

    let files = match collect_rule_files(&args.path) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("{RED}error:{RESET} cannot read {}: {e}", args.path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut result = LintResult::new();
    for file in &files {
        result.merge(lint_file(file, &options));
    }

    match args.output {
        OutputFormat::Json => {
            if let Err(e) = print_results_json(&result) {
                eprintln!("{RED}error:{RESET} {e}");
                return ExitCode::FAILURE;
            }
        }
        OutputFormat::Text => {
            println!("{BOLD}{CYAN}veto rule linter{RESET}");
            println!("{DIM}{RULER}{RESET}");
            if files.is_empty() {
                println!(
                    "{YELLOW}Warning:{RESET} No rule files found in {}",
                    args.path.display()
                );
                return ExitCode::SUCCESS;
            }
            println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", args.path.display());
            println!("{DIM}Found:{RESET}    {BOLD}{}{RESET} rule file(s)", files.len());
            print_results(&result, &args);
        }
    }

    if result.passes(args.strict) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_results_json(result: &LintResult) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn print_results(result: &LintResult, args: &Args) {
    println!();

    let mut by_file: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
    for issue in &result.issues {
        if args.errors_only && issue.severity != Severity::Error {
            continue;
        }
        by_file.entry(issue.file.as_path()).or_default().push(issue);
    }

    if by_file.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    }

    for (file, issues) in &by_file {
        let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
        let warnings = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count();

        let status = if errors > 0 {
            format!("{RED}FAIL{RESET}")
        } else if warnings > 0 {
            format!("{YELLOW}WARN{RESET}")
        } else {
            format!("{GREEN} OK {RESET}")
        };

        let mut counts = Vec::new();
        if errors > 0 {
            counts.push(format!("{RED}{errors} error(s){RESET}"));
        }
        if warnings > 0 {
            counts.push(format!("{YELLOW}{warnings} warning(s){RESET}"));
        }
        let separator = format!("{DIM}, {RESET}");
        let counts = if counts.is_empty() {
            String::new()
        } else {
            format!(" {DIM}({RESET}{}{DIM}){RESET}", counts.join(separator.as_str()))
        };

        let file_name = file.file_name().unwrap_or_default().to_string_lossy();
        println!("{status} {BOLD}{CYAN}{file_name}{RESET}{counts}");

        for issue in issues {
            let color = severity_color(issue.severity);
            let location = issue
                .location
                .as_ref()
                .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
                .unwrap_or_default();

            println!(
                "  {color}|{RESET} {location}{BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
                issue.severity, issue.message, issue.code
            );
            if let Some(suggestion) = &issue.suggestion {
                println!("  {color}|{RESET}   {GREEN}-> {suggestion}{RESET}");
            }
        }
        println!();
    }

    println!("{DIM}{RULER}{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}{RULER}{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);

    if result.errors > 0 {
        println!("  {RED}Errors:{RESET}    {BOLD}{RED}{}{RESET}", result.errors);
    } else {
        println!("  {GREEN}Errors:{RESET}    {BOLD}{GREEN}0{RESET}");
    }

    if result.warnings > 0 {
        println!("  {YELLOW}Warnings:{RESET}  {BOLD}{YELLOW}{}{RESET}", result.warnings);
    } else {
        println!("  {DIM}Warnings:{RESET}  {BOLD}0{RESET}");
    }

    println!();

    if !result.has_errors() && !result.has_warnings() {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if !result.passes(args.strict) {
        println!("{RED}{BOLD}Linting failed{RESET}");
    } else {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}
