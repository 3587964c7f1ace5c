//! Hand-rolled argv walker for the property-edit grammar:
//!
//! ```text
//! OPTIONS        = HelpOpt | PropertyClause*
//! HelpOpt        = -h | --help
//! PropertyClause = PropertyOpt PropertyName EditClause*
//! PropertyOpt    = -p | --property
//! PropertyName   = text (unix-style glob syntax accepted)
//! EditClause     = NormalizeOpt | ReplaceClause
//! NormalizeOpt   = -n | --normalize-line-breaks
//! ReplaceClause  = ReplaceOpt OldText NewText
//! ReplaceOpt     = -r | --replace
//! ```
//!
//! This shape (a clause that both repeats and nests a second level of
//! repetition) doesn't fit `clap`'s derive macros, so it's walked by
//! hand, the same way `revisionist-fixprops.py`'s `parse_options` does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("help requested")]
    HelpRequested,

    #[error("{0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub enum Edit {
    NormalizeLineBreaks,
    Replace { old: String, new: String },
}

#[derive(Debug, Clone)]
pub struct PropertyClause {
    pub pattern: String,
    pub edits: Vec<Edit>,
}

#[derive(Debug, Default)]
pub struct Options {
    pub verbose: bool,
    pub clauses: Vec<PropertyClause>,
    /// Reads the dump from this file instead of stdin. Not part of the
    /// original grammar; added purely so the CLI is testable without a
    /// subprocess harness wired to real stdin/stdout.
    pub input: Option<String>,
    pub output: Option<String>,
}

/// Parses `args` (the program name already stripped) per the grammar
/// above. Returns `OptionsError::HelpRequested` for `-h`/`--help`
/// (including no arguments at all), or `OptionsError::Malformed` for
/// anything that doesn't fit the grammar.
pub fn parse_options(args: &[String]) -> Result<Options, OptionsError> {
    let mut tokens = args.iter().peekable();

    match tokens.peek().map(String::as_str) {
        None | Some("-h") | Some("--help") => return Err(OptionsError::HelpRequested),
        _ => {}
    }

    let mut options = Options::default();
    while let Some(token) = tokens.peek().map(String::as_str) {
        match token {
            "--property" | "-p" => {
                tokens.next();
                let pattern = tokens
                    .next()
                    .ok_or_else(|| OptionsError::Malformed("--property requires a PATTERN argument".into()))?
                    .clone();
                let mut edits = Vec::new();
                while let Some(edit_token) = tokens.peek().map(String::as_str) {
                    match edit_token {
                        "--replace" | "-r" => {
                            tokens.next();
                            let old = tokens.next().ok_or_else(|| {
                                OptionsError::Malformed("--replace requires OLD and NEW arguments".into())
                            })?;
                            let new = tokens.next().ok_or_else(|| {
                                OptionsError::Malformed("--replace requires OLD and NEW arguments".into())
                            })?;
                            edits.push(Edit::Replace {
                                old: old.clone(),
                                new: new.clone(),
                            });
                        }
                        "--normalize-line-breaks" | "-n" => {
                            tokens.next();
                            edits.push(Edit::NormalizeLineBreaks);
                        }
                        _ => break,
                    }
                }
                options.clauses.push(PropertyClause { pattern, edits });
            }
            "--verbose" | "-v" => {
                tokens.next();
                options.verbose = true;
            }
            "--input" | "-i" => {
                tokens.next();
                let path = tokens
                    .next()
                    .ok_or_else(|| OptionsError::Malformed("--input requires a FILE argument".into()))?;
                options.input = Some(path.clone());
            }
            "--output" | "-o" => {
                tokens.next();
                let path = tokens
                    .next()
                    .ok_or_else(|| OptionsError::Malformed("--output requires a FILE argument".into()))?;
                options.output = Some(path.clone());
            }
            other => {
                return Err(OptionsError::Malformed(format!(
                    "unrecognized argument: {other}"
                )))
            }
        }
    }

    Ok(options)
}

pub const USAGE: &str = "\
 dsvn-dump-cli OPTIONS < dumpfile.in > dumpfile.out

 Legal option combinations are described by this BNF:

 OPTIONS         = HelpOpt | PropertyClause*
 HelpOpt         = -h | --help
 PropertyClause  = PropertyOpt PropertyName EditClause*
 PropertyOpt     = -p | --property
 PropertyName    = text (unix-style glob syntax accepted)
 EditClause      = NormalizeOpt | ReplaceClause
 NormalizeOpt    = -n | --normalize-line-breaks
 ReplaceClause   = ReplaceOpt OldText NewText
 ReplaceOpt      = -r | --replace
 OldText         = text
 NewText         = text

 Additionally, --input/-i FILE and --output/-o FILE read/write a named
 file instead of stdin/stdout.

 e.g.

 dsvn-dump-cli --property svn:externals \\
   --replace svn://old.com/repos/ svn://new.com/repos/ -n

 1. Replace every occurrence of the string 'svn://old.com/repos/' with
    'svn://new.com/repos/' in every svn:externals property in the
    dumpfile.
 2. Normalize the line breaks in every svn:externals property.
";

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_requests_help() {
        assert!(matches!(
            parse_options(&args(&[])),
            Err(OptionsError::HelpRequested)
        ));
    }

    #[test]
    fn help_flag_requests_help() {
        assert!(matches!(
            parse_options(&args(&["--help"])),
            Err(OptionsError::HelpRequested)
        ));
        assert!(matches!(
            parse_options(&args(&["-h"])),
            Err(OptionsError::HelpRequested)
        ));
    }

    #[test]
    fn parses_a_full_property_clause() {
        let opts = parse_options(&args(&[
            "--property",
            "svn:externals",
            "--replace",
            "old",
            "new",
            "-n",
            "--verbose",
        ]))
        .unwrap();
        assert!(opts.verbose);
        assert_eq!(opts.clauses.len(), 1);
        assert_eq!(opts.clauses[0].pattern, "svn:externals");
        assert_eq!(opts.clauses[0].edits.len(), 2);
    }

    #[test]
    fn parses_multiple_property_clauses() {
        let opts = parse_options(&args(&["-p", "svn:log", "-p", "svn:author", "-r", "a", "b"])).unwrap();
        assert_eq!(opts.clauses.len(), 2);
        assert_eq!(opts.clauses[1].pattern, "svn:author");
        assert_eq!(opts.clauses[1].edits.len(), 1);
    }

    #[test]
    fn missing_property_name_is_malformed() {
        let err = parse_options(&args(&["--property"])).unwrap_err();
        assert!(matches!(err, OptionsError::Malformed(_)));
    }

    #[test]
    fn missing_replace_arguments_is_malformed() {
        let err = parse_options(&args(&["-p", "x", "-r", "only-one"])).unwrap_err();
        assert!(matches!(err, OptionsError::Malformed(_)));
    }

    #[test]
    fn unrecognized_argument_is_malformed() {
        let err = parse_options(&args(&["--bogus"])).unwrap_err();
        assert!(matches!(err, OptionsError::Malformed(_)));
    }
}
