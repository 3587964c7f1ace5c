//! Reference command-line utility: reads a Subversion dump file,
//! rewrites selected user properties by pattern-matched text
//! substitution, and re-emits a framing-consistent dump file.

mod options;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

use dsvn_dump::{echo_properties, edit_properties, write_events, EditTarget};
use glob::Pattern;
use options::{Edit, Options, OptionsError, PropertyClause};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match options::parse_options(&args) {
        Ok(options) => options,
        Err(OptionsError::HelpRequested) => {
            eprint!("{}", options::USAGE);
            std::process::exit(0);
        }
        Err(OptionsError::Malformed(message)) => {
            eprintln!("error: {message}\n");
            eprint!("{}", options::USAGE);
            std::process::exit(2);
        }
    };

    init_tracing(options.verbose);

    if let Err(err) = run(options) {
        tracing::error!(error = %err, "dsvn-dump-cli failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };
    // Logs must never land on stdout: stdout carries the binary-safe
    // dump stream this tool emits.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

fn run(options: Options) -> anyhow::Result<()> {
    let patterns: Vec<(Pattern, Vec<Edit>)> = options
        .clauses
        .iter()
        .map(|clause: &PropertyClause| {
            Ok::<_, glob::PatternError>((Pattern::new(&clause.pattern)?, clause.edits.clone()))
        })
        .collect::<Result<_, _>>()?;

    let input: Box<dyn Read> = match &options.input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin()),
    };
    let output: Box<dyn Write> = match &options.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };

    let names: Vec<Vec<u8>> = options
        .clauses
        .iter()
        .map(|c| c.pattern.clone().into_bytes())
        .collect();

    let parser = dsvn_dump::parse(BufReader::new(input))?;
    tracing::info!(version = parser.version(), "parsed dump-file header");

    let events = parser;
    let events: Box<dyn Iterator<Item = dsvn_dump::Result<dsvn_dump::ParseEvent>>> =
        if options.verbose {
            Box::new(echo_properties(events, names.clone(), io::stderr()))
        } else {
            Box::new(events)
        };

    let events = edit_properties(events, move |target| {
        if let EditTarget::User(props) = target {
            let keys: Vec<Vec<u8>> = props.keys().cloned().collect();
            for key in keys {
                let name = String::from_utf8_lossy(&key);
                let matching_clauses = patterns
                    .iter()
                    .filter(|(pattern, _)| pattern.matches(&name));
                if let Some(Some(value)) = props.get(&key).cloned() {
                    let mut text = String::from_utf8_lossy(&value).into_owned();
                    let mut changed = false;
                    for (_, edits) in matching_clauses {
                        changed = true;
                        for edit in edits {
                            text = match edit {
                                Edit::NormalizeLineBreaks => text.replace("\r\n", "\n"),
                                Edit::Replace { old, new } => {
                                    text.replace(old.as_str(), new.as_str())
                                }
                            };
                        }
                    }
                    if changed {
                        props.insert(key, Some(text.into_bytes()));
                    }
                }
            }
        }
    });

    let events: Box<dyn Iterator<Item = dsvn_dump::Result<dsvn_dump::ParseEvent>>> =
        if options.verbose {
            Box::new(echo_properties(events, names, io::stderr()))
        } else {
            Box::new(events)
        };

    write_events(events, BufWriter::new(output))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use options::parse_options;
    use std::io::Read as _;
    use tempfile::NamedTempFile;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replaces_and_normalizes_a_matched_property_end_to_end() {
        let old_value = "svn://old.com/repos/lib ^/lib\r\n";
        let props = format!(
            "K 13\nsvn:externals\nV {}\n{}\nPROPS-END\n",
            old_value.len(),
            old_value,
        );
        let data = format!(
            "SVN-fs-dump-format-version: 3\n\nRevision-number: 1\nProp-content-length: {}\nContent-length: {}\n\n{}\n",
            props.len(),
            props.len(),
            props,
        );
        let input = NamedTempFile::new().unwrap();
        std::fs::write(input.path(), data).unwrap();
        let output = NamedTempFile::new().unwrap();

        let options = parse_options(&args(&[
            "--property",
            "svn:externals",
            "--replace",
            "svn://old.com/repos/",
            "svn://new.com/repos/",
            "--normalize-line-breaks",
            "--input",
            input.path().to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
        ]))
        .unwrap();
        run(options).unwrap();

        let mut written = String::new();
        std::fs::File::open(output.path())
            .unwrap()
            .read_to_string(&mut written)
            .unwrap();
        assert!(written.contains("svn://new.com/repos/lib ^/lib\n"));
        assert!(!written.contains('\r'));
    }

    #[test]
    fn leaves_unrelated_properties_untouched() {
        let props = "K 10\nsvn:ignore\nV 3\nfoo\nK 10\nother:mime\nV 10\ntext/plain\nPROPS-END\n";
        let data = format!(
            "SVN-fs-dump-format-version: 3\n\nRevision-number: 1\nProp-content-length: {}\nContent-length: {}\n\n{}\n",
            props.len(),
            props.len(),
            props,
        );
        let input = NamedTempFile::new().unwrap();
        std::fs::write(input.path(), data.clone()).unwrap();
        let output = NamedTempFile::new().unwrap();

        let options = parse_options(&args(&[
            "--property",
            "nonexistent:*",
            "--normalize-line-breaks",
            "--input",
            input.path().to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
        ]))
        .unwrap();
        run(options).unwrap();

        let mut written = String::new();
        std::fs::File::open(output.path())
            .unwrap()
            .read_to_string(&mut written)
            .unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn a_property_matching_two_clauses_gets_both_clauses_edits_in_order() {
        let old_value = "svn://old.com/repos/lib ^/lib\r\n";
        let props = format!(
            "K 13\nsvn:externals\nV {}\n{}\nPROPS-END\n",
            old_value.len(),
            old_value,
        );
        let data = format!(
            "SVN-fs-dump-format-version: 3\n\nRevision-number: 1\nProp-content-length: {}\nContent-length: {}\n\n{}\n",
            props.len(),
            props.len(),
            props,
        );
        let input = NamedTempFile::new().unwrap();
        std::fs::write(input.path(), data).unwrap();
        let output = NamedTempFile::new().unwrap();

        // Two clauses both match "svn:externals": the first only replaces
        // the host, the second only normalizes line breaks. Both must
        // apply, not just the first one whose pattern matches.
        let options = parse_options(&args(&[
            "--property",
            "svn:ext*",
            "--replace",
            "svn://old.com/repos/",
            "svn://new.com/repos/",
            "--property",
            "svn:externals",
            "--normalize-line-breaks",
            "--input",
            input.path().to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
        ]))
        .unwrap();
        run(options).unwrap();

        let mut written = String::new();
        std::fs::File::open(output.path())
            .unwrap()
            .read_to_string(&mut written)
            .unwrap();
        assert!(written.contains("svn://new.com/repos/lib ^/lib\n"));
        assert!(!written.contains('\r'));
    }
}
