use crate::{pem, tools};
/// Functions to handle the command line interface (CLI)
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(group(
        clap::ArgGroup::new("step_choice")
        .required(false)
        .args(&["steps", "default"]),
    ))
]
#[clap(group(
        clap::ArgGroup::new("exit_choice")
        .required(false)
        .args(&["show_default", "info", "show_all_steps", "output"]),
    ))
]
pub struct Args {
    /// Filepath of the PEM file or a glob pattern of many files
    #[clap(short, long)]
    filepath: Option<String>,

    /// Only show metadata for the file
    #[clap(short, long)]
    info: bool,

    /// Export the processed readings as XYZ columns. Defaults to the output filename location and
    /// stem + ".xyz"
    #[clap(short, long)]
    xyz: Option<Option<PathBuf>>,

    /// Process with the default profile. See "--show-default" to list the profile.
    #[clap(long)]
    default: bool,

    /// Show the default profile and exit
    #[clap(long)]
    show_default: bool,

    /// Show the available steps
    #[clap(long)]
    show_all_steps: bool,

    /// Processing steps to run, separated by commas. Can be a filepath to a newline separated step file.
    #[clap(long)]
    steps: Option<String>,

    /// Output filename or directory. Defaults to the input filename with a "_processed" suffix
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Suppress progress messages
    #[clap(short, long)]
    quiet: bool,

    /// Don't export a PEM file
    #[clap(long)]
    no_export: bool,

    /// Allow de-rotating files that have already been de-rotated
    #[clap(long)]
    allow_rerotation: bool,
}

enum ParsedArgs {
    Params(Box<pem::RunParams>),
    Error(String),
    Done,
}

impl Args {
    fn parse(&self) -> ParsedArgs {
        // If the user only wants to show the available steps, stop here.
        if self.show_all_steps {
            println!("Name\t\tDescription");

            for line in pem::all_available_steps() {
                println!("{}\n{}\n{}\n", line[0], "-".repeat(line[0].len()), line[1]);
            }
            return ParsedArgs::Done;
        };

        // If the user only wants to show the default profile, stop here.
        if self.show_default {
            for line in pem::default_processing_profile() {
                println!("{}", line);
            }
            return ParsedArgs::Done;
        };

        let filepaths = match &self.filepath {
            Some(fp) => match glob::glob(fp) {
                Ok(paths) => match paths.collect::<Result<Vec<PathBuf>, glob::GlobError>>() {
                    Ok(p) => p,
                    Err(e) => return ParsedArgs::Error(format!("Error reading {fp:?}: {e}")),
                },
                Err(e) => return ParsedArgs::Error(format!("Invalid filepath pattern {fp:?}: {e}")),
            },
            None => {
                return ParsedArgs::Error(
                    "No filepath given.\nUse the help text (\"-h\" or \"--help\") for assistance."
                        .to_string(),
                )
            }
        };

        // The profile (the list of steps) is the default profile if "--default" was given, or a
        // list of "--steps a,b,c". If none were given, the raw data are saved.
        let steps: Vec<String> = match self.info {
            true => Vec::new(),
            false => match self.default {
                true => pem::default_processing_profile(),
                false => match &self.steps {
                    Some(steps) => match tools::parse_step_list(steps) {
                        Ok(s) => s,
                        Err(e) => return ParsedArgs::Error(e),
                    },
                    None => {
                        println!("No processing steps specified. Saving raw data.");
                        vec![]
                    }
                },
            },
        };
        // Validate the step names before any file is read. Arguments are validated when the step
        // runs.
        if let Err(e) = validate_steps(&steps) {
            return ParsedArgs::Error(e);
        }

        ParsedArgs::Params(Box::new(pem::RunParams {
            filepaths,
            output_path: self.output.clone(),
            only_info: self.info,
            xyz_path: self.xyz.clone(),
            steps,
            no_export: self.no_export,
            allow_rerotation: self.allow_rerotation,
        }))
    }
}

/// Check that every step name (the part before any parenthesis) is a known step
fn validate_steps(steps: &[String]) -> Result<(), String> {
    let allowed_steps = pem::all_available_steps()
        .iter()
        .map(|s| s[0])
        .collect::<Vec<&str>>();

    for step in steps {
        let name = step.split('(').next().unwrap_or_default().trim();
        if !allowed_steps.contains(&name) {
            return Err(format!("Unrecognized step: {}", step));
        };
    }
    Ok(())
}

/// Run the main CLI functionality based on the given arguments
///
/// # Arguments
/// - `arguments`: The Args object containing the parsed arguments.
///
/// # Returns
/// The appropriate exit code.
pub fn main(arguments: Args) -> i32 {
    tracing_subscriber::fmt()
        .with_max_level(match arguments.quiet {
            true => Level::WARN,
            false => Level::INFO,
        })
        .with_writer(std::io::stderr)
        .init();

    match arguments.parse() {
        ParsedArgs::Params(params) => match pem::run(*params) {
            Ok(_) => 0,
            Err(e) => error(&format!("{e:#}"), 1),
        },
        ParsedArgs::Error(message) => error(&message, 1),
        ParsedArgs::Done => 0,
    }
}

/// Print an error to /dev/stderr and return an exit code
///
/// # Arguments
/// - `message`: The message to print to /dev/stderr
/// - `code`: The exit code
///
/// # Returns
/// The same exit code that was provided
fn error(message: &str, code: i32) -> i32 {
    eprintln!("{}", message);
    code
}

#[cfg(test)]
mod tests {
    use super::{validate_steps, Args, ParsedArgs};
    use clap::Parser;

    #[test]
    fn test_validate_steps() {
        assert!(validate_steps(&["average".into(), "rotate(acc 1.0)".into(), "scale_current(2)".into()]).is_ok());
        assert!(validate_steps(&crate::pem::default_processing_profile()).is_ok());

        // Names must match exactly, not only contain a known step
        assert!(validate_steps(&["averaged".into()]).is_err());
        assert!(validate_steps(&["unknown_step(1)".into()]).is_err());
    }

    #[test]
    fn test_parse_args() {
        let args = Args::parse_from(["pemtool", "--show-default"]);
        assert!(matches!(args.parse(), ParsedArgs::Done));

        let args = Args::parse_from(["pemtool", "--steps", "average"]);
        assert!(matches!(args.parse(), ParsedArgs::Error(e) if e.contains("No filepath")));

        let args = Args::parse_from(["pemtool", "-f", "missing*.PEM", "--steps", "averag"]);
        assert!(matches!(args.parse(), ParsedArgs::Error(e) if e.contains("Unrecognized step")));

        let args = Args::parse_from(["pemtool", "-f", "missing*.PEM", "--default", "--allow-rerotation"]);
        match args.parse() {
            ParsedArgs::Params(params) => {
                assert!(params.filepaths.is_empty());
                assert!(params.allow_rerotation);
                assert_eq!(params.steps, crate::pem::default_processing_profile());
            }
            _ => panic!("Expected parameters"),
        }
    }
}
