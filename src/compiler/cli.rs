use clap::{App, Arg};
use io::Read;
use std::array;
use std::fmt;
use std::fs;
use std::io;
use std::iter::ExactSizeIterator;
use std::str::FromStr;

use super::CompilerError;

#[derive(Debug, Clone, Copy)]
pub enum EmitTarget {
    /// Print the compiled units as text.
    Units,
    /// Execute the compiled units and print the program's output.
    Run,
}

impl EmitTarget {
    pub fn variants() -> impl Iterator<Item = EmitTarget> {
        array::IntoIter::new([Self::Units, Self::Run])
    }
}

impl fmt::Display for EmitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitTarget::Units => write!(f, "units"),
            EmitTarget::Run => write!(f, "run"),
        }
    }
}

impl FromStr for EmitTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::variants()
            .find(|x| x.to_string() == s)
            .ok_or_else(|| format!("Unknown emit option: `{}`", s))
    }
}

#[derive(Debug)]
pub struct CompilerOptions {
    emit: EmitTarget,
    filepath: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            emit: EmitTarget::Run,
            filepath: None,
        }
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub struct Command {}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(
        &self,
        args: impl ExactSizeIterator<Item = String>,
    ) -> Result<String, CompilerError> {
        let options = parse_options(args)?;

        let src = if let Some(filepath) = options.filepath {
            read_from_file(filepath.as_str())?
        } else {
            read_from_stdin()?
        };

        match options.emit {
            EmitTarget::Units => {
                let units = super::compile(&src, "Main")?;
                let units = units.iter().map(|u| u.to_string()).collect::<Vec<_>>();

                Ok(units.join("\n"))
            }
            EmitTarget::Run => {
                let output = super::run(&src)?;

                Ok(output
                    .into_iter()
                    .map(|line| format!("{}\n", line))
                    .collect())
            }
        }
    }
}

fn parse_options(
    args: impl ExactSizeIterator<Item = String>,
) -> Result<CompilerOptions, CompilerError> {
    let mut options = CompilerOptions::new();

    // TODO: remove intermediate string object
    let emit_possible_values = EmitTarget::variants()
        .map(|b| b.to_string())
        .collect::<Vec<_>>();
    let emit_possible_values: Vec<&str> = emit_possible_values.iter().map(AsRef::as_ref).collect();

    let matches = App::new("pl0")
        .arg(
            Arg::with_name("emit")
                .long("emit")
                .takes_value(true)
                .possible_values(&emit_possible_values),
        )
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input file to use")
                .required(false)
                .index(1),
        )
        .get_matches_from(args);

    if let Some(emit) = matches.value_of("emit") {
        options.emit = emit.parse::<EmitTarget>()?;
    }

    if let Some(filepath) = matches.value_of("INPUT") {
        options.filepath = Some(filepath.to_string());
    }

    Ok(options)
}

fn read_from_stdin() -> Result<String, io::Error> {
    let mut content = String::new();

    io::stdin().read_to_string(&mut content)?;

    Ok(content)
}

fn read_from_file(filename: &str) -> io::Result<String> {
    fs::read_to_string(filename)
}
