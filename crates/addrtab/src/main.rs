//! CLI entry point for the `regbus-at` address table tool.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use addrtab::dump::{format_dump_line, read_dump};
use addrtab::logging;
#[cfg(test)]
use tempfile as _;
use tracing as _;
use tracing_subscriber as _;

use regbus_core::AddressTable;

const USAGE_TEXT: &str = "\
Usage: regbus-at <command> [options]

Commands:
  import <dump-file>   Replace the table contents with a parsed dump
  lookup <name>        Print one register descriptor
  dump                 Print the whole table as dump lines

Options:
  -s, --store <file>   Store file path (default: $GEM_PATH/address_table.db)
  -h, --help           Show this help message

Examples:
  regbus-at import gem_amc.dump --store /tmp/address_table.db
  regbus-at lookup GEM_AMC.GEM_SYSTEM.RELEASE.MAJOR
  regbus-at dump
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Import { input: PathBuf },
    Lookup { name: String },
    Dump,
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedArgs {
    command: Command,
    store: Option<PathBuf>,
}

#[derive(Debug)]
enum ParseResult {
    Command(ParsedArgs),
    Help,
}

#[allow(clippy::while_let_on_iterator)]
fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();
    let mut positional: Option<String> = None;
    let mut store: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(ParseResult::Help);
        }

        if arg == "-s" || arg == "--store" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for --store".to_string())?;
            store = Some(PathBuf::from(value));
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if positional.is_some() {
            return Err("multiple positional arguments provided".to_string());
        }
        positional = Some(arg.to_string_lossy().to_string());
    }

    let command = match command_str.as_str() {
        "import" => Command::Import {
            input: PathBuf::from(
                positional.ok_or_else(|| "missing dump file path".to_string())?,
            ),
        },
        "lookup" => Command::Lookup {
            name: positional.ok_or_else(|| "missing register name".to_string())?,
        },
        "dump" => {
            if positional.is_some() {
                return Err("dump takes no positional argument".to_string());
            }
            Command::Dump
        }
        other => return Err(format!("unknown command: {other}")),
    };

    Ok(ParseResult::Command(ParsedArgs { command, store }))
}

fn open_table(store: Option<PathBuf>) -> Result<AddressTable, i32> {
    let result = match store {
        Some(path) => AddressTable::open(path),
        None => AddressTable::from_env(),
    };
    result.map_err(|err| {
        eprintln!("error: {err}");
        1
    })
}

fn run_import(input: &PathBuf, store: Option<PathBuf>) -> Result<(), i32> {
    let entries = match read_dump(input) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("error: {err}");
            return Err(1);
        }
    };

    let mut table = open_table(store)?;
    let count = entries.len();
    if let Err(err) = table.reload(entries) {
        eprintln!("error: {err}");
        return Err(1);
    }

    println!(
        "Imported {count} registers from {} into {}",
        input.display(),
        table.path().display()
    );
    Ok(())
}

fn run_lookup(name: &str, store: Option<PathBuf>) -> Result<(), i32> {
    let table = open_table(store)?;
    match table.lookup(name) {
        Ok(descriptor) => {
            println!(
                "{name}: address=0x{:08x} mask=0x{:08x} size=0x{:x} mode={} perm={}",
                descriptor.address,
                descriptor.mask,
                descriptor.size,
                descriptor.mode.token(),
                descriptor.permissions.token()
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("error: {err}");
            Err(1)
        }
    }
}

fn run_dump(store: Option<PathBuf>) -> Result<(), i32> {
    let table = open_table(store)?;
    let mut lines: Vec<String> = table
        .iter()
        .map(|(name, descriptor)| format_dump_line(name, descriptor))
        .collect();
    lines.sort_unstable();
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn main() {
    logging::init();

    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(ParsedArgs { command, store })) => {
            let result = match command {
                Command::Import { input } => run_import(&input, store),
                Command::Lookup { name } => run_lookup(&name, store),
                Command::Dump => run_dump(store),
            };
            match result {
                Ok(()) => 0,
                Err(code) => code,
            }
        }
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::{parse_args, Command, ParseResult, ParsedArgs};
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn args(values: &[&str]) -> impl Iterator<Item = OsString> {
        values
            .iter()
            .map(OsString::from)
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_import_with_store_override() {
        let result = parse_args(args(&["import", "regs.dump", "--store", "/tmp/at.db"]))
            .expect("valid args");
        match result {
            ParseResult::Command(parsed) => assert_eq!(
                parsed,
                ParsedArgs {
                    command: Command::Import {
                        input: PathBuf::from("regs.dump")
                    },
                    store: Some(PathBuf::from("/tmp/at.db")),
                }
            ),
            ParseResult::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn parses_lookup_and_plain_dump() {
        match parse_args(args(&["lookup", "GEM_AMC.X"])).expect("valid args") {
            ParseResult::Command(parsed) => assert_eq!(
                parsed.command,
                Command::Lookup {
                    name: "GEM_AMC.X".to_owned()
                }
            ),
            ParseResult::Help => panic!("unexpected help"),
        }
        assert!(matches!(
            parse_args(args(&["dump"])).expect("valid args"),
            ParseResult::Command(ParsedArgs {
                command: Command::Dump,
                store: None,
            })
        ));
    }

    #[test]
    fn rejects_unknown_commands_and_options() {
        assert!(parse_args(args(&["frobnicate"])).is_err());
        assert!(parse_args(args(&["dump", "--bogus"])).is_err());
        assert!(parse_args(args(&["import"])).is_err());
    }

    #[test]
    fn help_flags_win() {
        assert!(matches!(
            parse_args(args(&["--help"])).expect("help"),
            ParseResult::Help
        ));
        assert!(matches!(
            parse_args(args(&["dump", "-h"])).expect("help"),
            ParseResult::Help
        ));
    }
}
