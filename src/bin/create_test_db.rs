use std::path::PathBuf;

use stromtracker::adapters::db::{open_connection, run_migrations, schema_version};

const DEFAULT_TARGET: &str = "./data/stromtracker_test.db";

const USAGE: &str = "create_test_db [--path <file>] [--force]

Creates or upgrades a stromtracker SQLite file.

  --path <file>   file to create (default: ./data/stromtracker_test.db)
  --force         start from an empty file even if one exists";

#[derive(Debug)]
struct Options {
    target: PathBuf,
    replace_existing: bool,
}

fn main() {
    let options = match parse_options(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    match prepare_database(&options) {
        Ok(version) => println!(
            "tracker db ready at {} (schema version {version})",
            options.target.display()
        ),
        Err(message) => {
            eprintln!("could not prepare {}: {message}", options.target.display());
            std::process::exit(1);
        }
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Option<Options>, String> {
    let mut options = Options {
        target: PathBuf::from(DEFAULT_TARGET),
        replace_existing: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--path" => {
                options.target = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or("--path needs a file name")?;
            }
            "--force" => options.replace_existing = true,
            "--help" | "-h" => return Ok(None),
            unknown => return Err(format!("unexpected argument {unknown:?}")),
        }
    }

    Ok(Some(options))
}

fn prepare_database(options: &Options) -> Result<u32, String> {
    if let Some(dir) = options.target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|error| format!("creating {}: {error}", dir.display()))?;
    }

    if options.replace_existing && options.target.is_file() {
        std::fs::remove_file(&options.target).map_err(|error| format!("removing old file: {error}"))?;
    }

    let target = options.target.to_string_lossy();
    let mut connection = open_connection(&target).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;
    schema_version(&connection).map_err(|error| error.to_string())
}
