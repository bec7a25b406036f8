//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `scriptorium_core` linkage and database bootstrap.
//! - Print a project tree as JSON when given a project id.

use clap::Parser;
use log::info;
use scriptorium_core::{
    core_version, init_logging_from_config, open_db, CoreConfig, HierarchyService,
    SqliteHierarchyRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "scriptorium",
    version,
    about = "Open a scriptorium manuscript database and print project outlines"
)]
struct Cli {
    /// Database file; overrides SCRIPTORIUM_DB_PATH
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Project to print as a JSON tree
    project_id: Option<Uuid>,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_logging_from_config(&config).map_err(|err| err.to_string())?;

    let conn = open_db(&config.db_path).map_err(|err| err.to_string())?;
    info!(
        "event=cli_start module=cli status=ok db={}",
        config.db_path.display()
    );

    let Some(project_id) = cli.project_id else {
        println!("scriptorium_core version={}", core_version());
        println!("db_path={}", config.db_path.display());
        return Ok(());
    };

    let repo = SqliteHierarchyRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let tree = HierarchyService::new(repo)
        .build_tree(project_id)
        .map_err(|err| format!("{} ({})", err, err.kind().as_str()))?;
    let json = serde_json::to_string_pretty(&tree).map_err(|err| err.to_string())?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;
    use uuid::Uuid;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_project_id_and_db_override() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "scriptorium",
            "--db",
            "/tmp/book.sqlite3",
            &id.to_string(),
        ])
        .unwrap();
        assert_eq!(cli.project_id, Some(id));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/book.sqlite3")));

        let bare = Cli::try_parse_from(["scriptorium"]).unwrap();
        assert_eq!(bare.project_id, None);
        assert_eq!(bare.db, None);
    }

    #[test]
    fn rejects_malformed_project_id() {
        let err = Cli::try_parse_from(["scriptorium", "not-a-uuid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
