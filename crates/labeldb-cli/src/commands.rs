//! Subcommands and their argument parsing.

use clap::Subcommand;
use labeldb_core::{ColumnDef, ColumnType, TableRef};

use crate::CliError;

/// Administrative commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and install the label store
    Init,

    /// Create a schema
    CreateSchema {
        /// Schema name
        name: String,

        /// Put the schema under mandatory access control
        #[arg(long)]
        restricted: bool,
    },

    /// Create a table (a restricted table in a restricted schema)
    CreateTable {
        /// Table as SCHEMA.TABLE
        table: String,

        /// Column as NAME:TYPE, or NAME:TYPE:null for a nullable column
        #[arg(long = "column", required = true)]
        columns: Vec<String>,

        /// Primary key column
        #[arg(long = "primary-key")]
        primary_key: Vec<String>,
    },

    /// Drop a table and its rows
    DropTable {
        /// Table as SCHEMA.TABLE
        table: String,
    },

    /// Insert one row
    Insert {
        /// Table as SCHEMA.TABLE
        table: String,

        /// Marking for a row of a restricted table, e.g. SECRET/OPS
        #[arg(long)]
        marking: Option<String>,

        /// Values as COLUMN=VALUE
        values: Vec<String>,
    },

    /// Read rows
    Select {
        /// Table or view as SCHEMA.NAME
        table: String,

        /// Marking to activate before reading (repeatable)
        #[arg(long)]
        activate: Vec<String>,

        /// Equality filter as COLUMN=VALUE (repeatable)
        #[arg(long = "where")]
        filters: Vec<String>,

        /// Output columns, comma-separated
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },

    /// Grant a credential (SENSITIVITY/COMPARTMENT) to a principal
    Grant {
        /// Credential, e.g. SECRET/OPS
        credential: String,

        /// Principal receiving the credential
        principal: String,
    },

    /// Revoke a credential from a principal
    Revoke {
        /// Credential, e.g. SECRET/OPS
        credential: String,

        /// Principal losing the credential
        principal: String,
    },

    /// List the credentials a principal holds
    Credentials {
        /// Principal; defaults to --user
        principal: Option<String>,
    },
}

/// Parse `SCHEMA.NAME`.
pub fn parse_table(text: &str) -> Result<TableRef, CliError> {
    match text.split_once('.') {
        Some((schema, name)) if !schema.trim().is_empty() && !name.trim().is_empty() => {
            Ok(TableRef::new(schema, name))
        }
        _ => Err(CliError::Usage(format!(
            "expected SCHEMA.TABLE, got '{}'",
            text
        ))),
    }
}

/// Parse `NAME:TYPE[:null]`. Columns are not null unless marked.
pub fn parse_column(text: &str) -> Result<ColumnDef, CliError> {
    let mut parts = text.split(':');
    let (Some(name), Some(column_type)) = (parts.next(), parts.next()) else {
        return Err(CliError::Usage(format!(
            "expected NAME:TYPE[:null], got '{}'",
            text
        )));
    };
    let column_type: ColumnType = column_type.parse().map_err(CliError::Usage)?;
    let column = ColumnDef::new(name.trim(), column_type);

    match parts.next() {
        None => Ok(column.not_null()),
        Some(flag) if flag.trim().eq_ignore_ascii_case("null") && parts.next().is_none() => {
            Ok(column)
        }
        Some(_) => Err(CliError::Usage(format!(
            "expected NAME:TYPE[:null], got '{}'",
            text
        ))),
    }
}

/// Split `COLUMN=VALUE`.
pub fn parse_assignment(text: &str) -> Result<(String, String), CliError> {
    match text.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::Usage(format!(
            "expected COLUMN=VALUE, got '{}'",
            text
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table() {
        let table = parse_table("intel.reports").unwrap();
        assert_eq!(table.to_string(), "INTEL.REPORTS");
        assert!(parse_table("reports").is_err());
        assert!(parse_table(".reports").is_err());
    }

    #[test]
    fn test_parse_column() {
        let id = parse_column("id:int64").unwrap();
        assert_eq!(id.name, "id");
        assert_eq!(id.column_type, ColumnType::Int64);
        assert!(!id.nullable);

        let body = parse_column("body:text:null").unwrap();
        assert!(body.nullable);

        assert!(parse_column("body").is_err());
        assert!(parse_column("body:blob:maybe").is_err());
        assert!(parse_column("body:widget").is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("body=a=b").unwrap(),
            ("body".to_string(), "a=b".to_string())
        );
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("body").is_err());
    }
}
