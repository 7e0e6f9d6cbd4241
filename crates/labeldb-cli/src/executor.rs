//! Runs one command against an open database.

use labeldb_core::catalog::{normalize, Object, SchemaSet};
use labeldb_core::mac::MARKING;
use labeldb_core::{
    ColumnType, Database, Filter, Insert, SchemaKind, Select, TableDefinition, TableRef, Value,
};
use tracing::debug;

use crate::commands::{parse_assignment, parse_column, parse_table, Command};
use crate::formatter::Output;
use crate::CliError;

/// Executes commands as one principal.
pub struct CommandExecutor<'a> {
    db: &'a Database,
    user: String,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(db: &'a Database, user: &str) -> Self {
        Self {
            db,
            user: user.to_string(),
        }
    }

    pub fn execute(&self, command: Command) -> Result<Output, CliError> {
        debug!(user = %self.user, command = ?command, "executing");
        match command {
            Command::Init => {
                let installed = self.db.initialize_mac_schema()?;
                let message = if installed {
                    "label store installed"
                } else {
                    "label store already present"
                };
                Ok(Output::Message(message.to_string()))
            }
            Command::CreateSchema { name, restricted } => {
                let kind = if restricted {
                    SchemaKind::Restricted
                } else {
                    SchemaKind::Regular
                };
                self.db.create_schema(&name, kind)?;
                Ok(Output::Message(format!("schema {} created", normalize(&name))))
            }
            Command::CreateTable {
                table,
                columns,
                primary_key,
            } => self.create_table(&table, &columns, primary_key),
            Command::DropTable { table } => {
                let table = parse_table(&table)?;
                let removed = self.db.drop_table(&table)?;
                Ok(Output::Affected {
                    count: removed,
                    message: format!("dropped {}", table),
                })
            }
            Command::Insert {
                table,
                marking,
                values,
            } => self.insert(&table, marking.as_deref(), &values),
            Command::Select {
                table,
                activate,
                filters,
                columns,
            } => self.select(&table, &activate, &filters, columns),
            Command::Grant {
                credential,
                principal,
            } => {
                let session = self.db.open_session(&self.user);
                self.db.grant(&session, &credential, &principal)?;
                Ok(Output::Message(format!(
                    "granted {} to {}",
                    credential.to_uppercase(),
                    principal.to_uppercase()
                )))
            }
            Command::Revoke {
                credential,
                principal,
            } => {
                let session = self.db.open_session(&self.user);
                let removed = self.db.revoke(&session, &credential, &principal)?;
                Ok(Output::Affected {
                    count: removed,
                    message: format!("revoked {} from {}", credential.to_uppercase(), principal.to_uppercase()),
                })
            }
            Command::Credentials { principal } => {
                let principal = principal.unwrap_or_else(|| self.user.clone());
                let held = self.db.credentials(&principal)?;
                Ok(Output::List {
                    header: "CREDENTIAL".to_string(),
                    items: held,
                })
            }
        }
    }

    fn create_table(
        &self,
        table: &str,
        columns: &[String],
        primary_key: Vec<String>,
    ) -> Result<Output, CliError> {
        let table = parse_table(table)?;
        let mut definition = TableDefinition::new(&table.name);
        for column in columns {
            definition = definition.with_column(parse_column(column)?);
        }
        if !primary_key.is_empty() {
            definition = definition.with_primary_key(primary_key);
        }
        let created = self.db.create_table(&table.schema, definition)?;
        Ok(Output::Message(format!("table {} created", created)))
    }

    fn insert(&self, table: &str, marking: Option<&str>, values: &[String]) -> Result<Output, CliError> {
        let table = parse_table(table)?;
        let schemas = self.db.schemas();
        let mut insert = Insert::new(table.clone());
        for assignment in values {
            let (column, literal) = parse_assignment(assignment)?;
            let value = typed_literal(&schemas, &table, &column, &literal)?;
            insert = insert.value(column, value);
        }

        let session = self.db.open_session(&self.user);
        let row_id = self.db.insert(&session, &insert, marking)?;
        Ok(Output::Affected {
            count: 1,
            message: format!("row {} inserted into {}", row_id, table),
        })
    }

    fn select(
        &self,
        table: &str,
        activate: &[String],
        filters: &[String],
        columns: Option<Vec<String>>,
    ) -> Result<Output, CliError> {
        let table = parse_table(table)?;
        let schemas = self.db.schemas();
        let mut select = Select::new(table.clone());
        if let Some(columns) = columns {
            select = select.columns(columns);
        }
        for filter in filters {
            let (column, literal) = parse_assignment(filter)?;
            let value = typed_literal(&schemas, &table, &column, &literal)?;
            select = select.filter(Filter::eq(column, value));
        }

        let mut session = self.db.open_session(&self.user);
        for marking in activate {
            self.db.activate_marking(&mut session, marking)?;
        }
        Ok(Output::Rows(self.db.select(&session, &select)?))
    }
}

/// Type a command-line literal by the column it is assigned to.
///
/// Security view columns take the type of the shadow table column beneath
/// them; the rendered marking column is text.
fn typed_literal(
    schemas: &SchemaSet,
    table: &TableRef,
    column: &str,
    literal: &str,
) -> Result<Value, CliError> {
    let column_type = column_type(schemas, table, column)?;
    column_type.parse_literal(literal).ok_or_else(|| {
        CliError::Usage(format!(
            "'{}' is not a valid {} value for column {}",
            literal,
            column_type,
            normalize(column)
        ))
    })
}

fn column_type(schemas: &SchemaSet, table: &TableRef, column: &str) -> Result<ColumnType, CliError> {
    let found = match schemas.object(table)? {
        Object::Table(def) => def.column(column).map(|c| c.column_type),
        Object::View(view) => match view.shadow() {
            _ if column.trim().eq_ignore_ascii_case(MARKING) => Some(ColumnType::Text),
            Some(shadow) => schemas.table(shadow)?.column(column).map(|c| c.column_type),
            None => Some(ColumnType::Text),
        },
    };
    found.ok_or_else(|| CliError::Usage(format!("{} has no column {}", table, normalize(column))))
}
