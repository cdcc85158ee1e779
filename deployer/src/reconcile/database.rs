//! Database existence and schema reconciliation

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::DeployError;
use crate::exec::command::CommandOptions;
use crate::filesys::file::{File, ScratchFile};
use crate::reconcile::listing::ensure_exists;
use crate::reconcile::schema::{quote_ident, DeclaredSchema, Drift, LiveSchema};
use crate::reconcile::{StepContext, StepOutcome, StepRunner};

/// Every user table with its columns, in one round trip
const INTROSPECTION_SQL: &str = "SELECT m.name AS table_name, p.name AS column_name \
     FROM sqlite_master AS m JOIN pragma_table_info(m.name) AS p \
     WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
     AND m.name NOT LIKE '\\_cf\\_%' ESCAPE '\\' \
     ORDER BY m.name";

/// Prefixes of tables owned by the engine or the hosting platform
const INTERNAL_PREFIXES: [&str; 2] = ["sqlite_", "_cf_"];

type Row = Map<String, Value>;

/// Create the database if needed, then bring its schema up to the
/// declared one without destroying data
pub struct EnsureDatabase;

#[async_trait]
impl StepRunner for EnsureDatabase {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let database = ctx.spec.database_name.as_str();
        let commands = &ctx.settings.commands;

        let create = ctx.render(&commands.create_database, &[("database", database)])?;
        let ensured = ensure_exists(
            ctx,
            database,
            &commands.list_databases,
            &ctx.provider_a(ctx.settings.query_options()),
            &create,
            &ctx.provider_a(ctx.settings.mutate_options()),
        )
        .await?;
        let existence = ensured.describe("Database", database);

        let Some(schema_path) = &ctx.settings.paths.schema_file else {
            return Ok(StepOutcome::done(format!("{}, no schema file configured", existence)));
        };
        let schema = DeclaredSchema::parse(&File::new(schema_path).read_string().await?)?;

        ctx.progress("Comparing live schema with declared schema");
        let live = introspect(ctx, database).await?;

        let mut outcome = StepOutcome::default();
        let mut created = Vec::new();
        let mut rebuilt = Vec::new();

        for entry in schema.plan(&live) {
            match entry.drift {
                Drift::UpToDate => {}
                Drift::Missing => created.push(entry.table),
                Drift::MissingColumns(columns) => {
                    let columns = columns.join(", ");
                    match count_rows(ctx, database, &entry.table).await {
                        Ok(0) => {
                            ctx.log(&format!("Dropping empty table {} to add {}", entry.table, columns));
                            drop_table(ctx, database, &entry.table).await?;
                            rebuilt.push(entry.table);
                        }
                        Ok(rows) => {
                            warn!("Not rebuilding {}: {} rows present", entry.table, rows);
                            outcome = outcome.with_warning(format!(
                                "table {} has {} rows but lacks columns {}; left untouched to keep existing data",
                                entry.table, rows, columns
                            ));
                        }
                        Err(err) => {
                            outcome = outcome.with_warning(format!(
                                "table {} lacks columns {} and could not be checked for rows ({}); left untouched",
                                entry.table, columns, err
                            ));
                        }
                    }
                }
            }
        }

        if created.is_empty() && rebuilt.is_empty() {
            outcome.details = format!("{}, schema up to date", existence);
            return Ok(outcome);
        }

        ctx.progress("Applying declared schema");
        let file = ScratchFile::create("dualdeploy-schema", "sql", schema.idempotent_sql().as_bytes()).await?;
        let path = file.path_str();
        let command = ctx.render(
            &commands.apply_schema,
            &[("database", database), ("file", path.as_str())],
        )?;
        ctx.run(&command, &ctx.provider_a(ctx.settings.mutate_options()))
            .await?;
        info!("Applied schema to {} (created {:?}, rebuilt {:?})", database, created, rebuilt);

        let mut changes = Vec::new();
        if !created.is_empty() {
            changes.push(format!("created {}", created.join(", ")));
        }
        if !rebuilt.is_empty() {
            changes.push(format!("rebuilt {}", rebuilt.join(", ")));
        }
        outcome.details = format!("{}, schema applied ({})", existence, changes.join("; "));
        Ok(outcome)
    }
}

async fn query(
    ctx: &StepContext<'_>,
    database: &str,
    sql: &str,
    options: &CommandOptions,
) -> Result<Vec<Row>, DeployError> {
    let command = ctx.render(
        &ctx.settings.commands.query_database,
        &[("database", database), ("sql", sql)],
    )?;
    let result = ctx.run(&command, options).await?;
    parse_rows(&result.stdout)
}

async fn introspect(ctx: &StepContext<'_>, database: &str) -> Result<LiveSchema, DeployError> {
    let options = ctx.provider_a(ctx.settings.query_options());
    let rows = query(ctx, database, INTROSPECTION_SQL, &options).await?;

    let mut live = LiveSchema::new();
    for row in rows {
        let table = row.get("table_name").and_then(Value::as_str);
        let column = row.get("column_name").and_then(Value::as_str);
        if let (Some(table), Some(column)) = (table, column) {
            if is_internal_table(table) {
                continue;
            }
            live.entry(table.to_string()).or_default().insert(column.to_string());
        }
    }
    Ok(live)
}

fn is_internal_table(name: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

async fn count_rows(ctx: &StepContext<'_>, database: &str, table: &str) -> Result<u64, DeployError> {
    let sql = format!("SELECT COUNT(*) AS row_count FROM {}", quote_ident(table));
    let options = ctx.provider_a(ctx.settings.query_options());
    let rows = query(ctx, database, &sql, &options).await?;

    rows.first()
        .and_then(|row| row.get("row_count"))
        .and_then(Value::as_u64)
        .ok_or_else(|| DeployError::SchemaError(format!("no row count returned for {}", table)))
}

async fn drop_table(ctx: &StepContext<'_>, database: &str, table: &str) -> Result<(), DeployError> {
    let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
    let options = ctx.provider_a(ctx.settings.mutate_options());
    query(ctx, database, &sql, &options).await.map(|_| ())
}

/// Rows out of query output: either a bare row array or result sets
/// carrying a `results` array each
pub fn parse_rows(output: &str) -> Result<Vec<Row>, DeployError> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(output)
        .map_err(|e| DeployError::SchemaError(format!("unreadable query output: {}", e)))?;
    let mut rows = Vec::new();
    collect_rows(&value, &mut rows);
    Ok(rows)
}

fn collect_rows(value: &Value, rows: &mut Vec<Row>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_rows(item, rows)),
        Value::Object(map) => match map.get("results") {
            Some(results) => collect_rows(results, rows),
            None => rows.push(map.clone()),
        },
        _ => {}
    }
}
