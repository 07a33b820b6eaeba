//! DDL parser
//!
//! Reads the `CREATE TABLE` statements of a MySQL dump into a [`SqlSchema`].
//! Other statements (`SET`, `DROP TABLE`, `INSERT`, `CREATE INDEX`, ...) are
//! skipped.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::scanner::{split_definitions, split_top_level, strip_comments, Cursor};
use crate::schema::types::{SqlColumn, SqlForeignKey, SqlIndex, SqlPrimaryKey, SqlSchema, SqlTable};
use crate::utils::naming::{get_foreign_key_name, get_index_name};

const UNIQUE_INDEX_PATTERN: &str = "uq_{table}_{columns}";
const INDEX_PATTERN: &str = "ix_{table}_{columns}";
const FOREIGN_KEY_PATTERN: &str = "fk_{table}_{column}";

const REFERENTIAL_ACTIONS: &[&[&str]] = &[
    &["SET", "NULL"],
    &["SET", "DEFAULT"],
    &["NO", "ACTION"],
    &["CASCADE"],
    &["RESTRICT"],
];

/// Parse DDL text into a schema
pub fn parse(ddl: &str) -> Result<SqlSchema> {
    if ddl.trim().is_empty() {
        return Err(Error::parse("SQL content cannot be empty"));
    }

    let cleaned = strip_comments(ddl);
    let mut tables = Vec::new();

    for statement in split_top_level(&cleaned, ';') {
        if let Some(table) = parse_statement(statement)? {
            tracing::debug!(
                table = %table.name,
                columns = table.columns.len(),
                foreign_keys = table.foreign_keys.len(),
                "Parsed table"
            );
            tables.push(table);
        }
    }

    if tables.is_empty() {
        return Err(Error::parse(
            "No CREATE TABLE statements were found in the SQL schema",
        ));
    }

    Ok(SqlSchema::new(tables))
}

/// Read and parse a DDL file
pub fn parse_file(path: impl AsRef<Path>) -> Result<SqlSchema> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read SQL schema file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse(&content)
}

fn parse_statement(statement: &str) -> Result<Option<SqlTable>> {
    let mut cursor = Cursor::new(statement);
    if !cursor.eat_keyword("CREATE") {
        return Ok(None);
    }
    cursor.eat_keyword("TEMPORARY");
    if !cursor.eat_keyword("TABLE") {
        return Ok(None);
    }
    cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);

    let mut name = cursor
        .identifier()
        .ok_or_else(|| Error::parse_at("Missing table name", statement))?;
    if cursor.eat_char('.') {
        name = cursor
            .identifier()
            .ok_or_else(|| Error::parse_at("Missing table name after schema qualifier", statement))?;
    }

    let body = cursor.paren_group().ok_or_else(|| {
        Error::parse_at(
            format!("Expected a parenthesized definition list for table `{}`", name),
            statement,
        )
    })?;

    parse_table(&name, body).map(Some)
}

/// Columns named by a key clause, checked once every column is known
struct KeyReference<'a> {
    columns: Vec<String>,
    fragment: &'a str,
}

fn parse_table(name: &str, body: &str) -> Result<SqlTable> {
    let mut table = SqlTable::new(name);
    let fragments = split_definitions(body);
    let mut references = Vec::new();

    for fragment in &fragments {
        if let Some(columns) = parse_definition(&mut table, fragment)? {
            references.push(KeyReference {
                columns,
                fragment: fragment.as_str(),
            });
        }
    }

    for reference in &references {
        for column in &reference.columns {
            if table.column(column).is_none() {
                return Err(Error::parse_at(
                    format!("Column `{}` is not declared on table `{}`", column, table.name),
                    reference.fragment,
                ));
            }
        }
    }

    Ok(table)
}

/// Parse one clause into `table`. Key clauses return the columns they name.
fn parse_definition(table: &mut SqlTable, fragment: &str) -> Result<Option<Vec<String>>> {
    let mut cursor = Cursor::new(fragment);

    if cursor.eat_keyword("CONSTRAINT") {
        let constraint_name = if starts_constraint_body(&mut cursor) {
            None
        } else {
            cursor.identifier()
        };
        return parse_constraint(table, &mut cursor, constraint_name, fragment);
    }

    if starts_constraint_body(&mut cursor) {
        return parse_constraint(table, &mut cursor, None, fragment);
    }

    if cursor.eat_keyword("KEY") || cursor.eat_keyword("INDEX") {
        let index = parse_index_tail(&mut cursor, None, false, &table.name, fragment)?;
        let columns = index.columns.clone();
        table.add_index(index);
        return Ok(Some(columns));
    }

    if cursor.eat_keyword("FULLTEXT") || cursor.eat_keyword("SPATIAL") {
        let _ = cursor.eat_keyword("KEY") || cursor.eat_keyword("INDEX");
        let index = parse_index_tail(&mut cursor, None, false, &table.name, fragment)?;
        let columns = index.columns.clone();
        table.add_index(index);
        return Ok(Some(columns));
    }

    parse_column(table, &mut cursor, fragment)?;
    Ok(None)
}

fn starts_constraint_body(cursor: &mut Cursor<'_>) -> bool {
    cursor.peek_keyword("PRIMARY")
        || cursor.peek_keyword("UNIQUE")
        || cursor.peek_keyword("FOREIGN")
        || cursor.peek_keyword("CHECK")
}

fn parse_constraint(
    table: &mut SqlTable,
    cursor: &mut Cursor<'_>,
    constraint_name: Option<String>,
    fragment: &str,
) -> Result<Option<Vec<String>>> {
    if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
        let pk = parse_primary_key(cursor, constraint_name, fragment)?;
        let columns = pk.columns.clone();
        set_primary_key(table, pk, fragment)?;
        return Ok(Some(columns));
    }

    if cursor.eat_keyword("UNIQUE") {
        let _ = cursor.eat_keyword("KEY") || cursor.eat_keyword("INDEX");
        let index = parse_index_tail(cursor, constraint_name, true, &table.name, fragment)?;
        let columns = index.columns.clone();
        table.add_index(index);
        return Ok(Some(columns));
    }

    if cursor.eat_keywords(&["FOREIGN", "KEY"]) {
        let fk = parse_foreign_key(cursor, constraint_name, &table.name, fragment)?;
        let columns = fk.columns.clone();
        table.add_foreign_key(fk);
        return Ok(Some(columns));
    }

    if cursor.eat_keyword("CHECK") {
        return Ok(None);
    }

    Err(Error::parse_at("Unsupported constraint definition", fragment))
}

fn set_primary_key(table: &mut SqlTable, pk: SqlPrimaryKey, fragment: &str) -> Result<()> {
    if table.primary_key.is_some() {
        return Err(Error::parse_at(
            format!("Table `{}` declares more than one primary key", table.name),
            fragment,
        ));
    }
    table.set_primary_key(pk);
    Ok(())
}

fn parse_using(cursor: &mut Cursor<'_>) -> Option<String> {
    if cursor.eat_keyword("USING") {
        cursor.word().map(str::to_uppercase)
    } else {
        None
    }
}

/// Optional name in front of a column list
fn declared_name(cursor: &mut Cursor<'_>) -> Option<String> {
    if cursor.peek_char() == Some('(') || cursor.peek_keyword("USING") {
        None
    } else {
        cursor.identifier()
    }
}

fn parse_primary_key(
    cursor: &mut Cursor<'_>,
    constraint_name: Option<String>,
    fragment: &str,
) -> Result<SqlPrimaryKey> {
    parse_using(cursor);
    let declared = declared_name(cursor);
    parse_using(cursor);
    let inner = cursor
        .paren_group()
        .ok_or_else(|| Error::parse_at("Unable to parse primary key definition", fragment))?;
    let columns = parse_column_list(inner, fragment)?;

    Ok(SqlPrimaryKey {
        name: constraint_name.or(declared),
        columns,
    })
}

fn parse_index_tail(
    cursor: &mut Cursor<'_>,
    constraint_name: Option<String>,
    is_unique: bool,
    table_name: &str,
    fragment: &str,
) -> Result<SqlIndex> {
    let mut method = parse_using(cursor);
    let declared = declared_name(cursor);
    method = method.or_else(|| parse_using(cursor));
    let inner = cursor
        .paren_group()
        .ok_or_else(|| Error::parse_at("Unable to parse index definition", fragment))?;
    let columns = parse_column_list(inner, fragment)?;
    method = method.or_else(|| parse_using(cursor));

    let name = constraint_name.or(declared).unwrap_or_else(|| {
        let pattern = if is_unique { UNIQUE_INDEX_PATTERN } else { INDEX_PATTERN };
        get_index_name(pattern, table_name, &columns)
    });

    Ok(SqlIndex {
        name,
        columns,
        is_unique,
        method,
    })
}

fn parse_foreign_key(
    cursor: &mut Cursor<'_>,
    constraint_name: Option<String>,
    table_name: &str,
    fragment: &str,
) -> Result<SqlForeignKey> {
    let malformed = || Error::parse_at("Unable to parse foreign key definition", fragment);

    let declared = declared_name(cursor);
    let columns = parse_column_list(cursor.paren_group().ok_or_else(malformed)?, fragment)?;

    if !cursor.eat_keyword("REFERENCES") {
        return Err(malformed());
    }
    let mut referenced_table = cursor.identifier().ok_or_else(malformed)?;
    if cursor.eat_char('.') {
        referenced_table = cursor.identifier().ok_or_else(malformed)?;
    }
    let referenced_columns =
        parse_column_list(cursor.paren_group().ok_or_else(malformed)?, fragment)?;

    let mut on_delete = None;
    let mut on_update = None;
    while !cursor.is_at_end() {
        if cursor.eat_keywords(&["ON", "DELETE"]) {
            on_delete = Some(parse_referential_action(cursor, fragment)?);
        } else if cursor.eat_keywords(&["ON", "UPDATE"]) {
            on_update = Some(parse_referential_action(cursor, fragment)?);
        } else if cursor.eat_keyword("MATCH") {
            cursor.skip_token();
        } else {
            return Err(malformed());
        }
    }

    let name = constraint_name
        .or(declared)
        .unwrap_or_else(|| get_foreign_key_name(FOREIGN_KEY_PATTERN, table_name, &columns.join("_")));

    Ok(SqlForeignKey {
        name,
        columns,
        referenced_table,
        referenced_columns,
        on_delete,
        on_update,
    })
}

fn parse_referential_action(cursor: &mut Cursor<'_>, fragment: &str) -> Result<String> {
    REFERENTIAL_ACTIONS
        .iter()
        .find(|words| cursor.eat_keywords(words))
        .map(|words| words.join(" "))
        .ok_or_else(|| Error::parse_at("Unknown referential action", fragment))
}

/// Split a key column list, dropping prefix lengths and sort order
fn parse_column_list(inner: &str, fragment: &str) -> Result<Vec<String>> {
    let columns = split_top_level(inner, ',')
        .into_iter()
        .map(|item| Cursor::new(item).identifier())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::parse_at("Unable to parse column list", fragment))?;

    if columns.is_empty() {
        return Err(Error::parse_at("Empty column list", fragment));
    }
    Ok(columns)
}

fn parse_column(table: &mut SqlTable, cursor: &mut Cursor<'_>, fragment: &str) -> Result<()> {
    let malformed = || Error::parse_at("Unable to parse column definition", fragment);

    let name = cursor.identifier().ok_or_else(malformed)?;
    let mut data_type = cursor.word().ok_or_else(malformed)?.to_string();
    if let Some(params) = cursor.paren_group() {
        data_type = format!("{}({})", data_type, params);
    }

    if table.column(&name).is_some() {
        return Err(Error::parse_at(
            format!("Duplicate column `{}` in table `{}`", name, table.name),
            fragment,
        ));
    }

    let mut column = SqlColumn {
        name,
        data_type,
        nullable: true,
        default: None,
        auto_increment: false,
        unsigned: false,
        definition: fragment.trim().to_string(),
    };
    let mut inline_primary = false;
    let mut inline_unique = false;

    while !cursor.is_at_end() {
        if cursor.eat_keywords(&["NOT", "NULL"]) {
            column.nullable = false;
        } else if cursor.eat_keyword("UNSIGNED") {
            column.unsigned = true;
        } else if cursor.eat_keyword("AUTO_INCREMENT") {
            column.auto_increment = true;
        } else if cursor.eat_keyword("DEFAULT") {
            column.default = Some(parse_default_literal(cursor, fragment)?);
        } else if cursor.eat_keywords(&["ON", "UPDATE"]) {
            parse_default_literal(cursor, fragment)?;
        } else if cursor.eat_keywords(&["PRIMARY", "KEY"]) || cursor.eat_keyword("KEY") {
            inline_primary = true;
        } else if cursor.eat_keyword("UNIQUE") {
            cursor.eat_keyword("KEY");
            inline_unique = true;
        } else {
            // NULL, COMMENT '...', COLLATE x, CHARACTER SET x, GENERATED ... AS (...)
            cursor.skip_token();
        }
    }

    if inline_primary {
        let pk = SqlPrimaryKey {
            name: None,
            columns: vec![column.name.clone()],
        };
        set_primary_key(table, pk, fragment)?;
    }
    if inline_unique {
        table.add_index(SqlIndex {
            name: column.name.clone(),
            columns: vec![column.name.clone()],
            is_unique: true,
            method: None,
        });
    }

    table.add_column(column);
    Ok(())
}

/// The literal after DEFAULT (or ON UPDATE), kept as written
fn parse_default_literal(cursor: &mut Cursor<'_>, fragment: &str) -> Result<String> {
    let missing = || Error::parse_at("Missing DEFAULT value", fragment);

    match cursor.peek_char() {
        Some('\'') | Some('"') => cursor.quoted_string().map(str::to_string).ok_or_else(missing),
        Some('(') => cursor
            .paren_group()
            .map(|inner| format!("({})", inner))
            .ok_or_else(missing),
        Some(_) => {
            let token = cursor.bare_token().ok_or_else(missing)?;
            // CURRENT_TIMESTAMP(6), now()
            if cursor.rest().starts_with('(') {
                let args = cursor.paren_group().ok_or_else(missing)?;
                Ok(format!("{}({})", token, args))
            } else {
                Ok(token.to_string())
            }
        }
        None => Err(missing()),
    }
}
