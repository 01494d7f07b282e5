//! Read-only catalog lookups: users, groups, schemas, tables and views.
//!
//! Every lookup runs as the caller on one scoped session and reads the
//! engine's information schema. Names are validated like administrative
//! statements before anything is sent.

use crate::admin::name;
use crate::session::statements::escape_literal;
use crate::session::{Credentials, DatabaseSession, Query, ScopedSession, SessionFactory};
use crate::utils::errors::{AdminError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Schemas owned by the engine itself.
const SYSTEM_SCHEMAS: &str = "('SYSTEM', 'INFORMATION_SCHEMA', 'MIMER', 'ODBC')";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lookup {
    /// Every user except the caller.
    ListUsers,
    /// A user's creator, sub-users, schemas, groups and privileges. The
    /// caller when no name is given.
    User {
        #[serde(default)]
        name: Option<String>,
    },
    Group {
        name: String,
    },
    ListSchemas,
    Schema {
        name: String,
    },
    Table {
        schema: String,
        name: String,
    },
    View {
        schema: String,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub privilege: String,
    pub grantor: String,
    pub is_grantable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectGrant {
    /// Schema-qualified object name.
    pub object_name: String,
    pub privilege: String,
    pub grantor: String,
    pub is_grantable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserList {
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub creator: Option<String>,
    pub sub_users: Vec<String>,
    pub own_schemas: Vec<String>,
    pub groups: Vec<String>,
    pub system_privileges: Vec<Grant>,
    pub table_privileges: Vec<ObjectGrant>,
    pub function_privileges: Vec<ObjectGrant>,
    pub procedure_privileges: Vec<ObjectGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub creator: String,
    pub members: Vec<String>,
    pub system_privileges: Vec<Grant>,
    pub table_privileges: Vec<ObjectGrant>,
    pub function_privileges: Vec<ObjectGrant>,
    pub procedure_privileges: Vec<ObjectGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaList {
    pub schemas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: String,
    pub tables: Vec<String>,
    pub views: Vec<String>,
    pub procedures: Vec<String>,
    pub functions: Vec<String>,
    pub indexes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<Column>,
    pub number_of_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub number_of_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LookupResult {
    Users(UserList),
    User(UserInfo),
    Group(GroupInfo),
    Schemas(SchemaList),
    Schema(SchemaInfo),
    Table(TableInfo),
    View(ViewInfo),
}

impl Lookup {
    /// Checks every name the lookup carries.
    pub fn validate(&self) -> Result<()> {
        match self {
            Lookup::ListUsers | Lookup::ListSchemas | Lookup::User { name: None } => Ok(()),
            Lookup::User { name: Some(user) } => name("user", user).map(|_| ()),
            Lookup::Group { name: group } => name("group", group).map(|_| ()),
            Lookup::Schema { name: schema } => name("schema", schema).map(|_| ()),
            Lookup::Table { schema, name: table } => {
                name("schema", schema)?;
                name("table", table).map(|_| ())
            }
            Lookup::View { schema, name: view } => {
                name("schema", schema)?;
                name("view", view).map(|_| ())
            }
        }
    }
}

/// Runs `lookup` as `credentials` against `database`.
pub fn run_lookup(
    sessions: &dyn SessionFactory,
    database: &str,
    credentials: &Credentials,
    lookup: &Lookup,
) -> Result<LookupResult> {
    lookup.validate()?;
    let mut session = ScopedSession::open(sessions, database, credentials)?;
    let session: &mut dyn DatabaseSession = &mut *session;

    let result = match lookup {
        Lookup::ListUsers => LookupResult::Users(UserList {
            users: column(
                session,
                Query::new(
                    &["ident_name"],
                    format!(
                        "FROM information_schema.ext_idents WHERE ident_type = 'USER' AND ident_name <> {} ORDER BY ident_name",
                        literal(&credentials.user)
                    ),
                ),
            )?,
        }),
        Lookup::User { name: user } => {
            LookupResult::User(user_info(session, user.as_deref().unwrap_or(&credentials.user))?)
        }
        Lookup::Group { name: group } => LookupResult::Group(group_info(session, group)?),
        Lookup::ListSchemas => LookupResult::Schemas(SchemaList {
            schemas: column(
                session,
                Query::new(&["schema_name"], "FROM information_schema.schemata ORDER BY schema_name"),
            )?,
        }),
        Lookup::Schema { name: schema } => LookupResult::Schema(schema_info(session, schema)?),
        Lookup::Table { schema, name: table } => LookupResult::Table(table_info(session, schema, table)?),
        Lookup::View { schema, name: view } => LookupResult::View(view_info(session, schema, view)?),
    };
    info!(database = %database, lookup = ?lookup, "Lookup complete");
    Ok(result)
}

fn user_info(session: &mut dyn DatabaseSession, user: &str) -> Result<UserInfo> {
    let user_lit = literal(user);
    Ok(UserInfo {
        name: user.to_string(),
        creator: first(session, creator_query(user))?,
        sub_users: column(
            session,
            Query::new(
                &["ident_name"],
                format!(
                    "FROM information_schema.ext_idents WHERE ident_creator = {} AND ident_type = 'USER' ORDER BY ident_name",
                    user_lit
                ),
            ),
        )?,
        own_schemas: column(
            session,
            Query::new(
                &["schema_name"],
                format!(
                    "FROM information_schema.schemata WHERE schema_owner = {} AND schema_name NOT IN {} ORDER BY schema_name",
                    user_lit, SYSTEM_SCHEMAS
                ),
            ),
        )?,
        groups: column(
            session,
            Query::new(
                &["object_schema || '.' || object_name"],
                format!(
                    "FROM information_schema.ext_object_privileges WHERE privilege_type = 'MEMBER' AND grantee = {}",
                    user_lit
                ),
            ),
        )?,
        system_privileges: system_grants(session, user)?,
        table_privileges: table_grants(session, user)?,
        function_privileges: routine_grants(session, "FUNCTION", user)?,
        procedure_privileges: routine_grants(session, "PROCEDURE", user)?,
    })
}

fn group_info(session: &mut dyn DatabaseSession, group: &str) -> Result<GroupInfo> {
    let creator = first(session, creator_query(group))?
        .ok_or_else(|| AdminError::not_found(format!("Group {} not found", group)))?;
    Ok(GroupInfo {
        name: group.to_string(),
        creator,
        members: column(
            session,
            Query::new(
                &["grantee"],
                format!(
                    "FROM information_schema.ext_object_privileges WHERE object_name = {} AND privilege_type = 'MEMBER' ORDER BY grantee",
                    literal(group)
                ),
            ),
        )?,
        system_privileges: system_grants(session, group)?,
        table_privileges: table_grants(session, group)?,
        function_privileges: routine_grants(session, "FUNCTION", group)?,
        procedure_privileges: routine_grants(session, "PROCEDURE", group)?,
    })
}

fn schema_info(session: &mut dyn DatabaseSession, schema: &str) -> Result<SchemaInfo> {
    let schema_lit = literal(schema);
    let owner = first(
        session,
        Query::new(
            &["schema_owner"],
            format!("FROM information_schema.schemata WHERE schema_name = {}", schema_lit),
        ),
    )?
    .ok_or_else(|| AdminError::not_found(format!("Schema {} not found", schema)))?;

    let routines = |kind: &str| {
        Query::new(
            &["routine_name"],
            format!(
                "FROM information_schema.routines WHERE routine_type = '{}' AND routine_schema = {} ORDER BY routine_name",
                kind, schema_lit
            ),
        )
    };

    let mut indexes = column(
        session,
        Query::new(
            &["index_name"],
            format!(
                "FROM information_schema.ext_index_column_usage WHERE index_schema = {} ORDER BY index_name",
                schema_lit
            ),
        ),
    )?;
    // One row per indexed column.
    indexes.dedup();

    Ok(SchemaInfo {
        name: schema.to_string(),
        owner,
        tables: column(
            session,
            Query::new(
                &["table_name"],
                format!(
                    "FROM information_schema.tables WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY table_name",
                    schema_lit
                ),
            ),
        )?,
        views: column(
            session,
            Query::new(
                &["table_name"],
                format!(
                    "FROM information_schema.views WHERE table_schema = {} ORDER BY table_name",
                    schema_lit
                ),
            ),
        )?,
        procedures: column(session, routines("PROCEDURE"))?,
        functions: column(session, routines("FUNCTION"))?,
        indexes,
    })
}

fn table_info(session: &mut dyn DatabaseSession, schema: &str, table: &str) -> Result<TableInfo> {
    let columns = session.query(&columns_query(schema, table))?;
    if columns.is_empty() {
        return Err(AdminError::not_found(format!("Table {}.{} not found", schema, table)));
    }
    let keys = column(
        session,
        Query::new(
            &["k.column_name"],
            format!(
                "FROM information_schema.key_column_usage k \
                 JOIN information_schema.table_constraints c \
                 ON c.constraint_schema = k.constraint_schema AND c.constraint_name = k.constraint_name \
                 WHERE c.constraint_type = 'PRIMARY KEY' AND c.table_schema = {} AND c.table_name = {}",
                literal(schema),
                literal(table)
            ),
        ),
    )?;
    let columns = columns
        .into_iter()
        .map(|row| {
            let name = field(&row, 0);
            Column {
                primary_key: keys.contains(&name),
                data_type: field(&row, 1),
                name,
            }
        })
        .collect();
    Ok(TableInfo {
        name: format!("{}.{}", schema, table),
        columns,
        number_of_rows: row_count(session, schema, table)?,
    })
}

fn view_info(session: &mut dyn DatabaseSession, schema: &str, view: &str) -> Result<ViewInfo> {
    let columns: Vec<String> = session
        .query(&columns_query(schema, view))?
        .iter()
        .map(|row| field(row, 0))
        .collect();
    if columns.is_empty() {
        return Err(AdminError::not_found(format!("View {}.{} not found", schema, view)));
    }
    Ok(ViewInfo {
        name: format!("{}.{}", schema, view),
        columns,
        number_of_rows: row_count(session, schema, view)?,
    })
}

fn creator_query(ident: &str) -> Query {
    Query::new(
        &["ident_creator"],
        format!("FROM information_schema.ext_idents WHERE ident_name = {}", literal(ident)),
    )
}

fn columns_query(schema: &str, table: &str) -> Query {
    Query::new(
        &["column_name", "data_type"],
        format!(
            "FROM information_schema.columns WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
            literal(schema),
            literal(table)
        ),
    )
}

fn row_count(session: &mut dyn DatabaseSession, schema: &str, table: &str) -> Result<u64> {
    let count = first(session, Query::new(&["COUNT(*)"], format!("FROM {}.{}", schema, table)))?;
    Ok(count.and_then(|c| c.parse().ok()).unwrap_or(0))
}

fn system_grants(session: &mut dyn DatabaseSession, grantee: &str) -> Result<Vec<Grant>> {
    let rows = session.query(&Query::new(
        &["privilege_type", "grantor", "is_grantable"],
        format!(
            "FROM information_schema.ext_system_privileges WHERE grantee = {} ORDER BY privilege_type",
            literal(grantee)
        ),
    ))?;
    Ok(rows
        .iter()
        .map(|row| Grant {
            privilege: field(row, 0),
            grantor: field(row, 1),
            is_grantable: yes(&field(row, 2)),
        })
        .collect())
}

fn table_grants(session: &mut dyn DatabaseSession, grantee: &str) -> Result<Vec<ObjectGrant>> {
    let rows = session.query(&Query::new(
        &[
            "tp.table_schema || '.' || tp.table_name",
            "tp.privilege_type",
            "tp.grantor",
            "tp.is_grantable",
            "t.table_type",
        ],
        format!(
            "FROM information_schema.table_privileges tp \
             JOIN information_schema.tables t ON t.table_schema = tp.table_schema AND t.table_name = tp.table_name \
             WHERE tp.grantee = {} AND tp.table_schema NOT IN {}",
            literal(grantee),
            SYSTEM_SCHEMAS
        ),
    ))?;
    Ok(rows
        .iter()
        .map(|row| ObjectGrant {
            object_type: Some(field(row, 4)).filter(|t| !t.is_empty()),
            ..object_grant(row)
        })
        .collect())
}

fn routine_grants(session: &mut dyn DatabaseSession, kind: &str, grantee: &str) -> Result<Vec<ObjectGrant>> {
    let rows = session.query(&Query::new(
        &["object_schema || '.' || object_name", "privilege_type", "grantor", "is_grantable"],
        format!(
            "FROM information_schema.ext_object_privileges WHERE object_type = '{}' AND grantee = {}",
            kind,
            literal(grantee)
        ),
    ))?;
    Ok(rows.iter().map(|row| object_grant(row)).collect())
}

fn object_grant(row: &[String]) -> ObjectGrant {
    ObjectGrant {
        object_name: field(row, 0),
        privilege: field(row, 1),
        grantor: field(row, 2),
        is_grantable: yes(&field(row, 3)),
        object_type: None,
    }
}

fn column(session: &mut dyn DatabaseSession, query: Query) -> Result<Vec<String>> {
    Ok(session.query(&query)?.iter().map(|row| field(row, 0)).collect())
}

fn first(session: &mut dyn DatabaseSession, query: Query) -> Result<Option<String>> {
    Ok(column(session, query)?.into_iter().next())
}

fn field(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}

fn literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}

fn yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}
