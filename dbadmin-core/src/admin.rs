//! User, group, schema and privilege administration.
//!
//! Every administrative operation is an [`AdminStatement`] rendered to SQL
//! and run through one executor. Identifiers are validated before anything
//! is sent; passwords are escaped as string literals.

use crate::session::{statements::escape_literal, Credentials, ScopedSession, SessionFactory};
use crate::utils::errors::{AdminError, Result};
use serde::Deserialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemPrivilege {
    Backup,
    Databank,
    Ident,
    Schema,
    Shadow,
    Statistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPrivilege {
    Select,
    Insert,
    Update,
    Delete,
    References,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineType {
    Function,
    Procedure,
}

impl fmt::Display for SystemPrivilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SystemPrivilege::Backup => "backup",
            SystemPrivilege::Databank => "databank",
            SystemPrivilege::Ident => "ident",
            SystemPrivilege::Schema => "schema",
            SystemPrivilege::Shadow => "shadow",
            SystemPrivilege::Statistics => "statistics",
        })
    }
}

impl fmt::Display for AccessPrivilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessPrivilege::Select => "select",
            AccessPrivilege::Insert => "insert",
            AccessPrivilege::Update => "update",
            AccessPrivilege::Delete => "delete",
            AccessPrivilege::References => "references",
            AccessPrivilege::All => "all",
        })
    }
}

impl fmt::Display for RoutineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoutineType::Function => "function",
            RoutineType::Procedure => "procedure",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdminStatement {
    CreateUser {
        name: String,
        password: String,
        /// Granted right after the user is created.
        #[serde(default)]
        privileges: Vec<SystemPrivilege>,
    },
    DropUser {
        name: String,
        #[serde(default)]
        cascade: bool,
    },
    ChangePassword {
        name: String,
        password: String,
    },
    CreateGroup {
        name: String,
    },
    DropGroup {
        name: String,
        #[serde(default)]
        cascade: bool,
    },
    CreateSchema {
        name: String,
    },
    DropSchema {
        name: String,
    },
    GrantAccess {
        privilege: AccessPrivilege,
        table: String,
        grantee: String,
        #[serde(default)]
        grantable: bool,
    },
    RevokeAccess {
        privilege: AccessPrivilege,
        table: String,
        grantee: String,
        #[serde(default)]
        cascade: bool,
    },
    GrantExecute {
        routine_type: RoutineType,
        routine: String,
        grantee: String,
        #[serde(default)]
        grantable: bool,
    },
    RevokeExecute {
        routine_type: RoutineType,
        routine: String,
        grantee: String,
        #[serde(default)]
        cascade: bool,
    },
    GrantSystem {
        privilege: SystemPrivilege,
        grantee: String,
        #[serde(default)]
        grantable: bool,
    },
    RevokeSystem {
        privilege: SystemPrivilege,
        grantee: String,
        #[serde(default)]
        cascade: bool,
    },
    GrantMembership {
        group: String,
        grantee: String,
        #[serde(default)]
        grantable: bool,
    },
    RevokeMembership {
        group: String,
        grantee: String,
        #[serde(default)]
        cascade: bool,
    },
}

fn with_grant_option(sql: String, grantable: bool) -> String {
    if grantable {
        sql + " with grant option"
    } else {
        sql
    }
}

fn with_cascade(sql: String, cascade: bool) -> String {
    if cascade {
        sql + " cascade"
    } else {
        sql
    }
}

/// Plain or schema-qualified SQL identifier.
pub(crate) fn ident<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'))
    };
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|&p| valid_part(p)) {
        Ok(value)
    } else {
        Err(AdminError::InvalidParameter(format!(
            "'{}' is not a valid {} identifier",
            value, field
        )))
    }
}

/// Unqualified identifier: user, group and schema names.
pub(crate) fn name<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if value.contains('.') {
        return Err(AdminError::InvalidParameter(format!(
            "'{}' is not a valid {} name",
            value, field
        )));
    }
    ident(field, value)
}

impl AdminStatement {
    /// Renders the statement, validating every identifier first.
    pub fn render(&self) -> Result<Vec<String>> {
        let sql = match self {
            AdminStatement::CreateUser {
                name: user,
                password,
                privileges,
            } => {
                let user = name("user", user)?;
                let mut sql = vec![format!(
                    "create ident {} as user using '{}'",
                    user,
                    escape_literal(password)
                )];
                sql.extend(privileges.iter().map(|p| format!("grant {} to {}", p, user)));
                return Ok(sql);
            }
            AdminStatement::DropUser { name: user, cascade } | AdminStatement::DropGroup { name: user, cascade } => {
                with_cascade(format!("drop ident {}", name("ident", user)?), *cascade)
            }
            AdminStatement::ChangePassword { name: user, password } => format!(
                "alter ident {} set password '{}'",
                name("user", user)?,
                escape_literal(password)
            ),
            AdminStatement::CreateGroup { name: group } => {
                format!("create ident {} as group", name("group", group)?)
            }
            AdminStatement::CreateSchema { name: schema } => format!("create schema {}", name("schema", schema)?),
            AdminStatement::DropSchema { name: schema } => format!("drop schema {}", name("schema", schema)?),
            AdminStatement::GrantAccess {
                privilege,
                table,
                grantee,
                grantable,
            } => with_grant_option(
                format!(
                    "grant {} on {} to {}",
                    privilege,
                    ident("table", table)?,
                    name("grantee", grantee)?
                ),
                *grantable,
            ),
            AdminStatement::RevokeAccess {
                privilege,
                table,
                grantee,
                cascade,
            } => with_cascade(
                format!(
                    "revoke {} on {} from {}",
                    privilege,
                    ident("table", table)?,
                    name("grantee", grantee)?
                ),
                *cascade,
            ),
            AdminStatement::GrantExecute {
                routine_type,
                routine,
                grantee,
                grantable,
            } => with_grant_option(
                format!(
                    "grant execute on {} {} to {}",
                    routine_type,
                    ident("routine", routine)?,
                    name("grantee", grantee)?
                ),
                *grantable,
            ),
            AdminStatement::RevokeExecute {
                routine_type,
                routine,
                grantee,
                cascade,
            } => with_cascade(
                format!(
                    "revoke execute on {} {} from {}",
                    routine_type,
                    ident("routine", routine)?,
                    name("grantee", grantee)?
                ),
                *cascade,
            ),
            AdminStatement::GrantSystem {
                privilege,
                grantee,
                grantable,
            } => with_grant_option(
                format!("grant {} to {}", privilege, name("grantee", grantee)?),
                *grantable,
            ),
            AdminStatement::RevokeSystem {
                privilege,
                grantee,
                cascade,
            } => with_cascade(
                format!("revoke {} from {}", privilege, name("grantee", grantee)?),
                *cascade,
            ),
            AdminStatement::GrantMembership {
                group,
                grantee,
                grantable,
            } => with_grant_option(
                format!(
                    "grant member on group {} to {}",
                    name("group", group)?,
                    name("grantee", grantee)?
                ),
                *grantable,
            ),
            AdminStatement::RevokeMembership { group, grantee, cascade } => with_cascade(
                format!(
                    "revoke member on group {} from {}",
                    name("group", group)?,
                    name("grantee", grantee)?
                ),
                *cascade,
            ),
        };
        Ok(vec![sql])
    }
}

/// Runs `statement` as `credentials` against `database`.
pub fn execute_admin(
    sessions: &dyn SessionFactory,
    database: &str,
    credentials: &Credentials,
    statement: &AdminStatement,
) -> Result<()> {
    let sql = statement.render()?;
    let mut session = ScopedSession::open(sessions, database, credentials)?;
    for stmt in &sql {
        match session.execute(stmt) {
            Ok(()) => {}
            // A membership grant to an unknown grantee counts as done.
            Err(AdminError::Database { message, .. })
                if matches!(statement, AdminStatement::GrantMembership { .. })
                    && message.to_ascii_lowercase().contains("does not exist") =>
            {
                info!(database = %database, "Ignoring membership grant to unknown grantee: {}", message);
            }
            Err(e) => return Err(e),
        }
    }
    info!(database = %database, statements = sql.len(), "Administrative statement executed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, FakeSessionFactory};

    fn run(engine: &FakeEngine, statement: &AdminStatement) -> Result<()> {
        let sessions = FakeSessionFactory::new(engine.clone());
        execute_admin(&sessions, "shop", &Credentials::new("SYSADM", "pw"), statement)
    }

    #[test]
    fn test_create_user_with_privileges() {
        let statement: AdminStatement = serde_json::from_str(
            r#"{"kind":"create_user","name":"alice","password":"it's","privileges":["backup","schema"]}"#,
        )
        .unwrap();
        assert_eq!(
            statement.render().unwrap(),
            vec![
                "create ident alice as user using 'it''s'",
                "grant backup to alice",
                "grant schema to alice",
            ]
        );
    }

    #[test]
    fn test_render_grants_and_revokes() {
        let grant: AdminStatement = serde_json::from_str(
            r#"{"kind":"grant_access","privilege":"select","table":"sales.orders","grantee":"bob","grantable":true}"#,
        )
        .unwrap();
        assert_eq!(
            grant.render().unwrap(),
            vec!["grant select on sales.orders to bob with grant option"]
        );

        let revoke = AdminStatement::RevokeExecute {
            routine_type: RoutineType::Procedure,
            routine: "sales.close_day".into(),
            grantee: "bob".into(),
            cascade: true,
        };
        assert_eq!(
            revoke.render().unwrap(),
            vec!["revoke execute on procedure sales.close_day from bob cascade"]
        );

        let drop = AdminStatement::DropGroup {
            name: "clerks".into(),
            cascade: false,
        };
        assert_eq!(drop.render().unwrap(), vec!["drop ident clerks"]);
    }

    #[test]
    fn test_rejects_unknown_routine_type() {
        let parsed: std::result::Result<AdminStatement, _> = serde_json::from_str(
            r#"{"kind":"grant_execute","routine_type":"trigger","routine":"t","grantee":"bob"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_invalid_identifier_never_reaches_engine() {
        let engine = FakeEngine::new(vec![]);
        let statement = AdminStatement::DropUser {
            name: "bob; drop schema sales".into(),
            cascade: false,
        };
        let err = run(&engine, &statement).unwrap_err();
        assert!(matches!(err, AdminError::InvalidParameter(_)));
        assert_eq!(err.error_code(), 12872);
        assert_eq!(engine.opened_sessions(), 0);

        let qualified = AdminStatement::CreateSchema { name: "a.b".into() };
        assert!(qualified.render().is_err());
    }

    #[test]
    fn test_engine_error_passes_through() {
        let engine = FakeEngine::new(vec![]);
        engine.fail_on("create schema", -12560);
        let err = run(&engine, &AdminStatement::CreateSchema { name: "sales".into() }).unwrap_err();
        assert_eq!(err.error_code(), -12560);
        assert_eq!(engine.closed_sessions(), 1);
    }

    #[test]
    fn test_membership_grant_to_unknown_grantee_succeeds() {
        struct Missing;
        impl crate::session::SessionFactory for Missing {
            fn connect(
                &self,
                _database: &str,
                _credentials: &Credentials,
            ) -> Result<Box<dyn crate::session::DatabaseSession>> {
                struct S;
                impl crate::session::DatabaseSession for S {
                    fn execute(&mut self, _sql: &str) -> Result<()> {
                        Err(AdminError::Database {
                            code: -12517,
                            message: "Ident GHOST does not exist".into(),
                        })
                    }
                    fn query(&mut self, _query: &crate::session::Query) -> Result<Vec<Vec<String>>> {
                        Ok(vec![])
                    }
                    fn storage_units(&mut self) -> Result<Vec<crate::units::StorageUnit>> {
                        Ok(vec![])
                    }
                    fn close(&mut self) {}
                }
                Ok(Box::new(S))
            }
        }

        let creds = Credentials::new("SYSADM", "pw");
        let grant = AdminStatement::GrantMembership {
            group: "clerks".into(),
            grantee: "ghost".into(),
            grantable: false,
        };
        execute_admin(&Missing, "shop", &creds, &grant).unwrap();

        let revoke = AdminStatement::RevokeMembership {
            group: "clerks".into(),
            grantee: "ghost".into(),
            cascade: false,
        };
        assert_eq!(execute_admin(&Missing, "shop", &creds, &revoke).unwrap_err().error_code(), -12517);
    }

    #[test]
    fn test_statements_run_in_order() {
        let engine = FakeEngine::new(vec![]);
        run(
            &engine,
            &AdminStatement::CreateUser {
                name: "carol".into(),
                password: "pw".into(),
                privileges: vec![SystemPrivilege::Ident],
            },
        )
        .unwrap();
        assert_eq!(
            engine.executed(),
            vec!["create ident carol as user using 'pw'", "grant ident to carol"]
        );
    }
}
