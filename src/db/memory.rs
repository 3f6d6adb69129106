//! In-process stand-in for a PostgreSQL cluster, for tests. Nothing in the
//! server binary constructs one.
//!
//! Understands exactly the statement forms this crate emits (database
//! create/drop, role create/drop, role grants) and the managed-databases
//! catalog query; any other statement is accepted and ignored, the way table
//! DDL in a schema template would succeed on a real server. Scripts apply
//! atomically, like a multi-statement simple query in PostgreSQL.

use crate::db::executor::SqlExecutor;
use crate::db::statements::MANAGED_DATABASES;
use crate::error::ProvisionError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One script as submitted to the cluster, in order of arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedScript {
    pub database: String,
    pub sql: String,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    /// database -> owner
    databases: BTreeMap<String, String>,
    /// role -> can login
    roles: BTreeMap<String, bool>,
    /// (group, member)
    members: BTreeSet<(String, String)>,
}

#[derive(Debug, Default)]
struct ClusterState {
    catalog: Catalog,
    history: Vec<ExecutedScript>,
    failing: Vec<String>,
    unreachable: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    /// A cluster holding the service account and its control database.
    pub fn new(service_account: &str, control_database: &str) -> Self {
        let mut catalog = Catalog::default();
        catalog.roles.insert("postgres".to_string(), true);
        catalog.roles.insert(service_account.to_string(), true);
        catalog
            .databases
            .insert("postgres".to_string(), "postgres".to_string());
        catalog
            .databases
            .insert(control_database.to_string(), service_account.to_string());

        Self {
            state: Mutex::new(ClusterState {
                catalog,
                ..ClusterState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Any later script containing `pattern` fails without side effects.
    pub fn fail_statements_containing(&self, pattern: impl Into<String>) {
        self.lock().failing.push(pattern.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Refuse every connection until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.lock().catalog.databases.contains_key(name)
    }

    pub fn database_owner(&self, name: &str) -> Option<String> {
        self.lock().catalog.databases.get(name).cloned()
    }

    pub fn role_exists(&self, name: &str) -> bool {
        self.lock().catalog.roles.contains_key(name)
    }

    pub fn can_login(&self, name: &str) -> bool {
        self.lock().catalog.roles.get(name).copied().unwrap_or(false)
    }

    pub fn is_member(&self, group: &str, member: &str) -> bool {
        self.lock()
            .catalog
            .members
            .contains(&(group.to_string(), member.to_string()))
    }

    pub fn history(&self) -> Vec<ExecutedScript> {
        self.lock().history.clone()
    }

    fn check_reachable(state: &ClusterState, database: &str) -> Result<(), ProvisionError> {
        let reason = if state.unreachable {
            "connection refused".to_string()
        } else if !state.catalog.databases.contains_key(database) {
            format!("database \"{database}\" does not exist")
        } else {
            return Ok(());
        };
        Err(ProvisionError::ConnectionFailure {
            database: database.to_string(),
            source: sqlx::Error::Protocol(reason),
        })
    }
}

#[async_trait]
impl SqlExecutor for InMemoryCluster {
    async fn execute(&self, database: &str, sql: &str) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        Self::check_reachable(&state, database)?;
        state.history.push(ExecutedScript {
            database: database.to_string(),
            sql: sql.to_string(),
        });

        let statement_failure = |reason: String| ProvisionError::StatementFailure {
            database: database.to_string(),
            source: sqlx::Error::Protocol(reason),
        };

        if let Some(pattern) = state.failing.iter().find(|p| sql.contains(p.as_str())) {
            return Err(statement_failure(format!(
                "injected failure for statements containing {pattern:?}"
            )));
        }

        let mut scratch = state.catalog.clone();
        for statement in split_statements(sql) {
            scratch
                .apply(database, &statement)
                .map_err(&statement_failure)?;
        }
        state.catalog = scratch;
        Ok(())
    }

    async fn fetch_column(
        &self,
        database: &str,
        query: &str,
        binds: &[&str],
    ) -> Result<Vec<String>, ProvisionError> {
        let state = self.lock();
        Self::check_reachable(&state, database)?;

        if query != MANAGED_DATABASES {
            return Err(ProvisionError::StatementFailure {
                database: database.to_string(),
                source: sqlx::Error::Protocol("unsupported query".to_string()),
            });
        }
        let owner = binds.first().copied().unwrap_or_default();
        let excluded = binds.get(1).copied().unwrap_or_default();

        Ok(state
            .catalog
            .databases
            .iter()
            .filter(|(name, db_owner)| db_owner.as_str() == owner && name.as_str() != excluded)
            .map(|(name, _)| name.clone())
            .collect())
    }
}

impl Catalog {
    fn apply(&mut self, connected: &str, statement: &str) -> Result<(), String> {
        if let Some(rest) = keywords(statement, &["CREATE", "DATABASE"]) {
            let (name, rest) = ident(rest)?;
            let owner = match keywords(rest, &["WITH", "OWNER"]) {
                Some(rest) => ident(rest)?.0,
                None => "postgres".to_string(),
            };
            if self.databases.contains_key(&name) {
                return Err(format!("database \"{name}\" already exists"));
            }
            if !self.roles.contains_key(&owner) {
                return Err(format!("role \"{owner}\" does not exist"));
            }
            self.databases.insert(name, owner);
        } else if let Some(rest) = keywords(statement, &["DROP", "DATABASE"]) {
            let (if_exists, rest) = optional_if_exists(rest);
            let (name, _) = ident(rest)?;
            if name == connected {
                return Err("cannot drop the currently open database".to_string());
            }
            if self.databases.remove(&name).is_none() && !if_exists {
                return Err(format!("database \"{name}\" does not exist"));
            }
        } else if let Some(rest) = keywords(statement, &["DROP", "USER"])
            .or_else(|| keywords(statement, &["DROP", "ROLE"]))
        {
            let (if_exists, rest) = optional_if_exists(rest);
            let (name, _) = ident(rest)?;
            if self.roles.remove(&name).is_none() && !if_exists {
                return Err(format!("role \"{name}\" does not exist"));
            }
            self.members
                .retain(|(group, member)| *group != name && *member != name);
        } else if let Some(rest) = keywords(statement, &["CREATE", "USER"]) {
            self.create_role(rest, true)?;
        } else if let Some(rest) = keywords(statement, &["CREATE", "ROLE"]) {
            let options = rest.to_ascii_uppercase();
            let login = options.contains("LOGIN") && !options.contains("NOLOGIN");
            self.create_role(rest, login)?;
        } else if let Some(rest) = keywords(statement, &["GRANT"]) {
            // Privilege grants (`GRANT ... ON ...`) are not modelled.
            if rest.to_ascii_uppercase().contains(" ON ") {
                return Ok(());
            }
            let (group, rest) = ident(rest)?;
            let rest = keywords(rest, &["TO"]).ok_or("syntax error in GRANT")?;
            let (member, _) = ident(rest)?;
            for role in [&group, &member] {
                if !self.roles.contains_key(role) {
                    return Err(format!("role \"{role}\" does not exist"));
                }
            }
            self.members.insert((group, member));
        }
        Ok(())
    }

    fn create_role(&mut self, rest: &str, login: bool) -> Result<(), String> {
        let (name, _) = ident(rest)?;
        if self.roles.contains_key(&name) {
            return Err(format!("role \"{name}\" already exists"));
        }
        self.roles.insert(name, login);
        Ok(())
    }
}

/// Splits on `;` outside quotes, dropping `--` comments.
fn split_statements(sql: &str) -> Vec<String> {
    fn flush(current: &mut String, out: &mut Vec<String>) {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
        current.clear();
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            current.push(c);
            if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                while chars.next_if(|next| *next != '\n').is_some() {}
            }
            ';' => flush(&mut current, &mut statements),
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut statements);
    statements
}

/// Strips a case-insensitive keyword sequence from the front of `input`.
fn keywords<'a>(input: &'a str, words: &[&str]) -> Option<&'a str> {
    let mut rest = input;
    for word in words {
        rest = rest.trim_start();
        let head = rest.get(..word.len())?;
        if !head.eq_ignore_ascii_case(word) {
            return None;
        }
        let tail = &rest[word.len()..];
        if tail
            .chars()
            .next()
            .is_some_and(|c| !c.is_whitespace() && c != '"')
        {
            return None;
        }
        rest = tail;
    }
    Some(rest)
}

fn optional_if_exists(input: &str) -> (bool, &str) {
    match keywords(input, &["IF", "EXISTS"]) {
        Some(rest) => (true, rest),
        None => (false, input),
    }
}

/// Parses a quoted or bare identifier; bare identifiers fold to lowercase.
fn ident(input: &str) -> Result<(String, &str), String> {
    let s = input.trim_start();
    if let Some(body) = s.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = body.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' {
                if chars.peek().is_some_and(|(_, next)| *next == '"') {
                    chars.next();
                    name.push('"');
                    continue;
                }
                return Ok((name, &body[i + 1..]));
            }
            name.push(c);
        }
        return Err("unterminated quoted identifier".to_string());
    }

    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(s.len());
    if end == 0 {
        return Err("syntax error: expected identifier".to_string());
    }
    Ok((s[..end].to_lowercase(), &s[end..]))
}
