//! Command-string builders: plain `String`-returning helpers for the
//! handful of DDL forms callers commonly need. Not a general InfluxQL AST
//! builder.

/// `SHOW DATABASES`.
pub fn show_databases() -> String {
    "SHOW DATABASES".to_string()
}

/// `CREATE DATABASE <name>`.
pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {name}")
}

/// `DROP DATABASE <name>`.
pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE {name}")
}

/// `CREATE RETENTION POLICY <name> ON <db> DURATION <duration> REPLICATION <n> [DEFAULT]`.
pub fn create_retention_policy(
    name: &str,
    database: &str,
    duration: &str,
    replication: u32,
    default: bool,
) -> String {
    let mut cmd = format!(
        "CREATE RETENTION POLICY {name} ON {database} DURATION {duration} REPLICATION {replication}"
    );
    if default {
        cmd.push_str(" DEFAULT");
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, StatementType};

    #[test]
    fn show_databases_classifies_as_query() {
        assert_eq!(classify(&show_databases()), StatementType::Query);
    }

    #[test]
    fn create_database_classifies_as_command() {
        let cmd = create_database("telemetry");
        assert_eq!(cmd, "CREATE DATABASE telemetry");
        assert_eq!(classify(&cmd), StatementType::Command);
    }

    #[test]
    fn drop_database_builds_expected_text() {
        assert_eq!(drop_database("telemetry"), "DROP DATABASE telemetry");
    }

    #[test]
    fn create_retention_policy_with_default_flag() {
        let cmd = create_retention_policy("rp0", "telemetry", "30d", 1, true);
        assert_eq!(
            cmd,
            "CREATE RETENTION POLICY rp0 ON telemetry DURATION 30d REPLICATION 1 DEFAULT"
        );
        assert_eq!(classify(&cmd), StatementType::Command);
    }

    #[test]
    fn create_retention_policy_without_default_flag() {
        let cmd = create_retention_policy("rp0", "telemetry", "30d", 2, false);
        assert_eq!(
            cmd,
            "CREATE RETENTION POLICY rp0 ON telemetry DURATION 30d REPLICATION 2"
        );
    }
}
