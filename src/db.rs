// connexion BD + création du schéma

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    Schema, Statement,
};
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::{
    capstone_projects, course_categories, courses, email_verification_tokens, enrollments,
    password_reset_tokens, payment_installments, project_enrollments, user_profiles, users,
};

pub async fn establish_connection(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options
        .max_connections(20)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    Database::connect(options).await
}

/// Tables (clés étrangères ON DELETE CASCADE issues des relations) puis
/// index UNIQUE composites. Tout est en IF NOT EXISTS : rejouable à chaque démarrage.
pub fn schema_statements(backend: DbBackend) -> Vec<Statement> {
    let schema = Schema::new(backend);

    // Ordre des tables = ordre des clés étrangères
    let mut statements = vec![
        create_table(&schema, backend, users::Entity),
        create_table(&schema, backend, user_profiles::Entity),
        create_table(&schema, backend, email_verification_tokens::Entity),
        create_table(&schema, backend, password_reset_tokens::Entity),
        create_table(&schema, backend, course_categories::Entity),
        create_table(&schema, backend, courses::Entity),
        create_table(&schema, backend, capstone_projects::Entity),
        create_table(&schema, backend, enrollments::Entity),
        create_table(&schema, backend, payment_installments::Entity),
        create_table(&schema, backend, project_enrollments::Entity),
    ];

    let composite = [
        unique_index(
            enrollments::Entity,
            "idx_enrollments_user_course",
            &[enrollments::Column::UserId, enrollments::Column::CourseId],
        ),
        unique_index(
            payment_installments::Entity,
            "idx_payment_installments_enrollment_number",
            &[
                payment_installments::Column::EnrollmentId,
                payment_installments::Column::InstallmentNumber,
            ],
        ),
        unique_index(
            project_enrollments::Entity,
            "idx_project_enrollments_enrollment_project",
            &[
                project_enrollments::Column::EnrollmentId,
                project_enrollments::Column::ProjectId,
            ],
        ),
        unique_index(
            capstone_projects::Entity,
            "idx_capstone_projects_course_order",
            &[capstone_projects::Column::CourseId, capstone_projects::Column::Order],
        ),
    ];
    statements.extend(composite.iter().map(|index| backend.build(index)));

    statements
}

fn create_table<E: EntityTrait>(schema: &Schema, backend: DbBackend, entity: E) -> Statement {
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    backend.build(&table)
}

fn unique_index<E>(entity: E, name: &str, columns: &[E::Column]) -> IndexCreateStatement
where
    E: EntityTrait,
{
    let mut index = Index::create();
    index.name(name).table(entity).unique().if_not_exists();
    for column in columns {
        index.col(*column);
    }
    index
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let statements = schema_statements(db.get_database_backend());
    let count = statements.len();
    for statement in statements {
        db.execute(statement).await?;
    }
    tracing::info!(statements = count, "database schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, MockExecResult};

    fn postgres_sql() -> Vec<String> {
        schema_statements(DbBackend::Postgres)
            .into_iter()
            .map(|s| s.sql)
            .collect()
    }

    fn table_sql(sql: &[String], table: &str) -> String {
        let prefix = format!("CREATE TABLE IF NOT EXISTS \"{}\"", table);
        sql.iter()
            .find(|s| s.starts_with(&prefix))
            .cloned()
            .unwrap_or_else(|| panic!("no CREATE TABLE for {}", table))
    }

    #[test]
    fn test_composite_unique_indexes() {
        let sql = postgres_sql();
        let unique: Vec<&String> = sql.iter().filter(|s| s.starts_with("CREATE UNIQUE INDEX")).collect();

        for (table, columns) in [
            ("enrollments", "(\"user_id\", \"course_id\")"),
            ("payment_installments", "(\"enrollment_id\", \"installment_number\")"),
            ("project_enrollments", "(\"enrollment_id\", \"project_id\")"),
            ("capstone_projects", "(\"course_id\", \"order\")"),
        ] {
            let on_table = format!("ON \"{}\" {}", table, columns);
            assert!(
                unique.iter().any(|s| s.contains(&on_table)),
                "missing unique index {}",
                on_table
            );
        }
        assert!(unique.iter().all(|s| s.contains("IF NOT EXISTS")));
    }

    #[test]
    fn test_children_of_enrollment_cascade() {
        let sql = postgres_sql();

        for table in ["payment_installments", "project_enrollments"] {
            let create = table_sql(&sql, table);
            assert!(create.contains("REFERENCES \"enrollments\" (\"id\") ON DELETE CASCADE"), "{}", create);
        }

        let enrollments = table_sql(&sql, "enrollments");
        assert!(enrollments.contains("REFERENCES \"users\" (\"id\") ON DELETE CASCADE"));
    }

    #[test]
    fn test_parent_tables_come_first() {
        let sql = postgres_sql();
        let position = |table: &str| {
            let prefix = format!("CREATE TABLE IF NOT EXISTS \"{}\"", table);
            sql.iter().position(|s| s.starts_with(&prefix)).unwrap()
        };

        assert!(position("users") < position("enrollments"));
        assert!(position("courses") < position("enrollments"));
        assert!(position("enrollments") < position("payment_installments"));
        assert!(position("capstone_projects") < position("project_enrollments"));
    }

    #[tokio::test]
    async fn test_ensure_schema_runs_every_statement() {
        let expected = schema_statements(DbBackend::Postgres).len();
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results((0..expected).map(|_| MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }))
            .into_connection();

        ensure_schema(&db).await.unwrap();
        assert_eq!(db.into_transaction_log().len(), expected);
    }
}
