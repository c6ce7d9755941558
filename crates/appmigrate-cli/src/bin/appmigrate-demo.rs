use appmigrate_db::{AppDefinition, InlineMigration, Registry, SqlMigration};

/// Sample "users" application showing both ways of declaring units.
fn users_app() -> AppDefinition {
    AppDefinition::new("users")
        .migration(SqlMigration {
            id: "0001_add_user",
            up: "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);
                 CREATE UNIQUE INDEX idx_users_email ON users(email);",
            down: "DROP TABLE users;",
        })
        .migration(
            InlineMigration::new("0002_add_user_first_name")
                .on_up(|tx| {
                    tx.execute_batch("ALTER TABLE users ADD COLUMN first_name TEXT;")?;
                    Ok(())
                })
                .on_down(|tx| {
                    tx.execute_batch("ALTER TABLE users DROP COLUMN first_name;")?;
                    Ok(())
                }),
        )
}

fn main() -> anyhow::Result<()> {
    let mut registry = Registry::new();
    registry.register(users_app())?;
    appmigrate_cli::main_with(registry)
}
