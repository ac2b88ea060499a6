use mongodb::{bson::doc, Client, Database};

pub async fn get_db_client(database_url: &str, db_name: &str) -> Database {
    let client = Client::with_uri_str(database_url)
        .await
        .expect("Failed to connect to MongoDB");

    let db = client.database(db_name);

    match db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => {
            tracing::info!("✅ Connected to database: {}", db_name);
        }
        Err(e) => {
            tracing::error!("❌ Database '{}' is inaccessible: {}", db_name, e);
        }
    }

    db
}
