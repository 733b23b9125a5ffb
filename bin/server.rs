// Holdings Pivot - Web Server
// REST API over one upload session, snapshots in SQLite

use holdings_pivot::api::{router, AppState};
use holdings_pivot::Config;

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("🌐 Holdings Pivot - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    // Storage must be reachable before any upload is accepted
    let conn = match config.open_store() {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("   Set HOLDINGS_DB_PATH to a writable location.");
            std::process::exit(1);
        }
    };
    println!("✓ Database opened: {:?}", config.db_path);
    println!("✓ Upload limit: {} MB", config.max_upload_mb);

    let app = router(AppState::new(conn, &config));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/pivot", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
