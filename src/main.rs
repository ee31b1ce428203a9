//! Storefront provisioner - applies the storefront database declarations

use clap::Parser;
use tracing::{error, info};

use storefront_provisioner::{
    config::Args,
    db::{declared_collections, MongoClient},
    logging,
    provision::{ProvisionConfig, Provisioner},
};

const COMPLETION_MESSAGE: &str = "MongoDB initialization complete";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(e.exit_code());
    }

    info!("======================================");
    info!("  Storefront Provisioner v{}", env!("CARGO_PKG_VERSION"));
    info!("  commit {} built {}", env!("GIT_COMMIT_SHORT"), env!("BUILD_TIMESTAMP"));
    info!("======================================");
    info!("Database: {}", args.mongodb_db);
    info!("App user: {}@{}", args.app_user, args.auth_db);
    info!("On existing: {:?}", args.on_existing);
    info!("Mode: {}", if args.dry_run { "DRY RUN" } else { "APPLY" });
    info!("======================================");

    let user = args.user_spec()?;

    let mongo = match MongoClient::new(
        &args.mongodb_uri,
        &args.mongodb_db,
        args.connect_timeout(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let provisioner = Provisioner::new(
        mongo,
        args.mongodb_db.clone(),
        ProvisionConfig {
            on_existing: args.on_existing,
            dry_run: args.dry_run,
        },
    );

    let report = match provisioner.run(&user, &declared_collections()).await {
        Ok(report) => report,
        Err(failure) => {
            error!("{}", failure);
            if !failure.report.dry_run {
                error!(
                    "{} change(s) were applied before the failure and have not been rolled back",
                    failure.report.changes()
                );
            }
            std::process::exit(failure.source.exit_code());
        }
    };

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if args.dry_run {
        info!("Dry run complete: {} change(s) pending", report.changes());
    } else {
        info!("{} change(s) applied", report.changes());
        println!("{}", COMPLETION_MESSAGE);
    }

    Ok(())
}
