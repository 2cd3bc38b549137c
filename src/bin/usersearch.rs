//! User Search CLI
//!
//! Compiles a search-page querystring and optionally dispatches it as a
//! background report.
//!
//! Usage:
//!   cargo run --features database,cli --bin usersearch -- \
//!     compile "include:1=country&1_country=US"
//!
//!   # Compile and queue a report run mailed to ops
//!   cargo run --features database,cli --bin usersearch -- \
//!     compile "include:1=state&1_state=NY" --dispatch --notify ops@example.org
//!
//!   # Run the compiled plan for a handful of ids
//!   cargo run --features database,cli --bin usersearch -- \
//!     select "include:1=country&1_country=US" --ids 1,2,3

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usersearch::database::DatabaseManager;
use usersearch::report::{ActionKitReportService, ReportDispatcher};
use usersearch::{FilterCatalog, QueryCompiler, SearchConfig};

#[derive(Parser, Debug)]
#[command(name = "usersearch")]
#[command(about = "Compile user search parameters into report SQL")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the compiled query as JSON
    Compile {
        /// URL-encoded search parameters
        querystring: String,

        /// Hand the compiled query to the reporting service
        #[arg(long)]
        dispatch: bool,

        /// Address the report result is mailed to
        #[arg(long, env = "USERSEARCH_NOTIFY")]
        notify: Option<String>,
    },
    /// Print matching ids among the given ones
    Select {
        querystring: String,

        /// Comma-separated user ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usersearch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = SearchConfig::from_env()?;
    let db = DatabaseManager::with_default_config()
        .await
        .context("Failed to connect to database")?;

    let compiler = QueryCompiler::new(
        Arc::new(FilterCatalog::standard()),
        config.geocoder()?,
        Arc::new(db.contact_log()),
    )
    .with_columns(Arc::new(db.column_store()))
    .with_config(config.compiler.clone());

    match args.command {
        Command::Compile {
            querystring,
            dispatch,
            notify,
        } => {
            let compiled = compiler.compile(&querystring).await?;
            println!("{}", serde_json::to_string_pretty(&compiled)?);

            if dispatch {
                let actionkit = config
                    .actionkit
                    .as_ref()
                    .ok_or_else(|| anyhow!("ACTIONKIT_BASE_URL, ACTIONKIT_USERNAME and ACTIONKIT_PASSWORD must be set"))?;
                let notify = notify.ok_or_else(|| anyhow!("--notify is required with --dispatch"))?;

                let service = ActionKitReportService::new(actionkit, config.compiler.http_timeout())?;
                let receipt = ReportDispatcher::new(Arc::new(service))
                    .dispatch(&compiled, &notify, None)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            }
        }
        Command::Select { querystring, ids } => {
            let params = usersearch::QueryParams::parse(&querystring);
            let assembled = compiler.assemble(&params).await?;
            let matched = db.user_store().select_ids_within(&assembled.plan, &ids).await?;
            println!("{}", serde_json::to_string(&matched)?);
        }
    }

    Ok(())
}
