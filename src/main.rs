use chrono::{Datelike, NaiveDate, Utc};
use dotenvy::dotenv;
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tuition_ledger::{
    config::{
        database::{create_connection, create_tables},
        rates::load_default_config,
    },
    core::{
        payroll::compute_all_payroll,
        session::{Role, Session},
    },
    errors::{Error, Result},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();

    // 3. Load fee, tax and payroll settings
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load config.toml: {}", e))?;

    // 4. Connect and make sure the schema exists
    let db = create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Report payroll for the current month
    let session = session_from_env()?;
    let (start, end) = current_month()?;
    let results = compute_all_payroll(&db, &session, &config, start, end).await?;
    for result in &results {
        info!(
            "{} ({}): revenue {:.2}, share {:.2}, social fund {:.2}, due {:.2}",
            result.teacher_name,
            result.teacher_id,
            result.revenue,
            result.teacher_share,
            result.social_fund_deduction,
            result.payroll_due
        );
    }
    info!("Payroll computed for {} teachers over {start}..={end}", results.len());

    Ok(())
}

/// Builds the caller's session from `LEDGER_ACTOR`, `LEDGER_ROLE` and `LEDGER_LOCATION`.
fn session_from_env() -> Result<Session> {
    let actor = env::var("LEDGER_ACTOR").unwrap_or_else(|_| "admin".to_string());
    let role = match env::var("LEDGER_ROLE").as_deref() {
        Ok("admin") | Err(_) => Role::Admin,
        Ok("manager") => Role::Manager,
        Ok("teacher") => Role::Teacher,
        Ok(other) => {
            return Err(Error::Config {
                message: format!("Unknown LEDGER_ROLE {other:?}"),
            });
        }
    };
    let location = env::var("LEDGER_LOCATION").ok();
    Ok(Session::new(actor, role, location))
}

fn current_month() -> Result<(NaiveDate, NaiveDate)> {
    let today = Utc::now().date_naive();
    let start = today.with_day(1);
    let end = start
        .and_then(|first| first.checked_add_months(chrono::Months::new(1)))
        .and_then(|next| next.pred_opt());
    start.zip(end).ok_or_else(|| Error::Config {
        message: format!("Cannot derive a pay period from {today}"),
    })
}
