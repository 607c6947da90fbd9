//! kv-session binary entry point.
//!
//! Walks two concurrent requests through the lock protocol against the
//! in-memory store.

use std::sync::Arc;

use kv_session::cli::{self, Args};
use kv_session::config::Config;
use kv_session::{
    logging, InMemoryStore, LockOutcome, SessionCoordinator, SessionId, WriteOutcome,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> kv_session::Result<()> {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("run with --help for usage");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return Ok(());
    }
    if args.version {
        cli::print_version();
        return Ok(());
    }

    run(args).await
}

async fn run(args: Args) -> kv_session::Result<()> {
    let config = Config::load(&args)?;
    logging::init_with_filter(config.log_filter()).ok();

    let coordinator_config = config.to_coordinator_config()?;
    info!("kv-session v{}", env!("CARGO_PKG_VERSION"));
    info!(
        application = %coordinator_config.application_name,
        timeout_minutes = coordinator_config.timeout_minutes,
        propagate_faults = coordinator_config.propagate_faults,
        "coordinator configured"
    );

    let timeout = coordinator_config.timeout_minutes;
    let store = Arc::new(InMemoryStore::new());
    let first = SessionCoordinator::new(Arc::clone(&store), coordinator_config);
    let second = first.clone();
    let id = SessionId::new("demo-session")?;

    let created = first.create_uninitialized(&id, timeout).await?;
    info!(outcome = created.as_str(), "placeholder created");

    let token = match first.get_item_exclusive(&id).await? {
        LockOutcome::Acquired {
            lock_token,
            actions,
            ..
        } => {
            info!(lock_token, ?actions, "first request holds the lock");
            lock_token
        }
        other => {
            warn!(outcome = other.as_str(), "first request could not lock the session");
            return Ok(());
        }
    };

    if let LockOutcome::Locked {
        lock_age,
        lock_token,
    } = second.get_item_exclusive(&id).await?
    {
        info!(
            lock_token,
            lock_age_ms = lock_age.num_milliseconds(),
            "second request sees the session locked"
        );
    }

    let data = first.create_new(timeout).with_items(b"visits=1".to_vec());
    let committed = first.set_and_release(&id, token, data, false).await?;
    info!(outcome = committed.as_str(), "first request committed");

    match second.get_item_exclusive(&id).await? {
        LockOutcome::Acquired {
            lock_token, data, ..
        } => {
            info!(
                lock_token,
                payload_bytes = data.items.as_bytes().len(),
                "second request holds the lock"
            );
            let stale = second.release(&id, token).await?;
            info!(outcome = stale.as_str(), "stale release from first token rejected");

            let released = second.release(&id, lock_token).await?;
            if released == WriteOutcome::Ok {
                second.reset_timeout(&id).await?;
            }
            info!(outcome = released.as_str(), "second request released");
        }
        other => warn!(outcome = other.as_str(), "second request could not lock the session"),
    }

    Ok(())
}
