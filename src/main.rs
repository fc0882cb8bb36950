use std::sync::Arc;
use std::time::Duration;

use call_core::calls::coordinator::CallLifecycleCoordinator;
use call_core::config::CallConfig;
use call_core::store::{CallLedger, MemoryCallLedger, MemorySessionStore};
use call_core::types::call::{CallType, EndReason, UserId};
use log::{error, info};

// Demo: drives one scripted voice call end-to-end over the in-memory
// backends and prints each lifecycle step.
//
// Usage:
//   cargo run

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                chrono::Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        if let Err(e) = run().await {
            error!("demo call failed: {e:?}");
        }
    });
}

async fn run() -> anyhow::Result<()> {
    let config = CallConfig {
        cleanup_delay: Duration::from_millis(200),
        ..Default::default()
    };
    let sessions = Arc::new(MemorySessionStore::new(config.session_ttl));
    let ledger = Arc::new(MemoryCallLedger::new());
    let coordinator = CallLifecycleCoordinator::new(config, sessions, ledger.clone());
    coordinator.recover_timers().await?;

    let mut ended_events = coordinator.events().call_ended.subscribe();

    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let session = coordinator
        .initiate_call(CallType::Voice, alice.clone(), vec![bob.clone()], None)
        .await?;
    let call_id = session.call_id.clone();
    info!("bob's presence: {:?}", coordinator.get_user_status(&bob).await?);

    coordinator.accept_call(&call_id, &bob).await?;
    coordinator.establish_connection(&call_id).await?;

    // Let the call "run" for a moment before hanging up.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    coordinator
        .end_call(&call_id, EndReason::UserEnded, Some(&alice))
        .await?;

    let ended = ended_events.recv().await?;
    info!(
        "call {} ended: {:?}, duration {}s",
        ended.call_id, ended.reason, ended.duration_secs
    );

    if let Some(record) = ledger.get(&call_id).await? {
        info!(
            "ledger record: status {:?}, reason {:?}, {} participant(s)",
            record.status,
            record.end_reason,
            record.participants.len()
        );
    }

    Ok(())
}
